//! Evaluation errors
//!
//! The evaluator itself is infallible over patient data; the only error it
//! can report is a measure-configuration defect, and only when the caller
//! asks for strict semantics.

use thiserror::Error;

/// Result type for strict evaluation
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors surfaced by strict evaluation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// A criteria node carried a configuration diagnostic
    #[error("Configuration error at '{node}': {message}")]
    Configuration { node: String, message: String },
}

impl EvalError {
    /// Create a configuration error for a node
    pub fn configuration(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            node: node.into(),
            message: message.into(),
        }
    }
}
