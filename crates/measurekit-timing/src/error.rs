//! Timing configuration errors

use thiserror::Error;

/// Result type for timing resolution
pub type TimingResult<T> = Result<T, ConfigurationError>;

/// A measure-authoring defect in timing configuration.
///
/// These are never swallowed: the evaluator surfaces them as a failing node
/// with a diagnostic, and strict callers may fail the whole evaluation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Anchor names an index event absent from the resolution context
    #[error("Index event '{name}' is not defined for this evaluation")]
    UnresolvedIndexEvent { name: String },

    /// Event-relative anchor with no event date in the context
    #[error("No date available for anchor '{anchor}'")]
    UnresolvedAnchor { anchor: String },

    /// Operator requires an offset but none was supplied
    #[error("Operator '{operator}' requires an offset")]
    MissingOffset { operator: String },

    /// Resolved window ends before it starts
    #[error("Resolved window ends {end} before it starts {start}")]
    WindowEndBeforeStart { start: String, end: String },

    /// Offset arithmetic left the representable date range
    #[error("Offset '{offset}' overflows the date range from {anchor}")]
    OffsetOverflow { offset: String, anchor: String },
}

impl ConfigurationError {
    /// Create an unresolved-index-event error
    pub fn unresolved_index_event(name: impl Into<String>) -> Self {
        Self::UnresolvedIndexEvent { name: name.into() }
    }

    /// Create an unresolved-anchor error
    pub fn unresolved_anchor(anchor: impl Into<String>) -> Self {
        Self::UnresolvedAnchor {
            anchor: anchor.into(),
        }
    }

    /// Create a missing-offset error
    pub fn missing_offset(operator: impl Into<String>) -> Self {
        Self::MissingOffset {
            operator: operator.into(),
        }
    }
}
