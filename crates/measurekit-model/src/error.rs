//! Model validation errors

use thiserror::Error;

/// Result type for model construction and validation
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised by construction-time validation of the measure model
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Element has no value set, value sets, or direct codes
    #[error("Element '{element}' has no value set or direct codes")]
    MissingCodeSource { element: String },

    /// Offset value and unit must be both present or both absent
    #[error("Timing offset on '{context}' has a value without a unit (or a unit without a value)")]
    IncompleteOffset { context: String },

    /// NOT clause must wrap exactly one child
    #[error("Clause '{clause}' uses NOT with {count} children; exactly one is required")]
    NotArity { clause: String, count: usize },

    /// Clause has no children
    #[error("Clause '{clause}' has no children")]
    EmptyClause { clause: String },

    /// Sibling connection pair listed more than once
    #[error("Clause '{clause}' lists the sibling pair ({from}, {to}) more than once")]
    DuplicateSiblingPair {
        clause: String,
        from: String,
        to: String,
    },

    /// Sibling connection references a child id not in the clause
    #[error("Clause '{clause}' has a sibling connection for unknown child '{child}'")]
    UnknownSiblingChild { clause: String, child: String },

    /// Measurement period end precedes its start
    #[error("Measurement period ends {end} before it starts {start}")]
    InvalidPeriod { start: String, end: String },

    /// Non-exclusion population type defined more than once
    #[error("Population '{population}' is defined more than once")]
    DuplicatePopulation { population: String },
}

impl ModelError {
    /// Create a missing-code-source error
    pub fn missing_code_source(element: impl Into<String>) -> Self {
        Self::MissingCodeSource {
            element: element.into(),
        }
    }

    /// Create an incomplete-offset error
    pub fn incomplete_offset(context: impl Into<String>) -> Self {
        Self::IncompleteOffset {
            context: context.into(),
        }
    }

    /// Create an unknown-sibling-child error
    pub fn unknown_sibling_child(clause: impl Into<String>, child: impl Into<String>) -> Self {
        Self::UnknownSiblingChild {
            clause: clause.into(),
            child: child.into(),
        }
    }
}
