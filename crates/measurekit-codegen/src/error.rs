//! Generation and override errors

use thiserror::Error;

/// Result type for code generation
pub type GenResult<T> = Result<T, GenerationError>;

/// Fatal generation errors. Non-fatal findings (empty value sets) are
/// surfaced as warnings on the generated artifact instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// A timing anchor or adherence rule references an index event the
    /// measure never defines
    #[error(
        "Component '{component}' references index event '{name}', which the measure does not define"
    )]
    UndefinedIndexEvent { component: String, name: String },
}

impl GenerationError {
    /// Create an undefined-index-event error
    pub fn undefined_index_event(
        component: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::UndefinedIndexEvent {
            component: component.into(),
            name: name.into(),
        }
    }
}

/// Errors raised by the override store
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OverrideError {
    /// Every edit must carry an audit note
    #[error("Override edits require a non-empty audit note")]
    NoteRequired,

    /// Optimistic version check failed; someone else edited concurrently
    #[error("Override version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },

    /// No override exists for the key
    #[error("No override exists for component '{component}'")]
    NotFound { component: String },
}
