//! Error types for the consistency engine
//!
//! Mutations (supersede, add dependency) fail fast with one of these errors
//! and leave the input snapshot untouched. Validators do not return them;
//! they accumulate [`crate::references::ReferenceIssue`]s instead.

use serde::Serialize;

/// Engine error kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineError {
    /// Referenced or target ID absent
    #[error("{what} not found: {id}")]
    NotFound {
        /// What was looked up (entity, task, node, ...)
        what: String,
        /// ID that was not found
        id: String,
    },

    /// Item already has a successor
    #[error("{id} has already been superseded by {superseded_by}")]
    AlreadySuperseded {
        /// Retired item
        id: String,
        /// Item that superseded it
        superseded_by: String,
    },

    /// Reference string does not match its kind's pattern
    #[error("invalid reference '{value}' in {field}: expected {expected}")]
    InvalidReferenceFormat {
        /// Field holding the reference
        field: String,
        /// Offending value
        value: String,
        /// Expected pattern
        expected: String,
    },

    /// Accepting the edge would close a dependency cycle
    #[error("{from} -> {to} would create a cycle: {}", path.join(" -> "))]
    WouldCreateCycle {
        /// Edge source
        from: String,
        /// Edge target
        to: String,
        /// Cycle the edge would close, starting and ending at `from`
        path: Vec<String>,
    },

    /// Node references itself
    #[error("{id} cannot reference itself through {field}")]
    SelfReference {
        /// Node key
        id: String,
        /// Field holding the reference
        field: String,
    },

    /// Update payload is not acceptable
    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    /// Unexpected failure inside an analyzer
    #[error("analysis failed: {0}")]
    AnalysisFailure(String),
}

impl EngineError {
    /// Create a not-found error
    #[inline]
    pub fn not_found(what: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            what: what.into(),
            id: id.to_string(),
        }
    }

    /// Stable machine-readable kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::AlreadySuperseded { .. } => "already_superseded",
            Self::InvalidReferenceFormat { .. } => "invalid_reference_format",
            Self::WouldCreateCycle { .. } => "would_create_cycle",
            Self::SelfReference { .. } => "self_reference",
            Self::InvalidUpdate(_) => "invalid_update",
            Self::AnalysisFailure(_) => "analysis_failure",
        }
    }
}

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
