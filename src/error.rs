//! Engine error taxonomy
//!
//! Every engine operation reports failure through [`EngineError`]. Callers
//! decide how to surface it; the api module maps each kind to a status code.

use crate::providers::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Session id unknown or expired. Terminal for the request.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Malformed input or a reference to an id that does not exist.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A workflow stage change the validator refused.
    #[error("Transition from {from} to {to} rejected: {reason}")]
    TransitionRejected {
        from: String,
        to: String,
        reason: String,
    },

    /// Optimistic version check failed on save.
    #[error("Session {id} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        id: String,
        expected: u64,
        actual: u64,
    },

    /// A collaborator failed and the missing data was required to proceed.
    #[error("Collaborator failure: {0}")]
    Collaborator(#[from] ProviderError),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable short name for the error kind, used in API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::TransitionRejected { .. } => "transition_rejected",
            Self::Conflict { .. } => "conflict",
            Self::Collaborator(_) => "collaborator_failure",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(EngineError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(EngineError::validation("bad").kind(), "validation");
        assert_eq!(
            EngineError::TransitionRejected {
                from: "REVIEW".into(),
                to: "GROUP_DAYS".into(),
                reason: "no".into(),
            }
            .kind(),
            "transition_rejected"
        );
    }

    #[test]
    fn test_display_includes_context() {
        let err = EngineError::Conflict {
            id: "abc".into(),
            expected: 3,
            actual: 4,
        };
        let text = err.to_string();
        assert!(text.contains("abc"));
        assert!(text.contains("expected version 3"));
    }
}
