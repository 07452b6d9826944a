//! Error types for streamgov
//!
//! This module defines the error taxonomy for the governance core. Validation
//! errors are detected before any state mutation and leave all state
//! unchanged; `SyncFailure` and `Persistence` indicate that an operation made
//! it past validation and must be surfaced to the caller for remediation.

use thiserror::Error;

/// Result type alias for governance operations
pub type Result<T> = std::result::Result<T, GovernanceError>;

/// Errors surfaced by the governance core
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("unauthorized: team '{team}' may not {action}")]
    Unauthorized { team: String, action: String },

    #[error("invalid promotion for topic '{topic}': {reason}")]
    InvalidPromotion { topic: String, reason: String },

    #[error("duplicate pending request: {kind} for '{topic}' in '{env}' is already open")]
    DuplicatePending {
        topic: String,
        env: String,
        kind: String,
    },

    #[error("request not found: {0}")]
    RequestNotFound(String),

    #[error("request {id} is not pending (state: {state})")]
    NotPending { id: String, state: String },

    #[error("self-approval forbidden: request was submitted by team '{0}'")]
    SelfApprovalForbidden(String),

    #[error(
        "out-of-order approval for '{topic}' in '{env}': sequence {earliest} \
         is still pending ahead of sequence {requested}"
    )]
    OutOfOrder {
        topic: String,
        env: String,
        requested: u64,
        earliest: u64,
    },

    #[error("cluster sync failed: {0}")]
    SyncFailure(String),

    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("topic not found: '{topic}' in environment '{env}'")]
    TopicNotFound { topic: String, env: String },

    #[error("topic already exists: '{topic}' in environment '{env}'")]
    TopicAlreadyExists { topic: String, env: String },

    #[error("team '{team}' already holds {role} rights on '{topic}' in '{env}'")]
    AlreadyAuthorized {
        team: String,
        role: String,
        topic: String,
        env: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),
}

impl GovernanceError {
    /// Create an `Unauthorized` error with action context
    pub fn unauthorized(team: &str, action: impl Into<String>) -> Self {
        GovernanceError::Unauthorized {
            team: team.to_string(),
            action: action.into(),
        }
    }

    /// Create an `InvalidPromotion` error with a reason
    pub fn invalid_promotion(topic: &str, reason: impl Into<String>) -> Self {
        GovernanceError::InvalidPromotion {
            topic: topic.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a `Persistence` error with operation context
    pub fn persistence(operation: &str, detail: impl Into<String>) -> Self {
        GovernanceError::Persistence(format!("{}: {}", operation, detail.into()))
    }

    /// True for errors detected before any mutation.
    ///
    /// These leave all governance state unchanged and are recoverable by
    /// retrying with corrected input.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            GovernanceError::Unauthorized { .. }
                | GovernanceError::InvalidPromotion { .. }
                | GovernanceError::DuplicatePending { .. }
                | GovernanceError::RequestNotFound(_)
                | GovernanceError::NotPending { .. }
                | GovernanceError::SelfApprovalForbidden(_)
                | GovernanceError::OutOfOrder { .. }
                | GovernanceError::UnknownEnvironment(_)
                | GovernanceError::TopicNotFound { .. }
                | GovernanceError::TopicAlreadyExists { .. }
                | GovernanceError::AlreadyAuthorized { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_classification() {
        assert!(GovernanceError::unauthorized("infra", "promote 'orders'").is_validation_error());
        assert!(GovernanceError::OutOfOrder {
            topic: "orders".to_string(),
            env: "test".to_string(),
            requested: 3,
            earliest: 1,
        }
        .is_validation_error());

        assert!(!GovernanceError::SyncFailure("broker unreachable".to_string())
            .is_validation_error());
        assert!(!GovernanceError::persistence("snapshot", "disk full").is_validation_error());
    }

    #[test]
    fn test_error_display() {
        let err = GovernanceError::unauthorized("payments", "delete 'orders' in 'prod'");
        assert_eq!(
            err.to_string(),
            "unauthorized: team 'payments' may not delete 'orders' in 'prod'"
        );

        let err = GovernanceError::OutOfOrder {
            topic: "orders".to_string(),
            env: "test".to_string(),
            requested: 2,
            earliest: 1,
        };
        assert!(err.to_string().contains("sequence 1 is still pending"));
    }
}
