//! Error types for the fleet agent and the rollout orchestrator

use agent_api::ApplyOutcome;
use thiserror::Error;

/// Main error type
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("No backup available for {0}")]
    NoBackupAvailable(String),

    #[error("Image pull failed: {0}")]
    ImagePullError(String),

    #[error("Bring-up failed: {0}")]
    BringUpError(String),

    #[error("Deploy failed and the previous generation was restored: {cause}")]
    RolledBack { cause: Box<AgentError> },

    #[error("Deploy failed ({cause}) and restoring the previous generation failed too ({rollback})")]
    DoubleFailure {
        cause: Box<AgentError>,
        rollback: Box<AgentError>,
    },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Agent responded {status}: {message}")]
    RemoteError {
        status: u16,
        message: String,
        outcome: Option<ApplyOutcome>,
    },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Terminal state an apply reached when it failed with this error.
    ///
    /// Returns `None` for errors raised before any slot was touched.
    pub fn apply_outcome(&self) -> Option<ApplyOutcome> {
        match self {
            AgentError::RolledBack { .. } => Some(ApplyOutcome::RolledBack),
            AgentError::DoubleFailure { .. } => Some(ApplyOutcome::DoubleFailed),
            AgentError::RemoteError { outcome, .. } => *outcome,
            AgentError::ImagePullError(_)
            | AgentError::BringUpError(_)
            | AgentError::IoError(_)
            | AgentError::StorageError(_) => Some(ApplyOutcome::Failed),
            _ => None,
        }
    }

    /// Whether the slot was left needing manual intervention
    pub fn is_double_failure(&self) -> bool {
        self.apply_outcome() == Some(ApplyOutcome::DoubleFailed)
    }
}
