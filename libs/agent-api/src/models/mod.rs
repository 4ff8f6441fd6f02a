//! API models

use serde::{Deserialize, Serialize};

/// Deploy request: apply a new configuration generation to one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub app: String,
    pub tag: String,
    pub compose: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

impl DeployRequest {
    /// The rollback request addressing the same slot
    pub fn rollback(&self) -> RollbackRequest {
        RollbackRequest {
            app: self.app.clone(),
            tag: self.tag.clone(),
        }
    }
}

/// Rollback request: restore the retained backup generation of one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRequest {
    pub app: String,
    pub tag: String,
}

/// Terminal state reported by the agent for a deploy or rollback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// The requested generation is live
    Succeeded,
    /// The requested generation failed and the previous one was restored
    RolledBack,
    /// The requested generation failed and restoring the previous one failed too
    DoubleFailed,
    /// The requested generation failed and no remediation was attempted
    Failed,
}

/// Response body for every agent endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ApplyOutcome>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            success: Some(true),
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: ApplyOutcome) -> Self {
        self.state = Some(state);
        self
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.success == Some(true) && self.error.is_none()
    }
}
