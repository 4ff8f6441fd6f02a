//! Container runtime seam used by the apply engine

use std::path::PathBuf;

use async_trait::async_trait;

use crate::errors::AgentError;
use crate::models::deployment::DeploymentTarget;

/// The runtime's view of one slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    /// Project name, unique per target on this agent
    pub name: String,

    /// Slot directory holding the live compose and env files
    pub dir: PathBuf,
}

impl ComposeProject {
    pub fn new(target: &DeploymentTarget, dir: PathBuf) -> Self {
        Self {
            name: target.project_name(),
            dir,
        }
    }
}

/// External runtime that makes a slot's configuration live.
///
/// Processes started for one project must never be touched by operations on
/// another project.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Fetch the images the live configuration references.
    ///
    /// Failures must be reported as [`AgentError::ImagePullError`].
    async fn pull(&self, project: &ComposeProject) -> Result<(), AgentError>;

    /// Replace the project's running processes with the live configuration,
    /// removing anything no longer declared.
    ///
    /// Failures must be reported as [`AgentError::BringUpError`].
    async fn up(&self, project: &ComposeProject) -> Result<(), AgentError>;
}
