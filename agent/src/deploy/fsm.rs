//! Finite state machine for applying a configuration generation to a slot

use agent_api::ApplyOutcome;
use serde::{Deserialize, Serialize};

/// Apply state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyState {
    /// Nothing done yet
    Idle,

    /// Copying the live generation to the backup files
    BackingUp,

    /// Writing the new live generation
    Writing,

    /// Fetching referenced images
    PullingImages,

    /// Replacing running processes
    BringingUp,

    /// The new generation is live
    Succeeded,

    /// Restoring the backup generation after a failed bring-up
    RollingBack,

    /// The deploy failed and the backup generation is live again
    RolledBack,

    /// The deploy failed and restoring the backup failed too
    DoubleFailed,

    /// The deploy failed without remediation
    Failed,
}

impl ApplyState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplyState::Succeeded
                | ApplyState::RolledBack
                | ApplyState::DoubleFailed
                | ApplyState::Failed
        )
    }

    /// Outcome reported on the wire, for terminal states
    pub fn outcome(&self) -> Option<ApplyOutcome> {
        match self {
            ApplyState::Succeeded => Some(ApplyOutcome::Succeeded),
            ApplyState::RolledBack => Some(ApplyOutcome::RolledBack),
            ApplyState::DoubleFailed => Some(ApplyOutcome::DoubleFailed),
            ApplyState::Failed => Some(ApplyOutcome::Failed),
            _ => None,
        }
    }
}

/// Apply event
#[derive(Debug, Clone)]
pub enum ApplyEvent {
    /// Start snapshotting the live generation
    Backup,

    /// Start writing the new generation
    Write,

    /// Start pulling images
    Pull,

    /// Start bringing up the new generation
    BringUp,

    /// Bring-up completed
    Success,

    /// The current step failed
    Fail(String),

    /// Start restoring the backup generation
    Rollback,

    /// Backup generation restored
    RollbackSuccess,

    /// Restoring the backup generation failed
    RollbackFailed(String),
}

/// Apply FSM, recording every state it passes through
#[derive(Debug, Clone)]
pub struct ApplyFsm {
    state: ApplyState,
    error: Option<String>,
    history: Vec<ApplyState>,
}

impl ApplyFsm {
    /// Create a new FSM in idle state
    pub fn new() -> Self {
        Self {
            state: ApplyState::Idle,
            error: None,
            history: vec![ApplyState::Idle],
        }
    }

    /// Get current state
    pub fn state(&self) -> ApplyState {
        self.state
    }

    /// First error recorded, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// States visited so far, oldest first
    pub fn history(&self) -> &[ApplyState] {
        &self.history
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: ApplyEvent) -> Result<ApplyState, String> {
        let new_state = match (&self.state, &event) {
            (ApplyState::Idle, ApplyEvent::Backup) => ApplyState::BackingUp,
            (ApplyState::Idle | ApplyState::BackingUp, ApplyEvent::Write) => ApplyState::Writing,
            (ApplyState::Writing, ApplyEvent::Pull) => ApplyState::PullingImages,
            (ApplyState::PullingImages, ApplyEvent::BringUp) => ApplyState::BringingUp,
            (ApplyState::BringingUp, ApplyEvent::Success) => ApplyState::Succeeded,
            (ApplyState::BringingUp, ApplyEvent::Rollback) => ApplyState::RollingBack,
            (ApplyState::RollingBack, ApplyEvent::RollbackSuccess) => ApplyState::RolledBack,
            (ApplyState::RollingBack, ApplyEvent::RollbackFailed(err)) => {
                self.error.get_or_insert_with(|| err.clone());
                ApplyState::DoubleFailed
            }
            (
                ApplyState::BackingUp
                | ApplyState::Writing
                | ApplyState::PullingImages
                | ApplyState::BringingUp,
                ApplyEvent::Fail(err),
            ) => {
                self.error = Some(err.clone());
                ApplyState::Failed
            }

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        self.history.push(new_state);
        Ok(new_state)
    }
}

impl Default for ApplyFsm {
    fn default() -> Self {
        Self::new()
    }
}
