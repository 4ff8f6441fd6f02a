//! Apply engine
//!
//! Drives one slot through backup, write, image pull and bring-up, restoring
//! the backup generation when bring-up fails. Two entry points share a single
//! "write + pull + bring-up" primitive:
//!
//! - [`ApplyEngine::apply_new`] deploys a new generation with backup and
//!   self-healing enabled.
//! - [`ApplyEngine::restore_previous`] makes the backup generation live again,
//!   without snapshotting and without a nested rollback.
//!
//! The engine does not serialize callers; the endpoint holds a per-target
//! lock around every call.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::deploy::fsm::{ApplyEvent, ApplyFsm, ApplyState};
use crate::deploy::runtime::{ComposeProject, ContainerRuntime};
use crate::errors::AgentError;
use crate::models::deployment::{ConfigurationBundle, DeploymentTarget};
use crate::storage::slot::SlotStore;

/// Apply options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Snapshot the live generation before overwriting it
    pub allow_backup: bool,

    /// Restore the backup generation when bring-up fails
    pub allow_rollback_on_failure: bool,

    /// Write the bundle exactly: a bundle without env removes the live env
    /// instead of keeping it
    pub exact_env: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            allow_backup: true,
            allow_rollback_on_failure: true,
            exact_env: false,
        }
    }
}

impl ApplyOptions {
    /// Options used when a previous generation is replayed
    pub fn restore() -> Self {
        Self {
            allow_backup: false,
            allow_rollback_on_failure: false,
            exact_env: true,
        }
    }
}

/// Result of a successful apply
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub target: DeploymentTarget,

    /// Terminal state, always [`ApplyState::Succeeded`] for a returned report
    pub state: ApplyState,

    /// Whether a live generation was snapshotted before the write
    pub backed_up: bool,

    /// States visited, oldest first
    pub history: Vec<ApplyState>,
}

/// Per-agent apply engine
#[derive(Clone)]
pub struct ApplyEngine {
    store: SlotStore,
    runtime: Arc<dyn ContainerRuntime>,
}

impl ApplyEngine {
    pub fn new(store: SlotStore, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { store, runtime }
    }

    pub fn store(&self) -> &SlotStore {
        &self.store
    }

    /// Deploy a new generation with backup and rollback enabled
    pub async fn apply_new(
        &self,
        target: &DeploymentTarget,
        bundle: &ConfigurationBundle,
    ) -> Result<ApplyReport, AgentError> {
        self.apply(target, bundle, ApplyOptions::default()).await
    }

    /// Make the retained backup generation live again.
    ///
    /// Neither snapshots the generation it discards nor attempts a nested
    /// rollback. Fails with [`AgentError::NoBackupAvailable`] without touching
    /// the slot when no backup is on record.
    pub async fn restore_previous(
        &self,
        target: &DeploymentTarget,
    ) -> Result<ApplyReport, AgentError> {
        let backup = self
            .store
            .read_backup(target)
            .await?
            .ok_or_else(|| AgentError::NoBackupAvailable(target.to_string()))?;

        info!(app = target.app(), tag = target.tag(), "Restoring backup generation");
        self.apply(target, &backup, ApplyOptions::restore()).await
    }

    /// Apply a generation to a slot
    pub async fn apply(
        &self,
        target: &DeploymentTarget,
        bundle: &ConfigurationBundle,
        options: ApplyOptions,
    ) -> Result<ApplyReport, AgentError> {
        let mut fsm = ApplyFsm::new();
        let mut backed_up = false;

        if options.allow_backup && self.store.has_current(target).await {
            step(&mut fsm, ApplyEvent::Backup)?;
            match self.store.snapshot_backup(target).await {
                Ok(done) => backed_up = done,
                Err(e) => return Err(fail(&mut fsm, target, e)),
            }
        }

        let err = match self
            .write_and_bring_up(target, bundle, options.exact_env, &mut fsm)
            .await
        {
            Ok(()) => {
                step(&mut fsm, ApplyEvent::Success)?;
                info!(
                    app = target.app(),
                    tag = target.tag(),
                    backed_up,
                    "Generation is live"
                );
                return Ok(ApplyReport {
                    target: target.clone(),
                    state: fsm.state(),
                    backed_up,
                    history: fsm.history().to_vec(),
                });
            }
            Err(e) => e,
        };

        // Only a bring-up failure may have disturbed running processes
        let can_heal = fsm.state() == ApplyState::BringingUp && options.allow_rollback_on_failure;
        let backup = if can_heal {
            self.store.read_backup(target).await.ok().flatten()
        } else {
            None
        };

        let Some(backup) = backup else {
            return Err(fail(&mut fsm, target, err));
        };

        warn!(
            app = target.app(),
            tag = target.tag(),
            "Bring-up failed ({}), restoring backup generation",
            err
        );
        step(&mut fsm, ApplyEvent::Rollback)?;

        let mut restore_fsm = ApplyFsm::new();
        match self
            .write_and_bring_up(target, &backup, true, &mut restore_fsm)
            .await
        {
            Ok(()) => {
                step(&mut fsm, ApplyEvent::RollbackSuccess)?;
                info!(app = target.app(), tag = target.tag(), "Backup generation restored");
                Err(AgentError::RolledBack {
                    cause: Box::new(err),
                })
            }
            Err(rollback) => {
                step(&mut fsm, ApplyEvent::RollbackFailed(rollback.to_string()))?;
                error!(
                    app = target.app(),
                    tag = target.tag(),
                    "Restoring backup generation failed, manual intervention required: {}",
                    rollback
                );
                Err(AgentError::DoubleFailure {
                    cause: Box::new(err),
                    rollback: Box::new(rollback),
                })
            }
        }
    }

    /// Write a generation as live, pull its images and bring it up.
    ///
    /// A restored generation is written with `exact_env` so that the env
    /// of the generation it replaces does not survive. On error the FSM is
    /// left in the state of the step that failed.
    async fn write_and_bring_up(
        &self,
        target: &DeploymentTarget,
        bundle: &ConfigurationBundle,
        exact_env: bool,
        fsm: &mut ApplyFsm,
    ) -> Result<(), AgentError> {
        step(fsm, ApplyEvent::Write)?;
        if exact_env {
            self.store.replace_current(target, bundle).await?;
        } else {
            self.store.write_current(target, bundle).await?;
        }
        let project = ComposeProject::new(target, self.store.resolve_slot_path(target).await?);

        step(fsm, ApplyEvent::Pull)?;
        self.runtime.pull(&project).await?;

        step(fsm, ApplyEvent::BringUp)?;
        self.runtime.up(&project).await
    }
}

fn step(fsm: &mut ApplyFsm, event: ApplyEvent) -> Result<ApplyState, AgentError> {
    fsm.process(event).map_err(AgentError::Internal)
}

fn fail(fsm: &mut ApplyFsm, target: &DeploymentTarget, err: AgentError) -> AgentError {
    if let Err(invalid) = fsm.process(ApplyEvent::Fail(err.to_string())) {
        error!("{}", invalid);
    }
    error!(app = target.app(), tag = target.tag(), "Apply failed: {}", err);
    err
}
