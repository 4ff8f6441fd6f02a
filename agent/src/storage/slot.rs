//! Deployment slot store
//!
//! Keeps the on-disk state of one `(app, tag)` slot: the live generation and a
//! single backup generation. The store performs no locking; callers serialize
//! access per target.

use std::path::PathBuf;

use tracing::debug;

use crate::errors::AgentError;
use crate::models::deployment::{ConfigurationBundle, DeploymentTarget};
use crate::storage::layout::{GenerationFiles, StorageLayout};

/// Slot store rooted at an explicit storage layout
#[derive(Debug, Clone)]
pub struct SlotStore {
    layout: StorageLayout,
}

impl SlotStore {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Resolve (and create if missing) the directory of a slot
    pub async fn resolve_slot_path(&self, target: &DeploymentTarget) -> Result<PathBuf, AgentError> {
        let dir = self.layout.slot_dir(target);
        dir.create().await?;
        Ok(dir.path().to_path_buf())
    }

    /// Whether the slot has a live generation
    pub async fn has_current(&self, target: &DeploymentTarget) -> bool {
        self.layout.current_files(target).compose.exists().await
    }

    /// Read the live generation, `None` if the slot was never deployed
    pub async fn read_current(
        &self,
        target: &DeploymentTarget,
    ) -> Result<Option<ConfigurationBundle>, AgentError> {
        read_generation(&self.layout.current_files(target)).await
    }

    /// Read the retained backup generation, `None` if there is none
    pub async fn read_backup(
        &self,
        target: &DeploymentTarget,
    ) -> Result<Option<ConfigurationBundle>, AgentError> {
        read_generation(&self.layout.backup_files(target)).await
    }

    /// Overwrite the live generation.
    ///
    /// The env file is only replaced when the bundle carries one; otherwise
    /// the previous env file stays in place.
    pub async fn write_current(
        &self,
        target: &DeploymentTarget,
        bundle: &ConfigurationBundle,
    ) -> Result<(), AgentError> {
        self.resolve_slot_path(target).await?;
        let files = self.layout.current_files(target);

        files.compose.write_atomic(bundle.compose.as_bytes()).await?;
        if let Some(env) = &bundle.env {
            files.env.write_atomic(env.as_bytes()).await?;
        }

        debug!(app = target.app(), tag = target.tag(), "wrote current generation");
        Ok(())
    }

    /// Overwrite the live generation exactly.
    ///
    /// Unlike [`SlotStore::write_current`], a bundle without env removes the
    /// live env file, so a restored generation matches what was snapshotted.
    pub async fn replace_current(
        &self,
        target: &DeploymentTarget,
        bundle: &ConfigurationBundle,
    ) -> Result<(), AgentError> {
        self.write_current(target, bundle).await?;
        if bundle.env.is_none() {
            self.layout.current_files(target).env.delete().await?;
        }
        Ok(())
    }

    /// Copy the live generation over the backup.
    ///
    /// Returns `false` without touching anything when nothing is live yet.
    /// Only backup files are written, so a failure here leaves the live
    /// generation intact.
    pub async fn snapshot_backup(&self, target: &DeploymentTarget) -> Result<bool, AgentError> {
        let current = self.layout.current_files(target);
        if !current.compose.exists().await {
            debug!(app = target.app(), tag = target.tag(), "nothing to back up");
            return Ok(false);
        }

        let backup = self.layout.backup_files(target);
        if current.env.exists().await {
            current.env.copy_to(&backup.env).await?;
        } else {
            // The live generation has no env, so neither may its backup
            backup.env.delete().await?;
        }
        current.compose.copy_to(&backup.compose).await?;

        debug!(app = target.app(), tag = target.tag(), "snapshotted backup generation");
        Ok(true)
    }
}

async fn read_generation(files: &GenerationFiles) -> Result<Option<ConfigurationBundle>, AgentError> {
    let Some(compose) = files.compose.read_string_opt().await? else {
        return Ok(None);
    };
    let env = files.env.read_string_opt().await?;
    Ok(Some(ConfigurationBundle { compose, env }))
}
