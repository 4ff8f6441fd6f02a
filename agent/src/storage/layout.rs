//! Storage layout configuration

use std::path::{Path, PathBuf};

use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::deployment::DeploymentTarget;

/// Live compose file name inside a slot directory
pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// Live env file name; docker compose picks it up from the project directory
pub const ENV_FILE: &str = ".env";

/// Backup compose file name
pub const BACKUP_COMPOSE_FILE: &str = "docker-compose.backup.yml";

/// Backup env file name
pub const BACKUP_ENV_FILE: &str = ".env.backup";

/// Storage layout for the agent's deployment slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    /// Root directory holding one `<app>/<tag>` directory per slot
    pub apps_root: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(apps_root: impl Into<PathBuf>) -> Self {
        Self {
            apps_root: apps_root.into(),
        }
    }

    /// Default root derived from the agent identity
    pub fn for_identity(identity: &str) -> Self {
        Self::new(Path::new("/opt").join(identity).join("apps"))
    }

    /// Directory of one deployment slot
    pub fn slot_dir(&self, target: &DeploymentTarget) -> Dir {
        Dir::new(self.apps_root.join(target.app()).join(target.tag()))
    }

    /// Live files of a slot
    pub fn current_files(&self, target: &DeploymentTarget) -> GenerationFiles {
        let dir = self.slot_dir(target);
        GenerationFiles {
            compose: dir.file(COMPOSE_FILE),
            env: dir.file(ENV_FILE),
        }
    }

    /// Backup files of a slot
    pub fn backup_files(&self, target: &DeploymentTarget) -> GenerationFiles {
        let dir = self.slot_dir(target);
        GenerationFiles {
            compose: dir.file(BACKUP_COMPOSE_FILE),
            env: dir.file(BACKUP_ENV_FILE),
        }
    }
}

/// The file pair holding one configuration generation
#[derive(Debug, Clone)]
pub struct GenerationFiles {
    pub compose: File,
    pub env: File,
}
