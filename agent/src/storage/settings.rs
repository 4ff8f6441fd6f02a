//! Agent settings, loaded from the process environment

use std::path::PathBuf;

use secrecy::SecretString;

use crate::errors::AgentError;
use crate::logs::LogLevel;
use crate::storage::layout::StorageLayout;

/// Shared bearer secret
pub const ACCESS_TOKEN_VAR: &str = "ACCESS_TOKEN";
/// Root directory for deployment slots
pub const APPS_ROOT_VAR: &str = "APPS_ROOT";
/// Agent identity, used to derive the default root
pub const AGENT_NAME_VAR: &str = "AGENT_NAME";
pub const AGENT_HOST_VAR: &str = "AGENT_HOST";
pub const AGENT_PORT_VAR: &str = "AGENT_PORT";
pub const LOG_LEVEL_VAR: &str = "LOG_LEVEL";
/// `json` selects JSON log lines
pub const LOG_FORMAT_VAR: &str = "LOG_FORMAT";
pub const LOG_DIR_VAR: &str = "LOG_DIR";

/// Agent settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Shared bearer secret every authenticated request must present
    pub access_token: SecretString,

    /// Agent identity
    pub identity: String,

    /// Explicit slot root; derived from the identity when unset
    pub apps_root: Option<PathBuf>,

    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Log level
    pub log_level: LogLevel,

    /// Emit JSON log lines
    pub log_json: bool,

    /// Optional directory for rolling log files
    pub log_dir: Option<PathBuf>,
}

fn default_identity() -> String {
    "fleet-agent".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3740
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, AgentError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AgentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let access_token = get(ACCESS_TOKEN_VAR).ok_or_else(|| {
            AgentError::ConfigError(format!(
                "{} must be set to the shared bearer secret",
                ACCESS_TOKEN_VAR
            ))
        })?;

        let port = match get(AGENT_PORT_VAR) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                AgentError::ConfigError(format!("Invalid {} {:?}: {}", AGENT_PORT_VAR, raw, e))
            })?,
            None => default_port(),
        };

        let log_level = match get(LOG_LEVEL_VAR) {
            Some(raw) => raw.parse::<LogLevel>().map_err(AgentError::ConfigError)?,
            None => LogLevel::default(),
        };

        Ok(Self {
            access_token: SecretString::from(access_token.trim().to_string()),
            identity: get(AGENT_NAME_VAR).unwrap_or_else(default_identity),
            apps_root: get(APPS_ROOT_VAR).map(PathBuf::from),
            host: get(AGENT_HOST_VAR).unwrap_or_else(default_host),
            port,
            log_level,
            log_json: get(LOG_FORMAT_VAR).is_some_and(|f| f.eq_ignore_ascii_case("json")),
            log_dir: get(LOG_DIR_VAR).map(PathBuf::from),
        })
    }

    /// Storage layout for the slots
    pub fn storage_layout(&self) -> StorageLayout {
        match &self.apps_root {
            Some(root) => StorageLayout::new(root),
            None => StorageLayout::for_identity(&self.identity),
        }
    }
}
