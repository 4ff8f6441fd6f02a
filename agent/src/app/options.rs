//! Application configuration options

use secrecy::SecretString;

use crate::logs::LogOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Agent application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Server configuration
    pub server: ServerOptions,

    /// Slot storage layout
    pub storage: StorageLayout,

    /// Shared bearer secret
    pub access_token: SecretString,

    /// Logging
    pub logging: LogOptions,
}

impl AppOptions {
    /// Build options from loaded settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            server: ServerOptions {
                host: settings.host.clone(),
                port: settings.port,
            },
            storage: settings.storage_layout(),
            access_token: settings.access_token.clone(),
            logging: LogOptions {
                log_level: settings.log_level.clone(),
                json_format: settings.log_json,
                log_dir: settings.log_dir.clone(),
                ..Default::default()
            },
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3740,
        }
    }
}
