//! Server state

use secrecy::{ExposeSecret, SecretString};

use crate::deploy::engine::ApplyEngine;
use crate::server::locks::TargetLocks;
use crate::utils::constant_time_eq;

/// Server state shared across handlers
pub struct ServerState {
    pub engine: ApplyEngine,
    pub locks: TargetLocks,
    access_token: SecretString,
}

impl ServerState {
    pub fn new(engine: ApplyEngine, access_token: SecretString) -> Self {
        Self {
            engine,
            locks: TargetLocks::new(),
            access_token,
        }
    }

    /// Whether a presented credential matches the shared secret
    pub fn token_matches(&self, presented: &str) -> bool {
        constant_time_eq(self.access_token.expose_secret(), presented)
    }
}
