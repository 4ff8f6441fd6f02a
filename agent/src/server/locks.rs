//! Per-target locks
//!
//! Operations on the same `(app, tag)` slot run one at a time; operations on
//! different slots never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::deployment::DeploymentTarget;

/// Lock table keyed by deployment target
#[derive(Debug, Default)]
pub struct TargetLocks {
    locks: Mutex<HashMap<DeploymentTarget, Arc<AsyncMutex<()>>>>,
}

impl TargetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a target.
    ///
    /// The returned guard releases the target when dropped. Entries nobody
    /// holds or waits on are pruned here, so the table only grows with the
    /// number of targets in use at the same time.
    pub async fn lock(&self, target: &DeploymentTarget) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(target.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of targets in the table
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
