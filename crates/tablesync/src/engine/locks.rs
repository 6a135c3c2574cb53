use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Result, RunError};

/// Advisory per-resource locks. At most one convergence run holds a given
/// table at a time; runs on different tables do not contend.
#[derive(Debug, Clone, Default)]
pub struct ResourceLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lock for `resource` without waiting. The lock is held until
    /// the returned guard is dropped.
    pub async fn try_acquire(&self, resource: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(resource.to_string()).or_default().clone()
        };
        lock.try_lock_owned()
            .map_err(|_| RunError::ResourceBusy(resource.to_string()))
    }
}
