//! Keyed async locks with bounded waits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::warn;

use crate::{Result, ShopError};

/// One async mutex per key, created on demand. Entries nobody holds are pruned on the next
/// acquisition.
#[derive(Debug)]
pub struct KeyedLocks {
    scope: &'static str,
    timeout: Duration,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new(scope: &'static str, timeout: Duration) -> Self {
        Self { scope, timeout, locks: Mutex::new(HashMap::new()) }
    }

    /// Waits at most the configured timeout, then fails with a retryable error.
    pub async fn acquire(&self, key: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|k, l| k == key || Arc::strong_count(l) > 1);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                warn!(scope = self.scope, key, timeout_ms = self.timeout.as_millis() as u64, "Lock wait timed out");
                Err(ShopError::ConcurrentModification(format!("{} {key}", self.scope)))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}
