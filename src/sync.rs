//! Per-refund serialization primitives
//!
//! Webhook deliveries and retry attempts for the same refund identifier can
//! arrive near-simultaneously. All read-modify-write sequences on a refund
//! must run under the key's mutex; the optimistic version column on the
//! refund row is the second line of defense across processes.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A mutex keyed by string identifier. Guards are owned, so they can be held
/// across await points for the duration of a read-modify-write sequence.
#[derive(Default)]
pub struct KeyedMutex {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the mutex for `key`, creating it on first use.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let cell = {
            let mut map = self.locks.lock().await;
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        cell.lock_owned().await
    }

    /// Drop lock cells that no task currently holds or awaits. Called
    /// after every sweep pass so the map does not grow with every refund
    /// and account ever touched.
    pub async fn prune(&self) {
        let mut map = self.locks.lock().await;
        map.retain(|_, cell| Arc::strong_count(cell) > 1);
    }

    /// Number of live lock cells
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}
