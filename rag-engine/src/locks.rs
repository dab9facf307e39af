//! Per-project write serialization.
//!
//! Write operations (reindex, branch update/delete, PR points) on one
//! project collection must not interleave; concurrent reindexes of the
//! same project would race on the alias. The registry hands out one async
//! mutex per project key. State is process-local with process lifetime —
//! a multi-instance deployment needs an external lock with the same
//! contract.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

/// Registry of per-project write locks.
#[derive(Debug, Default)]
pub struct ProjectLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for a project key, creating it on first use.
    pub fn for_project(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().expect("project lock registry poisoned");
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_gets_same_lock() {
        let locks = ProjectLocks::new();
        let a = locks.for_project("w/p");
        let b = locks.for_project("w/p");
        assert!(Arc::ptr_eq(&a, &b));

        let other = locks.for_project("w/q");
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[tokio::test]
    async fn serializes_writers() {
        let locks = ProjectLocks::new();
        let lock = locks.for_project("w/p");

        let guard = lock.lock().await;
        assert!(lock.try_lock().is_err());
        drop(guard);
        assert!(lock.try_lock().is_ok());
    }
}
