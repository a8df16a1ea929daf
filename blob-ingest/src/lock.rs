use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::BlobKey;

type LockTable = HashMap<BlobKey, Arc<AsyncMutex<()>>>;

/// Async mutual exclusion per blob key.
///
/// Entries are created on first use and removed once the last holder or
/// waiter is gone, so the table only ever contains keys with live uploads.
#[derive(Debug, Clone, Default)]
pub struct KeyedLocks {
    table: Arc<Mutex<LockTable>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn acquire(&self, key: BlobKey) -> KeyGuard {
        let lock = self.table.lock().entry(key.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        KeyGuard {
            guard: Some(guard),
            key,
            table: self.table.clone(),
        }
    }

    /// Keys with a live holder or waiter
    pub fn active(&self) -> usize {
        self.table.lock().len()
    }
}

/// Releases its key on drop
#[derive(Debug)]
pub struct KeyGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: BlobKey,
    table: Arc<Mutex<LockTable>>,
}

impl KeyGuard {
    pub fn key(&self) -> &BlobKey {
        &self.key
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut table = self.table.lock();
        // the table's own reference is the last one
        if table
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = KeyedLocks::new();
        let first = locks.acquire(BlobKey::new("ws", "a")).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(BlobKey::new("ws", "a")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.key(), &BlobKey::new("ws", "a"));
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.acquire(BlobKey::new("ws", "a")).await;
        let _b = tokio::time::timeout(Duration::from_secs(1), locks.acquire(BlobKey::new("ws", "b")))
            .await
            .unwrap();
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn released_keys_are_forgotten() {
        let locks = KeyedLocks::new();
        drop(locks.acquire(BlobKey::new("ws", "a")).await);
        assert_eq!(locks.active(), 0);
    }
}
