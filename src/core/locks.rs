//! Keyed async locks.
//!
//! Quota checks, month-duplicate checks and winner assignment all read, decide, then
//! write. Holding the lock for the key they decide on across the whole transaction makes
//! two concurrent requests for the same key run one after the other, so the loser sees
//! the winner's committed row and fails with the domain error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// What a lock serialises on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// Group creation for one owner account
    Owner(i64),
    /// Enrollment, auctions and winner draws within one group
    Group(i64),
    /// Payments of one membership
    Membership(i64),
}

/// Registry of per-key mutexes. Cloning shares the registry.
#[derive(Debug, Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>>,
}

impl KeyedLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and takes the lock for `key`. Released when the guard drops.
    pub async fn lock(&self, key: LockKey) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries nobody holds or waits on can go
            map.retain(|k, m| *k == key || Arc::strong_count(m) > 1);
            Arc::clone(map.entry(key).or_default())
        };
        mutex.lock_owned().await
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = KeyedLocks::new();
        let guard = locks.lock(LockKey::Group(1)).await;

        let waiting = tokio::time::timeout(
            Duration::from_millis(50),
            locks.lock(LockKey::Group(1)),
        )
        .await;
        assert!(waiting.is_err());

        drop(guard);
        let reacquired =
            tokio::time::timeout(Duration::from_millis(50), locks.lock(LockKey::Group(1))).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _owner = locks.lock(LockKey::Owner(1)).await;
        let _group = locks.lock(LockKey::Group(1)).await;
        let _membership = locks.lock(LockKey::Membership(1)).await;
        assert_eq!(locks.tracked(), 3);
    }

    #[tokio::test]
    async fn test_released_keys_are_pruned() {
        let locks = KeyedLocks::new();
        drop(locks.lock(LockKey::Group(1)).await);
        drop(locks.lock(LockKey::Group(2)).await);
        let _held = locks.lock(LockKey::Group(3)).await;
        assert_eq!(locks.tracked(), 1);
    }
}
