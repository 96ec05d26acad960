//! Per-key async mutex table with eager cleanup
//!
//! Used by the resource store to serialize read-then-mutate sequences on one
//! user or one instance while leaving unrelated keys free to proceed.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::Weak;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;

type LockTable<K> = Arc<DashMap<K, Weak<Mutex<()>>>>;

/// Guard for one key. Dropping it releases the key and, when nobody else is
/// waiting, removes the entry from the table.
pub struct KeyedLockGuard<K>
where
    K: Hash + Eq + Clone,
{
    guard: Option<OwnedMutexGuard<()>>,
    mutex: Arc<Mutex<()>>,
    key: K,
    table: LockTable<K>,
}

impl<K> KeyedLockGuard<K>
where
    K: Hash + Eq + Clone,
{
    /// Key this guard is holding.
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K> Drop for KeyedLockGuard<K>
where
    K: Hash + Eq + Clone,
{
    fn drop(&mut self) {
        drop(self.guard.take());

        // The count is re-read under the shard lock: waiters upgrade their
        // handle under that same lock, so an entry someone is about to use
        // never gets removed.
        let mutex = Arc::as_ptr(&self.mutex);
        self.table.remove_if(&self.key, |_, weak| {
            weak.as_ptr() == mutex && weak.strong_count() == 1
        });
    }
}

/// Table of async mutexes addressed by key.
///
/// Operations on the same key run one after another; different keys never
/// contend. Entries are weak so the table only holds keys that are currently
/// locked or awaited.
pub struct KeyedAsyncLock<K>
where
    K: Hash + Eq + Clone,
{
    table: LockTable<K>,
}

impl<K> KeyedAsyncLock<K>
where
    K: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self {
            table: Arc::new(DashMap::new()),
        }
    }

    /// Waits until `key` is free and takes it.
    pub async fn lock(&self, key: &K) -> KeyedLockGuard<K> {
        let mutex = self.mutex_for(key);
        let guard = Arc::clone(&mutex).lock_owned().await;

        KeyedLockGuard {
            guard: Some(guard),
            mutex,
            key: key.clone(),
            table: Arc::clone(&self.table),
        }
    }

    fn mutex_for(&self, key: &K) -> Arc<Mutex<()>> {
        loop {
            match self.table.entry(key.clone()) {
                Entry::Occupied(occupied) => {
                    if let Some(strong) = occupied.get().upgrade() {
                        return strong;
                    }
                    // stale entry left behind by a cancelled waiter
                    occupied.remove();
                }
                Entry::Vacant(vacant) => {
                    let strong = Arc::new(Mutex::new(()));
                    vacant.insert(Arc::downgrade(&strong));
                    return strong;
                }
            }
        }
    }

    /// Number of keys currently locked or awaited.
    pub fn held_keys(&self) -> usize {
        self.table
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }
}

impl<K> Default for KeyedAsyncLock<K>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
