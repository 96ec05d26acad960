//! Concurrent in-memory resource store
//!
//! All mutable platform state lives here. Single-record reads and writes are
//! atomic through the underlying [`DashMap`] shard locks; multi-step
//! sequences (check quota then insert, check jobs then remove, ...) are
//! serialized through the per-key locks handed out by [`ResourceStore::lock`].

use std::fmt;

use dashmap::DashMap;
use tracing::debug;

use super::error::PlatformError;
use super::error::ResourceKind;
use super::error::Result;
use super::metrics::MetricHistory;
use super::types::Instance;
use super::types::Job;
use super::types::User;
use crate::util::KeyedAsyncLock;
use crate::util::KeyedLockGuard;

/// Keys of the per-resource lock table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// Serializes admission decisions for one user
    User(String),
    /// Serializes status changes and dependent inserts for one instance
    Instance(String),
}

/// Map of one resource kind keyed by resource id
#[derive(Debug)]
pub struct ResourceTable<V> {
    kind: ResourceKind,
    entries: DashMap<String, V>,
}

impl<V: Clone> ResourceTable<V> {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            entries: DashMap::new(),
        }
    }

    fn not_found(&self, id: &str) -> PlatformError {
        PlatformError::NotFound {
            kind: self.kind,
            id: id.to_string(),
        }
    }

    /// Snapshot of the resource
    pub fn get(&self, id: &str) -> Result<V> {
        self.entries
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| self.not_found(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Inserts or replaces the resource stored under `id`
    pub fn put(&self, id: String, value: V) {
        self.entries.insert(id, value);
    }

    /// Removes the resource, returning its last state
    pub fn delete(&self, id: &str) -> Result<V> {
        self.entries
            .remove(id)
            .map(|(_, value)| value)
            .ok_or_else(|| self.not_found(id))
    }

    /// Snapshots of every resource matching `predicate`
    pub fn list(&self, predicate: impl Fn(&V) -> bool) -> Vec<V> {
        self.entries
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Runs `mutation` against the current state while holding the entry's
    /// write lock, so no reader sees a partial update and no concurrent
    /// writer interleaves. The closure must validate before it mutates: an
    /// `Err` is propagated as-is and whatever it already changed stays.
    pub fn compare_and_update<T>(
        &self,
        id: &str,
        mutation: impl FnOnce(&mut V) -> Result<T>,
    ) -> Result<T> {
        let mut entry = self.entries.get_mut(id).ok_or_else(|| self.not_found(id))?;
        mutation(entry.value_mut())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Centralized platform state
pub struct ResourceStore {
    users: DashMap<String, User>,
    pub instances: ResourceTable<Instance>,
    pub jobs: ResourceTable<Job>,
    pub metrics: MetricHistory,
    locks: KeyedAsyncLock<LockKey>,
}

impl fmt::Debug for ResourceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceStore")
            .field("users", &self.users.len())
            .field("instances", &self.instances.len())
            .field("jobs", &self.jobs.len())
            .field("metrics", &self.metrics.len())
            .field("held_locks", &self.locks.held_keys())
            .finish()
    }
}

impl ResourceStore {
    pub fn new(metrics_history_capacity: usize) -> Self {
        Self {
            users: DashMap::new(),
            instances: ResourceTable::new(ResourceKind::Instance),
            jobs: ResourceTable::new(ResourceKind::Job),
            metrics: MetricHistory::new(metrics_history_capacity),
            locks: KeyedAsyncLock::new(),
        }
    }

    /// Registers an account; a later user with the same id replaces it
    pub fn add_user(&self, user: User) {
        debug!(user_id = %user.user_id, username = %user.username, "User registered");
        self.users.insert(user.user_id.clone(), user);
    }

    pub fn user(&self, user_id: &str) -> Option<User> {
        self.users.get(user_id).map(|entry| entry.value().clone())
    }

    pub fn user_by_username(&self, username: &str) -> Option<User> {
        self.users
            .iter()
            .find(|entry| entry.value().username == username)
            .map(|entry| entry.value().clone())
    }

    pub fn user_by_token(&self, token: &str) -> Option<User> {
        self.users
            .iter()
            .find(|entry| entry.value().token == token)
            .map(|entry| entry.value().clone())
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Takes the lock for `key`, waiting for the current holder if any
    pub async fn lock(&self, key: LockKey) -> KeyedLockGuard<LockKey> {
        self.locks.lock(&key).await
    }

    /// Instance snapshot if it exists and belongs to `user_id`
    pub fn owned_instance(&self, id: &str, user_id: &str) -> Result<Instance> {
        match self.instances.get(id) {
            Ok(instance) if instance.is_owned_by(user_id) => Ok(instance),
            _ => Err(PlatformError::instance_not_found(id)),
        }
    }

    /// Job snapshot if it exists and belongs to `user_id`
    pub fn owned_job(&self, id: &str, user_id: &str) -> Result<Job> {
        match self.jobs.get(id) {
            Ok(job) if job.is_owned_by(user_id) => Ok(job),
            _ => Err(PlatformError::job_not_found(id)),
        }
    }

    /// Jobs referencing `instance_id` that have not reached a terminal status
    pub fn active_jobs_on(&self, instance_id: &str) -> Vec<Job> {
        self.jobs
            .list(|job| job.instance_id == instance_id && !job.status.is_terminal())
    }
}
