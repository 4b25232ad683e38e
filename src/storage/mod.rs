//! Shared key-value store backing the join barrier.

pub mod redis_storage;

pub use redis_storage::RedisJoinStore;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

/// Hash collections with a TTL plus named locks.
///
/// Every method is a single atomic operation against the store; the join
/// barrier is built on top of these in
/// [`TaskCoordinator`](crate::controller::TaskCoordinator).
#[async_trait]
pub trait JoinStore: Send + Sync {
    /// Insert `payload` under `field` of collection `key`, refresh the TTL of
    /// the collection and return its size after the insert.
    async fn store(&self, key: &str, field: &str, payload: String, ttl: Duration) -> Result<usize>;

    /// If `key` holds at least `required` entries, return all of them and
    /// delete the collection in the same step. `None` leaves it untouched.
    async fn drain_if_ready(&self, key: &str, required: usize) -> Result<Option<HashMap<String, String>>>;

    async fn count(&self, key: &str) -> Result<usize>;

    /// Single attempt at a named lock. Returns the owner token on success.
    async fn try_lock(&self, name: &str, ttl: Duration) -> Result<Option<String>>;

    /// Release `name` if it is still held with `token`.
    async fn unlock(&self, name: &str, token: &str) -> Result<()>;
}

// --- In-Memory Implementation ---

struct Collection {
    entries: HashMap<String, String>,
    expires_at: Instant,
}

struct HeldLock {
    token: String,
    expires_at: Instant,
}

/// Process-local [`JoinStore`]. Only useful when every branch of a join
/// reports to the same controller process, e.g. tests and single-node runs.
#[derive(Default)]
pub struct InMemoryJoinStore {
    joins: DashMap<String, Collection>,
    locks: DashMap<String, HeldLock>,
}

impl InMemoryJoinStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JoinStore for InMemoryJoinStore {
    async fn store(&self, key: &str, field: &str, payload: String, ttl: Duration) -> Result<usize> {
        let now = Instant::now();
        let mut collection = self.joins.entry(key.to_string()).or_insert_with(|| Collection {
            entries: HashMap::new(),
            expires_at: now + ttl,
        });
        if collection.expires_at <= now {
            collection.entries.clear();
        }
        collection.entries.insert(field.to_string(), payload);
        collection.expires_at = now + ttl;
        Ok(collection.entries.len())
    }

    async fn drain_if_ready(&self, key: &str, required: usize) -> Result<Option<HashMap<String, String>>> {
        let now = Instant::now();
        // expired collections are dropped as if the TTL had reclaimed them
        self.joins.remove_if(key, |_, c| c.expires_at <= now);
        Ok(self
            .joins
            .remove_if(key, |_, c| c.entries.len() >= required)
            .map(|(_, c)| c.entries))
    }

    async fn count(&self, key: &str) -> Result<usize> {
        let now = Instant::now();
        Ok(self
            .joins
            .get(key)
            .filter(|c| c.expires_at > now)
            .map(|c| c.entries.len())
            .unwrap_or(0))
    }

    async fn try_lock(&self, name: &str, ttl: Duration) -> Result<Option<String>> {
        let now = Instant::now();
        let token = Uuid::new_v4().to_string();
        let lock = HeldLock {
            token: token.clone(),
            expires_at: now + ttl,
        };
        match self.locks.entry(name.to_string()) {
            Entry::Occupied(mut held) => {
                if held.get().expires_at > now {
                    return Ok(None);
                }
                held.insert(lock);
            }
            Entry::Vacant(slot) => {
                slot.insert(lock);
            }
        }
        Ok(Some(token))
    }

    async fn unlock(&self, name: &str, token: &str) -> Result<()> {
        self.locks.remove_if(name, |_, held| held.token == token);
        Ok(())
    }
}
