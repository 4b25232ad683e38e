use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::content::task::Task;
use crate::storage::JoinStore;

const KEY_PREFIX: &str = "dagrelay";
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Rendezvous barrier for the branches of a task arriving at a join.
///
/// One collection per `(root_uuid, joint_service)` holds one serialized task
/// per arrived branch. The collection is handed out exactly once, to the
/// caller whose retrieve finds it complete, and deleted in the same step.
///
/// Store failures never propagate: they are logged and surface as `None`,
/// which the caller treats the same as "not ready yet".
#[derive(Clone)]
pub struct TaskCoordinator {
    store: Arc<dyn JoinStore>,
    storage_timeout: Duration,
    lock_timeout: Duration,
    lock_wait: Duration,
}

impl TaskCoordinator {
    pub fn new(store: Arc<dyn JoinStore>) -> Self {
        Self {
            store,
            storage_timeout: Duration::from_secs(3600),
            lock_timeout: Duration::from_secs(10),
            lock_wait: Duration::from_secs(10),
        }
    }

    /// TTL of a partially filled join.
    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    /// `timeout` bounds how long a crashed holder keeps the join lock,
    /// `wait` how long a retriever queues for it.
    pub fn with_lock_timeouts(mut self, timeout: Duration, wait: Duration) -> Self {
        self.lock_timeout = timeout;
        self.lock_wait = wait;
        self
    }

    pub fn store(&self) -> &Arc<dyn JoinStore> {
        &self.store
    }

    pub fn joint_service_key(root_uuid: &str, joint_service: &str) -> String {
        format!("{KEY_PREFIX}:joint_service:{root_uuid}:{joint_service}")
    }

    pub fn lock_key(root_uuid: &str, joint_service: &str) -> String {
        format!("{KEY_PREFIX}:lock:{root_uuid}:{joint_service}")
    }

    /// Register `task` at `joint_service` and return how many branches have
    /// arrived so far, this one included.
    pub async fn store_task_data(&self, task: &Task, joint_service: &str) -> Option<usize> {
        let key = Self::joint_service_key(task.root_uuid(), joint_service);
        let payload = match task.serialize() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(task_uuid = task.task_uuid(), error = %e, "Failed to serialize task for join");
                return None;
            }
        };

        match self
            .store
            .store(&key, task.task_uuid(), payload, self.storage_timeout)
            .await
        {
            Ok(count) => {
                debug!(
                    source_id = task.source_id(),
                    task_id = task.task_id(),
                    task_uuid = task.task_uuid(),
                    key = %key,
                    count,
                    "Stored branch at join"
                );
                Some(count)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Join store failed in store task");
                None
            }
        }
    }

    /// Take every branch stored at the join if at least `required_count`
    /// have arrived. `None` when not ready, when the store fails, or when
    /// the retrieved branches do not form a valid join; in the last case the
    /// branches are gone.
    pub async fn retrieve_task_data(
        &self,
        root_uuid: &str,
        joint_service: &str,
        required_count: usize,
    ) -> Option<Vec<Task>> {
        let key = Self::joint_service_key(root_uuid, joint_service);
        let lock = Self::lock_key(root_uuid, joint_service);

        let token = match self.acquire_lock(&lock).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                warn!(lock = %lock, wait = ?self.lock_wait, "Timed out waiting for join lock");
                return None;
            }
            Err(e) => {
                warn!(lock = %lock, error = %e, "Join store failed while locking");
                return None;
            }
        };

        let drained = self.store.drain_if_ready(&key, required_count).await;
        if let Err(e) = self.store.unlock(&lock, &token).await {
            warn!(lock = %lock, error = %e, "Failed to release join lock");
        }

        let entries = match drained {
            Ok(Some(entries)) => entries,
            Ok(None) => {
                debug!(key = %key, required_count, "Join not ready");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Join store failed in retrieve tasks");
                return None;
            }
        };

        let mut tasks = Vec::with_capacity(entries.len());
        for (task_uuid, payload) in entries {
            match Task::deserialize(&payload) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    warn!(key = %key, task_uuid = %task_uuid, error = %e, "Corrupt join entry, join abandoned");
                    return None;
                }
            }
        }
        tasks.sort_by(|a, b| a.past_flow_index().cmp(&b.past_flow_index()));

        let branches: BTreeSet<Option<&str>> = tasks.iter().map(Task::past_flow_index).collect();
        let targets: BTreeSet<&str> = tasks.iter().map(Task::flow_index).collect();
        if branches.len() != required_count || tasks.len() != required_count {
            warn!(
                key = %key,
                required_count,
                arrived = tasks.len(),
                branches = ?branches,
                "Same branch arrived twice at join, join abandoned"
            );
            return None;
        }
        if targets.len() != 1 {
            warn!(key = %key, targets = ?targets, "Join branches disagree on joint service, join abandoned");
            return None;
        }

        debug!(key = %key, count = tasks.len(), "Retrieved join branches");
        Some(tasks)
    }

    async fn acquire_lock(&self, name: &str) -> Result<Option<String>> {
        let deadline = Instant::now() + self.lock_wait;
        loop {
            if let Some(token) = self.store.try_lock(name, self.lock_timeout).await? {
                return Ok(Some(token));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(LOCK_POLL_INTERVAL).await;
        }
    }
}
