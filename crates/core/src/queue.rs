//! Durable queue of writes that could not reach the server.
//!
//! The in-memory queue is the source of truth; after every change the full
//! queue is re-serialized to the store under [`QUEUE_STORE_KEY`]. Store
//! failures are logged and retried implicitly by the next change.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::cache::now_ms;
use crate::error::LogFailure;
use crate::store::KeyValueStore;
use crate::Error;

/// Store key holding the serialized queue.
pub const QUEUE_STORE_KEY: &str = "karma_offline_queue";

/// Default maximum number of pending actions.
pub const DEFAULT_CAPACITY: usize = 100;

/// Default number of failed sync attempts after which an action is dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A pending write: operation name plus its original payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OfflineAction {
    pub id: String,
    pub action: String,
    pub data: Value,
    pub timestamp: i64,
    pub retry_count: u32,
}

impl OfflineAction {
    pub fn new(action: impl Into<String>, data: Value) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            action: action.into(),
            data,
            timestamp: now_ms(),
            retry_count: 0,
        }
    }
}

/// What a call to [`OfflineQueue::settle`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettleReport {
    /// Actions removed after a successful dispatch.
    pub completed: usize,
    /// Failed actions kept for another attempt.
    pub retained: usize,
    /// Actions removed without success (retry ceiling reached or undeliverable).
    pub dropped: usize,
}

/// Bounded FIFO of [`OfflineAction`]s persisted through a [`KeyValueStore`].
pub struct OfflineQueue<S: KeyValueStore> {
    store: Arc<S>,
    capacity: usize,
    actions: Mutex<VecDeque<OfflineAction>>,
}

impl<S: KeyValueStore> OfflineQueue<S> {
    /// Hydrate the queue from the store.
    ///
    /// A missing entry yields an empty queue; a corrupt one is logged and replaced.
    pub async fn load(store: Arc<S>, capacity: usize) -> Self {
        let actions = match Self::read_persisted(&store).await {
            Ok(actions) => actions,
            Err(error) => {
                tracing::warn!(%error, "failed to load offline queue, starting empty");
                VecDeque::new()
            }
        };

        if !actions.is_empty() {
            tracing::info!(pending = actions.len(), "loaded offline queue");
        }

        Self { store, capacity: capacity.max(1), actions: Mutex::new(actions) }
    }

    async fn read_persisted(store: &S) -> Result<VecDeque<OfflineAction>, Error> {
        match store.get(QUEUE_STORE_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(VecDeque::new()),
        }
    }

    /// Append a new action, evicting the oldest entries when full.
    pub async fn enqueue(&self, action: &str, data: Value) -> OfflineAction {
        let entry = OfflineAction::new(action, data);
        let mut actions = self.actions.lock().await;

        while actions.len() >= self.capacity {
            if let Some(evicted) = actions.pop_front() {
                tracing::warn!(id = %evicted.id, action = %evicted.action, "offline queue full, evicted oldest action");
            }
        }

        actions.push_back(entry.clone());
        tracing::info!(id = %entry.id, action = %entry.action, pending = actions.len(), "queued offline action");
        self.persist_locked(&actions).await;

        entry
    }

    /// Copy of the pending actions, oldest first.
    pub async fn snapshot(&self) -> Vec<OfflineAction> {
        self.actions.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.actions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.actions.lock().await.is_empty()
    }

    /// Apply the results of a drain pass.
    ///
    /// `succeeded` and `dropped` ids are removed. Each `failed` id has its
    /// retry count incremented and is removed once the count reaches
    /// `max_retries`. Unknown ids are ignored, so actions evicted mid-drain and
    /// actions enqueued mid-drain are both handled.
    pub async fn settle(
        &self, succeeded: &[String], failed: &[String], dropped: &[String], max_retries: u32,
    ) -> SettleReport {
        let succeeded: HashSet<&str> = succeeded.iter().map(String::as_str).collect();
        let failed: HashSet<&str> = failed.iter().map(String::as_str).collect();
        let dropped: HashSet<&str> = dropped.iter().map(String::as_str).collect();

        let mut report = SettleReport::default();
        let mut actions = self.actions.lock().await;

        actions.retain_mut(|action| {
            let id = action.id.as_str();
            if succeeded.contains(id) {
                report.completed += 1;
                return false;
            }
            if dropped.contains(id) {
                report.dropped += 1;
                return false;
            }
            if failed.contains(id) {
                action.retry_count += 1;
                if action.retry_count >= max_retries {
                    tracing::warn!(
                        id = %action.id,
                        action = %action.action,
                        retries = action.retry_count,
                        "offline action failed after max retries, dropping"
                    );
                    report.dropped += 1;
                    return false;
                }
                report.retained += 1;
            }
            true
        });

        self.persist_locked(&actions).await;
        report
    }

    /// Remove every pending action.
    pub async fn clear(&self) {
        let mut actions = self.actions.lock().await;
        actions.clear();
        self.persist_locked(&actions).await;
    }

    /// Re-serialize the queue to the store, surfacing failures.
    pub async fn persist(&self) -> Result<(), Error> {
        let actions = self.actions.lock().await;
        self.try_persist(&actions).await
    }

    async fn persist_locked(&self, actions: &VecDeque<OfflineAction>) {
        self.try_persist(actions).await.log_failure("failed to persist offline queue");
    }

    async fn try_persist(&self, actions: &VecDeque<OfflineAction>) -> Result<(), Error> {
        let json = serde_json::to_string(actions)?;
        self.store.set(QUEUE_STORE_KEY, &json).await
    }
}
