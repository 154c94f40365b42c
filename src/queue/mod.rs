// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable queue of pending mutations.
//!
//! [`MutationQueue`] validates and enqueues mutations, persists the whole
//! queue after every change, and owns retry bookkeeping. Items whose retry
//! budget is spent move to a dead-letter list that survives restarts and is
//! only cleared by an operator.
//!
//! ```text
//! register_item ──validate──▶ pending ──drain ok──▶ removed
//!                    │           │
//!                    ▼           └──individual failure × max_retries──▶ dead_letter
//!                 rejected
//! ```

pub mod store;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::sync_item::{EntityType, Operation, SyncItem};
use crate::validation;

pub use store::{BlobQueueStore, PersistentQueueStore, QueueSnapshot};

/// Outcome of [`MutationQueue::register_item`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterResult {
    pub success: bool,
    pub errors: Vec<String>,
    /// Client id of the queued item (`None` when rejected)
    pub id: Option<String>,
}

impl RegisterResult {
    fn accepted(id: String) -> Self {
        Self { success: true, errors: Vec::new(), id: Some(id) }
    }

    fn rejected(errors: Vec<String>) -> Self {
        Self { success: false, errors, id: None }
    }
}

/// What happened to an item after an individual failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still pending; will be retried on a later drain
    Retrying { retry_count: u32 },
    /// Retry budget spent; moved to dead letters
    DeadLettered { retry_count: u32 },
    /// Not in the pending queue (already removed)
    NotFound,
}

#[derive(Default)]
struct QueueState {
    pending: Vec<SyncItem>,
    dead_letter: Vec<SyncItem>,
}

pub struct MutationQueue {
    state: Mutex<QueueState>,
    store: Arc<dyn PersistentQueueStore>,
    clock: Arc<dyn Clock>,
    default_max_retries: u32,
    /// Mirrors of the list lengths so status reads never wait on the lock
    pending_count: AtomicUsize,
    dead_letter_count: AtomicUsize,
    invalid_items: AtomicU64,
}

impl MutationQueue {
    pub fn new(
        store: Arc<dyn PersistentQueueStore>,
        clock: Arc<dyn Clock>,
        default_max_retries: u32,
    ) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            store,
            clock,
            default_max_retries: default_max_retries.max(1),
            pending_count: AtomicUsize::new(0),
            dead_letter_count: AtomicUsize::new(0),
            invalid_items: AtomicU64::new(0),
        }
    }

    /// Reload persisted work. A store error or unreadable data leaves the queue empty.
    ///
    /// Returns the number of pending items loaded.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self) -> usize {
        let snapshot = match self.store.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Failed to load persisted queue, starting empty");
                QueueSnapshot::default()
            }
        };

        let mut state = self.state.lock().await;
        state.pending = snapshot.pending;
        state.dead_letter = snapshot.dead_letter;
        self.refresh_counts(&state);

        if !state.pending.is_empty() || !state.dead_letter.is_empty() {
            info!(
                pending = state.pending.len(),
                dead_letter = state.dead_letter.len(),
                "Persisted queue loaded, pending items will replay"
            );
        }
        state.pending.len()
    }

    /// Validate and enqueue a mutation.
    ///
    /// `max_retries` falls back to the configured default and is at least 1.
    #[tracing::instrument(skip(self, payload), fields(entity = %entity_type, operation = %operation))]
    pub async fn register_item(
        &self,
        entity_type: EntityType,
        operation: Operation,
        payload: Value,
        max_retries: Option<u32>,
    ) -> RegisterResult {
        let errors = validation::validate(entity_type, operation, &payload);
        if !errors.is_empty() {
            self.invalid_items.fetch_add(1, Ordering::AcqRel);
            crate::metrics::record_invalid(entity_type.as_str());
            debug!(?errors, "Mutation rejected by validation");
            return RegisterResult::rejected(errors);
        }

        let max_retries = max_retries.unwrap_or(self.default_max_retries).max(1);
        let item = SyncItem::new(entity_type, operation, payload, max_retries, self.clock.now_millis());
        let id = item.id.clone();

        let mut state = self.state.lock().await;
        state.pending.push(item);
        self.refresh_counts(&state);
        self.persist(&state, "register").await;
        drop(state);

        crate::metrics::record_registered(entity_type.as_str());
        debug!(id = %id, "Mutation queued");
        RegisterResult::accepted(id)
    }

    /// Copy of the pending items in insertion order.
    pub async fn pending(&self) -> Vec<SyncItem> {
        self.state.lock().await.pending.clone()
    }

    /// Remove successfully replayed items. Returns how many were removed.
    pub async fn remove_items(&self, ids: &[String]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();

        let mut state = self.state.lock().await;
        let before = state.pending.len();
        state.pending.retain(|item| !ids.contains(item.id.as_str()));
        let removed = before - state.pending.len();

        if removed > 0 {
            self.refresh_counts(&state);
            self.persist(&state, "remove").await;
        }
        removed
    }

    /// Record one individual failure for `id`.
    pub async fn mark_failed(&self, id: &str, reason: &str) -> FailureOutcome {
        let failures = [(id.to_string(), reason.to_string())];
        self.mark_failed_many(&failures)
            .await
            .pop()
            .map_or(FailureOutcome::NotFound, |(_, outcome)| outcome)
    }

    /// Record individual failures with a single persist.
    ///
    /// Each listed item gets `retry_count += 1`; items reaching `max_retries`
    /// move to the dead-letter list.
    pub async fn mark_failed_many(&self, failures: &[(String, String)]) -> Vec<(String, FailureOutcome)> {
        if failures.is_empty() {
            return Vec::new();
        }

        let mut state = self.state.lock().await;
        let mut outcomes = Vec::with_capacity(failures.len());

        for (id, reason) in failures {
            let Some(pos) = state.pending.iter().position(|item| &item.id == id) else {
                outcomes.push((id.clone(), FailureOutcome::NotFound));
                continue;
            };

            let item = &mut state.pending[pos];
            item.retry_count = (item.retry_count + 1).min(item.max_retries);
            item.last_error = Some(reason.clone());
            let retry_count = item.retry_count;
            let entity = item.entity_type;

            if item.is_exhausted() {
                let item = state.pending.remove(pos);
                error!(
                    id = %item.id,
                    entity = %entity,
                    retry_count,
                    reason = %reason,
                    "Mutation exhausted its retries, moved to dead letters"
                );
                state.dead_letter.push(item);
                crate::metrics::record_item_failure(entity.as_str(), "dead_lettered");
                outcomes.push((id.clone(), FailureOutcome::DeadLettered { retry_count }));
            } else {
                warn!(id = %id, entity = %entity, retry_count, reason = %reason, "Mutation failed, will retry");
                crate::metrics::record_item_failure(entity.as_str(), "retrying");
                outcomes.push((id.clone(), FailureOutcome::Retrying { retry_count }));
            }
        }

        self.refresh_counts(&state);
        self.persist(&state, "mark_failed").await;
        outcomes
    }

    /// Copy of the dead-letter list.
    pub async fn dead_letters(&self) -> Vec<SyncItem> {
        self.state.lock().await.dead_letter.clone()
    }

    /// Operator action: put a dead-lettered item back with a fresh retry budget.
    pub async fn requeue_dead_letter(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(pos) = state.dead_letter.iter().position(|item| item.id == id) else {
            return false;
        };

        let mut item = state.dead_letter.remove(pos);
        item.retry_count = 0;
        item.last_error = None;
        state.pending.push(item);

        self.refresh_counts(&state);
        self.persist(&state, "requeue").await;
        info!(id, "Dead-lettered mutation requeued");
        true
    }

    /// Operator action: drop every dead-lettered item. Returns how many were dropped.
    pub async fn clear_dead_letters(&self) -> usize {
        let mut state = self.state.lock().await;
        let cleared = state.dead_letter.len();
        if cleared == 0 {
            return 0;
        }
        state.dead_letter.clear();

        self.refresh_counts(&state);
        self.persist(&state, "clear_dead_letters").await;
        info!(cleared, "Dead letters cleared");
        cleared
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending_count.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of dead-lettered items.
    #[must_use]
    pub fn failed_items(&self) -> usize {
        self.dead_letter_count.load(Ordering::Acquire)
    }

    /// Registrations rejected by validation since startup.
    #[must_use]
    pub fn invalid_items(&self) -> u64 {
        self.invalid_items.load(Ordering::Acquire)
    }

    fn refresh_counts(&self, state: &QueueState) {
        self.pending_count.store(state.pending.len(), Ordering::Release);
        self.dead_letter_count.store(state.dead_letter.len(), Ordering::Release);
        crate::metrics::set_pending_items(state.pending.len());
        crate::metrics::set_dead_letter_items(state.dead_letter.len());
    }

    /// Write the snapshot. Failure keeps the in-memory queue authoritative;
    /// the next successful persist rewrites everything.
    async fn persist(&self, state: &QueueState, operation: &str) {
        if let Err(e) = self.store.save(&state.pending, &state.dead_letter).await {
            error!(error = %e, operation, "Failed to persist mutation queue");
            crate::metrics::record_persist_error(operation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::memory::InMemoryStore;
    use serde_json::json;

    fn create_queue(blobs: Arc<InMemoryStore>) -> MutationQueue {
        MutationQueue::new(
            Arc::new(BlobQueueStore::new(blobs)),
            Arc::new(ManualClock::new(1_000)),
            3,
        )
    }

    fn txn(amount: i64) -> Value {
        json!({"amount": amount, "accountId": "acc-1"})
    }

    #[tokio::test]
    async fn test_register_valid_item() {
        let queue = create_queue(Arc::new(InMemoryStore::new()));

        let result = queue.register_item(EntityType::Transaction, Operation::Create, txn(100), None).await;

        assert!(result.success);
        assert!(result.errors.is_empty());
        assert_eq!(queue.len(), 1);

        let pending = queue.pending().await;
        assert_eq!(pending[0].id, result.id.unwrap());
        assert_eq!(pending[0].retry_count, 0);
        assert_eq!(pending[0].max_retries, 3);
        assert_eq!(pending[0].enqueued_at, 1_000);
    }

    #[tokio::test]
    async fn test_register_invalid_item() {
        let queue = create_queue(Arc::new(InMemoryStore::new()));

        let result = queue
            .register_item(EntityType::Transaction, Operation::Create, json!({"accountId": "a"}), None)
            .await;

        assert!(!result.success);
        assert_eq!(result.errors, vec!["amount required"]);
        assert!(result.id.is_none());
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.invalid_items(), 1);
    }

    #[tokio::test]
    async fn test_max_retries_is_at_least_one() {
        let queue = create_queue(Arc::new(InMemoryStore::new()));
        queue.register_item(EntityType::Transaction, Operation::Create, txn(1), Some(0)).await;
        queue.register_item(EntityType::Transaction, Operation::Create, txn(1), Some(7)).await;

        let pending = queue.pending().await;
        assert_eq!(pending[0].max_retries, 1);
        assert_eq!(pending[1].max_retries, 7);
    }

    #[tokio::test]
    async fn test_persisted_queue_reloads() {
        let blobs = Arc::new(InMemoryStore::new());
        let queue = create_queue(blobs.clone());
        queue.register_item(EntityType::Transaction, Operation::Create, txn(1), None).await;
        queue.register_item(EntityType::Transaction, Operation::Create, txn(2), None).await;
        let original = queue.pending().await;

        // Simulated restart: new queue over the same blobs
        let restarted = create_queue(blobs);
        assert_eq!(restarted.load().await, 2);
        assert_eq!(restarted.pending().await, original);
        assert_eq!(restarted.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_persisted_queue_loads_empty() {
        use crate::storage::traits::BlobStore;

        let blobs = Arc::new(InMemoryStore::new());
        blobs.put("snapshot", b"not json at all").await.unwrap();

        let queue = create_queue(blobs);
        assert_eq!(queue.load().await, 0);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_retry_then_dead_letter() {
        let queue = create_queue(Arc::new(InMemoryStore::new()));
        let id = queue
            .register_item(EntityType::Transaction, Operation::Create, txn(5), None)
            .await
            .id
            .unwrap();

        assert_eq!(queue.mark_failed(&id, "boom").await, FailureOutcome::Retrying { retry_count: 1 });
        assert_eq!(queue.mark_failed(&id, "boom").await, FailureOutcome::Retrying { retry_count: 2 });
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pending().await[0].last_error.as_deref(), Some("boom"));

        assert_eq!(queue.mark_failed(&id, "boom").await, FailureOutcome::DeadLettered { retry_count: 3 });
        assert!(queue.is_empty());
        assert_eq!(queue.failed_items(), 1);

        let dead = queue.dead_letters().await;
        assert_eq!(dead[0].id, id);
        assert_eq!(dead[0].retry_count, dead[0].max_retries);

        assert_eq!(queue.mark_failed(&id, "again").await, FailureOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_remove_items() {
        let queue = create_queue(Arc::new(InMemoryStore::new()));
        let a = queue.register_item(EntityType::Transaction, Operation::Create, txn(1), None).await.id.unwrap();
        let b = queue.register_item(EntityType::Transaction, Operation::Create, txn(2), None).await.id.unwrap();

        assert_eq!(queue.remove_items(&[a, "unknown".to_string()]).await, 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pending().await[0].id, b);
        assert_eq!(queue.remove_items(&[]).await, 0);
    }

    #[tokio::test]
    async fn test_requeue_and_clear_dead_letters() {
        let blobs = Arc::new(InMemoryStore::new());
        let queue = create_queue(blobs.clone());
        let a = queue.register_item(EntityType::Goal, Operation::Delete, json!({"id": "g1"}), Some(1)).await.id.unwrap();
        let b = queue.register_item(EntityType::Goal, Operation::Delete, json!({"id": "g2"}), Some(1)).await.id.unwrap();
        queue.mark_failed(&a, "x").await;
        queue.mark_failed(&b, "x").await;
        assert_eq!(queue.failed_items(), 2);

        assert!(queue.requeue_dead_letter(&a).await);
        assert!(!queue.requeue_dead_letter("missing").await);
        let pending = queue.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, 0);
        assert!(pending[0].last_error.is_none());

        // Dead letters survive restart
        let restarted = create_queue(blobs);
        restarted.load().await;
        assert_eq!(restarted.failed_items(), 1);

        assert_eq!(restarted.clear_dead_letters().await, 1);
        assert_eq!(restarted.failed_items(), 0);
        assert_eq!(restarted.clear_dead_letters().await, 0);
    }
}
