// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Queue drain: stage pending mutations into one remote batch and commit it.
//!
//! ```text
//! guards (empty / offline / in flight)
//!     │
//!     ▼
//! snapshot pending ──▶ group by entity (FIFO within a type)
//!     │
//!     ▼
//! stage each item ──shape error──▶ mark_failed (retry or dead-letter)
//!     │
//!     ▼
//! commit ──ok──▶ remove staged items, last_sync_time, on_item_synced
//!     │
//!     └─err──▶ queue untouched, retried wholesale next trigger
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::queue::FailureOutcome;
use crate::remote::BatchHandle;
use crate::sync_item::{EntityType, Operation, SyncItem};

use super::{BatchResult, DrainOutcome, SkipReason, SyncEngine};

impl SyncEngine {
    /// Attempt to replay every pending mutation.
    ///
    /// Single-flight: a call that finds another drain in progress returns
    /// [`SkipReason::AlreadySyncing`] immediately.
    #[tracing::instrument(skip(self))]
    pub async fn drain(&self) -> DrainOutcome {
        let start = Instant::now();
        let outcome = self.drain_inner().await;

        crate::metrics::record_drain(outcome.label());
        if !outcome.is_skipped() {
            crate::metrics::record_drain_latency(start.elapsed());
        }
        self.publish_status();
        outcome
    }

    async fn drain_inner(&self) -> DrainOutcome {
        if self.queue.is_empty() {
            return DrainOutcome::Skipped(SkipReason::EmptyQueue);
        }
        if !self.network.is_online() {
            debug!("Offline, drain skipped");
            return DrainOutcome::Skipped(SkipReason::Offline);
        }
        if self.is_syncing.swap(true, Ordering::AcqRel) {
            debug!("Drain already in progress");
            return DrainOutcome::Skipped(SkipReason::AlreadySyncing);
        }
        let _guard = SyncingGuard(&self.is_syncing);

        // Items registered from here on wait for the next drain
        let pending = group_by_entity(self.queue.pending().await);
        if pending.is_empty() {
            return DrainOutcome::Skipped(SkipReason::EmptyQueue);
        }
        let total = pending.len();
        // Only announce syncing once there is a batch to send
        self.publish_status();

        let mut batch = match self.remote.begin_batch().await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Failed to open remote batch, queue left unchanged");
                return DrainOutcome::CommitFailed { staged: 0, failed: 0, error: e };
            }
        };

        let mut staged: Vec<String> = Vec::with_capacity(total);
        let mut failures: Vec<(String, String)> = Vec::new();
        for item in &pending {
            match stage(batch.as_mut(), item) {
                Ok(()) => staged.push(item.id.clone()),
                Err(reason) => {
                    debug!(id = %item.id, reason = %reason, "Item failed staging");
                    failures.push((item.id.clone(), reason));
                }
            }
        }
        let failed = failures.len();
        self.record_failures(&failures).await;

        if staged.is_empty() {
            return DrainOutcome::Committed(BatchResult { total, succeeded: 0, failed });
        }

        match batch.commit().await {
            Ok(()) => {
                self.queue.remove_items(&staged).await;
                let now = self.clock.now_millis();
                *self.last_sync_time.lock() = Some(now);

                for id in &staged {
                    self.sink.on_item_synced(id);
                }
                crate::metrics::record_batch_size(staged.len());
                crate::metrics::record_items_synced(staged.len());
                info!(synced = staged.len(), failed, remaining = self.queue.len(), "Drain committed");

                DrainOutcome::Committed(BatchResult { total, succeeded: staged.len(), failed })
            }
            Err(e) => {
                warn!(error = %e, staged = staged.len(), "Batch commit failed, will retry on next trigger");
                DrainOutcome::CommitFailed { staged: staged.len(), failed, error: e }
            }
        }
    }

    /// Bump retry counts; exhausted items are reported to the sink as failed.
    async fn record_failures(&self, failures: &[(String, String)]) {
        if failures.is_empty() {
            return;
        }
        let outcomes = self.queue.mark_failed_many(failures).await;
        for ((id, outcome), (_, reason)) in outcomes.iter().zip(failures) {
            if let FailureOutcome::DeadLettered { .. } = outcome {
                self.sink.on_item_failed(id, reason);
            }
        }
    }
}

/// Clears the single-flight flag on every exit path.
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Stable partition by entity type, types ordered by first appearance.
fn group_by_entity(items: Vec<SyncItem>) -> Vec<SyncItem> {
    let mut order: Vec<EntityType> = Vec::with_capacity(EntityType::ALL.len());
    for item in &items {
        if !order.contains(&item.entity_type) {
            order.push(item.entity_type);
        }
    }

    let mut grouped = Vec::with_capacity(items.len());
    let mut rest = items;
    for entity in order {
        let (matching, others): (Vec<_>, Vec<_>) = rest.into_iter().partition(|i| i.entity_type == entity);
        grouped.extend(matching);
        rest = others;
    }
    grouped
}

/// Pre-commit shape check plus the operation's batch call.
fn stage(batch: &mut dyn BatchHandle, item: &SyncItem) -> Result<(), String> {
    if !item.payload.is_object() {
        return Err("payload must be an object".to_string());
    }
    let collection = item.entity_type.collection();

    let result = match item.operation {
        // Deterministic id: a replayed create overwrites the same document
        Operation::Create => batch.set(collection, item.document_id(), &item.payload),
        Operation::Update => batch.update(collection, explicit_id(item)?, &item.payload),
        Operation::Delete => batch.delete(collection, explicit_id(item)?),
    };
    result.map_err(|e| e.to_string())
}

fn explicit_id(item: &SyncItem) -> Result<&str, String> {
    item.payload
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| format!("{} requires a document id", item.operation))
}
