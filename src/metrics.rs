// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for ledger-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for installing an exporter.
//!
//! # Metric Naming Convention
//! - `ledger_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for sizes
//!
//! # Labels
//! - `entity`: transaction, budget, account, goal
//! - `tier`: fast, durable
//! - `outcome` / `status`: what happened

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════
// QUEUE
// ═══════════════════════════════════════════════════════════════════════════

/// Record an accepted registration
pub fn record_registered(entity: &str) {
    counter!(
        "ledger_sync_items_registered_total",
        "entity" => entity.to_string()
    )
    .increment(1);
}

/// Record a registration rejected by validation
pub fn record_invalid(entity: &str) {
    counter!(
        "ledger_sync_items_invalid_total",
        "entity" => entity.to_string()
    )
    .increment(1);
}

/// Set number of items waiting for replay
pub fn set_pending_items(count: usize) {
    gauge!("ledger_sync_pending_items").set(count as f64);
}

/// Set number of dead-lettered items
pub fn set_dead_letter_items(count: usize) {
    gauge!("ledger_sync_dead_letter_items").set(count as f64);
}

/// Record an individual item failure during drain (`retrying` or `dead_lettered`)
pub fn record_item_failure(entity: &str, outcome: &str) {
    counter!(
        "ledger_sync_item_failures_total",
        "entity" => entity.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a failed queue snapshot write
pub fn record_persist_error(operation: &str) {
    counter!(
        "ledger_sync_persist_errors_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// DRAIN
// ═══════════════════════════════════════════════════════════════════════════

/// Record a drain attempt (`committed`, `commit_failed`, `skipped_empty`, ...)
pub fn record_drain(outcome: &str) {
    counter!(
        "ledger_sync_drains_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record drain wall time
pub fn record_drain_latency(duration: Duration) {
    histogram!("ledger_sync_drain_seconds").record(duration.as_secs_f64());
}

/// Record number of mutations in one committed batch
pub fn record_batch_size(count: usize) {
    histogram!("ledger_sync_batch_size").record(count as f64);
}

/// Record mutations confirmed by the remote store
pub fn record_items_synced(count: usize) {
    counter!("ledger_sync_items_synced_total").increment(count as u64);
}

/// Set connectivity (1 = online, 0 = offline)
pub fn set_network_online(online: bool) {
    gauge!("ledger_sync_network_online").set(if online { 1.0 } else { 0.0 });
}

// ═══════════════════════════════════════════════════════════════════════════
// CACHE
// ═══════════════════════════════════════════════════════════════════════════

/// Record a cache operation (`hit`, `miss`, `expired`, `success`, `error`)
pub fn record_cache_operation(tier: &str, operation: &str, status: &str) {
    counter!(
        "ledger_sync_cache_operations_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record eviction event
pub fn record_eviction(count: usize, bytes: usize) {
    counter!("ledger_sync_cache_evictions_total").increment(count as u64);
    counter!("ledger_sync_cache_evicted_bytes_total").increment(bytes as u64);
}

/// Set live cache size in bytes
pub fn set_cache_bytes(bytes: usize) {
    gauge!("ledger_sync_cache_bytes").set(bytes as f64);
}

/// Set live cache item count
pub fn set_cache_items(count: usize) {
    gauge!("ledger_sync_cache_items").set(count as f64);
}
