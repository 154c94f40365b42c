// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-item outcome notifications and the aggregate sync status.

use serde::Serialize;
use tracing::{info, warn};

/// Receives per-item outcomes for UI consumption. Push only.
pub trait StatusSink: Send + Sync {
    fn on_item_synced(&self, id: &str);
    fn on_item_failed(&self, id: &str, reason: &str);
}

/// Logs outcomes. Used when the host has no UI sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn on_item_synced(&self, id: &str) {
        info!(id, "Item synced");
    }

    fn on_item_failed(&self, id: &str, reason: &str) {
        warn!(id, reason, "Item failed");
    }
}

/// Derived snapshot of the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_online: bool,
    pub pending_items: usize,
    /// Epoch millis of the last successful commit
    pub last_sync_time: Option<i64>,
    pub is_syncing: bool,
    /// Dead-lettered items
    pub failed_items: usize,
    /// Registrations rejected by validation
    pub invalid_items: u64,
}
