// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::options::CachePriority;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// Envelope stored in both tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheItem<T> {
    pub key: String,
    pub data: T,
    /// Epoch millis of the write
    pub written_at: i64,
    /// Resolved time to live in milliseconds
    pub expiry_ms: u64,
    /// Serialized length of `data`
    pub size_bytes: usize,
    pub priority: CachePriority,
}

impl<T> CacheItem<T> {
    /// Expired iff `now > written_at + expiry`.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at()
    }

    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.written_at.saturating_add(i64::try_from(self.expiry_ms).unwrap_or(i64::MAX))
    }
}

/// Observability snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub items: usize,
    pub total_bytes: usize,
    /// Entries past expiry that no read or cleanup has removed yet
    pub expired_items: usize,
}

/// Per-tier outcome of a put. Tier failures are logged, never returned as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheWrite {
    pub size_bytes: usize,
    pub fast_ok: bool,
    pub durable_ok: bool,
}

impl CacheWrite {
    /// Stored somewhere
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.fast_ok || self.durable_ok
    }

    /// Stored in memory only; lost on restart
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.fast_ok && !self.durable_ok
    }
}

/// What a cleanup pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub expired: usize,
    pub evicted: usize,
    pub evicted_bytes: usize,
}
