// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::cmp::Ordering;

use crate::cache::CachePriority;

/// Cache entry metadata for eviction ordering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub size_bytes: usize,
    pub priority: CachePriority,
    /// Epoch millis of the last write
    pub written_at: i64,
    /// Monotonic write sequence, breaks `written_at` ties
    pub seq: u64,
}

impl CacheEntry {
    /// Eviction order: lower priority first, then oldest write, then key.
    pub fn eviction_cmp(&self, other: &Self) -> Ordering {
        self.priority
            .rank()
            .cmp(&other.priority.rank())
            .then(self.written_at.cmp(&other.written_at))
            .then(self.seq.cmp(&other.seq))
            .then_with(|| self.key.cmp(&other.key))
    }
}

/// Size-bounded eviction by priority then age.
///
/// Nothing is evicted while the total is within the cap; once over, entries
/// go in [`CacheEntry::eviction_cmp`] order until the total is at or below
/// `target_ratio × cap`.
#[derive(Debug, Clone, Copy)]
pub struct PriorityEvictionPolicy {
    pub target_ratio: f64,
}

impl Default for PriorityEvictionPolicy {
    fn default() -> Self {
        Self { target_ratio: 0.8 }
    }
}

impl PriorityEvictionPolicy {
    #[must_use]
    pub fn new(target_ratio: f64) -> Self {
        let target_ratio = if target_ratio.is_finite() { target_ratio.clamp(0.0, 1.0) } else { 0.8 };
        Self { target_ratio }
    }

    /// Total size eviction stops at.
    #[must_use]
    pub fn target_bytes(&self, cap: usize) -> usize {
        (cap as f64 * self.target_ratio).floor() as usize
    }

    /// Select victims for eviction (returns keys in eviction order)
    pub fn select_victims(&self, entries: &[CacheEntry], total_bytes: usize, cap: usize) -> Vec<String> {
        if total_bytes <= cap {
            return Vec::new();
        }

        let target = self.target_bytes(cap);
        let mut ordered: Vec<&CacheEntry> = entries.iter().collect();
        ordered.sort_by(|a, b| a.eviction_cmp(b));

        let mut remaining = total_bytes;
        let mut victims = Vec::new();
        for entry in ordered {
            if remaining <= target {
                break;
            }
            remaining = remaining.saturating_sub(entry.size_bytes);
            victims.push(entry.key.clone());
        }
        victims
    }
}
