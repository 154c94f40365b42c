// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Injectable time source.
//!
//! Everything that stamps or compares time (`enqueued_at`, `last_sync_time`,
//! cache `written_at` and expiry) reads it through a [`Clock`] so tests can
//! drive time by hand.
//!
//! # Example
//!
//! ```
//! use ledger_sync::{Clock, ManualClock};
//!
//! let clock = ManualClock::new(1_000);
//! clock.advance_millis(500);
//! assert_eq!(clock.now_millis(), 1_500);
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Source of "now" as epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

/// Hand-driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn set_millis(&self, millis: i64) {
        self.now.store(millis, Ordering::Release);
    }

    pub fn advance_millis(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::AcqRel);
    }

    pub fn advance(&self, by: Duration) {
        self.advance_millis(by.as_millis() as i64);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::Acquire)
    }
}
