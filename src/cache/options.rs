//! Per-write cache options.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use ledger_sync::{CacheOptions, CachePriority};
//!
//! // Default: normal priority, 24 hour expiry
//! let opts = CacheOptions::default();
//! assert_eq!(opts.effective_expiry(), Duration::from_secs(24 * 60 * 60));
//!
//! // Reference data that should outlive everything else
//! let opts = CacheOptions::high();
//! assert_eq!(opts.effective_expiry(), Duration::from_secs(7 * 24 * 60 * 60));
//!
//! // Custom expiry, evicted first
//! let opts = CacheOptions::low().with_expiry(Duration::from_secs(90));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Eviction priority. Low entries are evicted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePriority {
    High,
    #[default]
    Normal,
    Low,
}

impl CachePriority {
    /// Expiry applied when the write doesn't set one.
    #[must_use]
    pub fn default_expiry(self) -> Duration {
        match self {
            CachePriority::High => Duration::from_secs(7 * 24 * 60 * 60),
            CachePriority::Normal => Duration::from_secs(24 * 60 * 60),
            CachePriority::Low => Duration::from_secs(60 * 60),
        }
    }

    /// Eviction rank, lowest evicted first.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            CachePriority::Low => 0,
            CachePriority::Normal => 1,
            CachePriority::High => 2,
        }
    }
}

/// Options for one [`put`](super::CacheStore::put).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Time to live. `None` uses the priority's default.
    pub expiry: Option<Duration>,

    /// Default: [`CachePriority::Normal`]
    pub priority: CachePriority,

    /// Cap override for the cleanup pass that follows this write.
    ///
    /// Default: `None` (configured cap)
    pub max_size: Option<usize>,
}

impl CacheOptions {
    #[must_use]
    pub fn high() -> Self {
        Self { priority: CachePriority::High, ..Default::default() }
    }

    #[must_use]
    pub fn low() -> Self {
        Self { priority: CachePriority::Low, ..Default::default() }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: CachePriority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }

    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    #[must_use]
    pub fn effective_expiry(&self) -> Duration {
        self.expiry.unwrap_or_else(|| self.priority.default_expiry())
    }
}
