// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the sync engine and cache.
//!
//! # Example
//!
//! ```
//! use ledger_sync::SyncEngineConfig;
//!
//! // Minimal config (uses defaults)
//! let config = SyncEngineConfig::default();
//! assert_eq!(config.default_max_retries, 3);
//! assert_eq!(config.cache_max_bytes, 50 * 1024 * 1024); // 50 MB
//!
//! // Durable config
//! let config = SyncEngineConfig {
//!     queue_path: Some("./ledger_queue.db".into()),
//!     cache_path: Some("./ledger_cache.db".into()),
//!     sync_interval_secs: 60,
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

/// Configuration for the sync engine.
///
/// All fields have sensible defaults. Set `queue_path` and `cache_path`
/// so pending work and the durable cache tier survive a restart.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncEngineConfig {
    /// Retry budget applied when `register_item` is called without one
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Periodic drain interval in seconds (0 = disabled)
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// SQLite file holding the persisted mutation queue
    #[serde(default)]
    pub queue_path: Option<String>,

    /// SQLite file holding the durable cache tier
    #[serde(default)]
    pub cache_path: Option<String>,

    /// Cache size cap in bytes (default: 50 MB)
    #[serde(default = "default_cache_max_bytes")]
    pub cache_max_bytes: usize,

    /// Eviction stops once the cache is at or below this fraction of the cap
    #[serde(default = "default_cache_eviction_target")]
    pub cache_eviction_target: f64,

    /// Periodic cache cleanup interval in seconds (0 = disabled)
    #[serde(default = "default_cache_cleanup_interval_secs")]
    pub cache_cleanup_interval_secs: u64,
}

fn default_max_retries() -> u32 { 3 }
fn default_sync_interval_secs() -> u64 { 300 }
fn default_cache_max_bytes() -> usize { 50 * 1024 * 1024 } // 50 MB
fn default_cache_eviction_target() -> f64 { 0.8 }
fn default_cache_cleanup_interval_secs() -> u64 { 3600 }

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            default_max_retries: default_max_retries(),
            sync_interval_secs: default_sync_interval_secs(),
            queue_path: None,
            cache_path: None,
            cache_max_bytes: default_cache_max_bytes(),
            cache_eviction_target: default_cache_eviction_target(),
            cache_cleanup_interval_secs: default_cache_cleanup_interval_secs(),
        }
    }
}
