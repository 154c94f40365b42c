// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Two-tier read cache with expiry and size-bounded eviction.
//!
//! ```text
//!            put                         get
//!             │                           │
//!     ┌───────┴───────┐           fast ──miss──▶ durable ──hit──▶ promote to fast
//!     ▼               ▼             │                │
//!   fast          durable         expired?  ──yes──▶ remove from both, not found
//! (volatile)   (best effort)
//!             │
//!             ▼
//!          cleanup: drop expired, then evict low → high, oldest first
//!                   until total ≤ target × cap
//! ```
//!
//! A size index (`DashMap`) tracks every live entry so the cap can be
//! enforced without reading blobs back. [`CacheStore::open`] rebuilds it from
//! the durable tier, so entries written before a restart count toward the cap.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ledger_sync::{CacheOptions, CacheStore, ManualClock, SyncEngineConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let clock = Arc::new(ManualClock::new(0));
//! let cache = CacheStore::open(&SyncEngineConfig::default(), clock.clone()).await.unwrap();
//!
//! cache.put("dashboard", &vec![1, 2, 3], CacheOptions::high()).await.unwrap();
//! let hit: Option<Vec<i32>> = cache.get("dashboard").await.unwrap();
//! assert_eq!(hit, Some(vec![1, 2, 3]));
//! # }
//! ```

pub mod options;
pub mod types;

pub use options::{CacheOptions, CachePriority};
pub use types::{CacheError, CacheItem, CacheStats, CacheWrite, CleanupReport};

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::SyncEngineConfig;
use crate::eviction::priority::{CacheEntry, PriorityEvictionPolicy};
use crate::storage::memory::InMemoryStore;
use crate::storage::sql::SqliteStore;
use crate::storage::traits::{BlobStore, StorageError};

/// Namespace of the durable tier inside a shared SQLite file
pub const CACHE_NAMESPACE: &str = "cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Fast,
    Durable,
}

impl Tier {
    fn as_str(self) -> &'static str {
        match self {
            Tier::Fast => "fast",
            Tier::Durable => "durable",
        }
    }
}

enum TierRead {
    Hit(CacheItem<Value>, Vec<u8>),
    Miss,
    Error,
}

#[derive(Debug, Clone, Copy)]
struct EntryMeta {
    size_bytes: usize,
    priority: CachePriority,
    written_at: i64,
    expires_at: i64,
    seq: u64,
}

impl EntryMeta {
    fn from_item(item: &CacheItem<Value>, seq: u64) -> Self {
        Self {
            size_bytes: item.size_bytes,
            priority: item.priority,
            written_at: item.written_at,
            expires_at: item.expires_at(),
            seq,
        }
    }

    fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at
    }
}

pub struct CacheStore {
    fast: Arc<dyn BlobStore>,
    durable: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    max_bytes: usize,
    policy: PriorityEvictionPolicy,
    index: DashMap<String, EntryMeta>,
    total_bytes: AtomicUsize,
    next_seq: AtomicU64,
    /// One cleanup pass at a time
    cleanup_lock: Mutex<()>,
}

impl CacheStore {
    /// Build over explicit tiers. The index starts empty; see [`rebuild_index`](Self::rebuild_index).
    pub fn new(
        fast: Arc<dyn BlobStore>,
        durable: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
        max_bytes: usize,
        eviction_target: f64,
    ) -> Self {
        Self {
            fast,
            durable,
            clock,
            max_bytes,
            policy: PriorityEvictionPolicy::new(eviction_target),
            index: DashMap::new(),
            total_bytes: AtomicUsize::new(0),
            next_seq: AtomicU64::new(0),
            cleanup_lock: Mutex::new(()),
        }
    }

    /// Open with an in-memory fast tier and a durable tier at `cache_path`
    /// (in-memory when unset), then rebuild the index and run a cleanup pass.
    #[tracing::instrument(skip(config, clock))]
    pub async fn open(config: &SyncEngineConfig, clock: Arc<dyn Clock>) -> Result<Self, StorageError> {
        let durable: Arc<dyn BlobStore> = match config.cache_path.as_deref() {
            Some(path) => Arc::new(SqliteStore::open(path, CACHE_NAMESPACE).await?),
            None => {
                debug!("No cache_path configured, durable tier is volatile");
                Arc::new(InMemoryStore::new())
            }
        };

        let cache = Self::new(
            Arc::new(InMemoryStore::new()),
            durable,
            clock,
            config.cache_max_bytes,
            config.cache_eviction_target,
        );
        let loaded = cache.rebuild_index().await;
        let report = cache.cleanup().await;
        info!(
            loaded,
            expired = report.expired,
            evicted = report.evicted,
            total_bytes = cache.total_bytes(),
            max_bytes = cache.max_bytes,
            "Cache opened"
        );
        Ok(cache)
    }

    /// [`open`](Self::open), then run the periodic cleanup every
    /// `cache_cleanup_interval_secs` until `shutdown` turns true (no task when 0).
    pub async fn open_with_cleanup(
        config: &SyncEngineConfig,
        clock: Arc<dyn Clock>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(Arc<Self>, Option<JoinHandle<()>>), StorageError> {
        let cache = Arc::new(Self::open(config, clock).await?);
        let task = match config.cache_cleanup_interval_secs {
            0 => {
                debug!("Periodic cache cleanup disabled");
                None
            }
            secs => Some(cache.spawn_cleanup(Duration::from_secs(secs), shutdown)),
        };
        Ok((cache, task))
    }

    /// Re-read every durable entry into the size index. Unreadable blobs are deleted.
    ///
    /// Returns the number of entries indexed.
    pub async fn rebuild_index(&self) -> usize {
        let keys = match self.durable.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list durable cache tier, index starts empty");
                return 0;
            }
        };

        let mut loaded: Vec<CacheItem<Value>> = Vec::with_capacity(keys.len());
        for key in keys {
            match self.read_tier(Tier::Durable, &key).await {
                TierRead::Hit(item, _) => loaded.push(item),
                TierRead::Miss | TierRead::Error => {}
            }
        }

        // Preserve write order for eviction tie-breaks
        loaded.sort_by(|a, b| a.written_at.cmp(&b.written_at).then_with(|| a.key.cmp(&b.key)));
        let count = loaded.len();
        for item in loaded {
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            self.index_insert(item.key.clone(), EntryMeta::from_item(&item, seq));
        }

        self.publish_gauges();
        count
    }

    /// Write to both tiers and run a cleanup pass.
    ///
    /// Tier failures are captured in the returned [`CacheWrite`]; only a value
    /// that can't be serialized is an error.
    #[tracing::instrument(skip(self, data, options), fields(priority = ?options.priority))]
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        options: CacheOptions,
    ) -> Result<CacheWrite, CacheError> {
        let data = serde_json::to_value(data)?;
        let size_bytes = serde_json::to_vec(&data)?.len();
        let expiry_ms = u64::try_from(options.effective_expiry().as_millis()).unwrap_or(u64::MAX);

        let item = CacheItem {
            key: key.to_string(),
            data,
            written_at: self.clock.now_millis(),
            expiry_ms,
            size_bytes,
            priority: options.priority,
        };
        let blob = serde_json::to_vec(&item)?;

        let fast_ok = self.write_tier(Tier::Fast, key, &blob).await;
        let durable_ok = self.write_tier(Tier::Durable, key, &blob).await;

        if fast_ok || durable_ok {
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            self.index_insert(key.to_string(), EntryMeta::from_item(&item, seq));
        } else {
            self.index_forget(key);
        }

        self.cleanup_with_cap(options.max_size.unwrap_or(self.max_bytes)).await;
        Ok(CacheWrite { size_bytes, fast_ok, durable_ok })
    }

    /// Read through fast then durable tier.
    ///
    /// Expired entries are removed from both tiers and reported as not found.
    /// A tier copy that doesn't match the index (removed, evicted or already
    /// overwritten) is never served or promoted.
    /// `Err` only when the stored data doesn't deserialize as `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let now = self.clock.now_millis();
        let mut tier_error = false;
        let mut stale = false;

        for tier in [Tier::Fast, Tier::Durable] {
            let (item, blob) = match self.read_tier(tier, key).await {
                TierRead::Hit(item, blob) => (item, blob),
                TierRead::Miss => continue,
                TierRead::Error => {
                    tier_error = true;
                    continue;
                }
            };

            if !self.is_current(key, &item) {
                debug!(key, tier = tier.as_str(), "Cache copy not in index, ignoring");
                crate::metrics::record_cache_operation(tier.as_str(), "get", "stale");
                stale = true;
                continue;
            }

            if item.is_expired(now) {
                debug!(key, tier = tier.as_str(), "Cache entry expired");
                crate::metrics::record_cache_operation(tier.as_str(), "get", "expired");
                self.remove(key).await;
                return Ok(None);
            }

            crate::metrics::record_cache_operation(tier.as_str(), "get", "hit");
            if tier == Tier::Durable {
                self.promote(key, &item, &blob).await;
            }
            return serde_json::from_value(item.data).map(Some).map_err(CacheError::from);
        }

        // Nothing readable anywhere: drop a stale index entry unless a tier was down
        if !tier_error && !stale && self.index_forget(key).is_some() {
            self.publish_gauges();
        }
        Ok(None)
    }

    /// Live (present and unexpired) per the index. Never touches the tiers.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now_millis();
        self.index.get(key).is_some_and(|meta| !meta.is_expired(now))
    }

    /// Remove from both tiers. Returns whether the entry was indexed.
    ///
    /// The index entry goes first so a concurrent `get` stops serving and
    /// promoting the key before its tier copies are deleted.
    pub async fn remove(&self, key: &str) -> bool {
        let existed = self.index_forget(key).is_some();
        self.publish_gauges();
        self.delete_tier(Tier::Fast, key).await;
        self.delete_tier(Tier::Durable, key).await;
        existed
    }

    /// Empty both tiers.
    pub async fn clear(&self) {
        for tier in [Tier::Fast, Tier::Durable] {
            if let Err(e) = self.store(tier).clear().await {
                warn!(tier = tier.as_str(), error = %e, "Failed to clear cache tier");
                crate::metrics::record_cache_operation(tier.as_str(), "clear", "error");
            }
        }
        self.index.clear();
        self.total_bytes.store(0, Ordering::Release);
        self.publish_gauges();
        info!("Cache cleared");
    }

    /// Drop expired entries, then evict down to target if over the configured cap.
    pub async fn cleanup(&self) -> CleanupReport {
        self.cleanup_with_cap(self.max_bytes).await
    }

    async fn cleanup_with_cap(&self, cap: usize) -> CleanupReport {
        let _pass = self.cleanup_lock.lock().await;
        let now = self.clock.now_millis();
        let mut report = CleanupReport::default();

        let expired: Vec<String> = self
            .index
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();
        for key in &expired {
            if self.remove(key).await {
                report.expired += 1;
            }
        }

        let total = self.total_bytes();
        if total > cap {
            let entries: Vec<CacheEntry> = self
                .index
                .iter()
                .map(|entry| {
                    let meta = entry.value();
                    CacheEntry {
                        key: entry.key().clone(),
                        size_bytes: meta.size_bytes,
                        priority: meta.priority,
                        written_at: meta.written_at,
                        seq: meta.seq,
                    }
                })
                .collect();

            for key in self.policy.select_victims(&entries, total, cap) {
                let size = self.index.get(&key).map_or(0, |meta| meta.size_bytes);
                if self.remove(&key).await {
                    report.evicted += 1;
                    report.evicted_bytes += size;
                }
            }

            crate::metrics::record_eviction(report.evicted, report.evicted_bytes);
            info!(
                evicted = report.evicted,
                evicted_bytes = report.evicted_bytes,
                total_bytes = self.total_bytes(),
                cap,
                "Cache over cap, evicted entries"
            );
        }

        if report.expired > 0 {
            debug!(expired = report.expired, "Removed expired cache entries");
        }
        report
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now_millis();
        let expired_items = self.index.iter().filter(|entry| entry.value().is_expired(now)).count();
        CacheStats {
            items: self.index.len(),
            total_bytes: self.total_bytes(),
            expired_items,
        }
    }

    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.total_bytes.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Run [`cleanup`](Self::cleanup) every `interval` until `shutdown` turns true.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let period = interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = cache.cleanup().await;
                        debug!(expired = report.expired, evicted = report.evicted, "Periodic cache cleanup");
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Cache cleanup task stopped");
        })
    }

    fn store(&self, tier: Tier) -> &dyn BlobStore {
        match tier {
            Tier::Fast => self.fast.as_ref(),
            Tier::Durable => self.durable.as_ref(),
        }
    }

    async fn read_tier(&self, tier: Tier, key: &str) -> TierRead {
        match self.store(tier).get(key).await {
            Ok(Some(blob)) => match serde_json::from_slice::<CacheItem<Value>>(&blob) {
                Ok(item) => TierRead::Hit(item, blob),
                Err(e) => {
                    warn!(tier = tier.as_str(), key, error = %e, "Corrupt cache entry, removing");
                    crate::metrics::record_cache_operation(tier.as_str(), "get", "corrupt");
                    self.delete_tier(tier, key).await;
                    TierRead::Miss
                }
            },
            Ok(None) => {
                crate::metrics::record_cache_operation(tier.as_str(), "get", "miss");
                TierRead::Miss
            }
            Err(e) => {
                warn!(tier = tier.as_str(), key, error = %e, "Cache tier read failed");
                crate::metrics::record_cache_operation(tier.as_str(), "get", "error");
                TierRead::Error
            }
        }
    }

    async fn write_tier(&self, tier: Tier, key: &str, blob: &[u8]) -> bool {
        match self.store(tier).put(key, blob).await {
            Ok(()) => {
                crate::metrics::record_cache_operation(tier.as_str(), "put", "success");
                true
            }
            Err(e) => {
                warn!(tier = tier.as_str(), key, error = %e, "Cache tier write failed");
                crate::metrics::record_cache_operation(tier.as_str(), "put", "error");
                // An older copy left behind could be served instead of the new value
                self.delete_tier(tier, key).await;
                false
            }
        }
    }

    async fn delete_tier(&self, tier: Tier, key: &str) -> bool {
        match self.store(tier).delete(key).await {
            Ok(()) => true,
            Err(e) => {
                warn!(tier = tier.as_str(), key, error = %e, "Cache tier delete failed");
                crate::metrics::record_cache_operation(tier.as_str(), "delete", "error");
                false
            }
        }
    }

    /// Copy a durable hit into the fast tier.
    async fn promote(&self, key: &str, item: &CacheItem<Value>, blob: &[u8]) {
        if !self.write_tier(Tier::Fast, key, blob).await {
            return;
        }
        // Removed or overwritten while we were writing: don't leave an orphan
        if !self.is_current(key, item) {
            self.delete_tier(Tier::Fast, key).await;
        }
    }

    /// Whether `item` is the version the index currently tracks for `key`.
    fn is_current(&self, key: &str, item: &CacheItem<Value>) -> bool {
        self.index
            .get(key)
            .is_some_and(|meta| meta.written_at == item.written_at && meta.size_bytes == item.size_bytes)
    }

    fn index_insert(&self, key: String, meta: EntryMeta) {
        // Add before subtracting so the total never underflows
        self.total_bytes.fetch_add(meta.size_bytes, Ordering::AcqRel);
        if let Some(old) = self.index.insert(key, meta) {
            self.total_bytes.fetch_sub(old.size_bytes, Ordering::AcqRel);
        }
        self.publish_gauges();
    }

    fn index_forget(&self, key: &str) -> Option<usize> {
        let (_, meta) = self.index.remove(key)?;
        self.total_bytes.fetch_sub(meta.size_bytes, Ordering::AcqRel);
        Some(meta.size_bytes)
    }

    fn publish_gauges(&self) {
        crate::metrics::set_cache_bytes(self.total_bytes());
        crate::metrics::set_cache_items(self.index.len());
    }
}
