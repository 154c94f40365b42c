// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Ledger Sync
//!
//! Offline-first synchronization and caching engine for a personal-finance client.
//!
//! ## Architecture
//!
//! Writes keep flowing while disconnected; reads are served locally:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Registration                           │
//! │  • register_item(): validate per entity type               │
//! │  • Rejected payloads never enter the queue                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     MutationQueue                           │
//! │  • Whole queue persisted after every change                │
//! │  • Bounded retries, persisted dead letters                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        (drain: online transition / timer / manual trigger)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SyncEngine                            │
//! │  • Single-flight drain                                     │
//! │  • Group by entity type, one atomic remote batch           │
//! │  • Commit ok → remove + notify; commit fail → untouched    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                        RemoteStore
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 CacheStore (read path)                      │
//! │  • Fast tier (memory) → durable tier (SQLite)              │
//! │  • Expiry by priority, evict low → high, oldest first      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use ledger_sync::{
//!     DrainOutcome, EntityType, InMemoryRemoteStore, NetworkMonitor, NetworkStatus,
//!     Operation, SyncEngine, SyncEngineConfig, TracingStatusSink,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let network = Arc::new(NetworkMonitor::new(NetworkStatus::offline()));
//! let remote = InMemoryRemoteStore::new();
//!
//! let engine = Arc::new(
//!     SyncEngine::open(
//!         SyncEngineConfig::default(),
//!         Arc::new(remote.clone()),
//!         network.clone(),
//!         Arc::new(TracingStatusSink),
//!     )
//!     .await
//!     .expect("in-memory queue"),
//! );
//! engine.start().await;
//!
//! // Offline: the write is queued
//! let result = engine
//!     .register_item(EntityType::Transaction, Operation::Create, json!({"amount": 100, "accountId": "acc-1"}), None)
//!     .await;
//! assert!(result.success);
//! assert_eq!(engine.status().pending_items, 1);
//!
//! // Back online: replay
//! network.set_online(true);
//! assert!(matches!(engine.drain().await, DrainOutcome::Committed(_)));
//! assert_eq!(remote.count("transactions"), 1);
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: The main [`SyncEngine`] (drain, triggers, lifecycle)
//! - [`queue`]: Durable [`MutationQueue`] with retry bookkeeping
//! - [`cache`]: Two-tier [`CacheStore`]
//! - [`network`]: Connectivity monitoring
//! - [`remote`]: Remote batch abstraction plus an in-memory backend
//! - [`storage`]: Blob stores (memory, SQLite)
//! - [`eviction`]: Priority eviction ordering
//! - [`resilience`]: Retry with backoff

pub mod config;
pub mod clock;
pub mod sync_item;
pub mod validation;
pub mod network;
pub mod storage;
pub mod queue;
pub mod remote;
pub mod status;
pub mod resilience;
pub mod eviction;
pub mod cache;
pub mod coordinator;
pub mod metrics;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use config::SyncEngineConfig;
pub use clock::{Clock, ManualClock, SystemClock};
pub use sync_item::{EntityType, Operation, SyncItem};
pub use network::{ConnectionQuality, NetworkMonitor, NetworkProbe, NetworkStatus, NetworkSubscription};
pub use storage::memory::InMemoryStore;
pub use storage::sql::SqliteStore;
pub use storage::traits::{BlobStore, StorageError};
pub use queue::{
    BlobQueueStore, FailureOutcome, MutationQueue, PersistentQueueStore, QueueSnapshot, RegisterResult,
};
pub use remote::{BatchHandle, InMemoryRemoteStore, RemoteError, RemoteStore};
pub use status::{StatusSink, SyncStatus, TracingStatusSink};
pub use resilience::retry::RetryConfig;
pub use cache::{
    CacheError, CacheItem, CacheOptions, CachePriority, CacheStats, CacheStore, CacheWrite, CleanupReport,
};
pub use coordinator::{BatchResult, DrainOutcome, EngineState, SkipReason, SyncEngine};
