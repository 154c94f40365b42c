// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync engine coordinator.
//!
//! The [`SyncEngine`] is the main orchestrator that ties together:
//! - the durable [`MutationQueue`]
//! - the [`RemoteStore`] pending mutations are replayed against
//! - the [`NetworkProbe`] whose online transitions trigger drains
//! - the [`StatusSink`] that hears about per-item outcomes
//!
//! # Lifecycle
//!
//! ```text
//! Created → Loading → Ready → Running → ShuttingDown
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ledger_sync::{
//!     EngineState, InMemoryRemoteStore, NetworkMonitor, NetworkStatus, SyncEngine,
//!     SyncEngineConfig, TracingStatusSink,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let network = Arc::new(NetworkMonitor::new(NetworkStatus::offline()));
//! let engine = SyncEngine::open(
//!     SyncEngineConfig::default(),
//!     Arc::new(InMemoryRemoteStore::new()),
//!     network.clone(),
//!     Arc::new(TracingStatusSink),
//! )
//! .await
//! .expect("in-memory queue");
//!
//! assert_eq!(engine.state(), EngineState::Created);
//! engine.start().await;
//! assert!(engine.is_ready());
//! # }
//! ```

mod types;
mod drain;
mod lifecycle;

pub use types::{BatchResult, DrainOutcome, EngineState, SkipReason};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::SyncEngineConfig;
use crate::network::NetworkProbe;
use crate::queue::{BlobQueueStore, MutationQueue, PersistentQueueStore, RegisterResult};
use crate::remote::RemoteStore;
use crate::status::{StatusSink, SyncStatus};
use crate::storage::memory::InMemoryStore;
use crate::storage::sql::SqliteStore;
use crate::storage::traits::StorageError;
use crate::sync_item::{EntityType, Operation};

/// Namespace of the persisted queue inside a shared SQLite file
pub const QUEUE_NAMESPACE: &str = "queue";

/// Main sync engine coordinator.
///
/// # Thread Safety
///
/// The engine is `Send + Sync`; share it as `Arc<SyncEngine>`. The
/// `is_syncing` flag is the single-flight gate over the drain critical
/// section, and the queue serializes its own mutations.
pub struct SyncEngine {
    pub(super) config: SyncEngineConfig,

    pub(super) queue: Arc<MutationQueue>,

    pub(super) remote: Arc<dyn RemoteStore>,

    pub(super) network: Arc<dyn NetworkProbe>,

    pub(super) sink: Arc<dyn StatusSink>,

    pub(super) clock: Arc<dyn Clock>,

    /// Engine state (broadcast to watchers)
    pub(super) state: watch::Sender<EngineState>,

    /// Derived status, republished after every registration and drain
    pub(super) status_tx: watch::Sender<SyncStatus>,

    /// Single-flight drain gate
    pub(super) is_syncing: AtomicBool,

    /// Epoch millis of the last successful commit
    pub(super) last_sync_time: Mutex<Option<i64>>,

    /// Stops the run loop
    pub(super) shutdown_tx: watch::Sender<bool>,
}

impl SyncEngine {
    /// Create an engine from explicit dependencies.
    ///
    /// The queue is not loaded until [`start()`](Self::start).
    pub fn new(
        config: SyncEngineConfig,
        queue: Arc<MutationQueue>,
        remote: Arc<dyn RemoteStore>,
        network: Arc<dyn NetworkProbe>,
        sink: Arc<dyn StatusSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state, _) = watch::channel(EngineState::Created);
        let (status_tx, _) = watch::channel(SyncStatus {
            is_online: network.is_online(),
            ..Default::default()
        });
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            queue,
            remote,
            network,
            sink,
            clock,
            state,
            status_tx,
            is_syncing: AtomicBool::new(false),
            last_sync_time: Mutex::new(None),
            shutdown_tx,
        }
    }

    /// Create an engine with the wall clock and a queue store chosen by config:
    /// SQLite at `queue_path` when set, otherwise volatile memory.
    pub async fn open(
        config: SyncEngineConfig,
        remote: Arc<dyn RemoteStore>,
        network: Arc<dyn NetworkProbe>,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self, StorageError> {
        let store: Arc<dyn PersistentQueueStore> = match config.queue_path.as_deref() {
            Some(path) => {
                let sqlite = SqliteStore::open(path, QUEUE_NAMESPACE).await?;
                Arc::new(BlobQueueStore::new(Arc::new(sqlite)))
            }
            None => Arc::new(BlobQueueStore::new(Arc::new(InMemoryStore::new()))),
        };

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let queue = Arc::new(MutationQueue::new(store, clock.clone(), config.default_max_retries));
        Ok(Self::new(config, queue, remote, network, sink, clock))
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Turns true on [`shutdown()`](Self::shutdown). Hand it to companion
    /// tasks such as [`CacheStore::open_with_cleanup`](crate::CacheStore::open_with_cleanup).
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.state(), EngineState::Ready | EngineState::Running)
    }

    #[must_use]
    pub fn config(&self) -> &SyncEngineConfig {
        &self.config
    }

    /// The underlying queue, for operator actions on dead letters.
    #[must_use]
    pub fn queue(&self) -> &Arc<MutationQueue> {
        &self.queue
    }

    /// Current derived status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            is_online: self.network.is_online(),
            pending_items: self.queue.len(),
            last_sync_time: *self.last_sync_time.lock(),
            is_syncing: self.is_syncing.load(Ordering::Acquire),
            failed_items: self.queue.failed_items(),
            invalid_items: self.queue.invalid_items(),
        }
    }

    /// Status updates; a fresh snapshot is published after every registration and drain.
    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    pub(super) fn publish_status(&self) {
        let status = self.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    /// Validate and enqueue a mutation.
    ///
    /// When online, a drain is spawned without being awaited; a drain already
    /// in flight may or may not pick the new item up, in which case the next
    /// trigger will.
    #[tracing::instrument(skip(self, payload), fields(entity = %entity_type, operation = %operation))]
    pub async fn register_item(
        self: &Arc<Self>,
        entity_type: EntityType,
        operation: Operation,
        payload: Value,
        max_retries: Option<u32>,
    ) -> RegisterResult {
        let result = self.queue.register_item(entity_type, operation, payload, max_retries).await;
        self.publish_status();

        if result.success && self.network.is_online() {
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                let outcome = engine.drain().await;
                debug!(outcome = outcome.label(), "Post-registration drain finished");
            });
        }
        result
    }

    /// Drain now regardless of connectivity events or the timer.
    ///
    /// Subject to the same guards as every drain: empty queue, offline and an
    /// in-flight drain all make it a no-op.
    pub async fn trigger_manual_sync(&self) -> DrainOutcome {
        debug!("Manual sync requested");
        self.drain().await
    }
}
