//! Chaos Testing for the sync engine and cache
//!
//! This module tests failure scenarios using:
//! 1. **FailingBlobStore wrapper** - precise error injection at specific call counts
//! 2. **Remote failure injection** - whole-batch commit failures, unavailable backend
//! 3. **Data corruption** - garbage data in persisted queue and cache tiers
//! 4. **Network flapping** - rapid connectivity transitions under the run loop
//!
//! # Running Chaos Tests
//! ```bash
//! cargo test --test chaos -- --nocapture
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use ledger_sync::{
    BatchHandle, BlobQueueStore, BlobStore, CacheOptions, CacheStore, DrainOutcome, EngineState,
    EntityType, FailureOutcome, InMemoryRemoteStore, InMemoryStore, ManualClock, MutationQueue,
    NetworkMonitor, NetworkStatus, Operation, RemoteError, RemoteStore, StorageError, SyncEngine,
    SyncEngineConfig, TracingStatusSink,
};

// =============================================================================
// Failing Store Wrapper - Precise Error Injection
// =============================================================================

/// A wrapper that injects failures at specific call counts.
pub struct FailingBlobStore<S: BlobStore> {
    inner: Arc<S>,
    call_count: AtomicU64,
    /// Fail on these call numbers (1-indexed)
    fail_on_calls: Vec<u64>,
    /// Fail every call numbered at or above this (0 = off)
    fail_from: AtomicU64,
    error_msg: String,
}

impl<S: BlobStore> FailingBlobStore<S> {
    pub fn new(inner: Arc<S>, fail_on_calls: Vec<u64>, error_msg: &str) -> Self {
        Self {
            inner,
            call_count: AtomicU64::new(0),
            fail_on_calls,
            fail_from: AtomicU64::new(0),
            error_msg: error_msg.to_string(),
        }
    }

    /// Create a store that fails permanently after N calls
    pub fn fail_after(inner: Arc<S>, n: u64, error_msg: &str) -> Self {
        let store = Self::new(inner, vec![], error_msg);
        store.fail_from.store(n + 1, Ordering::SeqCst);
        store
    }

    /// Stop permanent failure
    pub fn heal(&self) {
        self.fail_from.store(0, Ordering::SeqCst);
    }

    fn should_fail(&self) -> bool {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        let from = self.fail_from.load(Ordering::SeqCst);
        (from != 0 && count >= from) || self.fail_on_calls.contains(&count)
    }

    fn maybe_fail(&self) -> Result<(), StorageError> {
        if self.should_fail() {
            Err(StorageError::Backend(self.error_msg.clone()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<S: BlobStore> BlobStore for FailingBlobStore<S> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.maybe_fail()?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, blob: &[u8]) -> Result<(), StorageError> {
        self.maybe_fail()?;
        self.inner.put(key, blob).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.maybe_fail()?;
        self.inner.delete(key).await
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.maybe_fail()?;
        self.inner.keys().await
    }
}

/// Backend that is never reachable
struct UnreachableRemote;

#[async_trait]
impl RemoteStore for UnreachableRemote {
    async fn begin_batch(&self) -> Result<Box<dyn BatchHandle>, RemoteError> {
        Err(RemoteError::Unavailable("connection refused".into()))
    }
}

fn queue_over<S: BlobStore + 'static>(store: Arc<S>) -> Arc<MutationQueue> {
    Arc::new(MutationQueue::new(
        Arc::new(BlobQueueStore::new(store)),
        Arc::new(ManualClock::new(0)),
        3,
    ))
}

fn engine_with(queue: Arc<MutationQueue>, remote: Arc<dyn RemoteStore>, network: Arc<NetworkMonitor>, config: SyncEngineConfig) -> Arc<SyncEngine> {
    Arc::new(SyncEngine::new(
        config,
        queue,
        remote,
        network,
        Arc::new(TracingStatusSink),
        Arc::new(ManualClock::new(0)),
    ))
}

// =============================================================================
// Queue persistence failures
// =============================================================================

#[tokio::test]
async fn chaos_queue_persist_failure_keeps_memory_authoritative() {
    let blobs = Arc::new(InMemoryStore::new());
    let failing = Arc::new(FailingBlobStore::fail_after(blobs.clone(), 0, "disk full"));
    let queue = queue_over(failing.clone());

    for amount in [1, 2] {
        let result = queue
            .register_item(EntityType::Transaction, Operation::Create, json!({"amount": amount, "accountId": "a"}), None)
            .await;
        assert!(result.success, "persist failure must not fail registration");
    }
    assert_eq!(queue.len(), 2);
    assert!(blobs.is_empty());

    // Next successful persist rewrites the whole snapshot
    failing.heal();
    queue
        .register_item(EntityType::Transaction, Operation::Create, json!({"amount": 3, "accountId": "a"}), None)
        .await;

    let reloaded = queue_over(blobs);
    assert_eq!(reloaded.load().await, 3);
}

#[tokio::test]
async fn chaos_queue_load_failure_starts_empty() {
    let blobs = Arc::new(InMemoryStore::new());
    let seeded = queue_over(blobs.clone());
    seeded
        .register_item(EntityType::Goal, Operation::Delete, json!({"id": "g1"}), None)
        .await;

    // First call (the load's get) fails
    let queue = queue_over(Arc::new(FailingBlobStore::new(blobs, vec![1], "io error")));
    assert_eq!(queue.load().await, 0);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn chaos_failed_persist_during_dead_letter_loses_nothing() {
    let blobs = Arc::new(InMemoryStore::new());
    // Call 1: register persists. Call 2: the dead-letter persist fails.
    let queue = queue_over(Arc::new(FailingBlobStore::new(blobs.clone(), vec![2], "disk full")));
    let id = queue
        .register_item(EntityType::Goal, Operation::Delete, json!({"id": "g1"}), Some(1))
        .await
        .id
        .unwrap();

    assert!(matches!(queue.mark_failed(&id, "denied").await, FailureOutcome::DeadLettered { .. }));

    // Restart now: the last good snapshot still holds the item
    let restarted = queue_over(blobs.clone());
    restarted.load().await;
    let pending = restarted.pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert!(restarted.dead_letters().await.is_empty());

    // The next successful persist carries the move across
    queue
        .register_item(EntityType::Goal, Operation::Delete, json!({"id": "g2"}), None)
        .await;
    let restarted = queue_over(blobs);
    restarted.load().await;
    assert_eq!(restarted.len(), 1);
    let dead = restarted.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, id);
}

#[tokio::test]
async fn chaos_failed_persist_during_requeue_loses_nothing() {
    let blobs = Arc::new(InMemoryStore::new());
    // Calls 1-2: register and dead-letter persist. Call 3: the requeue persist fails.
    let queue = queue_over(Arc::new(FailingBlobStore::new(blobs.clone(), vec![3], "disk full")));
    let id = queue
        .register_item(EntityType::Goal, Operation::Delete, json!({"id": "g1"}), Some(1))
        .await
        .id
        .unwrap();
    queue.mark_failed(&id, "denied").await;

    assert!(queue.requeue_dead_letter(&id).await);

    let restarted = queue_over(blobs);
    restarted.load().await;
    let total = restarted.len() + restarted.failed_items();
    assert_eq!(total, 1);
    assert_eq!(restarted.dead_letters().await[0].id, id);
}

#[tokio::test]
async fn chaos_corrupt_persisted_queue_is_salvaged() {
    let blobs = Arc::new(InMemoryStore::new());
    let seeded = queue_over(blobs.clone());
    seeded
        .register_item(EntityType::Goal, Operation::Delete, json!({"id": "g1"}), None)
        .await;
    let good: serde_json::Value = serde_json::from_slice(&blobs.get("snapshot").await.unwrap().unwrap()).unwrap();

    let mixed = json!({
        "pending": [good["pending"][0], {"entityType": "spaceship"}, "garbage", null],
        "deadLetter": "\u{0} not a list",
    });
    blobs.put("snapshot", &serde_json::to_vec(&mixed).unwrap()).await.unwrap();

    let network = Arc::new(NetworkMonitor::new(NetworkStatus::offline()));
    let engine = engine_with(queue_over(blobs), Arc::new(InMemoryRemoteStore::new()), network, SyncEngineConfig::default());
    engine.start().await;

    assert_eq!(engine.state(), EngineState::Ready);
    let status = engine.status();
    assert_eq!(status.pending_items, 1);
    assert_eq!(status.failed_items, 0);
}

// =============================================================================
// Remote failures
// =============================================================================

#[tokio::test]
async fn chaos_repeated_commit_failures_never_dead_letter() {
    let remote = InMemoryRemoteStore::new();
    let network = Arc::new(NetworkMonitor::new(NetworkStatus::offline()));
    let queue = queue_over(Arc::new(InMemoryStore::new()));
    let engine = engine_with(queue, Arc::new(remote.clone()), network.clone(), SyncEngineConfig::default());

    for amount in 1..=3 {
        engine
            .register_item(EntityType::Transaction, Operation::Create, json!({"amount": amount, "accountId": "a"}), None)
            .await;
    }
    network.set_online(true);
    remote.fail_next_commits(5);

    for _ in 0..5 {
        assert!(matches!(engine.drain().await, DrainOutcome::CommitFailed { staged: 3, .. }));
    }
    let status = engine.status();
    assert_eq!(status.pending_items, 3);
    assert_eq!(status.failed_items, 0);
    assert!(engine.queue().pending().await.iter().all(|i| i.retry_count == 0));

    assert!(matches!(engine.drain().await, DrainOutcome::Committed(_)));
    assert_eq!(remote.count("transactions"), 3);
    assert_eq!(remote.failed_commits(), 5);
}

#[tokio::test]
async fn chaos_unreachable_remote_leaves_queue_untouched() {
    let network = Arc::new(NetworkMonitor::new(NetworkStatus::online()));
    let queue = queue_over(Arc::new(InMemoryStore::new()));
    queue
        .register_item(EntityType::Account, Operation::Create, json!({"name": "Savings"}), None)
        .await;
    let engine = engine_with(queue, Arc::new(UnreachableRemote), network, SyncEngineConfig::default());

    let outcome = engine.drain().await;
    assert!(matches!(
        outcome,
        DrainOutcome::CommitFailed { staged: 0, failed: 0, error: RemoteError::Unavailable(_) }
    ));
    assert_eq!(engine.status().pending_items, 1);
    assert!(!engine.status().is_syncing);
}

// =============================================================================
// Network flapping
// =============================================================================

#[tokio::test]
async fn chaos_network_flapping_syncs_everything_once() {
    let remote = InMemoryRemoteStore::new();
    let network = Arc::new(NetworkMonitor::new(NetworkStatus::offline()));
    let queue = queue_over(Arc::new(InMemoryStore::new()));
    let config = SyncEngineConfig { sync_interval_secs: 1, ..Default::default() };
    let engine = engine_with(queue, Arc::new(remote.clone()), network.clone(), config);
    engine.start().await;
    let handle = engine.spawn();

    let mut registered = 0;
    for round in 0..5 {
        network.set_online(false);
        tokio::time::sleep(Duration::from_millis(5)).await;
        for n in 0..3 {
            let result = engine
                .register_item(
                    EntityType::Transaction,
                    Operation::Create,
                    json!({"amount": round * 10 + n + 1, "accountId": "a"}),
                    None,
                )
                .await;
            assert!(result.success);
            registered += 1;
        }
        network.set_online(true);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.status().pending_items > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue never drained");

    assert_eq!(remote.count("transactions"), registered);
    assert_eq!(remote.sets(), registered);

    engine.shutdown().await;
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

// =============================================================================
// Cache tier failures
// =============================================================================

#[tokio::test]
async fn chaos_fast_tier_down_reads_from_durable() {
    let durable = Arc::new(InMemoryStore::new());
    let fast = Arc::new(FailingBlobStore::fail_after(Arc::new(InMemoryStore::new()), 0, "oom"));
    let cache = CacheStore::new(fast, durable.clone(), Arc::new(ManualClock::new(0)), 4096, 0.8);

    let write = cache.put("report", &json!({"total": 12}), CacheOptions::default()).await.unwrap();
    assert!(!write.fast_ok);
    assert!(write.durable_ok);

    let got: Option<serde_json::Value> = cache.get("report").await.unwrap();
    assert_eq!(got, Some(json!({"total": 12})));
}

#[tokio::test]
async fn chaos_durable_tier_down_degrades_to_memory() {
    let durable = Arc::new(FailingBlobStore::fail_after(Arc::new(InMemoryStore::new()), 0, "readonly fs"));
    let cache = CacheStore::new(
        Arc::new(InMemoryStore::new()),
        durable,
        Arc::new(ManualClock::new(0)),
        4096,
        0.8,
    );

    let write = cache.put("k", &"v", CacheOptions::default()).await.unwrap();
    assert!(write.is_degraded());
    assert_eq!(cache.get::<String>("k").await.unwrap().as_deref(), Some("v"));

    // Both tiers unreadable for a missing key is still a clean miss
    assert!(cache.get::<String>("missing").await.unwrap().is_none());
    assert!(cache.remove("k").await);
}

#[tokio::test]
async fn chaos_corrupt_fast_blob_falls_back_to_durable() {
    let fast = Arc::new(InMemoryStore::new());
    let durable = Arc::new(InMemoryStore::new());
    let cache = CacheStore::new(fast.clone(), durable, Arc::new(ManualClock::new(0)), 4096, 0.8);

    cache.put("k", &7, CacheOptions::default()).await.unwrap();
    fast.put("k", b"{{{{").await.unwrap();

    assert_eq!(cache.get::<i32>("k").await.unwrap(), Some(7));
    // Promotion replaced the corrupt copy
    let repaired = fast.get("k").await.unwrap().unwrap();
    assert!(serde_json::from_slice::<serde_json::Value>(&repaired).is_ok());
}
