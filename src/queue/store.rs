// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable persistence for the mutation queue.
//!
//! The whole queue is rewritten on every mutation: it is small (a client's
//! offline backlog) and a full snapshot keeps reload trivially consistent.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::storage::traits::{BlobStore, StorageError};
use crate::sync_item::SyncItem;

/// Both lists live under one key so a single `put` moves an item between them.
const SNAPSHOT_KEY: &str = "snapshot";

/// Everything the queue persists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueSnapshot {
    pub pending: Vec<SyncItem>,
    pub dead_letter: Vec<SyncItem>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRef<'a> {
    pending: &'a [SyncItem],
    dead_letter: &'a [SyncItem],
}

#[async_trait]
pub trait PersistentQueueStore: Send + Sync {
    /// Replace the persisted snapshot. Either both lists are written or neither is.
    async fn save(&self, pending: &[SyncItem], dead_letter: &[SyncItem]) -> Result<(), StorageError>;

    /// Load the last snapshot. Missing or malformed data yields an empty list.
    async fn load(&self) -> Result<QueueSnapshot, StorageError>;
}

/// [`PersistentQueueStore`] over any [`BlobStore`], one JSON document per snapshot.
pub struct BlobQueueStore<B: BlobStore + ?Sized> {
    inner: Arc<B>,
}

impl<B: BlobStore + ?Sized> BlobQueueStore<B> {
    pub fn new(inner: Arc<B>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<B: BlobStore + ?Sized> PersistentQueueStore for BlobQueueStore<B> {
    async fn save(&self, pending: &[SyncItem], dead_letter: &[SyncItem]) -> Result<(), StorageError> {
        let blob = serde_json::to_vec(&SnapshotRef { pending, dead_letter })
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.inner.put(SNAPSHOT_KEY, &blob).await
    }

    async fn load(&self) -> Result<QueueSnapshot, StorageError> {
        Ok(match self.inner.get(SNAPSHOT_KEY).await? {
            Some(blob) => decode_snapshot(&blob),
            None => QueueSnapshot::default(),
        })
    }
}

/// Decode a persisted snapshot.
///
/// Non-JSON or non-object data yields an empty snapshot. A list that is
/// missing or not an array is empty; inside an array, entries that don't
/// parse as a [`SyncItem`] are dropped individually.
pub fn decode_snapshot(blob: &[u8]) -> QueueSnapshot {
    let value: Value = match serde_json::from_slice(blob) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Persisted queue is not valid JSON, starting empty");
            return QueueSnapshot::default();
        }
    };

    let Value::Object(mut fields) = value else {
        warn!("Persisted queue is not an object, starting empty");
        return QueueSnapshot::default();
    };

    QueueSnapshot {
        pending: decode_list("pending", fields.remove("pending")),
        dead_letter: decode_list("deadLetter", fields.remove("deadLetter")),
    }
}

fn decode_list(list: &str, value: Option<Value>) -> Vec<SyncItem> {
    let entries = match value {
        Some(Value::Array(entries)) => entries,
        None | Some(Value::Null) => return Vec::new(),
        Some(_) => {
            warn!(list, "Persisted queue list is not an array, starting it empty");
            return Vec::new();
        }
    };

    let total = entries.len();
    let items: Vec<SyncItem> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect();

    if items.len() < total {
        warn!(list, dropped = total - items.len(), "Dropped malformed persisted queue entries");
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStore;
    use crate::sync_item::{EntityType, Operation};
    use serde_json::json;

    fn item(amount: i64) -> SyncItem {
        SyncItem::new(
            EntityType::Transaction,
            Operation::Create,
            json!({"amount": amount, "accountId": "a"}),
            3,
            0,
        )
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let blobs = Arc::new(InMemoryStore::new());
        let store = BlobQueueStore::new(blobs.clone());

        let pending = vec![item(1), item(2)];
        let dead = vec![item(3)];
        store.save(&pending, &dead).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.pending, pending);
        assert_eq!(loaded.dead_letter, dead);
    }

    #[tokio::test]
    async fn test_load_empty_store() {
        let store = BlobQueueStore::new(Arc::new(InMemoryStore::new()));
        assert_eq!(store.load().await.unwrap(), QueueSnapshot::default());
    }

    #[tokio::test]
    async fn test_snapshot_is_a_single_key() {
        let blobs = Arc::new(InMemoryStore::new());
        let store = BlobQueueStore::new(blobs.clone());

        store.save(&[item(1)], &[item(2)]).await.unwrap();
        store.save(&[], &[item(1), item(2)]).await.unwrap();

        assert_eq!(blobs.keys().await.unwrap(), vec![SNAPSHOT_KEY.to_string()]);
        let loaded = store.load().await.unwrap();
        assert!(loaded.pending.is_empty());
        assert_eq!(loaded.dead_letter.len(), 2);
    }

    #[tokio::test]
    async fn test_non_object_is_empty() {
        let blobs = Arc::new(InMemoryStore::new());
        blobs.put(SNAPSHOT_KEY, br#"[1, 2, 3]"#).await.unwrap();
        let loaded = BlobQueueStore::new(blobs.clone()).load().await.unwrap();
        assert_eq!(loaded, QueueSnapshot::default());

        blobs.put(SNAPSHOT_KEY, b"\xff\xfe garbage").await.unwrap();
        let loaded = BlobQueueStore::new(blobs).load().await.unwrap();
        assert_eq!(loaded, QueueSnapshot::default());
    }

    #[test]
    fn test_decode_drops_only_bad_entries() {
        let good = item(5);
        let blob = serde_json::to_vec(&json!({
            "pending": [good, {"id": "broken"}, 42],
            "deadLetter": "not a list",
        }))
        .unwrap();

        let snapshot = decode_snapshot(&blob);
        assert_eq!(snapshot.pending, vec![good]);
        assert!(snapshot.dead_letter.is_empty());
    }
}
