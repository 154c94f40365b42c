// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;

use super::{BatchHandle, RemoteError, RemoteStore};

type Collections = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Debug, Clone, PartialEq)]
enum StagedWrite {
    Set { collection: String, id: String, payload: Value },
    Update { collection: String, id: String, payload: Value },
    Delete { collection: String, id: String },
}

#[derive(Default)]
struct Inner {
    documents: RwLock<Collections>,
    /// `collection/id` pairs refused at staging time
    rejected: Mutex<HashSet<(String, String)>>,
    fail_commits: AtomicUsize,
    batches_started: AtomicUsize,
    commits: AtomicUsize,
    failed_commits: AtomicUsize,
    sets: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
}

/// In-process [`RemoteStore`] with atomic commit and failure injection.
///
/// Cloning shares the same documents. Op counters only count writes that were
/// actually committed.
#[derive(Clone, Default)]
pub struct InMemoryRemoteStore {
    inner: Arc<Inner>,
}

impl InMemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail as a whole.
    pub fn fail_next_commits(&self, n: usize) {
        self.inner.fail_commits.store(n, Ordering::Release);
    }

    /// Refuse to stage any write to `collection/id` until [`accept_document`](Self::accept_document).
    pub fn reject_document(&self, collection: &str, id: &str) {
        self.inner.rejected.lock().insert((collection.to_string(), id.to_string()));
    }

    pub fn accept_document(&self, collection: &str, id: &str) {
        self.inner.rejected.lock().remove(&(collection.to_string(), id.to_string()));
    }

    #[must_use]
    pub fn document(&self, collection: &str, id: &str) -> Option<Value> {
        self.inner.documents.read().get(collection)?.get(id).cloned()
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.inner.documents.read().get(collection).map_or(0, BTreeMap::len)
    }

    #[must_use]
    pub fn batches_started(&self) -> usize {
        self.inner.batches_started.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn commits(&self) -> usize {
        self.inner.commits.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn failed_commits(&self) -> usize {
        self.inner.failed_commits.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn sets(&self) -> usize {
        self.inner.sets.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn updates(&self) -> usize {
        self.inner.updates.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn deletes(&self) -> usize {
        self.inner.deletes.load(Ordering::Acquire)
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn begin_batch(&self) -> Result<Box<dyn BatchHandle>, RemoteError> {
        self.inner.batches_started.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MemoryBatch {
            inner: Arc::clone(&self.inner),
            staged: Vec::new(),
        }))
    }
}

struct MemoryBatch {
    inner: Arc<Inner>,
    staged: Vec<StagedWrite>,
}

impl MemoryBatch {
    fn check(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        if id.is_empty() {
            return Err(RemoteError::Rejected {
                collection: collection.to_string(),
                id: String::new(),
                reason: "empty document id".to_string(),
            });
        }
        if self.inner.rejected.lock().contains(&(collection.to_string(), id.to_string())) {
            return Err(RemoteError::Rejected {
                collection: collection.to_string(),
                id: id.to_string(),
                reason: "document rejected by remote".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BatchHandle for MemoryBatch {
    fn set(&mut self, collection: &str, id: &str, payload: &Value) -> Result<(), RemoteError> {
        self.check(collection, id)?;
        self.staged.push(StagedWrite::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }

    fn update(&mut self, collection: &str, id: &str, payload: &Value) -> Result<(), RemoteError> {
        self.check(collection, id)?;
        self.staged.push(StagedWrite::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }

    fn delete(&mut self, collection: &str, id: &str) -> Result<(), RemoteError> {
        self.check(collection, id)?;
        self.staged.push(StagedWrite::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        Ok(())
    }

    fn len(&self) -> usize {
        self.staged.len()
    }

    async fn commit(self: Box<Self>) -> Result<(), RemoteError> {
        let inner = &self.inner;

        let injected = inner
            .fail_commits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            inner.failed_commits.fetch_add(1, Ordering::AcqRel);
            return Err(RemoteError::Commit("injected commit failure".to_string()));
        }

        // Single write lock: readers never observe a half-applied batch
        let mut documents = inner.documents.write();
        for write in &self.staged {
            match write {
                StagedWrite::Set { collection, id, payload } => {
                    documents.entry(collection.clone()).or_default().insert(id.clone(), payload.clone());
                    inner.sets.fetch_add(1, Ordering::AcqRel);
                }
                StagedWrite::Update { collection, id, payload } => {
                    let doc = documents
                        .entry(collection.clone())
                        .or_default()
                        .entry(id.clone())
                        .or_insert_with(|| Value::Object(Default::default()));
                    merge_fields(doc, payload);
                    inner.updates.fetch_add(1, Ordering::AcqRel);
                }
                StagedWrite::Delete { collection, id } => {
                    if let Some(docs) = documents.get_mut(collection) {
                        docs.remove(id);
                    }
                    inner.deletes.fetch_add(1, Ordering::AcqRel);
                }
            }
        }
        drop(documents);

        inner.commits.fetch_add(1, Ordering::AcqRel);
        debug!(writes = self.staged.len(), "Remote batch committed");
        Ok(())
    }
}

/// Shallow field merge; last write wins per field.
fn merge_fields(doc: &mut Value, patch: &Value) {
    match (doc, patch) {
        (Value::Object(doc), Value::Object(patch)) => {
            for (k, v) in patch {
                doc.insert(k.clone(), v.clone());
            }
        }
        (doc, patch) => *doc = patch.clone(),
    }
}
