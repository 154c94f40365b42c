// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote document store abstraction.
//!
//! The engine stages every pending mutation into one [`BatchHandle`] and
//! commits it atomically. Staging is synchronous and may reject a single
//! document; commit is the only remote I/O and is all-or-nothing.
//!
//! # Implementing a backend
//!
//! ```text
//! RemoteStore::begin_batch() ──▶ BatchHandle
//!                                  ├─ set(collection, id, payload)     full overwrite
//!                                  ├─ update(collection, id, payload)  field merge
//!                                  ├─ delete(collection, id)
//!                                  └─ commit()                         atomic apply
//! ```

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use memory::InMemoryRemoteStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// A single document was refused while staging; the rest of the batch is unaffected
    #[error("{collection}/{id} rejected: {reason}")]
    Rejected {
        collection: String,
        id: String,
        reason: String,
    },
    /// The batch as a whole failed to commit; nothing was applied
    #[error("Commit failed: {0}")]
    Commit(String),
    #[error("Remote unavailable: {0}")]
    Unavailable(String),
}

/// One atomic write batch.
#[async_trait]
pub trait BatchHandle: Send {
    /// Create or fully overwrite a document.
    fn set(&mut self, collection: &str, id: &str, payload: &Value) -> Result<(), RemoteError>;

    /// Merge fields into a document.
    fn update(&mut self, collection: &str, id: &str, payload: &Value) -> Result<(), RemoteError>;

    fn delete(&mut self, collection: &str, id: &str) -> Result<(), RemoteError>;

    /// Number of staged writes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply every staged write, or none of them.
    async fn commit(self: Box<Self>) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn begin_batch(&self) -> Result<Box<dyn BatchHandle>, RemoteError>;
}
