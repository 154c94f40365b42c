// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Key/blob storage used for both cache tiers and the persisted queue.
///
/// Implementations must be safe to share across tasks. Deleting a missing
/// key is not an error.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    async fn put(&self, key: &str, blob: &[u8]) -> Result<(), StorageError>;
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Delete every key. Default implementation walks `keys()`.
    async fn clear(&self) -> Result<(), StorageError> {
        for key in self.keys().await? {
            self.delete(&key).await?;
        }
        Ok(())
    }
}
