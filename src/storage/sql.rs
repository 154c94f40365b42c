// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite blob store for everything that must survive a restart.
//!
//! One table holds every namespace, so the persisted queue and the durable
//! cache tier can share a single file:
//! ```sql
//! CREATE TABLE kv_blobs (
//!   namespace  TEXT NOT NULL,
//!   key        TEXT NOT NULL,
//!   value      BLOB NOT NULL,
//!   updated_at INTEGER NOT NULL,   -- epoch millis of last write
//!   PRIMARY KEY (namespace, key)
//! )
//! ```

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use sqlx::Row;
use tracing::info;

use super::traits::{BlobStore, StorageError};
use crate::resilience::retry::{retry, RetryConfig};

pub struct SqliteStore {
    pool: SqlitePool,
    namespace: String,
}

impl SqliteStore {
    /// Open (creating if missing) a SQLite file with startup-mode retry.
    pub async fn open(path: &str, namespace: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            // Concurrent readers during writes, single fsync per commit
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = retry("sqlite_connect", &RetryConfig::startup(), || {
            let options = options.clone();
            async move {
                SqlitePoolOptions::new()
                    .max_connections(4)
                    .acquire_timeout(Duration::from_secs(10))
                    .connect_with(options)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))
            }
        })
        .await?;

        info!(path, namespace, "Opened SQLite blob store");
        Self::from_pool(pool, namespace).await
    }

    /// In-memory SQLite database (single connection, dropped with the pool).
    pub async fn open_in_memory(namespace: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Self::from_pool(pool, namespace).await
    }

    async fn from_pool(pool: SqlitePool, namespace: &str) -> Result<Self, StorageError> {
        let store = Self {
            pool,
            namespace: namespace.to_string(),
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Another namespace over the same connection pool.
    #[must_use]
    pub fn with_namespace(&self, namespace: &str) -> Self {
        Self {
            pool: self.pool.clone(),
            namespace: namespace.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let sql = r#"
            CREATE TABLE IF NOT EXISTS kv_blobs (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (namespace, key)
            )
        "#;

        retry("sqlite_init_schema", &RetryConfig::startup(), || async {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        Ok(())
    }

    fn now_millis() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

#[async_trait]
impl BlobStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let row = retry("sqlite_get", &RetryConfig::query(), || async move {
            sqlx::query("SELECT value FROM kv_blobs WHERE namespace = ? AND key = ?")
                .bind(&self.namespace)
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        match row {
            Some(row) => {
                let value: Vec<u8> = row
                    .try_get("value")
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, blob: &[u8]) -> Result<(), StorageError> {
        // Writers contend for the single SQLite write lock (SQLITE_BUSY)
        retry("sqlite_put", &RetryConfig::query(), || async move {
            sqlx::query(
                "INSERT INTO kv_blobs (namespace, key, value, updated_at) VALUES (?, ?, ?, ?) \
                 ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(&self.namespace)
            .bind(key)
            .bind(blob)
            .bind(Self::now_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        retry("sqlite_delete", &RetryConfig::query(), || async move {
            sqlx::query("DELETE FROM kv_blobs WHERE namespace = ? AND key = ?")
                .bind(&self.namespace)
                .bind(key)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query("SELECT key FROM kv_blobs WHERE namespace = ? ORDER BY key")
            .bind(&self.namespace)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("key")
                    .map_err(|e| StorageError::Backend(e.to_string()))
            })
            .collect()
    }

    async fn clear(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM kv_blobs WHERE namespace = ?")
            .bind(&self.namespace)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}
