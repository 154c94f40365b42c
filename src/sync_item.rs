// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync item data structure.
//!
//! The [`SyncItem`] is the unit of pending work: one create/update/delete of one
//! finance entity, queued while offline and replayed against the remote store.

use std::fmt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of finance entity a mutation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Transaction,
    Budget,
    Account,
    Goal,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Transaction,
        EntityType::Budget,
        EntityType::Account,
        EntityType::Goal,
    ];

    /// Remote collection the entity lives in.
    #[must_use]
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Transaction => "transactions",
            Self::Budget => "budgets",
            Self::Account => "accounts",
            Self::Goal => "goals",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Budget => "budget",
            Self::Account => "account",
            Self::Goal => "goal",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Update => f.write_str("update"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// A queued mutation.
///
/// # Example
///
/// ```
/// use ledger_sync::{SyncItem, EntityType, Operation};
/// use serde_json::json;
///
/// let item = SyncItem::new(
///     EntityType::Transaction,
///     Operation::Create,
///     json!({"amount": 42.5, "accountId": "acc-1"}),
///     3,
///     1_700_000_000_000,
/// );
///
/// assert_eq!(item.retry_count, 0);
/// assert_eq!(item.document_id(), item.id);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncItem {
    /// Client-generated id, fixed at registration and reused on every replay
    pub id: String,
    pub entity_type: EntityType,
    pub operation: Operation,
    /// Opaque entity payload
    pub payload: Value,
    /// Registration timestamp (epoch millis)
    pub enqueued_at: i64,
    /// Individual failures so far; never exceeds `max_retries`
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<Vec<String>>,
    /// Reason recorded by the most recent individual failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SyncItem {
    /// Create a fresh item with a new client id and `retry_count = 0`.
    pub fn new(
        entity_type: EntityType,
        operation: Operation,
        payload: Value,
        max_retries: u32,
        enqueued_at: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_type,
            operation,
            payload,
            enqueued_at,
            retry_count: 0,
            max_retries,
            validation_errors: None,
            last_error: None,
        }
    }

    /// Remote document id the mutation applies to.
    ///
    /// The payload's string `id` wins; otherwise the client id is used, so a
    /// create replayed after a crash overwrites the same document.
    #[must_use]
    pub fn document_id(&self) -> &str {
        self.payload
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.id)
    }

    /// True once the retry budget is spent.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}
