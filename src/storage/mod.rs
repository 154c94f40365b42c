// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Blob storage backends.
//!
//! - [`memory::InMemoryStore`]: volatile, `DashMap` backed (fast cache tier)
//! - [`sql::SqliteStore`]: durable, SQLite via `sqlx` (queue + durable cache tier)

pub mod traits;
pub mod memory;
pub mod sql;
