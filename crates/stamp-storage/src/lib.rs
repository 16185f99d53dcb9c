// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence layer for the Stamp assistant.
//!
//! Two interchangeable backends implement the store contracts from
//! stamp-core: [`SqliteStore`] (WAL-mode SQLite with embedded migrations
//! and a single-writer concurrency model via `tokio-rusqlite`) and
//! [`MemoryStore`] (dashmap, partitioned by identity). Backend selection
//! happens in [`make_store`]; everything else in the workspace depends
//! only on the traits.

pub mod database;
pub mod memory;
pub mod migrations;
pub mod queries;
pub mod sqlite;

pub use database::Database;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use stamp_config::model::StorageConfig;
use stamp_core::{StampError, Store};

/// Construct the configured storage backend.
pub async fn make_store(config: &StorageConfig) -> Result<Arc<dyn Store>, StampError> {
    match config.backend.as_str() {
        "sqlite" => Ok(Arc::new(SqliteStore::open(config).await?)),
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(StampError::Config(format!(
            "unknown storage backend `{other}`"
        ))),
    }
}
