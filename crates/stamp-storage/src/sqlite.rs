// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the store contracts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use stamp_config::model::StorageConfig;
use stamp_core::audit::{AuditLogEntry, DeletionAuditLogEntry};
use stamp_core::types::{ConversationThread, DeletionRequest, QueueItem};
use stamp_core::{
    AuditStore, ConversationStore, DeletionRequestStore, QueueStore, StampError,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed store.
///
/// Wraps a [`Database`] handle and delegates all operations to the typed
/// query modules. One instance owns the single writer connection for the
/// whole process.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Open the database at the configured path, running migrations.
    pub async fn open(config: &StorageConfig) -> Result<Self, StampError> {
        let db = Database::open(&config.database_path).await?;
        debug!(path = %config.database_path, "SQLite store initialized");
        Ok(Self { db })
    }

    /// Verify the connection answers queries.
    pub async fn health_check(&self) -> Result<(), StampError> {
        self.db
            .connection()
            .call(|conn| {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)
    }

    /// Checkpoint the WAL and release the connection.
    pub async fn close(&self) -> Result<(), StampError> {
        self.db.close().await
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn create_thread(&self, thread: &ConversationThread) -> Result<(), StampError> {
        queries::threads::create_thread(&self.db, thread).await
    }

    async fn get_thread(
        &self,
        identity: &str,
        id: &str,
    ) -> Result<Option<ConversationThread>, StampError> {
        queries::threads::get_thread(&self.db, identity, id).await
    }

    async fn update_thread(&self, thread: &ConversationThread) -> Result<(), StampError> {
        queries::threads::update_thread(&self.db, thread).await
    }

    async fn recent_threads(
        &self,
        identity: &str,
        limit: usize,
    ) -> Result<Vec<ConversationThread>, StampError> {
        queries::threads::recent_threads(&self.db, identity, limit).await
    }

    async fn delete_thread(&self, identity: &str, id: &str) -> Result<(), StampError> {
        queries::threads::delete_thread(&self.db, identity, id).await
    }

    async fn delete_all_conversations(&self, identity: &str) -> Result<u64, StampError> {
        queries::threads::delete_all_conversations(&self.db, identity).await
    }
}

#[async_trait]
impl QueueStore for SqliteStore {
    async fn put_item(&self, item: &QueueItem) -> Result<(), StampError> {
        queries::queue::put_item(&self.db, item).await
    }

    async fn get_item(&self, identity: &str, id: &str) -> Result<Option<QueueItem>, StampError> {
        queries::queue::get_item(&self.db, identity, id).await
    }

    async fn pending_ready(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QueueItem>, StampError> {
        queries::queue::pending_ready(&self.db, now, limit).await
    }

    async fn try_lock_item(
        &self,
        identity: &str,
        id: &str,
        expected_version: i64,
        lease_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StampError> {
        queries::queue::try_lock_item(&self.db, identity, id, expected_version, lease_until, now)
            .await
    }

    async fn update_item(&self, item: &QueueItem) -> Result<(), StampError> {
        queries::queue::update_item(&self.db, item).await
    }

    async fn latest_for_identity(
        &self,
        identity: &str,
    ) -> Result<Option<QueueItem>, StampError> {
        queries::queue::latest_for_identity(&self.db, identity).await
    }

    async fn sweep_expired_items(&self, now: DateTime<Utc>) -> Result<u64, StampError> {
        queries::queue::sweep_expired_items(&self.db, now).await
    }
}

#[async_trait]
impl DeletionRequestStore for SqliteStore {
    async fn save_request(&self, request: &DeletionRequest) -> Result<(), StampError> {
        queries::deletion::save_request(&self.db, request).await
    }

    async fn update_request(&self, request: &DeletionRequest) -> Result<(), StampError> {
        queries::deletion::update_request(&self.db, request).await
    }

    async fn get_request(
        &self,
        identity: &str,
        id: &str,
    ) -> Result<Option<DeletionRequest>, StampError> {
        queries::deletion::get_request(&self.db, identity, id).await
    }

    async fn get_request_by_identity(
        &self,
        identity: &str,
    ) -> Result<Option<DeletionRequest>, StampError> {
        queries::deletion::get_request_by_identity(&self.db, identity).await
    }

    async fn get_all_pending(&self) -> Result<Vec<DeletionRequest>, StampError> {
        queries::deletion::get_all_pending(&self.db).await
    }
}

#[async_trait]
impl AuditStore for SqliteStore {
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), StampError> {
        queries::audit::append_audit(&self.db, entry).await
    }

    async fn audit_entries(
        &self,
        identity: &str,
        date: &str,
    ) -> Result<Vec<AuditLogEntry>, StampError> {
        queries::audit::audit_entries(&self.db, identity, date).await
    }

    async fn append_deletion_audit(
        &self,
        entry: &DeletionAuditLogEntry,
    ) -> Result<(), StampError> {
        queries::audit::append_deletion_audit(&self.db, entry).await
    }

    async fn deletion_audit_entries(
        &self,
        identity: &str,
        date: &str,
    ) -> Result<Vec<DeletionAuditLogEntry>, StampError> {
        queries::audit::deletion_audit_entries(&self.db, identity, date).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            backend: "sqlite".to_string(),
            database_path: path.to_string(),
        }
    }

    #[tokio::test]
    async fn open_creates_database_at_configured_path() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("open_test.db");
        let store = SqliteStore::open(&make_config(db_path.to_str().unwrap()))
            .await
            .unwrap();
        assert!(db_path.exists(), "database file should be created");
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn health_check_answers() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("health.db");
        let store = SqliteStore::open(&make_config(db_path.to_str().unwrap()))
            .await
            .unwrap();
        store.health_check().await.unwrap();
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn full_thread_lifecycle_through_store() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("lifecycle.db");
        let store = SqliteStore::open(&make_config(db_path.to_str().unwrap()))
            .await
            .unwrap();

        let thread = ConversationThread::new("user-1", "sess-1");
        store.create_thread(&thread).await.unwrap();

        let mut retrieved = store.get_thread("user-1", &thread.id).await.unwrap().unwrap();
        assert_eq!(retrieved.session_id, "sess-1");

        retrieved.state.clocked_in = true;
        retrieved.touch();
        store.update_thread(&retrieved).await.unwrap();

        let recent = store.recent_threads("user-1", 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert!(recent[0].state.clocked_in);

        assert_eq!(store.delete_all_conversations("user-1").await.unwrap(), 1);
        assert!(store.recent_threads("user-1", 10).await.unwrap().is_empty());
        store.close().await.unwrap();
    }
}
