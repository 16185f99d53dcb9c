// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A store wrapper that injects failures on demand.
//!
//! Used to exercise the failure arms that a healthy backend never takes,
//! e.g. the deletion lifecycle's terminal `Failed` state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stamp_core::audit::{AuditLogEntry, DeletionAuditLogEntry};
use stamp_core::types::{ConversationThread, DeletionRequest, QueueItem};
use stamp_core::{
    AuditStore, ConversationStore, DeletionRequestStore, QueueStore, StampError, Store,
};

/// Delegating store with switchable failure injection.
pub struct SabotageStore {
    inner: Arc<dyn Store>,
    fail_delete_all: AtomicBool,
}

impl SabotageStore {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self {
            inner,
            fail_delete_all: AtomicBool::new(false),
        }
    }

    /// Make `delete_all_conversations` fail until turned off again.
    pub fn set_fail_delete_all(&self, fail: bool) {
        self.fail_delete_all.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConversationStore for SabotageStore {
    async fn create_thread(&self, thread: &ConversationThread) -> Result<(), StampError> {
        self.inner.create_thread(thread).await
    }

    async fn get_thread(
        &self,
        identity: &str,
        id: &str,
    ) -> Result<Option<ConversationThread>, StampError> {
        self.inner.get_thread(identity, id).await
    }

    async fn update_thread(&self, thread: &ConversationThread) -> Result<(), StampError> {
        self.inner.update_thread(thread).await
    }

    async fn recent_threads(
        &self,
        identity: &str,
        limit: usize,
    ) -> Result<Vec<ConversationThread>, StampError> {
        self.inner.recent_threads(identity, limit).await
    }

    async fn delete_thread(&self, identity: &str, id: &str) -> Result<(), StampError> {
        self.inner.delete_thread(identity, id).await
    }

    async fn delete_all_conversations(&self, identity: &str) -> Result<u64, StampError> {
        if self.fail_delete_all.load(Ordering::SeqCst) {
            return Err(StampError::Internal(
                "sabotage: delete_all_conversations failing".to_string(),
            ));
        }
        self.inner.delete_all_conversations(identity).await
    }
}

#[async_trait]
impl QueueStore for SabotageStore {
    async fn put_item(&self, item: &QueueItem) -> Result<(), StampError> {
        self.inner.put_item(item).await
    }

    async fn get_item(&self, identity: &str, id: &str) -> Result<Option<QueueItem>, StampError> {
        self.inner.get_item(identity, id).await
    }

    async fn pending_ready(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QueueItem>, StampError> {
        self.inner.pending_ready(now, limit).await
    }

    async fn try_lock_item(
        &self,
        identity: &str,
        id: &str,
        expected_version: i64,
        lease_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StampError> {
        self.inner
            .try_lock_item(identity, id, expected_version, lease_until, now)
            .await
    }

    async fn update_item(&self, item: &QueueItem) -> Result<(), StampError> {
        self.inner.update_item(item).await
    }

    async fn latest_for_identity(
        &self,
        identity: &str,
    ) -> Result<Option<QueueItem>, StampError> {
        self.inner.latest_for_identity(identity).await
    }

    async fn sweep_expired_items(&self, now: DateTime<Utc>) -> Result<u64, StampError> {
        self.inner.sweep_expired_items(now).await
    }
}

#[async_trait]
impl DeletionRequestStore for SabotageStore {
    async fn save_request(&self, request: &DeletionRequest) -> Result<(), StampError> {
        self.inner.save_request(request).await
    }

    async fn update_request(&self, request: &DeletionRequest) -> Result<(), StampError> {
        self.inner.update_request(request).await
    }

    async fn get_request(
        &self,
        identity: &str,
        id: &str,
    ) -> Result<Option<DeletionRequest>, StampError> {
        self.inner.get_request(identity, id).await
    }

    async fn get_request_by_identity(
        &self,
        identity: &str,
    ) -> Result<Option<DeletionRequest>, StampError> {
        self.inner.get_request_by_identity(identity).await
    }

    async fn get_all_pending(&self) -> Result<Vec<DeletionRequest>, StampError> {
        self.inner.get_all_pending().await
    }
}

#[async_trait]
impl AuditStore for SabotageStore {
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), StampError> {
        self.inner.append_audit(entry).await
    }

    async fn audit_entries(
        &self,
        identity: &str,
        date: &str,
    ) -> Result<Vec<AuditLogEntry>, StampError> {
        self.inner.audit_entries(identity, date).await
    }

    async fn append_deletion_audit(
        &self,
        entry: &DeletionAuditLogEntry,
    ) -> Result<(), StampError> {
        self.inner.append_deletion_audit(entry).await
    }

    async fn deletion_audit_entries(
        &self,
        identity: &str,
        date: &str,
    ) -> Result<Vec<DeletionAuditLogEntry>, StampError> {
        self.inner.deletion_audit_entries(identity, date).await
    }
}
