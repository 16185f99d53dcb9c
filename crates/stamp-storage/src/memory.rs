// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory implementation of the store contracts.
//!
//! Used for local development and as the contract-test fake. Partitioned
//! by identity via `DashMap`, so cross-identity operations never contend;
//! within a partition the dashmap shard lock serializes writers, which is
//! what makes the version CAS in `try_lock_item` yield exactly one winner.
//!
//! Behavior must stay indistinguishable from [`crate::sqlite::SqliteStore`]
//! for every contract documented on the store traits -- the shared contract
//! suite in stamp-test-utils runs against both.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use stamp_core::audit::{AuditLogEntry, DeletionAuditLogEntry};
use stamp_core::types::{ConversationThread, DeletionRequest, DeletionStatus, QueueItem, QueueStatus};
use stamp_core::{
    AuditStore, ConversationStore, DeletionRequestStore, QueueStore, StampError,
};

/// Everything one identity owns.
#[derive(Default)]
struct Partition {
    threads: BTreeMap<String, ConversationThread>,
    queue: BTreeMap<String, QueueItem>,
    deletions: BTreeMap<String, DeletionRequest>,
    audit: Vec<AuditLogEntry>,
    deletion_audit: Vec<DeletionAuditLogEntry>,
}

/// In-memory store, partitioned by identity.
#[derive(Default)]
pub struct MemoryStore {
    partitions: DashMap<String, Partition>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_thread(&self, thread: &ConversationThread) -> Result<(), StampError> {
        let mut partition = self.partitions.entry(thread.identity.clone()).or_default();
        if partition.threads.contains_key(&thread.id) {
            return Err(StampError::Conflict(format!(
                "thread {} already exists",
                thread.id
            )));
        }
        partition.threads.insert(thread.id.clone(), thread.clone());
        Ok(())
    }

    async fn get_thread(
        &self,
        identity: &str,
        id: &str,
    ) -> Result<Option<ConversationThread>, StampError> {
        Ok(self
            .partitions
            .get(identity)
            .and_then(|p| p.threads.get(id).cloned()))
    }

    async fn update_thread(&self, thread: &ConversationThread) -> Result<(), StampError> {
        let mut partition = self.partitions.entry(thread.identity.clone()).or_default();
        match partition.threads.get_mut(&thread.id) {
            Some(existing) => {
                *existing = thread.clone();
                Ok(())
            }
            // An update never inserts: deleted thread ids stay deleted.
            None => Err(StampError::NotFound {
                entity: "thread",
                id: thread.id.clone(),
            }),
        }
    }

    async fn recent_threads(
        &self,
        identity: &str,
        limit: usize,
    ) -> Result<Vec<ConversationThread>, StampError> {
        let mut threads: Vec<ConversationThread> = self
            .partitions
            .get(identity)
            .map(|p| p.threads.values().cloned().collect())
            .unwrap_or_default();
        threads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        threads.truncate(limit);
        Ok(threads)
    }

    async fn delete_thread(&self, identity: &str, id: &str) -> Result<(), StampError> {
        if let Some(mut partition) = self.partitions.get_mut(identity) {
            partition.threads.remove(id);
        }
        Ok(())
    }

    async fn delete_all_conversations(&self, identity: &str) -> Result<u64, StampError> {
        match self.partitions.get_mut(identity) {
            Some(mut partition) => {
                let count = partition.threads.len() as u64;
                partition.threads.clear();
                Ok(count)
            }
            None => Ok(0),
        }
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn put_item(&self, item: &QueueItem) -> Result<(), StampError> {
        let mut partition = self.partitions.entry(item.identity.clone()).or_default();
        if partition.queue.contains_key(&item.id) {
            return Err(StampError::Conflict(format!(
                "queue item {} already exists",
                item.id
            )));
        }
        partition.queue.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get_item(&self, identity: &str, id: &str) -> Result<Option<QueueItem>, StampError> {
        Ok(self
            .partitions
            .get(identity)
            .and_then(|p| p.queue.get(id).cloned()))
    }

    async fn pending_ready(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QueueItem>, StampError> {
        let mut ready = Vec::new();
        for partition in self.partitions.iter() {
            for item in partition.queue.values() {
                let due_pending = item.status == QueueStatus::Pending
                    && item.next_retry_at.is_some_and(|at| at <= now);
                let expired_lease = item.status == QueueStatus::Processing
                    && item.lock_expires_at.is_some_and(|at| at <= now);
                if due_pending || expired_lease {
                    ready.push(item.clone());
                }
            }
        }
        ready.sort_by_key(|item| item.next_retry_at);
        ready.truncate(limit);
        Ok(ready)
    }

    async fn try_lock_item(
        &self,
        identity: &str,
        id: &str,
        expected_version: i64,
        lease_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StampError> {
        let Some(mut partition) = self.partitions.get_mut(identity) else {
            return Ok(false);
        };
        let Some(item) = partition.queue.get_mut(id) else {
            return Ok(false);
        };

        let lockable = item.status == QueueStatus::Pending
            || (item.status == QueueStatus::Processing
                && item.lock_expires_at.is_some_and(|at| at <= now));
        if item.version != expected_version || !lockable {
            return Ok(false);
        }

        item.status = QueueStatus::Processing;
        item.version += 1;
        item.lock_expires_at = Some(lease_until);
        item.updated_at = now;
        Ok(true)
    }

    async fn update_item(&self, item: &QueueItem) -> Result<(), StampError> {
        let mut partition = self.partitions.entry(item.identity.clone()).or_default();
        match partition.queue.get_mut(&item.id) {
            Some(existing) => {
                *existing = item.clone();
                Ok(())
            }
            None => Err(StampError::NotFound {
                entity: "queue item",
                id: item.id.clone(),
            }),
        }
    }

    async fn latest_for_identity(
        &self,
        identity: &str,
    ) -> Result<Option<QueueItem>, StampError> {
        Ok(self.partitions.get(identity).and_then(|p| {
            p.queue
                .values()
                .max_by_key(|item| item.updated_at)
                .cloned()
        }))
    }

    async fn sweep_expired_items(&self, now: DateTime<Utc>) -> Result<u64, StampError> {
        let mut swept = 0u64;
        for mut partition in self.partitions.iter_mut() {
            let before = partition.queue.len();
            partition
                .queue
                .retain(|_, item| !(item.is_terminal() && item.expires_at <= now));
            swept += (before - partition.queue.len()) as u64;
        }
        Ok(swept)
    }
}

#[async_trait]
impl DeletionRequestStore for MemoryStore {
    async fn save_request(&self, request: &DeletionRequest) -> Result<(), StampError> {
        let mut partition = self.partitions.entry(request.identity.clone()).or_default();
        if partition.deletions.contains_key(&request.id) {
            return Err(StampError::Conflict(format!(
                "deletion request {} already exists",
                request.id
            )));
        }
        partition.deletions.insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn update_request(&self, request: &DeletionRequest) -> Result<(), StampError> {
        let mut partition = self.partitions.entry(request.identity.clone()).or_default();
        match partition.deletions.get_mut(&request.id) {
            Some(existing) => {
                *existing = request.clone();
                Ok(())
            }
            None => Err(StampError::NotFound {
                entity: "deletion request",
                id: request.id.clone(),
            }),
        }
    }

    async fn get_request(
        &self,
        identity: &str,
        id: &str,
    ) -> Result<Option<DeletionRequest>, StampError> {
        Ok(self
            .partitions
            .get(identity)
            .and_then(|p| p.deletions.get(id).cloned()))
    }

    async fn get_request_by_identity(
        &self,
        identity: &str,
    ) -> Result<Option<DeletionRequest>, StampError> {
        Ok(self.partitions.get(identity).and_then(|p| {
            p.deletions
                .values()
                .max_by_key(|r| r.requested_at)
                .cloned()
        }))
    }

    async fn get_all_pending(&self) -> Result<Vec<DeletionRequest>, StampError> {
        let mut pending: Vec<DeletionRequest> = self
            .partitions
            .iter()
            .flat_map(|p| {
                p.deletions
                    .values()
                    .filter(|r| r.status == DeletionStatus::Pending)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        pending.sort_by_key(|r| r.scheduled_deletion_at);
        Ok(pending)
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), StampError> {
        self.partitions
            .entry(entry.identity.clone())
            .or_default()
            .audit
            .push(entry.clone());
        Ok(())
    }

    async fn audit_entries(
        &self,
        identity: &str,
        date: &str,
    ) -> Result<Vec<AuditLogEntry>, StampError> {
        Ok(self
            .partitions
            .get(identity)
            .map(|p| {
                p.audit
                    .iter()
                    .filter(|e| e.date == date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn append_deletion_audit(
        &self,
        entry: &DeletionAuditLogEntry,
    ) -> Result<(), StampError> {
        self.partitions
            .entry(entry.identity.clone())
            .or_default()
            .deletion_audit
            .push(entry.clone());
        Ok(())
    }

    async fn deletion_audit_entries(
        &self,
        identity: &str,
        date: &str,
    ) -> Result<Vec<DeletionAuditLogEntry>, StampError> {
        Ok(self
            .partitions
            .get(identity)
            .map(|p| {
                p.deletion_audit
                    .iter()
                    .filter(|e| e.date == date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stamp_core::types::{ClockAction, DEFAULT_MAX_RETRIES, QUEUE_ITEM_TTL_DAYS};
    use std::sync::Arc;

    fn make_item(identity: &str) -> QueueItem {
        let now = Utc::now();
        QueueItem {
            id: uuid::Uuid::new_v4().to_string(),
            identity: identity.to_string(),
            action: ClockAction::ClockOut,
            target_time: now,
            thread_id: "t1".to_string(),
            message_id: "m1".to_string(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            status: QueueStatus::Pending,
            next_retry_at: Some(now),
            last_error: None,
            last_status_code: None,
            context: BTreeMap::new(),
            version: 0,
            lock_expires_at: None,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::days(QUEUE_ITEM_TTL_DAYS),
        }
    }

    #[tokio::test]
    async fn concurrent_try_lock_yields_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let item = make_item("user-1");
        store.put_item(&item).await.unwrap();

        let now = Utc::now();
        let lease = now + Duration::seconds(30);
        let (a, b) = tokio::join!(
            {
                let store = store.clone();
                let id = item.id.clone();
                async move { store.try_lock_item("user-1", &id, 0, lease, now).await }
            },
            {
                let store = store.clone();
                let id = item.id.clone();
                async move { store.try_lock_item("user-1", &id, 0, lease, now).await }
            }
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(a ^ b, "exactly one of two racing lockers must win (got {a}, {b})");
    }

    #[tokio::test]
    async fn delete_all_then_recent_is_empty() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            store
                .create_thread(&ConversationThread::new("user-1", "sess-1"))
                .await
                .unwrap();
        }
        assert_eq!(store.delete_all_conversations("user-1").await.unwrap(), 3);
        assert!(store.recent_threads("user-1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_thread_does_not_resurrect() {
        let store = MemoryStore::new();
        let mut thread = ConversationThread::new("user-1", "sess-1");
        store.create_thread(&thread).await.unwrap();
        store.delete_all_conversations("user-1").await.unwrap();

        thread.touch();
        let result = store.update_thread(&thread).await;
        assert!(matches!(result, Err(StampError::NotFound { .. })));
        assert!(store.get_thread("user-1", &thread.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pending_ready_reclaims_expired_leases() {
        let store = MemoryStore::new();
        let item = make_item("user-1");
        store.put_item(&item).await.unwrap();

        let now = Utc::now();
        assert!(store
            .try_lock_item("user-1", &item.id, 0, now + Duration::seconds(30), now)
            .await
            .unwrap());

        assert!(store.pending_ready(now, 10).await.unwrap().is_empty());
        let reclaimed = store
            .pending_ready(now + Duration::seconds(31), 10)
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].version, 1);
    }
}
