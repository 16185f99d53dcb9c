// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence contracts implemented identically by every storage backend.
//!
//! All operations are single-partition: the owner identity is the partition
//! key for threads, queue items, deletion requests, and audit entries.
//! Backends guarantee read-after-write within a partition and nothing more;
//! callers must not depend on any backend-specific consistency behavior.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::{AuditLogEntry, DeletionAuditLogEntry};
use crate::error::StampError;
use crate::types::{ConversationThread, DeletionRequest, QueueItem};

/// Conversation thread persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Insert a new thread. Fails if `(identity, id)` already exists.
    async fn create_thread(&self, thread: &ConversationThread) -> Result<(), StampError>;

    /// Fetch one thread from its identity partition.
    async fn get_thread(
        &self,
        identity: &str,
        id: &str,
    ) -> Result<Option<ConversationThread>, StampError>;

    /// Replace an existing thread document.
    ///
    /// Returns `NotFound` if the thread does not exist -- an update must
    /// never resurrect a deleted thread id. A caller racing the deletion
    /// lifecycle treats `NotFound` as having lost the race.
    async fn update_thread(&self, thread: &ConversationThread) -> Result<(), StampError>;

    /// Most recently updated threads for an identity, newest first.
    async fn recent_threads(
        &self,
        identity: &str,
        limit: usize,
    ) -> Result<Vec<ConversationThread>, StampError>;

    /// Delete a single thread. Deleting a missing thread is a no-op.
    async fn delete_thread(&self, identity: &str, id: &str) -> Result<(), StampError>;

    /// Bulk erasure of every thread an identity owns; returns the count.
    /// Used only by the deletion lifecycle.
    async fn delete_all_conversations(&self, identity: &str) -> Result<u64, StampError>;
}

/// Durable submission queue persistence.
///
/// Column-level notes for implementors: `status`, `retry_count`, `version`,
/// `next_retry_at`, `lock_expires_at`, and `updated_at` are live fields
/// that change under the lock protocol; everything else is written once at
/// enqueue or rewritten wholesale by `update_item`.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert a new queue item.
    async fn put_item(&self, item: &QueueItem) -> Result<(), StampError>;

    /// Fetch one item from its identity partition.
    async fn get_item(&self, identity: &str, id: &str) -> Result<Option<QueueItem>, StampError>;

    /// Items ready for a retry attempt: `pending` with `next_retry_at <= now`,
    /// plus `processing` items whose lock lease has expired (reclaim).
    async fn pending_ready(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QueueItem>, StampError>;

    /// Atomically transition an item to `processing` if and only if its
    /// version still equals `expected_version` and it is lockable
    /// (`pending`, or `processing` with an expired lease). Bumps the
    /// version and sets the lease on success.
    ///
    /// Two concurrent callers racing on the same item get exactly one
    /// `true` and one `false`.
    async fn try_lock_item(
        &self,
        identity: &str,
        id: &str,
        expected_version: i64,
        lease_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StampError>;

    /// Rewrite an item after a retry attempt. The caller holds the lock.
    async fn update_item(&self, item: &QueueItem) -> Result<(), StampError>;

    /// The most recently updated item for an identity, for status reads.
    async fn latest_for_identity(&self, identity: &str)
        -> Result<Option<QueueItem>, StampError>;

    /// Garbage-collect terminal items whose TTL has passed; returns the count.
    async fn sweep_expired_items(&self, now: DateTime<Utc>) -> Result<u64, StampError>;
}

/// Deletion request persistence.
#[async_trait]
pub trait DeletionRequestStore: Send + Sync {
    /// Insert a new deletion request.
    async fn save_request(&self, request: &DeletionRequest) -> Result<(), StampError>;

    /// Replace an existing deletion request document.
    async fn update_request(&self, request: &DeletionRequest) -> Result<(), StampError>;

    /// Fetch one request from its identity partition.
    async fn get_request(
        &self,
        identity: &str,
        id: &str,
    ) -> Result<Option<DeletionRequest>, StampError>;

    /// The most recent request for an identity, regardless of status.
    async fn get_request_by_identity(
        &self,
        identity: &str,
    ) -> Result<Option<DeletionRequest>, StampError>;

    /// All requests currently in `Pending`, across identities.
    async fn get_all_pending(&self) -> Result<Vec<DeletionRequest>, StampError>;
}

/// Append-only audit trails, partitioned by `(identity, date)`.
///
/// The conversation trail and the deletion trail are logically separate
/// and retained independently of each other and of conversation lifetime.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), StampError>;

    /// Entries for one `(identity, date)` partition in append order.
    async fn audit_entries(
        &self,
        identity: &str,
        date: &str,
    ) -> Result<Vec<AuditLogEntry>, StampError>;

    async fn append_deletion_audit(
        &self,
        entry: &DeletionAuditLogEntry,
    ) -> Result<(), StampError>;

    /// Deletion-trail entries for one `(identity, date)` partition in
    /// append order.
    async fn deletion_audit_entries(
        &self,
        identity: &str,
        date: &str,
    ) -> Result<Vec<DeletionAuditLogEntry>, StampError>;
}

/// The full backend contract: one object implementing every store trait.
///
/// The queue deliberately persists through the same backend family as
/// conversations rather than a second ad hoc store.
pub trait Store:
    ConversationStore + QueueStore + DeletionRequestStore + AuditStore + 'static
{
}

impl<T> Store for T where
    T: ConversationStore + QueueStore + DeletionRequestStore + AuditStore + 'static
{
}
