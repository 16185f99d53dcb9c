// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared store contract suite.
//!
//! Every assertion here must hold for EVERY backend -- the suite is what
//! keeps the SQLite and in-memory implementations from drifting apart.
//! Each function uses its own identity namespace so the suite can run
//! against one shared store instance.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};

use stamp_core::audit::{AuditLogEntry, DeletionAuditLogEntry};
use stamp_core::types::{
    ClockAction, ConversationThread, DeletionRequest, DeletionStatus, QueueItem, QueueStatus,
    ThreadMessage, DEFAULT_MAX_RETRIES, QUEUE_ITEM_TTL_DAYS,
};
use stamp_core::{
    AuditStore, ConversationStore, DeletionRequestStore, QueueStore, StampError, Store,
};

/// Build a queue item fixture owned by `identity`.
pub fn make_queue_item(identity: &str) -> QueueItem {
    let now = Utc::now();
    QueueItem {
        id: uuid::Uuid::new_v4().to_string(),
        identity: identity.to_string(),
        action: ClockAction::ClockIn,
        target_time: now,
        thread_id: "thread-1".to_string(),
        message_id: "message-1".to_string(),
        retry_count: 0,
        max_retries: DEFAULT_MAX_RETRIES,
        status: QueueStatus::Pending,
        next_retry_at: Some(now),
        last_error: Some("502 Bad Gateway".to_string()),
        last_status_code: Some(502),
        context: BTreeMap::new(),
        version: 0,
        lock_expires_at: None,
        created_at: now,
        updated_at: now,
        expires_at: now + Duration::days(QUEUE_ITEM_TTL_DAYS),
    }
}

/// Build a thread fixture owned by `identity`.
pub fn make_thread(identity: &str, session_id: &str) -> ConversationThread {
    let mut thread = ConversationThread::new(identity, session_id);
    thread.push_message(ThreadMessage {
        id: uuid::Uuid::new_v4().to_string(),
        role: "user".to_string(),
        content: "clock me in".to_string(),
        created_at: Utc::now(),
    });
    thread
}

/// Run every contract against the given store.
pub async fn run_store_contract(store: Arc<dyn Store>) {
    conversation_contract(store.clone()).await;
    queue_contract(store.clone()).await;
    deletion_request_contract(store.clone()).await;
    audit_contract(store).await;
}

/// Conversation thread contract.
pub async fn conversation_contract(store: Arc<dyn Store>) {
    let identity = "contract-conv";

    // Create, read back, partition isolation.
    let thread = make_thread(identity, "sess-1");
    store.create_thread(&thread).await.unwrap();
    let read = store.get_thread(identity, &thread.id).await.unwrap().unwrap();
    assert_eq!(read, thread, "read-after-write must return the write");
    assert!(
        store.get_thread("contract-other", &thread.id).await.unwrap().is_none(),
        "identity partitions must not leak"
    );

    // Duplicate create conflicts.
    assert!(matches!(
        store.create_thread(&thread).await,
        Err(StampError::Conflict(_))
    ));

    // Update bumps the document.
    let mut updated = read.clone();
    updated.state.clocked_in = true;
    updated.touch();
    store.update_thread(&updated).await.unwrap();
    let read = store.get_thread(identity, &thread.id).await.unwrap().unwrap();
    assert!(read.state.clocked_in);
    assert!(read.updated_at >= thread.updated_at, "updated_at is monotonic");

    // Recent ordering, newest first.
    let mut older = make_thread(identity, "sess-2");
    older.updated_at = Utc::now() - Duration::minutes(30);
    store.create_thread(&older).await.unwrap();
    let recent = store.recent_threads(identity, 10).await.unwrap();
    assert_eq!(recent[0].id, thread.id);
    assert_eq!(recent[1].id, older.id);

    // Bulk erasure empties the partition and reports the count.
    let deleted = store.delete_all_conversations(identity).await.unwrap();
    assert_eq!(deleted, 2);
    assert!(store.recent_threads(identity, 10).await.unwrap().is_empty());

    // A deleted thread id is gone for good: update must not resurrect.
    let mut ghost = updated;
    ghost.touch();
    assert!(matches!(
        store.update_thread(&ghost).await,
        Err(StampError::NotFound { .. })
    ));
    assert!(store.get_thread(identity, &ghost.id).await.unwrap().is_none());
}

/// Queue item contract, including the lock protocol.
pub async fn queue_contract(store: Arc<dyn Store>) {
    let identity = "contract-queue";
    let now = Utc::now();

    let item = make_queue_item(identity);
    store.put_item(&item).await.unwrap();
    let read = store.get_item(identity, &item.id).await.unwrap().unwrap();
    assert_eq!(read.status, QueueStatus::Pending);
    assert_eq!(read.version, 0);

    // Not ready before next_retry_at.
    let early = now - Duration::seconds(10);
    assert!(
        !store
            .pending_ready(early, 100)
            .await
            .unwrap()
            .iter()
            .any(|i| i.id == item.id),
        "no item may be dispatched before next_retry_at"
    );
    assert!(store
        .pending_ready(now + Duration::seconds(1), 100)
        .await
        .unwrap()
        .iter()
        .any(|i| i.id == item.id));

    // Lock: first caller wins, stale version loses.
    let lease = now + Duration::seconds(30);
    assert!(store
        .try_lock_item(identity, &item.id, 0, lease, now)
        .await
        .unwrap());
    assert!(!store
        .try_lock_item(identity, &item.id, 0, lease, now)
        .await
        .unwrap());

    // Locked items are invisible to the poller until the lease expires.
    assert!(!store
        .pending_ready(now + Duration::seconds(1), 100)
        .await
        .unwrap()
        .iter()
        .any(|i| i.id == item.id));
    let after_lease = now + Duration::seconds(31);
    let reclaimed: Vec<QueueItem> = store
        .pending_ready(after_lease, 100)
        .await
        .unwrap()
        .into_iter()
        .filter(|i| i.id == item.id)
        .collect();
    assert_eq!(reclaimed.len(), 1, "expired lease must be reclaimable");
    assert_eq!(reclaimed[0].version, 1);

    // Terminal write sticks.
    let mut terminal = reclaimed[0].clone();
    terminal.status = QueueStatus::Completed;
    terminal.next_retry_at = None;
    terminal.lock_expires_at = None;
    terminal.updated_at = after_lease;
    store.update_item(&terminal).await.unwrap();
    let read = store.get_item(identity, &item.id).await.unwrap().unwrap();
    assert_eq!(read.status, QueueStatus::Completed);
    assert!(read.next_retry_at.is_none());

    // Latest-for-identity sees the newest write.
    let latest = store.latest_for_identity(identity).await.unwrap().unwrap();
    assert_eq!(latest.id, item.id);

    // Sweep collects only expired terminal items.
    let mut stale = make_queue_item(identity);
    stale.status = QueueStatus::Failed;
    stale.expires_at = now - Duration::hours(1);
    store.put_item(&stale).await.unwrap();
    let swept = store.sweep_expired_items(now).await.unwrap();
    assert_eq!(swept, 1);
    assert!(store.get_item(identity, &stale.id).await.unwrap().is_none());
    assert!(store.get_item(identity, &item.id).await.unwrap().is_some());
}

/// Deletion request contract.
pub async fn deletion_request_contract(store: Arc<dyn Store>) {
    let identity = "contract-del";

    let request = DeletionRequest::new(identity);
    store.save_request(&request).await.unwrap();
    let read = store.get_request(identity, &request.id).await.unwrap().unwrap();
    assert_eq!(read, request);

    // Pending listing includes it; a terminal transition removes it.
    assert!(store
        .get_all_pending()
        .await
        .unwrap()
        .iter()
        .any(|r| r.id == request.id));

    let mut cancelled = read;
    cancelled.status = DeletionStatus::Cancelled;
    cancelled.cancellation_reason = Some("user cancelled".to_string());
    store.update_request(&cancelled).await.unwrap();
    assert!(!store
        .get_all_pending()
        .await
        .unwrap()
        .iter()
        .any(|r| r.id == request.id));

    // Most recent request wins the by-identity lookup.
    let newer = DeletionRequest::new(identity);
    store.save_request(&newer).await.unwrap();
    let latest = store.get_request_by_identity(identity).await.unwrap().unwrap();
    assert_eq!(latest.id, newer.id);
}

/// Audit trail contract: bit-identical round-trip, separation, ordering.
pub async fn audit_contract(store: Arc<dyn Store>) {
    let identity = "contract-audit";

    let first = AuditLogEntry::chained(identity, "thread.created", serde_json::json!({"n": 1}), None);
    let second = AuditLogEntry::chained(
        identity,
        "state.clock_in.confirmed",
        serde_json::json!({"n": 2}),
        Some(first.hash.clone()),
    );
    store.append_audit(&first).await.unwrap();
    store.append_audit(&second).await.unwrap();

    let entries = store.audit_entries(identity, &first.date).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(
        serde_json::to_string(&entries[0]).unwrap(),
        serde_json::to_string(&first).unwrap(),
        "audit entries must round-trip bit-identical"
    );
    assert_eq!(entries[1].prev_hash.as_deref(), Some(first.hash.as_str()));

    let deletion = DeletionAuditLogEntry::chained(
        identity,
        "req-1",
        "Pending",
        "Cancelled",
        serde_json::json!({}),
        None,
    );
    store.append_deletion_audit(&deletion).await.unwrap();
    let read = store
        .deletion_audit_entries(identity, &deletion.date)
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_string(&read[0]).unwrap(),
        serde_json::to_string(&deletion).unwrap()
    );

    // Trails are separate: the conversation trail saw nothing new.
    assert_eq!(store.audit_entries(identity, &first.date).await.unwrap().len(), 2);
}
