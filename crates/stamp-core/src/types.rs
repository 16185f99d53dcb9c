// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Stamp workspace.
//!
//! Everything here is partitioned by the owner identity: conversation
//! threads, queued submissions, deletion requests, and audit entries all
//! carry an `identity` field that serves as the partition key for storage
//! backends.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Default number of automatic retries for a queued submission.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Time-to-live for terminal queue items before garbage collection.
pub const QUEUE_ITEM_TTL_DAYS: i64 = 7;

/// Grace period between a deletion request and its scheduled execution.
pub const DELETION_GRACE_DAYS: i64 = 30;

/// A state-changing time-tracking action submitted against the HR backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ClockAction {
    ClockIn,
    ClockOut,
}

/// Result of a single submission attempt against the external HR backend.
///
/// Synchronous-style: transport failures are folded into `success = false`
/// with no status code rather than surfaced as errors, so callers always
/// get a definitive outcome to act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub success: bool,
    pub error_message: Option<String>,
    pub status_code: Option<u16>,
}

impl SubmissionOutcome {
    /// A successful submission.
    pub fn ok() -> Self {
        Self {
            success: true,
            error_message: None,
            status_code: Some(200),
        }
    }

    /// A failed submission with an error message and optional HTTP status.
    pub fn failed(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            status_code,
        }
    }
}

/// A single message within a conversation thread. Append-only; insertion
/// order is significant and preserved by every backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Conversation-level state embedded in a thread.
///
/// `clocked_in` is only ever flipped from a CONFIRMED external write --
/// an unconfirmed or still-queued submission must not touch it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub clocked_in: bool,
    pub last_clock_in: Option<DateTime<Utc>>,
    pub last_clock_out: Option<DateTime<Utc>>,
    pub last_action: Option<ClockAction>,
    /// Free-form short-term context (device hint, locale, etc.).
    /// BTreeMap so serialized form is deterministic.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

/// One conversation between an identity and the assistant.
///
/// Persisted as a single document keyed by `(id, identity)`. Never
/// hard-deleted except through the deletion lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationThread {
    pub id: String,
    /// Owner identity; the partition key.
    pub identity: String,
    pub session_id: String,
    pub messages: Vec<ThreadMessage>,
    pub state: ConversationState,
    pub created_at: DateTime<Utc>,
    /// Monotonically non-decreasing; bumped on every mutation.
    pub updated_at: DateTime<Utc>,
    /// `None` = retained indefinitely until explicit deletion.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ConversationThread {
    /// Create a fresh thread for the first message of a session.
    pub fn new(identity: impl Into<String>, session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            identity: identity.into(),
            session_id: session_id.into(),
            messages: Vec::new(),
            state: ConversationState::default(),
            created_at: now,
            updated_at: now,
            expires_at: None,
        }
    }

    /// Append a message and bump `updated_at`, keeping it non-decreasing.
    pub fn push_message(&mut self, message: ThreadMessage) {
        self.messages.push(message);
        self.touch();
    }

    /// Bump `updated_at` to now without going backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

/// Status of a queued submission.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    /// Terminal statuses admit no further automatic transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }
}

/// One durable retry unit: a failed external submission awaiting redelivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    /// Owner identity; the partition key.
    pub identity: String,
    pub action: ClockAction,
    /// The timestamp the action should be applied at on the HR side.
    pub target_time: DateTime<Utc>,
    /// Originating conversation/message ids, for traceability.
    pub thread_id: String,
    pub message_id: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: QueueStatus,
    /// Set whenever `status == Pending`; cleared on terminal statuses.
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_status_code: Option<u16>,
    /// Short-term context captured at enqueue time.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optimistic concurrency token; bumped on every locked transition.
    pub version: i64,
    /// Lease expiry while `Processing`; an expired lease is reclaimable.
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Garbage-collection deadline for terminal items.
    pub expires_at: DateTime<Utc>,
}

impl QueueItem {
    /// Whether this item is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The retry delay for the current `retry_count`: `2^retry_count` seconds.
    pub fn backoff_delay(&self) -> Duration {
        Duration::seconds(1i64 << self.retry_count.min(30))
    }
}

/// Status of a GDPR-style deletion request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum DeletionStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
    Failed,
}

impl DeletionStatus {
    /// Terminal statuses are immutable; the record is retained as an
    /// audit artifact independent of the conversations it describes.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeletionStatus::Completed | DeletionStatus::Cancelled | DeletionStatus::Failed
        )
    }
}

/// One GDPR erasure request for everything an identity owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRequest {
    pub id: String,
    /// Owner identity; the partition key.
    pub identity: String,
    pub requested_at: DateTime<Utc>,
    /// `requested_at` plus the grace period.
    pub scheduled_deletion_at: DateTime<Utc>,
    pub status: DeletionStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub conversations_deleted: Option<u64>,
    pub cancellation_reason: Option<String>,
    pub error_message: Option<String>,
}

impl DeletionRequest {
    /// Create a new pending request with the standard 30-day grace period.
    pub fn new(identity: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            identity: identity.into(),
            requested_at: now,
            scheduled_deletion_at: now + Duration::days(DELETION_GRACE_DAYS),
            status: DeletionStatus::Pending,
            completed_at: None,
            conversations_deleted: None,
            cancellation_reason: None,
            error_message: None,
        }
    }

    /// A request is ready once its grace period has elapsed and it is
    /// still pending.
    pub fn is_ready_for_processing(&self, now: DateTime<Utc>) -> bool {
        self.status == DeletionStatus::Pending && now >= self.scheduled_deletion_at
    }
}

/// A currently-active conversation session for an identity.
///
/// Derived on demand from recent threads; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub session_id: String,
    pub last_activity: DateTime<Utc>,
    pub thread_count: usize,
    pub device_hint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_action_round_trips_through_strings() {
        use std::str::FromStr;
        for action in [ClockAction::ClockIn, ClockAction::ClockOut] {
            let s = action.to_string();
            assert_eq!(ClockAction::from_str(&s).unwrap(), action);
        }
        assert_eq!(ClockAction::ClockIn.to_string(), "clock_in");
    }

    #[test]
    fn queue_status_terminality() {
        assert!(!QueueStatus::Pending.is_terminal());
        assert!(!QueueStatus::Processing.is_terminal());
        assert!(QueueStatus::Completed.is_terminal());
        assert!(QueueStatus::Failed.is_terminal());
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let mut item = sample_item();
        item.retry_count = 0;
        assert_eq!(item.backoff_delay(), Duration::seconds(1));
        item.retry_count = 1;
        assert_eq!(item.backoff_delay(), Duration::seconds(2));
        item.retry_count = 2;
        assert_eq!(item.backoff_delay(), Duration::seconds(4));
    }

    #[test]
    fn thread_touch_is_monotonic() {
        let mut thread = ConversationThread::new("user-1", "sess-1");
        let before = thread.updated_at;
        thread.touch();
        assert!(thread.updated_at >= before);
    }

    #[test]
    fn push_message_preserves_order() {
        let mut thread = ConversationThread::new("user-1", "sess-1");
        for i in 0..3 {
            thread.push_message(ThreadMessage {
                id: format!("m{i}"),
                role: "user".to_string(),
                content: format!("message {i}"),
                created_at: Utc::now(),
            });
        }
        let ids: Vec<&str> = thread.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn deletion_request_ready_after_grace_period() {
        let req = DeletionRequest::new("user-1");
        let now = req.requested_at;
        assert!(!req.is_ready_for_processing(now));
        assert!(!req.is_ready_for_processing(now + Duration::days(29)));
        assert!(req.is_ready_for_processing(now + Duration::days(30)));
        assert!(req.is_ready_for_processing(now + Duration::days(31)));
    }

    #[test]
    fn terminal_deletion_request_never_ready() {
        let mut req = DeletionRequest::new("user-1");
        req.status = DeletionStatus::Completed;
        assert!(!req.is_ready_for_processing(req.scheduled_deletion_at + Duration::days(1)));
    }

    #[test]
    fn conversation_state_serialization_is_deterministic() {
        let mut state = ConversationState::default();
        state.context.insert("zeta".to_string(), "1".to_string());
        state.context.insert("alpha".to_string(), "2".to_string());
        let a = serde_json::to_string(&state).unwrap();
        let b = serde_json::to_string(&state).unwrap();
        assert_eq!(a, b);
        // BTreeMap keys serialize in sorted order.
        assert!(a.find("alpha").unwrap() < a.find("zeta").unwrap());
    }

    fn sample_item() -> QueueItem {
        let now = Utc::now();
        QueueItem {
            id: "q1".to_string(),
            identity: "user-1".to_string(),
            action: ClockAction::ClockIn,
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

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn backoff_is_two_to_the_retry_count(retry_count in 0u32..=10) {
                let mut item = sample_item();
                item.retry_count = retry_count;
                prop_assert_eq!(
                    item.backoff_delay(),
                    Duration::seconds(1i64 << retry_count)
                );
            }

            #[test]
            fn queue_status_strings_round_trip(status in prop_oneof![
                Just(QueueStatus::Pending),
                Just(QueueStatus::Processing),
                Just(QueueStatus::Completed),
                Just(QueueStatus::Failed),
            ]) {
                use std::str::FromStr;
                prop_assert_eq!(QueueStatus::from_str(&status.to_string()).unwrap(), status);
            }
        }
    }
}
