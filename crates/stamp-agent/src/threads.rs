// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation thread service.
//!
//! Threads are created on the first message of a session and mutated by
//! message appends and state updates. Conversation state only changes from
//! a CONFIRMED external write: `apply_confirmed_action` is the single
//! entry point, and it is driven by terminal delivery outcomes, never by
//! an attempt that merely went out.
//!
//! Audit logging here is a non-critical path: failures are logged and
//! swallowed, never propagated to the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use stamp_core::audit::AuditLogEntry;
use stamp_core::types::{ClockAction, ConversationState, ConversationThread, ThreadMessage};
use stamp_core::{AuditStore, ConversationStore, StampError, Store};

/// Service over conversation threads for one store backend.
#[derive(Clone)]
pub struct ThreadService {
    store: Arc<dyn Store>,
}

impl ThreadService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record an inbound user message, creating the thread if this is the
    /// first message of the session. Returns the thread and the id of the
    /// appended message.
    pub async fn record_user_message(
        &self,
        identity: &str,
        session_id: &str,
        thread_id: Option<&str>,
        content: &str,
    ) -> Result<(ConversationThread, String), StampError> {
        let message = ThreadMessage {
            id: uuid::Uuid::new_v4().to_string(),
            role: "user".to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let message_id = message.id.clone();

        let existing = match thread_id {
            Some(id) => self.store.get_thread(identity, id).await?,
            None => None,
        };

        let thread = match existing {
            Some(mut thread) => {
                thread.push_message(message);
                self.store.update_thread(&thread).await?;
                thread
            }
            None => {
                let mut thread = ConversationThread::new(identity, session_id);
                thread.push_message(message);
                self.store.create_thread(&thread).await?;
                debug!(identity, thread_id = %thread.id, "thread created");
                thread
            }
        };

        Ok((thread, message_id))
    }

    /// Append an assistant message to an existing thread.
    pub async fn record_assistant_message(
        &self,
        identity: &str,
        thread_id: &str,
        content: &str,
    ) -> Result<(), StampError> {
        let Some(mut thread) = self.store.get_thread(identity, thread_id).await? else {
            return Err(StampError::NotFound {
                entity: "thread",
                id: thread_id.to_string(),
            });
        };
        thread.push_message(ThreadMessage {
            id: uuid::Uuid::new_v4().to_string(),
            role: "assistant".to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        });
        self.store.update_thread(&thread).await
    }

    /// Fold a CONFIRMED external write into the conversation state.
    ///
    /// Returns the updated state, or `None` when the thread no longer
    /// exists -- a confirmation racing the deletion lifecycle loses to the
    /// delete and must not resurrect anything.
    pub async fn apply_confirmed_action(
        &self,
        identity: &str,
        thread_id: &str,
        action: ClockAction,
        at: DateTime<Utc>,
        status_code: Option<u16>,
    ) -> Result<Option<ConversationState>, StampError> {
        let Some(mut thread) = self.store.get_thread(identity, thread_id).await? else {
            warn!(identity, thread_id, "confirmed action for a deleted thread; dropping");
            return Ok(None);
        };

        match action {
            ClockAction::ClockIn => {
                thread.state.clocked_in = true;
                thread.state.last_clock_in = Some(at);
            }
            ClockAction::ClockOut => {
                thread.state.clocked_in = false;
                thread.state.last_clock_out = Some(at);
            }
        }
        thread.state.last_action = Some(action);
        thread.touch();

        match self.store.update_thread(&thread).await {
            Ok(()) => {}
            Err(StampError::NotFound { .. }) => {
                // Deleted between the read and the write: the delete wins.
                warn!(identity, thread_id, "thread deleted mid-confirmation; dropping");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        self.append_audit(
            identity,
            &format!("state.{action}.confirmed"),
            serde_json::json!({
                "thread_id": thread_id,
                "at": at.to_rfc3339(),
                "status_code": status_code,
            }),
        )
        .await;

        Ok(Some(thread.state))
    }

    /// Record a terminally failed delivery against its thread: an
    /// assistant message the user sees on their next interaction, plus an
    /// audit entry. State is NOT touched -- the write was never confirmed.
    pub async fn record_delivery_failure(
        &self,
        identity: &str,
        thread_id: &str,
        action: ClockAction,
        error: Option<&str>,
    ) {
        let notice = format!(
            "I couldn't apply your {action} after several attempts ({}). Please try again.",
            error.unwrap_or("no further detail")
        );
        if let Err(e) = self
            .record_assistant_message(identity, thread_id, &notice)
            .await
        {
            warn!(identity, thread_id, error = %e, "failed to record delivery failure notice");
        }

        self.append_audit(
            identity,
            &format!("delivery.{action}.failed"),
            serde_json::json!({
                "thread_id": thread_id,
                "error": error,
            }),
        )
        .await;
    }

    /// The current state of a thread, for snapshot construction.
    pub async fn current_state(
        &self,
        identity: &str,
        thread_id: &str,
    ) -> Result<Option<ConversationState>, StampError> {
        Ok(self
            .store
            .get_thread(identity, thread_id)
            .await?
            .map(|t| t.state))
    }

    /// Append a chained entry to the conversation audit trail. Non-fatal:
    /// errors are logged and swallowed.
    async fn append_audit(&self, identity: &str, kind: &str, detail: serde_json::Value) {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let prev_hash = match self.store.audit_entries(identity, &date).await {
            Ok(entries) => entries.last().map(|e| e.hash.clone()),
            Err(e) => {
                warn!(identity, error = %e, "failed to read audit chain tail");
                None
            }
        };
        let entry = AuditLogEntry::chained(identity, kind, detail, prev_hash);
        if let Err(e) = self.store.append_audit(&entry).await {
            warn!(identity, error = %e, "failed to append audit entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stamp_core::AuditStore;
    use stamp_storage::MemoryStore;

    fn service() -> (ThreadService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ThreadService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn first_message_creates_thread() {
        let (service, _store) = service();
        let (thread, message_id) = service
            .record_user_message("user-1", "sess-1", None, "clock me in")
            .await
            .unwrap();
        assert_eq!(thread.messages.len(), 1);
        assert_eq!(thread.messages[0].id, message_id);
        assert_eq!(thread.messages[0].role, "user");
        assert!(!thread.state.clocked_in);
    }

    #[tokio::test]
    async fn later_messages_append_in_order() {
        let (service, _store) = service();
        let (thread, _) = service
            .record_user_message("user-1", "sess-1", None, "first")
            .await
            .unwrap();
        let (thread, _) = service
            .record_user_message("user-1", "sess-1", Some(&thread.id), "second")
            .await
            .unwrap();
        service
            .record_assistant_message("user-1", &thread.id, "reply")
            .await
            .unwrap();

        let (thread, _) = service
            .record_user_message("user-1", "sess-1", Some(&thread.id), "third")
            .await
            .unwrap();
        let contents: Vec<&str> = thread.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "reply", "third"]);
    }

    #[tokio::test]
    async fn confirmed_clock_in_updates_state_and_audits() {
        let (service, store) = service();
        let (thread, _) = service
            .record_user_message("user-1", "sess-1", None, "clock me in")
            .await
            .unwrap();

        let at = Utc::now();
        let state = service
            .apply_confirmed_action("user-1", &thread.id, ClockAction::ClockIn, at, Some(200))
            .await
            .unwrap()
            .unwrap();
        assert!(state.clocked_in);
        assert_eq!(state.last_clock_in, Some(at));
        assert_eq!(state.last_action, Some(ClockAction::ClockIn));

        let date = Utc::now().format("%Y-%m-%d").to_string();
        let entries = store.audit_entries("user-1", &date).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, "state.clock_in.confirmed");
    }

    #[tokio::test]
    async fn confirmation_for_deleted_thread_is_dropped() {
        let (service, store) = service();
        let (thread, _) = service
            .record_user_message("user-1", "sess-1", None, "clock me in")
            .await
            .unwrap();
        use stamp_core::ConversationStore;
        store.delete_all_conversations("user-1").await.unwrap();

        let result = service
            .apply_confirmed_action("user-1", &thread.id, ClockAction::ClockIn, Utc::now(), None)
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(store.get_thread("user-1", &thread.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delivery_failure_leaves_state_untouched() {
        let (service, _store) = service();
        let (thread, _) = service
            .record_user_message("user-1", "sess-1", None, "clock me out")
            .await
            .unwrap();

        service
            .record_delivery_failure("user-1", &thread.id, ClockAction::ClockOut, Some("502"))
            .await;

        let state = service.current_state("user-1", &thread.id).await.unwrap().unwrap();
        assert!(!state.clocked_in);
        assert!(state.last_clock_out.is_none());
    }

    #[tokio::test]
    async fn audit_entries_chain_hashes() {
        let (service, store) = service();
        let (thread, _) = service
            .record_user_message("user-1", "sess-1", None, "in then out")
            .await
            .unwrap();

        service
            .apply_confirmed_action("user-1", &thread.id, ClockAction::ClockIn, Utc::now(), None)
            .await
            .unwrap();
        service
            .apply_confirmed_action("user-1", &thread.id, ClockAction::ClockOut, Utc::now(), None)
            .await
            .unwrap();

        let date = Utc::now().format("%Y-%m-%d").to_string();
        let entries = store.audit_entries("user-1", &date).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].prev_hash.as_deref(), Some(entries[0].hash.as_str()));
    }
}
