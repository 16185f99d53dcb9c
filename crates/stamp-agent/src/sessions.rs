// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Advisory detection of concurrent sessions for one identity.
//!
//! Pure read-side component: it inspects recently-active threads grouped
//! by session id and reports a collision when more than one distinct
//! session is active. It never blocks a request, and every failure is
//! swallowed and logged -- a broken store must not take the request path
//! down with it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use stamp_core::types::ActiveSession;
use stamp_core::{ConversationStore, Store};

/// How many recent threads to inspect per check.
const RECENT_THREAD_SAMPLE: usize = 50;

/// Advisory warning: the identity has several active sessions.
#[derive(Debug, Clone)]
pub struct SessionCollision {
    /// All active sessions, most recently active first.
    pub sessions: Vec<ActiveSession>,
}

/// Detects concurrent-session collisions from recent thread activity.
pub struct SessionManager {
    store: Arc<dyn Store>,
    window: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn Store>, window_minutes: i64) -> Self {
        Self {
            store,
            window: Duration::minutes(window_minutes),
        }
    }

    /// Check for concurrent sessions. Returns `None` when there is no
    /// collision OR when the check itself fails -- the output is advisory
    /// only and must never surface an error to the user.
    pub async fn check(&self, identity: &str, current_session_id: &str) -> Option<SessionCollision> {
        let threads = match self.store.recent_threads(identity, RECENT_THREAD_SAMPLE).await {
            Ok(threads) => threads,
            Err(e) => {
                warn!(identity, error = %e, "session check failed; skipping");
                return None;
            }
        };

        let cutoff = Utc::now() - self.window;
        let mut groups: HashMap<String, ActiveSession> = HashMap::new();

        for thread in threads {
            if thread.updated_at < cutoff {
                continue;
            }
            let device_hint = thread.state.context.get("device").cloned();
            groups
                .entry(thread.session_id.clone())
                .and_modify(|session| {
                    session.thread_count += 1;
                    if thread.updated_at > session.last_activity {
                        session.last_activity = thread.updated_at;
                        session.device_hint = device_hint.clone();
                    }
                })
                .or_insert(ActiveSession {
                    session_id: thread.session_id.clone(),
                    last_activity: thread.updated_at,
                    thread_count: 1,
                    device_hint,
                });
        }

        if groups.len() <= 1 {
            return None;
        }

        let mut sessions: Vec<ActiveSession> = groups.into_values().collect();
        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        debug!(
            identity,
            current_session_id,
            active = sessions.len(),
            "concurrent sessions detected"
        );
        Some(SessionCollision { sessions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stamp_core::types::ConversationThread;
    use stamp_storage::MemoryStore;

    async fn seed_thread(store: &MemoryStore, session_id: &str, minutes_ago: i64) {
        let mut thread = ConversationThread::new("user-1", session_id);
        thread.updated_at = Utc::now() - Duration::minutes(minutes_ago);
        store.create_thread(&thread).await.unwrap();
    }

    #[tokio::test]
    async fn single_session_is_no_collision() {
        let store = Arc::new(MemoryStore::new());
        seed_thread(&store, "sess-a", 1).await;
        seed_thread(&store, "sess-a", 5).await;

        let manager = SessionManager::new(store, 30);
        assert!(manager.check("user-1", "sess-a").await.is_none());
    }

    #[tokio::test]
    async fn two_active_sessions_produce_an_advisory() {
        let store = Arc::new(MemoryStore::new());
        seed_thread(&store, "sess-a", 1).await;
        seed_thread(&store, "sess-b", 10).await;

        let manager = SessionManager::new(store, 30);
        let collision = manager.check("user-1", "sess-a").await.unwrap();
        assert_eq!(collision.sessions.len(), 2);
        // Most recently active first.
        assert_eq!(collision.sessions[0].session_id, "sess-a");
    }

    #[tokio::test]
    async fn stale_sessions_fall_outside_the_window() {
        let store = Arc::new(MemoryStore::new());
        seed_thread(&store, "sess-a", 1).await;
        seed_thread(&store, "sess-old", 45).await;

        let manager = SessionManager::new(store, 30);
        assert!(manager.check("user-1", "sess-a").await.is_none());
    }

    #[tokio::test]
    async fn device_hint_comes_from_thread_context() {
        let store = Arc::new(MemoryStore::new());
        let mut phone = ConversationThread::new("user-1", "sess-phone");
        phone
            .state
            .context
            .insert("device".to_string(), "phone".to_string());
        store.create_thread(&phone).await.unwrap();
        seed_thread(&store, "sess-desk", 2).await;

        let manager = SessionManager::new(store, 30);
        let collision = manager.check("user-1", "sess-desk").await.unwrap();
        let phone_session = collision
            .sessions
            .iter()
            .find(|s| s.session_id == "sess-phone")
            .unwrap();
        assert_eq!(phone_session.device_hint.as_deref(), Some("phone"));
    }

    #[tokio::test]
    async fn unknown_identity_is_quietly_empty() {
        let store = Arc::new(MemoryStore::new());
        let manager = SessionManager::new(store, 30);
        assert!(manager.check("nobody", "sess-x").await.is_none());
    }
}
