// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time-driven collaborator that processes due deletion requests.
//!
//! Runs independently of the conversation request path. A request whose
//! processing fails lands in `Failed` and is not picked up again -- the
//! sweeper only ever looks at `Pending` requests.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::lifecycle::DeletionLifecycle;

/// Interval poller over pending deletion requests.
pub struct DeletionSweeper {
    lifecycle: Arc<DeletionLifecycle>,
    interval: Duration,
}

impl DeletionSweeper {
    pub fn new(lifecycle: Arc<DeletionLifecycle>, interval_secs: u64) -> Self {
        Self {
            lifecycle,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// Run the sweep loop until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_secs = self.interval.as_secs(), "deletion sweeper started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("deletion sweeper stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.sweep().await;
                }
            }
        }
    }

    /// One pass: process every pending request whose grace period has
    /// elapsed. Returns how many requests were processed (completed OR
    /// failed -- both are terminal outcomes of a sweep).
    pub async fn sweep(&self) -> usize {
        let pending = match self.lifecycle.pending_requests().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "deletion sweep could not list pending requests");
                return 0;
            }
        };

        let now = Utc::now();
        let mut processed = 0;
        for request in pending {
            if !request.is_ready_for_processing(now) {
                continue;
            }
            match self.lifecycle.process(&request.identity, &request.id).await {
                Ok(_) => processed += 1,
                Err(e) => {
                    // process() itself records Failed for erasure errors;
                    // anything surfacing here is a lifecycle-level problem.
                    warn!(
                        identity = %request.identity,
                        request_id = %request.id,
                        error = %e,
                        "deletion sweep could not process request"
                    );
                }
            }
        }
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stamp_bus::EventBus;
    use stamp_core::types::{ConversationThread, DeletionStatus};
    use stamp_core::ConversationStore;
    use stamp_storage::MemoryStore;

    #[tokio::test]
    async fn sweep_processes_only_due_requests() {
        let store = Arc::new(MemoryStore::new());
        let bus = EventBus::default();

        // Zero-day grace: due immediately.
        let due = DeletionLifecycle::new(store.clone(), bus.clone(), 0);
        store
            .create_thread(&ConversationThread::new("user-due", "sess-1"))
            .await
            .unwrap();
        let due_request = due.submit_request("user-due").await.unwrap();

        // Standard grace: not due for 30 days.
        let waiting = DeletionLifecycle::new(store.clone(), bus.clone(), 30);
        let waiting_request = waiting.submit_request("user-waiting").await.unwrap();

        let sweeper = DeletionSweeper::new(Arc::new(due), 3600);
        assert_eq!(sweeper.sweep().await, 1);

        let done = sweeper
            .lifecycle
            .status("user-due")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.id, due_request.id);
        assert_eq!(done.status, DeletionStatus::Completed);

        let untouched = sweeper
            .lifecycle
            .status("user-waiting")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(untouched.id, waiting_request.id);
        assert_eq!(untouched.status, DeletionStatus::Pending);

        // A second sweep finds nothing new to do.
        assert_eq!(sweeper.sweep().await, 0);
    }
}
