// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The durable submission queue.
//!
//! Owns backoff scheduling, locking, and terminal-failure classification
//! on top of whatever [`QueueStore`] backend is configured. The version
//! token counts lock acquisitions: `try_lock` is the only operation that
//! bumps it, and a worker that won the lock carries the bumped version
//! into its `update_after_retry` write.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{error, info, warn};

use stamp_config::model::DeliveryConfig;
use stamp_core::types::{
    ClockAction, QueueItem, QueueStatus, SubmissionOutcome,
};
use stamp_core::{QueueStore, StampError, Store};

/// Everything needed to enqueue one failed submission.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub identity: String,
    pub action: ClockAction,
    pub target_time: chrono::DateTime<Utc>,
    pub thread_id: String,
    pub message_id: String,
    pub error_message: Option<String>,
    pub status_code: Option<u16>,
    pub context: BTreeMap<String, String>,
}

/// Durable queue of pending external-write attempts.
pub struct SubmissionQueue {
    store: Arc<dyn Store>,
    config: DeliveryConfig,
}

impl SubmissionQueue {
    pub fn new(store: Arc<dyn Store>, config: DeliveryConfig) -> Self {
        Self { store, config }
    }

    /// Enqueue a failed submission for retry.
    ///
    /// Never surfaces an error to the caller: the user has already been
    /// told "your action is queued", so a storage failure here is logged
    /// and the constructed item returned regardless. The first retry is
    /// scheduled `2^0 = 1` second out.
    pub async fn enqueue(&self, request: EnqueueRequest) -> QueueItem {
        let now = Utc::now();
        let item = QueueItem {
            id: uuid::Uuid::new_v4().to_string(),
            identity: request.identity,
            action: request.action,
            target_time: request.target_time,
            thread_id: request.thread_id,
            message_id: request.message_id,
            retry_count: 0,
            max_retries: self.config.max_retries,
            status: QueueStatus::Pending,
            next_retry_at: Some(now + Duration::seconds(1)),
            last_error: request.error_message,
            last_status_code: request.status_code,
            context: request.context,
            version: 0,
            lock_expires_at: None,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::days(self.config.item_ttl_days),
        };

        if let Err(e) = self.store.put_item(&item).await {
            error!(
                identity = %item.identity,
                item_id = %item.id,
                error = %e,
                "failed to persist queue item; retry will be lost"
            );
        } else {
            info!(
                identity = %item.identity,
                item_id = %item.id,
                action = %item.action,
                "submission queued for retry"
            );
        }
        item
    }

    /// Items ready for a retry attempt right now, including reclaimable
    /// items whose processing lease expired.
    pub async fn pending_ready(&self, limit: usize) -> Result<Vec<QueueItem>, StampError> {
        self.store.pending_ready(Utc::now(), limit).await
    }

    /// Claim an item for processing. The lease equals the per-attempt
    /// timeout, so a stuck worker's item becomes reclaimable exactly when
    /// its attempt can no longer succeed.
    ///
    /// On success the caller's `item` is updated to mirror the stored
    /// transition (processing, bumped version, lease set).
    pub async fn try_lock(&self, item: &mut QueueItem) -> Result<bool, StampError> {
        let now = Utc::now();
        let lease_until = now + Duration::seconds(self.config.attempt_timeout_secs as i64);
        let locked = self
            .store
            .try_lock_item(&item.identity, &item.id, item.version, lease_until, now)
            .await?;
        if locked {
            item.status = QueueStatus::Processing;
            item.version += 1;
            item.lock_expires_at = Some(lease_until);
            item.updated_at = now;
        }
        Ok(locked)
    }

    /// Record the result of a retry attempt.
    ///
    /// Success completes the item. Failure either reschedules with
    /// exponential backoff (`2^retry_count` seconds) or, once retries are
    /// exhausted, marks the item terminally failed. Terminal items are
    /// never touched again.
    pub async fn update_after_retry(
        &self,
        item: &mut QueueItem,
        outcome: &SubmissionOutcome,
    ) -> Result<(), StampError> {
        if item.is_terminal() {
            warn!(
                item_id = %item.id,
                status = %item.status,
                "ignoring retry result for terminal item"
            );
            return Ok(());
        }

        let now = Utc::now();
        item.updated_at = now;
        item.lock_expires_at = None;

        if outcome.success {
            item.status = QueueStatus::Completed;
            item.next_retry_at = None;
            item.last_error = None;
            item.last_status_code = outcome.status_code;
            info!(
                identity = %item.identity,
                item_id = %item.id,
                retry_count = item.retry_count,
                "queued submission delivered"
            );
        } else {
            item.retry_count += 1;
            item.last_error = outcome.error_message.clone();
            item.last_status_code = outcome.status_code;

            if item.retry_count >= item.max_retries {
                item.status = QueueStatus::Failed;
                item.next_retry_at = None;
                warn!(
                    identity = %item.identity,
                    item_id = %item.id,
                    retry_count = item.retry_count,
                    last_error = item.last_error.as_deref().unwrap_or("unknown"),
                    "retries exhausted; submission failed permanently"
                );
            } else {
                item.status = QueueStatus::Pending;
                item.next_retry_at = Some(now + item.backoff_delay());
            }
        }

        self.store.update_item(item).await
    }

    /// The most recent item for an identity, for the status endpoint.
    pub async fn status_for_identity(
        &self,
        identity: &str,
    ) -> Result<Option<QueueItem>, StampError> {
        self.store.latest_for_identity(identity).await
    }

    /// Garbage-collect terminal items past their TTL.
    pub async fn sweep_expired(&self) -> Result<u64, StampError> {
        self.store.sweep_expired_items(Utc::now()).await
    }
}
