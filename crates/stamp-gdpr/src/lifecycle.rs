// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The deletion request state machine.
//!
//! `Pending -> Processing -> {Completed | Failed}`, with
//! `Pending -> Cancelled` as the only other legal transition. Terminal
//! records are immutable and retained as audit artifacts.
//!
//! Unlike the submission queue, a failed deletion is NEVER retried
//! automatically: a partial delete silently retried could leave the
//! store in a state no operator ever inspected. `Failed` waits for a
//! human.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use stamp_bus::{BusEvent, EventBus};
use stamp_core::audit::DeletionAuditLogEntry;
use stamp_core::types::{DeletionRequest, DeletionStatus};
use stamp_core::{AuditStore, ConversationStore, DeletionRequestStore, StampError, Store};

/// Drives deletion requests over a store backend.
pub struct DeletionLifecycle {
    store: Arc<dyn Store>,
    bus: EventBus,
    grace: Duration,
}

impl DeletionLifecycle {
    pub fn new(store: Arc<dyn Store>, bus: EventBus, grace_days: i64) -> Self {
        Self {
            store,
            bus,
            grace: Duration::days(grace_days),
        }
    }

    /// Submit a new erasure request for an identity.
    ///
    /// One outstanding request per identity: rejected with `Conflict`
    /// while a `Pending` request exists.
    pub async fn submit_request(&self, identity: &str) -> Result<DeletionRequest, StampError> {
        if let Some(existing) = self.store.get_request_by_identity(identity).await?
            && existing.status == DeletionStatus::Pending
        {
            return Err(StampError::Conflict(format!(
                "a pending deletion request already exists for this identity (id {})",
                existing.id
            )));
        }

        let mut request = DeletionRequest::new(identity);
        request.scheduled_deletion_at = request.requested_at + self.grace;
        self.store.save_request(&request).await?;

        self.mirror_transition(&request, "None", serde_json::json!({})).await;
        info!(
            identity,
            request_id = %request.id,
            scheduled = %request.scheduled_deletion_at,
            "deletion request submitted"
        );
        Ok(request)
    }

    /// Cancel a request. Legal only from `Pending`.
    pub async fn cancel(
        &self,
        identity: &str,
        id: &str,
        reason: Option<String>,
    ) -> Result<DeletionRequest, StampError> {
        let mut request = self.load(identity, id).await?;
        if request.status != DeletionStatus::Pending {
            return Err(StampError::InvalidTransition {
                entity: "deletion request",
                from: request.status.to_string(),
                to: DeletionStatus::Cancelled.to_string(),
            });
        }

        let from = request.status;
        request.status = DeletionStatus::Cancelled;
        request.cancellation_reason = reason;
        self.store.update_request(&request).await?;

        self.mirror_transition(
            &request,
            &from.to_string(),
            serde_json::json!({ "reason": request.cancellation_reason }),
        )
        .await;
        info!(identity, request_id = %id, "deletion request cancelled");
        Ok(request)
    }

    /// Process a due request: transition to `Processing`, erase every
    /// conversation the identity owns, record the count, and complete.
    ///
    /// Any error during erasure transitions to `Failed` with the error
    /// captured; the request is then immutable and requires operator
    /// intervention.
    pub async fn process(&self, identity: &str, id: &str) -> Result<DeletionRequest, StampError> {
        let mut request = self.load(identity, id).await?;
        if request.status != DeletionStatus::Pending {
            return Err(StampError::InvalidTransition {
                entity: "deletion request",
                from: request.status.to_string(),
                to: DeletionStatus::Processing.to_string(),
            });
        }
        let now = Utc::now();
        if !request.is_ready_for_processing(now) {
            return Err(StampError::Conflict(format!(
                "deletion request {id} is not due until {}",
                request.scheduled_deletion_at
            )));
        }

        request.status = DeletionStatus::Processing;
        self.store.update_request(&request).await?;
        self.mirror_transition(&request, "Pending", serde_json::json!({})).await;

        match self.store.delete_all_conversations(identity).await {
            Ok(count) => {
                request.status = DeletionStatus::Completed;
                request.completed_at = Some(Utc::now());
                request.conversations_deleted = Some(count);
                self.store.update_request(&request).await?;
                self.mirror_transition(
                    &request,
                    "Processing",
                    serde_json::json!({ "conversations_deleted": count }),
                )
                .await;
                info!(identity, request_id = %id, count, "deletion request completed");
            }
            Err(e) => {
                request.status = DeletionStatus::Failed;
                request.error_message = Some(e.to_string());
                self.store.update_request(&request).await?;
                self.mirror_transition(
                    &request,
                    "Processing",
                    serde_json::json!({ "error": request.error_message }),
                )
                .await;
                warn!(
                    identity,
                    request_id = %id,
                    error = %e,
                    "deletion failed; operator intervention required"
                );
            }
        }

        Ok(request)
    }

    /// Current request status for an identity's most recent request.
    pub async fn status(&self, identity: &str) -> Result<Option<DeletionRequest>, StampError> {
        self.store.get_request_by_identity(identity).await
    }

    /// All pending requests, for the sweeper.
    pub async fn pending_requests(&self) -> Result<Vec<DeletionRequest>, StampError> {
        self.store.get_all_pending().await
    }

    async fn load(&self, identity: &str, id: &str) -> Result<DeletionRequest, StampError> {
        self.store
            .get_request(identity, id)
            .await?
            .ok_or_else(|| StampError::NotFound {
                entity: "deletion request",
                id: id.to_string(),
            })
    }

    /// Mirror a transition into the deletion audit trail and the bus.
    ///
    /// Audit persistence is non-critical path: a failure is logged and
    /// swallowed so it cannot wedge the lifecycle itself.
    async fn mirror_transition(
        &self,
        request: &DeletionRequest,
        from: &str,
        detail: serde_json::Value,
    ) {
        let to = request.status.to_string();
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let prev_hash = match self
            .store
            .deletion_audit_entries(&request.identity, &date)
            .await
        {
            Ok(entries) => entries.last().map(|e| e.hash.clone()),
            Err(e) => {
                warn!(error = %e, "failed to read deletion audit chain tail");
                None
            }
        };
        let entry = DeletionAuditLogEntry::chained(
            &request.identity,
            &request.id,
            from,
            &to,
            detail,
            prev_hash,
        );
        if let Err(e) = self.store.append_deletion_audit(&entry).await {
            warn!(error = %e, "failed to append deletion audit entry");
        }

        self.bus.publish(BusEvent::DeletionTransition {
            identity: request.identity.clone(),
            request_id: request.id.clone(),
            from_status: from.to_string(),
            to_status: to,
        });
    }
}
