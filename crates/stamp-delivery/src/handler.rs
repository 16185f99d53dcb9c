// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bus subscriber that owns the enqueue for failed submissions.
//!
//! The gateway publishes `submission.failed` without referencing the
//! queue; this handler is the only place that turns a failure event into
//! a durable retry item.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use stamp_bus::{BusEvent, EventBus};

use crate::queue::{EnqueueRequest, SubmissionQueue};

/// Subscribes to submission failures and enqueues retries.
pub struct FailureHandler {
    queue: Arc<SubmissionQueue>,
}

impl FailureHandler {
    pub fn new(queue: Arc<SubmissionQueue>) -> Self {
        Self { queue }
    }

    /// Consume failure events until cancelled.
    pub async fn run(&self, bus: EventBus, cancel: CancellationToken) {
        let mut rx = bus.subscribe();
        info!("failure handler started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("failure handler stopping");
                    break;
                }
                received = rx.recv() => match received {
                    Ok(envelope) => {
                        if let BusEvent::SubmissionFailed {
                            identity,
                            action,
                            target_time,
                            thread_id,
                            message_id,
                            error_message,
                            status_code,
                            context,
                        } = envelope.event
                        {
                            let item = self
                                .queue
                                .enqueue(EnqueueRequest {
                                    identity,
                                    action,
                                    target_time,
                                    thread_id,
                                    message_id,
                                    error_message,
                                    status_code,
                                    context,
                                })
                                .await;
                            info!(item_id = %item.id, "failure event enqueued for retry");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Lagging loses failure events; they resurface when the
                        // user next asks for their action's status.
                        warn!(skipped, "failure handler lagged behind the bus");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }
}
