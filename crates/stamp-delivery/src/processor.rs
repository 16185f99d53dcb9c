// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background retry processor.
//!
//! Polls the queue for ready items, claims each via the optimistic lock,
//! attempts delivery with a bounded timeout, and records the result.
//! Multiple processor instances may run concurrently (horizontal scaling);
//! the lock protocol guarantees no two ever advance the same item.
//!
//! Terminal outcomes are published on the bus so the conversation state
//! and any connected stream learn the result without the processor knowing
//! either of them.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stamp_bus::{BusEvent, EventBus};
use stamp_core::types::{QueueItem, SubmissionOutcome};
use stamp_core::{ClockSubmission, ExternalGateway, StampError};

use crate::queue::SubmissionQueue;

/// Poll-loop worker that drains ready queue items.
pub struct RetryProcessor {
    queue: Arc<SubmissionQueue>,
    gateway: Arc<dyn ExternalGateway>,
    bus: EventBus,
    poll_interval: Duration,
    attempt_timeout: Duration,
    batch_size: usize,
}

impl RetryProcessor {
    pub fn new(
        queue: Arc<SubmissionQueue>,
        gateway: Arc<dyn ExternalGateway>,
        bus: EventBus,
        config: &stamp_config::model::DeliveryConfig,
    ) -> Self {
        Self {
            queue,
            gateway,
            bus,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            attempt_timeout: Duration::from_secs(config.attempt_timeout_secs),
            batch_size: config.batch_size,
        }
    }

    /// Run the poll loop until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "retry processor started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("retry processor stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "retry processor tick failed");
                    }
                }
            }
        }
    }

    /// One poll cycle: claim and attempt every ready item, then sweep
    /// expired terminal items. Returns how many items were processed.
    pub async fn tick(&self) -> Result<usize, StampError> {
        let ready = self.queue.pending_ready(self.batch_size).await?;
        let mut processed = 0;

        for mut item in ready {
            // Losing the lock means another processor got there first.
            if !self.queue.try_lock(&mut item).await? {
                debug!(item_id = %item.id, "lost lock race, skipping");
                continue;
            }

            let outcome = self.attempt(&item).await;
            self.queue.update_after_retry(&mut item, &outcome).await?;

            if item.is_terminal() {
                self.publish_resolution(&item);
            }
            processed += 1;
        }

        let swept = self.queue.sweep_expired().await?;
        if swept > 0 {
            debug!(swept, "garbage-collected expired queue items");
        }

        Ok(processed)
    }

    /// One bounded delivery attempt. A timeout counts as a failed attempt.
    async fn attempt(&self, item: &QueueItem) -> SubmissionOutcome {
        let submission = ClockSubmission {
            identity: item.identity.clone(),
            action: item.action,
            target_time: item.target_time,
        };
        match tokio::time::timeout(self.attempt_timeout, self.gateway.submit(&submission)).await {
            Ok(outcome) => outcome,
            Err(_) => SubmissionOutcome::failed(
                format!(
                    "attempt timed out after {}s",
                    self.attempt_timeout.as_secs()
                ),
                None,
            ),
        }
    }

    fn publish_resolution(&self, item: &QueueItem) {
        self.bus.publish(BusEvent::DeliveryResolved {
            identity: item.identity.clone(),
            item_id: item.id.clone(),
            thread_id: item.thread_id.clone(),
            action: item.action,
            target_time: item.target_time,
            status: item.status,
            error_message: item.last_error.clone(),
            status_code: item.last_status_code,
        });
    }
}
