// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Applies terminal delivery outcomes to conversation state.
//!
//! Subscribes to `delivery.resolved` on the bus. A completed delivery is
//! the confirmation that allows the conversation state to change; a failed
//! one leaves state untouched and records a notice the user sees on their
//! next interaction (the fresh snapshot then carries the truth -- old
//! stream events are never replayed).

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use stamp_bus::{BusEvent, EventBus};
use stamp_core::types::QueueStatus;

use crate::threads::ThreadService;

/// Bus subscriber folding terminal queue results into threads.
pub struct OutcomeApplier {
    threads: ThreadService,
}

impl OutcomeApplier {
    pub fn new(threads: ThreadService) -> Self {
        Self { threads }
    }

    /// Consume resolution events until cancelled.
    pub async fn run(&self, bus: EventBus, cancel: CancellationToken) {
        let mut rx = bus.subscribe();
        info!("outcome applier started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("outcome applier stopping");
                    break;
                }
                received = rx.recv() => match received {
                    Ok(envelope) => {
                        if let BusEvent::DeliveryResolved {
                            identity,
                            thread_id,
                            action,
                            target_time,
                            status,
                            error_message,
                            status_code,
                            ..
                        } = envelope.event
                        {
                            match status {
                                QueueStatus::Completed => {
                                    if let Err(e) = self
                                        .threads
                                        .apply_confirmed_action(
                                            &identity,
                                            &thread_id,
                                            action,
                                            target_time,
                                            status_code,
                                        )
                                        .await
                                    {
                                        warn!(
                                            identity,
                                            thread_id,
                                            error = %e,
                                            "failed to apply confirmed delivery"
                                        );
                                    }
                                }
                                QueueStatus::Failed => {
                                    self.threads
                                        .record_delivery_failure(
                                            &identity,
                                            &thread_id,
                                            action,
                                            error_message.as_deref(),
                                        )
                                        .await;
                                }
                                other => {
                                    warn!(status = %other, "non-terminal resolution event ignored");
                                }
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "outcome applier lagged behind the bus");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }
}
