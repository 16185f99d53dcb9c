// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Internal typed event bus for the Stamp assistant.
//!
//! The bus is the mediator between the request path and the delivery
//! subsystem: the gateway publishes `submission.failed` without knowing
//! about the queue, and the delivery crate's failure handler owns the
//! enqueue. The retry processor publishes `delivery.resolved` the same
//! way, so neither side references the other directly.
//!
//! Built on `tokio::sync::broadcast`: slow subscribers may lag and drop
//! events; every consumer here is advisory or re-derivable from storage,
//! so lag is logged and tolerated.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use stamp_core::types::{ClockAction, QueueStatus};

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 256;

/// Events carried on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusEvent {
    /// A live submission against the HR backend failed; the delivery
    /// handler reacts by enqueueing a durable retry item.
    #[serde(rename = "submission.failed")]
    SubmissionFailed {
        identity: String,
        action: ClockAction,
        target_time: DateTime<Utc>,
        thread_id: String,
        message_id: String,
        error_message: Option<String>,
        status_code: Option<u16>,
        #[serde(default)]
        context: BTreeMap<String, String>,
    },

    /// A queued item reached a terminal status.
    #[serde(rename = "delivery.resolved")]
    DeliveryResolved {
        identity: String,
        item_id: String,
        thread_id: String,
        action: ClockAction,
        target_time: DateTime<Utc>,
        status: QueueStatus,
        error_message: Option<String>,
        status_code: Option<u16>,
    },

    /// A deletion request transitioned between lifecycle states.
    #[serde(rename = "deletion.transition")]
    DeletionTransition {
        identity: String,
        request_id: String,
        from_status: String,
        to_status: String,
    },
}

/// An event plus publication metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub published_at: DateTime<Utc>,
    pub event: BusEvent,
}

/// Cloneable handle to the broadcast bus.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Envelope>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event; returns the number of receivers it reached.
    ///
    /// Publishing with no subscribers is not an error -- the event is
    /// simply dropped, which is fine for a bus whose consumers re-derive
    /// state from storage.
    pub fn publish(&self, event: BusEvent) -> usize {
        let envelope = Envelope {
            id: uuid::Uuid::new_v4().to_string(),
            published_at: Utc::now(),
            event,
        };
        match self.tx.send(envelope) {
            Ok(n) => n,
            Err(_) => {
                debug!("bus event dropped: no subscribers");
                0
            }
        }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}
