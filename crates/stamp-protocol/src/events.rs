// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire event types for the server-to-client stream.
//!
//! One user-initiated action produces one strictly ordered sequence:
//! `message.start`, content deltas, tool-call pairs, at most one snapshot
//! or a run of deltas, then a terminal `message.end` or `error`.
//! Consumers must not assume idempotent redelivery -- a result that lands
//! after the stream closed is conveyed by a fresh `state.snapshot` on the
//! next interaction, never by replaying old events.

use serde::{Deserialize, Serialize};

use stamp_core::types::ConversationState;

/// A single event on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Opens a message buffer.
    #[serde(rename = "message.start")]
    MessageStart { message_id: String },

    /// Ordered text chunk; clients append, never reorder.
    #[serde(rename = "message.content")]
    MessageContent { message_id: String, text: String },

    /// A tool invocation began.
    #[serde(rename = "tool_call.start")]
    ToolCallStart { call_id: String, name: String },

    /// A tool invocation finished; must reference a previously-seen start.
    #[serde(rename = "tool_call.end")]
    ToolCallEnd {
        call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<serde_json::Value>,
    },

    /// Full state replacement.
    #[serde(rename = "state.snapshot")]
    StateSnapshot { state: ConversationState },

    /// Ordered patch operations applied cumulatively. Only valid after a
    /// prior snapshot or delta in the same session.
    #[serde(rename = "state.delta")]
    StateDelta { ops: Vec<DeltaOp> },

    /// Terminal: the message completed normally.
    #[serde(rename = "message.end")]
    MessageEnd { message_id: String },

    /// Terminal: the action failed. `recoverable` tells the client whether
    /// a retry is still in flight or the failure is final.
    #[serde(rename = "error")]
    Error { message: String, recoverable: bool },
}

impl StreamEvent {
    /// Whether this event terminates the sequence for its action.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::MessageEnd { .. } | StreamEvent::Error { .. })
    }
}

/// One patch operation within a `state.delta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DeltaOp {
    /// Set a top-level state field to a JSON value.
    Set { field: String, value: serde_json::Value },
    /// Remove a top-level state field (reverts it to its default).
    Remove { field: String },
}
