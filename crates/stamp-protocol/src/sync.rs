// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-side state synchronization and stream validation.
//!
//! [`StateSync`] materializes the authoritative conversation state from
//! snapshot/delta events. [`StreamConsumer`] validates a full event
//! sequence: content ordering, tool-call pairing, and terminality.
//! Protocol violations are reported to the caller, who drops and logs
//! them -- a violation never tears down the connection.

use std::collections::HashSet;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use stamp_core::types::ConversationState;

use crate::events::{DeltaOp, StreamEvent};

/// A violation of the stream ordering rules. Recoverable by design: the
/// offending event is dropped and the stream stays alive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// A delta arrived with no snapshot (or prior delta) to apply it to.
    /// The client must request a fresh snapshot instead.
    #[error("state delta without a prior snapshot in this session")]
    StaleDelta,

    /// A `tool_call.end` referenced an id with no open `tool_call.start`.
    #[error("unmatched tool_call.end for call {call_id}")]
    UnmatchedToolCallEnd { call_id: String },

    /// Message content arrived outside an open message buffer.
    #[error("message.content for {message_id} without message.start")]
    ContentWithoutStart { message_id: String },

    /// A second `message.start` arrived within one action sequence.
    #[error("duplicate message.start for {message_id}")]
    DuplicateMessageStart { message_id: String },

    /// An event arrived after the sequence already terminated.
    #[error("event after terminal event")]
    EventAfterTerminal,
}

/// Materializes conversation state from snapshots and deltas.
///
/// Lives for the duration of a client session (possibly across several
/// message sequences). After a reconnect the client constructs a fresh
/// `StateSync` and waits for a snapshot rather than applying stale deltas.
#[derive(Debug, Default)]
pub struct StateSync {
    /// The materialized state as a JSON object, `None` until the first
    /// snapshot arrives.
    materialized: Option<Map<String, Value>>,
}

impl StateSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a snapshot has been seen in this session.
    pub fn has_state(&self) -> bool {
        self.materialized.is_some()
    }

    /// Replace the full state.
    pub fn apply_snapshot(&mut self, state: &ConversationState) {
        // ConversationState always serializes to a JSON object.
        if let Ok(Value::Object(map)) = serde_json::to_value(state) {
            self.materialized = Some(map);
        }
    }

    /// Apply ordered patch operations cumulatively.
    pub fn apply_delta(&mut self, ops: &[DeltaOp]) -> Result<(), ProtocolViolation> {
        let map = self.materialized.as_mut().ok_or(ProtocolViolation::StaleDelta)?;
        for op in ops {
            match op {
                DeltaOp::Set { field, value } => {
                    map.insert(field.clone(), value.clone());
                }
                DeltaOp::Remove { field } => {
                    map.remove(field);
                }
            }
        }
        Ok(())
    }

    /// The current state, with removed fields reverted to their defaults.
    pub fn state(&self) -> Option<ConversationState> {
        let map = self.materialized.as_ref()?;

        // Overlay the materialized fields onto a default document so a
        // `remove` op yields the field's default rather than a decode error.
        let mut base = match serde_json::to_value(ConversationState::default()) {
            Ok(Value::Object(base)) => base,
            _ => Map::new(),
        };
        for (k, v) in map {
            base.insert(k.clone(), v.clone());
        }
        serde_json::from_value(Value::Object(base)).ok()
    }
}

/// Validates one logical action's event sequence while folding state
/// updates into a [`StateSync`].
#[derive(Debug, Default)]
pub struct StreamConsumer {
    sync: StateSync,
    open_message: Option<String>,
    content: String,
    open_calls: HashSet<String>,
    terminated: bool,
}

impl StreamConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new action sequence, keeping the session's state sync.
    pub fn begin_sequence(&mut self) {
        self.open_message = None;
        self.content.clear();
        self.open_calls.clear();
        self.terminated = false;
    }

    /// Apply one event, enforcing the ordering rules.
    pub fn apply(&mut self, event: &StreamEvent) -> Result<(), ProtocolViolation> {
        if self.terminated {
            return Err(ProtocolViolation::EventAfterTerminal);
        }

        match event {
            StreamEvent::MessageStart { message_id } => {
                if self.open_message.is_some() {
                    return Err(ProtocolViolation::DuplicateMessageStart {
                        message_id: message_id.clone(),
                    });
                }
                self.open_message = Some(message_id.clone());
            }
            StreamEvent::MessageContent { message_id, text } => {
                if self.open_message.as_deref() != Some(message_id.as_str()) {
                    return Err(ProtocolViolation::ContentWithoutStart {
                        message_id: message_id.clone(),
                    });
                }
                // Concatenation only; never reordered.
                self.content.push_str(text);
            }
            StreamEvent::ToolCallStart { call_id, .. } => {
                self.open_calls.insert(call_id.clone());
            }
            StreamEvent::ToolCallEnd { call_id, .. } => {
                if !self.open_calls.remove(call_id) {
                    return Err(ProtocolViolation::UnmatchedToolCallEnd {
                        call_id: call_id.clone(),
                    });
                }
            }
            StreamEvent::StateSnapshot { state } => {
                self.sync.apply_snapshot(state);
            }
            StreamEvent::StateDelta { ops } => {
                self.sync.apply_delta(ops)?;
            }
            StreamEvent::MessageEnd { .. } | StreamEvent::Error { .. } => {
                self.terminated = true;
            }
        }
        Ok(())
    }

    /// Apply one event, dropping and logging a violation instead of
    /// surfacing it. Returns whether the event was applied.
    pub fn apply_lossy(&mut self, event: &StreamEvent) -> bool {
        match self.apply(event) {
            Ok(()) => true,
            Err(violation) => {
                warn!(%violation, "dropping protocol-violating event");
                false
            }
        }
    }

    /// The accumulated message text so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The materialized state, if a snapshot has been seen.
    pub fn state(&self) -> Option<ConversationState> {
        self.sync.state()
    }

    /// Whether the current sequence has terminated.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}
