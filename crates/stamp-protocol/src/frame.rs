// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text event-stream framing: one JSON-encoded event per `data:` frame.

use stamp_core::StampError;

use crate::events::StreamEvent;

/// Encode an event as a line-delimited `data: <json>` frame.
pub fn encode_frame(event: &StreamEvent) -> Result<String, StampError> {
    let json = serde_json::to_string(event)
        .map_err(|e| StampError::Protocol(format!("failed to encode event: {e}")))?;
    Ok(format!("data: {json}\n\n"))
}

/// Decode a single frame back into an event.
///
/// Accepts the `data:` prefix with or without the trailing blank line.
/// Returns `None` for frames that are not data frames (comments,
/// keep-alives).
pub fn decode_frame(frame: &str) -> Result<Option<StreamEvent>, StampError> {
    let Some(payload) = frame
        .lines()
        .find_map(|line| line.strip_prefix("data:"))
    else {
        return Ok(None);
    };
    let event = serde_json::from_str(payload.trim())
        .map_err(|e| StampError::Protocol(format!("failed to decode event: {e}")))?;
    Ok(Some(event))
}
