// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Snapshot/delta streaming protocol for the Stamp assistant.
//!
//! Defines the ordered server-to-client event sequence emitted for each
//! user action, the `data: <json>` wire framing, and the client-side
//! materializer that keeps a remote view consistent across partial
//! failures and reconnects.

pub mod events;
pub mod frame;
pub mod sync;

pub use events::{DeltaOp, StreamEvent};
pub use frame::{decode_frame, encode_frame};
pub use sync::{ProtocolViolation, StateSync, StreamConsumer};
