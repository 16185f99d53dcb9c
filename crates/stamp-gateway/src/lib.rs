// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/SSE gateway for the Stamp assistant.
//!
//! Exposes the action endpoint (streaming the ordered protocol event
//! sequence as `data: <json>` frames), the queue-status read endpoint,
//! and the deletion request endpoints.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{router, start_server, GatewayState, ServerConfig};
