// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the core and its collaborators.

pub mod gateway;
pub mod store;

pub use gateway::{ClockSubmission, ExternalGateway};
pub use store::{AuditStore, ConversationStore, DeletionRequestStore, QueueStore, Store};
