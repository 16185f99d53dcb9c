// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation management for the Stamp assistant.
//!
//! [`ThreadService`] owns thread creation, message ordering, and the
//! confirmation gate on conversation state. [`SessionManager`] flags
//! concurrent sessions (advisory only). [`OutcomeApplier`] folds terminal
//! delivery results from the bus back into threads.

pub mod outcome;
pub mod sessions;
pub mod threads;

pub use outcome::OutcomeApplier;
pub use sessions::{SessionCollision, SessionManager};
pub use threads::ThreadService;
