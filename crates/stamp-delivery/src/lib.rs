// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reliable delivery for the Stamp assistant.
//!
//! A failed HR submission becomes a durable [`queue::SubmissionQueue`]
//! item via the bus-subscribed [`handler::FailureHandler`]; the
//! [`processor::RetryProcessor`] retries it with exponential backoff and
//! bounded attempts, publishing the terminal outcome back on the bus.
//! [`hr::HttpHrGateway`] is the concrete external gateway, with its
//! credential held in the pull-refreshed [`keycache::ApiKeyCache`].

pub mod handler;
pub mod hr;
pub mod keycache;
pub mod processor;
pub mod queue;

pub use handler::FailureHandler;
pub use hr::HttpHrGateway;
pub use keycache::{ApiKeyCache, KeySource};
pub use processor::RetryProcessor;
pub use queue::{EnqueueRequest, SubmissionQueue};
