// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! External HR gateway seam.
//!
//! The gateway is a collaborator: the core only cares about a
//! success/failure outcome per submission. On failure the caller publishes
//! a `submission.failed` bus event; the delivery crate's handler owns the
//! enqueue, so gateway implementations never reference the queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ClockAction, SubmissionOutcome};

/// One clock action to be applied on the external HR system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSubmission {
    pub identity: String,
    pub action: ClockAction,
    /// The timestamp the action should be recorded at.
    pub target_time: DateTime<Utc>,
}

/// Performs the actual call against the external HR backend.
///
/// Infallible by design: transport and HTTP errors are folded into a
/// `SubmissionOutcome` with `success = false` so every caller gets a
/// definitive result to classify.
#[async_trait]
pub trait ExternalGateway: Send + Sync {
    async fn submit(&self, submission: &ClockSubmission) -> SubmissionOutcome;
}
