// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock external HR gateway with scripted outcomes.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use stamp_core::types::SubmissionOutcome;
use stamp_core::{ClockSubmission, ExternalGateway};

/// Scripted gateway: returns queued outcomes in order, then the default.
///
/// Records every submission for assertion.
pub struct MockHrGateway {
    scripted: Mutex<VecDeque<SubmissionOutcome>>,
    default: SubmissionOutcome,
    calls: Mutex<Vec<ClockSubmission>>,
}

impl MockHrGateway {
    /// A gateway that succeeds on every call.
    pub fn always_succeeding() -> Self {
        Self::with_default(SubmissionOutcome::ok())
    }

    /// A gateway that fails every call with the given status code.
    pub fn always_failing(status_code: u16) -> Self {
        Self::with_default(SubmissionOutcome::failed(
            format!("{status_code} scripted failure"),
            Some(status_code),
        ))
    }

    /// A gateway that fails `n` times with `status_code`, then succeeds.
    pub fn failing_times(n: usize, status_code: u16) -> Self {
        let gateway = Self::always_succeeding();
        {
            let mut scripted = gateway.scripted.lock().unwrap();
            for _ in 0..n {
                scripted.push_back(SubmissionOutcome::failed(
                    format!("{status_code} scripted failure"),
                    Some(status_code),
                ));
            }
        }
        gateway
    }

    fn with_default(default: SubmissionOutcome) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            default,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue an explicit outcome for the next call.
    pub fn push_outcome(&self, outcome: SubmissionOutcome) {
        self.scripted.lock().unwrap().push_back(outcome);
    }

    /// All submissions seen so far.
    pub fn calls(&self) -> Vec<ClockSubmission> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of submissions seen so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ExternalGateway for MockHrGateway {
    async fn submit(&self, submission: &ClockSubmission) -> SubmissionOutcome {
        self.calls.lock().unwrap().push(submission.clone());
        self.scripted
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stamp_core::types::ClockAction;

    fn submission() -> ClockSubmission {
        ClockSubmission {
            identity: "user-1".to_string(),
            action: ClockAction::ClockIn,
            target_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn scripted_outcomes_run_in_order_then_default() {
        let gateway = MockHrGateway::failing_times(2, 502);

        assert!(!gateway.submit(&submission()).await.success);
        assert!(!gateway.submit(&submission()).await.success);
        assert!(gateway.submit(&submission()).await.success);
        assert_eq!(gateway.call_count(), 3);
    }

    #[tokio::test]
    async fn calls_are_recorded() {
        let gateway = MockHrGateway::always_succeeding();
        gateway.submit(&submission()).await;
        let calls = gateway.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].identity, "user-1");
    }
}
