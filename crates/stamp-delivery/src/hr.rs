// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP implementation of the external HR gateway.
//!
//! Folds every failure mode -- transport errors, non-2xx statuses,
//! timeouts from the client -- into a [`SubmissionOutcome`] so callers
//! always get a definitive result to classify and, on failure, enqueue.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use stamp_config::model::HrConfig;
use stamp_core::types::{ClockAction, SubmissionOutcome};
use stamp_core::{ClockSubmission, ExternalGateway, StampError};

use crate::keycache::ApiKeyCache;

/// Wire payload for the HR time-entry endpoint.
#[derive(Debug, Serialize)]
struct PunchRequest<'a> {
    employee_id: &'a str,
    action: ClockAction,
    timestamp: String,
}

/// reqwest-backed HR gateway.
pub struct HttpHrGateway {
    client: reqwest::Client,
    base_url: String,
    key_cache: ApiKeyCache,
}

impl HttpHrGateway {
    pub fn new(config: &HrConfig) -> Result<Self, StampError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| StampError::Gateway {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_cache: ApiKeyCache::from_config(config),
        })
    }
}

#[async_trait]
impl ExternalGateway for HttpHrGateway {
    async fn submit(&self, submission: &ClockSubmission) -> SubmissionOutcome {
        let payload = PunchRequest {
            employee_id: &submission.identity,
            action: submission.action,
            timestamp: submission.target_time.to_rfc3339(),
        };

        let mut request = self
            .client
            .post(format!("{}/v1/time-entries", self.base_url))
            .json(&payload);
        if let Some(key) = self.key_cache.current().await {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    debug!(
                        identity = %submission.identity,
                        action = %submission.action,
                        "HR submission accepted"
                    );
                    SubmissionOutcome {
                        success: true,
                        error_message: None,
                        status_code: Some(status.as_u16()),
                    }
                } else {
                    let body = response.text().await.unwrap_or_default();
                    let message = if body.is_empty() {
                        status.to_string()
                    } else {
                        format!("{status}: {body}")
                    };
                    warn!(
                        identity = %submission.identity,
                        status = status.as_u16(),
                        "HR submission rejected"
                    );
                    SubmissionOutcome::failed(message, Some(status.as_u16()))
                }
            }
            Err(e) => {
                warn!(identity = %submission.identity, error = %e, "HR submission transport error");
                SubmissionOutcome::failed(format!("transport error: {e}"), None)
            }
        }
    }
}
