// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.
//!
//! Handles POST /v1/actions, GET /v1/queue/{identity}, the deletion
//! request endpoints, and GET /health.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stamp_core::types::{ClockAction, DeletionRequest};
use stamp_core::{QueueStore, StampError};
use stamp_protocol::StreamEvent;

use crate::server::GatewayState;
use crate::sse;

/// Request body for POST /v1/actions.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionRequest {
    /// Owner identity of the conversation and the queued action.
    pub identity: String,
    /// Conversation session this request belongs to.
    pub session_id: String,
    /// Existing thread to continue; omitted on the first message.
    #[serde(default)]
    pub thread_id: Option<String>,
    /// The state-changing action to apply.
    pub action: ClockAction,
    /// When the action should take effect; defaults to now.
    #[serde(default)]
    pub target_time: Option<DateTime<Utc>>,
    /// The user's utterance, recorded verbatim in the thread.
    #[serde(default)]
    pub message: Option<String>,
    /// Device hint for session-collision advisories.
    #[serde(default)]
    pub device: Option<String>,
    /// Set by a reconnecting client that lost its materialized state:
    /// forces a full snapshot instead of deltas.
    #[serde(default)]
    pub resync: bool,
}

/// Non-streaming response for POST /v1/actions.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    /// "confirmed" or "queued".
    pub result: String,
    /// All stream events the action produced, in order.
    pub events: Vec<StreamEvent>,
}

/// Response for GET /v1/queue/{identity}.
#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    pub status: String,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub last_status_code: Option<u16>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Request body for deletion submit/cancel.
#[derive(Debug, Deserialize)]
pub struct DeletionSubmitRequest {
    pub identity: String,
}

/// Request body for POST /v1/deletions/{id}/cancel.
#[derive(Debug, Deserialize)]
pub struct DeletionCancelRequest {
    pub identity: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Map a core error onto an HTTP response.
fn error_response(e: StampError) -> Response {
    let status = match &e {
        StampError::NotFound { .. } => StatusCode::NOT_FOUND,
        StampError::Conflict(_) | StampError::InvalidTransition { .. } => StatusCode::CONFLICT,
        StampError::Config(_) | StampError::Protocol(_) => StatusCode::BAD_REQUEST,
        StampError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: e.to_string() })).into_response()
}

/// POST /v1/actions
///
/// Runs the clock action flow. With `Accept: text/event-stream` the
/// ordered event sequence streams as SSE; otherwise the same events are
/// collected and returned as one JSON document.
pub async fn post_actions(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(body): Json<ActionRequest>,
) -> Response {
    let accept = headers
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if accept.contains("text/event-stream") {
        return sse::stream_action(state, body).await.into_response();
    }

    let mut rx = sse::spawn_action(state, body);
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    let result = if events
        .iter()
        .any(|e| matches!(e, StreamEvent::StateSnapshot { .. }))
    {
        "confirmed"
    } else {
        "queued"
    };
    (
        StatusCode::OK,
        Json(ActionResponse {
            result: result.to_string(),
            events,
        }),
    )
        .into_response()
}

/// GET /v1/queue/{identity}
///
/// Status of the identity's most recent queued submission.
pub async fn get_queue_status(
    State(state): State<GatewayState>,
    Path(identity): Path<String>,
) -> Response {
    match state.store.latest_for_identity(&identity).await {
        Ok(Some(item)) => (
            StatusCode::OK,
            Json(QueueStatusResponse {
                status: item.status.to_string(),
                retry_count: item.retry_count,
                last_error: item.last_error,
                last_status_code: item.last_status_code,
                next_retry_at: item.next_retry_at,
            }),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "no queued submissions for this identity".to_string(),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /v1/deletions
pub async fn post_deletion(
    State(state): State<GatewayState>,
    Json(body): Json<DeletionSubmitRequest>,
) -> Response {
    match state.lifecycle.submit_request(&body.identity).await {
        Ok(request) => (StatusCode::CREATED, Json(request)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /v1/deletions/{id}/cancel
pub async fn cancel_deletion(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<DeletionCancelRequest>,
) -> Response {
    match state.lifecycle.cancel(&body.identity, &id, body.reason).await {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /v1/deletions/{identity}
pub async fn get_deletion_status(
    State(state): State<GatewayState>,
    Path(identity): Path<String>,
) -> Response {
    match state.lifecycle.status(&identity).await {
        Ok(Some(request)) => (StatusCode::OK, Json::<DeletionRequest>(request)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "no deletion request for this identity".to_string(),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_request_deserializes_with_minimal_fields() {
        let json = r#"{"identity": "user-1", "session_id": "sess-1", "action": "clock_in"}"#;
        let request: ActionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.identity, "user-1");
        assert_eq!(request.action, ClockAction::ClockIn);
        assert!(request.thread_id.is_none());
        assert!(request.target_time.is_none());
        assert!(!request.resync);
    }

    #[test]
    fn action_request_deserializes_with_all_fields() {
        let json = r#"{
            "identity": "user-1",
            "session_id": "sess-1",
            "thread_id": "t-9",
            "action": "clock_out",
            "target_time": "2026-08-07T17:00:00Z",
            "message": "heading home",
            "device": "phone"
        }"#;
        let request: ActionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.action, ClockAction::ClockOut);
        assert_eq!(request.thread_id.as_deref(), Some("t-9"));
        assert_eq!(request.device.as_deref(), Some("phone"));
    }

    #[test]
    fn queue_status_response_serializes() {
        let response = QueueStatusResponse {
            status: "pending".to_string(),
            retry_count: 2,
            last_error: Some("502 Bad Gateway".to_string()),
            last_status_code: Some(502),
            next_retry_at: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"pending\""));
        assert!(json.contains("\"retry_count\":2"));
    }

    #[test]
    fn error_mapping_matches_semantics() {
        let not_found = error_response(StampError::NotFound {
            entity: "thread",
            id: "x".into(),
        });
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let conflict = error_response(StampError::Conflict("busy".into()));
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let transition = error_response(StampError::InvalidTransition {
            entity: "deletion request",
            from: "Completed".into(),
            to: "Processing".into(),
        });
        assert_eq!(transition.status(), StatusCode::CONFLICT);
    }
}
