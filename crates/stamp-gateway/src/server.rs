// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state. The gateway never
//! references the submission queue directly: failures go out as bus
//! events, and the queue-status endpoint reads through the store trait.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use stamp_agent::{SessionManager, ThreadService};
use stamp_bus::EventBus;
use stamp_core::{ExternalGateway, StampError, Store};
use stamp_gdpr::DeletionLifecycle;

use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Store handle for read-side queries (queue status, device hints).
    pub store: Arc<dyn Store>,
    /// Event bus: failures out, nothing in.
    pub bus: EventBus,
    /// The external HR backend.
    pub hr: Arc<dyn ExternalGateway>,
    /// Conversation thread service.
    pub threads: ThreadService,
    /// Advisory session-collision detection.
    pub sessions: Arc<SessionManager>,
    /// Deletion request state machine.
    pub lifecycle: Arc<DeletionLifecycle>,
    /// Bound on the in-request external call.
    pub attempt_timeout: Duration,
    /// Process start time for uptime reporting.
    pub start_time: std::time::Instant,
}

/// Gateway server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

/// Build the gateway router.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/v1/actions", post(handlers::post_actions))
        .route("/v1/queue/{identity}", get(handlers::get_queue_status))
        .route("/v1/deletions", post(handlers::post_deletion))
        .route("/v1/deletions/{id}/cancel", post(handlers::cancel_deletion))
        .route("/v1/deletions/{identity}", get(handlers::get_deletion_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the gateway HTTP server and serve until the task is dropped.
pub async fn start_server(config: &ServerConfig, state: GatewayState) -> Result<(), StampError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| StampError::Gateway {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| StampError::Gateway {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    Ok(())
}
