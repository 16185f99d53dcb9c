// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server wiring: storage, bus, background workers, and the gateway.
//!
//! The gateway and the queue never see each other -- both talk to the bus.
//! Background workers run until ctrl-c cancels the shared token, at which
//! point in-flight work finishes and the process exits.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use stamp_agent::{OutcomeApplier, SessionManager, ThreadService};
use stamp_bus::EventBus;
use stamp_config::StampConfig;
use stamp_core::{ExternalGateway, StampError};
use stamp_delivery::{FailureHandler, HttpHrGateway, RetryProcessor, SubmissionQueue};
use stamp_gateway::{GatewayState, ServerConfig};
use stamp_gdpr::{DeletionLifecycle, DeletionSweeper};

/// Run the full server until ctrl-c.
pub async fn run(config: StampConfig) -> Result<(), StampError> {
    let store = stamp_storage::make_store(&config.storage).await?;
    info!(backend = %config.storage.backend, "storage ready");

    let bus = EventBus::default();
    let threads = ThreadService::new(store.clone());
    let sessions = Arc::new(SessionManager::new(
        store.clone(),
        config.session.window_minutes,
    ));
    let lifecycle = Arc::new(DeletionLifecycle::new(
        store.clone(),
        bus.clone(),
        config.deletion.grace_days,
    ));
    let queue = Arc::new(SubmissionQueue::new(store.clone(), config.delivery.clone()));
    let hr: Arc<dyn ExternalGateway> = Arc::new(HttpHrGateway::new(&config.hr)?);

    let cancel = CancellationToken::new();
    let mut workers = Vec::new();

    // Failure handler: turns bus failures into durable queue items.
    {
        let handler = FailureHandler::new(queue.clone());
        let bus = bus.clone();
        let token = cancel.child_token();
        workers.push(tokio::spawn(async move { handler.run(bus, token).await }));
    }

    // Retry processor: drains ready items with backoff.
    {
        let processor = RetryProcessor::new(queue.clone(), hr.clone(), bus.clone(), &config.delivery);
        let token = cancel.child_token();
        workers.push(tokio::spawn(async move { processor.run(token).await }));
    }

    // Outcome applier: folds terminal results back into conversations.
    {
        let applier = OutcomeApplier::new(threads.clone());
        let bus = bus.clone();
        let token = cancel.child_token();
        workers.push(tokio::spawn(async move { applier.run(bus, token).await }));
    }

    // Deletion sweeper: processes due erasure requests.
    {
        let sweeper = DeletionSweeper::new(lifecycle.clone(), config.deletion.sweep_interval_secs);
        let token = cancel.child_token();
        workers.push(tokio::spawn(async move { sweeper.run(token).await }));
    }

    let state = GatewayState {
        store,
        bus,
        hr,
        threads,
        sessions,
        lifecycle,
        attempt_timeout: Duration::from_secs(config.delivery.attempt_timeout_secs),
        start_time: std::time::Instant::now(),
    };
    let server_config = ServerConfig {
        host: config.gateway.host.clone(),
        port: config.gateway.port,
    };

    let result = tokio::select! {
        result = stamp_gateway::start_server(&server_config, state) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            Ok(())
        }
    };

    cancel.cancel();
    for worker in workers {
        let _ = worker.await;
    }
    info!("all workers stopped");

    result
}
