// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The action flow and its SSE delivery.
//!
//! One POST /v1/actions produces one ordered event sequence
//! (`message.start` .. `message.end`/`error`). The flow runs in a spawned
//! task writing into a channel: a client disconnect drops the receiving
//! side, but the submission, the state update, and the failure-path bus
//! publish all run to completion regardless -- durability of the user's
//! action does not depend on anyone watching.

use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use stamp_bus::BusEvent;
use stamp_core::types::{ClockAction, ConversationState};
use stamp_core::ConversationStore;
use stamp_protocol::{DeltaOp, StreamEvent};

use crate::handlers::ActionRequest;
use crate::server::GatewayState;

/// Serve the action flow as a Server-Sent Events stream.
pub async fn stream_action(
    state: GatewayState,
    request: ActionRequest,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let rx = spawn_action(state, request);
    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event)
            .unwrap_or_else(|e| format!(r#"{{"type":"error","message":"encode: {e}","recoverable":false}}"#));
        Ok(Event::default().data(data))
    });
    Sse::new(stream)
}

/// Spawn the action flow; events arrive on the returned channel as they
/// are produced. The task outlives the receiver.
pub fn spawn_action(state: GatewayState, request: ActionRequest) -> mpsc::Receiver<StreamEvent> {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(async move {
        run_action(state, request, tx).await;
    });
    rx
}

/// Emit an event, ignoring a disconnected client.
async fn emit(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) {
    if tx.send(event).await.is_err() {
        debug!("client disconnected; continuing action flow");
    }
}

/// The full flow for one user-initiated clock action.
async fn run_action(state: GatewayState, request: ActionRequest, tx: mpsc::Sender<StreamEvent>) {
    let target_time = request.target_time.unwrap_or_else(chrono::Utc::now);
    let utterance = request
        .message
        .clone()
        .unwrap_or_else(|| request.action.to_string());

    // Persist the user's message, creating the thread on first contact.
    let (mut thread, message_id) = match state
        .threads
        .record_user_message(
            &request.identity,
            &request.session_id,
            request.thread_id.as_deref(),
            &utterance,
        )
        .await
    {
        Ok(result) => result,
        Err(e) => {
            warn!(identity = %request.identity, error = %e, "failed to persist user message");
            emit(
                &tx,
                StreamEvent::Error {
                    message: "could not record your message".to_string(),
                    recoverable: true,
                },
            )
            .await;
            return;
        }
    };
    if let Some(device) = &request.device {
        thread.state.context.insert("device".to_string(), device.clone());
        thread.touch();
        // Device hint is best effort; the action proceeds without it.
        if let Err(e) = state.store.update_thread(&thread).await {
            debug!(error = %e, "failed to persist device hint");
        }
    }

    // Advisory only; never blocks the request. Runs once the current
    // session's thread exists so the grouping sees this session too.
    let collision = state
        .sessions
        .check(&request.identity, &request.session_id)
        .await;

    let assistant_message_id = uuid::Uuid::new_v4().to_string();
    emit(&tx, StreamEvent::MessageStart { message_id: assistant_message_id.clone() }).await;

    let mut spoken = String::new();
    if let Some(collision) = collision {
        let note = format!(
            "Heads up: you have {} active sessions right now. ",
            collision.sessions.len()
        );
        spoken.push_str(&note);
        emit(
            &tx,
            StreamEvent::MessageContent {
                message_id: assistant_message_id.clone(),
                text: note,
            },
        )
        .await;
    }

    // The external call, bracketed by a tool-call pair on the wire.
    let call_id = uuid::Uuid::new_v4().to_string();
    emit(
        &tx,
        StreamEvent::ToolCallStart {
            call_id: call_id.clone(),
            name: "timeclock.submit".to_string(),
        },
    )
    .await;

    let submission = stamp_core::ClockSubmission {
        identity: request.identity.clone(),
        action: request.action,
        target_time,
    };
    let outcome = match tokio::time::timeout(state.attempt_timeout, state.hr.submit(&submission)).await
    {
        Ok(outcome) => outcome,
        Err(_) => stamp_core::types::SubmissionOutcome::failed(
            format!("attempt timed out after {}s", state.attempt_timeout.as_secs()),
            None,
        ),
    };

    emit(
        &tx,
        StreamEvent::ToolCallEnd {
            call_id,
            output: Some(serde_json::json!({
                "success": outcome.success,
                "status_code": outcome.status_code,
            })),
        },
    )
    .await;

    if outcome.success {
        let confirmation = confirmation_text(request.action);
        spoken.push_str(&confirmation);
        emit(
            &tx,
            StreamEvent::MessageContent {
                message_id: assistant_message_id.clone(),
                text: confirmation,
            },
        )
        .await;

        // A client opening a fresh thread (or explicitly resyncing after a
        // reconnect) gets a full snapshot; a client continuing a thread it
        // has been watching gets cumulative deltas instead.
        let wants_snapshot = request.thread_id.is_none() || request.resync;
        match state
            .threads
            .apply_confirmed_action(
                &request.identity,
                &thread.id,
                request.action,
                target_time,
                outcome.status_code,
            )
            .await
        {
            Ok(Some(new_state)) => {
                if wants_snapshot {
                    emit(&tx, StreamEvent::StateSnapshot { state: new_state }).await;
                } else {
                    let ops = delta_ops(request.action, target_time, &new_state);
                    emit(&tx, StreamEvent::StateDelta { ops }).await;
                }
            }
            Ok(None) => {
                debug!(thread_id = %thread.id, "thread gone before confirmation applied");
            }
            Err(e) => {
                warn!(error = %e, "failed to apply confirmed action");
            }
        }
        emit(&tx, StreamEvent::MessageEnd { message_id: assistant_message_id.clone() }).await;
    } else {
        // Hand the failure to the delivery subsystem via the bus; the
        // user hears "queued", never a hard error.
        let reached = state.bus.publish(BusEvent::SubmissionFailed {
            identity: request.identity.clone(),
            action: request.action,
            target_time,
            thread_id: thread.id.clone(),
            message_id,
            error_message: outcome.error_message.clone(),
            status_code: outcome.status_code,
            context: thread.state.context.clone(),
        });

        if reached == 0 {
            // No failure handler is listening: nothing will ever retry
            // this action, so "queued" would be a lie.
            warn!(identity = %request.identity, "no delivery subsystem subscribed; submission lost");
            emit(
                &tx,
                StreamEvent::Error {
                    message: "the time system is unavailable and the retry service is down"
                        .to_string(),
                    recoverable: false,
                },
            )
            .await;
            return;
        }

        let queued = queued_text(request.action);
        spoken.push_str(&queued);
        emit(
            &tx,
            StreamEvent::MessageContent {
                message_id: assistant_message_id.clone(),
                text: queued,
            },
        )
        .await;
        emit(&tx, StreamEvent::MessageEnd { message_id: assistant_message_id.clone() }).await;
    }

    // Mirror the assistant's words into the thread (non-fatal).
    if let Err(e) = state
        .threads
        .record_assistant_message(&request.identity, &thread.id, &spoken)
        .await
    {
        debug!(error = %e, "failed to persist assistant message");
    }
}

/// The patch a continuing client applies on top of its prior snapshot.
fn delta_ops(
    action: ClockAction,
    at: chrono::DateTime<chrono::Utc>,
    state: &ConversationState,
) -> Vec<DeltaOp> {
    let mut ops = vec![
        DeltaOp::Set {
            field: "clocked_in".to_string(),
            value: serde_json::json!(state.clocked_in),
        },
        DeltaOp::Set {
            field: "last_action".to_string(),
            value: serde_json::json!(action),
        },
    ];
    match action {
        ClockAction::ClockIn => ops.push(DeltaOp::Set {
            field: "last_clock_in".to_string(),
            value: serde_json::json!(at),
        }),
        ClockAction::ClockOut => ops.push(DeltaOp::Set {
            field: "last_clock_out".to_string(),
            value: serde_json::json!(at),
        }),
    }
    ops
}

fn confirmation_text(action: ClockAction) -> String {
    match action {
        ClockAction::ClockIn => "You're clocked in.".to_string(),
        ClockAction::ClockOut => "You're clocked out.".to_string(),
    }
}

fn queued_text(action: ClockAction) -> String {
    let verb = match action {
        ClockAction::ClockIn => "clock-in",
        ClockAction::ClockOut => "clock-out",
    };
    format!("The time system didn't answer, so I've queued your {verb} and will keep retrying.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use stamp_agent::{SessionManager, ThreadService};
    use stamp_bus::EventBus;
    use stamp_core::Store;
    use stamp_gdpr::DeletionLifecycle;
    use stamp_storage::MemoryStore;
    use stamp_test_utils::MockHrGateway;

    fn make_state(gateway: MockHrGateway) -> (GatewayState, Arc<MemoryStore>) {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let store_dyn: Arc<dyn Store> = store.clone();
        let bus = EventBus::default();
        let state = GatewayState {
            store: store_dyn.clone(),
            bus: bus.clone(),
            hr: Arc::new(gateway),
            threads: ThreadService::new(store_dyn.clone()),
            sessions: Arc::new(SessionManager::new(store_dyn.clone(), 30)),
            lifecycle: Arc::new(DeletionLifecycle::new(store_dyn, bus, 30)),
            attempt_timeout: Duration::from_secs(30),
            start_time: std::time::Instant::now(),
        };
        (state, store)
    }

    fn request() -> ActionRequest {
        ActionRequest {
            identity: "user-1".to_string(),
            session_id: "sess-1".to_string(),
            thread_id: None,
            action: ClockAction::ClockIn,
            target_time: None,
            message: Some("clock me in please".to_string()),
            device: None,
            resync: false,
        }
    }

    async fn collect(mut rx: tokio::sync::mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn successful_action_emits_snapshot_then_end() {
        let (state, _store) = make_state(MockHrGateway::always_succeeding());
        let events = collect(spawn_action(state, request())).await;

        assert!(matches!(events.first(), Some(StreamEvent::MessageStart { .. })));
        assert!(matches!(events.last(), Some(StreamEvent::MessageEnd { .. })));

        let snapshot = events.iter().find_map(|e| match e {
            StreamEvent::StateSnapshot { state } => Some(state.clone()),
            _ => None,
        });
        assert!(snapshot.unwrap().clocked_in, "snapshot must carry the confirmed state");

        // Tool-call pair is well formed.
        let start_id = events.iter().find_map(|e| match e {
            StreamEvent::ToolCallStart { call_id, .. } => Some(call_id.clone()),
            _ => None,
        });
        let end_id = events.iter().find_map(|e| match e {
            StreamEvent::ToolCallEnd { call_id, .. } => Some(call_id.clone()),
            _ => None,
        });
        assert_eq!(start_id, end_id);
    }

    #[tokio::test]
    async fn continuing_thread_gets_deltas_that_materialize_like_a_snapshot() {
        let (state, store) = make_state(MockHrGateway::always_succeeding());

        // First action: fresh thread, full snapshot.
        let first = collect(spawn_action(state.clone(), request())).await;
        let mut consumer = stamp_protocol::StreamConsumer::new();
        for event in &first {
            assert!(consumer.apply_lossy(event));
        }
        assert!(consumer.state().unwrap().clocked_in);

        // Second action continues the same thread: a delta, not a snapshot.
        use stamp_core::ConversationStore;
        let thread_id = store.recent_threads("user-1", 1).await.unwrap()[0].id.clone();
        let mut follow_up = request();
        follow_up.thread_id = Some(thread_id);
        follow_up.action = ClockAction::ClockOut;
        let second = collect(spawn_action(state, follow_up)).await;

        assert!(!second.iter().any(|e| matches!(e, StreamEvent::StateSnapshot { .. })));
        assert!(second.iter().any(|e| matches!(e, StreamEvent::StateDelta { .. })));

        consumer.begin_sequence();
        for event in &second {
            assert!(consumer.apply_lossy(event));
        }
        let materialized = consumer.state().unwrap();
        assert!(!materialized.clocked_in);
        assert!(materialized.last_clock_out.is_some());
        assert_eq!(materialized.last_action, Some(ClockAction::ClockOut));
    }

    #[tokio::test]
    async fn resyncing_client_gets_a_fresh_snapshot() {
        let (state, store) = make_state(MockHrGateway::always_succeeding());
        collect(spawn_action(state.clone(), request())).await;

        use stamp_core::ConversationStore;
        let thread_id = store.recent_threads("user-1", 1).await.unwrap()[0].id.clone();
        let mut reconnect = request();
        reconnect.thread_id = Some(thread_id);
        reconnect.action = ClockAction::ClockOut;
        reconnect.resync = true;
        let events = collect(spawn_action(state, reconnect)).await;

        // A reconnecting client must not be fed stale deltas.
        assert!(events.iter().any(|e| matches!(e, StreamEvent::StateSnapshot { .. })));
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::StateDelta { .. })));
    }

    #[tokio::test]
    async fn failed_action_publishes_to_bus_and_says_queued() {
        let (state, _store) = make_state(MockHrGateway::always_failing(502));
        let mut bus_rx = state.bus.subscribe();

        let events = collect(spawn_action(state, request())).await;

        // No snapshot, no error event: the user hears "queued".
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::StateSnapshot { .. })));
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::Error { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            StreamEvent::MessageContent { text, .. } if text.contains("queued")
        )));
        assert!(matches!(events.last(), Some(StreamEvent::MessageEnd { .. })));

        let envelope = bus_rx.recv().await.unwrap();
        match envelope.event {
            BusEvent::SubmissionFailed { identity, status_code, .. } => {
                assert_eq!(identity, "user-1");
                assert_eq!(status_code, Some(502));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_without_a_delivery_subsystem_is_a_non_recoverable_error() {
        // No bus subscriber: the submission can never be retried.
        let (state, _store) = make_state(MockHrGateway::always_failing(502));
        let events = collect(spawn_action(state, request())).await;

        let error = events.iter().find_map(|e| match e {
            StreamEvent::Error { recoverable, .. } => Some(*recoverable),
            _ => None,
        });
        assert_eq!(error, Some(false), "a lost submission must surface as non-recoverable");
        assert!(!events.iter().any(|e| matches!(
            e,
            StreamEvent::MessageContent { text, .. } if text.contains("queued")
        )));
    }

    #[tokio::test]
    async fn failed_action_does_not_touch_state() {
        let (state, store) = make_state(MockHrGateway::always_failing(503));
        let threads = state.threads.clone();
        let events = collect(spawn_action(state, request())).await;
        assert!(!events.is_empty());

        use stamp_core::ConversationStore;
        let thread = &store.recent_threads("user-1", 1).await.unwrap()[0];
        let state = threads.current_state("user-1", &thread.id).await.unwrap().unwrap();
        assert!(!state.clocked_in, "unconfirmed submission must not change state");
    }

    #[tokio::test]
    async fn session_collision_produces_an_advisory_line() {
        let (state, store) = make_state(MockHrGateway::always_succeeding());
        // Seed a second active session.
        use stamp_core::ConversationStore;
        store
            .create_thread(&stamp_core::types::ConversationThread::new("user-1", "sess-other"))
            .await
            .unwrap();

        let events = collect(spawn_action(state, request())).await;
        assert!(events.iter().any(|e| matches!(
            e,
            StreamEvent::MessageContent { text, .. } if text.contains("active sessions")
        )));
    }

    #[tokio::test]
    async fn disconnected_client_does_not_cancel_the_flow() {
        let (state, store) = make_state(MockHrGateway::always_succeeding());
        let threads = state.threads.clone();

        // Drop the receiver immediately: nobody is watching.
        let rx = spawn_action(state, request());
        drop(rx);

        // The confirmed state still lands.
        use stamp_core::ConversationStore;
        let mut confirmed = false;
        for _ in 0..100 {
            let recent = store.recent_threads("user-1", 1).await.unwrap();
            if let Some(thread) = recent.first()
                && threads
                    .current_state("user-1", &thread.id)
                    .await
                    .unwrap()
                    .is_some_and(|s| s.clocked_in)
            {
                confirmed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(confirmed, "action must complete without a watcher");
    }
}
