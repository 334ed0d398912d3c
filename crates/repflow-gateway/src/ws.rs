// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket endpoint streaming workflow events per conversation.
//!
//! Server -> Client (JSON):
//! ```json
//! {"event": "workflow_started", "conversation_id": "...", "run_id": "...",
//!  "attempt": 1, "data": {...}, "emitted_at": "..."}
//! {"event": "events_dropped", "dropped": 3}
//! ```
//!
//! Client -> Server: `{"type": "ping"}` keep-alives are answered with
//! `{"event": "pong"}`; everything else is ignored.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use repflow_core::types::WorkflowEvent;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::server::GatewayState;

/// WebSocket upgrade handler for GET /v1/conversations/{id}/events.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(conversation_id): Path<String>,
    State(state): State<GatewayState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, conversation_id, state))
}

/// Serializes a workflow event into its wire envelope.
pub fn event_envelope(event: &WorkflowEvent) -> serde_json::Value {
    serde_json::json!({
        "event": event.kind,
        "conversation_id": event.conversation_id,
        "run_id": event.run_id,
        "attempt": event.attempt,
        "data": event.payload,
        "emitted_at": event.emitted_at,
    })
}

/// Forwards the conversation's event stream to one WebSocket client.
///
/// A subscriber that falls behind its bounded buffer loses the oldest
/// events; the lag is reported to the client and counted in metrics, and
/// forwarding continues with the newest events.
async fn handle_socket(socket: WebSocket, conversation_id: String, state: GatewayState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.events.subscribe(&conversation_id);

    debug!(
        conversation_id = conversation_id.as_str(),
        "websocket subscriber connected"
    );

    // Connection acknowledgement, mirroring the REST envelope shape.
    let hello = serde_json::json!({
        "event": "connected",
        "conversation_id": conversation_id,
    });
    if sender.send(Message::Text(hello.to_string().into())).await.is_err() {
        state.events.remove_if_idle(&conversation_id);
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let text = event_envelope(&event).to_string();
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(dropped)) => {
                        warn!(
                            conversation_id = conversation_id.as_str(),
                            dropped, "websocket subscriber lagged, events dropped"
                        );
                        state.events.note_dropped(dropped);
                        repflow_metrics::record_events_dropped(dropped);
                        let notice = serde_json::json!({
                            "event": "events_dropped",
                            "dropped": dropped,
                        });
                        if sender.send(Message::Text(notice.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let text_str: &str = &text;
                        if let Ok(value) = serde_json::from_str::<serde_json::Value>(text_str)
                            && value.get("type").and_then(|t| t.as_str()) == Some("ping")
                        {
                            let pong = serde_json::json!({"event": "pong"});
                            if sender.send(Message::Text(pong.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore binary and ping/pong frames.
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket receive error");
                        break;
                    }
                }
            }
        }
    }

    debug!(
        conversation_id = conversation_id.as_str(),
        "websocket subscriber disconnected"
    );
    state.events.remove_if_idle(&conversation_id);
}
