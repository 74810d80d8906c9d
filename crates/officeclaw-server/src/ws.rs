//! `WebSocket` handler for the world protocol.
//!
//! Clients connect to `GET /ws/world`. Each connection runs one task that
//! multiplexes the socket with the shared event, snapshot and agent stream
//! broadcasts, and hands everything to its [`Session`].
//!
//! A lagging snapshot or agent stream receiver skips to the newest
//! message. A lagging event receiver re-reads the gap from the timeline,
//! so clients still see every event in seq order.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use officeclaw_types::Envelope;

use crate::session::Session;
use crate::state::{AppState, now_ms};

/// Upgrade an HTTP request to a world protocol session.
///
/// # Route
///
/// `GET /ws/world`
pub async fn ws_world(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

async fn send_all(socket: &mut WebSocket, outbound: Vec<Envelope>) -> bool {
    for envelope in outbound {
        let json = match serde_json::to_string(&envelope) {
            Ok(json) => json,
            Err(e) => {
                warn!(msg_type = %envelope.msg_type, "Failed to serialize envelope: {e}");
                continue;
            }
        };
        if socket.send(Message::Text(json.into())).await.is_err() {
            return false;
        }
    }
    true
}

async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    let mut session = Session::new();
    state.telemetry().record_connected();
    info!(session_id = %session.session_id().as_str(), "Session connected");

    let mut events = state.events.subscribe();
    let mut snapshots = state.snapshots.subscribe();
    let mut agent_streams = state.agent_streams.subscribe();

    loop {
        let outbound: Vec<Envelope> = tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => session.handle_text(&state, text.as_str()).await,
                    Some(Ok(Message::Binary(bytes))) => {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        session.handle_text(&state, &text).await
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            break;
                        }
                        continue;
                    }
                    Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        state.telemetry().record_socket_error(now_ms());
                        warn!(session_id = %session.session_id().as_str(), "WebSocket error: {e}");
                        break;
                    }
                }
            }
            result = events.recv() => {
                match result {
                    Ok(event) => session.deliver_event(&state, &event).into_iter().collect(),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Event feed lagged, catching up from the timeline");
                        session.catch_up(&state)
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            result = snapshots.recv() => {
                match result {
                    Ok(snapshot) => session.deliver_snapshot(&state, &snapshot).into_iter().collect(),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Snapshot feed lagged, skipping ahead");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            result = agent_streams.recv() => {
                match result {
                    Ok(payload) => session.deliver_agent_stream(&state, &payload).into_iter().collect(),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Agent stream feed lagged, skipping ahead");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        };

        if !send_all(&mut socket, outbound).await {
            debug!("WebSocket client disconnected (send failed)");
            break;
        }
    }

    state.telemetry().record_disconnected();
    info!(
        session_id = %session.session_id().as_str(),
        last_event_seq = session.last_event_seq(),
        "Session disconnected"
    );
}
