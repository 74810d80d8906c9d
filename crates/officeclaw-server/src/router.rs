//! Axum router construction for the world server.
//!
//! Assembles every route (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin viewer access.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::alerts;
use crate::handlers;
use crate::operator;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the world server.
///
/// The router includes:
/// - `GET /health` -- scheduler, publisher, replay and restoration stats
/// - `GET /ws/world` -- `WebSocket` world protocol
/// - `GET /api/events` -- replay page
/// - `POST /api/world-events` -- queue a world event
/// - `POST /api/agent-stream` -- publish an agent stream delta
/// - `GET /api/alerts` -- operator alerts
/// - `/api/operator/*` -- scheduler control
///
/// CORS allows any origin; viewers are served from other hosts in
/// development.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        // WebSocket
        .route("/ws/world", get(ws::ws_world))
        // REST API
        .route("/api/events", get(handlers::list_events))
        .route("/api/world-events", post(handlers::post_world_event))
        .route("/api/agent-stream", post(handlers::post_agent_stream))
        .route("/api/alerts", get(alerts::list_alerts))
        // Operator API
        .route("/api/operator/tick-rate", post(operator::set_tick_rate))
        .route("/api/operator/start", post(operator::start))
        .route("/api/operator/stop", post(operator::stop))
        .route("/api/operator/step", post(operator::step))
        .route("/api/operator/status", get(operator::status))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
