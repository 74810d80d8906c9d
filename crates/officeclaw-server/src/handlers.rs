//! HTTP handlers for health, event replay and external ingestion.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Scheduler, publisher, replay, security, timeline and restoration stats |
//! | `GET` | `/api/events` | One replay page (`?cursor=&limit=`) |
//! | `POST` | `/api/world-events` | Queue a world event for the next tick |
//! | `POST` | `/api/agent-stream` | Publish an agent stream delta |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use officeclaw_core::Simulation;
use officeclaw_core::config::{MAX_SNAPSHOT_RATE_HZ, MIN_SNAPSHOT_RATE_HZ};
use officeclaw_events::EventTimeline;
use officeclaw_types::ErrorCode;

use crate::error::ObserverError;
use crate::state::{AppState, now_ms};

/// Default page size for `GET /api/events`.
pub const DEFAULT_EVENT_PAGE_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Server health.
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let simulation = state.simulation.stats().await?;
    let timeline = state.events.read(EventTimeline::stats);
    let settings = state.settings;

    let telemetry = state.telemetry();
    let body = json!({
        "ok": true,
        "simulation": simulation,
        "snapshot_publisher": {
            "rate_hz": settings.snapshot_rate_hz,
            "interval_ms": settings.snapshot_interval_ms(),
            "published_count": telemetry.publisher.published_count,
            "last_published_ts": telemetry.publisher.last_published_ts,
        },
        "replay_resync": {
            "resume_attempts": telemetry.replay.resume_attempts,
            "resume_success": telemetry.replay.resume_success,
            "resume_fallback": telemetry.replay.resume_fallback,
            "replayed_events": telemetry.replay.replayed_events,
            "fallback_reasons": telemetry.replay.fallback_reasons,
            "replay_limit": settings.replay_limit,
            "buffer_size": settings.event_buffer_size,
        },
        "command_security": {
            "rate_limited": telemetry.security.rate_limited,
            "validation_failed": telemetry.security.validation_failed,
            "rate_limit": settings.rate_limit,
        },
        "event_timeline": timeline,
        "observability": telemetry.observability_json(),
        "error_dashboard": telemetry.error_dashboard(state.restoration.consistency_ok),
        "state_restoration": state.restoration,
        "tick_rate_bounds_hz": Simulation::tick_rate_bounds(),
        "snapshot_rate_bounds_hz": {
            "min_hz": MIN_SNAPSHOT_RATE_HZ,
            "max_hz": MAX_SNAPSHOT_RATE_HZ,
        },
    });
    drop(telemetry);

    Ok(Json(body))
}

// ---------------------------------------------------------------------------
// GET /api/events
// ---------------------------------------------------------------------------

/// Query parameters for `GET /api/events`.
#[derive(Debug, Deserialize)]
pub struct EventPageQuery {
    /// Last seq the caller has seen; defaults to 0.
    pub cursor: Option<u64>,
    /// Page size; defaults to [`DEFAULT_EVENT_PAGE_LIMIT`].
    pub limit: Option<usize>,
}

/// One replay page of the timeline.
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventPageQuery>,
) -> impl IntoResponse {
    let cursor = query.cursor.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_PAGE_LIMIT).max(1);
    let page = state
        .events
        .read(|timeline| timeline.replay_from_cursor(cursor, limit));
    Json(page)
}

// ---------------------------------------------------------------------------
// POST /api/world-events
// ---------------------------------------------------------------------------

/// Queue a world event (`{name, ...}`) for the next tick.
pub async fn post_world_event(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ObserverError> {
    let name = body
        .as_object()
        .and_then(|event| event.get("name"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| {
            ObserverError::InvalidRequest(String::from("world event requires a string name"))
        })?;

    state.simulation.submit_event(body).await?;
    debug!(name = %name, "World event queued");
    Ok((StatusCode::ACCEPTED, Json(json!({"ok": true, "queued": name}))))
}

// ---------------------------------------------------------------------------
// POST /api/agent-stream
// ---------------------------------------------------------------------------

/// Publish an agent stream delta to subscribed sessions.
///
/// Accepted deltas are broadcast as `agent_stream` frames; a throttled
/// `task_progress` preview event is appended to the timeline alongside.
pub async fn post_agent_stream(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ObserverError> {
    let (payload, preview) = {
        let mut streams = state.agent_stream_state();
        let payload = streams
            .accept(&body)
            .map_err(|outcome| ObserverError::Rejected {
                code: outcome.code.unwrap_or(ErrorCode::ValidationFailed),
                message: outcome.message.unwrap_or_default(),
            })?;
        let preview = streams.preview(&payload, now_ms());
        (payload, preview)
    };

    // Zero receivers is normal when nobody is connected.
    let _ = state.agent_streams.send(payload.clone());
    let preview_seq = preview
        .and_then(|preview| state.events.publish("task_progress", preview.payload))
        .map(|event| event.seq);

    Ok(Json(json!({
        "ok": true,
        "payload": payload,
        "preview_event_seq": preview_seq,
    })))
}
