//! Operator REST API handlers for runtime scheduler control.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/operator/tick-rate` | Change the tick rate (clamped) |
//! | `POST` | `/api/operator/start` | Start periodic ticking |
//! | `POST` | `/api/operator/stop` | Stop periodic ticking |
//! | `POST` | `/api/operator/step` | Run ticks immediately |
//! | `GET` | `/api/operator/status` | Scheduler stats and restoration gate |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use tracing::info;

use officeclaw_core::SimulationStats;

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /api/operator/tick-rate`.
#[derive(Debug, serde::Deserialize)]
pub struct SetTickRateRequest {
    /// Requested rate; rounded and clamped into the supported band.
    pub tick_rate_hz: f64,
}

/// Request body for `POST /api/operator/step`.
#[derive(Debug, serde::Deserialize)]
pub struct StepRequest {
    /// Ticks to run (default 1).
    #[serde(default = "default_step_times")]
    pub times: u32,
}

const fn default_step_times() -> u32 {
    1
}

/// Response carrying the scheduler state after an operator action.
#[derive(Debug, serde::Serialize)]
struct OperatorResponse {
    /// Whether the operation succeeded.
    ok: bool,
    /// Human-readable message.
    message: String,
    /// Scheduler stats after the action.
    simulation: SimulationStats,
}

// ---------------------------------------------------------------------------
// POST /api/operator/tick-rate
// ---------------------------------------------------------------------------

/// Change the tick rate at runtime.
///
/// Out-of-band requests are clamped rather than refused; the response
/// carries the rate actually applied.
pub async fn set_tick_rate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetTickRateRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    if !body.tick_rate_hz.is_finite() {
        return Err(ObserverError::InvalidRequest(String::from(
            "tick_rate_hz must be a finite number",
        )));
    }

    let simulation = state.simulation.set_tick_rate_hz(body.tick_rate_hz).await?;
    info!(
        requested_hz = body.tick_rate_hz,
        tick_rate_hz = simulation.tick_rate_hz,
        "Operator changed tick rate"
    );

    Ok(Json(OperatorResponse {
        ok: true,
        message: format!("Tick rate set to {}Hz", simulation.tick_rate_hz),
        simulation,
    }))
}

// ---------------------------------------------------------------------------
// POST /api/operator/start
// ---------------------------------------------------------------------------

/// Start periodic ticking. Starting a running scheduler is a no-op.
pub async fn start(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let simulation = state.simulation.start().await?;
    info!("Operator started the scheduler");

    Ok(Json(OperatorResponse {
        ok: true,
        message: "Simulation started".to_owned(),
        simulation,
    }))
}

// ---------------------------------------------------------------------------
// POST /api/operator/stop
// ---------------------------------------------------------------------------

/// Stop periodic ticking. Queued commands are still applied by `step`.
pub async fn stop(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let simulation = state.simulation.stop().await?;
    info!("Operator stopped the scheduler");

    Ok(Json(OperatorResponse {
        ok: true,
        message: "Simulation stopped".to_owned(),
        simulation,
    }))
}

// ---------------------------------------------------------------------------
// POST /api/operator/step
// ---------------------------------------------------------------------------

/// Run ticks immediately, regardless of whether the scheduler is running.
pub async fn step(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StepRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let simulation = state.simulation.step(body.times).await?;

    Ok(Json(OperatorResponse {
        ok: true,
        message: format!("Advanced to tick {}", simulation.tick_count),
        simulation,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/operator/status
// ---------------------------------------------------------------------------

/// Scheduler stats plus the restoration gate.
pub async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let simulation = state.simulation.stats().await?;

    Ok(Json(serde_json::json!({
        "simulation": simulation,
        "can_accept_commands": state.can_accept_commands(),
        "state_restoration": state.restoration,
    })))
}
