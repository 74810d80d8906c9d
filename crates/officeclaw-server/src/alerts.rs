//! Threshold alerts and the error dashboard.
//!
//! Counters and timings are compared against configured thresholds. An
//! alert fires once each time a value reaches a new multiple of its
//! threshold, so a counter stuck at a high value does not flood the log.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/alerts` | List emitted alerts, newest first |

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;
use tracing::warn;

use officeclaw_core::config::AlertThresholds;

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Alert types
// ---------------------------------------------------------------------------

/// Maximum alerts to keep in memory.
pub const MAX_ALERTS: usize = 500;

/// Severity level of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Something is off but not critical.
    Warning,
    /// Immediate attention required.
    Critical,
}

/// Signal an alert is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKey {
    /// Commands rejected as malformed.
    ValidationFailed,
    /// Commands throttled.
    RateLimited,
    /// Socket errors.
    SocketErrors,
    /// Commands refused by the restoration gate.
    RestorationBlocked,
    /// Restoration consistency checks failed.
    RestorationInconsistent,
    /// Last tick duration.
    #[serde(rename = "slow_tick_ms")]
    SlowTick,
    /// p95 queue latency.
    #[serde(rename = "queue_latency_ms")]
    QueueLatency,
}

impl AlertKey {
    /// Wire spelling of the key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "validation_failed",
            Self::RateLimited => "rate_limited",
            Self::SocketErrors => "socket_errors",
            Self::RestorationBlocked => "restoration_blocked",
            Self::RestorationInconsistent => "restoration_inconsistent",
            Self::SlowTick => "slow_tick_ms",
            Self::QueueLatency => "queue_latency_ms",
        }
    }

    /// Configured threshold for this key.
    pub fn threshold(self, thresholds: &AlertThresholds) -> f64 {
        match self {
            Self::ValidationFailed => count_f64(thresholds.validation_failed),
            Self::RateLimited => count_f64(thresholds.rate_limited),
            Self::SocketErrors => count_f64(thresholds.socket_errors),
            Self::RestorationBlocked => count_f64(thresholds.restoration_blocked),
            Self::RestorationInconsistent => 1.0,
            Self::SlowTick => thresholds.slow_tick_ms,
            Self::QueueLatency => thresholds.queue_latency_ms,
        }
    }
}

/// Counter value as a float.
pub fn count_f64(value: u64) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

/// An emitted threshold alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    /// Signal.
    pub key: AlertKey,
    /// Severity.
    pub severity: AlertSeverity,
    /// Observed value.
    pub value: f64,
    /// Threshold crossed.
    pub threshold: f64,
    /// Human-readable message.
    pub message: String,
    /// Emission time in epoch milliseconds.
    pub ts: i64,
}

fn satisfied(value: f64, threshold: f64) -> bool {
    threshold.is_finite() && threshold > 0.0 && value >= threshold
}

// ---------------------------------------------------------------------------
// Alert monitor
// ---------------------------------------------------------------------------

/// Bucketed threshold tracking plus a bounded store of emitted alerts.
#[derive(Debug, Clone)]
pub struct AlertMonitor {
    thresholds: AlertThresholds,
    buckets: HashMap<AlertKey, f64>,
    /// Emitted alerts, newest first.
    alerts: VecDeque<Alert>,
    emitted: u64,
}

impl AlertMonitor {
    /// A monitor with no alerts.
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self {
            thresholds,
            buckets: HashMap::new(),
            alerts: VecDeque::new(),
            emitted: 0,
        }
    }

    /// Thresholds in effect.
    pub const fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Total alerts emitted.
    pub const fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Emitted alerts, newest first.
    pub fn alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter()
    }

    /// Emit an alert if `value` reached a new multiple of the threshold.
    pub fn check(
        &mut self,
        key: AlertKey,
        value: f64,
        severity: AlertSeverity,
        message: &str,
        now_ms: i64,
    ) -> Option<Alert> {
        let threshold = key.threshold(&self.thresholds);
        if !threshold.is_finite() || threshold <= 0.0 || !value.is_finite() {
            return None;
        }
        let bucket = (value / threshold).floor();
        let prior = self.buckets.get(&key).copied().unwrap_or(0.0);
        if bucket < 1.0 || bucket <= prior {
            return None;
        }
        self.buckets.insert(key, bucket);

        let alert = Alert {
            key,
            severity,
            value,
            threshold,
            message: message.to_owned(),
            ts: now_ms,
        };
        self.emitted = self.emitted.saturating_add(1);
        warn!(
            key = key.as_str(),
            severity = ?severity,
            value,
            threshold,
            "{message}"
        );
        self.alerts.push_front(alert.clone());
        self.alerts.truncate(MAX_ALERTS);
        Some(alert)
    }
}

// ---------------------------------------------------------------------------
// Error dashboard
// ---------------------------------------------------------------------------

/// Overall dashboard state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DashboardStatus {
    /// No signal over threshold.
    Healthy,
    /// At least one warning.
    Warning,
    /// At least one critical signal.
    Critical,
}

/// One signal currently over its threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardAlert {
    /// Signal.
    pub key: AlertKey,
    /// Severity.
    pub severity: AlertSeverity,
    /// Current value.
    pub value: f64,
    /// Threshold.
    pub threshold: f64,
    /// Human-readable message.
    pub message: &'static str,
}

/// Inputs the dashboard is computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DashboardSignals {
    /// Throttled commands.
    pub rate_limited: u64,
    /// Commands rejected as malformed.
    pub validation_failed: u64,
    /// Socket errors.
    pub socket_errors: u64,
    /// Commands refused by the restoration gate.
    pub restoration_blocked: u64,
    /// Whether restoration passed its checks.
    pub restoration_consistent: bool,
    /// Last tick duration, milliseconds.
    pub tick_duration_ms: f64,
    /// Larger of the command and event p95 queue latencies.
    pub queue_latency_p95_ms: f64,
}

/// Signals over threshold right now, and the resulting status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDashboard {
    /// Overall status.
    pub status: DashboardStatus,
    /// Signals over threshold.
    pub alerts: Vec<DashboardAlert>,
}

impl ErrorDashboard {
    /// Evaluate `signals` against `thresholds`.
    pub fn evaluate(signals: &DashboardSignals, thresholds: &AlertThresholds) -> Self {
        let candidates = [
            (
                AlertKey::RateLimited,
                count_f64(signals.rate_limited),
                AlertSeverity::Warning,
                "Command throttling is elevated.",
            ),
            (
                AlertKey::ValidationFailed,
                count_f64(signals.validation_failed),
                AlertSeverity::Warning,
                "Command validation failures are elevated.",
            ),
            (
                AlertKey::SocketErrors,
                count_f64(signals.socket_errors),
                AlertSeverity::Warning,
                "Socket errors exceeded alert threshold.",
            ),
            (
                AlertKey::RestorationBlocked,
                count_f64(signals.restoration_blocked),
                AlertSeverity::Critical,
                "Command processing repeatedly blocked by restoration consistency gate.",
            ),
            (
                AlertKey::RestorationInconsistent,
                if signals.restoration_consistent { 0.0 } else { 1.0 },
                AlertSeverity::Critical,
                "Server restoration consistency checks failed; command processing blocked.",
            ),
            (
                AlertKey::SlowTick,
                signals.tick_duration_ms,
                AlertSeverity::Warning,
                "Simulation tick duration is elevated.",
            ),
            (
                AlertKey::QueueLatency,
                signals.queue_latency_p95_ms,
                AlertSeverity::Warning,
                "Simulation queue latency is elevated.",
            ),
        ];

        let alerts: Vec<DashboardAlert> = candidates
            .into_iter()
            .filter_map(|(key, value, severity, message)| {
                let threshold = key.threshold(thresholds);
                satisfied(value, threshold).then_some(DashboardAlert {
                    key,
                    severity,
                    value,
                    threshold,
                    message,
                })
            })
            .collect();

        let status = match alerts.iter().map(|alert| alert.severity).max() {
            Some(AlertSeverity::Critical) => DashboardStatus::Critical,
            Some(AlertSeverity::Warning) => DashboardStatus::Warning,
            None => DashboardStatus::Healthy,
        };
        Self { status, alerts }
    }
}

// ---------------------------------------------------------------------------
// GET /api/alerts
// ---------------------------------------------------------------------------

/// List emitted alerts, newest first.
pub async fn list_alerts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let telemetry = state.telemetry();
    let alerts: Vec<Alert> = telemetry.alerts.alerts().cloned().collect();
    Json(serde_json::json!({
        "count": alerts.len(),
        "emitted": telemetry.alerts.emitted(),
        "alerts": alerts,
    }))
}
