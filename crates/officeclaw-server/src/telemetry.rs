//! Server-side counters reported on the health endpoint.
//!
//! Everything here is plain data behind one mutex in [`AppState`]; no
//! lock is ever held across an await.
//!
//! [`AppState`]: crate::state::AppState

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;
use tracing::warn;

use officeclaw_core::SimulationStats;
use officeclaw_core::config::AlertThresholds;
use officeclaw_types::{ErrorCode, ResumeDecision, ResumeReason, SessionId};

use crate::alerts::{AlertKey, AlertMonitor, AlertSeverity, DashboardSignals, ErrorDashboard};

/// Recent protocol errors kept for diagnostics.
pub const RECENT_ERRORS_LIMIT: usize = 2000;

/// Command intake counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommandCounters {
    /// Commands received.
    pub attempted: u64,
    /// Commands applied.
    pub ok: u64,
    /// Commands the world rejected.
    pub failed: u64,
    /// Commands throttled.
    pub rate_limited: u64,
    /// Commands refused by the restoration gate.
    pub blocked_by_restoration: u64,
}

/// Connection counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounters {
    /// Sockets accepted.
    pub connected: u64,
    /// Sockets closed.
    pub disconnected: u64,
    /// Socket read or write failures.
    pub socket_errors: u64,
}

/// Outbound fan-out counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineCounters {
    /// Snapshot frames delivered.
    pub snapshots_published: u64,
    /// Event frames delivered.
    pub events_published: u64,
    /// Agent stream frames delivered.
    pub agent_stream_published: u64,
}

/// Latest scheduler performance signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceSignals {
    /// Duration of the most recent tick.
    pub last_tick_duration_ms: f64,
    /// Larger of the command and event p95 queue latencies.
    pub queue_latency_p95_ms: f64,
}

/// Reconnect counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayResyncCounters {
    /// `hello` messages carrying a resume block.
    pub resume_attempts: u64,
    /// Resumes that replayed.
    pub resume_success: u64,
    /// Resumes that fell back to a snapshot.
    pub resume_fallback: u64,
    /// Events delivered by replay.
    pub replayed_events: u64,
    /// Fallbacks per reason.
    pub fallback_reasons: BTreeMap<String, u64>,
}

impl ReplayResyncCounters {
    /// Count a fallback.
    pub fn record_fallback(&mut self, reason: ResumeReason) {
        self.resume_fallback = self.resume_fallback.saturating_add(1);
        let count = self
            .fallback_reasons
            .entry(reason.as_str().to_owned())
            .or_insert(0);
        *count = count.saturating_add(1);
    }
}

/// Command abuse counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommandSecurityCounters {
    /// Commands throttled.
    pub rate_limited: u64,
    /// Commands rejected as malformed.
    pub validation_failed: u64,
}

/// Snapshot publisher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublisherCounters {
    /// Snapshots delivered to sessions.
    pub published_count: u64,
    /// Wall time of the last delivery.
    pub last_published_ts: Option<i64>,
}

/// A protocol error sent to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    /// When it was sent.
    pub ts: i64,
    /// Error code.
    pub code: ErrorCode,
    /// Message sent.
    pub message: String,
    /// Message id it answered.
    pub in_reply_to: String,
    /// Session it went to.
    pub session_id: Option<SessionId>,
}

fn bump(counter: &mut u64) -> u64 {
    *counter = counter.saturating_add(1);
    *counter
}

fn bump_key(map: &mut BTreeMap<String, u64>, key: &str) {
    let count = map.entry(key.to_owned()).or_insert(0);
    *count = count.saturating_add(1);
}

/// All server counters.
#[derive(Debug, Clone)]
pub struct Telemetry {
    /// Server start in epoch milliseconds.
    pub started_ts: i64,
    /// Inbound messages per type.
    pub inbound_messages: BTreeMap<String, u64>,
    /// Outbound messages per type.
    pub outbound_messages: BTreeMap<String, u64>,
    /// Command intake.
    pub command: CommandCounters,
    /// Connections.
    pub sessions: SessionCounters,
    /// Fan-out.
    pub pipeline: PipelineCounters,
    /// Scheduler performance.
    pub performance: PerformanceSignals,
    /// Protocol errors per code.
    pub errors_by_code: BTreeMap<String, u64>,
    /// Recent protocol errors, oldest first.
    pub recent_errors: VecDeque<ErrorRecord>,
    /// Reconnects.
    pub replay: ReplayResyncCounters,
    /// Command abuse.
    pub security: CommandSecurityCounters,
    /// Snapshot publisher.
    pub publisher: PublisherCounters,
    /// Threshold alerts.
    pub alerts: AlertMonitor,
}

impl Telemetry {
    /// Zeroed counters.
    pub fn new(started_ts: i64, thresholds: AlertThresholds) -> Self {
        Self {
            started_ts,
            inbound_messages: BTreeMap::new(),
            outbound_messages: BTreeMap::new(),
            command: CommandCounters::default(),
            sessions: SessionCounters::default(),
            pipeline: PipelineCounters::default(),
            performance: PerformanceSignals::default(),
            errors_by_code: BTreeMap::new(),
            recent_errors: VecDeque::new(),
            replay: ReplayResyncCounters::default(),
            security: CommandSecurityCounters::default(),
            publisher: PublisherCounters::default(),
            alerts: AlertMonitor::new(thresholds),
        }
    }

    /// Count an inbound message.
    pub fn record_inbound(&mut self, msg_type: &str) {
        bump_key(&mut self.inbound_messages, msg_type);
    }

    /// Count an outbound message.
    pub fn record_outbound(&mut self, msg_type: &str) {
        bump_key(&mut self.outbound_messages, msg_type);
    }

    /// Record a protocol error sent to a client.
    pub fn record_error(&mut self, record: ErrorRecord) {
        bump_key(&mut self.errors_by_code, record.code.as_str());
        warn!(
            code = record.code.as_str(),
            in_reply_to = %record.in_reply_to,
            session_id = record.session_id.as_ref().map_or("", |id| id.as_str()),
            "{}",
            record.message
        );
        self.recent_errors.push_back(record);
        while self.recent_errors.len() > RECENT_ERRORS_LIMIT {
            self.recent_errors.pop_front();
        }
    }

    /// Most recent protocol error.
    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.recent_errors.back()
    }

    /// Count a socket accept.
    pub fn record_connected(&mut self) {
        bump(&mut self.sessions.connected);
    }

    /// Count a socket close.
    pub fn record_disconnected(&mut self) {
        bump(&mut self.sessions.disconnected);
    }

    /// Count a received command.
    pub fn record_command_attempt(&mut self) {
        bump(&mut self.command.attempted);
    }

    /// Count an applied command.
    pub fn record_command_ok(&mut self) {
        bump(&mut self.command.ok);
    }

    /// Count a command the world rejected.
    pub fn record_command_failed(&mut self) {
        bump(&mut self.command.failed);
    }

    /// Count the outcome of a resume evaluation.
    pub fn record_resume(&mut self, decision: &ResumeDecision) {
        bump(&mut self.replay.resume_attempts);
        if decision.is_resumed() {
            bump(&mut self.replay.resume_success);
        } else {
            self.replay
                .record_fallback(decision.reason.unwrap_or(ResumeReason::CursorUnknown));
        }
    }

    /// Count events delivered by a resume replay.
    pub fn record_replayed(&mut self, events: usize) {
        let events = u64::try_from(events).unwrap_or(u64::MAX);
        self.replay.replayed_events = self.replay.replayed_events.saturating_add(events);
    }

    /// Count an event frame sent.
    pub fn record_event_delivered(&mut self) {
        bump(&mut self.pipeline.events_published);
    }

    /// Count a snapshot frame sent.
    pub fn record_snapshot_delivered(&mut self, now_ms: i64) {
        bump(&mut self.pipeline.snapshots_published);
        bump(&mut self.publisher.published_count);
        self.publisher.last_published_ts = Some(now_ms);
    }

    /// Count an agent stream frame sent.
    pub fn record_agent_stream_delivered(&mut self) {
        bump(&mut self.pipeline.agent_stream_published);
    }

    /// Count a throttled command; alerts on the prospective total.
    pub fn record_rate_limited(&mut self, now_ms: i64) {
        let prospective = self.security.rate_limited.saturating_add(1);
        self.alerts.check(
            AlertKey::RateLimited,
            crate::alerts::count_f64(prospective),
            AlertSeverity::Warning,
            "Command rate-limits exceeded threshold.",
            now_ms,
        );
        bump(&mut self.command.rate_limited);
        bump(&mut self.security.rate_limited);
    }

    /// Count a command refused by the restoration gate.
    pub fn record_blocked_by_restoration(&mut self, now_ms: i64) {
        let blocked = bump(&mut self.command.blocked_by_restoration);
        self.alerts.check(
            AlertKey::RestorationBlocked,
            crate::alerts::count_f64(blocked),
            AlertSeverity::Critical,
            "Command traffic blocked by restoration consistency gate.",
            now_ms,
        );
    }

    /// Count a command rejected as malformed.
    pub fn record_validation_failed(&mut self, now_ms: i64) {
        let failed = bump(&mut self.security.validation_failed);
        self.alerts.check(
            AlertKey::ValidationFailed,
            crate::alerts::count_f64(failed),
            AlertSeverity::Warning,
            "Command validation failures exceeded threshold.",
            now_ms,
        );
    }

    /// Count a socket error.
    pub fn record_socket_error(&mut self, now_ms: i64) {
        let errors = bump(&mut self.sessions.socket_errors);
        self.alerts.check(
            AlertKey::SocketErrors,
            crate::alerts::count_f64(errors),
            AlertSeverity::Warning,
            "Socket errors exceeded threshold.",
            now_ms,
        );
    }

    /// Refresh performance signals from scheduler stats and alert on them.
    pub fn record_performance(&mut self, stats: &SimulationStats, now_ms: i64) {
        let tick_ms = stats.tick_timing_ms.last_tick_duration_ms;
        let latency = stats
            .queue_latency_ms
            .commands
            .p95
            .max(stats.queue_latency_ms.events.p95);
        self.performance = PerformanceSignals {
            last_tick_duration_ms: tick_ms,
            queue_latency_p95_ms: latency,
        };
        self.alerts.check(
            AlertKey::SlowTick,
            tick_ms,
            AlertSeverity::Warning,
            "Simulation tick duration exceeded threshold.",
            now_ms,
        );
        self.alerts.check(
            AlertKey::QueueLatency,
            latency,
            AlertSeverity::Warning,
            "Simulation queue latency exceeded threshold.",
            now_ms,
        );
    }

    /// Current dashboard.
    pub fn error_dashboard(&self, restoration_consistent: bool) -> ErrorDashboard {
        let signals = DashboardSignals {
            rate_limited: self.security.rate_limited,
            validation_failed: self.security.validation_failed,
            socket_errors: self.sessions.socket_errors,
            restoration_blocked: self.command.blocked_by_restoration,
            restoration_consistent,
            tick_duration_ms: self.performance.last_tick_duration_ms,
            queue_latency_p95_ms: self.performance.queue_latency_p95_ms,
        };
        ErrorDashboard::evaluate(&signals, self.alerts.thresholds())
    }

    /// JSON view for the health endpoint.
    pub fn observability_json(&self) -> serde_json::Value {
        serde_json::json!({
            "started_ts": self.started_ts,
            "inbound_messages": self.inbound_messages,
            "outbound_messages": self.outbound_messages,
            "command": self.command,
            "sessions": self.sessions,
            "pipeline": self.pipeline,
            "performance": self.performance,
            "errors_by_code": self.errors_by_code,
            "last_error": self.last_error(),
            "recent_errors": self.recent_errors,
            "alerts_emitted": self.alerts.emitted(),
            "alert_thresholds": self.alerts.thresholds(),
        })
    }
}
