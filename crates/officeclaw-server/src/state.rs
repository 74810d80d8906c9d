//! Shared application state for the world server.
//!
//! [`AppState`] is wrapped in [`Arc`] and injected into every handler and
//! socket task. World state itself is never here: it lives on the
//! simulation driver task and is reached through [`SimulationHandle`].
//! What is shared are the fan-out channels, the event timeline, the
//! agent stream bookkeeping and the telemetry counters.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::error;

use officeclaw_core::config::{AlertThresholds, MAX_SNAPSHOT_RATE_HZ, RateLimitConfig};
use officeclaw_core::{OfficeClawConfig, RestorationStatus, SimulationHandle};
use officeclaw_events::EventTimeline;
use officeclaw_events::timeline::MIN_MAX_EVENTS;
use officeclaw_types::{AgentStreamPayload, Event};

use crate::agent_stream::AgentStreams;
use crate::publisher::PublishedSnapshot;
use crate::telemetry::Telemetry;

/// Capacity of each broadcast channel.
///
/// A subscriber that falls behind by more than this many messages gets
/// [`broadcast::error::RecvError::Lagged`] and skips to the newest one.
pub const BROADCAST_CAPACITY: usize = 256;

/// Current wall time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Effective server settings after clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerSettings {
    /// Version stamped on every envelope.
    pub protocol_version: u32,
    /// Snapshot publish rate.
    pub snapshot_rate_hz: u32,
    /// Largest replay page a resume may use.
    pub replay_limit: usize,
    /// In-memory event retention.
    pub event_buffer_size: usize,
    /// Per-session command throttle.
    pub rate_limit: RateLimitConfig,
    /// Alert thresholds.
    pub thresholds: AlertThresholds,
}

impl ServerSettings {
    /// Settings derived from the loaded configuration.
    pub fn from_config(config: &OfficeClawConfig) -> Self {
        Self {
            protocol_version: config.server.protocol_version,
            snapshot_rate_hz: config.server.bounded_snapshot_rate_hz(),
            replay_limit: config.server.bounded_replay_limit(),
            event_buffer_size: config.storage.event_buffer_size.max(MIN_MAX_EVENTS),
            rate_limit: config.server.command_rate_limit.bounded(),
            thresholds: config.alerts,
        }
    }

    /// Snapshot publish period.
    pub fn snapshot_interval_ms(&self) -> u64 {
        let hz = u64::from(self.snapshot_rate_hz.clamp(1, MAX_SNAPSHOT_RATE_HZ));
        1000_u64.checked_div(hz).unwrap_or(1000)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self::from_config(&OfficeClawConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Event bus
// ---------------------------------------------------------------------------

/// The event timeline plus its live fan-out.
///
/// Appending and broadcasting happen under the same write lock, so the
/// broadcast order always matches seq order.
#[derive(Debug, Clone)]
pub struct EventBus {
    timeline: Arc<RwLock<EventTimeline>>,
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Wrap a timeline.
    pub fn new(timeline: EventTimeline) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            timeline: Arc::new(RwLock::new(timeline)),
            tx,
        }
    }

    /// Append an event and broadcast it. Returns `None` when the append
    /// failed; the failure is logged.
    pub fn publish(&self, name: &str, payload: Map<String, Value>) -> Option<Event> {
        let mut timeline = self.timeline.write().unwrap_or_else(PoisonError::into_inner);
        match timeline.append(name, payload) {
            Ok(event) => {
                // Err only means no session is listening.
                let _ = self.tx.send(event.clone());
                Some(event)
            }
            Err(e) => {
                error!(name, error = %e, "Failed to append event");
                None
            }
        }
    }

    /// Subscribe to live events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Run `read` against the timeline.
    pub fn read<R>(&self, read: impl FnOnce(&EventTimeline) -> R) -> R {
        let timeline = self.timeline.read().unwrap_or_else(PoisonError::into_inner);
        read(&timeline)
    }
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Shared state for the Axum application.
#[derive(Debug)]
pub struct AppState {
    /// Access to the simulation driver.
    pub simulation: SimulationHandle,
    /// Event timeline and live events.
    pub events: EventBus,
    /// Live snapshot frames.
    pub snapshots: broadcast::Sender<Arc<PublishedSnapshot>>,
    /// Most recently published snapshot.
    pub latest_snapshot: tokio::sync::RwLock<Option<Arc<PublishedSnapshot>>>,
    /// Live agent stream deltas.
    pub agent_streams: broadcast::Sender<AgentStreamPayload>,
    /// Per-stream seq and preview throttle state.
    pub streams: Arc<Mutex<AgentStreams>>,
    /// Outcome of the boot-time restoration.
    pub restoration: RestorationStatus,
    /// Effective settings.
    pub settings: ServerSettings,
    telemetry: Mutex<Telemetry>,
}

impl AppState {
    /// Assemble the state. `streams` is shared with the tick callback.
    pub fn new(
        simulation: SimulationHandle,
        events: EventBus,
        streams: Arc<Mutex<AgentStreams>>,
        restoration: RestorationStatus,
        settings: ServerSettings,
    ) -> Self {
        let (snapshots, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (agent_streams, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            simulation,
            events,
            snapshots,
            latest_snapshot: tokio::sync::RwLock::new(None),
            agent_streams,
            streams,
            restoration,
            settings,
            telemetry: Mutex::new(Telemetry::new(now_ms(), settings.thresholds)),
        }
    }

    /// Lock the telemetry counters. Never hold the guard across an await.
    pub fn telemetry(&self) -> MutexGuard<'_, Telemetry> {
        self.telemetry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the agent stream state.
    pub fn agent_stream_state(&self) -> MutexGuard<'_, AgentStreams> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether commands may be processed.
    pub const fn can_accept_commands(&self) -> bool {
        self.restoration.can_accept_commands()
    }
}
