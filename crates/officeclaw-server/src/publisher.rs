//! Periodic snapshot publisher.
//!
//! Runs independently of the tick driver at the configured snapshot rate.
//! Each period it refreshes the performance alerts, captures one snapshot
//! and broadcasts it; sessions that fall behind skip to the newest frame,
//! so a slow client never stalls the publisher or the simulation.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use officeclaw_core::SimulationSnapshot;

use crate::state::{AppState, now_ms};

/// Client-side smoothing hints shipped with every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SnapshotCorrection {
    /// Interpolation mode.
    pub mode: &'static str,
    /// Suggested easing duration.
    pub recommended_ease_ms: u64,
    /// Distance beyond which clients should snap instead of easing.
    pub hard_teleport_threshold_m: f64,
}

impl Default for SnapshotCorrection {
    fn default() -> Self {
        Self {
            mode: "ease",
            recommended_ease_ms: 200,
            hard_teleport_threshold_m: 2.5,
        }
    }
}

/// Publisher block of a snapshot frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PublisherInfo {
    /// Configured publish rate.
    pub rate_hz: u32,
}

/// Payload of a `snapshot` frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedSnapshot {
    /// World dump and scheduler counters.
    #[serde(flatten)]
    pub snapshot: SimulationSnapshot,
    /// Scheduler seq the snapshot was taken at.
    pub snapshot_seq: u64,
    /// Smoothing hints.
    pub correction: SnapshotCorrection,
    /// Publisher settings.
    pub publisher: PublisherInfo,
}

impl PublishedSnapshot {
    /// Wrap a captured snapshot.
    pub fn new(snapshot: SimulationSnapshot, rate_hz: u32) -> Self {
        Self {
            snapshot_seq: snapshot.seq,
            snapshot,
            correction: SnapshotCorrection::default(),
            publisher: PublisherInfo { rate_hz },
        }
    }

    /// JSON payload, reporting `scene_id` as the given scene when set.
    pub fn payload_for_scene(&self, scene_id: Option<&str>) -> Result<Value, serde_json::Error> {
        let mut payload = serde_json::to_value(self)?;
        if let Some(scene_id) = scene_id
            && let Some(object) = payload.as_object_mut()
        {
            object.insert(String::from("scene_id"), Value::from(scene_id));
        }
        Ok(payload)
    }
}

/// Spawn the publisher loop. It ends when the simulation driver stops.
pub fn spawn_publisher(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval_ms = state.settings.snapshot_interval_ms();
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            rate_hz = state.settings.snapshot_rate_hz,
            interval_ms, "Snapshot publisher started"
        );

        loop {
            ticker.tick().await;
            if publish_once(&state).await.is_none() {
                warn!("Simulation driver stopped; snapshot publisher exiting");
                return;
            }
        }
    })
}

/// One publisher period. Returns `None` once the driver is gone.
pub async fn publish_once(state: &AppState) -> Option<usize> {
    let stats = state.simulation.stats().await.ok()?;
    state.telemetry().record_performance(&stats, now_ms());

    let snapshot = state.simulation.snapshot(None).await.ok()?;
    let published = Arc::new(PublishedSnapshot::new(
        snapshot,
        state.settings.snapshot_rate_hz,
    ));
    *state.latest_snapshot.write().await = Some(Arc::clone(&published));

    // Zero receivers is normal when nobody is connected.
    let receivers = state.snapshots.send(published).unwrap_or(0);
    debug!(receivers, "Snapshot broadcast");
    Some(receivers)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use officeclaw_types::WorldSnapshot;

    use super::*;

    fn snapshot() -> SimulationSnapshot {
        SimulationSnapshot {
            world: WorldSnapshot {
                scene_id: String::from("cozy_office_v0"),
                agents: Vec::new(),
                projects: Vec::new(),
                tasks: Vec::new(),
                artifacts: Vec::new(),
                decisions: Vec::new(),
                office_decor: Vec::new(),
            },
            seq: 7,
            clock_ms: 700,
        }
    }

    #[test]
    fn published_snapshot_flattens_the_world() {
        let published = PublishedSnapshot::new(snapshot(), 3);
        let payload = published.payload_for_scene(None).unwrap();
        assert_eq!(payload["scene_id"], "cozy_office_v0");
        assert_eq!(payload["seq"], 7);
        assert_eq!(payload["snapshot_seq"], 7);
        assert_eq!(payload["correction"]["mode"], "ease");
        assert_eq!(payload["correction"]["recommended_ease_ms"], 200);
        assert_eq!(payload["publisher"]["rate_hz"], 3);
    }

    #[test]
    fn scene_override_replaces_scene_id() {
        let published = PublishedSnapshot::new(snapshot(), 3);
        let payload = published.payload_for_scene(Some("loft_v1")).unwrap();
        assert_eq!(payload["scene_id"], "loft_v1");
    }
}
