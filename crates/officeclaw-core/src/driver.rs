//! Periodic driver for the tick scheduler.
//!
//! One task owns the [`Simulation`] and serializes every access to it.
//! Sessions and the HTTP layer talk to that task through a cloneable
//! [`SimulationHandle`]; the task interleaves their requests with timer
//! ticks, so no lock ever guards world state.
//!
//! While the simulation is stopped, submitted commands and events are
//! flushed right away instead of waiting for a tick that will not come.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use officeclaw_types::{CommandContext, CommandOutcome};
use officeclaw_world::CoherenceReport;

use crate::simulation::{CommandTicket, Simulation, SimulationSnapshot, SimulationStats, TickReport};

/// Pending requests buffered between callers and the driver.
pub const REQUEST_CHANNEL_CAPACITY: usize = 1024;

/// Errors returned by a [`SimulationHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// The driver task has exited.
    #[error("simulation driver has stopped")]
    Closed,
}

/// Callback invoked after every drain of the queues.
///
/// Runs on the driver task after command outcomes have been delivered,
/// with read access to the simulation as it stands after the drain.
pub trait TickCallback: Send {
    /// Called once per tick or flush.
    fn on_tick(&mut self, report: &TickReport, simulation: &Simulation);
}

/// A no-op tick callback for testing.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _report: &TickReport, _simulation: &Simulation) {}
}

enum SimulationRequest {
    Command {
        payload: Value,
        context: Option<CommandContext>,
        reply: oneshot::Sender<CommandOutcome>,
    },
    Event {
        payload: Value,
    },
    Start {
        reply: oneshot::Sender<SimulationStats>,
    },
    Stop {
        reply: oneshot::Sender<SimulationStats>,
    },
    SetTickRate {
        tick_rate_hz: f64,
        reply: oneshot::Sender<SimulationStats>,
    },
    Step {
        times: u32,
        reply: oneshot::Sender<SimulationStats>,
    },
    Stats {
        reply: oneshot::Sender<SimulationStats>,
    },
    Snapshot {
        scene_override: Option<String>,
        reply: oneshot::Sender<SimulationSnapshot>,
    },
    SetScene {
        scene_id: String,
        reply: oneshot::Sender<()>,
    },
    Coherence {
        reply: oneshot::Sender<CoherenceReport>,
    },
}

/// Cloneable access to a running driver.
#[derive(Debug, Clone)]
pub struct SimulationHandle {
    tx: mpsc::Sender<SimulationRequest>,
}

impl std::fmt::Debug for SimulationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Command { .. } => "Command",
            Self::Event { .. } => "Event",
            Self::Start { .. } => "Start",
            Self::Stop { .. } => "Stop",
            Self::SetTickRate { .. } => "SetTickRate",
            Self::Step { .. } => "Step",
            Self::Stats { .. } => "Stats",
            Self::Snapshot { .. } => "Snapshot",
            Self::SetScene { .. } => "SetScene",
            Self::Coherence { .. } => "Coherence",
        };
        f.write_str(name)
    }
}

impl SimulationHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SimulationRequest,
    ) -> Result<T, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_closed| DriverError::Closed)?;
        rx.await.map_err(|_dropped| DriverError::Closed)
    }

    /// Queue a command and wait for the tick that applies it.
    pub async fn submit_command(
        &self,
        payload: Value,
        context: Option<CommandContext>,
    ) -> Result<CommandOutcome, DriverError> {
        self.request(|reply| SimulationRequest::Command {
            payload,
            context,
            reply,
        })
        .await
    }

    /// Queue a world event for the next tick.
    pub async fn submit_event(&self, payload: Value) -> Result<(), DriverError> {
        self.tx
            .send(SimulationRequest::Event { payload })
            .await
            .map_err(|_closed| DriverError::Closed)
    }

    /// Start periodic ticking. Idempotent.
    pub async fn start(&self) -> Result<SimulationStats, DriverError> {
        self.request(|reply| SimulationRequest::Start { reply }).await
    }

    /// Stop periodic ticking. Idempotent.
    pub async fn stop(&self) -> Result<SimulationStats, DriverError> {
        self.request(|reply| SimulationRequest::Stop { reply }).await
    }

    /// Change the tick rate; the timer restarts at the new period.
    pub async fn set_tick_rate_hz(&self, tick_rate_hz: f64) -> Result<SimulationStats, DriverError> {
        self.request(|reply| SimulationRequest::SetTickRate { tick_rate_hz, reply })
            .await
    }

    /// Run `times` ticks immediately (at least one).
    pub async fn step(&self, times: u32) -> Result<SimulationStats, DriverError> {
        self.request(|reply| SimulationRequest::Step { times, reply })
            .await
    }

    /// Current scheduler statistics.
    pub async fn stats(&self) -> Result<SimulationStats, DriverError> {
        self.request(|reply| SimulationRequest::Stats { reply }).await
    }

    /// Snapshot of the world, optionally relabelled with another scene.
    pub async fn snapshot(&self, scene_override: Option<String>) -> Result<SimulationSnapshot, DriverError> {
        self.request(|reply| SimulationRequest::Snapshot {
            scene_override,
            reply,
        })
        .await
    }

    /// Move the world to another scene.
    pub async fn set_scene_id(&self, scene_id: String) -> Result<(), DriverError> {
        self.request(|reply| SimulationRequest::SetScene { scene_id, reply })
            .await
    }

    /// Cross-reference check of the current world.
    pub async fn validate_snapshot(&self) -> Result<CoherenceReport, DriverError> {
        self.request(|reply| SimulationRequest::Coherence { reply })
            .await
    }
}

fn new_ticker(interval_ms: u64) -> Interval {
    let period = Duration::from_millis(interval_ms.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick one full period from now, not immediately.
    ticker.reset();
    ticker
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

struct Driver<C> {
    simulation: Simulation,
    callback: C,
    waiting: HashMap<CommandTicket, oneshot::Sender<CommandOutcome>>,
    ticker: Option<Interval>,
}

impl<C: TickCallback> Driver<C> {
    fn restart_ticker(&mut self) {
        self.ticker = self
            .simulation
            .is_running()
            .then(|| new_ticker(self.simulation.interval_ms()));
    }

    fn finish(&mut self, report: &TickReport) {
        for applied in &report.commands {
            if let Some(reply) = self.waiting.remove(&applied.ticket)
                && reply.send(applied.outcome.clone()).is_err()
            {
                debug!(ticket = applied.ticket.0, "Command caller went away before its outcome");
            }
        }
        self.callback.on_tick(report, &self.simulation);
    }

    fn tick(&mut self) {
        let report = self.simulation.tick();
        self.finish(&report);
    }

    fn flush_if_stopped(&mut self) {
        if !self.simulation.is_running() {
            let report = self.simulation.flush();
            self.finish(&report);
        }
    }

    fn handle(&mut self, request: SimulationRequest) {
        match request {
            SimulationRequest::Command {
                payload,
                context,
                reply,
            } => {
                let ticket = self.simulation.enqueue_command(payload, context);
                self.waiting.insert(ticket, reply);
                self.flush_if_stopped();
            }
            SimulationRequest::Event { payload } => {
                self.simulation.enqueue_event(payload);
                self.flush_if_stopped();
            }
            SimulationRequest::Start { reply } => {
                let stats = self.simulation.start();
                self.restart_ticker();
                let _ = reply.send(stats);
            }
            SimulationRequest::Stop { reply } => {
                let stats = self.simulation.stop();
                self.ticker = None;
                let _ = reply.send(stats);
            }
            SimulationRequest::SetTickRate {
                tick_rate_hz,
                reply,
            } => {
                let stats = self.simulation.set_tick_rate_hz(tick_rate_hz);
                self.restart_ticker();
                let _ = reply.send(stats);
            }
            SimulationRequest::Step { times, reply } => {
                for _ in 0..times.max(1) {
                    self.tick();
                }
                let _ = reply.send(self.simulation.stats());
            }
            SimulationRequest::Stats { reply } => {
                let _ = reply.send(self.simulation.stats());
            }
            SimulationRequest::Snapshot {
                scene_override,
                reply,
            } => {
                let _ = reply.send(self.simulation.snapshot(scene_override.as_deref()));
            }
            SimulationRequest::SetScene { scene_id, reply } => {
                self.simulation.set_scene_id(&scene_id);
                let _ = reply.send(());
            }
            SimulationRequest::Coherence { reply } => {
                let _ = reply.send(self.simulation.validate_snapshot());
            }
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<SimulationRequest>) -> Simulation {
        self.restart_ticker();
        loop {
            tokio::select! {
                request = rx.recv() => {
                    let Some(request) = request else {
                        break;
                    };
                    self.handle(request);
                }
                () = next_tick(&mut self.ticker) => self.tick(),
            }
        }

        if !self.waiting.is_empty() {
            warn!(
                pending = self.waiting.len(),
                "Driver exiting with commands still queued"
            );
        }
        info!(
            tick_count = self.simulation.stats().tick_count,
            "Simulation driver stopped"
        );
        self.simulation
    }
}

/// Spawn the driver task.
///
/// The task runs until every [`SimulationHandle`] is dropped and then
/// returns the simulation. If the simulation is already started, periodic
/// ticking begins immediately.
pub fn spawn<C>(simulation: Simulation, callback: C) -> (SimulationHandle, JoinHandle<Simulation>)
where
    C: TickCallback + 'static,
{
    let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
    let driver = Driver {
        simulation,
        callback,
        waiting: HashMap::new(),
        ticker: None,
    };
    let join = tokio::spawn(driver.run(rx));
    (SimulationHandle { tx }, join)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::{Arc, Mutex};

    use officeclaw_nav::StaticSceneLoader;
    use officeclaw_types::{ErrorCode, TaskStatus};
    use officeclaw_world::WorldStore;
    use serde_json::json;

    use super::*;

    fn simulation() -> Simulation {
        let world = WorldStore::new("cozy_office_v0", Arc::new(StaticSceneLoader::empty()));
        Simulation::new(world, 20.0)
    }

    #[derive(Clone, Default)]
    struct Recorder {
        reports: Arc<Mutex<Vec<(bool, usize)>>>,
    }

    impl TickCallback for Recorder {
        fn on_tick(&mut self, report: &TickReport, _simulation: &Simulation) {
            self.reports
                .lock()
                .unwrap()
                .push((report.advanced, report.commands.len()));
        }
    }

    #[tokio::test]
    async fn stopped_driver_flushes_commands_immediately() {
        let recorder = Recorder::default();
        let (handle, _join) = spawn(simulation(), recorder.clone());

        let outcome = handle
            .submit_command(
                json!({"name": "assign_task", "data": {"task_id": "task_copy", "agent_id": "agent_eng_1"}}),
                None,
            )
            .await
            .unwrap();
        assert!(outcome.ok);

        let rejected = handle
            .submit_command(json!({"name": "nope", "data": {}}), None)
            .await
            .unwrap();
        assert_eq!(rejected.code, Some(ErrorCode::ValidationFailed));

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.tick_count, 0);
        assert_eq!(*recorder.reports.lock().unwrap(), vec![(false, 1), (false, 1)]);
    }

    #[tokio::test]
    async fn step_runs_ticks_through_the_callback() {
        let recorder = Recorder::default();
        let (handle, _join) = spawn(simulation(), recorder.clone());

        let stats = handle.step(3).await.unwrap();
        assert_eq!(stats.tick_count, 3);
        assert_eq!(recorder.reports.lock().unwrap().len(), 3);

        let snapshot = handle.snapshot(None).await.unwrap();
        assert_eq!(snapshot.seq, 3);
        assert!(handle.validate_snapshot().await.unwrap().ok);
    }

    #[tokio::test]
    async fn started_driver_ticks_on_its_own() {
        let (handle, _join) = spawn(simulation(), NoOpCallback);
        let started = handle.start().await.unwrap();
        assert!(started.is_running);
        assert_eq!(started.tick_interval_ms, 50);

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            handle.submit_command(
                json!({"name": "assign_task", "data": {"task_id": "task_copy", "agent_id": "agent_eng_1"}}),
                None,
            ),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(outcome.ok);

        let stats = handle.stop().await.unwrap();
        assert!(!stats.is_running);
        assert!(stats.tick_count >= 1);

        let snapshot = handle.snapshot(None).await.unwrap();
        let task = snapshot
            .world
            .tasks
            .iter()
            .find(|task| task.task_id == "task_copy")
            .unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn rate_changes_are_clamped() {
        let (handle, _join) = spawn(simulation(), NoOpCallback);
        let stats = handle.set_tick_rate_hz(3.0).await.unwrap();
        assert_eq!(stats.tick_rate_hz, 10);
        assert_eq!(stats.tick_interval_ms, 100);
    }

    #[tokio::test]
    async fn driver_returns_the_simulation_when_handles_drop() {
        let (handle, join) = spawn(simulation(), NoOpCallback);
        handle.set_scene_id(String::from("other_scene")).await.unwrap();
        drop(handle);
        let simulation = join.await.unwrap();
        assert_eq!(simulation.world().scene_id(), "other_scene");
    }
}
