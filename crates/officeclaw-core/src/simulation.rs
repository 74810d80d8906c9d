//! Tick scheduler.
//!
//! The [`Simulation`] owns the world and two FIFO queues. Sessions enqueue
//! commands and world events at any time; each tick drains the command
//! queue completely, then the event queue, then advances the world by one
//! tick. That fixed order is the total order of every mutation.
//!
//! The scheduler itself is synchronous and has no timer. The periodic
//! driver in [`crate::driver`] calls [`Simulation::tick`] at the
//! configured cadence.

use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use officeclaw_types::{CommandContext, CommandOutcome, WorldSnapshot};
use officeclaw_world::{CoherenceReport, WorldStore, validate_snapshot_coherence};

use crate::config::{MAX_TICK_RATE_HZ, MIN_TICK_RATE_HZ, clamp_tick_rate_hz};
use crate::stats::{RollingStats, RollingSummary};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

/// Tick period for a rate, `floor(1000 / hz)`.
pub fn tick_interval_ms(tick_rate_hz: u32) -> u64 {
    1000_u64.checked_div(u64::from(tick_rate_hz)).unwrap_or(100)
}

/// Handle for a queued command, used to match it with its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandTicket(pub u64);

#[derive(Debug)]
struct QueuedCommand {
    ticket: CommandTicket,
    payload: Value,
    context: Option<CommandContext>,
    enqueued_at: Instant,
}

#[derive(Debug)]
struct QueuedEvent {
    payload: Value,
    enqueued_at: Instant,
}

/// A command taken off the queue and applied.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedCommand {
    /// Ticket returned at enqueue time.
    pub ticket: CommandTicket,
    /// The command exactly as enqueued.
    pub payload: Value,
    /// Origin of the command.
    pub context: Option<CommandContext>,
    /// What the world answered.
    pub outcome: CommandOutcome,
}

/// What one drain (and optional world tick) did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Whether the world advanced; `false` for a queue flush.
    pub advanced: bool,
    /// Scheduler tick count after the drain.
    pub tick_count: u64,
    /// Commands applied, in queue order.
    pub commands: Vec<AppliedCommand>,
    /// Number of world events applied.
    pub events_applied: usize,
}

/// Supported tick rate band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickRateBounds {
    /// Lowest rate.
    pub min_hz: u32,
    /// Highest rate.
    pub max_hz: u32,
}

/// Pending work per queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    /// Commands waiting for the next tick.
    pub commands: usize,
    /// Events waiting for the next tick.
    pub events: usize,
}

/// Tick duration summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TickTiming {
    /// Rolling figures.
    #[serde(flatten)]
    pub summary: RollingSummary,
    /// Duration of the most recent tick.
    pub last_tick_duration_ms: f64,
}

/// Queue latency summaries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueueLatency {
    /// Time commands spent queued.
    pub commands: RollingSummary,
    /// Time events spent queued.
    pub events: RollingSummary,
}

/// Background run counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Runs known to the world.
    pub total: usize,
    /// Runs started or running.
    pub active: usize,
    /// Runs per status.
    pub by_status: BTreeMap<String, usize>,
}

/// Scheduler statistics reported on the health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationStats {
    /// Whether the periodic driver is ticking.
    pub is_running: bool,
    /// Effective tick rate.
    pub tick_rate_hz: u32,
    /// Tick period.
    pub tick_interval_ms: u64,
    /// Ticks run.
    pub tick_count: u64,
    /// Scheduler seq, advanced once per tick.
    pub seq: u64,
    /// Simulated clock, advanced by the tick period each tick.
    pub clock_ms: u64,
    /// Wall time of the first start.
    pub started_ts: Option<i64>,
    /// Wall time of the most recent tick.
    pub last_tick_ts: Option<i64>,
    /// Milliseconds since the first start.
    pub uptime_ms: i64,
    /// Pending work.
    pub queue_depth: QueueDepth,
    /// Tick durations.
    pub tick_timing_ms: TickTiming,
    /// Queue latencies.
    pub queue_latency_ms: QueueLatency,
    /// Background runs.
    pub openclaw_runs: RunStats,
}

/// World snapshot plus scheduler counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationSnapshot {
    /// Entity dump.
    #[serde(flatten)]
    pub world: WorldSnapshot,
    /// Scheduler seq at capture time.
    pub seq: u64,
    /// Simulated clock at capture time.
    pub clock_ms: u64,
}

/// The tick scheduler.
#[derive(Debug)]
pub struct Simulation {
    world: WorldStore,
    pending_commands: VecDeque<QueuedCommand>,
    pending_events: VecDeque<QueuedEvent>,
    next_ticket: u64,
    tick_rate_hz: u32,
    interval_ms: u64,
    running: bool,
    started_ts: Option<i64>,
    last_tick_ts: Option<i64>,
    tick_count: u64,
    seq: u64,
    clock_ms: u64,
    tick_timing: RollingStats,
    command_latency: RollingStats,
    event_latency: RollingStats,
    clock: fn() -> i64,
}

impl Simulation {
    /// Wrap a world with a tick rate (clamped into the supported band).
    pub fn new(world: WorldStore, tick_rate_hz: f64) -> Self {
        let tick_rate_hz = clamp_tick_rate_hz(tick_rate_hz);
        Self {
            world,
            pending_commands: VecDeque::new(),
            pending_events: VecDeque::new(),
            next_ticket: 1,
            tick_rate_hz,
            interval_ms: tick_interval_ms(tick_rate_hz),
            running: false,
            started_ts: None,
            last_tick_ts: None,
            tick_count: 0,
            seq: 0,
            clock_ms: 0,
            tick_timing: RollingStats::default(),
            command_latency: RollingStats::default(),
            event_latency: RollingStats::default(),
            clock: now_ms,
        }
    }

    /// Replace the wall clock used for timestamps.
    #[must_use]
    pub const fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    // ---- Lifecycle ----

    /// Mark the scheduler running. Idempotent.
    pub fn start(&mut self) -> SimulationStats {
        if !self.running {
            if self.started_ts.is_none() {
                self.started_ts = Some((self.clock)());
            }
            self.running = true;
            info!(
                tick_rate_hz = self.tick_rate_hz,
                tick_interval_ms = self.interval_ms,
                "Simulation started"
            );
        }
        self.stats()
    }

    /// Mark the scheduler stopped. Idempotent.
    pub fn stop(&mut self) -> SimulationStats {
        if self.running {
            self.running = false;
            info!(tick_count = self.tick_count, "Simulation stopped");
        }
        self.stats()
    }

    /// Whether the periodic driver should be ticking.
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Change the tick rate (clamped). The driver restarts its timer.
    pub fn set_tick_rate_hz(&mut self, tick_rate_hz: f64) -> SimulationStats {
        self.tick_rate_hz = clamp_tick_rate_hz(tick_rate_hz);
        self.interval_ms = tick_interval_ms(self.tick_rate_hz);
        info!(
            tick_rate_hz = self.tick_rate_hz,
            tick_interval_ms = self.interval_ms,
            "Tick rate changed"
        );
        self.stats()
    }

    /// Supported tick rate band.
    pub const fn tick_rate_bounds() -> TickRateBounds {
        TickRateBounds {
            min_hz: MIN_TICK_RATE_HZ,
            max_hz: MAX_TICK_RATE_HZ,
        }
    }

    /// Current tick period.
    pub const fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    // ---- Queues ----

    /// Queue a command for the next tick.
    pub fn enqueue_command(&mut self, payload: Value, context: Option<CommandContext>) -> CommandTicket {
        let ticket = CommandTicket(self.next_ticket);
        self.next_ticket = self.next_ticket.saturating_add(1);
        self.pending_commands.push_back(QueuedCommand {
            ticket,
            payload,
            context,
            enqueued_at: Instant::now(),
        });
        ticket
    }

    /// Queue a world event for the next tick.
    pub fn enqueue_event(&mut self, payload: Value) {
        self.pending_events.push_back(QueuedEvent {
            payload,
            enqueued_at: Instant::now(),
        });
    }

    /// Apply a command immediately, bypassing the queue.
    pub fn apply_command(&mut self, payload: &Value) -> CommandOutcome {
        self.world.apply_raw_command(payload)
    }

    /// Apply a world event immediately, bypassing the queue.
    pub fn apply_event(&mut self, payload: &Value) {
        self.world.apply_event(payload);
    }

    fn drain(&mut self, report: &mut TickReport) {
        while let Some(entry) = self.pending_commands.pop_front() {
            self.command_latency.record(elapsed_ms(entry.enqueued_at));
            let outcome = self.world.apply_raw_command(&entry.payload);
            report.commands.push(AppliedCommand {
                ticket: entry.ticket,
                payload: entry.payload,
                context: entry.context,
                outcome,
            });
        }
        while let Some(entry) = self.pending_events.pop_front() {
            self.event_latency.record(elapsed_ms(entry.enqueued_at));
            self.world.apply_event(&entry.payload);
            report.events_applied = report.events_applied.saturating_add(1);
        }
    }

    // ---- Ticking ----

    /// Drain both queues and advance the world by one tick.
    pub fn tick(&mut self) -> TickReport {
        let started = Instant::now();
        self.tick_count = self.tick_count.saturating_add(1);
        self.seq = self.seq.saturating_add(1);
        self.clock_ms = self.clock_ms.saturating_add(self.interval_ms);

        let mut report = TickReport {
            advanced: true,
            ..TickReport::default()
        };
        self.drain(&mut report);
        self.world.advance_tick();

        self.last_tick_ts = Some((self.clock)());
        self.tick_timing.record(elapsed_ms(started));
        report.tick_count = self.tick_count;
        debug!(
            tick = self.tick_count,
            commands = report.commands.len(),
            events = report.events_applied,
            "Tick complete"
        );
        report
    }

    /// Run `times` ticks (at least one).
    pub fn run_ticks(&mut self, times: u32) -> Vec<TickReport> {
        (0..times.max(1)).map(|_| self.tick()).collect()
    }

    /// Drain both queues without advancing the world.
    pub fn flush(&mut self) -> TickReport {
        let mut report = TickReport::default();
        self.drain(&mut report);
        report.tick_count = self.tick_count;
        report
    }

    // ---- Views ----

    /// The world.
    pub const fn world(&self) -> &WorldStore {
        &self.world
    }

    /// Move the world to another scene.
    pub fn set_scene_id(&mut self, scene_id: &str) {
        self.world.set_scene_id(scene_id);
    }

    /// Snapshot with scheduler counters.
    pub fn snapshot(&self, scene_override: Option<&str>) -> SimulationSnapshot {
        SimulationSnapshot {
            world: self.world.snapshot(scene_override),
            seq: self.seq,
            clock_ms: self.clock_ms,
        }
    }

    /// Cross-reference check of the current world.
    pub fn validate_snapshot(&self) -> CoherenceReport {
        validate_snapshot_coherence(&self.world.snapshot(None))
    }

    /// Current statistics.
    pub fn stats(&self) -> SimulationStats {
        let tick_timing = self.tick_timing.summary();
        let mut by_status = BTreeMap::new();
        let mut total = 0_usize;
        let mut active = 0_usize;
        for run in self.world.run_records() {
            total = total.saturating_add(1);
            if run.is_active() {
                active = active.saturating_add(1);
            }
            let count = by_status.entry(run.status.as_str().to_owned()).or_insert(0_usize);
            *count = count.saturating_add(1);
        }
        SimulationStats {
            is_running: self.running,
            tick_rate_hz: self.tick_rate_hz,
            tick_interval_ms: self.interval_ms,
            tick_count: self.tick_count,
            seq: self.seq,
            clock_ms: self.clock_ms,
            started_ts: self.started_ts,
            last_tick_ts: self.last_tick_ts,
            uptime_ms: self
                .started_ts
                .map_or(0, |started| (self.clock)().saturating_sub(started).max(0)),
            queue_depth: QueueDepth {
                commands: self.pending_commands.len(),
                events: self.pending_events.len(),
            },
            tick_timing_ms: TickTiming {
                summary: tick_timing,
                last_tick_duration_ms: tick_timing.last,
            },
            queue_latency_ms: QueueLatency {
                commands: self.command_latency.summary(),
                events: self.event_latency.summary(),
            },
            openclaw_runs: RunStats {
                total,
                active,
                by_status,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use officeclaw_nav::StaticSceneLoader;
    use officeclaw_types::{ErrorCode, TaskStatus};
    use serde_json::json;

    use super::*;

    fn simulation(hz: f64) -> Simulation {
        let world = WorldStore::new("cozy_office_v0", Arc::new(StaticSceneLoader::empty()));
        Simulation::new(world, hz).with_clock(|| 1_000)
    }

    #[test]
    fn tick_rate_is_clamped_and_sets_the_interval() {
        let mut sim = simulation(50.0);
        assert_eq!(sim.stats().tick_rate_hz, 20);
        assert_eq!(sim.interval_ms(), 50);
        let stats = sim.set_tick_rate_hz(12.4);
        assert_eq!(stats.tick_rate_hz, 12);
        assert_eq!(stats.tick_interval_ms, 83);
        assert_eq!(sim.set_tick_rate_hz(f64::NAN).tick_rate_hz, 10);
        assert_eq!(
            Simulation::tick_rate_bounds(),
            TickRateBounds {
                min_hz: 10,
                max_hz: 20
            }
        );
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let mut sim = simulation(10.0);
        assert!(!sim.stats().is_running);
        assert!(sim.start().is_running);
        assert!(sim.start().is_running);
        assert_eq!(sim.stats().started_ts, Some(1_000));
        assert!(!sim.stop().is_running);
        assert!(!sim.stop().is_running);
    }

    #[test]
    fn queued_commands_wait_for_the_tick() {
        let mut sim = simulation(10.0);
        let ticket = sim.enqueue_command(
            json!({"name": "assign_task", "data": {"task_id": "task_copy", "agent_id": "agent_eng_1"}}),
            None,
        );
        assert_eq!(sim.stats().queue_depth.commands, 1);
        assert_eq!(
            sim.world().task("task_copy").and_then(|task| task.assignee.clone()),
            None
        );

        let report = sim.tick();
        assert!(report.advanced);
        assert_eq!(report.commands.len(), 1);
        assert_eq!(report.commands[0].ticket, ticket);
        assert!(report.commands[0].outcome.ok);
        assert_eq!(sim.stats().queue_depth.commands, 0);
        // Applied before the world advanced, so the task already started.
        assert_eq!(
            sim.world().task("task_copy").map(|task| task.status),
            Some(TaskStatus::InProgress)
        );
    }

    #[test]
    fn commands_drain_before_events() {
        let mut sim = simulation(10.0);
        sim.enqueue_event(json!({"name": "task_done", "task_id": "task_copy"}));
        sim.enqueue_command(
            json!({"name": "cancel_task", "data": {"task_id": "task_copy", "confirm": true}}),
            None,
        );
        let report = sim.tick();
        assert!(report.commands[0].outcome.ok);
        assert_eq!(report.events_applied, 1);
        // Cancelled first; the later done event cannot revive it.
        assert_eq!(
            sim.world().task("task_copy").map(|task| task.status),
            Some(TaskStatus::Cancelled)
        );
    }

    #[test]
    fn rejected_commands_report_their_code() {
        let mut sim = simulation(10.0);
        sim.enqueue_command(json!({"name": "fly_to_moon", "data": {}}), None);
        sim.enqueue_command(json!({"name": "auto_assign"}), None);
        let report = sim.flush();
        assert!(!report.advanced);
        assert_eq!(report.commands[0].outcome.code, Some(ErrorCode::ValidationFailed));
        assert_eq!(report.commands[1].outcome.code, Some(ErrorCode::ValidationFailed));
        assert_eq!(sim.stats().tick_count, 0);
    }

    #[test]
    fn ticks_advance_counters_and_clock() {
        let mut sim = simulation(10.0);
        let reports = sim.run_ticks(3);
        assert_eq!(reports.len(), 3);
        let stats = sim.stats();
        assert_eq!(stats.tick_count, 3);
        assert_eq!(stats.seq, 3);
        assert_eq!(stats.clock_ms, 300);
        assert_eq!(stats.tick_timing_ms.summary.samples, 3);
        assert_eq!(stats.last_tick_ts, Some(1_000));
        assert_eq!(sim.run_ticks(0).len(), 1);

        let snapshot = sim.snapshot(Some("other_scene"));
        assert_eq!(snapshot.seq, 4);
        assert_eq!(snapshot.clock_ms, 400);
        assert_eq!(snapshot.world.scene_id, "other_scene");
    }

    #[test]
    fn stats_count_background_runs() {
        let mut sim = simulation(10.0);
        sim.run_ticks(2);
        let runs = sim.stats().openclaw_runs;
        assert_eq!(runs.total, 1);
        assert_eq!(runs.active, 1);
        assert_eq!(runs.by_status.get("started"), Some(&1));
        assert!(sim.validate_snapshot().ok);
    }

    #[test]
    fn replaying_the_same_commands_is_deterministic() {
        let commands = [
            json!({"name": "submit_request", "data": {"text": "Research competitors. Draft launch messaging."}}),
            json!({"name": "auto_assign", "data": {"project_id": "proj_req_001"}}),
            json!({"name": "start_kickoff", "data": {"project_id": "proj_req_001"}}),
        ];
        let run = || {
            let mut sim = simulation(10.0);
            for command in &commands {
                sim.enqueue_command(command.clone(), None);
            }
            sim.run_ticks(6);
            serde_json::to_string(&sim.snapshot(None)).unwrap()
        };
        assert_eq!(run(), run());
    }
}
