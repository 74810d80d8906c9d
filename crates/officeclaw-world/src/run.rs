//! Background-work (`OpenClaw`) run records.
//!
//! A run is dispatched when an agent starts working on an in-progress task
//! and is then driven by status callbacks from the worker. Each task keeps
//! its latest run; at most one run per task is active at a time.

use serde::Serialize;

use officeclaw_types::{AgentId, ProjectId, RunId, RunStatus, TaskId};

/// Whether `from -> to` is a legal run status transition.
pub const fn can_transition(from: RunStatus, to: RunStatus) -> bool {
    use RunStatus::{Cancelled, Completed, Failed, Running, Started};
    matches!(
        (from, to),
        (Started, Started | Running | Completed | Failed | Cancelled)
            | (Running, Running | Completed | Failed | Cancelled)
            | (Completed, Completed)
            | (Failed, Failed)
            | (Cancelled, Cancelled)
    )
}

/// One entry in a run's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunTransition {
    /// Store-wide run transition sequence number.
    pub seq: u64,
    /// Status entered.
    pub status: RunStatus,
    /// Why the status changed.
    pub reason: String,
}

/// A background-work run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    /// `run_oc_{NNNN}`.
    pub run_id: RunId,
    /// Project of the task.
    pub project_id: ProjectId,
    /// Task the run works on.
    pub task_id: TaskId,
    /// Agent that started the run.
    pub agent_id: AgentId,
    /// Current status.
    pub status: RunStatus,
    /// World tick at dispatch.
    pub started_tick: u64,
    /// World tick of the last status change.
    pub updated_tick: u64,
    /// Every status entered, oldest first.
    pub history: Vec<RunTransition>,
}

impl RunRecord {
    /// Whether the run is still started or running.
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Record a status change. The caller has checked legality.
    pub fn record(&mut self, seq: u64, status: RunStatus, reason: &str, tick: u64) {
        self.status = status;
        self.updated_tick = tick;
        self.history.push(RunTransition {
            seq,
            status,
            reason: reason.to_owned(),
        });
    }
}
