//! Decision lifecycle bookkeeping.

use std::collections::BTreeSet;

use serde::Serialize;

use officeclaw_types::{DecisionId, DecisionStatus, ProjectId, TaskId};

/// Prompt length cap for decisions raised by the store.
pub const MAX_PROMPT_CHARS: usize = 240;

/// Options offered by decisions opened through `request_changes`.
pub const CHANGE_REQUEST_OPTIONS: [&str; 3] = [
    "Revise and resubmit",
    "Clarify requirements",
    "Escalate to user",
];

/// One entry in a decision's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionTransition {
    /// Store-wide decision transition sequence number.
    pub seq: u64,
    /// Status entered.
    pub status: DecisionStatus,
    /// Why it changed.
    pub reason: String,
    /// Choice recorded with a resolution.
    pub choice: Option<String>,
}

/// Runtime state kept beside each decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecisionRuntime {
    /// Number of recorded transitions.
    pub transition_count: u64,
    /// Tasks this decision has blocked since it was opened.
    pub blocked_task_ids: BTreeSet<TaskId>,
    /// Tasks resumed by the resolution.
    pub resolved_task_ids: Vec<TaskId>,
    /// Transitions, oldest first.
    pub history: Vec<DecisionTransition>,
}

impl DecisionRuntime {
    /// Append a transition.
    pub fn record(&mut self, seq: u64, status: DecisionStatus, reason: &str, choice: Option<&str>) {
        self.transition_count = self.transition_count.saturating_add(1);
        self.history.push(DecisionTransition {
            seq,
            status,
            reason: reason.to_owned(),
            choice: choice.map(str::to_owned),
        });
    }
}

/// Serialized lifecycle of one decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionLifecycle {
    /// The decision.
    pub decision_id: DecisionId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Linked task.
    pub task_id: Option<TaskId>,
    /// Current status.
    pub status: DecisionStatus,
    /// Resolution choice.
    pub choice: Option<String>,
    /// Every task the decision blocked, sorted.
    pub blocked_task_ids: Vec<TaskId>,
    /// Tasks still blocked on it right now, sorted.
    pub active_blocked_task_ids: Vec<TaskId>,
    /// Tasks resumed by the resolution.
    pub resolved_task_ids: Vec<TaskId>,
    /// Number of recorded transitions.
    pub transition_count: u64,
    /// Transitions, oldest first.
    pub history: Vec<DecisionTransition>,
}

/// Truncate a prompt to [`MAX_PROMPT_CHARS`] characters.
pub fn clip_prompt(text: &str) -> String {
    text.chars().take(MAX_PROMPT_CHARS).collect()
}
