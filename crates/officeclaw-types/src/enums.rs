//! Enumeration types for entity lifecycles and the wire protocol.
//!
//! Wire spellings are fixed: lifecycle statuses serialize in `snake_case`,
//! agent FSM states keep their `PascalCase` names, and error codes use
//! `SCREAMING_SNAKE_CASE`.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Project lifecycle status. Derived from the project's tasks, never set
/// directly by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ProjectStatus {
    /// Freshly created, no derivation has run yet.
    Created,
    /// Has no work underway.
    Planning,
    /// At least one task is in progress.
    Executing,
    /// Paused, or every open task is blocked.
    Blocked,
    /// Every task is terminal.
    Completed,
    /// Retired.
    Archived,
}

impl ProjectStatus {
    /// Wire spelling of the status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

/// Task lifecycle status. `Done` and `Cancelled` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum TaskStatus {
    /// Not yet started.
    Planned,
    /// Being worked on by its assignee.
    InProgress,
    /// Waiting on a decision or a failed run.
    Blocked,
    /// Finished.
    Done,
    /// Abandoned.
    Cancelled,
}

impl TaskStatus {
    /// Whether the status is absorbing (`done` or `cancelled`).
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }

    /// Wire spelling of the status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Agent finite-state-machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum AgentState {
    /// Idle at the home desk.
    IdleAtHome,
    /// Walking toward a point of interest.
    #[serde(rename = "WalkingToPOI")]
    WalkingToPoi,
    /// Working at a point of interest.
    #[serde(rename = "WorkingAtPOI")]
    WorkingAtPoi,
    /// Attending a ceremony.
    InMeeting,
    /// Waiting on something outside its control.
    BlockedWaiting,
    /// Walking toward the user to ask for a decision.
    SeekingUserDecision,
}

impl AgentState {
    /// Wire spelling of the state.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IdleAtHome => "IdleAtHome",
            Self::WalkingToPoi => "WalkingToPOI",
            Self::WorkingAtPoi => "WorkingAtPOI",
            Self::InMeeting => "InMeeting",
            Self::BlockedWaiting => "BlockedWaiting",
            Self::SeekingUserDecision => "SeekingUserDecision",
        }
    }
}

/// Artifact lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ArtifactStatus {
    /// Created but not handed over.
    Created,
    /// Handed over, awaiting review.
    Delivered,
    /// Under review.
    InReview,
    /// Accepted.
    Approved,
    /// Review asked for a new revision.
    ChangesRequested,
    /// Replaced by a newer approved revision.
    Superseded,
    /// Retired.
    Archived,
}

impl ArtifactStatus {
    /// Whether the artifact can be approved, rejected or split.
    pub const fn is_reviewable(self) -> bool {
        matches!(self, Self::Delivered | Self::InReview | Self::ChangesRequested)
    }
}

/// Decision lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum DecisionStatus {
    /// Waiting for the user.
    Open,
    /// The user picked an option.
    Resolved,
    /// Withdrawn because its task was cancelled.
    Cancelled,
}

/// Background-work (`OpenClaw`) run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum RunStatus {
    /// Dispatched.
    Started,
    /// Acknowledged by the worker.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with a failure.
    Failed,
    /// Interrupted by the world.
    Cancelled,
}

impl RunStatus {
    /// Whether the run still counts against the one-active-run-per-task rule.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Started | Self::Running)
    }

    /// Wire spelling of the status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse a status string case-insensitively, ignoring surrounding space.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "started" => Some(Self::Started),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Kind of a temporary agent-state override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum OverrideKind {
    /// Project kickoff meeting.
    Kickoff,
    /// Artifact review meeting.
    Review,
}

impl OverrideKind {
    /// Wire spelling of the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kickoff => "kickoff",
            Self::Review => "review",
        }
    }
}

/// How a completed project earned its decor item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum DecorOutcome {
    /// At least one artifact was approved.
    ArtifactApproved,
    /// At least one decision was resolved.
    DecisionResolved,
    /// The project simply completed.
    Completed,
}

impl DecorOutcome {
    /// Decor id prefix used for this outcome.
    pub const fn decor_prefix(self) -> &'static str {
        match self {
            Self::ArtifactApproved => "trophy_artifact_delivery",
            Self::DecisionResolved => "plaque_decision_resolution",
            Self::Completed => "plant_completed_project",
        }
    }
}

/// Rejection code carried by every failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum ErrorCode {
    /// Malformed or unknown command or message.
    ValidationFailed,
    /// Referenced entity absent.
    NotFound,
    /// Optimistic guard mismatch or lifecycle rule violation.
    Conflict,
    /// Session exceeded its command quota.
    RateLimited,
    /// Policy or restoration gate forbids the action.
    NotAllowed,
    /// Unexpected server failure.
    Internal,
}

impl ErrorCode {
    /// Wire spelling of the code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::NotAllowed => "NOT_ALLOWED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_state_keeps_poi_spelling() {
        let json = serde_json::to_string(&AgentState::WalkingToPoi).ok();
        assert_eq!(json.as_deref(), Some("\"WalkingToPOI\""));
        let parsed: Option<AgentState> = serde_json::from_str("\"WorkingAtPOI\"").ok();
        assert_eq!(parsed, Some(AgentState::WorkingAtPoi));
    }

    #[test]
    fn error_code_is_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::ValidationFailed).ok();
        assert_eq!(json.as_deref(), Some("\"VALIDATION_FAILED\""));
        assert_eq!(ErrorCode::NotAllowed.to_string(), "NOT_ALLOWED");
    }

    #[test]
    fn run_status_parse_normalizes_input() {
        assert_eq!(RunStatus::parse("  Running "), Some(RunStatus::Running));
        assert_eq!(RunStatus::parse("COMPLETED"), Some(RunStatus::Completed));
        assert_eq!(RunStatus::parse("paused"), None);
    }

    #[test]
    fn terminal_task_statuses() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Blocked.is_terminal());
    }
}
