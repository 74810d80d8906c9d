//! Core entity structs and the world snapshot.
//!
//! These are the client-visible shapes of every entity the store owns.
//! Runtime bookkeeping (FSM counters, decision history, run records) lives
//! beside them in the store and is exposed through dedicated views.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;

use crate::enums::{
    AgentState, ArtifactStatus, DecisionStatus, DecorOutcome, ProjectStatus, TaskStatus,
};
use crate::ids::{AgentId, ArtifactId, DecisionId, DecorId, ProjectId, TaskId};

/// A world-space position or facing vector `[x, y, z]`.
pub type Vec3 = [f64; 3];

/// A project grouping tasks, artifacts and decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Project {
    /// Unique identifier.
    pub project_id: ProjectId,
    /// Display title.
    pub title: String,
    /// Derived lifecycle status.
    pub status: ProjectStatus,
}

/// A unit of work inside a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Task {
    /// Unique identifier.
    pub task_id: TaskId,
    /// Owning project; always resolves.
    pub project_id: ProjectId,
    /// Display title.
    pub title: String,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Assigned agent, if any.
    pub assignee: Option<AgentId>,
    /// Source task when this task was created by `rerun_task`.
    pub rerun_of_task_id: Option<TaskId>,
    /// Operator-supplied reason for the rerun.
    pub rerun_reason: Option<String>,
    /// Constraint overrides carried by a rerun.
    pub constraints_patch: Option<Value>,
}

impl Task {
    /// Create a plain task with no assignee or rerun lineage.
    pub fn new(
        task_id: TaskId,
        project_id: ProjectId,
        title: impl Into<String>,
        status: TaskStatus,
    ) -> Self {
        Self {
            task_id,
            project_id,
            title: title.into(),
            status,
            assignee: None,
            rerun_of_task_id: None,
            rerun_reason: None,
            constraints_patch: None,
        }
    }
}

/// An agent as seen by clients. `state` is the effective FSM state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Agent {
    /// Unique identifier.
    pub agent_id: AgentId,
    /// Effective FSM state (top override, else base state).
    pub state: AgentState,
    /// World position.
    pub pos: Vec3,
    /// Task the agent is currently holding.
    pub task_id: Option<TaskId>,
    /// Facing vector, when known.
    pub facing: Option<Vec3>,
}

/// One revision in an artifact version chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Artifact {
    /// Unique identifier, `{base}_v{version}` for revisions.
    pub artifact_id: ArtifactId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Free-form artifact type (`report`, `note`, ...).
    #[serde(rename = "type")]
    pub artifact_type: String,
    /// Lifecycle status.
    pub status: ArtifactStatus,
    /// Positive version number within the chain.
    pub version: u32,
    /// Linked task, if any.
    pub task_id: Option<TaskId>,
    /// Point of interest where the artifact is displayed.
    pub poi_id: Option<String>,
}

/// A question raised to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Decision {
    /// Unique identifier.
    pub decision_id: DecisionId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Task this decision blocks, if any.
    pub task_id: Option<TaskId>,
    /// Lifecycle status.
    pub status: DecisionStatus,
    /// Question shown to the user.
    pub prompt: String,
    /// Offered choices.
    pub options: Vec<String>,
    /// Chosen option once resolved.
    pub choice: Option<String>,
}

/// A decor item unlocked by a completed project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct OfficeDecor {
    /// Unique identifier.
    pub decor_id: DecorId,
    /// Project the decor belongs to.
    pub project_id: ProjectId,
    /// Scene anchor the decor is placed at.
    pub anchor_id: String,
    /// Project whose completion unlocked the decor.
    pub unlocked_by_project_id: ProjectId,
    /// How the project completed.
    pub outcome: DecorOutcome,
}

/// Full entity dump of the world, every collection sorted by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct WorldSnapshot {
    /// Active scene.
    pub scene_id: String,
    /// All agents.
    pub agents: Vec<Agent>,
    /// All projects.
    pub projects: Vec<Project>,
    /// All tasks.
    pub tasks: Vec<Task>,
    /// All artifacts.
    pub artifacts: Vec<Artifact>,
    /// All decisions.
    pub decisions: Vec<Decision>,
    /// All decor items.
    pub office_decor: Vec<OfficeDecor>,
}

/// An immutable entry in the event timeline.
///
/// `name` and the domain payload are flattened into the same JSON object
/// as the bookkeeping fields, so a `task_assigned` event serializes as
/// `{"seq":4,"event_id":"evt_00000004","ts":...,"name":"task_assigned","task_id":...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Timeline position, strictly increasing and gapless.
    pub seq: u64,
    /// `evt_{seq:08}`.
    pub event_id: String,
    /// Append time in epoch milliseconds.
    pub ts: i64,
    /// Event name (`task_assigned`, `task_progress`, ...).
    #[serde(default)]
    pub name: String,
    /// Remaining domain fields.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_type_field_is_renamed() {
        let artifact = Artifact {
            artifact_id: ArtifactId::from("art_x_v1"),
            project_id: ProjectId::from("proj_abc"),
            artifact_type: String::from("report"),
            status: ArtifactStatus::Delivered,
            version: 1,
            task_id: None,
            poi_id: None,
        };
        let value = serde_json::to_value(&artifact).ok();
        let kind = value
            .as_ref()
            .and_then(|v| v.get("type"))
            .and_then(Value::as_str);
        assert_eq!(kind, Some("report"));
    }

    #[test]
    fn event_flattens_payload() {
        let raw = r#"{"seq":3,"event_id":"evt_00000003","ts":10,"name":"task_done","task_id":"task_copy"}"#;
        let event: Option<Event> = serde_json::from_str(raw).ok();
        let event = event.unwrap_or_else(|| Event {
            seq: 0,
            event_id: String::new(),
            ts: 0,
            name: String::new(),
            payload: Map::new(),
        });
        assert_eq!(event.seq, 3);
        assert_eq!(event.name, "task_done");
        assert_eq!(
            event.payload.get("task_id").and_then(Value::as_str),
            Some("task_copy")
        );
    }
}
