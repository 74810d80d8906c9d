//! Typed world commands.
//!
//! A [`CommandPayload`] is `{name, data}` with free-form data. Parsing
//! turns it into a [`WorldCommand`] carrying exactly the fields each
//! handler needs, or into the rejection the client will see.

use serde_json::{Map, Value};

use officeclaw_types::{
    AgentId, ArtifactId, CommandOutcome, CommandPayload, DecisionId, ErrorCode, ProjectId, TaskId,
    Vec3,
};

/// Every command the store accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldCommand {
    /// Create a project and three planned tasks from free text.
    SubmitRequest {
        /// Trimmed request text.
        text: String,
    },
    /// Assign a task to an agent, creating the agent if needed.
    AssignTask {
        /// Task to assign.
        task_id: TaskId,
        /// Agent receiving it.
        agent_id: AgentId,
    },
    /// Pair idle agents with unassigned tasks of a project.
    AutoAssign {
        /// Project to staff.
        project_id: ProjectId,
    },
    /// Resolve an open decision.
    ResolveDecision {
        /// Decision to resolve.
        decision_id: DecisionId,
        /// Chosen option.
        choice: String,
    },
    /// Approve an artifact and complete its task.
    ApproveArtifact {
        /// Artifact to approve.
        artifact_id: ArtifactId,
    },
    /// Ask for a new revision of an artifact.
    RequestChanges {
        /// Artifact under review.
        artifact_id: ArtifactId,
        /// What to change.
        instructions: String,
    },
    /// Fan an artifact out into new planned tasks.
    SplitIntoTasks {
        /// Artifact being split.
        artifact_id: ArtifactId,
        /// Raw titles; non-strings get positional titles.
        task_titles: Vec<Value>,
    },
    /// Report the player's position.
    PlayerPos {
        /// Position.
        pos: Vec3,
        /// Facing, when reported.
        facing: Option<Vec3>,
    },
    /// Walk the player to a position along the nav grid.
    MovePlayerTo {
        /// Requested target.
        pos: Vec3,
    },
    /// Pull project participants into a kickoff meeting.
    StartKickoff {
        /// Project; the first project when absent.
        project_id: Option<ProjectId>,
    },
    /// Move a task to another agent, guarded by optimistic checks.
    ReassignTask {
        /// Task to move.
        task_id: TaskId,
        /// New assignee.
        to_agent_id: AgentId,
        /// Expected current assignee.
        from_agent_id: Option<AgentId>,
        /// Expected current task status.
        expected_task_status: Option<String>,
    },
    /// Cancel a task.
    CancelTask {
        /// Task to cancel.
        task_id: TaskId,
        /// Expected current task status.
        expected_task_status: Option<String>,
    },
    /// Stop dispatching a project's planned tasks.
    PauseProject {
        /// Project to pause.
        project_id: ProjectId,
        /// Expected current project status.
        expected_project_status: Option<String>,
    },
    /// Resume a paused project.
    ResumeProject {
        /// Project to resume.
        project_id: ProjectId,
        /// Expected current project status.
        expected_project_status: Option<String>,
    },
    /// Clone a finished task as a new planned task.
    RerunTask {
        /// Task to clone.
        source_task_id: TaskId,
        /// Operator reason.
        reason: Option<String>,
        /// Constraint overrides for the clone.
        constraints_patch: Option<Value>,
    },
}

fn invalid(message: impl Into<String>) -> CommandOutcome {
    CommandOutcome::rejected(ErrorCode::ValidationFailed, message)
}

fn string_field<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

fn owned_field(data: &Map<String, Value>, key: &str) -> Option<String> {
    string_field(data, key).map(str::to_owned)
}

/// Parse a finite `[x, y, z]` array.
pub fn parse_vec3(value: &Value) -> Option<Vec3> {
    match value.as_array()?.as_slice() {
        [x, y, z] => {
            let v = [x.as_f64()?, y.as_f64()?, z.as_f64()?];
            v.iter().all(|c| c.is_finite()).then_some(v)
        }
        _ => None,
    }
}

impl WorldCommand {
    /// Wire name of the command.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SubmitRequest { .. } => "submit_request",
            Self::AssignTask { .. } => "assign_task",
            Self::AutoAssign { .. } => "auto_assign",
            Self::ResolveDecision { .. } => "resolve_decision",
            Self::ApproveArtifact { .. } => "approve_artifact",
            Self::RequestChanges { .. } => "request_changes",
            Self::SplitIntoTasks { .. } => "split_into_tasks",
            Self::PlayerPos { .. } => "player_pos",
            Self::MovePlayerTo { .. } => "move_player_to",
            Self::StartKickoff { .. } => "start_kickoff",
            Self::ReassignTask { .. } => "reassign_task",
            Self::CancelTask { .. } => "cancel_task",
            Self::PauseProject { .. } => "pause_project",
            Self::ResumeProject { .. } => "resume_project",
            Self::RerunTask { .. } => "rerun_task",
        }
    }

    /// Parse a payload. The error is the outcome to report to the client.
    #[allow(clippy::too_many_lines)]
    pub fn parse(payload: &CommandPayload) -> Result<Self, CommandOutcome> {
        let data = payload
            .data_object()
            .ok_or_else(|| invalid("command payload requires {name,data}"))?;
        match payload.name.as_str() {
            "submit_request" => {
                let text = string_field(data, "text")
                    .map(str::trim)
                    .filter(|text| !text.is_empty())
                    .ok_or_else(|| invalid("submit_request requires non-empty text"))?;
                Ok(Self::SubmitRequest {
                    text: text.to_owned(),
                })
            }
            "assign_task" => match (string_field(data, "task_id"), string_field(data, "agent_id")) {
                (Some(task_id), Some(agent_id)) => Ok(Self::AssignTask {
                    task_id: TaskId::from(task_id),
                    agent_id: AgentId::from(agent_id),
                }),
                _ => Err(invalid("assign_task requires task_id and agent_id")),
            },
            "auto_assign" => string_field(data, "project_id")
                .map(|project_id| Self::AutoAssign {
                    project_id: ProjectId::from(project_id),
                })
                .ok_or_else(|| invalid("auto_assign requires project_id")),
            "resolve_decision" => {
                match (string_field(data, "decision_id"), owned_field(data, "choice")) {
                    (Some(decision_id), Some(choice)) => Ok(Self::ResolveDecision {
                        decision_id: DecisionId::from(decision_id),
                        choice,
                    }),
                    _ => Err(invalid("resolve_decision requires decision_id and choice")),
                }
            }
            "approve_artifact" => string_field(data, "artifact_id")
                .map(|artifact_id| Self::ApproveArtifact {
                    artifact_id: ArtifactId::from(artifact_id),
                })
                .ok_or_else(|| invalid("approve_artifact requires artifact_id")),
            "request_changes" => {
                match (string_field(data, "artifact_id"), owned_field(data, "instructions")) {
                    (Some(artifact_id), Some(instructions)) => Ok(Self::RequestChanges {
                        artifact_id: ArtifactId::from(artifact_id),
                        instructions,
                    }),
                    _ => Err(invalid(
                        "request_changes requires artifact_id and instructions",
                    )),
                }
            }
            "split_into_tasks" => {
                match (
                    string_field(data, "artifact_id"),
                    data.get("task_titles").and_then(Value::as_array),
                ) {
                    (Some(artifact_id), Some(titles)) => Ok(Self::SplitIntoTasks {
                        artifact_id: ArtifactId::from(artifact_id),
                        task_titles: titles.clone(),
                    }),
                    _ => Err(invalid(
                        "split_into_tasks requires artifact_id and task_titles[]",
                    )),
                }
            }
            "player_pos" => {
                let pos = data
                    .get("pos")
                    .and_then(parse_vec3)
                    .ok_or_else(|| invalid("player_pos requires pos [x,y,z]"))?;
                let facing = match data.get("facing") {
                    None => None,
                    Some(raw) => Some(parse_vec3(raw).ok_or_else(|| invalid("facing must be [x,y,z]"))?),
                };
                Ok(Self::PlayerPos { pos, facing })
            }
            "move_player_to" => data
                .get("pos")
                .and_then(parse_vec3)
                .map(|pos| Self::MovePlayerTo { pos })
                .ok_or_else(|| invalid("move_player_to requires pos [x,y,z]")),
            "start_kickoff" => match data.get("project_id") {
                None => Ok(Self::StartKickoff { project_id: None }),
                Some(Value::String(project_id)) => Ok(Self::StartKickoff {
                    project_id: Some(ProjectId::from(project_id.as_str())),
                }),
                Some(_) => Err(invalid(
                    "start_kickoff project_id must be string when provided",
                )),
            },
            "reassign_task" => {
                match (string_field(data, "task_id"), string_field(data, "to_agent_id")) {
                    (Some(task_id), Some(to_agent_id)) => Ok(Self::ReassignTask {
                        task_id: TaskId::from(task_id),
                        to_agent_id: AgentId::from(to_agent_id),
                        from_agent_id: string_field(data, "from_agent_id").map(AgentId::from),
                        expected_task_status: owned_field(data, "expected_task_status"),
                    }),
                    _ => Err(invalid("reassign_task requires task_id and to_agent_id")),
                }
            }
            "cancel_task" => {
                let confirmed = data.get("confirm").and_then(Value::as_bool) == Some(true);
                match string_field(data, "task_id") {
                    Some(task_id) if confirmed => Ok(Self::CancelTask {
                        task_id: TaskId::from(task_id),
                        expected_task_status: owned_field(data, "expected_task_status"),
                    }),
                    _ => Err(invalid("cancel_task requires task_id and confirm=true")),
                }
            }
            "pause_project" => string_field(data, "project_id")
                .map(|project_id| Self::PauseProject {
                    project_id: ProjectId::from(project_id),
                    expected_project_status: owned_field(data, "expected_project_status"),
                })
                .ok_or_else(|| invalid("pause_project requires project_id")),
            "resume_project" => string_field(data, "project_id")
                .map(|project_id| Self::ResumeProject {
                    project_id: ProjectId::from(project_id),
                    expected_project_status: owned_field(data, "expected_project_status"),
                })
                .ok_or_else(|| invalid("resume_project requires project_id")),
            "rerun_task" => {
                let source_task_id = string_field(data, "source_task_id")
                    .ok_or_else(|| invalid("rerun_task requires source_task_id"))?;
                if data
                    .get("mode")
                    .is_some_and(|mode| mode.as_str() != Some("clone_as_new"))
                {
                    return Err(invalid("rerun_task mode must be clone_as_new"));
                }
                let reason = string_field(data, "reason")
                    .map(str::trim)
                    .filter(|reason| !reason.is_empty())
                    .map(str::to_owned);
                let constraints_patch = data
                    .get("constraints_patch")
                    .filter(|patch| patch.is_object() || patch.is_array())
                    .cloned();
                Ok(Self::RerunTask {
                    source_task_id: TaskId::from(source_task_id),
                    reason,
                    constraints_patch,
                })
            }
            other => Err(invalid(format!("unknown command: {other}"))),
        }
    }
}
