//! Semantic events fed back into the world.
//!
//! Unknown names, non-object payloads and references to missing entities
//! are ignored.

use serde_json::Value;
use tracing::{debug, warn};

use officeclaw_types::{
    AgentState, Artifact, ArtifactId, ArtifactStatus, Decision, DecisionId, DecisionStatus,
    RunStatus, Task, TaskId, TaskStatus,
};

use crate::output::adapt_output;
use crate::store::{WorldStore, bump};
use crate::text::normalize_task_title;

fn str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

impl WorldStore {
    /// Apply one semantic event.
    pub fn apply_event(&mut self, payload: &Value) {
        if !payload.is_object() {
            return;
        }
        let Some(name) = str_field(payload, "name") else {
            return;
        };
        match name {
            "openclaw_run_status" => self.apply_run_status(payload),
            "openclaw_output_ready" => self.apply_output_ready(payload),
            "task_started" | "task_done" => {
                let Some(task_id) = str_field(payload, "task_id")
                    .and_then(|id| self.tasks.get(id))
                    .filter(|task| !task.status.is_terminal())
                    .map(|task| task.task_id.clone())
                else {
                    return;
                };
                if name == "task_started" {
                    self.start_task_from_event(&task_id);
                } else {
                    self.complete_task(&task_id);
                }
            }
            _ => {}
        }
    }

    fn start_task_from_event(&mut self, task_id: &TaskId) {
        let Some(task) = self.tasks.get_mut(task_id) else {
            return;
        };
        task.status = TaskStatus::InProgress;
        let assignee = task.assignee.clone();
        let project_id = task.project_id.clone();
        self.set_task_transition(task_id, "started");
        if let Some(agent_id) = assignee {
            self.transition_agent(&agent_id, AgentState::WalkingToPoi, "event_task_started");
        }
        self.refresh_project_status(&project_id);
    }

    // ---- Background run callbacks ----

    fn apply_run_status(&mut self, payload: &Value) {
        let Some(status) = str_field(payload, "status").and_then(RunStatus::parse) else {
            return;
        };
        let task_id = str_field(payload, "task_id")
            .and_then(|id| self.runs.get(id))
            .or_else(|| {
                str_field(payload, "run_id").and_then(|run_id| {
                    self.runs.values().find(|run| run.run_id == *run_id)
                })
            })
            .map(|run| run.task_id.clone());
        let Some(task_id) = task_id else {
            return;
        };
        if !self.record_run(&task_id, status, "status_callback") {
            debug!(task_id = %task_id, status = status.as_str(), "Run status callback ignored");
            return;
        }
        let Some(task) = self.tasks.get(&task_id) else {
            return;
        };
        let project_id = task.project_id.clone();

        match status {
            RunStatus::Running => self.set_task_transition(&task_id, "openclaw_running"),
            RunStatus::Completed => self.complete_task(&task_id),
            RunStatus::Failed => {
                if task.status == TaskStatus::InProgress {
                    let assignee = task.assignee.clone();
                    if let Some(task) = self.tasks.get_mut(&task_id) {
                        task.status = TaskStatus::Blocked;
                    }
                    self.set_task_transition(&task_id, "openclaw_failed");
                    if let Some(agent_id) = assignee {
                        self.transition_agent(
                            &agent_id,
                            AgentState::BlockedWaiting,
                            "openclaw_failed",
                        );
                    }
                }
                self.refresh_project_status(&project_id);
            }
            RunStatus::Started | RunStatus::Cancelled => {}
        }
    }

    // ---- Worker output ----

    fn apply_output_ready(&mut self, payload: &Value) {
        let Some(task) = str_field(payload, "task_id").and_then(|id| self.tasks.get(id)) else {
            return;
        };
        if task.status.is_terminal() {
            return;
        }
        let task_id = task.task_id.clone();
        let project_id = task.project_id.clone();

        let adapted = match adapt_output(payload.get("output").unwrap_or(&Value::Null)) {
            Ok(adapted) => adapted,
            Err(error) => {
                warn!(task_id = %task_id, error = %error, "Malformed worker output");
                self.finish_active_run(&task_id, RunStatus::Failed, "malformed_output");
                let decision_id = self.open_decision_for_task(&task_id).or_else(|| {
                    self.create_decision_for_task(
                        &task_id,
                        &format!("OpenClaw output malformed: {error}"),
                    )
                });
                if let Some(decision_id) = decision_id {
                    self.block_task_for_decision(&task_id, &decision_id);
                }
                return;
            }
        };

        self.finish_active_run(&task_id, RunStatus::Completed, "output_applied");

        for artifact in adapted.artifacts {
            let counter = bump(&mut self.counters.oc_artifact);
            let artifact_id = ArtifactId::new(format!("art_oc_{counter:04}"));
            self.artifacts.insert(
                artifact_id.clone(),
                Artifact {
                    artifact_id,
                    project_id: project_id.clone(),
                    artifact_type: artifact.artifact_type,
                    status: ArtifactStatus::Delivered,
                    version: 1,
                    task_id: Some(task_id.clone()),
                    poi_id: artifact.poi_id,
                },
            );
        }

        let mut created = Vec::with_capacity(adapted.decisions.len());
        for decision in adapted.decisions {
            let counter = bump(&mut self.counters.oc_decision);
            let decision_id = DecisionId::new(format!("dec_oc_{counter:04}"));
            self.decisions.insert(
                decision_id.clone(),
                Decision {
                    decision_id: decision_id.clone(),
                    project_id: project_id.clone(),
                    task_id: Some(task_id.clone()),
                    status: DecisionStatus::Open,
                    prompt: decision.prompt,
                    options: decision.options,
                    choice: None,
                },
            );
            self.record_decision(&decision_id, DecisionStatus::Open, "openclaw_output", None);
            created.push(decision_id);
        }

        for title in adapted.follow_up_tasks {
            let counter = bump(&mut self.counters.oc_task);
            let follow_up_id = TaskId::new(format!("task_oc_{counter:04}"));
            self.tasks.insert(
                follow_up_id.clone(),
                Task::new(
                    follow_up_id.clone(),
                    project_id.clone(),
                    normalize_task_title(&title, counter),
                    TaskStatus::Planned,
                ),
            );
            self.task_runtime_mut(&follow_up_id);
        }

        debug!(
            task_id = %task_id,
            decisions = created.len(),
            "Worker output applied"
        );
        match created.first() {
            Some(decision_id) => self.block_task_for_decision(&task_id, decision_id),
            None => self.complete_task(&task_id),
        }
    }
}
