//! Semantic timeline events derived from accepted commands.
//!
//! Clients do not diff snapshots to learn what happened; every accepted
//! command is narrated as one or more named events carrying the project
//! it touched and a `meta` block linking back to the originating message.

use serde_json::{Map, Value, json};

use officeclaw_world::WorldStore;

/// Project reported when nothing better can be inferred.
pub const BOOT_PROJECT_ID: &str = "proj_boot";

/// A named event ready to be appended to the timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticEvent {
    /// Event name.
    pub name: &'static str,
    /// Payload, including `project_id` and `meta`.
    pub payload: Map<String, Value>,
}

fn data_str<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

/// Project a command acts on.
///
/// Tried in order: `data.project_id`, then the project of the referenced
/// task, source task, artifact or decision, then the boot project.
pub fn infer_project_id(command: &Value, world: &WorldStore) -> String {
    let data = command.get("data").unwrap_or(&Value::Null);
    if let Some(project_id) = data_str(data, "project_id") {
        return project_id.to_owned();
    }

    let from_task = |key: &str| {
        data_str(data, key)
            .and_then(|id| world.task(id))
            .map(|task| task.project_id.to_string())
    };
    let inferred = from_task("task_id")
        .or_else(|| from_task("source_task_id"))
        .or_else(|| {
            data_str(data, "artifact_id")
                .and_then(|id| world.artifact(id))
                .map(|artifact| artifact.project_id.to_string())
        })
        .or_else(|| {
            data_str(data, "decision_id")
                .and_then(|id| world.decision(id))
                .map(|decision| decision.project_id.to_string())
        });
    if let Some(project_id) = inferred {
        return project_id;
    }

    world
        .project(BOOT_PROJECT_ID)
        .or_else(|| world.first_project())
        .map_or_else(|| BOOT_PROJECT_ID.to_owned(), |project| project.project_id.to_string())
}

struct Narrator {
    project_id: String,
    in_reply_to: String,
    command_name: String,
}

impl Narrator {
    fn event(&self, name: &'static str, fields: Value, extra_meta: Value) -> SemanticEvent {
        let mut payload = Map::new();
        payload.insert(String::from("project_id"), Value::from(self.project_id.clone()));
        if let Value::Object(fields) = fields {
            payload.extend(fields);
        }
        let mut meta = Map::new();
        meta.insert(String::from("in_reply_to"), Value::from(self.in_reply_to.clone()));
        meta.insert(String::from("command_name"), Value::from(self.command_name.clone()));
        if let Value::Object(extra) = extra_meta {
            meta.extend(extra);
        }
        payload.insert(String::from("meta"), Value::Object(meta));
        SemanticEvent { name, payload }
    }

    fn bare(&self, name: &'static str) -> SemanticEvent {
        self.event(name, Value::Null, Value::Null)
    }
}

/// Events narrating an accepted `command`, evaluated against the world
/// as it stands after the command was applied.
pub fn build_semantic_events(command: &Value, in_reply_to: &str, world: &WorldStore) -> Vec<SemanticEvent> {
    let data = command.get("data").unwrap_or(&Value::Null);
    let name = command.get("name").and_then(Value::as_str).unwrap_or("unknown");
    let narrator = Narrator {
        project_id: infer_project_id(command, world),
        in_reply_to: in_reply_to.to_owned(),
        command_name: name.to_owned(),
    };
    let field = |key: &str| data.get(key).cloned().unwrap_or(Value::Null);

    match name {
        "submit_request" => vec![narrator.bare("kickoff_started"), narrator.bare("tasks_created")],
        "start_kickoff" => vec![narrator.bare("kickoff_started")],
        "assign_task" => vec![narrator.event(
            "task_assigned",
            json!({"task_id": field("task_id"), "agent_id": field("agent_id")}),
            Value::Null,
        )],
        "auto_assign" => vec![narrator.event(
            "task_assigned",
            Value::Null,
            json!({"assignment_mode": "auto"}),
        )],
        "resolve_decision" => vec![narrator.event(
            "decision_resolved",
            json!({"decision_id": field("decision_id")}),
            Value::Null,
        )],
        "approve_artifact" => {
            let mut events = vec![narrator.event(
                "review_approved",
                json!({"artifact_id": field("artifact_id")}),
                Value::Null,
            )];
            let task_id = data_str(data, "artifact_id")
                .and_then(|id| world.artifact(id))
                .and_then(|artifact| artifact.task_id.clone());
            if let Some(task_id) = task_id {
                events.push(narrator.event(
                    "task_done",
                    json!({"task_id": task_id, "artifact_id": field("artifact_id")}),
                    Value::Null,
                ));
            }
            events
        }
        "request_changes" => vec![narrator.event(
            "review_changes_requested",
            json!({"artifact_id": field("artifact_id")}),
            Value::Null,
        )],
        "split_into_tasks" => vec![narrator.event(
            "tasks_created",
            json!({"artifact_id": field("artifact_id")}),
            Value::Null,
        )],
        "reassign_task" => vec![narrator.event(
            "task_reassigned",
            json!({"task_id": field("task_id"), "agent_id": field("to_agent_id")}),
            json!({"from_agent_id": field("from_agent_id")}),
        )],
        "cancel_task" => vec![narrator.event(
            "task_cancelled",
            json!({"task_id": field("task_id")}),
            Value::Null,
        )],
        "pause_project" => vec![narrator.event(
            "project_paused",
            Value::Null,
            json!({"scope": data_str(data, "scope").unwrap_or("dispatch_only")}),
        )],
        "resume_project" => vec![narrator.bare("project_resumed")],
        "rerun_task" => vec![narrator.event(
            "tasks_created",
            json!({"task_id": field("source_task_id")}),
            json!({"rerun_mode": data_str(data, "mode").unwrap_or("clone_as_new")}),
        )],
        _ => Vec::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use officeclaw_nav::StaticSceneLoader;

    use super::*;

    fn world() -> WorldStore {
        WorldStore::new("cozy_office_v0", Arc::new(StaticSceneLoader::empty()))
    }

    #[test]
    fn project_is_inferred_from_referenced_entities() {
        let world = world();
        let explicit = json!({"name": "auto_assign", "data": {"project_id": "proj_x"}});
        assert_eq!(infer_project_id(&explicit, &world), "proj_x");

        let by_task = json!({"name": "cancel_task", "data": {"task_id": "task_copy"}});
        assert_eq!(infer_project_id(&by_task, &world), "proj_abc");

        let unknown = json!({"name": "cancel_task", "data": {"task_id": "task_missing"}});
        assert_eq!(infer_project_id(&unknown, &world), BOOT_PROJECT_ID);

        let no_data = json!({"name": "start_kickoff"});
        assert_eq!(infer_project_id(&no_data, &world), BOOT_PROJECT_ID);
    }

    #[test]
    fn events_carry_meta_linking_the_command() {
        let world = world();
        let command = json!({
            "name": "assign_task",
            "data": {"task_id": "task_copy", "agent_id": "agent_eng_1"}
        });
        let events = build_semantic_events(&command, "msg_7", &world);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "task_assigned");
        let payload = Value::Object(events[0].payload.clone());
        assert_eq!(payload["project_id"], "proj_abc");
        assert_eq!(payload["agent_id"], "agent_eng_1");
        assert_eq!(payload["meta"]["in_reply_to"], "msg_7");
        assert_eq!(payload["meta"]["command_name"], "assign_task");
    }

    #[test]
    fn submit_request_narrates_kickoff_and_tasks() {
        let world = world();
        let command = json!({"name": "submit_request", "data": {"text": "Do things."}});
        let names: Vec<&str> = build_semantic_events(&command, "m", &world)
            .iter()
            .map(|event| event.name)
            .collect();
        assert_eq!(names, vec!["kickoff_started", "tasks_created"]);
    }

    #[test]
    fn defaults_fill_optional_meta() {
        let world = world();
        let pause = json!({"name": "pause_project", "data": {"project_id": "proj_abc"}});
        let events = build_semantic_events(&pause, "m", &world);
        assert_eq!(events[0].payload["meta"]["scope"], "dispatch_only");

        let rerun = json!({"name": "rerun_task", "data": {"source_task_id": "task_copy"}});
        let events = build_semantic_events(&rerun, "m", &world);
        assert_eq!(events[0].name, "tasks_created");
        assert_eq!(events[0].payload["task_id"], "task_copy");
        assert_eq!(events[0].payload["meta"]["rerun_mode"], "clone_as_new");

        let auto = json!({"name": "auto_assign", "data": {"project_id": "proj_abc"}});
        let events = build_semantic_events(&auto, "m", &world);
        assert_eq!(events[0].payload["meta"]["assignment_mode"], "auto");
    }

    #[test]
    fn unknown_commands_narrate_nothing() {
        let world = world();
        let command = json!({"name": "move_player_to", "data": {}});
        assert!(build_semantic_events(&command, "m", &world).is_empty());
    }
}
