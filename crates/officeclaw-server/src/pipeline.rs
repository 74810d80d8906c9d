//! Post-tick pipeline run on the simulation driver task.
//!
//! For every command a tick accepted, in queue order: append it to the
//! durable journal, then narrate it onto the event timeline. Running here
//! rather than in the session keeps journal order and event order equal
//! to application order across all sessions.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::{debug, warn};

use officeclaw_core::{AppliedCommand, Simulation, TickCallback, TickReport};
use officeclaw_events::CommandJournal;

use crate::agent_stream::AgentStreams;
use crate::semantic::{SemanticEvent, build_semantic_events};
use crate::state::EventBus;

/// `in_reply_to` used for commands that arrived without a message id.
pub const UNKNOWN_MESSAGE_ID: &str = "msg_unknown";

/// Journals and narrates accepted commands.
#[derive(Debug)]
pub struct WorldPipeline {
    journal: CommandJournal,
    events: EventBus,
    streams: Arc<Mutex<AgentStreams>>,
}

impl WorldPipeline {
    /// Build a pipeline writing to `journal` and `events`.
    pub const fn new(journal: CommandJournal, events: EventBus, streams: Arc<Mutex<AgentStreams>>) -> Self {
        Self {
            journal,
            events,
            streams,
        }
    }

    fn journal(&mut self, applied: &AppliedCommand) {
        match self.journal.append(applied.payload.clone(), applied.context.clone()) {
            Ok(Some(record)) => debug!(journal_seq = record.journal_seq, "Command journaled"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to journal accepted command"),
        }
    }

    fn publish(&self, event: SemanticEvent) {
        let field = |key: &str| event.payload.get(key).and_then(Value::as_str).map(str::to_owned);
        let finished_task = if matches!(event.name, "task_done" | "task_cancelled") {
            field("task_id").map(|task_id| (field("project_id").unwrap_or_default(), task_id))
        } else {
            None
        };

        self.events.publish(event.name, event.payload);

        if let Some((project_id, task_id)) = finished_task {
            self.streams
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear_preview(&project_id, &task_id);
        }
    }
}

impl TickCallback for WorldPipeline {
    fn on_tick(&mut self, report: &TickReport, simulation: &Simulation) {
        for applied in report.commands.iter().filter(|applied| applied.outcome.ok) {
            self.journal(applied);
            let in_reply_to = applied
                .context
                .as_ref()
                .map_or(UNKNOWN_MESSAGE_ID, |context| context.in_reply_to.as_str());
            for event in build_semantic_events(&applied.payload, in_reply_to, simulation.world()) {
                self.publish(event);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use officeclaw_events::EventTimeline;
    use officeclaw_nav::StaticSceneLoader;
    use officeclaw_types::CommandContext;
    use officeclaw_world::WorldStore;
    use serde_json::json;

    use super::*;

    fn simulation() -> Simulation {
        let world = WorldStore::new("cozy_office_v0", Arc::new(StaticSceneLoader::empty()));
        Simulation::new(world, 10.0)
    }

    fn journal_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("officeclaw-pipeline-{}.jsonl", uuid::Uuid::new_v4()))
    }

    #[test]
    fn accepted_commands_are_journaled_and_narrated() {
        let path = journal_path();
        let bus = EventBus::new(EventTimeline::in_memory(50));
        let streams = Arc::new(Mutex::new(AgentStreams::default()));
        let mut pipeline = WorldPipeline::new(CommandJournal::new(Some(path.clone())), bus.clone(), streams);
        let mut simulation = simulation();

        let context = CommandContext {
            in_reply_to: String::from("msg_assign"),
            session_id: None,
        };
        simulation.enqueue_command(
            json!({"name": "assign_task", "data": {"task_id": "task_copy", "agent_id": "agent_eng_1"}}),
            Some(context),
        );
        simulation.enqueue_command(json!({"name": "cancel_task", "data": {"task_id": "task_missing", "confirm": true}}), None);
        let report = simulation.tick();
        pipeline.on_tick(&report, &simulation);

        let events = bus.read(|timeline| timeline.read_since(0, false, None));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "task_assigned");
        assert_eq!(events[0].payload["meta"]["in_reply_to"], "msg_assign");

        let mut reloaded = CommandJournal::new(Some(path.clone()));
        let load = reloaded.load().unwrap();
        assert_eq!(load.records.len(), 1);
        assert_eq!(load.records[0].command["name"], "assign_task");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn finished_tasks_reset_the_preview_throttle() {
        let bus = EventBus::new(EventTimeline::in_memory(50));
        let streams = Arc::new(Mutex::new(AgentStreams::default()));
        let mut pipeline = WorldPipeline::new(CommandJournal::new(None), bus.clone(), Arc::clone(&streams));
        let mut simulation = simulation();

        let delta = json!({
            "stream_id": "s1",
            "agent_id": "agent_eng_1",
            "project_id": "proj_abc",
            "task_id": "task_copy",
            "kind": "token",
            "delta": "x",
            "done": false,
        });
        {
            let mut streams = streams.lock().unwrap();
            let payload = streams.accept(&delta).unwrap();
            assert!(streams.preview(&payload, 1_000).is_some());
            let next = streams.accept(&delta).unwrap();
            assert!(streams.preview(&next, 1_100).is_none());
        }

        simulation.enqueue_command(
            json!({"name": "cancel_task", "data": {"task_id": "task_copy", "confirm": true}}),
            None,
        );
        let report = simulation.tick();
        pipeline.on_tick(&report, &simulation);

        let events = bus.read(|timeline| timeline.read_since(0, false, None));
        assert_eq!(events[0].name, "task_cancelled");
        assert_eq!(events[0].payload["meta"]["in_reply_to"], UNKNOWN_MESSAGE_ID);

        let mut streams = streams.lock().unwrap();
        let again = streams.accept(&delta).unwrap();
        assert!(streams.preview(&again, 1_200).is_some());
    }
}
