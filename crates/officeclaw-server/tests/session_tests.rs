//! Protocol tests for the `/ws/world` session state machine.
//!
//! Sessions are driven directly with text frames against a live driver
//! task, the same way the socket loop drives them.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::{Arc, Mutex};

use officeclaw_core::config::RateLimitConfig;
use officeclaw_core::{RestorationStatus, Simulation, driver};
use officeclaw_events::{CommandJournal, EventTimeline};
use officeclaw_nav::StaticSceneLoader;
use officeclaw_server::{AgentStreams, AppState, EventBus, ServerSettings, Session, WorldPipeline};
use officeclaw_types::Envelope;
use officeclaw_world::WorldStore;
use serde_json::{Map, Value, json};

fn make_state(restoration: RestorationStatus, settings: ServerSettings) -> Arc<AppState> {
    let world = WorldStore::new("cozy_office_v0", Arc::new(StaticSceneLoader::empty()));
    let simulation = Simulation::new(world, 10.0);
    let events = EventBus::new(EventTimeline::in_memory(200));
    let streams = Arc::new(Mutex::new(AgentStreams::default()));
    let pipeline = WorldPipeline::new(CommandJournal::new(None), events.clone(), Arc::clone(&streams));
    let (handle, _join) = driver::spawn(simulation, pipeline);
    Arc::new(AppState::new(handle, events, streams, restoration, settings))
}

fn ready_state() -> Arc<AppState> {
    make_state(
        RestorationStatus {
            ready: true,
            ..RestorationStatus::pending()
        },
        ServerSettings::default(),
    )
}

fn frame(msg_type: &str, id: &str, payload: &Value) -> String {
    json!({"type": msg_type, "id": id, "ts": 0, "v": 1, "payload": payload}).to_string()
}

fn hello(resume: Option<u64>) -> String {
    let mut payload = json!({"client": {"name": "viewer", "build": "test", "platform": "linux"}});
    if let Some(last_seq) = resume {
        payload["resume"] = json!({ "last_seq": last_seq });
    }
    frame("hello", "msg_hello", &payload)
}

fn subscribe() -> String {
    frame(
        "subscribe",
        "msg_sub",
        &json!({"scene_id": "cozy_office_v0", "channels": {"events": true, "snapshots": true}}),
    )
}

fn types(frames: &[Envelope]) -> Vec<&str> {
    frames.iter().map(|frame| frame.msg_type.as_str()).collect()
}

async fn connect(state: &AppState, resume: Option<u64>) -> (Session, Vec<Envelope>) {
    let mut session = Session::new();
    let ack = session.handle_text(state, &hello(resume)).await;
    assert_eq!(types(&ack), vec!["hello_ack"]);
    let subscribed = session.handle_text(state, &subscribe()).await;
    (session, [ack, subscribed].concat())
}

#[tokio::test]
async fn hello_must_come_first() {
    let state = ready_state();
    let mut session = Session::new();

    let out = session.handle_text(&state, &frame("ping", "msg_ping", &json!({}))).await;
    assert_eq!(types(&out), vec!["error"]);
    assert_eq!(out[0].payload["code"], "VALIDATION_FAILED");
    assert_eq!(out[0].payload["in_reply_to"], "msg_ping");

    let out = session.handle_text(&state, "{not json").await;
    assert_eq!(out[0].payload["in_reply_to"], "msg_unknown");
    assert_eq!(out[0].payload["message"], "Message must be valid JSON.");
}

#[tokio::test]
async fn hello_ack_reports_a_fresh_session() {
    let state = ready_state();
    let mut session = Session::new();
    let out = session.handle_text(&state, &hello(None)).await;

    let payload = &out[0].payload;
    assert_eq!(out[0].v, 1);
    assert!(payload["session_id"].as_str().unwrap().starts_with("sess_"));
    assert_eq!(payload["protocol_v"], 1);
    assert_eq!(payload["resume"]["status"], "snapshot_required");
    assert_eq!(payload["resume"]["reason"], "CURSOR_UNKNOWN");
}

#[tokio::test]
async fn subscribe_sends_snapshot_then_backlog() {
    let state = ready_state();
    for _ in 0..3 {
        assert!(state.events.publish("task_progress", Map::new()).is_some());
    }

    let (session, out) = connect(&state, None).await;
    assert_eq!(types(&out), vec!["hello_ack", "snapshot", "event", "event", "event"]);
    assert_eq!(out[1].payload["scene_id"], "cozy_office_v0");
    assert!(out[1].payload["agents"].is_array());
    assert_eq!(out[2].payload["seq"], 1);
    assert_eq!(out[4].payload["seq"], 3);
    assert_eq!(session.last_event_seq(), 3);
}

#[tokio::test]
async fn resume_replays_only_the_missed_events() {
    let state = ready_state();
    for _ in 0..4 {
        assert!(state.events.publish("task_progress", Map::new()).is_some());
    }

    let (session, out) = connect(&state, Some(2)).await;
    assert_eq!(out[0].payload["resume"]["status"], "resumed");
    assert_eq!(out[0].payload["resume"]["replay_from_seq"], 3);
    assert_eq!(types(&out), vec!["hello_ack", "snapshot", "event", "event"]);
    assert_eq!(out[2].payload["seq"], 3);
    assert!(session.resume_decision().is_resumed());
}

#[tokio::test]
async fn resume_ahead_of_the_server_requires_a_snapshot() {
    let state = ready_state();
    assert!(state.events.publish("task_progress", Map::new()).is_some());

    let (_, out) = connect(&state, Some(40)).await;
    assert_eq!(out[0].payload["resume"]["status"], "snapshot_required");
    assert_eq!(out[0].payload["resume"]["reason"], "CURSOR_UNKNOWN");
}

#[tokio::test]
async fn accepted_command_acks_before_its_events() {
    let state = ready_state();
    let mut live = state.events.subscribe();
    let (mut session, _) = connect(&state, None).await;

    let command = frame(
        "command",
        "msg_assign",
        &json!({"name": "assign_task", "data": {"task_id": "task_copy", "agent_id": "agent_eng_1"}}),
    );
    let out = session.handle_text(&state, &command).await;
    assert_eq!(types(&out), vec!["ack"]);
    assert_eq!(out[0].payload["in_reply_to"], "msg_assign");
    assert_eq!(out[0].payload["status"], "ok");

    let event = live.try_recv().unwrap();
    assert_eq!(event.name, "task_assigned");
    assert_eq!(event.payload["meta"]["in_reply_to"], "msg_assign");

    let delivered = session.deliver_event(&state, &event).unwrap();
    assert_eq!(delivered.msg_type, "event");
    assert!(session.deliver_event(&state, &event).is_none());
}

#[tokio::test]
async fn rejected_command_echoes_the_message_id() {
    let state = ready_state();
    let (mut session, _) = connect(&state, None).await;

    let command = frame(
        "command",
        "msg_missing",
        &json!({"name": "assign_task", "data": {"task_id": "task_missing", "agent_id": "agent_eng_1"}}),
    );
    let out = session.handle_text(&state, &command).await;
    assert_eq!(types(&out), vec!["error"]);
    assert_eq!(out[0].payload["in_reply_to"], "msg_missing");
    assert_eq!(out[0].payload["code"], "NOT_FOUND");

    let unknown = frame("command", "msg_bogus", &json!({"name": "fly", "data": {}}));
    let out = session.handle_text(&state, &unknown).await;
    assert_eq!(out[0].payload["code"], "VALIDATION_FAILED");
    assert_eq!(state.telemetry().security.validation_failed, 1);
}

#[tokio::test]
async fn commands_are_gated_until_restoration_is_consistent() {
    let state = make_state(
        RestorationStatus {
            ready: true,
            consistency_ok: false,
            ..RestorationStatus::pending()
        },
        ServerSettings::default(),
    );
    let (mut session, _) = connect(&state, None).await;

    let command = frame(
        "command",
        "msg_blocked",
        &json!({"name": "assign_task", "data": {"task_id": "task_copy", "agent_id": "agent_eng_1"}}),
    );
    let out = session.handle_text(&state, &command).await;
    assert_eq!(out[0].payload["code"], "NOT_ALLOWED");
    assert_eq!(state.telemetry().command.blocked_by_restoration, 1);
    assert_eq!(state.events.read(EventTimeline::latest_seq), 0);
}

#[tokio::test]
async fn command_quota_is_per_window() {
    let settings = ServerSettings {
        rate_limit: RateLimitConfig {
            max_commands: 1,
            window_ms: 60_000,
        },
        ..ServerSettings::default()
    };
    let state = make_state(
        RestorationStatus {
            ready: true,
            ..RestorationStatus::pending()
        },
        settings,
    );
    let (mut session, _) = connect(&state, None).await;

    let command = |id: &str| {
        frame(
            "command",
            id,
            &json!({"name": "assign_task", "data": {"task_id": "task_copy", "agent_id": "agent_eng_1"}}),
        )
    };
    let first = session.handle_text(&state, &command("msg_1")).await;
    assert_eq!(types(&first), vec!["ack"]);

    let second = session.handle_text(&state, &command("msg_2")).await;
    assert_eq!(second[0].payload["code"], "RATE_LIMITED");
    assert!(
        second[0].payload["message"]
            .as_str()
            .unwrap()
            .starts_with("Too many commands; retry in ")
    );
}

#[tokio::test]
async fn ping_and_unknown_types() {
    let state = ready_state();
    let mut session = Session::new();
    session.handle_text(&state, &hello(None)).await;

    let out = session.handle_text(&state, &frame("ping", "msg_p", &json!({"nonce": "n1"}))).await;
    assert_eq!(types(&out), vec!["pong"]);
    assert_eq!(out[0].payload["nonce"], "n1");

    let out = session.handle_text(&state, &frame("teleport", "msg_t", &json!({}))).await;
    assert_eq!(out[0].payload["code"], "NOT_ALLOWED");
    assert_eq!(out[0].payload["message"], "Unsupported message type: teleport");
}

#[tokio::test]
async fn feeds_respect_the_subscribed_channels() {
    let state = ready_state();
    let mut session = Session::new();
    session.handle_text(&state, &hello(None)).await;
    let out = session
        .handle_text(
            &state,
            &frame(
                "subscribe",
                "msg_sub",
                &json!({"scene_id": "cozy_office_v0", "channels": {"agent_stream": true}}),
            ),
        )
        .await;
    assert_eq!(types(&out), vec!["snapshot"]);

    let event = state.events.publish("task_progress", Map::new()).unwrap();
    assert!(session.deliver_event(&state, &event).is_none());

    let payload = state
        .agent_stream_state()
        .accept(&json!({
            "stream_id": "stream_1",
            "agent_id": "agent_eng_1",
            "project_id": "proj_abc",
            "task_id": "task_copy",
            "kind": "thought",
            "delta": "hmm",
            "done": false,
        }))
        .unwrap();
    let framed = session.deliver_agent_stream(&state, &payload).unwrap();
    assert_eq!(framed.msg_type, "agent_stream");
    assert_eq!(framed.payload["kind"], "thought");
}
