//! Integration tests for the world server HTTP endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. The simulation driver runs stopped, so queued
//! commands and world events are applied as soon as they arrive.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use officeclaw_core::{RestorationStatus, Simulation, driver};
use officeclaw_events::{CommandJournal, EventTimeline};
use officeclaw_nav::StaticSceneLoader;
use officeclaw_server::router::build_router;
use officeclaw_server::{AgentStreams, AppState, EventBus, ServerSettings, WorldPipeline};
use officeclaw_world::WorldStore;
use serde_json::{Map, Value, json};
use tower::ServiceExt;

fn make_test_state(restoration: RestorationStatus) -> Arc<AppState> {
    let world = WorldStore::new("cozy_office_v0", Arc::new(StaticSceneLoader::empty()));
    let simulation = Simulation::new(world, 10.0);
    let events = EventBus::new(EventTimeline::in_memory(200));
    let streams = Arc::new(Mutex::new(AgentStreams::default()));
    let pipeline = WorldPipeline::new(CommandJournal::new(None), events.clone(), Arc::clone(&streams));
    let (handle, _join) = driver::spawn(simulation, pipeline);
    Arc::new(AppState::new(
        handle,
        events,
        streams,
        restoration,
        ServerSettings::default(),
    ))
}

fn ready() -> RestorationStatus {
    RestorationStatus {
        ready: true,
        ..RestorationStatus::pending()
    }
}

async fn get_json(state: &Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let response = build_router(Arc::clone(state))
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post_json(state: &Arc<AppState>, uri: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = build_router(Arc::clone(state)).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_reports_every_section() {
    let state = make_test_state(ready());
    let (status, json) = get_json(&state, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["simulation"]["is_running"], false);
    assert_eq!(json["simulation"]["tick_rate_hz"], 10);
    assert_eq!(json["snapshot_publisher"]["rate_hz"], 3);
    assert_eq!(json["snapshot_publisher"]["interval_ms"], 333);
    assert_eq!(json["replay_resync"]["replay_limit"], 200);
    assert_eq!(json["command_security"]["rate_limit"]["max_commands"], 12);
    assert_eq!(json["event_timeline"]["latest_seq"], 0);
    assert_eq!(json["state_restoration"]["ready"], true);
    assert_eq!(json["error_dashboard"]["status"], "healthy");
    assert_eq!(json["tick_rate_bounds_hz"]["min_hz"], 10);
    assert_eq!(json["tick_rate_bounds_hz"]["max_hz"], 20);
    assert_eq!(json["snapshot_rate_bounds_hz"]["max_hz"], 5);
}

#[tokio::test]
async fn test_health_is_critical_when_restoration_failed() {
    let state = make_test_state(RestorationStatus {
        ready: true,
        consistency_ok: false,
        ..RestorationStatus::pending()
    });
    let (_, json) = get_json(&state, "/health").await;

    assert_eq!(json["state_restoration"]["consistency_ok"], false);
    assert_eq!(json["error_dashboard"]["status"], "critical");
}

#[tokio::test]
async fn test_events_page_through_the_timeline() {
    let state = make_test_state(ready());
    for _ in 0..5 {
        assert!(state.events.publish("task_progress", Map::new()).is_some());
    }

    let (status, json) = get_json(&state, "/api/events?cursor=1&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let events = json["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["seq"], 2);
    assert_eq!(events[1]["seq"], 3);
    assert_eq!(json["next_cursor"], 3);
    assert_eq!(json["has_more"], true);
    assert_eq!(json["latest_seq"], 5);

    let (_, json) = get_json(&state, "/api/events?cursor=3").await;
    assert_eq!(json["events"].as_array().unwrap().len(), 2);
    assert_eq!(json["has_more"], false);
}

#[tokio::test]
async fn test_world_event_requires_a_name() {
    let state = make_test_state(ready());

    let (status, json) = post_json(&state, "/api/world-events", &json!({"kind": "x"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_FAILED");

    let (status, json) = post_json(
        &state,
        "/api/world-events",
        &json!({"name": "agent_blocked", "agent_id": "agent_eng_1", "task_id": "task_copy"}),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["queued"], "agent_blocked");
}

#[tokio::test]
async fn test_agent_stream_publishes_and_previews() {
    let state = make_test_state(ready());
    let mut live = state.agent_streams.subscribe();
    let delta = json!({
        "stream_id": "stream_1",
        "agent_id": "agent_eng_1",
        "project_id": "proj_abc",
        "task_id": "task_copy",
        "kind": "token",
        "delta": "Drafting",
        "done": false,
    });

    let (status, json) = post_json(&state, "/api/agent-stream", &delta).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["payload"]["seq"], 1);
    assert_eq!(json["preview_event_seq"], 1);
    assert_eq!(live.try_recv().unwrap().stream_id, "stream_1");

    // Inside the throttle window: broadcast, but no new preview event.
    let (_, json) = post_json(&state, "/api/agent-stream", &delta).await;
    assert_eq!(json["payload"]["seq"], 2);
    assert!(json["preview_event_seq"].is_null());

    let (_, page) = get_json(&state, "/api/events").await;
    assert_eq!(page["events"][0]["name"], "task_progress");
}

#[tokio::test]
async fn test_agent_stream_rejects_bad_deltas() {
    let state = make_test_state(ready());

    let (status, json) = post_json(&state, "/api/agent-stream", &json!({"stream_id": "s"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_FAILED");

    let final_delta = json!({
        "stream_id": "stream_2",
        "agent_id": "agent_eng_1",
        "project_id": "proj_abc",
        "task_id": "task_copy",
        "kind": "code",
        "delta": "",
        "done": true,
    });
    let (status, _) = post_json(&state, "/api/agent-stream", &final_delta).await;
    assert_eq!(status, StatusCode::OK);
    let (status, json) = post_json(&state, "/api/agent-stream", &final_delta).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
}

#[tokio::test]
async fn test_operator_controls_the_scheduler() {
    let state = make_test_state(ready());

    let (status, json) = post_json(&state, "/api/operator/tick-rate", &json!({"tick_rate_hz": 50.0})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["simulation"]["tick_rate_hz"], 20);
    assert_eq!(json["simulation"]["tick_interval_ms"], 50);

    let (_, json) = post_json(&state, "/api/operator/step", &json!({"times": 3})).await;
    assert_eq!(json["simulation"]["tick_count"], 3);

    let (_, json) = post_json(&state, "/api/operator/start", &json!({})).await;
    assert_eq!(json["simulation"]["is_running"], true);
    let (_, json) = post_json(&state, "/api/operator/stop", &json!({})).await;
    assert_eq!(json["simulation"]["is_running"], false);

    let (status, json) = get_json(&state, "/api/operator/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["can_accept_commands"], true);
}

#[tokio::test]
async fn test_alerts_start_empty() {
    let state = make_test_state(ready());
    let (status, json) = get_json(&state, "/api/alerts").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 0);
    assert_eq!(json["emitted"], 0);
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let state = make_test_state(ready());
    let response = build_router(state)
        .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
