//! Per-connection protocol handling for `/ws/world`.
//!
//! A [`Session`] turns inbound text frames into outbound envelopes and
//! filters the shared event, snapshot and agent stream feeds down to what
//! the client subscribed to. It never touches world state: commands go
//! through the simulation handle and the reply is awaited inline, so the
//! `ack` always precedes the events the command produced.
//!
//! Message flow:
//!
//! 1. `hello` must come first. It fixes the resume decision for the life
//!    of the session.
//! 2. `subscribe` sets the scene and channels, sends a snapshot, then
//!    either replays the resume window or sends every retained event the
//!    session has not seen.
//! 3. `command` passes the per-session quota and the restoration gate
//!    before it is queued for the next tick.

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use officeclaw_core::DriverError;
use officeclaw_types::{
    AgentStreamPayload, Channels, CommandContext, Envelope, ErrorCode, Event, ResumeDecision,
    ResumeReason, SessionId,
};

use crate::pipeline::UNKNOWN_MESSAGE_ID;
use crate::publisher::PublishedSnapshot;
use crate::rate_limit::CommandQuota;
use crate::resume::evaluate_resume;
use crate::state::{AppState, now_ms};
use crate::telemetry::ErrorRecord;

const CHANNEL_KEYS: [&str; 5] = ["events", "snapshots", "goals", "chat", "agent_stream"];

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string().chars().take(12).collect()
}

/// Fresh envelope id: the message type's lowercase letters plus 12 hex digits.
pub fn message_id(msg_type: &str) -> String {
    let prefix: String = msg_type.chars().filter(char::is_ascii_lowercase).collect();
    format!("{prefix}_{}", short_id())
}

fn envelope(state: &AppState, msg_type: &str, payload: Value) -> Envelope {
    state.telemetry().record_outbound(msg_type);
    Envelope {
        msg_type: msg_type.to_owned(),
        id: message_id(msg_type),
        ts: now_ms(),
        v: state.settings.protocol_version,
        payload,
    }
}

fn valid_hello(payload: &Value) -> bool {
    payload.get("client").is_some_and(|client| {
        ["name", "build", "platform"]
            .iter()
            .all(|key| client.get(key).is_some_and(Value::is_string))
    })
}

fn parse_subscribe(payload: &Value) -> Option<(String, Channels)> {
    let scene_id = payload
        .get("scene_id")
        .and_then(Value::as_str)
        .filter(|scene_id| !scene_id.is_empty())?;
    let channels = payload.get("channels")?.as_object()?;
    let well_typed = CHANNEL_KEYS
        .iter()
        .all(|key| channels.get(*key).is_none_or(Value::is_boolean));
    if !well_typed {
        return None;
    }
    let flag = |key: &str| channels.get(key).and_then(Value::as_bool).unwrap_or(false);
    Some((
        scene_id.to_owned(),
        Channels {
            events: flag("events"),
            snapshots: flag("snapshots"),
            goals: flag("goals"),
            chat: flag("chat"),
            agent_stream: flag("agent_stream"),
        },
    ))
}

/// Protocol state of one connection.
#[derive(Debug)]
pub struct Session {
    session_id: SessionId,
    hello_received: bool,
    subscribed: bool,
    scene_id: Option<String>,
    channels: Channels,
    resume: ResumeDecision,
    last_event_seq: u64,
    quota: CommandQuota,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A session awaiting `hello`.
    pub fn new() -> Self {
        Self {
            session_id: SessionId::new(format!("sess_{}", short_id())),
            hello_received: false,
            subscribed: false,
            scene_id: None,
            channels: Channels::default(),
            resume: ResumeDecision::snapshot_required(ResumeReason::CursorUnknown, None),
            last_event_seq: 0,
            quota: CommandQuota::default(),
        }
    }

    /// Server-assigned id.
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Highest event seq delivered.
    pub const fn last_event_seq(&self) -> u64 {
        self.last_event_seq
    }

    /// Whether the client has subscribed.
    pub const fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Subscribed channels.
    pub const fn channels(&self) -> Channels {
        self.channels
    }

    /// Resume decision made at `hello`.
    pub const fn resume_decision(&self) -> ResumeDecision {
        self.resume
    }

    // ---- Envelopes ----

    fn error(&self, state: &AppState, in_reply_to: &str, code: ErrorCode, message: impl Into<String>) -> Envelope {
        let message = message.into();
        state.telemetry().record_error(ErrorRecord {
            ts: now_ms(),
            code,
            message: message.clone(),
            in_reply_to: in_reply_to.to_owned(),
            session_id: Some(self.session_id.clone()),
        });
        envelope(
            state,
            "error",
            json!({"in_reply_to": in_reply_to, "code": code, "message": message}),
        )
    }

    fn unavailable(&self, state: &AppState, in_reply_to: &str, e: DriverError) -> Envelope {
        warn!(session_id = %self.session_id.as_str(), error = %e, "Simulation request failed");
        self.error(state, in_reply_to, ErrorCode::Internal, "Simulation unavailable.")
    }

    // ---- Inbound ----

    /// Handle one inbound text frame; returns the frames to send back.
    pub async fn handle_text(&mut self, state: &AppState, raw: &str) -> Vec<Envelope> {
        let Some(message) = serde_json::from_str::<Value>(raw).ok().filter(Value::is_object) else {
            state.telemetry().record_inbound("invalid_json");
            return vec![self.error(
                state,
                UNKNOWN_MESSAGE_ID,
                ErrorCode::ValidationFailed,
                "Message must be valid JSON.",
            )];
        };

        let msg_type = message.get("type").and_then(Value::as_str).unwrap_or("unknown");
        let id = message
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .unwrap_or(UNKNOWN_MESSAGE_ID);
        let payload = message.get("payload").unwrap_or(&Value::Null);
        state.telemetry().record_inbound(msg_type);
        debug!(session_id = %self.session_id.as_str(), msg_type, id, "Inbound message");

        if !self.hello_received && msg_type != "hello" {
            return vec![self.error(
                state,
                id,
                ErrorCode::ValidationFailed,
                "hello is required before other message types.",
            )];
        }

        match msg_type {
            "hello" => vec![self.on_hello(state, id, payload)],
            "subscribe" => self.on_subscribe(state, id, payload).await,
            "ping" => {
                let nonce = payload.get("nonce").cloned().unwrap_or(Value::Null);
                vec![envelope(state, "pong", json!({ "nonce": nonce }))]
            }
            "command" => vec![self.on_command(state, id, payload).await],
            other => vec![self.error(
                state,
                id,
                ErrorCode::NotAllowed,
                format!("Unsupported message type: {other}"),
            )],
        }
    }

    fn on_hello(&mut self, state: &AppState, id: &str, payload: &Value) -> Envelope {
        if !valid_hello(payload) {
            return self.error(
                state,
                id,
                ErrorCode::ValidationFailed,
                "hello payload requires client.name, client.build, and client.platform.",
            );
        }

        self.hello_received = true;
        self.resume = match payload.get("resume") {
            Some(resume) => {
                let limit = state.settings.replay_limit;
                let decision = state
                    .events
                    .read(|timeline| evaluate_resume(Some(resume), timeline, limit));
                state.telemetry().record_resume(&decision);
                decision
            }
            None => ResumeDecision::snapshot_required(ResumeReason::CursorUnknown, None),
        };
        info!(
            session_id = %self.session_id.as_str(),
            resume = ?self.resume.status,
            reason = self.resume.reason.map_or("", ResumeReason::as_str),
            "Session hello"
        );

        envelope(
            state,
            "hello_ack",
            json!({
                "session_id": self.session_id,
                "protocol_v": state.settings.protocol_version,
                "resume": self.resume,
            }),
        )
    }

    async fn on_subscribe(&mut self, state: &AppState, id: &str, payload: &Value) -> Vec<Envelope> {
        let Some((scene_id, channels)) = parse_subscribe(payload) else {
            return vec![self.error(
                state,
                id,
                ErrorCode::ValidationFailed,
                "subscribe payload requires scene_id and channels.",
            )];
        };
        self.subscribed = true;
        self.scene_id = Some(scene_id.clone());
        self.channels = channels;

        if let Err(e) = state.simulation.set_scene_id(scene_id.clone()).await {
            return vec![self.unavailable(state, id, e)];
        }
        let snapshot = match state.simulation.snapshot(Some(scene_id)).await {
            Ok(snapshot) => PublishedSnapshot::new(snapshot, state.settings.snapshot_rate_hz),
            Err(e) => return vec![self.unavailable(state, id, e)],
        };

        let mut out = Vec::new();
        match snapshot.payload_for_scene(None) {
            Ok(payload) => out.push(envelope(state, "snapshot", payload)),
            Err(e) => warn!(error = %e, "Failed to serialize snapshot"),
        }

        if self.resume.is_resumed() && self.channels.events {
            let cursor = self.resume.cursor.unwrap_or(0);
            let limit = state.settings.replay_limit;
            let page = state
                .events
                .read(|timeline| timeline.replay_from_cursor(cursor, limit));
            if page.has_more {
                state.telemetry().replay.record_fallback(ResumeReason::CursorStale);
            } else {
                state.telemetry().record_replayed(page.events.len());
                out.extend(self.deliver_events(state, &page.events));
            }
        } else {
            out.extend(self.catch_up(state));
        }
        out
    }

    async fn on_command(&mut self, state: &AppState, id: &str, payload: &Value) -> Envelope {
        state.telemetry().record_command_attempt();
        let now = now_ms();

        if let Err(retry_after_ms) = self.quota.consume(now, state.settings.rate_limit) {
            state.telemetry().record_rate_limited(now);
            return self.error(
                state,
                id,
                ErrorCode::RateLimited,
                format!("Too many commands; retry in {retry_after_ms}ms."),
            );
        }

        if !state.can_accept_commands() {
            state.telemetry().record_blocked_by_restoration(now);
            return self.error(
                state,
                id,
                ErrorCode::NotAllowed,
                "Command processing is blocked until state restoration consistency checks pass.",
            );
        }

        let context = CommandContext {
            in_reply_to: id.to_owned(),
            session_id: Some(self.session_id.clone()),
        };
        let outcome = match state.simulation.submit_command(payload.clone(), Some(context)).await {
            Ok(outcome) => outcome,
            Err(e) => return self.unavailable(state, id, e),
        };

        let command_name = payload.get("name").and_then(Value::as_str).unwrap_or("unknown");
        let reply = if outcome.ok {
            state.telemetry().record_command_ok();
            info!(
                session_id = %self.session_id.as_str(),
                command_id = id,
                command_name,
                "Command accepted"
            );
            envelope(state, "ack", json!({"in_reply_to": id, "status": "ok"}))
        } else {
            let code = outcome.code.unwrap_or(ErrorCode::Internal);
            {
                let mut telemetry = state.telemetry();
                telemetry.record_command_failed();
                if code == ErrorCode::ValidationFailed {
                    telemetry.record_validation_failed(now_ms());
                }
            }
            let message = outcome.message.unwrap_or_else(|| String::from("Command failed."));
            self.error(state, id, code, message)
        };

        if let Ok(stats) = state.simulation.stats().await {
            state.telemetry().record_performance(&stats, now_ms());
        }
        reply
    }

    // ---- Outbound feeds ----

    fn deliver_events(&mut self, state: &AppState, events: &[Event]) -> Vec<Envelope> {
        events
            .iter()
            .filter_map(|event| self.deliver_event(state, event))
            .collect()
    }

    /// Frame a live event, unless the session is not subscribed to events
    /// or has already seen it.
    pub fn deliver_event(&mut self, state: &AppState, event: &Event) -> Option<Envelope> {
        if !self.subscribed || !self.channels.events || event.seq <= self.last_event_seq {
            return None;
        }
        let payload = match serde_json::to_value(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(seq = event.seq, error = %e, "Failed to serialize event");
                return None;
            }
        };
        self.last_event_seq = event.seq;
        state.telemetry().record_event_delivered();
        Some(envelope(state, "event", payload))
    }

    /// Every retained event after the last one delivered.
    ///
    /// Used after `subscribe` when no resume window applies, and to close
    /// the gap after the live feed lagged.
    pub fn catch_up(&mut self, state: &AppState) -> Vec<Envelope> {
        if !self.subscribed || !self.channels.events {
            return Vec::new();
        }
        let since = self.last_event_seq;
        let events = state.events.read(|timeline| timeline.read_since(since, false, None));
        self.deliver_events(state, &events)
    }

    /// Frame a published snapshot for this session's scene.
    pub fn deliver_snapshot(&self, state: &AppState, snapshot: &PublishedSnapshot) -> Option<Envelope> {
        if !self.subscribed || !self.channels.snapshots {
            return None;
        }
        let payload = match snapshot.payload_for_scene(self.scene_id.as_deref()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize snapshot");
                return None;
            }
        };
        state.telemetry().record_snapshot_delivered(now_ms());
        Some(envelope(state, "snapshot", payload))
    }

    /// Frame an agent stream delta.
    pub fn deliver_agent_stream(&self, state: &AppState, payload: &AgentStreamPayload) -> Option<Envelope> {
        if !self.subscribed || !self.channels.agent_stream {
            return None;
        }
        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize agent stream delta");
                return None;
            }
        };
        state.telemetry().record_agent_stream_delivered();
        Some(envelope(state, "agent_stream", payload))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_use_the_type_letters() {
        let id = message_id("hello_ack");
        assert!(id.starts_with("helloack_"));
        assert_eq!(id.len(), "helloack_".len() + 12);
        assert!(Session::new().session_id().as_str().starts_with("sess_"));
    }

    #[test]
    fn hello_requires_client_fields() {
        assert!(valid_hello(&json!({"client": {"name": "web", "build": "1", "platform": "mac"}})));
        assert!(!valid_hello(&json!({"client": {"name": "web", "build": 1, "platform": "mac"}})));
        assert!(!valid_hello(&json!({})));
        assert!(!valid_hello(&Value::Null));
    }

    #[test]
    fn subscribe_requires_boolean_channels() {
        let (scene, channels) = parse_subscribe(&json!({
            "scene_id": "cozy_office_v0",
            "channels": {"events": true, "snapshots": false, "extra": "ignored"}
        }))
        .unwrap();
        assert_eq!(scene, "cozy_office_v0");
        assert!(channels.events);
        assert!(!channels.snapshots);
        assert!(!channels.agent_stream);

        assert!(parse_subscribe(&json!({"scene_id": "", "channels": {}})).is_none());
        assert!(parse_subscribe(&json!({"scene_id": "s", "channels": {"events": "yes"}})).is_none());
        assert!(parse_subscribe(&json!({"scene_id": "s"})).is_none());
    }
}
