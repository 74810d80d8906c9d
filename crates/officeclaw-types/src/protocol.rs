//! Wire protocol types for the world socket.
//!
//! Every frame is an [`Envelope`] `{type, id, ts, v, payload}`. Inbound
//! payloads are kept as raw JSON until the session has validated them,
//! because validation failures must echo the originating message id.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::enums::ErrorCode;
use crate::ids::{AgentId, ProjectId, SessionId, TaskId};

/// A protocol frame in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Envelope {
    /// Message type (`hello`, `snapshot`, `event`, ...).
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Message id, echoed as `in_reply_to` by acks and errors.
    pub id: String,
    /// Send time in epoch milliseconds.
    pub ts: i64,
    /// Protocol version.
    pub v: u32,
    /// Type-specific payload.
    pub payload: Value,
}

/// Channel flags a session subscribes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[allow(clippy::struct_excessive_bools)]
pub struct Channels {
    /// Semantic timeline events.
    #[serde(default)]
    pub events: bool,
    /// Periodic world snapshots.
    #[serde(default)]
    pub snapshots: bool,
    /// Goal updates.
    #[serde(default)]
    pub goals: bool,
    /// Chat messages.
    #[serde(default)]
    pub chat: bool,
    /// Agent token/thought/code streams.
    #[serde(default)]
    pub agent_stream: bool,
}

/// Outcome of a reconnect cursor evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ResumeStatus {
    /// The gap can be closed with one replay page.
    Resumed,
    /// The client must rebuild from a full snapshot.
    SnapshotRequired,
}

/// Why a resume fell back to a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum ResumeReason {
    /// Cursor missing, malformed, or ahead of the timeline.
    CursorUnknown,
    /// The timeline has never produced an event.
    ServerRestarted,
    /// The cursor fell out of retention or the gap exceeds one page.
    CursorStale,
}

impl ResumeReason {
    /// Wire spelling of the reason.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CursorUnknown => "CURSOR_UNKNOWN",
            Self::ServerRestarted => "SERVER_RESTARTED",
            Self::CursorStale => "CURSOR_STALE",
        }
    }
}

/// Resume decision reported in `hello_ack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ResumeDecision {
    /// Resumed or snapshot required.
    pub status: ResumeStatus,
    /// Fallback reason when a snapshot is required.
    pub reason: Option<ResumeReason>,
    /// First seq the client will receive when resumed.
    pub replay_from_seq: Option<u64>,
    /// The accepted cursor, if it was a valid integer.
    #[serde(skip)]
    pub cursor: Option<u64>,
}

impl ResumeDecision {
    /// A snapshot-required decision.
    pub const fn snapshot_required(reason: ResumeReason, cursor: Option<u64>) -> Self {
        Self {
            status: ResumeStatus::SnapshotRequired,
            reason: Some(reason),
            replay_from_seq: None,
            cursor,
        }
    }

    /// Whether the session may replay instead of rebuilding.
    pub const fn is_resumed(&self) -> bool {
        matches!(self.status, ResumeStatus::Resumed)
    }
}

/// `hello_ack` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HelloAck {
    /// Server-assigned session id.
    pub session_id: SessionId,
    /// Protocol version spoken by the server.
    pub protocol_v: u32,
    /// Reconnect decision.
    pub resume: ResumeDecision,
}

/// `ack` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AckPayload {
    /// Id of the accepted message.
    pub in_reply_to: String,
    /// Always `ok`.
    pub status: String,
}

/// `error` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ErrorPayload {
    /// Id of the rejected message, `msg_unknown` when it had none.
    pub in_reply_to: String,
    /// Rejection code.
    pub code: ErrorCode,
    /// Human-readable reason.
    pub message: String,
}

/// Kind of an agent stream delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum AgentStreamKind {
    /// Output tokens.
    Token,
    /// Reasoning trace.
    Thought,
    /// Code edits.
    Code,
}

impl AgentStreamKind {
    /// Parse a wire spelling.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "token" => Some(Self::Token),
            "thought" => Some(Self::Thought),
            "code" => Some(Self::Code),
            _ => None,
        }
    }
}

/// A validated `agent_stream` delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AgentStreamPayload {
    /// Stream identifier.
    pub stream_id: String,
    /// Agent producing the stream.
    pub agent_id: AgentId,
    /// Project the work belongs to.
    pub project_id: ProjectId,
    /// Task the work belongs to.
    pub task_id: TaskId,
    /// Delta kind.
    pub kind: AgentStreamKind,
    /// Monotonic per-stream sequence number, starting at 1.
    pub seq: u64,
    /// Text delta.
    pub delta: String,
    /// Whether this is the final delta of the stream.
    pub done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_decision_serializes_nulls() {
        let decision = ResumeDecision::snapshot_required(ResumeReason::CursorStale, Some(3));
        let value = serde_json::to_value(decision).ok();
        assert_eq!(
            value,
            Some(serde_json::json!({
                "status": "snapshot_required",
                "reason": "CURSOR_STALE",
                "replay_from_seq": null
            }))
        );
    }

    #[test]
    fn envelope_type_field_is_renamed() {
        let raw = r#"{"type":"ping","id":"m1","ts":1,"v":1,"payload":{"nonce":"n"}}"#;
        let envelope: Option<Envelope> = serde_json::from_str(raw).ok();
        assert_eq!(envelope.map(|e| e.msg_type), Some(String::from("ping")));
    }
}
