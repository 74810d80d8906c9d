//! Agent stream registry and task progress previews.
//!
//! Background agents push token, thought and code deltas through the
//! server. Deltas are fanned out verbatim to sessions that subscribed to
//! the `agent_stream` channel; the timeline only ever sees a throttled
//! `task_progress` event built from fixed preview strings, never the
//! delta text itself.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value, json};

use officeclaw_types::{AgentId, AgentStreamKind, AgentStreamPayload, CommandOutcome, ErrorCode, ProjectId, TaskId};

/// Minimum spacing of previews for one task, milliseconds.
pub const PREVIEW_MIN_INTERVAL_MS: i64 = 500;

const TOKEN_PREVIEWS: [&str; 4] = [
    "Processing task context.",
    "Preparing concise progress update.",
    "Applying next execution step.",
    "Finalizing task output.",
];

const THOUGHT_PREVIEWS: [&str; 4] = [
    "Reviewing task status.",
    "Selecting next user-visible action.",
    "Refining execution plan.",
    "Finalizing task output.",
];

const CODE_PREVIEWS: [&str; 4] = [
    "Drafting implementation changes.",
    "Refining logic and safeguards.",
    "Preparing completion pass.",
    "Finalizing task output.",
];

const fn previews_for(kind: AgentStreamKind) -> &'static [&'static str; 4] {
    match kind {
        AgentStreamKind::Token => &TOKEN_PREVIEWS,
        AgentStreamKind::Thought => &THOUGHT_PREVIEWS,
        AgentStreamKind::Code => &CODE_PREVIEWS,
    }
}

fn invalid(message: impl Into<String>) -> CommandOutcome {
    CommandOutcome::rejected(ErrorCode::ValidationFailed, message)
}

fn required_str<'a>(raw: &'a Map<String, Value>, field: &str) -> Result<&'a str, CommandOutcome> {
    raw.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| invalid(format!("agent_stream.{field} must be a non-empty string.")))
}

/// A `task_progress` timeline event.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskProgress {
    /// Event payload.
    pub payload: Map<String, Value>,
}

/// Safe preview text and percentage for a delta.
pub fn preview_for(payload: &AgentStreamPayload) -> (&'static str, u64) {
    let options = previews_for(payload.kind);
    let cycle = options.len().saturating_sub(1).max(1);
    let position = usize::try_from(payload.seq.saturating_sub(1)).unwrap_or(usize::MAX);
    let active = position
        .checked_rem(cycle)
        .unwrap_or(0)
        .min(options.len().saturating_sub(2));
    if payload.done {
        let last = options.last().copied().unwrap_or_default();
        return (last, 99);
    }
    let text = options.get(active).copied().unwrap_or_default();
    let percent = payload.seq.saturating_mul(8).clamp(5, 95);
    (text, percent)
}

#[derive(Debug, Clone, Copy)]
struct PreviewMark {
    last_emitted_ms: i64,
}

/// Per-stream sequence state and preview throttling.
#[derive(Debug, Default)]
pub struct AgentStreams {
    seq_by_stream: HashMap<String, u64>,
    completed: HashSet<String>,
    previews: HashMap<String, PreviewMark>,
}

fn preview_key(project_id: &str, task_id: &str) -> String {
    let project_id = if project_id.is_empty() { "proj_unknown" } else { project_id };
    format!("{project_id}:{task_id}")
}

impl AgentStreams {
    /// Validate a raw delta against the stream's state.
    pub fn normalize(&self, raw: &Value) -> Result<AgentStreamPayload, CommandOutcome> {
        let Some(raw) = raw.as_object() else {
            return Err(invalid("agent_stream payload must be an object."));
        };
        let stream_id = required_str(raw, "stream_id")?;
        let agent_id = required_str(raw, "agent_id")?;
        let project_id = required_str(raw, "project_id")?;
        let task_id = required_str(raw, "task_id")?;
        let kind = AgentStreamKind::parse(&required_str(raw, "kind")?.to_lowercase())
            .ok_or_else(|| invalid("agent_stream.kind must be one of token|thought|code."))?;
        let Some(delta) = raw.get("delta").and_then(Value::as_str) else {
            return Err(invalid("agent_stream.delta must be a string."));
        };
        let Some(done) = raw.get("done").and_then(Value::as_bool) else {
            return Err(invalid("agent_stream.done must be a boolean."));
        };

        if self.completed.contains(stream_id) {
            return Err(CommandOutcome::rejected(
                ErrorCode::Conflict,
                format!("agent_stream {stream_id} is already completed."),
            ));
        }

        let current = self.seq_by_stream.get(stream_id).copied().unwrap_or(0);
        let seq = match raw.get("seq") {
            None => current.saturating_add(1),
            Some(value) => value
                .as_u64()
                .filter(|seq| *seq >= 1)
                .ok_or_else(|| invalid("agent_stream.seq must be an integer >= 1."))?,
        };
        if seq <= current {
            return Err(CommandOutcome::rejected(
                ErrorCode::Conflict,
                format!("agent_stream.seq must increase monotonically for stream {stream_id}."),
            ));
        }

        Ok(AgentStreamPayload {
            stream_id: stream_id.to_owned(),
            agent_id: AgentId::from(agent_id),
            project_id: ProjectId::from(project_id),
            task_id: TaskId::from(task_id),
            kind,
            seq,
            delta: delta.to_owned(),
            done,
        })
    }

    /// Record an accepted delta. A `done` delta closes the stream.
    pub fn commit(&mut self, payload: &AgentStreamPayload) {
        if payload.done {
            self.seq_by_stream.remove(&payload.stream_id);
            self.completed.insert(payload.stream_id.clone());
        } else {
            self.seq_by_stream.insert(payload.stream_id.clone(), payload.seq);
        }
    }

    /// Normalize and commit in one step.
    pub fn accept(&mut self, raw: &Value) -> Result<AgentStreamPayload, CommandOutcome> {
        let payload = self.normalize(raw)?;
        self.commit(&payload);
        Ok(payload)
    }

    /// The `task_progress` event for an accepted delta, unless another
    /// preview for the same task went out less than
    /// [`PREVIEW_MIN_INTERVAL_MS`] ago. Final deltas always produce one.
    pub fn preview(&mut self, payload: &AgentStreamPayload, now_ms: i64) -> Option<TaskProgress> {
        let key = preview_key(&payload.project_id, &payload.task_id);
        let throttled = !payload.done
            && self
                .previews
                .get(&key)
                .is_some_and(|mark| now_ms.saturating_sub(mark.last_emitted_ms) < PREVIEW_MIN_INTERVAL_MS);
        if throttled {
            return None;
        }
        if payload.done {
            self.previews.remove(&key);
        } else {
            self.previews.insert(key, PreviewMark { last_emitted_ms: now_ms });
        }

        let (preview_text, percent) = preview_for(payload);
        let event = json!({
            "project_id": payload.project_id,
            "task_id": payload.task_id,
            "agent_id": payload.agent_id,
            "kind": payload.kind,
            "percent": percent,
            "preview_text": preview_text,
            "meta": {
                "source": "agent_stream",
                "stream_id": payload.stream_id,
                "seq": payload.seq,
            },
        });
        match event {
            Value::Object(payload) => Some(TaskProgress { payload }),
            _ => None,
        }
    }

    /// Forget the preview throttle of a finished task.
    pub fn clear_preview(&mut self, project_id: &str, task_id: &str) {
        self.previews.remove(&preview_key(project_id, task_id));
    }
}
