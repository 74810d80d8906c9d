//! Append-only event timeline with cursor replay.
//!
//! Every semantic event the world produces gets the next seq and lands in
//! a bounded in-memory window. When a persist path is configured each
//! event is also written to a newline-delimited log before it becomes
//! visible, and the log is read back on construction so seqs continue
//! where the previous process stopped.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use officeclaw_types::Event;

use crate::error::TimelineError;
use crate::ndjson;

/// Default number of events kept in memory.
pub const DEFAULT_MAX_EVENTS: usize = 2000;

/// Smallest retention window accepted.
pub const MIN_MAX_EVENTS: usize = 10;

/// Keys owned by the timeline that a payload may not override.
const RESERVED_KEYS: [&str; 4] = ["seq", "event_id", "ts", "name"];

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Construction options for an [`EventTimeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineOptions {
    /// Floor for seq assignment; the first event gets `initial_seq + 1`.
    pub initial_seq: u64,
    /// In-memory retention bound, raised to [`MIN_MAX_EVENTS`].
    pub max_events: usize,
    /// Durable log path, if any.
    pub persist_path: Option<PathBuf>,
}

impl Default for TimelineOptions {
    fn default() -> Self {
        Self {
            initial_seq: 0,
            max_events: DEFAULT_MAX_EVENTS,
            persist_path: None,
        }
    }
}

/// One page of a cursor replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayPage {
    /// Events with seq strictly greater than `cursor`, oldest first.
    pub events: Vec<Event>,
    /// The cursor the page was read from.
    pub cursor: u64,
    /// Seq of the last returned event, or `cursor` when the page is empty.
    pub next_cursor: u64,
    /// Whether retained events remain beyond this page.
    pub has_more: bool,
    /// Latest seq ever assigned.
    pub latest_seq: u64,
}

/// Counters reported on the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineStats {
    /// Oldest retained seq, 0 when empty.
    pub oldest_seq: u64,
    /// Latest seq ever assigned.
    pub latest_seq: u64,
    /// Events currently retained.
    pub size: usize,
    /// Retention bound.
    pub max_events: usize,
    /// Durable log path, if any.
    pub persist_path: Option<String>,
    /// Log lines dropped while loading.
    pub skipped_lines: usize,
}

/// The event timeline.
#[derive(Debug)]
pub struct EventTimeline {
    events: VecDeque<Event>,
    max_events: usize,
    next_seq: u64,
    persist_path: Option<PathBuf>,
    skipped_lines: usize,
    clock: fn() -> i64,
}

fn decode_event(line: &str) -> Option<Event> {
    let value: Value = serde_json::from_str(line).ok()?;
    value.get("seq")?.as_u64()?;
    serde_json::from_value(value).ok()
}

impl EventTimeline {
    /// A memory-only timeline.
    pub fn in_memory(max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            max_events: max_events.max(MIN_MAX_EVENTS),
            next_seq: 1,
            persist_path: None,
            skipped_lines: 0,
            clock: now_ms,
        }
    }

    /// Build a timeline, recovering any events already in the durable log.
    pub fn open(options: TimelineOptions) -> Result<Self, TimelineError> {
        let mut timeline = Self::in_memory(options.max_events);
        let mut latest_persisted = 0;

        if let Some(path) = &options.persist_path {
            let report = ndjson::read_lines(path, decode_event).map_err(|source| {
                TimelineError::Io {
                    path: path.clone(),
                    source,
                }
            })?;
            if report.skipped > 0 {
                warn!(
                    path = %path.display(),
                    skipped = report.skipped,
                    "Skipped malformed event log lines"
                );
            }
            latest_persisted = report.records.iter().map(|event| event.seq).max().unwrap_or(0);
            debug!(
                path = %path.display(),
                recovered = report.records.len(),
                latest_seq = latest_persisted,
                "Event log loaded"
            );
            timeline.events = report.records.into();
            timeline.skipped_lines = report.skipped;
        }

        timeline.next_seq = options
            .initial_seq
            .max(latest_persisted)
            .saturating_add(1);
        timeline.persist_path = options.persist_path;
        timeline.trim();
        Ok(timeline)
    }

    /// Replace the wall clock used to stamp events.
    #[must_use]
    pub const fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    /// Append an event and return a copy of it.
    ///
    /// The event is written to the durable log first; on a write failure
    /// nothing is retained and the seq is not consumed.
    pub fn append(&mut self, name: &str, mut payload: Map<String, Value>) -> Result<Event, TimelineError> {
        for key in RESERVED_KEYS {
            payload.remove(key);
        }
        let seq = self.next_seq;
        let event = Event {
            seq,
            event_id: format!("evt_{seq:08}"),
            ts: (self.clock)(),
            name: name.to_owned(),
            payload,
        };

        if let Some(path) = &self.persist_path {
            let encoded = serde_json::to_string(&event)
                .map_err(|source| TimelineError::Encode { seq, source })?;
            ndjson::append_line(path, &encoded).map_err(|source| TimelineError::Io {
                path: path.clone(),
                source,
            })?;
        }

        self.next_seq = seq.saturating_add(1);
        self.events.push_back(event.clone());
        self.trim();
        Ok(event)
    }

    fn trim(&mut self) {
        while self.events.len() > self.max_events {
            self.events.pop_front();
        }
    }

    /// Retained events after `seq` (or from it, when `inclusive`), capped
    /// at `limit` when given.
    pub fn read_since(&self, seq: u64, inclusive: bool, limit: Option<usize>) -> Vec<Event> {
        let matching = self
            .events
            .iter()
            .filter(|event| if inclusive { event.seq >= seq } else { event.seq > seq });
        match limit {
            Some(limit) => matching.take(limit.max(1)).cloned().collect(),
            None => matching.cloned().collect(),
        }
    }

    /// Up to `limit` events with seq strictly greater than `cursor`.
    pub fn replay_from_cursor(&self, cursor: u64, limit: usize) -> ReplayPage {
        let events = self.read_since(cursor, false, Some(limit));
        let next_cursor = events.last().map_or(cursor, |event| event.seq);
        let has_more = self
            .events
            .back()
            .is_some_and(|event| event.seq > next_cursor);
        ReplayPage {
            events,
            cursor,
            next_cursor,
            has_more,
            latest_seq: self.latest_seq(),
        }
    }

    /// Latest seq ever assigned, 0 before the first event.
    pub const fn latest_seq(&self) -> u64 {
        self.next_seq.saturating_sub(1)
    }

    /// Oldest retained seq, 0 when nothing is retained.
    pub fn oldest_seq(&self) -> u64 {
        self.events.front().map_or(0, |event| event.seq)
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events are retained.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Durable log path, if any.
    pub fn persist_path(&self) -> Option<&Path> {
        self.persist_path.as_deref()
    }

    /// Counters for the health endpoint.
    pub fn stats(&self) -> TimelineStats {
        TimelineStats {
            oldest_seq: self.oldest_seq(),
            latest_seq: self.latest_seq(),
            size: self.len(),
            max_events: self.max_events,
            persist_path: self
                .persist_path
                .as_ref()
                .map(|path| path.display().to_string()),
            skipped_lines: self.skipped_lines,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn temp_log() -> PathBuf {
        std::env::temp_dir()
            .join(format!("officeclaw-event-log-{}", uuid::Uuid::new_v4()))
            .join("events.jsonl")
    }

    const fn fixed_clock() -> i64 {
        1_700_000_000_000
    }

    #[test]
    fn seqs_start_above_the_floor() {
        let mut timeline = EventTimeline::open(TimelineOptions {
            initial_seq: 10,
            max_events: 100,
            persist_path: None,
        })
        .unwrap();
        let first = timeline
            .append("task_started", fields(json!({"project_id": "proj_abc"})))
            .unwrap();
        let second = timeline
            .append("task_done", fields(json!({"project_id": "proj_abc"})))
            .unwrap();

        assert_eq!(first.seq, 11);
        assert_eq!(first.event_id, "evt_00000011");
        assert_eq!(second.seq, 12);
        let all = timeline.read_since(0, false, None);
        assert_eq!(all.len(), 2);
        assert_eq!(timeline.latest_seq(), 12);
    }

    #[test]
    fn payload_cannot_override_bookkeeping() {
        let mut timeline = EventTimeline::in_memory(100).with_clock(fixed_clock);
        let event = timeline
            .append("task_assigned", fields(json!({"seq": 99, "ts": 5, "task_id": "task_copy"})))
            .unwrap();
        assert_eq!(event.seq, 1);
        assert_eq!(event.ts, fixed_clock());
        assert_eq!(event.payload.get("task_id"), Some(&json!("task_copy")));
        assert!(!event.payload.contains_key("seq"));
    }

    #[test]
    fn retention_evicts_the_oldest_events() {
        let mut timeline = EventTimeline::in_memory(10);
        for index in 0..18 {
            timeline
                .append("task_progress", fields(json!({"meta": {"idx": index}})))
                .unwrap();
        }
        assert_eq!(timeline.len(), 10);
        let current = timeline.read_since(0, false, None);
        assert_eq!(current[0].seq, 9);
        assert_eq!(current[9].seq, 18);
        assert_eq!(timeline.oldest_seq(), 9);
    }

    #[test]
    fn retention_has_a_floor() {
        let timeline = EventTimeline::in_memory(2);
        assert_eq!(timeline.stats().max_events, MIN_MAX_EVENTS);
    }

    #[test]
    fn cursor_replay_pages_through_the_window() {
        let mut timeline = EventTimeline::in_memory(100);
        for _ in 0..5 {
            timeline.append("task_progress", Map::new()).unwrap();
        }

        let first = timeline.replay_from_cursor(0, 2);
        let seqs: Vec<u64> = first.events.iter().map(|event| event.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert!(first.has_more);
        assert_eq!(first.next_cursor, 2);

        let second = timeline.replay_from_cursor(first.next_cursor, 2);
        let seqs: Vec<u64> = second.events.iter().map(|event| event.seq).collect();
        assert_eq!(seqs, vec![3, 4]);
        assert!(second.has_more);

        let last = timeline.replay_from_cursor(second.next_cursor, 2);
        let seqs: Vec<u64> = last.events.iter().map(|event| event.seq).collect();
        assert_eq!(seqs, vec![5]);
        assert!(!last.has_more);
        assert_eq!(last.next_cursor, 5);
        assert_eq!(last.latest_seq, 5);
    }

    #[test]
    fn exact_final_page_has_no_more() {
        let mut timeline = EventTimeline::in_memory(100);
        for _ in 0..4 {
            timeline.append("task_progress", Map::new()).unwrap();
        }
        let page = timeline.replay_from_cursor(2, 2);
        assert_eq!(page.events.len(), 2);
        assert!(!page.has_more);
    }

    #[test]
    fn empty_replay_keeps_the_cursor() {
        let mut timeline = EventTimeline::in_memory(100);
        timeline.append("task_progress", Map::new()).unwrap();
        let page = timeline.replay_from_cursor(7, 10);
        assert!(page.events.is_empty());
        assert_eq!(page.next_cursor, 7);
        assert!(!page.has_more);
    }

    #[test]
    fn inclusive_reads_include_the_cursor() {
        let mut timeline = EventTimeline::in_memory(100);
        for _ in 0..3 {
            timeline.append("task_progress", Map::new()).unwrap();
        }
        assert_eq!(timeline.read_since(2, true, None).len(), 2);
        assert_eq!(timeline.read_since(2, false, None).len(), 1);
        assert_eq!(timeline.read_since(0, false, Some(0)).len(), 1);
    }

    #[test]
    fn durable_log_is_recovered_on_open() {
        let path = temp_log();
        let options = TimelineOptions {
            persist_path: Some(path.clone()),
            max_events: 100,
            ..TimelineOptions::default()
        };

        let mut first = EventTimeline::open(options.clone()).unwrap();
        first
            .append("task_assigned", fields(json!({"task_id": "task_copy"})))
            .unwrap();
        first
            .append("task_started", fields(json!({"task_id": "task_copy"})))
            .unwrap();
        assert_eq!(first.latest_seq(), 2);

        ndjson::append_line(&path, "{\"broken\":").unwrap();

        let mut second = EventTimeline::open(options).unwrap();
        let recovered = second.read_since(0, false, None);
        assert_eq!(recovered.len(), 2);
        assert_eq!(recovered[0].name, "task_assigned");
        assert_eq!(second.stats().skipped_lines, 1);

        let appended = second
            .append("task_done", fields(json!({"task_id": "task_copy"})))
            .unwrap();
        assert_eq!(appended.seq, 3);
        let replay = second.replay_from_cursor(1, 5);
        let seqs: Vec<u64> = replay.events.iter().map(|event| event.seq).collect();
        assert_eq!(seqs, vec![2, 3]);
    }
}
