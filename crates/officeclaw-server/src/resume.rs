//! Reconnect cursor evaluation.
//!
//! A reconnecting client claims the last event seq it saw. The decision
//! is made once, at `hello`, and fixes whether the session later receives
//! a replay window or only a fresh snapshot.

use serde_json::Value;

use officeclaw_events::EventTimeline;
use officeclaw_types::{ResumeDecision, ResumeReason, ResumeStatus};

/// Decide how a session with the given `resume` payload reconnects.
///
/// `resume` is the raw `hello.payload.resume` value; `None` means the
/// client did not send one.
pub fn evaluate_resume(
    resume: Option<&Value>,
    timeline: &EventTimeline,
    replay_limit: usize,
) -> ResumeDecision {
    let Some(cursor) = resume
        .and_then(Value::as_object)
        .and_then(|resume| resume.get("last_seq"))
        .and_then(Value::as_u64)
    else {
        return ResumeDecision::snapshot_required(ResumeReason::CursorUnknown, None);
    };

    let latest = timeline.latest_seq();
    let oldest = timeline.oldest_seq();

    if latest == 0 {
        return ResumeDecision::snapshot_required(ResumeReason::ServerRestarted, Some(cursor));
    }
    if cursor > latest {
        return ResumeDecision::snapshot_required(ResumeReason::CursorUnknown, Some(cursor));
    }
    if cursor < oldest.saturating_sub(1) {
        return ResumeDecision::snapshot_required(ResumeReason::CursorStale, Some(cursor));
    }

    let probe = timeline.replay_from_cursor(cursor, replay_limit.max(1));
    if probe.has_more {
        return ResumeDecision::snapshot_required(ResumeReason::CursorStale, Some(cursor));
    }

    ResumeDecision {
        status: ResumeStatus::Resumed,
        reason: None,
        replay_from_seq: Some(cursor.saturating_add(1)),
        cursor: Some(cursor),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::*;

    fn timeline_with(events: usize, max_events: usize) -> EventTimeline {
        let mut timeline = EventTimeline::in_memory(max_events);
        for _ in 0..events {
            let appended = timeline.append("task_progress", Map::new());
            assert!(appended.is_ok());
        }
        timeline
    }

    fn reason(decision: &ResumeDecision) -> Option<ResumeReason> {
        decision.reason
    }

    #[test]
    fn missing_or_malformed_cursor_is_unknown() {
        let timeline = timeline_with(3, 10);
        for resume in [
            None,
            Some(json!(null)),
            Some(json!({})),
            Some(json!({"last_seq": -1})),
            Some(json!({"last_seq": 1.5})),
            Some(json!({"last_seq": "2"})),
        ] {
            let decision = evaluate_resume(resume.as_ref(), &timeline, 200);
            assert!(!decision.is_resumed());
            assert_eq!(reason(&decision), Some(ResumeReason::CursorUnknown));
        }
    }

    #[test]
    fn empty_timeline_means_server_restarted() {
        let timeline = timeline_with(0, 10);
        let decision = evaluate_resume(Some(&json!({"last_seq": 0})), &timeline, 200);
        assert_eq!(reason(&decision), Some(ResumeReason::ServerRestarted));
    }

    #[test]
    fn cursor_ahead_of_the_timeline_is_unknown() {
        let timeline = timeline_with(3, 10);
        let decision = evaluate_resume(Some(&json!({"last_seq": 4})), &timeline, 200);
        assert_eq!(reason(&decision), Some(ResumeReason::CursorUnknown));
    }

    #[test]
    fn evicted_cursor_is_stale() {
        // 15 events kept in a window of 10 -> retained seqs 6..=15.
        let timeline = timeline_with(15, 10);
        assert_eq!(timeline.oldest_seq(), 6);
        let stale = evaluate_resume(Some(&json!({"last_seq": 4})), &timeline, 200);
        assert_eq!(reason(&stale), Some(ResumeReason::CursorStale));

        let edge = evaluate_resume(Some(&json!({"last_seq": 5})), &timeline, 200);
        assert!(edge.is_resumed());
        assert_eq!(edge.replay_from_seq, Some(6));
    }

    #[test]
    fn gap_wider_than_one_page_is_stale() {
        let timeline = timeline_with(8, 10);
        let wide = evaluate_resume(Some(&json!({"last_seq": 2})), &timeline, 3);
        assert_eq!(reason(&wide), Some(ResumeReason::CursorStale));

        let narrow = evaluate_resume(Some(&json!({"last_seq": 5})), &timeline, 3);
        assert!(narrow.is_resumed());
        assert_eq!(narrow.cursor, Some(5));
    }

    #[test]
    fn caught_up_cursor_resumes_with_nothing_to_replay() {
        let timeline = timeline_with(3, 10);
        let decision = evaluate_resume(Some(&json!({"last_seq": 3})), &timeline, 200);
        assert!(decision.is_resumed());
        assert_eq!(decision.replay_from_seq, Some(4));
        assert_eq!(decision.reason, None);
    }
}
