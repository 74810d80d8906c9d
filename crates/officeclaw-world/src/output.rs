//! Structured output adapter for background-work runs.
//!
//! Workers report `{summary?, artifacts[], decisions[], follow_up_tasks[]}`.
//! The adapter bounds every list and string, drops unusable entries, and
//! rejects output that carries nothing the world can apply.

use serde_json::{Map, Value};

/// Most artifacts taken from one output.
pub const MAX_ARTIFACTS: usize = 8;
/// Most decisions taken from one output.
pub const MAX_DECISIONS: usize = 4;
/// Most follow-up tasks taken from one output.
pub const MAX_FOLLOW_UP_TASKS: usize = 12;
/// Default cap for free text.
pub const MAX_TEXT_CHARS: usize = 400;

const MAX_TYPE_CHARS: usize = 64;
const MAX_TITLE_CHARS: usize = 160;
const MAX_POI_CHARS: usize = 128;
const MAX_PROMPT_CHARS: usize = 240;
const MAX_OPTION_CHARS: usize = 120;
const MAX_OPTIONS: usize = 6;
const DEFAULT_OPTIONS: [&str; 3] = ["Approve", "Revise", "Escalate"];

/// Why an output could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedOutput {
    /// The output is not a JSON object.
    #[error("openclaw output must be an object")]
    NotAnObject,

    /// Every list was missing or empty after normalization.
    #[error("openclaw output must include artifacts, decisions, or follow_up_tasks")]
    Empty,
}

/// A normalized artifact entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    /// Lowercased artifact type, `note` by default.
    pub artifact_type: String,
    /// Display title.
    pub title: String,
    /// Where the artifact is displayed.
    pub poi_id: Option<String>,
}

/// A normalized decision entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDecision {
    /// Question for the user.
    pub prompt: String,
    /// One to six options.
    pub options: Vec<String>,
}

/// Normalized worker output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptedOutput {
    /// Short summary, if given.
    pub summary: Option<String>,
    /// Artifacts to deliver.
    pub artifacts: Vec<OutputArtifact>,
    /// Decisions to open.
    pub decisions: Vec<OutputDecision>,
    /// Titles of follow-up tasks.
    pub follow_up_tasks: Vec<String>,
}

/// Replace control characters, collapse whitespace, trim and clip.
///
/// Non-strings and strings that end up empty yield `fallback`.
pub fn normalize_text(value: Option<&Value>, fallback: &str, max_chars: usize) -> String {
    let Some(raw) = value.and_then(Value::as_str) else {
        return fallback.to_owned();
    };
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_control() && (c <= '\u{1f}' || c == '\u{7f}') { ' ' } else { c })
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return fallback.to_owned();
    }
    collapsed.chars().take(max_chars).collect()
}

fn first_present<'a>(entry: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| entry.get(*key).filter(|value| !value.is_null()))
}

fn normalize_artifact(entry: &Value, index: usize) -> Option<OutputArtifact> {
    let entry = entry.as_object()?;
    let artifact_type = normalize_text(entry.get("type"), "note", MAX_TYPE_CHARS).to_lowercase();
    let fallback_title = format!("OpenClaw output {}", index.saturating_add(1));
    let title = normalize_text(
        first_present(entry, &["title", "summary", "description"]),
        &fallback_title,
        MAX_TITLE_CHARS,
    );
    let poi_id = normalize_text(entry.get("poi_id"), "", MAX_POI_CHARS);
    Some(OutputArtifact {
        artifact_type,
        title,
        poi_id: (!poi_id.is_empty()).then_some(poi_id),
    })
}

fn normalize_decision(entry: &Value) -> Option<OutputDecision> {
    let entry = entry.as_object()?;
    let prompt = normalize_text(entry.get("prompt"), "", MAX_PROMPT_CHARS);
    if prompt.is_empty() {
        return None;
    }
    let mut options: Vec<String> = entry
        .get("options")
        .and_then(Value::as_array)
        .map(|raw| {
            raw.iter()
                .map(|option| normalize_text(Some(option), "", MAX_OPTION_CHARS))
                .filter(|option| !option.is_empty())
                .take(MAX_OPTIONS)
                .collect()
        })
        .unwrap_or_default();
    if options.is_empty() {
        options = DEFAULT_OPTIONS.iter().map(|o| (*o).to_owned()).collect();
    }
    Some(OutputDecision { prompt, options })
}

fn normalize_follow_up(entry: &Value, index: usize) -> Option<String> {
    let title = match entry {
        Value::String(_) => normalize_text(Some(entry), "", MAX_TITLE_CHARS),
        Value::Object(fields) => normalize_text(
            first_present(fields, &["title", "task_title"]),
            "",
            MAX_TITLE_CHARS,
        ),
        _ => return Some(format!("Follow-up task {}", index.saturating_add(1))),
    };
    (!title.is_empty()).then_some(title)
}

fn bounded<'a>(output: &'a Map<String, Value>, key: &str, max: usize) -> impl Iterator<Item = (usize, &'a Value)> {
    output
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().take(max).enumerate())
        .into_iter()
        .flatten()
}

/// Normalize raw worker output.
pub fn adapt_output(output: &Value) -> Result<AdaptedOutput, MalformedOutput> {
    let output = output.as_object().ok_or(MalformedOutput::NotAnObject)?;

    let artifacts: Vec<OutputArtifact> = bounded(output, "artifacts", MAX_ARTIFACTS)
        .filter_map(|(index, entry)| normalize_artifact(entry, index))
        .collect();
    let decisions: Vec<OutputDecision> = bounded(output, "decisions", MAX_DECISIONS)
        .filter_map(|(_, entry)| normalize_decision(entry))
        .collect();
    let follow_up_tasks: Vec<String> = bounded(output, "follow_up_tasks", MAX_FOLLOW_UP_TASKS)
        .filter_map(|(index, entry)| normalize_follow_up(entry, index))
        .collect();

    if artifacts.is_empty() && decisions.is_empty() && follow_up_tasks.is_empty() {
        return Err(MalformedOutput::Empty);
    }

    let summary = normalize_text(output.get("summary"), "", MAX_PROMPT_CHARS);
    Ok(AdaptedOutput {
        summary: (!summary.is_empty()).then_some(summary),
        artifacts,
        decisions,
        follow_up_tasks,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_is_cleaned_and_clipped() {
        let raw = json!("  Ship\u{0007}it \n\n now  ");
        assert_eq!(normalize_text(Some(&raw), "x", 400), "Ship it now");
        assert_eq!(normalize_text(Some(&json!("abcdef")), "x", 3), "abc");
        assert_eq!(normalize_text(Some(&json!(12)), "x", 3), "x");
        assert_eq!(normalize_text(Some(&json!("   ")), "x", 3), "x");
    }

    #[test]
    fn full_output_is_adapted() {
        let adapted = adapt_output(&json!({
            "summary": "Generated first draft deliverables.",
            "artifacts": [{"type": "REPORT", "title": "Landing page draft"}, "junk", {"summary": "Notes", "poi_id": "poi_desk"}],
            "decisions": [{"prompt": "Ship as-is?", "options": ["Ship", "Revise"]}, {"prompt": "  "}, {"prompt": "Tone?", "options": [1, ""]}],
            "follow_up_tasks": ["Prepare final polish pass", {"task_title": "Write FAQ"}, 7, {"title": ""}]
        }))
        .unwrap();

        assert_eq!(adapted.summary.as_deref(), Some("Generated first draft deliverables."));
        assert_eq!(adapted.artifacts.len(), 2);
        assert_eq!(adapted.artifacts[0].artifact_type, "report");
        assert_eq!(adapted.artifacts[1].artifact_type, "note");
        assert_eq!(adapted.artifacts[1].title, "Notes");
        assert_eq!(adapted.artifacts[1].poi_id.as_deref(), Some("poi_desk"));

        assert_eq!(adapted.decisions.len(), 2);
        assert_eq!(adapted.decisions[0].options, vec!["Ship", "Revise"]);
        assert_eq!(adapted.decisions[1].options, vec!["Approve", "Revise", "Escalate"]);

        assert_eq!(
            adapted.follow_up_tasks,
            vec!["Prepare final polish pass", "Write FAQ", "Follow-up task 3"]
        );
    }

    #[test]
    fn untitled_artifact_gets_positional_title() {
        let adapted = adapt_output(&json!({"artifacts": [{}, {"title": 5}]})).unwrap();
        assert_eq!(adapted.artifacts[0].title, "OpenClaw output 1");
        assert_eq!(adapted.artifacts[1].title, "OpenClaw output 2");
    }

    #[test]
    fn lists_are_bounded() {
        let many: Vec<String> = (0..20).map(|i| format!("Task {i}")).collect();
        let adapted = adapt_output(&json!({"follow_up_tasks": many})).unwrap();
        assert_eq!(adapted.follow_up_tasks.len(), MAX_FOLLOW_UP_TASKS);
    }

    #[test]
    fn malformed_output_is_rejected() {
        assert_eq!(adapt_output(&json!([1])), Err(MalformedOutput::NotAnObject));
        assert_eq!(
            adapt_output(&json!({"summary": "No usable fields"})),
            Err(MalformedOutput::Empty)
        );
        assert_eq!(
            MalformedOutput::Empty.to_string(),
            "openclaw output must include artifacts, decisions, or follow_up_tasks"
        );
    }
}
