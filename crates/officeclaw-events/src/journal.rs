//! Durable command journal.
//!
//! Every accepted command is appended as a [`JournalRecord`] so the world
//! can be rebuilt by replaying the journal on boot. A journal without a
//! path is disabled: appends are accepted and dropped.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use officeclaw_types::{CommandContext, JournalRecord};

use crate::error::JournalError;
use crate::ndjson;

/// Records read back from the journal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JournalLoad {
    /// Valid records sorted by `journal_seq`.
    pub records: Vec<JournalRecord>,
    /// Lines dropped because they did not decode.
    pub skipped_lines: usize,
}

/// The append-only command journal.
#[derive(Debug)]
pub struct CommandJournal {
    path: Option<PathBuf>,
    next_seq: u64,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A line is a record only if it carries a positive `journal_seq` and an
/// object `command`.
fn decode_record(line: &str) -> Option<JournalRecord> {
    let value: Value = serde_json::from_str(line).ok()?;
    let seq = value.get("journal_seq")?.as_u64()?;
    if seq == 0 || !value.get("command")?.is_object() {
        return None;
    }
    serde_json::from_value(value).ok()
}

impl CommandJournal {
    /// A journal writing to `path`, or a disabled one for `None`.
    pub const fn new(path: Option<PathBuf>) -> Self {
        Self { path, next_seq: 1 }
    }

    /// Read every valid record, sorted by `journal_seq`, and continue
    /// numbering after the highest one.
    pub fn load(&mut self) -> Result<JournalLoad, JournalError> {
        let Some(path) = &self.path else {
            return Ok(JournalLoad::default());
        };
        let report = ndjson::read_lines(path, decode_record).map_err(|source| JournalError::Io {
            path: path.clone(),
            source,
        })?;
        if report.skipped > 0 {
            warn!(
                path = %path.display(),
                skipped = report.skipped,
                "Skipped malformed command journal lines"
            );
        }

        let mut records = report.records;
        records.sort_by_key(|record| record.journal_seq);
        self.next_seq = records
            .last()
            .map_or(1, |record| record.journal_seq.saturating_add(1));
        debug!(
            path = %path.display(),
            records = records.len(),
            next_journal_seq = self.next_seq,
            "Command journal loaded"
        );
        Ok(JournalLoad {
            records,
            skipped_lines: report.skipped,
        })
    }

    /// Append an accepted command. Returns the written record, or `None`
    /// when the journal is disabled.
    pub fn append(
        &mut self,
        command: Value,
        context: Option<CommandContext>,
    ) -> Result<Option<JournalRecord>, JournalError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        let journal_seq = self.next_seq;
        let record = JournalRecord {
            journal_seq,
            ts: now_ms(),
            command,
            context,
        };
        let encoded = serde_json::to_string(&record)
            .map_err(|source| JournalError::Encode { journal_seq, source })?;
        ndjson::append_line(path, &encoded).map_err(|source| JournalError::Io {
            path: path.clone(),
            source,
        })?;
        self.next_seq = journal_seq.saturating_add(1);
        Ok(Some(record))
    }

    /// Seq the next record will receive.
    pub const fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Journal path, if enabled.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;

    use super::*;

    fn temp_journal() -> PathBuf {
        std::env::temp_dir()
            .join(format!("officeclaw-journal-{}", uuid::Uuid::new_v4()))
            .join("commands.jsonl")
    }

    #[test]
    fn disabled_journal_drops_appends() {
        let mut journal = CommandJournal::new(None);
        let written = journal
            .append(json!({"name": "auto_assign", "data": {}}), None)
            .unwrap();
        assert!(written.is_none());
        assert_eq!(journal.next_seq(), 1);
        assert!(journal.load().unwrap().records.is_empty());
    }

    #[test]
    fn appended_records_load_back_in_seq_order() {
        let path = temp_journal();
        let mut journal = CommandJournal::new(Some(path.clone()));
        journal
            .append(
                json!({"name": "assign_task", "data": {"task_id": "task_copy", "agent_id": "agent_eng_1"}}),
                Some(CommandContext {
                    in_reply_to: String::from("msg_1"),
                    session_id: None,
                }),
            )
            .unwrap();
        journal
            .append(json!({"name": "auto_assign", "data": {"project_id": "proj_abc"}}), None)
            .unwrap();

        // Out-of-order, malformed and shape-invalid lines.
        ndjson::append_line(
            &path,
            r#"{"journal_seq":0,"ts":1,"command":{"name":"auto_assign","data":{}}}"#,
        )
        .unwrap();
        ndjson::append_line(&path, r#"{"journal_seq":7,"ts":1,"command":"nope"}"#).unwrap();
        ndjson::append_line(&path, "garbage").unwrap();
        ndjson::append_line(
            &path,
            r#"{"journal_seq":5,"ts":1,"command":{"name":"start_kickoff","data":{}}}"#,
        )
        .unwrap();

        let mut reopened = CommandJournal::new(Some(path));
        let load = reopened.load().unwrap();
        let seqs: Vec<u64> = load.records.iter().map(|record| record.journal_seq).collect();
        assert_eq!(seqs, vec![1, 2, 5]);
        assert_eq!(load.skipped_lines, 3);
        assert_eq!(load.records[0].context.as_ref().unwrap().in_reply_to, "msg_1");
        assert_eq!(reopened.next_seq(), 6);
    }
}
