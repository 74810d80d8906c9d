//! State restoration from the command journal.
//!
//! On boot every journaled command is re-applied to a fresh world in
//! `journal_seq` order. If any command succeeded the world is ticked once
//! so derived state (agent motion, background runs) catches up. The result
//! is checked for cross-entity coherence; any rejected replay or coherence
//! issue keeps the command gate closed for the life of the process.

use serde::Serialize;
use tracing::{error, info, warn};

use officeclaw_events::{CommandJournal, JournalError};

use crate::simulation::Simulation;

/// Errors raised while restoring.
#[derive(Debug, thiserror::Error)]
pub enum RestorationError {
    /// The journal could not be read.
    #[error("failed to load command journal: {source}")]
    Journal {
        /// Underlying journal error.
        #[from]
        source: JournalError,
    },
}

/// Outcome of the restoration pass, reported on the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestorationStatus {
    /// Whether restoration has run.
    pub ready: bool,
    /// Whether the restored world passed every check.
    pub consistency_ok: bool,
    /// Issues found by the coherence check.
    pub consistency_issues: Vec<String>,
    /// Journal path, if journaling is enabled.
    pub command_journal_path: Option<String>,
    /// Seq the next journal record will receive.
    pub next_journal_seq: u64,
    /// Valid records read from the journal.
    pub loaded_records: usize,
    /// Malformed journal lines ignored.
    pub skipped_lines: usize,
    /// Records the world accepted again.
    pub replayed_ok: usize,
    /// Records the world rejected on replay.
    pub replayed_rejected: usize,
    /// Reconciliation ticks run after replay.
    pub reconciled_ticks: u32,
}

impl RestorationStatus {
    /// Status before restoration has run; commands are refused.
    pub const fn pending() -> Self {
        Self {
            ready: false,
            consistency_ok: true,
            consistency_issues: Vec::new(),
            command_journal_path: None,
            next_journal_seq: 1,
            loaded_records: 0,
            skipped_lines: 0,
            replayed_ok: 0,
            replayed_rejected: 0,
            reconciled_ticks: 0,
        }
    }

    /// Whether the command gate is open.
    pub const fn can_accept_commands(&self) -> bool {
        self.ready && self.consistency_ok
    }
}

/// Replay `journal` into `simulation` and evaluate the gate.
pub fn restore(
    simulation: &mut Simulation,
    journal: &mut CommandJournal,
) -> Result<RestorationStatus, RestorationError> {
    let load = journal.load()?;
    let mut status = RestorationStatus {
        command_journal_path: journal.path().map(|path| path.display().to_string()),
        loaded_records: load.records.len(),
        skipped_lines: load.skipped_lines,
        ..RestorationStatus::pending()
    };

    for record in &load.records {
        let outcome = simulation.apply_command(&record.command);
        if outcome.ok {
            status.replayed_ok = status.replayed_ok.saturating_add(1);
        } else {
            status.replayed_rejected = status.replayed_rejected.saturating_add(1);
            warn!(
                journal_seq = record.journal_seq,
                code = ?outcome.code,
                message = outcome.message.as_deref().unwrap_or_default(),
                "Journaled command rejected on replay"
            );
        }
    }

    if status.replayed_ok > 0 {
        simulation.tick();
        status.reconciled_ticks = 1;
    }

    let coherence = simulation.validate_snapshot();
    status.consistency_ok = coherence.ok && status.replayed_rejected == 0;
    status.consistency_issues = coherence.issues;
    status.next_journal_seq = journal.next_seq();
    status.ready = true;

    if status.consistency_ok {
        info!(
            loaded_records = status.loaded_records,
            replayed_ok = status.replayed_ok,
            next_journal_seq = status.next_journal_seq,
            "State restored from command journal"
        );
    } else {
        error!(
            replayed_rejected = status.replayed_rejected,
            issues = ?status.consistency_issues,
            "State restoration failed consistency checks; commands will be refused"
        );
    }
    Ok(status)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use officeclaw_nav::StaticSceneLoader;
    use officeclaw_types::TaskStatus;
    use officeclaw_world::WorldStore;
    use serde_json::json;

    use super::*;

    fn simulation() -> Simulation {
        let world = WorldStore::new("cozy_office_v0", Arc::new(StaticSceneLoader::empty()));
        Simulation::new(world, 10.0)
    }

    fn temp_journal() -> PathBuf {
        std::env::temp_dir()
            .join(format!("officeclaw-restore-{}", uuid::Uuid::new_v4()))
            .join("commands.jsonl")
    }

    #[test]
    fn pending_status_refuses_commands() {
        assert!(!RestorationStatus::pending().can_accept_commands());
    }

    #[test]
    fn empty_journal_opens_the_gate_without_ticking() {
        let mut sim = simulation();
        let mut journal = CommandJournal::new(None);
        let status = restore(&mut sim, &mut journal).unwrap();
        assert!(status.ready);
        assert!(status.can_accept_commands());
        assert_eq!(status.reconciled_ticks, 0);
        assert_eq!(sim.stats().tick_count, 0);
        assert_eq!(status.command_journal_path, None);
    }

    #[test]
    fn journaled_commands_rebuild_the_world() {
        let path = temp_journal();
        let mut writer = CommandJournal::new(Some(path.clone()));
        writer
            .append(
                json!({"name": "assign_task", "data": {"task_id": "task_copy", "agent_id": "agent_eng_1"}}),
                None,
            )
            .unwrap();

        let mut sim = simulation();
        let mut journal = CommandJournal::new(Some(path));
        let status = restore(&mut sim, &mut journal).unwrap();
        assert!(status.can_accept_commands());
        assert_eq!(status.loaded_records, 1);
        assert_eq!(status.replayed_ok, 1);
        assert_eq!(status.reconciled_ticks, 1);
        assert_eq!(status.next_journal_seq, 2);
        assert_eq!(
            sim.world().task("task_copy").map(|task| task.status),
            Some(TaskStatus::InProgress)
        );
    }

    #[test]
    fn rejected_replay_closes_the_gate() {
        let path = temp_journal();
        let mut writer = CommandJournal::new(Some(path.clone()));
        writer
            .append(json!({"name": "assign_task", "data": {"task_id": "task_missing", "agent_id": "agent_eng_1"}}), None)
            .unwrap();

        let mut sim = simulation();
        let mut journal = CommandJournal::new(Some(path));
        let status = restore(&mut sim, &mut journal).unwrap();
        assert!(status.ready);
        assert!(!status.consistency_ok);
        assert!(!status.can_accept_commands());
        assert_eq!(status.replayed_rejected, 1);
        assert_eq!(status.reconciled_ticks, 0);
    }
}
