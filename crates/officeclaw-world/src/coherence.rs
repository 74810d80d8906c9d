//! Referential coherence check over a world snapshot.
//!
//! Used after boot-time restoration and by tests: every reference from
//! one entity to another must resolve, and decor ids must be unique.

use std::collections::HashSet;

use serde::Serialize;

use officeclaw_types::WorldSnapshot;

/// Result of a coherence check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoherenceReport {
    /// Whether no issue was found.
    pub ok: bool,
    /// Human-readable issues in discovery order.
    pub issues: Vec<String>,
}

/// Check every cross-entity reference in `snapshot`.
pub fn validate_snapshot_coherence(snapshot: &WorldSnapshot) -> CoherenceReport {
    let project_ids: HashSet<&str> = snapshot
        .projects
        .iter()
        .map(|p| p.project_id.as_str())
        .collect();
    let task_ids: HashSet<&str> = snapshot.tasks.iter().map(|t| t.task_id.as_str()).collect();
    let agent_ids: HashSet<&str> = snapshot
        .agents
        .iter()
        .map(|a| a.agent_id.as_str())
        .collect();
    let mut issues = Vec::new();

    for task in &snapshot.tasks {
        if !project_ids.contains(task.project_id.as_str()) {
            issues.push(format!(
                "task {} references missing project {}",
                task.task_id, task.project_id
            ));
        }
        if let Some(assignee) = &task.assignee
            && !agent_ids.contains(assignee.as_str())
        {
            issues.push(format!(
                "task {} assignee missing agent {assignee}",
                task.task_id
            ));
        }
    }

    for agent in &snapshot.agents {
        if let Some(task_id) = &agent.task_id
            && !task_ids.contains(task_id.as_str())
        {
            issues.push(format!(
                "agent {} references missing task {task_id}",
                agent.agent_id
            ));
        }
    }

    for artifact in &snapshot.artifacts {
        if !project_ids.contains(artifact.project_id.as_str()) {
            issues.push(format!(
                "artifact {} references missing project {}",
                artifact.artifact_id, artifact.project_id
            ));
        }
        if let Some(task_id) = &artifact.task_id
            && !task_ids.contains(task_id.as_str())
        {
            issues.push(format!(
                "artifact {} references missing task {task_id}",
                artifact.artifact_id
            ));
        }
    }

    for decision in &snapshot.decisions {
        if !project_ids.contains(decision.project_id.as_str()) {
            issues.push(format!(
                "decision {} references missing project {}",
                decision.decision_id, decision.project_id
            ));
        }
        if let Some(task_id) = &decision.task_id
            && !task_ids.contains(task_id.as_str())
        {
            issues.push(format!(
                "decision {} references missing task {task_id}",
                decision.decision_id
            ));
        }
    }

    let mut seen_decor = HashSet::new();
    for decor in &snapshot.office_decor {
        let decor_id = decor.decor_id.as_str().trim();
        let label = if decor_id.is_empty() { "<unknown>" } else { decor.decor_id.as_str() };
        if decor_id.is_empty() {
            issues.push(String::from("office_decor row missing decor_id"));
        } else if !seen_decor.insert(decor.decor_id.as_str()) {
            issues.push(format!("office_decor duplicate decor_id {}", decor.decor_id));
        }
        if decor.anchor_id.trim().is_empty() {
            issues.push(format!("office_decor {label} missing anchor_id"));
        }
        if !project_ids.contains(decor.project_id.as_str()) {
            issues.push(format!(
                "office_decor {label} references missing project {}",
                decor.project_id
            ));
        }
        if !project_ids.contains(decor.unlocked_by_project_id.as_str()) {
            issues.push(format!(
                "office_decor {label} references missing unlocked_by_project_id {}",
                decor.unlocked_by_project_id
            ));
        }
    }

    CoherenceReport {
        ok: issues.is_empty(),
        issues,
    }
}
