//! Cross-entity lifecycle rules.
//!
//! Commands, events and ticks all funnel through these helpers so that
//! agent FSMs, task status, decision blockers, background runs and derived
//! project status stay consistent with each other.

use std::collections::BTreeSet;

use tracing::debug;

use officeclaw_types::{
    Agent, AgentId, AgentState, Artifact, ArtifactId, ArtifactStatus, Decision, DecisionId,
    DecisionStatus, DecorId, DecorOutcome, OfficeDecor, OverrideKind, ProjectId, ProjectStatus,
    RunId, RunStatus, Task, TaskId, TaskStatus,
};

use crate::artifact::{self, next_revision};
use crate::decision::{CHANGE_REQUEST_OPTIONS, clip_prompt};
use crate::decor::{PREFERRED_ANCHOR_GROUP, choose_anchor, sanitize_id_token};
use crate::fsm::AgentRuntime;
use crate::run::{self, RunRecord};
use crate::store::{TaskRuntime, WorldStore, bump};

/// Ticks a kickoff meeting holds its participants.
pub const KICKOFF_TICKS: u32 = 2;
/// Ticks a review meeting holds its participants.
pub const REVIEW_TICKS: u32 = 2;

/// Agent state implied by a task's status.
pub fn target_state_for_task(task: Option<&Task>) -> AgentState {
    match task.map(|task| task.status) {
        Some(TaskStatus::Blocked) => AgentState::BlockedWaiting,
        Some(TaskStatus::Planned) => AgentState::WalkingToPoi,
        Some(TaskStatus::InProgress) => AgentState::WorkingAtPoi,
        Some(TaskStatus::Done | TaskStatus::Cancelled) | None => AgentState::IdleAtHome,
    }
}

impl WorldStore {
    // ---- Agents ----

    /// Create an idle agent at the origin unless it already exists.
    pub(crate) fn ensure_agent(&mut self, agent_id: &AgentId) {
        if !self.agents.contains_key(agent_id) {
            debug!(agent_id = %agent_id, "Agent spawned on demand");
            self.agents.insert(
                agent_id.clone(),
                Agent {
                    agent_id: agent_id.clone(),
                    state: AgentState::IdleAtHome,
                    pos: [0.0; 3],
                    task_id: None,
                    facing: None,
                },
            );
        }
        self.agent_runtime
            .entry(agent_id.clone())
            .or_insert_with(AgentRuntime::spawned);
    }

    fn sync_agent_state(&mut self, agent_id: &AgentId) {
        if let (Some(agent), Some(runtime)) = (
            self.agents.get_mut(agent_id),
            self.agent_runtime.get(agent_id),
        ) {
            agent.state = runtime.effective_state();
        }
    }

    /// Move an agent's base state, keeping its visible state in sync.
    pub(crate) fn transition_agent(
        &mut self,
        agent_id: &AgentId,
        next: AgentState,
        reason: &str,
    ) -> bool {
        self.ensure_agent(agent_id);
        let applied = self
            .agent_runtime
            .get_mut(agent_id)
            .is_some_and(|runtime| runtime.transition(next, reason));
        self.sync_agent_state(agent_id);
        applied
    }

    /// Task id the agent currently holds.
    pub(crate) fn agent_task(&self, agent_id: &AgentId) -> Option<TaskId> {
        self.agents.get(agent_id).and_then(|a| a.task_id.clone())
    }

    pub(crate) fn set_agent_task(&mut self, agent_id: &AgentId, task_id: Option<TaskId>) {
        if let Some(agent) = self.agents.get_mut(agent_id) {
            agent.task_id = task_id;
        }
    }

    pub(crate) fn agent_holds(&self, agent_id: &AgentId, task_id: &TaskId) -> bool {
        self.agents
            .get(agent_id)
            .is_some_and(|a| a.task_id.as_ref() == Some(task_id))
    }

    /// Count every override down by one tick.
    pub(crate) fn decay_overrides(&mut self) {
        let agent_ids: Vec<AgentId> = self.agents.keys().cloned().collect();
        for agent_id in &agent_ids {
            if let Some(runtime) = self.agent_runtime.get_mut(agent_id)
                && !runtime.overrides().is_empty()
            {
                runtime.decay_overrides();
                self.sync_agent_state(agent_id);
            }
        }
    }

    // ---- Ceremonies ----

    /// Sorted assignees of the project's tasks, else every agent.
    fn participants(&self, project_id: &ProjectId) -> Vec<AgentId> {
        let assignees: BTreeSet<AgentId> = self
            .tasks
            .values()
            .filter(|task| task.project_id == *project_id)
            .filter_map(|task| task.assignee.clone())
            .collect();
        if assignees.is_empty() {
            self.agents.keys().cloned().collect()
        } else {
            assignees.into_iter().collect()
        }
    }

    /// Pull every project participant into a meeting.
    pub(crate) fn apply_ceremony(&mut self, project_id: &ProjectId, kind: OverrideKind) {
        let ticks = match kind {
            OverrideKind::Kickoff => KICKOFF_TICKS,
            OverrideKind::Review => REVIEW_TICKS,
        };
        let participants = self.participants(project_id);
        debug!(
            project_id = %project_id,
            kind = kind.as_str(),
            participants = participants.len(),
            "Ceremony started"
        );
        for agent_id in &participants {
            self.ensure_agent(agent_id);
            if let Some(runtime) = self.agent_runtime.get_mut(agent_id) {
                runtime.push_override(kind, AgentState::InMeeting, ticks, project_id.as_str());
            }
            self.sync_agent_state(agent_id);
        }
    }

    // ---- Tasks ----

    pub(crate) fn task_runtime_mut(&mut self, task_id: &TaskId) -> &mut TaskRuntime {
        self.task_runtime.entry(task_id.clone()).or_default()
    }

    pub(crate) fn set_task_transition(&mut self, task_id: &TaskId, reason: &str) {
        reason.clone_into(&mut self.task_runtime_mut(task_id).last_transition);
    }

    /// Agent state for an assigned task; decision-blocked tasks send their
    /// agent to seek the user.
    pub(crate) fn target_state_for_assigned(&self, task: &Task) -> AgentState {
        if task.status == TaskStatus::Blocked && self.decision_blockers.contains_key(&task.task_id)
        {
            AgentState::SeekingUserDecision
        } else {
            target_state_for_task(Some(task))
        }
    }

    /// Mark a task done, close its run and release its agent.
    pub(crate) fn complete_task(&mut self, task_id: &TaskId) {
        let Some(task) = self
            .tasks
            .get_mut(task_id)
            .filter(|task| !task.status.is_terminal())
        else {
            return;
        };
        task.status = TaskStatus::Done;
        let project_id = task.project_id.clone();
        let assignee = task.assignee.clone();
        let runtime = self.task_runtime_mut(task_id);
        "done".clone_into(&mut runtime.last_transition);
        runtime.progress_bucket = 10;
        self.finish_active_run(task_id, RunStatus::Completed, "task_done");
        if let Some(agent_id) = assignee
            && self.agent_holds(&agent_id, task_id)
        {
            self.set_agent_task(&agent_id, None);
            self.transition_agent(&agent_id, AgentState::IdleAtHome, "task_done");
        }
        self.refresh_project_status(&project_id);
    }

    /// Release whatever task the agent holds.
    pub(crate) fn unassign_agent_task(&mut self, agent_id: &AgentId) {
        let Some(prior_id) = self.agent_task(agent_id) else {
            return;
        };
        let releasable = self.tasks.get(&prior_id).is_some_and(|task| {
            task.assignee.as_ref() == Some(agent_id) && !task.status.is_terminal()
        });
        if releasable {
            self.interrupt_run(&prior_id, "unassigned");
            let mut project_id = None;
            if let Some(task) = self.tasks.get_mut(&prior_id) {
                task.assignee = None;
                if task.status != TaskStatus::Blocked {
                    task.status = TaskStatus::Planned;
                }
                project_id = Some(task.project_id.clone());
            }
            self.set_task_transition(&prior_id, "unassigned");
            if let Some(project_id) = project_id {
                self.refresh_project_status(&project_id);
            }
        }
        self.set_agent_task(agent_id, None);
        self.transition_agent(agent_id, AgentState::IdleAtHome, "unassign");
    }

    /// Hand a task to an agent.
    ///
    /// The previous assignee and the agent's previous task are released
    /// first. Unless `preserve_status` is set the task restarts as planned
    /// with its progress reset.
    pub(crate) fn assign_task_to_agent(
        &mut self,
        task_id: &TaskId,
        agent_id: &AgentId,
        preserve_status: bool,
        reason: &str,
    ) {
        self.ensure_agent(agent_id);
        let prior_assignee = self
            .tasks
            .get(task_id)
            .and_then(|task| task.assignee.clone())
            .filter(|prior| prior != agent_id);
        if let Some(prior) = prior_assignee
            && self.agent_holds(&prior, task_id)
        {
            self.set_agent_task(&prior, None);
            self.transition_agent(&prior, AgentState::IdleAtHome, "reassigned");
        }
        if self
            .agent_task(agent_id)
            .is_some_and(|held| held != *task_id)
        {
            self.unassign_agent_task(agent_id);
        }

        let Some(task) = self.tasks.get_mut(task_id) else {
            return;
        };
        task.assignee = Some(agent_id.clone());
        if !preserve_status && !task.status.is_terminal() {
            task.status = TaskStatus::Planned;
        }
        let project_id = task.project_id.clone();
        let runtime = self.task_runtime_mut(task_id);
        if !preserve_status {
            runtime.ticks_in_progress = 0;
            runtime.progress_bucket = 0;
        }
        reason.clone_into(&mut runtime.last_transition);

        self.set_agent_task(agent_id, Some(task_id.clone()));
        let target = self
            .tasks
            .get(task_id)
            .map_or(AgentState::IdleAtHome, |task| self.target_state_for_assigned(task));
        self.transition_agent(agent_id, target, reason);
        self.refresh_project_status(&project_id);
        debug!(task_id = %task_id, agent_id = %agent_id, reason, "Task assigned");
    }

    // ---- Decisions ----

    /// Append a decision transition with the next global sequence number.
    pub(crate) fn record_decision(
        &mut self,
        decision_id: &DecisionId,
        status: DecisionStatus,
        reason: &str,
        choice: Option<&str>,
    ) {
        let seq = bump(&mut self.counters.decision_seq);
        self.decision_runtime
            .entry(decision_id.clone())
            .or_default()
            .record(seq, status, reason, choice);
    }

    /// First open decision linked to the task.
    pub(crate) fn open_decision_for_task(&self, task_id: &TaskId) -> Option<DecisionId> {
        self.decisions
            .values()
            .find(|d| d.status == DecisionStatus::Open && d.task_id.as_ref() == Some(task_id))
            .map(|d| d.decision_id.clone())
    }

    /// Open a change-request decision that blocks the task.
    pub(crate) fn create_decision_for_task(
        &mut self,
        task_id: &TaskId,
        instructions: &str,
    ) -> Option<DecisionId> {
        let project_id = self.tasks.get(task_id)?.project_id.clone();
        let counter = bump(&mut self.counters.generated_decision);
        let decision_id = DecisionId::new(format!("dec_req_{counter:03}"));
        self.decisions.insert(
            decision_id.clone(),
            Decision {
                decision_id: decision_id.clone(),
                project_id,
                task_id: Some(task_id.clone()),
                status: DecisionStatus::Open,
                prompt: clip_prompt(instructions),
                options: CHANGE_REQUEST_OPTIONS.iter().map(|o| (*o).to_owned()).collect(),
                choice: None,
            },
        );
        self.decision_runtime
            .entry(decision_id.clone())
            .or_default()
            .blocked_task_ids
            .insert(task_id.clone());
        self.decision_blockers
            .insert(task_id.clone(), decision_id.clone());
        self.record_decision(&decision_id, DecisionStatus::Open, "request_changes", None);
        Some(decision_id)
    }

    /// Block a task on a decision and send its agent to seek the user.
    pub(crate) fn block_task_for_decision(&mut self, task_id: &TaskId, decision_id: &DecisionId) {
        let Some(task) = self.tasks.get(task_id) else {
            return;
        };
        if task.status.is_terminal() {
            return;
        }
        let prior = task.status;
        self.blocked_prior_status
            .entry(task_id.clone())
            .or_insert(prior);
        let mut assignee = None;
        let mut project_id = None;
        if let Some(task) = self.tasks.get_mut(task_id) {
            task.status = TaskStatus::Blocked;
            assignee = task.assignee.clone();
            project_id = Some(task.project_id.clone());
        }
        self.set_task_transition(task_id, "blocked");
        self.interrupt_run(task_id, "decision_requested");
        self.decision_blockers
            .insert(task_id.clone(), decision_id.clone());
        self.decision_runtime
            .entry(decision_id.clone())
            .or_default()
            .blocked_task_ids
            .insert(task_id.clone());
        if let Some(agent_id) = assignee {
            self.ensure_agent(&agent_id);
            self.set_agent_task(&agent_id, Some(task_id.clone()));
            self.transition_agent(&agent_id, AgentState::SeekingUserDecision, "decision_requested");
        }
        if let Some(project_id) = project_id {
            self.refresh_project_status(&project_id);
        }
    }

    /// Resume every task blocked on the decision. Returns the resumed ids.
    pub(crate) fn unblock_tasks_for_decision(&mut self, decision_id: &DecisionId) -> Vec<TaskId> {
        let mut blocked: BTreeSet<TaskId> = self
            .decision_runtime
            .get(decision_id)
            .map(|runtime| runtime.blocked_task_ids.clone())
            .unwrap_or_default();
        blocked.extend(
            self.decision_blockers
                .iter()
                .filter(|(_, blocker)| *blocker == decision_id)
                .map(|(task_id, _)| task_id.clone()),
        );

        let mut resumed = Vec::new();
        for task_id in blocked {
            let prior = self.blocked_prior_status.remove(&task_id);
            self.decision_blockers.remove(&task_id);
            let Some(task) = self.tasks.get_mut(&task_id) else {
                continue;
            };
            if task.status != TaskStatus::Blocked {
                continue;
            }
            task.status = if prior == Some(TaskStatus::Planned) || task.assignee.is_none() {
                TaskStatus::Planned
            } else {
                TaskStatus::InProgress
            };
            let assignee = task.assignee.clone();
            let project_id = task.project_id.clone();
            let target = target_state_for_task(Some(&*task));
            if let Some(agent_id) = assignee {
                self.transition_agent(&agent_id, target, "decision_resolved");
            }
            self.set_task_transition(&task_id, "unblocked");
            self.refresh_project_status(&project_id);
            resumed.push(task_id);
        }

        if let Some(runtime) = self.decision_runtime.get_mut(decision_id) {
            runtime.blocked_task_ids.clear();
        }
        resumed
    }

    /// Cancel the task's open decisions and drop its blocker.
    pub(crate) fn cancel_open_decisions_for_task(&mut self, task_id: &TaskId) {
        let open: Vec<DecisionId> = self
            .decisions
            .values()
            .filter(|d| d.status == DecisionStatus::Open && d.task_id.as_ref() == Some(task_id))
            .map(|d| d.decision_id.clone())
            .collect();
        for decision_id in &open {
            if let Some(decision) = self.decisions.get_mut(decision_id) {
                decision.status = DecisionStatus::Cancelled;
            }
            self.record_decision(decision_id, DecisionStatus::Cancelled, "cancel_task", None);
            if let Some(runtime) = self.decision_runtime.get_mut(decision_id) {
                runtime.blocked_task_ids.remove(task_id);
            }
        }
        self.decision_blockers.remove(task_id);
        self.blocked_prior_status.remove(task_id);
    }

    // ---- Background runs ----

    /// Record a run transition if it is legal. Returns whether it applied.
    pub(crate) fn record_run(&mut self, task_id: &TaskId, status: RunStatus, reason: &str) -> bool {
        let Some(current) = self.runs.get(task_id).map(|run| run.status) else {
            return false;
        };
        if !run::can_transition(current, status) {
            return false;
        }
        let seq = bump(&mut self.counters.run_seq);
        let tick = self.tick;
        if let Some(run) = self.runs.get_mut(task_id) {
            run.record(seq, status, reason, tick);
        }
        true
    }

    pub(crate) fn has_active_run(&self, task_id: &TaskId) -> bool {
        self.runs.get(task_id).is_some_and(RunRecord::is_active)
    }

    /// Move the task's active run to a terminal status.
    pub(crate) fn finish_active_run(&mut self, task_id: &TaskId, status: RunStatus, reason: &str) {
        if self.has_active_run(task_id) {
            self.record_run(task_id, status, reason);
        }
    }

    /// Cancel the task's active run.
    pub(crate) fn interrupt_run(&mut self, task_id: &TaskId, reason: &str) {
        self.finish_active_run(task_id, RunStatus::Cancelled, reason);
    }

    /// Dispatch a run for an in-progress task unless one is active.
    pub(crate) fn start_run(&mut self, task_id: &TaskId, agent_id: &AgentId) {
        let Some(task) = self.tasks.get(task_id) else {
            return;
        };
        if task.status != TaskStatus::InProgress || self.has_active_run(task_id) {
            return;
        }
        let counter = bump(&mut self.counters.run);
        let run_id = RunId::new(format!("run_oc_{counter:04}"));
        self.runs.insert(
            task_id.clone(),
            RunRecord {
                run_id: run_id.clone(),
                project_id: task.project_id.clone(),
                task_id: task_id.clone(),
                agent_id: agent_id.clone(),
                status: RunStatus::Started,
                started_tick: self.tick,
                updated_tick: self.tick,
                history: Vec::new(),
            },
        );
        self.record_run(task_id, RunStatus::Started, "working_at_poi");
        debug!(run_id = %run_id, task_id = %task_id, agent_id = %agent_id, "Background run started");
    }

    // ---- Projects ----

    /// Re-derive a project's status from its tasks.
    pub(crate) fn refresh_project_status(&mut self, project_id: &ProjectId) {
        let (mut any, mut all_terminal, mut any_in_progress, mut any_blocked) =
            (false, true, false, false);
        for task in self.tasks.values().filter(|t| t.project_id == *project_id) {
            any = true;
            all_terminal &= task.status.is_terminal();
            any_in_progress |= task.status == TaskStatus::InProgress;
            any_blocked |= task.status == TaskStatus::Blocked;
        }
        let next = if !any {
            ProjectStatus::Planning
        } else if all_terminal {
            ProjectStatus::Completed
        } else if self.paused_projects.contains(project_id) || (!any_in_progress && any_blocked) {
            ProjectStatus::Blocked
        } else if any_in_progress {
            ProjectStatus::Executing
        } else {
            ProjectStatus::Planning
        };
        let Some(project) = self.projects.get_mut(project_id) else {
            return;
        };
        let prior = project.status;
        project.status = next;
        if next == ProjectStatus::Completed && prior != ProjectStatus::Completed {
            debug!(project_id = %project_id, "Project completed");
            self.ensure_project_decor(project_id);
        }
    }

    fn project_outcome(&self, project_id: &ProjectId) -> DecorOutcome {
        if self
            .artifacts
            .values()
            .any(|a| a.project_id == *project_id && a.status == ArtifactStatus::Approved)
        {
            DecorOutcome::ArtifactApproved
        } else if self
            .decisions
            .values()
            .any(|d| d.project_id == *project_id && d.status == DecisionStatus::Resolved)
        {
            DecorOutcome::DecisionResolved
        } else {
            DecorOutcome::Completed
        }
    }

    /// Place the decor item unlocked by a completed project, once.
    fn ensure_project_decor(&mut self, project_id: &ProjectId) {
        let completed = self
            .projects
            .get(project_id)
            .is_some_and(|p| p.status == ProjectStatus::Completed);
        let unlocked = self
            .decor
            .values()
            .any(|d| d.unlocked_by_project_id == *project_id || d.project_id == *project_id);
        if !completed || unlocked {
            return;
        }

        let outcome = self.project_outcome(project_id);
        let scene_id = self.scene_id.clone();
        let anchors = self.scene_decor_anchors(&scene_id);
        let occupied: BTreeSet<String> = self
            .decor
            .values()
            .map(|d| d.anchor_id.trim())
            .filter(|anchor| !anchor.is_empty())
            .map(str::to_owned)
            .collect();
        let Some(anchor_id) =
            choose_anchor(&anchors, project_id.as_str(), PREFERRED_ANCHOR_GROUP, &occupied)
        else {
            return;
        };

        let base = format!(
            "{}_{}",
            outcome.decor_prefix(),
            sanitize_id_token(project_id.as_str(), "project")
        );
        let mut decor_id = DecorId::new(base.clone());
        let mut suffix: u64 = 2;
        while self.decor.contains_key(&decor_id) {
            decor_id = DecorId::new(format!("{base}_{suffix}"));
            suffix = suffix.saturating_add(1);
        }
        debug!(decor_id = %decor_id, anchor_id = %anchor_id, "Decor unlocked");
        self.decor.insert(
            decor_id.clone(),
            OfficeDecor {
                decor_id,
                project_id: project_id.clone(),
                anchor_id,
                unlocked_by_project_id: project_id.clone(),
                outcome,
            },
        );
    }

    // ---- Artifacts ----

    /// Transition an artifact if the move is legal.
    pub(crate) fn transition_artifact(&mut self, artifact_id: &ArtifactId, to: ArtifactStatus) -> bool {
        self.artifacts
            .get_mut(artifact_id)
            .is_some_and(|artifact| artifact::transition(artifact, to))
    }

    /// Create the next delivered revision of `source_id`.
    pub(crate) fn create_revision(&mut self, source_id: &ArtifactId) -> Option<ArtifactId> {
        let source = self.artifacts.get(source_id)?;
        let (artifact_id, version) = next_revision(source, &self.artifacts);
        let mut revision = Artifact {
            artifact_id: artifact_id.clone(),
            project_id: source.project_id.clone(),
            artifact_type: source.artifact_type.clone(),
            status: ArtifactStatus::Created,
            version,
            task_id: source.task_id.clone(),
            poi_id: source.poi_id.clone(),
        };
        artifact::transition(&mut revision, ArtifactStatus::Delivered);
        self.artifacts.insert(artifact_id.clone(), revision);
        Some(artifact_id)
    }

    /// Supersede older versions of the same project, task and type.
    pub(crate) fn supersede_siblings(&mut self, reference_id: &ArtifactId) {
        let Some(reference) = self.artifacts.get(reference_id).cloned() else {
            return;
        };
        if reference.task_id.is_none() {
            return;
        }
        for artifact in self.artifacts.values_mut() {
            if artifact.artifact_id != reference.artifact_id
                && artifact.project_id == reference.project_id
                && artifact.task_id == reference.task_id
                && artifact.artifact_type == reference.artifact_type
                && artifact.version < reference.version
            {
                artifact::transition(artifact, ArtifactStatus::Superseded);
            }
        }
    }
}
