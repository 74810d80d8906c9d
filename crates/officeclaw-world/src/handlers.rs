//! Command handlers.
//!
//! Every command is validated in full before the first mutation, so a
//! rejected command leaves the world untouched. The one exception is
//! `move_player_to`, which records the blocked plan it rejects.

use serde_json::Value;
use tracing::debug;

use officeclaw_nav::{PathOptions, find_path};
use officeclaw_types::{
    AgentId, AgentState, ArtifactId, ArtifactStatus, CommandOutcome, CommandPayload, DecisionId,
    DecisionStatus, ErrorCode, OverrideKind, Project, ProjectId, ProjectStatus, Task, TaskId,
    TaskStatus, Vec3,
};

use crate::command::WorldCommand;
use crate::navigation::MovePlan;
use crate::store::{PLAYER_AGENT_ID, WorldStore, bump};
use crate::text::{MAX_TITLE_CHARS, decompose_request_text, normalize_task_title};

fn reject(code: ErrorCode, message: impl Into<String>) -> CommandOutcome {
    CommandOutcome::rejected(code, message)
}

fn guard_matches(expected: Option<&str>, actual: &str) -> bool {
    expected.is_none_or(|expected| expected == actual)
}

impl WorldStore {
    /// Apply a raw `{name, data}` JSON command.
    pub fn apply_raw_command(&mut self, raw: &Value) -> CommandOutcome {
        match CommandPayload::from_value(raw) {
            Some(payload) => self.apply_command(&payload),
            None => reject(
                ErrorCode::ValidationFailed,
                "command payload requires {name,data}",
            ),
        }
    }

    /// Apply one command.
    pub fn apply_command(&mut self, payload: &CommandPayload) -> CommandOutcome {
        let outcome = match WorldCommand::parse(payload) {
            Ok(command) => self.execute(command),
            Err(rejection) => rejection,
        };
        if outcome.is_ok() {
            debug!(command = %payload.name, tick = self.tick, "Command applied");
        } else {
            debug!(
                command = %payload.name,
                code = ?outcome.code,
                message = outcome.message.as_deref().unwrap_or_default(),
                "Command rejected"
            );
        }
        outcome
    }

    /// Apply an already parsed command.
    pub fn execute(&mut self, command: WorldCommand) -> CommandOutcome {
        match command {
            WorldCommand::SubmitRequest { text } => self.submit_request(&text),
            WorldCommand::AssignTask { task_id, agent_id } => self.assign_task(&task_id, &agent_id),
            WorldCommand::AutoAssign { project_id } => self.auto_assign(&project_id),
            WorldCommand::ResolveDecision {
                decision_id,
                choice,
            } => self.resolve_decision(&decision_id, &choice),
            WorldCommand::ApproveArtifact { artifact_id } => self.approve_artifact(&artifact_id),
            WorldCommand::RequestChanges {
                artifact_id,
                instructions,
            } => self.request_changes(&artifact_id, &instructions),
            WorldCommand::SplitIntoTasks {
                artifact_id,
                task_titles,
            } => self.split_into_tasks(&artifact_id, &task_titles),
            WorldCommand::PlayerPos { pos, facing } => self.player_pos(pos, facing),
            WorldCommand::MovePlayerTo { pos } => self.move_player_to(pos),
            WorldCommand::StartKickoff { project_id } => self.start_kickoff(project_id),
            WorldCommand::ReassignTask {
                task_id,
                to_agent_id,
                from_agent_id,
                expected_task_status,
            } => self.reassign_task(
                &task_id,
                &to_agent_id,
                from_agent_id.as_ref(),
                expected_task_status.as_deref(),
            ),
            WorldCommand::CancelTask {
                task_id,
                expected_task_status,
            } => self.cancel_task(&task_id, expected_task_status.as_deref()),
            WorldCommand::PauseProject {
                project_id,
                expected_project_status,
            } => self.set_project_paused(&project_id, expected_project_status.as_deref(), true),
            WorldCommand::ResumeProject {
                project_id,
                expected_project_status,
            } => self.set_project_paused(&project_id, expected_project_status.as_deref(), false),
            WorldCommand::RerunTask {
                source_task_id,
                reason,
                constraints_patch,
            } => self.rerun_task(&source_task_id, reason, constraints_patch),
        }
    }

    // ---- Requests and assignment ----

    fn submit_request(&mut self, text: &str) -> CommandOutcome {
        let counter = bump(&mut self.counters.request);
        let project_id = ProjectId::new(format!("proj_req_{counter:03}"));
        self.projects.insert(
            project_id.clone(),
            Project {
                project_id: project_id.clone(),
                title: text.chars().take(MAX_TITLE_CHARS).collect(),
                status: ProjectStatus::Planning,
            },
        );
        for (index, title) in decompose_request_text(text).into_iter().enumerate() {
            let task_id = TaskId::new(format!(
                "task_req_{counter:03}_{:02}",
                index.saturating_add(1)
            ));
            self.tasks.insert(
                task_id.clone(),
                Task::new(task_id.clone(), project_id.clone(), title, TaskStatus::Planned),
            );
            self.task_runtime_mut(&task_id);
        }
        self.refresh_project_status(&project_id);
        CommandOutcome::accepted()
    }

    fn assign_task(&mut self, task_id: &TaskId, agent_id: &AgentId) -> CommandOutcome {
        let Some(task) = self.tasks.get(task_id) else {
            return reject(ErrorCode::NotFound, "task not found");
        };
        if task.status.is_terminal() {
            return reject(ErrorCode::Conflict, "cannot assign terminal task");
        }
        if self.paused_projects.contains(&task.project_id) {
            return reject(ErrorCode::NotAllowed, "project dispatch is paused");
        }
        self.assign_task_to_agent(task_id, agent_id, false, "assigned");
        CommandOutcome::accepted()
    }

    fn auto_assign(&mut self, project_id: &ProjectId) -> CommandOutcome {
        if !self.projects.contains_key(project_id) {
            return reject(ErrorCode::NotFound, "project not found");
        }
        if self.paused_projects.contains(project_id) {
            return reject(ErrorCode::NotAllowed, "project dispatch is paused");
        }
        let idle: Vec<AgentId> = self
            .agents
            .values()
            .filter(|agent| agent.task_id.is_none())
            .map(|agent| agent.agent_id.clone())
            .collect();
        let pending: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|task| {
                task.project_id == *project_id
                    && task.assignee.is_none()
                    && !task.status.is_terminal()
            })
            .map(|task| task.task_id.clone())
            .collect();
        for (agent_id, task_id) in idle.iter().zip(&pending) {
            self.assign_task_to_agent(task_id, agent_id, false, "assigned");
        }
        CommandOutcome::accepted()
    }

    fn reassign_task(
        &mut self,
        task_id: &TaskId,
        to_agent_id: &AgentId,
        from_agent_id: Option<&AgentId>,
        expected_status: Option<&str>,
    ) -> CommandOutcome {
        let Some(task) = self.tasks.get(task_id) else {
            return reject(ErrorCode::NotFound, "task not found");
        };
        if !guard_matches(expected_status, task.status.as_str()) {
            return reject(
                ErrorCode::Conflict,
                "task status no longer matches expected_task_status",
            );
        }
        if from_agent_id.is_some_and(|from| task.assignee.as_ref() != Some(from)) {
            return reject(
                ErrorCode::Conflict,
                "task assignee no longer matches from_agent_id",
            );
        }
        if task.status.is_terminal() {
            return reject(ErrorCode::NotAllowed, "cannot reassign terminal task");
        }
        if task.status == TaskStatus::InProgress {
            return reject(
                ErrorCode::NotAllowed,
                "cannot reassign in_progress task without pause semantics",
            );
        }
        let preserve = task.status == TaskStatus::Blocked;
        self.assign_task_to_agent(task_id, to_agent_id, preserve, "reassign_task");
        CommandOutcome::accepted()
    }

    fn cancel_task(&mut self, task_id: &TaskId, expected_status: Option<&str>) -> CommandOutcome {
        let Some(task) = self.tasks.get_mut(task_id) else {
            return reject(ErrorCode::NotFound, "task not found");
        };
        if !guard_matches(expected_status, task.status.as_str()) {
            return reject(
                ErrorCode::Conflict,
                "task status no longer matches expected_task_status",
            );
        }
        if task.status.is_terminal() {
            return reject(ErrorCode::NotAllowed, "cannot cancel terminal task");
        }
        task.status = TaskStatus::Cancelled;
        let assignee = task.assignee.take();
        let project_id = task.project_id.clone();
        self.set_task_transition(task_id, "cancelled");
        self.interrupt_run(task_id, "cancel_task");
        self.cancel_open_decisions_for_task(task_id);
        if let Some(agent_id) = assignee {
            self.ensure_agent(&agent_id);
            if self.agent_holds(&agent_id, task_id) {
                self.set_agent_task(&agent_id, None);
            }
            self.transition_agent(&agent_id, AgentState::IdleAtHome, "task_cancelled");
        }
        self.refresh_project_status(&project_id);
        CommandOutcome::accepted()
    }

    fn rerun_task(
        &mut self,
        source_task_id: &TaskId,
        reason: Option<String>,
        constraints_patch: Option<Value>,
    ) -> CommandOutcome {
        let Some(source) = self.tasks.get(source_task_id) else {
            return reject(ErrorCode::NotFound, "source task not found");
        };
        if !source.status.is_terminal() {
            return reject(
                ErrorCode::NotAllowed,
                "rerun_task is allowed only for done or cancelled tasks",
            );
        }
        let counter = bump(&mut self.counters.rerun_task);
        let task_id = TaskId::new(format!("task_rerun_{counter:03}"));
        let project_id = source.project_id.clone();
        let mut rerun = Task::new(
            task_id.clone(),
            project_id.clone(),
            format!("{} (rerun)", source.title),
            TaskStatus::Planned,
        );
        rerun.rerun_of_task_id = Some(source.task_id.clone());
        rerun.rerun_reason = reason;
        rerun.constraints_patch = constraints_patch;
        self.tasks.insert(task_id.clone(), rerun);
        self.set_task_transition(&task_id, "rerun_created");
        self.refresh_project_status(&project_id);
        CommandOutcome::accepted()
    }

    // ---- Decisions and review ----

    fn resolve_decision(&mut self, decision_id: &DecisionId, choice: &str) -> CommandOutcome {
        let Some(decision) = self.decisions.get_mut(decision_id) else {
            return reject(ErrorCode::NotFound, "decision not found");
        };
        if decision.status != DecisionStatus::Open {
            return reject(ErrorCode::Conflict, "decision is not open");
        }
        decision.status = DecisionStatus::Resolved;
        decision.choice = Some(choice.to_owned());
        let project_id = decision.project_id.clone();
        let resumed = self.unblock_tasks_for_decision(decision_id);
        self.record_decision(
            decision_id,
            DecisionStatus::Resolved,
            "resolve_decision",
            Some(choice),
        );
        self.decision_runtime
            .entry(decision_id.clone())
            .or_default()
            .resolved_task_ids = resumed;
        self.refresh_project_status(&project_id);
        CommandOutcome::accepted()
    }

    fn approve_artifact(&mut self, artifact_id: &ArtifactId) -> CommandOutcome {
        let Some(artifact) = self.artifacts.get(artifact_id) else {
            return reject(ErrorCode::NotFound, "artifact not found");
        };
        if !artifact.status.is_reviewable() {
            return reject(
                ErrorCode::Conflict,
                "artifact cannot be approved in current state",
            );
        }
        let task_id = artifact.task_id.clone();
        if artifact.status == ArtifactStatus::Delivered {
            self.transition_artifact(artifact_id, ArtifactStatus::InReview);
        }
        if !self.transition_artifact(artifact_id, ArtifactStatus::Approved) {
            return reject(ErrorCode::Conflict, "artifact approval transition rejected");
        }
        self.supersede_siblings(artifact_id);
        if let Some(task_id) = task_id {
            if let Some(project_id) = self.tasks.get(&task_id).map(|t| t.project_id.clone()) {
                self.apply_ceremony(&project_id, OverrideKind::Review);
            }
            self.complete_task(&task_id);
        }
        CommandOutcome::accepted()
    }

    fn request_changes(&mut self, artifact_id: &ArtifactId, instructions: &str) -> CommandOutcome {
        let Some(artifact) = self.artifacts.get(artifact_id) else {
            return reject(ErrorCode::NotFound, "artifact not found");
        };
        if artifact.status == ArtifactStatus::Approved {
            return reject(ErrorCode::Conflict, "cannot request changes after approval");
        }
        if !artifact.status.is_reviewable() {
            return reject(
                ErrorCode::Conflict,
                "artifact cannot be revised in current state",
            );
        }
        let task_id = artifact.task_id.clone();
        if artifact.status == ArtifactStatus::Delivered {
            self.transition_artifact(artifact_id, ArtifactStatus::InReview);
        }
        if !self.transition_artifact(artifact_id, ArtifactStatus::ChangesRequested) {
            return reject(
                ErrorCode::Conflict,
                "artifact change-request transition rejected",
            );
        }
        self.create_revision(artifact_id);

        let Some(task_id) = task_id else {
            return CommandOutcome::accepted();
        };
        let Some(project_id) = self
            .tasks
            .get(&task_id)
            .filter(|task| task.status != TaskStatus::Cancelled)
            .map(|task| task.project_id.clone())
        else {
            return CommandOutcome::accepted();
        };
        let decision_id = self
            .open_decision_for_task(&task_id)
            .or_else(|| self.create_decision_for_task(&task_id, instructions));
        if let Some(decision_id) = decision_id {
            self.block_task_for_decision(&task_id, &decision_id);
            self.record_decision(&decision_id, DecisionStatus::Open, "request_changes", None);
        }
        self.apply_ceremony(&project_id, OverrideKind::Review);
        CommandOutcome::accepted()
    }

    fn split_into_tasks(&mut self, artifact_id: &ArtifactId, titles: &[Value]) -> CommandOutcome {
        let Some(artifact) = self.artifacts.get(artifact_id) else {
            return reject(ErrorCode::NotFound, "artifact not found");
        };
        if !artifact.status.is_reviewable() {
            return reject(
                ErrorCode::Conflict,
                "artifact cannot be split in current state",
            );
        }
        if titles.is_empty() {
            return reject(ErrorCode::ValidationFailed, "task_titles must not be empty");
        }
        let project_id = artifact.project_id.clone();
        if artifact.status == ArtifactStatus::Delivered {
            self.transition_artifact(artifact_id, ArtifactStatus::InReview);
        }
        for title in titles {
            let counter = bump(&mut self.counters.split_task);
            let task_id = TaskId::new(format!("task_split_{counter:03}"));
            let title = normalize_task_title(title.as_str().unwrap_or_default(), counter);
            self.tasks.insert(
                task_id.clone(),
                Task::new(task_id.clone(), project_id.clone(), title, TaskStatus::Planned),
            );
            self.task_runtime_mut(&task_id);
        }
        self.refresh_project_status(&project_id);
        CommandOutcome::accepted()
    }

    // ---- Player ----

    fn player_pos(&mut self, pos: Vec3, facing: Option<Vec3>) -> CommandOutcome {
        let player_id = AgentId::from(PLAYER_AGENT_ID);
        self.ensure_agent(&player_id);
        if let Some(player) = self.agents.get_mut(&player_id) {
            player.pos = pos;
            player.facing = facing;
        }
        self.player.update(pos, facing, self.tick);
        CommandOutcome::accepted()
    }

    fn move_player_to(&mut self, target: Vec3) -> CommandOutcome {
        if !self.load_active_scene() {
            return reject(
                ErrorCode::NotAllowed,
                format!("navigation grid unavailable for scene {}", self.scene_id),
            );
        }
        let player_id = AgentId::from(PLAYER_AGENT_ID);
        self.ensure_agent(&player_id);
        let start = self.agents.get(&player_id).map_or([0.0; 3], |p| p.pos);
        let occupied: Vec<Vec3> = self
            .agents
            .values()
            .filter(|agent| agent.agent_id != player_id)
            .map(|agent| agent.pos)
            .collect();
        let Some(grid) = self.scenes.grid(&self.scene_id) else {
            return reject(
                ErrorCode::NotAllowed,
                format!("navigation grid unavailable for scene {}", self.scene_id),
            );
        };
        let options = PathOptions {
            occupied,
            ..PathOptions::default()
        };
        let [_, target_y, _] = target;
        let solved = find_path(grid, start, target, &options)
            .map(|path| (grid.cell_to_world(path.target_cell, target_y), path));

        let Some((resolved, path)) = solved else {
            self.scenes.last_move = Some(MovePlan::Blocked {
                scene_id: self.scene_id.clone(),
                requested_target: target,
                start_pos: start,
            });
            return reject(
                ErrorCode::NotAllowed,
                "move_player_to target is unreachable or blocked",
            );
        };
        if let Some(player) = self.agents.get_mut(&player_id) {
            player.pos = resolved;
        }
        self.transition_agent(&player_id, AgentState::WalkingToPoi, "move_player_to");
        self.scenes.last_move = Some(MovePlan::Ok {
            scene_id: self.scene_id.clone(),
            requested_target: target,
            resolved_target: resolved,
            start_cell: path.start_cell,
            target_cell: path.target_cell,
            path: path.path,
            cells: path.cells,
            occupied_cell_count: path.occupied_cell_count,
        });
        CommandOutcome::accepted()
    }

    // ---- Projects ----

    fn start_kickoff(&mut self, project_id: Option<ProjectId>) -> CommandOutcome {
        if let Some(project_id) = &project_id
            && !self.projects.contains_key(project_id)
        {
            return reject(ErrorCode::NotFound, "project not found");
        }
        let target = project_id.or_else(|| self.projects.keys().next().cloned());
        if let Some(project_id) = target {
            self.apply_ceremony(&project_id, OverrideKind::Kickoff);
        }
        CommandOutcome::accepted()
    }

    fn set_project_paused(
        &mut self,
        project_id: &ProjectId,
        expected_status: Option<&str>,
        paused: bool,
    ) -> CommandOutcome {
        let Some(project) = self.projects.get(project_id) else {
            return reject(ErrorCode::NotFound, "project not found");
        };
        if !guard_matches(expected_status, project.status.as_str()) {
            return reject(
                ErrorCode::Conflict,
                "project status no longer matches expected_project_status",
            );
        }
        let (state, reason) = if paused {
            self.paused_projects.insert(project_id.clone());
            (AgentState::BlockedWaiting, "project_paused")
        } else {
            self.paused_projects.remove(project_id);
            (AgentState::WalkingToPoi, "project_resumed")
        };
        let holders: Vec<AgentId> = self
            .tasks
            .values()
            .filter(|task| task.project_id == *project_id && task.status == TaskStatus::Planned)
            .filter_map(|task| {
                task.assignee
                    .clone()
                    .filter(|agent_id| self.agent_holds(agent_id, &task.task_id))
            })
            .collect();
        for agent_id in &holders {
            self.transition_agent(agent_id, state, reason);
        }
        self.refresh_project_status(project_id);
        CommandOutcome::accepted()
    }
}
