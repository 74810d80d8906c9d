//! World tick.
//!
//! One tick walks every agent in id order and advances the task it holds,
//! then counts every override down.

use tracing::trace;

use officeclaw_types::{AgentId, AgentState, TaskStatus, Vec3};

use crate::player::{CacheStatus, SEEK_STEP_PER_TICK, is_finite_vec3, step_toward};
use crate::store::WorldStore;

/// Highest progress bucket reachable while a task is in progress.
const MAX_WORKING_BUCKET: u64 = 9;

impl WorldStore {
    /// Advance the world by one tick.
    pub fn advance_tick(&mut self) {
        self.tick = self.tick.saturating_add(1);
        let agent_ids: Vec<AgentId> = self.agents.keys().cloned().collect();
        for agent_id in &agent_ids {
            self.advance_agent(agent_id);
        }
        self.decay_overrides();
        trace!(tick = self.tick, "World tick advanced");
    }

    fn advance_agent(&mut self, agent_id: &AgentId) {
        let Some(task_id) = self.agent_task(agent_id) else {
            self.transition_agent(agent_id, AgentState::IdleAtHome, "tick_idle");
            return;
        };
        let Some(task) = self
            .tasks
            .get(&task_id)
            .filter(|task| !task.status.is_terminal())
        else {
            self.set_agent_task(agent_id, None);
            self.transition_agent(agent_id, AgentState::IdleAtHome, "task_terminal");
            return;
        };
        let status = task.status;
        let project_id = task.project_id.clone();

        match status {
            TaskStatus::Planned => {
                if self.paused_projects.contains(&project_id) {
                    self.set_task_transition(&task_id, "paused_dispatch");
                    self.transition_agent(agent_id, AgentState::BlockedWaiting, "tick_paused_project");
                    self.refresh_project_status(&project_id);
                    return;
                }
                if let Some(task) = self.tasks.get_mut(&task_id) {
                    task.status = TaskStatus::InProgress;
                }
                let runtime = self.task_runtime_mut(&task_id);
                "started".clone_into(&mut runtime.last_transition);
                runtime.ticks_in_progress = 0;
                runtime.progress_bucket = runtime.progress_bucket.max(1);
                self.transition_agent(agent_id, AgentState::WalkingToPoi, "tick_started");
            }
            TaskStatus::Blocked => {
                self.set_task_transition(&task_id, "blocked");
                let seeking = self
                    .agent_runtime
                    .get(agent_id)
                    .is_some_and(|fsm| fsm.base_state() == AgentState::SeekingUserDecision);
                if seeking {
                    let reason = self.approach_player(agent_id);
                    self.transition_agent(agent_id, AgentState::SeekingUserDecision, reason);
                } else {
                    self.transition_agent(agent_id, AgentState::BlockedWaiting, "tick_blocked");
                }
            }
            TaskStatus::InProgress | TaskStatus::Done | TaskStatus::Cancelled => {
                let runtime = self.task_runtime_mut(&task_id);
                runtime.ticks_in_progress = runtime.ticks_in_progress.saturating_add(1);
                let earned = (runtime.ticks_in_progress / 2).saturating_add(1);
                runtime.progress_bucket = runtime.progress_bucket.max(earned).min(MAX_WORKING_BUCKET);
                "progress".clone_into(&mut runtime.last_transition);
                self.transition_agent(agent_id, AgentState::WorkingAtPoi, "tick_progress");
                let working = self
                    .agent_runtime
                    .get(agent_id)
                    .is_some_and(|fsm| fsm.effective_state() == AgentState::WorkingAtPoi);
                if working {
                    self.start_run(&task_id, agent_id);
                }
            }
        }
        self.refresh_project_status(&project_id);
    }

    /// Target an agent seeking the user walks toward, and the reason to
    /// record for the step.
    fn seek_target(&self) -> (Vec3, &'static str) {
        match (self.player.status(self.tick), self.player.pos) {
            (CacheStatus::Fresh, Some(pos)) if is_finite_vec3(pos) => {
                (pos, "seek_user_player_pos_fresh")
            }
            (CacheStatus::Stale, _) => (self.seek_fallback.pos, "seek_user_fallback_stale"),
            _ => (self.seek_fallback.pos, "seek_user_fallback_unavailable"),
        }
    }

    /// Step a seeking agent toward the player or the fallback point.
    fn approach_player(&mut self, agent_id: &AgentId) -> &'static str {
        let (target, reason) = self.seek_target();
        let fallback = self.seek_fallback.pos;
        let Some(agent) = self.agents.get_mut(agent_id) else {
            return "seek_user_no_agent";
        };
        if !is_finite_vec3(agent.pos) {
            agent.pos = fallback;
        }
        agent.pos = step_toward(agent.pos, target, SEEK_STEP_PER_TICK);
        reason
    }
}
