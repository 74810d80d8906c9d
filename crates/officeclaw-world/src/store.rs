//! The authoritative world store.
//!
//! [`WorldStore`] owns every entity map and the runtime bookkeeping kept
//! beside them (agent FSMs, task progress, decision history, background
//! runs). All maps are ordered by id so that every iteration, and with it
//! every derived side effect, is deterministic.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use officeclaw_nav::{SceneNavLoader, normalize_scene_id};
use officeclaw_types::{
    Agent, AgentId, AgentState, Artifact, ArtifactId, ArtifactStatus, Decision, DecisionId,
    DecisionStatus, DecorId, DecorOutcome, OfficeDecor, Project, ProjectId, ProjectStatus, Task,
    TaskId, TaskStatus, Vec3, WorldSnapshot,
};

use crate::coherence::{CoherenceReport, validate_snapshot_coherence};
use crate::decision::{DecisionLifecycle, DecisionRuntime};
use crate::fsm::{AgentFsmView, AgentRuntime};
use crate::navigation::SceneCache;
use crate::player::{
    FRESHNESS_WINDOW_TICKS, FallbackSource, PlayerCache, PlayerPositionContext, SeekFallback,
};
use crate::run::RunRecord;

/// Agent driven by the connected player.
pub const PLAYER_AGENT_ID: &str = "agent_bd";

/// Progress bookkeeping kept beside each task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRuntime {
    /// Ticks spent in progress since the last (re)start.
    pub ticks_in_progress: u64,
    /// Coarse progress, 0 to 9 while working and 10 once done.
    pub progress_bucket: u64,
    /// Reason of the last task-level transition.
    pub last_transition: String,
}

impl TaskRuntime {
    fn for_status(status: TaskStatus) -> Self {
        let (ticks, bucket, reason) = match status {
            TaskStatus::InProgress => (1, 1, "started"),
            TaskStatus::Done => (0, 0, "done"),
            _ => (0, 0, "planned"),
        };
        Self {
            ticks_in_progress: ticks,
            progress_bucket: bucket,
            last_transition: reason.to_owned(),
        }
    }
}

impl Default for TaskRuntime {
    fn default() -> Self {
        Self::for_status(TaskStatus::Planned)
    }
}

/// Monotonic id and sequence counters.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Counters {
    pub(crate) split_task: u64,
    pub(crate) request: u64,
    pub(crate) rerun_task: u64,
    pub(crate) generated_decision: u64,
    pub(crate) decision_seq: u64,
    pub(crate) run: u64,
    pub(crate) run_seq: u64,
    pub(crate) oc_artifact: u64,
    pub(crate) oc_decision: u64,
    pub(crate) oc_task: u64,
}

/// Increment a counter and return its new value.
pub(crate) const fn bump(counter: &mut u64) -> u64 {
    *counter = counter.saturating_add(1);
    *counter
}

/// The authoritative office world.
pub struct WorldStore {
    pub(crate) scene_id: String,
    pub(crate) tick: u64,
    pub(crate) agents: BTreeMap<AgentId, Agent>,
    pub(crate) projects: BTreeMap<ProjectId, Project>,
    pub(crate) tasks: BTreeMap<TaskId, Task>,
    pub(crate) artifacts: BTreeMap<ArtifactId, Artifact>,
    pub(crate) decisions: BTreeMap<DecisionId, Decision>,
    pub(crate) decor: BTreeMap<DecorId, OfficeDecor>,

    pub(crate) agent_runtime: BTreeMap<AgentId, AgentRuntime>,
    pub(crate) task_runtime: BTreeMap<TaskId, TaskRuntime>,
    pub(crate) decision_runtime: BTreeMap<DecisionId, DecisionRuntime>,
    /// Latest run per task.
    pub(crate) runs: BTreeMap<TaskId, RunRecord>,
    /// Decision each blocked task waits on.
    pub(crate) decision_blockers: BTreeMap<TaskId, DecisionId>,
    /// Status a task had before a decision blocked it.
    pub(crate) blocked_prior_status: BTreeMap<TaskId, TaskStatus>,
    pub(crate) paused_projects: BTreeSet<ProjectId>,
    pub(crate) counters: Counters,

    pub(crate) player: PlayerCache,
    pub(crate) seek_fallback: SeekFallback,
    pub(crate) seeded_player_pos: Option<Vec3>,
    pub(crate) scenes: SceneCache,
    pub(crate) loader: Arc<dyn SceneNavLoader>,
}

impl std::fmt::Debug for WorldStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldStore")
            .field("scene_id", &self.scene_id)
            .field("tick", &self.tick)
            .field("agents", &self.agents.len())
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

// ---- Seed world ----

fn agent(id: &str, state: AgentState, pos: Vec3, task_id: Option<&str>) -> Agent {
    Agent {
        agent_id: AgentId::from(id),
        state,
        pos,
        task_id: task_id.map(TaskId::from),
        facing: None,
    }
}

fn project(id: &str, title: &str) -> Project {
    Project {
        project_id: ProjectId::from(id),
        title: title.to_owned(),
        status: ProjectStatus::Executing,
    }
}

fn seed_tasks() -> Vec<Task> {
    let copy = Task::new(
        TaskId::from("task_copy"),
        ProjectId::from("proj_abc"),
        "Draft copy",
        TaskStatus::Planned,
    );
    let mut research = Task::new(
        TaskId::from("task_research"),
        ProjectId::from("proj_abc"),
        "Research competitors",
        TaskStatus::InProgress,
    );
    research.assignee = Some(AgentId::from("agent_research_1"));
    vec![copy, research]
}

fn keyed<K: Ord, V>(values: Vec<V>, key: impl Fn(&V) -> K) -> BTreeMap<K, V> {
    values.into_iter().map(|value| (key(&value), value)).collect()
}

impl WorldStore {
    /// Create a store holding the seed world and load `scene_id`.
    pub fn new(scene_id: &str, loader: Arc<dyn SceneNavLoader>) -> Self {
        let agents = keyed(
            vec![
                agent(PLAYER_AGENT_ID, AgentState::IdleAtHome, [0.4, 0.0, -0.1], None),
                agent(
                    "agent_research_1",
                    AgentState::WorkingAtPoi,
                    [1.2, 0.0, -0.2],
                    Some("task_research"),
                ),
                agent("agent_eng_1", AgentState::IdleAtHome, [-0.3, 0.0, 1.7], None),
            ],
            |a| a.agent_id.clone(),
        );
        let projects = keyed(
            vec![
                project("proj_boot", "Bootstrap OfficeClaw"),
                project("proj_abc", "Landing Page Plan"),
            ],
            |p| p.project_id.clone(),
        );
        let tasks = keyed(seed_tasks(), |t| t.task_id.clone());
        let artifacts = keyed(
            vec![Artifact {
                artifact_id: ArtifactId::from("art_research_report_v1"),
                project_id: ProjectId::from("proj_abc"),
                artifact_type: String::from("report"),
                status: ArtifactStatus::Delivered,
                version: 1,
                task_id: Some(TaskId::from("task_research")),
                poi_id: Some(String::from("poi_delivery_shelf")),
            }],
            |a| a.artifact_id.clone(),
        );
        let decisions = keyed(
            vec![Decision {
                decision_id: DecisionId::from("dec_audience"),
                project_id: ProjectId::from("proj_abc"),
                task_id: None,
                status: DecisionStatus::Open,
                prompt: String::from("Who is the target audience?"),
                options: vec![String::from("Tech users"), String::from("General consumers")],
                choice: None,
            }],
            |d| d.decision_id.clone(),
        );
        let decor = keyed(
            vec![OfficeDecor {
                decor_id: DecorId::from("plant_bootstrap_1"),
                project_id: ProjectId::from("proj_boot"),
                anchor_id: String::from("trophy_shelf_01"),
                unlocked_by_project_id: ProjectId::from("proj_boot"),
                outcome: DecorOutcome::Completed,
            }],
            |d| d.decor_id.clone(),
        );

        let seeded_player_pos = agents.get(PLAYER_AGENT_ID).map(|a| a.pos);
        let mut store = Self {
            scene_id: normalize_scene_id(scene_id),
            tick: 0,
            agents,
            projects,
            tasks,
            artifacts,
            decisions,
            decor,
            agent_runtime: BTreeMap::new(),
            task_runtime: BTreeMap::new(),
            decision_runtime: BTreeMap::new(),
            runs: BTreeMap::new(),
            decision_blockers: BTreeMap::new(),
            blocked_prior_status: BTreeMap::new(),
            paused_projects: BTreeSet::new(),
            counters: Counters::default(),
            player: PlayerCache::default(),
            seek_fallback: SeekFallback {
                pos: seeded_player_pos.unwrap_or([0.0; 3]),
                source: FallbackSource::SceneDefault,
                poi_id: None,
            },
            seeded_player_pos,
            scenes: SceneCache::default(),
            loader,
        };
        store.seed_runtime();
        let available = store.load_active_scene();
        info!(
            scene_id = %store.scene_id,
            navigation = available,
            agents = store.agents.len(),
            tasks = store.tasks.len(),
            "World store seeded"
        );
        store
    }

    fn seed_runtime(&mut self) {
        for task in self.tasks.values() {
            self.task_runtime
                .insert(task.task_id.clone(), TaskRuntime::for_status(task.status));
        }
        for agent in self.agents.values() {
            self.agent_runtime
                .insert(agent.agent_id.clone(), AgentRuntime::seeded(agent.state));
        }
        for decision in self.decisions.values() {
            let mut runtime = DecisionRuntime::default();
            if let Some(task_id) = &decision.task_id {
                runtime.blocked_task_ids.insert(task_id.clone());
                self.decision_blockers
                    .insert(task_id.clone(), decision.decision_id.clone());
            }
            let seq = bump(&mut self.counters.decision_seq);
            runtime.record(seq, decision.status, "seed", None);
            self.decision_runtime
                .insert(decision.decision_id.clone(), runtime);
        }
    }

    // ---- Accessors ----

    /// Active scene id.
    pub fn scene_id(&self) -> &str {
        &self.scene_id
    }

    /// Switch the active scene. Blank ids are ignored.
    pub fn set_scene_id(&mut self, scene_id: &str) {
        let trimmed = scene_id.trim();
        if trimmed.is_empty() {
            return;
        }
        trimmed.clone_into(&mut self.scene_id);
        self.load_active_scene();
    }

    /// Number of world ticks advanced so far.
    pub const fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Look up a task.
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    /// Look up an agent.
    pub fn agent(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.get(agent_id)
    }

    /// Look up a project.
    pub fn project(&self, project_id: &str) -> Option<&Project> {
        self.projects.get(project_id)
    }

    /// Look up an artifact.
    pub fn artifact(&self, artifact_id: &str) -> Option<&Artifact> {
        self.artifacts.get(artifact_id)
    }

    /// Look up a decision.
    pub fn decision(&self, decision_id: &str) -> Option<&Decision> {
        self.decisions.get(decision_id)
    }

    /// The project with the lowest id, if any.
    pub fn first_project(&self) -> Option<&Project> {
        self.projects.values().next()
    }

    /// Progress bookkeeping of a task.
    pub fn task_runtime(&self, task_id: &str) -> Option<&TaskRuntime> {
        self.task_runtime.get(task_id)
    }

    // ---- Views ----

    /// Full entity dump, every collection sorted by id.
    pub fn snapshot(&self, scene_override: Option<&str>) -> WorldSnapshot {
        WorldSnapshot {
            scene_id: scene_override.unwrap_or(&self.scene_id).to_owned(),
            agents: self.agents.values().cloned().collect(),
            projects: self.projects.values().cloned().collect(),
            tasks: self.tasks.values().cloned().collect(),
            artifacts: self.artifacts.values().cloned().collect(),
            decisions: self.decisions.values().cloned().collect(),
            office_decor: self.decor.values().cloned().collect(),
        }
    }

    /// FSM view of one agent.
    pub fn agent_fsm(&self, agent_id: &str) -> Option<AgentFsmView> {
        let agent = self.agents.get(agent_id)?;
        let runtime = self.agent_runtime.get(agent_id)?;
        Some(runtime.view(&agent.agent_id))
    }

    /// FSM views of every agent, sorted by id.
    pub fn all_agent_fsm(&self) -> Vec<AgentFsmView> {
        self.agent_runtime
            .iter()
            .map(|(agent_id, runtime)| runtime.view(agent_id))
            .collect()
    }

    /// Lifecycle of one decision.
    pub fn decision_lifecycle(&self, decision_id: &str) -> Option<DecisionLifecycle> {
        let decision = self.decisions.get(decision_id)?;
        let runtime = self
            .decision_runtime
            .get(decision_id)
            .cloned()
            .unwrap_or_default();
        let active_blocked_task_ids = self
            .decision_blockers
            .iter()
            .filter(|(_, blocker)| **blocker == decision.decision_id)
            .map(|(task_id, _)| task_id.clone())
            .collect();
        Some(DecisionLifecycle {
            decision_id: decision.decision_id.clone(),
            project_id: decision.project_id.clone(),
            task_id: decision.task_id.clone(),
            status: decision.status,
            choice: decision.choice.clone(),
            blocked_task_ids: runtime.blocked_task_ids.into_iter().collect(),
            active_blocked_task_ids,
            resolved_task_ids: runtime.resolved_task_ids,
            transition_count: runtime.transition_count,
            history: runtime.history,
        })
    }

    /// Lifecycles of every decision, sorted by id.
    pub fn all_decision_lifecycles(&self) -> Vec<DecisionLifecycle> {
        self.decisions
            .keys()
            .filter_map(|decision_id| self.decision_lifecycle(decision_id.as_str()))
            .collect()
    }

    /// Latest background run of a task.
    pub fn run(&self, task_id: &str) -> Option<&RunRecord> {
        self.runs.get(task_id)
    }

    /// Latest run of every task, sorted by task id.
    pub fn all_runs(&self) -> Vec<RunRecord> {
        self.runs.values().cloned().collect()
    }

    /// Borrow the latest run of every task, sorted by task id.
    pub fn run_records(&self) -> impl Iterator<Item = &RunRecord> {
        self.runs.values()
    }

    /// Player position cache and the current seek fallback.
    pub fn player_position_context(&self) -> PlayerPositionContext {
        PlayerPositionContext {
            status: self.player.status(self.tick),
            pos: self.player.pos,
            facing: self.player.facing,
            updated_tick: self.player.updated_tick,
            age_ticks: self.player.age(self.tick),
            freshness_window_ticks: FRESHNESS_WINDOW_TICKS,
            fallback_pos: self.seek_fallback.pos,
            fallback_source: self.seek_fallback.source,
            fallback_poi_id: self.seek_fallback.poi_id.clone(),
        }
    }

    /// Check every cross-entity reference of the current world.
    pub fn validate_coherence(&self) -> CoherenceReport {
        validate_snapshot_coherence(&self.snapshot(None))
    }
}
