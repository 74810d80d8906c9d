//! The authoritative `OfficeClaw` world.
//!
//! A single [`WorldStore`] holds every entity of the office (agents,
//! projects, tasks, artifacts, decisions, decor) together with the runtime
//! state that drives their lifecycles. It changes only through three entry
//! points: [`WorldStore::apply_command`], [`WorldStore::apply_event`] and
//! [`WorldStore::advance_tick`]. Every iteration runs in id order, so the
//! same inputs always produce the same world.
//!
//! # Modules
//!
//! - [`store`] -- The store, seed world, accessors and read-only views.
//! - [`command`] -- Parsing raw `{name, data}` payloads into [`WorldCommand`].
//! - [`handlers`] -- Per-command validation and mutation.
//! - [`events`] -- Task and background-run events fed back into the world.
//! - [`tick`] -- Per-tick task progress and the seek-user approach.
//! - [`lifecycle`] -- Shared rules linking agents, tasks, decisions, runs
//!   and project status.
//! - [`fsm`] -- Agent base state, overrides and transition bookkeeping.
//! - [`artifact`] -- Artifact status rules and revision ids.
//! - [`decision`] -- Decision history and lifecycle views.
//! - [`run`] -- Background run records.
//! - [`output`] -- Normalization of structured worker output.
//! - [`decor`] -- Decor anchor selection for completed projects.
//! - [`player`] -- Player position cache and seek targets.
//! - [`navigation`] -- Per-scene grid cache and the player move planner.
//! - [`text`] -- Task title normalization and request decomposition.
//! - [`coherence`] -- Cross-entity reference checks on a snapshot.

pub mod artifact;
pub mod coherence;
pub mod command;
pub mod decision;
pub mod decor;
pub mod events;
pub mod fsm;
pub mod handlers;
pub mod lifecycle;
pub mod navigation;
pub mod output;
pub mod player;
pub mod run;
pub mod store;
pub mod text;
pub mod tick;

pub use coherence::{CoherenceReport, validate_snapshot_coherence};
pub use command::WorldCommand;
pub use decision::DecisionLifecycle;
pub use fsm::AgentFsmView;
pub use navigation::{MovePlan, NavigationState};
pub use output::{AdaptedOutput, MalformedOutput, adapt_output};
pub use player::{CacheStatus, FallbackSource, PlayerPositionContext};
pub use run::RunRecord;
pub use store::{PLAYER_AGENT_ID, TaskRuntime, WorldStore};
