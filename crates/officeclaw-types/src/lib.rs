//! Shared type definitions for the `OfficeClaw` world server.
//!
//! This crate is the single source of truth for the entity shapes, wire
//! envelopes and command payloads used across the workspace. Client-visible
//! types flow downstream to `TypeScript` via `ts-rs` for the office viewer.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe string wrappers for all entity identifiers
//! - [`enums`] -- Lifecycle statuses, FSM states and error codes
//! - [`structs`] -- Entity structs, world snapshot and timeline event
//! - [`command`] -- Command payloads, outcomes and journal records
//! - [`protocol`] -- Socket envelope, resume decision and stream payloads

pub mod command;
pub mod enums;
pub mod ids;
pub mod protocol;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use command::{CommandContext, CommandOutcome, CommandPayload, JournalRecord};
pub use enums::{
    AgentState, ArtifactStatus, DecisionStatus, DecorOutcome, ErrorCode, OverrideKind,
    ProjectStatus, RunStatus, TaskStatus,
};
pub use ids::{AgentId, ArtifactId, DecisionId, DecorId, ProjectId, RunId, SessionId, TaskId};
pub use protocol::{
    AckPayload, AgentStreamKind, AgentStreamPayload, Channels, Envelope, ErrorPayload, HelloAck,
    ResumeDecision, ResumeReason, ResumeStatus,
};
pub use structs::{
    Agent, Artifact, Decision, Event, OfficeDecor, Project, Task, Vec3, WorldSnapshot,
};
