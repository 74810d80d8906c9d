//! World socket server for the OfficeClaw world.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws/world`) speaking the versioned
//!   envelope protocol: `hello`/`hello_ack` with resume, `subscribe`,
//!   `command`/`ack`/`error`, `ping`/`pong`, and server-pushed
//!   `event`, `snapshot` and `agent_stream` frames
//! - **REST endpoints** for health, event replay, world event ingestion
//!   and agent stream ingestion
//! - **Operator REST endpoints** for scheduler control (tick rate,
//!   start, stop, step, status) and alerts
//!
//! # Architecture
//!
//! The simulation lives on its own driver task and is reached only
//! through a [`SimulationHandle`](officeclaw_core::SimulationHandle).
//! Accepted commands are journaled and narrated onto the event timeline by
//! [`WorldPipeline`] on that same task, so every session observes events
//! in one global seq order. Events, snapshots and agent stream deltas fan
//! out to sessions through [`tokio::sync::broadcast`] channels.
//!
//! # Modules
//!
//! - [`agent_stream`] -- Stream delta validation and progress previews.
//! - [`alerts`] -- Threshold alerts and the error dashboard.
//! - [`pipeline`] -- Post-tick journaling and event narration.
//! - [`publisher`] -- Periodic snapshot broadcast.
//! - [`resume`] -- Reconnect cursor evaluation.
//! - [`semantic`] -- Command-to-event narration rules.
//! - [`session`] -- Per-connection protocol state machine.
//! - [`telemetry`] -- Protocol counters and recent errors.

pub mod agent_stream;
pub mod alerts;
pub mod error;
pub mod handlers;
pub mod operator;
pub mod pipeline;
pub mod publisher;
pub mod rate_limit;
pub mod resume;
pub mod router;
pub mod semantic;
pub mod server;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod ws;

// Re-export primary types for convenience.
pub use agent_stream::AgentStreams;
pub use error::ObserverError;
pub use pipeline::WorldPipeline;
pub use publisher::{PublishedSnapshot, spawn_publisher};
pub use router::build_router;
pub use server::{ServerError, start_server};
pub use session::Session;
pub use state::{AppState, EventBus, ServerSettings};
