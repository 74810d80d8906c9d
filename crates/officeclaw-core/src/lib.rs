//! Tick scheduler and orchestration for the OfficeClaw world.
//!
//! The world store is synchronous and knows nothing about time. This crate
//! puts a cadence around it: commands and world events queue up between
//! ticks and are drained in a fixed order, a single driver task owns the
//! scheduler, and on boot the command journal is replayed behind a
//! consistency gate.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `officeclaw-config.yaml`
//!   with environment overrides and rate clamping.
//! - [`driver`] -- The task that owns the [`Simulation`] and the
//!   [`SimulationHandle`] used to reach it.
//! - [`restore`] -- Journal replay and the command gate.
//! - [`simulation`] -- The [`Simulation`] tick scheduler.
//! - [`stats`] -- Rolling timing statistics.
//!
//! [`Simulation`]: simulation::Simulation
//! [`SimulationHandle`]: driver::SimulationHandle

pub mod config;
pub mod driver;
pub mod restore;
pub mod simulation;
pub mod stats;

pub use config::{ConfigError, OfficeClawConfig};
pub use driver::{DriverError, NoOpCallback, SimulationHandle, TickCallback};
pub use restore::{RestorationError, RestorationStatus, restore};
pub use simulation::{
    AppliedCommand, CommandTicket, Simulation, SimulationSnapshot, SimulationStats, TickRateBounds,
    TickReport, tick_interval_ms,
};
pub use stats::{RollingStats, RollingSummary};
