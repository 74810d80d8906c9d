//! World server binary for the OfficeClaw world.
//!
//! This is the main entry point that wires together the world store, the
//! tick driver, boot-time restoration, the event timeline, the snapshot
//! publisher and the socket server. It loads configuration, restores state
//! from the command journal, and serves until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `officeclaw-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Build the world store over the scene manifest directory
//! 4. Replay the command journal and run the consistency check
//! 5. Open the event timeline
//! 6. Spawn the simulation driver with the journaling pipeline and start it
//! 7. Start the snapshot publisher
//! 8. Serve `/ws/world` and the HTTP API

mod error;

use std::path::Path;
use std::sync::{Arc, Mutex};

use officeclaw_core::config::LoggingConfig;
use officeclaw_core::{OfficeClawConfig, Simulation, driver, restore};
use officeclaw_events::{CommandJournal, EventTimeline, TimelineOptions};
use officeclaw_nav::ManifestDirLoader;
use officeclaw_server::{
    AgentStreams, AppState, EventBus, ServerSettings, WorldPipeline, spawn_publisher, start_server,
};
use officeclaw_world::WorldStore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Configuration file, relative to the working directory.
const CONFIG_PATH: &str = "officeclaw-config.yaml";

/// Application entry point for the world server.
///
/// # Errors
///
/// Returns an error if any initialization step or the server fails.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let (config, config_found) = load_config(Path::new(CONFIG_PATH))?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("officeclaw-engine starting");
    if !config_found {
        warn!(path = CONFIG_PATH, "Config file not found, using defaults");
    }
    info!(
        scene_id = %config.simulation.scene_id,
        tick_rate_hz = config.simulation.tick_rate_hz,
        host = %config.server.host,
        port = config.server.port,
        "Configuration loaded"
    );

    // 3. World store.
    let loader = Arc::new(ManifestDirLoader::new(config.storage.scene_dir.clone()));
    let world = WorldStore::new(&config.simulation.scene_id, loader);
    let mut simulation = Simulation::new(world, config.simulation.tick_rate_hz);

    // 4. Restoration.
    let mut journal = CommandJournal::new(config.storage.command_journal_path.clone());
    let restoration = restore(&mut simulation, &mut journal)?;
    if restoration.can_accept_commands() {
        info!(
            loaded_records = restoration.loaded_records,
            replayed_ok = restoration.replayed_ok,
            next_journal_seq = restoration.next_journal_seq,
            "State restoration complete"
        );
    } else {
        error!(
            replayed_rejected = restoration.replayed_rejected,
            issues = ?restoration.consistency_issues,
            "State restoration failed consistency checks; command intake is blocked"
        );
    }

    // 5. Event timeline.
    let settings = ServerSettings::from_config(&config);
    let timeline = EventTimeline::open(TimelineOptions {
        initial_seq: 0,
        max_events: settings.event_buffer_size,
        persist_path: config.storage.event_log_path.clone(),
    })?;
    info!(
        latest_seq = timeline.latest_seq(),
        retained = timeline.len(),
        "Event timeline opened"
    );
    let events = EventBus::new(timeline);

    // 6. Simulation driver.
    let streams = Arc::new(Mutex::new(AgentStreams::default()));
    let pipeline = WorldPipeline::new(journal, events.clone(), Arc::clone(&streams));
    let (handle, _driver) = driver::spawn(simulation, pipeline);
    let started = handle.start().await?;
    info!(
        tick_rate_hz = started.tick_rate_hz,
        tick_interval_ms = started.tick_interval_ms,
        "Simulation started"
    );

    // 7. Snapshot publisher.
    let state = Arc::new(AppState::new(handle, events, streams, restoration, settings));
    let publisher = spawn_publisher(Arc::clone(&state));
    info!(
        rate_hz = settings.snapshot_rate_hz,
        interval_ms = settings.snapshot_interval_ms(),
        "Snapshot publisher started"
    );

    // 8. Serve until Ctrl-C.
    start_server(&config.server, Arc::clone(&state)).await?;

    publisher.abort();
    let stopped = state.simulation.stop().await?;
    info!(
        tick_count = stopped.tick_count,
        seq = stopped.seq,
        "officeclaw-engine shutdown complete"
    );

    Ok(())
}

/// Load configuration from `path`, falling back to defaults (plus
/// environment overrides) when the file does not exist.
///
/// Returns whether the file was found so the caller can warn once
/// logging is up.
fn load_config(path: &Path) -> Result<(OfficeClawConfig, bool), EngineError> {
    if path.exists() {
        Ok((OfficeClawConfig::from_file(path)?, true))
    } else {
        Ok((OfficeClawConfig::parse("")?, false))
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
