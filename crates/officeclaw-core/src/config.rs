//! Configuration loading and typed config structures for the `OfficeClaw`
//! world server.
//!
//! The canonical configuration lives in `officeclaw-config.yaml` at the
//! project root. Every section and field has a default, so an empty file
//! (or no file at all) yields a runnable server. A handful of environment
//! variables override the file for deployment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Lowest tick rate the scheduler runs at.
pub const MIN_TICK_RATE_HZ: u32 = 10;
/// Highest tick rate the scheduler runs at.
pub const MAX_TICK_RATE_HZ: u32 = 20;
/// Lowest snapshot publish rate.
pub const MIN_SNAPSHOT_RATE_HZ: u32 = 2;
/// Highest snapshot publish rate.
pub const MAX_SNAPSHOT_RATE_HZ: u32 = 5;
/// Snapshot rate used when the configured one is not a number.
pub const DEFAULT_SNAPSHOT_RATE_HZ: u32 = 3;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Round a rate and clamp it into `[min, max]`; non-finite rates become
/// `fallback`.
fn clamp_rate(value: f64, min: u32, max: u32, fallback: u32) -> u32 {
    if !value.is_finite() {
        return fallback;
    }
    let rounded = value.round();
    (min..=max)
        .find(|hz| f64::from(*hz) >= rounded)
        .unwrap_or(max)
}

/// Clamp a requested tick rate into the supported band.
pub fn clamp_tick_rate_hz(value: f64) -> u32 {
    clamp_rate(value, MIN_TICK_RATE_HZ, MAX_TICK_RATE_HZ, MIN_TICK_RATE_HZ)
}

/// Clamp a requested snapshot rate into the supported band.
pub fn clamp_snapshot_rate_hz(value: f64) -> u32 {
    clamp_rate(
        value,
        MIN_SNAPSHOT_RATE_HZ,
        MAX_SNAPSHOT_RATE_HZ,
        DEFAULT_SNAPSHOT_RATE_HZ,
    )
}

/// Top-level server configuration.
///
/// Mirrors the structure of `officeclaw-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OfficeClawConfig {
    /// Tick scheduler settings.
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Socket server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Durable log and asset locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Operator alert thresholds.
    #[serde(default)]
    pub alerts: AlertThresholds,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl OfficeClawConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `HOST` / `PORT` override `server.host` / `server.port`
    /// - `OFFICECLAW_EVENT_LOG` overrides `storage.event_log_path`
    /// - `OFFICECLAW_COMMAND_JOURNAL` overrides `storage.command_journal_path`
    /// - `OFFICECLAW_SCENE_DIR` overrides `storage.scene_dir`
    /// - `OFFICECLAW_TICK_RATE_HZ` overrides `simulation.tick_rate_hz`
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST").filter(|value| !value.trim().is_empty()) {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT").and_then(|value| value.trim().parse().ok()) {
            self.server.port = port;
        }
        if let Some(path) = lookup("OFFICECLAW_EVENT_LOG").filter(|value| !value.is_empty()) {
            self.storage.event_log_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("OFFICECLAW_COMMAND_JOURNAL").filter(|value| !value.is_empty())
        {
            self.storage.command_journal_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup("OFFICECLAW_SCENE_DIR").filter(|value| !value.is_empty()) {
            self.storage.scene_dir = PathBuf::from(dir);
        }
        if let Some(hz) = lookup("OFFICECLAW_TICK_RATE_HZ").and_then(|value| value.trim().parse().ok())
        {
            self.simulation.tick_rate_hz = hz;
        }
    }
}

/// Tick scheduler configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Requested tick rate; clamped into `[10, 20]` Hz.
    #[serde(default = "default_tick_rate_hz")]
    pub tick_rate_hz: f64,

    /// Scene the world starts in.
    #[serde(default = "default_scene_id")]
    pub scene_id: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate_hz(),
            scene_id: default_scene_id(),
        }
    }
}

/// Socket server configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Protocol version stamped on every envelope.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,

    /// Requested snapshot publish rate; clamped into `[2, 5]` Hz.
    #[serde(default = "default_snapshot_rate_hz")]
    pub snapshot_rate_hz: f64,

    /// Largest gap a reconnecting client may close by replay.
    #[serde(default = "default_replay_limit")]
    pub replay_limit: usize,

    /// Per-session command throttle.
    #[serde(default)]
    pub command_rate_limit: RateLimitConfig,
}

impl ServerConfig {
    /// Snapshot rate after clamping.
    pub fn bounded_snapshot_rate_hz(&self) -> u32 {
        clamp_snapshot_rate_hz(self.snapshot_rate_hz)
    }

    /// Replay page size, at least 1.
    pub fn bounded_replay_limit(&self) -> usize {
        self.replay_limit.max(1)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            protocol_version: default_protocol_version(),
            snapshot_rate_hz: default_snapshot_rate_hz(),
            replay_limit: default_replay_limit(),
            command_rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Fixed-window command throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Commands accepted per window.
    #[serde(default = "default_max_commands")]
    pub max_commands: u32,

    /// Window length in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl RateLimitConfig {
    /// The limit with `max_commands >= 1` and `window_ms >= 250`.
    #[must_use]
    pub fn bounded(self) -> Self {
        Self {
            max_commands: self.max_commands.max(1),
            window_ms: self.window_ms.max(250),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_commands: default_max_commands(),
            window_ms: default_window_ms(),
        }
    }
}

/// Durable storage locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Event log path; memory-only when absent.
    #[serde(default)]
    pub event_log_path: Option<PathBuf>,

    /// In-memory event retention; at least 10.
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    /// Command journal path; journaling is disabled when absent.
    #[serde(default)]
    pub command_journal_path: Option<PathBuf>,

    /// Directory holding `{scene_id}.scene.json` manifests.
    #[serde(default = "default_scene_dir")]
    pub scene_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            event_log_path: None,
            event_buffer_size: default_event_buffer_size(),
            command_journal_path: None,
            scene_dir: default_scene_dir(),
        }
    }
}

/// Counters and timings that raise operator alerts when crossed.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct AlertThresholds {
    /// Rejected-as-malformed commands.
    #[serde(default = "default_validation_failed")]
    pub validation_failed: u64,

    /// Throttled commands.
    #[serde(default = "default_rate_limited")]
    pub rate_limited: u64,

    /// Socket errors.
    #[serde(default = "default_socket_errors")]
    pub socket_errors: u64,

    /// Commands refused by the restoration gate.
    #[serde(default = "default_restoration_blocked")]
    pub restoration_blocked: u64,

    /// Last tick duration, milliseconds.
    #[serde(default = "default_slow_tick_ms")]
    pub slow_tick_ms: f64,

    /// p95 queue latency, milliseconds.
    #[serde(default = "default_queue_latency_ms")]
    pub queue_latency_ms: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            validation_failed: default_validation_failed(),
            rate_limited: default_rate_limited(),
            socket_errors: default_socket_errors(),
            restoration_blocked: default_restoration_blocked(),
            slow_tick_ms: default_slow_tick_ms(),
            queue_latency_ms: default_queue_latency_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_tick_rate_hz() -> f64 {
    10.0
}

fn default_scene_id() -> String {
    "cozy_office_v0".to_owned()
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

const fn default_port() -> u16 {
    8787
}

const fn default_protocol_version() -> u32 {
    1
}

const fn default_snapshot_rate_hz() -> f64 {
    3.0
}

const fn default_replay_limit() -> usize {
    200
}

const fn default_max_commands() -> u32 {
    12
}

const fn default_window_ms() -> u64 {
    5000
}

const fn default_event_buffer_size() -> usize {
    2000
}

fn default_scene_dir() -> PathBuf {
    PathBuf::from("assets/scenes")
}

const fn default_validation_failed() -> u64 {
    10
}

const fn default_rate_limited() -> u64 {
    10
}

const fn default_socket_errors() -> u64 {
    3
}

const fn default_restoration_blocked() -> u64 {
    5
}

const fn default_slow_tick_ms() -> f64 {
    30.0
}

const fn default_queue_latency_ms() -> f64 {
    120.0
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = OfficeClawConfig::default();
        assert_eq!(config.simulation.scene_id, "cozy_office_v0");
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.server.replay_limit, 200);
        assert_eq!(config.server.command_rate_limit.max_commands, 12);
        assert_eq!(config.storage.event_buffer_size, 2000);
        assert_eq!(config.alerts.socket_errors, 3);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_partial_yaml_keeps_defaults() {
        let yaml = "server:\n  port: 9000\n  command_rate_limit:\n    max_commands: 3\nalerts:\n  slow_tick_ms: 45\n";
        let config = serde_yml::from_str::<OfficeClawConfig>(yaml).ok();
        let config = config.unwrap_or_default();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.command_rate_limit.max_commands, 3);
        assert_eq!(config.server.command_rate_limit.window_ms, 5000);
        assert!((config.alerts.slow_tick_ms - 45.0).abs() < f64::EPSILON);
        assert_eq!(config.alerts.rate_limited, 10);
        assert_eq!(config.simulation.scene_id, "cozy_office_v0");
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(OfficeClawConfig::parse("").is_ok());
    }

    #[test]
    fn overrides_replace_file_values() {
        let vars: BTreeMap<&str, &str> = [
            ("HOST", "0.0.0.0"),
            ("PORT", "9100"),
            ("OFFICECLAW_EVENT_LOG", "/tmp/events.jsonl"),
            ("OFFICECLAW_TICK_RATE_HZ", "15"),
            ("OFFICECLAW_SCENE_DIR", ""),
        ]
        .into_iter()
        .collect();
        let mut config = OfficeClawConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|value| (*value).to_owned()));

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9100);
        assert_eq!(
            config.storage.event_log_path,
            Some(PathBuf::from("/tmp/events.jsonl"))
        );
        assert!((config.simulation.tick_rate_hz - 15.0).abs() < f64::EPSILON);
        assert_eq!(config.storage.scene_dir, PathBuf::from("assets/scenes"));
        assert_eq!(config.storage.command_journal_path, None);
    }

    #[test]
    fn rates_are_rounded_and_clamped() {
        assert_eq!(clamp_tick_rate_hz(3.0), 10);
        assert_eq!(clamp_tick_rate_hz(14.6), 15);
        assert_eq!(clamp_tick_rate_hz(99.0), 20);
        assert_eq!(clamp_tick_rate_hz(f64::NAN), 10);
        assert_eq!(clamp_snapshot_rate_hz(0.5), 2);
        assert_eq!(clamp_snapshot_rate_hz(f64::INFINITY), 3);
        assert_eq!(clamp_snapshot_rate_hz(8.0), 5);
    }

    #[test]
    fn limits_have_floors() {
        let limit = RateLimitConfig {
            max_commands: 0,
            window_ms: 10,
        }
        .bounded();
        assert_eq!(limit.max_commands, 1);
        assert_eq!(limit.window_ms, 250);

        let server = ServerConfig {
            replay_limit: 0,
            ..ServerConfig::default()
        };
        assert_eq!(server.bounded_replay_limit(), 1);
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("officeclaw-config.yaml");
        if path.exists() {
            let config = OfficeClawConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
