//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps every failure
//! mode during startup and serving.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: officeclaw_core::ConfigError,
    },

    /// The command journal could not be replayed.
    #[error("restoration error: {source}")]
    Restoration {
        /// The underlying restoration error.
        #[from]
        source: officeclaw_core::RestorationError,
    },

    /// The event log could not be opened.
    #[error("timeline error: {source}")]
    Timeline {
        /// The underlying timeline error.
        #[from]
        source: officeclaw_events::TimelineError,
    },

    /// The simulation driver stopped answering.
    #[error("driver error: {source}")]
    Driver {
        /// The underlying driver error.
        #[from]
        source: officeclaw_core::DriverError,
    },

    /// The world server failed to start or crashed.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: officeclaw_server::ServerError,
    },
}
