//! Error types for scene navigation loading.

use std::path::PathBuf;

/// Errors raised while loading a scene's navigation data.
#[derive(Debug, thiserror::Error)]
pub enum NavError {
    /// The manifest file could not be read.
    #[error("failed reading scene manifest at {}: {source}", path.display())]
    Read {
        /// Manifest path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The manifest is not valid JSON.
    #[error("failed parsing scene manifest JSON at {}: {source}", path.display())]
    Parse {
        /// Manifest path.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// The manifest parsed but lacks required structure.
    #[error("scene manifest {message}: {}", path.display())]
    Invalid {
        /// Manifest path.
        path: PathBuf,
        /// What is missing or malformed.
        message: String,
    },

    /// No navigation data is registered for the scene.
    #[error("no navigation data registered for scene {scene_id}")]
    UnknownScene {
        /// The requested scene.
        scene_id: String,
    },
}
