//! Scene navigation for the `OfficeClaw` world.
//!
//! Movement commands resolve a target position against the active scene's
//! occupancy grid. This crate owns that grid, the A* search over it, and
//! the manifest loading that produces both.
//!
//! # Modules
//!
//! - [`grid`] -- Occupancy grid, walkability parsing, world/cell conversion
//! - [`pathfinding`] -- A* search and nearest-walkable-cell ring search
//! - [`manifest`] -- Scene manifest parsing and the [`SceneNavLoader`] seam
//! - [`error`] -- Manifest loading errors

pub mod error;
pub mod grid;
pub mod manifest;
pub mod pathfinding;

pub use error::NavError;
pub use grid::{GridCell, GridSpec, NavGrid, NavGridView};
pub use manifest::{
    DEFAULT_SCENE_ID, DecorAnchor, ManifestDirLoader, PoiAnchor, SceneNavLoader, SceneNavigation,
    StaticSceneLoader, normalize_scene_id, parse_scene_manifest,
};
pub use pathfinding::{PathOptions, PathResult, find_path, nearest_walkable_cell};
