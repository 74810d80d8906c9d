//! Per-scene navigation cache and the player move planner.
//!
//! Scenes are loaded lazily through a [`SceneNavLoader`]. Successful loads
//! are cached per scene together with their decor and POI anchors; failed
//! loads are recorded but retried on the next access.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use officeclaw_nav::{
    DEFAULT_SCENE_ID, GridCell, NavGrid, NavGridView, PoiAnchor, normalize_scene_id,
};
use officeclaw_types::Vec3;

use crate::decor::{AnchorSlot, default_anchors, normalize_anchors};
use crate::player::{FALLBACK_POI_ID, FallbackSource, SeekFallback, is_finite_vec3};
use crate::store::WorldStore;

/// Seek fallback point for scenes that declare no lounge anchor.
fn default_fallback_pos(scene_id: &str) -> Option<Vec3> {
    (scene_id == DEFAULT_SCENE_ID).then_some([0.4, 0.0, -0.1])
}

/// Outcome of the last load attempt for a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavLoadMeta {
    /// Whether the grid loaded.
    pub ok: bool,
    /// Scene id reported by the manifest, or the requested key.
    pub scene_id: String,
    /// Manifest location when loaded from disk.
    pub manifest_path: Option<String>,
    /// Load error message.
    pub error: Option<String>,
}

impl NavLoadMeta {
    fn not_loaded(scene_id: &str) -> Self {
        Self {
            ok: false,
            scene_id: scene_id.to_owned(),
            manifest_path: None,
            error: Some(String::from("navigation grid not loaded")),
        }
    }
}

/// The last `move_player_to` plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MovePlan {
    /// A path was found and the player moved.
    Ok {
        /// Scene the plan was made in.
        scene_id: String,
        /// Requested target.
        requested_target: Vec3,
        /// Centre of the target cell at the requested height.
        resolved_target: Vec3,
        /// Start cell.
        start_cell: GridCell,
        /// Target cell.
        target_cell: GridCell,
        /// World waypoints.
        path: Vec<Vec3>,
        /// Cells walked.
        cells: Vec<GridCell>,
        /// Cells occupied by other agents.
        occupied_cell_count: usize,
    },
    /// The target was unreachable.
    Blocked {
        /// Scene the plan was made in.
        scene_id: String,
        /// Requested target.
        requested_target: Vec3,
        /// Where the player stood.
        start_pos: Vec3,
    },
}

/// Serialized navigation state of the active scene.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationState {
    /// Active scene.
    pub scene_id: String,
    /// Whether a grid is loaded.
    pub available: bool,
    /// Last load attempt.
    pub load: NavLoadMeta,
    /// Grid summary.
    pub grid: Option<NavGridView>,
    /// Last move plan.
    pub last_move: Option<MovePlan>,
}

/// Navigation data cached per scene key.
#[derive(Debug, Default)]
pub struct SceneCache {
    grids: HashMap<String, NavGrid>,
    load_meta: HashMap<String, NavLoadMeta>,
    decor_anchors: HashMap<String, Vec<AnchorSlot>>,
    poi_anchors: HashMap<String, Vec<PoiAnchor>>,
    pub(crate) last_move: Option<MovePlan>,
}

impl SceneCache {
    /// Cached grid of a scene.
    pub fn grid(&self, scene_id: &str) -> Option<&NavGrid> {
        self.grids.get(scene_id)
    }
}

impl WorldStore {
    /// Load a scene's navigation data unless it is already cached.
    ///
    /// Always refreshes the seek fallback for the scene. Returns whether a
    /// grid is available.
    pub(crate) fn load_scene(&mut self, scene_id: &str) -> bool {
        let key = normalize_scene_id(scene_id);
        if self.scenes.grids.contains_key(&key) {
            self.refresh_seek_fallback(&key);
            return true;
        }

        match self.loader.load(&key) {
            Ok(loaded) => {
                let anchors = normalize_anchors(&loaded.decor_anchors);
                if !anchors.is_empty() {
                    self.scenes.decor_anchors.insert(key.clone(), anchors);
                } else if !self.scenes.decor_anchors.contains_key(&key) {
                    self.scenes
                        .decor_anchors
                        .insert(key.clone(), default_anchors(&key));
                }
                self.scenes.poi_anchors.insert(key.clone(), loaded.poi_anchors);
                self.scenes.load_meta.insert(
                    key.clone(),
                    NavLoadMeta {
                        ok: true,
                        scene_id: loaded.scene_id,
                        manifest_path: Some(loaded.manifest_path.display().to_string()),
                        error: None,
                    },
                );
                self.scenes.grids.insert(key.clone(), loaded.grid);
                self.refresh_seek_fallback(&key);
                debug!(scene_id = %key, "Navigation grid cached");
                true
            }
            Err(error) => {
                warn!(scene_id = %key, error = %error, "Navigation grid unavailable");
                self.refresh_seek_fallback(&key);
                self.scenes.load_meta.insert(
                    key.clone(),
                    NavLoadMeta {
                        ok: false,
                        scene_id: key,
                        manifest_path: None,
                        error: Some(error.to_string()),
                    },
                );
                false
            }
        }
    }

    /// Load the active scene and report whether its grid is available.
    pub(crate) fn load_active_scene(&mut self) -> bool {
        let key = self.scene_id.clone();
        self.load_scene(&key)
    }

    /// Decor anchors of a scene, defaulting when the manifest declares none.
    pub(crate) fn scene_decor_anchors(&mut self, scene_id: &str) -> Vec<AnchorSlot> {
        let key = normalize_scene_id(scene_id);
        self.scenes
            .decor_anchors
            .entry(key)
            .or_insert_with_key(|key| default_anchors(key))
            .clone()
    }

    fn refresh_seek_fallback(&mut self, scene_key: &str) {
        let lounge = self.scenes.poi_anchors.get(scene_key).and_then(|anchors| {
            anchors
                .iter()
                .find(|anchor| anchor.poi_id == FALLBACK_POI_ID && is_finite_vec3(anchor.pos))
        });
        self.seek_fallback = match lounge {
            Some(anchor) => SeekFallback {
                pos: anchor.pos,
                source: FallbackSource::ScenePoiAnchor,
                poi_id: Some(FALLBACK_POI_ID.to_owned()),
            },
            None => SeekFallback {
                pos: default_fallback_pos(scene_key)
                    .or(self.seeded_player_pos)
                    .unwrap_or([0.0; 3]),
                source: FallbackSource::SceneDefault,
                poi_id: None,
            },
        };
    }

    /// Navigation state of the active scene, loading it if needed.
    pub fn navigation_state(&mut self) -> NavigationState {
        let available = self.load_active_scene();
        let key = self.scene_id.clone();
        NavigationState {
            available,
            load: self
                .scenes
                .load_meta
                .get(&key)
                .cloned()
                .unwrap_or_else(|| NavLoadMeta::not_loaded(&key)),
            grid: self.scenes.grid(&key).map(NavGrid::view),
            last_move: self.scenes.last_move.clone(),
            scene_id: key,
        }
    }

    /// Grid cell containing `world` in the active scene.
    pub fn world_to_grid_cell(&mut self, world: Vec3) -> Option<GridCell> {
        if !is_finite_vec3(world) || !self.load_active_scene() {
            return None;
        }
        self.scenes
            .grid(&self.scene_id)
            .and_then(|grid| grid.world_to_cell(world))
    }

    /// Centre of `cell` in the active scene at height `y`.
    pub fn grid_cell_to_world(&mut self, cell: GridCell, y: f64) -> Option<Vec3> {
        if !self.load_active_scene() {
            return None;
        }
        let y = if y.is_finite() { y } else { 0.0 };
        self.scenes
            .grid(&self.scene_id)
            .map(|grid| grid.cell_to_world(cell, y))
    }
}
