//! Scene manifest loading.
//!
//! A scene manifest (`{scene_dir}/{scene_id}.scene.json`) declares the
//! navigation grid plus the decor and POI anchors the world uses for
//! placing unlocked decor and for the seek-user fallback position. Only
//! `navigation.grid` is required; malformed anchor entries are skipped.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use officeclaw_types::Vec3;

use crate::error::NavError;
use crate::grid::{GridSpec, NavGrid};

/// Scene loaded when none is named.
pub const DEFAULT_SCENE_ID: &str = "cozy_office_v0";

/// File name suffix of scene manifests.
pub const SCENE_FILE_SUFFIX: &str = ".scene.json";

/// A decor placement anchor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecorAnchor {
    /// Anchor group (`trophy_shelf`, ...).
    pub group_id: String,
    /// Unique anchor id.
    pub anchor_id: String,
    /// Placement position, when declared.
    pub pos: Option<Vec3>,
    /// Placement facing, when declared.
    pub facing: Option<Vec3>,
}

/// A navigation anchor belonging to a point of interest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoiAnchor {
    /// Point of interest id.
    pub poi_id: String,
    /// Anchor id within the POI.
    pub anchor_id: String,
    /// Standing position.
    pub pos: Vec3,
    /// Facing, when declared.
    pub facing: Option<Vec3>,
}

/// Navigation data of one scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNavigation {
    /// Scene id, taken from the manifest when it declares one.
    pub scene_id: String,
    /// Where the manifest was read from.
    pub manifest_path: PathBuf,
    /// Occupancy grid.
    pub grid: NavGrid,
    /// Decor anchors, grouped by sorted group id, unique by anchor id.
    pub decor_anchors: Vec<DecorAnchor>,
    /// POI anchors sorted by POI id then anchor id.
    pub poi_anchors: Vec<PoiAnchor>,
}

/// Source of scene navigation data.
pub trait SceneNavLoader: Send + Sync {
    /// Load the navigation data of a scene.
    fn load(&self, scene_id: &str) -> Result<SceneNavigation, NavError>;
}

/// Trim a scene id, falling back to [`DEFAULT_SCENE_ID`] when blank.
pub fn normalize_scene_id(scene_id: &str) -> String {
    let trimmed = scene_id.trim();
    if trimmed.is_empty() {
        DEFAULT_SCENE_ID.to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn vec3(value: Option<&Value>) -> Option<Vec3> {
    let items = value?.as_array()?;
    match items.as_slice() {
        [x, y, z] => {
            let (x, y, z) = (x.as_f64()?, y.as_f64()?, z.as_f64()?);
            (x.is_finite() && y.is_finite() && z.is_finite()).then_some([x, y, z])
        }
        _ => None,
    }
}

fn trimmed_str(value: Option<&Value>) -> Option<String> {
    let text = value?.as_str()?.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

fn parse_decor_anchors(manifest: &Value) -> Vec<DecorAnchor> {
    let Some(groups) = manifest.get("decor_anchors").and_then(Value::as_object) else {
        return Vec::new();
    };
    let sorted: BTreeMap<&String, &Value> = groups.iter().collect();
    let mut seen = HashSet::new();
    let mut parsed = Vec::new();
    for (group_id, anchors) in sorted {
        let Some(anchors) = anchors.as_array() else {
            continue;
        };
        for anchor in anchors {
            let Some(anchor_id) = trimmed_str(anchor.get("anchor_id")) else {
                continue;
            };
            if !seen.insert(anchor_id.clone()) {
                continue;
            }
            parsed.push(DecorAnchor {
                group_id: group_id.clone(),
                anchor_id,
                pos: vec3(anchor.get("pos")),
                facing: vec3(anchor.get("facing")),
            });
        }
    }
    parsed
}

fn parse_poi_anchors(manifest: &Value) -> Vec<PoiAnchor> {
    let Some(pois) = manifest.get("pois").and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut parsed = Vec::new();
    for poi in pois {
        let Some(poi_id) = trimmed_str(poi.get("poi_id")) else {
            continue;
        };
        let Some(nav_anchors) = poi.get("nav_anchors").and_then(Value::as_array) else {
            continue;
        };
        for anchor in nav_anchors {
            let (Some(anchor_id), Some(pos)) =
                (trimmed_str(anchor.get("id")), vec3(anchor.get("pos")))
            else {
                continue;
            };
            parsed.push(PoiAnchor {
                poi_id: poi_id.clone(),
                anchor_id,
                pos,
                facing: vec3(anchor.get("facing")),
            });
        }
    }
    parsed.sort_by(|a, b| {
        a.poi_id
            .cmp(&b.poi_id)
            .then_with(|| a.anchor_id.cmp(&b.anchor_id))
    });
    parsed
}

/// Parse a manifest document into scene navigation data.
pub fn parse_scene_manifest(
    raw: &str,
    scene_id: &str,
    manifest_path: &Path,
) -> Result<SceneNavigation, NavError> {
    let manifest: Value = serde_json::from_str(raw).map_err(|source| NavError::Parse {
        path: manifest_path.to_path_buf(),
        source,
    })?;
    let invalid = |message: &str| NavError::Invalid {
        path: manifest_path.to_path_buf(),
        message: message.to_owned(),
    };
    if !manifest.is_object() {
        return Err(invalid("must be an object"));
    }
    let navigation = manifest
        .get("navigation")
        .filter(|v| v.is_object())
        .ok_or_else(|| invalid("missing navigation"))?;
    let grid_value = navigation
        .get("grid")
        .filter(|v| v.is_object())
        .ok_or_else(|| invalid("missing navigation.grid"))?;
    let spec: GridSpec = serde_json::from_value(grid_value.clone()).map_err(|source| {
        NavError::Parse {
            path: manifest_path.to_path_buf(),
            source,
        }
    })?;

    let scene_id = manifest
        .get("scene_id")
        .and_then(Value::as_str)
        .map_or_else(|| normalize_scene_id(scene_id), str::to_owned);
    Ok(SceneNavigation {
        scene_id,
        manifest_path: manifest_path.to_path_buf(),
        grid: NavGrid::from_spec(&spec),
        decor_anchors: parse_decor_anchors(&manifest),
        poi_anchors: parse_poi_anchors(&manifest),
    })
}

/// Loads `{scene_dir}/{scene_id}.scene.json` from disk.
#[derive(Debug, Clone)]
pub struct ManifestDirLoader {
    scene_dir: PathBuf,
}

impl ManifestDirLoader {
    /// Create a loader reading manifests from `scene_dir`.
    pub fn new(scene_dir: impl Into<PathBuf>) -> Self {
        Self {
            scene_dir: scene_dir.into(),
        }
    }

    /// Manifest path for a scene.
    pub fn manifest_path(&self, scene_id: &str) -> PathBuf {
        self.scene_dir
            .join(format!("{}{SCENE_FILE_SUFFIX}", normalize_scene_id(scene_id)))
    }
}

impl SceneNavLoader for ManifestDirLoader {
    fn load(&self, scene_id: &str) -> Result<SceneNavigation, NavError> {
        let path = self.manifest_path(scene_id);
        let raw = std::fs::read_to_string(&path).map_err(|source| NavError::Read {
            path: path.clone(),
            source,
        })?;
        let loaded = parse_scene_manifest(&raw, scene_id, &path)?;
        debug!(
            scene_id = %loaded.scene_id,
            width = loaded.grid.width(),
            height = loaded.grid.height(),
            blocked = loaded.grid.blocked_cell_count(),
            "Scene navigation loaded"
        );
        Ok(loaded)
    }
}

/// In-memory scenes keyed by id.
#[derive(Debug, Clone, Default)]
pub struct StaticSceneLoader {
    scenes: HashMap<String, SceneNavigation>,
}

impl StaticSceneLoader {
    /// A loader that knows no scenes; every load fails.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register a scene under its id.
    #[must_use]
    pub fn with_scene(mut self, scene: SceneNavigation) -> Self {
        self.scenes.insert(scene.scene_id.clone(), scene);
        self
    }
}

impl SceneNavLoader for StaticSceneLoader {
    fn load(&self, scene_id: &str) -> Result<SceneNavigation, NavError> {
        let key = normalize_scene_id(scene_id);
        self.scenes
            .get(&key)
            .cloned()
            .ok_or(NavError::UnknownScene { scene_id: key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "scene_id": "cozy_office_v0",
        "navigation": {"grid": {"origin": [0, 0], "cell_size": 1, "width": 4, "height": 4, "walkable": "rle:16*1"}},
        "decor_anchors": {
            "wall": [{"anchor_id": "wall_01", "pos": [0, 1, 0]}],
            "trophy_shelf": [
                {"anchor_id": " trophy_shelf_02 "},
                {"anchor_id": "trophy_shelf_01", "pos": [1, 0, 1], "facing": [0, 0, 1]},
                {"anchor_id": "wall_01"}
            ]
        },
        "pois": [
            {"poi_id": "poi_lounge", "nav_anchors": [{"id": "b", "pos": [3, 0, 3]}, {"id": "a", "pos": [2, 0, 2]}]},
            {"poi_id": "poi_desk", "nav_anchors": [{"id": "x", "pos": [1, 0]}]}
        ]
    }"#;

    #[test]
    fn manifest_anchors_are_sorted_and_deduplicated() {
        let scene = parse_scene_manifest(MANIFEST, "ignored", Path::new("scene.json"));
        let scene = scene.ok();
        let decor: Vec<String> = scene
            .as_ref()
            .map(|s| s.decor_anchors.iter().map(|a| a.anchor_id.clone()).collect())
            .unwrap_or_default();
        assert_eq!(decor, vec!["trophy_shelf_02", "trophy_shelf_01", "wall_01"]);

        let pois: Vec<(String, String)> = scene
            .as_ref()
            .map(|s| {
                s.poi_anchors
                    .iter()
                    .map(|a| (a.poi_id.clone(), a.anchor_id.clone()))
                    .collect()
            })
            .unwrap_or_default();
        assert_eq!(
            pois,
            vec![
                (String::from("poi_lounge"), String::from("a")),
                (String::from("poi_lounge"), String::from("b")),
            ]
        );
        assert_eq!(scene.map(|s| s.scene_id), Some(String::from("cozy_office_v0")));
    }

    #[test]
    fn manifest_without_grid_is_invalid() {
        let result = parse_scene_manifest(r#"{"navigation": {}}"#, "x", Path::new("x.json"));
        assert!(matches!(result, Err(NavError::Invalid { .. })));
        let result = parse_scene_manifest("[1]", "x", Path::new("x.json"));
        assert!(matches!(result, Err(NavError::Invalid { .. })));
        let result = parse_scene_manifest("{", "x", Path::new("x.json"));
        assert!(matches!(result, Err(NavError::Parse { .. })));
    }

    #[test]
    fn scene_ids_are_trimmed() {
        assert_eq!(normalize_scene_id("  cozy_office_v0  "), "cozy_office_v0");
        assert_eq!(normalize_scene_id("   "), DEFAULT_SCENE_ID);
        let loader = ManifestDirLoader::new("/scenes");
        assert_eq!(
            loader.manifest_path(" lab "),
            PathBuf::from("/scenes/lab.scene.json")
        );
    }

    #[test]
    fn manifest_dir_loader_reads_from_disk() {
        let dir = std::env::temp_dir().join(format!("officeclaw-nav-{}", uuid::Uuid::new_v4()));
        let written = std::fs::create_dir_all(&dir)
            .and_then(|()| std::fs::write(dir.join("cozy_office_v0.scene.json"), MANIFEST));
        assert!(written.is_ok());

        let loader = ManifestDirLoader::new(&dir);
        let scene = loader.load("  cozy_office_v0 ");
        assert_eq!(scene.ok().map(|s| s.grid.width()), Some(4));
        assert!(matches!(loader.load("missing"), Err(NavError::Read { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn static_loader_reports_unknown_scenes() {
        let loader = StaticSceneLoader::empty();
        assert!(matches!(
            loader.load("cozy_office_v0"),
            Err(NavError::UnknownScene { .. })
        ));
    }
}
