//! Player position cache and the seek-user approach.
//!
//! Agents waiting on a decision walk toward the player. The player's last
//! reported position is trusted for [`FRESHNESS_WINDOW_TICKS`] ticks; after
//! that, or before any report, agents head for a scene fallback point.

use serde::Serialize;

use officeclaw_types::Vec3;

/// Ticks a reported player position stays fresh.
pub const FRESHNESS_WINDOW_TICKS: u64 = 6;

/// Distance an agent covers per tick while seeking the user.
pub const SEEK_STEP_PER_TICK: f64 = 0.35;

/// POI whose anchor is preferred as the fallback target.
pub const FALLBACK_POI_ID: &str = "poi_lounge";

/// Freshness of the cached player position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// Reported within the freshness window.
    Fresh,
    /// Reported, but too long ago.
    Stale,
    /// Never reported.
    Unavailable,
}

/// Where the fallback target came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackSource {
    /// An anchor of [`FALLBACK_POI_ID`] in the scene manifest.
    ScenePoiAnchor,
    /// The built-in point for the scene.
    SceneDefault,
}

/// Target used when the player position is not fresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeekFallback {
    /// Target position.
    pub pos: Vec3,
    /// Where it came from.
    pub source: FallbackSource,
    /// POI of the anchor, when the source is a POI anchor.
    pub poi_id: Option<String>,
}

/// Last reported player position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerCache {
    /// Reported position.
    pub pos: Option<Vec3>,
    /// Reported facing.
    pub facing: Option<Vec3>,
    /// World tick of the report.
    pub updated_tick: Option<u64>,
}

impl PlayerCache {
    /// Record a report at `tick`.
    pub const fn update(&mut self, pos: Vec3, facing: Option<Vec3>, tick: u64) {
        self.pos = Some(pos);
        self.facing = facing;
        self.updated_tick = Some(tick);
    }

    /// Ticks since the report, if any.
    pub const fn age(&self, tick: u64) -> Option<u64> {
        match self.updated_tick {
            Some(updated) => Some(tick.saturating_sub(updated)),
            None => None,
        }
    }

    /// Freshness at `tick`.
    pub const fn status(&self, tick: u64) -> CacheStatus {
        match (self.pos, self.age(tick)) {
            (Some(_), Some(age)) if age <= FRESHNESS_WINDOW_TICKS => CacheStatus::Fresh,
            (Some(_), Some(_)) => CacheStatus::Stale,
            _ => CacheStatus::Unavailable,
        }
    }
}

/// Serialized player position context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerPositionContext {
    /// Cache freshness.
    pub status: CacheStatus,
    /// Last reported position.
    pub pos: Option<Vec3>,
    /// Last reported facing.
    pub facing: Option<Vec3>,
    /// Tick of the last report.
    pub updated_tick: Option<u64>,
    /// Ticks since the last report.
    pub age_ticks: Option<u64>,
    /// Freshness window in ticks.
    pub freshness_window_ticks: u64,
    /// Current fallback target.
    pub fallback_pos: Vec3,
    /// Where the fallback came from.
    pub fallback_source: FallbackSource,
    /// POI of the fallback anchor.
    pub fallback_poi_id: Option<String>,
}

/// Horizontal distance between two points.
pub fn distance_xz(a: Vec3, b: Vec3) -> f64 {
    let [ax, _, az] = a;
    let [bx, _, bz] = b;
    (bx - ax).hypot(bz - az)
}

/// Move from `from` toward `to` by at most `max_step` on the XZ plane.
///
/// All three axes are interpolated by the same fraction, so height follows
/// the target proportionally.
pub fn step_toward(from: Vec3, to: Vec3, max_step: f64) -> Vec3 {
    let total = distance_xz(from, to);
    if !total.is_finite() || total <= 1e-6 || max_step <= 0.0 {
        return from;
    }
    let t = (max_step / total).min(1.0);
    let [fx, fy, fz] = from;
    let [tx, ty, tz] = to;
    [
        (tx - fx).mul_add(t, fx),
        (ty - fy).mul_add(t, fy),
        (tz - fz).mul_add(t, fz),
    ]
}

/// Whether every component is finite.
pub fn is_finite_vec3(value: Vec3) -> bool {
    value.iter().all(|c| c.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_freshness_follows_window() {
        let mut cache = PlayerCache::default();
        assert_eq!(cache.status(0), CacheStatus::Unavailable);
        cache.update([1.0, 0.0, 1.0], None, 3);
        assert_eq!(cache.status(3), CacheStatus::Fresh);
        assert_eq!(cache.status(9), CacheStatus::Fresh);
        assert_eq!(cache.status(10), CacheStatus::Stale);
        assert_eq!(cache.age(1), Some(0));
    }

    #[test]
    fn step_is_bounded_by_max_distance() {
        let next = step_toward([0.0, 0.0, 0.0], [3.0, 0.0, 4.0], SEEK_STEP_PER_TICK);
        assert!((distance_xz([0.0, 0.0, 0.0], next) - SEEK_STEP_PER_TICK).abs() < 1e-9);
    }

    #[test]
    fn step_snaps_onto_close_target() {
        let next = step_toward([0.0, 0.0, 0.0], [0.1, 1.0, 0.0], SEEK_STEP_PER_TICK);
        assert!((next[0] - 0.1).abs() < 1e-12);
        assert!((next[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn vertical_offset_alone_does_not_move() {
        let from = [2.0, 0.0, 2.0];
        let next = step_toward(from, [2.0, 5.0, 2.0], SEEK_STEP_PER_TICK);
        assert!(next.iter().zip(from).all(|(a, b)| (a - b).abs() < 1e-12));
    }
}
