//! Decor unlocks for completed projects.
//!
//! When a project completes, one decor item is placed at a scene anchor.
//! The anchor is picked by a stable string hash so the same project lands
//! on the same anchor across restarts and replays.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use officeclaw_nav::DecorAnchor;

/// Anchor group every outcome prefers.
pub const PREFERRED_ANCHOR_GROUP: &str = "trophy_shelf";

/// Group assigned to anchors that declare none.
pub const DEFAULT_ANCHOR_GROUP: &str = "default";

/// A decor anchor reduced to what placement needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnchorSlot {
    /// Anchor group.
    pub group_id: String,
    /// Unique anchor id.
    pub anchor_id: String,
}

impl AnchorSlot {
    fn new(group_id: &str, anchor_id: &str) -> Self {
        Self {
            group_id: group_id.to_owned(),
            anchor_id: anchor_id.to_owned(),
        }
    }
}

/// Built-in anchors for scenes whose manifest declares none.
pub fn default_anchors(scene_id: &str) -> Vec<AnchorSlot> {
    match scene_id {
        "cozy_office_v0" => vec![
            AnchorSlot::new(PREFERRED_ANCHOR_GROUP, "trophy_shelf_01"),
            AnchorSlot::new(PREFERRED_ANCHOR_GROUP, "trophy_shelf_02"),
        ],
        _ => Vec::new(),
    }
}

/// Deduplicate manifest anchors by id and sort them by id.
pub fn normalize_anchors(anchors: &[DecorAnchor]) -> Vec<AnchorSlot> {
    let mut seen = HashSet::new();
    let mut slots: Vec<AnchorSlot> = anchors
        .iter()
        .filter_map(|anchor| {
            let anchor_id = anchor.anchor_id.trim();
            if anchor_id.is_empty() || !seen.insert(anchor_id.to_owned()) {
                return None;
            }
            let group_id = anchor.group_id.trim();
            let group_id = if group_id.is_empty() {
                DEFAULT_ANCHOR_GROUP
            } else {
                group_id
            };
            Some(AnchorSlot::new(group_id, anchor_id))
        })
        .collect();
    slots.sort_by(|a, b| a.anchor_id.cmp(&b.anchor_id));
    slots
}

/// Polynomial string hash `h = h * 31 + unit` over UTF-16 code units,
/// wrapping at 32 bits.
pub fn stable_hash(text: &str) -> u32 {
    text.encode_utf16().fold(0_u32, |hash, unit| {
        hash.wrapping_mul(31).wrapping_add(u32::from(unit))
    })
}

/// Lowercase a string into an `[a-z0-9_]` id token.
///
/// Runs of other characters become a single underscore; leading and
/// trailing underscores are dropped. Empty results yield `fallback`.
pub fn sanitize_id_token(value: &str, fallback: &str) -> String {
    let mut token = String::with_capacity(value.len());
    for c in value.trim().to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            token.push(c);
        } else if !token.ends_with('_') {
            token.push('_');
        }
    }
    let trimmed = token.trim_matches('_');
    if trimmed.is_empty() {
        fallback.to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Pick the anchor for a project's decor.
///
/// Candidates are the anchors of `preferred_group`, else all anchors. The
/// walk starts at `stable_hash("{project}:{group}") % len` and takes the
/// first anchor not in `occupied`; when all are taken the start anchor is
/// reused.
pub fn choose_anchor(
    anchors: &[AnchorSlot],
    project_id: &str,
    preferred_group: &str,
    occupied: &BTreeSet<String>,
) -> Option<String> {
    let grouped: Vec<&AnchorSlot> = anchors
        .iter()
        .filter(|anchor| !preferred_group.is_empty() && anchor.group_id == preferred_group)
        .collect();
    let candidates: Vec<&AnchorSlot> = if grouped.is_empty() {
        anchors.iter().collect()
    } else {
        grouped
    };
    let len = candidates.len();
    if len == 0 {
        return None;
    }
    let group_key = if preferred_group.is_empty() {
        DEFAULT_ANCHOR_GROUP
    } else {
        preferred_group
    };
    let hash = usize::try_from(stable_hash(&format!("{project_id}:{group_key}"))).unwrap_or(0);
    let start = hash.checked_rem(len).unwrap_or(0);
    candidates
        .iter()
        .cycle()
        .skip(start)
        .take(len)
        .find(|anchor| !occupied.contains(&anchor.anchor_id))
        .or_else(|| candidates.get(start))
        .map(|anchor| anchor.anchor_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_hash_matches_reference_values() {
        assert_eq!(stable_hash(""), 0);
        assert_eq!(stable_hash("a"), 97);
        assert_eq!(stable_hash("ab"), 97 * 31 + 98);
        // Wraps instead of overflowing.
        let long = "z".repeat(64);
        assert_eq!(stable_hash(&long), stable_hash(&long));
    }

    #[test]
    fn id_tokens_are_sanitized() {
        assert_eq!(sanitize_id_token("proj_abc", "project"), "proj_abc");
        assert_eq!(sanitize_id_token("  Big Launch!! 2026 ", "project"), "big_launch_2026");
        assert_eq!(sanitize_id_token("__x__y__", "project"), "x_y");
        assert_eq!(sanitize_id_token("!!!", "project"), "project");
    }

    #[test]
    fn manifest_anchors_are_deduplicated_and_sorted() {
        let raw = vec![
            DecorAnchor {
                group_id: String::from("wall"),
                anchor_id: String::from("b"),
                pos: None,
                facing: None,
            },
            DecorAnchor {
                group_id: String::new(),
                anchor_id: String::from("a"),
                pos: None,
                facing: None,
            },
            DecorAnchor {
                group_id: String::from("wall"),
                anchor_id: String::from("b"),
                pos: None,
                facing: None,
            },
        ];
        let slots = normalize_anchors(&raw);
        assert_eq!(
            slots,
            vec![AnchorSlot::new("default", "a"), AnchorSlot::new("wall", "b")]
        );
    }

    #[test]
    fn occupied_anchors_are_skipped() {
        let anchors = default_anchors("cozy_office_v0");
        let occupied: BTreeSet<String> = [String::from("trophy_shelf_01")].into_iter().collect();
        let chosen = choose_anchor(&anchors, "proj_abc", PREFERRED_ANCHOR_GROUP, &occupied);
        assert_eq!(chosen.as_deref(), Some("trophy_shelf_02"));
    }

    #[test]
    fn full_shelf_reuses_start_anchor() {
        let anchors = default_anchors("cozy_office_v0");
        let occupied: BTreeSet<String> = anchors.iter().map(|a| a.anchor_id.clone()).collect();
        let chosen = choose_anchor(&anchors, "proj_abc", PREFERRED_ANCHOR_GROUP, &occupied);
        assert!(chosen.is_some());
        assert_eq!(choose_anchor(&[], "proj_abc", "x", &occupied), None);
    }

    #[test]
    fn unknown_group_falls_back_to_all_anchors() {
        let anchors = vec![AnchorSlot::new("wall", "wall_01")];
        let chosen = choose_anchor(&anchors, "p", PREFERRED_ANCHOR_GROUP, &BTreeSet::new());
        assert_eq!(chosen.as_deref(), Some("wall_01"));
    }
}
