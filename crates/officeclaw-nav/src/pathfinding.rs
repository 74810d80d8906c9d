//! A* search over a [`NavGrid`].
//!
//! Four-connected moves with unit step cost and a Manhattan heuristic.
//! Start and target positions snap to the nearest usable cell through an
//! expanding ring search. The open set is kept in insertion order and the
//! next node is picked by a linear minimum-f scan, so ties resolve to the
//! earliest inserted node. That is O(n) per expansion; fine for office-sized
//! grids, but a binary heap with an insertion counter would be needed to
//! keep the same tie-breaking on much larger maps.

use std::collections::HashSet;

use serde::Serialize;

use officeclaw_types::Vec3;

use crate::grid::{GridCell, NavGrid};

/// Default explored-node budget.
pub const DEFAULT_MAX_SEARCH_NODES: usize = 20_000;

/// Distance in world units below which the final path point is considered
/// to already sit on the requested target.
const TARGET_SNAP_EPSILON: f64 = 1e-3;

/// Cardinal neighbour offsets in expansion order.
const NEIGHBOURS: [(i64, i64); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Search options.
#[derive(Debug, Clone, PartialEq)]
pub struct PathOptions {
    /// World positions of other agents; their cells are avoided.
    pub occupied: Vec<Vec3>,
    /// Whether the target cell may be entered while occupied.
    pub allow_target_occupied: bool,
    /// Explored-node budget; exhausting it means "no path".
    pub max_search_nodes: usize,
    /// Height of the returned path points; defaults to the start height.
    pub y: Option<f64>,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            occupied: Vec::new(),
            allow_target_occupied: false,
            max_search_nodes: DEFAULT_MAX_SEARCH_NODES,
            y: None,
        }
    }
}

/// A found path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathResult {
    /// World-space waypoints, cell centres followed by the exact target
    /// when it is not already a cell centre.
    pub path: Vec<Vec3>,
    /// Cells visited from start to target inclusive.
    pub cells: Vec<GridCell>,
    /// Resolved start cell.
    pub start_cell: GridCell,
    /// Resolved target cell.
    pub target_cell: GridCell,
    /// Number of distinct in-bounds cells occupied by other agents.
    pub occupied_cell_count: usize,
}

fn is_walkable(
    grid: &NavGrid,
    cell: GridCell,
    occupied: &HashSet<usize>,
    allow_occupied: bool,
) -> bool {
    let Some(index) = grid.index(cell) else {
        return false;
    };
    if !grid.is_open(cell) {
        return false;
    }
    allow_occupied || !occupied.contains(&index)
}

/// Find the walkable cell closest to `start` by expanding square rings.
///
/// Each ring scans its left and right columns top to bottom, then its top
/// and bottom rows left to right, and returns the first usable cell.
pub fn nearest_walkable_cell(
    grid: &NavGrid,
    start: GridCell,
    occupied: &HashSet<usize>,
    allow_occupied: bool,
) -> Option<GridCell> {
    if is_walkable(grid, start, occupied, allow_occupied) {
        return Some(start);
    }
    let limit = i64::try_from(grid.width().max(grid.height())).unwrap_or(i64::MAX);
    let usable = |cell: GridCell| is_walkable(grid, cell, occupied, allow_occupied);
    for radius in 1..=limit {
        let row_lo = start.row.saturating_sub(radius);
        let row_hi = start.row.saturating_add(radius);
        for row in row_lo..=row_hi {
            let left = GridCell::new(start.col.saturating_sub(radius), row);
            if usable(left) {
                return Some(left);
            }
            let right = GridCell::new(start.col.saturating_add(radius), row);
            if usable(right) {
                return Some(right);
            }
        }
        let col_lo = start.col.saturating_sub(radius).saturating_add(1);
        let col_hi = start.col.saturating_add(radius).saturating_sub(1);
        for col in col_lo..=col_hi {
            let top = GridCell::new(col, row_lo);
            if usable(top) {
                return Some(top);
            }
            let bottom = GridCell::new(col, row_hi);
            if usable(bottom) {
                return Some(bottom);
            }
        }
    }
    None
}

fn manhattan(a: GridCell, b: GridCell) -> u64 {
    a.col
        .abs_diff(b.col)
        .saturating_add(a.row.abs_diff(b.row))
}

fn occupied_indices(grid: &NavGrid, positions: &[Vec3]) -> HashSet<usize> {
    positions
        .iter()
        .filter_map(|pos| grid.world_to_cell(*pos))
        .filter_map(|cell| grid.index(cell))
        .collect()
}

/// Search a path from `start` to `target`.
///
/// Returns `None` when either endpoint has no usable cell nearby, when the
/// endpoints are disconnected, or when the node budget runs out. A partial
/// path is never returned.
pub fn find_path(
    grid: &NavGrid,
    start: Vec3,
    target: Vec3,
    options: &PathOptions,
) -> Option<PathResult> {
    let occupied = occupied_indices(grid, &options.occupied);
    let raw_start = grid
        .world_to_cell(start)
        .unwrap_or_else(|| grid.clamped_cell(start));
    let raw_target = grid
        .world_to_cell(target)
        .unwrap_or_else(|| grid.clamped_cell(target));

    let start_cell = nearest_walkable_cell(grid, raw_start, &occupied, true)?;
    let target_cell =
        nearest_walkable_cell(grid, raw_target, &occupied, options.allow_target_occupied)?;

    let node_count = grid.cell_count();
    let mut g_score = vec![u64::MAX; node_count];
    let mut f_score = vec![u64::MAX; node_count];
    let mut came_from: Vec<Option<usize>> = vec![None; node_count];
    let mut in_open = vec![false; node_count];
    let mut closed = vec![false; node_count];
    let mut open: Vec<usize> = Vec::new();

    let start_index = grid.index(start_cell)?;
    let target_index = grid.index(target_cell)?;
    open.push(start_index);
    *in_open.get_mut(start_index)? = true;
    *g_score.get_mut(start_index)? = 0;
    *f_score.get_mut(start_index)? = manhattan(start_cell, target_cell);

    let mut visited: usize = 0;
    while !open.is_empty() {
        let mut best: Option<(usize, u64)> = None;
        for (slot, node) in open.iter().enumerate() {
            let f = f_score.get(*node).copied().unwrap_or(u64::MAX);
            if best.is_none_or(|(_, best_f)| f < best_f) && f < u64::MAX {
                best = Some((slot, f));
            }
        }
        let (slot, _) = best?;
        let current = open.remove(slot);

        if current == target_index {
            let cells = reconstruct(grid, &came_from, current);
            let y = options.y.unwrap_or(start[1]);
            let mut path: Vec<Vec3> = cells.iter().map(|c| grid.cell_to_world(*c, y)).collect();
            let needs_target = path.last().is_none_or(|last| {
                (last[0] - target[0]).abs() > TARGET_SNAP_EPSILON
                    || (last[2] - target[2]).abs() > TARGET_SNAP_EPSILON
            });
            if needs_target {
                path.push([target[0], y, target[2]]);
            }
            return Some(PathResult {
                path,
                cells,
                start_cell,
                target_cell,
                occupied_cell_count: occupied.len(),
            });
        }

        if let Some(flag) = in_open.get_mut(current) {
            *flag = false;
        }
        if let Some(flag) = closed.get_mut(current) {
            *flag = true;
        }
        let current_cell = grid.cell_at(current)?;
        let current_g = g_score.get(current).copied().unwrap_or(u64::MAX);

        for (d_col, d_row) in NEIGHBOURS {
            let next_cell = GridCell::new(
                current_cell.col.saturating_add(d_col),
                current_cell.row.saturating_add(d_row),
            );
            let Some(next) = grid.index(next_cell) else {
                continue;
            };
            if closed.get(next).copied().unwrap_or(true) {
                continue;
            }
            let allow = options.allow_target_occupied && next == target_index;
            if !is_walkable(grid, next_cell, &occupied, allow) {
                continue;
            }
            let tentative = current_g.saturating_add(1);
            if in_open.get(next).copied().unwrap_or(false) {
                if tentative >= g_score.get(next).copied().unwrap_or(u64::MAX) {
                    continue;
                }
            } else {
                open.push(next);
                if let Some(flag) = in_open.get_mut(next) {
                    *flag = true;
                }
            }
            if let Some(slot) = came_from.get_mut(next) {
                *slot = Some(current);
            }
            if let Some(slot) = g_score.get_mut(next) {
                *slot = tentative;
            }
            if let Some(slot) = f_score.get_mut(next) {
                *slot = tentative.saturating_add(manhattan(next_cell, target_cell));
            }
        }

        visited = visited.saturating_add(1);
        if visited >= options.max_search_nodes {
            break;
        }
    }
    None
}

fn reconstruct(grid: &NavGrid, came_from: &[Option<usize>], end: usize) -> Vec<GridCell> {
    let mut cells = Vec::new();
    let mut cursor = Some(end);
    while let Some(index) = cursor {
        if let Some(cell) = grid.cell_at(index) {
            cells.push(cell);
        }
        cursor = came_from.get(index).copied().flatten();
    }
    cells.reverse();
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridSpec;

    fn grid(width: f64, height: f64, walkable: Option<serde_json::Value>) -> NavGrid {
        NavGrid::from_spec(&GridSpec {
            origin: [0.0, 0.0],
            cell_size: Some(1.0),
            width,
            height,
            walkable,
        })
    }

    #[test]
    fn occupied_target_snaps_to_nearest_free_cell() {
        let grid = grid(3.0, 3.0, None);
        let options = PathOptions {
            occupied: vec![[2.5, 0.0, 0.5]],
            ..PathOptions::default()
        };
        let result = find_path(&grid, [0.5, 0.0, 0.5], [2.5, 0.0, 0.5], &options);
        assert!(result.is_some());
        let result = result.unwrap_or_else(unreachable_result);
        assert_eq!(result.target_cell, GridCell::new(1, 0));
        assert!(result.path.len() >= 2);
        assert_eq!(result.occupied_cell_count, 1);
    }

    #[test]
    fn occupied_target_allowed_when_requested() {
        let grid = grid(3.0, 3.0, None);
        let options = PathOptions {
            occupied: vec![[2.5, 0.0, 0.5]],
            allow_target_occupied: true,
            ..PathOptions::default()
        };
        let result = find_path(&grid, [0.5, 0.0, 0.5], [2.5, 0.0, 0.5], &options);
        assert_eq!(result.map(|r| r.target_cell), Some(GridCell::new(2, 0)));
    }

    #[test]
    fn disconnected_cells_have_no_path() {
        let walkable = serde_json::json!([1, 0, 0, 0, 0, 0, 0, 0, 1]);
        let grid = grid(3.0, 3.0, Some(walkable));
        let result = find_path(
            &grid,
            [0.5, 0.0, 0.5],
            [2.5, 0.0, 2.5],
            &PathOptions::default(),
        );
        assert!(result.is_none());
    }

    #[test]
    fn path_routes_around_walls() {
        // 5x3 with a wall in column 2 except the bottom row.
        let walkable = serde_json::json!([1, 1, 0, 1, 1, 1, 1, 0, 1, 1, 1, 1, 1, 1, 1]);
        let grid = grid(5.0, 3.0, Some(walkable));
        let result = find_path(
            &grid,
            [0.5, 0.0, 0.5],
            [4.5, 0.0, 0.5],
            &PathOptions::default(),
        );
        let cells = result.map(|r| r.cells).unwrap_or_default();
        assert_eq!(cells.first(), Some(&GridCell::new(0, 0)));
        assert_eq!(cells.last(), Some(&GridCell::new(4, 0)));
        assert!(cells.contains(&GridCell::new(2, 2)));
        // Manhattan optimal: 4 across plus 2 down and 2 up.
        assert_eq!(cells.len(), 9);
    }

    #[test]
    fn off_centre_target_is_appended() {
        let grid = grid(3.0, 1.0, None);
        let result = find_path(
            &grid,
            [0.5, 1.0, 0.5],
            [2.2, 0.0, 0.7],
            &PathOptions::default(),
        );
        let path = result.map(|r| r.path).unwrap_or_default();
        assert_eq!(path.len(), 4);
        assert_eq!(path.last(), Some(&[2.2, 1.0, 0.7]));
    }

    #[test]
    fn search_budget_exhaustion_is_no_path() {
        let grid = grid(10.0, 1.0, None);
        let options = PathOptions {
            max_search_nodes: 3,
            ..PathOptions::default()
        };
        let result = find_path(&grid, [0.5, 0.0, 0.5], [9.5, 0.0, 0.5], &options);
        assert!(result.is_none());
    }

    #[test]
    fn ring_search_prefers_left_column_first() {
        let walkable = serde_json::json!([1, 0, 1, 0, 0, 0, 1, 0, 1]);
        let grid = grid(3.0, 3.0, Some(walkable));
        let found = nearest_walkable_cell(&grid, GridCell::new(1, 1), &HashSet::new(), false);
        assert_eq!(found, Some(GridCell::new(0, 0)));
    }

    fn unreachable_result() -> PathResult {
        PathResult {
            path: Vec::new(),
            cells: Vec::new(),
            start_cell: GridCell::new(-1, -1),
            target_cell: GridCell::new(-1, -1),
            occupied_cell_count: 0,
        }
    }
}
