//! Uniform occupancy grid over the scene floor.
//!
//! The grid maps the XZ plane onto `width x height` square cells of
//! `cell_size` world units, starting at `origin = [x, z]`. Each cell is
//! either walkable (`1`) or blocked (`0`). Walkability is declared in the
//! scene manifest as a numeric array, an exact-length `0`/`1` string, or a
//! run-length string such as `rle:12*1,3*0,1`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use officeclaw_types::Vec3;

/// Cell size used when the manifest omits a positive one.
pub const DEFAULT_CELL_SIZE: f64 = 0.25;

/// Grid declaration as it appears under `navigation.grid` in a manifest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GridSpec {
    /// World-space `[x, z]` of the grid's top-left corner.
    pub origin: [f64; 2],
    /// Cell edge length in world units.
    #[serde(default)]
    pub cell_size: Option<f64>,
    /// Number of columns.
    pub width: f64,
    /// Number of rows.
    pub height: f64,
    /// Walkability declaration.
    #[serde(default)]
    pub walkable: Option<Value>,
}

/// A cell coordinate. Signed so ring searches can step outside the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    /// Column (X axis).
    pub col: i64,
    /// Row (Z axis).
    pub row: i64,
}

impl GridCell {
    /// Build a cell coordinate.
    pub const fn new(col: i64, row: i64) -> Self {
        Self { col, row }
    }
}

/// Runtime navigation grid built from a [`GridSpec`].
#[derive(Debug, Clone, PartialEq)]
pub struct NavGrid {
    origin: [f64; 2],
    cell_size: f64,
    width: usize,
    height: usize,
    walkable: Vec<u8>,
    blocked_cell_count: usize,
}

/// Serialized form of a [`NavGrid`] reported by navigation state queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavGridView {
    /// World-space `[x, z]` origin.
    pub origin: [f64; 2],
    /// Cell edge length.
    pub cell_size: f64,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
    /// Number of blocked cells.
    pub blocked_cell_count: usize,
    /// Row-major walkability flags.
    pub walkable: Vec<u8>,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn dimension(raw: f64) -> usize {
    if raw.is_finite() && raw >= 1.0 {
        raw.floor() as usize
    } else {
        1
    }
}

#[allow(clippy::cast_possible_truncation)]
fn floor_to_i64(value: f64) -> i64 {
    value.floor() as i64
}

impl NavGrid {
    /// Build a grid from its manifest declaration.
    ///
    /// Dimensions below one are raised to one, a missing or non-positive
    /// cell size falls back to [`DEFAULT_CELL_SIZE`], and an unreadable
    /// walkability declaration leaves every cell walkable.
    pub fn from_spec(spec: &GridSpec) -> Self {
        let width = dimension(spec.width);
        let height = dimension(spec.height);
        let cell_size = spec
            .cell_size
            .filter(|size| size.is_finite() && *size > 0.0)
            .unwrap_or(DEFAULT_CELL_SIZE);
        let expected = width.saturating_mul(height);
        let walkable = normalize_walkable(spec.walkable.as_ref(), expected);
        let blocked_cell_count = walkable.iter().filter(|flag| **flag == 0).count();
        Self {
            origin: spec.origin,
            cell_size,
            width,
            height,
            walkable,
            blocked_cell_count,
        }
    }

    /// Number of columns.
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Cell edge length in world units.
    pub const fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of blocked cells.
    pub const fn blocked_cell_count(&self) -> usize {
        self.blocked_cell_count
    }

    /// Total number of cells.
    pub const fn cell_count(&self) -> usize {
        self.walkable.len()
    }

    /// Whether the coordinate lies inside the grid.
    pub fn in_bounds(&self, cell: GridCell) -> bool {
        self.index(cell).is_some()
    }

    /// Row-major index of an in-bounds cell.
    pub fn index(&self, cell: GridCell) -> Option<usize> {
        let col = usize::try_from(cell.col).ok()?;
        let row = usize::try_from(cell.row).ok()?;
        if col >= self.width || row >= self.height {
            return None;
        }
        row.checked_mul(self.width)?.checked_add(col)
    }

    /// Cell coordinate of a row-major index.
    pub fn cell_at(&self, index: usize) -> Option<GridCell> {
        let row = index.checked_div(self.width)?;
        let col = index.checked_rem(self.width)?;
        Some(GridCell::new(
            i64::try_from(col).ok()?,
            i64::try_from(row).ok()?,
        ))
    }

    /// Whether the cell is in bounds and not blocked by level geometry.
    pub fn is_open(&self, cell: GridCell) -> bool {
        self.index(cell)
            .and_then(|idx| self.walkable.get(idx))
            .is_some_and(|flag| *flag != 0)
    }

    /// World-space centre of a cell at height `y`.
    #[allow(clippy::cast_precision_loss)]
    pub fn cell_to_world(&self, cell: GridCell, y: f64) -> Vec3 {
        let [origin_x, origin_z] = self.origin;
        let x = (cell.col as f64 + 0.5).mul_add(self.cell_size, origin_x);
        let z = (cell.row as f64 + 0.5).mul_add(self.cell_size, origin_z);
        [x, y, z]
    }

    /// Cell containing a world position, or `None` when it lies outside.
    pub fn world_to_cell(&self, world: Vec3) -> Option<GridCell> {
        let cell = self.unbounded_cell(world);
        self.in_bounds(cell).then_some(cell)
    }

    /// Cell containing a world position, clamped onto the grid edge.
    pub fn clamped_cell(&self, world: Vec3) -> GridCell {
        let cell = self.unbounded_cell(world);
        let max_col = i64::try_from(self.width.saturating_sub(1)).unwrap_or(i64::MAX);
        let max_row = i64::try_from(self.height.saturating_sub(1)).unwrap_or(i64::MAX);
        GridCell::new(cell.col.clamp(0, max_col), cell.row.clamp(0, max_row))
    }

    fn unbounded_cell(&self, world: Vec3) -> GridCell {
        let [x, _, z] = world;
        let [origin_x, origin_z] = self.origin;
        GridCell::new(
            floor_to_i64((x - origin_x) / self.cell_size),
            floor_to_i64((z - origin_z) / self.cell_size),
        )
    }

    /// Serializable view of the grid.
    pub fn view(&self) -> NavGridView {
        NavGridView {
            origin: self.origin,
            cell_size: self.cell_size,
            width: self.width,
            height: self.height,
            blocked_cell_count: self.blocked_cell_count,
            walkable: self.walkable.clone(),
        }
    }
}

/// Normalize a walkability declaration to exactly `expected` flags.
fn normalize_walkable(raw: Option<&Value>, expected: usize) -> Vec<u8> {
    let mut normalized = vec![1_u8; expected];
    let values = match raw {
        Some(Value::Array(items)) => Some(items.iter().map(walkable_flag).collect::<Vec<u8>>()),
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            parse_rle_walkable(trimmed, expected).or_else(|| parse_bit_string(trimmed, expected))
        }
        _ => None,
    };
    if let Some(values) = values {
        for (slot, value) in normalized.iter_mut().zip(values) {
            *slot = u8::from(value > 0);
        }
    }
    normalized
}

fn walkable_flag(value: &Value) -> u8 {
    let positive = match value {
        Value::Number(n) => n.as_f64().is_some_and(|v| v > 0.0),
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().parse::<f64>().is_ok_and(|v| v > 0.0),
        _ => false,
    };
    u8::from(positive)
}

fn parse_bit_string(raw: &str, expected: usize) -> Option<Vec<u8>> {
    if raw.len() != expected || raw.is_empty() || !raw.bytes().all(|b| b == b'0' || b == b'1') {
        return None;
    }
    Some(raw.bytes().map(|b| u8::from(b == b'1')).collect())
}

/// Parse `rle:` walkability. Tokens are `N*V`, `NxV`, `N:V` or a bare
/// `0`/`1`; any other token invalidates the whole string. Short results
/// are padded with walkable cells, long ones truncated.
pub fn parse_rle_walkable(raw: &str, expected: usize) -> Option<Vec<u8>> {
    let body = raw.strip_prefix("rle:")?.trim();
    if body.is_empty() {
        return None;
    }
    let mut values: Vec<u8> = Vec::new();
    for token in body.split(',') {
        let segment = token.trim();
        if segment.is_empty() {
            continue;
        }
        if segment == "0" || segment == "1" {
            values.push(u8::from(segment == "1"));
            continue;
        }
        let (count, value) = parse_run(segment)?;
        let room = expected.saturating_sub(values.len());
        values.extend(std::iter::repeat_n(value, count.min(room)));
    }
    if values.is_empty() {
        return None;
    }
    values.resize(expected, 1);
    Some(values)
}

fn parse_run(segment: &str) -> Option<(usize, u8)> {
    let split = segment.find(['*', 'x', ':'])?;
    let (count_part, rest) = segment.split_at(split);
    let count_part = count_part.trim_end();
    if count_part.is_empty() || !count_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value_part = rest.get(1..)?.trim_start();
    let value = match value_part {
        "0" => 0,
        "1" => 1,
        _ => return None,
    };
    Some((count_part.parse().ok()?, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(width: f64, height: f64, walkable: Option<Value>) -> GridSpec {
        GridSpec {
            origin: [0.0, 0.0],
            cell_size: Some(1.0),
            width,
            height,
            walkable,
        }
    }

    #[test]
    fn rle_walkable_pads_with_open_cells() {
        let parsed = parse_rle_walkable("rle:2*0, 1 , 1x0", 6);
        assert_eq!(parsed, Some(vec![0, 0, 1, 0, 1, 1]));
    }

    #[test]
    fn rle_walkable_truncates_and_rejects_bad_tokens() {
        assert_eq!(parse_rle_walkable("rle:5:0", 3), Some(vec![0, 0, 0]));
        assert_eq!(parse_rle_walkable("rle:3*2", 3), None);
        assert_eq!(parse_rle_walkable("rle:", 3), None);
        assert_eq!(parse_rle_walkable("0,1", 3), None);
    }

    #[test]
    fn bit_string_must_match_cell_count() {
        let grid = NavGrid::from_spec(&spec(2.0, 2.0, Some(Value::from("0110"))));
        assert_eq!(grid.view().walkable, vec![0, 1, 1, 0]);
        assert_eq!(grid.blocked_cell_count(), 2);

        let loose = NavGrid::from_spec(&spec(2.0, 2.0, Some(Value::from("011"))));
        assert_eq!(loose.blocked_cell_count(), 0);
    }

    #[test]
    fn array_walkable_is_copied_up_to_cell_count() {
        let raw = serde_json::json!([1, 0, 2, 0, 0, 0]);
        let grid = NavGrid::from_spec(&spec(2.0, 2.0, Some(raw)));
        assert_eq!(grid.view().walkable, vec![1, 0, 1, 0]);
    }

    #[test]
    fn degenerate_dimensions_and_cell_size_fall_back() {
        let grid = NavGrid::from_spec(&GridSpec {
            origin: [0.0, 0.0],
            cell_size: Some(-1.0),
            width: 0.0,
            height: 2.7,
            walkable: None,
        });
        assert_eq!(grid.width(), 1);
        assert_eq!(grid.height(), 2);
        assert!((grid.cell_size() - DEFAULT_CELL_SIZE).abs() < f64::EPSILON);
    }

    #[test]
    fn world_and_cell_conversions() {
        let grid = NavGrid::from_spec(&spec(4.0, 4.0, None));
        assert_eq!(grid.world_to_cell([2.5, 0.0, 1.5]), Some(GridCell::new(2, 1)));
        assert_eq!(grid.world_to_cell([4.5, 0.0, 1.5]), None);
        assert_eq!(grid.clamped_cell([9.0, 0.0, -3.0]), GridCell::new(3, 0));
        assert_eq!(grid.cell_to_world(GridCell::new(2, 1), 0.0), [2.5, 0.0, 1.5]);
        assert_eq!(grid.cell_at(5), Some(GridCell::new(1, 1)));
    }
}
