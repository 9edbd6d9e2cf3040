//! Ground classification of map cells.
//!
//! The map is a grid of cells, each holding one [`Ground`] kind. Ground
//! modifier entities lay rectangles of their own ground on top of the grid;
//! the most recently registered modifier covering a point wins. Points outside
//! the grid read as [`Ground::Wall`].

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::Bounds;
use crate::error::EntityError;

/// Distance in pixels between ground samples taken under a bounding box.
pub const GROUND_SAMPLE_STEP: i32 = 8;

/// Terrain kind of a map cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Ground {
    /// Nothing specific; behaves like traversable ground.
    Empty,
    /// Normal walkable ground.
    #[default]
    Traversable,
    /// Solid wall.
    Wall,
    /// Wall that projectiles fly over but walkers cannot cross.
    LowWall,
    /// Diagonal wall with its solid half on the top-right.
    WallTopRight,
    /// Diagonal wall with its solid half on the top-left.
    WallTopLeft,
    /// Diagonal wall with its solid half on the bottom-left.
    WallBottomLeft,
    /// Diagonal wall with its solid half on the bottom-right.
    WallBottomRight,
    /// Water shallow enough to walk in.
    ShallowWater,
    /// Water that requires swimming.
    DeepWater,
    /// Tall grass.
    Grass,
    /// A hole to fall into.
    Hole,
    /// Slippery ground.
    Ice,
    /// Ladder.
    Ladder,
    /// Spikes hurting walkers.
    Prickles,
    /// Lava.
    Lava,
}

impl Ground {
    pub const ALL: [Ground; 16] = [
        Ground::Empty,
        Ground::Traversable,
        Ground::Wall,
        Ground::LowWall,
        Ground::WallTopRight,
        Ground::WallTopLeft,
        Ground::WallBottomLeft,
        Ground::WallBottomRight,
        Ground::ShallowWater,
        Ground::DeepWater,
        Ground::Grass,
        Ground::Hole,
        Ground::Ice,
        Ground::Ladder,
        Ground::Prickles,
        Ground::Lava,
    ];

    /// Whether this ground blocks entities that have no override for it.
    pub fn is_obstacle_by_default(&self) -> bool {
        match self {
            Ground::Empty
            | Ground::Traversable
            | Ground::ShallowWater
            | Ground::Grass
            | Ground::Ice
            | Ground::Ladder => false,
            Ground::Wall
            | Ground::LowWall
            | Ground::WallTopRight
            | Ground::WallTopLeft
            | Ground::WallBottomLeft
            | Ground::WallBottomRight
            | Ground::DeepWater
            | Ground::Hole
            | Ground::Prickles
            | Ground::Lava => true,
        }
    }

    pub fn is_wall(&self) -> bool {
        matches!(
            self,
            Ground::Wall
                | Ground::WallTopRight
                | Ground::WallTopLeft
                | Ground::WallBottomLeft
                | Ground::WallBottomRight
        )
    }

    /// Grounds that swallow objects lying on them.
    pub fn swallows_objects(&self) -> bool {
        matches!(self, Ground::DeepWater | Ground::Hole | Ground::Lava)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Ground::Empty => "empty",
            Ground::Traversable => "traversable",
            Ground::Wall => "wall",
            Ground::LowWall => "low_wall",
            Ground::WallTopRight => "wall_top_right",
            Ground::WallTopLeft => "wall_top_left",
            Ground::WallBottomLeft => "wall_bottom_left",
            Ground::WallBottomRight => "wall_bottom_right",
            Ground::ShallowWater => "shallow_water",
            Ground::DeepWater => "deep_water",
            Ground::Grass => "grass",
            Ground::Hole => "hole",
            Ground::Ice => "ice",
            Ground::Ladder => "ladder",
            Ground::Prickles => "prickles",
            Ground::Lava => "lava",
        }
    }

    /// Ground for one character of an ASCII map row.
    fn from_ascii(c: char) -> Option<Self> {
        let ground = match c {
            ' ' => Ground::Empty,
            '.' => Ground::Traversable,
            '#' => Ground::Wall,
            'w' => Ground::LowWall,
            '~' => Ground::ShallowWater,
            'W' => Ground::DeepWater,
            '"' => Ground::Grass,
            'O' => Ground::Hole,
            '_' => Ground::Ice,
            'H' => Ground::Ladder,
            '^' => Ground::Prickles,
            'L' => Ground::Lava,
            _ => return None,
        };
        Some(ground)
    }
}

/// A rectangle of ground laid over the grid by a modifier entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundOverlay {
    pub entity: Entity,
    pub bounds: Bounds,
    pub ground: Ground,
}

/// Grid of ground cells plus the ground-modifier overlay.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawGroundGrid")]
pub struct GroundGrid {
    /// Width of the grid in cells.
    width: usize,
    /// Height of the grid in cells.
    height: usize,
    /// Size of each square cell in pixels, at least 1.
    cell_size: i32,
    /// Grid cells (row-major order).
    cells: Vec<Ground>,
    /// Modifier rectangles, later entries on top.
    #[serde(skip)]
    overlays: Vec<GroundOverlay>,
}

/// Serialized form of a [`GroundGrid`], checked before use.
#[derive(Deserialize)]
struct RawGroundGrid {
    width: usize,
    height: usize,
    cell_size: i32,
    cells: Vec<Ground>,
}

impl TryFrom<RawGroundGrid> for GroundGrid {
    type Error = EntityError;

    fn try_from(raw: RawGroundGrid) -> Result<Self, Self::Error> {
        if raw.cell_size <= 0 {
            return Err(EntityError::invalid(format!("cell_size must be positive, got {}", raw.cell_size)));
        }
        let expected = raw
            .width
            .checked_mul(raw.height)
            .ok_or_else(|| EntityError::invalid(format!("grid of {}x{} cells is too large", raw.width, raw.height)))?;
        if raw.cells.len() != expected {
            return Err(EntityError::invalid(format!(
                "{}x{} grid needs {} cells, got {}",
                raw.width,
                raw.height,
                expected,
                raw.cells.len()
            )));
        }
        Ok(Self {
            width: raw.width,
            height: raw.height,
            cell_size: raw.cell_size,
            cells: raw.cells,
            overlays: Vec::new(),
        })
    }
}

impl Default for GroundGrid {
    fn default() -> Self {
        Self::new(40, 30, 16)
    }
}

impl GroundGrid {
    /// Create a grid filled with traversable ground.
    pub fn new(width: usize, height: usize, cell_size: i32) -> Self {
        Self {
            width,
            height,
            cell_size: cell_size.max(1),
            cells: vec![Ground::Traversable; width * height],
            overlays: Vec::new(),
        }
    }

    /// Build a grid from ASCII rows, one character per cell.
    ///
    /// `.` traversable, `#` wall, `w` low wall, `~` shallow water,
    /// `W` deep water, `"` grass, `O` hole, `_` ice, `H` ladder,
    /// `^` prickles, `L` lava, space empty. Short rows are padded with
    /// traversable ground.
    pub fn from_ascii(rows: &[&str], cell_size: i32) -> Result<Self, EntityError> {
        let width = rows.iter().map(|r| r.chars().count()).max().unwrap_or(0);
        let mut grid = Self::new(width, rows.len(), cell_size);
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                let ground = Ground::from_ascii(c).ok_or_else(|| {
                    EntityError::invalid(format!("unknown ground character {c:?} at ({x}, {y})"))
                })?;
                grid.set_cell(x, y, ground);
            }
        }
        Ok(grid)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cell_size(&self) -> i32 {
        self.cell_size
    }

    fn cell_index(&self, x: usize, y: usize) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(y * self.width + x)
        } else {
            None
        }
    }

    /// Get a cell by grid coordinates.
    pub fn get_cell(&self, x: usize, y: usize) -> Option<Ground> {
        self.cell_index(x, y).and_then(|i| self.cells.get(i).copied())
    }

    /// Set a cell by grid coordinates. Returns `false` outside the grid.
    pub fn set_cell(&mut self, x: usize, y: usize, ground: Ground) -> bool {
        match self.cell_index(x, y).and_then(|i| self.cells.get_mut(i)) {
            Some(cell) => {
                *cell = ground;
                true
            }
            None => false,
        }
    }

    /// Fill every cell intersecting `area` with `ground`.
    pub fn fill(&mut self, area: Bounds, ground: Ground) {
        for (x, y) in self.cells_covering(area) {
            self.set_cell(x, y, ground);
        }
    }

    /// Convert pixel coordinates to grid coordinates.
    pub fn world_to_cell(&self, x: i32, y: i32) -> Option<(usize, usize)> {
        if x < 0 || y < 0 {
            return None;
        }
        let gx = (x / self.cell_size) as usize;
        let gy = (y / self.cell_size) as usize;
        self.cell_index(gx, gy).map(|_| (gx, gy))
    }

    /// Grid cells intersecting a pixel rectangle, clipped to the grid.
    pub fn cells_covering(&self, area: Bounds) -> Vec<(usize, usize)> {
        if area.width <= 0 || area.height <= 0 || self.width == 0 || self.height == 0 {
            return Vec::new();
        }
        let max_x = (self.width as i32 - 1).max(0);
        let max_y = (self.height as i32 - 1).max(0);
        let x0 = (area.x.div_euclid(self.cell_size)).clamp(0, max_x);
        let y0 = (area.y.div_euclid(self.cell_size)).clamp(0, max_y);
        let x1 = ((area.right() - 1).div_euclid(self.cell_size)).clamp(0, max_x);
        let y1 = ((area.bottom() - 1).div_euclid(self.cell_size)).clamp(0, max_y);

        let mut cells = Vec::new();
        for gy in y0..=y1 {
            for gx in x0..=x1 {
                cells.push((gx as usize, gy as usize));
            }
        }
        cells
    }

    /// Ground stored in the grid at a pixel, ignoring modifiers.
    pub fn base_ground_at(&self, x: i32, y: i32) -> Ground {
        self.world_to_cell(x, y)
            .and_then(|(gx, gy)| self.get_cell(gx, gy))
            .unwrap_or(Ground::Wall)
    }

    /// Effective ground at a pixel: the topmost modifier covering it, else
    /// the grid cell.
    pub fn ground_at(&self, x: i32, y: i32) -> Ground {
        self.overlays
            .iter()
            .rev()
            .find(|overlay| overlay.bounds.contains_point(x, y))
            .map(|overlay| overlay.ground)
            .unwrap_or_else(|| self.base_ground_at(x, y))
    }

    /// Distinct effective grounds sampled under a rectangle.
    ///
    /// Samples every [`GROUND_SAMPLE_STEP`] pixels plus the far edges.
    pub fn grounds_under(&self, area: Bounds) -> Vec<Ground> {
        let mut grounds = Vec::new();
        for y in sample_axis(area.y, area.height) {
            for x in sample_axis(area.x, area.width) {
                let ground = self.ground_at(x, y);
                if !grounds.contains(&ground) {
                    grounds.push(ground);
                }
            }
        }
        grounds
    }

    /// Replace the modifier overlay.
    pub fn set_overlays(&mut self, overlays: Vec<GroundOverlay>) {
        self.overlays = overlays;
    }

    pub fn overlays(&self) -> &[GroundOverlay] {
        &self.overlays
    }

    /// Get world bounds in pixels.
    pub fn pixel_bounds(&self) -> Bounds {
        Bounds::new(
            0,
            0,
            self.width as i32 * self.cell_size,
            self.height as i32 * self.cell_size,
        )
    }
}

fn sample_axis(start: i32, length: i32) -> Vec<i32> {
    if length <= 0 {
        return Vec::new();
    }
    let last = start + length - 1;
    let mut points: Vec<i32> = (start..=last).step_by(GROUND_SAMPLE_STEP as usize).collect();
    if points.last() != Some(&last) {
        points.push(last);
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_creation() {
        let grid = GroundGrid::new(10, 8, 16);
        assert_eq!(grid.get_cell(0, 0), Some(Ground::Traversable));
        assert_eq!(grid.get_cell(10, 0), None);
        assert_eq!(grid.pixel_bounds(), Bounds::new(0, 0, 160, 128));
    }

    #[test]
    fn test_ascii_map() {
        let grid = GroundGrid::from_ascii(&["..L", "#W~"], 16).unwrap();
        assert_eq!(grid.ground_at(40, 0), Ground::Lava);
        assert_eq!(grid.ground_at(0, 20), Ground::Wall);
        assert_eq!(grid.ground_at(20, 20), Ground::DeepWater);
        assert_eq!(grid.ground_at(47, 31), Ground::ShallowWater);
    }

    #[test]
    fn test_ascii_map_rejects_unknown_characters() {
        let err = GroundGrid::from_ascii(&[".?"], 16).unwrap_err();
        assert!(matches!(err, EntityError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_outside_is_wall() {
        let grid = GroundGrid::new(2, 2, 16);
        assert_eq!(grid.ground_at(-1, 0), Ground::Wall);
        assert_eq!(grid.ground_at(32, 0), Ground::Wall);
    }

    #[test]
    fn test_overlay_wins_and_last_is_on_top() {
        let mut grid = GroundGrid::new(4, 4, 16);
        let area = Bounds::new(0, 0, 32, 32);
        grid.set_overlays(vec![
            GroundOverlay { entity: Entity::from_raw(1), bounds: area, ground: Ground::Ice },
            GroundOverlay {
                entity: Entity::from_raw(2),
                bounds: Bounds::new(16, 16, 16, 16),
                ground: Ground::Hole,
            },
        ]);
        assert_eq!(grid.ground_at(4, 4), Ground::Ice);
        assert_eq!(grid.ground_at(20, 20), Ground::Hole);
        assert_eq!(grid.base_ground_at(20, 20), Ground::Traversable);
        assert_eq!(grid.ground_at(40, 40), Ground::Traversable);
    }

    #[test]
    fn test_grounds_under_samples_far_edge() {
        let grid = GroundGrid::from_ascii(&["..", ".L"], 8).unwrap();
        let grounds = grid.grounds_under(Bounds::new(0, 0, 9, 9));
        assert!(grounds.contains(&Ground::Lava));
        let grounds = grid.grounds_under(Bounds::new(0, 0, 8, 8));
        assert_eq!(grounds, vec![Ground::Traversable]);
    }

    #[test]
    fn test_default_obstacle_table() {
        assert!(Ground::DeepWater.is_obstacle_by_default());
        assert!(!Ground::ShallowWater.is_obstacle_by_default());
        assert!(Ground::Lava.is_obstacle_by_default());
        assert!(!Ground::Ladder.is_obstacle_by_default());
        assert!(Ground::WallBottomLeft.is_wall());
    }
}
