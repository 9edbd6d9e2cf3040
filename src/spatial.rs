//! Spatial partitioning for rectangle queries.
//!
//! Each entity is registered in every cell its bounding box touches, so a
//! rectangle query only visits the cells it covers instead of every entity.

use bevy_ecs::prelude::*;
use std::collections::{BTreeSet, HashMap};

use crate::components::{Activity, Bounds, Layer};

/// Grid-based spatial partitioning structure.
#[derive(Resource, Debug)]
pub struct SpatialGrid {
    /// Cell size in pixels.
    pub cell_size: i32,
    cells: HashMap<(i32, i32), Vec<SpatialEntry>>,
    /// Reverse lookup: entity to the cells it occupies.
    entity_cells: HashMap<Entity, Vec<(i32, i32)>>,
}

/// Entry in a spatial cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialEntry {
    pub entity: Entity,
    pub bounds: Bounds,
    pub layer: Layer,
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(32)
    }
}

impl SpatialGrid {
    pub fn new(cell_size: i32) -> Self {
        Self {
            cell_size: cell_size.max(1),
            cells: HashMap::new(),
            entity_cells: HashMap::new(),
        }
    }

    #[inline]
    pub fn world_to_cell(&self, x: i32, y: i32) -> (i32, i32) {
        (x.div_euclid(self.cell_size), y.div_euclid(self.cell_size))
    }

    fn cells_of(&self, bounds: &Bounds) -> Vec<(i32, i32)> {
        let (x0, y0) = self.world_to_cell(bounds.x, bounds.y);
        let (x1, y1) = self.world_to_cell(
            bounds.right().max(bounds.x + 1) - 1,
            bounds.bottom().max(bounds.y + 1) - 1,
        );
        let mut cells = Vec::new();
        for cy in y0..=y1 {
            for cx in x0..=x1 {
                cells.push((cx, cy));
            }
        }
        cells
    }

    /// Clear all entries (start of each tick, before rebuilding).
    pub fn clear(&mut self) {
        self.cells.clear();
        self.entity_cells.clear();
    }

    /// Insert or move an entity.
    pub fn insert(&mut self, entity: Entity, bounds: Bounds, layer: Layer) {
        self.remove(entity);
        let cells = self.cells_of(&bounds);
        let entry = SpatialEntry {
            entity,
            bounds,
            layer,
        };
        for cell in &cells {
            self.cells.entry(*cell).or_default().push(entry);
        }
        self.entity_cells.insert(entity, cells);
    }

    pub fn remove(&mut self, entity: Entity) {
        if let Some(cells) = self.entity_cells.remove(&entity) {
            for cell in cells {
                if let Some(entries) = self.cells.get_mut(&cell) {
                    entries.retain(|e| e.entity != entity);
                }
            }
        }
    }

    /// Entities whose box overlaps `area`, in stable entity order.
    pub fn query_rect(&self, area: Bounds) -> Vec<SpatialEntry> {
        let mut seen = BTreeSet::new();
        let mut results = Vec::new();
        for cell in self.cells_of(&area) {
            let Some(entries) = self.cells.get(&cell) else {
                continue;
            };
            for entry in entries {
                if entry.bounds.overlaps(&area) && seen.insert(entry.entity) {
                    results.push(*entry);
                }
            }
        }
        results.sort_by_key(|e| e.entity);
        results
    }

    /// Like [`Self::query_rect`], restricted to one layer.
    pub fn query_rect_on_layer(&self, area: Bounds, layer: Layer) -> Vec<SpatialEntry> {
        let mut results = self.query_rect(area);
        results.retain(|e| e.layer == layer);
        results
    }

    pub fn cell_count(&self, cell: (i32, i32)) -> usize {
        self.cells.get(&cell).map(|v| v.len()).unwrap_or(0)
    }

    pub fn total_count(&self) -> usize {
        self.entity_cells.len()
    }
}

/// System that rebuilds the spatial grid each tick from enabled entities.
pub fn spatial_grid_update_system(
    mut grid: ResMut<SpatialGrid>,
    query: Query<(Entity, &Bounds, &Layer, &Activity)>,
) {
    grid.clear();
    for (entity, bounds, layer, activity) in query.iter() {
        if activity.enabled {
            grid.insert(entity, *bounds, *layer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spatial_grid_insert_query() {
        let mut grid = SpatialGrid::new(16);

        let e1 = Entity::from_raw(1);
        let e2 = Entity::from_raw(2);
        let e3 = Entity::from_raw(3);

        grid.insert(e1, Bounds::new(0, 0, 16, 16), Layer::Low);
        grid.insert(e2, Bounds::new(10, 10, 40, 8), Layer::Low);
        grid.insert(e3, Bounds::new(100, 100, 8, 8), Layer::High);

        let nearby = grid.query_rect(Bounds::new(0, 0, 20, 20));
        assert_eq!(nearby.len(), 2);
        assert_eq!(nearby[0].entity, e1);

        // e2 spans several cells but is reported once.
        let nearby = grid.query_rect(Bounds::new(0, 8, 64, 16));
        assert_eq!(nearby.iter().filter(|e| e.entity == e2).count(), 1);

        assert!(grid
            .query_rect_on_layer(Bounds::new(96, 96, 16, 16), Layer::Low)
            .is_empty());
        assert_eq!(grid.query_rect(Bounds::new(96, 96, 16, 16)).len(), 1);
    }

    #[test]
    fn test_move_and_remove() {
        let mut grid = SpatialGrid::new(16);
        let e1 = Entity::from_raw(1);
        grid.insert(e1, Bounds::new(0, 0, 8, 8), Layer::Low);
        grid.insert(e1, Bounds::new(64, 64, 8, 8), Layer::Low);
        assert_eq!(grid.cell_count((0, 0)), 0);
        assert_eq!(grid.total_count(), 1);

        grid.remove(e1);
        assert!(grid.query_rect(Bounds::new(64, 64, 8, 8)).is_empty());
        assert_eq!(grid.total_count(), 0);
    }

    #[test]
    fn test_negative_coordinates() {
        let grid = SpatialGrid::new(16);
        assert_eq!(grid.world_to_cell(-1, -17), (-1, -2));
    }
}
