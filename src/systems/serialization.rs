//! Serialization utilities for map state.

use crate::ground::GroundGrid;
use crate::world::MapSnapshot;

/// Serialize a snapshot to JSON bytes.
pub fn snapshot_to_json(snapshot: &MapSnapshot) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(snapshot)
}

/// Serialize a snapshot to a JSON string.
pub fn snapshot_to_json_string(snapshot: &MapSnapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(snapshot)
}

/// Deserialize a snapshot from JSON bytes.
pub fn snapshot_from_json(data: &[u8]) -> Result<MapSnapshot, serde_json::Error> {
    serde_json::from_slice(data)
}

/// Deserialize a snapshot from a JSON string.
pub fn snapshot_from_json_string(data: &str) -> Result<MapSnapshot, serde_json::Error> {
    serde_json::from_str(data)
}

/// Serialize the ground cells. Modifier overlays are runtime state and are
/// not included.
pub fn ground_to_json_string(grid: &GroundGrid) -> Result<String, serde_json::Error> {
    serde_json::to_string(grid)
}

pub fn ground_from_json_string(data: &str) -> Result<GroundGrid, serde_json::Error> {
    serde_json::from_str(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Bomb, Bounds, EntityType, Layer};
    use crate::ground::Ground;
    use crate::world::EntitySnapshot;

    #[test]
    fn test_snapshot_from_json() {
        let json = r#"{
            "tick": 42,
            "entities": [{
                "id": 4294967297,
                "name": "bomb",
                "kind": "Bomb",
                "layer": "Low",
                "bounds": { "x": 8, "y": 3, "width": 16, "height": 16 },
                "enabled": true,
                "suspended": false,
                "pending_removal": false,
                "sprite_direction": 0,
                "bomb": { "explosion_date": 192, "state": "Armed" }
            }]
        }"#;

        let snapshot = snapshot_from_json_string(json).unwrap();
        assert_eq!(snapshot.tick, 42);
        let bomb: &EntitySnapshot = snapshot.find("bomb").unwrap();
        assert_eq!(bomb.kind, EntityType::Bomb);
        assert_eq!(bomb.layer, Layer::Low);
        assert_eq!(bomb.bounds, Bounds::new(8, 3, 16, 16));
        assert_eq!(bomb.bomb.map(|b: Bomb| b.explosion_date), Some(192));
        assert!(bomb.custom.is_none());

        let bytes = snapshot_to_json(&snapshot).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn test_ground_cells_survive_json() {
        let grid = GroundGrid::from_ascii(&["..#", "~LO"], 16).unwrap();
        let json = ground_to_json_string(&grid).unwrap();
        let restored = ground_from_json_string(&json).unwrap();
        assert_eq!(restored.get_cell(2, 0), Some(Ground::Wall));
        assert_eq!(restored.get_cell(1, 1), Some(Ground::Lava));
        assert_eq!(restored.width(), 3);
        assert_eq!(restored.height(), 2);
    }

    #[test]
    fn test_ground_json_with_zero_cell_size_is_rejected() {
        let json = r#"{"width": 2, "height": 1, "cell_size": 0, "cells": ["Traversable", "Wall"]}"#;
        let err = ground_from_json_string(json).unwrap_err();
        assert!(err.to_string().contains("cell_size must be positive"));
    }

    #[test]
    fn test_ground_json_with_missing_cells_is_rejected() {
        let json = r#"{"width": 3, "height": 2, "cell_size": 16, "cells": ["Traversable", "Wall"]}"#;
        let err = ground_from_json_string(json).unwrap_err();
        assert!(err.to_string().contains("needs 6 cells, got 2"));
    }

    #[test]
    fn test_ground_json_with_matching_cells_is_accepted() {
        let json = r#"{"width": 2, "height": 1, "cell_size": 8, "cells": ["Traversable", "Lava"]}"#;
        let grid = ground_from_json_string(json).unwrap();
        assert_eq!(grid.cell_size(), 8);
        assert_eq!(grid.ground_at(12, 4), Ground::Lava);
    }
}
