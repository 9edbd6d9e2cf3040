//! Snapshot types.
//!
//! The `MapSnapshot` struct provides a serializable view of the map state
//! for debugging tools and tests.

use crate::components::*;
use crate::custom_entity::{CustomEntity, CustomEntityInfo};
use crate::systems::lifecycle::is_pending_removal;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Snapshot of a single entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Raw ECS id, stable for the entity's lifetime.
    pub id: u64,
    pub name: String,
    pub kind: EntityType,
    pub layer: Layer,
    pub bounds: Bounds,
    pub enabled: bool,
    pub suspended: bool,
    pub pending_removal: bool,
    pub sprite_direction: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bomb: Option<Bomb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomEntityInfo>,
}

/// Complete map state snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSnapshot {
    /// Current simulation tick.
    pub tick: u64,
    /// All entities, in entity order.
    pub entities: Vec<EntitySnapshot>,
}

impl MapSnapshot {
    /// Create a snapshot from the ECS world.
    pub fn from_world(world: &mut World, tick: u64) -> Self {
        let mut query = world.query::<(
            Entity,
            &EntityName,
            &EntityType,
            &Layer,
            &Bounds,
            &Activity,
            Option<&SpriteState>,
            Option<&Bomb>,
            Option<&CustomEntity>,
        )>();

        let mut entities: Vec<EntitySnapshot> = query
            .iter(world)
            .map(|(entity, name, kind, layer, bounds, activity, sprite, bomb, custom)| EntitySnapshot {
                id: entity.to_bits(),
                name: name.0.clone(),
                kind: *kind,
                layer: *layer,
                bounds: *bounds,
                enabled: activity.enabled,
                suspended: activity.suspended,
                pending_removal: false,
                sprite_direction: sprite.map(|s| s.direction).unwrap_or(0),
                bomb: bomb.copied(),
                custom: custom.map(CustomEntityInfo::from),
            })
            .collect();
        for snapshot in &mut entities {
            snapshot.pending_removal = is_pending_removal(world, Entity::from_bits(snapshot.id));
        }
        entities.sort_by_key(|e| e.id);

        Self { tick, entities }
    }

    pub fn find(&self, name: &str) -> Option<&EntitySnapshot> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty JSON string (for debugging).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
