//! Collision tests, the edge-trigger cache and built-in detections.

use std::collections::HashSet;
use std::sync::Arc;

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::{Bounds, Direction4, EntityType};
use crate::script::{EntityView, ScriptRef};

/// Geometric collision checks, all asking "is `other` in `subject`?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollisionMode {
    /// The two boxes share a pixel.
    Overlapping,
    /// The other box lies entirely inside the subject.
    Containing,
    /// The other's origin point lies inside the subject.
    Origin,
    /// The other's center lies inside the subject.
    Center,
    /// The point in front of the other, along its facing direction, lies
    /// inside the subject.
    Facing,
    /// Any of the four points around the other lies inside the subject.
    Touching,
    /// The sprites overlap, as decided by the [`SpriteOverlap`] collaborator.
    Sprite,
}

impl CollisionMode {
    pub fn test(&self, subject: &EntityView, other: &EntityView, sprites: &dyn SpriteOverlap) -> bool {
        let area: &Bounds = &subject.bounds;
        let them = &other.bounds;
        match self {
            CollisionMode::Overlapping => area.overlaps(them),
            CollisionMode::Containing => area.contains(them),
            CollisionMode::Origin => {
                let (x, y) = them.origin();
                area.contains_point(x, y)
            }
            CollisionMode::Center => {
                let (x, y) = them.center();
                area.contains_point(x, y)
            }
            CollisionMode::Facing => {
                let (x, y) = them.facing_point(Direction4::from_index(other.direction));
                area.contains_point(x, y)
            }
            CollisionMode::Touching => Direction4::ALL.iter().any(|&d| {
                let (x, y) = them.facing_point(d);
                area.contains_point(x, y)
            }),
            CollisionMode::Sprite => sprites.overlaps(subject, other),
        }
    }
}

/// A registered collision test: built-in geometry or a script predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollisionTest {
    BuiltIn(CollisionMode),
    Custom(ScriptRef),
}

impl CollisionTest {
    pub fn is_sprite(&self) -> bool {
        matches!(self, CollisionTest::BuiltIn(CollisionMode::Sprite))
    }
}

impl From<CollisionMode> for CollisionTest {
    fn from(mode: CollisionMode) -> Self {
        CollisionTest::BuiltIn(mode)
    }
}

/// One entry of a custom entity's collision-test list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionInfo {
    pub test: CollisionTest,
    pub callback: ScriptRef,
}

// ============================================================================
// SPRITE COLLABORATOR
// ============================================================================

/// Pixel-level sprite overlap, provided by the rendering side.
pub trait SpriteOverlap {
    fn overlaps(&self, a: &EntityView, b: &EntityView) -> bool;
}

/// Treats each sprite as its entity's bounding box.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundingBoxSprites;

impl SpriteOverlap for BoundingBoxSprites {
    fn overlaps(&self, a: &EntityView, b: &EntityView) -> bool {
        a.bounds.overlaps(&b.bounds)
    }
}

/// Resource holding the sprite collaborator.
#[derive(Resource, Clone)]
pub struct SpriteCollaborator(pub Arc<dyn SpriteOverlap + Send + Sync>);

impl Default for SpriteCollaborator {
    fn default() -> Self {
        Self(Arc::new(BoundingBoxSprites))
    }
}

// ============================================================================
// EDGE-TRIGGER CACHE
// ============================================================================

/// Positive `(test index, other)` pairs of the last two evaluated ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollisionCache {
    tick: Option<u64>,
    previous: HashSet<(usize, Entity)>,
    current: HashSet<(usize, Entity)>,
}

impl CollisionCache {
    /// Start evaluating `tick`. Pairs of the last evaluated tick become the
    /// previous set; calling again for the same tick keeps the current set.
    pub fn begin_tick(&mut self, tick: u64) {
        if self.tick == Some(tick) {
            return;
        }
        self.tick = Some(tick);
        self.previous = std::mem::take(&mut self.current);
    }

    /// Record a positive test and tell whether its callback fires.
    ///
    /// A pair fires at most once per tick. Edge-triggered pairs only fire
    /// when they were not positive on the previous evaluated tick.
    pub fn record_positive(&mut self, index: usize, other: Entity, level_triggered: bool) -> bool {
        let key = (index, other);
        if !self.current.insert(key) {
            return false;
        }
        level_triggered || !self.previous.contains(&key)
    }

    pub fn is_positive(&self, index: usize, other: Entity) -> bool {
        self.current.contains(&(index, other))
    }

    pub fn clear(&mut self) {
        self.previous.clear();
        self.current.clear();
    }

    /// Drop every pair involving `other`.
    pub fn forget(&mut self, other: Entity) {
        self.previous.retain(|(_, e)| *e != other);
        self.current.retain(|(_, e)| *e != other);
    }
}

// ============================================================================
// BUILT-IN DETECTIONS
// ============================================================================

/// A collision detected by a built-in entity, delivered to the receiver as a
/// typed hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Detection {
    Destructible,
    Teletransporter,
    Stream { dx: i32, dy: i32 },
    Stairs,
    Jumper,
    Sensor,
    Switch,
    Crystal,
    Chest,
    Block,
    Separator,
    Bomb,
    Explosion,
    Fire,
    Enemy,
}

impl Detection {
    /// Detection performed by an entity of type `kind`, if it detects anything.
    /// Streams carry their displacement, read from `stream`.
    pub fn for_detector(kind: EntityType, stream: Option<(i32, i32)>) -> Option<Self> {
        let detection = match kind {
            EntityType::Destructible => Detection::Destructible,
            EntityType::Teletransporter => Detection::Teletransporter,
            EntityType::Stream => {
                let (dx, dy) = stream.unwrap_or((0, 0));
                Detection::Stream { dx, dy }
            }
            EntityType::Stairs => Detection::Stairs,
            EntityType::Jumper => Detection::Jumper,
            EntityType::Sensor => Detection::Sensor,
            EntityType::Switch => Detection::Switch,
            EntityType::Crystal => Detection::Crystal,
            EntityType::Chest => Detection::Chest,
            EntityType::Block => Detection::Block,
            EntityType::Separator => Detection::Separator,
            EntityType::Bomb => Detection::Bomb,
            EntityType::Explosion => Detection::Explosion,
            EntityType::Fire => Detection::Fire,
            EntityType::Enemy => Detection::Enemy,
            EntityType::Hero
            | EntityType::Npc
            | EntityType::CrystalBlock
            | EntityType::CustomEntity => return None,
        };
        Some(detection)
    }

    /// The fixed collision mode this detector uses.
    pub fn mode(&self) -> CollisionMode {
        match self {
            Detection::Explosion | Detection::Fire | Detection::Crystal | Detection::Enemy => {
                CollisionMode::Sprite
            }
            Detection::Stream { .. } | Detection::Teletransporter => CollisionMode::Center,
            Detection::Sensor => CollisionMode::Containing,
            Detection::Switch | Detection::Stairs | Detection::Jumper | Detection::Separator => {
                CollisionMode::Overlapping
            }
            Detection::Chest | Detection::Block | Detection::Destructible | Detection::Bomb => {
                CollisionMode::Facing
            }
        }
    }
}
