//! ECS components shared by every map entity.
//!
//! Components are pure data containers attached to entities. Behaviour that
//! needs the whole map (obstacle tests, collision dispatch) lives in
//! [`crate::api`] and [`crate::systems`].

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ground::Ground;

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Name of a map entity, unique by convention only.
#[derive(Component, Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EntityName(pub String);

/// Concrete category of a map entity.
#[derive(
    Component, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum EntityType {
    Hero,
    Npc,
    Enemy,
    Block,
    Chest,
    Destructible,
    Teletransporter,
    Stream,
    Stairs,
    Jumper,
    Sensor,
    Switch,
    Crystal,
    CrystalBlock,
    Separator,
    Bomb,
    Explosion,
    Fire,
    CustomEntity,
}

impl EntityType {
    pub const ALL: [EntityType; 19] = [
        EntityType::Hero,
        EntityType::Npc,
        EntityType::Enemy,
        EntityType::Block,
        EntityType::Chest,
        EntityType::Destructible,
        EntityType::Teletransporter,
        EntityType::Stream,
        EntityType::Stairs,
        EntityType::Jumper,
        EntityType::Sensor,
        EntityType::Switch,
        EntityType::Crystal,
        EntityType::CrystalBlock,
        EntityType::Separator,
        EntityType::Bomb,
        EntityType::Explosion,
        EntityType::Fire,
        EntityType::CustomEntity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EntityType::Hero => "hero",
            EntityType::Npc => "npc",
            EntityType::Enemy => "enemy",
            EntityType::Block => "block",
            EntityType::Chest => "chest",
            EntityType::Destructible => "destructible",
            EntityType::Teletransporter => "teletransporter",
            EntityType::Stream => "stream",
            EntityType::Stairs => "stairs",
            EntityType::Jumper => "jumper",
            EntityType::Sensor => "sensor",
            EntityType::Switch => "switch",
            EntityType::Crystal => "crystal",
            EntityType::CrystalBlock => "crystal_block",
            EntityType::Separator => "separator",
            EntityType::Bomb => "bomb",
            EntityType::Explosion => "explosion",
            EntityType::Fire => "fire",
            EntityType::CustomEntity => "custom_entity",
        }
    }

    /// Short-lived effects that pass through everything solid.
    pub fn is_effect(&self) -> bool {
        matches!(self, EntityType::Explosion | EntityType::Fire)
    }
}

/// Map layer. Entities only collide with entities on the same layer.
#[derive(
    Component,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
)]
pub enum Layer {
    #[default]
    Low,
    Intermediate,
    High,
}

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// Axis-aligned bounding box in pixels. `x`/`y` is the top-left corner.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// First column to the right of the box.
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// First row below the box.
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// The point the entity stands on: horizontally centred, on the bottom row.
    pub fn origin(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.bottom() - 1)
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Whether `other` lies entirely inside this box.
    pub fn contains(&self, other: &Bounds) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Whether the two boxes share at least one pixel.
    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// The pixel just outside the box in the given direction.
    pub fn facing_point(&self, direction: Direction4) -> (i32, i32) {
        let (cx, cy) = self.center();
        match direction {
            Direction4::Right => (self.right(), cy),
            Direction4::Up => (cx, self.y - 1),
            Direction4::Left => (self.x - 1, cy),
            Direction4::Down => (cx, self.bottom()),
        }
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }
}

/// One of the four sprite directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction4 {
    #[default]
    Right,
    Up,
    Left,
    Down,
}

impl Direction4 {
    pub const ALL: [Direction4; 4] = [
        Direction4::Right,
        Direction4::Up,
        Direction4::Left,
        Direction4::Down,
    ];

    /// Direction for a sprite direction index; indexes wrap every four.
    pub fn from_index(index: u8) -> Self {
        match index % 4 {
            0 => Direction4::Right,
            1 => Direction4::Up,
            2 => Direction4::Left,
            _ => Direction4::Down,
        }
    }
}

// ============================================================================
// LIFECYCLE COMPONENTS
// ============================================================================

/// Enabled and suspended flags. The two are orthogonal.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub enabled: bool,
    pub suspended: bool,
    /// Tick at which the current suspension started.
    pub suspended_since: u64,
}

impl Default for Activity {
    fn default() -> Self {
        Self {
            enabled: true,
            suspended: false,
            suspended_since: 0,
        }
    }
}

impl Activity {
    /// Enabled and not suspended: the entity is simulated this tick.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.suspended
    }
}

/// Creation rank of an entity on its map. Ranks are never reused, unlike
/// entity slots.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpawnOrder(pub u64);

/// Animation state kept for the sprite collaborator.
#[derive(Component, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpriteState {
    pub sprite_id: String,
    pub animation: String,
    pub direction: u8,
    pub num_directions: u8,
    pub frame: u32,
    pub num_frames: u32,
    /// Ticks per frame; 0 freezes the animation.
    pub frame_delay: u64,
    /// Absolute tick of the next frame change.
    pub next_frame_date: u64,
}

impl SpriteState {
    pub fn new(sprite_id: impl Into<String>, now: u64) -> Self {
        Self {
            sprite_id: sprite_id.into(),
            animation: "stopped".to_string(),
            direction: 0,
            num_directions: 4,
            frame: 0,
            num_frames: 1,
            frame_delay: 0,
            next_frame_date: now,
        }
    }

    pub fn with_frames(mut self, num_frames: u32, frame_delay: u64) -> Self {
        self.num_frames = num_frames.max(1);
        self.frame_delay = frame_delay;
        self.next_frame_date = self.next_frame_date.saturating_add(frame_delay);
        self
    }

    /// Advance frames whose date has passed.
    pub fn advance(&mut self, now: u64) {
        if self.frame_delay == 0 {
            return;
        }
        while now >= self.next_frame_date && self.next_frame_date < u64::MAX {
            self.frame = (self.frame + 1) % self.num_frames;
            self.next_frame_date = self.next_frame_date.saturating_add(self.frame_delay);
        }
    }

    pub fn shift_deadlines(&mut self, delta: u64) {
        self.next_frame_date = self.next_frame_date.saturating_add(delta);
    }
}

/// Short-lived effect (explosion, fire) removed once `end_date` is reached.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEffect {
    pub end_date: u64,
}

impl TimedEffect {
    pub fn is_over(&self, now: u64) -> bool {
        now >= self.end_date
    }

    pub fn shift_deadlines(&mut self, delta: u64) {
        self.end_date = self.end_date.saturating_add(delta);
    }
}

/// Conveyor displacing what stands on it by `(dx, dy)` every tick.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stream {
    pub dx: i32,
    pub dy: i32,
}

/// Ground last seen below an entity that reacts to ground changes.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundObserver {
    pub ground_below: Ground,
}

// ============================================================================
// BOMB
// ============================================================================

/// Timer state of a bomb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BombState {
    #[default]
    Armed,
    Exploded,
}

/// A bomb that explodes once its fuse has burnt.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bomb {
    /// Absolute tick at which the bomb explodes.
    pub explosion_date: u64,
    pub state: BombState,
}

impl Bomb {
    pub fn new(now: u64, fuse_ticks: u64) -> Self {
        Self {
            explosion_date: now.saturating_add(fuse_ticks),
            state: BombState::Armed,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.state == BombState::Armed
    }

    pub fn should_explode(&self, now: u64) -> bool {
        self.is_armed() && now >= self.explosion_date
    }

    pub fn shift_deadlines(&mut self, delta: u64) {
        self.explosion_date = self.explosion_date.saturating_add(delta);
    }

    /// Bombs are only stopped by walls; they can be pushed onto water,
    /// holes, lava, prickles and ladders.
    pub fn can_traverse_ground(ground: Ground) -> bool {
        !(ground.is_wall() || ground == Ground::LowWall)
    }
}

// ============================================================================
// BUNDLE HELPERS
// ============================================================================

/// Components every map entity carries.
#[derive(Bundle)]
pub struct MapEntityBundle {
    pub name: EntityName,
    pub kind: EntityType,
    pub layer: Layer,
    pub bounds: Bounds,
    pub activity: Activity,
    pub sprite: SpriteState,
}

impl MapEntityBundle {
    pub fn new(kind: EntityType, name: impl Into<String>, layer: Layer, bounds: Bounds, now: u64) -> Self {
        Self {
            name: EntityName(name.into()),
            kind,
            layer,
            bounds,
            activity: Activity::default(),
            sprite: SpriteState::new(kind.name(), now),
        }
    }
}

/// Bundle for spawning an armed bomb.
#[derive(Bundle)]
pub struct BombBundle {
    pub base: MapEntityBundle,
    pub bomb: Bomb,
    pub observer: GroundObserver,
}

impl BombBundle {
    /// Bomb sprites are 16x16 with their origin 8 pixels right of and
    /// 13 pixels below the top-left corner.
    pub fn new(name: impl Into<String>, layer: Layer, x: i32, y: i32, now: u64, fuse_ticks: u64) -> Self {
        let bounds = Bounds::new(x - 8, y - 13, 16, 16);
        Self {
            base: MapEntityBundle::new(EntityType::Bomb, name, layer, bounds, now),
            bomb: Bomb::new(now, fuse_ticks),
            observer: GroundObserver {
                ground_below: Ground::Traversable,
            },
        }
    }
}

/// Bundle for spawning an explosion or a fire.
#[derive(Bundle)]
pub struct EffectBundle {
    pub base: MapEntityBundle,
    pub effect: TimedEffect,
}

impl EffectBundle {
    /// Effect of `size` pixels centred on `(cx, cy)`.
    pub fn new(kind: EntityType, layer: Layer, cx: i32, cy: i32, size: i32, now: u64, duration: u64) -> Self {
        let bounds = Bounds::new(cx - size / 2, cy - size / 2, size, size);
        Self {
            base: MapEntityBundle::new(kind, kind.name(), layer, bounds, now),
            effect: TimedEffect {
                end_date: now.saturating_add(duration),
            },
        }
    }
}
