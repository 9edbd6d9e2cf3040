//! Grove - Map Entity Core
//!
//! Collision and traversal model for the map entities of a 2D
//! action-adventure engine: obstacle resolution, script-driven custom
//! entities, collision-test dispatch, bombs and ground effects, stepped on a
//! fixed tick. Uses `bevy_ecs` for the entity-component-system architecture.

pub mod api;
pub mod collision;
pub mod components;
pub mod custom_entity;
pub mod error;
pub mod ground;
pub mod logging;
pub mod script;
pub mod spatial;
pub mod systems;
pub mod traversal;
pub mod world;

pub use api::{CustomEntityDesc, MapWorld};
pub use collision::{BoundingBoxSprites, CollisionInfo, CollisionMode, CollisionTest, Detection, SpriteOverlap};
pub use components::*;
pub use custom_entity::CustomEntity;
pub use error::EntityError;
pub use ground::{Ground, GroundGrid};
pub use script::{
    EntityEvent, EntityView, EventKind, MapCommand, MapCommands, PredicateCall, ScriptCall, ScriptError,
    ScriptFailure, ScriptHost, ScriptRef, ScriptTable,
};
pub use spatial::{SpatialEntry, SpatialGrid};
pub use systems::{SimConfig, SimTick};
pub use traversal::TraversableRule;
pub use world::{EntitySnapshot, MapSnapshot};
