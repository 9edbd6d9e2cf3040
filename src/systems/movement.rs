//! Obstacle resolution between entities and against the ground.
//!
//! Movement itself belongs to the movement collaborators; this module only
//! answers "may this entity stand there?" and applies moves that pass.

use bevy_ecs::prelude::*;

use crate::components::{Activity, Bomb, Bounds, EntityType, Layer};
use crate::custom_entity::CustomEntity;
use crate::error::EntityError;
use crate::ground::{Ground, GroundGrid};
use crate::script::ScriptRuntime;
use crate::spatial::SpatialGrid;
use crate::systems::lifecycle::{is_pending_removal, relocate, require_live, view_of};
use crate::traversal::{is_obstacle_by_default, traversable_by_default};

/// Whether `obstacle` blocks `mover`.
///
/// Resolution order: the obstacle's `traversable_by` rule when it is a custom
/// entity, then the mover's `can_traverse` rule when the mover is a custom
/// entity, then the built-in tables. Script rules that fail deny traversal.
pub fn is_obstacle_for(world: &World, runtime: &mut ScriptRuntime, obstacle: Entity, mover: Entity) -> bool {
    if obstacle == mover || is_pending_removal(world, obstacle) {
        return false;
    }
    let enabled = world.get::<Activity>(obstacle).map(|a| a.enabled).unwrap_or(false);
    if !enabled || world.get::<Layer>(obstacle) != world.get::<Layer>(mover) {
        return false;
    }
    let (Some(&obstacle_kind), Some(&mover_kind)) =
        (world.get::<EntityType>(obstacle), world.get::<EntityType>(mover))
    else {
        return false;
    };

    let mover_rule = |kind: EntityType| {
        world
            .get::<CustomEntity>(mover)
            .and_then(|custom| custom.can_traverse().rule_for(kind))
    };

    if let Some(custom) = world.get::<CustomEntity>(obstacle) {
        if let Some(rule) = custom.traversable_by().rule_for(mover_kind) {
            return !evaluate(world, runtime, rule, obstacle, mover);
        }
        if let Some(rule) = mover_rule(EntityType::CustomEntity) {
            return !evaluate(world, runtime, rule, mover, obstacle);
        }
        return !traversable_by_default(mover_kind);
    }

    if let Some(rule) = mover_rule(obstacle_kind) {
        return !evaluate(world, runtime, rule, mover, obstacle);
    }

    if let Some(bomb) = world.get::<Bomb>(obstacle) {
        if !bomb.is_armed() {
            return false;
        }
    }
    is_obstacle_by_default(obstacle_kind, mover_kind)
}

/// Evaluate a rule set on `subject` about `candidate`.
fn evaluate(
    world: &World,
    runtime: &mut ScriptRuntime,
    rule: crate::traversal::TraversableRule,
    subject: Entity,
    candidate: Entity,
) -> bool {
    match (view_of(world, subject), view_of(world, candidate)) {
        (Some(subject), Some(candidate)) => rule.evaluate(runtime, &subject, &candidate).unwrap_or(false),
        _ => false,
    }
}

/// Whether `mover` accepts `ground` below it.
pub fn can_traverse_ground(world: &World, mover: Entity, ground: Ground) -> bool {
    if let Some(custom) = world.get::<CustomEntity>(mover) {
        return custom.can_traverse_ground(ground);
    }
    if world.get::<Bomb>(mover).is_some() {
        return Bomb::can_traverse_ground(ground);
    }
    !ground.is_obstacle_by_default()
}

/// Whether `mover` would hit the ground or another entity if its box were
/// `candidate`.
pub fn collides_at(world: &World, runtime: &mut ScriptRuntime, mover: Entity, candidate: Bounds) -> bool {
    let grounds = world.resource::<GroundGrid>().grounds_under(candidate);
    if grounds.iter().any(|&g| !can_traverse_ground(world, mover, g)) {
        return true;
    }
    let layer = world.get::<Layer>(mover).copied().unwrap_or_default();
    let nearby = world.resource::<SpatialGrid>().query_rect_on_layer(candidate, layer);
    nearby
        .iter()
        .filter(|entry| entry.entity != mover)
        .any(|entry| is_obstacle_for(world, runtime, entry.entity, mover))
}

/// Move `mover` by `(dx, dy)` unless the destination collides.
/// Returns whether the entity moved.
pub fn try_move(world: &mut World, runtime: &mut ScriptRuntime, mover: Entity, dx: i32, dy: i32) -> Result<bool, EntityError> {
    require_live(world, mover)?;
    let bounds = world
        .get::<Bounds>(mover)
        .copied()
        .ok_or(EntityError::NoSuchEntity(mover))?;
    let target = bounds.translated(dx, dy);
    if collides_at(world, runtime, mover, target) {
        return Ok(false);
    }
    relocate(world, mover, target)?;
    Ok(true)
}
