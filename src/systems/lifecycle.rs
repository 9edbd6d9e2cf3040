//! Lifecycle transitions and script command application.
//!
//! These helpers run with exclusive world access. Callers that already hold
//! the [`ScriptRuntime`] (taken out with `World::resource_scope`) pass it in,
//! which is why none of them fetch it from the world themselves.

use std::collections::{BTreeSet, VecDeque};

use bevy_ecs::prelude::*;
use log::{debug, trace, warn};

use crate::components::{
    Activity, Bomb, Bounds, EntityName, EntityType, GroundObserver, Layer, SpawnOrder, SpriteState, TimedEffect,
};
use crate::custom_entity::CustomEntity;
use crate::error::EntityError;
use crate::ground::GroundGrid;
use crate::script::{EntityEvent, EntityView, MapCommand, MapCommands, ScriptCall, ScriptRuntime};
use crate::spatial::SpatialGrid;
use crate::systems::clock::{SimConfig, SimTick};
use crate::systems::ground::sync_ground_overlays;

/// Entities marked for removal, despawned at the end of the tick.
#[derive(Resource, Debug, Clone, Default)]
pub struct PendingRemovals(BTreeSet<Entity>);

impl PendingRemovals {
    /// Returns false when the entity was already pending.
    pub fn mark(&mut self, entity: Entity) -> bool {
        self.0.insert(entity)
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.0.contains(&entity)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Take every pending entity, in entity order.
    pub fn take(&mut self) -> Vec<Entity> {
        std::mem::take(&mut self.0).into_iter().collect()
    }
}

/// Next creation rank handed out on this map.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SpawnSequence(u64);

/// Stamp a newly spawned entity with the next creation rank. Does nothing on
/// worlds without a [`SpawnSequence`].
pub fn stamp_spawn_order(world: &mut World, entity: Entity) {
    if world.get::<SpawnOrder>(entity).is_some() || world.get_entity(entity).is_err() {
        return;
    }
    let order = {
        let Some(mut sequence) = world.get_resource_mut::<SpawnSequence>() else {
            return;
        };
        sequence.0 += 1;
        SpawnOrder(sequence.0 - 1)
    };
    if let Ok(mut entity) = world.get_entity_mut(entity) {
        entity.insert(order);
    }
}

/// Sort entities in creation order. Entities without a rank come first, in
/// slot order.
pub fn sort_by_spawn_order(world: &World, entities: &mut [Entity]) {
    entities.sort_by_key(|&entity| (world.get::<SpawnOrder>(entity).copied(), entity));
}

/// Current tick.
pub fn now(world: &World) -> u64 {
    world.get_resource::<SimTick>().map(|t| t.0).unwrap_or(0)
}

/// Read-only view of an entity for scripts.
pub fn view_of(world: &World, entity: Entity) -> Option<EntityView> {
    let name = world.get::<EntityName>(entity)?;
    let kind = world.get::<EntityType>(entity)?;
    let layer = world.get::<Layer>(entity)?;
    let bounds = world.get::<Bounds>(entity)?;
    let direction = world.get::<SpriteState>(entity).map(|s| s.direction).unwrap_or(0);
    Some(EntityView {
        entity,
        name: name.0.clone(),
        kind: *kind,
        layer: *layer,
        bounds: *bounds,
        direction,
    })
}

pub fn is_pending_removal(world: &World, entity: Entity) -> bool {
    world
        .get_resource::<PendingRemovals>()
        .map(|p| p.contains(entity))
        .unwrap_or(false)
}

/// The entity exists and is not waiting for removal.
pub fn is_live(world: &World, entity: Entity) -> bool {
    world.get::<EntityType>(entity).is_some() && !is_pending_removal(world, entity)
}

pub fn require_live(world: &World, entity: Entity) -> Result<(), EntityError> {
    if is_live(world, entity) {
        Ok(())
    } else {
        Err(EntityError::NoSuchEntity(entity))
    }
}

/// Enabled, not suspended and not pending removal.
pub fn is_active(world: &World, entity: Entity) -> bool {
    is_live(world, entity)
        && world
            .get::<Activity>(entity)
            .map(Activity::is_active)
            .unwrap_or(false)
}

/// Mark an entity for removal. Returns false if it was already pending.
pub fn mark_removed(world: &mut World, entity: Entity) -> bool {
    if world.get::<EntityType>(entity).is_none() {
        return false;
    }
    let marked = world.resource_mut::<PendingRemovals>().mark(entity);
    if marked {
        debug!("Entity {:?} marked for removal", entity);
    }
    marked
}

/// Run the scripted hook of `entity` for `event`, if it has one.
///
/// Commands requested by the hook are appended to `out`. Returns whether the
/// hook reported the event as handled.
pub fn notify_event_queued(
    world: &World,
    runtime: &mut ScriptRuntime,
    entity: Entity,
    event: EntityEvent,
    out: &mut MapCommands,
) -> bool {
    let Some(func) = world
        .get::<CustomEntity>(entity)
        .and_then(|custom| custom.event(event.kind()))
    else {
        return false;
    };
    let Some(view) = view_of(world, entity) else {
        return false;
    };
    trace!("Event {:?} on '{}'", event, view.name);
    runtime.invoke_logged(func, ScriptCall::Event { subject: &view, event }, out)
}

/// Run a hook and apply what it requested.
pub fn notify_event(world: &mut World, runtime: &mut ScriptRuntime, entity: Entity, event: EntityEvent) -> bool {
    let mut out = MapCommands::default();
    let handled = notify_event_queued(world, runtime, entity, event, &mut out);
    apply_commands(world, runtime, out);
    handled
}

/// Run the model initializer then the `on_created` hook of a new custom
/// entity.
pub fn notify_creating(world: &mut World, runtime: &mut ScriptRuntime, entity: Entity) -> Result<(), EntityError> {
    require_live(world, entity)?;
    let view = view_of(world, entity).ok_or(EntityError::NoSuchEntity(entity))?;
    if let Some(mut custom) = world.entity_mut(entity).take::<CustomEntity>() {
        if let Some(model) = custom.model.clone() {
            runtime.init_model(&model, &view, &mut custom);
        }
        world.entity_mut(entity).insert(custom);
    }
    notify_event(world, runtime, entity, EntityEvent::Created);
    Ok(())
}

pub fn set_enabled_queued(
    world: &mut World,
    runtime: &mut ScriptRuntime,
    entity: Entity,
    enabled: bool,
    out: &mut MapCommands,
) -> Result<(), EntityError> {
    require_live(world, entity)?;
    let Some(mut activity) = world.get_mut::<Activity>(entity) else {
        return Err(EntityError::NoSuchEntity(entity));
    };
    if activity.enabled == enabled {
        return Ok(());
    }
    activity.enabled = enabled;

    if let Some(mut custom) = world.get_mut::<CustomEntity>(entity) {
        custom.reset_collision_cache();
    }
    let bounds = world.get::<Bounds>(entity).copied();
    let layer = world.get::<Layer>(entity).copied();
    if let Some(mut grid) = world.get_resource_mut::<SpatialGrid>() {
        match (enabled, bounds, layer) {
            (true, Some(bounds), Some(layer)) => grid.insert(entity, bounds, layer),
            _ => grid.remove(entity),
        }
    }
    if world
        .get::<CustomEntity>(entity)
        .is_some_and(CustomEntity::is_ground_modifier)
    {
        sync_ground_overlays(world);
    }
    debug!("Entity {:?} enabled: {}", entity, enabled);
    notify_event_queued(world, runtime, entity, EntityEvent::Enabled(enabled), out);
    Ok(())
}

pub fn set_enabled(world: &mut World, runtime: &mut ScriptRuntime, entity: Entity, enabled: bool) -> Result<(), EntityError> {
    let mut out = MapCommands::default();
    set_enabled_queued(world, runtime, entity, enabled, &mut out)?;
    apply_commands(world, runtime, out);
    Ok(())
}

/// Suspend or resume an entity. On resume, every stored deadline moves
/// forward by the time spent suspended.
pub fn set_suspended_queued(
    world: &mut World,
    runtime: &mut ScriptRuntime,
    entity: Entity,
    suspended: bool,
    out: &mut MapCommands,
) -> Result<(), EntityError> {
    require_live(world, entity)?;
    let now = now(world);
    let Some(mut activity) = world.get_mut::<Activity>(entity) else {
        return Err(EntityError::NoSuchEntity(entity));
    };
    if activity.suspended == suspended {
        return Ok(());
    }
    activity.suspended = suspended;
    if suspended {
        activity.suspended_since = now;
    } else {
        let delta = now.saturating_sub(activity.suspended_since);
        shift_deadlines(world, entity, delta);
    }
    debug!("Entity {:?} suspended: {}", entity, suspended);
    notify_event_queued(world, runtime, entity, EntityEvent::Suspended(suspended), out);
    Ok(())
}

pub fn set_suspended(world: &mut World, runtime: &mut ScriptRuntime, entity: Entity, suspended: bool) -> Result<(), EntityError> {
    let mut out = MapCommands::default();
    set_suspended_queued(world, runtime, entity, suspended, &mut out)?;
    apply_commands(world, runtime, out);
    Ok(())
}

fn shift_deadlines(world: &mut World, entity: Entity, delta: u64) {
    if delta == 0 {
        return;
    }
    if let Some(mut bomb) = world.get_mut::<Bomb>(entity) {
        bomb.shift_deadlines(delta);
    }
    if let Some(mut sprite) = world.get_mut::<SpriteState>(entity) {
        sprite.shift_deadlines(delta);
    }
    if let Some(mut effect) = world.get_mut::<TimedEffect>(entity) {
        effect.shift_deadlines(delta);
    }
}

/// Move an entity and keep the spatial index current.
pub fn relocate(world: &mut World, entity: Entity, bounds: Bounds) -> Result<(), EntityError> {
    let Some(mut current) = world.get_mut::<Bounds>(entity) else {
        return Err(EntityError::NoSuchEntity(entity));
    };
    *current = bounds;
    let enabled = world.get::<Activity>(entity).map(|a| a.enabled).unwrap_or(false);
    let layer = world.get::<Layer>(entity).copied().unwrap_or_default();
    if enabled {
        if let Some(mut grid) = world.get_resource_mut::<SpatialGrid>() {
            grid.insert(entity, bounds, layer);
        }
    }
    if world
        .get::<CustomEntity>(entity)
        .is_some_and(CustomEntity::is_ground_modifier)
    {
        sync_ground_overlays(world);
    }
    Ok(())
}

/// Apply queued script commands. Hooks triggered by a command may queue
/// more; at most `max_command_cascade` commands are applied in total.
pub fn apply_commands(world: &mut World, runtime: &mut ScriptRuntime, mut commands: MapCommands) {
    if commands.is_empty() {
        return;
    }
    let limit = world
        .get_resource::<SimConfig>()
        .map(|c| c.max_command_cascade)
        .unwrap_or(64);
    let mut queue: VecDeque<MapCommand> = commands.drain().collect();
    let mut applied = 0;

    while let Some(command) = queue.pop_front() {
        if applied >= limit {
            warn!(
                "Dropping {} script commands: cascade limit of {} reached",
                queue.len() + 1,
                limit
            );
            break;
        }
        applied += 1;
        let mut follow_up = MapCommands::default();
        apply_command(world, runtime, command, &mut follow_up);
        queue.extend(follow_up.drain());
    }
}

fn apply_command(world: &mut World, runtime: &mut ScriptRuntime, command: MapCommand, out: &mut MapCommands) {
    let target = match command {
        MapCommand::Remove(e)
        | MapCommand::SetPosition { entity: e, .. }
        | MapCommand::Translate { entity: e, .. }
        | MapCommand::SetEnabled { entity: e, .. }
        | MapCommand::ClearCollisionTests(e)
        | MapCommand::SetModifiedGround { entity: e, .. } => Some(e),
        MapCommand::SetGround { .. } => None,
    };
    if let Some(entity) = target {
        if !is_live(world, entity) {
            debug!("Ignoring {:?}: entity is gone", command);
            return;
        }
    }

    let result = match command {
        MapCommand::Remove(entity) => {
            mark_removed(world, entity);
            Ok(())
        }
        MapCommand::SetPosition { entity, x, y } => match world.get::<Bounds>(entity).copied() {
            Some(bounds) => relocate(world, entity, Bounds { x, y, ..bounds }),
            None => Err(EntityError::NoSuchEntity(entity)),
        },
        MapCommand::Translate { entity, dx, dy } => match world.get::<Bounds>(entity).copied() {
            Some(bounds) => relocate(world, entity, bounds.translated(dx, dy)),
            None => Err(EntityError::NoSuchEntity(entity)),
        },
        MapCommand::SetEnabled { entity, enabled } => set_enabled_queued(world, runtime, entity, enabled, out),
        MapCommand::ClearCollisionTests(entity) => match world.get_mut::<CustomEntity>(entity) {
            Some(mut custom) => {
                custom.clear_collision_tests();
                Ok(())
            }
            None => Err(EntityError::unsupported("only custom entities have collision tests")),
        },
        MapCommand::SetModifiedGround { entity, ground } => {
            let changed = world
                .get_mut::<CustomEntity>(entity)
                .map(|mut custom| custom.set_modified_ground(ground))
                .is_some();
            if changed {
                sync_ground_overlays(world);
                Ok(())
            } else {
                Err(EntityError::unsupported("only custom entities modify the ground"))
            }
        }
        MapCommand::SetGround { x, y, ground } => {
            let mut grid = world.resource_mut::<GroundGrid>();
            match grid.world_to_cell(x, y) {
                Some((cx, cy)) => {
                    grid.set_cell(cx, cy, ground);
                    Ok(())
                }
                None => Err(EntityError::invalid(format!("no ground cell at ({x}, {y})"))),
            }
        }
    };
    if let Err(err) = result {
        warn!("Script command {:?} failed: {}", command, err);
    }
}

/// Observed ground reset for a freshly created entity.
pub fn init_ground_observer(world: &mut World, entity: Entity) {
    let Some(bounds) = world.get::<Bounds>(entity).copied() else {
        return;
    };
    let (x, y) = bounds.origin();
    let ground = world.resource::<GroundGrid>().ground_at(x, y);
    if let Some(mut observer) = world.get_mut::<GroundObserver>(entity) {
        observer.ground_below = ground;
    }
}
