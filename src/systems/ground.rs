//! Ground modifiers and ground observers.

use bevy_ecs::prelude::*;
use log::debug;

use crate::components::{Activity, Bomb, Bounds, GroundObserver, SpawnOrder};
use crate::custom_entity::CustomEntity;
use crate::ground::{Ground, GroundGrid, GroundOverlay};
use crate::script::{EntityEvent, MapCommands, ScriptRuntime};
use crate::systems::lifecycle::{
    apply_commands, is_active, is_pending_removal, mark_removed, notify_event_queued, sort_by_spawn_order,
};

/// Rebuild the ground overlay from every enabled ground modifier.
/// Entities created later are laid on top.
pub fn sync_ground_overlays(world: &mut World) {
    let mut query = world.query::<(Entity, &CustomEntity, &Bounds, &Activity)>();
    let mut overlays: Vec<GroundOverlay> = query
        .iter(world)
        .filter(|(_, _, _, activity)| activity.enabled)
        .filter_map(|(entity, custom, bounds, _)| {
            custom.modified_ground().ok().map(|ground| GroundOverlay {
                entity,
                bounds: *bounds,
                ground,
            })
        })
        .collect();
    overlays.retain(|overlay| !is_pending_removal(world, overlay.entity));
    overlays.sort_by_key(|overlay| (world.get::<SpawnOrder>(overlay.entity).copied(), overlay.entity));
    world.resource_mut::<GroundGrid>().set_overlays(overlays);
}

/// System wrapper around [`sync_ground_overlays`].
pub fn ground_modifier_system(world: &mut World) {
    sync_ground_overlays(world);
}

/// Poll the ground below every observer.
///
/// Custom entities with an `on_ground_below_changed` hook are notified. A
/// bomb that lands on a ground swallowing objects disappears without
/// exploding.
pub fn ground_observer_system(world: &mut World) {
    let mut query = world.query_filtered::<Entity, With<GroundObserver>>();
    let mut observers: Vec<Entity> = query.iter(world).collect();
    sort_by_spawn_order(world, &mut observers);

    world.resource_scope(|world, mut runtime: Mut<ScriptRuntime>| {
        for entity in observers {
            if !is_active(world, entity) {
                continue;
            }
            let Some(bounds) = world.get::<Bounds>(entity).copied() else {
                continue;
            };
            let (x, y) = bounds.origin();
            let ground = world.resource::<GroundGrid>().ground_at(x, y);
            let Some(mut observer) = world.get_mut::<GroundObserver>(entity) else {
                continue;
            };
            if observer.ground_below == ground {
                continue;
            }
            observer.ground_below = ground;
            notify_ground_below_changed(world, &mut runtime, entity, ground);
        }
    });
}

/// React to a new ground below `entity`. Returns whether a hook ran.
pub fn notify_ground_below_changed(
    world: &mut World,
    runtime: &mut ScriptRuntime,
    entity: Entity,
    ground: Ground,
) -> bool {
    if world.get::<Bomb>(entity).is_some() && ground.swallows_objects() {
        debug!("Bomb {:?} fell into {}", entity, ground.name());
        mark_removed(world, entity);
        return false;
    }

    let observes = world
        .get::<CustomEntity>(entity)
        .is_some_and(CustomEntity::is_ground_observer);
    if !observes {
        return false;
    }
    let mut out = MapCommands::default();
    notify_event_queued(world, runtime, entity, EntityEvent::GroundBelowChanged(ground), &mut out);
    apply_commands(world, runtime, out);
    true
}
