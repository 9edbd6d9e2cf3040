//! End-of-tick removal of pending entities.

use bevy_ecs::prelude::*;
use log::{debug, warn};

use crate::custom_entity::CustomEntity;
use crate::script::{EntityEvent, ScriptRuntime};
use crate::spatial::SpatialGrid;
use crate::systems::clock::SimConfig;
use crate::systems::ground::sync_ground_overlays;
use crate::systems::lifecycle::{notify_event, sort_by_spawn_order, PendingRemovals};

/// Fire `on_removed` hooks and despawn every pending entity.
///
/// Hooks may remove further entities; those are drained in the following
/// rounds. Returns the number of despawned entities.
pub fn drain_pending_removals(world: &mut World, runtime: &mut ScriptRuntime) -> usize {
    let max_rounds = world
        .get_resource::<SimConfig>()
        .map(|c| c.max_command_cascade)
        .unwrap_or(64);
    let mut removed = 0;

    for _ in 0..max_rounds {
        let mut batch = world.resource_mut::<PendingRemovals>().take();
        sort_by_spawn_order(world, &mut batch);
        if batch.is_empty() {
            break;
        }
        for &entity in &batch {
            notify_event(world, runtime, entity, EntityEvent::Removed);
        }
        for &entity in &batch {
            world.resource_mut::<SpatialGrid>().remove(entity);
            let mut customs = world.query::<&mut CustomEntity>();
            for mut custom in customs.iter_mut(world) {
                custom.forget_collisions_with(entity);
            }
            if world.despawn(entity) {
                debug!("Entity {:?} removed", entity);
                removed += 1;
            }
        }
        sync_ground_overlays(world);
    }

    let left = world.resource::<PendingRemovals>().len();
    if left > 0 {
        warn!("{} entities still pending removal after {} rounds", left, max_rounds);
    }
    removed
}

pub fn removal_system(world: &mut World) {
    world.resource_scope(|world, mut runtime: Mut<ScriptRuntime>| {
        drain_pending_removals(world, &mut runtime);
    });
}
