//! Per-tick collision sweep and hooks of custom entities.

use bevy_ecs::prelude::*;

use crate::collision::SpriteCollaborator;
use crate::custom_entity::{CollisionContext, CustomEntity};
use crate::script::{EntityEvent, EntityView, MapCommands, ScriptRuntime};
use crate::systems::clock::{SimConfig, SimTick};
use crate::systems::lifecycle::{apply_commands, is_active, notify_event, sort_by_spawn_order, view_of};

fn sorted_custom_entities(world: &mut World) -> Vec<Entity> {
    let mut query = world.query_filtered::<Entity, With<CustomEntity>>();
    let mut entities: Vec<Entity> = query.iter(world).collect();
    sort_by_spawn_order(world, &mut entities);
    entities
}

/// Run the collision tests of `subject` against `others`, then apply what
/// the callbacks requested. Returns the number of callbacks invoked.
fn sweep(world: &mut World, runtime: &mut ScriptRuntime, subject: Entity, others: &[EntityView]) -> usize {
    let Some(subject_view) = view_of(world, subject) else {
        return 0;
    };
    let tick = world.resource::<SimTick>().0;
    let sprite_edge_triggered = world.resource::<SimConfig>().sprite_collisions_edge_triggered;
    let sprites = world.resource::<SpriteCollaborator>().0.clone();
    let mut commands = MapCommands::default();

    let fired = {
        let Some(mut custom) = world.get_mut::<CustomEntity>(subject) else {
            return 0;
        };
        let mut ctx = CollisionContext {
            tick,
            sprites: sprites.as_ref(),
            runtime: &mut *runtime,
            sprite_edge_triggered,
            commands: &mut commands,
        };
        let mut fired = 0;
        for other in others {
            if ctx.commands.removes(subject) {
                break;
            }
            if ctx.commands.removes(other.entity) {
                continue;
            }
            fired += custom.collide_with(&subject_view, other, &mut ctx);
        }
        fired
    };
    apply_commands(world, runtime, commands);
    fired
}

/// Run the collision tests of a custom entity against a single other entity.
/// Used when a built-in detector finds the custom entity.
pub fn dispatch_pair(world: &mut World, runtime: &mut ScriptRuntime, subject: Entity, other: Entity) -> usize {
    if !is_active(world, subject) || !is_active(world, other) {
        return 0;
    }
    match view_of(world, other) {
        Some(view) => sweep(world, runtime, subject, &[view]),
        None => 0,
    }
}

/// Evaluate every custom entity's collision tests against every other
/// active entity, in entity order.
///
/// Suspended custom entities are skipped entirely and keep their
/// edge-trigger state until they resume.
pub fn custom_entity_collision_system(world: &mut World) {
    let subjects = sorted_custom_entities(world);
    let tick = world.resource::<SimTick>().0;

    world.resource_scope(|world, mut runtime: Mut<ScriptRuntime>| {
        for subject in subjects {
            if !is_active(world, subject) {
                continue;
            }
            let Some(mut custom) = world.get_mut::<CustomEntity>(subject) else {
                continue;
            };
            custom.begin_collision_tick(tick);
            if !custom.has_collision_tests() {
                continue;
            }
            let independent = custom.has_layer_independent_collisions();
            let Some(subject_view) = view_of(world, subject) else {
                continue;
            };

            let mut query = world.query::<Entity>();
            let mut candidates: Vec<Entity> = query.iter(world).collect();
            sort_by_spawn_order(world, &mut candidates);
            let others: Vec<EntityView> = candidates
                .into_iter()
                .filter(|&other| other != subject && is_active(world, other))
                .filter_map(|other| view_of(world, other))
                .filter(|view| independent || view.layer == subject_view.layer)
                .collect();

            sweep(world, &mut runtime, subject, &others);
        }
    });
}

/// Run the `on_update` hook of every active custom entity.
pub fn custom_entity_update_system(world: &mut World) {
    let entities = sorted_custom_entities(world);
    world.resource_scope(|world, mut runtime: Mut<ScriptRuntime>| {
        for entity in entities {
            if is_active(world, entity) {
                notify_event(world, &mut runtime, entity, EntityEvent::Update);
            }
        }
    });
}
