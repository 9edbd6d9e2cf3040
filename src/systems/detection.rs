//! Built-in detectors and the typed collision hooks of their receivers.

use bevy_ecs::prelude::*;
use log::trace;

use crate::collision::{Detection, SpriteCollaborator};
use crate::components::{Bomb, Bounds, EntityType, Stream};
use crate::custom_entity::CustomEntity;
use crate::script::ScriptRuntime;
use crate::spatial::SpatialGrid;
use crate::systems::bomb::explode_bomb;
use crate::systems::custom_collision::dispatch_pair;
use crate::systems::lifecycle::{is_active, relocate, sort_by_spawn_order, view_of};

/// Deliver a detection to its receiver.
///
/// Bombs explode when reached by an explosion or a fire and drift with
/// streams. Custom entities run their own collision tests against the
/// detector. Every other receiver ignores detections.
pub fn notify_collision_with(
    world: &mut World,
    runtime: &mut ScriptRuntime,
    receiver: Entity,
    detector: Entity,
    detection: Detection,
) {
    if let Some(bomb) = world.get::<Bomb>(receiver).copied() {
        if !bomb.is_armed() {
            return;
        }
        match detection {
            Detection::Explosion | Detection::Fire => {
                trace!("Bomb {:?} caught by {:?}", receiver, detection);
                explode_bomb(world, receiver);
            }
            Detection::Stream { dx, dy } => {
                if let Some(bounds) = world.get::<Bounds>(receiver).copied() {
                    let _ = relocate(world, receiver, bounds.translated(dx, dy));
                }
            }
            _ => {}
        }
        return;
    }
    if world.get::<CustomEntity>(receiver).is_some() {
        dispatch_pair(world, runtime, receiver, detector);
    }
}

fn receives_detections(world: &World, entity: Entity) -> bool {
    world.get::<Bomb>(entity).is_some() || world.get::<CustomEntity>(entity).is_some()
}

/// Let every active built-in detector check the receivers around it.
pub fn detector_system(world: &mut World) {
    let mut query = world.query::<(Entity, &EntityType)>();
    let mut detectors: Vec<Entity> = query
        .iter(world)
        .filter(|(_, kind)| Detection::for_detector(**kind, None).is_some())
        .map(|(entity, _)| entity)
        .collect();
    sort_by_spawn_order(world, &mut detectors);
    let sprites = world.resource::<SpriteCollaborator>().0.clone();

    world.resource_scope(|world, mut runtime: Mut<ScriptRuntime>| {
        for detector in detectors {
            if !is_active(world, detector) {
                continue;
            }
            let Some(detector_view) = view_of(world, detector) else {
                continue;
            };
            let stream = world.get::<Stream>(detector).map(|s| (s.dx, s.dy));
            let Some(detection) = Detection::for_detector(detector_view.kind, stream) else {
                continue;
            };
            let mode = detection.mode();

            // One pixel of margin for facing points just outside a receiver.
            let area = Bounds::new(
                detector_view.bounds.x - 1,
                detector_view.bounds.y - 1,
                detector_view.bounds.width + 2,
                detector_view.bounds.height + 2,
            );
            let mut receivers: Vec<Entity> = world
                .resource::<SpatialGrid>()
                .query_rect_on_layer(area, detector_view.layer)
                .into_iter()
                .map(|entry| entry.entity)
                .filter(|&entity| entity != detector)
                .collect();
            sort_by_spawn_order(world, &mut receivers);

            for receiver in receivers {
                if !is_active(world, detector) {
                    break;
                }
                if !is_active(world, receiver) || !receives_detections(world, receiver) {
                    continue;
                }
                let Some(receiver_view) = view_of(world, receiver) else {
                    continue;
                };
                if mode.test(&detector_view, &receiver_view, sprites.as_ref()) {
                    notify_collision_with(world, &mut runtime, receiver, detector, detection);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{BombBundle, EffectBundle, Layer, MapEntityBundle};
    use crate::ground::GroundGrid;
    use crate::spatial::spatial_grid_update_system;
    use crate::systems::clock::{SimConfig, SimTick};
    use crate::systems::lifecycle::PendingRemovals;

    fn test_world() -> World {
        let mut world = World::new();
        world.insert_resource(SimTick(1));
        world.insert_resource(SimConfig::default());
        world.insert_resource(PendingRemovals::default());
        world.insert_resource(SpatialGrid::default());
        world.insert_resource(GroundGrid::default());
        world.insert_resource(SpriteCollaborator::default());
        world.insert_resource(ScriptRuntime::default());
        world
    }

    fn run_detection(world: &mut World) {
        let mut schedule = Schedule::default();
        schedule.add_systems(spatial_grid_update_system);
        schedule.run(world);
        detector_system(world);
    }

    #[test]
    fn test_explosion_chains_into_bomb() {
        let mut world = test_world();
        let bomb = world.spawn(BombBundle::new("bomb", Layer::Low, 40, 40, 0, 150)).id();
        world.spawn(EffectBundle::new(EntityType::Explosion, Layer::Low, 40, 40, 48, 0, 30));

        run_detection(&mut world);

        assert!(!world.get::<Bomb>(bomb).unwrap().is_armed());
        assert!(world.resource::<PendingRemovals>().contains(bomb));
    }

    #[test]
    fn test_explosion_on_other_layer_is_ignored() {
        let mut world = test_world();
        let bomb = world.spawn(BombBundle::new("bomb", Layer::Low, 40, 40, 0, 150)).id();
        world.spawn(EffectBundle::new(EntityType::Explosion, Layer::High, 40, 40, 48, 0, 30));

        run_detection(&mut world);

        assert!(world.get::<Bomb>(bomb).unwrap().is_armed());
    }

    #[test]
    fn test_stream_carries_bomb() {
        let mut world = test_world();
        let bomb = world.spawn(BombBundle::new("bomb", Layer::Low, 40, 40, 0, 150)).id();
        let before = *world.get::<Bounds>(bomb).unwrap();
        world.spawn((
            MapEntityBundle::new(EntityType::Stream, "stream", Layer::Low, Bounds::new(16, 16, 48, 48), 0),
            Stream { dx: 2, dy: 0 },
        ));

        run_detection(&mut world);

        assert_eq!(*world.get::<Bounds>(bomb).unwrap(), before.translated(2, 0));
        assert!(world.get::<Bomb>(bomb).unwrap().is_armed());
    }
}
