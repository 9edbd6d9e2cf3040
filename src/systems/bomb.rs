//! Bomb fuses, explosions and timed effects.

use bevy_ecs::prelude::*;
use log::debug;

use crate::components::{Activity, Bomb, BombState, Bounds, EffectBundle, EntityType, Layer, SpriteState, TimedEffect};
use crate::systems::clock::{SimConfig, SimTick};
use crate::systems::lifecycle::{is_live, mark_removed, sort_by_spawn_order, stamp_spawn_order, PendingRemovals};

/// Side of the square explosion spawned by a bomb, in pixels.
pub const EXPLOSION_SIZE: i32 = 48;

/// Explode an armed bomb: spawn an explosion centred on it and mark the bomb
/// for removal. Returns the explosion, or `None` if the bomb cannot explode.
pub fn explode_bomb(world: &mut World, bomb: Entity) -> Option<Entity> {
    if !is_live(world, bomb) {
        return None;
    }
    let mut state = world.get_mut::<Bomb>(bomb)?;
    if !state.is_armed() {
        return None;
    }
    state.state = BombState::Exploded;

    let bounds = *world.get::<Bounds>(bomb)?;
    let layer = world.get::<Layer>(bomb).copied().unwrap_or_default();
    let now = world.resource::<SimTick>().0;
    let duration = world.resource::<SimConfig>().explosion_ticks;
    let (cx, cy) = bounds.center();
    let explosion = world
        .spawn(EffectBundle::new(
            EntityType::Explosion,
            layer,
            cx,
            cy,
            EXPLOSION_SIZE,
            now,
            duration,
        ))
        .id();
    stamp_spawn_order(world, explosion);
    mark_removed(world, bomb);
    debug!("Bomb {:?} exploded at tick {}", bomb, now);
    Some(explosion)
}

/// Explode every active bomb whose fuse has burnt.
pub fn bomb_fuse_system(world: &mut World) {
    let now = world.resource::<SimTick>().0;
    let mut query = world.query::<(Entity, &Bomb, &Activity)>();
    let mut due: Vec<Entity> = query
        .iter(world)
        .filter(|(_, bomb, activity)| activity.is_active() && bomb.should_explode(now))
        .map(|(entity, _, _)| entity)
        .collect();
    sort_by_spawn_order(world, &mut due);
    for bomb in due {
        explode_bomb(world, bomb);
    }
}

/// Remove explosions and fires once their time is over.
pub fn effect_lifetime_system(
    tick: Res<SimTick>,
    mut pending: ResMut<PendingRemovals>,
    query: Query<(Entity, &TimedEffect, &Activity)>,
) {
    for (entity, effect, activity) in query.iter() {
        if activity.is_active() && effect.is_over(tick.0) {
            pending.mark(entity);
        }
    }
}

/// Advance sprite animations of active entities.
pub fn sprite_animation_system(tick: Res<SimTick>, mut query: Query<(&mut SpriteState, &Activity)>) {
    for (mut sprite, activity) in query.iter_mut() {
        if activity.is_active() {
            sprite.advance(tick.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::BombBundle;

    fn test_world(tick: u64) -> World {
        let mut world = World::new();
        world.insert_resource(SimTick(tick));
        world.insert_resource(SimConfig::default());
        world.insert_resource(PendingRemovals::default());
        world
    }

    #[test]
    fn test_fuse_explodes_on_time() {
        let mut world = test_world(59);
        let bomb = world.spawn(BombBundle::new("bomb", Layer::Low, 40, 40, 0, 60)).id();

        bomb_fuse_system(&mut world);
        assert!(world.get::<Bomb>(bomb).unwrap().is_armed());

        world.resource_mut::<SimTick>().0 = 60;
        bomb_fuse_system(&mut world);
        assert_eq!(world.get::<Bomb>(bomb).unwrap().state, BombState::Exploded);
        assert!(world.resource::<PendingRemovals>().contains(bomb));

        let mut explosions = world.query::<(&EntityType, &TimedEffect)>();
        let found: Vec<_> = explosions.iter(&world).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(*found[0].0, EntityType::Explosion);
        assert_eq!(found[0].1.end_date, 90);
    }

    #[test]
    fn test_suspended_bomb_does_not_explode() {
        let mut world = test_world(100);
        let bomb = world.spawn(BombBundle::new("bomb", Layer::Low, 40, 40, 0, 60)).id();
        world.get_mut::<Activity>(bomb).unwrap().suspended = true;
        bomb_fuse_system(&mut world);
        assert!(world.get::<Bomb>(bomb).unwrap().is_armed());
    }

    #[test]
    fn test_bomb_explodes_once() {
        let mut world = test_world(0);
        let bomb = world.spawn(BombBundle::new("bomb", Layer::Low, 40, 40, 0, 60)).id();
        assert!(explode_bomb(&mut world, bomb).is_some());
        assert!(explode_bomb(&mut world, bomb).is_none());
    }

    #[test]
    fn test_effect_expires() {
        let mut world = test_world(30);
        let effect = world
            .spawn(EffectBundle::new(EntityType::Fire, Layer::Low, 0, 0, 16, 0, 30))
            .id();
        let mut schedule = Schedule::default();
        schedule.add_systems(effect_lifetime_system);
        schedule.run(&mut world);
        assert!(world.resource::<PendingRemovals>().contains(effect));
    }
}
