//! Public API for the map simulation.
//!
//! [`MapWorld`] owns the ECS world, the tick schedule and every resource the
//! systems need. Engines drive it with `step(dt)` or `tick()` and configure
//! custom entities through it; scripts never get direct access.
//!
//! ## Fixed Timestep
//!
//! The simulation uses a fixed timestep internally (default 100 Hz). When
//! `step(dt)` is called, the simulation accumulates time and runs fixed
//! updates as needed, so the number of ticks does not depend on frame rate.

use bevy_ecs::prelude::*;
use log::{debug, warn};

use crate::collision::{CollisionTest, SpriteCollaborator, SpriteOverlap};
use crate::components::*;
use crate::custom_entity::CustomEntity;
use crate::error::EntityError;
use crate::ground::{Ground, GroundGrid};
use crate::script::{EntityEvent, EventKind, ScriptFailure, ScriptHost, ScriptRef, ScriptRuntime, ScriptTable};
use crate::spatial::SpatialGrid;
use crate::systems::lifecycle::{self, require_live};
use crate::systems::*;
use crate::traversal::TraversableRule;
use crate::world::MapSnapshot;

/// Everything needed to place a custom entity on the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomEntityDesc {
    pub name: String,
    pub layer: Layer,
    pub bounds: Bounds,
    /// Model initializer to run on creation.
    pub model: Option<String>,
    pub sprite: Option<String>,
    pub direction: u8,
}

impl CustomEntityDesc {
    pub fn new(name: impl Into<String>, layer: Layer, bounds: Bounds) -> Self {
        Self {
            name: name.into(),
            layer,
            bounds,
            model: None,
            sprite: None,
            direction: 0,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn sprite(mut self, sprite: impl Into<String>) -> Self {
        self.sprite = Some(sprite.into());
        self
    }

    pub fn direction(mut self, direction: u8) -> Self {
        self.direction = direction;
        self
    }
}

/// The main map simulation container.
pub struct MapWorld {
    world: World,
    schedule: Schedule,
    time: f32,
    /// Accumulated time for fixed timestep.
    time_accumulator: f32,
}

impl MapWorld {
    /// Create an empty map with the default configuration and no scripts.
    pub fn new() -> Self {
        Self::build(SimConfig::default(), ScriptTable::new())
    }

    pub fn with_config(config: SimConfig) -> Result<Self, EntityError> {
        Self::with_scripts(config, ScriptTable::new())
    }

    /// Create a map whose script handles are resolved by `host`.
    pub fn with_scripts(config: SimConfig, host: impl ScriptHost + 'static) -> Result<Self, EntityError> {
        config.validate()?;
        Ok(Self::build(config, host))
    }

    fn build(config: SimConfig, host: impl ScriptHost + 'static) -> Self {
        let mut world = World::new();

        world.insert_resource(SpatialGrid::new(config.spatial_cell_size));
        world.insert_resource(SimTick(0));
        world.insert_resource(config);
        world.insert_resource(GroundGrid::default());
        world.insert_resource(PendingRemovals::default());
        world.insert_resource(SpawnSequence::default());
        world.insert_resource(SpriteCollaborator::default());
        world.insert_resource(ScriptRuntime::new(host));

        Self {
            world,
            schedule: build_schedule(),
            time: 0.0,
            time_accumulator: 0.0,
        }
    }

    fn with_runtime<R>(&mut self, f: impl FnOnce(&mut World, &mut ScriptRuntime) -> R) -> R {
        self.world
            .resource_scope(|world, mut runtime: Mut<ScriptRuntime>| f(world, &mut runtime))
    }

    // ------------------------------------------------------------------
    // Map setup
    // ------------------------------------------------------------------

    /// Replace the ground of the map.
    pub fn set_ground_grid(&mut self, grid: GroundGrid) {
        self.world.insert_resource(grid);
        sync_ground_overlays(&mut self.world);
    }

    pub fn ground(&self) -> &GroundGrid {
        self.world.resource::<GroundGrid>()
    }

    /// Effective ground at a pixel, modifiers included.
    pub fn ground_at(&self, x: i32, y: i32) -> Ground {
        self.ground().ground_at(x, y)
    }

    /// Change one ground cell, addressed in pixels.
    pub fn set_ground_at(&mut self, x: i32, y: i32, ground: Ground) -> Result<(), EntityError> {
        let mut grid = self.world.resource_mut::<GroundGrid>();
        let (cx, cy) = grid
            .world_to_cell(x, y)
            .ok_or_else(|| EntityError::invalid(format!("no ground cell at ({x}, {y})")))?;
        grid.set_cell(cx, cy, ground);
        Ok(())
    }

    pub fn set_sprite_collaborator(&mut self, sprites: impl SpriteOverlap + Send + Sync + 'static) {
        self.world
            .insert_resource(SpriteCollaborator(std::sync::Arc::new(sprites)));
    }

    pub fn config(&self) -> &SimConfig {
        self.world.resource::<SimConfig>()
    }

    // ------------------------------------------------------------------
    // Time
    // ------------------------------------------------------------------

    /// Step the simulation forward by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        let fixed_dt = self.config().fixed_timestep;
        self.time_accumulator += dt;
        while self.time_accumulator >= fixed_dt {
            self.fixed_update(fixed_dt);
            self.time_accumulator -= fixed_dt;
        }
    }

    /// Run exactly one tick.
    pub fn tick(&mut self) {
        let fixed_dt = self.config().fixed_timestep;
        self.fixed_update(fixed_dt);
    }

    fn fixed_update(&mut self, dt: f32) {
        self.world.resource_mut::<SimTick>().increment();
        self.schedule.run(&mut self.world);
        self.time += dt;
    }

    pub fn current_tick(&self) -> u64 {
        self.world.resource::<SimTick>().0
    }

    pub fn current_time(&self) -> f32 {
        self.time
    }

    // ------------------------------------------------------------------
    // Spawning
    // ------------------------------------------------------------------

    fn register(&mut self, entity: Entity) -> Entity {
        if let (Some(&bounds), Some(&layer)) = (self.world.get::<Bounds>(entity), self.world.get::<Layer>(entity)) {
            self.world
                .resource_mut::<SpatialGrid>()
                .insert(entity, bounds, layer);
        }
        lifecycle::stamp_spawn_order(&mut self.world, entity);
        lifecycle::init_ground_observer(&mut self.world, entity);
        entity
    }

    /// Spawn a built-in entity without extra state.
    pub fn spawn_entity(
        &mut self,
        kind: EntityType,
        name: impl Into<String>,
        layer: Layer,
        bounds: Bounds,
    ) -> Result<Entity, EntityError> {
        match kind {
            EntityType::Bomb | EntityType::Explosion | EntityType::Fire | EntityType::Stream | EntityType::CustomEntity => {
                Err(EntityError::invalid(format!(
                    "{} entities have a dedicated constructor",
                    kind.name()
                )))
            }
            _ => {
                let now = self.current_tick();
                let entity = self
                    .world
                    .spawn(MapEntityBundle::new(kind, name, layer, bounds, now))
                    .id();
                Ok(self.register(entity))
            }
        }
    }

    pub fn spawn_stream(&mut self, name: impl Into<String>, layer: Layer, bounds: Bounds, dx: i32, dy: i32) -> Entity {
        let now = self.current_tick();
        let entity = self
            .world
            .spawn((
                MapEntityBundle::new(EntityType::Stream, name, layer, bounds, now),
                Stream { dx, dy },
            ))
            .id();
        self.register(entity)
    }

    /// Drop an armed bomb whose origin is `(x, y)`.
    pub fn spawn_bomb(&mut self, name: impl Into<String>, layer: Layer, x: i32, y: i32) -> Entity {
        let now = self.current_tick();
        let fuse = self.config().bomb_fuse_ticks;
        let entity = self
            .world
            .spawn(BombBundle::new(name, layer, x, y, now, fuse))
            .id();
        debug!("Bomb {:?} armed, explodes at tick {}", entity, now + fuse);
        self.register(entity)
    }

    pub fn spawn_explosion(&mut self, layer: Layer, cx: i32, cy: i32) -> Entity {
        let now = self.current_tick();
        let duration = self.config().explosion_ticks;
        let entity = self
            .world
            .spawn(EffectBundle::new(EntityType::Explosion, layer, cx, cy, EXPLOSION_SIZE, now, duration))
            .id();
        self.register(entity)
    }

    pub fn spawn_fire(&mut self, layer: Layer, cx: i32, cy: i32) -> Entity {
        let now = self.current_tick();
        let duration = self.config().fire_ticks;
        let entity = self
            .world
            .spawn(EffectBundle::new(EntityType::Fire, layer, cx, cy, 16, now, duration))
            .id();
        self.register(entity)
    }

    /// Create a custom entity, run its model initializer and its
    /// `on_created` hook.
    pub fn add_custom_entity(&mut self, desc: CustomEntityDesc) -> Result<Entity, EntityError> {
        if desc.bounds.width <= 0 || desc.bounds.height <= 0 {
            return Err(EntityError::invalid(format!(
                "custom entity '{}' has an empty bounding box",
                desc.name
            )));
        }
        let now = self.current_tick();
        let mut base = MapEntityBundle::new(EntityType::CustomEntity, desc.name, desc.layer, desc.bounds, now);
        if let Some(sprite) = desc.sprite {
            base.sprite.sprite_id = sprite;
        }
        if desc.direction >= base.sprite.num_directions {
            return Err(EntityError::invalid(format!(
                "sprite direction {} out of range",
                desc.direction
            )));
        }
        base.sprite.direction = desc.direction;

        let entity = self
            .world
            .spawn((
                base,
                CustomEntity::new(desc.model),
                GroundObserver {
                    ground_below: Ground::Empty,
                },
            ))
            .id();
        self.register(entity);
        self.with_runtime(|world, runtime| lifecycle::notify_creating(world, runtime, entity))?;
        sync_ground_overlays(&mut self.world);
        Ok(entity)
    }

    // ------------------------------------------------------------------
    // Custom entity configuration
    // ------------------------------------------------------------------

    fn validate_script(&self, func: ScriptRef, what: &str) -> Result<ScriptRef, EntityError> {
        self.world.resource::<ScriptRuntime>().validate(func, what)
    }

    fn validate_rule(&self, rule: TraversableRule) -> Result<TraversableRule, EntityError> {
        if let TraversableRule::Script(func) = rule {
            self.validate_script(func, "traversable rule")?;
        }
        Ok(rule)
    }

    fn custom_mut(&mut self, entity: Entity) -> Result<Mut<'_, CustomEntity>, EntityError> {
        require_live(&self.world, entity)?;
        self.world
            .get_mut::<CustomEntity>(entity)
            .ok_or_else(|| EntityError::unsupported("not a custom entity"))
    }

    pub fn custom(&self, entity: Entity) -> Option<&CustomEntity> {
        self.world.get::<CustomEntity>(entity)
    }

    /// Decide whether entities of `kind` (all entities when `None`) can
    /// traverse `entity`.
    pub fn set_traversable_by(
        &mut self,
        entity: Entity,
        kind: Option<EntityType>,
        rule: TraversableRule,
    ) -> Result<(), EntityError> {
        let rule = self.validate_rule(rule)?;
        self.custom_mut(entity)?.set_traversable_by(kind, rule)
    }

    pub fn reset_traversable_by(&mut self, entity: Entity, kind: Option<EntityType>) -> Result<(), EntityError> {
        self.custom_mut(entity)?.reset_traversable_by(kind);
        Ok(())
    }

    /// Decide whether `entity` can traverse entities of `kind`.
    pub fn set_can_traverse(
        &mut self,
        entity: Entity,
        kind: Option<EntityType>,
        rule: TraversableRule,
    ) -> Result<(), EntityError> {
        let rule = self.validate_rule(rule)?;
        self.custom_mut(entity)?.set_can_traverse(kind, rule)
    }

    pub fn reset_can_traverse(&mut self, entity: Entity, kind: Option<EntityType>) -> Result<(), EntityError> {
        self.custom_mut(entity)?.reset_can_traverse(kind);
        Ok(())
    }

    pub fn set_can_traverse_ground(&mut self, entity: Entity, ground: Ground, traversable: bool) -> Result<(), EntityError> {
        self.custom_mut(entity)?
            .set_can_traverse_ground(ground, traversable);
        Ok(())
    }

    pub fn reset_can_traverse_ground(&mut self, entity: Entity, ground: Ground) -> Result<(), EntityError> {
        self.custom_mut(entity)?.reset_can_traverse_ground(ground);
        Ok(())
    }

    /// Whether `entity` accepts `ground` below it.
    pub fn can_traverse_ground(&self, entity: Entity, ground: Ground) -> Result<bool, EntityError> {
        require_live(&self.world, entity)?;
        Ok(movement::can_traverse_ground(&self.world, entity, ground))
    }

    pub fn add_collision_test(
        &mut self,
        entity: Entity,
        test: impl Into<CollisionTest>,
        callback: ScriptRef,
    ) -> Result<(), EntityError> {
        let test = test.into();
        if let CollisionTest::Custom(func) = test {
            self.validate_script(func, "custom collision test")?;
        }
        let callback = self.validate_script(callback, "collision callback")?;
        self.custom_mut(entity)?.add_collision_test(test, callback)
    }

    pub fn clear_collision_tests(&mut self, entity: Entity) -> Result<(), EntityError> {
        self.custom_mut(entity)?.clear_collision_tests();
        Ok(())
    }

    pub fn set_layer_independent_collisions(&mut self, entity: Entity, independent: bool) -> Result<(), EntityError> {
        self.custom_mut(entity)?
            .set_layer_independent_collisions(independent);
        Ok(())
    }

    pub fn set_event(&mut self, entity: Entity, kind: EventKind, func: ScriptRef) -> Result<(), EntityError> {
        let func = self.validate_script(func, "event hook")?;
        self.custom_mut(entity)?.set_event(kind, func)?;
        if kind == EventKind::GroundBelowChanged {
            lifecycle::init_ground_observer(&mut self.world, entity);
        }
        Ok(())
    }

    pub fn clear_event(&mut self, entity: Entity, kind: EventKind) -> Result<(), EntityError> {
        self.custom_mut(entity)?.clear_event(kind);
        Ok(())
    }

    /// Make `entity` change the ground below it; `Ground::Empty` stops it.
    pub fn set_modified_ground(&mut self, entity: Entity, ground: Ground) -> Result<(), EntityError> {
        self.custom_mut(entity)?.set_modified_ground(ground);
        sync_ground_overlays(&mut self.world);
        Ok(())
    }

    pub fn modified_ground(&self, entity: Entity) -> Result<Ground, EntityError> {
        self.custom_ref(entity)?.modified_ground()
    }

    pub fn is_ground_modifier(&self, entity: Entity) -> Result<bool, EntityError> {
        Ok(self.custom_ref(entity)?.is_ground_modifier())
    }

    pub fn is_ground_observer(&self, entity: Entity) -> Result<bool, EntityError> {
        Ok(self.custom_ref(entity)?.is_ground_observer())
    }

    fn custom_ref(&self, entity: Entity) -> Result<&CustomEntity, EntityError> {
        require_live(&self.world, entity)?;
        self.custom(entity)
            .ok_or_else(|| EntityError::unsupported("not a custom entity"))
    }

    pub fn set_sprites_direction(&mut self, entity: Entity, direction: u8) -> Result<(), EntityError> {
        self.custom_ref(entity)?;
        let mut sprite = self
            .world
            .get_mut::<SpriteState>(entity)
            .ok_or_else(|| EntityError::unsupported("entity has no sprite"))?;
        if direction >= sprite.num_directions {
            return Err(EntityError::invalid(format!(
                "sprite direction {} out of range: the sprite has {} directions",
                direction, sprite.num_directions
            )));
        }
        sprite.direction = direction;
        Ok(())
    }

    pub fn sprites_direction(&self, entity: Entity) -> Result<u8, EntityError> {
        require_live(&self.world, entity)?;
        self.world
            .get::<SpriteState>(entity)
            .map(|s| s.direction)
            .ok_or_else(|| EntityError::unsupported("entity has no sprite"))
    }

    // ------------------------------------------------------------------
    // Obstacles and movement
    // ------------------------------------------------------------------

    /// Whether `obstacle` blocks `mover`.
    pub fn is_obstacle_for(&mut self, obstacle: Entity, mover: Entity) -> Result<bool, EntityError> {
        require_live(&self.world, obstacle)?;
        require_live(&self.world, mover)?;
        Ok(self.with_runtime(|world, runtime| movement::is_obstacle_for(world, runtime, obstacle, mover)))
    }

    /// Whether `mover` would collide with the ground or another entity if
    /// placed at `candidate`.
    pub fn collides_at(&mut self, mover: Entity, candidate: Bounds) -> Result<bool, EntityError> {
        require_live(&self.world, mover)?;
        Ok(self.with_runtime(|world, runtime| movement::collides_at(world, runtime, mover, candidate)))
    }

    /// Move by `(dx, dy)` unless the destination collides.
    pub fn try_move(&mut self, mover: Entity, dx: i32, dy: i32) -> Result<bool, EntityError> {
        self.with_runtime(|world, runtime| movement::try_move(world, runtime, mover, dx, dy))
    }

    /// Move unconditionally.
    pub fn set_bounds(&mut self, entity: Entity, bounds: Bounds) -> Result<(), EntityError> {
        require_live(&self.world, entity)?;
        lifecycle::relocate(&mut self.world, entity, bounds)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn set_enabled(&mut self, entity: Entity, enabled: bool) -> Result<(), EntityError> {
        self.with_runtime(|world, runtime| lifecycle::set_enabled(world, runtime, entity, enabled))
    }

    pub fn is_enabled(&self, entity: Entity) -> Option<bool> {
        self.world.get::<Activity>(entity).map(|a| a.enabled)
    }

    pub fn set_suspended(&mut self, entity: Entity, suspended: bool) -> Result<(), EntityError> {
        self.with_runtime(|world, runtime| lifecycle::set_suspended(world, runtime, entity, suspended))
    }

    pub fn is_suspended(&self, entity: Entity) -> Option<bool> {
        self.world.get::<Activity>(entity).map(|a| a.suspended)
    }

    /// Suspend or resume every entity of the map.
    pub fn set_map_suspended(&mut self, suspended: bool) {
        let mut query = self.world.query_filtered::<Entity, With<Activity>>();
        let mut entities: Vec<Entity> = query.iter(&self.world).collect();
        lifecycle::sort_by_spawn_order(&self.world, &mut entities);
        self.with_runtime(|world, runtime| {
            for entity in entities {
                match lifecycle::set_suspended(world, runtime, entity, suspended) {
                    // Removed by an earlier hook.
                    Ok(()) | Err(EntityError::NoSuchEntity(_)) => {}
                    Err(err) => warn!("Could not suspend {:?}: {}", entity, err),
                }
            }
        });
    }

    /// Remove an entity: its `on_removed` hook fires and it is despawned.
    pub fn remove_entity(&mut self, entity: Entity) -> Result<(), EntityError> {
        require_live(&self.world, entity)?;
        lifecycle::mark_removed(&mut self.world, entity);
        self.with_runtime(|world, runtime| {
            removal::drain_pending_removals(world, runtime);
        });
        Ok(())
    }

    /// Whether the entity still exists (pending entities included).
    pub fn exists(&self, entity: Entity) -> bool {
        self.world.get::<EntityType>(entity).is_some()
    }

    /// The hero interacts with `entity`. Returns whether a hook handled it.
    pub fn interact(&mut self, entity: Entity) -> Result<bool, EntityError> {
        require_live(&self.world, entity)?;
        Ok(self.with_runtime(|world, runtime| {
            lifecycle::notify_event(world, runtime, entity, EntityEvent::Interaction)
        }))
    }

    /// Explode a bomb now.
    pub fn explode(&mut self, bomb: Entity) -> Result<Option<Entity>, EntityError> {
        require_live(&self.world, bomb)?;
        if self.world.get::<Bomb>(bomb).is_none() {
            return Err(EntityError::unsupported("only bombs explode"));
        }
        let explosion = explode_bomb(&mut self.world, bomb);
        if let Some(explosion) = explosion {
            self.register(explosion);
        }
        Ok(explosion)
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// First live entity with this name, in entity order.
    pub fn find_by_name(&mut self, name: &str) -> Option<Entity> {
        let mut query = self.world.query::<(Entity, &EntityName)>();
        let mut found: Vec<Entity> = query
            .iter(&self.world)
            .filter(|(_, n)| n.0 == name)
            .map(|(entity, _)| entity)
            .collect();
        lifecycle::sort_by_spawn_order(&self.world, &mut found);
        found
            .into_iter()
            .find(|&entity| lifecycle::is_live(&self.world, entity))
    }

    pub fn bounds(&self, entity: Entity) -> Option<Bounds> {
        self.world.get::<Bounds>(entity).copied()
    }

    pub fn entity_type(&self, entity: Entity) -> Option<EntityType> {
        self.world.get::<EntityType>(entity).copied()
    }

    pub fn bomb(&self, entity: Entity) -> Option<Bomb> {
        self.world.get::<Bomb>(entity).copied()
    }

    /// Number of entities of a type.
    pub fn count(&mut self, kind: EntityType) -> usize {
        let mut query = self.world.query::<&EntityType>();
        query.iter(&self.world).filter(|k| **k == kind).count()
    }

    // ------------------------------------------------------------------
    // Script failures and snapshots
    // ------------------------------------------------------------------

    pub fn script_failures(&self) -> &[ScriptFailure] {
        self.world.resource::<ScriptRuntime>().failures()
    }

    pub fn take_script_failures(&mut self) -> Vec<ScriptFailure> {
        self.world.resource_mut::<ScriptRuntime>().take_failures()
    }

    /// Get a snapshot of the current map state.
    pub fn snapshot(&mut self) -> MapSnapshot {
        let tick = self.current_tick();
        MapSnapshot::from_world(&mut self.world, tick)
    }

    /// Get the snapshot as a JSON string.
    pub fn snapshot_json(&mut self) -> String {
        self.snapshot()
            .to_json()
            .unwrap_or_else(|_| "{}".to_string())
    }

    pub fn spatial_grid(&self) -> &SpatialGrid {
        self.world.resource::<SpatialGrid>()
    }

    /// Get a reference to the underlying ECS world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Get a mutable reference to the underlying ECS world.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

impl Default for MapWorld {
    fn default() -> Self {
        Self::new()
    }
}
