//! Script-driven map entity.
//!
//! A [`CustomEntity`] carries every per-instance override a script can set:
//! who may traverse it, what it may traverse, which grounds it accepts, the
//! collision tests it runs each tick, whether it modifies the ground below
//! it and the event hooks it reacts to.

use std::collections::HashMap;

use bevy_ecs::prelude::*;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::collision::{CollisionCache, CollisionInfo, CollisionTest, SpriteOverlap};
use crate::components::EntityType;
use crate::error::EntityError;
use crate::ground::Ground;
use crate::script::{EntityView, EventKind, MapCommands, PredicateCall, ScriptCall, ScriptRef, ScriptRuntime};
use crate::traversal::{TraversableRegistry, TraversableRule};

/// Everything a collision sweep needs besides the two entities.
pub struct CollisionContext<'a> {
    pub tick: u64,
    pub sprites: &'a dyn SpriteOverlap,
    pub runtime: &'a mut ScriptRuntime,
    /// Whether sprite tests are edge-triggered like the others.
    pub sprite_edge_triggered: bool,
    pub commands: &'a mut MapCommands,
}

#[derive(Component, Debug, Clone, Default)]
pub struct CustomEntity {
    /// Model name resolved by the script host on creation.
    pub model: Option<String>,
    traversable_by: TraversableRegistry,
    can_traverse: TraversableRegistry,
    can_traverse_grounds: HashMap<Ground, bool>,
    collision_tests: Vec<CollisionInfo>,
    collisions: CollisionCache,
    layer_independent_collisions: bool,
    ground_modifier: bool,
    modified_ground: Ground,
    events: HashMap<EventKind, ScriptRef>,
}

impl CustomEntity {
    pub fn new(model: Option<String>) -> Self {
        Self {
            model,
            modified_ground: Ground::Empty,
            ..Default::default()
        }
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    /// Rule deciding whether entities of `kind` (or any entity, when `None`)
    /// can traverse this entity.
    pub fn set_traversable_by(&mut self, kind: Option<EntityType>, rule: TraversableRule) -> Result<(), EntityError> {
        self.traversable_by.set(kind, rule)
    }

    pub fn reset_traversable_by(&mut self, kind: Option<EntityType>) {
        self.traversable_by.reset(kind);
    }

    pub fn traversable_by(&self) -> &TraversableRegistry {
        &self.traversable_by
    }

    /// Rule deciding whether this entity can traverse entities of `kind`.
    pub fn set_can_traverse(&mut self, kind: Option<EntityType>, rule: TraversableRule) -> Result<(), EntityError> {
        self.can_traverse.set(kind, rule)
    }

    pub fn reset_can_traverse(&mut self, kind: Option<EntityType>) {
        self.can_traverse.reset(kind);
    }

    pub fn can_traverse(&self) -> &TraversableRegistry {
        &self.can_traverse
    }

    pub fn can_traverse_ground(&self, ground: Ground) -> bool {
        self.can_traverse_grounds
            .get(&ground)
            .copied()
            .unwrap_or(!ground.is_obstacle_by_default())
    }

    pub fn set_can_traverse_ground(&mut self, ground: Ground, traversable: bool) {
        self.can_traverse_grounds.insert(ground, traversable);
    }

    pub fn reset_can_traverse_ground(&mut self, ground: Ground) {
        self.can_traverse_grounds.remove(&ground);
    }

    // ------------------------------------------------------------------
    // Collision tests
    // ------------------------------------------------------------------

    pub fn add_collision_test(&mut self, test: CollisionTest, callback: ScriptRef) -> Result<(), EntityError> {
        callback.require("collision callback")?;
        if let CollisionTest::Custom(func) = test {
            func.require("custom collision test")?;
        }
        self.collision_tests.push(CollisionInfo { test, callback });
        Ok(())
    }

    pub fn clear_collision_tests(&mut self) {
        self.collision_tests.clear();
        self.collisions.clear();
    }

    pub fn collision_tests(&self) -> &[CollisionInfo] {
        &self.collision_tests
    }

    pub fn has_collision_tests(&self) -> bool {
        !self.collision_tests.is_empty()
    }

    pub fn set_layer_independent_collisions(&mut self, independent: bool) {
        self.layer_independent_collisions = independent;
    }

    pub fn has_layer_independent_collisions(&self) -> bool {
        self.layer_independent_collisions
    }

    /// Forget pairs with `other` so that it fires again on its next contact.
    pub fn forget_collisions_with(&mut self, other: Entity) {
        self.collisions.forget(other);
    }

    /// Start a new evaluated tick for the edge-trigger cache.
    pub fn begin_collision_tick(&mut self, tick: u64) {
        self.collisions.begin_tick(tick);
    }

    pub(crate) fn reset_collision_cache(&mut self) {
        self.collisions.clear();
    }

    /// Run every registered test of `subject` against `other`, in
    /// registration order, and invoke the callbacks of positive tests.
    ///
    /// Stops as soon as a callback queued the removal of either entity.
    /// Returns the number of callbacks invoked.
    pub fn collide_with(&mut self, subject: &EntityView, other: &EntityView, ctx: &mut CollisionContext<'_>) -> usize {
        self.collisions.begin_tick(ctx.tick);
        if subject.entity == other.entity {
            return 0;
        }
        if !self.layer_independent_collisions && subject.layer != other.layer {
            return 0;
        }

        let mut fired = 0;
        for index in 0..self.collision_tests.len() {
            if ctx.commands.removes(subject.entity) || ctx.commands.removes(other.entity) {
                break;
            }
            let info = self.collision_tests[index];
            let positive = match info.test {
                CollisionTest::BuiltIn(mode) => mode.test(subject, other, ctx.sprites),
                CollisionTest::Custom(func) => ctx
                    .runtime
                    .evaluate_or_deny(func, PredicateCall::CollisionTest { subject, other }),
            };
            if !positive {
                continue;
            }
            let level_triggered = info.test.is_sprite() && !ctx.sprite_edge_triggered;
            if !self.collisions.record_positive(index, other.entity, level_triggered) {
                continue;
            }
            trace!(
                "Collision test {} of '{}' fires with '{}'",
                index,
                subject.name,
                other.name
            );
            ctx.runtime.invoke_logged(
                info.callback,
                ScriptCall::Collision {
                    subject,
                    other,
                    test: info.test,
                },
                ctx.commands,
            );
            fired += 1;
        }
        fired
    }

    // ------------------------------------------------------------------
    // Ground modifier and observer
    // ------------------------------------------------------------------

    pub fn is_ground_modifier(&self) -> bool {
        self.ground_modifier
    }

    pub fn modified_ground(&self) -> Result<Ground, EntityError> {
        if self.ground_modifier {
            Ok(self.modified_ground)
        } else {
            Err(EntityError::unsupported("this entity does not modify the ground"))
        }
    }

    /// Make this entity change the ground below it. `Ground::Empty` turns
    /// the modifier off.
    pub fn set_modified_ground(&mut self, ground: Ground) {
        self.modified_ground = ground;
        self.ground_modifier = ground != Ground::Empty;
    }

    pub fn is_ground_observer(&self) -> bool {
        self.events.contains_key(&EventKind::GroundBelowChanged)
    }

    // ------------------------------------------------------------------
    // Event hooks
    // ------------------------------------------------------------------

    pub fn set_event(&mut self, kind: EventKind, func: ScriptRef) -> Result<(), EntityError> {
        let func = func.require("event hook")?;
        self.events.insert(kind, func);
        Ok(())
    }

    pub fn clear_event(&mut self, kind: EventKind) {
        self.events.remove(&kind);
    }

    pub fn event(&self, kind: EventKind) -> Option<ScriptRef> {
        self.events.get(&kind).copied()
    }
}

/// Serializable summary of a custom entity, for snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomEntityInfo {
    pub model: Option<String>,
    pub collision_tests: usize,
    pub ground_modifier: Option<Ground>,
    pub ground_observer: bool,
    pub layer_independent_collisions: bool,
}

impl From<&CustomEntity> for CustomEntityInfo {
    fn from(custom: &CustomEntity) -> Self {
        Self {
            model: custom.model.clone(),
            collision_tests: custom.collision_tests.len(),
            ground_modifier: custom.modified_ground().ok(),
            ground_observer: custom.is_ground_observer(),
            layer_independent_collisions: custom.layer_independent_collisions,
        }
    }
}
