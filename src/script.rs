//! Interface to the scripting collaborator.
//!
//! The core never stores callables. It stores [`ScriptRef`] handles and asks
//! a [`ScriptHost`] to run them. Scripts only see read-only [`EntityView`]s
//! and may request map changes through a [`MapCommands`] queue, which the
//! core applies once the current dispatch step is over.

use std::collections::HashMap;

use bevy_ecs::prelude::*;
use log::error;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collision::CollisionTest;
use crate::components::{Bounds, EntityType, Layer};
use crate::custom_entity::CustomEntity;
use crate::error::EntityError;
use crate::ground::Ground;

/// Handle to a script function, or `Nil`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScriptRef {
    #[default]
    Nil,
    Handle(u32),
}

impl ScriptRef {
    pub fn is_nil(&self) -> bool {
        matches!(self, ScriptRef::Nil)
    }

    /// Rejects `Nil` with an [`EntityError::InvalidConfiguration`].
    pub fn require(self, what: &str) -> Result<Self, EntityError> {
        if self.is_nil() {
            Err(EntityError::invalid(format!("{what}: nil script function")))
        } else {
            Ok(self)
        }
    }
}

/// Read-only picture of an entity handed to scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityView {
    pub entity: Entity,
    pub name: String,
    pub kind: EntityType,
    pub layer: Layer,
    pub bounds: Bounds,
    pub direction: u8,
}

/// Scripted event hooks a custom entity can register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    Created,
    Update,
    Enabled,
    Suspended,
    GroundBelowChanged,
    Interaction,
    Removed,
}

/// An event delivered to a hook, with its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityEvent {
    Created,
    Update,
    Enabled(bool),
    Suspended(bool),
    GroundBelowChanged(Ground),
    Interaction,
    Removed,
}

impl EntityEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EntityEvent::Created => EventKind::Created,
            EntityEvent::Update => EventKind::Update,
            EntityEvent::Enabled(_) => EventKind::Enabled,
            EntityEvent::Suspended(_) => EventKind::Suspended,
            EntityEvent::GroundBelowChanged(_) => EventKind::GroundBelowChanged,
            EntityEvent::Interaction => EventKind::Interaction,
            EntityEvent::Removed => EventKind::Removed,
        }
    }
}

/// Arguments of a boolean decision function.
#[derive(Debug, Clone, Copy)]
pub enum PredicateCall<'a> {
    /// Whether `candidate` may traverse (or be traversed by) `subject`.
    Traversable {
        subject: &'a EntityView,
        candidate: &'a EntityView,
    },
    /// Custom collision test between `subject` and `other`.
    CollisionTest {
        subject: &'a EntityView,
        other: &'a EntityView,
    },
}

impl PredicateCall<'_> {
    pub fn subject(&self) -> &EntityView {
        match self {
            PredicateCall::Traversable { subject, .. } | PredicateCall::CollisionTest { subject, .. } => {
                subject
            }
        }
    }

    fn context(&self) -> &'static str {
        match self {
            PredicateCall::Traversable { .. } => "traversable test",
            PredicateCall::CollisionTest { .. } => "collision test",
        }
    }
}

/// Arguments of a callback.
#[derive(Debug, Clone, Copy)]
pub enum ScriptCall<'a> {
    Collision {
        subject: &'a EntityView,
        other: &'a EntityView,
        test: CollisionTest,
    },
    Event {
        subject: &'a EntityView,
        event: EntityEvent,
    },
}

impl ScriptCall<'_> {
    pub fn subject(&self) -> &EntityView {
        match self {
            ScriptCall::Collision { subject, .. } | ScriptCall::Event { subject, .. } => subject,
        }
    }

    fn context(&self) -> String {
        match self {
            ScriptCall::Collision { .. } => "collision callback".to_string(),
            ScriptCall::Event { event, .. } => format!("event {:?}", event.kind()),
        }
    }
}

/// Error raised by a script function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ScriptError {
    pub message: String,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Host runtime resolving [`ScriptRef`] handles to callables.
pub trait ScriptHost: Send + Sync {
    /// Whether `func` resolves to something the host can call.
    fn is_callable(&self, func: ScriptRef) -> bool;

    /// Run a boolean decision function.
    fn evaluate(&mut self, func: ScriptRef, call: PredicateCall<'_>) -> Result<bool, ScriptError>;

    /// Run a callback. The returned flag tells whether the script handled the
    /// event; it only matters for [`EntityEvent::Interaction`].
    fn invoke(
        &mut self,
        func: ScriptRef,
        call: ScriptCall<'_>,
        commands: &mut MapCommands,
    ) -> Result<bool, ScriptError>;

    /// Run the initializer of a custom entity model.
    fn init_model(
        &mut self,
        _model: &str,
        _entity: &EntityView,
        _setup: &mut CustomEntity,
    ) -> Result<(), ScriptError> {
        Ok(())
    }
}

/// Map change requested by a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapCommand {
    Remove(Entity),
    SetPosition { entity: Entity, x: i32, y: i32 },
    Translate { entity: Entity, dx: i32, dy: i32 },
    SetEnabled { entity: Entity, enabled: bool },
    ClearCollisionTests(Entity),
    SetModifiedGround { entity: Entity, ground: Ground },
    SetGround { x: i32, y: i32, ground: Ground },
}

/// Queue of map changes collected while scripts run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapCommands {
    queue: Vec<MapCommand>,
}

impl MapCommands {
    pub fn push(&mut self, command: MapCommand) {
        self.queue.push(command);
    }

    pub fn remove(&mut self, entity: Entity) {
        self.push(MapCommand::Remove(entity));
    }

    pub fn set_position(&mut self, entity: Entity, x: i32, y: i32) {
        self.push(MapCommand::SetPosition { entity, x, y });
    }

    pub fn translate(&mut self, entity: Entity, dx: i32, dy: i32) {
        self.push(MapCommand::Translate { entity, dx, dy });
    }

    pub fn set_enabled(&mut self, entity: Entity, enabled: bool) {
        self.push(MapCommand::SetEnabled { entity, enabled });
    }

    pub fn clear_collision_tests(&mut self, entity: Entity) {
        self.push(MapCommand::ClearCollisionTests(entity));
    }

    pub fn set_modified_ground(&mut self, entity: Entity, ground: Ground) {
        self.push(MapCommand::SetModifiedGround { entity, ground });
    }

    pub fn set_ground(&mut self, x: i32, y: i32, ground: Ground) {
        self.push(MapCommand::SetGround { x, y, ground });
    }

    /// Whether a removal of `entity` is queued.
    pub fn removes(&self, entity: Entity) -> bool {
        self.queue
            .iter()
            .any(|c| matches!(c, MapCommand::Remove(e) if *e == entity))
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, MapCommand> {
        self.queue.drain(..)
    }

    pub fn append(&mut self, other: &mut MapCommands) {
        self.queue.append(&mut other.queue);
    }
}

/// A script failure caught by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptFailure {
    /// Name of the entity whose script failed.
    pub entity: String,
    #[serde(skip)]
    pub func: ScriptRef,
    pub context: String,
    pub message: String,
}

impl ScriptFailure {
    pub fn to_error(&self) -> EntityError {
        EntityError::ExternalCallFailure {
            func: self.func,
            context: self.context.clone(),
            message: self.message.clone(),
        }
    }
}

/// Resource owning the script host and the failures it produced.
#[derive(Resource)]
pub struct ScriptRuntime {
    host: Box<dyn ScriptHost>,
    failures: Vec<ScriptFailure>,
}

impl Default for ScriptRuntime {
    fn default() -> Self {
        Self::new(ScriptTable::default())
    }
}

impl ScriptRuntime {
    pub fn new(host: impl ScriptHost + 'static) -> Self {
        Self {
            host: Box::new(host),
            failures: Vec::new(),
        }
    }

    pub fn host(&self) -> &dyn ScriptHost {
        self.host.as_ref()
    }

    pub fn host_mut(&mut self) -> &mut dyn ScriptHost {
        self.host.as_mut()
    }

    /// Check a handle before storing it in a registry.
    pub fn validate(&self, func: ScriptRef, what: &str) -> Result<ScriptRef, EntityError> {
        let func = func.require(what)?;
        if self.host.is_callable(func) {
            Ok(func)
        } else {
            Err(EntityError::invalid(format!(
                "{what}: {func:?} is not a callable script function"
            )))
        }
    }

    /// Run a predicate; failures count as `false` and are reported.
    pub fn evaluate_or_deny(&mut self, func: ScriptRef, call: PredicateCall<'_>) -> bool {
        match self.host.evaluate(func, call) {
            Ok(answer) => answer,
            Err(err) => {
                self.report(call.subject(), func, call.context().to_string(), err);
                false
            }
        }
    }

    /// Run a callback; failures are reported and read as "not handled".
    pub fn invoke_logged(&mut self, func: ScriptRef, call: ScriptCall<'_>, commands: &mut MapCommands) -> bool {
        match self.host.invoke(func, call, commands) {
            Ok(handled) => handled,
            Err(err) => {
                self.report(call.subject(), func, call.context(), err);
                false
            }
        }
    }

    /// Run a model initializer; failures are reported.
    pub fn init_model(&mut self, model: &str, entity: &EntityView, setup: &mut CustomEntity) {
        if let Err(err) = self.host.init_model(model, entity, setup) {
            self.report(entity, ScriptRef::Nil, format!("model {model:?} initializer"), err);
        }
    }

    fn report(&mut self, subject: &EntityView, func: ScriptRef, context: String, err: ScriptError) {
        error!(
            "Script error in {} of entity '{}' ({:?}): {}",
            context, subject.name, func, err
        );
        self.failures.push(ScriptFailure {
            entity: subject.name.clone(),
            func,
            context,
            message: err.message,
        });
    }

    pub fn failures(&self) -> &[ScriptFailure] {
        &self.failures
    }

    pub fn take_failures(&mut self) -> Vec<ScriptFailure> {
        std::mem::take(&mut self.failures)
    }
}

type PredicateFn = Box<dyn FnMut(&PredicateCall<'_>) -> Result<bool, ScriptError> + Send + Sync>;
type CallbackFn =
    Box<dyn FnMut(&ScriptCall<'_>, &mut MapCommands) -> Result<bool, ScriptError> + Send + Sync>;
type ModelFn = Box<dyn FnMut(&EntityView, &mut CustomEntity) -> Result<(), ScriptError> + Send + Sync>;

enum Slot {
    Predicate(PredicateFn),
    Callback(CallbackFn),
}

/// In-process script host backed by Rust closures.
///
/// Handles are allocated on registration and never reused.
#[derive(Default)]
pub struct ScriptTable {
    next_handle: u32,
    slots: HashMap<u32, Slot>,
    models: HashMap<String, ModelFn>,
}

impl ScriptTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self, slot: Slot) -> ScriptRef {
        self.next_handle += 1;
        self.slots.insert(self.next_handle, slot);
        ScriptRef::Handle(self.next_handle)
    }

    /// Register a boolean decision function.
    pub fn predicate<F>(&mut self, f: F) -> ScriptRef
    where
        F: FnMut(&PredicateCall<'_>) -> Result<bool, ScriptError> + Send + Sync + 'static,
    {
        self.allocate(Slot::Predicate(Box::new(f)))
    }

    /// Register a callback.
    pub fn callback<F>(&mut self, f: F) -> ScriptRef
    where
        F: FnMut(&ScriptCall<'_>, &mut MapCommands) -> Result<bool, ScriptError> + Send + Sync + 'static,
    {
        self.allocate(Slot::Callback(Box::new(f)))
    }

    /// Register the initializer of a custom entity model.
    pub fn model<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: FnMut(&EntityView, &mut CustomEntity) -> Result<(), ScriptError> + Send + Sync + 'static,
    {
        self.models.insert(name.into(), Box::new(f));
    }

    pub fn unregister(&mut self, func: ScriptRef) -> bool {
        match func {
            ScriptRef::Handle(id) => self.slots.remove(&id).is_some(),
            ScriptRef::Nil => false,
        }
    }

    fn slot(&mut self, func: ScriptRef) -> Result<&mut Slot, ScriptError> {
        let id = match func {
            ScriptRef::Handle(id) => id,
            ScriptRef::Nil => return Err(ScriptError::new("attempt to call a nil value")),
        };
        self.slots
            .get_mut(&id)
            .ok_or_else(|| ScriptError::new(format!("unknown script function {id}")))
    }
}

impl ScriptHost for ScriptTable {
    fn is_callable(&self, func: ScriptRef) -> bool {
        match func {
            ScriptRef::Handle(id) => self.slots.contains_key(&id),
            ScriptRef::Nil => false,
        }
    }

    fn evaluate(&mut self, func: ScriptRef, call: PredicateCall<'_>) -> Result<bool, ScriptError> {
        match self.slot(func)? {
            Slot::Predicate(f) => f(&call),
            Slot::Callback(_) => Err(ScriptError::new("function does not return a boolean")),
        }
    }

    fn invoke(
        &mut self,
        func: ScriptRef,
        call: ScriptCall<'_>,
        commands: &mut MapCommands,
    ) -> Result<bool, ScriptError> {
        match self.slot(func)? {
            Slot::Callback(f) => f(&call, commands),
            // A predicate used as a callback runs for its side effects only.
            Slot::Predicate(f) => match call {
                ScriptCall::Collision { subject, other, .. } => {
                    f(&PredicateCall::CollisionTest { subject, other }).map(|_| false)
                }
                ScriptCall::Event { .. } => Err(ScriptError::new("predicate used as an event hook")),
            },
        }
    }

    fn init_model(
        &mut self,
        model: &str,
        entity: &EntityView,
        setup: &mut CustomEntity,
    ) -> Result<(), ScriptError> {
        match self.models.get_mut(model) {
            Some(init) => init(entity, setup),
            None => Err(ScriptError::new(format!("no model named {model:?}"))),
        }
    }
}
