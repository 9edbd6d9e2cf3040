//! Traversal rules and the built-in obstacle tables.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::components::EntityType;
use crate::error::EntityError;
use crate::script::{EntityView, PredicateCall, ScriptRef, ScriptRuntime};

/// How to decide whether an entity type is traversable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TraversableRule {
    #[default]
    Unset,
    Fixed(bool),
    Script(ScriptRef),
}

impl TraversableRule {
    pub fn is_set(&self) -> bool {
        !matches!(self, TraversableRule::Unset)
    }

    /// Evaluate the rule. `None` when unset; script failures deny traversal.
    pub fn evaluate(
        &self,
        runtime: &mut ScriptRuntime,
        subject: &EntityView,
        candidate: &EntityView,
    ) -> Option<bool> {
        match *self {
            TraversableRule::Unset => None,
            TraversableRule::Fixed(value) => Some(value),
            TraversableRule::Script(func) => Some(runtime.evaluate_or_deny(
                func,
                PredicateCall::Traversable { subject, candidate },
            )),
        }
    }
}

/// One general rule plus one rule per entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversableRegistry {
    general: TraversableRule,
    by_type: HashMap<EntityType, TraversableRule>,
}

impl TraversableRegistry {
    /// Store `rule` for `kind`, or in the general slot. Replaces any
    /// previous rule in that slot.
    pub fn set(&mut self, kind: Option<EntityType>, rule: TraversableRule) -> Result<(), EntityError> {
        if rule == TraversableRule::Script(ScriptRef::Nil) {
            return Err(EntityError::invalid("traversable rule: nil script function"));
        }
        match kind {
            Some(kind) if rule.is_set() => {
                self.by_type.insert(kind, rule);
            }
            Some(kind) => {
                self.by_type.remove(&kind);
            }
            None => self.general = rule,
        }
        Ok(())
    }

    pub fn reset(&mut self, kind: Option<EntityType>) {
        match kind {
            Some(kind) => {
                self.by_type.remove(&kind);
            }
            None => self.general = TraversableRule::Unset,
        }
    }

    /// The rule stored exactly in this slot.
    pub fn get(&self, kind: Option<EntityType>) -> TraversableRule {
        match kind {
            Some(kind) => self.by_type.get(&kind).copied().unwrap_or_default(),
            None => self.general,
        }
    }

    /// Type-specific rule first, then the general one.
    pub fn rule_for(&self, kind: EntityType) -> Option<TraversableRule> {
        self.by_type
            .get(&kind)
            .copied()
            .or(Some(self.general))
            .filter(TraversableRule::is_set)
    }

    pub fn is_empty(&self) -> bool {
        !self.general.is_set() && self.by_type.is_empty()
    }
}

/// Whether an entity of type `mover` may enter a custom entity that set no
/// `traversable_by` rule for it.
pub fn traversable_by_default(mover: EntityType) -> bool {
    !matches!(
        mover,
        EntityType::Hero
            | EntityType::Npc
            | EntityType::Enemy
            | EntityType::Block
            | EntityType::Bomb
            | EntityType::CustomEntity
    )
}

/// Built-in obstacle table between entity types.
///
/// Bombs are listed as armed bombs; an exploded bomb is filtered out before
/// this is consulted.
pub fn is_obstacle_by_default(obstacle: EntityType, mover: EntityType) -> bool {
    use EntityType::*;
    match obstacle {
        Teletransporter | Stream | Stairs | Sensor | Switch | Explosion | Fire => false,
        Separator | Jumper => mover != Hero,
        Block | Chest | Npc | Crystal | CrystalBlock | Destructible | Bomb => !mover.is_effect(),
        Enemy => matches!(mover, Block | Npc | Enemy | Bomb),
        Hero => matches!(mover, Block | Npc | Enemy | Bomb | CustomEntity),
        CustomEntity => !traversable_by_default(mover),
    }
}
