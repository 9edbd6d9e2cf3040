//! ECS systems of the map simulation.
//!
//! Systems contain the per-tick logic that operates on components.
//!
//! ## Tick Order
//!
//! Every tick runs on a single thread, in this order:
//!
//! 1. `spatial_grid_update_system` - rebuilds the spatial index
//! 2. `sprite_animation_system` - advances animation frames
//! 3. `bomb_fuse_system` - explodes bombs whose fuse has burnt
//! 4. `effect_lifetime_system` - expires explosions and fires
//! 5. `ground_modifier_system` - lays modifier grounds over the map
//! 6. `ground_observer_system` - reports ground changes below observers
//! 7. `custom_entity_update_system` - runs `on_update` hooks
//! 8. `detector_system` - built-in detections and typed hooks
//! 9. `custom_entity_collision_system` - custom collision tests
//! 10. `removal_system` - despawns entities marked for removal
//!
//! Systems that call scripts take exclusive world access and borrow the
//! [`crate::script::ScriptRuntime`] with `World::resource_scope`.

pub mod bomb;
pub mod clock;
pub mod custom_collision;
pub mod detection;
pub mod ground;
pub mod lifecycle;
pub mod movement;
pub mod removal;
pub mod serialization;

pub use bomb::*;
pub use clock::*;
pub use custom_collision::*;
pub use detection::*;
pub use ground::*;
pub use lifecycle::{PendingRemovals, SpawnSequence};
pub use movement::*;
pub use removal::*;
pub use serialization::*;

use bevy_ecs::prelude::*;
use bevy_ecs::schedule::ExecutorKind;

use crate::spatial::spatial_grid_update_system;

/// Build the per-tick schedule.
pub fn build_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.set_executor_kind(ExecutorKind::SingleThreaded);
    schedule.add_systems(
        (
            spatial_grid_update_system,
            sprite_animation_system,
            bomb_fuse_system,
            effect_lifetime_system,
            ground_modifier_system,
            ground_observer_system,
            custom_entity_update_system,
            detector_system,
            custom_entity_collision_system,
            removal_system,
        )
            .chain(),
    );
    schedule
}
