//! Simulation configuration and tick counter.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::EntityError;

/// Longest fuse or effect lifetime accepted by [`SimConfig::validate`],
/// about 348 years of ticks at 100 Hz.
pub const MAX_DURATION_TICKS: u64 = 1 << 40;

/// Configuration of the map simulation.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed timestep in seconds (1/100 = one tick every 10 ms).
    pub fixed_timestep: f32,
    /// Cell size of the spatial index, in pixels.
    pub spatial_cell_size: i32,
    /// Ticks between dropping a bomb and its explosion.
    pub bomb_fuse_ticks: u64,
    /// Lifetime of an explosion.
    pub explosion_ticks: u64,
    /// Lifetime of a fire.
    pub fire_ticks: u64,
    /// When false, sprite collision tests fire on every positive tick.
    pub sprite_collisions_edge_triggered: bool,
    /// Maximum number of script commands applied for a single dispatch.
    pub max_command_cascade: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 100.0,
            spatial_cell_size: 32,
            bomb_fuse_ticks: 150,
            explosion_ticks: 30,
            fire_ticks: 50,
            sprite_collisions_edge_triggered: false,
            max_command_cascade: 64,
        }
    }
}

impl SimConfig {
    /// Parse a configuration; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, EntityError> {
        let config: SimConfig =
            serde_json::from_str(json).map_err(|e| EntityError::invalid(format!("config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EntityError> {
        if !(self.fixed_timestep > 0.0) {
            return Err(EntityError::invalid("config: fixed_timestep must be positive"));
        }
        if self.spatial_cell_size <= 0 {
            return Err(EntityError::invalid("config: spatial_cell_size must be positive"));
        }
        if self.max_command_cascade == 0 {
            return Err(EntityError::invalid("config: max_command_cascade must be positive"));
        }
        for (name, ticks) in [
            ("bomb_fuse_ticks", self.bomb_fuse_ticks),
            ("explosion_ticks", self.explosion_ticks),
            ("fire_ticks", self.fire_ticks),
        ] {
            if ticks > MAX_DURATION_TICKS {
                return Err(EntityError::invalid(format!(
                    "config: {name} must not exceed {MAX_DURATION_TICKS}"
                )));
            }
        }
        Ok(())
    }
}

/// Global simulation tick counter.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}
