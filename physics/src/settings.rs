/*!
Per-world settings and pulse statistics.

[`WorldSettings`] is the configuration a world starts with; every field can be changed later
through the world setters. Defaults come from [`crate::constants`].

Notes
- Collision reports, constraint break events and the outside-world cleanup are opt-in: they add
  work to every pulse and most hosts never read their output.
- `sub_steps` must be at least 1.
*/

use std::time::Duration;

use crate::constants::{
    DEFAULT_GRAVITY, DEFAULT_SIMULATION_SPEED, DEFAULT_SUB_STEPS, DEFAULT_WORLD_SIZE,
};
use crate::error::{PhysicsError, PhysicsResult, ensure_non_negative, ensure_positive};
use crate::types::Vec3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldSettings {
    pub gravity: Vec3,
    pub sub_steps: u32,
    /// Multiplier on elapsed wall-clock time.
    pub speed: f32,
    /// Half-extent of the world; see `clear_outside_world`.
    pub world_size: Vec3,
    /// Continuous collision detection for dynamic bodies.
    pub use_continuous: bool,
    /// When `false`, pulses still drain queues but never step.
    pub simulation_enabled: bool,
    /// Build per-element collision reports after each step.
    pub collision_reports: bool,
    /// Emit `ConstraintBroke` events.
    pub trigger_constraint_events: bool,
    /// Emit `RigidBodyFellOutsideWorld` and destroy the body unless vetoed.
    pub clear_outside_world: bool,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            gravity: Vec3::from(DEFAULT_GRAVITY),
            sub_steps: DEFAULT_SUB_STEPS,
            speed: DEFAULT_SIMULATION_SPEED,
            world_size: Vec3::from(DEFAULT_WORLD_SIZE),
            use_continuous: false,
            simulation_enabled: true,
            collision_reports: false,
            trigger_constraint_events: false,
            clear_outside_world: false,
        }
    }
}

impl WorldSettings {
    pub fn validate(&self) -> PhysicsResult<()> {
        if self.sub_steps == 0 {
            return Err(PhysicsError::ZeroSubSteps);
        }
        ensure_non_negative("simulation speed", self.speed)?;
        ensure_positive("world size x", self.world_size.x)?;
        ensure_positive("world size y", self.world_size.y)?;
        ensure_positive("world size z", self.world_size.z)?;
        for (what, value) in [
            ("gravity x", self.gravity.x),
            ("gravity y", self.gravity.y),
            ("gravity z", self.gravity.z),
        ] {
            if !value.is_finite() {
                return Err(PhysicsError::NotFinite { what, value });
            }
        }
        Ok(())
    }
}

/// Timings and counts of one pulse.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PulseStats {
    pub registered_static_collisions: usize,
    pub registered_rigid_bodies: usize,
    pub registered_constraints: usize,
    /// Work stack items processed (activation, AABB, changes, updates).
    pub processed_work_items: usize,
    /// Simulated time of the step; zero when the step was skipped.
    pub simulated: Duration,
    pub active_rigid_bodies: usize,
    pub broken_constraints: usize,
    pub collision_reports: usize,
    pub drain_time: Duration,
    pub step_time: Duration,
    pub post_step_time: Duration,
}

impl PulseStats {
    pub fn total_time(&self) -> Duration {
        self.drain_time + self.step_time + self.post_step_time
    }
}
