/*!
Physics world defaults and tolerances.

These constants centralize the parameters a freshly created world starts with.
Every value here can be overridden per world through [`crate::WorldSettings`]
or the runtime setters on [`crate::PhysicsWorld`].

Notes
- Distances are in meters, time in seconds, mass in kilograms.
- The world is Z-up: default gravity pulls along -Z.
*/

use std::time::Duration;

/// Default gravity vector (m/s^2), Z-up.
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, 0.0, -9.81];

/// Number of equal sub-steps a pulse splits its elapsed time into.
/// Higher values give stiffer joints and fewer tunneling artifacts at the cost of solver time.
pub const DEFAULT_SUB_STEPS: u32 = 4;

/// Multiplier applied to the elapsed wall-clock time before stepping.
/// 1.0 = real time, 0.5 = slow motion.
pub const DEFAULT_SIMULATION_SPEED: f32 = 1.0;

/// Upper bound on the simulated time of a single pulse.
///
/// A host that stalls (debugger, window drag) would otherwise feed one huge step to the
/// solver. Time beyond this is dropped, not accumulated.
pub const MAX_PULSE_ELAPSED: Duration = Duration::from_millis(250);

/// Half-extent of the playable world along each axis (meters).
/// Awake bodies leaving `[-z, z]` are reported as fallen out of the world.
pub const DEFAULT_WORLD_SIZE: [f32; 3] = [3000.0, 3000.0, 3000.0];

/// Fixed cadence used by [`crate::PulseDriver`] when no interval is given (60 Hz).
pub const DEFAULT_PULSE_INTERVAL: Duration = Duration::from_micros(16_667);

/// Default collision margin (contact skin) of a new shape (meters).
pub const DEFAULT_SHAPE_MARGIN: f32 = 0.0;

pub const DEFAULT_FRICTION: f32 = 0.5;

pub const DEFAULT_RESTITUTION: f32 = 0.0;

/// Joints never break unless a script lowers the threshold.
pub const DEFAULT_BREAKING_IMPULSE_THRESHOLD: f32 = f32::INFINITY;

/// Minimum number of samples per heightfield axis.
pub const MIN_HEIGHTFIELD_SAMPLES: usize = 2;

/// Minimum number of points for convex hulls and triangle meshes.
pub const MIN_SHAPE_POINTS: usize = 3;

/// Poll interval while teardown waits for an in-flight pulse to finish.
pub const SIMULATION_WAIT_POLL: Duration = Duration::from_millis(1);

/// Practical small distance for comparisons (meters).
pub const DIST_EPS: f32 = 1.0e-6;
