//! Headless demo: builds a small scene, drives it from the pulse thread and logs what happens.
//!
//! ```text
//! sandbox [--tick-rate <hz>] [--seconds <s>]
//! ```
//! `RUST_LOG=debug` shows per-pulse counts.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use physics::{
    DEFAULT_PULSE_INTERVAL, EventSink, PhysicsEvent, PhysicsWorld, PulseDriver, RigidBody,
    Transform, Vec3, WorldSettings,
};

struct Options {
    interval: Duration,
    seconds: f32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PULSE_INTERVAL,
            seconds: 5.0,
        }
    }
}

/// Parses:
///   --tick-rate <hz> / --tick-rate=<hz>
///   --seconds <s>    / --seconds=<s>
fn read_options() -> anyhow::Result<Options> {
    let mut options = Options::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let (key, value) = match arg.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => {
                let value = args.next().with_context(|| format!("missing value for {arg}"))?;
                (arg, value)
            }
        };
        match key.as_str() {
            "--tick-rate" => {
                let hz: u32 = value.parse().context("--tick-rate expects an integer")?;
                if hz == 0 {
                    bail!("--tick-rate must be at least 1");
                }
                options.interval = Duration::from_secs_f64(1.0 / f64::from(hz));
            }
            "--seconds" => {
                options.seconds = value.parse().context("--seconds expects a number")?;
            }
            _ => bail!("unknown argument {key}"),
        }
    }
    if !(options.seconds.is_finite() && options.seconds > 0.0) {
        bail!("--seconds must be positive");
    }
    Ok(options)
}

struct LogEvents;

impl EventSink for LogEvents {
    fn call_event(&self, event: &PhysicsEvent) -> bool {
        log::info!("event {}: {event:?}", event.name());
        true
    }
}

struct Scene {
    boxes: Vec<Arc<RigidBody>>,
    pendulum: Arc<RigidBody>,
    projectile: Arc<RigidBody>,
}

fn build_scene(world: &PhysicsWorld) -> anyhow::Result<Scene> {
    let ground = world.create_box_shape(Vec3::new(50.0, 50.0, 0.5))?;
    world.create_static_collision(&ground, Transform::from_translation(Vec3::new(0.0, 0.0, -0.5)))?;

    let crate_shape = world.create_box_shape(Vec3::repeat(0.5))?;
    let mut boxes = Vec::new();
    for level in 0..4 {
        let body = world.create_rigid_body(&crate_shape, 1.0, Vec3::zeros(), Vec3::zeros())?;
        body.set_position(Vec3::new(0.0, 0.0, 0.5 + level as f32 * 1.05));
        boxes.push(body);
    }

    let ball = world.create_sphere_shape(0.4)?;
    let pendulum = world.create_rigid_body(&ball, 2.0, Vec3::zeros(), Vec3::zeros())?;
    pendulum.set_position(Vec3::new(6.0, 0.0, 6.0));
    world.create_point_to_world_constraint(&pendulum, Vec3::new(-3.0, 0.0, 0.0))?;

    // Two balls glued by a weak joint, thrown at the stack.
    let projectile = world.create_rigid_body(&ball, 1.0, Vec3::zeros(), Vec3::zeros())?;
    let tail = world.create_rigid_body(&ball, 1.0, Vec3::zeros(), Vec3::zeros())?;
    projectile.set_position(Vec3::new(-10.0, 0.0, 2.0));
    tail.set_position(Vec3::new(-11.0, 0.0, 2.0));
    for body in [&projectile, &tail] {
        body.set_linear_velocity(Vec3::new(12.0, 0.0, 2.0));
    }
    let glue = world.create_point_to_point_constraint(&projectile, &tail, None, true)?;
    glue.set_breaking_impulse_threshold(0.5)?;

    Ok(Scene {
        boxes,
        pendulum,
        projectile,
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let options = read_options()?;

    let settings = WorldSettings {
        collision_reports: true,
        trigger_constraint_events: true,
        clear_outside_world: true,
        world_size: Vec3::new(100.0, 100.0, 100.0),
        ..Default::default()
    };
    let world = Arc::new(PhysicsWorld::with_collaborators(settings, Arc::new(LogEvents), None)?);
    let scene = build_scene(&world)?;

    let mut driver =
        PulseDriver::spawn(Arc::clone(&world), options.interval).context("spawning pulse thread")?;

    let started = Instant::now();
    let run_for = Duration::from_secs_f32(options.seconds);
    while started.elapsed() < run_for {
        thread::sleep(Duration::from_secs(1).min(run_for.saturating_sub(started.elapsed())));
        let top = scene.boxes.last().map(|b| b.position()).unwrap_or_else(Vec3::zeros);
        log::info!(
            "t={:.1}s top box {:.2?}, pendulum {:.2?}, projectile {:.2?} ({} contacts), {} awake",
            started.elapsed().as_secs_f32(),
            top,
            scene.pendulum.position(),
            scene.projectile.position(),
            scene.projectile.collision_reports().len(),
            world.active_rigid_bodies().len()
        );
    }

    let pulses = driver.stop();
    let stats = world.last_pulse_stats();
    log::info!(
        "ran {pulses} pulses, last pulse {:?} (drain {:?}, step {:?}, post-step {:?})",
        stats.total_time(),
        stats.drain_time,
        stats.step_time,
        stats.post_step_time
    );
    world.clear();
    Ok(())
}
