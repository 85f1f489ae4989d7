//! The per-tick pulse: drain deferred work, step the engine, copy results back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::constants::MAX_PULSE_ELAPSED;
use crate::constraint::Registration;
use crate::dynamics::DynamicsWorld;
use crate::element::{Element, ElementId};
use crate::error::PhysicsResult;
use crate::events::PhysicsEvent;
use crate::queue::WorkStack;
use crate::report::build_collision_reports;
use crate::settings::{PulseStats, WorldSettings};

use super::PhysicsWorld;

/// Clears the during-simulation flag when the step returns or unwinds.
struct SimulationGuard<'a>(&'a AtomicBool);

impl<'a> SimulationGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        let was_simulating = flag.swap(true, Ordering::AcqRel);
        assert!(!was_simulating, "physics step re-entered");
        Self(flag)
    }
}

impl Drop for SimulationGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What the post-step pass hands to the event phase, which runs without the world lock.
#[derive(Default)]
struct PostStep {
    broken: Vec<ElementId>,
    outside: Vec<ElementId>,
}

impl PhysicsWorld {
    /// Run one pulse, stepping by the wall time since the previous one. The first pulse after
    /// creation or [`PhysicsWorld::clear`] only drains queues.
    ///
    /// # Panics
    /// If another pulse is already running on this world.
    pub fn do_pulse(&self) -> PulseStats {
        let now = Instant::now();
        let elapsed = self
            .last_pulse
            .lock()
            .replace(now)
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();
        self.pulse_with_elapsed(elapsed)
    }

    /// Run one pulse with an explicit elapsed time. Elapsed is clamped to
    /// [`MAX_PULSE_ELAPSED`] and scaled by the simulation speed.
    ///
    /// # Panics
    /// If another pulse is already running on this world.
    pub fn pulse_with_elapsed(&self, elapsed: Duration) -> PulseStats {
        let Some(_pulse) = self.pulse_lock.try_lock() else {
            panic!("physics {}: pulse entered while another pulse is running", self.id);
        };
        let settings = self.settings();
        let mut stats = PulseStats::default();

        let post = {
            let mut dynamics = self.dynamics.lock();

            let started = Instant::now();
            self.drain_init_queues(&mut dynamics, &mut stats);
            stats.processed_work_items = self.drain_work_stacks(&mut dynamics);
            stats.drain_time = started.elapsed();

            let started = Instant::now();
            let dt = elapsed.min(MAX_PULSE_ELAPSED).mul_f32(settings.speed);
            if settings.simulation_enabled && !dt.is_zero() {
                let _guard = SimulationGuard::enter(&self.during_simulation);
                dynamics.step(dt.as_secs_f32(), settings.sub_steps);
                stats.simulated = dt;
            } else {
                // Drained elements are still visible to queries after a pulse that does not step.
                dynamics.refresh_broad_phase();
            }
            stats.step_time = started.elapsed();

            let started = Instant::now();
            let post = self.post_step(&mut dynamics, &settings, &mut stats);
            stats.post_step_time = started.elapsed();
            post
        };

        self.emit_events(&settings, post);

        log::debug!(
            "physics {} pulse: +{} statics, +{} bodies, +{} constraints, {} work items, {} active, simulated {:?}",
            self.id,
            stats.registered_static_collisions,
            stats.registered_rigid_bodies,
            stats.registered_constraints,
            stats.processed_work_items,
            stats.active_rigid_bodies,
            stats.simulated
        );
        log::trace!(
            "physics {} pulse timings: drain {:?}, step {:?}, post-step {:?}",
            self.id,
            stats.drain_time,
            stats.step_time,
            stats.post_step_time
        );
        *self.last_stats.lock() = stats;
        stats
    }

    fn drain_init_queues(&self, dynamics: &mut DynamicsWorld, stats: &mut PulseStats) {
        while let Some(collision) = self.init_static_collisions.pop() {
            match collision.register(dynamics) {
                Ok(true) => stats.registered_static_collisions += 1,
                Ok(false) => {}
                Err(err) => log::warn!(
                    "physics {}: static collision {} not registered: {err}",
                    self.id,
                    collision.id()
                ),
            }
        }

        while let Some(body) = self.init_rigid_bodies.pop() {
            match body.register(dynamics) {
                Ok(true) => stats.registered_rigid_bodies += 1,
                Ok(false) => {}
                Err(err) => log::warn!(
                    "physics {}: rigid body {} not registered: {err}",
                    self.id,
                    body.id()
                ),
            }
        }

        while let Some(constraint) = self.init_constraints.pop() {
            match constraint.register(dynamics) {
                Registration::Registered => stats.registered_constraints += 1,
                Registration::Skipped => {}
                Registration::MissingBody => {
                    log::warn!(
                        "physics {}: constraint {} dropped, a linked body was destroyed",
                        self.id,
                        constraint.id()
                    );
                    self.unlink_constraint(dynamics, &constraint);
                }
            }
        }
    }

    /// Drain the four work stacks in order. Returns the number of popped entries.
    fn drain_work_stacks(&self, dynamics: &mut DynamicsWorld) -> usize {
        let queues = &self.queues;
        let mut processed = 0;

        processed += self.drain(dynamics, &queues.activation, |dynamics, element| {
            if let Element::RigidBody(body) = element {
                body.wake_up(dynamics);
            }
            Ok(())
        });
        processed += self.drain(dynamics, &queues.aabb_update, |dynamics, element| match element {
            Element::RigidBody(body) => body.refresh_collider(dynamics),
            Element::StaticCollision(collision) => collision.rebuild_geometry(dynamics),
            _ => Ok(()),
        });
        processed += self.drain(dynamics, &queues.changes, |dynamics, element| {
            match element {
                Element::RigidBody(body) => body.apply_changes(dynamics),
                Element::StaticCollision(collision) => collision.apply_changes(dynamics),
                _ => {}
            }
            Ok(())
        });
        processed += self.drain(dynamics, &queues.updates, |dynamics, element| match element {
            Element::RigidBody(body) => body.update_mass(dynamics),
            Element::StaticCollision(collision) => collision.rebuild_geometry(dynamics),
            _ => Ok(()),
        });
        processed
    }

    /// Pop until empty, including entries pushed while draining.
    fn drain(
        &self,
        dynamics: &mut DynamicsWorld,
        stack: &WorkStack,
        mut apply: impl FnMut(&mut DynamicsWorld, Element) -> PhysicsResult<()>,
    ) -> usize {
        let mut processed = 0;
        while let Some(item) = stack.pop() {
            processed += 1;
            let Some(element) = self.resolve(item) else {
                log::trace!("physics {}: {} skips gone {}{}", self.id, stack.name(), item.kind.name(), item.id);
                continue;
            };
            if let Err(err) = apply(dynamics, element) {
                log::warn!(
                    "physics {}: {} failed for {}{}: {err}",
                    self.id,
                    stack.name(),
                    item.kind.name(),
                    item.id
                );
            }
        }
        processed
    }

    fn post_step(
        &self,
        dynamics: &mut DynamicsWorld,
        settings: &WorldSettings,
        stats: &mut PulseStats,
    ) -> PostStep {
        let mut post = PostStep::default();

        let bodies = self.rigid_bodies();
        let mut active = Vec::new();
        for body in &bodies {
            if !body.sync_from_engine(dynamics) {
                continue;
            }
            active.push(body.id());
            if settings.clear_outside_world && body.position().z.abs() > settings.world_size.z {
                post.outside.push(body.id());
            }
        }
        stats.active_rigid_bodies = active.len();
        *self.active_rigid_bodies.write() = active;

        for constraint in self.constraints() {
            if constraint.check_breaking(dynamics) {
                log::debug!("physics {}: constraint {} broke", self.id, constraint.id());
                post.broken.push(constraint.id());
            }
        }
        stats.broken_constraints = post.broken.len();

        if settings.collision_reports {
            self.clear_collision_reports();
            let mut reports = build_collision_reports(dynamics);
            stats.collision_reports = reports.values().map(Vec::len).sum();
            for (owner, list) in reports.drain() {
                match self.resolve(owner) {
                    Some(Element::RigidBody(body)) => body.set_collision_reports(list),
                    Some(Element::StaticCollision(collision)) => collision.set_collision_reports(list),
                    _ => {}
                }
            }
        }
        post
    }

    /// Deliver post-step events. Runs with no world lock held so sinks may call back in.
    fn emit_events(&self, settings: &WorldSettings, post: PostStep) {
        if settings.trigger_constraint_events {
            for constraint in post.broken {
                self.events.call_event(&PhysicsEvent::ConstraintBroke { constraint });
            }
        }

        for id in post.outside {
            let Some(body) = self.rigid_body(id) else {
                continue;
            };
            if !self.events.call_event(&PhysicsEvent::RigidBodyFellOutsideWorld { body: id }) {
                continue;
            }
            log::debug!("physics {}: rigid body {id} fell outside the world", self.id);
            if let Err(err) = self.destroy_rigid_body(&body) {
                log::warn!("physics {}: rigid body {id} not removed: {err}", self.id);
            }
        }
    }
}
