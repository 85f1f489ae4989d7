/*!
The physics world: element registries, deferred queues and the engine behind the world lock.

Script-facing calls never mutate the engine directly. Creation registers the element and queues
it for initialization; setters record values on the element and queue it on a work stack. The
pulse ([`PhysicsWorld::do_pulse`]) drains everything in a fixed order, steps the engine and
copies results back.

Lock order
- pulse lock, then world lock (`dynamics`), then registry locks, then element state locks, then
  queue locks.
- Registry locks are held only briefly and never while acquiring the world lock. The shape
  registry stays read-locked while a new body or static collision links to its shape, so that
  [`PhysicsWorld::destroy_shape`] cannot slip in between.

Submodules
- `create`: shape, body, static collision and constraint construction, model import.
- `destroy`: element destruction and unlinking.
- `pulse`: the per-tick drain, step and post-step passes.
- `queries`: ray, line, shape and box queries under the world lock.
*/

mod create;
mod destroy;
mod pulse;
mod queries;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::constants::SIMULATION_WAIT_POLL;
use crate::constraint::Constraint;
use crate::dynamics::DynamicsWorld;
use crate::element::{Element, ElementId, ElementKind, ElementRef, WorldId};
use crate::error::{PhysicsError, PhysicsResult, ensure_non_negative, ensure_positive};
use crate::events::{EventSink, NoEvents};
use crate::model::{CollisionDataSource, ModelPlacement};
use crate::queue::{InitQueue, WorkQueues};
use crate::rigid_body::RigidBody;
use crate::settings::{PulseStats, WorldSettings};
use crate::shape::Shape;
use crate::static_collision::StaticCollision;
use crate::types::Vec3;

type Registry<T> = RwLock<BTreeMap<ElementId, Arc<T>>>;

pub struct PhysicsWorld {
    id: WorldId,
    queues: Arc<WorkQueues>,

    shapes: Registry<Shape>,
    rigid_bodies: Registry<RigidBody>,
    static_collisions: Registry<StaticCollision>,
    constraints: Registry<Constraint>,

    init_static_collisions: InitQueue<StaticCollision>,
    init_rigid_bodies: InitQueue<RigidBody>,
    init_constraints: InitQueue<Constraint>,

    /// The world lock.
    dynamics: Mutex<DynamicsWorld>,
    /// Held for the whole pulse.
    pulse_lock: Mutex<()>,
    /// Set while the engine steps.
    during_simulation: AtomicBool,

    settings: RwLock<WorldSettings>,
    last_pulse: Mutex<Option<Instant>>,
    last_stats: Mutex<PulseStats>,
    active_rigid_bodies: RwLock<Vec<ElementId>>,

    events: Arc<dyn EventSink>,
    collision_source: Option<Arc<dyn CollisionDataSource>>,
    /// World placements read from the collision source, minus the ones already built.
    placements: Mutex<Option<Vec<ModelPlacement>>>,
}

impl PhysicsWorld {
    pub fn new(settings: WorldSettings) -> PhysicsResult<Self> {
        Self::with_collaborators(settings, Arc::new(NoEvents), None)
    }

    pub fn with_collaborators(
        settings: WorldSettings,
        events: Arc<dyn EventSink>,
        collision_source: Option<Arc<dyn CollisionDataSource>>,
    ) -> PhysicsResult<Self> {
        settings.validate()?;
        let mut dynamics = DynamicsWorld::new(settings.gravity);
        dynamics.set_use_continuous(settings.use_continuous);

        let world = Self {
            id: WorldId::next(),
            queues: WorkQueues::new(),
            shapes: RwLock::default(),
            rigid_bodies: RwLock::default(),
            static_collisions: RwLock::default(),
            constraints: RwLock::default(),
            init_static_collisions: InitQueue::default(),
            init_rigid_bodies: InitQueue::default(),
            init_constraints: InitQueue::default(),
            dynamics: Mutex::new(dynamics),
            pulse_lock: Mutex::new(()),
            during_simulation: AtomicBool::new(false),
            settings: RwLock::new(settings),
            last_pulse: Mutex::new(None),
            last_stats: Mutex::new(PulseStats::default()),
            active_rigid_bodies: RwLock::default(),
            events,
            collision_source,
            placements: Mutex::new(None),
        };
        log::info!("physics {} created: {settings:?}", world.id);
        Ok(world)
    }

    #[inline]
    pub fn id(&self) -> WorldId {
        self.id
    }

    // ---- Settings ----

    pub fn settings(&self) -> WorldSettings {
        *self.settings.read()
    }

    pub fn gravity(&self) -> Vec3 {
        self.settings.read().gravity
    }

    pub fn set_gravity(&self, gravity: Vec3) -> PhysicsResult<()> {
        let mut next = self.settings();
        next.gravity = gravity;
        next.validate()?;
        // The engine copy is read at step time, under the world lock.
        self.dynamics.lock().gravity = gravity;
        *self.settings.write() = next;
        Ok(())
    }

    pub fn use_continuous(&self) -> bool {
        self.settings.read().use_continuous
    }

    pub fn set_use_continuous(&self, enabled: bool) {
        self.dynamics.lock().set_use_continuous(enabled);
        self.settings.write().use_continuous = enabled;
    }

    pub fn speed(&self) -> f32 {
        self.settings.read().speed
    }

    pub fn set_speed(&self, speed: f32) -> PhysicsResult<()> {
        self.settings.write().speed = ensure_non_negative("simulation speed", speed)?;
        Ok(())
    }

    pub fn sub_steps(&self) -> u32 {
        self.settings.read().sub_steps
    }

    pub fn set_sub_steps(&self, sub_steps: u32) -> PhysicsResult<()> {
        if sub_steps == 0 {
            return Err(PhysicsError::ZeroSubSteps);
        }
        self.settings.write().sub_steps = sub_steps;
        Ok(())
    }

    pub fn is_simulation_enabled(&self) -> bool {
        self.settings.read().simulation_enabled
    }

    pub fn set_simulation_enabled(&self, enabled: bool) {
        self.settings.write().simulation_enabled = enabled;
    }

    pub fn collision_reports_enabled(&self) -> bool {
        self.settings.read().collision_reports
    }

    /// Turning reports off drops the ones from the last pulse.
    pub fn set_collision_reports(&self, enabled: bool) {
        self.settings.write().collision_reports = enabled;
        if !enabled {
            self.clear_collision_reports();
        }
    }

    pub fn set_trigger_constraint_events(&self, enabled: bool) {
        self.settings.write().trigger_constraint_events = enabled;
    }

    pub fn set_clear_outside_world(&self, enabled: bool) {
        self.settings.write().clear_outside_world = enabled;
    }

    pub fn world_size(&self) -> Vec3 {
        self.settings.read().world_size
    }

    pub fn set_world_size(&self, size: Vec3) -> PhysicsResult<()> {
        ensure_positive("world size x", size.x)?;
        ensure_positive("world size y", size.y)?;
        ensure_positive("world size z", size.z)?;
        self.settings.write().world_size = size;
        Ok(())
    }

    // ---- Lookup and snapshots ----

    /// Resolve an id to whichever element carries it.
    pub fn element(&self, id: ElementId) -> Option<Element> {
        if let Some(shape) = self.shapes.read().get(&id) {
            return Some(Element::Shape(Arc::clone(shape)));
        }
        if let Some(body) = self.rigid_bodies.read().get(&id) {
            return Some(Element::RigidBody(Arc::clone(body)));
        }
        if let Some(collision) = self.static_collisions.read().get(&id) {
            return Some(Element::StaticCollision(Arc::clone(collision)));
        }
        self.constraints
            .read()
            .get(&id)
            .map(|c| Element::Constraint(Arc::clone(c)))
    }

    pub(crate) fn resolve(&self, element: ElementRef) -> Option<Element> {
        let id = element.id;
        match element.kind {
            ElementKind::Shape => self.shape(id).map(Element::Shape),
            ElementKind::RigidBody => self.rigid_body(id).map(Element::RigidBody),
            ElementKind::StaticCollision => self.static_collision(id).map(Element::StaticCollision),
            ElementKind::Constraint => self.constraint(id).map(Element::Constraint),
        }
    }

    pub fn shape(&self, id: ElementId) -> Option<Arc<Shape>> {
        self.shapes.read().get(&id).cloned()
    }

    pub fn rigid_body(&self, id: ElementId) -> Option<Arc<RigidBody>> {
        self.rigid_bodies.read().get(&id).cloned()
    }

    pub fn static_collision(&self, id: ElementId) -> Option<Arc<StaticCollision>> {
        self.static_collisions.read().get(&id).cloned()
    }

    pub fn constraint(&self, id: ElementId) -> Option<Arc<Constraint>> {
        self.constraints.read().get(&id).cloned()
    }

    pub fn shapes(&self) -> Vec<Arc<Shape>> {
        self.shapes.read().values().cloned().collect()
    }

    pub fn rigid_bodies(&self) -> Vec<Arc<RigidBody>> {
        self.rigid_bodies.read().values().cloned().collect()
    }

    pub fn static_collisions(&self) -> Vec<Arc<StaticCollision>> {
        self.static_collisions.read().values().cloned().collect()
    }

    pub fn constraints(&self) -> Vec<Arc<Constraint>> {
        self.constraints.read().values().cloned().collect()
    }

    /// Bodies awake after the last pulse.
    pub fn active_rigid_bodies(&self) -> Vec<ElementId> {
        self.active_rigid_bodies.read().clone()
    }

    pub fn last_pulse_stats(&self) -> PulseStats {
        *self.last_stats.lock()
    }

    // ---- Teardown ----

    pub fn is_during_simulation(&self) -> bool {
        self.pulse_lock.is_locked()
    }

    /// Block until no pulse is running.
    pub fn wait_for_simulation_to_finish(&self) {
        while self.is_during_simulation() {
            thread::sleep(SIMULATION_WAIT_POLL);
        }
    }

    /// Destroy every element and reset the engine. Waits for an in-flight pulse first.
    pub fn clear(&self) {
        self.wait_for_simulation_to_finish();
        let _pulse = self.pulse_lock.lock();
        let mut dynamics = self.dynamics.lock();

        self.init_static_collisions.clear();
        self.init_rigid_bodies.clear();
        self.init_constraints.clear();
        self.queues.clear();

        let constraints = std::mem::take(&mut *self.constraints.write());
        let bodies = std::mem::take(&mut *self.rigid_bodies.write());
        let statics = std::mem::take(&mut *self.static_collisions.write());
        let shapes = std::mem::take(&mut *self.shapes.write());

        for constraint in constraints.values() {
            constraint.forget_engine();
        }
        for body in bodies.values() {
            body.forget_engine();
            body.shape().remove_rigid_body(body.id());
        }
        for collision in statics.values() {
            collision.forget_engine();
            collision.shape().remove_static_collision(collision.id());
        }
        dynamics.clear();
        self.active_rigid_bodies.write().clear();
        *self.last_pulse.lock() = None;

        log::info!(
            "physics {} cleared: {} shapes, {} rigid bodies, {} static collisions, {} constraints",
            self.id,
            shapes.len(),
            bodies.len(),
            statics.len(),
            constraints.len()
        );
    }

    fn clear_collision_reports(&self) {
        for body in self.rigid_bodies() {
            body.clear_collision_reports();
        }
        for collision in self.static_collisions() {
            collision.clear_collision_reports();
        }
    }

    pub(crate) fn check_world(&self, id: ElementId, world: WorldId) -> PhysicsResult<()> {
        if world != self.id {
            return Err(PhysicsError::CrossWorld(id));
        }
        Ok(())
    }
}

impl Drop for PhysicsWorld {
    fn drop(&mut self) {
        self.clear();
        log::info!("physics {} destroyed", self.id);
    }
}

impl std::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("id", &self.id)
            .field("shapes", &self.shapes.read().len())
            .field("rigid_bodies", &self.rigid_bodies.read().len())
            .field("static_collisions", &self.static_collisions.read().len())
            .field("constraints", &self.constraints.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_settings_rejected() {
        let settings = WorldSettings {
            sub_steps: 0,
            ..Default::default()
        };
        assert_eq!(
            PhysicsWorld::new(settings).err(),
            Some(PhysicsError::ZeroSubSteps)
        );
    }

    #[test]
    fn setters_validate() {
        let world = PhysicsWorld::new(WorldSettings::default()).unwrap();
        assert!(world.set_sub_steps(0).is_err());
        assert!(world.set_speed(-1.0).is_err());
        assert!(world.set_world_size(Vec3::new(1.0, 0.0, 1.0)).is_err());
        assert!(world.set_gravity(Vec3::new(0.0, 0.0, f32::INFINITY)).is_err());

        world.set_gravity(Vec3::new(0.0, 0.0, -1.0)).unwrap();
        world.set_sub_steps(2).unwrap();
        world.set_use_continuous(true);
        assert_eq!(world.gravity(), Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(world.sub_steps(), 2);
        assert!(world.use_continuous());
        assert_eq!(world.dynamics.lock().gravity, Vec3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn element_resolves_every_kind() {
        let world = PhysicsWorld::new(WorldSettings::default()).unwrap();
        let shape = world.create_sphere_shape(1.0).unwrap();
        let body = world
            .create_rigid_body(&shape, 1.0, Vec3::zeros(), Vec3::zeros())
            .unwrap();
        assert_eq!(
            world.element(shape.id()).map(|e| e.kind()),
            Some(ElementKind::Shape)
        );
        assert_eq!(
            world.element(body.id()).map(|e| e.kind()),
            Some(ElementKind::RigidBody)
        );
        assert!(world.element(ElementId::next()).is_none());
    }

    #[test]
    fn clear_empties_registries_and_engine() {
        let world = PhysicsWorld::new(WorldSettings::default()).unwrap();
        let shape = world.create_box_shape(Vec3::repeat(0.5)).unwrap();
        let body = world
            .create_rigid_body(&shape, 1.0, Vec3::zeros(), Vec3::zeros())
            .unwrap();
        world.do_pulse();
        assert!(body.is_in_world());

        world.clear();
        assert!(world.shapes().is_empty());
        assert!(world.rigid_bodies().is_empty());
        assert!(body.is_destroyed());
        assert!(!shape.is_referenced());
        assert_eq!(world.dynamics.lock().body_count(), 0);
    }
}
