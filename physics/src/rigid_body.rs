/*!
Dynamic rigid bodies.

A [`RigidBody`] is created detached: its engine body and collider are only built when the pulse
drains the rigid body init queue. Every setter records the new value on the element, marks it
pending and queues the body on the matching work stack. The pulse then pushes pending values into
the engine and, after stepping, copies the simulated pose/velocities/sleep state back, skipping
any property with a script write still pending.

Mass conventions
- `mass == 0` makes an immovable (fixed) body.
- A zero local inertia is derived from the shape, scaled to the body mass.
*/

use std::sync::Arc;

use parking_lot::Mutex;
use rapier3d::prelude::{
    ColliderBuilder, ColliderHandle, MassProperties, RigidBodyBuilder, RigidBodyHandle,
    RigidBodyType,
};

use crate::constants::{DEFAULT_FRICTION, DEFAULT_RESTITUTION};
use crate::dynamics::DynamicsWorld;
use crate::element::{ElementId, ElementKind, ElementRef, WorldId};
use crate::error::{PhysicsResult, ensure_non_negative};
use crate::queue::{ChangeFlags, WorkQueues};
use crate::report::CollisionReport;
use crate::shape::{EngineShape, Shape};
use crate::types::{CollisionFilter, Point3, Quat, Transform, Vec3};

/// A force or impulse recorded by a script, applied at the next apply-changes pass.
#[derive(Clone, Copy, Debug, PartialEq)]
enum ForceRequest {
    /// `at` is relative to the body origin, in world orientation.
    Force { force: Vec3, at: Option<Vec3> },
    Impulse { impulse: Vec3, at: Option<Vec3> },
    Torque(Vec3),
    TorqueImpulse(Vec3),
}

pub(crate) struct RigidBodyState {
    pub handle: Option<RigidBodyHandle>,
    pub collider: Option<ColliderHandle>,
    pub destroyed: bool,

    mass: f32,
    local_inertia: Vec3,
    center_of_mass: Vec3,

    transform: Transform,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    linear_damping: f32,
    angular_damping: f32,
    friction: f32,
    restitution: f32,
    filter: CollisionFilter,
    sleeping: bool,

    pending: ChangeFlags,
    forces: Vec<ForceRequest>,
    /// Forces were added to the engine body and must be cleared after the step.
    forces_in_engine: bool,

    reports: Vec<CollisionReport>,
    pub constraints: Vec<ElementId>,
}

pub struct RigidBody {
    id: ElementId,
    world: WorldId,
    shape: Arc<Shape>,
    queues: Arc<WorkQueues>,
    pub(crate) state: Mutex<RigidBodyState>,
}

impl RigidBody {
    pub(crate) fn new(
        world: WorldId,
        queues: Arc<WorkQueues>,
        shape: Arc<Shape>,
        mass: f32,
        local_inertia: Vec3,
        center_of_mass: Vec3,
    ) -> PhysicsResult<Arc<Self>> {
        ensure_non_negative("mass", mass)?;
        ensure_non_negative("local inertia x", local_inertia.x)?;
        ensure_non_negative("local inertia y", local_inertia.y)?;
        ensure_non_negative("local inertia z", local_inertia.z)?;

        Ok(Arc::new(Self {
            id: ElementId::next(),
            world,
            shape,
            queues,
            state: Mutex::new(RigidBodyState {
                handle: None,
                collider: None,
                destroyed: false,
                mass,
                local_inertia,
                center_of_mass,
                transform: Transform::IDENTITY,
                linear_velocity: Vec3::zeros(),
                angular_velocity: Vec3::zeros(),
                linear_damping: 0.0,
                angular_damping: 0.0,
                friction: DEFAULT_FRICTION,
                restitution: DEFAULT_RESTITUTION,
                filter: CollisionFilter::ALL,
                sleeping: false,
                pending: ChangeFlags::default(),
                forces: Vec::new(),
                forces_in_engine: false,
                reports: Vec::new(),
                constraints: Vec::new(),
            }),
        }))
    }

    #[inline]
    pub fn id(&self) -> ElementId {
        self.id
    }

    #[inline]
    pub fn world_id(&self) -> WorldId {
        self.world
    }

    #[inline]
    pub fn element_ref(&self) -> ElementRef {
        ElementRef::new(ElementKind::RigidBody, self.id)
    }

    #[inline]
    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    /// Registered into the engine (true after the first pulse following creation).
    pub fn is_in_world(&self) -> bool {
        self.state.lock().handle.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    // ---- Pose and motion ----

    pub fn transform(&self) -> Transform {
        self.state.lock().transform
    }

    pub fn set_transform(&self, transform: Transform) {
        self.write(ChangeFlags::POSE, |s| s.transform = transform);
    }

    pub fn position(&self) -> Vec3 {
        self.state.lock().transform.translation
    }

    pub fn set_position(&self, position: Vec3) {
        self.write(ChangeFlags::POSE, |s| s.transform.translation = position);
    }

    pub fn rotation(&self) -> Quat {
        self.state.lock().transform.rotation
    }

    pub fn set_rotation(&self, rotation: Quat) {
        self.write(ChangeFlags::POSE, |s| s.transform.rotation = rotation);
    }

    pub fn linear_velocity(&self) -> Vec3 {
        self.state.lock().linear_velocity
    }

    pub fn set_linear_velocity(&self, velocity: Vec3) {
        self.write(ChangeFlags::LINEAR_VELOCITY, |s| s.linear_velocity = velocity);
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.state.lock().angular_velocity
    }

    pub fn set_angular_velocity(&self, velocity: Vec3) {
        self.write(ChangeFlags::ANGULAR_VELOCITY, |s| {
            s.angular_velocity = velocity
        });
    }

    /// Force at a point relative to the body origin. Cleared after the next step.
    pub fn apply_force(&self, force: Vec3, relative_position: Vec3) {
        self.push_force(ForceRequest::Force {
            force,
            at: Some(relative_position),
        });
    }

    pub fn apply_central_force(&self, force: Vec3) {
        self.push_force(ForceRequest::Force { force, at: None });
    }

    pub fn apply_impulse(&self, impulse: Vec3, relative_position: Vec3) {
        self.push_force(ForceRequest::Impulse {
            impulse,
            at: Some(relative_position),
        });
    }

    pub fn apply_central_impulse(&self, impulse: Vec3) {
        self.push_force(ForceRequest::Impulse { impulse, at: None });
    }

    pub fn apply_torque(&self, torque: Vec3) {
        self.push_force(ForceRequest::Torque(torque));
    }

    pub fn apply_torque_impulse(&self, torque: Vec3) {
        self.push_force(ForceRequest::TorqueImpulse(torque));
    }

    fn push_force(&self, request: ForceRequest) {
        self.write(ChangeFlags::FORCES, |s| s.forces.push(request));
        self.queues.activation.push(self.element_ref());
    }

    // ---- Mass ----

    pub fn mass(&self) -> f32 {
        self.state.lock().mass
    }

    pub fn set_mass(&self, mass: f32) -> PhysicsResult<()> {
        ensure_non_negative("mass", mass)?;
        self.write_mass(|s| s.mass = mass);
        Ok(())
    }

    pub fn local_inertia(&self) -> Vec3 {
        self.state.lock().local_inertia
    }

    pub fn set_local_inertia(&self, inertia: Vec3) -> PhysicsResult<()> {
        ensure_non_negative("local inertia x", inertia.x)?;
        ensure_non_negative("local inertia y", inertia.y)?;
        ensure_non_negative("local inertia z", inertia.z)?;
        self.write_mass(|s| s.local_inertia = inertia);
        Ok(())
    }

    pub fn center_of_mass(&self) -> Vec3 {
        self.state.lock().center_of_mass
    }

    pub fn set_center_of_mass(&self, center: Vec3) {
        self.write_mass(|s| s.center_of_mass = center);
    }

    fn write_mass(&self, f: impl FnOnce(&mut RigidBodyState)) {
        {
            let mut s = self.state.lock();
            f(&mut s);
            s.pending.insert(ChangeFlags::MASS);
        }
        self.queues.updates.push(self.element_ref());
    }

    // ---- Material and filtering ----

    /// `(linear, angular)`.
    pub fn damping(&self) -> (f32, f32) {
        let s = self.state.lock();
        (s.linear_damping, s.angular_damping)
    }

    pub fn set_damping(&self, linear: f32, angular: f32) -> PhysicsResult<()> {
        ensure_non_negative("linear damping", linear)?;
        ensure_non_negative("angular damping", angular)?;
        self.write(ChangeFlags::DAMPING, |s| {
            s.linear_damping = linear;
            s.angular_damping = angular;
        });
        Ok(())
    }

    pub fn friction(&self) -> f32 {
        self.state.lock().friction
    }

    pub fn set_friction(&self, friction: f32) -> PhysicsResult<()> {
        ensure_non_negative("friction", friction)?;
        self.write(ChangeFlags::MATERIAL, |s| s.friction = friction);
        Ok(())
    }

    pub fn restitution(&self) -> f32 {
        self.state.lock().restitution
    }

    pub fn set_restitution(&self, restitution: f32) -> PhysicsResult<()> {
        ensure_non_negative("restitution", restitution)?;
        self.write(ChangeFlags::MATERIAL, |s| s.restitution = restitution);
        Ok(())
    }

    pub fn filter(&self) -> CollisionFilter {
        self.state.lock().filter
    }

    pub fn filter_group(&self) -> u32 {
        self.state.lock().filter.group
    }

    pub fn set_filter_group(&self, group: u32) {
        self.write(ChangeFlags::FILTER, |s| s.filter.group = group);
    }

    pub fn filter_mask(&self) -> u32 {
        self.state.lock().filter.mask
    }

    pub fn set_filter_mask(&self, mask: u32) {
        self.write(ChangeFlags::FILTER, |s| s.filter.mask = mask);
    }

    // ---- Sleep and deferred work ----

    pub fn is_sleeping(&self) -> bool {
        self.state.lock().sleeping
    }

    /// Queue a wake-up for the next pulse.
    pub fn activate(&self) {
        self.queues.activation.push(self.element_ref());
    }

    pub fn needs_activation(&self) -> bool {
        self.queues.activation.contains(&self.element_ref())
    }

    pub fn needs_aabb_update(&self) -> bool {
        self.queues.aabb_update.contains(&self.element_ref())
    }

    /// Reports from the last pulse that built collision reports.
    pub fn collision_reports(&self) -> Vec<CollisionReport> {
        self.state.lock().reports.clone()
    }

    pub(crate) fn set_collision_reports(&self, reports: Vec<CollisionReport>) {
        self.state.lock().reports = reports;
    }

    pub(crate) fn clear_collision_reports(&self) {
        self.state.lock().reports.clear();
    }

    /// Ids of constraints attached to this body.
    pub fn constraints(&self) -> Vec<ElementId> {
        self.state.lock().constraints.clone()
    }

    pub(crate) fn attach_constraint(&self, id: ElementId) {
        let mut s = self.state.lock();
        if !s.constraints.contains(&id) {
            s.constraints.push(id);
        }
    }

    pub(crate) fn detach_constraint(&self, id: ElementId) {
        self.state.lock().constraints.retain(|c| *c != id);
    }

    fn write(&self, flag: ChangeFlags, f: impl FnOnce(&mut RigidBodyState)) {
        {
            let mut s = self.state.lock();
            f(&mut s);
            s.pending.insert(flag);
        }
        self.queues.changes.push(self.element_ref());
    }

    // ---- Engine side (world lock held by the caller) ----

    /// Build and insert the engine body and collider. Returns `false` if the body was destroyed
    /// before its turn or is already registered.
    pub(crate) fn register(&self, dynamics: &mut DynamicsWorld) -> PhysicsResult<bool> {
        let engine_shape = self.shape.engine_shape()?;
        let margin = self.shape.margin();
        let mut s = self.state.lock();
        if s.destroyed || s.handle.is_some() {
            return Ok(false);
        }

        let mass_properties = mass_properties(&s, engine_shape.as_ref());
        let builder = if s.mass > 0.0 {
            RigidBodyBuilder::dynamic().ccd_enabled(dynamics.use_continuous)
        } else {
            RigidBodyBuilder::fixed()
        };
        let body = builder
            .pose(s.transform.iso())
            .linvel(s.linear_velocity)
            .angvel(s.angular_velocity)
            .linear_damping(s.linear_damping)
            .angular_damping(s.angular_damping)
            .additional_mass_properties(mass_properties)
            .user_data(self.element_ref().pack())
            .build();
        let handle = dynamics.insert_body(body);
        s.handle = Some(handle);

        if let Some(engine_shape) = engine_shape {
            let collider = self.build_collider(&s, engine_shape, margin);
            s.collider = Some(dynamics.attach_collider(collider, handle));
        }

        // Everything recorded so far is baked into the new body, except forces.
        let pending = s.pending.take();
        if pending.contains(ChangeFlags::FORCES) {
            apply_forces(&mut s, dynamics);
        }
        Ok(true)
    }

    /// Push pending pose/velocity/force/filter/material writes.
    pub(crate) fn apply_changes(&self, dynamics: &mut DynamicsWorld) {
        let mut s = self.state.lock();
        let Some(handle) = s.handle else {
            return;
        };
        let pending = s.pending;

        if let Some(body) = dynamics.bodies.get_mut(handle) {
            if pending.contains(ChangeFlags::POSE) {
                body.set_position(s.transform.iso(), true);
            }
            if pending.contains(ChangeFlags::LINEAR_VELOCITY) {
                body.set_linvel(s.linear_velocity, true);
            }
            if pending.contains(ChangeFlags::ANGULAR_VELOCITY) {
                body.set_angvel(s.angular_velocity, true);
            }
            if pending.contains(ChangeFlags::DAMPING) {
                body.set_linear_damping(s.linear_damping);
                body.set_angular_damping(s.angular_damping);
            }
        }
        if pending.contains(ChangeFlags::FORCES) {
            apply_forces(&mut s, dynamics);
        }
        // Without a collider the values wait in the state for the next collider build.
        if let Some(collider) = s.collider.and_then(|c| dynamics.colliders.get_mut(c)) {
            if pending.contains(ChangeFlags::MATERIAL) {
                collider.set_friction(s.friction);
                collider.set_restitution(s.restitution);
            }
            if pending.contains(ChangeFlags::FILTER) {
                collider.set_collision_groups(s.filter.groups());
            }
        }

        // MASS belongs to the update pass.
        let mass_pending = pending.contains(ChangeFlags::MASS);
        s.pending = ChangeFlags::default();
        if mass_pending {
            s.pending.insert(ChangeFlags::MASS);
        }
    }

    /// Recompute mass properties (and switch between fixed and dynamic on a zero mass edge).
    pub(crate) fn update_mass(&self, dynamics: &mut DynamicsWorld) -> PhysicsResult<()> {
        let engine_shape = self.shape.engine_shape()?;
        let mut s = self.state.lock();
        let Some(handle) = s.handle else {
            return Ok(());
        };
        let mass_properties = mass_properties(&s, engine_shape.as_ref());
        let dynamic = s.mass > 0.0;
        let use_continuous = dynamics.use_continuous;
        if let Some(body) = dynamics.bodies.get_mut(handle) {
            let wanted = if dynamic {
                RigidBodyType::Dynamic
            } else {
                RigidBodyType::Fixed
            };
            if body.body_type() != wanted {
                body.set_body_type(wanted, true);
            }
            body.set_additional_mass_properties(mass_properties, true);
            body.enable_ccd(dynamic && use_continuous);
        }
        s.pending.remove(ChangeFlags::MASS);
        Ok(())
    }

    /// Rebuild the collider geometry from the shape.
    pub(crate) fn refresh_collider(&self, dynamics: &mut DynamicsWorld) -> PhysicsResult<()> {
        let engine_shape = self.shape.engine_shape()?;
        let margin = self.shape.margin();
        let mut s = self.state.lock();
        let Some(handle) = s.handle else {
            return Ok(());
        };

        match (s.collider, engine_shape) {
            (Some(collider), Some(engine_shape)) => {
                if let Some(collider) = dynamics.colliders.get_mut(collider) {
                    collider.set_shape(engine_shape.shape);
                    collider.set_position_wrt_parent(engine_shape.local);
                    collider.set_contact_skin(margin);
                }
            }
            (Some(collider), None) => {
                dynamics.remove_collider(collider);
                s.collider = None;
            }
            (None, Some(engine_shape)) => {
                let collider = self.build_collider(&s, engine_shape, margin);
                s.collider = Some(dynamics.attach_collider(collider, handle));
            }
            (None, None) => {}
        }

        // Shape-derived inertia follows the new geometry.
        if s.local_inertia == Vec3::zeros() {
            s.pending.insert(ChangeFlags::MASS);
            drop(s);
            self.queues.updates.push(self.element_ref());
        }
        Ok(())
    }

    pub(crate) fn wake_up(&self, dynamics: &mut DynamicsWorld) {
        let s = self.state.lock();
        if let Some(body) = s.handle.and_then(|h| dynamics.bodies.get_mut(h)) {
            body.wake_up(true);
        }
    }

    /// Copy simulated state back. Returns `true` if the body is awake and dynamic.
    pub(crate) fn sync_from_engine(&self, dynamics: &mut DynamicsWorld) -> bool {
        let mut s = self.state.lock();
        let Some(body) = s.handle.and_then(|h| dynamics.bodies.get_mut(h)) else {
            return false;
        };
        if s.forces_in_engine {
            body.reset_forces(false);
            body.reset_torques(false);
        }
        let pose = *body.position();
        let linvel = *body.linvel();
        let angvel = *body.angvel();
        let sleeping = body.is_sleeping();
        let active = body.is_dynamic() && !sleeping;

        s.forces_in_engine = false;
        if !s.pending.contains(ChangeFlags::POSE) {
            s.transform = Transform::from_iso(&pose);
        }
        if !s.pending.contains(ChangeFlags::LINEAR_VELOCITY) {
            s.linear_velocity = linvel;
        }
        if !s.pending.contains(ChangeFlags::ANGULAR_VELOCITY) {
            s.angular_velocity = angvel;
        }
        s.sleeping = sleeping;
        active
    }

    /// Remove from the engine. Attached joints go with the body.
    pub(crate) fn unlink(&self, dynamics: &mut DynamicsWorld) {
        let mut s = self.state.lock();
        s.destroyed = true;
        if let Some(handle) = s.handle.take() {
            dynamics.remove_body(handle);
        }
        s.collider = None;
    }

    /// Forget engine handles without touching the engine (the engine itself was cleared).
    pub(crate) fn forget_engine(&self) {
        let mut s = self.state.lock();
        s.destroyed = true;
        s.handle = None;
        s.collider = None;
    }

    fn build_collider(
        &self,
        s: &RigidBodyState,
        engine_shape: EngineShape,
        margin: f32,
    ) -> rapier3d::prelude::Collider {
        ColliderBuilder::new(engine_shape.shape)
            .translation(engine_shape.local.translation.vector)
            .rotation(engine_shape.local.rotation.scaled_axis())
            .density(0.0)
            .friction(s.friction)
            .restitution(s.restitution)
            .collision_groups(s.filter.groups())
            .contact_skin(margin)
            .user_data(self.element_ref().pack())
            .build()
    }
}

impl std::fmt::Debug for RigidBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigidBody")
            .field("id", &self.id)
            .field("shape", &self.shape.id())
            .finish()
    }
}

fn apply_forces(s: &mut RigidBodyState, dynamics: &mut DynamicsWorld) {
    let requests = std::mem::take(&mut s.forces);
    let Some(body) = s.handle.and_then(|h| dynamics.bodies.get_mut(h)) else {
        return;
    };
    let origin = body.position().translation.vector;
    for request in requests {
        match request {
            ForceRequest::Force { force, at: None } => body.add_force(force, true),
            ForceRequest::Force {
                force,
                at: Some(at),
            } => body.add_force_at_point(force, Point3::from(origin + at), true),
            ForceRequest::Impulse { impulse, at: None } => body.apply_impulse(impulse, true),
            ForceRequest::Impulse {
                impulse,
                at: Some(at),
            } => body.apply_impulse_at_point(impulse, Point3::from(origin + at), true),
            ForceRequest::Torque(torque) => body.add_torque(torque, true),
            ForceRequest::TorqueImpulse(torque) => body.apply_torque_impulse(torque, true),
        }
    }
    s.forces_in_engine = true;
}

/// Mass properties handed to the engine. Colliders have zero density, so this is the whole mass.
fn mass_properties(s: &RigidBodyState, engine_shape: Option<&EngineShape>) -> MassProperties {
    if s.mass <= 0.0 {
        return MassProperties::default();
    }
    let inertia = if s.local_inertia != Vec3::zeros() {
        s.local_inertia
    } else {
        derived_inertia(s.mass, engine_shape)
    };
    MassProperties::new(Point3::from(s.center_of_mass), s.mass, inertia)
}

/// Principal inertia of `shape` at uniform density, rescaled to `mass`. Shapes without volume
/// (meshes, heightfields) fall back to a solid sphere of the bounding radius.
pub(crate) fn derived_inertia(mass: f32, engine_shape: Option<&EngineShape>) -> Vec3 {
    let Some(engine_shape) = engine_shape else {
        return Vec3::repeat(0.4 * mass);
    };
    let unit = engine_shape.shape.mass_properties(1.0);
    let unit_mass = unit.mass();
    if unit_mass > f32::EPSILON && unit_mass.is_finite() {
        return unit.principal_inertia() * (mass / unit_mass);
    }
    let radius = engine_shape
        .shape
        .compute_local_bounding_sphere()
        .radius()
        .max(f32::EPSILON);
    Vec3::repeat(0.4 * mass * radius * radius)
}
