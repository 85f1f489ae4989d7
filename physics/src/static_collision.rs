//! Static collisions: immovable shape placements.
//!
//! Each static collision is a fixed engine body carrying one collider, built the first pulse
//! after creation. Statics never sleep or wake; pose and filter writes go through the changes
//! stack, scale and shape changes through the updates stack (geometry rebuild).

use std::sync::Arc;

use parking_lot::Mutex;
use rapier3d::prelude::{Collider, ColliderBuilder, ColliderHandle, RigidBodyBuilder, RigidBodyHandle};

use crate::constants::{DEFAULT_FRICTION, DEFAULT_RESTITUTION};
use crate::dynamics::DynamicsWorld;
use crate::element::{ElementId, ElementKind, ElementRef, WorldId};
use crate::error::{PhysicsResult, ensure_non_negative, ensure_positive};
use crate::queue::{ChangeFlags, WorkQueues};
use crate::report::CollisionReport;
use crate::shape::{EngineShape, Shape};
use crate::types::{Color, CollisionFilter, Quat, Transform, Vec3};

pub(crate) struct StaticCollisionState {
    pub handle: Option<RigidBodyHandle>,
    pub collider: Option<ColliderHandle>,
    pub destroyed: bool,
    transform: Transform,
    scale: Vec3,
    filter: CollisionFilter,
    friction: f32,
    restitution: f32,
    debug_color: Option<Color>,
    pending: ChangeFlags,
    reports: Vec<CollisionReport>,
}

pub struct StaticCollision {
    id: ElementId,
    world: WorldId,
    shape: Arc<Shape>,
    queues: Arc<WorkQueues>,
    pub(crate) state: Mutex<StaticCollisionState>,
}

impl StaticCollision {
    pub(crate) fn new(
        world: WorldId,
        queues: Arc<WorkQueues>,
        shape: Arc<Shape>,
        transform: Transform,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: ElementId::next(),
            world,
            shape,
            queues,
            state: Mutex::new(StaticCollisionState {
                handle: None,
                collider: None,
                destroyed: false,
                transform,
                scale: Vec3::repeat(1.0),
                filter: CollisionFilter::ALL,
                friction: DEFAULT_FRICTION,
                restitution: DEFAULT_RESTITUTION,
                debug_color: None,
                pending: ChangeFlags::default(),
                reports: Vec::new(),
            }),
        })
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
        ElementRef::new(ElementKind::StaticCollision, self.id)
    }

    #[inline]
    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    pub fn is_in_world(&self) -> bool {
        self.state.lock().handle.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

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

    pub fn scale(&self) -> Vec3 {
        self.state.lock().scale
    }

    /// Scale on top of the shape's own scale. Rebuilds the geometry at the next pulse.
    pub fn set_scale(&self, scale: Vec3) -> PhysicsResult<()> {
        ensure_positive("scale x", scale.x)?;
        ensure_positive("scale y", scale.y)?;
        ensure_positive("scale z", scale.z)?;
        self.state.lock().scale = scale;
        self.queues.updates.push(self.element_ref());
        Ok(())
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

    pub fn filter(&self) -> CollisionFilter {
        self.state.lock().filter
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

    /// Color used by debug drawing; never sent to the engine.
    pub fn debug_color(&self) -> Option<Color> {
        self.state.lock().debug_color
    }

    pub fn set_debug_color(&self, color: Option<Color>) {
        self.state.lock().debug_color = color;
    }

    pub fn collision_reports(&self) -> Vec<CollisionReport> {
        self.state.lock().reports.clone()
    }

    pub(crate) fn set_collision_reports(&self, reports: Vec<CollisionReport>) {
        self.state.lock().reports = reports;
    }

    pub(crate) fn clear_collision_reports(&self) {
        self.state.lock().reports.clear();
    }

    fn write(&self, flag: ChangeFlags, f: impl FnOnce(&mut StaticCollisionState)) {
        {
            let mut s = self.state.lock();
            f(&mut s);
            s.pending.insert(flag);
        }
        self.queues.changes.push(self.element_ref());
    }

    // ---- Engine side (world lock held by the caller) ----

    pub(crate) fn register(&self, dynamics: &mut DynamicsWorld) -> PhysicsResult<bool> {
        let scale = self.scale();
        let engine_shape = self.shape.engine_shape_scaled(scale)?;
        let margin = self.shape.margin();
        let mut s = self.state.lock();
        if s.destroyed || s.handle.is_some() {
            return Ok(false);
        }

        let body = RigidBodyBuilder::fixed()
            .pose(s.transform.iso())
            .user_data(self.element_ref().pack())
            .build();
        let handle = dynamics.insert_body(body);
        s.handle = Some(handle);
        if let Some(engine_shape) = engine_shape {
            let collider = self.build_collider(&s, engine_shape, margin);
            s.collider = Some(dynamics.attach_collider(collider, handle));
        }
        s.pending = ChangeFlags::default();
        Ok(true)
    }

    pub(crate) fn apply_changes(&self, dynamics: &mut DynamicsWorld) {
        let mut s = self.state.lock();
        let Some(handle) = s.handle else {
            return;
        };
        let pending = s.pending.take();
        if pending.contains(ChangeFlags::POSE) {
            if let Some(body) = dynamics.bodies.get_mut(handle) {
                body.set_position(s.transform.iso(), true);
            }
        }
        if let Some(collider) = s.collider.and_then(|c| dynamics.colliders.get_mut(c)) {
            if pending.contains(ChangeFlags::FILTER) {
                collider.set_collision_groups(s.filter.groups());
            }
            if pending.contains(ChangeFlags::MATERIAL) {
                collider.set_friction(s.friction);
                collider.set_restitution(s.restitution);
            }
        }
    }

    /// Rebuild the collider from the shape and the static's scale.
    pub(crate) fn rebuild_geometry(&self, dynamics: &mut DynamicsWorld) -> PhysicsResult<()> {
        let scale = self.scale();
        let engine_shape = self.shape.engine_shape_scaled(scale)?;
        let margin = self.shape.margin();
        let mut s = self.state.lock();
        let Some(handle) = s.handle else {
            return Ok(());
        };
        if let Some(old) = s.collider.take() {
            dynamics.remove_collider(old);
        }
        if let Some(engine_shape) = engine_shape {
            let collider = self.build_collider(&s, engine_shape, margin);
            s.collider = Some(dynamics.attach_collider(collider, handle));
        }
        Ok(())
    }

    pub(crate) fn unlink(&self, dynamics: &mut DynamicsWorld) {
        let mut s = self.state.lock();
        s.destroyed = true;
        if let Some(handle) = s.handle.take() {
            dynamics.remove_body(handle);
        }
        s.collider = None;
    }

    pub(crate) fn forget_engine(&self) {
        let mut s = self.state.lock();
        s.destroyed = true;
        s.handle = None;
        s.collider = None;
    }

    fn build_collider(
        &self,
        s: &StaticCollisionState,
        engine_shape: EngineShape,
        margin: f32,
    ) -> Collider {
        ColliderBuilder::new(engine_shape.shape)
            .translation(engine_shape.local.translation.vector)
            .rotation(engine_shape.local.rotation.scaled_axis())
            .friction(s.friction)
            .restitution(s.restitution)
            .collision_groups(s.filter.groups())
            .contact_skin(margin)
            .user_data(self.element_ref().pack())
            .build()
    }
}

impl std::fmt::Debug for StaticCollision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCollision")
            .field("id", &self.id)
            .field("shape", &self.shape.id())
            .finish()
    }
}
