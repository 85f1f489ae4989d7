/*!
Constraints (joints) between rigid bodies.

Two kinds are supported:
- point-to-point: a ball joint through one pivot per body, or through a pivot on one body and a
  fixed world point;
- fixed: locks the current relative pose of two bodies.

The engine has no breaking threshold, so the world checks every joint after each step: once the
linear impulse exceeds the threshold, the joint is removed from the engine and the constraint is
marked broken. Broken constraints stay registered until destroyed.
*/

use std::sync::Arc;

use parking_lot::Mutex;
use rapier3d::prelude::{
    FixedJointBuilder, ImpulseJointHandle, RigidBodyBuilder, RigidBodyHandle,
    SphericalJointBuilder,
};

use crate::constants::DEFAULT_BREAKING_IMPULSE_THRESHOLD;
use crate::dynamics::DynamicsWorld;
use crate::element::{ElementId, ElementKind, ElementRef, WorldId};
use crate::error::{PhysicsError, PhysicsResult, ensure_positive};
use crate::rigid_body::RigidBody;
use crate::types::{Iso, Point3, Transform, Vec3};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConstraintKind {
    PointToPoint,
    Fixed,
}

impl ConstraintKind {
    pub fn name(self) -> &'static str {
        match self {
            ConstraintKind::PointToPoint => "point-to-point",
            ConstraintKind::Fixed => "fixed",
        }
    }
}

/// Where the joint attaches, in each body's local frame.
#[derive(Copy, Clone, Debug, PartialEq)]
enum Attachment {
    Pivots { pivot_a: Vec3, pivot_b: Vec3 },
    /// `pivot_a` on body A, held at `world_point`.
    WorldPoint { pivot_a: Vec3, world_point: Vec3 },
    Frames { frame_a: Iso, frame_b: Iso },
}

/// Outcome of an init-queue registration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Registration {
    Registered,
    /// Destroyed or already registered.
    Skipped,
    /// A linked body was destroyed before this constraint got its turn.
    MissingBody,
}

pub(crate) struct ConstraintState {
    pub handle: Option<ImpulseJointHandle>,
    /// Internal fixed body for the single-body form.
    anchor: Option<RigidBodyHandle>,
    pub destroyed: bool,
    attachment: Attachment,
    breaking_threshold: f32,
    applied_impulse: f32,
    broken: bool,
    last_observed_broken: bool,
}

pub struct Constraint {
    id: ElementId,
    world: WorldId,
    kind: ConstraintKind,
    disable_collisions: bool,
    body_a: Arc<RigidBody>,
    body_b: Option<Arc<RigidBody>>,
    pub(crate) state: Mutex<ConstraintState>,
}

impl Constraint {
    /// Ball joint. Omitted pivots sit halfway between the two body origins.
    pub(crate) fn point_to_point(
        world: WorldId,
        body_a: Arc<RigidBody>,
        body_b: Arc<RigidBody>,
        pivots: Option<(Vec3, Vec3)>,
        disable_collisions: bool,
    ) -> PhysicsResult<Arc<Self>> {
        check_pair(world, &body_a, &body_b)?;
        let (pivot_a, pivot_b) =
            pivots.unwrap_or_else(|| midpoint_pivots(body_a.position(), body_b.position()));
        Ok(Self::build(
            world,
            ConstraintKind::PointToPoint,
            body_a,
            Some(body_b),
            Attachment::Pivots { pivot_a, pivot_b },
            disable_collisions,
        ))
    }

    /// Ball joint holding `pivot_a` (local to the body) where it currently is in the world.
    pub(crate) fn point_to_world(
        world: WorldId,
        body: Arc<RigidBody>,
        pivot_a: Vec3,
    ) -> PhysicsResult<Arc<Self>> {
        if body.world_id() != world {
            return Err(PhysicsError::CrossWorld(body.id()));
        }
        let world_point = body.transform().iso() * Point3::from(pivot_a);
        Ok(Self::build(
            world,
            ConstraintKind::PointToPoint,
            body,
            None,
            Attachment::WorldPoint {
                pivot_a,
                world_point: world_point.coords,
            },
            false,
        ))
    }

    /// Lock the current relative pose of the two bodies.
    pub(crate) fn fixed(
        world: WorldId,
        body_a: Arc<RigidBody>,
        body_b: Arc<RigidBody>,
        disable_collisions: bool,
    ) -> PhysicsResult<Arc<Self>> {
        check_pair(world, &body_a, &body_b)?;
        let (frame_a, frame_b) = relative_frames(&body_a.transform(), &body_b.transform());
        Ok(Self::build(
            world,
            ConstraintKind::Fixed,
            body_a,
            Some(body_b),
            Attachment::Frames { frame_a, frame_b },
            disable_collisions,
        ))
    }

    fn build(
        world: WorldId,
        kind: ConstraintKind,
        body_a: Arc<RigidBody>,
        body_b: Option<Arc<RigidBody>>,
        attachment: Attachment,
        disable_collisions: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: ElementId::next(),
            world,
            kind,
            disable_collisions,
            body_a,
            body_b,
            state: Mutex::new(ConstraintState {
                handle: None,
                anchor: None,
                destroyed: false,
                attachment,
                breaking_threshold: DEFAULT_BREAKING_IMPULSE_THRESHOLD,
                applied_impulse: 0.0,
                broken: false,
                last_observed_broken: false,
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
        ElementRef::new(ElementKind::Constraint, self.id)
    }

    #[inline]
    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    #[inline]
    pub fn body_a(&self) -> &Arc<RigidBody> {
        &self.body_a
    }

    /// `None` for a body-to-world constraint.
    #[inline]
    pub fn body_b(&self) -> Option<&Arc<RigidBody>> {
        self.body_b.as_ref()
    }

    pub fn bodies(&self) -> impl Iterator<Item = &Arc<RigidBody>> {
        std::iter::once(&self.body_a).chain(self.body_b.as_ref())
    }

    #[inline]
    pub fn disables_collisions(&self) -> bool {
        self.disable_collisions
    }

    /// `(pivot_a, pivot_b)` for a two-body point-to-point constraint.
    pub fn pivots(&self) -> Option<(Vec3, Vec3)> {
        match self.state.lock().attachment {
            Attachment::Pivots { pivot_a, pivot_b } => Some((pivot_a, pivot_b)),
            _ => None,
        }
    }

    pub fn breaking_impulse_threshold(&self) -> f32 {
        self.state.lock().breaking_threshold
    }

    pub fn set_breaking_impulse_threshold(&self, threshold: f32) -> PhysicsResult<()> {
        if !threshold.is_infinite() {
            ensure_positive("breaking impulse threshold", threshold)?;
        }
        self.state.lock().breaking_threshold = threshold;
        Ok(())
    }

    /// Linear impulse magnitude applied during the last step.
    pub fn applied_impulse(&self) -> f32 {
        self.state.lock().applied_impulse
    }

    pub fn is_broken(&self) -> bool {
        self.state.lock().broken
    }

    /// Active in the engine: registered and not broken.
    pub fn is_enabled(&self) -> bool {
        let s = self.state.lock();
        s.handle.is_some() && !s.broken
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    /// `true` once per broken-flag transition since the previous call.
    pub fn breaking_status_has_changed(&self) -> bool {
        let mut s = self.state.lock();
        let changed = s.broken != s.last_observed_broken;
        s.last_observed_broken = s.broken;
        changed
    }

    // ---- Engine side (world lock held by the caller) ----

    pub(crate) fn register(&self, dynamics: &mut DynamicsWorld) -> Registration {
        let handle_a = self.body_a.state.lock().handle;
        let handle_b = self.body_b.as_ref().map(|b| b.state.lock().handle);

        let mut s = self.state.lock();
        if s.destroyed || s.handle.is_some() {
            return Registration::Skipped;
        }
        let (Some(handle_a), Some(handle_b)) = (handle_a, handle_b.unwrap_or(handle_a)) else {
            return Registration::MissingBody;
        };

        let contacts = !self.disable_collisions;
        let handle = match s.attachment {
            Attachment::Pivots { pivot_a, pivot_b } => {
                let joint = SphericalJointBuilder::new()
                    .local_anchor1(Point3::from(pivot_a))
                    .local_anchor2(Point3::from(pivot_b))
                    .contacts_enabled(contacts);
                dynamics.insert_joint(handle_a, handle_b, joint)
            }
            Attachment::WorldPoint {
                pivot_a,
                world_point,
            } => {
                let anchor = dynamics.insert_body(
                    RigidBodyBuilder::fixed()
                        .pose(Iso::translation(world_point.x, world_point.y, world_point.z))
                        .build(),
                );
                s.anchor = Some(anchor);
                let joint = SphericalJointBuilder::new()
                    .local_anchor1(Point3::from(pivot_a))
                    .local_anchor2(Point3::origin());
                dynamics.insert_joint(handle_a, anchor, joint)
            }
            Attachment::Frames { frame_a, frame_b } => {
                let joint = FixedJointBuilder::new()
                    .local_frame1(frame_a)
                    .local_frame2(frame_b)
                    .contacts_enabled(contacts);
                dynamics.insert_joint(handle_a, handle_b, joint)
            }
        };
        s.handle = Some(handle);
        Registration::Registered
    }

    /// Sample the joint impulse and break it when over the threshold. Returns `true` on the step
    /// the constraint breaks.
    pub(crate) fn check_breaking(&self, dynamics: &mut DynamicsWorld) -> bool {
        let mut s = self.state.lock();
        if s.broken {
            return false;
        }
        let Some(handle) = s.handle else {
            return false;
        };
        let Some(impulse) = dynamics.joint_linear_impulse(handle) else {
            return false;
        };
        s.applied_impulse = impulse.norm();
        if s.applied_impulse <= s.breaking_threshold {
            return false;
        }
        dynamics.remove_joint(handle);
        s.broken = true;
        true
    }

    pub(crate) fn unlink(&self, dynamics: &mut DynamicsWorld) {
        let mut s = self.state.lock();
        s.destroyed = true;
        if let Some(handle) = s.handle.take() {
            dynamics.remove_joint(handle);
        }
        if let Some(anchor) = s.anchor.take() {
            dynamics.remove_body(anchor);
        }
    }

    pub(crate) fn forget_engine(&self) {
        let mut s = self.state.lock();
        s.destroyed = true;
        s.handle = None;
        s.anchor = None;
    }
}

impl std::fmt::Debug for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Constraint")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("body_a", &self.body_a.id())
            .field("body_b", &self.body_b.as_ref().map(|b| b.id()))
            .finish()
    }
}

fn check_pair(world: WorldId, a: &RigidBody, b: &RigidBody) -> PhysicsResult<()> {
    if a.id() == b.id() {
        return Err(PhysicsError::SameBody(a.id()));
    }
    for body in [a, b] {
        if body.world_id() != world {
            return Err(PhysicsError::CrossWorld(body.id()));
        }
        if body.is_destroyed() {
            return Err(PhysicsError::Destroyed(body.id()));
        }
    }
    Ok(())
}

/// Pivots meeting halfway between the two body origins.
pub(crate) fn midpoint_pivots(a: Vec3, b: Vec3) -> (Vec3, Vec3) {
    ((b - a) * 0.5, (a - b) * 0.5)
}

/// Joint frames such that `a * frame_a == b * frame_b` for the given poses.
pub(crate) fn relative_frames(a: &Transform, b: &Transform) -> (Iso, Iso) {
    (Iso::identity(), b.iso().inverse() * a.iso())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midpoint_pivots_meet() {
        let a = Vec3::new(0.0, 0.0, 5.0);
        let b = Vec3::new(2.0, 0.0, 5.0);
        let (pa, pb) = midpoint_pivots(a, b);
        assert_eq!(pa, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(pb, Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(a + pa, b + pb);
    }

    #[test]
    fn relative_frames_reproduce_current_pose() {
        let a = Transform::from_euler_degrees(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 0.0, 90.0));
        let b = Transform::from_translation(Vec3::new(-4.0, 0.0, 1.0));
        let (fa, fb) = relative_frames(&a, &b);
        let lhs = a.iso() * fa;
        let rhs = b.iso() * fb;
        assert!((lhs.translation.vector - rhs.translation.vector).norm() < 1.0e-5);
        assert!(lhs.rotation.angle_to(&rhs.rotation) < 1.0e-5);
    }

    #[test]
    fn kind_names() {
        assert_eq!(ConstraintKind::PointToPoint.name(), "point-to-point");
        assert_eq!(ConstraintKind::Fixed.name(), "fixed");
    }
}
