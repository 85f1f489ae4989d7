//! Engine wrapper: every rapier set and pipeline of one world.
//!
//! [`DynamicsWorld`] lives behind the world lock. Element code reaches it only through
//! `&mut DynamicsWorld` handed out by the pulse or by a creation/destruction call, so all engine
//! mutation is serialized.
//!
//! Conventions
//! - Every collider created for an element carries its [`ElementRef`] packed into `user_data`.
//!   Looking a collider handle up in the collider set is the reverse index used by queries and
//!   collision reports.
//! - Colliders have zero density. Mass comes exclusively from the element's mass properties.

// Re-export Rapier so the host can build engine types without depending on `rapier3d` directly.
pub use rapier3d;

use rapier3d::prelude::*;

use crate::element::ElementRef;
use crate::types::Vec3;

pub struct DynamicsWorld {
    pub gravity: Vec3,
    pub integration_parameters: IntegrationParameters,
    pub pipeline: PhysicsPipeline,
    pub islands: IslandManager,
    pub broad_phase: BroadPhaseBvh,
    pub narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub impulse_joints: ImpulseJointSet,
    pub multibody_joints: MultibodyJointSet,
    pub ccd_solver: CCDSolver,
    /// Continuous collision detection for every body inserted or updated from now on.
    pub use_continuous: bool,
}

impl DynamicsWorld {
    pub fn new(gravity: Vec3) -> Self {
        Self {
            gravity,
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            use_continuous: false,
        }
    }

    /// Advance by `dt` seconds split into `sub_steps` equal steps.
    pub fn step(&mut self, dt: f32, sub_steps: u32) {
        if dt <= 0.0 || sub_steps == 0 {
            return;
        }
        self.integration_parameters.dt = dt / sub_steps as f32;

        // Using default hooks/events (none). Contacts are read back from the narrow phase.
        let hooks = ();
        let events = ();
        for _ in 0..sub_steps {
            self.pipeline.step(
                &self.gravity,
                &self.integration_parameters,
                &mut self.islands,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd_solver,
                &hooks,
                &events,
            );
        }
    }

    /// Bring collider poses and broad-phase bounds up to date without stepping.
    ///
    /// Pairs and contacts are left to the next [`DynamicsWorld::step`], which still sees every
    /// pending modification.
    pub fn refresh_broad_phase(&mut self) {
        self.bodies
            .propagate_modified_body_positions_to_colliders(&mut self.colliders);
        let params = &self.integration_parameters;
        for (handle, collider) in self.colliders.iter_enabled() {
            let aabb = collider.compute_broad_phase_aabb(params, &self.bodies);
            self.broad_phase.set_aabb(params, handle, aabb);
        }
    }

    /// Create a borrowed `QueryPipeline` view over the current broad phase.
    ///
    /// Reflects the last [`DynamicsWorld::step`] or [`DynamicsWorld::refresh_broad_phase`].
    pub fn query_pipeline<'a>(&'a self, filter: QueryFilter<'a>) -> QueryPipeline<'a> {
        self.broad_phase.as_query_pipeline(
            self.narrow_phase.query_dispatcher(),
            &self.bodies,
            &self.colliders,
            filter,
        )
    }

    pub fn insert_body(&mut self, body: RigidBody) -> RigidBodyHandle {
        self.bodies.insert(body)
    }

    pub fn attach_collider(
        &mut self,
        collider: Collider,
        parent: RigidBodyHandle,
    ) -> ColliderHandle {
        self.colliders
            .insert_with_parent(collider, parent, &mut self.bodies)
    }

    pub fn remove_collider(&mut self, handle: ColliderHandle) {
        self.colliders
            .remove(handle, &mut self.islands, &mut self.bodies, true);
    }

    /// Remove a body, its colliders and every joint attached to it.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    pub fn insert_joint(
        &mut self,
        body1: RigidBodyHandle,
        body2: RigidBodyHandle,
        joint: impl Into<GenericJoint>,
    ) -> ImpulseJointHandle {
        self.impulse_joints.insert(body1, body2, joint, true)
    }

    pub fn remove_joint(&mut self, handle: ImpulseJointHandle) {
        self.impulse_joints.remove(handle, true);
    }

    /// Linear impulse applied by a joint during the last step. `None` once removed.
    pub fn joint_linear_impulse(&self, handle: ImpulseJointHandle) -> Option<Vec3> {
        self.impulse_joints
            .get(handle)
            .map(|j| Vec3::new(j.impulses[0], j.impulses[1], j.impulses[2]))
    }

    /// Element owning a collider.
    pub fn element_of(&self, collider: ColliderHandle) -> Option<ElementRef> {
        self.colliders
            .get(collider)
            .and_then(|c| ElementRef::unpack(c.user_data))
    }

    pub fn set_use_continuous(&mut self, enabled: bool) {
        self.use_continuous = enabled;
        for (_, body) in self.bodies.iter_mut() {
            if body.is_dynamic() {
                body.enable_ccd(enabled);
            }
        }
    }

    /// Drop every engine object. Handles held by elements become dangling and must be cleared
    /// by the caller.
    pub fn clear(&mut self) {
        let gravity = self.gravity;
        let use_continuous = self.use_continuous;
        let integration_parameters = self.integration_parameters;
        *self = Self::new(gravity);
        self.use_continuous = use_continuous;
        self.integration_parameters = integration_parameters;
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    pub fn joint_count(&self) -> usize {
        self.impulse_joints.len()
    }
}

impl std::fmt::Debug for DynamicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicsWorld")
            .field("bodies", &self.bodies.len())
            .field("colliders", &self.colliders.len())
            .field("joints", &self.impulse_joints.len())
            .finish()
    }
}
