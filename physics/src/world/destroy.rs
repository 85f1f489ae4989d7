//! Element destruction.
//!
//! Destruction marks the element destroyed under the world lock, removes it from the engine, the
//! registries and its shape's back-references, in that order. Destroying twice is a no-op.

use std::sync::Arc;

use crate::constraint::Constraint;
use crate::dynamics::DynamicsWorld;
use crate::element::Element;
use crate::error::{PhysicsError, PhysicsResult};
use crate::rigid_body::RigidBody;
use crate::shape::Shape;
use crate::static_collision::StaticCollision;

use super::PhysicsWorld;

impl PhysicsWorld {
    pub fn destroy_element(&self, element: &Element) -> PhysicsResult<()> {
        match element {
            Element::Shape(shape) => self.destroy_shape(shape),
            Element::RigidBody(body) => self.destroy_rigid_body(body),
            Element::StaticCollision(collision) => self.destroy_static_collision(collision),
            Element::Constraint(constraint) => self.destroy_constraint(constraint),
        }
    }

    /// Rejected with [`PhysicsError::ShapeInUse`] while a body or static collision uses the shape.
    pub fn destroy_shape(&self, shape: &Arc<Shape>) -> PhysicsResult<()> {
        self.check_world(shape.id(), shape.world_id())?;
        let mut shapes = self.shapes.write();
        if shape.is_referenced() {
            return Err(PhysicsError::ShapeInUse {
                id: shape.id(),
                rigid_bodies: shape.rigid_bodies().len(),
                static_collisions: shape.static_collisions().len(),
            });
        }
        if shapes.remove(&shape.id()).is_some() {
            log::debug!("{} destroyed shape {}", self.id, shape.id());
        }
        Ok(())
    }

    /// Destroy a body together with every constraint attached to it.
    pub fn destroy_rigid_body(&self, body: &Arc<RigidBody>) -> PhysicsResult<()> {
        self.check_world(body.id(), body.world_id())?;
        let mut dynamics = self.dynamics.lock();
        self.unlink_rigid_body(&mut dynamics, body);
        Ok(())
    }

    pub fn destroy_static_collision(&self, collision: &Arc<StaticCollision>) -> PhysicsResult<()> {
        self.check_world(collision.id(), collision.world_id())?;
        let mut dynamics = self.dynamics.lock();
        collision.unlink(&mut dynamics);
        drop(dynamics);

        let removed = self.static_collisions.write().remove(&collision.id()).is_some();
        collision.shape().remove_static_collision(collision.id());
        collision.clear_collision_reports();
        if removed {
            log::debug!("{} destroyed static collision {}", self.id, collision.id());
        }
        Ok(())
    }

    pub fn destroy_constraint(&self, constraint: &Arc<Constraint>) -> PhysicsResult<()> {
        self.check_world(constraint.id(), constraint.world_id())?;
        let mut dynamics = self.dynamics.lock();
        self.unlink_constraint(&mut dynamics, constraint);
        Ok(())
    }

    /// World lock held by the caller.
    pub(crate) fn unlink_rigid_body(&self, dynamics: &mut DynamicsWorld, body: &RigidBody) {
        for id in body.constraints() {
            if let Some(constraint) = self.constraint(id) {
                self.unlink_constraint(dynamics, &constraint);
            }
        }
        body.unlink(dynamics);

        let removed = self.rigid_bodies.write().remove(&body.id()).is_some();
        body.shape().remove_rigid_body(body.id());
        body.clear_collision_reports();
        self.active_rigid_bodies.write().retain(|id| *id != body.id());
        if removed {
            log::debug!("{} destroyed rigid body {}", self.id, body.id());
        }
    }

    /// World lock held by the caller.
    pub(crate) fn unlink_constraint(&self, dynamics: &mut DynamicsWorld, constraint: &Constraint) {
        constraint.unlink(dynamics);
        let removed = self.constraints.write().remove(&constraint.id()).is_some();
        for body in constraint.bodies() {
            body.detach_constraint(constraint.id());
        }
        if removed {
            log::debug!("{} destroyed constraint {}", self.id, constraint.id());
        }
    }
}
