//! Spatial queries under the world lock.
//!
//! Queries see the engine as the last pulse left it. Elements created since then become visible
//! once the next pulse registers them, whether or not that pulse steps.

use std::sync::Arc;

use crate::error::PhysicsResult;
use crate::query::{self, BoxQueryResult, RayHit, RayOptions, ShapeHit};
use crate::shape::Shape;
use crate::types::{CollisionFilter, Transform, Vec3};

use super::PhysicsWorld;

impl PhysicsWorld {
    pub fn ray_cast(&self, from: Vec3, to: Vec3, options: RayOptions) -> Option<RayHit> {
        query::ray_cast(&self.dynamics.lock(), from, to, options)
    }

    pub fn ray_cast_all(&self, from: Vec3, to: Vec3, options: RayOptions) -> Vec<RayHit> {
        query::ray_cast_all(&self.dynamics.lock(), from, to, options)
    }

    pub fn line_cast(&self, from: Vec3, to: Vec3, options: RayOptions) -> bool {
        query::line_cast(&self.dynamics.lock(), from, to, options)
    }

    /// Sweep `shape` between two poses. `Ok(None)` for a miss or a shape without geometry.
    pub fn shape_cast(
        &self,
        shape: &Arc<Shape>,
        from: Transform,
        to: Transform,
        filter: CollisionFilter,
    ) -> PhysicsResult<Option<ShapeHit>> {
        self.check_world(shape.id(), shape.world_id())?;
        let Some(engine_shape) = shape.engine_shape()? else {
            return Ok(None);
        };
        let dynamics = self.dynamics.lock();
        Ok(query::shape_cast(&dynamics, &engine_shape, &from, &to, filter))
    }

    pub fn query_box(&self, min: Vec3, max: Vec3, filter: CollisionFilter) -> BoxQueryResult {
        query::query_box(&self.dynamics.lock(), min, max, filter)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::element::{ElementKind, ElementRef};
    use crate::query::RayOptions;
    use crate::settings::WorldSettings;
    use crate::types::{CollisionFilter, Transform, Vec3};
    use crate::world::PhysicsWorld;

    #[test]
    fn new_static_is_hit_after_a_pulse() {
        let world = PhysicsWorld::new(WorldSettings::default()).unwrap();
        let shape = world.create_box_shape(Vec3::new(5.0, 5.0, 1.0)).unwrap();
        let ground = world
            .create_static_collision(&shape, Transform::IDENTITY)
            .unwrap();
        let from = Vec3::new(0.0, 0.0, 10.0);
        let to = Vec3::new(0.0, 0.0, -10.0);
        assert!(world.ray_cast(from, to, RayOptions::default()).is_none());

        world.pulse_with_elapsed(Duration::from_millis(16));
        let hit = world.ray_cast(from, to, RayOptions::default());
        assert_eq!(
            hit.map(|h| h.element),
            Some(ElementRef::new(ElementKind::StaticCollision, ground.id()))
        );
        assert_eq!(world.ray_cast_all(from, to, RayOptions::default()).len(), 1);
        assert!(world.line_cast(from, to, RayOptions::default()));
    }

    #[test]
    fn shape_cast_rejects_foreign_shapes() {
        let world = PhysicsWorld::new(WorldSettings::default()).unwrap();
        let other = PhysicsWorld::new(WorldSettings::default()).unwrap();
        let shape = other.create_sphere_shape(1.0).unwrap();
        assert!(
            world
                .shape_cast(&shape, Transform::IDENTITY, Transform::IDENTITY, CollisionFilter::ALL)
                .is_err()
        );
    }

    #[test]
    fn empty_compound_casts_nothing() {
        let world = PhysicsWorld::new(WorldSettings::default()).unwrap();
        let compound = world.create_compound_shape(4).unwrap();
        let from = Transform::from_translation(Vec3::new(0.0, 0.0, 5.0));
        let to = Transform::from_translation(Vec3::new(0.0, 0.0, -5.0));
        assert_eq!(
            world.shape_cast(&compound, from, to, CollisionFilter::ALL),
            Ok(None)
        );
    }
}
