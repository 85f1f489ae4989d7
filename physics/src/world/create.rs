//! Element construction.
//!
//! Shapes are usable as soon as they are created. Rigid bodies, static collisions and constraints
//! are registered and queued; they enter the engine at the next pulse.

use std::sync::Arc;

use crate::constraint::Constraint;
use crate::error::{PhysicsError, PhysicsResult};
use crate::model::{ModelGeometry, ModelPlacement, model_geometry};
use crate::rigid_body::RigidBody;
use crate::shape::{MeshMode, Shape, ShapeGeometry, points_from_flat};
use crate::static_collision::StaticCollision;
use crate::types::{Point3, Transform, Vec3};

use super::PhysicsWorld;

impl PhysicsWorld {
    // ---- Shapes ----

    pub fn create_box_shape(&self, half_extents: Vec3) -> PhysicsResult<Arc<Shape>> {
        self.add_shape(ShapeGeometry::new_box(half_extents)?)
    }

    pub fn create_sphere_shape(&self, radius: f32) -> PhysicsResult<Arc<Shape>> {
        self.add_shape(ShapeGeometry::new_sphere(radius)?)
    }

    pub fn create_capsule_shape(&self, radius: f32, height: f32) -> PhysicsResult<Arc<Shape>> {
        self.add_shape(ShapeGeometry::new_capsule(radius, height)?)
    }

    pub fn create_cone_shape(&self, radius: f32, height: f32) -> PhysicsResult<Arc<Shape>> {
        self.add_shape(ShapeGeometry::new_cone(radius, height)?)
    }

    pub fn create_cylinder_shape(&self, radius: f32, height: f32) -> PhysicsResult<Arc<Shape>> {
        self.add_shape(ShapeGeometry::new_cylinder(radius, height)?)
    }

    pub fn create_compound_shape(&self, initial_capacity: usize) -> PhysicsResult<Arc<Shape>> {
        self.add_shape(ShapeGeometry::new_compound(initial_capacity)?)
    }

    pub fn create_convex_hull_shape(&self, points: Vec<Point3>) -> PhysicsResult<Arc<Shape>> {
        self.add_shape(ShapeGeometry::new_convex_hull(points)?)
    }

    /// Convex hull from a flat `[x, y, z, ...]` list.
    pub fn create_convex_hull_shape_from_flat(&self, coords: &[f32]) -> PhysicsResult<Arc<Shape>> {
        self.create_convex_hull_shape(points_from_flat(coords)?)
    }

    pub fn create_triangle_mesh_shape(
        &self,
        vertices: Vec<Point3>,
        mode: MeshMode,
    ) -> PhysicsResult<Arc<Shape>> {
        self.add_shape(ShapeGeometry::new_triangle_mesh(vertices, mode)?)
    }

    /// Triangle soup from a flat `[x, y, z, ...]` list.
    pub fn create_triangle_mesh_shape_from_flat(
        &self,
        coords: &[f32],
        mode: MeshMode,
    ) -> PhysicsResult<Arc<Shape>> {
        self.create_triangle_mesh_shape(points_from_flat(coords)?, mode)
    }

    pub fn create_heightfield_shape(
        &self,
        size_x: usize,
        size_y: usize,
        heights: Option<Vec<f32>>,
    ) -> PhysicsResult<Arc<Shape>> {
        self.add_shape(ShapeGeometry::new_heightfield(size_x, size_y, heights)?)
    }

    fn add_shape(&self, geometry: ShapeGeometry) -> PhysicsResult<Arc<Shape>> {
        let shape = Shape::new(self.id, Arc::clone(&self.queues), geometry)?;
        self.shapes.write().insert(shape.id(), Arc::clone(&shape));
        log::debug!("{} created {} shape {}", self.id, shape.name(), shape.id());
        Ok(shape)
    }

    // ---- Rigid bodies and static collisions ----

    /// Queue a new body. It is simulated (and visible to queries) after the next pulse.
    pub fn create_rigid_body(
        &self,
        shape: &Arc<Shape>,
        mass: f32,
        local_inertia: Vec3,
        center_of_mass: Vec3,
    ) -> PhysicsResult<Arc<RigidBody>> {
        let body = self.with_live_shape(shape, || {
            let body = RigidBody::new(
                self.id,
                Arc::clone(&self.queues),
                Arc::clone(shape),
                mass,
                local_inertia,
                center_of_mass,
            )?;
            shape.add_rigid_body(body.id());
            Ok(body)
        })?;
        self.rigid_bodies.write().insert(body.id(), Arc::clone(&body));
        self.init_rigid_bodies.push(Arc::clone(&body));
        log::debug!("{} queued rigid body {} (mass {mass})", self.id, body.id());
        Ok(body)
    }

    pub fn create_static_collision(
        &self,
        shape: &Arc<Shape>,
        transform: Transform,
    ) -> PhysicsResult<Arc<StaticCollision>> {
        let collision = self.with_live_shape(shape, || {
            let collision = StaticCollision::new(
                self.id,
                Arc::clone(&self.queues),
                Arc::clone(shape),
                transform,
            );
            shape.add_static_collision(collision.id());
            Ok(collision)
        })?;
        self.static_collisions
            .write()
            .insert(collision.id(), Arc::clone(&collision));
        self.init_static_collisions.push(Arc::clone(&collision));
        log::debug!("{} queued static collision {}", self.id, collision.id());
        Ok(collision)
    }

    /// Run `f` while `shape` is guaranteed to stay registered, so a concurrent destroy either
    /// sees the new reference or runs first and makes this fail.
    fn with_live_shape<R>(
        &self,
        shape: &Shape,
        f: impl FnOnce() -> PhysicsResult<R>,
    ) -> PhysicsResult<R> {
        self.check_world(shape.id(), shape.world_id())?;
        let shapes = self.shapes.read();
        if !shapes.contains_key(&shape.id()) {
            return Err(PhysicsError::Destroyed(shape.id()));
        }
        f()
    }

    // ---- Constraints ----

    /// Ball joint between two bodies. `pivots` are local to each body; when omitted both pivots
    /// meet halfway between the body origins.
    pub fn create_point_to_point_constraint(
        &self,
        body_a: &Arc<RigidBody>,
        body_b: &Arc<RigidBody>,
        pivots: Option<(Vec3, Vec3)>,
        disable_collisions: bool,
    ) -> PhysicsResult<Arc<Constraint>> {
        let constraint = Constraint::point_to_point(
            self.id,
            Arc::clone(body_a),
            Arc::clone(body_b),
            pivots,
            disable_collisions,
        )?;
        Ok(self.add_constraint(constraint))
    }

    /// Ball joint holding `pivot` (local to `body`) at its current world position.
    pub fn create_point_to_world_constraint(
        &self,
        body: &Arc<RigidBody>,
        pivot: Vec3,
    ) -> PhysicsResult<Arc<Constraint>> {
        if body.is_destroyed() {
            return Err(PhysicsError::Destroyed(body.id()));
        }
        let constraint = Constraint::point_to_world(self.id, Arc::clone(body), pivot)?;
        Ok(self.add_constraint(constraint))
    }

    /// Lock the current relative pose of two bodies.
    pub fn create_fixed_constraint(
        &self,
        body_a: &Arc<RigidBody>,
        body_b: &Arc<RigidBody>,
        disable_collisions: bool,
    ) -> PhysicsResult<Arc<Constraint>> {
        let constraint = Constraint::fixed(
            self.id,
            Arc::clone(body_a),
            Arc::clone(body_b),
            disable_collisions,
        )?;
        Ok(self.add_constraint(constraint))
    }

    fn add_constraint(&self, constraint: Arc<Constraint>) -> Arc<Constraint> {
        for body in constraint.bodies() {
            body.attach_constraint(constraint.id());
        }
        self.constraints
            .write()
            .insert(constraint.id(), Arc::clone(&constraint));
        self.init_constraints.push(Arc::clone(&constraint));
        log::debug!(
            "{} queued {} constraint {}",
            self.id,
            constraint.kind().name(),
            constraint.id()
        );
        constraint
    }

    // ---- Model collision ----

    /// Build a shape from a model's collision data. `Ok(None)` without a collision source, for an
    /// unknown model, or for a model without collidable geometry.
    pub fn create_shape_from_model(&self, model: u32) -> PhysicsResult<Option<Arc<Shape>>> {
        let Some(source) = &self.collision_source else {
            return Ok(None);
        };
        let Some(data) = source.collision_data(model) else {
            return Ok(None);
        };
        match model_geometry(&data)? {
            None => Ok(None),
            Some(ModelGeometry::Mesh(geometry)) => self.add_shape(geometry).map(Some),
            Some(ModelGeometry::Compound(children)) => {
                let compound = self.add_shape(ShapeGeometry::new_compound(children.len())?)?;
                for (geometry, transform) in children {
                    let child = self.add_shape(geometry)?;
                    compound.add_child_shape(&child, transform)?;
                }
                Ok(Some(compound))
            }
        }
    }

    pub fn create_static_collision_from_model(
        &self,
        model: u32,
        transform: Transform,
    ) -> PhysicsResult<Option<Arc<StaticCollision>>> {
        match self.create_shape_from_model(model)? {
            Some(shape) => self.create_static_collision(&shape, transform).map(Some),
            None => Ok(None),
        }
    }

    /// Build static collisions for every cached world placement not built yet.
    pub fn build_collision_from_models(&self) -> PhysicsResult<Vec<Arc<StaticCollision>>> {
        self.build_placements(|_| true)
    }

    /// Build static collisions for cached world placements closer than `radius` to `center`.
    /// Built placements leave the cache, so repeated calls only build what is new.
    pub fn build_collision_from_models_in_radius(
        &self,
        center: Vec3,
        radius: f32,
    ) -> PhysicsResult<Vec<Arc<StaticCollision>>> {
        let radius_sq = radius * radius;
        self.build_placements(|p| (p.transform.translation - center).norm_squared() < radius_sq)
    }

    fn build_placements(
        &self,
        mut wanted: impl FnMut(&ModelPlacement) -> bool,
    ) -> PhysicsResult<Vec<Arc<StaticCollision>>> {
        let Some(source) = &self.collision_source else {
            return Ok(Vec::new());
        };
        let selected: Vec<ModelPlacement> = {
            let mut cache = self.placements.lock();
            let placements = cache.get_or_insert_with(|| source.world_placements());
            let (selected, rest): (Vec<_>, Vec<_>) =
                placements.drain(..).partition(|p| wanted(p));
            *placements = rest;
            selected
        };

        let mut built = Vec::with_capacity(selected.len());
        for placement in selected {
            if let Some(collision) =
                self.create_static_collision_from_model(placement.model, placement.transform)?
            {
                built.push(collision);
            }
        }
        log::info!("{} built {} static collisions from models", self.id, built.len());
        Ok(built)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementKind;
    use crate::model::{CollisionDataSource, ModelBox, ModelCollisionData};
    use crate::settings::WorldSettings;
    use crate::shape::ShapeKind;

    struct Boxes;

    impl CollisionDataSource for Boxes {
        fn collision_data(&self, model: u32) -> Option<ModelCollisionData> {
            (model == 1).then(|| ModelCollisionData {
                boxes: vec![
                    ModelBox {
                        min: Vec3::new(-1.0, -1.0, 0.0),
                        max: Vec3::new(1.0, 1.0, 2.0),
                    },
                    ModelBox {
                        min: Vec3::new(2.0, -1.0, 0.0),
                        max: Vec3::new(4.0, 1.0, 2.0),
                    },
                ],
                ..Default::default()
            })
        }

        fn world_placements(&self) -> Vec<ModelPlacement> {
            [0.0, 50.0, 500.0]
                .into_iter()
                .map(|x| ModelPlacement {
                    model: 1,
                    transform: Transform::from_translation(Vec3::new(x, 0.0, 0.0)),
                })
                .chain(std::iter::once(ModelPlacement {
                    model: 2,
                    transform: Transform::IDENTITY,
                }))
                .collect()
        }
    }

    fn world_with_models() -> PhysicsWorld {
        PhysicsWorld::with_collaborators(
            WorldSettings::default(),
            Arc::new(crate::events::NoEvents),
            Some(Arc::new(Boxes)),
        )
        .unwrap()
    }

    #[test]
    fn invalid_shapes_register_nothing() {
        let world = PhysicsWorld::new(WorldSettings::default()).unwrap();
        assert!(world.create_sphere_shape(0.0).is_err());
        assert!(world.create_box_shape(Vec3::new(1.0, -1.0, 1.0)).is_err());
        assert!(world.create_convex_hull_shape_from_flat(&[0.0, 1.0]).is_err());
        assert!(world.create_compound_shape(0).is_err());
        assert!(world.shapes().is_empty());
    }

    #[test]
    fn body_on_destroyed_shape_rejected() {
        let world = PhysicsWorld::new(WorldSettings::default()).unwrap();
        let shape = world.create_sphere_shape(1.0).unwrap();
        world.destroy_shape(&shape).unwrap();
        assert_eq!(
            world
                .create_rigid_body(&shape, 1.0, Vec3::zeros(), Vec3::zeros())
                .err(),
            Some(PhysicsError::Destroyed(shape.id()))
        );
    }

    #[test]
    fn shapes_from_other_worlds_rejected() {
        let a = PhysicsWorld::new(WorldSettings::default()).unwrap();
        let b = PhysicsWorld::new(WorldSettings::default()).unwrap();
        let shape = a.create_sphere_shape(1.0).unwrap();
        assert_eq!(
            b.create_static_collision(&shape, Transform::IDENTITY).err(),
            Some(PhysicsError::CrossWorld(shape.id()))
        );
    }

    #[test]
    fn constraint_is_attached_to_both_bodies() {
        let world = PhysicsWorld::new(WorldSettings::default()).unwrap();
        let shape = world.create_sphere_shape(0.5).unwrap();
        let a = world.create_rigid_body(&shape, 1.0, Vec3::zeros(), Vec3::zeros()).unwrap();
        let b = world.create_rigid_body(&shape, 1.0, Vec3::zeros(), Vec3::zeros()).unwrap();
        let c = world.create_fixed_constraint(&a, &b, true).unwrap();
        assert_eq!(a.constraints(), vec![c.id()]);
        assert_eq!(b.constraints(), vec![c.id()]);
        assert_eq!(
            world.create_point_to_point_constraint(&a, &a, None, false).err(),
            Some(PhysicsError::SameBody(a.id()))
        );
    }

    #[test]
    fn model_shape_is_a_compound_of_boxes() {
        let world = world_with_models();
        let shape = world.create_shape_from_model(1).unwrap().unwrap();
        assert_eq!(shape.kind(), ShapeKind::Compound);
        assert_eq!(shape.child_count(), 2);
        assert_eq!(
            shape.child_transform(1).unwrap().translation,
            Vec3::new(3.0, 0.0, 1.0)
        );
        assert!(world.create_shape_from_model(7).unwrap().is_none());
        assert!(
            PhysicsWorld::new(WorldSettings::default())
                .unwrap()
                .create_shape_from_model(1)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn radius_build_consumes_placements() {
        let world = world_with_models();
        let near = world
            .build_collision_from_models_in_radius(Vec3::zeros(), 100.0)
            .unwrap();
        assert_eq!(near.len(), 2);
        assert!(
            world
                .build_collision_from_models_in_radius(Vec3::zeros(), 100.0)
                .unwrap()
                .is_empty()
        );
        // Model 2 has no data and builds nothing.
        let rest = world.build_collision_from_models().unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(
            world.element(rest[0].id()).map(|e| e.kind()),
            Some(ElementKind::StaticCollision)
        );
        assert_eq!(world.static_collisions().len(), 3);
    }
}
