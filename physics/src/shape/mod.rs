/*!
Collision shapes.

A [`Shape`] is shared geometry. Rigid bodies and static collisions reference it by `Arc`, the
shape references them back by id only. Any geometry change (scale, size, compound children,
heightfield samples) calls [`Shape::update_rigids`], which queues every referencing body for an
AABB refresh and a wake-up and every referencing static collision for a geometry rebuild. The
engine colliders are only touched at the next pulse.
*/

pub mod build;
pub mod kind;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::constants::DEFAULT_SHAPE_MARGIN;
use crate::element::{ElementId, ElementKind, ElementRef, WorldId};
use crate::error::{PhysicsError, PhysicsResult, ensure_non_negative, ensure_positive};
use crate::queue::WorkQueues;
use crate::types::{Bounds, Quat, Transform, Vec3};

pub use build::{EngineShape, build_engine_shape};
pub use kind::{CompoundChild, MeshMode, ShapeGeometry, ShapeKind, points_from_flat};

struct ShapeState {
    geometry: ShapeGeometry,
    scale: Vec3,
    margin: f32,
    rigid_bodies: Vec<ElementId>,
    static_collisions: Vec<ElementId>,
    /// Compounds this shape is a child of.
    parents: Vec<Weak<Shape>>,
    /// Convex decomposition of a gimpact mesh and the scale it was built at.
    decomposed: Option<(Vec3, EngineShape)>,
}

pub struct Shape {
    id: ElementId,
    world: WorldId,
    kind: ShapeKind,
    queues: Arc<WorkQueues>,
    state: Mutex<ShapeState>,
}

impl Shape {
    pub(crate) fn new(
        world: WorldId,
        queues: Arc<WorkQueues>,
        geometry: ShapeGeometry,
    ) -> PhysicsResult<Arc<Self>> {
        let shape = Arc::new(Self {
            id: ElementId::next(),
            world,
            kind: geometry.kind(),
            queues,
            state: Mutex::new(ShapeState {
                geometry,
                scale: Vec3::repeat(1.0),
                margin: DEFAULT_SHAPE_MARGIN,
                rigid_bodies: Vec::new(),
                static_collisions: Vec::new(),
                parents: Vec::new(),
                decomposed: None,
            }),
        });
        // Reject geometry the engine cannot represent before anything references it.
        shape.engine_shape()?;
        Ok(shape)
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
    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn scale(&self) -> Vec3 {
        self.state.lock().scale
    }

    pub fn set_scale(&self, scale: Vec3) -> PhysicsResult<()> {
        ensure_positive("scale x", scale.x)?;
        ensure_positive("scale y", scale.y)?;
        ensure_positive("scale z", scale.z)?;
        self.mutate(|s| {
            s.scale = scale;
            Ok(())
        })
    }

    pub fn margin(&self) -> f32 {
        self.state.lock().margin
    }

    pub fn set_margin(&self, margin: f32) -> PhysicsResult<()> {
        ensure_non_negative("margin", margin)?;
        self.mutate(|s| {
            s.margin = margin;
            Ok(())
        })
    }

    /// Local-space bounds including scale. `None` for an empty compound.
    pub fn bounding_box(&self) -> PhysicsResult<Option<Bounds>> {
        Ok(self.engine_shape()?.map(|e| {
            let aabb = e.shape.compute_aabb(&e.local);
            Bounds {
                min: aabb.mins.coords,
                max: aabb.maxs.coords,
            }
        }))
    }

    /// Local-space bounding sphere as `(center, radius)`.
    pub fn bounding_sphere(&self) -> PhysicsResult<Option<(Vec3, f32)>> {
        Ok(self.engine_shape()?.map(|e| {
            let sphere = e.shape.compute_bounding_sphere(&e.local);
            (sphere.center().coords, sphere.radius())
        }))
    }

    // ---- Primitive dimensions ----

    pub fn radius(&self) -> Option<f32> {
        match self.state.lock().geometry {
            ShapeGeometry::Sphere { radius }
            | ShapeGeometry::Capsule { radius, .. }
            | ShapeGeometry::Cone { radius, .. }
            | ShapeGeometry::Cylinder { radius, .. } => Some(radius),
            _ => None,
        }
    }

    pub fn set_radius(&self, value: f32) -> PhysicsResult<()> {
        ensure_positive("radius", value)?;
        self.mutate(|s| match &mut s.geometry {
            ShapeGeometry::Sphere { radius }
            | ShapeGeometry::Capsule { radius, .. }
            | ShapeGeometry::Cone { radius, .. }
            | ShapeGeometry::Cylinder { radius, .. } => {
                *radius = value;
                Ok(())
            }
            _ => Err(self.wrong_kind("round")),
        })
    }

    pub fn height(&self) -> Option<f32> {
        match self.state.lock().geometry {
            ShapeGeometry::Capsule { height, .. }
            | ShapeGeometry::Cone { height, .. }
            | ShapeGeometry::Cylinder { height, .. } => Some(height),
            _ => None,
        }
    }

    pub fn set_height(&self, value: f32) -> PhysicsResult<()> {
        ensure_positive("height", value)?;
        self.mutate(|s| match &mut s.geometry {
            ShapeGeometry::Capsule { height, .. }
            | ShapeGeometry::Cone { height, .. }
            | ShapeGeometry::Cylinder { height, .. } => {
                *height = value;
                Ok(())
            }
            _ => Err(self.wrong_kind("capsule, cone or cylinder")),
        })
    }

    /// Box half-extents.
    pub fn size(&self) -> Option<Vec3> {
        match self.state.lock().geometry {
            ShapeGeometry::Box { half_extents } => Some(half_extents),
            _ => None,
        }
    }

    pub fn set_size(&self, value: Vec3) -> PhysicsResult<()> {
        let validated = ShapeGeometry::new_box(value)?;
        self.mutate(|s| match s.geometry {
            ShapeGeometry::Box { .. } => {
                s.geometry = validated;
                Ok(())
            }
            _ => Err(self.wrong_kind("box")),
        })
    }

    // ---- Compound ----

    pub fn child_count(&self) -> usize {
        match &self.state.lock().geometry {
            ShapeGeometry::Compound { children } => children.len(),
            _ => 0,
        }
    }

    /// Add `child` at `transform` (relative to this compound). Returns the child index.
    pub fn add_child_shape(
        self: &Arc<Self>,
        child: &Arc<Shape>,
        transform: Transform,
    ) -> PhysicsResult<usize> {
        if child.kind.is_composite() {
            return Err(PhysicsError::InvalidCompoundChild(child.id));
        }
        if child.world != self.world {
            return Err(PhysicsError::CrossWorld(child.id));
        }
        let index = self.mutate(|s| match &mut s.geometry {
            ShapeGeometry::Compound { children } => {
                children.push(CompoundChild {
                    shape: Arc::clone(child),
                    transform,
                });
                Ok(children.len() - 1)
            }
            _ => Err(self.wrong_kind("compound")),
        })?;
        child.state.lock().parents.push(Arc::downgrade(self));
        Ok(index)
    }

    pub fn remove_child_shape(&self, index: usize) -> PhysicsResult<()> {
        let removed = self.mutate(|s| match &mut s.geometry {
            ShapeGeometry::Compound { children } => {
                let count = children.len();
                if index >= count {
                    return Err(PhysicsError::ChildIndexOutOfRange { index, count });
                }
                Ok(children.remove(index))
            }
            _ => Err(self.wrong_kind("compound")),
        })?;

        // The same child may appear more than once; drop one back-reference only.
        let mut child = removed.shape.state.lock();
        if let Some(pos) = child
            .parents
            .iter()
            .position(|p| p.upgrade().is_some_and(|p| p.id == self.id))
        {
            child.parents.swap_remove(pos);
        }
        Ok(())
    }

    pub fn child_transform(&self, index: usize) -> PhysicsResult<Transform> {
        match &self.state.lock().geometry {
            ShapeGeometry::Compound { children } => children
                .get(index)
                .map(|c| c.transform)
                .ok_or(PhysicsError::ChildIndexOutOfRange {
                    index,
                    count: children.len(),
                }),
            _ => Err(self.wrong_kind("compound")),
        }
    }

    pub fn set_child_position(&self, index: usize, position: Vec3) -> PhysicsResult<()> {
        self.with_child(index, |t| t.translation = position)
    }

    pub fn set_child_rotation(&self, index: usize, rotation: Quat) -> PhysicsResult<()> {
        self.with_child(index, |t| t.rotation = rotation)
    }

    fn with_child(&self, index: usize, f: impl FnOnce(&mut Transform)) -> PhysicsResult<()> {
        self.mutate(|s| match &mut s.geometry {
            ShapeGeometry::Compound { children } => {
                let count = children.len();
                let child = children
                    .get_mut(index)
                    .ok_or(PhysicsError::ChildIndexOutOfRange { index, count })?;
                f(&mut child.transform);
                Ok(())
            }
            _ => Err(self.wrong_kind("compound")),
        })
    }

    // ---- Heightfield ----

    /// `(size_x, size_y)` in samples.
    pub fn heightfield_size(&self) -> Option<(usize, usize)> {
        match self.state.lock().geometry {
            ShapeGeometry::Heightfield { size_x, size_y, .. } => Some((size_x, size_y)),
            _ => None,
        }
    }

    pub fn height_at(&self, index: usize) -> PhysicsResult<f32> {
        match &self.state.lock().geometry {
            ShapeGeometry::Heightfield { heights, .. } => {
                heights
                    .get(index)
                    .copied()
                    .ok_or(PhysicsError::SampleIndexOutOfRange {
                        index,
                        count: heights.len(),
                    })
            }
            _ => Err(self.wrong_kind("heightfield")),
        }
    }

    pub fn set_height_at(&self, index: usize, value: f32) -> PhysicsResult<()> {
        if !value.is_finite() {
            return Err(PhysicsError::NotFinite {
                what: "heightfield sample",
                value,
            });
        }
        self.mutate(|s| match &mut s.geometry {
            ShapeGeometry::Heightfield { heights, .. } => {
                let count = heights.len();
                let sample = heights
                    .get_mut(index)
                    .ok_or(PhysicsError::SampleIndexOutOfRange { index, count })?;
                *sample = value;
                Ok(())
            }
            _ => Err(self.wrong_kind("heightfield")),
        })
    }

    // ---- References ----

    pub fn rigid_bodies(&self) -> Vec<ElementId> {
        self.state.lock().rigid_bodies.clone()
    }

    pub fn static_collisions(&self) -> Vec<ElementId> {
        self.state.lock().static_collisions.clone()
    }

    pub fn is_referenced(&self) -> bool {
        let s = self.state.lock();
        !s.rigid_bodies.is_empty() || !s.static_collisions.is_empty()
    }

    pub(crate) fn add_rigid_body(&self, id: ElementId) {
        let mut s = self.state.lock();
        if !s.rigid_bodies.contains(&id) {
            s.rigid_bodies.push(id);
        }
    }

    pub(crate) fn remove_rigid_body(&self, id: ElementId) {
        self.state.lock().rigid_bodies.retain(|b| *b != id);
    }

    pub(crate) fn add_static_collision(&self, id: ElementId) {
        let mut s = self.state.lock();
        if !s.static_collisions.contains(&id) {
            s.static_collisions.push(id);
        }
    }

    pub(crate) fn remove_static_collision(&self, id: ElementId) {
        self.state.lock().static_collisions.retain(|c| *c != id);
    }

    /// Queue every referencing element for a geometry refresh, then do the same for every
    /// compound containing this shape.
    pub fn update_rigids(&self) {
        let (bodies, statics, parents) = {
            let s = self.state.lock();
            (
                s.rigid_bodies.clone(),
                s.static_collisions.clone(),
                s.parents.iter().filter_map(Weak::upgrade).collect::<Vec<_>>(),
            )
        };
        for id in bodies {
            let body = ElementRef::new(ElementKind::RigidBody, id);
            self.queues.aabb_update.push(body);
            self.queues.activation.push(body);
        }
        for id in statics {
            self.queues
                .updates
                .push(ElementRef::new(ElementKind::StaticCollision, id));
        }
        for parent in parents {
            parent.update_rigids();
        }
    }

    // ---- Engine geometry ----

    pub fn engine_shape(&self) -> PhysicsResult<Option<EngineShape>> {
        self.engine_shape_scaled(Vec3::repeat(1.0))
    }

    /// Build with an extra scale on top of this shape's own (used by parent compounds).
    pub(crate) fn engine_shape_scaled(&self, outer: Vec3) -> PhysicsResult<Option<EngineShape>> {
        let (geometry, scale) = {
            let s = self.state.lock();
            let scale = s.scale.component_mul(&outer);
            if let Some((built_at, cached)) = &s.decomposed {
                if *built_at == scale {
                    return Ok(Some(cached.clone()));
                }
            }
            (s.geometry.clone(), scale)
        };
        let built = build_engine_shape(&geometry, scale)?;
        // Decomposition is the one expensive build; mesh vertices never change after creation.
        if let (ShapeGeometry::TriangleMesh { mode: MeshMode::Gimpact, .. }, Some(shape)) =
            (&geometry, &built)
        {
            self.state.lock().decomposed = Some((scale, shape.clone()));
        }
        Ok(built)
    }

    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut ShapeState) -> PhysicsResult<R>,
    ) -> PhysicsResult<R> {
        let out = f(&mut self.state.lock())?;
        self.update_rigids();
        Ok(out)
    }

    fn wrong_kind(&self, expected: &'static str) -> PhysicsError {
        PhysicsError::WrongShapeKind {
            id: self.id,
            expected,
        }
    }
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shape")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(queues: &Arc<WorkQueues>, world: WorldId, geometry: PhysicsResult<ShapeGeometry>) -> Arc<Shape> {
        let geometry = geometry.unwrap_or_else(|e| panic!("geometry: {e}"));
        Shape::new(world, Arc::clone(queues), geometry).unwrap_or_else(|e| panic!("shape: {e}"))
    }

    #[test]
    fn scale_change_queues_referencing_bodies_and_statics() {
        let queues = WorkQueues::new();
        let world = WorldId::next();
        let sphere = shape(&queues, world, ShapeGeometry::new_sphere(1.0));
        let body = ElementId::next();
        let stat = ElementId::next();
        sphere.add_rigid_body(body);
        sphere.add_rigid_body(body);
        sphere.add_static_collision(stat);
        assert_eq!(sphere.rigid_bodies(), vec![body]);

        sphere.set_scale(Vec3::repeat(2.0)).unwrap_or_else(|e| panic!("{e}"));

        let body_ref = ElementRef::new(ElementKind::RigidBody, body);
        assert!(queues.aabb_update.contains(&body_ref));
        assert!(queues.activation.contains(&body_ref));
        assert!(
            queues
                .updates
                .contains(&ElementRef::new(ElementKind::StaticCollision, stat))
        );
        assert_eq!(sphere.scale(), Vec3::repeat(2.0));
    }

    #[test]
    fn invalid_mutation_leaves_shape_untouched() {
        let queues = WorkQueues::new();
        let sphere = shape(&queues, WorldId::next(), ShapeGeometry::new_sphere(1.0));
        sphere.add_rigid_body(ElementId::next());

        assert!(sphere.set_radius(0.0).is_err());
        assert!(sphere.set_scale(Vec3::new(1.0, -1.0, 1.0)).is_err());
        assert!(sphere.set_size(Vec3::repeat(1.0)).is_err());
        assert_eq!(sphere.radius(), Some(1.0));
        assert!(queues.aabb_update.is_empty());
    }

    #[test]
    fn compound_children_propagate_updates() {
        let queues = WorkQueues::new();
        let world = WorldId::next();
        let compound = shape(&queues, world, ShapeGeometry::new_compound(2));
        let child = shape(&queues, world, ShapeGeometry::new_box(Vec3::repeat(0.5)));
        let body = ElementId::next();
        compound.add_rigid_body(body);

        let index = compound
            .add_child_shape(&child, Transform::from_translation(Vec3::new(0.0, 0.0, 2.0)))
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(index, 0);
        queues.clear();

        child.set_size(Vec3::repeat(1.0)).unwrap_or_else(|e| panic!("{e}"));
        assert!(
            queues
                .aabb_update
                .contains(&ElementRef::new(ElementKind::RigidBody, body))
        );

        let bounds = compound
            .bounding_box()
            .ok()
            .flatten()
            .unwrap_or_else(|| panic!("compound has a child"));
        assert!((bounds.max.z - 3.0).abs() < 1.0e-4, "{bounds:?}");
    }

    #[test]
    fn compound_rejects_composites_and_bad_indices() {
        let queues = WorkQueues::new();
        let world = WorldId::next();
        let compound = shape(&queues, world, ShapeGeometry::new_compound(1));
        let field = shape(&queues, world, ShapeGeometry::new_heightfield(2, 2, None));

        assert_eq!(
            compound.add_child_shape(&field, Transform::IDENTITY),
            Err(PhysicsError::InvalidCompoundChild(field.id()))
        );
        assert!(matches!(
            compound.remove_child_shape(0),
            Err(PhysicsError::ChildIndexOutOfRange { index: 0, count: 0 })
        ));
        assert_eq!(compound.bounding_box(), Ok(None));
    }

    #[test]
    fn heightfield_samples_are_addressable() {
        let queues = WorkQueues::new();
        let field = shape(
            &queues,
            WorldId::next(),
            ShapeGeometry::new_heightfield(2, 3, Some(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0])),
        );
        assert_eq!(field.heightfield_size(), Some((2, 3)));
        assert_eq!(field.height_at(4), Ok(4.0));
        assert!(field.set_height_at(1, 9.0).is_ok());
        assert_eq!(field.height_at(1), Ok(9.0));
        assert!(matches!(
            field.height_at(6),
            Err(PhysicsError::SampleIndexOutOfRange { index: 6, count: 6 })
        ));
    }

    #[test]
    fn gimpact_decomposition_is_reused_until_rescaled() {
        let queues = WorkQueues::new();
        let tetrahedron = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ]
        .map(|[x, y, z]| crate::types::Point3::new(x, y, z));
        let [a, b, c, d] = tetrahedron;
        let soup = vec![a, c, b, a, b, d, a, d, c, b, c, d];
        let mesh = shape(
            &queues,
            WorldId::next(),
            ShapeGeometry::new_triangle_mesh(soup, MeshMode::Gimpact),
        );
        let engine = |mesh: &Shape| {
            mesh.engine_shape()
                .ok()
                .flatten()
                .unwrap_or_else(|| panic!("mesh has geometry"))
                .shape
                .0
        };

        let first = engine(&mesh);
        assert!(Arc::ptr_eq(&first, &engine(&mesh)));

        mesh.set_scale(Vec3::repeat(2.0)).unwrap_or_else(|e| panic!("{e}"));
        let scaled = engine(&mesh);
        assert!(!Arc::ptr_eq(&first, &scaled));
        assert!(Arc::ptr_eq(&scaled, &engine(&mesh)));
    }

    #[test]
    fn names_follow_kind() {
        let queues = WorkQueues::new();
        let cone = shape(&queues, WorldId::next(), ShapeGeometry::new_cone(1.0, 2.0));
        assert_eq!(cone.name(), "cone");
        assert_eq!(cone.height(), Some(2.0));
    }
}
