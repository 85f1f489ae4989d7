//! Collision geometry imported from an external model collision source.
//!
//! The host owns the model data; the world only asks a [`CollisionDataSource`] for it by model id.
//! A model with only triangles becomes one BVH mesh. Anything else becomes a compound with one
//! child per box, sphere and triangle (meshes cannot be nested inside a compound, so mixed models
//! carry their triangles one by one).

use crate::error::PhysicsResult;
use crate::shape::{MeshMode, ShapeGeometry};
use crate::types::{Point3, Transform, Vec3};

/// Axis-aligned collision box in model space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelBox {
    pub min: Vec3,
    pub max: Vec3,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelSphere {
    pub center: Vec3,
    pub radius: f32,
}

/// Raw collision data of one model.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelCollisionData {
    pub boxes: Vec<ModelBox>,
    pub spheres: Vec<ModelSphere>,
    pub vertices: Vec<Vec3>,
    /// Indices into `vertices`.
    pub triangles: Vec<[u32; 3]>,
}

impl ModelCollisionData {
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty() && self.spheres.is_empty() && self.triangles.is_empty()
    }
}

/// One placed instance of a model in the host's world.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelPlacement {
    pub model: u32,
    pub transform: Transform,
}

/// Source of model collision data, implemented by the host.
pub trait CollisionDataSource: Send + Sync {
    /// `None` when the model is unknown or has no collision data.
    fn collision_data(&self, model: u32) -> Option<ModelCollisionData>;

    /// Every model placement of the host's world. Read once and cached by the world.
    fn world_placements(&self) -> Vec<ModelPlacement> {
        Vec::new()
    }
}

/// Shapes to build for one model.
pub(crate) enum ModelGeometry {
    Mesh(ShapeGeometry),
    Compound(Vec<(ShapeGeometry, Transform)>),
}

/// Convert model data into shape geometry. `Ok(None)` when nothing collidable is left.
pub(crate) fn model_geometry(data: &ModelCollisionData) -> PhysicsResult<Option<ModelGeometry>> {
    let triangles = resolve_triangles(data);

    if data.boxes.is_empty() && data.spheres.is_empty() {
        if triangles.is_empty() {
            return Ok(None);
        }
        let vertices = triangles.into_iter().flatten().collect();
        return Ok(Some(ModelGeometry::Mesh(ShapeGeometry::new_triangle_mesh(
            vertices,
            MeshMode::Bvh,
        )?)));
    }

    let mut children = Vec::with_capacity(data.boxes.len() + data.spheres.len() + triangles.len());
    for b in &data.boxes {
        let half = (b.max - b.min).abs() * 0.5;
        match ShapeGeometry::new_box(half) {
            Ok(geometry) => {
                children.push((geometry, Transform::from_translation((b.min + b.max) * 0.5)))
            }
            Err(e) => log::warn!("skipping model box {b:?}: {e}"),
        }
    }
    for s in &data.spheres {
        match ShapeGeometry::new_sphere(s.radius) {
            Ok(geometry) => children.push((geometry, Transform::from_translation(s.center))),
            Err(e) => log::warn!("skipping model sphere {s:?}: {e}"),
        }
    }
    for vertices in triangles {
        children.push((ShapeGeometry::Triangle { vertices }, Transform::IDENTITY));
    }

    if children.is_empty() {
        return Ok(None);
    }
    Ok(Some(ModelGeometry::Compound(children)))
}

/// Triangles with every index in range.
fn resolve_triangles(data: &ModelCollisionData) -> Vec<[Point3; 3]> {
    let vertex = |i: u32| data.vertices.get(i as usize).copied().map(Point3::from);
    data.triangles
        .iter()
        .filter_map(|t| match (vertex(t[0]), vertex(t[1]), vertex(t[2])) {
            (Some(a), Some(b), Some(c)) => Some([a, b, c]),
            _ => {
                log::warn!("skipping model triangle {t:?} with out of range index");
                None
            }
        })
        .collect()
}
