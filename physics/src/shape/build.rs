//! Conversion of shape geometry into engine geometry.
//!
//! Scale is baked into the engine shape: primitives scale their dimensions, point sets scale
//! every point, compounds scale child offsets and children. Round primitives use the largest
//! relevant scale component since the engine has no non-uniform ball.

use nalgebra as na;
use rapier3d::prelude::{Isometry, SharedShape};

use crate::error::{PhysicsError, PhysicsResult};
use crate::types::{Iso, Point3, Vec3};

use super::kind::{MeshMode, ShapeGeometry};

/// Engine geometry plus the pose of that geometry relative to its owner.
///
/// `local` is the identity for everything but heightfields, whose engine representation is
/// Y-up and gets rotated onto the Z-up world here.
#[derive(Clone)]
pub struct EngineShape {
    pub shape: SharedShape,
    pub local: Iso,
}

impl EngineShape {
    fn at_origin(shape: SharedShape) -> Self {
        Self {
            shape,
            local: Iso::identity(),
        }
    }
}

/// Build engine geometry.
///
/// Returns `Ok(None)` when there is nothing to collide with (an empty compound).
pub fn build_engine_shape(
    geometry: &ShapeGeometry,
    scale: Vec3,
) -> PhysicsResult<Option<EngineShape>> {
    let shape = match geometry {
        ShapeGeometry::Box { half_extents } => {
            let h = half_extents.component_mul(&scale);
            SharedShape::cuboid(h.x, h.y, h.z)
        }

        ShapeGeometry::Sphere { radius } => SharedShape::ball(radius * scale.max()),

        ShapeGeometry::Capsule { radius, height } => {
            SharedShape::capsule_y(0.5 * height * scale.y, radius * scale.x.max(scale.z))
        }

        ShapeGeometry::Cone { radius, height } => {
            SharedShape::cone(0.5 * height * scale.y, radius * scale.x.max(scale.z))
        }

        ShapeGeometry::Cylinder { radius, height } => {
            SharedShape::cylinder(0.5 * height * scale.y, radius * scale.x.max(scale.z))
        }

        ShapeGeometry::ConvexHull { points } => {
            let scaled = scale_points(points, scale);
            SharedShape::convex_hull(&scaled)
                .ok_or(PhysicsError::DegenerateGeometry("convex hull"))?
        }

        ShapeGeometry::TriangleMesh { vertices, mode } => {
            let scaled = scale_points(vertices, scale);
            let indices = soup_indices(scaled.len());
            if indices.is_empty() {
                return Err(PhysicsError::DegenerateGeometry("triangle mesh"));
            }
            match mode {
                MeshMode::Bvh => SharedShape::trimesh(scaled, indices)
                    .map_err(|_| PhysicsError::DegenerateGeometry("triangle mesh"))?,
                MeshMode::Gimpact => SharedShape::convex_decomposition(&scaled, &indices),
            }
        }

        ShapeGeometry::Triangle { vertices } => {
            let [a, b, c] = vertices.map(|p| Point3::from(p.coords.component_mul(&scale)));
            SharedShape::triangle(a, b, c)
        }

        ShapeGeometry::Heightfield {
            size_x,
            size_y,
            heights,
        } => {
            // Engine heightfields are Y-up on an XZ grid spanning [-0.5, 0.5] before scaling.
            let matrix = na::DMatrix::from_row_slice(*size_y, *size_x, heights);
            let field_scale = Vec3::new(
                (*size_x as f32 - 1.0) * scale.x,
                scale.z,
                (*size_y as f32 - 1.0) * scale.y,
            );
            return Ok(Some(EngineShape {
                shape: SharedShape::heightfield(matrix, field_scale),
                local: heightfield_to_z_up(),
            }));
        }

        ShapeGeometry::Compound { children } => {
            let mut parts: Vec<(Isometry<f32>, SharedShape)> = Vec::with_capacity(children.len());
            for child in children {
                let Some(part) = child.shape.engine_shape_scaled(scale)? else {
                    continue;
                };
                let mut offset = child.transform;
                offset.translation = offset.translation.component_mul(&scale);
                parts.push((offset.iso() * part.local, part.shape));
            }
            if parts.is_empty() {
                return Ok(None);
            }
            SharedShape::compound(parts)
        }
    };

    Ok(Some(EngineShape::at_origin(shape)))
}

/// Rotation taking the engine's +Y height axis onto world +Z.
fn heightfield_to_z_up() -> Iso {
    Iso::rotation(Vec3::x() * std::f32::consts::FRAC_PI_2)
}

fn scale_points(points: &[Point3], scale: Vec3) -> Vec<Point3> {
    points
        .iter()
        .map(|p| Point3::from(p.coords.component_mul(&scale)))
        .collect()
}

/// Index list for a triangle soup; trailing vertices that do not form a full triangle are ignored.
fn soup_indices(vertex_count: usize) -> Vec<[u32; 3]> {
    (0..(vertex_count / 3) as u32)
        .map(|t| [3 * t, 3 * t + 1, 3 * t + 2])
        .collect()
}
