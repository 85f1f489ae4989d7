//! Shape geometry descriptors and their validation.
//!
//! A [`ShapeGeometry`] is pure data. Constructors validate their input and never touch the engine;
//! conversion to engine geometry lives in [`super::build`].

use std::sync::Arc;

use crate::constants::{MIN_HEIGHTFIELD_SAMPLES, MIN_SHAPE_POINTS};
use crate::error::{PhysicsError, PhysicsResult, ensure_positive};
use crate::types::{Point3, Transform, Vec3};

use super::Shape;

/// Tag of a shape's geometry, exposed to scripts through [`ShapeKind::name`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Box,
    Sphere,
    Capsule,
    Cone,
    Cylinder,
    Compound,
    ConvexHull,
    TriangleMesh,
    GimpactTriangleMesh,
    Heightfield,
    /// Single triangle, produced by model import for meshes mixed with primitives.
    Triangle,
}

impl ShapeKind {
    pub fn name(self) -> &'static str {
        match self {
            ShapeKind::Box => "box",
            ShapeKind::Sphere => "sphere",
            ShapeKind::Capsule => "capsule",
            ShapeKind::Cone => "cone",
            ShapeKind::Cylinder => "cylinder",
            ShapeKind::Compound => "compound",
            ShapeKind::ConvexHull => "convex-hull",
            ShapeKind::TriangleMesh => "bvh-triangle-mesh",
            ShapeKind::GimpactTriangleMesh => "gimpact-triangle-mesh",
            ShapeKind::Heightfield => "heightfield-terrain",
            ShapeKind::Triangle => "triangle",
        }
    }

    /// Composite shapes cannot be nested inside a compound.
    pub fn is_composite(self) -> bool {
        matches!(
            self,
            ShapeKind::Compound
                | ShapeKind::TriangleMesh
                | ShapeKind::GimpactTriangleMesh
                | ShapeKind::Heightfield
        )
    }
}

/// Triangle mesh acceleration flavor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MeshMode {
    /// Static BVH mesh. Best for level geometry.
    Bvh,
    /// Mesh that can be attached to a moving body (approximated by convex parts).
    Gimpact,
}

#[derive(Clone)]
pub struct CompoundChild {
    pub shape: Arc<Shape>,
    pub transform: Transform,
}

/// Geometry of a shape, before scale is applied.
///
/// Round shapes are aligned with the local Y axis, heightfields rise along +Z.
#[derive(Clone)]
pub enum ShapeGeometry {
    Box {
        half_extents: Vec3,
    },
    Sphere {
        radius: f32,
    },
    /// `height` is the length of the cylindrical part between the two cap centers.
    Capsule {
        radius: f32,
        height: f32,
    },
    Cone {
        radius: f32,
        height: f32,
    },
    Cylinder {
        radius: f32,
        height: f32,
    },
    Compound {
        children: Vec<CompoundChild>,
    },
    ConvexHull {
        points: Vec<Point3>,
    },
    /// Triangle soup: every 3 consecutive vertices form one triangle.
    TriangleMesh {
        vertices: Vec<Point3>,
        mode: MeshMode,
    },
    Triangle {
        vertices: [Point3; 3],
    },
    /// Row-major samples: `heights[y * size_x + x]`.
    Heightfield {
        size_x: usize,
        size_y: usize,
        heights: Vec<f32>,
    },
}

impl ShapeGeometry {
    pub fn new_box(half_extents: Vec3) -> PhysicsResult<Self> {
        ensure_positive("box half-extent x", half_extents.x)?;
        ensure_positive("box half-extent y", half_extents.y)?;
        ensure_positive("box half-extent z", half_extents.z)?;
        Ok(ShapeGeometry::Box { half_extents })
    }

    pub fn new_sphere(radius: f32) -> PhysicsResult<Self> {
        Ok(ShapeGeometry::Sphere {
            radius: ensure_positive("sphere radius", radius)?,
        })
    }

    pub fn new_capsule(radius: f32, height: f32) -> PhysicsResult<Self> {
        Ok(ShapeGeometry::Capsule {
            radius: ensure_positive("capsule radius", radius)?,
            height: ensure_positive("capsule height", height)?,
        })
    }

    pub fn new_cone(radius: f32, height: f32) -> PhysicsResult<Self> {
        Ok(ShapeGeometry::Cone {
            radius: ensure_positive("cone radius", radius)?,
            height: ensure_positive("cone height", height)?,
        })
    }

    pub fn new_cylinder(radius: f32, height: f32) -> PhysicsResult<Self> {
        Ok(ShapeGeometry::Cylinder {
            radius: ensure_positive("cylinder radius", radius)?,
            height: ensure_positive("cylinder height", height)?,
        })
    }

    pub fn new_compound(initial_capacity: usize) -> PhysicsResult<Self> {
        if initial_capacity == 0 {
            return Err(PhysicsError::ZeroCapacity);
        }
        Ok(ShapeGeometry::Compound {
            children: Vec::with_capacity(initial_capacity),
        })
    }

    pub fn new_convex_hull(points: Vec<Point3>) -> PhysicsResult<Self> {
        ensure_point_count("convex hull", points.len())?;
        Ok(ShapeGeometry::ConvexHull { points })
    }

    pub fn new_triangle_mesh(vertices: Vec<Point3>, mode: MeshMode) -> PhysicsResult<Self> {
        ensure_point_count("triangle mesh", vertices.len())?;
        Ok(ShapeGeometry::TriangleMesh { vertices, mode })
    }

    /// A missing `heights` buffer means a flat field at height 0.
    pub fn new_heightfield(
        size_x: usize,
        size_y: usize,
        heights: Option<Vec<f32>>,
    ) -> PhysicsResult<Self> {
        if size_x < MIN_HEIGHTFIELD_SAMPLES || size_y < MIN_HEIGHTFIELD_SAMPLES {
            return Err(PhysicsError::InvalidHeightfield {
                size_x,
                size_y,
                reason: "each axis needs at least 2 samples",
            });
        }
        let count = size_x
            .checked_mul(size_y)
            .ok_or(PhysicsError::InvalidHeightfield {
                size_x,
                size_y,
                reason: "sample count overflows",
            })?;
        let heights = match heights {
            Some(h) if h.len() != count => {
                return Err(PhysicsError::InvalidHeightfield {
                    size_x,
                    size_y,
                    reason: "sample buffer length does not match size",
                });
            }
            Some(h) if h.iter().any(|v| !v.is_finite()) => {
                return Err(PhysicsError::InvalidHeightfield {
                    size_x,
                    size_y,
                    reason: "sample buffer contains a non-finite height",
                });
            }
            Some(h) => h,
            None => vec![0.0; count],
        };
        Ok(ShapeGeometry::Heightfield {
            size_x,
            size_y,
            heights,
        })
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            ShapeGeometry::Box { .. } => ShapeKind::Box,
            ShapeGeometry::Sphere { .. } => ShapeKind::Sphere,
            ShapeGeometry::Capsule { .. } => ShapeKind::Capsule,
            ShapeGeometry::Cone { .. } => ShapeKind::Cone,
            ShapeGeometry::Cylinder { .. } => ShapeKind::Cylinder,
            ShapeGeometry::Compound { .. } => ShapeKind::Compound,
            ShapeGeometry::ConvexHull { .. } => ShapeKind::ConvexHull,
            ShapeGeometry::TriangleMesh {
                mode: MeshMode::Bvh,
                ..
            } => ShapeKind::TriangleMesh,
            ShapeGeometry::TriangleMesh {
                mode: MeshMode::Gimpact,
                ..
            } => ShapeKind::GimpactTriangleMesh,
            ShapeGeometry::Heightfield { .. } => ShapeKind::Heightfield,
            ShapeGeometry::Triangle { .. } => ShapeKind::Triangle,
        }
    }
}

fn ensure_point_count(what: &'static str, actual: usize) -> PhysicsResult<()> {
    if actual < MIN_SHAPE_POINTS {
        return Err(PhysicsError::NotEnoughPoints {
            what,
            required: MIN_SHAPE_POINTS,
            actual,
        });
    }
    Ok(())
}

/// Convert a flat `[x, y, z, x, y, z, ...]` list into points.
pub fn points_from_flat(coords: &[f32]) -> PhysicsResult<Vec<Point3>> {
    if coords.len() % 3 != 0 {
        return Err(PhysicsError::RaggedCoordinates(coords.len()));
    }
    Ok(coords
        .chunks_exact(3)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_dimensions_must_be_positive() {
        assert!(ShapeGeometry::new_sphere(0.0).is_err());
        assert!(ShapeGeometry::new_sphere(-1.0).is_err());
        assert!(ShapeGeometry::new_capsule(0.5, 0.0).is_err());
        assert!(ShapeGeometry::new_cone(0.0, 1.0).is_err());
        assert!(ShapeGeometry::new_cylinder(1.0, -2.0).is_err());
        assert!(ShapeGeometry::new_box(Vec3::new(1.0, 0.0, 1.0)).is_err());

        assert!(ShapeGeometry::new_sphere(0.25).is_ok());
        assert!(ShapeGeometry::new_box(Vec3::new(1.0, 2.0, 3.0)).is_ok());
    }

    #[test]
    fn compound_needs_capacity() {
        assert_eq!(
            ShapeGeometry::new_compound(0).err(),
            Some(PhysicsError::ZeroCapacity)
        );
        assert_eq!(
            ShapeGeometry::new_compound(4).map(|g| g.kind()).ok(),
            Some(ShapeKind::Compound)
        );
    }

    #[test]
    fn hulls_and_meshes_need_three_points() {
        let two = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        assert!(matches!(
            ShapeGeometry::new_convex_hull(two.clone()),
            Err(PhysicsError::NotEnoughPoints { actual: 2, .. })
        ));
        assert!(ShapeGeometry::new_triangle_mesh(two, MeshMode::Bvh).is_err());
    }

    #[test]
    fn heightfield_buffer_must_match_size() {
        assert!(ShapeGeometry::new_heightfield(1, 4, None).is_err());
        assert!(ShapeGeometry::new_heightfield(3, 3, Some(vec![0.0; 8])).is_err());
        assert!(ShapeGeometry::new_heightfield(2, 2, Some(vec![0.0, f32::NAN, 0.0, 0.0])).is_err());
        assert!(matches!(
            ShapeGeometry::new_heightfield(usize::MAX, 2, None),
            Err(PhysicsError::InvalidHeightfield { reason: "sample count overflows", .. })
        ));

        match ShapeGeometry::new_heightfield(3, 2, None) {
            Ok(ShapeGeometry::Heightfield { heights, .. }) => assert_eq!(heights, vec![0.0; 6]),
            _ => panic!("expected a flat heightfield"),
        }
    }

    #[test]
    fn flat_coordinates_must_be_triples() {
        assert_eq!(
            points_from_flat(&[0.0, 1.0]).err(),
            Some(PhysicsError::RaggedCoordinates(2))
        );
        let pts = points_from_flat(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap_or_default();
        assert_eq!(pts, vec![Point3::new(0.0, 1.0, 2.0), Point3::new(3.0, 4.0, 5.0)]);
    }

    #[test]
    fn composite_kinds() {
        assert!(ShapeKind::Heightfield.is_composite());
        assert!(ShapeKind::GimpactTriangleMesh.is_composite());
        assert!(!ShapeKind::Cone.is_composite());
    }
}
