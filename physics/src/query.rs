//! Spatial queries against the engine broad phase.
//!
//! Every function here runs with the world lock held by the caller and sees the broad phase as
//! the last pulse left it. Hits are resolved to elements through collider `user_data`.
//!
//! Segment queries go from `from` to `to`; `fraction` is the position of the hit along that
//! segment in `[0, 1]`.

use rapier3d::geometry::FeatureId;
use rapier3d::parry::bounding_volume::{Aabb, BoundingVolume};
use rapier3d::parry::query::ShapeCastOptions;
use rapier3d::prelude::{Collider, QueryFilter, Ray};

use crate::constants::DIST_EPS;
use crate::dynamics::DynamicsWorld;
use crate::element::{ElementId, ElementKind, ElementRef};
use crate::shape::EngineShape;
use crate::types::{CollisionFilter, Point3, Transform, Vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub element: ElementRef,
    pub position: Vec3,
    pub normal: Vec3,
    pub fraction: f32,
    pub distance: f32,
    /// Triangle index for mesh hits.
    pub part_index: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeHit {
    pub element: ElementRef,
    /// Position of the cast shape when it touches.
    pub position: Vec3,
    /// Contact point on the hit element, world space.
    pub contact_point: Vec3,
    /// Contact normal on the hit element, world space.
    pub normal: Vec3,
    pub fraction: f32,
}

/// Elements whose bounds overlap a box.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoxQueryResult {
    pub rigid_bodies: Vec<ElementId>,
    pub static_collisions: Vec<ElementId>,
}

/// Options shared by the segment queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayOptions {
    pub filter: CollisionFilter,
    /// Ignore hits on the back side of mesh triangles.
    pub filter_backfaces: bool,
}

impl Default for RayOptions {
    fn default() -> Self {
        Self {
            filter: CollisionFilter::ALL,
            filter_backfaces: false,
        }
    }
}

/// Closest hit along the segment.
pub fn ray_cast(dynamics: &DynamicsWorld, from: Vec3, to: Vec3, options: RayOptions) -> Option<RayHit> {
    let ray = segment_ray(from, to)?;
    if options.filter_backfaces {
        return ray_cast_all(dynamics, from, to, options).into_iter().next();
    }

    let groups = options.filter.groups();
    let query = dynamics.query_pipeline(QueryFilter::new().groups(groups));
    let (handle, hit) = query.cast_ray_and_get_normal(&ray, 1.0, true)?;
    let collider = dynamics.colliders.get(handle)?;
    let element = ElementRef::unpack(collider.user_data)?;
    Some(make_ray_hit(&ray, element, collider, hit.time_of_impact, hit.normal, hit.feature))
}

/// Every element hit along the segment, closest first. One hit per collider.
pub fn ray_cast_all(dynamics: &DynamicsWorld, from: Vec3, to: Vec3, options: RayOptions) -> Vec<RayHit> {
    let Some(ray) = segment_ray(from, to) else {
        return Vec::new();
    };
    let groups = options.filter.groups();
    let query = dynamics.query_pipeline(QueryFilter::new().groups(groups));

    let mut hits: Vec<RayHit> = query
        .intersect_ray(ray, 1.0, true)
        .filter(|(_, collider, hit)| !(options.filter_backfaces && is_backface(collider, hit.feature)))
        .filter_map(|(_, collider, hit)| {
            let element = ElementRef::unpack(collider.user_data)?;
            Some(make_ray_hit(&ray, element, collider, hit.time_of_impact, hit.normal, hit.feature))
        })
        .collect();
    hits.sort_by(|a, b| a.fraction.total_cmp(&b.fraction));
    hits
}

/// Whether anything blocks the segment.
pub fn line_cast(dynamics: &DynamicsWorld, from: Vec3, to: Vec3, options: RayOptions) -> bool {
    ray_cast(dynamics, from, to, options).is_some()
}

/// Sweep `shape` from `from` to `to` (translation only, `from`'s rotation is kept) and return the
/// first element it touches.
pub fn shape_cast(
    dynamics: &DynamicsWorld,
    shape: &EngineShape,
    from: &Transform,
    to: &Transform,
    filter: CollisionFilter,
) -> Option<ShapeHit> {
    let motion = to.translation - from.translation;
    let start = from.iso() * shape.local;
    let query = dynamics.query_pipeline(QueryFilter::new().groups(filter.groups()));

    let mut options = ShapeCastOptions::with_max_time_of_impact(1.0);
    options.stop_at_penetration = true;
    let (handle, hit) = query.cast_shape(&start, &motion, shape.shape.as_ref(), options)?;
    let element = dynamics.element_of(handle)?;

    let fraction = hit.time_of_impact;
    Some(ShapeHit {
        element,
        position: from.lerp_translation(to, fraction),
        contact_point: hit.witness1.coords,
        normal: hit.normal1.into_inner(),
        fraction,
    })
}

/// Elements whose collider bounds overlap `[min, max]`.
pub fn query_box(dynamics: &DynamicsWorld, min: Vec3, max: Vec3, filter: CollisionFilter) -> BoxQueryResult {
    let aabb = Aabb::new(
        Point3::from(min.inf(&max)),
        Point3::from(min.sup(&max)),
    );
    let query = dynamics.query_pipeline(QueryFilter::new().groups(filter.groups()));

    let mut result = BoxQueryResult::default();
    for (_, collider) in query.intersect_aabb_conservative(aabb) {
        if !collider.compute_aabb().intersects(&aabb) {
            continue;
        }
        let Some(element) = ElementRef::unpack(collider.user_data) else {
            continue;
        };
        let bucket = match element.kind {
            ElementKind::RigidBody => &mut result.rigid_bodies,
            ElementKind::StaticCollision => &mut result.static_collisions,
            ElementKind::Shape | ElementKind::Constraint => continue,
        };
        if !bucket.contains(&element.id) {
            bucket.push(element.id);
        }
    }
    result
}

/// Ray whose time of impact is the fraction along the segment. `None` for a zero-length segment.
fn segment_ray(from: Vec3, to: Vec3) -> Option<Ray> {
    let dir = to - from;
    if dir.norm_squared() <= DIST_EPS * DIST_EPS {
        return None;
    }
    Some(Ray::new(Point3::from(from), dir))
}

fn make_ray_hit(
    ray: &Ray,
    element: ElementRef,
    collider: &Collider,
    toi: f32,
    normal: Vec3,
    feature: FeatureId,
) -> RayHit {
    RayHit {
        element,
        position: ray.point_at(toi).coords,
        normal,
        fraction: toi,
        distance: toi * ray.dir.norm(),
        part_index: triangle_index(collider, feature),
    }
}

/// Mesh ray casts report back-face hits as face ids past the triangle count.
fn is_backface(collider: &Collider, feature: FeatureId) -> bool {
    match (collider.shape().as_trimesh(), feature) {
        (Some(mesh), FeatureId::Face(face)) => face >= mesh.num_triangles() as u32,
        _ => false,
    }
}

fn triangle_index(collider: &Collider, feature: FeatureId) -> Option<u32> {
    match (collider.shape().as_trimesh(), feature) {
        (Some(mesh), FeatureId::Face(face)) => Some(face % (mesh.num_triangles() as u32).max(1)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::prelude::{ColliderBuilder, RigidBodyBuilder};

    fn world_with_ground() -> (DynamicsWorld, ElementRef) {
        let mut dynamics = DynamicsWorld::new(Vec3::zeros());
        let ground = ElementRef::new(ElementKind::StaticCollision, ElementId::next());
        let body = dynamics.insert_body(RigidBodyBuilder::fixed().build());
        dynamics.attach_collider(
            ColliderBuilder::cuboid(10.0, 10.0, 0.5)
                .user_data(ground.pack())
                .build(),
            body,
        );
        // The broad phase only sees colliders after a step.
        dynamics.step(1.0 / 60.0, 1);
        (dynamics, ground)
    }

    #[test]
    fn ray_down_hits_top_face() {
        let (dynamics, ground) = world_with_ground();
        let hit = ray_cast(
            &dynamics,
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::new(0.0, 0.0, -10.0),
            RayOptions::default(),
        );
        let Some(hit) = hit else {
            panic!("expected a hit");
        };
        assert_eq!(hit.element, ground);
        assert!((hit.position.z - 0.5).abs() < 1.0e-4, "{hit:?}");
        assert!((hit.normal.z - 1.0).abs() < 1.0e-4);
        assert!((hit.distance - 9.5).abs() < 1.0e-3);
        assert!(line_cast(
            &dynamics,
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::new(0.0, 0.0, -10.0),
            RayOptions::default()
        ));
    }

    #[test]
    fn filtered_and_degenerate_rays_miss() {
        let mut dynamics = DynamicsWorld::new(Vec3::zeros());
        let ground = ElementRef::new(ElementKind::StaticCollision, ElementId::next());
        let body = dynamics.insert_body(RigidBodyBuilder::fixed().build());
        dynamics.attach_collider(
            ColliderBuilder::cuboid(10.0, 10.0, 0.5)
                .collision_groups(CollisionFilter::new(0b01, u32::MAX).groups())
                .user_data(ground.pack())
                .build(),
            body,
        );
        dynamics.step(1.0 / 60.0, 1);

        let from = Vec3::new(0.0, 0.0, 10.0);
        let to = Vec3::new(0.0, 0.0, -10.0);
        let other_group = RayOptions {
            filter: CollisionFilter::new(0b10, 0b10),
            filter_backfaces: false,
        };
        assert!(ray_cast(&dynamics, from, to, other_group).is_none());
        assert!(ray_cast(&dynamics, from, to, RayOptions::default()).is_some());

        assert!(ray_cast(&dynamics, from, from, RayOptions::default()).is_none());
        assert!(ray_cast_all(&dynamics, from, Vec3::new(0.0, 0.0, 5.0), RayOptions::default()).is_empty());
    }

    #[test]
    fn box_query_sorts_by_kind() {
        let (dynamics, ground) = world_with_ground();
        let result = query_box(
            &dynamics,
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-1.0, -1.0, -1.0),
            CollisionFilter::ALL,
        );
        assert_eq!(result.static_collisions, vec![ground.id]);
        assert!(result.rigid_bodies.is_empty());

        let far = query_box(
            &dynamics,
            Vec3::new(50.0, 50.0, 50.0),
            Vec3::new(60.0, 60.0, 60.0),
            CollisionFilter::ALL,
        );
        assert_eq!(far, BoxQueryResult::default());
    }

    #[test]
    fn sphere_cast_stops_on_ground() {
        let (dynamics, ground) = world_with_ground();
        let sphere = EngineShape {
            shape: rapier3d::prelude::SharedShape::ball(0.5),
            local: crate::types::Iso::identity(),
        };
        let from = Transform::from_translation(Vec3::new(0.0, 0.0, 5.0));
        let to = Transform::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let Some(hit) = shape_cast(&dynamics, &sphere, &from, &to, CollisionFilter::ALL) else {
            panic!("expected a hit");
        };
        assert_eq!(hit.element, ground);
        // Sphere center stops one radius above the top face.
        assert!((hit.position.z - 1.0).abs() < 1.0e-3, "{hit:?}");
    }
}
