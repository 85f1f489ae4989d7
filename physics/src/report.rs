//! Collision reports built from the engine's contact manifolds after a step.

use std::collections::HashMap;

use rapier3d::prelude::ContactPair;

use crate::dynamics::DynamicsWorld;
use crate::element::ElementRef;
use crate::types::Vec3;

/// One contact point, seen from the element the report is delivered to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contact {
    /// World-space point on this element.
    pub world_point: Vec3,
    /// Same point in this element's collider frame.
    pub local_point: Vec3,
    /// World-space contact normal, pointing from this element towards the counterpart.
    pub normal: Vec3,
    /// First friction direction, orthogonal to `normal`.
    pub lateral_friction_dir: Vec3,
    pub applied_impulse: f32,
    pub lateral_impulse: f32,
    /// Index of the contacting part of a compound or mesh on this element, `None` otherwise.
    pub part_index: Option<u32>,
    /// Signed separation; negative means penetration.
    pub distance: f32,
}

/// Contacts of one manifold between two elements.
#[derive(Clone, Debug, PartialEq)]
pub struct CollisionReport {
    pub counterpart: ElementRef,
    pub contacts: Vec<Contact>,
}

/// Build reports for every manifold with at least one point, one per side.
///
/// Pairs whose colliders do not resolve to an element (internal anchor bodies) are skipped.
pub fn build_collision_reports(dynamics: &DynamicsWorld) -> HashMap<ElementRef, Vec<CollisionReport>> {
    let mut out: HashMap<ElementRef, Vec<CollisionReport>> = HashMap::new();

    for pair in dynamics.narrow_phase.contact_pairs() {
        if !pair.has_any_active_contact {
            continue;
        }
        let (Some(a), Some(b)) = (
            dynamics.element_of(pair.collider1),
            dynamics.element_of(pair.collider2),
        ) else {
            continue;
        };

        for (side_a, side_b) in reports_for_pair(dynamics, pair) {
            out.entry(a).or_default().push(CollisionReport {
                counterpart: b,
                contacts: side_a,
            });
            out.entry(b).or_default().push(CollisionReport {
                counterpart: a,
                contacts: side_b,
            });
        }
    }

    out
}

/// For each non-empty manifold, the contact lists as seen from collider1 and collider2.
fn reports_for_pair(dynamics: &DynamicsWorld, pair: &ContactPair) -> Vec<(Vec<Contact>, Vec<Contact>)> {
    let (Some(c1), Some(c2)) = (
        dynamics.colliders.get(pair.collider1),
        dynamics.colliders.get(pair.collider2),
    ) else {
        return Vec::new();
    };
    let pos1 = c1.position();
    let pos2 = c2.position();

    let mut manifolds = Vec::with_capacity(pair.manifolds.len());
    for manifold in &pair.manifolds {
        if manifold.points.is_empty() {
            continue;
        }
        let normal = manifold.data.normal;
        let lateral = friction_direction(&normal);
        let part1 = manifold.subshape_pos1.map(|_| manifold.subshape1);
        let part2 = manifold.subshape_pos2.map(|_| manifold.subshape2);

        let mut side1 = Vec::with_capacity(manifold.points.len());
        let mut side2 = Vec::with_capacity(manifold.points.len());
        for point in &manifold.points {
            // Manifold points of compound parts are in the part's frame.
            let local1 = manifold.subshape_pos1.map_or(point.local_p1, |p| p * point.local_p1);
            let local2 = manifold.subshape_pos2.map_or(point.local_p2, |p| p * point.local_p2);
            let world1 = pos1 * local1;
            let world2 = pos2 * local2;
            let impulse = point.data.impulse;
            let lateral_impulse = point.data.tangent_impulse[0];

            side1.push(Contact {
                world_point: world1.coords,
                local_point: local1.coords,
                normal,
                lateral_friction_dir: lateral,
                applied_impulse: impulse,
                lateral_impulse,
                part_index: part1,
                distance: point.dist,
            });
            side2.push(Contact {
                world_point: world2.coords,
                local_point: local2.coords,
                normal: -normal,
                lateral_friction_dir: lateral,
                applied_impulse: impulse,
                lateral_impulse,
                part_index: part2,
                distance: point.dist,
            });
        }
        manifolds.push((side1, side2));
    }
    manifolds
}

/// A unit vector orthogonal to `normal`, stable for a given normal.
pub(crate) fn friction_direction(normal: &Vec3) -> Vec3 {
    let axis = if normal.x.abs() < 0.57 {
        Vec3::x()
    } else if normal.y.abs() < 0.57 {
        Vec3::y()
    } else {
        Vec3::z()
    };
    let t = normal.cross(&axis);
    let len = t.norm();
    if len > 0.0 { t / len } else { Vec3::zeros() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friction_direction_is_orthogonal_unit() {
        for n in [Vec3::z(), -Vec3::x(), Vec3::new(0.6, 0.8, 0.0)] {
            let t = friction_direction(&n);
            assert!((t.norm() - 1.0).abs() < 1.0e-5, "{n:?} -> {t:?}");
            assert!(t.dot(&n).abs() < 1.0e-5, "{n:?} -> {t:?}");
        }
    }

    #[test]
    fn empty_world_has_no_reports() {
        let dynamics = DynamicsWorld::new(Vec3::zeros());
        assert!(build_collision_reports(&dynamics).is_empty());
    }
}
