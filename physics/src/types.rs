/*!
Math aliases and small value types shared by every element module.

This module intentionally contains no world logic. It defines the data types
exchanged between script-facing element handles and the engine wrapper:
- `Transform`: a position + rotation pair, convertible to an engine isometry.
- `CollisionFilter`: group/mask bits, convertible to engine interaction groups.
- `Color`: the debug color scripts may attach to static collisions.
*/

use nalgebra as na;
use rapier3d::prelude::{Group, InteractionGroups};

/// Common math aliases for clarity and consistency.
pub type Vec3 = na::Vector3<f32>;
pub type Quat = na::UnitQuaternion<f32>;
pub type Iso = na::Isometry3<f32>;
pub type Point3 = na::Point3<f32>;

/// A rigid transform (isometry) in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: Vec3::new(0.0, 0.0, 0.0),
        rotation: Quat::new_unchecked(na::Quaternion::new(1.0, 0.0, 0.0, 0.0)),
    };

    #[inline]
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            rotation: Quat::identity(),
        }
    }

    /// Build from a position and script-style Euler angles in degrees (X, Y, Z).
    #[inline]
    pub fn from_euler_degrees(translation: Vec3, rotation_deg: Vec3) -> Self {
        Self {
            translation,
            rotation: rotation_from_euler_degrees(rotation_deg),
        }
    }

    /// Convert to nalgebra `Isometry3` for use with the engine.
    #[inline]
    pub fn iso(&self) -> Iso {
        Iso::from_parts(
            na::Translation3::new(self.translation.x, self.translation.y, self.translation.z),
            self.rotation,
        )
    }

    #[inline]
    pub fn from_iso(iso: &Iso) -> Self {
        Self {
            translation: iso.translation.vector,
            rotation: iso.rotation,
        }
    }

    /// Linear interpolation of the translation, keeping `self.rotation`.
    #[inline]
    pub fn lerp_translation(&self, to: &Transform, t: f32) -> Vec3 {
        self.translation + (to.translation - self.translation) * t
    }
}

/// Script rotations are Euler angles in degrees applied X (roll), Y (pitch), Z (yaw).
pub fn rotation_from_euler_degrees(deg: Vec3) -> Quat {
    Quat::from_euler_angles(deg.x.to_radians(), deg.y.to_radians(), deg.z.to_radians())
}

/// Inverse of [`rotation_from_euler_degrees`].
pub fn euler_degrees_from_rotation(rotation: &Quat) -> Vec3 {
    let (roll, pitch, yaw) = rotation.euler_angles();
    Vec3::new(roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees())
}

/// Collision filtering bits.
///
/// Two objects interact when `a.group & b.mask != 0` and `b.group & a.mask != 0`,
/// the same convention queries use for their own group/mask pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollisionFilter {
    pub group: u32,
    pub mask: u32,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self::ALL
    }
}

impl CollisionFilter {
    pub const ALL: CollisionFilter = CollisionFilter {
        group: u32::MAX,
        mask: u32::MAX,
    };

    #[inline]
    pub fn new(group: u32, mask: u32) -> Self {
        Self { group, mask }
    }

    #[inline]
    pub fn groups(&self) -> InteractionGroups {
        InteractionGroups::all()
            .with_memberships(Group::from_bits_truncate(self.group))
            .with_filter(Group::from_bits_truncate(self.mask))
    }

    /// Whether an object carrying `other` passes this filter.
    #[inline]
    pub fn accepts(&self, other: &CollisionFilter) -> bool {
        (self.group & other.mask) != 0 && (other.group & self.mask) != 0
    }
}

/// RGBA debug color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    #[inline]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Axis-aligned world bounds, as returned by shape bounding-box queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_constant_matches_nalgebra_identity() {
        assert_eq!(Transform::IDENTITY.iso(), Iso::identity());
        assert_eq!(Transform::default(), Transform::IDENTITY);
    }

    #[test]
    fn euler_degrees_survive_conversion() {
        let deg = Vec3::new(10.0, -20.0, 45.0);
        let back = euler_degrees_from_rotation(&rotation_from_euler_degrees(deg));
        assert!((back - deg).norm() < 1.0e-3, "{back:?}");
    }

    #[test]
    fn filter_requires_both_directions() {
        let a = CollisionFilter::new(0b01, 0b10);
        let b = CollisionFilter::new(0b10, 0b01);
        let c = CollisionFilter::new(0b10, 0b10);

        assert!(a.accepts(&b));
        // c's mask does not include a's group.
        assert!(!a.accepts(&c));
        assert!(CollisionFilter::ALL.accepts(&a));
    }

    #[test]
    fn lerp_translation_hits_endpoints() {
        let from = Transform::from_translation(Vec3::new(0.0, 0.0, 0.0));
        let to = Transform::from_translation(Vec3::new(2.0, 4.0, -6.0));
        assert_eq!(from.lerp_translation(&to, 0.0), from.translation);
        assert_eq!(from.lerp_translation(&to, 1.0), to.translation);
        assert_eq!(from.lerp_translation(&to, 0.5), Vec3::new(1.0, 2.0, -3.0));
    }
}
