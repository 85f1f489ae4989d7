//! Element identity: ids, kinds and the closed `Element` variant.
//!
//! Every script-visible object (shape, rigid body, static collision, constraint) gets a
//! process-unique [`ElementId`]. Registries are keyed by it, mutation stacks store it, and the
//! engine carries it in collider `user_data` as a packed [`ElementRef`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::constraint::Constraint;
use crate::rigid_body::RigidBody;
use crate::shape::Shape;
use crate::static_collision::StaticCollision;

static NEXT_ELEMENT_ID: AtomicU32 = AtomicU32::new(1);
static NEXT_WORLD_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique identifier of a world element. Never reused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u32);

impl ElementId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a [`crate::PhysicsWorld`], used to reject cross-world constraints.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorldId(u32);

impl WorldId {
    pub(crate) fn next() -> Self {
        Self(NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "world-{}", self.0)
    }
}

/// Discriminator for the kind of element referenced by an [`ElementRef`].
///
/// The numeric values are part of the packed `user_data` layout. Do not reorder.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Shape = 1,
    RigidBody = 2,
    StaticCollision = 3,
    Constraint = 4,
}

impl ElementKind {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Shape),
            2 => Some(Self::RigidBody),
            3 => Some(Self::StaticCollision),
            4 => Some(Self::Constraint),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Shape => "shape",
            Self::RigidBody => "rigid-body",
            Self::StaticCollision => "static-collision",
            Self::Constraint => "constraint",
        }
    }
}

/// Non-owning reference to an element, resolved through the world registries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ElementRef {
    pub kind: ElementKind,
    pub id: ElementId,
}

impl ElementRef {
    #[inline]
    pub fn new(kind: ElementKind, id: ElementId) -> Self {
        Self { kind, id }
    }

    /// Pack into engine `user_data`.
    ///
    /// Bit layout (least-significant bit = bit 0):
    /// - bits 0..=31  : element id
    /// - bits 32..=39 : [`ElementKind`] tag
    /// - bits 40..=127: zero
    #[inline]
    pub fn pack(self) -> u128 {
        (self.id.0 as u128) | ((self.kind as u128) << u32::BITS)
    }

    /// Inverse of [`ElementRef::pack`]. Returns `None` for data not written by `pack`
    /// (engine objects with default `user_data` = 0, such as internal anchor bodies).
    #[inline]
    pub fn unpack(data: u128) -> Option<Self> {
        if data >> 40 != 0 {
            return None;
        }
        let kind = ElementKind::from_tag((data >> u32::BITS) as u8)?;
        Some(Self {
            kind,
            id: ElementId(data as u32),
        })
    }
}

/// A resolved world element.
#[derive(Clone)]
pub enum Element {
    Shape(Arc<Shape>),
    RigidBody(Arc<RigidBody>),
    StaticCollision(Arc<StaticCollision>),
    Constraint(Arc<Constraint>),
}

impl Element {
    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Shape(_) => ElementKind::Shape,
            Element::RigidBody(_) => ElementKind::RigidBody,
            Element::StaticCollision(_) => ElementKind::StaticCollision,
            Element::Constraint(_) => ElementKind::Constraint,
        }
    }

    pub fn id(&self) -> ElementId {
        match self {
            Element::Shape(s) => s.id(),
            Element::RigidBody(b) => b.id(),
            Element::StaticCollision(s) => s.id(),
            Element::Constraint(c) => c.id(),
        }
    }

    pub fn element_ref(&self) -> ElementRef {
        ElementRef::new(self.kind(), self.id())
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind().name(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = ElementId::next();
        let b = ElementId::next();
        assert!(b > a);
        assert_ne!(WorldId::next(), WorldId::next());
    }

    #[test]
    fn pack_and_unpack_each_kind() {
        let id = ElementId(0xDEAD_BEEF);
        for kind in [
            ElementKind::Shape,
            ElementKind::RigidBody,
            ElementKind::StaticCollision,
            ElementKind::Constraint,
        ] {
            let r = ElementRef::new(kind, id);
            assert_eq!(ElementRef::unpack(r.pack()), Some(r));
        }
    }

    #[test]
    fn unpack_rejects_foreign_user_data() {
        assert_eq!(ElementRef::unpack(0), None);
        assert_eq!(ElementRef::unpack(7 << 32), None);
        assert_eq!(ElementRef::unpack(1u128 << 100), None);
    }

    #[test]
    fn display_is_short() {
        assert_eq!(ElementId(12).to_string(), "#12");
    }
}
