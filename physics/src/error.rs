//! Error type returned by every fallible world operation.
//!
//! Only validation failures are errors. Absent resources (a model without collision data)
//! are `Ok(None)`, and reentrancy violations panic.

use thiserror::Error;

use crate::element::ElementId;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum PhysicsError {
    /// A dimension (radius, height, half-extent, mass scale) was zero, negative or NaN.
    #[error("{what} must be strictly positive, got {value}")]
    NonPositive { what: &'static str, value: f32 },

    /// A value that may be zero was negative or NaN.
    #[error("{what} must not be negative, got {value}")]
    Negative { what: &'static str, value: f32 },

    #[error("{what} must be finite, got {value}")]
    NotFinite { what: &'static str, value: f32 },

    #[error("{what} requires at least {required} points, got {actual}")]
    NotEnoughPoints {
        what: &'static str,
        required: usize,
        actual: usize,
    },

    /// A flat `[x, y, z, ...]` coordinate list had a length that is not a multiple of 3.
    #[error("coordinate list length {0} is not a multiple of 3")]
    RaggedCoordinates(usize),

    #[error("compound shape requires a positive initial child capacity")]
    ZeroCapacity,

    #[error("heightfield of {size_x}x{size_y} samples is invalid: {reason}")]
    InvalidHeightfield {
        size_x: usize,
        size_y: usize,
        reason: &'static str,
    },

    /// The engine could not build geometry from otherwise valid input (e.g. coplanar hull points).
    #[error("degenerate {0} geometry")]
    DegenerateGeometry(&'static str),

    #[error("shape {0} is composite and cannot be a compound child")]
    InvalidCompoundChild(ElementId),

    #[error("child index {index} out of range for compound with {count} children")]
    ChildIndexOutOfRange { index: usize, count: usize },

    #[error("heightfield sample {index} out of range ({count} samples)")]
    SampleIndexOutOfRange { index: usize, count: usize },

    #[error("shape {id} is not a {expected} shape")]
    WrongShapeKind { id: ElementId, expected: &'static str },

    #[error("a constraint cannot link rigid body {0} to itself")]
    SameBody(ElementId),

    #[error("element {0} belongs to a different physics world")]
    CrossWorld(ElementId),

    #[error("element {0} has already been destroyed")]
    Destroyed(ElementId),

    #[error("shape {id} is still used by {rigid_bodies} rigid bodies and {static_collisions} static collisions")]
    ShapeInUse {
        id: ElementId,
        rigid_bodies: usize,
        static_collisions: usize,
    },

    #[error("sub-step count must be at least 1")]
    ZeroSubSteps,
}

pub type PhysicsResult<T> = Result<T, PhysicsError>;

/// Reject zero, negative and NaN dimensions.
#[inline]
pub(crate) fn ensure_positive(what: &'static str, value: f32) -> PhysicsResult<f32> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(PhysicsError::NonPositive { what, value })
    }
}

/// Reject negative and NaN values; zero is allowed.
#[inline]
pub(crate) fn ensure_non_negative(what: &'static str, value: f32) -> PhysicsResult<f32> {
    if value >= 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(PhysicsError::Negative { what, value })
    }
}
