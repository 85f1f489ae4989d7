//! Events a world raises towards its host.

use crate::element::ElementId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhysicsEvent {
    /// An awake body left the world bounds. Destroyed unless the sink vetoes.
    RigidBodyFellOutsideWorld { body: ElementId },
    /// A constraint exceeded its breaking impulse.
    ConstraintBroke { constraint: ElementId },
}

impl PhysicsEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PhysicsEvent::RigidBodyFellOutsideWorld { .. } => "onPhysicsRigidBodyFallOutsideWorld",
            PhysicsEvent::ConstraintBroke { .. } => "onPhysicsConstraintBreak",
        }
    }
}

/// Receiver of world events. Called from the pulse thread with no world lock held.
pub trait EventSink: Send + Sync {
    /// Returning `false` cancels the default action of the event, if it has one.
    fn call_event(&self, event: &PhysicsEvent) -> bool;
}

/// Sink that accepts everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoEvents;

impl EventSink for NoEvents {
    fn call_event(&self, _event: &PhysicsEvent) -> bool {
        true
    }
}
