pub mod constants;
pub mod constraint;
pub mod driver;
pub mod dynamics;
pub mod element;
pub mod error;
pub mod events;
pub mod model;
pub mod query;
pub mod queue;
pub mod report;
pub mod rigid_body;
pub mod settings;
pub mod shape;
pub mod static_collision;
pub mod types;
pub mod world;

pub use constants::{
    DEFAULT_GRAVITY, DEFAULT_PULSE_INTERVAL, DEFAULT_SIMULATION_SPEED, DEFAULT_SUB_STEPS,
    DEFAULT_WORLD_SIZE, MAX_PULSE_ELAPSED,
};
pub use constraint::{Constraint, ConstraintKind};
pub use driver::PulseDriver;
pub use element::{Element, ElementId, ElementKind, ElementRef, WorldId};
pub use error::{PhysicsError, PhysicsResult};
pub use events::{EventSink, NoEvents, PhysicsEvent};
pub use model::{CollisionDataSource, ModelBox, ModelCollisionData, ModelPlacement, ModelSphere};
pub use query::{BoxQueryResult, RayHit, RayOptions, ShapeHit};
pub use report::{CollisionReport, Contact};
pub use rigid_body::RigidBody;
pub use settings::{PulseStats, WorldSettings};
pub use shape::{MeshMode, Shape, ShapeKind};
pub use static_collision::StaticCollision;
pub use types::{Bounds, CollisionFilter, Color, Point3, Quat, Transform, Vec3};
pub use world::PhysicsWorld;
