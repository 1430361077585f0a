//! Strider Physics
//!
//! Collision queries and kinematic movement for game actors and projectiles.
//!
//! # Architecture
//!
//! - **Collision**: an object store over parry3d shapes with category/mask
//!   filtering, ray casts, shape sweeps, and contact tests
//! - **Movement**: the per-actor solver that turns desired velocity into a
//!   collision-respecting position, plus unstuck recovery
//!
//! Nothing here owns threads. The `strider-simulation` crate runs the solver
//! over many actors at once.
//!
//! World space is Y-up; distances are game units (see
//! [`movement::UNITS_PER_METER`]).

pub mod collision;
pub mod movement;

pub use collision::{
    CollisionError, CollisionGroups, CollisionObject, CollisionType, CollisionWorld, ContactPoint, ObjectHandle,
    ObjectTracer, QueryFilter, RayHit, TraceResult, TraceShape,
};
pub use movement::{
    ActorFlags, ActorFrameData, GroundPlacement, MovementConfig, MovementSolver, ProjectileFrameData, ProjectileHit,
    UnstuckOutcome, WorldFrameData,
};
