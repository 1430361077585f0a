//! Collision queries for actor movement.
//!
//! This module provides the world store and the side-effect-free queries the
//! movement code runs against it.
//!
//! # Key Types
//!
//! - [`CollisionWorld`]: Every collision object, keyed by [`ObjectHandle`]
//! - [`TraceResult`]: Output from a convex sweep
//! - [`ObjectTracer`]: Sweeps and contact tests on behalf of one object
//! - [`CollisionGroups`]: Category/mask filtering
//!
//! # Queries
//!
//! Sweeps move a convex shape along a segment and report:
//! - How far the shape traveled (fraction 0.0-1.0)
//! - Where its center ended up
//! - The surface normal and point at impact
//! - Which object was hit and its category
//!
//! A query that finds nothing returns an empty result, never an error.

pub mod convert;
mod flags;
mod trace;
mod tracer;
mod world;

pub use flags::{CollisionGroups, CollisionType};
pub use trace::{ContactPoint, RayHit, TraceResult, TraceShape};
pub use tracer::ObjectTracer;
pub use world::{CollisionError, CollisionObject, CollisionWorld, ObjectHandle, QueryFilter};
