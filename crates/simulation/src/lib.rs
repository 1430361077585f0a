//! Strider Simulation
//!
//! Drives [`strider_physics`] actors through fixed physics ticks on a pool of
//! worker threads:
//!
//! - Bodies (actors, objects, projectiles) shared with the collision world
//! - A barrier-synchronised task scheduler with deferred AABB updates
//! - Cached line-of-sight between actors
//! - A [`PhysicsSystem`] facade for the game loop
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │ game loop                                                      │
//! │   queue_movement ─► step_simulation ─► MovementTable (Arc)     │
//! │                          │                   ▲                 │
//! │                          ▼                   │ publish         │
//! │   ┌────────────────────────────────────────────────────────┐   │
//! │   │ TaskScheduler: workers × (pre-step │ solve │ commit)    │   │
//! │   │                SharedWorld (RwLock<CollisionWorld>)     │   │
//! │   └────────────────────────────────────────────────────────┘   │
//! └────────────────────────────────────────────────────────────────┘
//! ```

pub mod barrier;
pub mod body;
pub mod config;
pub mod error;
pub mod los;
pub mod scheduler;
pub mod simulation;
pub mod system;
pub mod world_lock;

pub use body::{Actor, ActorId, ActorState, Body, BodyId, HitCallback, Object, ObjectId, Projectile, ProjectileId};
pub use config::{LockingPolicy, SchedulerConfig};
pub use error::ConfigError;
pub use scheduler::TaskScheduler;
pub use simulation::{ActorOutput, FallEvent, MovementTable, ProjectileOutput};
pub use system::{calculate_step_config, PhysicsSystem};
pub use world_lock::SharedWorld;

// Re-export physics types for convenience
pub use strider_physics::{
    ActorFlags, CollisionGroups, CollisionObject, CollisionType, CollisionWorld, MovementConfig, TraceShape,
    WorldFrameData,
};
