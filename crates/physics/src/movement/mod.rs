//! Kinematic actor movement.
//!
//! Actors are not rigid bodies. Each step the [`MovementSolver`] sweeps the
//! actor's collision box along its desired velocity, steps over short
//! obstacles, slides along walls, and snaps to the ground underneath:
//!
//! - [`ActorFrameData`] is the per-step snapshot the solver reads and writes
//! - [`MovementSolver::unstuck`] runs first and pushes embedded actors out
//! - [`MovementSolver::move_actor`] integrates one actor for one step
//! - [`MovementSolver::move_projectile`] sweeps a projectile until it hits something
//!
//! The solver only reads the collision world. Writing results back is the
//! caller's job, which lets many actors be solved in parallel against the
//! same world.

mod config;
mod frame;
mod slide;
mod solver;
mod stepper;
mod unstuck;

pub use config::{MovementConfig, UNITS_PER_METER};
pub use frame::{ActorFlags, ActorFrameData, ProjectileFrameData, ProjectileHit, WorldFrameData};
pub use slide::{clip_velocity, project, reject, Seam, SlideHistory};
pub use solver::{GroundPlacement, MovementSolver};
pub use stepper::Stepper;
pub use unstuck::UnstuckOutcome;
