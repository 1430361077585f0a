//! Per-tick simulation records and the published movement table.
//!
//! A [`Simulation`] pairs a weak reference to a live body with the frame data
//! the solver works on. Every access upgrades the reference first and skips
//! bodies that have been destroyed in the meantime.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use strider_physics::{ActorFrameData, MovementSolver, ProjectileFrameData, ProjectileHit, WorldFrameData};

use crate::body::{Actor, ActorId, ActorState, Body, BodyId, Projectile, ProjectileId};
use crate::world_lock::SharedWorld;

/// Fall tracking result for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FallEvent {
    /// Touched ground (or water, or started flying) after falling this far.
    Landed { height: f32 },
    /// Still falling; total height so far.
    Falling { height: f32 },
}

/// What one actor did this tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActorOutput {
    pub actor: ActorId,
    /// Interpolated feet position for rendering.
    pub position: Vec3,
    pub on_ground: bool,
    pub on_slope: bool,
    pub walking_on_water: bool,
    pub standing_on: Option<BodyId>,
    pub fall: Option<FallEvent>,
}

impl ActorOutput {
    fn from_state(actor: ActorId, state: &ActorState, fall: Option<FallEvent>) -> Self {
        Self {
            actor,
            position: state.simulation_position,
            on_ground: state.on_ground,
            on_slope: state.on_slope,
            walking_on_water: state.walking_on_water,
            standing_on: state.standing_on,
            fall,
        }
    }
}

/// What one projectile did this tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectileOutput {
    pub projectile: ProjectileId,
    /// Interpolated position for rendering.
    pub position: Vec3,
    /// Set on the tick the projectile hit something.
    pub hit: Option<ProjectileHit>,
}

/// Results of one tick, published as a whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovementTable {
    /// Increments with every published tick. Zero is the empty startup table.
    pub generation: u64,
    pub actors: BTreeMap<ActorId, ActorOutput>,
    pub projectiles: BTreeMap<ProjectileId, ProjectileOutput>,
}

impl MovementTable {
    pub(crate) fn collect<'a>(generation: u64, simulations: impl IntoIterator<Item = &'a Simulation>) -> Self {
        let mut table = Self {
            generation,
            ..Self::default()
        };
        for simulation in simulations {
            match simulation {
                Simulation::Actor(sim) => {
                    if let Some(output) = sim.output {
                        table.actors.insert(output.actor, output);
                    }
                }
                Simulation::Projectile(sim) => {
                    if let Some(output) = sim.output {
                        table.projectiles.insert(output.projectile, output);
                    }
                }
            }
        }
        table
    }

    pub fn actor(&self, id: ActorId) -> Option<&ActorOutput> {
        self.actors.get(&id)
    }

    pub fn projectile(&self, id: ProjectileId) -> Option<&ProjectileOutput> {
        self.projectiles.get(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty() && self.projectiles.is_empty()
    }
}

/// Timing shared by every record during the end-of-tick bookkeeping.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SyncContext {
    /// Whether at least one step ran.
    pub advance: bool,
    pub time_accumulator: f32,
    pub physics_dt: f32,
}

impl SyncContext {
    fn interpolation_factor(&self) -> f32 {
        if self.physics_dt <= 0.0 {
            return 1.0;
        }
        (self.time_accumulator / self.physics_dt).clamp(0.0, 1.0)
    }
}

fn interpolate(current: Vec3, previous: Vec3, factor: f32) -> Vec3 {
    current * factor + previous * (1.0 - factor)
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug)]
pub struct ActorSimulation {
    actor: Weak<Actor>,
    frame: ActorFrameData,
    /// The solver panicked on this actor; it sits out the rest of the tick.
    failed: bool,
    /// Teleport generation at capture.
    generation: u64,
    output: Option<ActorOutput>,
}

impl ActorSimulation {
    /// Snapshot a live actor for the coming tick.
    ///
    /// `water_level` is the water surface height, if the actor's cell has one.
    pub fn capture(actor: &Arc<Actor>, movement: Vec3, water_level: Option<f32>, swim_height_scale: f32) -> Self {
        let state = actor.state();
        let mut frame = ActorFrameData::new(actor.collision_object(), state.position, actor.half_extents());
        frame.rotation = state.rotation;
        frame.movement = movement;
        frame.flags = state.flags;
        frame.inertia = state.inertia;
        frame.slow_fall = state.slow_fall;
        frame.on_ground = state.on_ground;
        frame.on_slope = state.on_slope;
        frame.was_on_ground = state.on_ground;
        frame.stuck_frames = state.stuck_frames;
        frame.last_stuck_position = state.last_stuck_position;
        frame.old_height = state.position.y;
        let generation = state.teleport_generation;
        if let Some(water_level) = water_level {
            frame.set_water_level(water_level, actor.rendering_half_height(), swim_height_scale);
        }
        drop(state);

        Self {
            actor: Arc::downgrade(actor),
            frame,
            failed: false,
            generation,
            output: None,
        }
    }

    #[inline]
    pub fn frame(&self) -> &ActorFrameData {
        &self.frame
    }

    fn finalize(&mut self, sync: &SyncContext, world: &SharedWorld) {
        if self.failed {
            return;
        }
        let Some(actor) = self.actor.upgrade() else {
            return;
        };
        let frame = &self.frame;

        let standing_on = match frame.standing_on {
            Some(handle) if sync.advance => BodyId::of_object(&world.read(), handle),
            _ => None,
        };

        let mut state = actor.state();
        if state.teleport_generation != self.generation {
            // Teleported mid-tick: report where it is now, keep nothing solved
            self.output = Some(ActorOutput::from_state(actor.id(), &state, None));
            return;
        }
        let underwater = frame.position.y < frame.swim_level;
        let height_diff = frame.position.y - frame.old_height;
        let still_on_ground = sync.advance && frame.was_on_ground && frame.on_ground;

        let fall = if still_on_ground || frame.flags.flying() || underwater || frame.slow_fall < 1.0 {
            let height = std::mem::take(&mut state.fall_height);
            (height > 0.0).then_some(FallEvent::Landed { height })
        } else if height_diff < 0.0 {
            state.fall_height -= height_diff;
            Some(FallEvent::Falling {
                height: state.fall_height,
            })
        } else {
            None
        };

        state.simulation_position = interpolate(state.position, state.previous_position, sync.interpolation_factor());
        state.stuck_frames = frame.stuck_frames;
        state.last_stuck_position = frame.last_stuck_position;
        if sync.advance {
            state.standing_on = standing_on;
            // Keep an on-ground change made by a teleport during the tick
            if state.on_ground == frame.was_on_ground {
                state.on_ground = frame.on_ground;
            }
            state.on_slope = frame.on_slope;
            state.walking_on_water = frame.walking_on_water;
            state.inertia = frame.inertia;
        }

        self.output = Some(ActorOutput::from_state(actor.id(), &state, fall));
    }
}

#[derive(Debug)]
pub struct ProjectileSimulation {
    projectile: Weak<Projectile>,
    frame: ProjectileFrameData,
    output: Option<ProjectileOutput>,
}

impl ProjectileSimulation {
    pub fn capture(projectile: &Arc<Projectile>) -> Self {
        let state = projectile.state();
        let mut frame = ProjectileFrameData::new(projectile.collision_object(), state.position, state.velocity);
        frame.caster = projectile.caster();
        frame.active = state.active;
        drop(state);

        Self {
            projectile: Arc::downgrade(projectile),
            frame,
            output: None,
        }
    }

    #[inline]
    pub fn frame(&self) -> &ProjectileFrameData {
        &self.frame
    }

    fn finalize(&mut self, sync: &SyncContext) {
        let Some(projectile) = self.projectile.upgrade() else {
            return;
        };
        let mut state = projectile.state();
        state.simulation_position = interpolate(state.position, state.previous_position, sync.interpolation_factor());
        self.output = Some(ProjectileOutput {
            projectile: projectile.id(),
            position: state.simulation_position,
            hit: self.frame.hit,
        });
    }
}

/// One unit of work in a tick.
#[derive(Debug)]
pub enum Simulation {
    Actor(ActorSimulation),
    Projectile(ProjectileSimulation),
}

impl From<ActorSimulation> for Simulation {
    fn from(sim: ActorSimulation) -> Self {
        Self::Actor(sim)
    }
}

impl From<ProjectileSimulation> for Simulation {
    fn from(sim: ProjectileSimulation) -> Self {
        Self::Projectile(sim)
    }
}

impl Simulation {
    /// Unstuck recovery, run once per step before the solve.
    pub(crate) fn pre_step(&mut self, solver: &MovementSolver, world: &SharedWorld) {
        let Self::Actor(sim) = self else {
            return;
        };
        if sim.failed {
            return;
        }
        let Some(actor) = sim.actor.upgrade() else {
            return;
        };
        {
            let world = world.read();
            solver.unstuck(&mut sim.frame, &world);
        }
        drop(actor);
    }

    /// Solve one step. A panicking solve is logged and the record is left out
    /// of the rest of the tick.
    pub(crate) fn step(
        &mut self,
        solver: &MovementSolver,
        physics_dt: f32,
        world_frame: &WorldFrameData,
        world: &SharedWorld,
    ) {
        match self {
            Self::Actor(sim) => {
                if sim.failed {
                    return;
                }
                let Some(actor) = sim.actor.upgrade() else {
                    return;
                };
                let solved = {
                    let world = world.read();
                    catch_unwind(AssertUnwindSafe(|| {
                        solver.move_actor(&mut sim.frame, physics_dt, &world, world_frame)
                    }))
                };
                if solved.is_err() {
                    log::error!("movement solve for {:?} panicked, skipping it this tick", actor.id());
                    sim.failed = true;
                }
                drop(actor);
            }
            Self::Projectile(sim) => {
                if !sim.frame.active {
                    return;
                }
                let Some(projectile) = sim.projectile.upgrade() else {
                    return;
                };
                let solved = {
                    let world = world.read();
                    catch_unwind(AssertUnwindSafe(|| solver.move_projectile(&mut sim.frame, physics_dt, &world)))
                };
                if solved.is_err() {
                    log::error!("projectile solve for {:?} panicked, deactivating it", projectile.id());
                    sim.frame.active = false;
                }
                drop(projectile);
            }
        }
    }

    /// Record the step's result on the body.
    ///
    /// Returns the body when its collision object has to follow. The caller
    /// commits it under the world write lock and drops it afterwards.
    pub(crate) fn commit(&self) -> Option<Arc<dyn Body>> {
        match self {
            Self::Actor(sim) => {
                if sim.failed {
                    return None;
                }
                let actor = sim.actor.upgrade()?;
                if actor.apply_step(sim.frame.position, sim.generation) {
                    Some(actor)
                } else {
                    None
                }
            }
            Self::Projectile(sim) => {
                let projectile = sim.projectile.upgrade()?;
                projectile.set_position(sim.frame.position, sim.frame.hit);
                Some(projectile)
            }
        }
    }

    /// End-of-tick bookkeeping: fall tracking, interpolation and the output
    /// row for the movement table.
    pub(crate) fn finalize(&mut self, sync: &SyncContext, world: &SharedWorld) {
        match self {
            Self::Actor(sim) => sim.finalize(sync, world),
            Self::Projectile(sim) => sim.finalize(sync),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockingPolicy;
    use strider_physics::{CollisionGroups, CollisionWorld, MovementConfig};

    const HALF: Vec3 = Vec3::new(29.0, 64.0, 29.0);

    fn floor_world() -> Arc<SharedWorld> {
        let mut world = CollisionWorld::new();
        world.add_box(Vec3::new(0.0, -50.0, 0.0), Vec3::new(5000.0, 50.0, 5000.0), CollisionGroups::WORLD);
        Arc::new(SharedWorld::new(world, LockingPolicy::AllowSharedLocks))
    }

    fn sync(advance: bool) -> SyncContext {
        SyncContext {
            advance,
            time_accumulator: 0.0,
            physics_dt: 1.0 / 60.0,
        }
    }

    #[test]
    fn test_capture_copies_actor_state() {
        let world = floor_world();
        let actor = Actor::spawn(ActorId(1), &world, Vec3::new(0.0, 1.0, 0.0), HALF, HALF.y);
        actor.state().inertia = Vec3::new(0.0, -10.0, 0.0);
        actor.state().stuck_frames = 3;

        let sim = ActorSimulation::capture(&actor, Vec3::X, Some(100.0), 0.9);
        assert_eq!(sim.frame().movement, Vec3::X);
        assert_eq!(sim.frame().inertia.y, -10.0);
        assert_eq!(sim.frame().stuck_frames, 3);
        assert_eq!(sim.frame().water_level, 100.0);
        assert!(sim.frame().swim_level < 100.0);
    }

    #[test]
    fn test_falling_then_landing() {
        let world = floor_world();
        let actor = Actor::spawn(ActorId(1), &world, Vec3::new(0.0, 100.0, 0.0), HALF, HALF.y);
        actor.state().on_ground = false;

        let mut sim = ActorSimulation::capture(&actor, Vec3::ZERO, None, 0.9);
        sim.frame.position.y = 60.0;
        sim.frame.on_ground = false;
        sim.finalize(&sync(true), &world);
        assert_eq!(sim.output.unwrap().fall, Some(FallEvent::Falling { height: 40.0 }));

        actor.set_position(Vec3::new(0.0, 60.0, 0.0));
        let mut sim = ActorSimulation::capture(&actor, Vec3::ZERO, None, 0.9);
        sim.frame.position.y = 1.0;
        sim.frame.on_ground = true;
        sim.finalize(&sync(true), &world);
        // Landing is reported on the tick after the fall, once grounded twice
        assert_eq!(sim.output.unwrap().fall, Some(FallEvent::Falling { height: 99.0 }));

        actor.set_position(Vec3::new(0.0, 1.0, 0.0));
        let mut sim = ActorSimulation::capture(&actor, Vec3::ZERO, None, 0.9);
        sim.finalize(&sync(true), &world);
        assert_eq!(sim.output.unwrap().fall, Some(FallEvent::Landed { height: 99.0 }));
        assert_eq!(actor.state().fall_height, 0.0);
    }

    #[test]
    fn test_teleport_during_tick_wins() {
        let world = floor_world();
        let actor = Actor::spawn(ActorId(1), &world, Vec3::new(0.0, 1.0, 0.0), HALF, HALF.y);
        let mut sim = Simulation::from(ActorSimulation::capture(&actor, Vec3::X * 100.0, None, 0.9));

        let solver = MovementSolver::new(MovementConfig::default());
        sim.step(&solver, 1.0 / 60.0, &WorldFrameData::calm(), &world);
        let target = Vec3::new(2000.0, 1.0, 2000.0);
        actor.teleport(target);

        assert!(sim.commit().is_none());
        sim.finalize(&sync(true), &world);
        assert_eq!(actor.position(), target);

        let table = MovementTable::collect(1, [&sim]);
        assert_eq!(table.actors[&ActorId(1)].position, target);
        assert_eq!(table.actors[&ActorId(1)].fall, None);
    }

    #[test]
    fn test_dead_actor_is_skipped() {
        let world = floor_world();
        let actor = Actor::spawn(ActorId(1), &world, Vec3::new(0.0, 1.0, 0.0), HALF, HALF.y);
        let mut sim = Simulation::from(ActorSimulation::capture(&actor, Vec3::X * 100.0, None, 0.9));
        drop(actor);

        let solver = MovementSolver::new(MovementConfig::default());
        sim.pre_step(&solver, &world);
        sim.step(&solver, 1.0 / 60.0, &WorldFrameData::calm(), &world);
        assert!(sim.commit().is_none());
        sim.finalize(&sync(true), &world);

        let table = MovementTable::collect(1, [&sim]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_interpolation_factor_is_clamped() {
        let half_step = SyncContext {
            advance: true,
            time_accumulator: 0.5,
            physics_dt: 1.0,
        };
        assert_eq!(half_step.interpolation_factor(), 0.5);

        let overshoot = SyncContext {
            time_accumulator: 3.0,
            ..half_step
        };
        assert_eq!(overshoot.interpolation_factor(), 1.0);
        assert_eq!(interpolate(Vec3::X, Vec3::ZERO, 0.25), Vec3::new(0.25, 0.0, 0.0));
    }
}
