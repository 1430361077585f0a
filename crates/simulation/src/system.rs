//! High-level physics facade.
//!
//! [`PhysicsSystem`] owns the bodies and the scheduler. Game code queues
//! movement for actors, calls [`PhysicsSystem::step_simulation`] once per
//! rendered frame, and reads positions back from the returned table.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{Quat, Vec3};
use strider_physics::{
    ActorFlags, CollisionGroups, CollisionObject, CollisionType, CollisionWorld, GroundPlacement, MovementConfig,
    MovementSolver, ObjectHandle, QueryFilter, RayHit, TraceResult, TraceShape, WorldFrameData,
};

use crate::body::{Actor, ActorId, Body, BodyId, HitCallback, Object, ObjectId, Projectile, ProjectileId};
use crate::config::SchedulerConfig;
use crate::error::ConfigError;
use crate::scheduler::TaskScheduler;
use crate::simulation::{ActorSimulation, MovementTable, ProjectileSimulation, Simulation};
use crate::world_lock::SharedWorld;

/// Split accumulated frame time into whole physics steps.
///
/// Returns the step count and the time left over. When more than `max_steps`
/// are due the excess is dropped rather than carried, so a slow frame cannot
/// snowball into ever longer catch-up frames.
pub fn calculate_step_config(time_accumulator: f32, physics_dt: f32, max_steps: u32) -> (u32, f32) {
    if physics_dt <= 0.0 || time_accumulator <= 0.0 {
        return (0, time_accumulator.max(0.0));
    }
    let due = (time_accumulator / physics_dt).floor();
    if due > max_steps as f32 {
        log::debug!("{due} physics steps due, running {max_steps}");
        let remaining = (time_accumulator - max_steps as f32 * physics_dt).min(physics_dt * 0.999);
        return (max_steps, remaining);
    }
    let steps = due as u32;
    (steps, time_accumulator - steps as f32 * physics_dt)
}

/// Bodies, scheduler and per-frame inputs.
pub struct PhysicsSystem {
    config: SchedulerConfig,
    scheduler: TaskScheduler,
    actors: BTreeMap<ActorId, Arc<Actor>>,
    objects: BTreeMap<ObjectId, Arc<Object>>,
    projectiles: BTreeMap<ProjectileId, Arc<Projectile>>,
    queued_movement: BTreeMap<ActorId, Vec3>,
    next_projectile: u32,
    water_level: Option<f32>,
    world_frame: WorldFrameData,
    time_accumulator: f32,
    /// Newest table whose projectile hits have been dispatched.
    handled_generation: u64,
}

impl PhysicsSystem {
    pub fn new(config: SchedulerConfig, movement: MovementConfig, world: CollisionWorld) -> Result<Self, ConfigError> {
        config.validate()?;
        let world = Arc::new(SharedWorld::new(world, config.locking_policy));
        let scheduler = TaskScheduler::new(&config, MovementSolver::new(movement), world);
        Ok(Self {
            config,
            scheduler,
            actors: BTreeMap::new(),
            objects: BTreeMap::new(),
            projectiles: BTreeMap::new(),
            queued_movement: BTreeMap::new(),
            next_projectile: 0,
            water_level: None,
            world_frame: WorldFrameData::calm(),
            time_accumulator: 0.0,
            handled_generation: 0,
        })
    }

    #[inline]
    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // ========================================================================
    // Bodies
    // ========================================================================

    /// Add an actor with its feet at `position`. Replaces any actor with the
    /// same id.
    pub fn add_actor(
        &mut self,
        id: ActorId,
        position: Vec3,
        half_extents: Vec3,
        rendering_half_height: f32,
    ) -> Arc<Actor> {
        let actor = Actor::spawn(id, self.scheduler.world(), position, half_extents, rendering_half_height);
        self.actors.insert(id, actor.clone());
        actor
    }

    pub fn add_object(&mut self, id: ObjectId, object: CollisionObject) -> Arc<Object> {
        let object = Object::spawn(id, self.scheduler.world(), object);
        self.objects.insert(id, object.clone());
        object
    }

    /// Launch a ball-shaped projectile. The caster is never hit by it.
    pub fn add_projectile(
        &mut self,
        caster: Option<ActorId>,
        position: Vec3,
        velocity: Vec3,
        radius: f32,
        on_hit: Option<HitCallback>,
    ) -> ProjectileId {
        let id = ProjectileId(self.next_projectile);
        self.next_projectile = self.next_projectile.wrapping_add(1);

        let caster = caster
            .and_then(|caster| self.actors.get(&caster))
            .map(|actor| actor.collision_object());
        let projectile = Projectile::spawn(id, self.scheduler.world(), position, velocity, radius, caster);
        if let Some(on_hit) = on_hit {
            projectile.set_hit_callback(on_hit);
        }
        self.projectiles.insert(id, projectile);
        id
    }

    pub fn remove_actor(&mut self, id: ActorId) -> bool {
        self.queued_movement.remove(&id);
        self.actors.remove(&id).is_some()
    }

    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        self.objects.remove(&id).is_some()
    }

    pub fn remove_projectile(&mut self, id: ProjectileId) -> bool {
        self.projectiles.remove(&id).is_some()
    }

    pub fn actor(&self, id: ActorId) -> Option<&Arc<Actor>> {
        self.actors.get(&id)
    }

    pub fn object(&self, id: ObjectId) -> Option<&Arc<Object>> {
        self.objects.get(&id)
    }

    pub fn projectile(&self, id: ProjectileId) -> Option<&Arc<Projectile>> {
        self.projectiles.get(&id)
    }

    /// Change an actor's movement flags and refresh its collision mask.
    pub fn set_actor_flags(&mut self, id: ActorId, flags: ActorFlags) {
        let Some(actor) = self.actors.get(&id) else {
            return;
        };
        actor.state().flags = flags;
        let mask = actor.collision_mask();
        if let Err(err) = self.scheduler.set_collision_filter_mask(actor.collision_object(), mask) {
            log::warn!("could not update collision mask of {id:?}: {err}");
        }
    }

    /// Move an actor instantly, skipping interpolation.
    pub fn teleport_actor(&mut self, id: ActorId, position: Vec3) {
        if let Some(actor) = self.actors.get(&id) {
            actor.teleport(position);
            self.scheduler.update_single_aabb(actor, true);
        }
    }

    /// Move an object. The world sees it at the next pre-step.
    pub fn move_object(&mut self, id: ObjectId, position: Vec3, rotation: Quat) {
        if let Some(object) = self.objects.get(&id) {
            object.set_transform(position, rotation);
            self.scheduler.update_single_aabb(object, false);
        }
    }

    // ========================================================================
    // Per-frame input
    // ========================================================================

    /// Desired velocity for the next tick, in the actor's local frame.
    pub fn queue_movement(&mut self, id: ActorId, movement: Vec3) {
        if self.actors.contains_key(&id) {
            self.queued_movement.insert(id, movement);
        }
    }

    pub fn set_water_level(&mut self, water_level: Option<f32>) {
        self.water_level = water_level;
    }

    /// Storm blowing toward `direction`, or calm weather for `None`.
    pub fn set_storm(&mut self, direction: Option<Vec3>) {
        self.world_frame = match direction {
            Some(direction) => WorldFrameData::storm(direction),
            None => WorldFrameData::calm(),
        };
    }

    // ========================================================================
    // Simulation
    // ========================================================================

    /// Advance by one rendered frame of `frame_dt` seconds.
    ///
    /// Returns the newest completed table, which lags one frame behind when
    /// workers run in the background.
    pub fn step_simulation(&mut self, frame_dt: f32) -> Arc<MovementTable> {
        let physics_dt = self.config.physics_dt();
        self.time_accumulator += frame_dt.max(0.0);
        let (steps, remaining) =
            calculate_step_config(self.time_accumulator, physics_dt, self.config.max_steps_per_frame);
        self.time_accumulator = remaining;

        // Bodies are snapshotted from the previous tick's results
        self.scheduler.wait_for_workers();
        let swim_height_scale = self.scheduler.solver().config().swim_height_scale;
        let mut simulations: Vec<Simulation> = Vec::with_capacity(self.actors.len() + self.projectiles.len());
        for (id, actor) in &self.actors {
            let movement = self.queued_movement.remove(id).unwrap_or(Vec3::ZERO);
            simulations.push(ActorSimulation::capture(actor, movement, self.water_level, swim_height_scale).into());
        }
        for projectile in self.projectiles.values() {
            if projectile.is_active() {
                simulations.push(ProjectileSimulation::capture(projectile).into());
            }
        }

        let table = self
            .scheduler
            .move_actors(steps, physics_dt, remaining, simulations, self.world_frame);
        self.dispatch_hits(&table);
        table
    }

    /// Wait for the tick in flight and return its table.
    pub fn flush(&mut self) -> Arc<MovementTable> {
        let table = self.scheduler.flush();
        self.dispatch_hits(&table);
        table
    }

    /// Drop in-flight work, e.g. on a level change.
    pub fn reset_simulation(&mut self) {
        self.scheduler.reset_simulation(self.actors.values());
        self.queued_movement.clear();
        self.time_accumulator = 0.0;
    }

    fn dispatch_hits(&mut self, table: &MovementTable) {
        if table.generation <= self.handled_generation {
            return;
        }
        self.handled_generation = table.generation;
        for output in table.projectiles.values() {
            let (Some(hit), Some(projectile)) = (output.hit, self.projectiles.get(&output.projectile)) else {
                continue;
            };
            projectile.notify_hit(&hit);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Nearest hit along a ray against the given categories.
    pub fn cast_ray(&self, from: Vec3, to: Vec3, ignore: Option<ObjectHandle>, mask: CollisionType) -> Option<RayHit> {
        let filter = QueryFilter::new(CollisionGroups::new(CollisionType::ANY_PHYSICAL, mask)).ignoring(ignore);
        self.scheduler.ray_test(from, to, &filter)
    }

    /// Sweep a sphere against the given categories.
    pub fn cast_sphere(&self, radius: f32, from: Vec3, to: Vec3, mask: CollisionType) -> TraceResult {
        let filter = QueryFilter::new(CollisionGroups::new(CollisionType::ANY_PHYSICAL, mask));
        self.scheduler
            .convex_sweep_test(&TraceShape::Ball { radius }, from, to, &filter)
    }

    /// Where an actor dropped at `position` would come to rest.
    pub fn trace_down(&self, id: ActorId, position: Vec3, max_height: f32) -> Option<GroundPlacement> {
        let actor = self.actors.get(&id)?;
        let solver = self.scheduler.solver();
        Some(self.scheduler.with_world(|world| {
            solver.trace_down(world, actor.collision_object(), position, actor.half_extents(), max_height)
        }))
    }

    pub fn get_line_of_sight(&self, a: ActorId, b: ActorId) -> bool {
        match (self.actors.get(&a), self.actors.get(&b)) {
            (Some(a), Some(b)) => self.scheduler.get_line_of_sight(a, b),
            _ => false,
        }
    }

    pub fn is_actor_standing_on(&self, actor: ActorId, body: BodyId) -> bool {
        self.actors
            .get(&actor)
            .is_some_and(|actor| actor.state().standing_on == Some(body))
    }

    /// Whether any actor other than `id` overlaps a cube of half size
    /// `radius` around `position`.
    pub fn is_area_occupied_by_other_actor(&self, id: ActorId, position: Vec3, radius: f32) -> bool {
        let own = self.actors.get(&id).map(|actor| actor.collision_object());
        let filter = QueryFilter::new(CollisionGroups::new(CollisionType::ACTOR, CollisionType::ACTOR)).ignoring(own);
        let extent = Vec3::splat(radius);
        let handles = self.scheduler.aabb_test(position - extent, position + extent, &filter);
        self.scheduler.with_world(|world| {
            handles
                .into_iter()
                .any(|handle| matches!(BodyId::of_object(world, handle), Some(BodyId::Actor(other)) if other != id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::FallEvent;
    use strider_physics::ProjectileHit;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HALF: Vec3 = Vec3::new(29.0, 64.0, 29.0);
    const DT: f32 = 1.0 / 60.0;

    fn arena() -> CollisionWorld {
        let mut world = CollisionWorld::new();
        world.add_box(Vec3::new(0.0, -50.0, 0.0), Vec3::new(5000.0, 50.0, 5000.0), CollisionGroups::WORLD);
        // A wall, a step and a pillar
        world.add_box(Vec3::new(600.0, 100.0, 0.0), Vec3::new(20.0, 100.0, 400.0), CollisionGroups::WORLD);
        world.add_box(Vec3::new(0.0, 10.0, 400.0), Vec3::new(200.0, 10.0, 100.0), CollisionGroups::WORLD);
        world.add_sphere(Vec3::new(-300.0, 60.0, 0.0), 60.0, CollisionGroups::WORLD);
        world
    }

    fn system(threads: usize) -> PhysicsSystem {
        PhysicsSystem::new(SchedulerConfig::with_threads(threads), MovementConfig::default(), arena()).unwrap()
    }

    fn populate(physics: &mut PhysicsSystem) -> Vec<ActorId> {
        (0..12)
            .map(|i| {
                let id = ActorId(i);
                let angle = i as f32 * std::f32::consts::TAU / 12.0;
                let position = Vec3::new(angle.cos() * 150.0, 1.0, angle.sin() * 150.0);
                physics.add_actor(id, position, HALF, HALF.y);
                id
            })
            .collect()
    }

    fn drive(physics: &mut PhysicsSystem, ids: &[ActorId], frames: usize) {
        for frame in 0..frames {
            for (i, id) in ids.iter().enumerate() {
                let angle = i as f32 * std::f32::consts::TAU / 12.0 + frame as f32 * 0.01;
                physics.queue_movement(*id, Vec3::new(angle.cos(), 0.0, angle.sin()) * 250.0);
            }
            physics.step_simulation(DT);
        }
        physics.flush();
    }

    #[test]
    fn test_step_config() {
        assert_eq!(calculate_step_config(0.0, DT, 20), (0, 0.0));

        let (steps, remaining) = calculate_step_config(DT * 2.5, DT, 20);
        assert_eq!(steps, 2);
        assert!((remaining - DT * 0.5).abs() < 1e-6);

        let (steps, remaining) = calculate_step_config(10.0, DT, 20);
        assert_eq!(steps, 20);
        assert!(remaining < DT);
    }

    #[test]
    fn test_thread_count_does_not_change_results() {
        let mut synchronous = system(0);
        let mut threaded = system(3);
        let ids = populate(&mut synchronous);
        populate(&mut threaded);

        drive(&mut synchronous, &ids, 90);
        drive(&mut threaded, &ids, 90);

        for id in &ids {
            let a = synchronous.actor(*id).unwrap().state().clone();
            let b = threaded.actor(*id).unwrap().state().clone();
            assert_eq!(a.position, b.position, "{id:?} diverged");
            assert_eq!(a.on_ground, b.on_ground);
            assert_eq!(a.inertia, b.inertia);
        }
    }

    #[test]
    fn test_empty_world_returns_empty_table() {
        for threads in [0, 2] {
            let mut physics = system(threads);
            let table = physics.step_simulation(DT);
            assert!(table.is_empty());
            let table = physics.flush();
            assert!(table.is_empty());
            assert!(table.generation >= 1);
        }
    }

    #[test]
    fn test_threaded_table_lags_one_frame() {
        let mut physics = system(2);
        let id = ActorId(1);
        physics.add_actor(id, Vec3::new(0.0, 1.0, 0.0), HALF, HALF.y);

        let first = physics.step_simulation(DT);
        assert_eq!(first.generation, 0);
        assert!(first.actor(id).is_none());

        let second = physics.step_simulation(DT);
        assert_eq!(second.generation, 1);
        assert!(second.actor(id).is_some());

        assert_eq!(physics.flush().generation, 2);
    }

    #[test]
    fn test_table_reports_movement() {
        let mut physics = system(0);
        let id = ActorId(7);
        physics.add_actor(id, Vec3::new(0.0, 1.0, -300.0), HALF, HALF.y);

        let mut table = physics.step_simulation(DT);
        for _ in 0..30 {
            physics.queue_movement(id, Vec3::new(0.0, 0.0, 120.0));
            table = physics.step_simulation(DT);
        }

        let output = table.actor(id).unwrap();
        assert!(output.on_ground);
        // Reported positions trail the simulation by up to one step
        assert!((output.position.z - (-300.0 + 60.0)).abs() < 4.5, "at {}", output.position.z);
        assert_eq!(output.standing_on, None);
    }

    #[test]
    fn test_falling_actor_lands() {
        let mut physics = system(0);
        let id = ActorId(1);
        physics.add_actor(id, Vec3::new(-1000.0, 150.0, 0.0), HALF, HALF.y);
        physics.actor(id).unwrap().state().on_ground = false;

        let mut landed = None;
        for _ in 0..120 {
            let table = physics.step_simulation(DT);
            if let Some(FallEvent::Landed { height }) = table.actor(id).and_then(|output| output.fall) {
                landed = Some(height);
            }
        }
        let height = landed.expect("actor never landed");
        assert!((height - 149.0).abs() < 2.0, "fell {height}");
    }

    #[test]
    fn test_projectile_hit_callback_runs_once() {
        let mut physics = system(0);
        let shooter = ActorId(1);
        physics.add_actor(shooter, Vec3::new(300.0, 1.0, 0.0), HALF, HALF.y);

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let id = physics.add_projectile(
            Some(shooter),
            Vec3::new(300.0, 80.0, 0.0),
            Vec3::new(1500.0, 0.0, 0.0),
            3.0,
            Some(Box::new(move |_: ProjectileId, hit: &ProjectileHit| {
                assert!((hit.point.x - 580.0).abs() < 0.5);
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );

        for _ in 0..60 {
            physics.step_simulation(DT);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!physics.projectile(id).unwrap().is_active());

        // Spent projectiles can be dropped once their hit went out
        assert!(physics.remove_projectile(id));
        assert!(physics.projectile(id).is_none());
        assert!(physics.step_simulation(DT).projectiles.is_empty());
    }

    #[test]
    fn test_trace_down_and_queries() {
        let mut physics = system(0);
        let a = ActorId(1);
        let b = ActorId(2);
        physics.add_actor(a, Vec3::new(0.0, 300.0, 400.0), HALF, HALF.y);
        physics.add_actor(b, Vec3::new(100.0, 1.0, 0.0), HALF, HALF.y);

        let placed = physics.trace_down(a, Vec3::new(0.0, 300.0, 400.0), 1000.0).unwrap();
        assert!(placed.on_ground);
        assert!((placed.position.y - 21.0).abs() < 0.1);
        assert!(physics.trace_down(ActorId(99), Vec3::ZERO, 10.0).is_none());

        let hit = physics
            .cast_ray(Vec3::new(0.0, 50.0, 0.0), Vec3::new(1000.0, 50.0, 0.0), None, CollisionType::WORLD)
            .unwrap();
        assert!((hit.point.x - 580.0).abs() < 0.01);

        let sweep = physics.cast_sphere(10.0, Vec3::new(0.0, 50.0, 0.0), Vec3::new(1000.0, 50.0, 0.0), CollisionType::WORLD);
        assert!((sweep.end_position.x - 570.0).abs() < 1.0);

        assert!(physics.is_area_occupied_by_other_actor(a, Vec3::new(100.0, 50.0, 0.0), 10.0));
        assert!(!physics.is_area_occupied_by_other_actor(b, Vec3::new(100.0, 50.0, 0.0), 10.0));
        assert!(physics.get_line_of_sight(a, b));
        assert!(!physics.get_line_of_sight(a, ActorId(99)));
    }

    #[test]
    fn test_standing_on_object() {
        let mut physics = system(0);
        let platform = ObjectId(5);
        physics.add_object(
            platform,
            CollisionObject::new(
                TraceShape::Box {
                    half_extents: Vec3::new(100.0, 5.0, 100.0),
                }
                .to_shared_shape(),
                Vec3::new(-1500.0, 5.0, 0.0),
                Quat::IDENTITY,
                CollisionGroups::WORLD,
            ),
        );
        let id = ActorId(1);
        physics.add_actor(id, Vec3::new(-1500.0, 11.0, 0.0), HALF, HALF.y);

        for _ in 0..3 {
            physics.queue_movement(id, Vec3::new(10.0, 0.0, 0.0));
            physics.step_simulation(DT);
        }
        assert!(physics.is_actor_standing_on(id, BodyId::Object(platform)));
    }

    #[test]
    fn test_reset_and_removal() {
        let mut physics = system(2);
        let ids = populate(&mut physics);
        drive(&mut physics, &ids, 10);

        physics.reset_simulation();
        for id in &ids {
            let state = physics.actor(*id).unwrap().state().clone();
            assert_eq!(state.previous_position, state.position);
        }

        let handle = physics.actor(ids[0]).unwrap().collision_object();
        assert!(physics.remove_actor(ids[0]));
        assert!(!physics.remove_actor(ids[0]));
        assert!(physics.scheduler().get_aabb(handle).is_none());
        drive(&mut physics, &ids[1..], 5);
    }

    #[test]
    fn test_teleport_survives_tick_in_flight() {
        let mut physics = system(2);
        let id = ActorId(1);
        physics.add_actor(id, Vec3::new(0.0, 1.0, 0.0), HALF, HALF.y);

        physics.queue_movement(id, Vec3::new(200.0, 0.0, 0.0));
        physics.step_simulation(4.0 * DT);
        let target = Vec3::new(2000.0, 1.0, 2000.0);
        physics.teleport_actor(id, target);
        physics.flush();

        let actor = physics.actor(id).unwrap();
        assert_eq!(actor.position(), target);
        let (min, max) = physics.scheduler().get_aabb(actor.collision_object()).unwrap();
        assert!(((min + max) * 0.5 - actor.collision_center()).length() < 1e-3);

        // Later ticks carry on from the new spot
        for _ in 0..10 {
            physics.queue_movement(id, Vec3::new(200.0, 0.0, 0.0));
            physics.step_simulation(DT);
        }
        physics.flush();
        assert!(physics.actor(id).unwrap().position().x > target.x);
    }

    #[test]
    fn test_sunk_actor_recovers_during_tick() {
        let mut physics = system(0);
        let id = ActorId(1);
        physics.add_actor(id, Vec3::new(-1000.0, -5.0, 0.0), HALF, HALF.y);

        physics.queue_movement(id, Vec3::new(50.0, 0.0, 0.0));
        physics.step_simulation(DT);

        let state = physics.actor(id).unwrap().state().clone();
        assert!(state.position.y > -1.0, "still sunk at {:?}", state.position);
        assert_eq!(state.stuck_frames, 1);
    }

    #[test]
    fn test_no_clip_actor_walks_through_wall() {
        let mut physics = system(0);
        let id = ActorId(1);
        physics.add_actor(id, Vec3::new(500.0, 1.0, 0.0), HALF, HALF.y);
        physics.set_actor_flags(id, ActorFlags::default().with(ActorFlags::SKIP_COLLISION));

        for _ in 0..60 {
            physics.queue_movement(id, Vec3::new(400.0, 0.0, 0.0));
            physics.step_simulation(DT);
        }
        assert!(physics.actor(id).unwrap().position().x > 800.0);
    }
}
