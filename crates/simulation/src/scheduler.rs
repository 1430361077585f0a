//! The physics task scheduler.
//!
//! A fixed pool of worker threads runs each tick as a pipeline of three
//! barriers:
//!
//! ```text
//!  main thread          workers (all of them)
//!  -----------          ---------------------------------------------
//!  move_actors() ──►   ┌─ pre-step barrier   (flush AABBs, unstuck)
//!   returns previous   │  claim jobs, solve each one
//!   table              └─ post-step barrier  (commit positions)   × steps
//!                         claim jobs, fall tracking + interpolation
//!                         post-sim barrier   (LOS refresh, publish)
//! ```
//!
//! Work inside a step is claimed through an atomic counter, so the order in
//! which actors are solved is arbitrary. Every solve reads only its own frame
//! data and the world as it was at the start of the step, which makes the
//! results independent of the thread count.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use glam::Vec3;
use parking_lot::{Condvar, Mutex, RwLock};
use strider_physics::{
    CollisionError, CollisionObject, CollisionType, CollisionWorld, ContactPoint, MovementSolver, ObjectHandle,
    QueryFilter, RayHit, TraceResult, TraceShape, WorldFrameData,
};

use crate::barrier::Barrier;
use crate::body::{Actor, Body};
use crate::config::SchedulerConfig;
use crate::los::LosCache;
use crate::simulation::{MovementTable, Simulation, SyncContext};
use crate::world_lock::SharedWorld;

// ============================================================================
// Worker wake-up and completion signalling
// ============================================================================

#[derive(Debug, Default)]
struct JobSignal {
    frame: u64,
    stop: bool,
}

/// Frame counters the main thread and the workers hand ticks over with.
#[derive(Debug, Default)]
struct WorkersSync {
    job: Mutex<JobSignal>,
    has_job: Condvar,
    done_frame: Mutex<u64>,
    workers_done: Condvar,
}

impl WorkersSync {
    fn wait_for_workers(&self) {
        let target = self.job.lock().frame;
        let mut done = self.done_frame.lock();
        while *done < target {
            self.workers_done.wait(&mut done);
        }
    }

    fn wake_up_workers(&self) {
        let mut job = self.job.lock();
        job.frame += 1;
        self.has_job.notify_all();
    }

    fn stop_workers(&self) {
        let mut job = self.job.lock();
        job.stop = true;
        self.has_job.notify_all();
    }

    fn work_is_done(&self) {
        let mut done = self.done_frame.lock();
        *done += 1;
        self.workers_done.notify_all();
    }

    fn run_worker(&self, mut work: impl FnMut()) {
        let mut last_frame = 0;
        let mut job = self.job.lock();
        loop {
            while !job.stop && job.frame == last_frame {
                self.has_job.wait(&mut job);
            }
            if job.stop {
                return;
            }
            last_frame = job.frame;
            parking_lot::MutexGuard::unlocked(&mut job, &mut work);
        }
    }
}

// ============================================================================
// Shared state
// ============================================================================

/// Everything handed to the workers for one tick.
#[derive(Debug, Default)]
struct Frame {
    simulations: Vec<Mutex<Simulation>>,
    world_frame: WorldFrameData,
    physics_dt: f32,
    time_accumulator: f32,
    advance: bool,
}

struct Shared {
    world: Arc<SharedWorld>,
    solver: MovementSolver,
    threads: usize,
    defer_aabb_update: bool,

    /// Held shared by the workers for a whole tick, exclusively by the main
    /// thread while it hands a tick over.
    frame: RwLock<Frame>,
    next_job: AtomicUsize,
    remaining_steps: AtomicU32,
    quit: AtomicBool,

    pre_step: Barrier,
    post_step: Barrier,
    post_sim: Barrier,

    pending_aabb: Mutex<BTreeMap<ObjectHandle, Weak<dyn Body>>>,
    los: Mutex<LosCache>,
    published: Mutex<Arc<MovementTable>>,
    generation: AtomicU64,

    workers: Option<WorkersSync>,
}

impl Shared {
    fn do_simulation(&self, frame: &Frame) {
        while self.remaining_steps.load(Ordering::Acquire) > 0 {
            self.pre_step.wait(|| self.after_pre_step(frame));

            while let Some(job) = self.claim_job(frame) {
                frame.simulations[job]
                    .lock()
                    .step(&self.solver, frame.physics_dt, &frame.world_frame, &self.world);
            }

            self.post_step.wait(|| self.after_post_step(frame));
        }

        let sync = SyncContext {
            advance: frame.advance,
            time_accumulator: frame.time_accumulator,
            physics_dt: frame.physics_dt,
        };
        while let Some(job) = self.claim_job(frame) {
            frame.simulations[job].lock().finalize(&sync, &self.world);
        }

        self.post_sim.wait(|| self.after_post_sim(frame));
    }

    fn claim_job(&self, frame: &Frame) -> Option<usize> {
        if self.quit.load(Ordering::Acquire) {
            return None;
        }
        let job = self.next_job.fetch_add(1, Ordering::Relaxed);
        (job < frame.simulations.len()).then_some(job)
    }

    fn after_pre_step(&self, frame: &Frame) {
        self.flush_pending_aabbs();
        if self.remaining_steps.load(Ordering::Acquire) == 0 {
            return;
        }
        for simulation in &frame.simulations {
            simulation.lock().pre_step(&self.solver, &self.world);
        }
    }

    fn after_post_step(&self, frame: &Frame) {
        if self.quit.load(Ordering::Acquire) {
            self.remaining_steps.store(0, Ordering::Release);
        } else if self.remaining_steps.load(Ordering::Acquire) > 0 {
            self.remaining_steps.fetch_sub(1, Ordering::AcqRel);
            self.commit_positions(frame);
        }
        self.next_job.store(0, Ordering::Release);
    }

    fn after_post_sim(&self, frame: &Frame) {
        if !self.quit.load(Ordering::Acquire) {
            self.los.lock().refresh(&self.world);

            let generation = self.generation.load(Ordering::Acquire) + 1;
            let table = {
                let simulations: Vec<_> = frame.simulations.iter().map(|simulation| simulation.lock()).collect();
                MovementTable::collect(generation, simulations.iter().map(|guard| &**guard))
            };
            log::trace!(
                "published tick {generation}: {} actors, {} projectiles",
                table.actors.len(),
                table.projectiles.len()
            );
            *self.published.lock() = Arc::new(table);
            self.generation.store(generation, Ordering::Release);
        }
        if let Some(workers) = &self.workers {
            workers.work_is_done();
        }
    }

    /// Push every solved position into the world for the next step.
    fn commit_positions(&self, frame: &Frame) {
        let bodies: Vec<Arc<dyn Body>> = frame
            .simulations
            .iter()
            .filter_map(|simulation| simulation.lock().commit())
            .collect();
        {
            let mut world = self.world.write();
            for body in &bodies {
                body.commit_transform(&mut world);
            }
        }
        drop(bodies);
    }

    fn flush_pending_aabbs(&self) {
        let pending = std::mem::take(&mut *self.pending_aabb.lock());
        if pending.is_empty() {
            return;
        }
        let bodies: Vec<Arc<dyn Body>> = pending.values().filter_map(Weak::upgrade).collect();
        {
            let mut world = self.world.write();
            for body in &bodies {
                body.commit_transform(&mut world);
            }
        }
        drop(bodies);
    }
}

// ============================================================================
// TaskScheduler
// ============================================================================

/// Runs physics ticks on a worker pool and publishes their results.
///
/// With zero threads every tick runs synchronously inside
/// [`TaskScheduler::move_actors`].
pub struct TaskScheduler {
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
}

impl TaskScheduler {
    pub fn new(config: &SchedulerConfig, solver: MovementSolver, world: Arc<SharedWorld>) -> Self {
        let threads = config.threads;
        let los_cache_expiry = if threads == 0 { 0 } else { config.los_cache_expiry };

        let shared = Arc::new(Shared {
            world: world.clone(),
            solver: solver.clone(),
            threads,
            defer_aabb_update: config.defer_aabb_update,
            frame: RwLock::new(Frame::default()),
            next_job: AtomicUsize::new(0),
            remaining_steps: AtomicU32::new(0),
            quit: AtomicBool::new(false),
            pre_step: Barrier::new(threads),
            post_step: Barrier::new(threads),
            post_sim: Barrier::new(threads),
            pending_aabb: Mutex::new(BTreeMap::new()),
            los: Mutex::new(LosCache::new(los_cache_expiry)),
            published: Mutex::new(Arc::new(MovementTable::default())),
            generation: AtomicU64::new(0),
            workers: (threads > 0).then(WorkersSync::default),
        });

        let mut handles = Vec::with_capacity(threads);
        for index in 0..threads {
            let worker_shared = shared.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("physics-{index}"))
                .spawn(move || worker(&worker_shared));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // The barriers count on every worker being there
                    log::error!("failed to spawn physics worker {index}: {err}; running physics synchronously");
                    if let Some(workers) = &shared.workers {
                        workers.stop_workers();
                    }
                    for handle in handles {
                        let name = handle.thread().name().unwrap_or("physics").to_owned();
                        if handle.join().is_err() {
                            log::warn!("{name} panicked while shutting down");
                        }
                    }
                    let config = SchedulerConfig {
                        threads: 0,
                        ..config.clone()
                    };
                    return Self::new(&config, solver, world);
                }
            }
        }

        if threads > 0 {
            log::info!("Using {threads} async physics threads");
        } else {
            log::info!("Physics runs synchronously on the calling thread");
        }

        Self {
            shared,
            threads: handles,
        }
    }

    #[inline]
    pub fn world(&self) -> &Arc<SharedWorld> {
        &self.shared.world
    }

    #[inline]
    pub fn solver(&self) -> &MovementSolver {
        &self.shared.solver
    }

    #[inline]
    pub fn thread_count(&self) -> usize {
        self.shared.threads
    }

    /// Hand a tick to the workers.
    ///
    /// Returns the last completed table: the previous tick's when workers
    /// run in the background, this tick's when running synchronously.
    pub fn move_actors(
        &self,
        steps: u32,
        physics_dt: f32,
        time_accumulator: f32,
        simulations: Vec<Simulation>,
        world_frame: WorldFrameData,
    ) -> Arc<MovementTable> {
        self.wait_for_workers();
        if self.shared.quit.load(Ordering::Acquire) {
            return self.publication();
        }

        {
            let mut frame = self.shared.frame.write();
            frame.simulations = simulations.into_iter().map(Mutex::new).collect();
            frame.world_frame = world_frame;
            frame.physics_dt = physics_dt;
            frame.time_accumulator = time_accumulator;
            frame.advance = steps > 0;
            self.shared.remaining_steps.store(steps, Ordering::Release);
            self.shared.next_job.store(0, Ordering::Release);
        }
        log::trace!("tick handed over: {steps} steps");

        match &self.shared.workers {
            Some(workers) => {
                let previous = self.publication();
                workers.wake_up_workers();
                previous
            }
            None => {
                let frame = self.shared.frame.read();
                self.shared.do_simulation(&frame);
                drop(frame);
                self.publication()
            }
        }
    }

    /// The most recently published table.
    pub fn publication(&self) -> Arc<MovementTable> {
        self.shared.published.lock().clone()
    }

    /// Generation of the most recently published table.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// Block until the tick in flight, if any, has completed.
    pub fn wait_for_workers(&self) {
        if let Some(workers) = &self.shared.workers {
            workers.wait_for_workers();
        }
    }

    /// Finish the tick in flight and return its table.
    pub fn flush(&self) -> Arc<MovementTable> {
        self.wait_for_workers();
        self.publication()
    }

    /// Drop all in-flight state and snap actors to their current positions.
    pub fn reset_simulation<'a>(&self, actors: impl IntoIterator<Item = &'a Arc<Actor>>) {
        self.wait_for_workers();
        let mut frame = self.shared.frame.write();
        frame.simulations.clear();
        self.shared.pending_aabb.lock().clear();

        let actors: Vec<&Arc<Actor>> = actors.into_iter().collect();
        for actor in &actors {
            actor.reset_position();
        }
        let mut world = self.shared.world.write();
        for actor in actors {
            actor.commit_transform(&mut world);
        }
    }

    /// Commit a body's transform now, or at the next pre-step when deferred.
    pub fn update_single_aabb<B: Body + 'static>(&self, body: &Arc<B>, immediate: bool) {
        if immediate || self.shared.threads == 0 || !self.shared.defer_aabb_update {
            body.commit_transform(&mut self.shared.world.write());
        } else {
            let weak: Weak<dyn Body> = Arc::downgrade(body) as Weak<dyn Body>;
            self.shared.pending_aabb.lock().insert(body.collision_object(), weak);
        }
    }

    // ========================================================================
    // Thread-safe world access
    // ========================================================================

    pub fn ray_test(&self, from: Vec3, to: Vec3, filter: &QueryFilter) -> Option<RayHit> {
        self.shared.world.read().ray_test(from, to, filter)
    }

    pub fn convex_sweep_test(&self, shape: &TraceShape, from: Vec3, to: Vec3, filter: &QueryFilter) -> TraceResult {
        let shape = shape.to_shared_shape();
        self.shared.world.read().sweep(shape.as_ref(), from, to, filter)
    }

    /// Contacts of `handle` with everything the filter accepts, or with
    /// `other` alone.
    pub fn contact_test(
        &self,
        handle: ObjectHandle,
        other: Option<ObjectHandle>,
        filter: &QueryFilter,
    ) -> Vec<ContactPoint> {
        let world = self.shared.world.read();
        match other {
            Some(other) => world.contact_pair_test(handle, other).into_iter().collect(),
            None => world.contact_test(handle, filter),
        }
    }

    pub fn aabb_test(&self, min: Vec3, max: Vec3, filter: &QueryFilter) -> Vec<ObjectHandle> {
        self.shared.world.read().aabb_test(min, max, filter)
    }

    pub fn get_aabb(&self, handle: ObjectHandle) -> Option<(Vec3, Vec3)> {
        self.shared.world.read().get_aabb(handle)
    }

    pub fn add_collision_object(&self, object: CollisionObject) -> ObjectHandle {
        self.shared.world.write().add_collision_object(object)
    }

    pub fn remove_collision_object(&self, handle: ObjectHandle) -> Option<CollisionObject> {
        self.shared.world.write().remove_collision_object(handle)
    }

    pub fn set_collision_filter_mask(&self, handle: ObjectHandle, mask: CollisionType) -> Result<(), CollisionError> {
        self.shared.world.write().set_collision_filter_mask(handle, mask)
    }

    /// Read-only access to the world for anything the wrappers above don't
    /// cover.
    pub fn with_world<R>(&self, f: impl FnOnce(&CollisionWorld) -> R) -> R {
        f(&self.shared.world.read())
    }

    /// Cached line-of-sight check between two actors.
    pub fn get_line_of_sight(&self, a: &Arc<Actor>, b: &Arc<Actor>) -> bool {
        self.shared.los.lock().get_or_compute(a, b, &self.shared.world)
    }
}

fn worker(shared: &Shared) {
    if let Some(workers) = &shared.workers {
        workers.run_worker(|| {
            let frame = shared.frame.read();
            shared.do_simulation(&frame);
        });
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shared.quit.store(true, Ordering::Release);
        self.wait_for_workers();
        if let Some(workers) = &self.shared.workers {
            workers.stop_workers();
        }
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                log::error!("physics worker panicked");
            }
        }
    }
}
