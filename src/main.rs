//! Strider - headless soak runner
//!
//! Builds a walled arena, fills it with wandering actors and periodic
//! projectiles, and runs the physics for a number of frames while logging
//! tick timings. Scheduler settings come from `STRIDER_*` environment
//! variables; the frame count from the first argument or `STRIDER_SOAK_FRAMES`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{Quat, Vec3};
use strider_physics::{CollisionGroups, CollisionObject, CollisionWorld, MovementConfig, ProjectileHit, TraceShape};
use strider_simulation::{ActorId, ObjectId, PhysicsSystem, ProjectileId, SchedulerConfig};

const DEFAULT_FRAMES: u32 = 600;
const ACTOR_COUNT: u32 = 64;
const HALF_EXTENTS: Vec3 = Vec3::new(29.0, 64.0, 29.0);
const FRAME_DT: f32 = 1.0 / 60.0;
const ARENA_HALF: f32 = 2000.0;

fn frame_count() -> u32 {
    let arg = std::env::args().nth(1);
    let var = std::env::var("STRIDER_SOAK_FRAMES").ok();
    match arg.or(var) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("ignoring frame count {raw:?}, using {DEFAULT_FRAMES}");
            DEFAULT_FRAMES
        }),
        None => DEFAULT_FRAMES,
    }
}

/// Floor, four walls, a central pillar and a ramp.
fn build_arena() -> CollisionWorld {
    let mut world = CollisionWorld::new();
    world.add_box(
        Vec3::new(0.0, -50.0, 0.0),
        Vec3::new(ARENA_HALF, 50.0, ARENA_HALF),
        CollisionGroups::WORLD,
    );

    for (center, half) in [
        (Vec3::new(0.0, 150.0, -ARENA_HALF), Vec3::new(ARENA_HALF, 150.0, 20.0)),
        (Vec3::new(0.0, 150.0, ARENA_HALF), Vec3::new(ARENA_HALF, 150.0, 20.0)),
        (Vec3::new(-ARENA_HALF, 150.0, 0.0), Vec3::new(20.0, 150.0, ARENA_HALF)),
        (Vec3::new(ARENA_HALF, 150.0, 0.0), Vec3::new(20.0, 150.0, ARENA_HALF)),
    ] {
        world.add_box(center, half, CollisionGroups::WORLD);
    }

    world.add_box(Vec3::new(0.0, 200.0, 0.0), Vec3::new(120.0, 200.0, 120.0), CollisionGroups::WORLD);
    world.add_rotated_box(
        Vec3::new(800.0, 0.0, 800.0),
        Vec3::new(300.0, 20.0, 150.0),
        Quat::from_rotation_z(20f32.to_radians()),
        CollisionGroups::WORLD,
    );
    world
}

/// Desired velocity of actor `index` at `frame`: slow circles of varying
/// radius, some actors standing still.
fn wander(index: u32, frame: u32) -> Vec3 {
    if index % 7 == 0 {
        return Vec3::ZERO;
    }
    let phase = index as f32 * 0.7 + frame as f32 * 0.02 * (1.0 + (index % 3) as f32);
    Vec3::new(phase.cos(), 0.0, phase.sin()) * (150.0 + (index % 5) as f32 * 40.0)
}

fn run(config: SchedulerConfig, frames: u32) -> Result<(), strider_simulation::ConfigError> {
    let mut physics = PhysicsSystem::new(config, MovementConfig::default(), build_arena())?;
    log::info!(
        "soak: {ACTOR_COUNT} actors, {frames} frames, {} physics threads",
        physics.scheduler().thread_count()
    );

    for i in 0..ACTOR_COUNT {
        let column = (i % 8) as f32 - 3.5;
        let row = (i / 8) as f32 - 3.5;
        let spawn = Vec3::new(column * 300.0 + 150.0, 200.0, row * 300.0 + 150.0);
        let id = ActorId(i);
        physics.add_actor(id, spawn, HALF_EXTENTS, HALF_EXTENTS.y);
        if let Some(placed) = physics.trace_down(id, spawn, 1000.0) {
            physics.teleport_actor(id, placed.position);
        }
    }

    let door = physics.add_object(
        ObjectId(1),
        CollisionObject::new(
            TraceShape::Box {
                half_extents: Vec3::new(60.0, 100.0, 8.0),
            }
            .to_shared_shape(),
            Vec3::new(-1000.0, 100.0, 0.0),
            Quat::IDENTITY,
            CollisionGroups::WORLD,
        ),
    );

    let hits = Arc::new(AtomicUsize::new(0));
    let mut slowest = Duration::ZERO;
    let mut total = Duration::ZERO;
    let mut published = 0;
    let mut spent = 0;

    for frame in 0..frames {
        for i in 0..ACTOR_COUNT {
            physics.queue_movement(ActorId(i), wander(i, frame));
        }

        // Weather and water come and go
        physics.set_storm((frame / 240 % 2 == 1).then_some(Vec3::X));
        physics.set_water_level((frame / 300 % 2 == 1).then_some(-500.0));

        if frame % 30 == 0 {
            let shooter = ActorId(frame / 30 % ACTOR_COUNT);
            if let Some(origin) = physics.actor(shooter).map(|actor| actor.collision_center()) {
                let counter = hits.clone();
                physics.add_projectile(
                    Some(shooter),
                    origin,
                    Vec3::new(0.0, 0.0, -1200.0),
                    4.0,
                    Some(Box::new(move |_: ProjectileId, _: &ProjectileHit| {
                        counter.fetch_add(1, Ordering::Relaxed);
                    })),
                );
            }
        }

        let angle = frame as f32 * 0.05;
        physics.move_object(door.id(), Vec3::new(-1000.0, 100.0, 0.0), Quat::from_rotation_y(angle));

        let started = Instant::now();
        let table = physics.step_simulation(FRAME_DT);
        let elapsed = started.elapsed();
        total += elapsed;
        slowest = slowest.max(elapsed);
        published = table.generation;

        // Hits in this table have been dispatched, so their projectiles can go
        for output in table.projectiles.values().filter(|output| output.hit.is_some()) {
            if physics.remove_projectile(output.projectile) {
                spent += 1;
            }
        }

        if frame % 120 == 0 {
            let grounded = table.actors.values().filter(|output| output.on_ground).count();
            log::info!(
                "frame {frame}: tick {} in {elapsed:?}, {grounded}/{} actors grounded",
                table.generation,
                table.actors.len()
            );
        }
    }

    let table = physics.flush();
    let frames = frames.max(1);
    log::info!(
        "soak done: {} ticks published (last seen {published}), mean {:?}, worst {:?}, {} projectile hits, {spent} projectiles removed",
        table.generation,
        total / frames,
        slowest,
        hits.load(Ordering::Relaxed)
    );
    Ok(())
}

fn main() {
    env_logger::init();

    let config = match SchedulerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            log::error!("invalid physics configuration: {err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(config, frame_count()) {
        log::error!("soak aborted: {err}");
        std::process::exit(1);
    }
}
