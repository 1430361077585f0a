//! Per-actor kinematic integrator.
//!
//! [`MovementSolver::move_actor`] turns one actor's desired velocity into a
//! collision-respecting position change for one step. It never fails: an
//! actor that cannot go anywhere simply stays where it is.

use glam::Vec3;

use crate::collision::{CollisionGroups, CollisionType, CollisionWorld, ObjectHandle, ObjectTracer, QueryFilter};

use super::config::MovementConfig;
use super::frame::{ActorFrameData, ProjectileFrameData, ProjectileHit, WorldFrameData};
use super::slide::{clip_velocity, flatten_normal, project, reject, SlideHistory};
use super::stepper::Stepper;

/// Where [`MovementSolver::trace_down`] put an actor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundPlacement {
    /// Feet position.
    pub position: Vec3,
    pub on_ground: bool,
    pub on_slope: bool,
}

/// Horizontal distance between the sweep and the thin ray in
/// [`MovementSolver::trace_down`] beyond which the ray wins.
const GROUND_RAY_TOLERANCE: f32 = 35.0;

/// Below this much time left, a first slide is treated as the last one.
const LAST_SLIDE_TIME: f32 = 0.01;

/// Kinematic movement solver.
///
/// Stateless apart from its configuration, so one instance can be shared by
/// every worker thread.
///
/// # Example
///
/// ```ignore
/// let solver = MovementSolver::new(MovementConfig::default());
/// let mut frame = ActorFrameData::new(handle, spawn, half_extents);
///
/// // Each step:
/// solver.unstuck(&mut frame, &world);
/// solver.move_actor(&mut frame, 1.0 / 60.0, &world, &WorldFrameData::calm());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MovementSolver {
    config: MovementConfig,
}

impl MovementSolver {
    pub fn new(config: MovementConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &MovementConfig {
        &self.config
    }

    /// Advance one actor by `time` seconds.
    pub fn move_actor(&self, actor: &mut ActorFrameData, time: f32, world: &CollisionWorld, world_frame: &WorldFrameData) {
        let config = &self.config;
        actor.walking_on_water = false;

        if actor.flags.skip_collision() {
            actor.position += actor.full_rotation() * actor.movement * time;
            return;
        }

        let Some(tracer) = ObjectTracer::new(world, actor.collision_object) else {
            log::debug!("collision object {:?} is gone, actor left in place", actor.collision_object);
            return;
        };

        // Work with the collision box center from here on
        let half_height = actor.half_extents.y;
        actor.position.y += half_height;
        let swim_level = actor.swim_level + half_height;

        let mut velocity = self.initial_velocity(actor, swim_level);
        velocity = self.apply_storm(velocity, world_frame);

        let flying = actor.flags.flying();
        let orig_velocity = velocity;
        let mut stepper = Stepper::new(tracer, config);
        let mut history = SlideHistory::new();
        let mut new_position = actor.position;
        let mut remaining_time = time;
        let mut force_ground_test = false;
        let mut seen_ground =
            !flying && new_position.y >= swim_level && actor.on_ground && !actor.on_slope;

        let mut iterations = 0;
        while iterations < config.max_iterations && remaining_time > config.min_remaining_time {
            let next_position = new_position + velocity * remaining_time;
            let underwater = new_position.y < swim_level;

            // Swimmers can't leave the water by swimming upward
            if !flying && underwater && next_position.y > swim_level {
                velocity = reject(velocity, Vec3::NEG_Y);
                continue;
            }
            iterations += 1;

            if (next_position - new_position).length_squared() <= 1.0e-4 {
                break;
            }

            let trace = tracer.trace(new_position, next_position);
            if !trace.hit_something() {
                new_position = trace.end_position;
                break;
            }

            let plane_normal = trace.normal_or_up();
            if config.is_walkable_slope(plane_normal) && !flying && new_position.y >= swim_level {
                seen_ground = true;
            }

            // Height of the contact above the actor's feet
            let hit_height = trace.hit_point.y - trace.end_position.y + half_height;
            let old_position = new_position;
            let stepped = hit_height < config.step_size_up
                && !trace.hit_actor()
                && stepper.step(&mut new_position, velocity * remaining_time, &mut remaining_time);

            if stepped {
                if actor.flags.aquatic() && new_position.y + half_height > actor.water_level {
                    new_position = old_position;
                } else if !flying && actor.position.y >= swim_level {
                    force_ground_test = true;
                }
                continue;
            }

            // Slide along what we ran into
            remaining_time *= 1.0 - trace.fraction;

            let mut normal = plane_normal;
            if seen_ground && !config.is_walkable_slope(normal) && normal.y != 0.0 {
                normal = flatten_normal(normal);
            }

            if (new_position - trace.end_position).length_squared() > config.collision_margin * config.collision_margin {
                let direction = velocity.normalize_or_zero();
                new_position = trace.end_position - direction * config.collision_margin;
            }

            let mut new_velocity = clip_velocity(velocity, normal);
            let mut used_seam = false;
            if let Some(seam) = history.seam(normal) {
                new_velocity = project(velocity, seam.direction);
                let average = seam.average_normal(normal);
                let away = tracer.trace(new_position, new_position + average * (config.collision_margin * 2.0));
                new_position = (new_position + away.end_position) * 0.5;
                used_seam = true;
            }

            // Ease off the plane, except on a first slide with time left over
            if !used_seam && (iterations > 1 || remaining_time < LAST_SLIDE_TIME) {
                let away = tracer.trace(new_position, new_position + normal * (config.collision_margin * 2.0));
                new_position = (new_position + away.end_position) * 0.5;
            }

            // Stop instead of turning back, if the turn was mostly horizontal
            if seen_ground && new_velocity.dot(orig_velocity) <= 0.0 {
                let perpendicular = new_velocity.cross(orig_velocity);
                if perpendicular.length_squared() > 0.0
                    && perpendicular.normalize().y.abs() > std::f32::consts::FRAC_1_SQRT_2
                {
                    break;
                }
            }

            // No climbing unwalkable slopes under gravity
            if new_position.y >= swim_level && !flying && !config.is_walkable_slope(normal) && !used_seam {
                new_velocity.y = new_velocity.y.min(velocity.y);
            }

            history.record(normal);
            velocity = new_velocity;
        }

        let (is_on_ground, is_on_slope) =
            self.probe_ground(actor, &tracer, &mut new_position, swim_level, force_ground_test);
        let (is_on_ground, is_on_slope) = if actor.stuck_frames >= config.stuck_frames_limit {
            (true, false)
        } else {
            (is_on_ground, is_on_slope)
        };

        self.update_inertia(actor, time, is_on_ground && !is_on_slope, new_position.y < swim_level);

        actor.on_ground = is_on_ground;
        actor.on_slope = is_on_slope;
        actor.position = new_position;
        actor.position.y -= half_height;
    }

    /// Advance one projectile by `time` seconds.
    ///
    /// A single sweep; the first thing hit stops the projectile and is
    /// recorded in [`ProjectileFrameData::hit`].
    pub fn move_projectile(&self, projectile: &mut ProjectileFrameData, time: f32, world: &CollisionWorld) {
        if !projectile.active {
            return;
        }
        let from = projectile.position;
        let to = from + projectile.velocity * time;
        if from == to {
            return;
        }
        let Some(object) = world.object(projectile.collision_object) else {
            return;
        };

        let filter = QueryFilter::new(CollisionGroups::new(CollisionType::PROJECTILE, CollisionType::ANY_PHYSICAL))
            .excluding(projectile.collision_object)
            .ignoring(projectile.caster);
        let trace = world.sweep(object.shape.as_ref(), from, to, &filter);

        match trace.hit_object {
            None => projectile.position = to,
            Some(target) => {
                projectile.position = trace.hit_point;
                projectile.active = false;
                projectile.hit = Some(ProjectileHit {
                    target,
                    category: trace.hit_category,
                    point: trace.hit_point,
                    normal: trace.normal_or_up(),
                });
            }
        }
    }

    /// Find where an actor spawned or teleported to `position` should stand.
    ///
    /// Searches at most `max_height` below. Falls back to a thin ray when the
    /// box lands on something the ray disagrees with (holes in floors,
    /// unwalkable ledges).
    pub fn trace_down(
        &self,
        world: &CollisionWorld,
        object: ObjectHandle,
        position: Vec3,
        half_extents: Vec3,
        max_height: f32,
    ) -> GroundPlacement {
        let config = &self.config;
        let unplaced = GroundPlacement {
            position,
            on_ground: false,
            on_slope: false,
        };
        let Some(tracer) = ObjectTracer::new(world, object) else {
            return unplaced;
        };

        let offset = Vec3::Y * half_extents.y;
        let ground = tracer.find_ground(position + offset, position + offset - Vec3::Y * max_height, true);
        if !ground.hit_something() {
            return unplaced;
        }

        let ray_filter = QueryFilter::new(CollisionGroups::new(
            CollisionType::ANY_PHYSICAL,
            CollisionType::WORLD | CollisionType::HEIGHT_MAP,
        ));
        let ray = world.ray_test(position, position - Vec3::Y * max_height, &ray_filter);
        let sweep_normal = ground.normal_or_up();

        if let Some(ray) = ray {
            let disagrees = (ray.point - (ground.end_position - offset)).length_squared()
                > GROUND_RAY_TOLERANCE * GROUND_RAY_TOLERANCE;
            if disagrees || !config.is_walkable_slope(sweep_normal) {
                return GroundPlacement {
                    position: ray.point + Vec3::Y * config.ground_offset,
                    on_ground: true,
                    on_slope: !config.is_walkable_slope(ray.normal),
                };
            }
        }

        GroundPlacement {
            position: ground.end_position - offset + Vec3::Y * config.ground_offset,
            on_ground: true,
            on_slope: !config.is_walkable_slope(sweep_normal),
        }
    }

    // ========================================================================
    // Private helpers
    // ========================================================================

    fn initial_velocity(&self, actor: &mut ActorFrameData, swim_level: f32) -> Vec3 {
        let submerged = actor.position.y < swim_level;

        if actor.movement.y > 0.0 && actor.flags.inert() && submerged {
            return Vec3::Y * self.config.inert_ascent_speed;
        }
        if submerged || actor.flags.flying() {
            return actor.full_rotation() * actor.movement;
        }

        let mut velocity = actor.yaw_rotation() * actor.movement;
        let jump_from_flat = velocity.y > 0.0 && actor.on_ground && !actor.on_slope;
        let jump_from_slope =
            velocity.y > 0.0 && velocity.y + actor.inertia.y <= -velocity.y && actor.on_slope;
        if jump_from_flat || jump_from_slope {
            actor.inertia = velocity;
        } else if !actor.on_ground || actor.on_slope {
            velocity += actor.inertia;
        }
        velocity
    }

    fn apply_storm(&self, velocity: Vec3, world_frame: &WorldFrameData) -> Vec3 {
        if !world_frame.is_in_storm || velocity.length_squared() == 0.0 {
            return velocity;
        }
        let Some(wind) = world_frame.storm_direction.try_normalize() else {
            return velocity;
        };
        let cos = wind.dot(velocity.normalize()).clamp(-1.0, 1.0);
        let angle_degrees = cos.acos().to_degrees();
        velocity * (1.0 - self.config.storm_walk_mult * (angle_degrees / 180.0))
    }

    /// Look for ground under `position` (a box center) and snap onto it.
    fn probe_ground(
        &self,
        actor: &mut ActorFrameData,
        tracer: &ObjectTracer<'_>,
        position: &mut Vec3,
        swim_level: f32,
        forced: bool,
    ) -> (bool, bool) {
        let config = &self.config;
        actor.standing_on = None;

        if !forced && !(actor.inertia.y <= 0.0 && position.y >= swim_level) {
            return (false, false);
        }

        let drop = 2.0 * config.ground_offset + if actor.on_ground { config.step_size_down } else { 0.0 };
        let probe = tracer.trace(*position, *position - Vec3::Y * drop);
        if !probe.hit_something() {
            return (false, false);
        }

        let mut on_ground = false;
        let mut on_slope = false;
        if !probe.hit_actor() {
            on_ground = true;
            on_slope = !config.is_walkable_slope(probe.normal_or_up());
            actor.standing_on = probe.hit_object;
            actor.walking_on_water = probe.hit_category.intersects(CollisionType::WATER);
        }

        if !actor.flags.flying() && !on_slope {
            if probe.fraction * drop > config.ground_offset {
                position.y = probe.end_position.y + config.ground_offset;
            } else {
                position.y = probe.end_position.y;
                let lift = tracer.trace(*position, *position + Vec3::Y * (2.0 * config.ground_offset));
                *position = (*position + lift.end_position) * 0.5;
            }
        }
        (on_ground, on_slope)
    }

    fn update_inertia(&self, actor: &mut ActorFrameData, time: f32, grounded_flat: bool, underwater: bool) {
        if grounded_flat || underwater || actor.flags.flying() {
            actor.inertia = Vec3::ZERO;
            return;
        }

        actor.inertia.y -= time * self.config.gravity;
        if actor.inertia.y < 0.0 {
            actor.inertia.y *= actor.slow_fall;
        }
        if actor.slow_fall < 1.0 {
            actor.inertia.x *= actor.slow_fall;
            actor.inertia.z *= actor.slow_fall;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
