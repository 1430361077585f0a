//! Stair stepping.
//!
//! An actor blocked by something short tries to climb it: lift by the step
//! height, move forward, then drop back down. The step is only taken if the
//! drop lands on walkable ground that is not another actor. There is no stair
//! geometry; anything that passes the up-forward-down test is a stair.

use glam::Vec3;

use crate::collision::{ObjectTracer, TraceResult};

use super::config::MovementConfig;

/// Up/forward/down trace helper, kept for the duration of one actor solve.
pub struct Stepper<'w> {
    tracer: ObjectTracer<'w>,
    config: &'w MovementConfig,
    up: TraceResult,
    forward: TraceResult,
    down: TraceResult,
    /// Where the cached up-trace started. `None` forces a new one.
    up_origin: Option<Vec3>,
}

impl<'w> Stepper<'w> {
    pub fn new(tracer: ObjectTracer<'w>, config: &'w MovementConfig) -> Self {
        Self {
            tracer,
            config,
            up: TraceResult::default(),
            forward: TraceResult::default(),
            down: TraceResult::default(),
            up_origin: None,
        }
    }

    /// Try to step over an obstacle.
    ///
    /// `position` is the collision box center and `desired_move` the
    /// remaining motion for this iteration. On success the position is moved
    /// onto the step and `remaining_time` shrinks by the forward distance
    /// consumed. On failure neither is touched.
    pub fn step(&mut self, position: &mut Vec3, desired_move: Vec3, remaining_time: &mut f32) -> bool {
        if desired_move.x == 0.0 && desired_move.z == 0.0 {
            return false;
        }

        // The up-trace only changes once the actor has moved
        if self.up_origin != Some(*position) {
            self.up_origin = None;
            self.up = self
                .tracer
                .trace(*position, *position + Vec3::Y * self.config.step_size_up);
            if self.up.fraction < f32::EPSILON {
                return false;
            }
            self.up_origin = Some(*position);
        }

        let lifted = self.up.end_position;
        self.forward = self.tracer.trace(lifted, lifted + desired_move);
        if self.forward.fraction < f32::EPSILON {
            return false;
        }
        self.down = self.trace_down(self.forward.end_position);

        if !self.can_step_down(&self.down) {
            // Thin obstacles: retry with a longer forward move
            if self.forward.fraction < 1.0 || desired_move.length_squared() > self.config.min_step * self.config.min_step {
                return false;
            }
            let direction = desired_move.normalize();
            self.forward = self.tracer.trace(lifted, lifted + direction * self.config.min_step);
            if self.forward.fraction < f32::EPSILON {
                return false;
            }
            self.down = self.trace_down(self.forward.end_position);
            if !self.can_step_down(&self.down) {
                return false;
            }
        }

        *position = self.down.end_position;
        *remaining_time *= 1.0 - self.forward.fraction;
        self.up_origin = None;
        true
    }

    fn trace_down(&self, from: Vec3) -> TraceResult {
        self.tracer.trace(from, from - Vec3::Y * self.config.step_size_down)
    }

    fn can_step_down(&self, down: &TraceResult) -> bool {
        down.hit_something() && !down.hit_actor() && self.config.is_walkable_slope(down.normal_or_up())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{CollisionGroups, CollisionObject, CollisionWorld, ObjectHandle};
    use glam::Quat;
    use parry3d::shape::SharedShape;

    const HALF: Vec3 = Vec3::new(30.0, 64.0, 30.0);

    /// Floor at y=0 plus a 20 unit block starting at x=100.
    fn stair_world() -> (CollisionWorld, ObjectHandle) {
        let mut world = CollisionWorld::new();
        world.add_box(Vec3::new(0.0, -50.0, 0.0), Vec3::new(5000.0, 50.0, 5000.0), CollisionGroups::WORLD);
        world.add_box(Vec3::new(300.0, 10.0, 0.0), Vec3::new(200.0, 10.0, 200.0), CollisionGroups::WORLD);
        let actor = world.add_collision_object(CollisionObject::new(
            SharedShape::cuboid(HALF.x, HALF.y, HALF.z),
            Vec3::new(0.0, 65.0, 0.0),
            Quat::IDENTITY,
            CollisionGroups::ACTOR,
        ));
        (world, actor)
    }

    #[test]
    fn test_zero_move_fails_without_mutation() {
        let (world, actor) = stair_world();
        let config = MovementConfig::default();
        let mut stepper = Stepper::new(ObjectTracer::new(&world, actor).unwrap(), &config);

        let mut position = Vec3::new(69.0, 65.0, 0.0);
        let mut remaining = 0.5;
        assert!(!stepper.step(&mut position, Vec3::ZERO, &mut remaining));
        assert!(!stepper.step(&mut position, Vec3::new(0.0, 5.0, 0.0), &mut remaining));
        assert_eq!(position, Vec3::new(69.0, 65.0, 0.0));
        assert_eq!(remaining, 0.5);
    }

    #[test]
    fn test_steps_onto_low_block() {
        let (world, actor) = stair_world();
        let config = MovementConfig::default();
        let mut stepper = Stepper::new(ObjectTracer::new(&world, actor).unwrap(), &config);

        // Box front face touching the block
        let mut position = Vec3::new(69.9, 65.0, 0.0);
        let mut remaining = 1.0 / 60.0;
        assert!(stepper.step(&mut position, Vec3::new(5.0, 0.0, 0.0), &mut remaining));

        // Feet on the block top
        assert!((position.y - HALF.y - 20.0).abs() < 0.1);
        assert!((position.x - 74.9).abs() < 0.1);
        assert!(remaining.abs() < 1e-6);
    }

    #[test]
    fn test_ceiling_blocks_step() {
        let (mut world, actor) = stair_world();
        // Ceiling touching the top of the actor
        world.add_box(Vec3::new(0.0, 139.0, 0.0), Vec3::new(500.0, 10.0, 500.0), CollisionGroups::WORLD);
        let config = MovementConfig::default();
        let mut stepper = Stepper::new(ObjectTracer::new(&world, actor).unwrap(), &config);

        let start = Vec3::new(69.9, 65.0, 0.0);
        let mut position = start;
        let mut remaining = 1.0 / 60.0;
        assert!(!stepper.step(&mut position, Vec3::new(5.0, 0.0, 0.0), &mut remaining));
        assert_eq!(position, start);
    }

    #[test]
    fn test_tall_wall_is_not_a_step() {
        let mut world = CollisionWorld::new();
        world.add_box(Vec3::new(0.0, -50.0, 0.0), Vec3::new(5000.0, 50.0, 5000.0), CollisionGroups::WORLD);
        world.add_box(Vec3::new(300.0, 150.0, 0.0), Vec3::new(200.0, 150.0, 200.0), CollisionGroups::WORLD);
        let actor = world.add_collision_object(CollisionObject::new(
            SharedShape::cuboid(HALF.x, HALF.y, HALF.z),
            Vec3::new(0.0, 65.0, 0.0),
            Quat::IDENTITY,
            CollisionGroups::ACTOR,
        ));
        let config = MovementConfig::default();
        let mut stepper = Stepper::new(ObjectTracer::new(&world, actor).unwrap(), &config);

        let start = Vec3::new(69.9, 65.0, 0.0);
        let mut position = start;
        let mut remaining = 1.0 / 60.0;
        stepper.step(&mut position, Vec3::new(5.0, 0.0, 0.0), &mut remaining);

        // At most it closes the gap to the wall; it never climbs
        assert!(position.y <= start.y + 0.01);
        assert!(position.x <= 100.0 - HALF.x + 0.01);
    }
}
