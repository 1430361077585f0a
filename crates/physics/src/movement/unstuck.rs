//! Recovery for actors embedded in geometry.
//!
//! Runs before the solver each step. Penetrating contacts are summed into a
//! push-out vector and up to three candidate relocations are tried; the first
//! one that leaves the actor less embedded wins.

use glam::Vec3;

use crate::collision::{CollisionType, CollisionWorld, ContactPoint, ObjectTracer};

use super::frame::ActorFrameData;
use super::solver::MovementSolver;

/// What [`MovementSolver::unstuck`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnstuckOutcome {
    /// Not checked this step (no-clip, idle, or stuck too long to bother).
    Skipped,
    /// Penetration within tolerance.
    Clear,
    /// Moved out using the given attempt (1-based).
    Resolved(u8),
    /// Embedded, but no attempt improved things. Left in place.
    Unresolved,
}

/// Penetrating contacts folded into one push-out.
#[derive(Debug, Clone, Copy, Default)]
struct Penetration {
    /// Sum of the per-contact push-outs.
    delta: Vec3,
    /// Largest per-axis push-out of any single contact.
    max_axis: Vec3,
    /// Deepest contact distance (negative when embedded).
    min_distance: f32,
}

impl Penetration {
    fn summarize(contacts: &[ContactPoint]) -> Self {
        let mut summary = Self::default();
        for contact in contacts {
            if contact.category.intersects(CollisionType::ACTOR) || contact.distance >= 0.0 {
                continue;
            }
            let push = contact.normal * -contact.distance;
            summary.delta += push;
            summary.max_axis = summary.max_axis.max(push.abs());
            summary.min_distance = summary.min_distance.min(contact.distance);
        }
        summary
    }

    /// The summed push-out, scaled down so no axis exceeds what any single
    /// contact asked for.
    fn clamped_delta(&self) -> Vec3 {
        let mut scale: f32 = 1.0;
        for axis in 0..3 {
            let wanted = self.delta[axis].abs();
            if wanted > self.max_axis[axis] && wanted > 0.0 {
                scale = scale.min(self.max_axis[axis] / wanted);
            }
        }
        self.delta * scale
    }
}

fn add_margin_to_delta(delta: Vec3, margin: f32) -> Vec3 {
    delta + delta.normalize_or_zero() * margin
}

impl MovementSolver {
    /// Push an actor out of whatever it is embedded in.
    ///
    /// Candidate positions are evaluated without moving the collision object.
    /// A candidate is only taken if its deepest penetration is strictly
    /// shallower than the current one, so this never makes things worse.
    pub fn unstuck(&self, actor: &mut ActorFrameData, world: &CollisionWorld) -> UnstuckOutcome {
        let config = self.config();
        if actor.flags.skip_collision() || !actor.wants_to_move() {
            return UnstuckOutcome::Skipped;
        }

        if actor.stuck_frames >= config.stuck_frames_limit {
            let displacement = (actor.last_stuck_position - actor.position).length();
            if displacement < config.stuck_displacement {
                return UnstuckOutcome::Skipped;
            }
            actor.stuck_frames = 0;
            actor.last_stuck_position = Vec3::ZERO;
        }

        let Some(tracer) = ObjectTracer::new(world, actor.collision_object) else {
            return UnstuckOutcome::Skipped;
        };
        let center = actor.center_of(actor.position);
        let penetration_at = |offset: Vec3| Penetration::summarize(&tracer.contacts_at(center + offset));

        let current = penetration_at(Vec3::ZERO);
        if current.min_distance >= -config.allowed_penetration {
            actor.stuck_frames = 0;
            actor.last_stuck_position = Vec3::ZERO;
            return UnstuckOutcome::Clear;
        }

        actor.stuck_frames += 1;
        actor.last_stuck_position = actor.position;

        let delta = current.clamped_delta();
        let attempts = [
            add_margin_to_delta(delta, config.collision_margin),
            add_margin_to_delta(Vec3::new(0.0, delta.y.abs(), 0.0), config.collision_margin),
            Vec3::new(0.0, config.unstuck_nudge, 0.0),
        ];

        for (index, offset) in attempts.into_iter().enumerate() {
            if offset.length_squared() == 0.0 {
                continue;
            }
            let candidate = penetration_at(offset);
            if candidate.min_distance > current.min_distance {
                actor.position += offset;
                let attempt = index as u8 + 1;
                log::debug!(
                    "unstuck {:?} with attempt {attempt}: {:?} -> {:?}",
                    actor.collision_object,
                    actor.position - offset,
                    actor.position
                );
                return UnstuckOutcome::Resolved(attempt);
            }
        }

        log::debug!(
            "{:?} is stuck at {:?} (depth {})",
            actor.collision_object,
            actor.position,
            -current.min_distance
        );
        UnstuckOutcome::Unresolved
    }
}
