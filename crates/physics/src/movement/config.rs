//! Movement solver constants.
//!
//! All solver parameters are grouped here for easy tuning. Distances are in
//! game units (roughly 70 units per meter), times in seconds.

use serde::{Deserialize, Serialize};

/// Units per meter of the world's length scale.
pub const UNITS_PER_METER: f32 = 69.991_25;

/// Configuration for the kinematic movement solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    // ========================================================================
    // Stairs and Steps
    // ========================================================================
    /// Height the stepper lifts an actor before moving forward.
    pub step_size_up: f32,

    /// Distance the stepper and the ground probe search downward.
    pub step_size_down: f32,

    /// Forward distance used when retrying a step over a thin obstacle.
    pub min_step: f32,

    // ========================================================================
    // Ground
    // ========================================================================
    /// Gap kept between an actor's feet and the ground.
    pub ground_offset: f32,

    /// Steepest walkable slope, degrees from horizontal.
    pub max_slope_degrees: f32,

    // ========================================================================
    // Collision
    // ========================================================================
    /// Maximum trace/slide iterations per actor per step.
    pub max_iterations: u32,

    /// Distance backed off from a surface after hitting it.
    pub collision_margin: f32,

    /// Penetration tolerated before unstuck recovery kicks in.
    pub allowed_penetration: f32,

    /// Remaining time below which the slide loop stops.
    pub min_remaining_time: f32,

    // ========================================================================
    // Physics
    // ========================================================================
    /// Gravity acceleration (units/second²).
    pub gravity: f32,

    /// Rise speed of inert actors floating up through water (units/second).
    pub inert_ascent_speed: f32,

    /// Fraction of an actor's rendered height below the water surface at
    /// which it starts swimming.
    pub swim_height_scale: f32,

    /// Walking into a storm wind head-on scales speed by `1 - storm_walk_mult`.
    pub storm_walk_mult: f32,

    // ========================================================================
    // Unstuck
    // ========================================================================
    /// Consecutive stuck ticks after which recovery gives up and the actor is
    /// treated as standing on flat ground.
    pub stuck_frames_limit: u32,

    /// Displacement that resets a given-up stuck counter.
    pub stuck_displacement: f32,

    /// Last-resort vertical nudge.
    pub unstuck_nudge: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            // Steps
            step_size_up: 34.0,
            step_size_down: 62.0,
            min_step: 10.0,

            // Ground
            ground_offset: 1.0,
            max_slope_degrees: 46.0,

            // Collision
            max_iterations: 8,
            collision_margin: 0.1,
            allowed_penetration: 0.01,
            min_remaining_time: 0.0001,

            // Physics
            gravity: 8.96 * UNITS_PER_METER,
            inert_ascent_speed: 25.0,
            swim_height_scale: 0.9,
            storm_walk_mult: 0.25,

            // Unstuck
            stuck_frames_limit: 10,
            stuck_displacement: 10.0,
            unstuck_nudge: 10.0,
        }
    }
}

impl MovementConfig {
    /// Minimum surface normal Y to count as walkable.
    #[inline]
    pub fn min_walkable_normal(&self) -> f32 {
        self.max_slope_degrees.to_radians().cos()
    }

    /// Whether a surface with this normal can be stood on.
    #[inline]
    pub fn is_walkable_slope(&self, normal: glam::Vec3) -> bool {
        normal.y >= self.min_walkable_normal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_default_config() {
        let config = MovementConfig::default();
        assert!(config.step_size_up < config.step_size_down);
        assert!(config.collision_margin < config.ground_offset);
        assert!((config.gravity - 627.12).abs() < 0.1);
    }

    #[test]
    fn test_walkable_slope() {
        let config = MovementConfig::default();

        assert!(config.is_walkable_slope(Vec3::Y));
        let forty = Vec3::new(40f32.to_radians().sin(), 40f32.to_radians().cos(), 0.0);
        assert!(config.is_walkable_slope(forty));
        let sixty = Vec3::new(60f32.to_radians().sin(), 60f32.to_radians().cos(), 0.0);
        assert!(!config.is_walkable_slope(sixty));
        assert!(!config.is_walkable_slope(Vec3::X));
    }
}
