//! Per-tick snapshots consumed and mutated by the movement solver.

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::collision::{CollisionType, ObjectHandle};

/// Flags describing how an actor moves this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorFlags(pub u16);

impl ActorFlags {
    /// Moves freely in 3D, no gravity.
    pub const FLYING: u16 = 1 << 0;

    /// Swimming animation state; the solver derives submersion itself.
    pub const SWIMMING: u16 = 1 << 1;

    /// Dead or paralyzed. Floats up when submerged.
    pub const INERT: u16 = 1 << 2;

    /// Controlled by a player.
    pub const PLAYER: u16 = 1 << 3;

    /// No-clip: movement ignores collision entirely.
    pub const SKIP_COLLISION: u16 = 1 << 4;

    /// Water-only creature that must stay below the surface.
    pub const AQUATIC: u16 = 1 << 5;

    /// Can stand on the water plane.
    pub const WATER_WALKING: u16 = 1 << 6;

    /// Check if a flag is set.
    #[inline]
    pub fn has(self, flag: u16) -> bool {
        (self.0 & flag) != 0
    }

    /// Set or clear a flag.
    #[inline]
    pub fn set(&mut self, flag: u16, value: bool) {
        if value {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    #[inline]
    pub fn with(mut self, flag: u16) -> Self {
        self.set(flag, true);
        self
    }

    #[inline]
    pub fn flying(self) -> bool {
        self.has(Self::FLYING)
    }

    #[inline]
    pub fn swimming(self) -> bool {
        self.has(Self::SWIMMING)
    }

    #[inline]
    pub fn inert(self) -> bool {
        self.has(Self::INERT)
    }

    #[inline]
    pub fn skip_collision(self) -> bool {
        self.has(Self::SKIP_COLLISION)
    }

    #[inline]
    pub fn aquatic(self) -> bool {
        self.has(Self::AQUATIC)
    }
}

/// One actor's state for one tick.
///
/// Built from the live actor at the start of a tick, mutated in place by
/// [`MovementSolver`](super::MovementSolver), then written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorFrameData {
    /// The actor's collision object.
    pub collision_object: ObjectHandle,

    /// Logical position (feet) in world space.
    pub position: Vec3,

    /// Pitch and yaw in radians.
    pub rotation: Vec2,

    /// Desired velocity in the actor's local frame (units/second).
    ///
    /// Yaw turns it about +Y; pitch only applies while flying or submerged.
    pub movement: Vec3,

    /// Half-size of the collision box.
    pub half_extents: Vec3,

    /// Feet height below which the actor counts as swimming.
    pub swim_level: f32,

    /// Water surface height, `-inf` when there is none.
    pub water_level: f32,

    pub flags: ActorFlags,

    /// Velocity carried across ticks while airborne or on a slope.
    pub inertia: Vec3,

    /// 1.0 is normal falling; lower values fall slower.
    pub slow_fall: f32,

    pub on_ground: bool,
    pub on_slope: bool,
    pub walking_on_water: bool,

    /// Object under the actor after the last ground probe.
    pub standing_on: Option<ObjectHandle>,

    /// Consecutive ticks spent embedded in geometry.
    pub stuck_frames: u32,
    pub last_stuck_position: Vec3,

    /// Feet height at the start of the tick, for fall tracking.
    pub old_height: f32,
    pub was_on_ground: bool,
}

impl ActorFrameData {
    /// A grounded, motionless actor at `position`.
    pub fn new(collision_object: ObjectHandle, position: Vec3, half_extents: Vec3) -> Self {
        Self {
            collision_object,
            position,
            rotation: Vec2::ZERO,
            movement: Vec3::ZERO,
            half_extents,
            swim_level: f32::NEG_INFINITY,
            water_level: f32::NEG_INFINITY,
            flags: ActorFlags::default(),
            inertia: Vec3::ZERO,
            slow_fall: 1.0,
            on_ground: true,
            on_slope: false,
            walking_on_water: false,
            standing_on: None,
            stuck_frames: 0,
            last_stuck_position: Vec3::ZERO,
            old_height: position.y,
            was_on_ground: true,
        }
    }

    /// Set the water surface and derive the swim level from the rendered
    /// height of the actor.
    pub fn set_water_level(&mut self, water_level: f32, rendering_half_height: f32, swim_height_scale: f32) {
        self.water_level = water_level;
        self.swim_level = water_level - rendering_half_height * 2.0 * swim_height_scale;
    }

    /// Rotation applied to horizontal movement.
    #[inline]
    pub fn yaw_rotation(&self) -> Quat {
        Quat::from_rotation_y(self.rotation.y)
    }

    /// Rotation applied to free 3D movement.
    #[inline]
    pub fn full_rotation(&self) -> Quat {
        Quat::from_rotation_y(self.rotation.y) * Quat::from_rotation_x(self.rotation.x)
    }

    /// Whether the actor intends to move at all.
    #[inline]
    pub fn wants_to_move(&self) -> bool {
        self.movement.length_squared() > 0.0
    }

    /// Collision box center for a feet position.
    #[inline]
    pub fn center_of(&self, feet: Vec3) -> Vec3 {
        feet + Vec3::Y * self.half_extents.y
    }
}

/// Conditions shared by every actor in a tick. Read-only while it runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldFrameData {
    pub is_in_storm: bool,
    /// Direction the storm blows toward.
    pub storm_direction: Vec3,
}

impl WorldFrameData {
    pub fn calm() -> Self {
        Self::default()
    }

    pub fn storm(direction: Vec3) -> Self {
        Self {
            is_in_storm: true,
            storm_direction: direction,
        }
    }
}

/// What a projectile ran into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectileHit {
    pub target: ObjectHandle,
    pub category: CollisionType,
    pub point: Vec3,
    pub normal: Vec3,
}

/// One projectile's state for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileFrameData {
    pub collision_object: ObjectHandle,
    /// Object that fired it; never hit.
    pub caster: Option<ObjectHandle>,
    pub position: Vec3,
    /// World-space velocity (units/second).
    pub velocity: Vec3,
    /// Cleared by the first hit.
    pub active: bool,
    pub hit: Option<ProjectileHit>,
}

impl ProjectileFrameData {
    pub fn new(collision_object: ObjectHandle, position: Vec3, velocity: Vec3) -> Self {
        Self {
            collision_object,
            caster: None,
            position,
            velocity,
            active: true,
            hit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_flags() {
        let mut flags = ActorFlags::default().with(ActorFlags::FLYING);
        assert!(flags.flying());
        assert!(!flags.inert());

        flags.set(ActorFlags::INERT, true);
        flags.set(ActorFlags::FLYING, false);
        assert!(flags.inert());
        assert!(!flags.flying());
    }

    #[test]
    fn test_swim_level_sits_below_water() {
        let mut frame = ActorFrameData::new(ObjectHandle(0), Vec3::ZERO, Vec3::new(30.0, 64.0, 30.0));
        frame.set_water_level(100.0, 64.0, 0.9);

        assert_eq!(frame.water_level, 100.0);
        assert!((frame.swim_level - (100.0 - 115.2)).abs() < 1e-3);
    }

    #[test]
    fn test_yaw_turns_forward_axis() {
        let mut frame = ActorFrameData::new(ObjectHandle(0), Vec3::ZERO, Vec3::ONE);
        frame.rotation = Vec2::new(0.0, std::f32::consts::FRAC_PI_2);

        let world = frame.yaw_rotation() * Vec3::X;
        assert!((world - Vec3::NEG_Z).length() < 1e-5);
    }
}
