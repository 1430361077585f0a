//! Query results and sweep shapes.

use glam::Vec3;
use parry3d::shape::SharedShape;
use serde::{Deserialize, Serialize};

use super::flags::CollisionType;
use super::world::ObjectHandle;

/// Result of sweeping a convex shape through the world.
///
/// Sweeps move a shape from a start position to an end position and report
/// the first blocking surface along the way.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceResult {
    /// How far along the sweep we got before hitting something.
    ///
    /// - `1.0` = traveled the full distance (no collision)
    /// - `0.0` = blocked immediately at start
    pub fraction: f32,

    /// Shape center at the moment of impact, or the sweep end if unobstructed.
    pub end_position: Vec3,

    /// World-space contact point on the obstacle.
    pub hit_point: Vec3,

    /// Obstacle surface normal, pointing back toward the moving shape.
    ///
    /// `None` if no collision occurred.
    pub hit_normal: Option<Vec3>,

    /// The object that was hit.
    pub hit_object: Option<ObjectHandle>,

    /// Category of the object that was hit.
    pub hit_category: CollisionType,
}

impl Default for TraceResult {
    fn default() -> Self {
        Self::no_hit(Vec3::ZERO)
    }
}

impl TraceResult {
    /// Create a trace result indicating no collision occurred.
    pub fn no_hit(end_position: Vec3) -> Self {
        Self {
            fraction: 1.0,
            end_position,
            hit_point: end_position,
            hit_normal: None,
            hit_object: None,
            hit_category: CollisionType::NONE,
        }
    }

    /// Check if this trace hit something.
    #[inline]
    pub fn hit_something(&self) -> bool {
        self.hit_object.is_some()
    }

    /// Get the hit normal, defaulting to up if none.
    #[inline]
    pub fn normal_or_up(&self) -> Vec3 {
        self.hit_normal.unwrap_or(Vec3::Y)
    }

    /// Whether the obstacle is another actor.
    #[inline]
    pub fn hit_actor(&self) -> bool {
        self.hit_category.intersects(CollisionType::ACTOR)
    }
}

/// Result of a ray test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RayHit {
    /// Fraction along the ray.
    pub fraction: f32,
    pub point: Vec3,
    pub normal: Vec3,
    pub object: ObjectHandle,
    pub category: CollisionType,
}

/// One overlapping pair found by a contact test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactPoint {
    /// The other object.
    pub object: ObjectHandle,
    pub category: CollisionType,
    /// World-space point on the other object's surface.
    pub point: Vec3,
    /// Direction that pushes the tested shape out of the other object.
    pub normal: Vec3,
    /// Signed separation; negative means penetration.
    pub distance: f32,
}

/// Convex shape used for sweeps and collision objects.
///
/// - **Box**: Actors use boxes, which keep the stair heuristics predictable
///   on the edges of steps.
/// - **Capsule**: A vertical pill, for callers that want rounded feet.
/// - **Ball**: Projectiles and sphere casts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TraceShape {
    /// A box centered on the origin.
    Box {
        /// Half-size in each axis (x, y, z).
        half_extents: Vec3,
    },

    /// A vertical capsule centered on the origin.
    Capsule {
        /// Radius of the capsule cylinder and end caps.
        radius: f32,
        /// Total height from bottom of lower cap to top of upper cap.
        height: f32,
    },

    /// A sphere.
    Ball { radius: f32 },
}

impl TraceShape {
    /// Half-size of the shape's local bounding box.
    pub fn half_extents(&self) -> Vec3 {
        match self {
            Self::Box { half_extents } => *half_extents,
            Self::Capsule { radius, height } => Vec3::new(*radius, height * 0.5, *radius),
            Self::Ball { radius } => Vec3::splat(*radius),
        }
    }

    /// Build the parry shape.
    pub fn to_shared_shape(&self) -> SharedShape {
        match *self {
            Self::Box { half_extents } => {
                SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
            Self::Capsule { radius, height } => {
                // Parry capsule is defined by half-height of the cylinder part
                let cylinder_half_height = (height - 2.0 * radius).max(0.0) / 2.0;
                SharedShape::capsule_y(cylinder_half_height, radius)
            }
            Self::Ball { radius } => SharedShape::ball(radius),
        }
    }
}
