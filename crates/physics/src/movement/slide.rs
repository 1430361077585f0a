//! Velocity clipping and seam detection for collision response.
//!
//! When a sweep is blocked the solver removes the part of the velocity going
//! into the surface and keeps sliding. Two consecutive blocking planes that
//! meet at an acute angle form a seam; sliding along the seam's crease avoids
//! bouncing back and forth between the planes.

use glam::Vec3;

/// Component of `v` along `onto`.
#[inline]
pub fn project(v: Vec3, onto: Vec3) -> Vec3 {
    let len2 = onto.length_squared();
    if len2 <= f32::EPSILON {
        return Vec3::ZERO;
    }
    onto * (v.dot(onto) / len2)
}

/// `v` with its component along `normal` removed.
#[inline]
pub fn reject(v: Vec3, normal: Vec3) -> Vec3 {
    v - project(v, normal)
}

/// Velocity after hitting a surface: the into-surface part is removed,
/// velocity leaving the surface is kept as is.
#[inline]
pub fn clip_velocity(velocity: Vec3, normal: Vec3) -> Vec3 {
    if velocity.dot(normal) <= 0.0 {
        reject(velocity, normal)
    } else {
        velocity
    }
}

/// Treat a wall-like normal as perfectly vertical.
///
/// Leaves the normal alone if it has no horizontal part (a ceiling).
pub fn flatten_normal(normal: Vec3) -> Vec3 {
    let flat = Vec3::new(normal.x, 0.0, normal.z);
    if flat.length_squared() > f32::EPSILON {
        flat.normalize()
    } else {
        normal
    }
}

/// A crease between the current plane and an earlier one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seam {
    /// The earlier plane forming the crease.
    pub other_normal: Vec3,
    /// Unit direction along the crease.
    pub direction: Vec3,
}

impl Seam {
    /// Unit normal halfway between the two planes.
    pub fn average_normal(&self, normal: Vec3) -> Vec3 {
        (self.other_normal + normal).normalize_or_zero()
    }
}

/// The last two planes an actor slid along during one solve.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlideHistory {
    last_normal: Vec3,
    fallback_normal: Vec3,
    times_slid: u32,
}

impl SlideHistory {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn times_slid(&self) -> u32 {
        self.times_slid
    }

    /// Check `normal` against the previous planes for an acute crease.
    ///
    /// The plane before last only counts from the third slide on.
    pub fn seam(&mut self, normal: Vec3) -> Option<Seam> {
        if self.times_slid == 0 {
            return None;
        }

        let dot_a = self.last_normal.dot(normal);
        let dot_b = if self.times_slid <= 1 {
            1.0
        } else {
            self.fallback_normal.dot(normal)
        };
        if dot_a > 0.0 && dot_b > 0.0 {
            return None;
        }

        let mut other = self.last_normal;
        if dot_b < dot_a {
            other = self.fallback_normal;
            self.last_normal = self.fallback_normal;
        }

        let crease = other.cross(normal);
        if crease.length_squared() <= 0.0 {
            return None;
        }
        Some(Seam {
            other_normal: other,
            direction: crease.normalize(),
        })
    }

    /// Remember a plane the actor just slid along.
    pub fn record(&mut self, normal: Vec3) {
        self.times_slid += 1;
        self.fallback_normal = self.last_normal;
        self.last_normal = normal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_velocity_wall() {
        // Moving into a wall on the +X side
        let velocity = Vec3::new(10.0, 0.0, 5.0);
        let wall_normal = Vec3::new(-1.0, 0.0, 0.0);

        let clipped = clip_velocity(velocity, wall_normal);

        // X component should be zeroed, Z unchanged
        assert!(clipped.x.abs() < 0.01);
        assert!((clipped.z - 5.0).abs() < 0.01);
    }

    #[test]
    fn test_clip_velocity_leaving_surface() {
        let velocity = Vec3::new(-3.0, 1.0, 0.0);
        assert_eq!(clip_velocity(velocity, Vec3::NEG_X), velocity);
    }

    #[test]
    fn test_flatten_normal() {
        let steep = Vec3::new(-0.9, 0.3, 0.0).normalize();
        let flat = flatten_normal(steep);
        assert!((flat - Vec3::NEG_X).length() < 1e-5);

        assert_eq!(flatten_normal(Vec3::NEG_Y), Vec3::NEG_Y);
    }

    #[test]
    fn test_first_slide_has_no_seam() {
        let mut history = SlideHistory::new();
        assert!(history.seam(Vec3::NEG_X).is_none());
    }

    #[test]
    fn test_concave_corner_forms_seam() {
        let mut history = SlideHistory::new();
        let a = Vec3::new(-1.0, 0.0, 1.0).normalize();
        let b = Vec3::new(-1.0, 0.0, -1.0).normalize();

        history.record(a);
        let seam = history.seam(b).expect("right-angle corner is a seam");

        // Crease of two vertical walls is vertical
        assert!(seam.direction.y.abs() > 0.999);
        assert!((seam.average_normal(b) - Vec3::NEG_X).length() < 1e-5);
    }

    #[test]
    fn test_obtuse_planes_are_not_a_seam() {
        let mut history = SlideHistory::new();
        history.record(Vec3::new(-1.0, 0.0, 0.2).normalize());
        assert!(history.seam(Vec3::new(-1.0, 0.0, -0.2).normalize()).is_none());
        assert_eq!(history.times_slid(), 1);
    }
}
