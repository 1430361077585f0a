//! Collision categories and filter masks.
//!
//! Every collision object carries a category (what it is) and a mask (what it
//! collides with). A query or a pair of objects interacts only when each
//! side's category intersects the other side's mask.

use serde::{Deserialize, Serialize};

/// Category bits describing what kind of object something is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CollisionType(pub u16);

impl CollisionType {
    /// Nothing.
    pub const NONE: Self = Self(0);

    /// Static level geometry and placed objects.
    pub const WORLD: Self = Self(1 << 0);

    /// Doors and other animated blockers.
    pub const DOOR: Self = Self(1 << 1);

    /// Mobile actors (players, NPCs, creatures).
    pub const ACTOR: Self = Self(1 << 2);

    /// Terrain.
    pub const HEIGHT_MAP: Self = Self(1 << 3);

    /// Flying projectiles.
    pub const PROJECTILE: Self = Self(1 << 4);

    /// Water surface plane. Only water walkers and projectiles see it.
    pub const WATER: Self = Self(1 << 5);

    /// Blocks the camera but nothing physical.
    pub const CAMERA_ONLY: Self = Self(1 << 6);

    /// Only there for ray picking.
    pub const VISUAL_ONLY: Self = Self(1 << 7);

    /// What an ordinary actor bumps into.
    pub const DEFAULT: Self = Self(Self::WORLD.0 | Self::HEIGHT_MAP.0 | Self::ACTOR.0 | Self::DOOR.0);

    /// Everything with a physical presence.
    pub const ANY_PHYSICAL: Self = Self(Self::DEFAULT.0 | Self::PROJECTILE.0 | Self::WATER.0);

    /// Categories that block line of sight.
    pub const LINE_OF_SIGHT: Self = Self(Self::WORLD.0 | Self::HEIGHT_MAP.0 | Self::DOOR.0);

    /// Check if these flags contain a specific flag.
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Check if any of the given flags are set.
    #[inline]
    pub fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    #[inline]
    pub fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl std::ops::BitOr for CollisionType {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for CollisionType {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl std::ops::Not for CollisionType {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0)
    }
}

/// Category/mask pair attached to a collision object or a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollisionGroups {
    /// What this object is.
    pub category: CollisionType,
    /// What this object collides with.
    pub mask: CollisionType,
}

impl CollisionGroups {
    pub const fn new(category: CollisionType, mask: CollisionType) -> Self {
        Self { category, mask }
    }

    /// Static level geometry: collides with everything physical.
    pub const WORLD: Self = Self::new(CollisionType::WORLD, CollisionType::ANY_PHYSICAL);

    /// A walking actor.
    pub const ACTOR: Self = Self::new(
        CollisionType::ACTOR,
        CollisionType(CollisionType::DEFAULT.0 | CollisionType::PROJECTILE.0),
    );

    /// A projectile in flight.
    pub const PROJECTILE: Self = Self::new(CollisionType::PROJECTILE, CollisionType::ANY_PHYSICAL);

    /// The water plane.
    pub const WATER: Self = Self::new(
        CollisionType::WATER,
        CollisionType(CollisionType::ACTOR.0 | CollisionType::PROJECTILE.0),
    );

    /// Bidirectional filter test.
    #[inline]
    pub fn interacts_with(self, other: Self) -> bool {
        self.category.intersects(other.mask) && other.category.intersects(self.mask)
    }

    /// Narrow the mask, keeping the category.
    #[inline]
    pub fn with_mask(self, mask: CollisionType) -> Self {
        Self { mask, ..self }
    }
}

impl Default for CollisionGroups {
    fn default() -> Self {
        Self::WORLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_type_operations() {
        let combined = CollisionType::WORLD | CollisionType::WATER;

        assert!(combined.contains(CollisionType::WORLD));
        assert!(combined.contains(CollisionType::WATER));
        assert!(!combined.contains(CollisionType::ACTOR));
        assert!(combined.intersects(CollisionType::WORLD));
        assert_eq!(combined.difference(CollisionType::WATER), CollisionType::WORLD);
    }

    #[test]
    fn test_actor_ignores_water_by_default() {
        assert!(!CollisionGroups::ACTOR.interacts_with(CollisionGroups::WATER));
        assert!(CollisionGroups::ACTOR.interacts_with(CollisionGroups::WORLD));
        assert!(CollisionGroups::PROJECTILE.interacts_with(CollisionGroups::WATER));
    }

    #[test]
    fn test_water_walker_sees_water() {
        let walker = CollisionGroups::ACTOR.with_mask(CollisionGroups::ACTOR.mask | CollisionType::WATER);
        assert!(walker.interacts_with(CollisionGroups::WATER));
    }

    #[test]
    fn test_line_of_sight_mask_skips_actors() {
        let ray = CollisionGroups::new(CollisionType::ANY_PHYSICAL, CollisionType::LINE_OF_SIGHT);
        assert!(!ray.interacts_with(CollisionGroups::ACTOR));
        assert!(ray.interacts_with(CollisionGroups::WORLD));
    }
}
