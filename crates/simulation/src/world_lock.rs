//! Thread-safe access to the collision world.

use std::ops::Deref;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use strider_physics::CollisionWorld;

use crate::config::LockingPolicy;

/// The collision world behind a reader/writer lock.
///
/// Read-only queries go through [`SharedWorld::read`], which takes a shared or
/// an exclusive lock depending on the [`LockingPolicy`]. Anything that changes
/// the world goes through [`SharedWorld::write`].
///
/// Never drop the last reference to a body while holding either guard: bodies
/// remove their collision object on drop and would wait on this lock forever.
#[derive(Debug)]
pub struct SharedWorld {
    world: RwLock<CollisionWorld>,
    policy: LockingPolicy,
}

/// Read access to the world, shared or exclusive.
pub enum WorldReadGuard<'a> {
    Shared(RwLockReadGuard<'a, CollisionWorld>),
    Exclusive(RwLockWriteGuard<'a, CollisionWorld>),
}

impl Deref for WorldReadGuard<'_> {
    type Target = CollisionWorld;

    fn deref(&self) -> &CollisionWorld {
        match self {
            Self::Shared(guard) => guard,
            Self::Exclusive(guard) => guard,
        }
    }
}

impl SharedWorld {
    pub fn new(world: CollisionWorld, policy: LockingPolicy) -> Self {
        Self {
            world: RwLock::new(world),
            policy,
        }
    }

    #[inline]
    pub fn policy(&self) -> LockingPolicy {
        self.policy
    }

    /// Lock for queries.
    pub fn read(&self) -> WorldReadGuard<'_> {
        match self.policy {
            LockingPolicy::AllowSharedLocks => WorldReadGuard::Shared(self.world.read()),
            LockingPolicy::ExclusiveLocksOnly => WorldReadGuard::Exclusive(self.world.write()),
        }
    }

    /// Lock for mutation.
    pub fn write(&self) -> RwLockWriteGuard<'_, CollisionWorld> {
        self.world.write()
    }

    pub fn into_inner(self) -> CollisionWorld {
        self.world.into_inner()
    }
}
