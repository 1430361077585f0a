//! Queries issued on behalf of one collision object.
//!
//! An [`ObjectTracer`] sweeps and contact-tests with the object's own shape
//! and filter groups and never reports the object itself.

use glam::{Quat, Vec3};

use super::flags::CollisionType;
use super::trace::{ContactPoint, TraceResult};
use super::world::{CollisionObject, CollisionWorld, ObjectHandle, QueryFilter};

/// Borrowed view of one object plus the world it lives in.
#[derive(Clone, Copy)]
pub struct ObjectTracer<'w> {
    world: &'w CollisionWorld,
    handle: ObjectHandle,
    object: &'w CollisionObject,
}

impl<'w> ObjectTracer<'w> {
    /// `None` if the object is not in the world.
    pub fn new(world: &'w CollisionWorld, handle: ObjectHandle) -> Option<Self> {
        let object = world.object(handle)?;
        Some(Self { world, handle, object })
    }

    #[inline]
    pub fn world(&self) -> &'w CollisionWorld {
        self.world
    }

    /// The object's filter, excluding itself.
    pub fn filter(&self) -> QueryFilter {
        QueryFilter::new(self.object.groups).excluding(self.handle)
    }

    /// Sweep the object's shape from `from` to `to` (shape centers).
    pub fn trace(&self, from: Vec3, to: Vec3) -> TraceResult {
        self.world.sweep(self.object.shape.as_ref(), from, to, &self.filter())
    }

    /// Sweep with some categories masked out.
    pub fn trace_without(&self, from: Vec3, to: Vec3, excluded: CollisionType) -> TraceResult {
        let filter = self.filter().without(excluded);
        self.world.sweep(self.object.shape.as_ref(), from, to, &filter)
    }

    /// Nearest surface below `from`, down to `to`.
    ///
    /// Actors are optionally skipped so that spawn placement never lands an
    /// actor on top of another one.
    pub fn find_ground(&self, from: Vec3, to: Vec3, ignore_actors: bool) -> TraceResult {
        if ignore_actors {
            self.trace_without(from, to, CollisionType::ACTOR)
        } else {
            self.trace(from, to)
        }
    }

    /// Every contact the object would have if its center were at `position`.
    ///
    /// The object is not moved.
    pub fn contacts_at(&self, position: Vec3) -> Vec<ContactPoint> {
        self.world
            .contact_test_shape(self.object.shape.as_ref(), position, Quat::IDENTITY, &self.filter())
    }
}
