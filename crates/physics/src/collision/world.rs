//! Collision world containing every actor, object and projectile shape.
//!
//! The world is a flat, ordered store of convex collision objects with a
//! cached broadphase AABB per object. Queries iterate in handle order, which
//! keeps every result independent of insertion timing or thread count.
//!
//! Cached AABBs are only refreshed on insertion and by
//! [`CollisionWorld::update_single_aabb`]. Moving an object with
//! [`CollisionWorld::set_transform`] therefore leaves it findable at its old
//! bound until someone refreshes it.

use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use parry3d::bounding_volume::{Aabb, BoundingVolume};
use parry3d::math::{Isometry, Point, Real, Vector};
use parry3d::query::{
    cast_shapes, contact, ContactManifold, DefaultQueryDispatcher, PersistentQueryDispatcher, Ray, RayCast,
    ShapeCastOptions,
};
use parry3d::shape::{Shape, SharedShape};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::convert;
use super::flags::{CollisionGroups, CollisionType};
use super::trace::{ContactPoint, RayHit, TraceResult};

/// Sweeps ignore surfaces whose normal is closer than this to perpendicular
/// with the motion (or faces along it). Resting on a floor while walking
/// across it is not a hit.
const MIN_OPPOSING_DOT: f32 = 1.0e-3;

/// Handle to a collision object stored in a [`CollisionWorld`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHandle(pub u32);

/// Errors from world mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollisionError {
    #[error("unknown collision object {0:?}")]
    UnknownObject(ObjectHandle),

    #[error("degenerate shape: {0}")]
    DegenerateShape(&'static str),
}

/// A shape placed in the world.
#[derive(Debug, Clone)]
pub struct CollisionObject {
    /// The collision shape.
    pub shape: SharedShape,
    /// Position and orientation in world space.
    pub transform: Isometry<Real>,
    /// Category and collides-with mask.
    pub groups: CollisionGroups,
    /// Opaque owner tag, set by whoever owns the object.
    pub user_data: Option<u64>,
    /// Broadphase bound as of the last refresh.
    aabb: Aabb,
}

impl CollisionObject {
    pub fn new(shape: SharedShape, position: Vec3, rotation: Quat, groups: CollisionGroups) -> Self {
        let transform = convert::isometry(position, rotation);
        let aabb = shape.compute_aabb(&transform);
        Self {
            shape,
            transform,
            groups,
            user_data: None,
            aabb,
        }
    }

    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = Some(user_data);
        self
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        convert::position_of(&self.transform)
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        convert::from_rotation(&self.transform.rotation)
    }

    /// Broadphase bound as of the last refresh.
    #[inline]
    pub fn cached_aabb(&self) -> (Vec3, Vec3) {
        (convert::from_point(&self.aabb.mins), convert::from_point(&self.aabb.maxs))
    }
}

/// Which objects a query may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryFilter {
    /// Category/mask of the query itself.
    pub groups: CollisionGroups,
    /// Usually the querying object.
    pub exclude: Option<ObjectHandle>,
    /// A second object to skip, e.g. a projectile's caster.
    pub ignore: Option<ObjectHandle>,
}

impl QueryFilter {
    pub fn new(groups: CollisionGroups) -> Self {
        Self {
            groups,
            exclude: None,
            ignore: None,
        }
    }

    pub fn excluding(mut self, handle: ObjectHandle) -> Self {
        self.exclude = Some(handle);
        self
    }

    pub fn ignoring(mut self, handle: Option<ObjectHandle>) -> Self {
        self.ignore = handle;
        self
    }

    /// Remove categories from what the query collides with.
    pub fn without(mut self, categories: CollisionType) -> Self {
        self.groups.mask = self.groups.mask.difference(categories);
        self
    }

    fn accepts(&self, handle: ObjectHandle, object: &CollisionObject) -> bool {
        Some(handle) != self.exclude
            && Some(handle) != self.ignore
            && self.groups.interacts_with(object.groups)
    }
}

/// The collision world containing all objects.
///
/// # Thread Safety
///
/// Every query takes `&self` and has no side effects, so any number of
/// readers may query concurrently. Mutation needs `&mut self`; the scheduler
/// serializes it behind a lock.
#[derive(Debug, Default)]
pub struct CollisionWorld {
    objects: BTreeMap<ObjectHandle, CollisionObject>,
    /// Next handle to assign.
    next_id: u32,
}

impl CollisionWorld {
    /// Create an empty collision world.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Membership
    // ========================================================================

    /// Insert an object and return its handle.
    pub fn add_collision_object(&mut self, object: CollisionObject) -> ObjectHandle {
        let handle = ObjectHandle(self.next_id);
        self.next_id += 1;
        self.objects.insert(handle, object);
        handle
    }

    /// Add an axis-aligned box.
    pub fn add_box(&mut self, center: Vec3, half_extents: Vec3, groups: CollisionGroups) -> ObjectHandle {
        self.add_rotated_box(center, half_extents, Quat::IDENTITY, groups)
    }

    /// Add an oriented box.
    pub fn add_rotated_box(
        &mut self,
        center: Vec3,
        half_extents: Vec3,
        rotation: Quat,
        groups: CollisionGroups,
    ) -> ObjectHandle {
        let shape = SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z);
        self.add_collision_object(CollisionObject::new(shape, center, rotation, groups))
    }

    /// Add a sphere.
    pub fn add_sphere(&mut self, center: Vec3, radius: f32, groups: CollisionGroups) -> ObjectHandle {
        let shape = SharedShape::ball(radius);
        self.add_collision_object(CollisionObject::new(shape, center, Quat::IDENTITY, groups))
    }

    /// Add a convex hull given in world coordinates.
    pub fn add_convex_hull(
        &mut self,
        points: &[Vec3],
        groups: CollisionGroups,
    ) -> Result<ObjectHandle, CollisionError> {
        let parry_points: Vec<Point<Real>> = points.iter().map(|p| convert::to_point(*p)).collect();
        let shape = SharedShape::convex_hull(&parry_points)
            .filter(|shape| hull_volume(shape) > MIN_HULL_VOLUME)
            .ok_or(CollisionError::DegenerateShape("convex hull needs non-coplanar points"))?;
        Ok(self.add_collision_object(CollisionObject::new(shape, Vec3::ZERO, Quat::IDENTITY, groups)))
    }

    /// Remove an object, returning it if it existed.
    pub fn remove_collision_object(&mut self, handle: ObjectHandle) -> Option<CollisionObject> {
        self.objects.remove(&handle)
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<&CollisionObject> {
        self.objects.get(&handle)
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.objects.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    // ========================================================================
    // Per-object state
    // ========================================================================

    /// Move an object. The cached broadphase bound is left untouched.
    pub fn set_transform(
        &mut self,
        handle: ObjectHandle,
        position: Vec3,
        rotation: Quat,
    ) -> Result<(), CollisionError> {
        let object = self.object_mut(handle)?;
        object.transform = convert::isometry(position, rotation);
        Ok(())
    }

    /// Move an object keeping its orientation.
    pub fn set_position(&mut self, handle: ObjectHandle, position: Vec3) -> Result<(), CollisionError> {
        let object = self.object_mut(handle)?;
        object.transform.translation.vector = convert::to_vector(position);
        Ok(())
    }

    /// Recompute one object's broadphase bound from its current transform.
    pub fn update_single_aabb(&mut self, handle: ObjectHandle) -> Result<(), CollisionError> {
        let object = self.object_mut(handle)?;
        object.aabb = object.shape.compute_aabb(&object.transform);
        Ok(())
    }

    pub fn set_collision_filter_mask(
        &mut self,
        handle: ObjectHandle,
        mask: CollisionType,
    ) -> Result<(), CollisionError> {
        self.object_mut(handle)?.groups.mask = mask;
        Ok(())
    }

    /// Current bound of an object, computed from its live transform.
    pub fn get_aabb(&self, handle: ObjectHandle) -> Option<(Vec3, Vec3)> {
        let object = self.objects.get(&handle)?;
        let aabb = object.shape.compute_aabb(&object.transform);
        Some((convert::from_point(&aabb.mins), convert::from_point(&aabb.maxs)))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Broadphase query: objects whose cached bound overlaps the box.
    pub fn aabb_test(&self, min: Vec3, max: Vec3, filter: &QueryFilter) -> Vec<ObjectHandle> {
        let bounds = Aabb::new(convert::to_point(min), convert::to_point(max));
        self.candidates(&bounds, filter).map(|(handle, _)| handle).collect()
    }

    /// Cast a ray from `from` to `to` and return the nearest hit.
    pub fn ray_test(&self, from: Vec3, to: Vec3, filter: &QueryFilter) -> Option<RayHit> {
        let delta = to - from;
        if delta.length_squared() <= f32::EPSILON {
            return None;
        }

        let ray = Ray::new(convert::to_point(from), convert::to_vector(delta));
        let bounds = Aabb::new(convert::to_point(from.min(to)), convert::to_point(from.max(to)));

        let mut closest: Option<RayHit> = None;
        for (handle, object) in self.candidates(&bounds, filter) {
            let Some(hit) = object.shape.cast_ray_and_get_normal(&object.transform, &ray, 1.0, true) else {
                continue;
            };
            if closest.map_or(true, |c| hit.time_of_impact < c.fraction) {
                closest = Some(RayHit {
                    fraction: hit.time_of_impact,
                    point: from + delta * hit.time_of_impact,
                    normal: convert::from_vector(&hit.normal),
                    object: handle,
                    category: object.groups.category,
                });
            }
        }
        closest
    }

    /// Sweep a convex shape (translation only) from `from` to `to`.
    ///
    /// Returns the first surface the shape would enter. Surfaces the shape is
    /// moving away from or sliding along are ignored, so a shape resting on
    /// a floor can still move across it.
    pub fn sweep(&self, shape: &dyn Shape, from: Vec3, to: Vec3, filter: &QueryFilter) -> TraceResult {
        let motion = to - from;
        let distance = motion.length();
        if distance <= f32::EPSILON {
            return TraceResult::no_hit(to);
        }
        let direction = motion / distance;

        let start = convert::translation(from);
        let bounds = shape
            .compute_aabb(&start)
            .merged(&shape.compute_aabb(&convert::translation(to)));
        let velocity = convert::to_vector(motion);
        let stationary = Vector::zeros();

        let mut options = ShapeCastOptions::with_max_time_of_impact(1.0);
        options.compute_impact_geometry_on_penetration = true;

        let mut result = TraceResult::no_hit(to);
        for (handle, object) in self.candidates(&bounds, filter) {
            let hit = match cast_shapes(
                &start,
                &velocity,
                shape,
                &object.transform,
                &stationary,
                object.shape.as_ref(),
                options,
            ) {
                Ok(Some(hit)) => hit,
                Ok(None) => continue,
                Err(_) => {
                    log::trace!("unsupported shape pair in sweep against {:?}", handle);
                    continue;
                }
            };

            // normal1 is the mover's outward normal; the surface faces the other way
            let normal = -convert::from_vector(&hit.normal1);
            if normal.dot(direction) > -MIN_OPPOSING_DOT {
                continue;
            }

            let fraction = hit.time_of_impact.clamp(0.0, 1.0);
            if result.hit_something() && fraction >= result.fraction {
                continue;
            }

            result = TraceResult {
                fraction,
                end_position: from + motion * fraction,
                hit_point: convert::from_point(&(object.transform * hit.witness2)),
                hit_normal: Some(normal),
                hit_object: Some(handle),
                hit_category: object.groups.category,
            };
        }
        result
    }

    /// Contact points between a stored object and everything it overlaps.
    pub fn contact_test(&self, handle: ObjectHandle, filter: &QueryFilter) -> Vec<ContactPoint> {
        let Some(object) = self.objects.get(&handle) else {
            return Vec::new();
        };
        let filter = filter.excluding(handle);
        self.contacts_at(object.shape.as_ref(), &object.transform, &filter)
    }

    /// Contact between two specific objects, if they overlap.
    pub fn contact_pair_test(&self, handle: ObjectHandle, other: ObjectHandle) -> Option<ContactPoint> {
        let a = self.objects.get(&handle)?;
        let b = self.objects.get(&other)?;
        Self::contact_between(a.shape.as_ref(), &a.transform, other, b)
    }

    /// Contact points for a shape placed at an arbitrary transform.
    ///
    /// Nothing in the world moves; this is how a caller probes "what if this
    /// object were over there" without other readers seeing it.
    pub fn contact_test_shape(
        &self,
        shape: &dyn Shape,
        position: Vec3,
        rotation: Quat,
        filter: &QueryFilter,
    ) -> Vec<ContactPoint> {
        self.contacts_at(shape, &convert::isometry(position, rotation), filter)
    }

    // ========================================================================
    // Private helpers
    // ========================================================================

    fn object_mut(&mut self, handle: ObjectHandle) -> Result<&mut CollisionObject, CollisionError> {
        self.objects
            .get_mut(&handle)
            .ok_or(CollisionError::UnknownObject(handle))
    }

    fn candidates<'a>(
        &'a self,
        bounds: &'a Aabb,
        filter: &'a QueryFilter,
    ) -> impl Iterator<Item = (ObjectHandle, &'a CollisionObject)> + 'a {
        self.objects
            .iter()
            .filter(move |(handle, object)| filter.accepts(**handle, object) && object.aabb.intersects(bounds))
            .map(|(handle, object)| (*handle, object))
    }

    fn contacts_at(&self, shape: &dyn Shape, transform: &Isometry<Real>, filter: &QueryFilter) -> Vec<ContactPoint> {
        let bounds = shape.compute_aabb(transform);
        self.candidates(&bounds, filter)
            .filter_map(|(handle, object)| Self::contact_between(shape, transform, handle, object))
            .collect()
    }

    /// Deepest penetrating point between `shape` and `object`.
    ///
    /// Manifolds are computed in the frame of `shape` so that a small actor
    /// against a huge floor box keeps its precision.
    fn contact_between(
        shape: &dyn Shape,
        transform: &Isometry<Real>,
        handle: ObjectHandle,
        object: &CollisionObject,
    ) -> Option<ContactPoint> {
        let pos12 = transform.inv_mul(&object.transform);
        let mut manifolds: Vec<ContactManifold<(), ()>> = Vec::new();
        let mut workspace = None;
        let computed = DefaultQueryDispatcher.contact_manifolds(
            &pos12,
            shape,
            object.shape.as_ref(),
            0.0,
            &mut manifolds,
            &mut workspace,
        );
        if computed.is_err() {
            return Self::closest_contact(shape, transform, handle, object);
        }

        manifolds
            .iter()
            .flat_map(|manifold| manifold.points.iter().map(move |point| (manifold, point)))
            .filter(|(_, point)| point.dist <= 0.0)
            .min_by(|(_, a), (_, b)| a.dist.total_cmp(&b.dist))
            .map(|(manifold, point)| {
                let subshape2 = manifold.subshape_pos2.unwrap_or_else(Isometry::identity);
                let normal1 = manifold.subshape_pos1.map_or(manifold.local_n1, |pos| pos * manifold.local_n1);
                ContactPoint {
                    object: handle,
                    category: object.groups.category,
                    point: convert::from_point(&(object.transform * (subshape2 * point.local_p2))),
                    normal: -convert::from_vector(&(transform * normal1)),
                    distance: point.dist,
                }
            })
    }

    /// Single closest-point query, for shape pairs without manifold support.
    fn closest_contact(
        shape: &dyn Shape,
        transform: &Isometry<Real>,
        handle: ObjectHandle,
        object: &CollisionObject,
    ) -> Option<ContactPoint> {
        match contact(transform, shape, &object.transform, object.shape.as_ref(), 0.0) {
            Ok(Some(c)) => Some(ContactPoint {
                object: handle,
                category: object.groups.category,
                point: convert::from_point(&c.point2),
                normal: -convert::from_vector(&c.normal1),
                distance: c.dist,
            }),
            Ok(None) => None,
            Err(_) => {
                log::trace!("unsupported shape pair in contact test against {:?}", handle);
                None
            }
        }
    }
}

/// Hulls thinner than this are flat and rejected.
const MIN_HULL_VOLUME: f32 = 1.0e-6;

/// Enclosed volume of a convex hull, zero for anything else.
fn hull_volume(shape: &SharedShape) -> f32 {
    let Some(hull) = shape.as_convex_polyhedron() else {
        return 0.0;
    };
    let (vertices, indices) = hull.to_trimesh();
    let signed: f32 = indices
        .iter()
        .map(|[a, b, c]| {
            let a = convert::from_point(&vertices[*a as usize]);
            let b = convert::from_point(&vertices[*b as usize]);
            let c = convert::from_point(&vertices[*c as usize]);
            a.dot(b.cross(c)) / 6.0
        })
        .sum();
    signed.abs()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_world() -> CollisionWorld {
        let mut world = CollisionWorld::new();

        // Floor with its top at y=0
        world.add_box(
            Vec3::new(0.0, -50.0, 0.0),
            Vec3::new(5000.0, 50.0, 5000.0),
            CollisionGroups::WORLD,
        );

        // Wall whose near face is at x=500
        world.add_box(
            Vec3::new(550.0, 200.0, 0.0),
            Vec3::new(50.0, 200.0, 500.0),
            CollisionGroups::WORLD,
        );

        world
    }

    fn actor_filter() -> QueryFilter {
        QueryFilter::new(CollisionGroups::ACTOR)
    }

    fn actor_shape() -> SharedShape {
        SharedShape::cuboid(30.0, 60.0, 30.0)
    }

    #[test]
    fn test_ray_hit() {
        let world = create_test_world();

        let hit = world
            .ray_test(Vec3::new(0.0, 100.0, 0.0), Vec3::new(1000.0, 100.0, 0.0), &actor_filter())
            .expect("ray should hit the wall");

        assert!((hit.point.x - 500.0).abs() < 0.1);
        assert!((hit.normal - Vec3::NEG_X).length() < 1e-3);
        assert!((hit.fraction - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_ray_miss() {
        let world = create_test_world();
        let hit = world.ray_test(Vec3::new(0.0, 100.0, 0.0), Vec3::new(-1000.0, 100.0, 0.0), &actor_filter());
        assert!(hit.is_none());
    }

    #[test]
    fn test_sweep_stops_at_wall() {
        let world = create_test_world();
        let shape = actor_shape();

        let result = world.sweep(
            shape.as_ref(),
            Vec3::new(0.0, 61.0, 0.0),
            Vec3::new(1000.0, 61.0, 0.0),
            &actor_filter(),
        );

        assert!(result.hit_something());
        // Box front face touches the wall at x=500
        assert!((result.end_position.x - 470.0).abs() < 0.1);
        assert!((result.normal_or_up() - Vec3::NEG_X).length() < 1e-3);
    }

    #[test]
    fn test_sweep_along_resting_floor_is_free() {
        let world = create_test_world();
        let shape = actor_shape();

        // Bottom face exactly on the floor
        let result = world.sweep(
            shape.as_ref(),
            Vec3::new(0.0, 60.0, 0.0),
            Vec3::new(100.0, 60.0, 0.0),
            &actor_filter(),
        );

        assert!(!result.hit_something());
        assert_eq!(result.fraction, 1.0);
    }

    #[test]
    fn test_sweep_down_finds_floor() {
        let world = create_test_world();
        let shape = actor_shape();

        let result = world.sweep(
            shape.as_ref(),
            Vec3::new(0.0, 100.0, 0.0),
            Vec3::new(0.0, 0.0, 0.0),
            &actor_filter(),
        );

        assert!(result.hit_something());
        assert!((result.end_position.y - 60.0).abs() < 0.1);
        assert!(result.normal_or_up().y > 0.99);
    }

    #[test]
    fn test_filter_excludes_self_and_categories() {
        let mut world = CollisionWorld::new();
        let own = world.add_box(Vec3::new(100.0, 0.0, 0.0), Vec3::splat(10.0), CollisionGroups::ACTOR);
        let water = world.add_box(Vec3::new(200.0, 0.0, 0.0), Vec3::splat(10.0), CollisionGroups::WATER);

        let filter = actor_filter().excluding(own);
        let hit = world.ray_test(Vec3::ZERO, Vec3::new(300.0, 0.0, 0.0), &filter);
        assert!(hit.is_none(), "own object and water should both be skipped");

        let projectile = QueryFilter::new(CollisionGroups::PROJECTILE).excluding(own);
        let hit = world.ray_test(Vec3::ZERO, Vec3::new(300.0, 0.0, 0.0), &projectile);
        assert_eq!(hit.map(|h| h.object), Some(water));
    }

    #[test]
    fn test_contact_test_reports_penetration() {
        let mut world = create_test_world();
        let actor = world.add_collision_object(CollisionObject::new(
            actor_shape(),
            Vec3::new(0.0, 55.0, 0.0),
            Quat::IDENTITY,
            CollisionGroups::ACTOR,
        ));

        let contacts = world.contact_test(actor, &actor_filter());
        assert_eq!(contacts.len(), 1);
        assert!((contacts[0].distance + 5.0).abs() < 0.1);
        assert!(contacts[0].normal.y > 0.99);

        let floor = contacts[0].object;
        assert_eq!(world.contact_pair_test(actor, floor), Some(contacts[0]));
        assert!(world.contact_pair_test(actor, ObjectHandle(999)).is_none());
    }

    #[test]
    fn test_contact_against_tilted_box_uses_its_face() {
        let mut world = CollisionWorld::new();
        let rotation = Quat::from_rotation_z(20f32.to_radians());
        world.add_rotated_box(Vec3::ZERO, Vec3::new(300.0, 20.0, 150.0), rotation, CollisionGroups::WORLD);
        let up = rotation * Vec3::Y;

        let ball = SharedShape::ball(5.0);
        let contacts = world.contact_test_shape(ball.as_ref(), up * 23.0, Quat::IDENTITY, &actor_filter());

        assert_eq!(contacts.len(), 1);
        assert!((contacts[0].distance + 2.0).abs() < 0.05, "{:?}", contacts[0]);
        assert!(contacts[0].normal.dot(up) > 0.999);
        assert!((contacts[0].point - up * 20.0).length() < 0.05);
    }

    #[test]
    fn test_contact_test_shape_leaves_world_untouched() {
        let world = create_test_world();
        let shape = actor_shape();

        let embedded = world.contact_test_shape(shape.as_ref(), Vec3::new(0.0, 50.0, 0.0), Quat::IDENTITY, &actor_filter());
        let clear = world.contact_test_shape(shape.as_ref(), Vec3::new(0.0, 70.0, 0.0), Quat::IDENTITY, &actor_filter());

        assert!(embedded.iter().any(|c| c.distance < -9.0));
        assert!(clear.is_empty());
        assert_eq!(world.len(), 2);
    }

    #[test]
    fn test_deferred_aabb_refresh() {
        let mut world = CollisionWorld::new();
        let handle = world.add_box(Vec3::ZERO, Vec3::splat(10.0), CollisionGroups::WORLD);
        let filter = actor_filter();

        world.set_position(handle, Vec3::new(1000.0, 0.0, 0.0)).unwrap();
        let far_min = Vec3::new(980.0, -20.0, -20.0);
        let far_max = Vec3::new(1020.0, 20.0, 20.0);

        // Broadphase still sees it at the old spot
        assert!(world.aabb_test(far_min, far_max, &filter).is_empty());
        assert_eq!(world.aabb_test(Vec3::splat(-20.0), Vec3::splat(20.0), &filter), vec![handle]);

        world.update_single_aabb(handle).unwrap();
        assert_eq!(world.aabb_test(far_min, far_max, &filter), vec![handle]);

        let (min, max) = world.get_aabb(handle).unwrap();
        assert!((min.x - 990.0).abs() < 1e-3 && (max.x - 1010.0).abs() < 1e-3);
    }

    #[test]
    fn test_unknown_handle_errors() {
        let mut world = CollisionWorld::new();
        let missing = ObjectHandle(42);

        assert_eq!(world.update_single_aabb(missing), Err(CollisionError::UnknownObject(missing)));
        assert_eq!(
            world.set_collision_filter_mask(missing, CollisionType::WORLD),
            Err(CollisionError::UnknownObject(missing))
        );
        assert!(world.remove_collision_object(missing).is_none());
    }

    #[test]
    fn test_degenerate_convex_hull() {
        let mut world = CollisionWorld::new();
        let flat = [Vec3::ZERO, Vec3::X, Vec3::Z, Vec3::new(1.0, 0.0, 1.0)];
        assert!(world.add_convex_hull(&flat, CollisionGroups::WORLD).is_err());

        // Coplanar but not axis aligned
        let tilted = [Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(1.0, 1.0, -1.0)];
        assert_eq!(
            world.add_convex_hull(&tilted, CollisionGroups::WORLD),
            Err(CollisionError::DegenerateShape("convex hull needs non-coplanar points"))
        );
        assert!(world.is_empty());

        let tetra = [Vec3::ZERO, Vec3::X, Vec3::Z, Vec3::Y];
        assert!(world.add_convex_hull(&tetra, CollisionGroups::WORLD).is_ok());
    }
}
