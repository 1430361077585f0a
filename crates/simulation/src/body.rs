//! Physics bodies: the owners of collision objects.
//!
//! Each body owns exactly one collision object and removes it from the world
//! when dropped. The scheduler only ever sees bodies through [`Weak`]
//! references and the [`Body`] trait.

use std::fmt;
use std::sync::{Arc, Weak};

use glam::{Quat, Vec2, Vec3};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use strider_physics::{
    ActorFlags, CollisionGroups, CollisionObject, CollisionType, CollisionWorld, ObjectHandle, ProjectileHit, TraceShape,
};

use crate::world_lock::SharedWorld;

/// Actor identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(pub u32);

/// Static or animated object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

/// Projectile identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectileId(pub u32);

/// Any body, as stored in a collision object's user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BodyId {
    Actor(ActorId),
    Object(ObjectId),
    Projectile(ProjectileId),
}

impl BodyId {
    const KIND_SHIFT: u32 = 32;
    const ACTOR: u64 = 1;
    const OBJECT: u64 = 2;
    const PROJECTILE: u64 = 3;

    pub fn to_user_data(self) -> u64 {
        let (kind, id) = match self {
            Self::Actor(ActorId(id)) => (Self::ACTOR, id),
            Self::Object(ObjectId(id)) => (Self::OBJECT, id),
            Self::Projectile(ProjectileId(id)) => (Self::PROJECTILE, id),
        };
        (kind << Self::KIND_SHIFT) | u64::from(id)
    }

    pub fn from_user_data(data: u64) -> Option<Self> {
        let id = (data & u64::from(u32::MAX)) as u32;
        match data >> Self::KIND_SHIFT {
            Self::ACTOR => Some(Self::Actor(ActorId(id))),
            Self::OBJECT => Some(Self::Object(ObjectId(id))),
            Self::PROJECTILE => Some(Self::Projectile(ProjectileId(id))),
            _ => None,
        }
    }

    /// The body owning a collision object, if any.
    pub fn of_object(world: &CollisionWorld, handle: ObjectHandle) -> Option<Self> {
        world.object(handle)?.user_data.and_then(Self::from_user_data)
    }
}

/// Something owning a collision object whose transform the scheduler
/// commits to the world.
pub trait Body: Send + Sync {
    fn collision_object(&self) -> ObjectHandle;

    /// Write the body's current transform into the world and refresh the
    /// object's AABB.
    fn commit_transform(&self, world: &mut CollisionWorld);
}

fn remove_from_world(world: &Weak<SharedWorld>, handle: ObjectHandle) {
    if let Some(world) = world.upgrade() {
        world.write().remove_collision_object(handle);
    }
}

fn commit_position(world: &mut CollisionWorld, handle: ObjectHandle, position: Vec3, rotation: Option<Quat>) {
    let moved = match rotation {
        Some(rotation) => world.set_transform(handle, position, rotation),
        None => world.set_position(handle, position),
    };
    if let Err(err) = moved.and_then(|()| world.update_single_aabb(handle)) {
        log::warn!("failed to commit transform: {err}");
    }
}

// ============================================================================
// Actor
// ============================================================================

/// Mutable actor state carried between ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorState {
    /// Feet position after the last physics step.
    pub position: Vec3,
    /// Feet position before the last physics step.
    pub previous_position: Vec3,
    /// Interpolated position for rendering.
    pub simulation_position: Vec3,
    /// Pitch and yaw in radians.
    pub rotation: Vec2,
    pub flags: ActorFlags,
    pub inertia: Vec3,
    pub slow_fall: f32,
    pub on_ground: bool,
    pub on_slope: bool,
    pub walking_on_water: bool,
    pub standing_on: Option<BodyId>,
    pub stuck_frames: u32,
    pub last_stuck_position: Vec3,
    /// Height fallen since last touching ground.
    pub fall_height: f32,
    /// Bumped by every teleport. Ticks captured under an older value are
    /// not written back.
    pub teleport_generation: u64,
}

impl ActorState {
    fn at(position: Vec3) -> Self {
        Self {
            position,
            previous_position: position,
            simulation_position: position,
            rotation: Vec2::ZERO,
            flags: ActorFlags::default(),
            inertia: Vec3::ZERO,
            slow_fall: 1.0,
            on_ground: true,
            on_slope: false,
            walking_on_water: false,
            standing_on: None,
            stuck_frames: 0,
            last_stuck_position: Vec3::ZERO,
            fall_height: 0.0,
            teleport_generation: 0,
        }
    }
}

/// A walking, swimming or flying character with a box-shaped hull.
pub struct Actor {
    id: ActorId,
    collision_object: ObjectHandle,
    half_extents: Vec3,
    rendering_half_height: f32,
    world: Weak<SharedWorld>,
    state: Mutex<ActorState>,
}

impl Actor {
    /// Create an actor with its feet at `position` and add its hull to the
    /// world.
    pub fn spawn(
        id: ActorId,
        world: &Arc<SharedWorld>,
        position: Vec3,
        half_extents: Vec3,
        rendering_half_height: f32,
    ) -> Arc<Self> {
        let object = CollisionObject::new(
            TraceShape::Box { half_extents }.to_shared_shape(),
            position + Vec3::Y * half_extents.y,
            Quat::IDENTITY,
            CollisionGroups::ACTOR,
        )
        .with_user_data(BodyId::Actor(id).to_user_data());
        let collision_object = world.write().add_collision_object(object);

        Arc::new(Self {
            id,
            collision_object,
            half_extents,
            rendering_half_height,
            world: Arc::downgrade(world),
            state: Mutex::new(ActorState::at(position)),
        })
    }

    #[inline]
    pub fn id(&self) -> ActorId {
        self.id
    }

    #[inline]
    pub fn half_extents(&self) -> Vec3 {
        self.half_extents
    }

    #[inline]
    pub fn rendering_half_height(&self) -> f32 {
        self.rendering_half_height
    }

    /// Lock the actor's mutable state.
    ///
    /// Do not hold this while taking the world lock for writing.
    pub fn state(&self) -> MutexGuard<'_, ActorState> {
        self.state.lock()
    }

    pub fn position(&self) -> Vec3 {
        self.state.lock().position
    }

    /// Center of the collision hull.
    pub fn collision_center(&self) -> Vec3 {
        self.position() + Vec3::Y * self.half_extents.y
    }

    /// Record the result of a physics step. Returns whether the position
    /// changed.
    pub fn set_position(&self, position: Vec3) -> bool {
        let mut state = self.state.lock();
        let changed = state.position != position;
        state.previous_position = state.position;
        state.position = position;
        changed
    }

    /// Record a step solved from a snapshot taken at `generation`.
    ///
    /// Ignored if the actor was teleported since. Returns whether the
    /// position changed.
    pub fn apply_step(&self, position: Vec3, generation: u64) -> bool {
        let mut state = self.state.lock();
        if state.teleport_generation != generation {
            return false;
        }
        let changed = state.position != position;
        state.previous_position = state.position;
        state.position = position;
        changed
    }

    /// Move without interpolating from the old position.
    ///
    /// Any tick already in flight for this actor is discarded when it
    /// completes.
    pub fn teleport(&self, position: Vec3) {
        let mut state = self.state.lock();
        state.position = position;
        state.previous_position = position;
        state.simulation_position = position;
        state.teleport_generation = state.teleport_generation.wrapping_add(1);
    }

    /// Forget interpolation history, keeping the current position.
    pub fn reset_position(&self) {
        let mut state = self.state.lock();
        state.previous_position = state.position;
        state.simulation_position = state.position;
    }

    /// Collision mask for the actor's current flags.
    pub fn collision_mask(&self) -> CollisionType {
        let flags = self.state.lock().flags;
        if flags.skip_collision() {
            return CollisionType::NONE;
        }
        let mask = CollisionGroups::ACTOR.mask;
        if flags.has(ActorFlags::WATER_WALKING) {
            mask | CollisionType::WATER
        } else {
            mask
        }
    }
}

impl Body for Actor {
    fn collision_object(&self) -> ObjectHandle {
        self.collision_object
    }

    fn commit_transform(&self, world: &mut CollisionWorld) {
        let center = self.collision_center();
        commit_position(world, self.collision_object, center, None);
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("collision_object", &self.collision_object)
            .field("half_extents", &self.half_extents)
            .finish_non_exhaustive()
    }
}

impl Drop for Actor {
    fn drop(&mut self) {
        remove_from_world(&self.world, self.collision_object);
    }
}

// ============================================================================
// Object
// ============================================================================

/// A static or animated piece of world geometry.
pub struct Object {
    id: ObjectId,
    collision_object: ObjectHandle,
    world: Weak<SharedWorld>,
    /// Transform waiting to be committed.
    pending: Mutex<Option<(Vec3, Quat)>>,
}

impl Object {
    /// Add `object` to the world, tagged as this body.
    pub fn spawn(id: ObjectId, world: &Arc<SharedWorld>, object: CollisionObject) -> Arc<Self> {
        let object = object.with_user_data(BodyId::Object(id).to_user_data());
        let collision_object = world.write().add_collision_object(object);
        Arc::new(Self {
            id,
            collision_object,
            world: Arc::downgrade(world),
            pending: Mutex::new(None),
        })
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Queue a new transform. It reaches the world on the next commit.
    pub fn set_transform(&self, position: Vec3, rotation: Quat) {
        *self.pending.lock() = Some((position, rotation));
    }
}

impl Body for Object {
    fn collision_object(&self) -> ObjectHandle {
        self.collision_object
    }

    fn commit_transform(&self, world: &mut CollisionWorld) {
        if let Some((position, rotation)) = self.pending.lock().take() {
            commit_position(world, self.collision_object, position, Some(rotation));
        } else if let Err(err) = world.update_single_aabb(self.collision_object) {
            log::warn!("failed to refresh object AABB: {err}");
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id)
            .field("collision_object", &self.collision_object)
            .finish_non_exhaustive()
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        remove_from_world(&self.world, self.collision_object);
    }
}

// ============================================================================
// Projectile
// ============================================================================

/// Called on the main thread when a projectile hits something.
pub type HitCallback = Box<dyn FnMut(ProjectileId, &ProjectileHit) + Send>;

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileState {
    pub position: Vec3,
    pub previous_position: Vec3,
    pub simulation_position: Vec3,
    /// World-space velocity (units/second).
    pub velocity: Vec3,
    pub active: bool,
    pub hit: Option<ProjectileHit>,
}

/// A ball-shaped projectile.
pub struct Projectile {
    id: ProjectileId,
    collision_object: ObjectHandle,
    caster: Option<ObjectHandle>,
    world: Weak<SharedWorld>,
    state: Mutex<ProjectileState>,
    on_hit: Mutex<Option<HitCallback>>,
}

impl Projectile {
    pub fn spawn(
        id: ProjectileId,
        world: &Arc<SharedWorld>,
        position: Vec3,
        velocity: Vec3,
        radius: f32,
        caster: Option<ObjectHandle>,
    ) -> Arc<Self> {
        let object = CollisionObject::new(
            TraceShape::Ball { radius }.to_shared_shape(),
            position,
            Quat::IDENTITY,
            CollisionGroups::PROJECTILE,
        )
        .with_user_data(BodyId::Projectile(id).to_user_data());
        let collision_object = world.write().add_collision_object(object);

        Arc::new(Self {
            id,
            collision_object,
            caster,
            world: Arc::downgrade(world),
            state: Mutex::new(ProjectileState {
                position,
                previous_position: position,
                simulation_position: position,
                velocity,
                active: true,
                hit: None,
            }),
            on_hit: Mutex::new(None),
        })
    }

    #[inline]
    pub fn id(&self) -> ProjectileId {
        self.id
    }

    #[inline]
    pub fn caster(&self) -> Option<ObjectHandle> {
        self.caster
    }

    pub fn state(&self) -> MutexGuard<'_, ProjectileState> {
        self.state.lock()
    }

    pub fn position(&self) -> Vec3 {
        self.state.lock().position
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    pub fn set_hit_callback(&self, callback: HitCallback) {
        *self.on_hit.lock() = Some(callback);
    }

    /// Record a step result. A hit deactivates the projectile.
    pub fn set_position(&self, position: Vec3, hit: Option<ProjectileHit>) {
        let mut state = self.state.lock();
        state.previous_position = state.position;
        state.position = position;
        if hit.is_some() && state.active {
            state.active = false;
            state.hit = hit;
        }
    }

    /// Run the hit callback, if one is set.
    pub fn notify_hit(&self, hit: &ProjectileHit) {
        if let Some(callback) = self.on_hit.lock().as_mut() {
            callback(self.id, hit);
        }
    }
}

impl Body for Projectile {
    fn collision_object(&self) -> ObjectHandle {
        self.collision_object
    }

    fn commit_transform(&self, world: &mut CollisionWorld) {
        let position = self.position();
        commit_position(world, self.collision_object, position, None);
    }
}

impl fmt::Debug for Projectile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projectile")
            .field("id", &self.id)
            .field("collision_object", &self.collision_object)
            .field("caster", &self.caster)
            .finish_non_exhaustive()
    }
}

impl Drop for Projectile {
    fn drop(&mut self) {
        remove_from_world(&self.world, self.collision_object);
    }
}
