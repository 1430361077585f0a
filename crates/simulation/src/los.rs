//! Cached actor-to-actor line of sight.

use std::sync::{Arc, Weak};

use glam::Vec3;
use strider_physics::{CollisionGroups, CollisionType, CollisionWorld, QueryFilter};

use crate::body::{Actor, ActorId, Body};
use crate::world_lock::SharedWorld;

/// Eye height as a fraction of the hull's half height above its center.
const EYE_HEIGHT: f32 = 0.9;

#[derive(Debug)]
struct LosRequest {
    /// Sorted, so (a, b) and (b, a) share an entry.
    pair: (ActorId, ActorId),
    actors: [Weak<Actor>; 2],
    result: bool,
    /// Refreshes since the last lookup.
    age: u32,
}

/// Line-of-sight results between actor pairs.
///
/// Entries are recomputed every tick by [`LosCache::refresh`] and dropped once
/// either actor is gone or nobody asked for the pair in `expiry` ticks.
#[derive(Debug, Default)]
pub struct LosCache {
    requests: Vec<LosRequest>,
    expiry: u32,
}

fn eye_position(world: &CollisionWorld, actor: &Actor) -> Vec3 {
    let center = world
        .object(actor.collision_object())
        .map(|object| object.position())
        .unwrap_or_else(|| actor.collision_center());
    center + Vec3::Y * (actor.half_extents().y * EYE_HEIGHT)
}

/// Eye-to-eye ray test against static geometry, terrain and doors.
pub fn has_line_of_sight(world: &CollisionWorld, a: &Actor, b: &Actor) -> bool {
    let filter = QueryFilter::new(CollisionGroups::new(CollisionType::ANY_PHYSICAL, CollisionType::LINE_OF_SIGHT));
    world
        .ray_test(eye_position(world, a), eye_position(world, b), &filter)
        .is_none()
}

impl LosCache {
    pub fn new(expiry: u32) -> Self {
        Self {
            requests: Vec::new(),
            expiry,
        }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Cached result for the pair, computing and caching it on a miss.
    pub fn get_or_compute(&mut self, a: &Arc<Actor>, b: &Arc<Actor>, world: &SharedWorld) -> bool {
        let pair = if a.id() <= b.id() { (a.id(), b.id()) } else { (b.id(), a.id()) };

        if let Some(request) = self.requests.iter_mut().find(|request| request.pair == pair) {
            request.age = 0;
            return request.result;
        }

        let result = has_line_of_sight(&world.read(), a, b);
        self.requests.push(LosRequest {
            pair,
            actors: [Arc::downgrade(a), Arc::downgrade(b)],
            result,
            age: 0,
        });
        result
    }

    /// Age every entry, drop stale ones and recompute the rest.
    ///
    /// Returns how many entries were dropped.
    pub fn refresh(&mut self, world: &SharedWorld) -> usize {
        let expiry = self.expiry;
        // Upgrade before locking the world so the last reference to an actor
        // is never dropped under the lock
        let live: Vec<Option<(Arc<Actor>, Arc<Actor>)>> = self
            .requests
            .iter_mut()
            .map(|request| {
                let expired = request.age > expiry;
                request.age = request.age.saturating_add(1);
                if expired {
                    return None;
                }
                Some((request.actors[0].upgrade()?, request.actors[1].upgrade()?))
            })
            .collect();

        {
            let world = world.read();
            for (request, actors) in self.requests.iter_mut().zip(&live) {
                if let Some((a, b)) = actors {
                    request.result = has_line_of_sight(&world, a, b);
                }
            }
        }

        let before = self.requests.len();
        let mut keep = live.iter().map(Option::is_some);
        self.requests.retain(|_| keep.next().unwrap_or(false));
        let pruned = before - self.requests.len();
        if pruned > 0 {
            log::trace!("pruned {pruned} line-of-sight entries");
        }
        drop(live);
        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockingPolicy;

    const HALF: Vec3 = Vec3::new(29.0, 64.0, 29.0);

    fn setup() -> (Arc<SharedWorld>, Arc<Actor>, Arc<Actor>) {
        let world = Arc::new(SharedWorld::new(CollisionWorld::new(), LockingPolicy::AllowSharedLocks));
        let a = Actor::spawn(ActorId(1), &world, Vec3::ZERO, HALF, HALF.y);
        let b = Actor::spawn(ActorId(2), &world, Vec3::new(500.0, 0.0, 0.0), HALF, HALF.y);
        (world, a, b)
    }

    #[test]
    fn test_clear_and_blocked_sight() {
        let (world, a, b) = setup();
        assert!(has_line_of_sight(&world.read(), &a, &b));

        // Actors never block sight, walls do
        world
            .write()
            .add_box(Vec3::new(250.0, 100.0, 0.0), Vec3::new(10.0, 200.0, 200.0), CollisionGroups::WORLD);
        assert!(!has_line_of_sight(&world.read(), &a, &b));
    }

    #[test]
    fn test_cache_hit_is_symmetric() {
        let (world, a, b) = setup();
        let mut cache = LosCache::new(2);

        assert!(cache.get_or_compute(&a, &b, &world));
        // A wall appears, but the cached answer stands until a refresh
        world
            .write()
            .add_box(Vec3::new(250.0, 100.0, 0.0), Vec3::new(10.0, 200.0, 200.0), CollisionGroups::WORLD);
        assert!(cache.get_or_compute(&b, &a, &world));
        assert_eq!(cache.len(), 1);

        cache.refresh(&world);
        assert!(!cache.get_or_compute(&a, &b, &world));
    }

    #[test]
    fn test_unqueried_entries_expire() {
        let (world, a, b) = setup();
        let mut cache = LosCache::new(1);
        cache.get_or_compute(&a, &b, &world);

        assert_eq!(cache.refresh(&world), 0);
        assert_eq!(cache.refresh(&world), 0);
        assert_eq!(cache.refresh(&world), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lookup_resets_age() {
        let (world, a, b) = setup();
        let mut cache = LosCache::new(0);
        cache.get_or_compute(&a, &b, &world);

        for _ in 0..5 {
            cache.refresh(&world);
            cache.get_or_compute(&a, &b, &world);
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_dead_actor_is_pruned() {
        let (world, a, b) = setup();
        let mut cache = LosCache::new(10);
        cache.get_or_compute(&a, &b, &world);

        drop(b);
        assert_eq!(cache.refresh(&world), 1);
        assert!(cache.is_empty());
    }
}
