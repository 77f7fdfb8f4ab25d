//! 2D collision system.
//!
//! Owns the quad-tree and the registry of collidable entities. Each frame
//! dynamic colliders are re-indexed, every collidable inside the active
//! limit queries its neighbours, and each intersecting unordered pair is
//! reported once. Both sides of a pair receive one [`CollisionEvent`] per
//! registered handler.
//!
//! The system only holds registrations; the entities themselves are owned
//! by the systems that spawned them.

use bevy::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use super::clock::Clock;
use super::geometry::{rect_intersects_rect, PlacedShape};
use super::quad_tree::QuadTree;
use crate::game::components::{Collider, Position};
use crate::profile_log;
use snowball_macros::profile;

/// Handle returned by [`CollisionSystem::handle_collisions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// Which system reacts to a collision notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollisionHandler {
    Snowball,
    Player,
    Drop,
}

/// `entity`'s collider intersected `other`'s this frame.
#[derive(Event, Message, Debug, Clone, Copy)]
pub struct CollisionEvent {
    pub entity: Entity,
    pub other: Entity,
    pub handler: CollisionHandler,
    pub id: HandlerId,
}

/// Positions mirrored for a debug overlay when debug visuals are on.
#[derive(Debug, Clone, Default)]
pub struct DebugOverlay {
    pub limit: Option<Rect>,
    pub colliders: Vec<(Entity, PlacedShape)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionStats {
    pub indexed: usize,
    pub pairs_tested: usize,
    pub pairs_colliding: usize,
}

#[derive(Resource, Debug)]
pub struct CollisionSystem {
    collidables: Vec<Entity>,
    registered: FxHashSet<Entity>,
    handlers: FxHashMap<Entity, SmallVec<[(HandlerId, CollisionHandler); 2]>>,
    next_handler: u64,
    quad_tree: Option<QuadTree<Entity>>,
    statics_indexed: FxHashSet<Entity>,
    limit: Option<Rect>,
    max_objects: usize,
    max_depth: usize,
    debug_visuals: bool,
    debug_overlay: DebugOverlay,
    stats: CollisionStats,
}

impl Default for CollisionSystem {
    fn default() -> Self {
        Self::new(10, 6)
    }
}

impl CollisionSystem {
    pub fn new(max_objects: usize, max_depth: usize) -> Self {
        Self {
            collidables: Vec::new(),
            registered: FxHashSet::default(),
            handlers: FxHashMap::default(),
            next_handler: 0,
            quad_tree: None,
            statics_indexed: FxHashSet::default(),
            limit: None,
            max_objects,
            max_depth,
            debug_visuals: false,
            debug_overlay: DebugOverlay::default(),
            stats: CollisionStats::default(),
        }
    }

    // ------------------------------------------------------------------
    // Bounds
    // ------------------------------------------------------------------

    /// Set the world bounds, rebuilding the quad-tree. Static colliders are
    /// indexed again on the next update.
    pub fn set_bounds(&mut self, bounds: Rect) {
        self.quad_tree = Some(QuadTree::new(bounds, self.max_objects, self.max_depth));
        self.statics_indexed.clear();
    }

    pub fn bounds(&self) -> Option<Rect> {
        self.quad_tree.as_ref().map(|tree| tree.bounds())
    }

    /// Only collidables overlapping `limit` are tested. `None` tests
    /// everything inside the bounds.
    pub fn set_limit(&mut self, limit: Option<Rect>) {
        self.limit = limit;
    }

    pub fn limit(&self) -> Option<Rect> {
        self.limit
    }

    pub fn quad_tree(&self) -> Option<&QuadTree<Entity>> {
        self.quad_tree.as_ref()
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Returns false if already registered.
    pub fn add_collidable(&mut self, entity: Entity) -> bool {
        if !self.registered.insert(entity) {
            return false;
        }
        self.collidables.push(entity);
        true
    }

    /// Returns false if not registered.
    pub fn remove_collidable(&mut self, entity: Entity) -> bool {
        if !self.registered.remove(&entity) {
            return false;
        }
        self.collidables.retain(|e| *e != entity);

        if self.statics_indexed.remove(&entity) {
            if let Some(tree) = self.quad_tree.as_mut() {
                tree.remove(entity);
            }
        }
        true
    }

    pub fn is_collidable(&self, entity: Entity) -> bool {
        self.registered.contains(&entity)
    }

    pub fn len(&self) -> usize {
        self.collidables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collidables.is_empty()
    }

    /// Register a handler for collisions involving `entity`.
    pub fn handle_collisions(&mut self, entity: Entity, handler: CollisionHandler) -> HandlerId {
        let id = HandlerId(self.next_handler);
        self.next_handler += 1;
        self.handlers.entry(entity).or_default().push((id, handler));
        id
    }

    /// Returns false if `id` was already unsubscribed.
    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        let Some((&entity, list)) = self
            .handlers
            .iter_mut()
            .find(|(_, list)| list.iter().any(|(h, _)| *h == id))
        else {
            return false;
        };

        list.retain(|(h, _)| *h != id);
        if list.is_empty() {
            self.handlers.remove(&entity);
        }
        true
    }

    /// Drop every handler registered for `entity`.
    pub fn unsubscribe_all(&mut self, entity: Entity) {
        self.handlers.remove(&entity);
    }

    pub fn handlers_for(&self, entity: Entity) -> &[(HandlerId, CollisionHandler)] {
        self.handlers.get(&entity).map(|list| list.as_slice()).unwrap_or(&[])
    }

    /// Drop every registration, handler and the quad-tree.
    pub fn teardown(&mut self) {
        self.collidables.clear();
        self.registered.clear();
        self.handlers.clear();
        self.statics_indexed.clear();
        self.quad_tree = None;
        self.limit = None;
        self.debug_overlay = DebugOverlay::default();
    }

    // ------------------------------------------------------------------
    // Debug
    // ------------------------------------------------------------------

    pub fn set_debug_visuals(&mut self, enabled: bool) {
        self.debug_visuals = enabled;
        if !enabled {
            self.debug_overlay = DebugOverlay::default();
        }
    }

    pub fn debug_overlay(&self) -> &DebugOverlay {
        &self.debug_overlay
    }

    pub fn stats(&self) -> CollisionStats {
        self.stats
    }

    // ------------------------------------------------------------------
    // Detection
    // ------------------------------------------------------------------

    /// Re-index colliders and return each intersecting unordered pair once.
    ///
    /// `shape_of` resolves a collidable to its placed shape and whether it
    /// is static; unresolvable entities are skipped for this frame.
    pub fn detect_pairs(
        &mut self,
        shape_of: impl Fn(Entity) -> Option<(PlacedShape, bool)>,
    ) -> Vec<(Entity, Entity)> {
        let Some(tree) = self.quad_tree.as_mut() else {
            return Vec::new();
        };

        tree.clear_dynamic();

        let mut placed: FxHashMap<Entity, PlacedShape> = FxHashMap::default();
        let mut order = Vec::with_capacity(self.collidables.len());

        for &entity in &self.collidables {
            let Some((shape, is_static)) = shape_of(entity) else { continue };

            if is_static {
                if self.statics_indexed.insert(entity) {
                    tree.insert(entity, shape.bounds(), true);
                }
            } else {
                tree.insert(entity, shape.bounds(), false);
            }

            placed.insert(entity, shape);
            order.push(entity);
        }

        let area = self.limit.unwrap_or_else(|| tree.bounds());
        let mut evaluated: FxHashSet<(Entity, Entity)> = FxHashSet::default();
        let mut pairs = Vec::new();
        let mut near = Vec::new();

        for entity in order {
            let shape = placed[&entity];
            if !rect_intersects_rect(&area, &shape.bounds()) {
                continue;
            }

            near.clear();
            tree.objects_near(&shape.bounds(), &mut near);

            for &other in &near {
                if other == entity {
                    continue;
                }

                let key = if entity < other { (entity, other) } else { (other, entity) };
                if !evaluated.insert(key) {
                    continue;
                }

                let Some(other_shape) = placed.get(&other) else { continue };
                if shape.intersects(other_shape) {
                    pairs.push(key);
                }
            }
        }

        self.stats = CollisionStats {
            indexed: placed.len(),
            pairs_tested: evaluated.len(),
            pairs_colliding: pairs.len(),
        };

        if self.debug_visuals {
            self.debug_overlay.limit = self.limit;
            self.debug_overlay.colliders = placed.into_iter().collect();
        }

        pairs
    }

    /// One event per handler on each side of each pair.
    pub fn notifications(&self, pairs: &[(Entity, Entity)]) -> Vec<CollisionEvent> {
        let mut events = Vec::new();
        for &(a, b) in pairs {
            for (entity, other) in [(a, b), (b, a)] {
                for &(id, handler) in self.handlers_for(entity) {
                    events.push(CollisionEvent { entity, other, handler, id });
                }
            }
        }
        events
    }

    /// Collidables whose indexed bounds overlap `area`.
    pub fn query_area(&self, area: Rect) -> Vec<Entity> {
        let mut found = Vec::new();
        if let Some(tree) = self.quad_tree.as_ref() {
            tree.query(&area, &mut found);
        }
        found
    }
}

#[profile(2)]
pub fn collision_update(
    clock: Res<Clock>,
    mut collisions: ResMut<CollisionSystem>,
    colliders: Query<(&Position, &Collider)>,
    mut events: MessageWriter<CollisionEvent>,
) {
    let pairs = collisions.detect_pairs(|entity| {
        colliders
            .get(entity)
            .ok()
            .map(|(position, collider)| (collider.placed(position), collider.is_static))
    });

    if pairs.is_empty() {
        return;
    }

    events.write_batch(collisions.notifications(&pairs));

    profile_log!(
        clock,
        "[COLLISION] indexed={} tested={} colliding={}",
        collisions.stats().indexed,
        collisions.stats().pairs_tested,
        collisions.stats().pairs_colliding
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::engine::geometry::Shape;

    fn entity(n: u64) -> Entity {
        Entity::from_bits(n)
    }

    fn system_with_bounds() -> CollisionSystem {
        let mut system = CollisionSystem::new(2, 6);
        system.set_bounds(Rect::from_center_size(Vec2::ZERO, Vec2::splat(2048.0)));
        system
    }

    #[test]
    fn test_no_bounds_is_noop() {
        let mut system = CollisionSystem::default();
        system.add_collidable(entity(1));
        system.add_collidable(entity(2));
        let pairs = system.detect_pairs(|_| Some((Shape::circle(10.0).at(Vec2::ZERO), false)));
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut system = system_with_bounds();
        assert!(system.add_collidable(entity(1)));
        assert!(!system.add_collidable(entity(1)));
        assert_eq!(system.len(), 1);
        assert!(system.remove_collidable(entity(1)));
        assert!(!system.remove_collidable(entity(1)));
        assert!(system.is_empty());
    }

    #[test]
    fn test_pairs_are_unique_regardless_of_order() {
        let mut rng = fastrand::Rng::with_seed(11);
        let mut shapes = FxHashMap::default();
        let mut system = system_with_bounds();

        // A dense cluster so the tree splits and neighbours repeat.
        for n in 1..=60u64 {
            let center = Vec2::new(rng.f32() * 200.0 - 100.0, rng.f32() * 200.0 - 100.0);
            shapes.insert(entity(n), Shape::circle(8.0 + rng.f32() * 8.0).at(center));
            system.add_collidable(entity(n));
        }

        let pairs = system.detect_pairs(|e| shapes.get(&e).map(|s| (*s, false)));

        let unique: FxHashSet<_> = pairs.iter().copied().collect();
        assert_eq!(unique.len(), pairs.len());

        // Brute force agrees.
        let mut expected = 0;
        let all: Vec<_> = shapes.iter().collect();
        for i in 0..all.len() {
            for j in (i + 1)..all.len() {
                if all[i].1.intersects(all[j].1) {
                    expected += 1;
                    let (a, b) = (*all[i].0, *all[j].0);
                    let key = if a < b { (a, b) } else { (b, a) };
                    assert!(unique.contains(&key));
                }
            }
        }
        assert_eq!(pairs.len(), expected);
    }

    #[test]
    fn test_notifications_are_symmetric() {
        let mut system = system_with_bounds();
        let (a, b) = (entity(1), entity(2));
        system.add_collidable(a);
        system.add_collidable(b);
        system.handle_collisions(a, CollisionHandler::Player);
        system.handle_collisions(b, CollisionHandler::Snowball);
        system.handle_collisions(b, CollisionHandler::Drop);

        let pairs = system.detect_pairs(|e| {
            let x = if e == a { 0.0 } else { 5.0 };
            Some((Shape::circle(4.0).at(Vec2::new(x, 0.0)), false))
        });
        assert_eq!(pairs.len(), 1);

        let events = system.notifications(&pairs);
        assert_eq!(events.iter().filter(|e| e.entity == a && e.other == b).count(), 1);
        assert_eq!(events.iter().filter(|e| e.entity == b && e.other == a).count(), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let mut system = system_with_bounds();
        let a = entity(1);
        let first = system.handle_collisions(a, CollisionHandler::Player);
        let second = system.handle_collisions(a, CollisionHandler::Drop);
        assert!(system.unsubscribe(first));
        assert!(!system.unsubscribe(first));
        assert_eq!(system.handlers_for(a).len(), 1);
        assert!(system.unsubscribe(second));
        assert!(system.handlers_for(a).is_empty());
    }

    #[test]
    fn test_static_colliders_survive_frames() {
        let mut system = system_with_bounds();
        let tree = entity(1);
        let walker = entity(2);
        system.add_collidable(tree);
        system.add_collidable(walker);

        for frame in 0..3 {
            let pairs = system.detect_pairs(|e| {
                if e == tree {
                    Some((Shape::rectangle(20.0, 20.0).at(Vec2::ZERO), true))
                } else {
                    Some((Shape::circle(4.0).at(Vec2::new(frame as f32 * 4.0, 0.0)), false))
                }
            });
            assert_eq!(pairs.len(), 1, "frame {}", frame);
        }
        assert_eq!(system.quad_tree().map(|t| t.len()), Some(2));

        system.remove_collidable(tree);
        let pairs = system.detect_pairs(|_| Some((Shape::circle(4.0).at(Vec2::ZERO), false)));
        assert!(pairs.is_empty());
        assert_eq!(system.quad_tree().map(|t| t.len()), Some(1));
    }

    #[test]
    fn test_limit_skips_distant_collidables() {
        let mut system = system_with_bounds();
        let (a, b) = (entity(1), entity(2));
        system.add_collidable(a);
        system.add_collidable(b);
        system.set_limit(Some(Rect::from_center_size(Vec2::ZERO, Vec2::splat(100.0))));

        let far = |_: Entity| Some((Shape::circle(5.0).at(Vec2::new(600.0, 600.0)), false));
        assert!(system.detect_pairs(far).is_empty());

        system.set_limit(None);
        assert_eq!(system.detect_pairs(far).len(), 1);
    }

    #[test]
    fn test_teardown_clears_everything() {
        let mut system = system_with_bounds();
        system.add_collidable(entity(1));
        system.handle_collisions(entity(1), CollisionHandler::Player);
        system.teardown();
        assert!(system.is_empty());
        assert!(system.quad_tree().is_none());
        assert!(system.handlers_for(entity(1)).is_empty());
    }
}
