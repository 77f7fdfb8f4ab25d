//! Quad-tree spatial index for collision candidate pruning.
//!
//! # Placement
//!
//! An object is stored in the deepest node whose bounds fully contain the
//! object's bounds. Objects straddling a split line stay in the parent.
//! A node splits into four quadrants once it holds more than `max_objects`
//! and is shallower than `max_depth`.
//!
//! # Static vs dynamic
//!
//! Dynamic objects move every frame, so the collision system calls
//! [`QuadTree::clear_dynamic`] and reinserts them. Static objects (trees)
//! are inserted once and survive `clear_dynamic`.

use bevy::prelude::*;

use super::geometry::{rect_contains_rect, rect_intersects_rect};

#[derive(Debug, Clone, Copy)]
struct Stored<T> {
    item: T,
    bounds: Rect,
    is_static: bool,
}

#[derive(Debug, Clone)]
pub struct QuadTree<T> {
    depth: usize,
    bounds: Rect,
    max_objects: usize,
    max_depth: usize,
    objects: Vec<Stored<T>>,
    nodes: Option<Box<[QuadTree<T>; 4]>>,
}

impl<T: Copy + PartialEq> QuadTree<T> {
    pub fn new(bounds: Rect, max_objects: usize, max_depth: usize) -> Self {
        Self::with_depth(0, bounds, max_objects, max_depth)
    }

    fn with_depth(depth: usize, bounds: Rect, max_objects: usize, max_depth: usize) -> Self {
        Self {
            depth,
            bounds,
            max_objects,
            max_depth,
            objects: Vec::new(),
            nodes: None,
        }
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Total number of stored objects in this node and below.
    pub fn len(&self) -> usize {
        let below = self
            .nodes
            .as_ref()
            .map(|nodes| nodes.iter().map(|n| n.len()).sum())
            .unwrap_or(0);
        self.objects.len() + below
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deepest level that currently holds nodes.
    pub fn depth_in_use(&self) -> usize {
        match &self.nodes {
            Some(nodes) => nodes.iter().map(|n| n.depth_in_use()).max().unwrap_or(self.depth),
            None => self.depth,
        }
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        self.nodes = None;
    }

    /// Drop every dynamic object, keeping static ones in place. Subtrees left
    /// without any object are collapsed.
    pub fn clear_dynamic(&mut self) {
        self.objects.retain(|o| o.is_static);

        if let Some(nodes) = self.nodes.as_mut() {
            for node in nodes.iter_mut() {
                node.clear_dynamic();
            }
            if nodes.iter().all(|n| n.is_empty()) {
                self.nodes = None;
            }
        }
    }

    pub fn insert(&mut self, item: T, bounds: Rect, is_static: bool) {
        self.place(Stored { item, bounds, is_static });

        if self.objects.len() > self.max_objects && self.depth < self.max_depth {
            self.redistribute();
        }
    }

    /// Remove one stored instance of `item`. Returns false when absent.
    pub fn remove(&mut self, item: T) -> bool {
        if let Some(index) = self.objects.iter().position(|o| o.item == item) {
            self.objects.swap_remove(index);
            return true;
        }

        match self.nodes.as_mut() {
            Some(nodes) => nodes.iter_mut().any(|node| node.remove(item)),
            None => false,
        }
    }

    /// Collision candidates for an object with `bounds`: the objects of every
    /// node on the path to the deepest node containing `bounds`.
    ///
    /// Objects in sibling subtrees are not returned. A pair split across
    /// levels is still found from the deeper object's side.
    pub fn objects_near(&self, bounds: &Rect, out: &mut Vec<T>) {
        if let Some(quadrant) = self.quadrant_for(bounds) {
            if let Some(nodes) = self.nodes.as_ref() {
                nodes[quadrant].objects_near(bounds, out);
            }
        }

        out.extend(self.objects.iter().map(|o| o.item));
    }

    /// Every object whose stored bounds overlap `area`.
    pub fn query(&self, area: &Rect, out: &mut Vec<T>) {
        if !rect_intersects_rect(&self.bounds, area) && self.depth > 0 {
            return;
        }

        out.extend(
            self.objects
                .iter()
                .filter(|o| rect_intersects_rect(&o.bounds, area))
                .map(|o| o.item),
        );

        if let Some(nodes) = self.nodes.as_ref() {
            for node in nodes.iter() {
                node.query(area, out);
            }
        }
    }

    fn place(&mut self, stored: Stored<T>) {
        match self.quadrant_for(&stored.bounds) {
            Some(quadrant) => {
                if let Some(nodes) = self.nodes.as_mut() {
                    nodes[quadrant].insert(stored.item, stored.bounds, stored.is_static);
                }
            }
            None => self.objects.push(stored),
        }
    }

    fn quadrant_for(&self, bounds: &Rect) -> Option<usize> {
        let nodes = self.nodes.as_ref()?;
        nodes.iter().position(|node| rect_contains_rect(&node.bounds, bounds))
    }

    fn split(&mut self) {
        let center = self.bounds.center();
        let quarter = self.bounds.size() / 4.0;
        let half = self.bounds.size() / 2.0;
        let depth = self.depth + 1;

        let child = |dx: f32, dy: f32| {
            let c = center + Vec2::new(dx * quarter.x, dy * quarter.y);
            QuadTree::with_depth(depth, Rect::from_center_size(c, half), self.max_objects, self.max_depth)
        };

        // Order: top-left, bottom-left, top-right, bottom-right (y up).
        self.nodes = Some(Box::new([
            child(-1.0, 1.0),
            child(-1.0, -1.0),
            child(1.0, 1.0),
            child(1.0, -1.0),
        ]));
    }

    fn redistribute(&mut self) {
        if self.nodes.is_none() {
            self.split();
        }

        let objects = std::mem::take(&mut self.objects);
        for stored in objects {
            self.place(stored);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> Rect {
        Rect::from_center_size(Vec2::ZERO, Vec2::splat(1024.0))
    }

    fn small_at(x: f32, y: f32) -> Rect {
        Rect::from_center_size(Vec2::new(x, y), Vec2::splat(4.0))
    }

    #[test]
    fn test_no_split_under_capacity() {
        let mut tree = QuadTree::new(world(), 10, 6);
        for i in 0..10 {
            tree.insert(i, small_at(i as f32 * 10.0 + 100.0, 100.0), false);
        }
        assert_eq!(tree.len(), 10);
        assert_eq!(tree.depth_in_use(), 0);
    }

    #[test]
    fn test_split_pushes_objects_into_quadrants() {
        let mut tree = QuadTree::new(world(), 2, 6);
        tree.insert(1u32, small_at(-300.0, 300.0), false);
        tree.insert(2, small_at(300.0, 300.0), false);
        tree.insert(3, small_at(300.0, -300.0), false);

        assert_eq!(tree.len(), 3);
        assert!(tree.depth_in_use() >= 1);
        assert!(tree.objects.is_empty());
    }

    #[test]
    fn test_straddling_object_stays_at_root() {
        let mut tree = QuadTree::new(world(), 1, 6);
        tree.insert(1u32, small_at(-300.0, 300.0), false);
        tree.insert(2, small_at(300.0, 300.0), false);
        tree.insert(3, small_at(0.0, 0.0), false);

        assert_eq!(tree.objects.len(), 1);
        assert_eq!(tree.objects[0].item, 3);
    }

    #[test]
    fn test_depth_is_capped() {
        let mut tree = QuadTree::new(world(), 1, 3);
        for i in 0..50u32 {
            tree.insert(i, small_at(400.0 + (i % 5) as f32, 400.0), false);
        }
        assert_eq!(tree.len(), 50);
        assert_eq!(tree.depth_in_use(), 3);
    }

    #[test]
    fn test_clear_dynamic_keeps_static() {
        let mut tree = QuadTree::new(world(), 2, 6);
        tree.insert(100u32, small_at(-200.0, -200.0), true);
        for i in 0..20u32 {
            tree.insert(i, small_at(i as f32 * 20.0 - 200.0, 150.0), false);
        }

        tree.clear_dynamic();
        assert_eq!(tree.len(), 1);

        let mut near = Vec::new();
        tree.objects_near(&small_at(-200.0, -200.0), &mut near);
        assert_eq!(near, vec![100]);

        tree.clear();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_objects_near_includes_ancestors() {
        let mut tree = QuadTree::new(world(), 1, 6);
        tree.insert(1u32, small_at(-300.0, 300.0), false);
        tree.insert(2, small_at(300.0, -300.0), false);
        tree.insert(3, small_at(0.0, 0.0), false);

        let mut near = Vec::new();
        tree.objects_near(&small_at(-300.0, 300.0), &mut near);
        assert!(near.contains(&1));
        assert!(near.contains(&3));
        assert!(!near.contains(&2));
    }

    #[test]
    fn test_query_descends_into_overlapping_children() {
        let mut tree = QuadTree::new(world(), 1, 6);
        tree.insert(1u32, small_at(-20.0, 20.0), false);
        tree.insert(2, small_at(20.0, -20.0), false);
        tree.insert(3, small_at(400.0, 400.0), false);

        let mut found = Vec::new();
        tree.query(&Rect::from_center_size(Vec2::ZERO, Vec2::splat(100.0)), &mut found);
        found.sort();
        assert_eq!(found, vec![1, 2]);
    }

    #[test]
    fn test_remove() {
        let mut tree = QuadTree::new(world(), 1, 6);
        for i in 0..8u32 {
            tree.insert(i, small_at(i as f32 * 100.0 - 400.0, 200.0), false);
        }
        assert!(tree.remove(5));
        assert!(!tree.remove(5));
        assert_eq!(tree.len(), 7);
    }
}
