//! Flat-top hex grid with odd-q offset addressing.
//!
//! Tiles are addressed by a flat index `q * height + r` where `q` is the
//! column and `r` the row. Odd columns are shifted half a cell down. World
//! positions are centred on the middle of the grid with +y pointing up.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use bevy::prelude::*;
use fixedbitset::FixedBitSet;
use smallvec::SmallVec;

const SQRT_THREE: f32 = 1.732_050_8;

/// Cube coordinate offsets of the six neighbours.
const CUBE_DIRECTIONS: [IVec3; 6] = [
    IVec3::new(1, -1, 0),
    IVec3::new(1, 0, -1),
    IVec3::new(0, 1, -1),
    IVec3::new(-1, 1, 0),
    IVec3::new(-1, 0, 1),
    IVec3::new(0, -1, 1),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HexGrid {
    pub width: u32,
    pub height: u32,
    pub cell_size: f32,
    pub cell_height: f32,
    pub pixel_width: f32,
    pub pixel_height: f32,
}

impl HexGrid {
    pub fn new(width: u32, height: u32, cell_size: f32) -> Self {
        let cell_height = SQRT_THREE / 2.0 * cell_size;
        Self {
            width,
            height,
            cell_size,
            cell_height,
            pixel_width: width as f32 * cell_size * 0.75 + 0.25 * cell_size,
            pixel_height: height as f32 * cell_height + cell_height * 0.5,
        }
    }

    pub fn tile_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    /// World rectangle covered by the grid.
    pub fn world_bounds(&self) -> Rect {
        Rect::from_center_size(Vec2::ZERO, Vec2::new(self.pixel_width, self.pixel_height))
    }

    // ------------------------------------------------------------------
    // Coordinate conversions
    // ------------------------------------------------------------------

    pub fn index_to_oddq(&self, index: usize) -> IVec2 {
        let height = self.height as usize;
        IVec2::new((index / height) as i32, (index % height) as i32)
    }

    pub fn oddq_to_index(&self, oddq: IVec2) -> Option<usize> {
        let (q, r) = (oddq.x, oddq.y);
        if q >= 0 && (q as u32) < self.width && r >= 0 && (r as u32) < self.height {
            Some(q as usize * self.height as usize + r as usize)
        } else {
            None
        }
    }

    pub fn oddq_to_cube(oddq: IVec2) -> IVec3 {
        let (q, r) = (oddq.x, oddq.y);
        let z = r - (q - (q & 1)) / 2;
        IVec3::new(q, -q - z, z)
    }

    pub fn cube_to_oddq(cube: IVec3) -> IVec2 {
        IVec2::new(cube.x, cube.z + (cube.x - (cube.x & 1)) / 2)
    }

    pub fn index_to_cube(&self, index: usize) -> IVec3 {
        Self::oddq_to_cube(self.index_to_oddq(index))
    }

    pub fn cube_to_index(&self, cube: IVec3) -> Option<usize> {
        self.oddq_to_index(Self::cube_to_oddq(cube))
    }

    /// Centre of a tile in world space.
    pub fn index_to_position(&self, index: usize) -> Vec2 {
        let oddq = self.index_to_oddq(index);
        let px = self.cell_size * (0.5 + 0.75 * oddq.x as f32);
        let py = self.cell_height * (0.5 + oddq.y as f32 + 0.5 * (oddq.x & 1) as f32);
        Vec2::new(px - self.pixel_width / 2.0, self.pixel_height / 2.0 - py)
    }

    /// Tile under a world position, or `None` off the grid.
    pub fn position_to_index(&self, position: Vec2) -> Option<usize> {
        let size = self.cell_size / 2.0;
        let lx = position.x + self.pixel_width / 2.0 - self.cell_size / 2.0;
        let ly = self.pixel_height / 2.0 - position.y - self.cell_height / 2.0;

        let q = (2.0 / 3.0 * lx) / size;
        let r = (-lx / 3.0 + SQRT_THREE / 3.0 * ly) / size;

        let cube = round_cube(Vec3::new(q, -q - r, r));
        self.cube_to_index(cube)
    }

    // ------------------------------------------------------------------
    // Neighbourhoods
    // ------------------------------------------------------------------

    pub fn neighbor_indices(&self, index: usize) -> SmallVec<[usize; 6]> {
        let cube = self.index_to_cube(index);
        CUBE_DIRECTIONS
            .iter()
            .filter_map(|dir| self.cube_to_index(cube + *dir))
            .collect()
    }

    /// Tiles at exactly `radius` steps from `index`, skipping off-grid ones.
    pub fn ring_indices(&self, index: usize, radius: u32) -> Vec<usize> {
        let center = self.index_to_cube(index);
        if radius == 0 {
            return vec![index];
        }

        let radius = radius as i32;
        let mut ring = Vec::with_capacity(6 * radius as usize);
        let mut cursor = center + CUBE_DIRECTIONS[4] * radius;

        for direction in CUBE_DIRECTIONS {
            for _ in 0..radius {
                if let Some(tile) = self.cube_to_index(cursor) {
                    ring.push(tile);
                }
                cursor += direction;
            }
        }

        ring
    }

    pub fn distance(&self, a: usize, b: usize) -> u32 {
        let d = (self.index_to_cube(a) - self.index_to_cube(b)).abs();
        ((d.x + d.y + d.z) / 2) as u32
    }

    // ------------------------------------------------------------------
    // Path finding
    // ------------------------------------------------------------------

    /// A* over tile indices. The start tile is never tested for
    /// passability; an impassable destination short-circuits to no path.
    /// Returns the full tile sequence including both ends, or empty.
    pub fn path(&self, from: usize, to: usize, passable: impl Fn(usize) -> bool) -> Vec<usize> {
        let count = self.tile_count();
        if from >= count || to >= count || !passable(to) {
            return Vec::new();
        }
        if from == to {
            return vec![from];
        }

        let mut closed = FixedBitSet::with_capacity(count);
        let mut cost = vec![u32::MAX; count];
        let mut came_from = vec![usize::MAX; count];
        let mut frontier = BinaryHeap::new();
        // Insertion counter keeps ties in a stable order.
        let mut sequence = 0u64;

        cost[from] = 0;
        frontier.push(Reverse((self.distance(from, to), sequence, from)));

        while let Some(Reverse((_, _, current))) = frontier.pop() {
            if current == to {
                let mut path = vec![to];
                let mut cursor = to;
                while cursor != from {
                    cursor = came_from[cursor];
                    path.push(cursor);
                }
                path.reverse();
                return path;
            }

            if closed.contains(current) {
                continue;
            }
            closed.insert(current);

            for neighbor in self.neighbor_indices(current) {
                if closed.contains(neighbor) || !passable(neighbor) {
                    continue;
                }

                let next_cost = cost[current] + 1;
                if next_cost < cost[neighbor] {
                    cost[neighbor] = next_cost;
                    came_from[neighbor] = current;
                    sequence += 1;
                    frontier.push(Reverse((next_cost + self.distance(neighbor, to), sequence, neighbor)));
                }
            }
        }

        Vec::new()
    }

    /// Path turning points after the start tile, always ending at `to`.
    /// Straight runs collapse into their last tile. Empty when unreachable;
    /// `[to]` when already there.
    pub fn waypoints(&self, from: usize, to: usize, passable: impl Fn(usize) -> bool) -> Vec<usize> {
        let path = self.path(from, to, passable);
        if path.len() <= 1 {
            return path;
        }

        let cubes: Vec<IVec3> = path.iter().map(|&i| self.index_to_cube(i)).collect();
        let mut waypoints = Vec::new();

        for i in 1..path.len() {
            let is_last = i + 1 == path.len();
            if is_last || cubes[i] - cubes[i - 1] != cubes[i + 1] - cubes[i] {
                waypoints.push(path[i]);
            }
        }

        waypoints
    }
}

fn round_cube(cube: Vec3) -> IVec3 {
    let rounded = cube.round();
    let delta = (rounded - cube).abs();
    let mut result = rounded.as_ivec3();

    if delta.x > delta.y && delta.x > delta.z {
        result.x = -result.y - result.z;
    } else if delta.y > delta.z {
        result.y = -result.x - result.z;
    } else {
        result.z = -result.x - result.y;
    }

    result
}
