//! Island terrain: per-tile state, tree obstacles and erosion.
//!
//! Generation and erosion are driven only by the map seed, so every client
//! that builds a map from the same seed and applies the same number of
//! erosion steps holds identical tile states.

use bevy::prelude::*;
use fixedbitset::FixedBitSet;

use crate::game::engine::hex_grid::HexGrid;
use crate::game::engine::random::SeedRandom;

pub const TREE_KINDS: usize = 4;

/// Chance for a tile to carry a tree.
const TREE_CHANCE: f64 = 0.15;
/// Fraction of the half-diagonal inside which tiles are always visible.
const EROSION_RADIUS: f64 = 0.65;
const RAISED_CLUSTER_SIZE: usize = 5;
const RAISED_SEED_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TileState {
    Hidden = 0,
    Visible = 1,
    Glowing = 2,
    Shaking = 3,
    /// Fully submerged. Anything standing here sinks.
    Sinking = 4,
    Raised = 5,
}

impl TileState {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Walkable terrain, ignoring obstacles.
    pub fn is_walkable(self) -> bool {
        matches!(self, TileState::Visible | TileState::Glowing | TileState::Shaking)
    }
}

#[derive(Debug, Clone)]
pub struct GameMap {
    grid: HexGrid,
    seed: u64,
    tile_states: Vec<TileState>,
    tile_obstacles: Vec<Option<u8>>,
    /// Visible tiles bucketed by distance from the centre. Erosion eats the
    /// outermost bucket first.
    tile_rings: Vec<Vec<usize>>,
    passable_tile_count: usize,
    erode_random: SeedRandom,
    erode_step: u32,
}

impl GameMap {
    pub fn new(grid: HexGrid, seed: u64) -> Self {
        let mut random = SeedRandom::new(seed);
        let erode_random = random.clone();

        let tile_count = grid.tile_count();
        let mut tile_states = vec![TileState::Hidden; tile_count];
        let mut tile_obstacles = vec![None; tile_count];
        let mut tile_rings: Vec<Vec<usize>> = Vec::new();
        let mut passable_tile_count = 0;

        let half_width = grid.width as f64 / 2.0;
        let half_height = grid.height as f64 / 2.0;
        let max_mag = (grid.width as f64).hypot(grid.height as f64) / 2.0;
        let erosion_mag = max_mag * EROSION_RADIUS;

        for q in 0..grid.width {
            for r in 0..grid.height {
                let mag = (q as f64 - half_width).hypot(r as f64 - half_height);
                let Some(index) = grid.oddq_to_index(IVec2::new(q as i32, r as i32)) else {
                    continue;
                };

                let state = if mag > erosion_mag {
                    let erosion_chance = 0.5 + (erosion_mag - mag).abs() / erosion_mag;
                    if random.random() < erosion_chance {
                        TileState::Hidden
                    } else {
                        TileState::Visible
                    }
                } else {
                    TileState::Visible
                };

                if random.random() < TREE_CHANCE {
                    tile_obstacles[index] = Some(random.rand_range(TREE_KINDS) as u8);
                }

                if state != TileState::Hidden {
                    let ring = mag.floor() as usize;
                    if tile_rings.len() <= ring {
                        tile_rings.resize_with(ring + 1, Vec::new);
                    }
                    tile_rings[ring].push(index);
                    passable_tile_count += 1;
                }

                tile_states[index] = state;
            }
        }

        let mut map = Self {
            grid,
            seed,
            tile_states,
            tile_obstacles,
            tile_rings,
            passable_tile_count,
            erode_random,
            erode_step: 0,
        };
        map.generate_raised_tiles(&mut random);
        map
    }

    /// Raise small clusters of visible, tree-free tiles.
    fn generate_raised_tiles(&mut self, random: &mut SeedRandom) {
        let tile_count = self.grid.tile_count();
        let clusters = tile_count / 64;
        let mut visited = FixedBitSet::with_capacity(tile_count);
        let mut frontier: Vec<usize> = Vec::new();

        for _ in 0..clusters {
            let mut attempts = RAISED_SEED_ATTEMPTS;
            let start = loop {
                let index = random.rand_range(tile_count);
                attempts -= 1;
                if attempts == 0 {
                    return;
                }
                if self.tile_states[index] == TileState::Visible {
                    break index;
                }
            };

            frontier.push(start);
            let mut size = 0;

            while size < RAISED_CLUSTER_SIZE {
                let Some(current) = frontier.pop() else { break };

                if random.random() > 0.5
                    && !visited.contains(current)
                    && self.tile_obstacles[current].is_none()
                    && self.tile_states[current] == TileState::Visible
                {
                    self.tile_states[current] = TileState::Raised;
                    self.passable_tile_count -= 1;
                    visited.insert(current);
                    size += 1;
                    frontier.extend(self.grid.neighbor_indices(current));
                }
            }

            // Carry at most one pending tile into the next cluster.
            if frontier.len() > 1 {
                frontier.drain(..frontier.len() - 1);
            }
        }
    }

    /// One erosion step: shake or sink a random number of tiles from the
    /// outermost ring. Returns how many tiles changed state.
    pub fn erode(&mut self) -> usize {
        let max_eroded = self.tile_rings.len().div_ceil(5) * 3;
        let attempts = self.erode_random.rand_range(max_eroded);
        let mut changed = 0;

        for _ in 0..attempts {
            let Some(ring) = self.tile_rings.last_mut() else { break };
            if ring.is_empty() {
                self.tile_rings.pop();
                continue;
            }

            let ring_index = self.erode_random.rand_range(ring.len());
            let index = ring[ring_index];

            match self.tile_states[index] {
                TileState::Visible => {
                    self.passable_tile_count -= 1;
                    self.tile_states[index] = TileState::Shaking;
                    changed += 1;
                }
                TileState::Raised => {
                    self.tile_states[index] = TileState::Shaking;
                    changed += 1;
                }
                TileState::Shaking => {
                    ring.swap_remove(ring_index);
                    self.tile_states[index] = TileState::Sinking;
                    changed += 1;
                }
                _ => {}
            }

            if ring.is_empty() {
                self.tile_rings.pop();
            }
        }

        self.erode_step += 1;
        changed
    }

    /// A visible, tree-free tile away from both the centre and the eroding
    /// edge. `None` when nothing suitable turns up.
    pub fn random_habitable_tile_index(&self, random: &mut SeedRandom) -> Option<usize> {
        for _ in 0..self.grid.tile_count() {
            if self.tile_rings.is_empty() {
                break;
            }

            let min_ring = self.tile_rings.len() / 4;
            let max_ring = self.tile_rings.len().saturating_sub(10).max(2);
            let ring_index = random.rand_between(min_ring, max_ring);

            let Some(ring) = self.tile_rings.get(ring_index).filter(|r| !r.is_empty()) else {
                continue;
            };
            let index = ring[random.rand_range(ring.len())];

            if self.tile_states[index] == TileState::Visible && self.tile_obstacles[index].is_none() {
                return Some(index);
            }
        }

        warn!("[MAP] No habitable tile index found (seed {}, step {})", self.seed, self.erode_step);
        None
    }

    /// A passable tile on a random ring around `index` no farther than
    /// `max_radius`. Falls back to `index` itself.
    pub fn random_nearby_passable_tile_index(
        &self,
        index: usize,
        max_radius: u32,
        random: &mut SeedRandom,
    ) -> usize {
        let radius = random.rand_range(max_radius.saturating_sub(1) as usize) as u32 + 1;
        let mut ring = self.grid.ring_indices(index, radius);

        while !ring.is_empty() {
            let candidate = ring.swap_remove(random.rand_range(ring.len()));
            if self.is_passable(candidate) {
                return candidate;
            }
        }

        index
    }

    // ------------------------------------------------------------------
    // Tile access
    // ------------------------------------------------------------------

    pub fn grid(&self) -> &HexGrid {
        &self.grid
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn tile_state(&self, index: usize) -> TileState {
        self.tile_states.get(index).copied().unwrap_or(TileState::Hidden)
    }

    pub fn set_tile_state(&mut self, index: usize, state: TileState) {
        if let Some(tile) = self.tile_states.get_mut(index) {
            *tile = state;
        }
    }

    pub fn tile_obstacle(&self, index: usize) -> Option<u8> {
        self.tile_obstacles.get(index).copied().flatten()
    }

    /// Walkable state with no tree on it.
    pub fn is_passable(&self, index: usize) -> bool {
        self.tile_state(index).is_walkable() && self.tile_obstacle(index).is_none()
    }

    pub fn tile_states(&self) -> &[TileState] {
        &self.tile_states
    }

    /// Obstacle tiles with their tree kind.
    pub fn obstacles(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        self.tile_obstacles
            .iter()
            .enumerate()
            .filter_map(|(index, obstacle)| obstacle.map(|kind| (index, kind)))
    }

    pub fn ring_count(&self) -> usize {
        self.tile_rings.len()
    }

    pub fn passable_tile_count(&self) -> usize {
        self.passable_tile_count
    }

    pub fn erode_step(&self) -> u32 {
        self.erode_step
    }
}
