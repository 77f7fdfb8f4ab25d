use bevy::prelude::*;

use crate::game::components::{Collider, Destination, Path, Position, Tree};
use crate::game::engine::collision::CollisionSystem;
use crate::game::engine::geometry::Shape;
use crate::game::engine::hex_grid::HexGrid;
use crate::game::map::{GameMap, TileState};
use crate::game::systems::client::ClientSystem;

/// The marker floats this far below the destination point.
const MARKER_OFFSET: f32 = 20.0;

/// Where the client player is walking to.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DestinationMarker {
    pub visible: bool,
    pub position: Vec2,
}

/// Owns the hex grid, the current [`GameMap`] and its tree entities.
#[derive(Resource, Debug)]
pub struct MapSystem {
    grid: HexGrid,
    map: Option<GameMap>,
    trees: Vec<Entity>,
    marker: DestinationMarker,
}

impl MapSystem {
    pub fn new(grid: HexGrid) -> Self {
        Self { grid, map: None, trees: Vec::new(), marker: DestinationMarker::default() }
    }

    pub fn grid(&self) -> &HexGrid {
        &self.grid
    }

    /// `None` until the first rebuild.
    pub fn map(&self) -> Option<&GameMap> {
        self.map.as_ref()
    }

    pub fn map_mut(&mut self) -> Option<&mut GameMap> {
        self.map.as_mut()
    }

    pub fn trees(&self) -> &[Entity] {
        &self.trees
    }

    pub fn marker(&self) -> DestinationMarker {
        self.marker
    }

    /// Apply `steps` erosion steps. No-op without a map.
    pub fn erode(&mut self, steps: u32) {
        let Some(map) = self.map.as_mut() else { return };
        for _ in 0..steps {
            map.erode();
        }
    }

    /// State of the tile under `position`. Off-grid counts as hidden.
    pub fn tile_state_at(&self, position: Vec2) -> TileState {
        match (&self.map, self.grid.position_to_index(position)) {
            (Some(map), Some(index)) => map.tile_state(index),
            _ => TileState::Hidden,
        }
    }

    /// Waypoints from `from` to `destination` on the current map.
    pub fn player_waypoints(&self, from: Vec2, destination: &Destination) -> Vec<Vec2> {
        match &self.map {
            Some(map) => player_waypoints_for_map(&self.grid, map, from, destination),
            None => Vec::new(),
        }
    }
}

/// World-space waypoints over passable tiles from the tile under `from` to
/// the destination tile. The final point is the exact destination position.
/// Empty when either end is off the grid or the destination is unreachable.
pub fn player_waypoints_for_map(
    grid: &HexGrid,
    map: &GameMap,
    from: Vec2,
    destination: &Destination,
) -> Vec<Vec2> {
    let Some(from_index) = grid.position_to_index(from) else {
        return Vec::new();
    };
    let Some(to_index) = destination.index.or_else(|| grid.position_to_index(destination.position)) else {
        return Vec::new();
    };

    let mut waypoints: Vec<Vec2> = grid
        .waypoints(from_index, to_index, |index| map.is_passable(index))
        .into_iter()
        .map(|index| grid.index_to_position(index))
        .collect();

    if let Some(last) = waypoints.last_mut() {
        *last = destination.position;
    }

    waypoints
}

/// Replace the map with a fresh one generated from `seed`, re-deriving the
/// tree entities and the collision bounds.
pub fn rebuild_map(world: &mut World, seed: u64) {
    despawn_trees(world);

    let grid = *world.resource::<MapSystem>().grid();
    let map = GameMap::new(grid, seed);

    let mut trees = Vec::new();
    for (index, kind) in map.obstacles() {
        if map.tile_state(index) == TileState::Hidden {
            continue;
        }

        let mut position = grid.index_to_position(index);
        position.y -= grid.cell_size / 2.0;

        let tree = world
            .spawn((
                Tree { kind, tile_index: index },
                Position(position),
                Collider::fixed(Shape::rectangle(grid.cell_size / 2.0, grid.cell_size / 2.0)),
            ))
            .id();
        trees.push(tree);
    }

    {
        let mut collisions = world.resource_mut::<CollisionSystem>();
        collisions.set_bounds(grid.world_bounds());
        for &tree in &trees {
            collisions.add_collidable(tree);
        }
    }

    info!(
        "[MAP] Rebuilt map from seed {}: {} passable tiles, {} trees",
        seed,
        map.passable_tile_count(),
        trees.len()
    );

    let mut map_system = world.resource_mut::<MapSystem>();
    map_system.map = Some(map);
    map_system.trees = trees;
}

fn despawn_trees(world: &mut World) {
    let trees = std::mem::take(&mut world.resource_mut::<MapSystem>().trees);
    if trees.is_empty() {
        return;
    }

    {
        let mut collisions = world.resource_mut::<CollisionSystem>();
        for &tree in &trees {
            collisions.remove_collidable(tree);
        }
    }

    for tree in trees {
        world.despawn(tree);
    }
}

pub fn teardown(world: &mut World) {
    despawn_trees(world);
    let mut map_system = world.resource_mut::<MapSystem>();
    map_system.map = None;
    map_system.marker = DestinationMarker::default();
}

/// Keep the destination marker on the client player's destination.
pub fn map_update(
    mut map_system: ResMut<MapSystem>,
    client: Res<ClientSystem>,
    paths: Query<&Path>,
) {
    let Some(path) = client.player().and_then(|player| paths.get(player).ok()) else {
        return;
    };

    match path.destination {
        Some(destination) if !path.is_complete() => {
            map_system.marker = DestinationMarker {
                visible: true,
                position: destination.position - Vec2::new(0.0, MARKER_OFFSET),
            };
        }
        _ => map_system.marker.visible = false,
    }
}
