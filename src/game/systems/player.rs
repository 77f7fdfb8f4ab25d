//! Player roster and lifecycle.
//!
//! Players move through `Parachuting -> Active -> Sinking -> Gone`; removal
//! takes a player out from any state. Structural changes (adding and
//! removing players) go through the `&mut World` helpers so the network
//! system can apply them and see the result within the same frame. Other
//! systems queue destinations, throws and powerups through the resource
//! methods; those are applied at the player slot.

use std::f32::consts::FRAC_PI_2;

use bevy::ecs::query::QueryData;
use bevy::prelude::*;
use snowball_macros::profile;
use rustc_hash::FxHashMap;

use crate::game::components::*;
use crate::game::config::InitialConfig;
use crate::game::engine::clock::Clock;
use crate::game::engine::collision::{CollisionEvent, CollisionHandler, CollisionSystem, HandlerId};
use crate::game::engine::geometry::Shape;
use crate::game::engine::pool::Pool;
use crate::game::engine::random::SeedRandom;
use crate::game::events::{HostEvent, SoundCue};
use crate::game::map::TileState;
use crate::game::protocol::PlayerSnapshot;
use crate::game::systems::client::ClientSystem;
use crate::game::systems::entity_removal::EntityRemovalSystem;
use crate::game::systems::map::{player_waypoints_for_map, MapSystem};
use crate::game::systems::parachute::ParachuteSystem;
use crate::game::systems::snowball::SnowballSystem;
use crate::game::systems::state::StateSystem;

#[derive(Resource, Debug)]
pub struct PlayerSystem {
    roster: FxHashMap<String, Entity>,
    /// Players still simulated, in the order they were added.
    players: Vec<Entity>,
    new_players: Vec<Entity>,
    parachuting: Vec<Entity>,
    destinations: Vec<(Entity, Destination)>,
    targeted_positions: Vec<(Entity, Vec2)>,
    powerups: Vec<(Entity, PowerupType)>,
    pool: Pool<Entity>,
    /// Spawn tiles for players added without one.
    random: SeedRandom,
    collider: Shape,
    next_id: u64,
}

impl PlayerSystem {
    pub fn new(config: &InitialConfig) -> Self {
        Self {
            roster: FxHashMap::default(),
            players: Vec::new(),
            new_players: Vec::new(),
            parachuting: Vec::new(),
            destinations: Vec::new(),
            targeted_positions: Vec::new(),
            powerups: Vec::new(),
            pool: Pool::new(),
            random: SeedRandom::new(config.seed),
            collider: Shape::rectangle(config.player_width, config.player_height),
            next_id: 0,
        }
    }

    pub fn has_player(&self, id: &str) -> bool {
        self.roster.contains_key(id)
    }

    pub fn get_player(&self, id: &str) -> Option<Entity> {
        self.roster.get(id).copied()
    }

    /// Roster ids in sorted order.
    pub fn player_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.roster.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.roster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    /// Players still simulated this frame.
    pub fn active_players(&self) -> &[Entity] {
        &self.players
    }

    pub fn is_parachuting(&self, entity: Entity) -> bool {
        self.parachuting.contains(&entity)
    }

    pub fn pool(&self) -> &Pool<Entity> {
        &self.pool
    }

    /// Queue a walk to `destination`. Unknown ids are ignored.
    pub fn assign_player_destination(&mut self, id: &str, destination: Destination) {
        let Some(entity) = self.get_player(id) else { return };
        match self.destinations.iter_mut().find(|(e, _)| *e == entity) {
            Some(entry) => entry.1 = destination,
            None => self.destinations.push((entity, destination)),
        }
    }

    /// Queue a throw at `position`. Unknown ids are ignored.
    pub fn assign_player_targeted_position(&mut self, id: &str, position: Vec2) {
        let Some(entity) = self.get_player(id) else { return };
        match self.targeted_positions.iter_mut().find(|(e, _)| *e == entity) {
            Some(entry) => entry.1 = position,
            None => self.targeted_positions.push((entity, position)),
        }
    }

    /// Queue a powerup pickup. Unknown ids are ignored.
    pub fn assign_player_powerup(&mut self, id: &str, kind: PowerupType) {
        let Some(entity) = self.get_player(id) else { return };
        self.powerups.push((entity, kind));
    }

    /// Stop treating `entity` as parachuting. Used when the server lands a
    /// player before its canopy did.
    pub fn mark_landed(&mut self, entity: Entity) {
        self.parachuting.retain(|e| *e != entity);
    }

    fn generate_id(&mut self) -> String {
        loop {
            let id = format!("player-{}", self.next_id);
            self.next_id += 1;
            if !self.roster.contains_key(&id) {
                return id;
            }
        }
    }

    fn register(&mut self, id: String, entity: Entity) {
        self.roster.insert(id, entity);
        self.players.push(entity);
        self.new_players.push(entity);
    }

    fn forget(&mut self, entity: Entity) {
        self.roster.retain(|_, e| *e != entity);
        self.players.retain(|e| *e != entity);
        self.new_players.retain(|e| *e != entity);
        self.parachuting.retain(|e| *e != entity);
        self.destinations.retain(|(e, _)| *e != entity);
        self.targeted_positions.retain(|(e, _)| *e != entity);
        self.powerups.retain(|(e, _)| *e != entity);
    }
}

fn player_bundle(id: String, tile: Option<usize>, collider: Shape) -> impl Bundle {
    (
        (
            PlayerId(id),
            PlayerState::default(),
            Position::default(),
            Altitude::default(),
            Facing::default(),
            Opacity::default(),
            Lod::default(),
        ),
        (
            Collider::dynamic(collider),
            Subscriptions::default(),
            Presence::default(),
            Health::default(),
            Arrival::at_tile(tile),
            Path::default(),
            Speed::default(),
            Powerups::default(),
        ),
    )
}

// ============================================================================
// Structural operations
// ============================================================================

/// Add a parachuting player. A missing id is generated; a missing tile is
/// picked when the player is first updated. Fails on a duplicate id.
pub fn add_player(world: &mut World, id: Option<&str>, tile: Option<usize>) -> anyhow::Result<Entity> {
    let id = match id {
        Some(id) => id.to_string(),
        None => world.resource_mut::<PlayerSystem>().generate_id(),
    };
    if world.resource::<PlayerSystem>().has_player(&id) {
        anyhow::bail!("player {} already described", id);
    }

    let collider = world.resource::<PlayerSystem>().collider;
    let entity = world.resource_scope(|world, mut players: Mut<PlayerSystem>| {
        players.pool.allocate_with(|| world.spawn(Pooled).id())
    });

    world.entity_mut(entity).insert(player_bundle(id.clone(), tile, collider));
    debug!("[PLAYER] Added {} on tile {:?}", id, tile);
    world.resource_mut::<PlayerSystem>().register(id, entity);
    Ok(entity)
}

/// Add a player from a reset roster entry. Players with a known position
/// are already landed there; the rest parachute onto a tile chosen by a
/// random source seeded with their join tick, so every client picks the
/// same one.
pub fn add_player_from_snapshot(
    world: &mut World,
    id: &str,
    snapshot: &PlayerSnapshot,
) -> anyhow::Result<Entity> {
    let tile = match snapshot.at {
        Some(at) => Some(at.index),
        None => world
            .resource::<MapSystem>()
            .map()
            .and_then(|map| map.random_habitable_tile_index(&mut SeedRandom::new(snapshot.join_tick))),
    };

    let entity = add_player(world, Some(id), tile)?;

    if let Some(at) = snapshot.at {
        let mut player = world.entity_mut(entity);
        player.insert((Position(at.position.into()), Arrival::landed(Some(at.index))));
        if let Some(mut state) = player.get_mut::<PlayerState>() {
            state.advance_to(PlayerState::Active);
        }
    }

    if let Some(destination) = snapshot.destination {
        world.resource_mut::<PlayerSystem>().assign_player_destination(
            id,
            Destination { index: Some(destination.index), position: destination.position.into() },
        );
    }

    Ok(entity)
}

/// Remove a player in any state. Returns false for unknown ids.
pub fn remove_player(world: &mut World, id: &str) -> bool {
    let Some(entity) = world.resource::<PlayerSystem>().get_player(id) else {
        return false;
    };

    world.resource_mut::<PlayerSystem>().forget(entity);

    let subscriptions = world
        .get_mut::<Subscriptions>(entity)
        .map(|mut subscriptions| std::mem::take(&mut subscriptions.0))
        .unwrap_or_default();
    release_registrations(&mut world.resource_mut::<CollisionSystem>(), entity, &subscriptions);

    world.resource_mut::<PlayerSystem>().pool.free(entity);
    if let Ok(mut player) = world.get_entity_mut(entity) {
        player.retain::<Pooled>();
    }

    let mut client = world.resource_mut::<ClientSystem>();
    if client.is_client(entity) {
        client.release();
    }

    debug!("[PLAYER] Removed {}", id);
    true
}

pub fn clear_all_players(world: &mut World) {
    let ids = world.resource::<PlayerSystem>().player_ids();
    for id in ids {
        remove_player(world, &id);
    }
}

fn release_registrations(collisions: &mut CollisionSystem, entity: Entity, subscriptions: &[HandlerId]) {
    for &id in subscriptions {
        collisions.unsubscribe(id);
    }
    collisions.remove_collidable(entity);
}

// ============================================================================
// Movement
// ============================================================================

/// Advance `position` by at most `step` toward the next waypoint, snapping
/// onto it when within reach. Returns the step taken, or `None` when the
/// path is complete.
pub fn step_along_path(path: &mut Path, position: &mut Vec2, step: f32) -> Option<Vec2> {
    let next = *path.waypoints.front()?;
    let delta = next - *position;
    let stride = delta.normalize_or_zero() * step;

    if delta.length() <= stride.length() || delta == Vec2::ZERO {
        *position = next;
        path.waypoints.pop_front();
    } else {
        *position += stride;
    }

    Some(stride)
}

/// Heading that faces along `direction`. Models face +y at rest.
pub fn facing_toward(direction: Vec2) -> f32 {
    direction.y.atan2(direction.x) + FRAC_PI_2
}

// ============================================================================
// Update
// ============================================================================

#[derive(QueryData)]
#[query_data(mutable)]
pub struct PlayerData {
    id: &'static PlayerId,
    position: &'static mut Position,
    altitude: &'static mut Altitude,
    facing: &'static mut Facing,
    path: &'static mut Path,
    health: &'static mut Health,
    presence: &'static mut Presence,
    arrival: &'static mut Arrival,
    powerups: &'static mut Powerups,
    state: &'static mut PlayerState,
    subscriptions: &'static mut Subscriptions,
    speed: &'static Speed,
}

#[profile(2)]
pub fn player_update(
    clock: Res<Clock>,
    config: Res<InitialConfig>,
    map_system: Res<MapSystem>,
    mut players: ResMut<PlayerSystem>,
    mut collisions: ResMut<CollisionSystem>,
    mut parachutes: ResMut<ParachuteSystem>,
    mut removal: ResMut<EntityRemovalSystem>,
    mut snowballs: ResMut<SnowballSystem>,
    mut client: ResMut<ClientSystem>,
    mut state: ResMut<StateSystem>,
    mut collision_events: MessageReader<CollisionEvent>,
    mut host: MessageWriter<HostEvent>,
    mut query: Query<PlayerData>,
    mut commands: Commands,
) {
    let tick = clock.tick();

    // Read every frame so hits never queue up across frames. The snowball
    // itself was already freed by the snowball system.
    let hits: Vec<(Entity, Vec2)> = collision_events
        .read()
        .filter(|event| event.handler == CollisionHandler::Player)
        .filter_map(|event| {
            let impact = snowballs.impact(event.other)?;
            (impact.thrower != event.entity).then_some((event.entity, impact.direction))
        })
        .collect();

    let Some(map) = map_system.map() else { return };
    let grid = map_system.grid();
    let client_player = client.player();

    for (entity, kind) in std::mem::take(&mut players.powerups) {
        let Ok(mut player) = query.get_mut(entity) else { continue };
        player.powerups.collect(kind, config.powerup_quantity);
        info!("[PLAYER] {} collected powerup {:?}", player.id.0, kind);
        host.write(HostEvent::PowerupCollected { id: player.id.0.clone(), kind });
        if client_player == Some(entity) {
            host.write(HostEvent::Sound(SoundCue::PowerupPickup));
        }
    }

    // New players pass through the parachute system unless already landed.
    for entity in std::mem::take(&mut players.new_players) {
        let Ok(mut player) = query.get_mut(entity) else { continue };

        if player.arrival.tile_index.is_none() {
            player.arrival.tile_index = map.random_habitable_tile_index(&mut players.random);
        }

        let handler = collisions.handle_collisions(entity, CollisionHandler::Player);
        player.subscriptions.0.push(handler);
        state.record_player_connected();

        if player.arrival.arrived {
            player.state.advance_to(PlayerState::Active);
        } else {
            parachutes.drop_entity(entity);
            players.parachuting.push(entity);
        }
    }

    players.parachuting.retain(|&entity| match query.get_mut(entity) {
        Ok(mut player) if player.arrival.arrived => {
            if let Some(tile) = player.arrival.tile_index {
                player.position.0 = grid.index_to_position(tile);
            }
            player.altitude.0 = 0.0;
            player.state.advance_to(PlayerState::Active);
            false
        }
        Ok(_) => true,
        Err(_) => false,
    });

    for (entity, destination) in std::mem::take(&mut players.destinations) {
        let Ok(mut player) = query.get_mut(entity) else { continue };
        if player.health.is_dead() || !player.arrival.arrived {
            continue;
        }

        let waypoints = player_waypoints_for_map(grid, map, player.position.0, &destination);
        if !waypoints.is_empty() {
            player.path.follow(waypoints, destination);
        } else if client_player == Some(entity) {
            // Clicking somewhere unreachable throws at it instead.
            client.assign_target(destination.position);
        } else {
            debug!("[PLAYER] {} cannot reach {:?}", player.id.0, destination.position);
        }
    }

    for (entity, target) in std::mem::take(&mut players.targeted_positions) {
        let Ok(mut player) = query.get_mut(entity) else { continue };
        if player.health.is_dead() {
            continue;
        }

        let origin = player.position.0;
        snowballs.throw_snowball(entity, origin, target, &mut player.powerups);
        player.facing.0 = facing_toward((target - origin).normalize_or_zero());

        if client_player == Some(entity) {
            host.write(HostEvent::Sound(SoundCue::SnowballThrow));
        }
    }

    for (entity, direction) in hits {
        let Ok(mut player) = query.get_mut(entity) else { continue };
        if player.health.is_dead() || !player.presence.is_present() {
            continue;
        }

        player.facing.0 = direction.y.atan2(direction.x) - FRAC_PI_2;
        player.health.die(tick);
        removal.teleport_entity(entity, &mut player.presence, tick);
        info!("[PLAYER] {} was hit at tick {}", player.id.0, tick);
    }

    let step = config.player_speed;
    let mut gone = Vec::new();

    for &entity in &players.players {
        let Ok(mut player) = query.get_mut(entity) else { continue };

        if player.health.alive && *player.state == PlayerState::Active {
            let stride = step * player.speed.scale;
            let mut position = player.position.0;
            if let Some(taken) = step_along_path(&mut player.path, &mut position, stride) {
                player.position.0 = position;
                if taken != Vec2::ZERO {
                    player.facing.0 = facing_toward(taken.normalize());
                }
            }
        }

        if player.health.alive && player.arrival.arrived && player.presence.is_present() {
            collisions.add_collidable(entity);
        } else {
            collisions.remove_collidable(entity);
        }

        let sinking = player.arrival.arrived
            && map_system.tile_state_at(player.position.0) == TileState::Sinking;

        if sinking && player.presence.is_present() {
            player.state.advance_to(PlayerState::Sinking);
            removal.freeze_entity(entity, &mut player.presence, tick);
            player.health.die(tick);
            collisions.remove_collidable(entity);
            info!("[PLAYER] {} sank at tick {}", player.id.0, tick);
        } else if player.presence.is_gone() {
            player.state.advance_to(PlayerState::Gone);
            gone.push(entity);
        }
    }

    for entity in gone {
        players.players.retain(|e| *e != entity);
        state.record_player_knocked_out();
        host.write(HostEvent::Sound(SoundCue::PlayerFrozen));

        // The client player stays around so the client system can report
        // the game over.
        if client.is_client(entity) {
            continue;
        }

        let subscriptions = match query.get_mut(entity) {
            Ok(mut player) => std::mem::take(&mut player.subscriptions.0),
            Err(_) => Default::default(),
        };
        release_registrations(&mut collisions, entity, &subscriptions);
        players.forget(entity);
        players.pool.free(entity);
        commands.entity(entity).retain::<Pooled>();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::engine::hex_grid::HexGrid;

    fn world() -> World {
        let config = InitialConfig::default();
        let mut world = World::new();
        world.insert_resource(CollisionSystem::default());
        world.insert_resource(MapSystem::new(HexGrid::new(32, 32, 64.0)));
        world.insert_resource(PlayerSystem::new(&config));
        world.insert_resource(ClientSystem::default());
        world.insert_resource(config);
        world
    }

    #[test]
    fn test_duplicate_id_is_an_error() {
        let mut world = world();
        assert!(add_player(&mut world, Some("a"), None).is_ok());
        assert!(add_player(&mut world, Some("a"), None).is_err());
        assert_eq!(world.resource::<PlayerSystem>().len(), 1);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let mut world = world();
        add_player(&mut world, Some("player-0"), None).unwrap();
        let entity = add_player(&mut world, None, None).unwrap();
        assert_eq!(world.get::<PlayerId>(entity).map(|id| id.0.as_str()), Some("player-1"));
    }

    #[test]
    fn test_remove_returns_entity_to_pool() {
        let mut world = world();
        let first = add_player(&mut world, Some("a"), None).unwrap();
        assert!(remove_player(&mut world, "a"));
        assert!(!remove_player(&mut world, "a"));
        assert!(world.get::<PlayerId>(first).is_none());
        assert!(world.get::<Pooled>(first).is_some());

        let second = add_player(&mut world, Some("b"), None).unwrap();
        assert_eq!(first, second);
        assert_eq!(world.resource::<PlayerSystem>().pool().constructed(), 1);
    }

    #[test]
    fn test_remove_releases_client_binding() {
        let mut world = world();
        let entity = add_player(&mut world, Some("me"), None).unwrap();
        world.resource_mut::<ClientSystem>().assign_player(entity, "me");
        remove_player(&mut world, "me");
        assert_eq!(world.resource::<ClientSystem>().player(), None);
    }

    #[test]
    fn test_assignments_to_unknown_ids_are_ignored() {
        let mut world = world();
        let mut players = world.resource_mut::<PlayerSystem>();
        players.assign_player_destination("ghost", Destination { index: None, position: Vec2::ZERO });
        players.assign_player_targeted_position("ghost", Vec2::ONE);
        players.assign_player_powerup("ghost", PowerupType::BigSnowball);
        assert!(players.destinations.is_empty());
        assert!(players.targeted_positions.is_empty());
        assert!(players.powerups.is_empty());
    }

    #[test]
    fn test_latest_destination_wins() {
        let mut world = world();
        add_player(&mut world, Some("a"), None).unwrap();
        let mut players = world.resource_mut::<PlayerSystem>();
        players.assign_player_destination("a", Destination { index: None, position: Vec2::ZERO });
        players.assign_player_destination("a", Destination { index: None, position: Vec2::X });
        assert_eq!(players.destinations.len(), 1);
        assert_eq!(players.destinations[0].1.position, Vec2::X);
    }

    #[test]
    fn test_step_along_path_snaps_onto_waypoints() {
        let mut path = Path::default();
        path.follow(vec![Vec2::new(3.0, 0.0), Vec2::new(3.0, 3.0)], Destination {
            index: None,
            position: Vec2::new(3.0, 3.0),
        });
        let mut position = Vec2::ZERO;

        step_along_path(&mut path, &mut position, 2.25);
        assert_eq!(position, Vec2::new(2.25, 0.0));

        step_along_path(&mut path, &mut position, 2.25);
        assert_eq!(position, Vec2::new(3.0, 0.0));
        assert_eq!(path.waypoints.len(), 1);

        step_along_path(&mut path, &mut position, 2.25);
        step_along_path(&mut path, &mut position, 2.25);
        assert_eq!(position, Vec2::new(3.0, 3.0));
        assert!(path.is_complete());
        assert_eq!(step_along_path(&mut path, &mut position, 2.25), None);
    }

    #[test]
    fn test_facing_toward() {
        assert!((facing_toward(Vec2::X) - FRAC_PI_2).abs() < 1e-6);
        assert!((facing_toward(Vec2::Y) - std::f32::consts::PI).abs() < 1e-6);
    }
}
