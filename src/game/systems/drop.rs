//! Supply drops: powerup crates parachuted onto the island.
//!
//! A drop becomes collidable once it lands. The first player to touch it
//! gets its powerup and the crate spins out; a drop left on a sinking tile
//! is frozen like anything else.

use bevy::prelude::*;
use smallvec::smallvec;

use crate::game::components::*;
use crate::game::config::InitialConfig;
use crate::game::engine::clock::Clock;
use crate::game::engine::collision::{CollisionEvent, CollisionHandler, CollisionSystem};
use crate::game::engine::geometry::Shape;
use crate::game::engine::pool::Pool;
use crate::game::engine::random::SeedRandom;
use crate::game::map::TileState;
use crate::game::systems::entity_removal::EntityRemovalSystem;
use crate::game::systems::map::MapSystem;
use crate::game::systems::parachute::ParachuteSystem;
use crate::game::systems::player::PlayerSystem;

/// Full turns a crate makes while spinning out.
const SPIN_TURNS: f32 = 2.0;

#[derive(Resource, Debug)]
pub struct DropSystem {
    /// Requested drops and their tile, if one was chosen.
    pending: Vec<Option<usize>>,
    landing: Vec<Entity>,
    pool: Pool<Entity>,
    random: SeedRandom,
}

impl DropSystem {
    pub fn new(seed: u64) -> Self {
        Self { pending: Vec::new(), landing: Vec::new(), pool: Pool::new(), random: SeedRandom::new(seed) }
    }

    /// Parachute a crate onto `tile`, or onto a random habitable tile.
    pub fn add_drop(&mut self, tile: Option<usize>) {
        self.pending.push(tile);
    }

    /// Drops on the island or still in the air.
    pub fn drops(&self) -> &[Entity] {
        self.pool.allocated()
    }

    pub fn pool(&self) -> &Pool<Entity> {
        &self.pool
    }
}

fn drop_bundle(tile: Option<usize>, contents: PowerupType, radius: f32) -> impl Bundle {
    (
        SupplyDrop { contents, colliding_player: None, spin_started: None },
        Position::default(),
        Altitude::default(),
        Facing::default(),
        Opacity::default(),
        Lod::default(),
        Presence::default(),
        Arrival::at_tile(tile),
        Collider::dynamic(Shape::circle(radius)),
        Subscriptions::default(),
    )
}

pub fn drop_update(
    clock: Res<Clock>,
    config: Res<InitialConfig>,
    map_system: Res<MapSystem>,
    mut drops: ResMut<DropSystem>,
    mut parachutes: ResMut<ParachuteSystem>,
    mut collisions: ResMut<CollisionSystem>,
    mut players: ResMut<PlayerSystem>,
    mut removal: ResMut<EntityRemovalSystem>,
    mut collision_events: MessageReader<CollisionEvent>,
    player_ids: Query<&PlayerId>,
    mut query: Query<(&mut SupplyDrop, &Position, &Arrival, &mut Presence, &mut Facing, &mut Subscriptions)>,
    mut commands: Commands,
) {
    let tick = clock.tick();
    let drops = &mut *drops;

    for tile in std::mem::take(&mut drops.pending) {
        let tile = tile.or_else(|| {
            map_system.map().and_then(|map| map.random_habitable_tile_index(&mut drops.random))
        });
        let Some(tile) = tile else {
            warn!("[DROP] No tile for supply drop at tick {}", tick);
            continue;
        };

        let entity = drops.pool.allocate_with(|| commands.spawn(Pooled).id());
        commands
            .entity(entity)
            .insert(drop_bundle(Some(tile), PowerupType::BigSnowball, config.drop_radius));
        parachutes.drop_entity(entity);
        drops.landing.push(entity);
        debug!("[DROP] Dropping supplies onto tile {}", tile);
    }

    drops.landing.retain(|&entity| match query.get_mut(entity) {
        Ok((.., arrival, _, _, mut subscriptions)) if arrival.arrived => {
            subscriptions.0 = smallvec![collisions.handle_collisions(entity, CollisionHandler::Drop)];
            collisions.add_collidable(entity);
            false
        }
        Ok(_) => true,
        // Components land at the next sync point.
        Err(_) => drops.pool.is_allocated(entity),
    });

    for event in collision_events.read() {
        if event.handler != CollisionHandler::Drop {
            continue;
        }
        let Ok(player_id) = player_ids.get(event.other) else { continue };
        let Ok((mut drop, _, _, presence, _, _)) = query.get_mut(event.entity) else { continue };
        if drop.colliding_player.is_some() || !presence.is_present() {
            continue;
        }

        drop.colliding_player = Some(event.other);
        drop.spin_started = Some(tick);
        players.assign_player_powerup(&player_id.0, drop.contents);
        collisions.remove_collidable(event.entity);
        info!("[DROP] {} picked up {:?}", player_id.0, drop.contents);
    }

    let spin_ticks = config.ms_to_ticks(config.drop_spin_ms);

    for entity in drops.pool.allocated().to_vec() {
        let Ok((drop, position, arrival, mut presence, mut facing, mut subscriptions)) = query.get_mut(entity) else {
            continue;
        };

        if let Some(started) = drop.spin_started {
            let elapsed = clock.ticks_since(started);
            let t = if spin_ticks == 0 { 1.0 } else { (elapsed as f32 / spin_ticks as f32).min(1.0) };
            facing.0 = t * SPIN_TURNS * std::f32::consts::TAU;
            if elapsed >= spin_ticks {
                *presence = Presence::Gone;
            }
        } else if arrival.arrived
            && presence.is_present()
            && map_system.tile_state_at(position.0) == TileState::Sinking
        {
            removal.freeze_entity(entity, &mut presence, tick);
            collisions.remove_collidable(entity);
        }

        if presence.is_gone() {
            for id in subscriptions.0.drain(..) {
                collisions.unsubscribe(id);
            }
            collisions.remove_collidable(entity);
            drops.pool.free(entity);
            commands.entity(entity).retain::<Pooled>();
        }
    }
}

/// Free every drop and forget queued ones.
pub fn teardown(world: &mut World) {
    let released = {
        let mut drops = world.resource_mut::<DropSystem>();
        drops.pending.clear();
        drops.landing.clear();
        drops.pool.release_all()
    };

    for entity in released {
        let subscriptions = world
            .get_mut::<Subscriptions>(entity)
            .map(|mut subscriptions| std::mem::take(&mut subscriptions.0))
            .unwrap_or_default();
        {
            let mut collisions = world.resource_mut::<CollisionSystem>();
            for id in subscriptions {
                collisions.unsubscribe(id);
            }
            collisions.remove_collidable(entity);
        }
        if let Ok(mut drop) = world.get_entity_mut(entity) {
            drop.retain::<Pooled>();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::engine::hex_grid::HexGrid;
    use crate::game::systems::parachute::parachute_update;

    fn app() -> App {
        let mut app = App::new();
        let config = InitialConfig { parachute_duration_ms: 0.0, ..Default::default() };
        app.insert_resource(Clock::new(config.tick_rate));
        app.insert_resource(MapSystem::new(HexGrid::new(8, 8, 64.0)));
        app.insert_resource(CollisionSystem::default());
        app.insert_resource(PlayerSystem::new(&config));
        app.insert_resource(DropSystem::new(config.seed));
        app.init_resource::<ParachuteSystem>();
        app.init_resource::<EntityRemovalSystem>();
        app.insert_resource(config);
        app.add_message::<CollisionEvent>();
        app.add_systems(Update, (drop_update, parachute_update).chain());
        app
    }

    fn step(app: &mut App) {
        app.world_mut().resource_mut::<Clock>().advance();
        app.update();
    }

    #[test]
    fn test_drop_without_map_or_tile_is_skipped() {
        let mut app = app();
        app.world_mut().resource_mut::<DropSystem>().add_drop(None);
        step(&mut app);
        assert!(app.world().resource::<DropSystem>().drops().is_empty());
    }

    #[test]
    fn test_drop_becomes_collidable_after_landing() {
        let mut app = app();
        app.world_mut().resource_mut::<DropSystem>().add_drop(Some(9));

        step(&mut app);
        let entity = app.world().resource::<DropSystem>().drops()[0];
        assert!(!app.world().resource::<CollisionSystem>().is_collidable(entity));

        for _ in 0..3 {
            step(&mut app);
        }
        assert!(app.world().get::<Arrival>(entity).unwrap().arrived);
        assert!(app.world().resource::<CollisionSystem>().is_collidable(entity));
        assert_eq!(app.world().resource::<CollisionSystem>().handlers_for(entity).len(), 1);
    }

    #[test]
    fn test_pickup_grants_powerup_and_spins_out() {
        let mut app = app();
        app.world_mut().resource_mut::<DropSystem>().add_drop(Some(9));
        for _ in 0..4 {
            step(&mut app);
        }
        let entity = app.world().resource::<DropSystem>().drops()[0];
        let player = app.world_mut().spawn(PlayerId("p".into())).id();

        let id = app.world().resource::<CollisionSystem>().handlers_for(entity)[0].0;
        app.world_mut().write_message(CollisionEvent {
            entity,
            other: player,
            handler: CollisionHandler::Drop,
            id,
        });
        step(&mut app);

        let drop = *app.world().get::<SupplyDrop>(entity).unwrap();
        assert_eq!(drop.colliding_player, Some(player));
        assert!(!app.world().resource::<CollisionSystem>().is_collidable(entity));

        let config = app.world().resource::<InitialConfig>().clone();
        for _ in 0..config.ms_to_ticks(config.drop_spin_ms) {
            step(&mut app);
        }
        assert!(app.world().resource::<DropSystem>().drops().is_empty());
        assert!(app.world().get::<SupplyDrop>(entity).is_none());
        assert!(app.world().resource::<CollisionSystem>().handlers_for(entity).is_empty());
    }
}
