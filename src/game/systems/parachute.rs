use bevy::prelude::*;

use crate::game::components::*;
use crate::game::config::InitialConfig;
use crate::game::engine::clock::Clock;
use crate::game::engine::pool::Pool;
use crate::game::systems::map::MapSystem;

/// Lowers players and supply drops onto their tile under a canopy.
#[derive(Resource, Debug, Default)]
pub struct ParachuteSystem {
    pending: Vec<Entity>,
    canopies: Pool<Entity>,
}

impl ParachuteSystem {
    /// Drop `entity` onto its [`Arrival`] tile on the next update.
    pub fn drop_entity(&mut self, entity: Entity) {
        if !self.pending.contains(&entity) {
            self.pending.push(entity);
        }
    }

    pub fn canopies(&self) -> &[Entity] {
        self.canopies.allocated()
    }
}

/// Height above the tile `elapsed` ticks after the drop. Eases in so the
/// canopy slows down near the ground.
pub fn descent_altitude(start: f32, elapsed: u64, duration: u64) -> f32 {
    if duration == 0 {
        return 0.0;
    }
    let remaining = 1.0 - (elapsed as f32 / duration as f32).min(1.0);
    start * remaining * remaining
}

pub fn parachute_update(
    clock: Res<Clock>,
    config: Res<InitialConfig>,
    map_system: Res<MapSystem>,
    mut parachutes: ResMut<ParachuteSystem>,
    mut carried: Query<(&mut Position, &mut Altitude, &mut Arrival), Without<Parachute>>,
    mut canopies: Query<(&Parachute, &mut Position, &mut Altitude)>,
    mut commands: Commands,
) {
    let tick = clock.tick();
    let grid = map_system.grid();
    let duration = config.ms_to_ticks(config.parachute_duration_ms);
    let parachutes = &mut *parachutes;

    for entity in std::mem::take(&mut parachutes.pending) {
        let Ok((mut position, mut altitude, mut arrival)) = carried.get_mut(entity) else { continue };
        if arrival.arrived {
            continue;
        }

        if let Some(tile) = arrival.tile_index {
            position.0 = grid.index_to_position(tile);
        }
        altitude.0 = config.parachute_altitude;
        arrival.dropped_tick = Some(tick);

        let canopy = parachutes.canopies.allocate_with(|| commands.spawn(Pooled).id());
        commands.entity(canopy).insert((
            Parachute { carrying: Some(entity), dropped_tick: tick },
            Position(position.0),
            Altitude(config.parachute_altitude),
        ));
    }

    for canopy in parachutes.canopies.allocated().to_vec() {
        // Allocated this frame.
        let Ok((parachute, mut canopy_position, mut canopy_altitude)) = canopies.get_mut(canopy) else {
            continue;
        };

        let landed = match parachute.carrying.map(|entity| carried.get_mut(entity)) {
            Some(Ok((position, mut altitude, mut arrival))) if !arrival.arrived => {
                let elapsed = clock.ticks_since(parachute.dropped_tick);
                altitude.0 = descent_altitude(config.parachute_altitude, elapsed, duration);
                canopy_position.0 = position.0;
                canopy_altitude.0 = altitude.0;

                if elapsed >= duration {
                    altitude.0 = 0.0;
                    arrival.arrived = true;
                    true
                } else {
                    false
                }
            }
            // Removed, or landed by the server first.
            _ => true,
        };

        if landed {
            parachutes.canopies.free(canopy);
            commands.entity(canopy).retain::<Pooled>();
        }
    }
}

/// Free every canopy; carried entities stay where they are.
pub fn teardown(world: &mut World) {
    let released = {
        let mut parachutes = world.resource_mut::<ParachuteSystem>();
        parachutes.pending.clear();
        parachutes.canopies.release_all()
    };

    for canopy in released {
        if let Ok(mut entity) = world.get_entity_mut(canopy) {
            entity.retain::<Pooled>();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::engine::hex_grid::HexGrid;

    fn app() -> App {
        let mut app = App::new();
        let config = InitialConfig::default();
        app.insert_resource(Clock::new(config.tick_rate));
        app.insert_resource(MapSystem::new(HexGrid::new(8, 8, 64.0)));
        app.insert_resource(config);
        app.init_resource::<ParachuteSystem>();
        app.add_systems(Update, parachute_update);
        app
    }

    fn step(app: &mut App) {
        app.world_mut().resource_mut::<Clock>().advance();
        app.update();
    }

    #[test]
    fn test_descent_is_monotonic() {
        let mut last = f32::MAX;
        for elapsed in 0..=120 {
            let altitude = descent_altitude(512.0, elapsed, 120);
            assert!(altitude <= last);
            last = altitude;
        }
        assert_eq!(last, 0.0);
        assert_eq!(descent_altitude(512.0, 0, 120), 512.0);
    }

    #[test]
    fn test_entity_lands_on_its_tile() {
        let mut app = app();
        let entity = app
            .world_mut()
            .spawn((Position::default(), Altitude::default(), Arrival::at_tile(Some(10))))
            .id();
        app.world_mut().resource_mut::<ParachuteSystem>().drop_entity(entity);

        step(&mut app);
        assert_eq!(app.world().get::<Altitude>(entity).unwrap().0, 512.0);
        assert_eq!(app.world().resource::<ParachuteSystem>().canopies().len(), 1);

        let config = app.world().resource::<InitialConfig>().clone();
        for _ in 0..config.ms_to_ticks(config.parachute_duration_ms) {
            step(&mut app);
        }

        let tile = app.world().resource::<MapSystem>().grid().index_to_position(10);
        let arrival = app.world().get::<Arrival>(entity).unwrap();
        assert!(arrival.arrived);
        assert_eq!(arrival.dropped_tick, Some(1));
        assert_eq!(app.world().get::<Position>(entity).unwrap().0, tile);
        assert_eq!(app.world().get::<Altitude>(entity).unwrap().0, 0.0);
        assert!(app.world().resource::<ParachuteSystem>().canopies().is_empty());
    }

    #[test]
    fn test_canopy_freed_when_entity_lands_early() {
        let mut app = app();
        let entity = app
            .world_mut()
            .spawn((Position::default(), Altitude::default(), Arrival::at_tile(Some(3))))
            .id();
        app.world_mut().resource_mut::<ParachuteSystem>().drop_entity(entity);
        step(&mut app);

        app.world_mut().get_mut::<Arrival>(entity).unwrap().arrived = true;
        step(&mut app);
        step(&mut app);

        assert!(app.world().resource::<ParachuteSystem>().canopies().is_empty());
    }
}
