use bevy::prelude::*;

use crate::game::components::{Health, PlayerId};
use crate::game::engine::clock::Clock;
use crate::game::events::HostEvent;
use crate::game::protocol::Population;
use crate::game::systems::player::PlayerSystem;

/// Match bookkeeping: population counts and the winner.
#[derive(Resource, Debug)]
pub struct StateSystem {
    max_population: u32,
    connected: u32,
    knocked_out: u32,
    population: Population,
    /// Last population announced by the server. Overrides local counts.
    server_population: Option<Population>,
    winner: Option<String>,
    /// Ticks between population log lines; 0 disables them.
    pub log_interval_ticks: u64,
}

impl StateSystem {
    pub fn new(max_population: u32) -> Self {
        Self {
            max_population,
            connected: 0,
            knocked_out: 0,
            population: Population { allowed: max_population, ..default() },
            server_population: None,
            winner: None,
            log_interval_ticks: 600,
        }
    }

    pub fn population(&self) -> Population {
        self.population
    }

    pub fn record_player_connected(&mut self) {
        self.connected += 1;
    }

    pub fn record_player_knocked_out(&mut self) {
        self.knocked_out += 1;
    }

    pub fn set_server_population(&mut self, population: Population) {
        self.server_population = Some(population);
        self.population = population;
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    /// Start counting a new match.
    pub fn reset(&mut self) {
        *self = Self { log_interval_ticks: self.log_interval_ticks, ..Self::new(self.max_population) };
    }

    fn local_population(&self, known: u32) -> Population {
        Population {
            known,
            maximum: self.connected.max(known),
            allowed: self.max_population,
            knocked_out: self.knocked_out,
        }
    }
}

pub fn state_update(
    clock: Res<Clock>,
    mut state: ResMut<StateSystem>,
    players: Res<PlayerSystem>,
    query: Query<(&PlayerId, &Health)>,
    mut host: MessageWriter<HostEvent>,
) {
    state.population = match state.server_population {
        Some(population) => population,
        None => state.local_population(players.len() as u32),
    };

    if state.winner.is_none() && state.connected >= 2 {
        let mut alive = players
            .active_players()
            .iter()
            .filter_map(|&entity| query.get(entity).ok())
            .filter(|(_, health)| health.alive);

        if let (Some((id, _)), None) = (alive.next(), alive.next()) {
            info!("[STATE] {} wins at tick {}", id.0, clock.tick());
            host.write(HostEvent::Winner { id: id.0.clone() });
            state.winner = Some(id.0.clone());
        }
    }

    let interval = state.log_interval_ticks;
    if interval > 0 && clock.tick() % interval == 0 {
        let population = state.population;
        info!(
            "[STATE] tick {}: known={} maximum={} allowed={} knocked_out={}",
            clock.tick(),
            population.known,
            population.maximum,
            population.allowed,
            population.knocked_out
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_population() {
        let mut state = StateSystem::new(100);
        state.record_player_connected();
        state.record_player_connected();
        state.record_player_knocked_out();

        let population = state.local_population(1);
        assert_eq!(population, Population { known: 1, maximum: 2, allowed: 100, knocked_out: 1 });
    }

    #[test]
    fn test_server_population_wins() {
        let mut state = StateSystem::new(100);
        let announced = Population { known: 7, maximum: 9, allowed: 50, knocked_out: 2 };
        state.set_server_population(announced);
        assert_eq!(state.population(), announced);
    }

    #[test]
    fn test_reset_keeps_log_interval() {
        let mut state = StateSystem::new(100);
        state.log_interval_ticks = 5;
        state.record_player_knocked_out();
        state.winner = Some("a".into());

        state.reset();

        assert_eq!(state.log_interval_ticks, 5);
        assert_eq!(state.winner(), None);
        assert_eq!(state.population().knocked_out, 0);
    }
}
