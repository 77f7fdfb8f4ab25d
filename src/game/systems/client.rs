use bevy::prelude::*;

use crate::game::components::{Destination, Health, Position, Presence};
use crate::game::config::InitialConfig;
use crate::game::engine::clock::Clock;
use crate::game::events::HostEvent;
use crate::game::systems::network::NetworkSystem;
use crate::game::systems::player::PlayerSystem;
use crate::game::systems::state::StateSystem;

/// The locally controlled player and the inputs queued for it.
#[derive(Resource, Debug, Default)]
pub struct ClientSystem {
    player: Option<Entity>,
    player_id: Option<String>,
    destination: Option<Destination>,
    targeted_position: Option<Vec2>,
    died_at: Option<u64>,
    announced_death: bool,
    last_valid_score: u32,
    last_reported_score: Option<u32>,
}

impl ClientSystem {
    pub fn assign_player(&mut self, player: Entity, id: impl Into<String>) {
        let id = id.into();
        info!("[CLIENT] Bound client player {}", id);
        *self = Self { player: Some(player), player_id: Some(id), ..default() };
    }

    /// Forget the client player and any queued input.
    pub fn release(&mut self) {
        *self = Self::default();
    }

    pub fn player(&self) -> Option<Entity> {
        self.player
    }

    pub fn player_id(&self) -> Option<&str> {
        self.player_id.as_deref()
    }

    pub fn is_client(&self, entity: Entity) -> bool {
        self.player == Some(entity)
    }

    pub fn assign_destination(&mut self, destination: Destination) {
        self.destination = Some(destination);
    }

    /// Throw at `position` on the next update.
    pub fn assign_target(&mut self, position: Vec2) {
        self.targeted_position = Some(position);
    }

    pub fn pending_destination(&self) -> Option<Destination> {
        self.destination
    }

    pub fn pending_target(&self) -> Option<Vec2> {
        self.targeted_position
    }

    pub fn game_over_announced(&self) -> bool {
        self.announced_death
    }
}

pub fn client_update(
    clock: Res<Clock>,
    config: Res<InitialConfig>,
    state: Res<StateSystem>,
    mut client: ResMut<ClientSystem>,
    mut players: ResMut<PlayerSystem>,
    mut network: ResMut<NetworkSystem>,
    query: Query<(&Position, &Health, &Presence)>,
    mut host: MessageWriter<HostEvent>,
) {
    let Some(player) = client.player else { return };
    let Some(id) = client.player_id.clone() else { return };
    let Ok((position, health, presence)) = query.get(player) else {
        return;
    };

    if health.is_dead() {
        let died_at = *client.died_at.get_or_insert(clock.tick());
        let waited = clock.ticks_since(died_at) > config.ms_to_ticks(config.game_over_delay_ms);

        if (presence.is_gone() || waited) && !client.announced_death {
            info!("[CLIENT] Game over at tick {} with score {}", clock.tick(), client.last_valid_score);
            host.write(HostEvent::GameOver { score: client.last_valid_score });
            client.announced_death = true;
        }
        return;
    }
    client.died_at = None;

    let knocked_out = state.population().knocked_out;
    client.last_valid_score = knocked_out;
    if client.last_reported_score != Some(knocked_out) {
        host.write(HostEvent::Score { knocked_out, time_ms: clock.time_ms() });
        client.last_reported_score = Some(knocked_out);
    }

    if let Some(destination) = client.destination.take() {
        players.assign_player_destination(&id, destination);
        network.post_move(position.0, destination.position);
    }

    if let Some(target) = client.targeted_position.take() {
        players.assign_player_targeted_position(&id, target);
        network.post_target(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_player_resets_state() {
        let mut client = ClientSystem::default();
        client.assign_target(Vec2::ONE);
        client.announced_death = true;

        client.assign_player(Entity::from_bits(7), "me");

        assert_eq!(client.player_id(), Some("me"));
        assert!(client.is_client(Entity::from_bits(7)));
        assert_eq!(client.pending_target(), None);
        assert!(!client.game_over_announced());
    }

    #[test]
    fn test_release_forgets_player() {
        let mut client = ClientSystem::default();
        client.assign_player(Entity::from_bits(7), "me");
        client.release();
        assert_eq!(client.player(), None);
        assert!(!client.is_client(Entity::from_bits(7)));
    }
}
