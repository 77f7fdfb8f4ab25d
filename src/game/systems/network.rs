//! Applies server messages to the local simulation.
//!
//! The transport decodes messages and hands them to
//! [`NetworkSystem::receive`] whenever they arrive. Nothing is applied until
//! the network slot of the next frame, where a pending reset is applied
//! first and then the buffered messages in receipt order. Local input goes
//! the other way through the outbox.

use std::collections::VecDeque;

use bevy::prelude::*;

use crate::game::components::*;
use crate::game::engine::clock::Clock;
use crate::game::protocol::{ClientMessage, PlayerSnapshot, ResetState, ServerMessage, UpdateOp};
use crate::game::systems::client::ClientSystem;
use crate::game::systems::map::{rebuild_map, MapSystem};
use crate::game::systems::player::{
    add_player_from_snapshot, clear_all_players, remove_player, PlayerSystem,
};
use crate::game::systems::state::StateSystem;

/// Bounded FIFO of server messages waiting for the next frame. When full
/// the oldest message is dropped.
#[derive(Debug, Clone)]
pub struct Inbox {
    messages: VecDeque<ServerMessage>,
    capacity: usize,
}

impl Inbox {
    pub fn new(capacity: usize) -> Self {
        Self { messages: VecDeque::new(), capacity: capacity.max(1) }
    }

    /// Returns the message that was dropped to make room, if any.
    pub fn push(&mut self, message: ServerMessage) -> Option<ServerMessage> {
        let dropped = if self.messages.len() >= self.capacity { self.messages.pop_front() } else { None };
        self.messages.push_back(message);
        dropped
    }

    pub fn drain(&mut self) -> Vec<ServerMessage> {
        self.messages.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[derive(Resource, Debug)]
pub struct NetworkSystem {
    inbox: Inbox,
    pending_reset: Option<(u64, ResetState)>,
    client_player_id: Option<String>,
    connected: bool,
    outbox: Vec<ClientMessage>,
}

impl NetworkSystem {
    pub fn new(inbox_capacity: usize) -> Self {
        Self {
            inbox: Inbox::new(inbox_capacity),
            pending_reset: None,
            client_player_id: None,
            connected: false,
            outbox: Vec::new(),
        }
    }

    /// Buffer a message from the server until the next frame.
    pub fn receive(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::PlayerAssigned { id } => {
                info!("[NETWORK] Assigned player {}", id);
                self.client_player_id = Some(id);
            }
            ServerMessage::Reset { tick, state } => {
                // Everything queued before a reset is superseded by it.
                if !self.inbox.is_empty() {
                    debug!("[NETWORK] Reset at tick {} discards {} queued messages", tick, self.inbox.len());
                }
                self.inbox.clear();
                self.pending_reset = Some((tick, state));
            }
            message => {
                if let Some(dropped) = self.inbox.push(message) {
                    warn!("[NETWORK] Inbox full, dropped {:?}", dropped);
                }
            }
        }
    }

    pub fn connect(&mut self) {
        self.connected = true;
    }

    pub fn disconnect(&mut self) {
        self.connected = false;
        self.outbox.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn client_player_id(&self) -> Option<&str> {
        self.client_player_id.as_deref()
    }

    pub fn pending(&self) -> usize {
        self.inbox.len() + usize::from(self.pending_reset.is_some())
    }

    fn post(&mut self, message: ClientMessage) {
        if self.connected {
            self.outbox.push(message);
        }
    }

    pub fn post_move(&mut self, from: Vec2, to: Vec2) {
        self.post(ClientMessage::Move { path: [from.into(), to.into()] });
    }

    pub fn post_target(&mut self, target: Vec2) {
        self.post(ClientMessage::Target { target: target.into() });
    }

    /// Take every message posted since the last drain.
    pub fn drain_outbox(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outbox)
    }
}

pub fn network_update(world: &mut World) {
    let (reset, messages) = {
        let mut network = world.resource_mut::<NetworkSystem>();
        (network.pending_reset.take(), network.inbox.drain())
    };

    if let Some((tick, state)) = reset {
        apply_reset(world, tick, &state);
    }

    for message in messages {
        match message {
            ServerMessage::Update { tick, state } => apply_update(world, tick, state),
            ServerMessage::TimeSynchronized { time_zero, time } => {
                world.resource_mut::<Clock>().synchronize(time_zero, time);
            }
            ServerMessage::PopulationAnnounced { state } => {
                world.resource_mut::<StateSystem>().set_server_population(state);
            }
            // Handled on receipt.
            ServerMessage::PlayerAssigned { .. } | ServerMessage::Reset { .. } => {}
        }
    }
}

/// Rebuild the match from a server snapshot. Every client applying the same
/// reset ends up with the same map and roster.
pub fn apply_reset(world: &mut World, tick: u64, state: &ResetState) {
    rebuild_map(world, state.seed);
    world.resource_mut::<MapSystem>().erode(state.erode);

    clear_all_players(world);
    world.resource_mut::<StateSystem>().reset();

    for (id, snapshot) in &state.players {
        if let Err(e) = add_player_from_snapshot(world, id, snapshot) {
            warn!("[NETWORK] Skipping roster entry {}: {}", id, e);
        }
    }

    bind_client_player(world);

    info!(
        "[NETWORK] Reset at tick {}: seed {}, {} erosion steps, {} players",
        tick,
        state.seed,
        state.erode,
        state.players.len()
    );
}

fn bind_client_player(world: &mut World) {
    let Some(id) = world.resource::<NetworkSystem>().client_player_id.clone() else { return };
    if world.resource::<ClientSystem>().player().is_some() {
        return;
    }
    if let Some(entity) = world.resource::<PlayerSystem>().get_player(&id) {
        world.resource_mut::<ClientSystem>().assign_player(entity, id);
    }
}

fn apply_update(world: &mut World, tick: u64, op: UpdateOp) {
    match op {
        UpdateOp::Join { id } => {
            if world.resource::<PlayerSystem>().has_player(&id) {
                return;
            }
            let snapshot = PlayerSnapshot { join_tick: tick, at: None, destination: None };
            match add_player_from_snapshot(world, &id, &snapshot) {
                Ok(_) => bind_client_player(world),
                Err(e) => warn!("[NETWORK] Join of {} failed: {}", id, e),
            }
        }
        UpdateOp::Part { id } => {
            if !remove_player(world, &id) {
                debug!("[NETWORK] Part for unknown player {}", id);
            }
        }
        UpdateOp::Erode => world.resource_mut::<MapSystem>().erode(1),
        UpdateOp::Move { id, path } => {
            let Some(&last) = path.last() else {
                warn!("[NETWORK] Move for {} without a path", id);
                return;
            };
            apply_move(world, &id, last.into());
        }
        UpdateOp::Target { id, target } => {
            let Some(entity) = world.resource::<PlayerSystem>().get_player(&id) else { return };
            // The client's own throws are already applied locally.
            if world.resource::<ClientSystem>().is_client(entity) {
                return;
            }
            world.resource_mut::<PlayerSystem>().assign_player_targeted_position(&id, target.into());
        }
        UpdateOp::Unknown => warn!("[NETWORK] Unhandled update op at tick {}", tick),
    }
}

/// Revive `id` and place it at `position`, landing it if it was still in
/// the air.
fn apply_move(world: &mut World, id: &str, position: Vec2) {
    let Some(entity) = world.resource::<PlayerSystem>().get_player(id) else {
        debug!("[NETWORK] Move for unknown player {}", id);
        return;
    };
    let index = world.resource::<MapSystem>().grid().position_to_index(position);
    let is_client = world.resource::<ClientSystem>().is_client(entity);

    let mut player = world.entity_mut(entity);

    if let Some(mut health) = player.get_mut::<Health>() {
        health.revive();
    }

    // A frozen player stays frozen; a teleport is cancelled.
    let sinking = player.get::<PlayerState>().is_some_and(|state| *state >= PlayerState::Sinking);
    if let Some(mut presence) = player.get_mut::<Presence>() {
        if presence.is_exiting() && !sinking {
            *presence = Presence::Present;
        }
    }
    if player.get::<Presence>().is_some_and(Presence::is_present) {
        player.insert((Opacity(1.0), Altitude(0.0)));
    }

    let mut landed = false;
    if let Some(mut arrival) = player.get_mut::<Arrival>() {
        if !arrival.arrived {
            arrival.arrived = true;
            arrival.tile_index = index;
            landed = true;
        }
    }
    if landed {
        if let Some(mut state) = player.get_mut::<PlayerState>() {
            state.advance_to(PlayerState::Active);
        }
    }

    // The client already walks toward its own destination.
    let walking_there = is_client
        && player
            .get::<Path>()
            .and_then(|path| path.destination)
            .is_some_and(|destination| destination.position == position);
    if !walking_there {
        if let Some(mut path) = player.get_mut::<Path>() {
            path.clear();
        }
        if let Some(mut current) = player.get_mut::<Position>() {
            current.0 = position;
        }
    }

    if landed {
        world.resource_mut::<PlayerSystem>().mark_landed(entity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::protocol::{Population, WirePoint};

    fn update(tick: u64, state: UpdateOp) -> ServerMessage {
        ServerMessage::Update { tick, state }
    }

    #[test]
    fn test_inbox_drops_oldest_when_full() {
        let mut inbox = Inbox::new(2);
        assert!(inbox.push(update(1, UpdateOp::Erode)).is_none());
        assert!(inbox.push(update(2, UpdateOp::Erode)).is_none());
        assert_eq!(inbox.push(update(3, UpdateOp::Erode)), Some(update(1, UpdateOp::Erode)));

        assert_eq!(inbox.drain(), vec![update(2, UpdateOp::Erode), update(3, UpdateOp::Erode)]);
        assert!(inbox.is_empty());
    }

    #[test]
    fn test_reset_discards_earlier_messages() {
        let mut network = NetworkSystem::new(16);
        network.receive(update(1, UpdateOp::Erode));
        network.receive(ServerMessage::Reset {
            tick: 2,
            state: ResetState { seed: 1, erode: 0, players: Default::default() },
        });
        network.receive(ServerMessage::PopulationAnnounced { state: Population::default() });

        assert_eq!(network.pending(), 2);
        assert_eq!(network.inbox.len(), 1);
    }

    #[test]
    fn test_player_assigned_applies_immediately() {
        let mut network = NetworkSystem::new(16);
        network.receive(ServerMessage::PlayerAssigned { id: "me".into() });
        assert_eq!(network.client_player_id(), Some("me"));
        assert_eq!(network.pending(), 0);
    }

    #[test]
    fn test_outbox_requires_connection() {
        let mut network = NetworkSystem::new(16);
        network.post_target(Vec2::ONE);
        assert!(network.drain_outbox().is_empty());

        network.connect();
        network.post_move(Vec2::ZERO, Vec2::X);
        network.post_target(Vec2::ONE);
        assert_eq!(
            network.drain_outbox(),
            vec![
                ClientMessage::Move { path: [WirePoint { x: 0.0, y: 0.0 }, WirePoint { x: 1.0, y: 0.0 }] },
                ClientMessage::Target { target: WirePoint { x: 1.0, y: 1.0 } },
            ]
        );
        assert!(network.drain_outbox().is_empty());
    }
}
