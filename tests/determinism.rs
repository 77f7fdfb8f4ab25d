use std::collections::BTreeMap;

use bevy::prelude::*;
use snowball::game::components::*;
use snowball::game::config::InitialConfig;
use snowball::game::protocol::{PlayerSnapshot, ResetState, ServerMessage, UpdateOp, WirePoint};
use snowball::game::systems::map::MapSystem;
use snowball::game::systems::network::NetworkSystem;
use snowball::game::SnowballGame;

fn config() -> InitialConfig {
    InitialConfig { grid_width: 32, grid_height: 32, ..Default::default() }
}

/// Player id, position and lifecycle state, sorted by id.
fn snapshot(game: &mut SnowballGame) -> Vec<(String, Vec2, PlayerState)> {
    let world = game.world_mut();
    let mut query = world.query::<(&PlayerId, &Position, &PlayerState)>();
    let mut players: Vec<_> = query
        .iter(world)
        .map(|(id, position, state)| (id.0.clone(), position.0, *state))
        .collect();
    players.sort_by(|a, b| a.0.cmp(&b.0));
    players
}

fn replay(messages: &[ServerMessage], frames: usize) -> SnowballGame {
    let mut game = SnowballGame::new(config());
    for message in messages {
        game.world_mut().resource_mut::<NetworkSystem>().receive(message.clone());
    }
    for _ in 0..frames {
        game.update();
    }
    game
}

#[test]
fn test_same_reset_produces_same_world() {
    let mut rng = fastrand::Rng::with_seed(42);
    let mut players = BTreeMap::new();
    for n in 0..8 {
        players.insert(
            format!("p{}", n),
            PlayerSnapshot { join_tick: rng.u64(0..1000), at: None, destination: None },
        );
    }

    let messages = vec![
        ServerMessage::Reset { tick: 0, state: ResetState { seed: 1234, erode: 3, players } },
        ServerMessage::Update { tick: 1, state: UpdateOp::Erode },
        ServerMessage::Update {
            tick: 1,
            state: UpdateOp::Move { id: "p3".into(), path: vec![WirePoint { x: 0.0, y: 0.0 }] },
        },
    ];

    let mut first = replay(&messages, 200);
    let mut second = replay(&messages, 200);

    let map_a = first.world().resource::<MapSystem>().map().unwrap().tile_states().to_vec();
    let map_b = second.world().resource::<MapSystem>().map().unwrap().tile_states().to_vec();
    assert_eq!(map_a, map_b);

    let players_a = snapshot(&mut first);
    assert_eq!(players_a.len(), 8);
    assert_eq!(players_a, snapshot(&mut second));
}

#[test]
fn test_local_match_is_deterministic() {
    let config = InitialConfig { local_bot_count: 6, local_erode_interval_ticks: 20, ..config() };

    let mut first = SnowballGame::local(config.clone());
    let mut second = SnowballGame::local(config);
    for _ in 0..400 {
        first.update();
        second.update();
    }

    assert_eq!(snapshot(&mut first), snapshot(&mut second));
}

#[test]
fn test_player_lifecycle_is_monotonic() {
    let config = InitialConfig {
        local_bot_count: 8,
        local_erode_interval_ticks: 5,
        bot_wander_chance: 0.2,
        ..config()
    };
    let mut game = SnowballGame::local(config);
    let mut last: BTreeMap<String, PlayerState> = BTreeMap::new();

    for _ in 0..1500 {
        game.update();
        for (id, _, state) in snapshot(&mut game) {
            if let Some(previous) = last.get(&id) {
                assert!(state >= *previous, "{} went from {:?} to {:?}", id, previous, state);
            }
            last.insert(id, state);
        }
    }

    assert_eq!(last.len(), 8);
}
