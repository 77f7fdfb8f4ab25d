//! Offline match driver.
//!
//! Without a server somebody has to build the map, fill the island and keep
//! the match moving. The local level does that: it generates the map from
//! the configured seed, adds a roster of bots, erodes the island on a
//! fixed interval and parachutes in supply drops.

use bevy::prelude::*;

use crate::game::components::Bot;
use crate::game::config::InitialConfig;
use crate::game::engine::clock::Clock;
use crate::game::systems::drop::DropSystem;
use crate::game::systems::map::{rebuild_map, MapSystem};
use crate::game::systems::player::add_player;

#[derive(Resource, Debug, Clone)]
pub struct LocalLevel {
    enabled: bool,
    started_at: Option<u64>,
    bot_count: usize,
    erode_interval: u64,
    drop_interval: u64,
}

impl LocalLevel {
    pub fn new(config: &InitialConfig, enabled: bool) -> Self {
        Self {
            enabled,
            started_at: None,
            bot_count: config.local_bot_count,
            erode_interval: config.local_erode_interval_ticks,
            drop_interval: config.local_drop_interval_ticks,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn started_at(&self) -> Option<u64> {
        self.started_at
    }
}

fn is_due(elapsed: u64, interval: u64) -> bool {
    interval > 0 && elapsed > 0 && elapsed % interval == 0
}

pub fn local_level_update(world: &mut World) {
    let level = world.resource::<LocalLevel>().clone();
    if !level.enabled {
        return;
    }
    let tick = world.resource::<Clock>().tick();

    let Some(started_at) = level.started_at else {
        start_match(world, &level, tick);
        return;
    };

    let elapsed = tick.saturating_sub(started_at);
    if is_due(elapsed, level.erode_interval) {
        world.resource_mut::<MapSystem>().erode(1);
    }
    if is_due(elapsed, level.drop_interval) {
        world.resource_mut::<DropSystem>().add_drop(None);
    }
}

fn start_match(world: &mut World, level: &LocalLevel, tick: u64) {
    let seed = world.resource::<InitialConfig>().seed;
    rebuild_map(world, seed);

    for n in 0..level.bot_count {
        match add_player(world, Some(&format!("bot-{}", n)), None) {
            Ok(entity) => {
                world.entity_mut(entity).insert(Bot::default());
            }
            Err(e) => warn!("[LEVEL] Could not add bot {}: {}", n, e),
        }
    }

    world.resource_mut::<LocalLevel>().started_at = Some(tick);
    info!("[LEVEL] Local match started at tick {} with {} bots", tick, level.bot_count);
}
