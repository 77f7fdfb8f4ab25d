use bevy::prelude::*;
use snowball_macros::profile;

use crate::game::components::*;
use crate::game::config::InitialConfig;
use crate::game::engine::clock::Clock;
use crate::game::engine::collision::CollisionSystem;
use crate::game::engine::random::SeedRandom;
use crate::game::systems::map::MapSystem;
use crate::game::systems::player::PlayerSystem;

/// Drives players tagged with [`Bot`]: wander around, throw at whoever is
/// close. Bots issue the same destination and target requests a human
/// player would.
#[derive(Resource, Debug)]
pub struct BotSystem {
    random: SeedRandom,
}

impl BotSystem {
    pub fn new(seed: u64) -> Self {
        Self { random: SeedRandom::new(seed) }
    }
}

/// A candidate the bot could throw at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sighting {
    pub entity: Entity,
    pub position: Vec2,
}

/// The previous target if it is still in sight, otherwise the nearest
/// sighting. Ties go to the earlier sighting.
pub fn choose_target(from: Vec2, sightings: &[Sighting], previous: Option<Entity>) -> Option<Sighting> {
    if let Some(kept) = sightings.iter().find(|s| Some(s.entity) == previous) {
        return Some(*kept);
    }
    sightings.iter().copied().reduce(|best, candidate| {
        if candidate.position.distance_squared(from) < best.position.distance_squared(from) {
            candidate
        } else {
            best
        }
    })
}

#[profile(1)]
pub fn bot_update(
    clock: Res<Clock>,
    config: Res<InitialConfig>,
    map_system: Res<MapSystem>,
    collisions: Res<CollisionSystem>,
    mut bots: ResMut<BotSystem>,
    mut players: ResMut<PlayerSystem>,
    mut bot_query: Query<(Entity, &mut Bot, &PlayerId, &Position, &Path, &Health, &PlayerState)>,
    targets: Query<(&Position, &Health, &Presence), With<PlayerId>>,
) {
    let Some(map) = map_system.map() else { return };
    let grid = map_system.grid();
    let tick = clock.tick();
    let scan = Rect::from_center_size(Vec2::ZERO, Vec2::splat(config.bot_scan_radius * 2.0));

    for (entity, mut bot, id, position, path, health, state) in &mut bot_query {
        if health.is_dead() || *state != PlayerState::Active {
            continue;
        }

        if path.is_complete() && bots.random.random() < config.bot_wander_chance {
            if let Some(tile) = grid.position_to_index(position.0) {
                let next = map.random_nearby_passable_tile_index(tile, config.bot_wander_radius, &mut bots.random);
                if next != tile {
                    players.assign_player_destination(
                        &id.0,
                        Destination { index: Some(next), position: grid.index_to_position(next) },
                    );
                }
            }
        }

        let cooled_down = bot
            .last_throw_tick
            .is_none_or(|thrown| clock.ticks_since(thrown) >= config.bot_throw_cooldown_ticks);
        if !cooled_down {
            continue;
        }

        let area = Rect { min: scan.min + position.0, max: scan.max + position.0 };
        let sightings: Vec<Sighting> = collisions
            .query_area(area)
            .into_iter()
            .filter(|&other| other != entity)
            .filter_map(|other| {
                let (target_position, target_health, presence) = targets.get(other).ok()?;
                let in_range = target_position.0.distance(position.0) <= config.bot_scan_radius;
                (in_range && target_health.alive && presence.is_present())
                    .then_some(Sighting { entity: other, position: target_position.0 })
            })
            .collect();

        let Some(target) = choose_target(position.0, &sightings, bot.last_target) else {
            continue;
        };

        players.assign_player_targeted_position(&id.0, target.position);
        bot.last_target = Some(target.entity);
        bot.last_throw_tick = Some(tick);
    }
}
