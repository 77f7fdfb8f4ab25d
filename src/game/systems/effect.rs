use std::collections::VecDeque;

use bevy::prelude::*;

use crate::game::components::Position;
use crate::game::config::InitialConfig;
use crate::game::engine::clock::Clock;

/// A snowball burst left on the ground.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Splat {
    pub position: Vec2,
    pub direction: Vec2,
    pub shown_tick: u64,
}

/// Short-lived visual state: splats and the trails behind snowballs in
/// flight. Nothing here feeds back into the simulation.
#[derive(Resource, Debug, Default)]
pub struct EffectSystem {
    splats: Vec<Splat>,
    trails: Vec<(Entity, VecDeque<Vec2>)>,
}

impl EffectSystem {
    pub fn show_splat(&mut self, position: Vec2, direction: Vec2, tick: u64) {
        self.splats.push(Splat { position, direction, shown_tick: tick });
    }

    pub fn splats(&self) -> &[Splat] {
        &self.splats
    }

    pub fn add_trail(&mut self, entity: Entity) {
        if self.trail(entity).is_none() {
            self.trails.push((entity, VecDeque::new()));
        }
    }

    pub fn remove_trail(&mut self, entity: Entity) {
        self.trails.retain(|(e, _)| *e != entity);
    }

    /// Recent positions of `entity`, newest first.
    pub fn trail(&self, entity: Entity) -> Option<&VecDeque<Vec2>> {
        self.trails.iter().find(|(e, _)| *e == entity).map(|(_, trail)| trail)
    }

    pub fn clear(&mut self) {
        self.splats.clear();
        self.trails.clear();
    }
}

pub fn effect_update(
    clock: Res<Clock>,
    config: Res<InitialConfig>,
    mut effects: ResMut<EffectSystem>,
    positions: Query<&Position>,
) {
    let lifetime = config.ms_to_ticks(config.splat_lifetime_ms);
    effects.splats.retain(|splat| clock.ticks_since(splat.shown_tick) < lifetime);

    for (entity, trail) in effects.trails.iter_mut() {
        let Ok(position) = positions.get(*entity) else { continue };
        trail.push_front(position.0);
        trail.truncate(config.trail_length);
    }
}
