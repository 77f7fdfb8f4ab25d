use bevy::prelude::*;

use crate::game::components::{Lod, Position};
use crate::game::config::InitialConfig;
use crate::game::engine::collision::CollisionSystem;
use crate::game::engine::geometry::rect_contains_point;
use crate::game::systems::client::ClientSystem;

/// Picks the level of detail of every entity from the camera view and
/// limits collision checks to the same area.
#[derive(Resource, Debug)]
pub struct LodSystem {
    size: Vec2,
    limit: Rect,
}

impl LodSystem {
    pub fn new(config: &InitialConfig) -> Self {
        // The camera looks down at an angle, so the ground visible on
        // screen is taller than the view.
        let size = Vec2::new(
            config.view_width + config.view_margin,
            config.view_height * 4.0 / 3.0 + config.view_margin,
        );
        Self { size, limit: Rect::from_center_size(Vec2::ZERO, size) }
    }

    pub fn limit(&self) -> Rect {
        self.limit
    }

    pub fn focus_on(&mut self, center: Vec2) {
        self.limit = Rect::from_center_size(center, self.size);
    }

    pub fn level_at(&self, position: Vec2) -> Lod {
        if rect_contains_point(&self.limit, position) {
            Lod::High
        } else {
            Lod::Low
        }
    }
}

pub fn lod_update(
    mut lod: ResMut<LodSystem>,
    mut collisions: ResMut<CollisionSystem>,
    client: Res<ClientSystem>,
    positions: Query<&Position>,
    mut entities: Query<(&Position, &mut Lod)>,
) {
    let focus = client
        .player()
        .and_then(|player| positions.get(player).ok())
        .map_or(Vec2::ZERO, |position| position.0);

    lod.focus_on(focus);
    collisions.set_limit(Some(lod.limit()));

    for (position, mut level) in &mut entities {
        level.set_if_neq(lod.level_at(position.0));
    }
}
