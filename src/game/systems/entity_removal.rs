//! Takes knocked-out entities off the island.
//!
//! Two exits exist. Freezing puts the entity on an iceberg that drifts out
//! to sea until it is far enough off-screen; teleporting waits a moment,
//! then lifts and fades the entity out. Either way the entity ends with
//! [`Presence::Gone`] and its owner frees it.

use bevy::prelude::*;

use crate::game::components::*;
use crate::game::config::InitialConfig;
use crate::game::engine::clock::Clock;
use crate::game::engine::pool::Pool;
use crate::game::systems::map::MapSystem;

#[derive(Resource, Debug, Default)]
pub struct EntityRemovalSystem {
    freezing: Vec<Entity>,
    /// Frozen entity and the iceberg carrying it.
    frozen: Vec<(Entity, Entity)>,
    teleporting: Vec<Entity>,
    icebergs: Pool<Entity>,
}

impl EntityRemovalSystem {
    /// Start freezing `entity`. No-op when it is already leaving.
    pub fn freeze_entity(&mut self, entity: Entity, presence: &mut Presence, tick: u64) -> bool {
        if !presence.exit(tick) {
            return false;
        }
        self.freezing.push(entity);
        true
    }

    /// Start teleporting `entity`. No-op when it is already leaving.
    pub fn teleport_entity(&mut self, entity: Entity, presence: &mut Presence, tick: u64) -> bool {
        if !presence.exit(tick) {
            return false;
        }
        self.teleporting.push(entity);
        true
    }

    pub fn is_frozen(&self, entity: Entity) -> bool {
        self.freezing.contains(&entity) || self.frozen.iter().any(|(e, _)| *e == entity)
    }

    pub fn is_teleporting(&self, entity: Entity) -> bool {
        self.teleporting.contains(&entity)
    }

    pub fn icebergs(&self) -> &[Entity] {
        self.icebergs.allocated()
    }
}

/// Altitude and opacity `elapsed` ticks into a teleport, or `None` while
/// still waiting. The third value is true once the entity has faded out.
pub fn teleport_progress(elapsed: u64, delay: u64, duration: u64, cell_size: f32) -> Option<(f32, f32, bool)> {
    let rising = elapsed.checked_sub(delay)?;
    let t = if duration == 0 { 1.0 } else { (rising as f32 / duration as f32).min(1.0) };
    Some((t * t * cell_size / 1.5, 1.0 - t, t >= 1.0))
}

pub fn entity_removal_update(
    clock: Res<Clock>,
    config: Res<InitialConfig>,
    map_system: Res<MapSystem>,
    mut removal: ResMut<EntityRemovalSystem>,
    mut entities: Query<(&mut Position, &mut Presence, Option<&mut Altitude>, Option<&mut Opacity>), Without<Iceberg>>,
    mut icebergs: Query<(&Iceberg, &mut Position)>,
    mut commands: Commands,
) {
    let grid = map_system.grid();
    let removal = &mut *removal;

    for entity in std::mem::take(&mut removal.freezing) {
        let Ok((mut position, ..)) = entities.get_mut(entity) else { continue };

        let start = grid
            .position_to_index(position.0)
            .map_or(position.0, |index| grid.index_to_position(index));
        let heading = start.try_normalize().unwrap_or(Vec2::X);

        let iceberg = removal.icebergs.allocate_with(|| commands.spawn(Pooled).id());
        commands.entity(iceberg).insert((
            Iceberg { carrying: Some(entity), heading },
            Position(start),
            Altitude::default(),
        ));
        position.0 = start;
        removal.frozen.push((entity, iceberg));
        debug!("[REMOVAL] Froze {:?} on iceberg {:?}", entity, iceberg);
    }

    // Far enough out that the iceberg is off-screen wherever the camera is.
    let rings = map_system.map().map_or(0, |map| map.ring_count());
    let sea_edge = config.view_width.hypot(config.view_height) / 2.0 + (rings + 2) as f32 * grid.cell_size;

    let mut frozen = Vec::with_capacity(removal.frozen.len());
    for (entity, iceberg) in std::mem::take(&mut removal.frozen) {
        // Spawned this frame; its components land at the next sync point.
        let Ok((floe, mut floe_position)) = icebergs.get_mut(iceberg) else {
            frozen.push((entity, iceberg));
            continue;
        };

        floe_position.0 += floe.heading * config.iceberg_speed;

        let carried = match entities.get_mut(entity) {
            Ok((mut position, mut presence, ..)) if presence.is_exiting() => {
                position.0 = floe_position.0;
                if floe_position.0.length() > sea_edge {
                    *presence = Presence::Gone;
                    false
                } else {
                    true
                }
            }
            _ => false,
        };

        if carried {
            frozen.push((entity, iceberg));
        } else {
            removal.icebergs.free(iceberg);
            commands.entity(iceberg).retain::<Pooled>();
        }
    }
    removal.frozen = frozen;

    let delay = config.ms_to_ticks(config.teleport_delay_ms);
    let duration = config.ms_to_ticks(config.teleport_duration_ms);

    removal.teleporting.retain(|&entity| {
        let Ok((_, mut presence, altitude, opacity)) = entities.get_mut(entity) else {
            return false;
        };
        // Revived by the server.
        let Presence::Exiting { since } = *presence else {
            return false;
        };

        let Some((height, alpha, finished)) =
            teleport_progress(clock.ticks_since(since), delay, duration, grid.cell_size)
        else {
            return true;
        };

        if let Some(mut altitude) = altitude {
            altitude.0 = height;
        }
        if let Some(mut opacity) = opacity {
            opacity.0 = alpha;
        }
        if finished {
            *presence = Presence::Gone;
        }
        !finished
    });
}

/// Free every iceberg and forget pending removals.
pub fn teardown(world: &mut World) {
    let released = {
        let mut removal = world.resource_mut::<EntityRemovalSystem>();
        removal.freezing.clear();
        removal.frozen.clear();
        removal.teleporting.clear();
        removal.icebergs.release_all()
    };

    for iceberg in released {
        if let Ok(mut entity) = world.get_entity_mut(iceberg) {
            entity.retain::<Pooled>();
        }
    }
}
