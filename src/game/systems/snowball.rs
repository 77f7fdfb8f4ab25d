use std::f32::consts::{FRAC_PI_2, PI};

use bevy::prelude::*;
use snowball_macros::profile;
use smallvec::smallvec;

use crate::game::components::*;
use crate::game::config::InitialConfig;
use crate::game::engine::clock::Clock;
use crate::game::engine::collision::{CollisionEvent, CollisionHandler, CollisionSystem};
use crate::game::engine::geometry::Shape;
use crate::game::engine::pool::Pool;
use crate::game::engine::random::SeedRandom;
use crate::game::events::{HostEvent, SoundCue};
use crate::game::systems::effect::EffectSystem;
use crate::game::systems::map::MapSystem;

/// Peak arc height of a full-length throw.
const ARC_HEIGHT: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingThrow {
    thrower: Entity,
    origin: Vec2,
    target: Vec2,
    big: bool,
}

/// A snowball that hit something this frame. Kept until the next update so
/// later systems can still tell who threw it after it was freed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Impact {
    pub snowball: Entity,
    pub thrower: Entity,
    pub direction: Vec2,
}

/// Owns every snowball in flight. Throws are queued and set up at the start
/// of the next snowball update.
#[derive(Resource, Debug)]
pub struct SnowballSystem {
    pending: Vec<PendingThrow>,
    impacts: Vec<Impact>,
    pool: Pool<Entity>,
    random: SeedRandom,
}

impl SnowballSystem {
    pub fn new(seed: u64) -> Self {
        Self { pending: Vec::new(), impacts: Vec::new(), pool: Pool::new(), random: SeedRandom::new(seed) }
    }

    /// Queue a throw from `origin` at `target`, spending one charge of the
    /// thrower's active powerup.
    pub fn throw_snowball(&mut self, thrower: Entity, origin: Vec2, target: Vec2, powerups: &mut Powerups) {
        let big = matches!(powerups.active(), Some(Powerup { kind: PowerupType::BigSnowball, .. }));
        powerups.decrement_active_quantity();
        self.pending.push(PendingThrow { thrower, origin, target, big });
    }

    /// The impact of `snowball` during the last update, if it hit anything.
    pub fn impact(&self, snowball: Entity) -> Option<&Impact> {
        self.impacts.iter().find(|impact| impact.snowball == snowball)
    }

    pub fn impacts(&self) -> &[Impact] {
        &self.impacts
    }

    pub fn pending_throws(&self) -> usize {
        self.pending.len()
    }

    /// Snowballs currently in flight.
    pub fn active(&self) -> &[Entity] {
        self.pool.allocated()
    }

    pub fn pool(&self) -> &Pool<Entity> {
        &self.pool
    }
}

/// Where a snowball is `tick`s into its flight: ground position, height
/// above the ground, and whether it reached its target.
pub fn trajectory_at(snowball: &Snowball, tick: u64, max_distance: f32, base_altitude: f32) -> (Vec2, f32, bool) {
    let Some(thrown) = snowball.thrown_tick else {
        return (snowball.origin, base_altitude, false);
    };

    let path = (snowball.target - snowball.origin).clamp_length_max(max_distance);
    if snowball.duration_ticks <= 0.0 {
        return (snowball.origin + path, base_altitude, true);
    }

    let elapsed = tick.saturating_sub(thrown) as f32;
    let time = (elapsed / snowball.duration_ticks).min(1.0);
    let distance_scale = path.length() / max_distance;
    let arc = snowball.arc_scale * snowball.arc_scale * (time * PI).sin() * ARC_HEIGHT * distance_scale;

    (snowball.origin + path * time, base_altitude + arc, elapsed >= snowball.duration_ticks)
}

/// 0 for throws straight up or down the screen, 1 for sideways throws.
fn arc_scale(path: Vec2) -> f32 {
    let angle = path.y.atan2(path.x).rem_euclid(PI);
    (angle - FRAC_PI_2).abs() / FRAC_PI_2
}

#[profile(1)]
pub fn snowball_update(
    clock: Res<Clock>,
    config: Res<InitialConfig>,
    map_system: Res<MapSystem>,
    mut snowballs: ResMut<SnowballSystem>,
    mut collisions: ResMut<CollisionSystem>,
    mut effects: ResMut<EffectSystem>,
    mut collision_events: MessageReader<CollisionEvent>,
    mut host: MessageWriter<HostEvent>,
    mut query: Query<(&mut Snowball, &mut Position, &mut Altitude, &mut Presence, &mut Subscriptions)>,
    mut commands: Commands,
) {
    let tick = clock.tick();
    let base_altitude = map_system.grid().cell_size / 2.0;
    let max_distance = config.snowball_max_distance;
    let snowballs = &mut *snowballs;
    snowballs.impacts.clear();

    for throw in std::mem::take(&mut snowballs.pending) {
        let entity = snowballs.pool.allocate_with(|| commands.spawn(Pooled).id());

        let path = (throw.target - throw.origin).clamp_length_max(max_distance);
        let radius = config.snowball_size / 2.0 * if throw.big { 2.0 } else { 1.0 };
        let skew = snowballs.random.spread(config.snowball_skew_degrees.to_radians());

        let handler = collisions.handle_collisions(entity, CollisionHandler::Snowball);
        collisions.add_collidable(entity);
        effects.add_trail(entity);

        commands.entity(entity).insert((
            Snowball {
                thrower: throw.thrower,
                origin: throw.origin,
                target: throw.target,
                direction: path.normalize_or_zero(),
                thrown_tick: Some(tick),
                duration_ticks: config.snowball_max_ticks * path.length() / max_distance,
                arc_scale: arc_scale(path),
                skew,
                big: throw.big,
                collided_with: None,
            },
            Position(throw.origin),
            Altitude(base_altitude),
            Collider::dynamic(Shape::circle(radius)),
            Presence::default(),
            Subscriptions(smallvec![handler]),
            Lod::default(),
        ));
    }

    for event in collision_events.read() {
        if event.handler != CollisionHandler::Snowball {
            continue;
        }
        let Ok((mut snowball, ..)) = query.get_mut(event.entity) else { continue };
        if event.other == snowball.thrower || snowball.collided_with.is_some() {
            continue;
        }
        snowball.collided_with = Some(event.other);
        host.write(HostEvent::Sound(SoundCue::SnowballHit));
    }

    for entity in snowballs.pool.allocated().to_vec() {
        // Set up this frame; the components land at the next sync point.
        let Ok((snowball, mut position, mut altitude, mut presence, mut subscriptions)) = query.get_mut(entity) else {
            continue;
        };

        if snowball.collided_with.is_some() {
            snowballs.impacts.push(Impact { snowball: entity, thrower: snowball.thrower, direction: snowball.direction });
        } else {
            let (ground, height, finished) = trajectory_at(&snowball, tick, max_distance, base_altitude);
            position.0 = ground;
            altitude.0 = height;
            if finished {
                *presence = Presence::Gone;
            } else {
                continue;
            }
        }

        effects.show_splat(position.0, snowball.direction, tick);
        effects.remove_trail(entity);
        for id in subscriptions.0.drain(..) {
            collisions.unsubscribe(id);
        }
        collisions.remove_collidable(entity);
        snowballs.pool.free(entity);
        commands.entity(entity).retain::<Pooled>();
    }
}

/// Free every snowball in flight and drop queued throws.
pub fn teardown(world: &mut World) {
    let released = {
        let mut snowballs = world.resource_mut::<SnowballSystem>();
        snowballs.pending.clear();
        snowballs.impacts.clear();
        snowballs.pool.release_all()
    };

    for entity in released {
        let subscriptions = world
            .get_mut::<Subscriptions>(entity)
            .map(|mut subscriptions| std::mem::take(&mut subscriptions.0))
            .unwrap_or_default();
        {
            let mut collisions = world.resource_mut::<CollisionSystem>();
            for id in subscriptions {
                collisions.unsubscribe(id);
            }
            collisions.remove_collidable(entity);
        }
        if let Ok(mut snowball) = world.get_entity_mut(entity) {
            snowball.retain::<Pooled>();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snowball(origin: Vec2, target: Vec2) -> Snowball {
        let path = (target - origin).clamp_length_max(256.0);
        Snowball {
            thrower: Entity::from_bits(1),
            origin,
            target,
            direction: path.normalize_or_zero(),
            thrown_tick: Some(100),
            duration_ticks: 42.0 * path.length() / 256.0,
            arc_scale: arc_scale(path),
            skew: 0.0,
            big: false,
            collided_with: None,
        }
    }

    #[test]
    fn test_full_length_throw_lands_after_max_ticks() {
        let ball = snowball(Vec2::ZERO, Vec2::new(256.0, 0.0));

        let (_, _, finished) = trajectory_at(&ball, 141, 256.0, 32.0);
        assert!(!finished);

        let (position, altitude, finished) = trajectory_at(&ball, 142, 256.0, 32.0);
        assert!(finished);
        assert!((position - Vec2::new(256.0, 0.0)).length() < 1e-3);
        assert!((altitude - 32.0).abs() < 1e-3);
    }

    #[test]
    fn test_long_throws_are_clamped() {
        let ball = snowball(Vec2::ZERO, Vec2::new(1000.0, 0.0));
        assert!((ball.duration_ticks - 42.0).abs() < 1e-4);

        let (position, _, _) = trajectory_at(&ball, 142, 256.0, 32.0);
        assert!((position - Vec2::new(256.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn test_sideways_throws_arc_highest() {
        assert!((arc_scale(Vec2::X) - 1.0).abs() < 1e-6);
        assert!(arc_scale(Vec2::Y).abs() < 1e-6);

        let ball = snowball(Vec2::ZERO, Vec2::new(256.0, 0.0));
        let (_, midway, _) = trajectory_at(&ball, 121, 256.0, 0.0);
        assert!((midway - ARC_HEIGHT).abs() < 1e-3);
    }

    #[test]
    fn test_throw_at_own_position_finishes_immediately() {
        let ball = snowball(Vec2::ONE, Vec2::ONE);
        let (position, _, finished) = trajectory_at(&ball, 100, 256.0, 32.0);
        assert!(finished);
        assert_eq!(position, Vec2::ONE);
    }

    #[test]
    fn test_throw_spends_powerup() {
        let mut system = SnowballSystem::new(1);
        let mut powerups = Powerups::default();
        powerups.collect(PowerupType::BigSnowball, 1);

        system.throw_snowball(Entity::from_bits(1), Vec2::ZERO, Vec2::X, &mut powerups);
        system.throw_snowball(Entity::from_bits(1), Vec2::ZERO, Vec2::X, &mut powerups);

        assert_eq!(powerups.active(), None);
        assert_eq!(system.pending_throws(), 2);
        assert!(system.pending[0].big);
        assert!(!system.pending[1].big);
    }
}
