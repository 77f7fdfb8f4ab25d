/// Component definitions shared by the game systems.
///
/// Entities are plain component bundles. The system that owns an entity
/// kind performs its setup, per-frame update and teardown; other systems
/// only read these components or go through the owner's methods.

use std::collections::VecDeque;

use bevy::prelude::*;
use smallvec::SmallVec;

use crate::game::engine::collision::HandlerId;
use crate::game::engine::geometry::{PlacedShape, Shape};

// ============================================================================
// Spatial Components
// ============================================================================

/// World position on the island plane (+y up).
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct Position(pub Vec2);

/// Height above the ground, used by parachutes and snowball arcs.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct Altitude(pub f32);

/// Facing angle in radians.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct Facing(pub f32);

#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Opacity(pub f32);

impl Default for Opacity {
    fn default() -> Self {
        Self(1.0)
    }
}

/// Level of detail chosen by the lod system.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Lod {
    #[default]
    High,
    Low,
}

// ============================================================================
// Collision Components
// ============================================================================

/// Collision shape. The shape is centred on the entity's [`Position`], so it
/// moves with the entity without being copied.
#[derive(Component, Debug, Clone, Copy)]
pub struct Collider {
    pub shape: Shape,
    /// Static colliders are indexed once and never re-inserted.
    pub is_static: bool,
}

impl Collider {
    pub fn dynamic(shape: Shape) -> Self {
        Self { shape, is_static: false }
    }

    pub fn fixed(shape: Shape) -> Self {
        Self { shape, is_static: true }
    }

    pub fn placed(&self, position: &Position) -> PlacedShape {
        self.shape.at(position.0)
    }
}

/// Collision handlers registered for this entity, released on teardown.
#[derive(Component, Debug, Clone, Default)]
pub struct Subscriptions(pub SmallVec<[HandlerId; 2]>);

// ============================================================================
// Lifecycle Components
// ============================================================================

#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Presence {
    #[default]
    Present,
    Exiting {
        since: u64,
    },
    Gone,
}

impl Presence {
    pub fn is_present(&self) -> bool {
        matches!(self, Presence::Present)
    }

    pub fn is_exiting(&self) -> bool {
        matches!(self, Presence::Exiting { .. })
    }

    pub fn is_gone(&self) -> bool {
        matches!(self, Presence::Gone)
    }

    /// Start exiting. Returns false when already exiting or gone.
    pub fn exit(&mut self, tick: u64) -> bool {
        if !self.is_present() {
            return false;
        }
        *self = Presence::Exiting { since: tick };
        true
    }
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    pub alive: bool,
    pub died_at: Option<u64>,
}

impl Default for Health {
    fn default() -> Self {
        Self { alive: true, died_at: None }
    }
}

impl Health {
    pub fn is_dead(&self) -> bool {
        !self.alive
    }

    pub fn die(&mut self, tick: u64) {
        if self.alive {
            self.alive = false;
            self.died_at = Some(tick);
        }
    }

    pub fn revive(&mut self) {
        self.alive = true;
        self.died_at = None;
    }
}

/// Parachute landing state.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Arrival {
    pub dropped_tick: Option<u64>,
    pub arrived: bool,
    pub tile_index: Option<usize>,
}

impl Arrival {
    pub fn at_tile(tile_index: Option<usize>) -> Self {
        Self { tile_index, ..default() }
    }

    pub fn landed(tile_index: Option<usize>) -> Self {
        Self { arrived: true, tile_index, ..default() }
    }
}

/// Waypoints still to walk, in world space.
#[derive(Component, Debug, Clone, Default, PartialEq)]
pub struct Path {
    pub waypoints: VecDeque<Vec2>,
    pub destination: Option<Destination>,
}

impl Path {
    pub fn follow(&mut self, waypoints: Vec<Vec2>, destination: Destination) {
        self.waypoints = waypoints.into();
        self.destination = Some(destination);
    }

    pub fn clear(&mut self) {
        self.waypoints.clear();
        self.destination = None;
    }

    pub fn is_complete(&self) -> bool {
        self.waypoints.is_empty()
    }
}

/// A tile and an exact point on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Destination {
    pub index: Option<usize>,
    pub position: Vec2,
}

#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Speed {
    pub scale: f32,
}

impl Default for Speed {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

/// Marks an entity owned by a pool. Freed entities keep this marker but
/// lose their gameplay bundle.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Pooled;

// ============================================================================
// Powerups
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerupType {
    BigSnowball,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Powerup {
    pub kind: PowerupType,
    pub quantity: u32,
}

/// Two powerup slots. `swapped` selects which slot is active.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Powerups {
    slots: [Option<Powerup>; 2],
    pub swapped: bool,
}

impl Powerups {
    fn active_slot(&self) -> usize {
        self.swapped as usize
    }

    pub fn active(&self) -> Option<Powerup> {
        self.slots[self.active_slot()]
    }

    pub fn inactive(&self) -> Option<Powerup> {
        self.slots[1 - self.active_slot()]
    }

    /// Fill the active slot if empty, otherwise the secondary slot
    /// (replacing what was queued there).
    pub fn collect(&mut self, kind: PowerupType, quantity: u32) {
        let active = self.active_slot();
        let slot = if self.slots[active].is_none() { active } else { 1 - active };
        self.slots[slot] = Some(Powerup { kind, quantity });
    }

    /// Use one charge of the active powerup. At zero the slot is cleared and
    /// a queued secondary becomes active.
    pub fn decrement_active_quantity(&mut self) {
        let active = self.active_slot();
        let Some(powerup) = self.slots[active].as_mut() else { return };

        powerup.quantity = powerup.quantity.saturating_sub(1);
        if powerup.quantity == 0 {
            self.slots[active] = None;
            if self.slots[1 - active].is_some() {
                self.swapped = !self.swapped;
            }
        }
    }
}

// ============================================================================
// Entity Kinds
// ============================================================================

/// Stable player identifier shared with the server.
#[derive(Component, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlayerId(pub String);

/// Player lifecycle. Transitions only move forward.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum PlayerState {
    #[default]
    Parachuting,
    Active,
    Sinking,
    Gone,
}

impl PlayerState {
    /// Move to `next` if it is later in the lifecycle.
    pub fn advance_to(&mut self, next: PlayerState) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }
}

#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Snowball {
    pub thrower: Entity,
    pub origin: Vec2,
    pub target: Vec2,
    pub direction: Vec2,
    pub thrown_tick: Option<u64>,
    pub duration_ticks: f32,
    pub arc_scale: f32,
    /// Presentation-only rotation of the throw, in radians.
    pub skew: f32,
    pub big: bool,
    pub collided_with: Option<Entity>,
}

/// Tree obstacle standing on a tile.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tree {
    pub kind: u8,
    pub tile_index: usize,
}

/// Powerup crate parachuted onto the island.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct SupplyDrop {
    pub contents: PowerupType,
    pub colliding_player: Option<Entity>,
    pub spin_started: Option<u64>,
}

/// Ice floe carrying a frozen entity off the island.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Iceberg {
    pub carrying: Option<Entity>,
    pub heading: Vec2,
}

/// Canopy lowering an entity onto its tile.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Parachute {
    pub carrying: Option<Entity>,
    pub dropped_tick: u64,
}

/// AI state of a bot-controlled player.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct Bot {
    pub last_target: Option<Entity>,
    pub last_throw_tick: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_powerup_exhaustion_clears_active() {
        let mut powerups = Powerups::default();
        powerups.collect(PowerupType::BigSnowball, 3);
        for _ in 0..3 {
            assert!(powerups.active().is_some());
            powerups.decrement_active_quantity();
        }
        assert_eq!(powerups.active(), None);
        assert!(!powerups.swapped);
    }

    #[test]
    fn test_powerup_exhaustion_swaps_in_secondary() {
        let mut powerups = Powerups::default();
        powerups.collect(PowerupType::BigSnowball, 3);
        powerups.collect(PowerupType::BigSnowball, 5);
        assert_eq!(powerups.inactive().map(|p| p.quantity), Some(5));

        for _ in 0..3 {
            powerups.decrement_active_quantity();
        }

        assert!(powerups.swapped);
        assert_eq!(powerups.active(), Some(Powerup { kind: PowerupType::BigSnowball, quantity: 5 }));
        assert_eq!(powerups.inactive(), None);
    }

    #[test]
    fn test_decrement_without_powerup_is_noop() {
        let mut powerups = Powerups::default();
        powerups.decrement_active_quantity();
        assert_eq!(powerups, Powerups::default());
    }

    #[test]
    fn test_presence_exit_once() {
        let mut presence = Presence::default();
        assert!(presence.exit(10));
        assert!(!presence.exit(20));
        assert_eq!(presence, Presence::Exiting { since: 10 });
        presence = Presence::Gone;
        assert!(!presence.exit(30));
    }

    #[test]
    fn test_player_state_is_monotonic() {
        let mut state = PlayerState::Parachuting;
        assert!(state.advance_to(PlayerState::Active));
        assert!(!state.advance_to(PlayerState::Parachuting));
        assert!(state.advance_to(PlayerState::Gone));
        assert!(!state.advance_to(PlayerState::Sinking));
        assert_eq!(state, PlayerState::Gone);
    }

    #[test]
    fn test_health_die_and_revive() {
        let mut health = Health::default();
        health.die(5);
        health.die(9);
        assert_eq!(health.died_at, Some(5));
        health.revive();
        assert!(!health.is_dead());
    }
}
