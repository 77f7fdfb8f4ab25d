use bevy::prelude::*;

use crate::game::components::PowerupType;

/// Audio cue for the host's sound collaborator. Fire-and-forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCue {
    SnowballThrow,
    SnowballHit,
    PowerupPickup,
    PlayerFrozen,
}

/// Notifications for whatever hosts the game (UI chrome, audio, the
/// binary's exit condition).
#[derive(Event, Message, Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// The client player is alive; `knocked_out` is the running score.
    Score { knocked_out: u32, time_ms: f64 },
    /// Sent once after the client player died.
    GameOver { score: u32 },
    /// Sent once when a single live player remains.
    Winner { id: String },
    PowerupCollected { id: String, kind: PowerupType },
    Sound(SoundCue),
}
