//! JSON messages exchanged with the game server.
//!
//! The transport itself lives outside the crate. It hands decoded
//! [`ServerMessage`]s to the network system and drains the outbox of
//! [`ClientMessage`]s.

use std::collections::BTreeMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// A world position as `{x, y}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WirePoint {
    pub x: f32,
    pub y: f32,
}

impl From<Vec2> for WirePoint {
    fn from(value: Vec2) -> Self {
        Self { x: value.x, y: value.y }
    }
}

impl From<WirePoint> for Vec2 {
    fn from(value: WirePoint) -> Self {
        Vec2::new(value.x, value.y)
    }
}

/// A tile together with an exact point on it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileAnchor {
    pub position: WirePoint,
    pub index: usize,
}

/// One roster entry of a reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub join_tick: u64,
    /// Last known position. Absent for players still parachuting in.
    #[serde(default)]
    pub at: Option<TileAnchor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<TileAnchor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetState {
    pub seed: u64,
    /// Number of erosion steps already applied on the server.
    #[serde(default)]
    pub erode: u32,
    /// Keyed by player id. Sorted, so replay order is the same everywhere.
    #[serde(default)]
    pub players: BTreeMap<String, PlayerSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum UpdateOp {
    Join { id: String },
    Part { id: String },
    Move { id: String, path: Vec<WirePoint> },
    Erode,
    Target { id: String, target: WirePoint },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Population {
    pub known: u32,
    pub maximum: u32,
    pub allowed: u32,
    pub knocked_out: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    TimeSynchronized { time_zero: f64, time: f64 },
    PlayerAssigned { id: String },
    Reset { tick: u64, state: ResetState },
    Update { tick: u64, state: UpdateOp },
    PopulationAnnounced { state: Population },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ClientMessage {
    Move { path: [WirePoint; 2] },
    Target { target: WirePoint },
}

pub fn decode_server_message(text: &str) -> Result<ServerMessage, serde_json::Error> {
    serde_json::from_str(text)
}

pub fn encode_client_message(message: &ClientMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}
