//! Game systems, one module per slot of the frame order.
//!
//! Each module owns a resource holding the system's collections and the
//! public methods other systems use to reach it, plus the per-frame system
//! function registered by the game plugin.

pub mod bot;
pub mod client;
pub mod drop;
pub mod effect;
pub mod entity_removal;
pub mod lod;
pub mod map;
pub mod network;
pub mod parachute;
pub mod player;
pub mod snowball;
pub mod state;
