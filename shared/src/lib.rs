//! Types shared between the office server and its clients: the
//! replicated state schema, the JSON wire protocol, and the replication
//! event vocabulary.

pub mod message;
pub mod replication;
pub mod schema;

pub use message::{ClientMessage, ProtocolError, RoomListing, ServerMessage};
pub use replication::{PlayerField, ReplicationEvent};
pub use schema::{ChatMessage, Computer, ItemType, OfficeLayout, Player, Whiteboard};

/// Default spawn point for a freshly joined player.
pub const SPAWN_X: f32 = 705.0;
pub const SPAWN_Y: f32 = 500.0;

pub const DEFAULT_TEXTURE: &str = "adam";
pub const DEFAULT_ANIM: &str = "adam_idle_down";

/// Extracts the avatar texture id from an animation key.
///
/// Animation keys are `<texture>_<motion>_<facing>`, e.g.
/// `"adam_run_left"`. An anim key with no separator is itself the
/// texture id.
pub fn texture_from_anim(anim: &str) -> &str {
    anim.split('_').next().unwrap_or(anim)
}
