//! Replicated entity schema.
//!
//! These are the shapes the server owns authoritatively and clients
//! mirror read-only. Every field change travels as a replication event,
//! so the types derive `PartialEq` to let both sides diff cheaply.

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_ANIM, DEFAULT_TEXTURE, SPAWN_X, SPAWN_Y};

/// One connected participant's replicated state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub x: f32,
    pub y: f32,
    /// Current animation key, `<texture>_<motion>_<facing>`. Encodes
    /// facing and motion state for remote rendering.
    pub anim: String,
    pub name: String,
    /// Avatar texture id, kept in sync with the leading segment of
    /// `anim`.
    pub texture: String,
    /// Profile image reference (URL or data URI), if the player set one.
    pub image: Option<String>,
    pub ready_to_connect: bool,
    pub video_connected: bool,
}

impl Player {
    pub fn new() -> Self {
        Self {
            x: SPAWN_X,
            y: SPAWN_Y,
            anim: DEFAULT_ANIM.to_string(),
            name: String::new(),
            texture: DEFAULT_TEXTURE.to_string(),
            image: None,
            ready_to_connect: false,
            video_connected: false,
        }
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

/// A shared computer. Only its membership set ever mutates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Computer {
    /// Session ids currently using this computer, in join order.
    pub connected_users: Vec<String>,
}

/// A shared whiteboard, referencing an external drawing document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Whiteboard {
    /// Identifier of the backing whiteboard document, generated once
    /// when the room starts.
    pub room_id: String,
    pub connected_users: Vec<String>,
}

impl Whiteboard {
    pub fn new(room_id: String) -> Self {
        Self {
            room_id,
            connected_users: Vec::new(),
        }
    }
}

/// Append-only chat log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Display name of the author at send time.
    pub author: String,
    pub content: String,
    /// Server-side unix timestamp in milliseconds.
    pub created_at: u64,
}

/// Object-type tag for generic membership events, so consumers can
/// tell computer membership from whiteboard membership without the
/// sync layer knowing UI semantics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Computer,
    Whiteboard,
}

/// Static map data a room's interactable objects are seeded from.
///
/// Whiteboards carry their backing document id here so that building
/// an `OfficeState` from a layout is fully deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfficeLayout {
    pub computers: Vec<String>,
    pub whiteboards: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_player_defaults() {
        let player = Player::new();
        assert_approx_eq!(player.x, 705.0);
        assert_approx_eq!(player.y, 500.0);
        assert_eq!(player.anim, "adam_idle_down");
        assert_eq!(player.texture, "adam");
        assert!(player.name.is_empty());
        assert!(player.image.is_none());
        assert!(!player.ready_to_connect);
        assert!(!player.video_connected);
    }

    #[test]
    fn test_player_serialization_roundtrip() {
        let mut player = Player::new();
        player.name = "morgan".to_string();
        player.image = Some("https://example.test/morgan.png".to_string());

        let json = serde_json::to_string(&player).unwrap();
        let back: Player = serde_json::from_str(&json).unwrap();
        assert_eq!(player, back);
    }

    #[test]
    fn test_item_type_tag_format() {
        let json = serde_json::to_string(&ItemType::Whiteboard).unwrap();
        assert_eq!(json, "\"whiteboard\"");
    }
}
