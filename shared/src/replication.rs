//! Replication events: the delta vocabulary the server publishes after
//! every committed mutation.
//!
//! Three shapes exist per collection: entity added, field changed,
//! entity removed. The chat log is append-only so it only ever adds;
//! computers and whiteboards are created at room startup, so their add
//! events appear only inside join snapshots.

use serde::{Deserialize, Serialize};

use crate::schema::{ChatMessage, ItemType, Player};

/// One committed change to the replicated room state.
///
/// Events for a room are emitted from its single authoritative
/// timeline; subscribers observe them in commit order, so a field
/// change is never seen before the add, or after the remove, of the
/// same entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReplicationEvent {
    PlayerAdded {
        session_id: String,
        player: Player,
    },
    PlayerFieldChanged {
        session_id: String,
        field: PlayerField,
    },
    PlayerRemoved {
        session_id: String,
    },
    ComputerAdded {
        computer_id: String,
        connected_users: Vec<String>,
    },
    WhiteboardAdded {
        whiteboard_id: String,
        room_id: String,
        connected_users: Vec<String>,
    },
    ItemUserAdded {
        item_type: ItemType,
        item_id: String,
        session_id: String,
    },
    ItemUserRemoved {
        item_type: ItemType,
        item_id: String,
        session_id: String,
    },
    ChatMessageAdded {
        message: ChatMessage,
    },
}

/// A single changed field of a player entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "name", content = "value", rename_all = "snake_case")]
pub enum PlayerField {
    X(f32),
    Y(f32),
    Anim(String),
    Texture(String),
    Name(String),
    Image(String),
    ReadyToConnect(bool),
    VideoConnected(bool),
}

impl PlayerField {
    /// Applies this field change to a player mirror.
    pub fn apply_to(&self, player: &mut Player) {
        match self {
            PlayerField::X(x) => player.x = *x,
            PlayerField::Y(y) => player.y = *y,
            PlayerField::Anim(anim) => player.anim = anim.clone(),
            PlayerField::Texture(texture) => player.texture = texture.clone(),
            PlayerField::Name(name) => player.name = name.clone(),
            PlayerField::Image(image) => player.image = Some(image.clone()),
            PlayerField::ReadyToConnect(flag) => player.ready_to_connect = *flag,
            PlayerField::VideoConnected(flag) => player.video_connected = *flag,
        }
    }
}
