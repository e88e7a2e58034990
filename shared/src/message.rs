//! JSON wire protocol between clients and the office server.
//!
//! Every frame is one internally tagged message. Clients and server
//! both decode with [`decode`]; a frame that fails to decode is a
//! protocol error the receiver logs and drops, never a crash.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::replication::ReplicationEvent;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decodes one wire frame.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Messages a client sends to the server.
///
/// The first message on a fresh connection selects the channel: either
/// the lobby feed or a room join. Everything after a successful room
/// join is a command against that room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinLobby,
    JoinOrCreatePublic,
    CreateCustom {
        name: String,
        description: String,
        password: Option<String>,
        auto_dispose: bool,
    },
    JoinCustom {
        room_id: String,
        password: Option<String>,
    },

    UpdatePlayer { x: f32, y: f32, anim: String },
    UpdatePlayerName { name: String },
    UpdatePlayerImage { image_url: String },
    ReadyToConnect,
    VideoConnected,
    ConnectToComputer { computer_id: String },
    DisconnectFromComputer { computer_id: String },
    ConnectToWhiteboard { whiteboard_id: String },
    DisconnectFromWhiteboard { whiteboard_id: String },
    DisconnectStream { client_id: String },
    StopScreenShare { computer_id: String },
    AddChatMessage { content: String },
}

/// Messages the server pushes to a client, on either channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    // Lobby feed: full listing on subscribe, then add/update/remove.
    AvailableRooms { rooms: Vec<RoomListing> },
    RoomUpsert { room: RoomListing },
    RoomRemoved { room_id: String },

    // Join handshake.
    JoinedRoom { session_id: String, room_id: String },
    JoinRejected { reason: String },
    RoomData {
        room_id: String,
        name: String,
        description: String,
    },

    // Entity replication stream.
    Event { event: ReplicationEvent },

    // One-shot broadcasts, ordered with the command stream that
    // produced them.
    ChatMessage { client_id: String, content: String },
    PlayerImage { player_id: String, image: String },
    StreamDisconnected { client_id: String },
    ScreenShareStopped { client_id: String },
}

/// Lobby-visible metadata for one room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomListing {
    pub room_id: String,
    pub name: String,
    pub description: String,
    pub client_count: usize,
    pub has_password: bool,
}
