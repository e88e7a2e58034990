//! Application-facing events the sync layer re-emits.
//!
//! Consumers (rendering, chat window, video manager) receive these
//! over an explicitly passed channel scoped to one session. There is
//! no process-wide bus, so each consumer can be tested with a plain
//! receiver.

use shared::{ChatMessage, ItemType, Player, PlayerField, RoomListing};

#[derive(Debug, Clone, PartialEq)]
pub enum OfficeEvent {
    // Lobby feed.
    AvailableRooms {
        rooms: Vec<RoomListing>,
    },
    RoomUpsert {
        room: RoomListing,
    },
    RoomRemoved {
        room_id: String,
    },

    /// Room metadata received on join.
    RoomData {
        room_id: String,
        name: String,
        description: String,
    },

    /// A remote player became visible (added with a name, or finished
    /// picking one).
    PlayerJoined {
        session_id: String,
        player: Player,
    },
    /// One field of a remote player changed.
    PlayerUpdated {
        session_id: String,
        field: PlayerField,
    },
    PlayerLeft {
        session_id: String,
        name: String,
    },

    // Generic membership events, keyed by the object-type tag so the
    // UI can tell computers from whiteboards.
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
    /// A whiteboard's backing document became known.
    WhiteboardUrl {
        whiteboard_id: String,
        room_id: String,
    },

    ChatMessageAdded {
        message: ChatMessage,
    },
    /// Dialog-bubble broadcast for a freshly sent chat line.
    ChatBubble {
        session_id: String,
        content: String,
    },

    StreamDisconnected {
        session_id: String,
    },
    ScreenShareStopped {
        session_id: String,
    },

    /// Transport loss; only a resync restores the mirror.
    Disconnected,
}
