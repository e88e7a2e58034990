//! Commands: validated, atomic state-mutation requests, one per
//! inbound room message.

use shared::{ClientMessage, ItemType};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    UpdatePlayer { x: f32, y: f32, anim: String },
    UpdatePlayerName { name: String },
    UpdatePlayerImage { image_url: String },
    ReadyToConnect,
    VideoConnected,
    ConnectToItem { item_type: ItemType, item_id: String },
    DisconnectFromItem { item_type: ItemType, item_id: String },
    DisconnectStream { client_id: String },
    StopScreenShare { computer_id: String },
    AddChatMessage { content: String },
}

impl Command {
    /// Translates an in-room wire message into its command.
    ///
    /// Join-phase messages have no command; the caller logs and drops
    /// them so one misbehaving session never affects the room.
    pub fn from_message(message: ClientMessage) -> Option<Command> {
        match message {
            ClientMessage::UpdatePlayer { x, y, anim } => {
                Some(Command::UpdatePlayer { x, y, anim })
            }
            ClientMessage::UpdatePlayerName { name } => Some(Command::UpdatePlayerName { name }),
            ClientMessage::UpdatePlayerImage { image_url } => {
                Some(Command::UpdatePlayerImage { image_url })
            }
            ClientMessage::ReadyToConnect => Some(Command::ReadyToConnect),
            ClientMessage::VideoConnected => Some(Command::VideoConnected),
            ClientMessage::ConnectToComputer { computer_id } => Some(Command::ConnectToItem {
                item_type: ItemType::Computer,
                item_id: computer_id,
            }),
            ClientMessage::DisconnectFromComputer { computer_id } => {
                Some(Command::DisconnectFromItem {
                    item_type: ItemType::Computer,
                    item_id: computer_id,
                })
            }
            ClientMessage::ConnectToWhiteboard { whiteboard_id } => Some(Command::ConnectToItem {
                item_type: ItemType::Whiteboard,
                item_id: whiteboard_id,
            }),
            ClientMessage::DisconnectFromWhiteboard { whiteboard_id } => {
                Some(Command::DisconnectFromItem {
                    item_type: ItemType::Whiteboard,
                    item_id: whiteboard_id,
                })
            }
            ClientMessage::DisconnectStream { client_id } => {
                Some(Command::DisconnectStream { client_id })
            }
            ClientMessage::StopScreenShare { computer_id } => {
                Some(Command::StopScreenShare { computer_id })
            }
            ClientMessage::AddChatMessage { content } => Some(Command::AddChatMessage { content }),

            ClientMessage::JoinLobby
            | ClientMessage::JoinOrCreatePublic
            | ClientMessage::CreateCustom { .. }
            | ClientMessage::JoinCustom { .. } => None,
        }
    }
}
