//! Client-side mirror of the room state.
//!
//! Applies the server's replication stream to a local shadow copy and
//! re-emits each change as an application event. The mirror is
//! read-only for the rest of the client: the locally predicted player
//! is never mutated through this path, and a stray event for an entity
//! outside its add..remove window is dropped; a gap means resync, not
//! partial repair.

use log::debug;
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc;

use shared::{
    ChatMessage, Computer, ItemType, Player, PlayerField, ReplicationEvent, ServerMessage,
    Whiteboard,
};

use crate::events::OfficeEvent;

/// How many chat messages the client keeps; the server holds the full
/// room-lifetime log.
pub const CHAT_RETAINED_MAX: usize = 100;

pub struct Reconciler {
    session_id: String,
    players: HashMap<String, Player>,
    computers: HashMap<String, Computer>,
    whiteboards: HashMap<String, Whiteboard>,
    chat_messages: VecDeque<ChatMessage>,
    events: mpsc::UnboundedSender<OfficeEvent>,
}

impl Reconciler {
    pub fn new(session_id: String, events: mpsc::UnboundedSender<OfficeEvent>) -> Self {
        Self {
            session_id,
            players: HashMap::new(),
            computers: HashMap::new(),
            whiteboards: HashMap::new(),
            chat_messages: VecDeque::new(),
            events,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn player(&self, session_id: &str) -> Option<&Player> {
        self.players.get(session_id)
    }

    pub fn players(&self) -> &HashMap<String, Player> {
        &self.players
    }

    pub fn computer(&self, computer_id: &str) -> Option<&Computer> {
        self.computers.get(computer_id)
    }

    pub fn whiteboard(&self, whiteboard_id: &str) -> Option<&Whiteboard> {
        self.whiteboards.get(whiteboard_id)
    }

    pub fn chat_messages(&self) -> &VecDeque<ChatMessage> {
        &self.chat_messages
    }

    /// Discards the whole mirror. Used on reconnect before requesting
    /// a fresh snapshot.
    pub fn reset(&mut self) {
        self.players.clear();
        self.computers.clear();
        self.whiteboards.clear();
        self.chat_messages.clear();
    }

    pub fn apply(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::AvailableRooms { rooms } => {
                self.emit(OfficeEvent::AvailableRooms { rooms })
            }
            ServerMessage::RoomUpsert { room } => self.emit(OfficeEvent::RoomUpsert { room }),
            ServerMessage::RoomRemoved { room_id } => {
                self.emit(OfficeEvent::RoomRemoved { room_id })
            }

            // Handshake messages are consumed by the join flow.
            ServerMessage::JoinedRoom { .. } | ServerMessage::JoinRejected { .. } => {}

            ServerMessage::RoomData {
                room_id,
                name,
                description,
            } => self.emit(OfficeEvent::RoomData {
                room_id,
                name,
                description,
            }),

            ServerMessage::Event { event } => self.apply_event(event),

            ServerMessage::ChatMessage { client_id, content } => self.emit(OfficeEvent::ChatBubble {
                session_id: client_id,
                content,
            }),
            ServerMessage::PlayerImage { player_id, image } => {
                self.apply_player_image(player_id, image)
            }
            ServerMessage::StreamDisconnected { client_id } => {
                self.emit(OfficeEvent::StreamDisconnected {
                    session_id: client_id,
                })
            }
            ServerMessage::ScreenShareStopped { client_id } => {
                self.emit(OfficeEvent::ScreenShareStopped {
                    session_id: client_id,
                })
            }
        }
    }

    fn apply_event(&mut self, event: ReplicationEvent) {
        match event {
            ReplicationEvent::PlayerAdded { session_id, player } => {
                let is_remote = session_id != self.session_id;
                let visible = is_remote && !player.name.is_empty();
                self.players.insert(session_id.clone(), player.clone());
                if visible {
                    self.emit(OfficeEvent::PlayerJoined { session_id, player });
                }
            }
            ReplicationEvent::PlayerFieldChanged { session_id, field } => {
                self.apply_field_change(session_id, field)
            }
            ReplicationEvent::PlayerRemoved { session_id } => {
                if let Some(player) = self.players.remove(&session_id) {
                    if session_id != self.session_id {
                        self.emit(OfficeEvent::PlayerLeft {
                            session_id,
                            name: player.name,
                        });
                    }
                }
            }

            ReplicationEvent::ComputerAdded {
                computer_id,
                connected_users,
            } => {
                self.computers.insert(
                    computer_id.clone(),
                    Computer {
                        connected_users: connected_users.clone(),
                    },
                );
                // Snapshot members surface just like live joins.
                for session_id in connected_users {
                    self.emit(OfficeEvent::ItemUserAdded {
                        item_type: ItemType::Computer,
                        item_id: computer_id.clone(),
                        session_id,
                    });
                }
            }
            ReplicationEvent::WhiteboardAdded {
                whiteboard_id,
                room_id,
                connected_users,
            } => {
                self.whiteboards.insert(
                    whiteboard_id.clone(),
                    Whiteboard {
                        room_id: room_id.clone(),
                        connected_users: connected_users.clone(),
                    },
                );
                self.emit(OfficeEvent::WhiteboardUrl {
                    whiteboard_id: whiteboard_id.clone(),
                    room_id,
                });
                for session_id in connected_users {
                    self.emit(OfficeEvent::ItemUserAdded {
                        item_type: ItemType::Whiteboard,
                        item_id: whiteboard_id.clone(),
                        session_id,
                    });
                }
            }

            ReplicationEvent::ItemUserAdded {
                item_type,
                item_id,
                session_id,
            } => {
                let users = match self.membership(item_type, &item_id) {
                    Some(users) => users,
                    None => {
                        debug!("Membership add for unknown {:?} {}", item_type, item_id);
                        return;
                    }
                };
                if !users.iter().any(|id| id == &session_id) {
                    users.push(session_id.clone());
                }
                self.emit(OfficeEvent::ItemUserAdded {
                    item_type,
                    item_id,
                    session_id,
                });
            }
            ReplicationEvent::ItemUserRemoved {
                item_type,
                item_id,
                session_id,
            } => {
                let users = match self.membership(item_type, &item_id) {
                    Some(users) => users,
                    None => {
                        debug!("Membership remove for unknown {:?} {}", item_type, item_id);
                        return;
                    }
                };
                if let Some(position) = users.iter().position(|id| id == &session_id) {
                    users.remove(position);
                    self.emit(OfficeEvent::ItemUserRemoved {
                        item_type,
                        item_id,
                        session_id,
                    });
                }
            }

            ReplicationEvent::ChatMessageAdded { message } => {
                self.chat_messages.push_back(message.clone());
                while self.chat_messages.len() > CHAT_RETAINED_MAX {
                    self.chat_messages.pop_front();
                }
                self.emit(OfficeEvent::ChatMessageAdded { message });
            }
        }
    }

    fn apply_field_change(&mut self, session_id: String, field: PlayerField) {
        let player = match self.players.get_mut(&session_id) {
            Some(player) => player,
            None => {
                // Change for an entity outside its add..remove window.
                debug!("Field change for unknown player {}", session_id);
                return;
            }
        };
        let was_unnamed = player.name.is_empty();
        field.apply_to(player);

        if session_id == self.session_id {
            // Mirror bookkeeping only; the predicted pose is authoritative
            // for rendering the local player.
            return;
        }

        let newly_named =
            was_unnamed && matches!(&field, PlayerField::Name(name) if !name.is_empty());
        let player = player.clone();
        self.emit(OfficeEvent::PlayerUpdated {
            session_id: session_id.clone(),
            field,
        });
        if newly_named {
            self.emit(OfficeEvent::PlayerJoined { session_id, player });
        }
    }

    fn apply_player_image(&mut self, player_id: String, image: String) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.image = Some(image.clone());
            if player_id != self.session_id {
                self.emit(OfficeEvent::PlayerUpdated {
                    session_id: player_id,
                    field: PlayerField::Image(image),
                });
            }
        } else {
            debug!("Image notice for unknown player {}", player_id);
        }
    }

    fn membership(&mut self, item_type: ItemType, item_id: &str) -> Option<&mut Vec<String>> {
        match item_type {
            ItemType::Computer => self
                .computers
                .get_mut(item_id)
                .map(|computer| &mut computer.connected_users),
            ItemType::Whiteboard => self
                .whiteboards
                .get_mut(item_id)
                .map(|whiteboard| &mut whiteboard.connected_users),
        }
    }

    fn emit(&self, event: OfficeEvent) {
        // A closed receiver just means the app is shutting down.
        let _ = self.events.send(event);
    }
}
