use log::{info, warn};
use std::collections::HashMap;

use shared::{
    texture_from_anim, ChatMessage, Computer, ItemType, OfficeLayout, Player, PlayerField,
    ReplicationEvent, ServerMessage, Whiteboard,
};

use crate::commands::Command;
use crate::utils;

/// What a committed mutation asks the room to publish.
///
/// Mutation logic stays pure and synchronous; actually moving bytes is
/// the room's job, so the state container only describes deliveries.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Entity/collection delta for every subscriber.
    Replicate(ReplicationEvent),
    /// One-shot message for every subscriber.
    Broadcast(ServerMessage),
    /// One-shot message for a single session.
    Unicast {
        session_id: String,
        message: ServerMessage,
    },
    /// One-shot message for an explicit set of sessions.
    Multicast {
        session_ids: Vec<String>,
        message: ServerMessage,
    },
}

fn field_changed(session_id: &str, field: PlayerField) -> Effect {
    Effect::Replicate(ReplicationEvent::PlayerFieldChanged {
        session_id: session_id.to_string(),
        field,
    })
}

/// The canonical, server-owned room state.
///
/// Exactly one room timeline mutates an `OfficeState`, through
/// [`add_player`](Self::add_player), [`remove_player`](Self::remove_player)
/// and [`apply`](Self::apply). Each call is a total function over valid
/// state: invalid commands degrade to no-ops, never to errors, and the
/// effects returned are fully determined by the current state, the
/// command, and the supplied timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfficeState {
    players: HashMap<String, Player>,
    computers: HashMap<String, Computer>,
    whiteboards: HashMap<String, Whiteboard>,
    chat_messages: Vec<ChatMessage>,
}

/// The office everyone shares: ids match the interactable objects baked
/// into the default map.
pub fn default_layout() -> OfficeLayout {
    OfficeLayout {
        computers: (0..5).map(|i| i.to_string()).collect(),
        whiteboards: (0..2)
            .map(|i| (i.to_string(), utils::generate_whiteboard_room_id()))
            .collect(),
    }
}

impl OfficeState {
    pub fn from_layout(layout: &OfficeLayout) -> Self {
        let mut state = OfficeState::default();
        for computer_id in &layout.computers {
            state
                .computers
                .insert(computer_id.clone(), Computer::default());
        }
        for (whiteboard_id, room_id) in &layout.whiteboards {
            state
                .whiteboards
                .insert(whiteboard_id.clone(), Whiteboard::new(room_id.clone()));
        }
        state
    }

    pub fn player(&self, session_id: &str) -> Option<&Player> {
        self.players.get(session_id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn computer(&self, computer_id: &str) -> Option<&Computer> {
        self.computers.get(computer_id)
    }

    pub fn whiteboard(&self, whiteboard_id: &str) -> Option<&Whiteboard> {
        self.whiteboards.get(whiteboard_id)
    }

    pub fn chat_messages(&self) -> &[ChatMessage] {
        &self.chat_messages
    }

    /// Creates the session's player at the spawn point.
    pub fn add_player(&mut self, session_id: &str) -> Vec<Effect> {
        let player = Player::new();
        info!(
            "Added player {} at ({}, {})",
            session_id, player.x, player.y
        );
        self.players.insert(session_id.to_string(), player.clone());
        vec![Effect::Replicate(ReplicationEvent::PlayerAdded {
            session_id: session_id.to_string(),
            player,
        })]
    }

    /// Removes the session's player and cleans up every membership it
    /// held. The player removal is published before the membership
    /// removals. Idempotent: removing an absent player does nothing.
    pub fn remove_player(&mut self, session_id: &str) -> Vec<Effect> {
        if self.players.remove(session_id).is_none() {
            return Vec::new();
        }
        info!("Removed player {}", session_id);

        let mut effects = vec![Effect::Replicate(ReplicationEvent::PlayerRemoved {
            session_id: session_id.to_string(),
        })];

        let mut computer_ids: Vec<String> = self.computers.keys().cloned().collect();
        computer_ids.sort();
        for computer_id in computer_ids {
            effects.extend(self.disconnect_from_item(
                session_id,
                ItemType::Computer,
                computer_id,
            ));
        }

        let mut whiteboard_ids: Vec<String> = self.whiteboards.keys().cloned().collect();
        whiteboard_ids.sort();
        for whiteboard_id in whiteboard_ids {
            effects.extend(self.disconnect_from_item(
                session_id,
                ItemType::Whiteboard,
                whiteboard_id,
            ));
        }

        effects
    }

    /// Full state enumeration for a session that joins mid-stream.
    /// Chat backlog is not replayed.
    pub fn snapshot(&self) -> Vec<ReplicationEvent> {
        let mut events = Vec::new();

        let mut session_ids: Vec<&String> = self.players.keys().collect();
        session_ids.sort();
        for session_id in session_ids {
            events.push(ReplicationEvent::PlayerAdded {
                session_id: session_id.clone(),
                player: self.players[session_id].clone(),
            });
        }

        let mut computer_ids: Vec<&String> = self.computers.keys().collect();
        computer_ids.sort();
        for computer_id in computer_ids {
            events.push(ReplicationEvent::ComputerAdded {
                computer_id: computer_id.clone(),
                connected_users: self.computers[computer_id].connected_users.clone(),
            });
        }

        let mut whiteboard_ids: Vec<&String> = self.whiteboards.keys().collect();
        whiteboard_ids.sort();
        for whiteboard_id in whiteboard_ids {
            let whiteboard = &self.whiteboards[whiteboard_id];
            events.push(ReplicationEvent::WhiteboardAdded {
                whiteboard_id: whiteboard_id.clone(),
                room_id: whiteboard.room_id.clone(),
                connected_users: whiteboard.connected_users.clone(),
            });
        }

        events
    }

    /// Executes one command against current state.
    ///
    /// `now_ms` is the commit timestamp for anything the command
    /// records (currently chat); passing it in keeps execution
    /// deterministic under test.
    pub fn apply(&mut self, session_id: &str, command: Command, now_ms: u64) -> Vec<Effect> {
        match command {
            Command::UpdatePlayer { x, y, anim } => self.update_player(session_id, x, y, anim),
            Command::UpdatePlayerName { name } => self.update_player_name(session_id, name),
            Command::UpdatePlayerImage { image_url } => {
                self.update_player_image(session_id, image_url)
            }
            Command::ReadyToConnect => self.ready_to_connect(session_id),
            Command::VideoConnected => self.video_connected(session_id),
            Command::ConnectToItem { item_type, item_id } => {
                self.connect_to_item(session_id, item_type, item_id)
            }
            Command::DisconnectFromItem { item_type, item_id } => {
                self.disconnect_from_item(session_id, item_type, item_id)
            }
            Command::DisconnectStream { client_id } => {
                self.disconnect_stream(session_id, client_id)
            }
            Command::StopScreenShare { computer_id } => {
                self.stop_screen_share(session_id, computer_id)
            }
            Command::AddChatMessage { content } => {
                self.add_chat_message(session_id, content, now_ms)
            }
        }
    }

    fn update_player(&mut self, session_id: &str, x: f32, y: f32, anim: String) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(player) = self.players.get_mut(session_id) {
            if player.x != x {
                player.x = x;
                effects.push(field_changed(session_id, PlayerField::X(x)));
            }
            if player.y != y {
                player.y = y;
                effects.push(field_changed(session_id, PlayerField::Y(y)));
            }
            if player.anim != anim {
                let texture = texture_from_anim(&anim).to_string();
                player.anim = anim.clone();
                effects.push(field_changed(session_id, PlayerField::Anim(anim)));
                if player.texture != texture {
                    player.texture = texture.clone();
                    effects.push(field_changed(session_id, PlayerField::Texture(texture)));
                }
            }
        }
        effects
    }

    fn update_player_name(&mut self, session_id: &str, name: String) -> Vec<Effect> {
        if name.is_empty() {
            return Vec::new();
        }
        if let Some(player) = self.players.get_mut(session_id) {
            if player.name != name {
                player.name = name.clone();
                return vec![field_changed(session_id, PlayerField::Name(name))];
            }
        }
        Vec::new()
    }

    fn update_player_image(&mut self, session_id: &str, image_url: String) -> Vec<Effect> {
        if let Some(player) = self.players.get_mut(session_id) {
            player.image = Some(image_url.clone());
            let others: Vec<String> = self
                .players
                .keys()
                .filter(|id| id.as_str() != session_id)
                .cloned()
                .collect();
            let mut effects = vec![field_changed(
                session_id,
                PlayerField::Image(image_url.clone()),
            )];
            if !others.is_empty() {
                effects.push(Effect::Multicast {
                    session_ids: others,
                    message: ServerMessage::PlayerImage {
                        player_id: session_id.to_string(),
                        image: image_url,
                    },
                });
            }
            return effects;
        }
        Vec::new()
    }

    fn ready_to_connect(&mut self, session_id: &str) -> Vec<Effect> {
        if let Some(player) = self.players.get_mut(session_id) {
            if !player.ready_to_connect {
                player.ready_to_connect = true;
                return vec![field_changed(session_id, PlayerField::ReadyToConnect(true))];
            }
        }
        Vec::new()
    }

    fn video_connected(&mut self, session_id: &str) -> Vec<Effect> {
        if let Some(player) = self.players.get_mut(session_id) {
            if !player.video_connected {
                player.video_connected = true;
                return vec![field_changed(session_id, PlayerField::VideoConnected(true))];
            }
        }
        Vec::new()
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

    fn connect_to_item(
        &mut self,
        session_id: &str,
        item_type: ItemType,
        item_id: String,
    ) -> Vec<Effect> {
        if !self.players.contains_key(session_id) {
            return Vec::new();
        }
        match self.membership(item_type, &item_id) {
            Some(users) => {
                if users.iter().any(|id| id == session_id) {
                    return Vec::new();
                }
                users.push(session_id.to_string());
                vec![Effect::Replicate(ReplicationEvent::ItemUserAdded {
                    item_type,
                    item_id,
                    session_id: session_id.to_string(),
                })]
            }
            None => {
                warn!(
                    "Session {} tried to connect to unknown {:?} {}",
                    session_id, item_type, item_id
                );
                Vec::new()
            }
        }
    }

    fn disconnect_from_item(
        &mut self,
        session_id: &str,
        item_type: ItemType,
        item_id: String,
    ) -> Vec<Effect> {
        if let Some(users) = self.membership(item_type, &item_id) {
            if let Some(position) = users.iter().position(|id| id == session_id) {
                users.remove(position);
                return vec![Effect::Replicate(ReplicationEvent::ItemUserRemoved {
                    item_type,
                    item_id,
                    session_id: session_id.to_string(),
                })];
            }
        }
        Vec::new()
    }

    /// Relays a peer-signaling disconnect notice to one session. The
    /// payload is opaque to the room; it does not interpret it.
    fn disconnect_stream(&mut self, session_id: &str, client_id: String) -> Vec<Effect> {
        vec![Effect::Unicast {
            session_id: client_id,
            message: ServerMessage::StreamDisconnected {
                client_id: session_id.to_string(),
            },
        }]
    }

    fn stop_screen_share(&mut self, session_id: &str, computer_id: String) -> Vec<Effect> {
        if let Some(computer) = self.computers.get(&computer_id) {
            let targets: Vec<String> = computer
                .connected_users
                .iter()
                .filter(|id| id.as_str() != session_id)
                .cloned()
                .collect();
            if !targets.is_empty() {
                return vec![Effect::Multicast {
                    session_ids: targets,
                    message: ServerMessage::ScreenShareStopped {
                        client_id: session_id.to_string(),
                    },
                }];
            }
        }
        Vec::new()
    }

    fn add_chat_message(&mut self, session_id: &str, content: String, now_ms: u64) -> Vec<Effect> {
        let content = content.trim().to_string();
        if content.is_empty() {
            return Vec::new();
        }
        let author = match self.players.get(session_id) {
            Some(player) => player.name.clone(),
            None => return Vec::new(),
        };
        let message = ChatMessage {
            author,
            content: content.clone(),
            created_at: now_ms,
        };
        self.chat_messages.push(message.clone());
        vec![
            Effect::Replicate(ReplicationEvent::ChatMessageAdded { message }),
            Effect::Broadcast(ServerMessage::ChatMessage {
                client_id: session_id.to_string(),
                content,
            }),
        ]
    }
}
