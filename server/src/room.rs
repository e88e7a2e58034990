//! The room authority: one task per room owning its state.
//!
//! All joins, leaves and commands for a room arrive through a single
//! mpsc inbox and execute strictly in receipt order, which is the
//! total-ordering backbone of the whole sync layer. Command execution
//! never awaits; the only suspension points are channel receives and
//! lobby-listing updates between messages.

use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};

use shared::{OfficeLayout, ServerMessage};

use crate::commands::Command;
use crate::lobby::RoomRegistry;
use crate::office::{Effect, OfficeState};
use crate::utils;

/// Bound on each session's outbound queue. A reader that falls this
/// far behind is disconnected instead of stalling the room timeline.
pub const SESSION_QUEUE_CAPACITY: usize = 256;

/// Bound on a room's command inbox.
pub const ROOM_INBOX_CAPACITY: usize = 1000;

/// Why a join was refused. The only command-path error a client ever
/// sees; everything else degrades to a logged no-op.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("room is at capacity")]
    CapacityExceeded,
    #[error("room not found")]
    RoomNotFound,
    #[error("invalid password")]
    InvalidPassword,
}

/// Messages sent from session tasks to a room's timeline.
#[derive(Debug)]
pub enum RoomMessage {
    Join {
        session_id: String,
        sender: mpsc::Sender<ServerMessage>,
        reply: oneshot::Sender<Result<(), JoinError>>,
    },
    Leave {
        session_id: String,
    },
    Command {
        session_id: String,
        command: Command,
    },
}

#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub room_id: String,
    pub name: String,
    pub description: String,
    /// 0 means unbounded.
    pub max_clients: usize,
    pub auto_dispose: bool,
    pub layout: OfficeLayout,
}

pub struct Room {
    config: RoomConfig,
    state: OfficeState,
    sessions: HashMap<String, mpsc::Sender<ServerMessage>>,
    inbox: mpsc::Receiver<RoomMessage>,
    registry: Arc<RwLock<RoomRegistry>>,
}

impl Room {
    /// Spawns the room's timeline task and returns its inbox.
    pub fn spawn(
        config: RoomConfig,
        registry: Arc<RwLock<RoomRegistry>>,
    ) -> mpsc::Sender<RoomMessage> {
        let (sender, inbox) = mpsc::channel(ROOM_INBOX_CAPACITY);
        let state = OfficeState::from_layout(&config.layout);
        let room = Room {
            config,
            state,
            sessions: HashMap::new(),
            inbox,
            registry,
        };
        tokio::spawn(room.run());
        sender
    }

    async fn run(mut self) {
        info!("Room {} ({}) started", self.config.room_id, self.config.name);

        while let Some(message) = self.inbox.recv().await {
            match message {
                RoomMessage::Join {
                    session_id,
                    sender,
                    reply,
                } => {
                    let result = self.handle_join(session_id, sender);
                    let joined = result.is_ok();
                    let _ = reply.send(result);
                    if joined {
                        self.publish_listing().await;
                    }
                }
                RoomMessage::Leave { session_id } => {
                    if self.handle_leave(&session_id) {
                        self.publish_listing().await;
                    }
                    if self.config.auto_dispose && self.sessions.is_empty() {
                        break;
                    }
                }
                RoomMessage::Command {
                    session_id,
                    command,
                } => {
                    let now_ms = utils::get_timestamp();
                    let effects = self.state.apply(&session_id, command, now_ms);
                    if self.deliver(effects) {
                        self.publish_listing().await;
                        if self.config.auto_dispose && self.sessions.is_empty() {
                            break;
                        }
                    }
                }
            }
        }

        info!("Room {} disposed", self.config.room_id);
        RoomRegistry::remove_room(&self.registry, &self.config.room_id).await;
    }

    fn handle_join(
        &mut self,
        session_id: String,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), JoinError> {
        if self.config.max_clients > 0 && self.sessions.len() >= self.config.max_clients {
            return Err(JoinError::CapacityExceeded);
        }

        // Handshake, room metadata, then the full snapshot, in order,
        // before any incremental event can reach this session.
        let mut welcome = vec![
            ServerMessage::JoinedRoom {
                session_id: session_id.clone(),
                room_id: self.config.room_id.clone(),
            },
            ServerMessage::RoomData {
                room_id: self.config.room_id.clone(),
                name: self.config.name.clone(),
                description: self.config.description.clone(),
            },
        ];
        welcome.extend(
            self.state
                .snapshot()
                .into_iter()
                .map(|event| ServerMessage::Event { event }),
        );
        for message in welcome {
            if sender.try_send(message).is_err() {
                warn!(
                    "Session {} could not take its join snapshot; dropping it",
                    session_id
                );
                return Err(JoinError::CapacityExceeded);
            }
        }

        self.sessions.insert(session_id.clone(), sender);
        let effects = self.state.add_player(&session_id);
        self.deliver(effects);
        Ok(())
    }

    /// Removes the session and publishes the cascade. Returns false if
    /// the session was already gone (leaving twice is a no-op).
    fn handle_leave(&mut self, session_id: &str) -> bool {
        if self.sessions.remove(session_id).is_none() && self.state.player(session_id).is_none() {
            return false;
        }
        let effects = self.state.remove_player(session_id);
        self.deliver(effects);
        true
    }

    /// Fans committed effects out to the session queues. Sessions whose
    /// queue is full or closed are disconnected and their leave cascade
    /// runs immediately after the current batch. Returns true if any
    /// session was dropped.
    fn deliver(&mut self, effects: Vec<Effect>) -> bool {
        let mut dropped: Vec<String> = Vec::new();

        for effect in effects {
            match effect {
                Effect::Replicate(event) => {
                    self.send_all(ServerMessage::Event { event }, &mut dropped)
                }
                Effect::Broadcast(message) => self.send_all(message, &mut dropped),
                Effect::Unicast {
                    session_id,
                    message,
                } => self.send_to(&session_id, message, &mut dropped),
                Effect::Multicast {
                    session_ids,
                    message,
                } => {
                    for session_id in session_ids {
                        self.send_to(&session_id, message.clone(), &mut dropped);
                    }
                }
            }
        }

        let any_dropped = !dropped.is_empty();
        for session_id in dropped {
            if self.sessions.remove(&session_id).is_some() {
                warn!(
                    "Disconnecting session {}: outbound queue unavailable",
                    session_id
                );
            }
            let effects = self.state.remove_player(&session_id);
            self.deliver(effects);
        }
        any_dropped
    }

    fn send_all(&self, message: ServerMessage, dropped: &mut Vec<String>) {
        for (session_id, sender) in &self.sessions {
            if sender.try_send(message.clone()).is_err() {
                dropped.push(session_id.clone());
            }
        }
    }

    fn send_to(&self, session_id: &str, message: ServerMessage, dropped: &mut Vec<String>) {
        if let Some(sender) = self.sessions.get(session_id) {
            if sender.try_send(message).is_err() {
                dropped.push(session_id.to_string());
            }
        }
    }

    async fn publish_listing(&self) {
        RoomRegistry::update_client_count(&self.registry, &self.config.room_id, self.sessions.len())
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{ItemType, ReplicationEvent};
    use std::time::Duration;
    use tokio::time::timeout;

    const RECV_TIMEOUT: Duration = Duration::from_secs(2);

    fn test_config(max_clients: usize) -> RoomConfig {
        RoomConfig {
            room_id: "testroom".to_string(),
            name: "Test Office".to_string(),
            description: "room actor tests".to_string(),
            max_clients,
            auto_dispose: false,
            layout: OfficeLayout {
                computers: vec!["C1".to_string()],
                whiteboards: vec![("W1".to_string(), "wbdoc0000001".to_string())],
            },
        }
    }

    async fn join(
        room: &mpsc::Sender<RoomMessage>,
        session_id: &str,
    ) -> (mpsc::Receiver<ServerMessage>, Result<(), JoinError>) {
        let (tx, rx) = mpsc::channel(SESSION_QUEUE_CAPACITY);
        let (reply_tx, reply_rx) = oneshot::channel();
        room.send(RoomMessage::Join {
            session_id: session_id.to_string(),
            sender: tx,
            reply: reply_tx,
        })
        .await
        .unwrap();
        let result = reply_rx.await.unwrap();
        (rx, result)
    }

    async fn next_message(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
        timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for a room message")
            .expect("room closed the session queue")
    }

    async fn next_event(rx: &mut mpsc::Receiver<ServerMessage>) -> ReplicationEvent {
        loop {
            if let ServerMessage::Event { event } = next_message(rx).await {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_join_receives_handshake_then_snapshot() {
        let registry = RoomRegistry::new(0);
        let room = Room::spawn(test_config(0), registry);

        let (mut rx, result) = join(&room, "a").await;
        assert!(result.is_ok());

        match next_message(&mut rx).await {
            ServerMessage::JoinedRoom {
                session_id,
                room_id,
            } => {
                assert_eq!(session_id, "a");
                assert_eq!(room_id, "testroom");
            }
            other => panic!("Expected join ack, got {:?}", other),
        }
        match next_message(&mut rx).await {
            ServerMessage::RoomData { name, .. } => assert_eq!(name, "Test Office"),
            other => panic!("Expected room data, got {:?}", other),
        }

        // Empty room: the snapshot holds just the static objects, then
        // our own player add is fanned out.
        match next_event(&mut rx).await {
            ReplicationEvent::ComputerAdded { computer_id, .. } => assert_eq!(computer_id, "C1"),
            other => panic!("Expected computer snapshot, got {:?}", other),
        }
        match next_event(&mut rx).await {
            ReplicationEvent::WhiteboardAdded { whiteboard_id, .. } => {
                assert_eq!(whiteboard_id, "W1")
            }
            other => panic!("Expected whiteboard snapshot, got {:?}", other),
        }
        match next_event(&mut rx).await {
            ReplicationEvent::PlayerAdded { session_id, player } => {
                assert_eq!(session_id, "a");
                assert_eq!(player.x, 705.0);
                assert_eq!(player.y, 500.0);
            }
            other => panic!("Expected own player add, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_second_join_notifies_first_and_gets_snapshot() {
        let registry = RoomRegistry::new(0);
        let room = Room::spawn(test_config(0), registry);

        let (mut rx_a, _) = join(&room, "a").await;
        // Drain a's handshake + snapshot + own add.
        for _ in 0..3 {
            next_event(&mut rx_a).await;
        }

        let (mut rx_b, result) = join(&room, "b").await;
        assert!(result.is_ok());

        // a sees b arrive.
        match next_event(&mut rx_a).await {
            ReplicationEvent::PlayerAdded { session_id, .. } => assert_eq!(session_id, "b"),
            other => panic!("Expected b's add, got {:?}", other),
        }

        // b's snapshot includes a.
        match next_event(&mut rx_b).await {
            ReplicationEvent::PlayerAdded { session_id, .. } => assert_eq!(session_id, "a"),
            other => panic!("Expected a in b's snapshot, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_commands_execute_in_receipt_order() {
        let registry = RoomRegistry::new(0);
        let room = Room::spawn(test_config(0), registry);

        let (mut rx_a, _) = join(&room, "a").await;
        for _ in 0..3 {
            next_event(&mut rx_a).await;
        }

        room.send(RoomMessage::Command {
            session_id: "a".to_string(),
            command: Command::ConnectToItem {
                item_type: ItemType::Computer,
                item_id: "C1".to_string(),
            },
        })
        .await
        .unwrap();
        room.send(RoomMessage::Command {
            session_id: "a".to_string(),
            command: Command::DisconnectFromItem {
                item_type: ItemType::Computer,
                item_id: "C1".to_string(),
            },
        })
        .await
        .unwrap();

        match next_event(&mut rx_a).await {
            ReplicationEvent::ItemUserAdded { session_id, .. } => assert_eq!(session_id, "a"),
            other => panic!("Expected membership add, got {:?}", other),
        }
        match next_event(&mut rx_a).await {
            ReplicationEvent::ItemUserRemoved { session_id, .. } => assert_eq!(session_id, "a"),
            other => panic!("Expected membership remove, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_leave_cascade_reaches_remaining_sessions_in_order() {
        let registry = RoomRegistry::new(0);
        let room = Room::spawn(test_config(0), registry);

        let (mut rx_a, _) = join(&room, "a").await;
        for _ in 0..3 {
            next_event(&mut rx_a).await;
        }
        let (_rx_b, _) = join(&room, "b").await;
        next_event(&mut rx_a).await; // b's add

        room.send(RoomMessage::Command {
            session_id: "b".to_string(),
            command: Command::ConnectToItem {
                item_type: ItemType::Computer,
                item_id: "C1".to_string(),
            },
        })
        .await
        .unwrap();
        next_event(&mut rx_a).await; // membership add

        room.send(RoomMessage::Leave {
            session_id: "b".to_string(),
        })
        .await
        .unwrap();

        match next_event(&mut rx_a).await {
            ReplicationEvent::PlayerRemoved { session_id } => assert_eq!(session_id, "b"),
            other => panic!("Expected player remove first, got {:?}", other),
        }
        match next_event(&mut rx_a).await {
            ReplicationEvent::ItemUserRemoved {
                session_id,
                item_id,
                ..
            } => {
                assert_eq!(session_id, "b");
                assert_eq!(item_id, "C1");
            }
            other => panic!("Expected membership remove second, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_capacity_exceeded() {
        let registry = RoomRegistry::new(0);
        let room = Room::spawn(test_config(1), registry);

        let (_rx_a, result) = join(&room, "a").await;
        assert!(result.is_ok());

        let (_rx_b, result) = join(&room, "b").await;
        assert_eq!(result, Err(JoinError::CapacityExceeded));
    }

    #[tokio::test]
    async fn test_closed_session_queue_triggers_departure() {
        let registry = RoomRegistry::new(0);
        let room = Room::spawn(test_config(0), registry);

        let (mut rx_a, _) = join(&room, "a").await;
        for _ in 0..3 {
            next_event(&mut rx_a).await;
        }
        let (rx_b, _) = join(&room, "b").await;
        next_event(&mut rx_a).await; // b's add

        // b's reader vanishes without a leave message.
        drop(rx_b);

        // The next fan-out discovers the closed queue and runs b's
        // departure cascade for everyone else.
        room.send(RoomMessage::Command {
            session_id: "a".to_string(),
            command: Command::UpdatePlayer {
                x: 710.0,
                y: 500.0,
                anim: "adam_run_right".to_string(),
            },
        })
        .await
        .unwrap();

        let mut saw_b_removed = false;
        for _ in 0..4 {
            if let ReplicationEvent::PlayerRemoved { session_id } = next_event(&mut rx_a).await {
                assert_eq!(session_id, "b");
                saw_b_removed = true;
                break;
            }
        }
        assert!(saw_b_removed);
    }
}
