//! The client's network service.
//!
//! Owns the WebSocket connections (lobby feed and room channel), the
//! connection state machine, and the outbound command senders. Only a
//! `Synchronized` session may send commands; anything else is dropped
//! with a local warning, never forwarded.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use shared::message::{decode, ClientMessage, ServerMessage};

use crate::events::OfficeEvent;
use crate::player::LocalPlayer;
use crate::reconciler::Reconciler;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Connection lifecycle. `Synchronized` is the only state in which
/// commands go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    JoiningLobby,
    LobbyActive,
    JoiningRoom,
    Synchronized,
}

/// How to enter a room. Stored (normalized to a by-id join) so a
/// resync can replay it.
#[derive(Debug, Clone)]
pub enum JoinIntent {
    Public,
    Custom {
        room_id: String,
        password: Option<String>,
    },
    CreateCustom {
        name: String,
        description: String,
        password: Option<String>,
        auto_dispose: bool,
    },
}

impl JoinIntent {
    fn to_message(&self) -> ClientMessage {
        match self {
            JoinIntent::Public => ClientMessage::JoinOrCreatePublic,
            JoinIntent::Custom { room_id, password } => ClientMessage::JoinCustom {
                room_id: room_id.clone(),
                password: password.clone(),
            },
            JoinIntent::CreateCustom {
                name,
                description,
                password,
                auto_dispose,
            } => ClientMessage::CreateCustom {
                name: name.clone(),
                description: description.clone(),
                password: password.clone(),
                auto_dispose: *auto_dispose,
            },
        }
    }

    fn password(&self) -> Option<String> {
        match self {
            JoinIntent::Public => None,
            JoinIntent::Custom { password, .. } => password.clone(),
            JoinIntent::CreateCustom { password, .. } => password.clone(),
        }
    }
}

pub struct Network {
    endpoint: String,
    state: Arc<RwLock<SessionState>>,
    events: mpsc::UnboundedSender<OfficeEvent>,

    session_id: Option<String>,
    room_id: Option<String>,
    resync_intent: Option<JoinIntent>,

    reconciler: Option<Arc<Mutex<Reconciler>>>,
    local_player: LocalPlayer,

    room_tx: Option<mpsc::UnboundedSender<ClientMessage>>,
    lobby_task: Option<JoinHandle<()>>,
    room_tasks: Vec<JoinHandle<()>>,
}

impl Network {
    pub fn new(endpoint: &str, events: mpsc::UnboundedSender<OfficeEvent>) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            state: Arc::new(RwLock::new(SessionState::Disconnected)),
            events,
            session_id: None,
            room_id: None,
            resync_intent: None,
            reconciler: None,
            local_player: LocalPlayer::new(),
            room_tx: None,
            lobby_task: None,
            room_tasks: Vec::new(),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    /// Shared handle to the room-state mirror, if a room is joined.
    pub fn reconciler(&self) -> Option<Arc<Mutex<Reconciler>>> {
        self.reconciler.clone()
    }

    pub fn local_player(&self) -> &LocalPlayer {
        &self.local_player
    }

    async fn connect(&self) -> Result<(WsSink, WsStream), Box<dyn std::error::Error>> {
        let (ws, _) = tokio_tungstenite::connect_async(self.endpoint.as_str()).await?;
        Ok(ws.split())
    }

    /// Joins the lobby feed. Listing updates arrive as
    /// [`OfficeEvent::AvailableRooms`] / `RoomUpsert` / `RoomRemoved`.
    pub async fn join_lobby(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.set_state(SessionState::JoiningLobby).await;
        let (mut sink, mut stream) = match self.connect().await {
            Ok(pair) => pair,
            Err(e) => {
                self.set_state(SessionState::Disconnected).await;
                return Err(e);
            }
        };

        let text = serde_json::to_string(&ClientMessage::JoinLobby)?;
        if let Err(e) = sink.send(Message::Text(text)).await {
            self.set_state(SessionState::Disconnected).await;
            return Err(e.into());
        }
        self.set_state(SessionState::LobbyActive).await;
        info!("Joined lobby at {}", self.endpoint);

        let events = self.events.clone();
        self.lobby_task = Some(tokio::spawn(async move {
            // The sink lives here so the connection stays open for the
            // feed's lifetime.
            let _sink = sink;
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                match decode::<ServerMessage>(&text) {
                    Ok(ServerMessage::AvailableRooms { rooms }) => {
                        let _ = events.send(OfficeEvent::AvailableRooms { rooms });
                    }
                    Ok(ServerMessage::RoomUpsert { room }) => {
                        let _ = events.send(OfficeEvent::RoomUpsert { room });
                    }
                    Ok(ServerMessage::RoomRemoved { room_id }) => {
                        let _ = events.send(OfficeEvent::RoomRemoved { room_id });
                    }
                    Ok(other) => debug!("Ignoring {:?} on the lobby channel", other),
                    Err(e) => warn!("Dropping malformed lobby frame: {}", e),
                }
            }
        }));
        Ok(())
    }

    pub async fn join_or_create_public(&mut self) -> Result<String, Box<dyn std::error::Error>> {
        self.join_room(JoinIntent::Public).await
    }

    pub async fn join_custom(
        &mut self,
        room_id: &str,
        password: Option<&str>,
    ) -> Result<String, Box<dyn std::error::Error>> {
        self.join_room(JoinIntent::Custom {
            room_id: room_id.to_string(),
            password: password.map(str::to_string),
        })
        .await
    }

    pub async fn create_custom(
        &mut self,
        name: &str,
        description: &str,
        password: Option<&str>,
        auto_dispose: bool,
    ) -> Result<String, Box<dyn std::error::Error>> {
        self.join_room(JoinIntent::CreateCustom {
            name: name.to_string(),
            description: description.to_string(),
            password: password.map(str::to_string),
            auto_dispose,
        })
        .await
    }

    /// Drops the room connection, discards the mirror, and replays the
    /// last join to get a fresh snapshot. Incremental repair after a
    /// gap is never attempted.
    pub async fn resync(&mut self) -> Result<String, Box<dyn std::error::Error>> {
        let intent = match self.resync_intent.clone() {
            Some(intent) => intent,
            None => return Err("no previous room to resync".into()),
        };
        info!("Resyncing: discarding mirror and rejoining");
        self.join_room(intent).await
    }

    /// Leaves the current room, cancelling pending sends.
    pub async fn leave(&mut self) {
        self.teardown_room();
        self.set_state(SessionState::Disconnected).await;
    }

    async fn join_room(&mut self, intent: JoinIntent) -> Result<String, Box<dyn std::error::Error>> {
        self.teardown_room();
        self.set_state(SessionState::JoiningRoom).await;

        let (mut sink, mut stream) = match self.connect().await {
            Ok(pair) => pair,
            Err(e) => {
                self.set_state(SessionState::Disconnected).await;
                return Err(e);
            }
        };
        let text = serde_json::to_string(&intent.to_message())?;
        if let Err(e) = sink.send(Message::Text(text)).await {
            self.set_state(SessionState::Disconnected).await;
            return Err(e.into());
        }

        // The join verdict is the first frame; the snapshot streams in
        // right behind it on the same connection.
        let (session_id, room_id) = loop {
            let frame = match stream.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    self.set_state(SessionState::Disconnected).await;
                    return Err(e.into());
                }
                None => {
                    self.set_state(SessionState::Disconnected).await;
                    return Err("connection closed during join".into());
                }
            };
            let text = match frame {
                Message::Text(text) => text,
                Message::Close(_) => {
                    self.set_state(SessionState::Disconnected).await;
                    return Err("connection closed during join".into());
                }
                _ => continue,
            };
            let message = match decode::<ServerMessage>(&text) {
                Ok(message) => message,
                Err(e) => {
                    self.set_state(SessionState::Disconnected).await;
                    return Err(e.into());
                }
            };
            match message {
                ServerMessage::JoinedRoom {
                    session_id,
                    room_id,
                } => break (session_id, room_id),
                ServerMessage::JoinRejected { reason } => {
                    self.set_state(SessionState::Disconnected).await;
                    return Err(reason.into());
                }
                other => debug!("Frame before join verdict: {:?}", other),
            }
        };

        let reconciler = Arc::new(Mutex::new(Reconciler::new(
            session_id.clone(),
            self.events.clone(),
        )));

        // Writer: one queue onto the socket.
        let (room_tx, mut room_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let writer = tokio::spawn(async move {
            while let Some(message) = room_rx.recv().await {
                if let Ok(text) = serde_json::to_string(&message) {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            }
            let _ = sink.close().await;
        });

        // Reader: replication stream into the reconciler.
        let state = self.state.clone();
        let events = self.events.clone();
        let shadow = reconciler.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                match decode::<ServerMessage>(&text) {
                    Ok(message) => shadow.lock().await.apply(message),
                    Err(e) => warn!("Dropping malformed frame: {}", e),
                }
            }
            // Transport loss: commands stop until a resync.
            let mut guard = state.write().await;
            if *guard == SessionState::Synchronized {
                *guard = SessionState::Disconnected;
                let _ = events.send(OfficeEvent::Disconnected);
            }
        });

        // The lobby feed is left once a room is entered.
        if let Some(task) = self.lobby_task.take() {
            task.abort();
        }

        self.resync_intent = Some(JoinIntent::Custom {
            room_id: room_id.clone(),
            password: intent.password(),
        });
        self.session_id = Some(session_id.clone());
        self.room_id = Some(room_id.clone());
        self.reconciler = Some(reconciler);
        self.room_tx = Some(room_tx);
        self.room_tasks = vec![writer, reader];
        self.local_player = LocalPlayer::new();
        self.set_state(SessionState::Synchronized).await;

        info!("Joined room {} as session {}", room_id, session_id);
        Ok(session_id)
    }

    fn teardown_room(&mut self) {
        for task in self.room_tasks.drain(..) {
            task.abort();
        }
        self.room_tx = None;
        self.reconciler = None;
        self.session_id = None;
    }

    async fn set_state(&self, next: SessionState) {
        *self.state.write().await = next;
    }

    async fn send_command(&self, message: ClientMessage) {
        if *self.state.read().await != SessionState::Synchronized {
            warn!("Dropping {:?}: session is not synchronized", message);
            return;
        }
        if let Some(tx) = &self.room_tx {
            if tx.send(message).is_err() {
                warn!("Room connection closed; command dropped");
            }
        }
    }

    /// Feeds the simulation tick's pose; an `update_player` goes out
    /// only when position or animation actually changed since the last
    /// send.
    pub async fn move_player(&mut self, x: f32, y: f32, anim: &str) {
        self.local_player.set_pose(x, y, anim);
        if *self.state.read().await != SessionState::Synchronized {
            // Prediction carries on locally; nothing goes out.
            return;
        }
        if let Some((x, y, anim)) = self.local_player.take_update() {
            self.send_command(ClientMessage::UpdatePlayer { x, y, anim }).await;
        }
    }

    pub async fn update_player_name(&self, name: &str) {
        self.send_command(ClientMessage::UpdatePlayerName {
            name: name.to_string(),
        })
        .await;
    }

    pub async fn update_player_image(&self, image_url: &str) {
        self.send_command(ClientMessage::UpdatePlayerImage {
            image_url: image_url.to_string(),
        })
        .await;
    }

    pub async fn ready_to_connect(&self) {
        self.send_command(ClientMessage::ReadyToConnect).await;
    }

    pub async fn video_connected(&self) {
        self.send_command(ClientMessage::VideoConnected).await;
    }

    pub async fn connect_to_computer(&self, computer_id: &str) {
        self.send_command(ClientMessage::ConnectToComputer {
            computer_id: computer_id.to_string(),
        })
        .await;
    }

    pub async fn disconnect_from_computer(&self, computer_id: &str) {
        self.send_command(ClientMessage::DisconnectFromComputer {
            computer_id: computer_id.to_string(),
        })
        .await;
    }

    pub async fn connect_to_whiteboard(&self, whiteboard_id: &str) {
        self.send_command(ClientMessage::ConnectToWhiteboard {
            whiteboard_id: whiteboard_id.to_string(),
        })
        .await;
    }

    pub async fn disconnect_from_whiteboard(&self, whiteboard_id: &str) {
        self.send_command(ClientMessage::DisconnectFromWhiteboard {
            whiteboard_id: whiteboard_id.to_string(),
        })
        .await;
    }

    pub async fn disconnect_stream(&self, client_id: &str) {
        self.send_command(ClientMessage::DisconnectStream {
            client_id: client_id.to_string(),
        })
        .await;
    }

    pub async fn stop_screen_share(&self, computer_id: &str) {
        self.send_command(ClientMessage::StopScreenShare {
            computer_id: computer_id.to_string(),
        })
        .await;
    }

    pub async fn add_chat_message(&self, content: &str) {
        self.send_command(ClientMessage::AddChatMessage {
            content: content.to_string(),
        })
        .await;
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        if let Some(task) = self.lobby_task.take() {
            task.abort();
        }
        for task in self.room_tasks.drain(..) {
            task.abort();
        }
    }
}
