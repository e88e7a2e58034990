//! WebSocket network layer: accepts connections, binds them to the
//! lobby feed or a room, and shuttles frames to and from the room
//! timelines.
//!
//! The first frame on a fresh connection selects the channel. Lobby
//! connections are read-only listing feeds. Room connections get a
//! session id, a writer task draining the room's per-session queue,
//! and a reader loop that forwards commands in arrival order; when the
//! socket goes away the session's leave runs after any commands it
//! already queued.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

use shared::message::{decode, ClientMessage, ServerMessage};

use crate::commands::Command;
use crate::lobby::{RoomHandle, RoomOptions, RoomRegistry};
use crate::room::{JoinError, RoomMessage, SESSION_QUEUE_CAPACITY};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// Accept loop. Runs until the listener fails.
pub async fn serve(
    listener: TcpListener,
    registry: Arc<RwLock<RoomRegistry>>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Accepting connections on {}", listener.local_addr()?);
    loop {
        let (stream, addr) = listener.accept().await?;
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, registry).await {
                debug!("Connection from {} ended: {}", addr, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    registry: Arc<RwLock<RoomRegistry>>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (sink, mut stream) = ws.split();

    let first = match next_client_message(&mut stream).await {
        Some(message) => message,
        None => return Ok(()),
    };

    match first {
        ClientMessage::JoinLobby => lobby_session(sink, stream, registry).await,
        ClientMessage::JoinOrCreatePublic => match RoomRegistry::public_room(&registry).await {
            Some(handle) => room_session(sink, stream, handle).await,
            None => reject(sink, "no public room available").await,
        },
        ClientMessage::CreateCustom {
            name,
            description,
            password,
            auto_dispose,
        } => {
            let handle = RoomRegistry::create_room(
                &registry,
                RoomOptions {
                    name,
                    description,
                    password,
                    auto_dispose,
                },
            )
            .await;
            room_session(sink, stream, handle).await
        }
        ClientMessage::JoinCustom { room_id, password } => {
            match RoomRegistry::find_room(&registry, &room_id).await {
                Some(handle) if handle.check_password(password.as_deref()) => {
                    room_session(sink, stream, handle).await
                }
                Some(_) => reject(sink, &JoinError::InvalidPassword.to_string()).await,
                None => reject(sink, &JoinError::RoomNotFound.to_string()).await,
            }
        }
        other => {
            warn!("Connection opened with a room command: {:?}; closing", other);
            Ok(())
        }
    }
}

/// Reads frames until one decodes as a client message. Malformed
/// frames are logged and skipped; close or transport error ends the
/// stream.
async fn next_client_message(stream: &mut WsStream) -> Option<ClientMessage> {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => {
                debug!("Transport error: {}", e);
                return None;
            }
        };
        match decode::<ClientMessage>(&text) {
            Ok(message) => return Some(message),
            Err(e) => warn!("Dropping malformed frame: {}", e),
        }
    }
    None
}

async fn send_message(
    sink: &mut WsSink,
    message: &ServerMessage,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    if let Ok(text) = serde_json::to_string(message) {
        sink.send(Message::Text(text)).await?;
    }
    Ok(())
}

async fn reject(
    mut sink: WsSink,
    reason: &str,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    send_message(
        &mut sink,
        &ServerMessage::JoinRejected {
            reason: reason.to_string(),
        },
    )
    .await?;
    sink.close().await
}

async fn lobby_session(
    mut sink: WsSink,
    mut stream: WsStream,
    registry: Arc<RwLock<RoomRegistry>>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscriber_id = RoomRegistry::subscribe(&registry, tx).await;
    info!("Lobby subscriber {} connected", subscriber_id);

    loop {
        tokio::select! {
            update = rx.recv() => {
                match update {
                    Some(message) => {
                        if send_message(&mut sink, &message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            frame = stream.next() => {
                match frame {
                    // Lobby clients only listen; anything else is noise.
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    RoomRegistry::unsubscribe(&registry, subscriber_id).await;
    info!("Lobby subscriber {} disconnected", subscriber_id);
    Ok(())
}

async fn room_session(
    sink: WsSink,
    mut stream: WsStream,
    handle: RoomHandle,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let session_id = Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(SESSION_QUEUE_CAPACITY);
    let (reply_tx, reply_rx) = oneshot::channel();

    let join = RoomMessage::Join {
        session_id: session_id.clone(),
        sender: tx,
        reply: reply_tx,
    };
    if handle.sender.send(join).await.is_err() {
        return reject(sink, "room is no longer available").await;
    }
    match reply_rx.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return reject(sink, &e.to_string()).await,
        Err(_) => return reject(sink, "room is no longer available").await,
    }
    info!("Session {} joined room {}", session_id, handle.room_id);

    // Writer: drain the room's per-session queue onto the socket. Ends
    // when the room drops the queue (leave or overflow disconnect).
    let writer = tokio::spawn(async move {
        let mut sink = sink;
        while let Some(message) = rx.recv().await {
            if send_message(&mut sink, &message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Reader: forward commands in arrival order.
    while let Some(message) = next_client_message(&mut stream).await {
        match Command::from_message(message) {
            Some(command) => {
                let envelope = RoomMessage::Command {
                    session_id: session_id.clone(),
                    command,
                };
                if handle.sender.send(envelope).await.is_err() {
                    break;
                }
            }
            None => warn!(
                "Session {} sent a join-phase message mid-room; dropped",
                session_id
            ),
        }
    }

    // Socket gone. Commands already queued above still execute first;
    // the leave lands behind them on the room's timeline.
    let _ = handle
        .sender
        .send(RoomMessage::Leave {
            session_id: session_id.clone(),
        })
        .await;
    info!("Session {} left room {}", session_id, handle.room_id);

    let _ = writer.await;
    Ok(())
}
