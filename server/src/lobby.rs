//! Room registry and lobby feed.
//!
//! The registry is the process-wide roster of live rooms. It hands out
//! handles to room inboxes, enforces passwords at the door, and pushes
//! the standard listing feed to lobby subscribers: a full `rooms`
//! listing on subscribe, then an upsert whenever a room appears or its
//! occupancy changes, and a removal when a room is disposed.
//!
//! The registry never touches room state. Occupancy counts are pushed
//! into it by each room's own timeline, so the feed follows the same
//! ordering discipline as in-room replication.

use log::info;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use shared::{RoomListing, ServerMessage};

use crate::office;
use crate::room::{Room, RoomConfig, RoomMessage};
use crate::utils;

pub const PUBLIC_ROOM_NAME: &str = "Public Office";
pub const PUBLIC_ROOM_DESCRIPTION: &str = "The drop-in office everyone shares";

/// Options for creating a custom room.
#[derive(Debug, Clone)]
pub struct RoomOptions {
    pub name: String,
    pub description: String,
    pub password: Option<String>,
    pub auto_dispose: bool,
}

/// Handle to a live room actor plus its lobby-visible metadata.
#[derive(Clone)]
pub struct RoomHandle {
    pub room_id: String,
    pub sender: mpsc::Sender<RoomMessage>,
    password: Option<String>,
}

impl RoomHandle {
    pub fn check_password(&self, supplied: Option<&str>) -> bool {
        match &self.password {
            None => true,
            Some(expected) => supplied == Some(expected.as_str()),
        }
    }
}

struct RegisteredRoom {
    handle: RoomHandle,
    listing: RoomListing,
}

pub struct RoomRegistry {
    rooms: HashMap<String, RegisteredRoom>,
    public_room_id: Option<String>,
    lobby_subscribers: HashMap<u64, mpsc::UnboundedSender<ServerMessage>>,
    next_subscriber_id: u64,
    /// Applied to every room created through this registry; 0 means
    /// unbounded.
    max_clients_per_room: usize,
}

impl RoomRegistry {
    pub fn new(max_clients_per_room: usize) -> Arc<RwLock<RoomRegistry>> {
        Arc::new(RwLock::new(RoomRegistry {
            rooms: HashMap::new(),
            public_room_id: None,
            lobby_subscribers: HashMap::new(),
            next_subscriber_id: 1,
            max_clients_per_room,
        }))
    }

    /// Creates the always-on public room. Called once at startup.
    pub async fn bootstrap_public(registry: &Arc<RwLock<RoomRegistry>>) -> RoomHandle {
        let handle = Self::create_room(
            registry,
            RoomOptions {
                name: PUBLIC_ROOM_NAME.to_string(),
                description: PUBLIC_ROOM_DESCRIPTION.to_string(),
                password: None,
                auto_dispose: false,
            },
        )
        .await;
        registry.write().await.public_room_id = Some(handle.room_id.clone());
        handle
    }

    /// Creates a room, spawns its timeline, and announces it on the
    /// lobby feed.
    pub async fn create_room(
        registry: &Arc<RwLock<RoomRegistry>>,
        options: RoomOptions,
    ) -> RoomHandle {
        let room_id = utils::generate_room_id();
        let max_clients = registry.read().await.max_clients_per_room;

        let config = RoomConfig {
            room_id: room_id.clone(),
            name: options.name.clone(),
            description: options.description.clone(),
            max_clients,
            auto_dispose: options.auto_dispose,
            layout: office::default_layout(),
        };
        let sender = Room::spawn(config, registry.clone());

        let handle = RoomHandle {
            room_id: room_id.clone(),
            sender,
            password: options.password.clone(),
        };
        let listing = RoomListing {
            room_id: room_id.clone(),
            name: options.name,
            description: options.description,
            client_count: 0,
            has_password: options.password.is_some(),
        };

        let mut guard = registry.write().await;
        guard.push_to_subscribers(ServerMessage::RoomUpsert {
            room: listing.clone(),
        });
        guard.rooms.insert(
            room_id.clone(),
            RegisteredRoom {
                handle: handle.clone(),
                listing,
            },
        );
        info!("Registered room {}", room_id);
        handle
    }

    pub async fn public_room(registry: &Arc<RwLock<RoomRegistry>>) -> Option<RoomHandle> {
        let guard = registry.read().await;
        let public_room_id = guard.public_room_id.as_ref()?;
        guard
            .rooms
            .get(public_room_id)
            .map(|room| room.handle.clone())
    }

    pub async fn find_room(
        registry: &Arc<RwLock<RoomRegistry>>,
        room_id: &str,
    ) -> Option<RoomHandle> {
        registry
            .read()
            .await
            .rooms
            .get(room_id)
            .map(|room| room.handle.clone())
    }

    /// Called by a room's timeline after occupancy changes.
    pub async fn update_client_count(
        registry: &Arc<RwLock<RoomRegistry>>,
        room_id: &str,
        client_count: usize,
    ) {
        let mut guard = registry.write().await;
        if let Some(room) = guard.rooms.get_mut(room_id) {
            room.listing.client_count = client_count;
            let listing = room.listing.clone();
            guard.push_to_subscribers(ServerMessage::RoomUpsert { room: listing });
        }
    }

    /// Called by a room's timeline once it has disposed itself.
    pub async fn remove_room(registry: &Arc<RwLock<RoomRegistry>>, room_id: &str) {
        let mut guard = registry.write().await;
        if guard.rooms.remove(room_id).is_some() {
            if guard.public_room_id.as_deref() == Some(room_id) {
                guard.public_room_id = None;
            }
            guard.push_to_subscribers(ServerMessage::RoomRemoved {
                room_id: room_id.to_string(),
            });
            info!("Unregistered room {}", room_id);
        }
    }

    /// Adds a lobby subscriber and immediately sends it the full
    /// listing. Returns the id to unsubscribe with.
    pub async fn subscribe(
        registry: &Arc<RwLock<RoomRegistry>>,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> u64 {
        let mut guard = registry.write().await;
        let mut rooms: Vec<RoomListing> =
            guard.rooms.values().map(|room| room.listing.clone()).collect();
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        let _ = sender.send(ServerMessage::AvailableRooms { rooms });

        let subscriber_id = guard.next_subscriber_id;
        guard.next_subscriber_id += 1;
        guard.lobby_subscribers.insert(subscriber_id, sender);
        subscriber_id
    }

    pub async fn unsubscribe(registry: &Arc<RwLock<RoomRegistry>>, subscriber_id: u64) {
        registry
            .write()
            .await
            .lobby_subscribers
            .remove(&subscriber_id);
    }

    fn push_to_subscribers(&mut self, message: ServerMessage) {
        self.lobby_subscribers
            .retain(|_, sender| sender.send(message.clone()).is_ok());
    }
}
