//! Integration tests for the office sync layer
//!
//! These tests validate cross-component behavior over real localhost
//! WebSocket connections: join snapshots, replication fan-out,
//! membership cascades, chat validation, and the lobby feed.

use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use client::events::OfficeEvent;
use client::network::Network;
use server::lobby::RoomRegistry;
use shared::ItemType;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Boots a server on an ephemeral port and returns its endpoint.
async fn start_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = RoomRegistry::new(0);
    RoomRegistry::bootstrap_public(&registry).await;
    tokio::spawn(async move {
        let _ = server::network::serve(listener, registry).await;
    });
    format!("ws://{}", addr)
}

/// Joins the public room, sets a display name, and waits until the
/// server has acknowledged it (the echoed field change lands in our
/// own mirror), so later joiners see a settled state.
async fn connect_client(
    endpoint: &str,
    name: &str,
) -> (Network, mpsc::UnboundedReceiver<OfficeEvent>, String) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut network = Network::new(endpoint, events_tx);
    let session_id = network.join_or_create_public().await.unwrap();
    network.update_player_name(name).await;

    let reconciler = network.reconciler().unwrap();
    timeout(EVENT_TIMEOUT, async {
        loop {
            {
                let guard = reconciler.lock().await;
                if let Some(player) = guard.player(&session_id) {
                    if player.name == name {
                        break;
                    }
                }
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("server never acknowledged the player name");

    (network, events_rx, session_id)
}

/// Reads events until one matches, discarding the rest.
async fn expect_event<F>(
    rx: &mut mpsc::UnboundedReceiver<OfficeEvent>,
    mut matching: F,
) -> OfficeEvent
where
    F: FnMut(&OfficeEvent) -> bool,
{
    timeout(EVENT_TIMEOUT, async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if matching(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for a matching event")
}

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use shared::message::{decode, ClientMessage, ServerMessage};
    use shared::{Player, ReplicationEvent};

    /// Frames survive the text wire both ways.
    #[test]
    fn wire_frames_roundtrip() {
        let outbound = ClientMessage::UpdatePlayer {
            x: 712.0,
            y: 480.0,
            anim: "adam_run_up".to_string(),
        };
        let text = serde_json::to_string(&outbound).unwrap();
        assert_eq!(decode::<ClientMessage>(&text).unwrap(), outbound);

        let inbound = ServerMessage::Event {
            event: ReplicationEvent::PlayerAdded {
                session_id: "abc".to_string(),
                player: Player::new(),
            },
        };
        let text = serde_json::to_string(&inbound).unwrap();
        assert_eq!(decode::<ServerMessage>(&text).unwrap(), inbound);
    }
}

/// REPLICATION SCENARIOS
mod replication_tests {
    use super::*;

    /// A second joiner receives the incumbent in its snapshot, and the
    /// incumbent sees the newcomer arrive at the spawn point.
    #[tokio::test]
    async fn join_snapshot_and_notification() {
        let endpoint = start_server().await;

        let (network_a, mut events_a, session_a) = connect_client(&endpoint, "alice").await;
        let (network_b, mut events_b, session_b) = connect_client(&endpoint, "bob").await;

        // b's snapshot already contains a named alice.
        let joined = expect_event(&mut events_b, |event| {
            matches!(event, OfficeEvent::PlayerJoined { session_id, .. } if *session_id == session_a)
        })
        .await;
        match joined {
            OfficeEvent::PlayerJoined { player, .. } => assert_eq!(player.name, "alice"),
            _ => unreachable!(),
        }

        // a watches bob arrive and name himself.
        let joined = expect_event(&mut events_a, |event| {
            matches!(event, OfficeEvent::PlayerJoined { session_id, .. } if *session_id == session_b)
        })
        .await;
        match joined {
            OfficeEvent::PlayerJoined { player, .. } => {
                assert_eq!(player.name, "bob");
                assert_eq!(player.x, 705.0);
                assert_eq!(player.y, 500.0);
            }
            _ => unreachable!(),
        }

        // Both mirrors converge on the same roster and objects.
        let reconciler_b = network_b.reconciler().unwrap();
        let guard = reconciler_b.lock().await;
        assert_eq!(guard.players().len(), 2);
        assert!(guard.computer("0").is_some());
        assert!(guard.whiteboard("0").is_some());
        drop(guard);

        let reconciler_a = network_a.reconciler().unwrap();
        assert_eq!(reconciler_a.lock().await.players().len(), 2);
    }

    /// Position updates replicate to the other client but never touch
    /// its own predicted pose.
    #[tokio::test]
    async fn movement_replicates_to_others() {
        let endpoint = start_server().await;

        let (mut network_a, _events_a, session_a) = connect_client(&endpoint, "alice").await;
        let (network_b, mut events_b, _session_b) = connect_client(&endpoint, "bob").await;

        network_a.move_player(740.0, 520.0, "adam_run_right").await;

        expect_event(&mut events_b, |event| {
            matches!(event, OfficeEvent::PlayerUpdated { session_id, .. } if *session_id == session_a)
        })
        .await;

        let reconciler_b = network_b.reconciler().unwrap();
        timeout(EVENT_TIMEOUT, async {
            loop {
                {
                    let guard = reconciler_b.lock().await;
                    let mirrored = guard.player(&session_a).unwrap();
                    if mirrored.x == 740.0 && mirrored.anim == "adam_run_right" {
                        break;
                    }
                }
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("bob never saw alice move");
    }

    /// Membership add/remove reaches every subscriber; disconnecting
    /// twice stays silent.
    #[tokio::test]
    async fn computer_membership_lifecycle() {
        let endpoint = start_server().await;

        let (network_a, mut events_a, session_a) = connect_client(&endpoint, "alice").await;
        let (_network_b, mut events_b, _session_b) = connect_client(&endpoint, "bob").await;

        network_a.connect_to_computer("0").await;
        for events in [&mut events_a, &mut events_b] {
            let added = expect_event(events, |event| {
                matches!(event, OfficeEvent::ItemUserAdded { .. })
            })
            .await;
            assert_eq!(
                added,
                OfficeEvent::ItemUserAdded {
                    item_type: ItemType::Computer,
                    item_id: "0".to_string(),
                    session_id: session_a.clone(),
                }
            );
        }

        network_a.disconnect_from_computer("0").await;
        expect_event(&mut events_b, |event| {
            matches!(event, OfficeEvent::ItemUserRemoved { .. })
        })
        .await;

        // A second disconnect is a no-op; the chat line is a barrier
        // proving nothing else came through.
        network_a.disconnect_from_computer("0").await;
        network_a.add_chat_message("barrier").await;

        let mut removals = 0;
        loop {
            let event = expect_event(&mut events_b, |event| {
                matches!(
                    event,
                    OfficeEvent::ItemUserRemoved { .. } | OfficeEvent::ChatMessageAdded { .. }
                )
            })
            .await;
            match event {
                OfficeEvent::ItemUserRemoved { .. } => removals += 1,
                OfficeEvent::ChatMessageAdded { .. } => break,
                _ => unreachable!(),
            }
        }
        assert_eq!(removals, 0);
    }

    /// Chat content is trimmed, broadcast to everyone, and empty
    /// content is rejected without a broadcast.
    #[tokio::test]
    async fn chat_broadcast_and_validation() {
        let endpoint = start_server().await;

        let (network_a, mut events_a, session_a) = connect_client(&endpoint, "alice").await;
        let (_network_b, mut events_b, _session_b) = connect_client(&endpoint, "bob").await;

        network_a.add_chat_message("  hi there  ").await;

        for events in [&mut events_a, &mut events_b] {
            let added = expect_event(events, |event| {
                matches!(event, OfficeEvent::ChatMessageAdded { .. })
            })
            .await;
            match added {
                OfficeEvent::ChatMessageAdded { message } => {
                    assert_eq!(message.author, "alice");
                    assert_eq!(message.content, "hi there");
                }
                _ => unreachable!(),
            }
            let bubble = expect_event(events, |event| {
                matches!(event, OfficeEvent::ChatBubble { .. })
            })
            .await;
            assert_eq!(
                bubble,
                OfficeEvent::ChatBubble {
                    session_id: session_a.clone(),
                    content: "hi there".to_string(),
                }
            );
        }

        // Whitespace-only content never leaves the server.
        network_a.add_chat_message("   ").await;
        network_a.add_chat_message("done").await;

        let added = expect_event(&mut events_b, |event| {
            matches!(event, OfficeEvent::ChatMessageAdded { .. })
        })
        .await;
        match added {
            OfficeEvent::ChatMessageAdded { message } => assert_eq!(message.content, "done"),
            _ => unreachable!(),
        }
    }

    /// A dropped connection removes the player first, then its
    /// memberships, in that order, for everyone still subscribed.
    #[tokio::test]
    async fn disconnect_cascade_ordering() {
        let endpoint = start_server().await;

        let (mut network_a, _events_a, session_a) = connect_client(&endpoint, "alice").await;
        let (_network_b, mut events_b, _session_b) = connect_client(&endpoint, "bob").await;

        network_a.connect_to_computer("0").await;
        expect_event(&mut events_b, |event| {
            matches!(event, OfficeEvent::ItemUserAdded { .. })
        })
        .await;

        network_a.leave().await;

        // Order matters: a wrong order would consume the removal here
        // and hang below.
        let left = expect_event(&mut events_b, |event| {
            matches!(event, OfficeEvent::PlayerLeft { .. })
        })
        .await;
        assert_eq!(
            left,
            OfficeEvent::PlayerLeft {
                session_id: session_a.clone(),
                name: "alice".to_string(),
            }
        );
        let removed = expect_event(&mut events_b, |event| {
            matches!(event, OfficeEvent::ItemUserRemoved { .. })
        })
        .await;
        assert_eq!(
            removed,
            OfficeEvent::ItemUserRemoved {
                item_type: ItemType::Computer,
                item_id: "0".to_string(),
                session_id: session_a,
            }
        );
    }

    /// Resync discards the mirror and rebuilds it from a fresh
    /// snapshot under a new session identity.
    #[tokio::test]
    async fn resync_rebuilds_from_snapshot() {
        let endpoint = start_server().await;

        let (mut network_a, _events_a, session_a) = connect_client(&endpoint, "alice").await;
        let (_network_b, _events_b, session_b) = connect_client(&endpoint, "bob").await;

        let new_session = network_a.resync().await.unwrap();
        assert_ne!(new_session, session_a);

        let reconciler = network_a.reconciler().unwrap();
        timeout(EVENT_TIMEOUT, async {
            loop {
                {
                    let guard = reconciler.lock().await;
                    if guard.player(&session_b).is_some() && guard.player(&new_session).is_some() {
                        break;
                    }
                }
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("resynced mirror never converged");
    }
}

/// LOBBY TESTS
mod lobby_tests {
    use super::*;

    /// The lobby feed lists existing rooms, upserts new ones, and
    /// removes auto-disposed rooms once they empty out.
    #[tokio::test]
    async fn lobby_feed_follows_room_lifecycle() {
        let endpoint = start_server().await;

        let (events_tx, mut lobby_events) = mpsc::unbounded_channel();
        let mut lobby_client = Network::new(&endpoint, events_tx);
        lobby_client.join_lobby().await.unwrap();

        let listing = expect_event(&mut lobby_events, |event| {
            matches!(event, OfficeEvent::AvailableRooms { .. })
        })
        .await;
        match listing {
            OfficeEvent::AvailableRooms { rooms } => {
                assert_eq!(rooms.len(), 1);
                assert!(!rooms[0].has_password);
            }
            _ => unreachable!(),
        }

        let (events_tx, _creator_events) = mpsc::unbounded_channel();
        let mut creator = Network::new(&endpoint, events_tx);
        creator
            .create_custom("War Room", "planning", None, true)
            .await
            .unwrap();
        let room_id = creator.room_id().unwrap().to_string();

        let upsert = expect_event(&mut lobby_events, |event| {
            matches!(event, OfficeEvent::RoomUpsert { room } if room.room_id == room_id)
        })
        .await;
        match upsert {
            OfficeEvent::RoomUpsert { room } => assert_eq!(room.name, "War Room"),
            _ => unreachable!(),
        }

        // Creator leaves; the auto-disposing room disappears from the
        // feed.
        creator.leave().await;
        expect_event(&mut lobby_events, |event| {
            matches!(event, OfficeEvent::RoomRemoved { room_id: removed } if *removed == room_id)
        })
        .await;
    }

    /// Password-protected rooms reject wrong or missing passwords.
    #[tokio::test]
    async fn custom_room_password_enforcement() {
        let endpoint = start_server().await;

        let (events_tx, _creator_events) = mpsc::unbounded_channel();
        let mut creator = Network::new(&endpoint, events_tx);
        creator
            .create_custom("Locked", "private", Some("hunter2"), true)
            .await
            .unwrap();
        let room_id = creator.room_id().unwrap().to_string();

        let (events_tx, _guest_events) = mpsc::unbounded_channel();
        let mut guest = Network::new(&endpoint, events_tx);

        let denied = guest.join_custom(&room_id, Some("wrong")).await;
        assert!(denied.is_err());
        let denied = guest.join_custom(&room_id, None).await;
        assert!(denied.is_err());

        guest.join_custom(&room_id, Some("hunter2")).await.unwrap();

        let missing = guest.join_custom("no-such-room", None).await;
        assert!(missing.is_err());
    }
}
