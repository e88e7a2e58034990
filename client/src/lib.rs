//! # Office Client Library
//!
//! Client-side sync layer for the shared virtual office: the network
//! service, the connection state machine, and the reconciler that
//! mirrors room state and bridges it into application events.
//!
//! ## How the pieces fit
//!
//! - **Network** (`network`): owns the lobby and room WebSocket
//!   connections. Commands go out only while `Synchronized`; a session
//!   that loses its transport drops to `Disconnected` and recovers via
//!   `resync()`: discard the mirror, rejoin, take a fresh snapshot.
//! - **Reconciler** (`reconciler`): read-only shadow of the room
//!   state, updated from the replication stream and re-emitted as
//!   [`events::OfficeEvent`]s over a channel the embedding app passes
//!   in. Rendering and UI consume events; they never touch sockets.
//! - **Local player** (`player`): the optimistically simulated pose.
//!   Movement is applied immediately on input, and an update is sent
//!   only when the pose actually changed since the last send.
//!
//! The server remains authoritative for everyone else's state; the
//! local pose is the one thing this client trusts itself about.

pub mod events;
pub mod network;
pub mod player;
pub mod reconciler;

pub use events::OfficeEvent;
pub use network::{JoinIntent, Network, SessionState};
pub use player::LocalPlayer;
pub use reconciler::Reconciler;
