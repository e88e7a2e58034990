//! # Office Server Library
//!
//! Authoritative server for the shared virtual office. Each room owns
//! its canonical state and mutates it on a single timeline; every
//! committed change is pushed to subscribers as a replication event so
//! all clients converge on one truth.
//!
//! ## Architecture
//!
//! - **State container** (`office`): the room's players, interactable
//!   objects and chat log. Pure, synchronous, single-writer; commands
//!   degrade to no-ops instead of erroring.
//! - **Command pipeline** (`commands` + `office::apply`): one tagged
//!   command per inbound room message, executed strictly in receipt
//!   order.
//! - **Room authority** (`room`): the per-room task that owns the
//!   state, orders joins/leaves/commands, and fans effects out through
//!   bounded per-session queues. A slow reader is disconnected rather
//!   than allowed to stall the room.
//! - **Registry + lobby feed** (`lobby`): process-wide room roster and
//!   the add/update/remove listing feed.
//! - **Network** (`network`): WebSocket accept loop, per-connection
//!   reader/writer tasks, wire-to-command translation.
//!
//! Joining clients receive the handshake, the room metadata, and a
//! full state snapshot before any incremental event; afterwards they
//! observe the same per-room commit order as everyone else.

pub mod commands;
pub mod lobby;
pub mod network;
pub mod office;
pub mod room;
pub mod utils;
