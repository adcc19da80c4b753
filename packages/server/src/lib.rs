//! darkcomm chat server.
//!
//! Accepts TCP connections and rebroadcasts every newline-delimited JSON
//! message to all other connected clients.
//!
//! - [`registry`]: the set of open connections
//! - [`broadcast`]: fan-out of one record to every other connection
//! - [`handler`]: per-connection receive loop
//! - [`server`]: acceptor loop and shutdown
//!
//! Reads block indefinitely: a peer that vanishes without closing its
//! socket is only noticed when a write to it fails.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod handler;
pub mod registry;
pub mod server;
mod signal;
pub mod state;

pub use broadcast::{BroadcastReport, Broadcaster};
pub use config::ServerConfig;
pub use error::ServerError;
pub use registry::{ConnectionId, ConnectionRegistry, PeerConnection};
pub use server::{ChatServer, ServerState};
pub use signal::shutdown_signal;
