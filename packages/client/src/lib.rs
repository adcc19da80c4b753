//! darkcomm chat client.
//!
//! A [`ClientSession`] owns one TCP connection: user input is written on the
//! caller's task while a receive task hands incoming records to a
//! [`SessionHandler`]. [`run_client`] wires a session to the terminal.

pub mod colors;
pub mod config;
pub mod display;
pub mod error;
pub mod formatter;
pub mod history;
mod runner;
pub mod session;
pub mod ui;

pub use config::ClientConfig;
pub use error::ClientError;
pub use runner::run_client;
pub use session::{
    ChannelHandler, ClientSession, EXIT_COMMAND, SendOutcome, SessionEvent, SessionHandler,
    SessionState,
};
