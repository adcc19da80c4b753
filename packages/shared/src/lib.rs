//! Shared building blocks for the darkcomm chat server and client.
//!
//! - [`message`]: the wire record
//! - [`codec`]: newline-delimited JSON framing
//! - [`logger`]: `tracing` subscriber setup for the binaries
//! - [`net`]: address formatting for configuration
//! - [`time`]: clock abstraction used for local message history

pub mod codec;
pub mod logger;
pub mod message;
pub mod net;
pub mod time;

pub use codec::{ChatCodec, CodecError, Frame, decode_line, encode_record};
pub use message::{ChatMessage, DEFAULT_USERNAME, MessageError, validate_username};
