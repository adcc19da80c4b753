//! Newline-delimited JSON framing.
//!
//! [`ChatCodec`] plugs into `tokio_util::codec::{FramedRead, FramedWrite}`
//! on both ends of a connection. Every complete line becomes one [`Frame`];
//! a line that is not a valid record becomes [`Frame::Malformed`] instead of
//! an error, so a single bad line never ends the stream.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::message::ChatMessage;

/// Fatal codec errors. Any of these ends the connection.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Transport read or write failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A line grew beyond the configured `max_line_bytes`
    #[error("Line exceeds the maximum of {limit} bytes")]
    LineTooLong { limit: usize },

    /// Record could not be serialized
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One decoded line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A line that parsed into a record
    Record(ChatMessage),
    /// A line that failed JSON parsing; the stream continues after it
    Malformed { line: String, reason: String },
}

/// Codec for one JSON object per `\n`-terminated line.
#[derive(Debug, Clone, Default)]
pub struct ChatCodec {
    max_line_bytes: Option<usize>,
    /// Buffer index already scanned for a newline
    next_index: usize,
}

impl ChatCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec that fails with [`CodecError::LineTooLong`] once a line is
    /// longer than `max_line_bytes` (newline excluded).
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            max_line_bytes: Some(max_line_bytes),
            next_index: 0,
        }
    }

    fn check_length(&self, len: usize) -> Result<(), CodecError> {
        match self.max_line_bytes {
            Some(limit) if len > limit => Err(CodecError::LineTooLong { limit }),
            _ => Ok(()),
        }
    }
}

/// Serialize a record as compact JSON followed by a single `\n`.
pub fn encode_record(record: &ChatMessage) -> Result<Bytes, CodecError> {
    let mut bytes = serde_json::to_vec(record)?;
    bytes.push(b'\n');
    Ok(Bytes::from(bytes))
}

/// Decode one line without its terminating newline.
///
/// Returns `None` for whitespace-only lines.
pub fn decode_line(line: &[u8]) -> Option<Frame> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    let frame = match serde_json::from_slice::<ChatMessage>(line) {
        Ok(record) => Frame::Record(record),
        Err(e) => Frame::Malformed {
            line: String::from_utf8_lossy(line).into_owned(),
            reason: e.to_string(),
        },
    };
    Some(frame)
}

impl Decoder for ChatCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        loop {
            let offset = self.next_index.min(buf.len());
            let Some(pos) = buf[offset..].iter().position(|b| *b == b'\n') else {
                self.check_length(buf.len())?;
                self.next_index = buf.len();
                return Ok(None);
            };

            let newline_index = offset + pos;
            self.next_index = 0;
            let line = buf.split_to(newline_index + 1);
            let line = &line[..newline_index];
            self.check_length(line.len())?;

            if let Some(frame) = decode_line(line) {
                return Ok(Some(frame));
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        if !buf.is_empty() {
            tracing::debug!(
                "Discarding {} trailing bytes without a newline at end of stream",
                buf.len()
            );
            buf.clear();
        }
        self.next_index = 0;
        Ok(None)
    }
}

impl Encoder<ChatMessage> for ChatCodec {
    type Error = CodecError;

    fn encode(&mut self, record: ChatMessage, dst: &mut BytesMut) -> Result<(), CodecError> {
        let bytes = encode_record(&record)?;
        dst.reserve(bytes.len());
        dst.put(bytes);
        Ok(())
    }
}
