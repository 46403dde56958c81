//! JSON codec for control messages.
//!
//! WebSocket text frames are already delimited, so there is no framing layer;
//! each frame holds exactly one JSON message.

use thiserror::Error;

use crate::messages::{ClientMessage, ServerMessage};

/// Maximum accepted inbound message size (64 KiB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Inbound message exceeds the size cap.
    #[error("Message size {0} exceeds maximum {MAX_MESSAGE_SIZE}")]
    MessageTooLarge(usize),

    /// Malformed or unrecognized client message.
    #[error("Decoding error: {0}")]
    Decode(serde_json::Error),

    /// Server message failed to serialize.
    #[error("Encoding error: {0}")]
    Encode(serde_json::Error),
}

/// Decode a client control message from a text frame.
///
/// # Errors
///
/// Returns an error if the frame is oversized, malformed, or of an unknown
/// message type.
pub fn decode_client(text: &str) -> Result<ClientMessage, ProtocolError> {
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(text.len()));
    }
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}

/// Encode a server message to a text frame.
///
/// # Errors
///
/// Returns an error if the message fails to serialize.
pub fn encode_server(msg: &ServerMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(ProtocolError::Encode)
}
