//! Wire framing
//!
//! Every datagram is a JSON frame carrying the protocol version and one
//! tagged [`Message`]. Payloads that do not parse as a frame are rejected;
//! they are never reinterpreted as chat text.

use crate::message::Message;
use crate::version::{is_protocol_compatible, PROTOCOL_VERSION};
use crate::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Envelope for one message on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFrame {
    pub protocol: u32,
    pub message: Message,
}

#[derive(Deserialize)]
struct FrameHeader {
    protocol: u32,
}

/// Encode a message as a datagram payload
pub fn encode_frame(message: &Message) -> Result<Bytes> {
    let frame = WireFrame {
        protocol: PROTOCOL_VERSION,
        message: message.clone(),
    };
    serde_json::to_vec(&frame)
        .map(Bytes::from)
        .map_err(|e| Error::Serialization(format!("Failed to encode frame: {}", e)))
}

/// Decode a datagram payload into a message
pub fn decode_frame(data: &[u8]) -> Result<Message> {
    let header: FrameHeader = serde_json::from_slice(data)
        .map_err(|e| Error::Malformed(format!("not a frame: {}", e)))?;

    if !is_protocol_compatible(header.protocol) {
        return Err(Error::IncompatibleProtocol {
            expected: PROTOCOL_VERSION,
            actual: header.protocol,
        });
    }

    let frame: WireFrame = serde_json::from_slice(data)
        .map_err(|e| Error::Malformed(format!("bad message: {}", e)))?;
    Ok(frame.message)
}
