//! Message encoding.
//!
//! HTTP bodies and WebSocket frames carry JSON text; UDP datagrams carry
//! bincode, the same compact binary encoding used for other datagram traffic.

use anyhow::Result;

use crate::directory::Message;

/// Largest datagram the UDP binding will send or accept.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

pub fn encode_text(message: &Message) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode_text(text: &str) -> Result<Message> {
    Ok(serde_json::from_str(text)?)
}

pub fn encode_datagram(message: &Message) -> Result<Vec<u8>> {
    let encoded = bincode::serialize(message)?;
    if encoded.len() > MAX_DATAGRAM_SIZE {
        anyhow::bail!(
            "Message too large for one datagram: {} bytes (max {})",
            encoded.len(),
            MAX_DATAGRAM_SIZE
        );
    }
    Ok(encoded)
}

pub fn decode_datagram(bytes: &[u8]) -> Result<Message> {
    Ok(bincode::deserialize(bytes)?)
}
