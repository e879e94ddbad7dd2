//! Blob column codec
//!
//! Timer trees, histograms, profiles, and thread stats travel through blob
//! columns as protobuf. Repeated messages (root timer lists) are stored as a
//! length-delimited sequence; single messages (histogram, profile) as plain
//! encoded bytes. A NULL blob decodes as an empty sequence, matching level-0
//! writes that skip empty timer lists.

use prost::Message;

use super::error::StoreError;

/// Encode a sequence of messages as length-delimited frames
pub fn encode_messages<M: Message>(messages: &[M]) -> Vec<u8> {
    let mut buf = Vec::new();
    for message in messages {
        message
            .encode_length_delimited(&mut buf)
            .expect("Vec<u8> buffer cannot run out of capacity");
    }
    buf
}

/// Decode a length-delimited sequence; `None` means an absent blob column
pub fn decode_messages<M: Message + Default>(bytes: Option<&[u8]>) -> Result<Vec<M>, StoreError> {
    let mut remaining = match bytes {
        Some(bytes) => bytes,
        None => return Ok(Vec::new()),
    };
    let mut messages = Vec::new();
    while !remaining.is_empty() {
        let message = M::decode_length_delimited(&mut remaining)?;
        messages.push(message);
    }
    Ok(messages)
}

/// Encode a single message as plain bytes
pub fn encode_message<M: Message>(message: &M) -> Vec<u8> {
    message.encode_to_vec()
}

/// Decode a single message from plain bytes
pub fn decode_message<M: Message + Default>(bytes: &[u8]) -> Result<M, StoreError> {
    Ok(M::decode(bytes)?)
}
