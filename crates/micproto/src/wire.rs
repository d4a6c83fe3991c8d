//! Wire codec for bus messages
//!
//! MessagePack in production, JSON for debugging. The top-level helpers
//! enforce the bus rules on the way in: a message from a different protocol
//! generation is rejected, and `deserialize_expecting` additionally pins the
//! message kind so a frame pushed at the wrong socket cannot be mistaken for
//! valid traffic.

use anyhow::{ensure, Context, Result};
use serde::{de::DeserializeOwned, Serialize};

use crate::{Message, PROTOCOL_VERSION};

/// A serialization format the bus can speak.
pub trait WireFormat {
    fn encode<T: Serialize>(msg: &Message<T>) -> Result<Vec<u8>>;
    fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<Message<T>>;
}

/// MessagePack format - fast and compact for production
pub struct MsgPackFormat;

impl WireFormat for MsgPackFormat {
    fn encode<T: Serialize>(msg: &Message<T>) -> Result<Vec<u8>> {
        rmp_serde::to_vec(msg).context("failed to serialize message to MessagePack")
    }

    fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<Message<T>> {
        rmp_serde::from_slice(data).context("failed to deserialize MessagePack message")
    }
}

/// JSON format - readable for debugging
pub struct JsonFormat;

impl WireFormat for JsonFormat {
    fn encode<T: Serialize>(msg: &Message<T>) -> Result<Vec<u8>> {
        serde_json::to_vec(msg).context("failed to serialize message to JSON")
    }

    fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<Message<T>> {
        serde_json::from_slice(data).context("failed to deserialize JSON message")
    }
}

/// Encode a message in the default format (MessagePack).
pub fn serialize<T: Serialize>(msg: &Message<T>) -> Result<Vec<u8>> {
    MsgPackFormat::encode(msg)
}

/// Decode a message in the default format, rejecting frames from an
/// incompatible protocol generation.
pub fn deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<Message<T>> {
    let msg: Message<T> = MsgPackFormat::decode(data)?;
    ensure!(
        msg.header.is_supported_version(),
        "unsupported protocol version {:?} (this build speaks {:?})",
        msg.header.version,
        PROTOCOL_VERSION,
    );
    Ok(msg)
}

/// Decode a message and require a specific kind in the header. Used by
/// socket handlers so misaddressed traffic fails before it is acted on.
pub fn deserialize_expecting<T: DeserializeOwned>(
    data: &[u8],
    msg_type: &str,
) -> Result<Message<T>> {
    let msg = deserialize(data)?;
    ensure!(
        msg.header.msg_type == msg_type,
        "unexpected message kind {:?} (expected {:?})",
        msg.header.msg_type,
        msg_type,
    );
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::msg_type;
    use crate::{ControlRequest, IngestRequest, PcmChunk};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn chunk_message(data: Vec<u8>) -> Message<IngestRequest> {
        Message::new(
            Uuid::new_v4(),
            msg_type::INGEST_REQUEST,
            IngestRequest::PcmChunk(PcmChunk {
                card: 0,
                sequence: 42,
                data,
            }),
        )
    }

    #[test]
    fn test_msgpack_roundtrip() {
        let msg = chunk_message(vec![0x20, 0x7f, 0x16]);
        let session = msg.header.session;

        let bytes = serialize(&msg).unwrap();
        let decoded: Message<IngestRequest> = deserialize(&bytes).unwrap();

        assert_eq!(decoded.header.session, session);
        let IngestRequest::PcmChunk(chunk) = decoded.content;
        assert_eq!(chunk.sequence, 42);
        assert_eq!(chunk.data, vec![0x20, 0x7f, 0x16]);
    }

    #[test]
    fn test_json_roundtrip() {
        let session = Uuid::new_v4();
        let msg = Message::new(session, msg_type::CONTROL_REQUEST, ControlRequest::Status);

        let bytes = JsonFormat::encode(&msg).unwrap();
        let decoded: Message<ControlRequest> = JsonFormat::decode(&bytes).unwrap();

        assert_eq!(decoded.header.session, session);
        assert!(matches!(decoded.content, ControlRequest::Status));
    }

    #[test]
    fn test_msgpack_is_compact() {
        let msg = chunk_message(vec![0u8; 64]);

        let msgpack_bytes = MsgPackFormat::encode(&msg).unwrap();
        let json_bytes = JsonFormat::encode(&msg).unwrap();

        assert!(msgpack_bytes.len() < json_bytes.len());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = deserialize::<IngestRequest>(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(err.to_string().contains("MessagePack"));
    }

    #[test]
    fn test_foreign_protocol_version_rejected() {
        let mut msg = chunk_message(vec![1, 2, 3]);
        msg.header.version = "0".to_string();
        let bytes = MsgPackFormat::encode(&msg).unwrap();

        let err = deserialize::<IngestRequest>(&bytes).unwrap_err();
        assert!(err.to_string().contains("unsupported protocol version"));
    }

    #[test]
    fn test_wrong_message_kind_rejected() {
        let msg = chunk_message(vec![1, 2, 3]);
        let bytes = serialize(&msg).unwrap();

        // same bytes, but the handler expects control traffic
        let err = deserialize_expecting::<IngestRequest>(&bytes, msg_type::CONTROL_REQUEST)
            .unwrap_err();
        assert!(err.to_string().contains("unexpected message kind"));

        assert!(deserialize_expecting::<IngestRequest>(&bytes, msg_type::INGEST_REQUEST).is_ok());
    }
}
