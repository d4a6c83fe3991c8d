//! Message envelope shared by every socket on the bus.
//!
//! Every frame on the wire is a `Message<T>`: a header identifying the
//! sender session and message kind, an optional parent header linking a
//! reply to its request, a free-form metadata map, and the typed content.
//! The header's version field gates compatibility; `wire::deserialize`
//! rejects anything from a different protocol generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::PROTOCOL_VERSION;

/// Wire identifiers for the message kinds that travel the bus.
///
/// One per socket direction: producers push `INGEST_REQUEST` datagrams,
/// operators exchange `CONTROL_REQUEST`/`CONTROL_REPLY` pairs. The daemon
/// drops ingest traffic whose header does not carry the expected kind.
pub mod msg_type {
    pub const INGEST_REQUEST: &str = "ingest_request";
    pub const CONTROL_REQUEST: &str = "control_request";
    pub const CONTROL_REPLY: &str = "control_reply";
}

/// Message header - present on every message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Unique message ID for correlation
    pub msg_id: Uuid,
    /// Session ID (identifies the producer/client connection)
    pub session: Uuid,
    /// Message kind, one of the [`msg_type`] identifiers
    pub msg_type: String,
    /// Protocol version
    pub version: String,
    /// Timestamp when message was created
    pub timestamp: DateTime<Utc>,
}

impl MessageHeader {
    pub fn new(session: Uuid, msg_type: impl Into<String>) -> Self {
        Self {
            msg_id: Uuid::new_v4(),
            session,
            msg_type: msg_type.into(),
            version: PROTOCOL_VERSION.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Whether this header was produced by a compatible peer.
    pub fn is_supported_version(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

/// Generic message envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message<T> {
    pub header: MessageHeader,
    /// Header of the request this message answers, if it is a reply
    pub parent_header: Option<MessageHeader>,
    /// Arbitrary metadata
    pub metadata: HashMap<String, serde_json::Value>,
    /// The actual content
    pub content: T,
}

impl<T> Message<T> {
    pub fn new(session: Uuid, msg_type: impl Into<String>, content: T) -> Self {
        Self {
            header: MessageHeader::new(session, msg_type),
            parent_header: None,
            metadata: HashMap::new(),
            content,
        }
    }

    /// A reply inherits the parent's session and links back to it via
    /// `parent_header`, so clients can correlate out-of-order replies.
    pub fn reply(parent: &MessageHeader, msg_type: impl Into<String>, content: T) -> Self {
        Self {
            header: MessageHeader::new(parent.session, msg_type),
            parent_header: Some(parent.clone()),
            metadata: HashMap::new(),
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_links_parent() {
        let session = Uuid::new_v4();
        let req = Message::new(session, msg_type::CONTROL_REQUEST, ());
        let rep = Message::reply(&req.header, msg_type::CONTROL_REPLY, ());

        assert_eq!(rep.header.session, session);
        assert_eq!(rep.parent_header.as_ref().unwrap().msg_id, req.header.msg_id);
        assert_ne!(rep.header.msg_id, req.header.msg_id);
    }

    #[test]
    fn test_header_carries_protocol_version() {
        let header = MessageHeader::new(Uuid::new_v4(), msg_type::INGEST_REQUEST);
        assert_eq!(header.version, PROTOCOL_VERSION);
        assert!(header.is_supported_version());
    }

    #[test]
    fn test_foreign_version_is_unsupported() {
        let mut header = MessageHeader::new(Uuid::new_v4(), msg_type::INGEST_REQUEST);
        header.version = "0".to_string();
        assert!(!header.is_supported_version());
    }
}
