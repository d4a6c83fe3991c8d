//! Protocol types for the wiremic ZMQ message bus
//!
//! Shared between wiremicd (the capture daemon) and producer processes that
//! push PCM chunks into it. All messages travel in an envelope with header,
//! parent_header, metadata, and content, serialized as MessagePack on the
//! wire (JSON is available for debugging).
//!
//! The bus has three sockets:
//!
//! - **Ingest** (PUSH/PULL): best-effort PCM chunk datagrams, no replies
//! - **Control** (DEALER/ROUTER): status queries and shutdown
//! - **Heartbeat** (REQ/REP): liveness detection

pub mod endpoints;
pub mod envelope;
pub mod messages;
pub mod wire;

pub use endpoints::MicEndpoints;
pub use envelope::{msg_type, Message, MessageHeader};
pub use messages::{CardStatus, ControlReply, ControlRequest, IngestRequest, PcmChunk};

use std::time::Duration;

/// Protocol version carried in every message header.
pub const PROTOCOL_VERSION: &str = "1";

/// ASCII family identifier the bus endpoints are named after.
pub const FAMILY_NAME: &str = "WIREMIC_PCM";

/// Payload size of one reference chunk: 100ms of s16le mono at 16kHz.
pub const PCM_CHUNK_DATA_LEN: usize = 3200;

/// Cadence the reference producer paces chunks at.
pub const PCM_CHUNK_INTERVAL: Duration = Duration::from_millis(100);

/// Default heartbeat interval
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);

/// Default heartbeat timeout (miss 3 beats = dead)
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);
