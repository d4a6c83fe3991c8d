//! Request and reply content types for the wiremic bus.

use serde::{Deserialize, Serialize};

/// One chunk of raw PCM pushed by a producer.
///
/// The reference producer reads a file and emits one 3200-byte chunk
/// (100ms of s16le mono at 16kHz) every 100ms, with a monotonically
/// increasing sequence number. Delivery is best-effort: no acknowledgement,
/// no flow control, gaps are logged by the daemon and otherwise ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmChunk {
    /// Card index the chunk is addressed to
    pub card: u32,
    /// Monotonically increasing sequence counter
    pub sequence: u32,
    /// Raw PCM payload
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// Requests on the ingest socket (PUSH/PULL, fire-and-forget).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestRequest {
    PcmChunk(PcmChunk),
}

/// Requests on the control socket (DEALER/ROUTER, request/reply).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlRequest {
    /// Snapshot of per-card state
    Status,
    /// Quiesce the bus and tear down the daemon
    Shutdown,
}

/// Replies on the control socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlReply {
    Status { cards: Vec<CardStatus> },
    ShuttingDown,
    Error { error: String },
}

/// Per-card state snapshot returned by `ControlRequest::Status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardStatus {
    pub index: u32,
    pub running: bool,
    pub valid: bool,
    /// Current write cursor in bytes
    pub cursor_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_json_payload_is_bytes() {
        let chunk = PcmChunk {
            card: 0,
            sequence: 7,
            data: vec![1, 2, 3],
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["sequence"], 7);
        assert_eq!(json["data"], serde_json::json!([1, 2, 3]));
    }
}
