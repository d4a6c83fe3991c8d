//! MicServer - the daemon side of the ZMQ bus
//!
//! Binds the three sockets and dispatches incoming traffic to the card
//! registry. Binding the bus is the first thing the daemon does; a bind
//! failure is fatal at startup.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use zeromq::{PullSocket, RepSocket, RouterSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use micproto::{
    msg_type, wire, ControlReply, ControlRequest, IngestRequest, Message, MicEndpoints, PcmChunk,
};

use crate::registry::CardRegistry;

/// Why an ingest message was dropped. The ingest socket is one-directional,
/// so these are logged rather than answered.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed ingest message: {0}")]
    Malformed(String),

    #[error("chunk addressed to unknown card {0}")]
    UnknownCard(u32),

    #[error("card queue full")]
    QueueFull,
}

/// Server side of the wiremic bus.
pub struct MicServer {
    ingest: PullSocket,
    control: RouterSocket,
    heartbeat: RepSocket,
    shutdown_tx: broadcast::Sender<()>,
}

impl MicServer {
    /// Bind to all endpoints and create the server.
    pub async fn bind(endpoints: &MicEndpoints) -> Result<Self> {
        let mut ingest = PullSocket::new();
        ingest
            .bind(&endpoints.ingest)
            .await
            .with_context(|| format!("failed to bind ingest socket to {}", endpoints.ingest))?;
        info!("ingest socket bound to {}", endpoints.ingest);

        let mut control = RouterSocket::new();
        control
            .bind(&endpoints.control)
            .await
            .with_context(|| format!("failed to bind control socket to {}", endpoints.control))?;
        info!("control socket bound to {}", endpoints.control);

        let mut heartbeat = RepSocket::new();
        heartbeat
            .bind(&endpoints.heartbeat)
            .await
            .with_context(|| {
                format!("failed to bind heartbeat socket to {}", endpoints.heartbeat)
            })?;
        info!("heartbeat socket bound to {}", endpoints.heartbeat);

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            ingest,
            control,
            heartbeat,
            shutdown_tx,
        })
    }

    /// Get a shutdown signal receiver.
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Get a handle that can trigger shutdown from another task.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Trigger shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run the server event loop against the given registry.
    pub async fn run(mut self, registry: Arc<CardRegistry>) -> Result<()> {
        info!("wiremic bus ready");
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                // PCM ingest (fire-and-forget; malformed traffic is logged
                // and dropped, never answered)
                result = self.ingest.recv() => {
                    match result {
                        Ok(msg) => handle_ingest(msg, &registry),
                        Err(e) => {
                            warn!("ingest socket error: {}", e);
                        }
                    }
                }

                // Control channel
                result = self.control.recv() => {
                    match result {
                        Ok(msg) => {
                            if let Err(e) = self.handle_control_message(msg, &registry).await {
                                error!("error handling control message: {}", e);
                            }
                        }
                        Err(e) => {
                            warn!("control socket error: {}", e);
                        }
                    }
                }

                // Heartbeat channel
                result = self.heartbeat.recv() => {
                    match result {
                        Ok(msg) => {
                            debug!("heartbeat received");
                            if let Err(e) = self.heartbeat.send(msg).await {
                                warn!("heartbeat reply failed: {}", e);
                            }
                        }
                        Err(e) => {
                            warn!("heartbeat socket error: {}", e);
                        }
                    }
                }

                // Shutdown signal
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        info!("wiremic bus shutting down");
        Ok(())
    }

    async fn handle_control_message(
        &mut self,
        zmq_msg: ZmqMessage,
        registry: &Arc<CardRegistry>,
    ) -> Result<()> {
        let frames: Vec<_> = zmq_msg.into_vec();
        if frames.len() < 2 {
            return Ok(());
        }

        let identity = frames[0].clone();
        let data = &frames[frames.len() - 1];

        let msg: Message<ControlRequest> =
            wire::deserialize_expecting(data, msg_type::CONTROL_REQUEST)?;
        debug!("control request: {:?}", msg.content);

        let should_shutdown = matches!(msg.content, ControlRequest::Shutdown);
        let reply = match msg.content {
            ControlRequest::Status => ControlReply::Status {
                cards: registry.statuses(),
            },
            ControlRequest::Shutdown => ControlReply::ShuttingDown,
        };

        let reply_msg = Message::reply(&msg.header, msg_type::CONTROL_REPLY, reply);
        let reply_bytes = wire::serialize(&reply_msg)?;

        let mut response = ZmqMessage::from(identity);
        response.push_back(reply_bytes.into());
        self.control.send(response).await?;

        if should_shutdown {
            let _ = self.shutdown_tx.send(());
        }

        Ok(())
    }
}

/// Dispatch one frame from the ingest socket.
///
/// Malformed or unroutable chunks are dropped with a warning; the socket is
/// one-directional so there is nothing to answer. Delivery into the card is
/// non-blocking: a full queue also drops.
fn handle_ingest(zmq_msg: ZmqMessage, registry: &Arc<CardRegistry>) {
    if let Err(e) = route_ingest(zmq_msg, registry) {
        warn!("ingest: dropping message: {}", e);
    }
}

fn route_ingest(zmq_msg: ZmqMessage, registry: &Arc<CardRegistry>) -> Result<(), IngestError> {
    let data = zmq_msg
        .into_vec()
        .pop()
        .ok_or_else(|| IngestError::Malformed("empty message".to_string()))?;

    let msg: Message<IngestRequest> =
        wire::deserialize_expecting(&data, msg_type::INGEST_REQUEST)
            .map_err(|e| IngestError::Malformed(e.to_string()))?;

    let IngestRequest::PcmChunk(chunk) = msg.content;
    deliver_chunk(chunk, registry)
}

fn deliver_chunk(chunk: PcmChunk, registry: &Arc<CardRegistry>) -> Result<(), IngestError> {
    if chunk.data.is_empty() {
        return Err(IngestError::Malformed(format!(
            "empty pcm payload (card {}, seq {})",
            chunk.card, chunk.sequence
        )));
    }

    let device = registry
        .get(chunk.card)
        .ok_or(IngestError::UnknownCard(chunk.card))?;

    debug!(
        card = chunk.card,
        seq = chunk.sequence,
        bytes = chunk.data.len(),
        "pcm chunk received"
    );

    device
        .push_chunk(chunk)
        .map_err(|_| IngestError::QueueFull)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_dropped_before_routing() {
        let registry = Arc::new(CardRegistry::from_indices(&[0]).unwrap());
        let err = deliver_chunk(
            PcmChunk {
                card: 0,
                sequence: 1,
                data: vec![],
            },
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::Malformed(_)));

        // nothing queued: the device's state is untouched
        let status = &registry.statuses()[0];
        assert!(!status.valid);
        assert_eq!(status.cursor_bytes, 0);
    }

    #[test]
    fn test_misaddressed_message_kind_dropped() {
        let registry = Arc::new(CardRegistry::from_indices(&[0]).unwrap());

        // a control-tagged envelope pushed at the ingest socket is malformed
        let msg = Message::new(
            uuid::Uuid::new_v4(),
            msg_type::CONTROL_REQUEST,
            IngestRequest::PcmChunk(PcmChunk {
                card: 0,
                sequence: 1,
                data: vec![1, 2, 3],
            }),
        );
        let bytes = wire::serialize(&msg).unwrap();

        let err = route_ingest(ZmqMessage::from(bytes), &registry).unwrap_err();
        assert!(matches!(err, IngestError::Malformed(_)));
        assert!(!registry.statuses()[0].valid);
    }

    #[test]
    fn test_unknown_card_dropped() {
        let registry = Arc::new(CardRegistry::from_indices(&[0]).unwrap());
        let err = deliver_chunk(
            PcmChunk {
                card: 9,
                sequence: 1,
                data: vec![1, 2, 3],
            },
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::UnknownCard(9)));
        // no card created as a side effect
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_queue_overflow_reported_not_fatal() {
        let registry = Arc::new(CardRegistry::from_indices(&[0]).unwrap());
        // the per-card queue is bounded; well past its depth the drops
        // surface as QueueFull, never a panic
        let mut full = 0;
        for seq in 0..100 {
            let result = deliver_chunk(
                PcmChunk {
                    card: 0,
                    sequence: seq,
                    data: vec![0u8; 16],
                },
                &registry,
            );
            if matches!(result, Err(IngestError::QueueFull)) {
                full += 1;
            }
        }
        assert!(full > 0);
    }
}
