//! MicClient - the producer/operator side of the ZMQ bus
//!
//! Connects to a running wiremic daemon. PCM producers use `push_chunk`;
//! operators use the control and heartbeat channels.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;
use zeromq::{DealerSocket, PushSocket, ReqSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use micproto::{
    msg_type, wire, ControlReply, ControlRequest, IngestRequest, Message, MicEndpoints, PcmChunk,
};

/// Client side of the wiremic bus.
pub struct MicClient {
    session: Uuid,
    ingest: PushSocket,
    control: DealerSocket,
    heartbeat: ReqSocket,
}

impl MicClient {
    /// Connect to a running wiremic daemon.
    pub async fn connect(endpoints: &MicEndpoints) -> Result<Self> {
        let session = Uuid::new_v4();

        let mut ingest = PushSocket::new();
        ingest
            .connect(&endpoints.ingest)
            .await
            .with_context(|| format!("failed to connect ingest socket to {}", endpoints.ingest))?;

        let mut control = DealerSocket::new();
        control.connect(&endpoints.control).await.with_context(|| {
            format!("failed to connect control socket to {}", endpoints.control)
        })?;

        let mut heartbeat = ReqSocket::new();
        heartbeat
            .connect(&endpoints.heartbeat)
            .await
            .with_context(|| {
                format!(
                    "failed to connect heartbeat socket to {}",
                    endpoints.heartbeat
                )
            })?;

        Ok(Self {
            session,
            ingest,
            control,
            heartbeat,
        })
    }

    /// Get the session ID.
    pub fn session(&self) -> Uuid {
        self.session
    }

    /// Push one PCM chunk. Fire-and-forget: no reply, no delivery guarantee.
    pub async fn push_chunk(&mut self, chunk: PcmChunk) -> Result<()> {
        let msg = Message::new(
            self.session,
            msg_type::INGEST_REQUEST,
            IngestRequest::PcmChunk(chunk),
        );
        let bytes = wire::serialize(&msg)?;
        self.ingest.send(ZmqMessage::from(bytes)).await?;
        Ok(())
    }

    /// Send a control request and wait for the reply.
    pub async fn control(&mut self, req: ControlRequest) -> Result<ControlReply> {
        let msg = Message::new(self.session, msg_type::CONTROL_REQUEST, req);
        let bytes = wire::serialize(&msg)?;

        self.control.send(ZmqMessage::from(bytes)).await?;

        let response = self.control.recv().await?;
        let data = response
            .into_vec()
            .pop()
            .context("empty control response")?;

        let reply_msg: Message<ControlReply> =
            wire::deserialize_expecting(&data, msg_type::CONTROL_REPLY)?;
        Ok(reply_msg.content)
    }

    /// Request the per-card status snapshot.
    pub async fn status(&mut self) -> Result<ControlReply> {
        self.control(ControlRequest::Status).await
    }

    /// Ask the daemon to shut down.
    pub async fn shutdown(&mut self) -> Result<ControlReply> {
        self.control(ControlRequest::Shutdown).await
    }

    /// Check if the daemon is alive with ping/pong.
    pub async fn ping(&mut self, timeout: Duration) -> Result<bool> {
        let ping_data = b"ping".to_vec();

        self.heartbeat
            .send(ZmqMessage::from(ping_data))
            .await?;

        let result = tokio::time::timeout(timeout, self.heartbeat.recv()).await;

        match result {
            Ok(Ok(response)) => {
                let data = response.into_vec().pop();
                debug!("heartbeat response: {:?}", data);
                Ok(true)
            }
            Ok(Err(e)) => {
                warn!("heartbeat error: {}", e);
                Ok(false)
            }
            Err(_) => {
                warn!("heartbeat timeout");
                Ok(false)
            }
        }
    }
}
