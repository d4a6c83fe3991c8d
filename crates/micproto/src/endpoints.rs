//! Endpoint configuration for the 3-socket wiremic bus.

use crate::FAMILY_NAME;

/// Endpoint configuration for connecting to (or binding) a wiremic daemon.
///
/// Used by both producers (connect) and the daemon (bind):
/// - ingest: PCM chunk datagrams (PUSH/PULL, no replies)
/// - control: status and shutdown (DEALER/ROUTER)
/// - heartbeat: liveness detection (REQ/REP)
#[derive(Debug, Clone)]
pub struct MicEndpoints {
    /// Ingest channel (PUSH/PULL) - PCM chunk datagrams
    pub ingest: String,
    /// Control channel (DEALER/ROUTER) - status, shutdown
    pub control: String,
    /// Heartbeat channel (REQ/REP) - liveness detection
    pub heartbeat: String,
}

impl MicEndpoints {
    /// IPC endpoints in a specific directory.
    ///
    /// Socket names carry the family identifier so a producer can find the
    /// channel knowing only the well-known name.
    pub fn from_socket_dir(dir: &str) -> Self {
        let family = FAMILY_NAME.to_lowercase();
        Self {
            ingest: format!("ipc://{}/{}-ingest", dir, family),
            control: format!("ipc://{}/{}-control", dir, family),
            heartbeat: format!("ipc://{}/{}-hb", dir, family),
        }
    }

    /// TCP endpoints for a remote daemon.
    ///
    /// Ports are allocated sequentially from `base_port`:
    /// - ingest: base_port
    /// - control: base_port + 1
    /// - heartbeat: base_port + 2
    pub fn tcp(host: &str, base_port: u16) -> Self {
        Self {
            ingest: format!("tcp://{}:{}", host, base_port),
            control: format!("tcp://{}:{}", host, base_port + 1),
            heartbeat: format!("tcp://{}:{}", host, base_port + 2),
        }
    }

    /// In-process endpoints for testing.
    pub fn inproc(prefix: &str) -> Self {
        Self {
            ingest: format!("inproc://{}-ingest", prefix),
            control: format!("inproc://{}-control", prefix),
            heartbeat: format!("inproc://{}-hb", prefix),
        }
    }
}

impl Default for MicEndpoints {
    /// Default to IPC in /tmp (for development/testing).
    fn default() -> Self {
        Self::from_socket_dir("/tmp")
    }
}
