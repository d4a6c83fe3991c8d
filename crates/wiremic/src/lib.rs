//! Wiremic - a virtual microphone daemon
//!
//! Presents one or more virtual capture cards whose buffers are filled on a
//! fixed 50ms timer. Each fill draws from PCM relayed over the ZMQ bus when
//! any is queued, and from a synthetic waveform otherwise, so the card always
//! produces data at the negotiated rate regardless of producer behavior.
//!
//! Modules:
//! - [`stream`]: per-card state machine (open/configure/trigger/pointer)
//! - [`tick`]: the timer engine and fractional position accounting
//! - [`buffer`]: the circular capture buffer
//! - [`waveform`]: the synthetic fallback generator
//! - [`ipc`]: ZMQ bus (PCM ingest, control, heartbeat)
//! - [`registry`], [`config`], [`daemon`]: resident plumbing

pub mod buffer;
pub mod config;
pub mod daemon;
pub mod ipc;
pub mod registry;
pub mod stream;
pub mod tick;
pub mod waveform;

pub use buffer::{CaptureBuffer, MAX_BUFFER, PERIOD_BYTES, PERIODS_MAX};
pub use config::MicConfig;
pub use daemon::MicDaemon;
pub use ipc::{IngestError, MicClient, MicServer};
pub use registry::{CardRegistry, RegistryError};
pub use stream::{
    Device, DeviceError, Direction, NegotiatedParams, PcmOps, Stream, StreamConfig, Trigger,
    SUPPORTED_RATES,
};
pub use tick::{TickEngine, TickState, TICK_PERIOD};
pub use waveform::Waveform;
