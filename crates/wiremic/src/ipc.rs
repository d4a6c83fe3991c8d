//! ZMQ message bus for the wiremic daemon.
//!
//! Three sockets:
//! - **ingest** (PULL): external producers push PCM chunks, fire-and-forget
//! - **control** (ROUTER): request/reply for status and shutdown
//! - **heartbeat** (REP): liveness echo

pub mod client;
pub mod server;

pub use client::MicClient;
pub use server::{IngestError, MicServer};

pub use micproto::MicEndpoints;
