//! Reference PCM producer
//!
//! Reads a raw PCM file (s16le mono 16kHz) and pushes it to a running
//! wiremicd in 3200-byte chunks, one every 100ms, with a monotonically
//! increasing sequence number. Delivery is best-effort: the daemon drops
//! what it cannot queue.
//!
//! Usage: wiremic-push <file.raw> [card]

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use micproto::{PcmChunk, PCM_CHUNK_DATA_LEN, PCM_CHUNK_INTERVAL};
use wiremic::config::MicConfig;
use wiremic::ipc::MicClient;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut args = std::env::args().skip(1);
    let path = match args.next() {
        Some(p) => p,
        None => bail!("usage: wiremic-push <file.raw> [card]"),
    };
    let card: u32 = args.next().map(|c| c.parse()).transpose()?.unwrap_or(0);

    let pcm = std::fs::read(&path).with_context(|| format!("failed to read {}", path))?;
    if pcm.is_empty() {
        bail!("{} is empty", path);
    }

    let config = MicConfig::load()?;
    let endpoints = config.endpoints();
    let mut client = MicClient::connect(&endpoints).await?;

    if !client.ping(std::time::Duration::from_secs(2)).await? {
        bail!("no heartbeat from wiremicd at {}", endpoints.heartbeat);
    }

    info!(
        bytes = pcm.len(),
        card,
        chunks = pcm.len().div_ceil(PCM_CHUNK_DATA_LEN),
        "streaming {}",
        path
    );

    let mut interval = tokio::time::interval(PCM_CHUNK_INTERVAL);
    let mut sequence: u32 = 0;

    for data in pcm.chunks(PCM_CHUNK_DATA_LEN) {
        interval.tick().await;
        sequence = sequence.wrapping_add(1);
        client
            .push_chunk(PcmChunk {
                card,
                sequence,
                data: data.to_vec(),
            })
            .await?;
    }

    info!(chunks = sequence, "done");
    Ok(())
}
