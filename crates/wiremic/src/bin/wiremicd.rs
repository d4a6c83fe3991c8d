//! Wiremic daemon binary
//!
//! Virtual microphone daemon: registers the configured capture cards, binds
//! the ZMQ bus, and serves until shutdown.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use wiremic::config::MicConfig;
use wiremic::daemon::MicDaemon;

#[tokio::main]
async fn main() -> Result<()> {
    let config = MicConfig::load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.telemetry.log_level.clone()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("wiremic {} starting", env!("CARGO_PKG_VERSION"));
    info!(cards = ?config.cards.enabled, "enabled cards");

    let daemon = MicDaemon::new(&config)?;
    daemon.run().await?;

    Ok(())
}
