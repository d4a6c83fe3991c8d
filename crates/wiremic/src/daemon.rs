//! MicDaemon - resident lifecycle
//!
//! Startup order matters: the bus binds before anything is served, and a
//! bind failure aborts startup. Teardown runs in reverse: quiesce the bus,
//! then drop the card registry.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::config::MicConfig;
use crate::ipc::MicServer;
use crate::registry::CardRegistry;

use micproto::MicEndpoints;

pub struct MicDaemon {
    registry: Arc<CardRegistry>,
    endpoints: MicEndpoints,
}

impl MicDaemon {
    /// Build the daemon from config. Zero enabled cards is a startup error.
    pub fn new(config: &MicConfig) -> Result<Self> {
        let registry = CardRegistry::from_indices(&config.cards.enabled)
            .context("card registration failed")?;
        info!(cards = registry.len(), "card registry initialized");

        Ok(Self {
            registry: Arc::new(registry),
            endpoints: config.endpoints(),
        })
    }

    pub fn registry(&self) -> &Arc<CardRegistry> {
        &self.registry
    }

    /// Run until a shutdown request or ctrl-c.
    pub async fn run(self) -> Result<()> {
        // Bus registration comes first; without it the daemon must not start.
        let server = MicServer::bind(&self.endpoints)
            .await
            .context("message bus registration failed")?;

        let shutdown = server.shutdown_handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for ctrl-c: {}", e);
                return;
            }
            info!("ctrl-c received");
            let _ = shutdown.send(());
        });

        server.run(Arc::clone(&self.registry)).await?;

        // Bus is quiesced; the registry (and every device) drops after it.
        info!("wiremic daemon shutdown complete");
        Ok(())
    }
}
