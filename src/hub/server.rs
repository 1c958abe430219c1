//! Hub server

use crate::common::{HubConfig, Result};
use crate::hub::http::{create_router, AppState};
use crate::hub::{reconcile, Hub};
use std::sync::Arc;
use std::time::Duration;

pub struct HubServer {
    config: HubConfig,
}

impl HubServer {
    pub fn new(config: HubConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting hub");
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Sync interval: {}ms", self.config.sync_interval_ms);
        tracing::info!("  Event buffer: {}", self.config.event_buffer);

        let hub = Arc::new(Hub::new(&self.config));

        // Periodic reconciliation
        let _sync_handle = reconcile::spawn_interval(
            hub.clone(),
            Duration::from_millis(self.config.sync_interval_ms.max(1)),
        );

        let router = create_router(AppState { hub });
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!("✓ Hub ready");

        tokio::select! {
            res = axum::serve(listener, router) => {
                if let Err(e) = res {
                    tracing::error!("HTTP server error: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
            }
        }

        Ok(())
    }
}
