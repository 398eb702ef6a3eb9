//! HTTP server lifecycle

use anyhow::{Context, Result};
use tracing::{error, info};

use spiderhub_api::{create_router, AppState};
use spiderhub_core::{bootstrap::Services, Config};

pub struct SpiderHubServer {
    config: Config,
    services: Services,
}

impl SpiderHubServer {
    pub fn new(config: Config, services: Services) -> Self {
        Self { config, services }
    }

    /// Serve HTTP until Ctrl+C/SIGTERM, then tear down every provider
    pub async fn run(self) -> Result<()> {
        let address = self.config.http_address();
        let state = AppState::new(self.services.clone(), self.config.providers.clone());
        let router = create_router(state, &self.config.server.base_path);

        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind {address}"))?;
        info!(
            "HTTP server listening on {} (API under {})",
            address, self.config.server.base_path
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;
        info!("HTTP server shut down gracefully");

        self.shutdown().await;
        Ok(())
    }

    /// Stop every provider process and release remote artifacts
    async fn shutdown(&self) {
        info!(
            "Stopping {} providers...",
            self.services.registry.len()
        );
        self.services.registry.clear().await;
        info!("spiderhub stopped");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal");
            }
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
