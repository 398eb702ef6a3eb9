mod server;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use spiderhub_core::{
    bootstrap::{init_services, load_config},
    logging,
};

use server::SpiderHubServer;

/// TVBox spider aggregation service
#[derive(Debug, Parser)]
#[command(name = "spiderhub", version, about)]
struct Cli {
    /// Path to a YAML/TOML config file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load and validate configuration
    let config = load_config(cli.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("spiderhub starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Wire services and restore persisted providers
    let services = init_services(&config).await?;

    // 4. Serve until a shutdown signal arrives
    SpiderHubServer::new(config, services).run().await
}
