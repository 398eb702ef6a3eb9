//! Service initialization and dependency injection

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::dispatch::Dispatcher;
use crate::importer::ConfigImporter;
use crate::provider::{Loader, ProcessRuntime, ProviderRegistry, ProviderRuntime, SideTableStore};
use crate::Config;

/// Container for all initialized services
#[derive(Clone)]
pub struct Services {
    pub registry: Arc<ProviderRegistry>,
    pub dispatcher: Dispatcher,
    pub importer: Arc<ConfigImporter>,
}

impl Services {
    /// Wire services around an arbitrary provider runtime
    pub fn with_runtime(config: &Config, runtime: Arc<dyn ProviderRuntime>) -> Result<Self> {
        let loader = Loader::new(runtime, &config.providers).context("Failed to build loader")?;
        let store = SideTableStore::new(&config.providers.data_dir);
        let registry = Arc::new(ProviderRegistry::new(loader, store));
        let importer = ConfigImporter::new(config.providers.fetch_timeout())
            .context("Failed to build config importer")?;

        Ok(Self {
            dispatcher: Dispatcher::new(registry.clone()),
            registry,
            importer: Arc::new(importer),
        })
    }
}

/// Initialize all core services and restore persisted providers
pub async fn init_services(config: &Config) -> Result<Services> {
    let providers = &config.providers;
    for dir in [&providers.dir, &providers.data_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let runtime = Arc::new(ProcessRuntime::from_config(providers));
    let services = Services::with_runtime(config, runtime)?;

    let report = services.registry.restore(providers).await;
    if !report.failed.is_empty() {
        warn!(
            "{} providers failed to restore: {}",
            report.failed.len(),
            report
                .failed
                .iter()
                .map(|(key, _)| key.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    info!(
        "Provider registry ready with {} providers from {}",
        services.registry.len(),
        providers.dir.display()
    );

    Ok(services)
}
