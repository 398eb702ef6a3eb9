// Provider Error Types

use std::time::Duration;

use super::Capability;

/// Errors raised by a provider capability call
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Failed to spawn provider process: {0}")]
    Spawn(std::io::Error),

    #[error("Provider call '{method}' timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    #[error("Provider process closed its output")]
    Closed,

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Provider reported an error: {0}")]
    Remote(String),

    #[error("Capability not exported: {0}")]
    Unsupported(Capability),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while loading a provider; every variant leaves no
/// registry entry and no materialized artifact behind.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to fetch provider source from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Provider does not export required capabilities: {}", .missing.join(", "))]
    InterfaceMissing { missing: Vec<String> },

    #[error("Provider init failed: {0}")]
    Init(ProviderError),

    #[error("Failed to launch provider: {0}")]
    Launch(ProviderError),

    #[error("Failed to materialize provider source: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source kind '{0}' cannot be loaded")]
    NotLoadable(&'static str),
}

pub type Result<T> = std::result::Result<T, ProviderError>;
