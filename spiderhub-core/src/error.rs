use thiserror::Error;

use crate::provider::{LoadError, ProviderError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Provider key already exists: {0}")]
    DuplicateKey(String),

    #[error("Provider not found: {0}")]
    NotFound(String),

    #[error("Invalid provider key '{0}': must be non-empty without '_', '/', '\\' or '.'")]
    InvalidKey(String),

    #[error("Failed to load provider: {0}")]
    Load(#[from] LoadError),

    #[error("Invalid identifier '{0}': expected '<provider>_<id>'")]
    BadIdentifier(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Provider '{key}' failed: {source}")]
    Provider {
        key: String,
        #[source]
        source: ProviderError,
    },

    #[error("Config import failed: {0}")]
    Import(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn provider(key: &str, source: ProviderError) -> Self {
        Self::Provider {
            key: key.to_string(),
            source,
        }
    }

    /// Whether the error was caused by the caller rather than the service
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateKey(_)
                | Self::NotFound(_)
                | Self::InvalidKey(_)
                | Self::BadIdentifier(_)
                | Self::UnsupportedOperation(_)
                | Self::MissingParameter(_)
        )
    }
}

/// A single provider's failure inside a fan-out call.
///
/// Never escalated: the aggregate call succeeds with the remaining results.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PartialProviderFailure {
    pub key: String,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, Error>;
