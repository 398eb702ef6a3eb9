// Provider Traits
//
// Capability contract every provider implements, plus the runtime seam the
// loader launches providers through.

use super::ProviderError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Name a provider reports when it has no name of its own
pub const GENERIC_PROVIDER_NAME: &str = "Spider";

/// A named capability in the provider protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "init")]
    Init,
    #[serde(rename = "homeContent")]
    HomeContent,
    #[serde(rename = "homeVideoContent")]
    HomeVideoContent,
    #[serde(rename = "categoryContent")]
    CategoryContent,
    #[serde(rename = "detailContent")]
    DetailContent,
    #[serde(rename = "searchContent")]
    SearchContent,
    #[serde(rename = "playerContent")]
    PlayerContent,
    #[serde(rename = "getName")]
    GetName,
    #[serde(rename = "destroy")]
    Destroy,
    #[serde(rename = "localProxy")]
    LocalProxy,
}

impl Capability {
    /// Capabilities a provider must export to be registered
    pub const REQUIRED: [Capability; 7] = [
        Capability::Init,
        Capability::HomeContent,
        Capability::HomeVideoContent,
        Capability::CategoryContent,
        Capability::DetailContent,
        Capability::SearchContent,
        Capability::PlayerContent,
    ];

    /// Wire name of the capability
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::HomeContent => "homeContent",
            Self::HomeVideoContent => "homeVideoContent",
            Self::CategoryContent => "categoryContent",
            Self::DetailContent => "detailContent",
            Self::SearchContent => "searchContent",
            Self::PlayerContent => "playerContent",
            Self::GetName => "getName",
            Self::Destroy => "destroy",
            Self::LocalProxy => "localProxy",
        }
    }

    /// Parse a wire name; unknown names yield `None`
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        serde_json::from_value(Value::String(name.to_string())).ok()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw response of a provider's local proxy capability
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
}

/// Provider trait
///
/// Fixed capability set of a TVBox spider. Results are free-form JSON since
/// providers are independently authored; only the envelope keys the
/// dispatcher reads (`list`, `class`, `vod_id`) carry meaning here.
///
/// Implementations must be `Send + Sync`; whether concurrent calls are
/// serialized is up to the implementation (see `ProcessProvider`).
#[async_trait]
pub trait Provider: Send + Sync {
    // ========== Contract ==========

    /// Capabilities this provider exports
    fn exports(&self) -> Vec<Capability>;

    /// Initialize the provider with an opaque extension argument
    async fn init(&self, extend: &str) -> Result<(), ProviderError>;

    /// Self-reported display name, if the provider has one
    async fn get_name(&self) -> Result<Option<String>, ProviderError> {
        Ok(None)
    }

    // ========== Content ==========

    /// Home listing; `filter` asks for filter definitions alongside classes
    async fn home_content(&self, filter: bool) -> Result<Value, ProviderError>;

    /// Recommended videos for the home page
    async fn home_video_content(&self) -> Result<Value, ProviderError>;

    async fn category_content(
        &self,
        tid: &str,
        pg: &str,
        filter: bool,
        extend: &Value,
    ) -> Result<Value, ProviderError>;

    async fn detail_content(&self, ids: &[String]) -> Result<Value, ProviderError>;

    async fn search_content(&self, key: &str, quick: bool, pg: &str)
        -> Result<Value, ProviderError>;

    async fn player_content(
        &self,
        flag: &str,
        id: &str,
        vip_flags: &[String],
    ) -> Result<Value, ProviderError>;

    // ========== Optional ==========

    /// Serve bytes through the provider (images, keys, playlists)
    async fn local_proxy(&self, _params: &Value) -> Result<ProxyResponse, ProviderError> {
        Err(ProviderError::Unsupported(Capability::LocalProxy))
    }

    /// Teardown hook, called once when the provider is removed
    async fn destroy(&self) -> Result<(), ProviderError> {
        Ok(()) // Default: no-op
    }
}

/// Everything a runtime needs to launch one provider unit
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Registry key the provider is launched for
    pub key: String,
    /// Unique module namespace; never reused, even across reloads of a key
    pub namespace: String,
    /// Provider source file
    pub script: PathBuf,
}

/// Launches provider units in isolation
#[async_trait]
pub trait ProviderRuntime: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Arc<dyn Provider>, ProviderError>;
}
