//! Provider loader
//!
//! Resolves a provider source, materializes remote sources into an owned
//! temporary file, launches the unit through a [`ProviderRuntime`], checks
//! its capability contract and initializes it. Loading is all-or-nothing:
//! on any failure the launched instance is torn down and the artifact is
//! deleted before the error is returned.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tempfile::{Builder as TempBuilder, TempPath};

use super::{
    Capability, LaunchSpec, LoadError, Provider, ProviderRuntime, ProviderSource,
    GENERIC_PROVIDER_NAME,
};
use crate::config::ProvidersConfig;

/// Namespaces are unique for the lifetime of the process
static NAMESPACE_GENERATION: AtomicU64 = AtomicU64::new(1);

/// A successfully loaded, initialized provider
pub struct LoadedProvider {
    pub instance: Arc<dyn Provider>,
    pub display_name: String,
    /// Owned copy of a remote source; deleted when dropped
    pub artifact: Option<TempPath>,
}

impl std::fmt::Debug for LoadedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedProvider")
            .field("display_name", &self.display_name)
            .field("artifact", &self.artifact)
            .finish_non_exhaustive()
    }
}

pub struct Loader {
    runtime: Arc<dyn ProviderRuntime>,
    http: reqwest::Client,
    artifact_dir: PathBuf,
    init_extend: String,
}

impl Loader {
    pub fn new(runtime: Arc<dyn ProviderRuntime>, config: &ProvidersConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .build()?;

        Ok(Self {
            runtime,
            http,
            artifact_dir: config.artifact_dir(),
            init_extend: config.init_extend.clone(),
        })
    }

    /// Load the provider behind `source` for registry key `key`
    pub async fn load(
        &self,
        key: &str,
        source: &ProviderSource,
        custom_name: Option<&str>,
    ) -> Result<LoadedProvider, LoadError> {
        let (script, artifact) = match source {
            ProviderSource::Local { path } => (path.clone(), None),
            ProviderSource::Remote { url } => {
                let bytes = self.fetch(url).await?;
                let artifact = self.materialize(key, url, &bytes)?;
                (artifact.to_path_buf(), Some(artifact))
            }
            ProviderSource::Embedded => return Err(LoadError::NotLoadable("embedded")),
        };

        let spec = LaunchSpec {
            key: key.to_string(),
            namespace: format!(
                "spider_{key}_{}",
                NAMESPACE_GENERATION.fetch_add(1, Ordering::Relaxed)
            ),
            script,
        };

        // From here on `artifact` is dropped (and deleted) on every error path
        let instance = self
            .runtime
            .launch(&spec)
            .await
            .map_err(LoadError::Launch)?;

        if let Err(e) = self.validate_and_init(&*instance).await {
            teardown(key, &*instance).await;
            return Err(e);
        }

        let display_name = match custom_name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self_reported_name(key, &*instance).await,
        };

        tracing::info!(
            provider = %key,
            namespace = %spec.namespace,
            "Loaded provider '{}' from {}",
            display_name,
            source.locator()
        );

        Ok(LoadedProvider {
            instance,
            display_name,
            artifact,
        })
    }

    async fn validate_and_init(&self, instance: &dyn Provider) -> Result<(), LoadError> {
        let exports = instance.exports();
        let missing: Vec<String> = Capability::REQUIRED
            .iter()
            .filter(|capability| !exports.contains(capability))
            .map(|capability| capability.as_str().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::InterfaceMissing { missing });
        }

        instance
            .init(&self.init_extend)
            .await
            .map_err(LoadError::Init)
    }

    async fn fetch(&self, url: &str) -> Result<bytes::Bytes, LoadError> {
        let fetch_error = |reason: String| LoadError::Fetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {status}")));
        }

        response.bytes().await.map_err(|e| fetch_error(e.to_string()))
    }

    /// Write fetched bytes to an owned temporary file keeping the URL's extension
    fn materialize(&self, key: &str, url: &str, bytes: &[u8]) -> Result<TempPath, LoadError> {
        std::fs::create_dir_all(&self.artifact_dir)?;

        let suffix = url_extension(url).map(|ext| format!(".{ext}")).unwrap_or_default();
        let mut file = TempBuilder::new()
            .prefix(&format!("spider_{key}_"))
            .suffix(&suffix)
            .tempfile_in(&self.artifact_dir)?;
        file.write_all(bytes)?;
        file.flush()?;

        let path = file.into_temp_path();
        make_executable(&path)?;
        Ok(path)
    }
}

/// Best-effort teardown of a provider that will not be registered
pub(crate) async fn teardown(key: &str, instance: &dyn Provider) {
    if let Err(e) = instance.destroy().await {
        tracing::warn!(provider = %key, "Provider teardown failed: {}", e);
    }
}

async fn self_reported_name(key: &str, instance: &dyn Provider) -> String {
    match instance.get_name().await {
        Ok(Some(name)) if !name.trim().is_empty() && name != GENERIC_PROVIDER_NAME => name,
        Ok(_) => key.to_string(),
        Err(e) => {
            tracing::debug!(provider = %key, "getName failed, using key as name: {}", e);
            key.to_string()
        }
    }
}

fn url_extension(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let file_name = parsed.path_segments()?.next_back()?.to_string();
    let (_, ext) = file_name.rsplit_once('.')?;
    (!ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric())).then(|| ext.to_string())
}

#[cfg(unix)]
fn make_executable(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}
