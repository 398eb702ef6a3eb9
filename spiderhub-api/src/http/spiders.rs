//! Provider management routes

use std::collections::HashSet;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path as UrlPath, Query, State},
    Json,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use spiderhub_core::provider::{validate_key, ProviderEntry, ProviderSource, SourceKind};

use crate::http::{AppError, AppResult, AppState, Envelope};

/// Row of the provider listing
#[derive(Debug, Serialize, Deserialize)]
pub struct SpiderSummary {
    pub key: String,
    pub name: String,
    pub enabled: bool,
    #[serde(rename = "type")]
    pub kind: SourceKind,
}

impl From<ProviderEntry> for SpiderSummary {
    fn from(entry: ProviderEntry) -> Self {
        Self {
            kind: entry.kind(),
            key: entry.key,
            name: entry.name,
            enabled: entry.enabled,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddPythonSpiderRequest {
    pub key: String,
    pub script_url: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub key: String,
    pub filename: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSpiderRequest {
    #[serde(default)]
    pub new_key: Option<String>,
    #[serde(default)]
    pub new_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyResponse {
    pub key: String,
}

pub async fn list_spiders(State(state): State<AppState>) -> Envelope<Vec<SpiderSummary>> {
    Envelope::success(
        state
            .registry
            .list()
            .into_iter()
            .map(SpiderSummary::from)
            .collect(),
    )
}

pub async fn add_python_spider(
    State(state): State<AppState>,
    Json(request): Json<AddPythonSpiderRequest>,
) -> AppResult<Envelope<SpiderSummary>> {
    let source = ProviderSource::Remote {
        url: request.script_url,
    };
    let entry = state
        .registry
        .add(&request.key, source, request.name.as_deref())
        .await?;
    Ok(Envelope::success(entry.into()))
}

/// Keys with an upload in flight.
///
/// An upload owns its key from the duplicate check until the provider is
/// registered (or the upload fails), so two uploads never share a file.
#[derive(Debug, Clone, Default)]
pub struct UploadSlots {
    keys: Arc<Mutex<HashSet<String>>>,
}

impl UploadSlots {
    /// Claim `key`; `None` if another upload already holds it
    pub fn claim(&self, key: &str) -> Option<UploadSlot> {
        if !self.keys.lock().insert(key.to_string()) {
            return None;
        }
        Some(UploadSlot {
            keys: self.keys.clone(),
            key: key.to_string(),
        })
    }
}

/// Released on drop
#[derive(Debug)]
pub struct UploadSlot {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for UploadSlot {
    fn drop(&mut self) {
        self.keys.lock().remove(&self.key);
    }
}

/// Store an uploaded provider file as `{key}.{ext}` and register it.
///
/// The file is created, never overwritten: an existing `{key}.{ext}` is a
/// conflict. Only a file this upload created is removed when the add fails.
pub async fn upload_spider(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> AppResult<Envelope<UploadResponse>> {
    // The key becomes a file name: check it before touching the disk
    validate_key(&query.key)?;
    let Some(_slot) = state.uploads.claim(&query.key) else {
        return Err(AppError::conflict(format!(
            "An upload for '{}' is already in progress",
            query.key
        )));
    };
    if state.registry.get(&query.key).is_some() {
        return Err(spiderhub_core::Error::DuplicateKey(query.key).into());
    }

    let (filename, content) = loop {
        let Some(field) = multipart.next_field().await? else {
            return Err(AppError::bad_request("Missing multipart field 'file'"));
        };
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            break (filename, field.bytes().await?);
        }
    };

    let extension = Path::new(&filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|_| state.providers.is_provider_file(Path::new(&filename)))
        .map(str::to_lowercase)
        .ok_or_else(|| {
            AppError::bad_request(format!(
                "File must have one of the extensions: {}",
                state.providers.extensions.join(", ")
            ))
        })?;

    let dir = state.providers.dir.clone();
    let path = dir.join(format!("{}.{}", query.key, extension));
    let target = path.clone();
    tokio::task::spawn_blocking(move || create_provider_file(&dir, &target, &content))
        .await
        .map_err(|e| AppError::internal_server_error(format!("Upload task failed: {e}")))?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                AppError::conflict(format!("Provider file {} already exists", path.display()))
            } else {
                spiderhub_core::Error::from(e).into()
            }
        })?;

    let source = ProviderSource::Local { path: path.clone() };
    if let Err(e) = state
        .registry
        .add(&query.key, source, query.name.as_deref())
        .await
    {
        // Created above and the slot is still held: the file is ours
        remove_file(&path).await;
        return Err(e.into());
    }

    tracing::info!(provider = %query.key, "Uploaded provider file {}", filename);
    Ok(Envelope::success(UploadResponse {
        key: query.key,
        filename,
    }))
}

/// Write `content` next to `target` and move it into place only if
/// `target` does not exist yet
fn create_provider_file(dir: &Path, target: &Path, content: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut file = tempfile::Builder::new()
        .prefix(".upload-")
        .suffix(".part")
        .tempfile_in(dir)?;
    file.write_all(content)?;
    file.flush()?;
    file.persist_noclobber(target).map_err(|e| e.error)?;
    Ok(())
}

pub async fn update_spider(
    State(state): State<AppState>,
    UrlPath(key): UrlPath<String>,
    Json(request): Json<UpdateSpiderRequest>,
) -> AppResult<Envelope<KeyResponse>> {
    let key = state.registry.rename(
        &key,
        request.new_key.as_deref(),
        request.new_name.as_deref(),
    )?;
    Ok(Envelope::success(KeyResponse { key }))
}

/// Remove a provider; a local provider's backing file is deleted too
pub async fn delete_spider(
    State(state): State<AppState>,
    UrlPath(key): UrlPath<String>,
) -> AppResult<Envelope<KeyResponse>> {
    let entry = state.registry.remove(&key).await?;
    if let ProviderSource::Local { path } = &entry.source {
        remove_file(path).await;
    }
    Ok(Envelope::success(KeyResponse { key }))
}

/// Reload a provider from disk; only local providers can be reloaded here
pub async fn reload_spider(
    State(state): State<AppState>,
    UrlPath(key): UrlPath<String>,
) -> AppResult<Envelope<KeyResponse>> {
    let entry = state.registry.require(&key)?;
    if entry.kind() != SourceKind::Local {
        return Err(AppError::bad_request(format!(
            "Only local providers can be reloaded; '{key}' is {}",
            entry.kind()
        )));
    }

    state.registry.reload(&key).await?;
    Ok(Envelope::success(KeyResponse { key }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnabledResponse {
    pub key: String,
    pub enabled: bool,
}

pub async fn enable_spider(
    State(state): State<AppState>,
    UrlPath(key): UrlPath<String>,
) -> AppResult<Envelope<EnabledResponse>> {
    state.registry.enable(&key)?;
    Ok(Envelope::success(EnabledResponse { key, enabled: true }))
}

pub async fn disable_spider(
    State(state): State<AppState>,
    UrlPath(key): UrlPath<String>,
) -> AppResult<Envelope<EnabledResponse>> {
    state.registry.disable(&key)?;
    Ok(Envelope::success(EnabledResponse { key, enabled: false }))
}

async fn remove_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to delete provider file {}: {}", path.display(), e);
        }
    }
}
