//! Provider registry
//!
//! Owns every registered provider. Loading and teardown run outside the
//! lock; insertion, removal and renames are single critical sections, so
//! concurrent callers never observe a half-applied change. The persisted
//! side-tables are re-derived from memory on every mutation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use super::loader::{teardown, LoadedProvider, Loader};
use super::record::{validate_key, ProviderEntry, ProviderRecord, ProviderSource, SourceKind};
use super::store::{LocalNameTable, RemoteSpiderEntry, RemoteTable, SideTableStore};
use super::Provider;
use crate::config::ProvidersConfig;
use crate::error::{Error, Result};

/// Outcome of restoring the registry at startup
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub loaded: Vec<String>,
    /// `(key, reason)` for every provider that could not be restored
    pub failed: Vec<(String, String)>,
}

pub struct ProviderRegistry {
    /// Never held across an await. Mutations rewrite the side-tables with
    /// blocking `std::fs` calls while holding it; both files are small.
    records: Mutex<HashMap<String, ProviderRecord>>,
    loader: Loader,
    store: SideTableStore,
}

impl ProviderRegistry {
    pub fn new(loader: Loader, store: SideTableStore) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            loader,
            store,
        }
    }

    // ========== Queries ==========

    /// Snapshot of all providers, ordered by key
    pub fn list(&self) -> Vec<ProviderEntry> {
        let records = self.records.lock();
        let mut entries: Vec<ProviderEntry> = records
            .iter()
            .map(|(key, record)| record.entry(key))
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    pub fn get(&self, key: &str) -> Option<ProviderEntry> {
        self.records.lock().get(key).map(|record| record.entry(key))
    }

    pub fn require(&self, key: &str) -> Result<ProviderEntry> {
        self.get(key).ok_or_else(|| Error::NotFound(key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    // ========== Mutations ==========

    /// Load and register a provider under `key`
    pub async fn add(
        &self,
        key: &str,
        source: ProviderSource,
        custom_name: Option<&str>,
    ) -> Result<ProviderEntry> {
        validate_key(key)?;
        if source.kind() == SourceKind::Embedded {
            return Err(Error::UnsupportedOperation(
                "embedded providers are registered in-process".to_string(),
            ));
        }
        self.ensure_vacant(key)?;

        let LoadedProvider {
            instance,
            display_name,
            artifact,
        } = self.loader.load(key, &source, custom_name).await?;

        let record = ProviderRecord {
            instance,
            display_name,
            enabled: true,
            source,
            artifact,
        };

        // A concurrent add may have won the key while we were loading
        let inserted = {
            let mut records = self.records.lock();
            if records.contains_key(key) {
                Err(record)
            } else {
                let entry = record.entry(key);
                records.insert(key.to_string(), record);
                self.persist(&records);
                Ok(entry)
            }
        };

        match inserted {
            Ok(entry) => {
                tracing::info!(provider = %key, kind = %entry.kind(), "Registered provider '{}'", entry.name);
                Ok(entry)
            }
            Err(record) => {
                teardown(key, &*record.instance).await;
                Err(Error::DuplicateKey(key.to_string()))
            }
        }
    }

    /// Register an in-process provider; it is never persisted or reloaded
    pub fn register_embedded(
        &self,
        key: &str,
        name: &str,
        instance: Arc<dyn Provider>,
    ) -> Result<ProviderEntry> {
        validate_key(key)?;

        let mut records = self.records.lock();
        if records.contains_key(key) {
            return Err(Error::DuplicateKey(key.to_string()));
        }

        let record = ProviderRecord {
            instance,
            display_name: if name.is_empty() { key.to_string() } else { name.to_string() },
            enabled: true,
            source: ProviderSource::Embedded,
            artifact: None,
        };
        let entry = record.entry(key);
        records.insert(key.to_string(), record);

        tracing::info!(provider = %key, "Registered embedded provider '{}'", entry.name);
        Ok(entry)
    }

    /// Unregister a provider, tear it down and release its artifact
    pub async fn remove(&self, key: &str) -> Result<ProviderEntry> {
        let record = {
            let mut records = self.records.lock();
            let record = records
                .remove(key)
                .ok_or_else(|| Error::NotFound(key.to_string()))?;
            self.persist(&records);
            record
        };

        let entry = record.entry(key);
        teardown(key, &*record.instance).await;
        if let Some(artifact) = record.artifact {
            let path = artifact.to_path_buf();
            if let Err(e) = artifact.close() {
                tracing::warn!(provider = %key, "Failed to delete {}: {}", path.display(), e);
            }
        }

        tracing::info!(provider = %key, "Removed provider '{}'", entry.name);
        Ok(entry)
    }

    /// Change a provider's key and/or display name in one step.
    ///
    /// A given name is stored as is, even when empty. Returns the key the
    /// provider is registered under afterwards.
    pub fn rename(&self, key: &str, new_key: Option<&str>, new_name: Option<&str>) -> Result<String> {
        let mut records = self.records.lock();
        if !records.contains_key(key) {
            return Err(Error::NotFound(key.to_string()));
        }

        let target = match new_key {
            Some(new_key) if new_key != key => {
                validate_key(new_key)?;
                if records.contains_key(new_key) {
                    return Err(Error::DuplicateKey(new_key.to_string()));
                }
                Some(new_key)
            }
            _ => None,
        };

        let Some(mut record) = records.remove(key) else {
            return Err(Error::NotFound(key.to_string()));
        };
        if let Some(name) = new_name {
            record.display_name = name.to_string();
        }
        let final_key = target.unwrap_or(key).to_string();
        records.insert(final_key.clone(), record);
        self.persist(&records);

        if final_key != key {
            tracing::info!(provider = %final_key, "Renamed provider key from '{}'", key);
        }
        Ok(final_key)
    }

    /// Tear a provider down and load it again from its recorded source
    pub async fn reload(&self, key: &str) -> Result<ProviderEntry> {
        let source = self.require(key)?.source;
        if source.kind() == SourceKind::Embedded {
            return Err(Error::UnsupportedOperation(format!(
                "embedded provider '{key}' cannot be reloaded"
            )));
        }

        self.remove(key).await?;
        self.add(key, source, None).await
    }

    pub fn enable(&self, key: &str) -> Result<()> {
        self.set_enabled(key, true)
    }

    pub fn disable(&self, key: &str) -> Result<()> {
        self.set_enabled(key, false)
    }

    fn set_enabled(&self, key: &str, enabled: bool) -> Result<()> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        record.enabled = enabled;
        Ok(())
    }

    /// Remove every provider; used on shutdown
    pub async fn clear(&self) {
        let keys: Vec<String> = self.records.lock().keys().cloned().collect();
        for key in keys {
            // A concurrent remove may already have taken it
            let _ = self.remove(&key).await;
        }
    }

    // ========== Startup ==========

    /// Rebuild the registry from the providers dir and persisted side-tables
    pub async fn restore(&self, config: &ProvidersConfig) -> RestoreReport {
        // Read both tables up front: every add below rewrites them
        let remote = self.store.read_remote();
        let local_names = self.store.read_local_names();
        let mut report = RestoreReport::default();

        for path in scan_provider_files(config) {
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let result = self.add(&key, ProviderSource::Local { path }, None).await;
            report.record(key, result);
        }

        for (key, entry) in remote {
            let source = ProviderSource::Remote {
                url: entry.script_url,
            };
            let result = self.add(&key, source, entry.name.as_deref()).await;
            report.record(key, result);
        }

        {
            let mut records = self.records.lock();
            for (key, name) in local_names {
                match records.get_mut(&key) {
                    Some(record) if record.source.kind() == SourceKind::Local => {
                        record.display_name = name;
                    }
                    _ => tracing::debug!(provider = %key, "Dropping stale local name '{}'", name),
                }
            }
            self.persist(&records);
        }

        tracing::info!(
            "Restored {} providers ({} failed)",
            report.loaded.len(),
            report.failed.len()
        );
        report
    }

    // ========== Persistence ==========

    fn ensure_vacant(&self, key: &str) -> Result<()> {
        if self.records.lock().contains_key(key) {
            return Err(Error::DuplicateKey(key.to_string()));
        }
        Ok(())
    }

    /// Rewrite both side-tables; called with the lock held
    fn persist(&self, records: &HashMap<String, ProviderRecord>) {
        if let Err(e) = self.store.write_remote(&remote_table(records)) {
            tracing::error!("Failed to persist remote providers: {}", e);
        }
        if let Err(e) = self.store.write_local_names(&local_name_table(records)) {
            tracing::error!("Failed to persist local provider names: {}", e);
        }
    }
}

impl RestoreReport {
    fn record(&mut self, key: String, result: Result<ProviderEntry>) {
        match result {
            Ok(_) => self.loaded.push(key),
            Err(e) => {
                tracing::warn!(provider = %key, "Failed to restore provider: {}", e);
                self.failed.push((key, e.to_string()));
            }
        }
    }
}

fn remote_table(records: &HashMap<String, ProviderRecord>) -> RemoteTable {
    records
        .iter()
        .filter_map(|(key, record)| match &record.source {
            ProviderSource::Remote { url } => Some((
                key.clone(),
                RemoteSpiderEntry {
                    script_url: url.clone(),
                    name: Some(record.display_name.clone()),
                },
            )),
            _ => None,
        })
        .collect()
}

/// Only names that differ from the key need remembering
fn local_name_table(records: &HashMap<String, ProviderRecord>) -> LocalNameTable {
    records
        .iter()
        .filter(|(key, record)| {
            record.source.kind() == SourceKind::Local && record.display_name != **key
        })
        .map(|(key, record)| (key.clone(), record.display_name.clone()))
        .collect()
}

/// Provider files directly inside the providers dir, in name order.
/// Package markers (`__init__.*`) are skipped.
fn scan_provider_files(config: &ProvidersConfig) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(&config.dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Cannot scan providers dir {}: {}", config.dir.display(), e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file() && config.is_provider_file(path))
        .filter(|path| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| stem != "__init__")
        })
        .collect();
    files.sort();
    files
}
