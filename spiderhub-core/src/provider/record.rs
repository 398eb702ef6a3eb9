// Provider records
//
// One record per registered provider. The registry exclusively owns records;
// callers only ever see `ProviderEntry` snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempPath;

use super::Provider;
use crate::error::{Error, Result};

/// Where a provider comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Local,
    Remote,
    Embedded,
}

impl SourceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Embedded => "embedded",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin of a provider together with its locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderSource {
    /// A file on disk, used in place
    Local { path: PathBuf },
    /// A script URL, fetched into an owned temporary file
    Remote { url: String },
    /// An in-process implementation registered by code
    Embedded,
}

impl ProviderSource {
    #[must_use]
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Local { .. } => SourceKind::Local,
            Self::Remote { .. } => SourceKind::Remote,
            Self::Embedded => SourceKind::Embedded,
        }
    }

    /// File path or URL; empty for embedded providers
    #[must_use]
    pub fn locator(&self) -> String {
        match self {
            Self::Local { path } => path.display().to_string(),
            Self::Remote { url } => url.clone(),
            Self::Embedded => String::new(),
        }
    }
}

/// Registry-owned provider record
pub(crate) struct ProviderRecord {
    pub(crate) instance: Arc<dyn Provider>,
    pub(crate) display_name: String,
    pub(crate) enabled: bool,
    pub(crate) source: ProviderSource,
    /// Temporary file backing a remote provider; deleted exactly once,
    /// when the record is dropped or the artifact is closed on removal
    pub(crate) artifact: Option<TempPath>,
}

impl ProviderRecord {
    pub(crate) fn entry(&self, key: &str) -> ProviderEntry {
        ProviderEntry {
            key: key.to_string(),
            name: self.display_name.clone(),
            enabled: self.enabled,
            source: self.source.clone(),
            instance: self.instance.clone(),
        }
    }
}

/// Point-in-time snapshot of a registered provider
#[derive(Clone)]
pub struct ProviderEntry {
    pub key: String,
    pub name: String,
    pub enabled: bool,
    pub source: ProviderSource,
    pub instance: Arc<dyn Provider>,
}

impl ProviderEntry {
    #[must_use]
    pub fn kind(&self) -> SourceKind {
        self.source.kind()
    }
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Characters a key may not contain: the composite-id separator and
/// anything that would escape or split a file name.
const FORBIDDEN_KEY_CHARS: [char; 4] = ['_', '/', '\\', '.'];

/// Keys are used as composite-id prefixes and file stems. Any other
/// character is allowed, including non-ASCII site names.
pub fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key
            .chars()
            .any(|c| FORBIDDEN_KEY_CHARS.contains(&c) || c.is_control());
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidKey(key.to_string()))
    }
}
