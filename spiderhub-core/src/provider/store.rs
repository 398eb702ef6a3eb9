//! Persisted registry side-tables.
//!
//! Two small JSON documents let the registry restore itself at startup:
//! remote providers (`key -> {script_url, name}`) and custom display names
//! of local providers (`key -> name`). Both are always rewritten in full.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const REMOTE_TABLE_FILE: &str = "remote_spiders.json";
pub const LOCAL_NAMES_FILE: &str = "local_spiders.json";
/// Suffix appended to a side-table that failed to parse
pub const CORRUPT_SUFFIX: &str = ".corrupt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSpiderEntry {
    pub script_url: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub type RemoteTable = BTreeMap<String, RemoteSpiderEntry>;
pub type LocalNameTable = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct SideTableStore {
    dir: PathBuf,
}

impl SideTableStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn remote_path(&self) -> PathBuf {
        self.dir.join(REMOTE_TABLE_FILE)
    }

    #[must_use]
    pub fn local_names_path(&self) -> PathBuf {
        self.dir.join(LOCAL_NAMES_FILE)
    }

    pub fn read_remote(&self) -> RemoteTable {
        read_table(&self.remote_path())
    }

    pub fn read_local_names(&self) -> LocalNameTable {
        read_table(&self.local_names_path())
    }

    pub fn write_remote(&self, table: &RemoteTable) -> Result<()> {
        write_table(&self.dir, &self.remote_path(), table)
    }

    pub fn write_local_names(&self, table: &LocalNameTable) -> Result<()> {
        write_table(&self.dir, &self.local_names_path(), table)
    }
}

/// Missing or unreadable tables read as empty. A table that does not parse
/// is moved aside to `<file>.corrupt` first, so the next rewrite cannot
/// destroy it.
fn read_table<T: DeserializeOwned + Default>(path: &Path) -> T {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            return T::default();
        }
    };

    serde_json::from_str(&content).unwrap_or_else(|e| {
        let backup = corrupt_path(path);
        match std::fs::rename(path, &backup) {
            Ok(()) => tracing::warn!(
                "Corrupt side-table {} moved to {}: {}",
                path.display(),
                backup.display(),
                e
            ),
            Err(rename_err) => tracing::error!(
                "Corrupt side-table {} could not be moved aside ({}): {}",
                path.display(),
                rename_err,
                e
            ),
        }
        T::default()
    })
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(CORRUPT_SUFFIX);
    PathBuf::from(name)
}

/// Write through a sibling temp file so readers never see a torn document
fn write_table<T: Serialize>(dir: &Path, path: &Path, table: &T) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, table)?;
    file.write_all(b"\n")?;
    file.flush()?;
    file.persist(path).map_err(|e| e.error)?;

    Ok(())
}
