//! TVBox configuration import.
//!
//! Fetches a TVBox config document (JSON, or the legacy line-based text
//! format) and normalizes it into one descriptor per site. Python sites can
//! then be registered as remote providers.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{Error, PartialProviderFailure, Result};
use crate::provider::{ProviderRegistry, ProviderSource};

/// TVBox site type of script-backed spiders
const PYTHON_SITE_TYPE: &str = "3";
const PYTHON_SUFFIX: &str = ".py";

/// Presentation flags carried over from a site definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteMeta {
    pub name: String,
    pub searchable: Value,
    #[serde(rename = "quickSearch")]
    pub quick_search: Value,
    pub filterable: Value,
}

/// One normalized site of an imported config
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SiteDescriptor {
    Python {
        script_url: String,
        #[serde(flatten)]
        meta: Option<SiteMeta>,
    },
    Generic {
        api_url: String,
        #[serde(flatten)]
        meta: Option<SiteMeta>,
    },
}

impl SiteDescriptor {
    /// Script URL of a Python site
    pub fn script_url(&self) -> Option<&str> {
        match self {
            Self::Python { script_url, .. } => Some(script_url),
            Self::Generic { .. } => None,
        }
    }

    fn from_site(site: &Map<String, Value>) -> Self {
        let api = site.get("api").and_then(Value::as_str).unwrap_or_default();
        // Only the string "3" marks a Python site; a numeric 3 does not
        let is_python = site.get("type").and_then(Value::as_str) == Some(PYTHON_SITE_TYPE)
            || api.ends_with(PYTHON_SUFFIX);

        let flag = |name: &str| site.get(name).cloned().unwrap_or_else(|| json!(1));
        let meta = Some(SiteMeta {
            name: site.get("name").map(scalar_string).unwrap_or_default(),
            searchable: flag("searchable"),
            quick_search: flag("quickSearch"),
            filterable: flag("filterable"),
        });

        if is_python {
            Self::Python {
                script_url: api.to_string(),
                meta,
            }
        } else {
            Self::Generic {
                api_url: api.to_string(),
                meta,
            }
        }
    }

    /// A bare URL: only the `.py` suffix identifies a Python site
    fn from_url(url: &str) -> Self {
        if url.ends_with(PYTHON_SUFFIX) {
            Self::Python {
                script_url: url.to_string(),
                meta: None,
            }
        } else {
            Self::Generic {
                api_url: url.to_string(),
                meta: None,
            }
        }
    }
}

pub type SiteTable = BTreeMap<String, SiteDescriptor>;

/// Result of importing a config into the registry
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub sites: SiteTable,
    pub added: Vec<String>,
    pub failures: Vec<PartialProviderFailure>,
}

pub struct ConfigImporter {
    http: reqwest::Client,
}

impl ConfigImporter {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Import(e.to_string()))?;
        Ok(Self { http })
    }

    /// Fetch and normalize the config at `url`
    pub async fn load(&self, url: &str) -> Result<SiteTable> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Import(format!("failed to fetch {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Import(format!("failed to fetch {url}: HTTP {status}")));
        }

        let text = response
            .text()
            .await
            .map_err(|e| Error::Import(format!("failed to read {url}: {e}")))?;
        Ok(parse_document(&text))
    }

    /// Load `url` and register every Python site as a remote provider.
    ///
    /// Sites that fail to load are reported, not fatal.
    pub async fn import_into(&self, registry: &ProviderRegistry, url: &str) -> Result<ImportReport> {
        let sites = self.load(url).await?;
        let mut added = Vec::new();
        let mut failures = Vec::new();

        for (key, site) in &sites {
            let Some(script_url) = site.script_url() else {
                continue;
            };
            let source = ProviderSource::Remote {
                url: script_url.to_string(),
            };
            match registry.add(key, source, None).await {
                Ok(_) => added.push(key.clone()),
                Err(e) => {
                    tracing::warn!(provider = %key, "Skipping imported site: {}", e);
                    failures.push(PartialProviderFailure {
                        key: key.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Imported {} sites from {} ({} providers added)",
            sites.len(),
            url,
            added.len()
        );
        Ok(ImportReport {
            sites,
            added,
            failures,
        })
    }
}

/// JSON first, the text format otherwise
pub fn parse_document(text: &str) -> SiteTable {
    let document = serde_json::from_str::<Value>(text)
        .unwrap_or_else(|_| parse_text_config(text.trim()));
    normalize_config(&document)
}

/// Line-based format: `#` comments, `key=value` pairs, `name=` opens a site
fn parse_text_config(content: &str) -> Value {
    let mut sites = Vec::new();
    let mut current: Option<Map<String, Value>> = None;

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim().to_lowercase(), value.trim());

        if key == "name" {
            sites.extend(current.take().map(Value::Object));
            let mut site = Map::new();
            site.insert("key".to_string(), json!(value));
            site.insert("name".to_string(), json!(value));
            current = Some(site);
        } else if let Some(site) = current.as_mut() {
            site.insert(key, json!(value));
        }
    }
    sites.extend(current.map(Value::Object));

    json!({ "sites": sites })
}

fn normalize_config(document: &Value) -> SiteTable {
    let mut table = SiteTable::new();
    let Value::Object(root) = document else {
        return table;
    };

    if let Some(sites) = root.get("sites") {
        for site in sites.as_array().into_iter().flatten() {
            let Value::Object(site) = site else { continue };
            let key = ["key", "name"]
                .iter()
                .filter_map(|field| site.get(*field).map(scalar_string))
                .find(|key| !key.is_empty())
                .unwrap_or_else(|| table.len().to_string());
            table.insert(key, SiteDescriptor::from_site(site));
        }
        return table;
    }

    for (key, value) in root {
        match value {
            Value::Object(site) => {
                table.insert(key.clone(), SiteDescriptor::from_site(site));
            }
            Value::String(url) => {
                table.insert(key.clone(), SiteDescriptor::from_url(url));
            }
            _ => {}
        }
    }
    table
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
