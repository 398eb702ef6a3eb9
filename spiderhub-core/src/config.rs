use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Prefix every API route is nested under (e.g. "/api")
    pub base_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            base_path: "/api".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Provider loading configuration
///
/// Controls where provider files live, where registry side-tables are
/// persisted, and how provider processes are launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Directory scanned for local provider files at startup
    pub dir: PathBuf,
    /// Directory holding the persisted side-tables
    pub data_dir: PathBuf,
    /// Directory for materialized remote provider files (OS temp dir if unset)
    pub artifact_dir: Option<PathBuf>,
    /// File extensions recognised as provider sources (without the dot)
    pub extensions: Vec<String>,
    /// Program used to run provider files (e.g. "python3").
    /// When unset the provider file is executed directly.
    pub interpreter: Option<String>,
    pub fetch_timeout_seconds: u64,
    pub call_timeout_seconds: u64,
    /// Argument passed to every provider's `init`
    pub init_extend: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./spiders"),
            data_dir: PathBuf::from("./data"),
            artifact_dir: None,
            extensions: vec!["py".to_string()],
            interpreter: None,
            fetch_timeout_seconds: 30,
            call_timeout_seconds: 30,
            init_extend: String::new(),
        }
    }
}

impl ProvidersConfig {
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }

    #[must_use]
    pub fn artifact_dir(&self) -> PathBuf {
        self.artifact_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Whether `path` carries one of the configured provider extensions
    #[must_use]
    pub fn is_provider_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        // Load config file if provided
        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // Override with environment variables (SPIDERHUB_SERVER_PORT, etc.)
        builder = builder.add_source(
            Environment::with_prefix("SPIDERHUB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Validate configuration, collecting every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push("server.host must not be empty".to_string());
        }
        if self.server.port == 0 {
            errors.push("server.port must not be 0".to_string());
        }
        if !self.server.base_path.starts_with('/') {
            errors.push(format!(
                "server.base_path must start with '/', got '{}'",
                self.server.base_path
            ));
        }
        if let Err(e) = crate::logging::parse_log_level(&self.logging.level) {
            errors.push(e.to_string());
        }
        if let Err(e) = crate::logging::LogFormat::parse(&self.logging.format) {
            errors.push(e.to_string());
        }
        if self.providers.extensions.is_empty() {
            errors.push("providers.extensions must list at least one extension".to_string());
        }
        if self.providers.fetch_timeout_seconds == 0 {
            errors.push("providers.fetch_timeout_seconds must be positive".to_string());
        }
        if self.providers.call_timeout_seconds == 0 {
            errors.push("providers.call_timeout_seconds must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
