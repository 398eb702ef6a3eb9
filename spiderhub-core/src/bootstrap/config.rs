//! Configuration loading

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::Config;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "SPIDERHUB_CONFIG_PATH";

/// Load configuration from config file or environment variables
///
/// Config file search order:
/// 1. `explicit` path (the `--config` flag); failing to load it is an error
/// 2. `SPIDERHUB_CONFIG_PATH` environment variable
/// 3. ./config.yaml (current working directory)
/// 4. Fall back to environment variables only
pub fn load_config(explicit: Option<&str>) -> Result<Config> {
    let config = if let Some(path) = explicit {
        anyhow::ensure!(Path::new(path).exists(), "Config file {path} does not exist");
        Config::from_file(path).with_context(|| format!("Failed to load {path}"))?
    } else {
        discover()
    };

    // Fail fast on misconfigurations
    if let Err(errors) = config.validate() {
        for error in &errors {
            tracing::error!("Config validation error: {}", error);
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    info!("Configuration loaded and validated successfully");
    info!("HTTP address: {}", config.http_address());

    Ok(config)
}

fn discover() -> Config {
    let config_path = std::env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|p| Path::new(p).exists())
        .or_else(|| Path::new("config.yaml").exists().then(|| "config.yaml".to_string()));

    // Logging is not initialized yet, so report on stderr
    if let Some(path) = config_path {
        eprintln!("Loading config from {path}");
        match Config::from_file(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load {path}: {e}");
                eprintln!("Falling back to environment variables");
                Config::from_env().unwrap_or_default()
            }
        }
    } else {
        Config::from_env().unwrap_or_else(|e| {
            eprintln!("Failed to load config: {e}");
            eprintln!("Using default configuration");
            Config::default()
        })
    }
}
