//! Configuration resolution for ots.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`$XDG_CONFIG_HOME/ots/settings.json`)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Image repository used when neither config nor flags name one.
pub const DEFAULT_IMAGE: &str = "ghcr.io/onetimesecret/onetimesecret";

/// Log filter used when neither config nor `RUST_LOG` name one.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Complete ots configuration.
///
/// Every leaf is optional so that a later layer only overrides what it
/// actually sets; accessors supply the built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Deployment timeline store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct DatabaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Container image configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ImageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_image: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LogConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<bool>,
}

impl Config {
    /// Path of the timeline database, falling back to the per-user data dir.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database.path.clone().or_else(default_database_path)
    }

    /// Image repository for commands that take an optional `--image`.
    pub fn default_image(&self) -> &str {
        self.image.default_image.as_deref().unwrap_or(DEFAULT_IMAGE)
    }

    /// Default tracing filter directive.
    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Whether logs are emitted as JSON lines.
    pub fn log_json(&self) -> bool {
        self.log.json.unwrap_or(false)
    }
}

/// Load configuration with hierarchical resolution.
///
/// A missing global file is skipped; a missing explicit file is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            let global = load_config_file(&global_path)?;
            merge_config(&mut config, global);
        }
    }

    if let Some(path) = explicit {
        let file = load_config_file(path)?;
        merge_config(&mut config, file);
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ots").join("settings.json"))
}

/// Default location of the deployment timeline database.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("ots").join("deployments.db"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    if overlay.database.path.is_some() {
        base.database.path = overlay.database.path;
    }
    if overlay.image.default_image.is_some() {
        base.image.default_image = overlay.image.default_image;
    }
    if overlay.log.level.is_some() {
        base.log.level = overlay.log.level;
    }
    if overlay.log.json.is_some() {
        base.log.json = overlay.log.json;
    }
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("OTS_DB_PATH").filter(|v| !v.is_empty()) {
        config.database.path = Some(PathBuf::from(val));
    }
    if let Some(val) = var("OTS_IMAGE").filter(|v| !v.is_empty()) {
        config.image.default_image = Some(val);
    }
    if let Some(val) = var("OTS_LOG_LEVEL").filter(|v| !v.is_empty()) {
        config.log.level = Some(val);
    }
    if let Some(val) = var("OTS_LOG_JSON") {
        match val.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => config.log.json = Some(true),
            "0" | "false" | "no" => config.log.json = Some(false),
            _ => {}
        }
    }
}
