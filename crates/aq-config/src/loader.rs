//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError, StorageBackend};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "auditq.toml",
    "./config/config.toml",
    "/etc/auditq/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_overrides(&mut config, |key| env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!(?path, "Explicit config file not found, searching defaults");
        }

        if let Ok(path) = env::var("AUDITQ_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

/// Apply overrides from a key lookup. Unparsable numeric values are ignored.
pub(crate) fn apply_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    // HTTP
    if let Some(port) = lookup("AUDITQ_HTTP_PORT").and_then(|v| v.parse().ok()) {
        config.http.port = port;
    }
    if let Some(val) = lookup("AUDITQ_HTTP_HOST") {
        config.http.host = val;
    }
    if let Some(val) = lookup("AUDITQ_CORS_ORIGINS") {
        config.http.cors_origins = val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    // Storage
    if let Some(val) = lookup("AUDITQ_STORAGE_BACKEND") {
        match StorageBackend::parse(&val) {
            Some(backend) => config.storage.backend = backend,
            None => warn!(value = %val, "Ignoring unknown AUDITQ_STORAGE_BACKEND"),
        }
    }

    // MongoDB
    if let Some(val) = lookup("AUDITQ_MONGODB_URI") {
        config.mongodb.uri = val;
    }
    if let Some(val) = lookup("AUDITQ_MONGODB_DATABASE") {
        config.mongodb.database = val;
    }
    if let Some(val) = lookup("AUDITQ_MONGODB_COLLECTION") {
        config.mongodb.collection = val;
    }

    // Query limits
    if let Some(limit) = lookup("AUDITQ_QUERY_DEFAULT_LIMIT").and_then(|v| v.parse().ok()) {
        config.query.default_limit = limit;
    }
    if let Some(limit) = lookup("AUDITQ_QUERY_MAX_LIMIT").and_then(|v| v.parse().ok()) {
        config.query.max_limit = limit;
    }
    if let Some(limit) = lookup("AUDITQ_EXPORT_LIMIT").and_then(|v| v.parse().ok()) {
        config.query.export_limit = limit;
    }
    if let Some(hours) = lookup("AUDITQ_STATS_WINDOW_HOURS").and_then(|v| v.parse().ok()) {
        config.query.stats_window_hours = hours;
    }
    if let Some(ms) = lookup("AUDITQ_STORE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.query.store_timeout_ms = ms;
    }

    if let Some(val) = lookup("AUDITQ_DEV_MODE") {
        config.dev_mode = val == "true" || val == "1";
    }
}
