//! AuditQ Configuration System
//!
//! TOML-based configuration with environment variable override support.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub storage: StorageConfig,
    pub mongodb: MongoConfig,
    pub query: QueryConfig,

    /// Seed sample audit events on startup (memory backend only)
    pub dev_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            storage: StorageConfig::default(),
            mongodb: MongoConfig::default(),
            query: QueryConfig::default(),
            dev_mode: false,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongodb,
    Memory,
}

impl StorageBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mongodb" | "mongo" => Some(StorageBackend::Mongodb),
            "memory" => Some(StorageBackend::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Mongodb,
        }
    }
}

/// MongoDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "auditq".to_string(),
            collection: "audit_events".to_string(),
        }
    }
}

/// Longest default statistics window accepted (100 years)
pub const MAX_STATS_WINDOW_HOURS: i64 = 24 * 366 * 100;

/// Query, statistics and export limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Page size used when the caller sends no (or an unparsable) limit
    pub default_limit: i64,

    /// Upper clamp applied to every caller-supplied limit
    pub max_limit: i64,

    /// Fixed page size for export requests
    pub export_limit: i64,

    /// Statistics window used when start_date is missing
    pub stats_window_hours: i64,

    /// Deadline for a single storage call
    pub store_timeout_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 1000,
            export_limit: 10_000,
            stats_window_hours: 24,
            store_timeout_ms: 30_000,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let q = &self.query;
        if q.max_limit <= 0 {
            return Err(ConfigError::ValidationError(
                "query.max_limit must be positive".to_string(),
            ));
        }
        if q.default_limit <= 0 || q.default_limit > q.max_limit {
            return Err(ConfigError::ValidationError(format!(
                "query.default_limit must be between 1 and max_limit ({})",
                q.max_limit
            )));
        }
        if q.export_limit <= 0 {
            return Err(ConfigError::ValidationError(
                "query.export_limit must be positive".to_string(),
            ));
        }
        if q.stats_window_hours <= 0 || q.stats_window_hours > MAX_STATS_WINDOW_HOURS {
            return Err(ConfigError::ValidationError(format!(
                "query.stats_window_hours must be between 1 and {}",
                MAX_STATS_WINDOW_HOURS
            )));
        }
        if q.store_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "query.store_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# AuditQ Configuration
# Environment variables (AUDITQ_*) override these settings

dev_mode = false

[http]
port = 8080
host = "0.0.0.0"
cors_origins = []

[storage]
# "mongodb" or "memory"
backend = "mongodb"

[mongodb]
uri = "mongodb://localhost:27017"
database = "auditq"
collection = "audit_events"

[query]
default_limit = 50
max_limit = 1000
export_limit = 10000
stats_window_hours = 24
store_timeout_ms = 30000
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.query.default_limit, 50);
        assert_eq!(config.query.export_limit, 10_000);
        assert_eq!(config.storage.backend, StorageBackend::Mongodb);
    }

    #[test]
    fn test_example_toml_parses() {
        let config: AppConfig = toml::from_str(&AppConfig::example_toml()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.mongodb.collection, "audit_events");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[storage]\nbackend = \"memory\"\n\n[query]\nmax_limit = 200").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.query.max_limit, 200);
        assert_eq!(config.query.default_limit, 50);
        assert_eq!(config.http.port, 8080);
    }

    #[test]
    fn test_unknown_backend_fails_to_parse() {
        let result: Result<AppConfig, _> = toml::from_str("[storage]\nbackend = \"postgres\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_default_above_max() {
        let mut config = AppConfig::default();
        config.query.default_limit = 500;
        config.query.max_limit = 100;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = AppConfig::default();
        config.query.stats_window_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_window() {
        let mut config = AppConfig::default();
        config.query.stats_window_hours = MAX_STATS_WINDOW_HOURS;
        assert!(config.validate().is_ok());

        config.query.stats_window_hours = i64::MAX / 2;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(StorageBackend::parse("Memory"), Some(StorageBackend::Memory));
        assert_eq!(StorageBackend::parse("mongo"), Some(StorageBackend::Mongodb));
        assert_eq!(StorageBackend::parse("redis"), None);
    }
}
