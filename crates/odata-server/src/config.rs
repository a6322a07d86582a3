//! Configuration management for the OData server.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use odata_server::config::ServerConfig;
//!
//! // Load from file with env overrides
//! let config = ServerConfig::load("config.yaml")?;
//!
//! // Or load from environment only
//! let config = ServerConfig::from_env()?;
//! ```

use std::path::Path;

use config::{Config, ConfigError, Environment, File, FileFormat};
use odata_domain::EntityModel;
use serde::{Deserialize, Serialize};

use crate::handlers::batch::BatchLimits;

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Batch request limits
    #[serde(default)]
    pub batch: BatchSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Metrics settings
    #[serde(default)]
    pub metrics: MetricsSettings,

    /// Entity model settings
    #[serde(default)]
    pub model: ModelSettings,
}

/// Server network settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Path prefix the service is mounted at, stripped from sub-request URLs.
    #[serde(default = "default_service_root")]
    pub service_root: String,

    /// Header every request must carry; its value becomes the `user` claim.
    /// Unset means no pre-request hook.
    #[serde(default)]
    pub required_header: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            service_root: default_service_root(),
            required_header: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_service_root() -> String {
    "/".to_string()
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    /// Storage backend type. Only "memory" is available.
    #[serde(default = "default_storage_backend")]
    pub backend: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

/// Limits applied to `$batch` requests.
///
/// Environment variables: `ODATA_BATCH__MAX_PARTS`,
/// `ODATA_BATCH__MAX_CHANGESET_PARTS`, `ODATA_BATCH__BODY_LIMIT_BYTES`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BatchSettings {
    /// Maximum number of requests in one batch, counting changeset members.
    #[serde(default = "default_max_parts")]
    pub max_parts: usize,

    /// Maximum number of requests in one changeset.
    #[serde(default = "default_max_changeset_parts")]
    pub max_changeset_parts: usize,

    /// Maximum size of a batch request body.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_parts: default_max_parts(),
            max_changeset_parts: default_max_changeset_parts(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl BatchSettings {
    pub fn limits(&self) -> BatchLimits {
        BatchLimits {
            max_parts: self.max_parts,
            max_changeset_parts: self.max_changeset_parts,
        }
    }
}

fn default_max_parts() -> usize {
    1000
}

fn default_max_changeset_parts() -> usize {
    100
}

fn default_body_limit() -> usize {
    10 * 1024 * 1024
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetricsSettings {
    /// Enable metrics endpoint
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// Entity model settings.
///
/// The model itself lives in a separate JSON document so that entity set and
/// property names keep their case. Without a path the built-in sample model
/// is served.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ModelSettings {
    /// Path to a JSON entity model document.
    #[serde(default)]
    pub path: Option<String>,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `ODATA_` and use `__` as separator.
    /// For example:
    /// - `ODATA_SERVER__PORT=9090` overrides `server.port`
    /// - `ODATA_BATCH__MAX_PARTS=50` overrides `batch.max_parts`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            // ODATA_SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("ODATA")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(
                Environment::with_prefix("ODATA")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.server.port == 0 {
            return Err(invalid("server.port must be greater than 0"));
        }

        if self.server.request_timeout_secs == 0 {
            return Err(invalid("server.request_timeout_secs must be greater than 0"));
        }

        if !self.server.service_root.starts_with('/') {
            return Err(invalid(format!(
                "server.service_root must start with '/', got: {}",
                self.server.service_root
            )));
        }

        let valid_backends = ["memory"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(invalid(format!(
                "storage.backend must be one of: {:?}, got: {}",
                valid_backends, self.storage.backend
            )));
        }

        if self.batch.max_parts == 0 {
            return Err(invalid("batch.max_parts must be greater than 0"));
        }
        if self.batch.max_changeset_parts == 0 {
            return Err(invalid("batch.max_changeset_parts must be greater than 0"));
        }
        if self.batch.max_changeset_parts > self.batch.max_parts {
            return Err(invalid(format!(
                "batch.max_changeset_parts ({}) cannot exceed batch.max_parts ({})",
                self.batch.max_changeset_parts, self.batch.max_parts
            )));
        }
        if self.batch.body_limit_bytes == 0 {
            return Err(invalid("batch.body_limit_bytes must be greater than 0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging.level must be one of: {:?}, got: {}",
                valid_levels, self.logging.level
            )));
        }

        if self.metrics.enabled && !self.metrics.path.starts_with('/') {
            return Err(invalid(format!(
                "metrics.path must start with '/', got: {}",
                self.metrics.path
            )));
        }

        Ok(())
    }

    /// Loads and validates the configured entity model.
    ///
    /// Returns the sample model when no model path is configured.
    pub fn load_model(&self) -> Result<EntityModel, ConfigLoadError> {
        let model = match &self.model.path {
            None => EntityModel::sample(),
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        ConfigLoadError::FileNotFound { path: path.clone() }
                    } else {
                        invalid(format!("failed to read model file {path}: {e}"))
                    }
                })?;
                serde_json::from_str(&contents)
                    .map_err(|e| invalid(format!("model file {path} is not valid: {e}")))?
            }
        };

        model
            .validate()
            .map_err(|e| invalid(format!("model: {e}")))?;
        Ok(model)
    }
}

fn invalid(message: impl Into<String>) -> ConfigLoadError {
    ConfigLoadError::Invalid {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Test: Can load config from YAML file
    #[test]
    #[serial]
    fn test_can_load_config_from_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
server:
  host: "127.0.0.1"
  port: 9090
  request_timeout_secs: 60
  service_root: /odata

storage:
  backend: memory

batch:
  max_parts: 20
  max_changeset_parts: 5

logging:
  level: debug
  json: true

metrics:
  enabled: true
  path: /custom-metrics
"#
        )
        .unwrap();

        let config = ServerConfig::load(file.path()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.request_timeout_secs, 60);
        assert_eq!(config.server.service_root, "/odata");
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.batch.max_parts, 20);
        assert_eq!(config.batch.max_changeset_parts, 5);
        assert_eq!(config.batch.body_limit_bytes, 10 * 1024 * 1024);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.metrics.path, "/custom-metrics");
    }

    /// Test: Can override config with env vars
    #[test]
    #[serial]
    fn test_can_override_config_with_env_vars() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
server:
  host: "127.0.0.1"
  port: 8080
"#
        )
        .unwrap();

        std::env::set_var("ODATA_SERVER__PORT", "9999");
        std::env::set_var("ODATA_LOGGING__LEVEL", "warn");
        std::env::set_var("ODATA_BATCH__MAX_PARTS", "420");

        let config = ServerConfig::load(file.path());

        std::env::remove_var("ODATA_SERVER__PORT");
        std::env::remove_var("ODATA_LOGGING__LEVEL");
        std::env::remove_var("ODATA_BATCH__MAX_PARTS");

        let config = config.unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.batch.max_parts, 420);
        assert!(config.batch.max_changeset_parts <= config.batch.max_parts);
    }

    #[test]
    fn test_config_validation_catches_errors() {
        let cases: Vec<(Box<dyn Fn(&mut ServerConfig)>, &str)> = vec![
            (Box::new(|c| c.storage.backend = "postgres".to_string()), "storage.backend"),
            (Box::new(|c| c.logging.level = "loud".to_string()), "logging.level"),
            (Box::new(|c| c.batch.max_parts = 0), "batch.max_parts"),
            (Box::new(|c| c.batch.max_changeset_parts = 0), "batch.max_changeset_parts"),
            (
                Box::new(|c| {
                    c.batch.max_parts = 5;
                    c.batch.max_changeset_parts = 10;
                }),
                "cannot exceed",
            ),
            (Box::new(|c| c.batch.body_limit_bytes = 0), "body_limit_bytes"),
            (Box::new(|c| c.server.service_root = "odata".to_string()), "service_root"),
            (Box::new(|c| c.server.request_timeout_secs = 0), "request_timeout_secs"),
            (Box::new(|c| c.metrics.path = "metrics".to_string()), "metrics.path"),
        ];

        for (mutate, expected) in cases {
            let mut config = ServerConfig::default();
            mutate(&mut config);
            let err = config.validate().unwrap_err();
            assert!(
                err.to_string().contains(expected),
                "expected '{expected}' in '{err}'"
            );
        }
    }

    #[test]
    fn test_invalid_config_returns_clear_error() {
        let result = ServerConfig::load("/nonexistent/path/config.yaml");
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigLoadError::FileNotFound { .. }));
        assert!(err.to_string().contains("not found"));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid: yaml: syntax: [").unwrap();
        let err = ServerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Load(_)));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.service_root, "/");
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.logging.level, "info");
        assert!(config.metrics.enabled);
        assert!(config.model.path.is_none());
    }

    #[test]
    #[serial]
    fn test_from_env_loads_defaults_with_env_overrides() {
        std::env::set_var("ODATA_SERVER__HOST", "192.168.1.1");
        let config = ServerConfig::from_env();
        std::env::remove_var("ODATA_SERVER__HOST");

        let config = config.unwrap();
        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_model_defaults_to_sample() {
        let config = ServerConfig::default();
        let model = config.load_model().unwrap();
        assert!(model.entity_set("People").is_some());
    }

    #[test]
    fn test_load_model_from_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{
                "namespace": "Shop",
                "entity_sets": {{
                    "Products": {{
                        "entity_type": "Shop.Product",
                        "key": ["SKU"],
                        "properties": {{"SKU": {{"kind": "primitive", "required": true}}}}
                    }}
                }}
            }}"#
        )
        .unwrap();

        let mut config = ServerConfig::default();
        config.model.path = Some(file.path().display().to_string());
        let model = config.load_model().unwrap();
        assert_eq!(model.namespace, "Shop");
        assert!(model.entity_set("Products").is_some());
    }

    #[test]
    fn test_load_model_rejects_inconsistent_model() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"namespace": "Shop", "entity_sets": {{"Products": {{"entity_type": "Shop.Product"}}}}}}"#
        )
        .unwrap();

        let mut config = ServerConfig::default();
        config.model.path = Some(file.path().display().to_string());
        let err = config.load_model().unwrap_err();
        assert!(err.to_string().contains("no key"));
    }

    #[test]
    fn test_load_model_missing_file() {
        let mut config = ServerConfig::default();
        config.model.path = Some("/nonexistent/model.json".to_string());
        assert!(matches!(
            config.load_model().unwrap_err(),
            ConfigLoadError::FileNotFound { .. }
        ));
    }
}
