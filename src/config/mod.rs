//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables. Adapters
//! receive their section explicitly; nothing below the binaries reads the
//! process environment.

mod batch;
mod identity;
mod storage;

pub use batch::{BackoffConfig, BatchConfig, DEFAULT_MAX_ATTEMPTS};
pub use identity::{IdentityConfig, DEFAULT_BULK_CONCURRENCY};
pub use storage::{StorageConfig, DEFAULT_PROFILE_SORT_VALUE};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "registrar.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "REGISTRAR_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "REGISTRAR";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "REGISTRAR_LOG";

use serde::Deserialize;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Document store configuration.
    pub storage: StorageConfig,
    /// Identity store configuration.
    pub identity: IdentityConfig,
    /// Batch write engine configuration.
    pub batch: BatchConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `registrar.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Check every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_documents()?;
        self.identity.validate()
    }

    /// Check only what document-store work needs; no user pool required.
    pub fn validate_documents(&self) -> Result<(), ConfigError> {
        self.storage.validate()?;
        self.batch.validate()
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self {
            identity: IdentityConfig {
                user_pool_id: "us-east-1_test".to_string(),
                ..IdentityConfig::default()
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.storage.profile_table, "users");
        assert_eq!(config.batch.batch_size, 25);
        assert_eq!(config.batch.max_attempts, 10);
        assert!(config.identity.user_pool_id.is_empty());
    }

    #[test]
    fn test_default_config_requires_user_pool() {
        let err = Config::default().validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "identity.user_pool_id",
                ..
            }
        ));
    }

    #[test]
    fn test_document_work_needs_no_user_pool() {
        let config = Config::default();
        assert!(config.validate_documents().is_ok());
        assert!(config.validate().is_err());

        let config = Config {
            batch: BatchConfig {
                batch_size: 0,
                ..BatchConfig::default()
            },
            ..Config::default()
        };
        assert!(config.validate_documents().is_err());
    }

    #[test]
    fn test_config_for_test_is_valid() {
        assert!(Config::for_test().validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "storage:\n  profile_table: sig-dev-users\n  sort_key: rangeKey\nidentity:\n  user_pool_id: us-east-1_abc\n  delivery_mediums: [EMAIL, SMS]\nbatch:\n  max_attempts: 3\n  concurrency: 4"
        )
        .unwrap();

        let config = Config::load(file.path().to_str()).unwrap();

        assert_eq!(config.storage.profile_table, "sig-dev-users");
        assert_eq!(config.storage.sort_key.as_deref(), Some("rangeKey"));
        assert_eq!(config.identity.user_pool_id, "us-east-1_abc");
        assert_eq!(config.identity.delivery_mediums.len(), 2);
        assert_eq!(config.batch.max_attempts, 3);
        assert_eq!(config.batch.concurrency, 4);
        assert_eq!(config.batch.batch_size, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "storage:\n  profile_table: from-file").unwrap();

        std::env::set_var("REGISTRAR__STORAGE__PROFILE_TABLE", "from-env");
        let config = Config::load(file.path().to_str());
        std::env::remove_var("REGISTRAR__STORAGE__PROFILE_TABLE");

        assert_eq!(config.unwrap().storage.profile_table, "from-env");
    }
}
