//! Loader configuration
//!
//! Configuration is fixed when a loader is built; callers never pass flags to
//! individual loads.

use std::env;

use crate::error::ConfigError;
use crate::sql::SqlDialect;

/// Default configuration values
pub struct LoaderDefaults;

impl LoaderDefaults {
    pub const DIALECT: SqlDialect = SqlDialect::PostgreSQL;
    pub const MAX_BATCH_SIZE: usize = 1000;
    /// PostgreSQL accepts at most this many bind parameters per statement.
    /// Batches over composite keys are chunked to stay within it.
    pub const MAX_BATCH_SIZE_LIMIT: usize = 65535;
    pub const PRIME_UNIQUE_KEYS: bool = true;
}

/// Batch loader configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Placeholder and quoting style of generated queries
    pub dialect: SqlDialect,
    /// Maximum number of keys in a single query; larger batches are split
    pub max_batch_size: usize,
    /// Cache every unique key of loaded rows, not just the requested one
    pub prime_unique_keys: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            dialect: LoaderDefaults::DIALECT,
            max_batch_size: LoaderDefaults::MAX_BATCH_SIZE,
            prime_unique_keys: LoaderDefaults::PRIME_UNIQUE_KEYS,
        }
    }
}

impl LoaderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::validation_failed(
                "max_batch_size",
                "Maximum batch size must be greater than 0",
            ));
        }

        if self.max_batch_size > LoaderDefaults::MAX_BATCH_SIZE_LIMIT {
            return Err(ConfigError::validation_failed(
                "max_batch_size",
                format!(
                    "Maximum batch size must not exceed {}",
                    LoaderDefaults::MAX_BATCH_SIZE_LIMIT
                ),
            ));
        }

        Ok(())
    }

    /// Read configuration from `DB_LOADER_*` environment variables, falling
    /// back to defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        let dialect = get_env_or_default("DB_LOADER_DIALECT", &LoaderDefaults::DIALECT.to_string())
            .parse::<SqlDialect>()
            .map_err(|_| ConfigError::InvalidValue {
                field: "dialect".to_string(),
                value: env::var("DB_LOADER_DIALECT").unwrap_or_default(),
                expected: "postgresql, mysql or sqlite".to_string(),
            })?;

        let max_batch_size = get_env_or_default(
            "DB_LOADER_MAX_BATCH_SIZE",
            &LoaderDefaults::MAX_BATCH_SIZE.to_string(),
        )
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidValue {
            field: "max_batch_size".to_string(),
            value: env::var("DB_LOADER_MAX_BATCH_SIZE").unwrap_or_default(),
            expected: "positive number of keys".to_string(),
        })?;

        let prime_unique_keys = get_env_or_default(
            "DB_LOADER_PRIME_UNIQUE_KEYS",
            &LoaderDefaults::PRIME_UNIQUE_KEYS.to_string(),
        )
        .parse::<bool>()
        .map_err(|_| ConfigError::InvalidValue {
            field: "prime_unique_keys".to_string(),
            value: env::var("DB_LOADER_PRIME_UNIQUE_KEYS").unwrap_or_default(),
            expected: "true or false".to_string(),
        })?;

        let config = LoaderConfig {
            dialect,
            max_batch_size,
            prime_unique_keys,
        };
        config.validate()?;
        Ok(config)
    }
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        env::remove_var("DB_LOADER_DIALECT");
        env::remove_var("DB_LOADER_MAX_BATCH_SIZE");
        env::remove_var("DB_LOADER_PRIME_UNIQUE_KEYS");
    }

    #[test]
    #[serial]
    fn test_defaults_when_unset() {
        clear_env();
        let config = LoaderConfig::from_env().unwrap();
        assert_eq!(config, LoaderConfig::default());
        assert_eq!(config.max_batch_size, 1000);
        assert!(config.prime_unique_keys);
    }

    #[test]
    #[serial]
    fn test_reads_environment() {
        clear_env();
        env::set_var("DB_LOADER_DIALECT", "sqlite");
        env::set_var("DB_LOADER_MAX_BATCH_SIZE", "250");
        env::set_var("DB_LOADER_PRIME_UNIQUE_KEYS", "false");

        let config = LoaderConfig::from_env().unwrap();
        assert_eq!(config.dialect, SqlDialect::SQLite);
        assert_eq!(config.max_batch_size, 250);
        assert!(!config.prime_unique_keys);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_values() {
        clear_env();
        env::set_var("DB_LOADER_MAX_BATCH_SIZE", "lots");
        assert!(matches!(
            LoaderConfig::from_env(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "max_batch_size"
        ));

        env::set_var("DB_LOADER_MAX_BATCH_SIZE", "0");
        assert!(matches!(LoaderConfig::from_env(), Err(ConfigError::ValidationFailed { .. })));

        clear_env();
        env::set_var("DB_LOADER_DIALECT", "oracle");
        assert!(LoaderConfig::from_env().is_err());

        clear_env();
    }

    #[test]
    fn test_validate_upper_bound() {
        let config = LoaderConfig {
            max_batch_size: 70000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
