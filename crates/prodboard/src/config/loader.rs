use std::path::Path;

use chrono::format::{Item, StrftimeItems};

use crate::config::schema::Config;
use crate::error::ConfigError;

/// Longest backoff a job may be held back for: one day.
pub const MAX_RETRY_DELAY_MS: u64 = 86_400_000;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = load_config_from_str(&content)?;
    log::debug!("Loaded config from {}", path.display());
    Ok(config)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Checks the cross-field rules the schema cannot express.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if !(1..=64).contains(&config.database.pool_size) {
        return Err(ConfigError::Validation {
            message: format!(
                "database.pool_size must be between 1 and 64, got {}",
                config.database.pool_size
            ),
        });
    }

    if config.retry.max_delay_ms > MAX_RETRY_DELAY_MS {
        return Err(ConfigError::Validation {
            message: format!(
                "retry.max_delay_ms ({}) exceeds the {} ms limit",
                config.retry.max_delay_ms, MAX_RETRY_DELAY_MS
            ),
        });
    }

    if config.retry.base_delay_ms > config.retry.max_delay_ms {
        return Err(ConfigError::Validation {
            message: format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                config.retry.base_delay_ms, config.retry.max_delay_ms
            ),
        });
    }

    if config.status.default_limit > config.status.max_limit {
        return Err(ConfigError::Validation {
            message: format!(
                "status.default_limit ({}) exceeds status.max_limit ({})",
                config.status.default_limit, config.status.max_limit
            ),
        });
    }

    let format = &config.status.timestamp_format;
    if format.is_empty() || StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::Validation {
            message: format!("Invalid status.timestamp_format '{}'", format),
        });
    }

    if config.worker.count > config.database.pool_size {
        log::warn!(
            "worker.count ({}) exceeds database.pool_size ({}); workers will contend for connections",
            config.worker.count,
            config.database.pool_size
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_load_minimal_config() {
        let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_full_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "database": {
                "path": "/var/lib/prodboard/ledger.db",
                "reporting_path": "/var/lib/prodboard/replica.db",
                "pool_size": 8,
                "acquire_timeout_ms": 2000,
                "busy_timeout_ms": 1000
            },
            "artifacts": { "directory": "/var/lib/prodboard/artifacts" },
            "worker": { "count": 2, "poll_interval_ms": 500, "max_error_length": 200 },
            "retry": { "ceiling": 5, "base_delay_ms": 100, "max_delay_ms": 1000 },
            "status": { "default_limit": 20, "max_limit": 100, "timestamp_format": "%d.%m.%Y %H:%M" }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/var/lib/prodboard/ledger.db"));
        assert_eq!(
            config.database.reporting_path,
            Some(PathBuf::from("/var/lib/prodboard/replica.db"))
        );
        assert_eq!(config.database.pool_size, 8);
        assert_eq!(config.worker.count, 2);
        assert_eq!(config.retry.ceiling, 5);
        assert_eq!(config.status.timestamp_format, "%d.%m.%Y %H:%M");
    }

    #[test]
    fn test_invalid_version() {
        let result = load_config_from_str(r#"{ "version": "2.0" }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result = load_config_from_str(r#"{ "version": "1.0", "ocr": { "enabled": true } }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));

        let result =
            load_config_from_str(r#"{ "version": "1.0", "worker": { "threads": 2 } }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_pool_size_bounds() {
        let result = load_config_from_str(r#"{ "version": "1.0", "database": { "pool_size": 0 } }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));

        let mut config = Config::default();
        config.database.pool_size = 65;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_retry_delays_must_be_ordered() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "retry": { "base_delay_ms": 2000, "max_delay_ms": 100 } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "retry": { "base_delay_ms": 10000000000000000, "max_delay_ms": 10000000000000000 } }"#,
        );
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));

        let mut config = Config::default();
        config.retry.max_delay_ms = MAX_RETRY_DELAY_MS + 1;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("retry.max_delay_ms"));

        config.retry.max_delay_ms = MAX_RETRY_DELAY_MS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_status_limits_and_format() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "status": { "default_limit": 600, "max_limit": 500 } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));

        let result = load_config_from_str(
            r#"{ "version": "1.0", "status": { "timestamp_format": "%Y-%Q" } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_malformed_json() {
        let result = load_config_from_str("{ version: 1.0 }");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prodboard.json");
        std::fs::write(&path, r#"{ "version": "1.0", "worker": { "count": 0 } }"#).unwrap();
        assert_eq!(load_config(&path).unwrap().worker.count, 0);

        let missing = load_config(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(ConfigError::ReadFile { .. })));
    }
}
