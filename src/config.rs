//! Configuration loading.
//!
//! Precedence, lowest to highest: built-in defaults, the YAML file
//! (`invoicerelay.yml` or `--config`), `INVOICERELAY_*` environment
//! variables, CLI flags. The merged result is a plain
//! [`EngineConfig`]; nothing downstream knows where a value came from.

use std::env;
use std::path::{Path, PathBuf};

use invoicerelay_core_types::EngineConfig;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "invoicerelay.yml";
const ENV_PREFIX: &str = "INVOICERELAY_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid value '{value}' for {var}")]
    EnvValue { var: String, value: String },

    #[error("target_url is not set (config file, INVOICERELAY_TARGET_URL, or --target-url)")]
    MissingTargetUrl,
}

/// Load the configuration file (explicit path, or the default file when it
/// exists) and apply environment overrides.
pub fn load(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_file(path)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.exists() {
                read_file(default)?
            } else {
                EngineConfig::default()
            }
        }
    };
    apply_overrides(
        &mut config,
        env::vars().filter(|(k, _)| k.starts_with(ENV_PREFIX)),
    )?;
    Ok(config)
}

pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.target_url.trim().is_empty() {
        return Err(ConfigError::MissingTargetUrl);
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<EngineConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_overrides(
    config: &mut EngineConfig,
    vars: impl Iterator<Item = (String, String)>,
) -> Result<(), ConfigError> {
    for (var, value) in vars {
        match var.as_str() {
            "INVOICERELAY_TARGET_URL" => config.target_url = value,
            "INVOICERELAY_SECTION_LINK" => config.section_link = value,
            "INVOICERELAY_TARGET_STATUS" => config.target_status = value,
            "INVOICERELAY_EMAIL" => config.credentials.email = Some(value),
            "INVOICERELAY_PASSWORD" => config.credentials.password = Some(value),
            "INVOICERELAY_POOL_CAPACITY" => {
                config.pool_capacity = parse(&var, &value)?;
            }
            "INVOICERELAY_SUCCESS_THRESHOLD" => {
                config.success_threshold = parse(&var, &value)?;
            }
            "INVOICERELAY_SCROLL_ATTEMPTS" => {
                config.scroll_attempts = parse(&var, &value)?;
            }
            "INVOICERELAY_HEADLESS" => {
                config.headless = parse_bool(&var, &value)?;
            }
            // INVOICERELAY_CHROME and INVOICERELAY_DISABLE_SANDBOX are read
            // by the browser adapter itself.
            _ => {}
        }
    }
    Ok(())
}

fn parse<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::EnvValue {
        var: var.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::EnvValue {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_file_round_trips_through_serde_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoicerelay.yml");
        std::fs::write(
            &path,
            "target_url: https://app.example/home\npool_capacity: 3\nmapping_rules:\n  - pattern: kiwiwaste\n    replacement: Kiwi Waste Services\n",
        )
        .unwrap();

        let config = read_file(&path).unwrap();
        assert_eq!(config.target_url, "https://app.example/home");
        assert_eq!(config.pool_capacity, 3);
        assert_eq!(config.mapping_rules.len(), 1);
        // Unspecified fields keep their defaults.
        assert_eq!(config.success_threshold, 2);
        assert_eq!(config.section_link, "Commitments");
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = EngineConfig::default();
        apply_overrides(
            &mut config,
            vec![
                ("INVOICERELAY_TARGET_URL".to_string(), "https://x".to_string()),
                ("INVOICERELAY_POOL_CAPACITY".to_string(), "2".to_string()),
                ("INVOICERELAY_HEADLESS".to_string(), "true".to_string()),
                ("INVOICERELAY_EMAIL".to_string(), "ap@example.com".to_string()),
            ]
            .into_iter(),
        )
        .unwrap();

        assert_eq!(config.target_url, "https://x");
        assert_eq!(config.pool_capacity, 2);
        assert!(config.headless);
        assert_eq!(config.credentials.email.as_deref(), Some("ap@example.com"));
    }

    #[test]
    fn malformed_numeric_override_is_rejected() {
        let mut config = EngineConfig::default();
        let err = apply_overrides(
            &mut config,
            vec![("INVOICERELAY_POOL_CAPACITY".to_string(), "many".to_string())].into_iter(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EnvValue { .. }));
    }

    #[test]
    fn missing_target_url_fails_validation() {
        let config = EngineConfig::default();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::MissingTargetUrl)
        ));
    }
}
