//! Orchestrator configuration.
//!
//! [`OrchestratorConfig`] bundles the retry budget, polling cadence, pagination
//! settings and the checksum switch. Every field has a default, so a JSON
//! document only needs the values it overrides:
//!
//! ```
//! use ironlro::config::OrchestratorConfig;
//!
//! let config = OrchestratorConfig::from_json_str(r#"{ "retry": { "max_attempts": 5 } }"#).unwrap();
//! assert_eq!(config.retry.max_attempts, 5);
//! assert_eq!(config.retry.initial_delay_ms, 100);
//! ```
//!
//! Environment variables are read with [`OrchestratorConfig::from_env`]; see
//! [`OrchestratorConfig::apply_vars`] for the recognised keys.

use crate::poller::PollConfig;
use crate::retry::RetryPolicy;
use crate::stream::PaginationConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings shared by every call made through one orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub retry: RetryPolicy,
    pub poll: PollConfig,
    pub pagination: PaginationConfig,
    /// Attach a CRC-32C to payloads that do not carry one.
    pub verify_checksums: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            poll: PollConfig::default(),
            pagination: PaginationConfig::default(),
            verify_checksums: true,
        }
    }
}

impl OrchestratorConfig {
    /// Parse and validate a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::Invalid`] if the result fails validation
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`OrchestratorConfig::from_json_str`]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Defaults overridden by environment variables starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a value that does not parse and
    /// [`ConfigError::Invalid`] if the result fails validation
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_vars(&config_from_env(prefix))?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from lower-case keys (prefix already stripped).
    ///
    /// Recognised keys: `max_attempts`, `initial_delay_ms`, `max_delay_ms`,
    /// `backoff_multiplier`, `poll_interval_ms`, `poll_max_interval_ms`,
    /// `poll_multiplier`, `poll_timeout_ms`, `page_size`, `max_pages`,
    /// `verify_checksums`. Other keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a value that does not parse
    pub fn apply_vars(&mut self, vars: &HashMap<String, String>) -> Result<(), ConfigError> {
        for (key, value) in vars {
            match key.as_str() {
                "max_attempts" => self.retry.max_attempts = parse(key, value)?,
                "initial_delay_ms" => self.retry.initial_delay_ms = parse(key, value)?,
                "max_delay_ms" => self.retry.max_delay_ms = parse(key, value)?,
                "backoff_multiplier" => self.retry.backoff_multiplier = parse(key, value)?,
                "poll_interval_ms" => self.poll.interval_ms = parse(key, value)?,
                "poll_max_interval_ms" => self.poll.max_interval_ms = parse(key, value)?,
                "poll_multiplier" => self.poll.multiplier = parse(key, value)?,
                "poll_timeout_ms" => self.poll.timeout_ms = parse(key, value)?,
                "page_size" => self.pagination.page_size = parse(key, value)?,
                "max_pages" => self.pagination.max_pages = Some(parse(key, value)?),
                "verify_checksums" => self.verify_checksums = parse(key, value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier <= 0.0 {
            return invalid("retry.backoff_multiplier must be a positive number");
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return invalid("retry.max_delay_ms must not be below retry.initial_delay_ms");
        }
        if self.poll.interval_ms == 0 {
            return invalid("poll.interval_ms must be positive");
        }
        if self.poll.timeout_ms == 0 {
            return invalid("poll.timeout_ms must be positive");
        }
        if !self.poll.multiplier.is_finite() || self.poll.multiplier < 1.0 {
            return invalid("poll.multiplier must be at least 1.0");
        }
        if self.pagination.page_size == 0 {
            return invalid("pagination.page_size must be positive");
        }
        if self.pagination.max_pages == Some(0) {
            return invalid("pagination.max_pages must be positive when set");
        }
        Ok(())
    }
}

/// Variables starting with `prefix`, keyed by the lower-cased remainder.
#[must_use]
pub fn config_from_env(prefix: &str) -> HashMap<String, String> {
    std::env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix(prefix)
                .map(|name| (name.to_lowercase(), value))
        })
        .collect()
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(OrchestratorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_apply_vars_overrides_fields() {
        let mut config = OrchestratorConfig::default();
        let vars: HashMap<String, String> = [
            ("max_attempts", "7"),
            ("poll_timeout_ms", "2500"),
            ("max_pages", "4"),
            ("verify_checksums", "false"),
            ("unrelated", "x"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        config.apply_vars(&vars).unwrap();
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.poll.timeout_ms, 2500);
        assert_eq!(config.pagination.max_pages, Some(4));
        assert!(!config.verify_checksums);
    }

    #[test]
    fn test_apply_vars_rejects_garbage() {
        let mut config = OrchestratorConfig::default();
        let vars = HashMap::from([("page_size".to_string(), "lots".to_string())]);
        let err = config.apply_vars(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "page_size"));
    }
}
