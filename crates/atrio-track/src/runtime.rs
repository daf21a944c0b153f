//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const ENV_VALIDATOR_TTL_SECS: &str = "ATRIO_TRACK_VALIDATOR_TTL_SECS";
const ENV_SOURCE_TTL_SECS: &str = "ATRIO_TRACK_SOURCE_TTL_SECS";
const ENV_DISABLE_DEBUG: &str = "ATRIO_TRACK_DISABLE_DEBUG";

const DEFAULT_VALIDATOR_CACHE_TTL_SECS: u64 = 900;
const DEFAULT_SOURCE_CACHE_TTL_SECS: u64 = 60;

fn default_validator_cache_ttl_secs() -> u64 {
    DEFAULT_VALIDATOR_CACHE_TTL_SECS
}

fn default_source_cache_ttl_secs() -> u64 {
    DEFAULT_SOURCE_CACHE_TTL_SECS
}

/// Configuration for the tracking pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// TTL in seconds for cached schema validators. Schema edits take
    /// effect within this window.
    #[serde(default = "default_validator_cache_ttl_secs")]
    pub validator_cache_ttl_secs: u64,

    /// TTL in seconds for cached sources. Disabling a source takes effect
    /// within this window.
    #[serde(default = "default_source_cache_ttl_secs")]
    pub source_cache_ttl_secs: u64,

    /// Permanently disables the debugging facet of responses, regardless
    /// of per-request flags.
    #[serde(default)]
    pub debug_disabled: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            validator_cache_ttl_secs: DEFAULT_VALIDATOR_CACHE_TTL_SECS,
            source_cache_ttl_secs: DEFAULT_SOURCE_CACHE_TTL_SECS,
            debug_disabled: false,
        }
    }
}

impl TrackerConfig {
    /// Loads configuration from the process environment with strict
    /// validation.
    ///
    /// Supported variables: `ATRIO_TRACK_VALIDATOR_TTL_SECS` and
    /// `ATRIO_TRACK_SOURCE_TTL_SECS` (positive integer seconds),
    /// `ATRIO_TRACK_DISABLE_DEBUG` (boolean).
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a variable is present but is not
    /// a positive integer (for the TTLs) or not a boolean.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads configuration with a custom environment source.
    ///
    /// This entry point is test-friendly and accepts a key lookup function.
    ///
    /// # Errors
    ///
    /// Same contract as [`TrackerConfig::from_env`].
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let validator_cache_ttl_secs = parse_positive_u64_env(
            &get_env,
            ENV_VALIDATOR_TTL_SECS,
            DEFAULT_VALIDATOR_CACHE_TTL_SECS,
        )?;
        let source_cache_ttl_secs =
            parse_positive_u64_env(&get_env, ENV_SOURCE_TTL_SECS, DEFAULT_SOURCE_CACHE_TTL_SECS)?;
        let debug_disabled = parse_bool_env(&get_env, ENV_DISABLE_DEBUG, false)?;

        Ok(Self {
            validator_cache_ttl_secs,
            source_cache_ttl_secs,
            debug_disabled,
        })
    }

    /// Validator cache TTL as a duration.
    #[must_use]
    pub const fn validator_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.validator_cache_ttl_secs)
    }

    /// Source cache TTL as a duration.
    #[must_use]
    pub const fn source_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.source_cache_ttl_secs)
    }
}

fn parse_positive_u64_env<F>(get_env: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get_env(key) else {
        return Ok(default);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(default);
    }

    let parsed = raw.parse::<u64>().map_err(|_| {
        Error::configuration(format!("{key} must be a positive integer, got '{raw}'"))
    })?;
    if parsed == 0 {
        return Err(Error::configuration(format!(
            "{key} must be greater than zero"
        )));
    }
    Ok(parsed)
}

fn parse_bool_env<F>(get_env: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get_env(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(default),
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::configuration(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = TrackerConfig::from_env_with(|_| None).unwrap();
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.validator_cache_ttl(), Duration::from_secs(900));
        assert_eq!(config.source_cache_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn environment_values_override_defaults() {
        let config = TrackerConfig::from_env_with(|key| match key {
            ENV_VALIDATOR_TTL_SECS => Some("120".to_string()),
            ENV_SOURCE_TTL_SECS => Some("30".to_string()),
            ENV_DISABLE_DEBUG => Some("true".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.validator_cache_ttl_secs, 120);
        assert_eq!(config.source_cache_ttl_secs, 30);
        assert!(config.debug_disabled);
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let err = TrackerConfig::from_env_with(|key| {
            (key == ENV_VALIDATOR_TTL_SECS).then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn malformed_ttl_is_rejected() {
        let err = TrackerConfig::from_env_with(|key| {
            (key == ENV_SOURCE_TTL_SECS).then(|| "ninety".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("positive integer"));
    }

    #[test]
    fn malformed_boolean_is_rejected() {
        let err = TrackerConfig::from_env_with(|key| {
            (key == ENV_DISABLE_DEBUG).then(|| "maybe".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("boolean"));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = TrackerConfig::from_env_with(|_| Some("  ".to_string())).unwrap();
        assert_eq!(config.validator_cache_ttl_secs, 900);
        assert!(!config.debug_disabled);
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let config: TrackerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.validator_cache_ttl_secs, 900);
        assert_eq!(config.source_cache_ttl_secs, 60);
        assert!(!config.debug_disabled);
    }
}
