//! Engine configuration, environment overrides and TOML files.
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: values set via [`EngineBuilder`](crate::engine::EngineBuilder) methods
//! 2. **Environment variables**: values from `SPLITJOIN_*` env vars
//! 3. **Config file**: values loaded from a TOML file (requires `config-file` feature)
//! 4. **Defaults**: [`EngineConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `SPLITJOIN_DEFAULT_CUTOFF` | `usize` | `default_cutoff` |
//! | `SPLITJOIN_DEFAULT_PRIORITY` | `low`/`normal`/`high` | `default_priority` |
//! | `SPLITJOIN_POLL_INTERVAL_MS` | `u64` | `poll_interval` |
//! | `SPLITJOIN_THREAD_NAME_PREFIX` | `String` | `thread_name_prefix` |

use crate::scheduler::Priority;
use std::time::Duration;
use thiserror::Error;

/// Environment variable name for the default cutoff.
pub const ENV_DEFAULT_CUTOFF: &str = "SPLITJOIN_DEFAULT_CUTOFF";
/// Environment variable name for the default priority.
pub const ENV_DEFAULT_PRIORITY: &str = "SPLITJOIN_DEFAULT_PRIORITY";
/// Environment variable name for the blocking-wait poll interval.
pub const ENV_POLL_INTERVAL_MS: &str = "SPLITJOIN_POLL_INTERVAL_MS";
/// Environment variable name for the thread name prefix.
pub const ENV_THREAD_NAME_PREFIX: &str = "SPLITJOIN_THREAD_NAME_PREFIX";

/// Default leaf size of the bundled algorithms.
pub const DEFAULT_CUTOFF: usize = 2048;
/// Default name prefix of threads spawned by [`ThreadScheduler`](crate::scheduler::ThreadScheduler).
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "splitjoin-worker";

/// Errors raised while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable or file field could not be parsed.
    #[error("invalid value for {name}: expected {expected}, got {value:?}")]
    InvalidValue {
        /// Variable or field name.
        name: String,
        /// What was expected.
        expected: &'static str,
        /// The raw value.
        value: String,
    },
    /// The cutoff must be at least one element.
    #[error("cutoff must be at least 1")]
    ZeroCutoff,
    /// The poll interval must be non-zero.
    #[error("poll interval must be non-zero")]
    ZeroPollInterval,
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML for this schema.
    #[cfg(feature = "config-file")]
    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<ConfigError> for crate::error::Error {
    fn from(err: ConfigError) -> Self {
        Self::invalid_config(err.to_string()).with_source(err)
    }
}

/// Engine-wide defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Leaf size used when an algorithm call does not set one.
    pub default_cutoff: usize,
    /// Priority of posted work when a call does not set one.
    pub default_priority: Priority,
    /// Slice used by blocking handles to re-check deadlines.
    pub poll_interval: Duration,
    /// Thread name prefix for the thread-per-job scheduler.
    pub thread_name_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_cutoff: DEFAULT_CUTOFF,
            default_priority: Priority::Normal,
            poll_interval: crate::cx::DEFAULT_POLL_INTERVAL,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_owned(),
        }
    }
}

impl EngineConfig {
    /// Checks invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_cutoff == 0 {
            return Err(ConfigError::ZeroCutoff);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}

/// Apply environment variable overrides to an [`EngineConfig`].
///
/// Only variables that are set in the environment are applied.
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut EngineConfig) -> Result<(), ConfigError> {
    if let Some(val) = read_env(ENV_DEFAULT_CUTOFF) {
        config.default_cutoff = parse_usize(ENV_DEFAULT_CUTOFF, &val)?;
    }
    if let Some(val) = read_env(ENV_DEFAULT_PRIORITY) {
        config.default_priority = parse_priority(ENV_DEFAULT_PRIORITY, &val)?;
    }
    if let Some(val) = read_env(ENV_POLL_INTERVAL_MS) {
        config.poll_interval = Duration::from_millis(parse_u64(ENV_POLL_INTERVAL_MS, &val)?);
    }
    if let Some(val) = read_env(ENV_THREAD_NAME_PREFIX) {
        config.thread_name_prefix = val;
    }
    Ok(())
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn invalid(name: &str, expected: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_owned(),
        expected,
        value: value.to_owned(),
    }
}

fn parse_usize(name: &str, val: &str) -> Result<usize, ConfigError> {
    val.trim()
        .parse::<usize>()
        .map_err(|_| invalid(name, "unsigned integer", val))
}

fn parse_u64(name: &str, val: &str) -> Result<u64, ConfigError> {
    val.trim()
        .parse::<u64>()
        .map_err(|_| invalid(name, "milliseconds as u64", val))
}

fn parse_priority(name: &str, val: &str) -> Result<Priority, ConfigError> {
    Priority::parse(val).ok_or_else(|| invalid(name, "low, normal or high", val))
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML-deserializable engine configuration.
///
/// ```toml
/// [engine]
/// default_cutoff = 4096
/// default_priority = "high"
/// poll_interval_ms = 5
/// thread_name_prefix = "sorter"
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct EngineTomlConfig {
    /// Engine settings.
    #[serde(default)]
    pub engine: EngineToml,
}

/// Engine section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct EngineToml {
    /// Default cutoff.
    pub default_cutoff: Option<usize>,
    /// Default priority name.
    pub default_priority: Option<String>,
    /// Poll interval in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Thread name prefix.
    pub thread_name_prefix: Option<String>,
}

/// Apply a parsed TOML config to an [`EngineConfig`].
///
/// Only fields that are `Some` in the TOML struct override the config.
#[cfg(feature = "config-file")]
pub fn apply_toml_config(config: &mut EngineConfig, toml: &EngineTomlConfig) -> Result<(), ConfigError> {
    if let Some(v) = toml.engine.default_cutoff {
        config.default_cutoff = v;
    }
    if let Some(ref v) = toml.engine.default_priority {
        config.default_priority = parse_priority("engine.default_priority", v)?;
    }
    if let Some(v) = toml.engine.poll_interval_ms {
        config.poll_interval = Duration::from_millis(v);
    }
    if let Some(ref v) = toml.engine.thread_name_prefix {
        config.thread_name_prefix.clone_from(v);
    }
    Ok(())
}

/// Parse a TOML string into an [`EngineTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_str(toml_str: &str) -> Result<EngineTomlConfig, ConfigError> {
    Ok(toml::from_str(toml_str)?)
}

/// Read and parse a TOML file into an [`EngineTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_file(path: &std::path::Path) -> Result<EngineTomlConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_toml_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_envs<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = crate::test_utils::env_lock();
        clean_env_locked();
        for (k, v) in vars {
            std::env::set_var(k, v);
        }
        let result = f();
        clean_env_locked();
        result
    }

    fn clean_env_locked() {
        for var in &[
            ENV_DEFAULT_CUTOFF,
            ENV_DEFAULT_PRIORITY,
            ENV_POLL_INTERVAL_MS,
            ENV_THREAD_NAME_PREFIX,
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.default_cutoff, 2048);
        assert_eq!(config.default_priority, Priority::Normal);
        assert_eq!(config.thread_name_prefix, "splitjoin-worker");
        config.validate().unwrap();
    }

    #[test]
    fn zero_cutoff_rejected() {
        let config = EngineConfig {
            default_cutoff: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroCutoff)));
    }

    #[test]
    fn env_overrides_apply() {
        let config = with_envs(
            &[
                (ENV_DEFAULT_CUTOFF, " 64 "),
                (ENV_DEFAULT_PRIORITY, "HIGH"),
                (ENV_POLL_INTERVAL_MS, "3"),
                (ENV_THREAD_NAME_PREFIX, "sorter"),
            ],
            || {
                let mut config = EngineConfig::default();
                apply_env_overrides(&mut config).unwrap();
                config
            },
        );
        assert_eq!(config.default_cutoff, 64);
        assert_eq!(config.default_priority, Priority::High);
        assert_eq!(config.poll_interval, Duration::from_millis(3));
        assert_eq!(config.thread_name_prefix, "sorter");
    }

    #[test]
    fn env_garbage_is_reported() {
        let err = with_envs(&[(ENV_DEFAULT_CUTOFF, "lots")], || {
            apply_env_overrides(&mut EngineConfig::default()).unwrap_err()
        });
        let msg = err.to_string();
        assert!(msg.contains(ENV_DEFAULT_CUTOFF), "{msg}");
        assert!(msg.contains("lots"), "{msg}");

        let err = with_envs(&[(ENV_DEFAULT_PRIORITY, "urgent")], || {
            apply_env_overrides(&mut EngineConfig::default()).unwrap_err()
        });
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn unset_env_leaves_config_alone() {
        let config = with_envs(&[], || {
            let mut config = EngineConfig::default();
            apply_env_overrides(&mut config).unwrap();
            config
        });
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn config_error_converts_to_engine_error() {
        let err: crate::error::Error = ConfigError::ZeroCutoff.into();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidConfig);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_overrides_apply() {
        let parsed = parse_toml_str(
            r#"
            [engine]
            default_cutoff = 128
            default_priority = "low"
            "#,
        )
        .unwrap();
        let mut config = EngineConfig::default();
        apply_toml_config(&mut config, &parsed).unwrap();
        assert_eq!(config.default_cutoff, 128);
        assert_eq!(config.default_priority, Priority::Low);
        assert_eq!(config.poll_interval, crate::cx::DEFAULT_POLL_INTERVAL);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_syntax_error_is_reported() {
        assert!(matches!(parse_toml_str("[engine"), Err(ConfigError::Toml(_))));
    }
}
