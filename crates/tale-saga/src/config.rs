use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Retry budget used when the configuration does not set `max_retries`.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Retry settings applied by [`RetryStep::from_config`](crate::RetryStep::from_config).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    max_retries: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(max_retries: usize) -> Self {
        Self { max_retries }
    }

    #[must_use]
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }
}

/// Saga settings, usually kept in a TOML file next to the caller's own config.
///
/// ```toml
/// [retry]
/// max_retries = 5
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SagaConfig {
    retry: RetryConfig,
}

impl SagaConfig {
    /// Parse settings from TOML; missing keys fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if its content is invalid.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    #[must_use]
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }
}
