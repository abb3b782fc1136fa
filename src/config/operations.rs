//! Config loading, validation, and conversion into lock options.

use super::model::LockConfig;
use crate::coordination::paths;
use crate::error::{LockError, Result};
use crate::locks::{LockOptions, RetryPolicy};
use std::path::Path;
use std::time::Duration;

impl LockConfig {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Returns
    ///
    /// * `Ok(LockConfig)` - Successfully loaded and validated config
    /// * `Err(LockError::Config)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            LockError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to an all-defaults map.
        let config: LockConfig = if yaml.trim().is_empty() {
            LockConfig::default()
        } else {
            serde_yaml::from_str(yaml)
                .map_err(|e| LockError::Config(format!("failed to parse config YAML: {}", e)))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| LockError::Config(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `endpoint` must be non-empty
    /// - `session_timeout_ms` must be positive
    /// - `root` must be an absolute namespace path other than `/`
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(LockError::Config(
                "config validation failed: endpoint must not be empty".to_string(),
            ));
        }

        if self.session_timeout_ms == 0 {
            return Err(LockError::Config(
                "config validation failed: session_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.root == "/" {
            return Err(LockError::Config(
                "config validation failed: root must not be the namespace root '/'".to_string(),
            ));
        }
        paths::validate(&self.root).map_err(|e| {
            LockError::Config(format!("config validation failed: root: {}", e))
        })?;

        Ok(())
    }

    /// Session timeout as a Duration.
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    /// Acquisition timeout as a Duration, if one is configured.
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    /// Retry policy derived from the `retry` section.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            backoff: Duration::from_millis(self.retry.backoff_ms),
        }
    }

    /// Per-handle lock options derived from this config.
    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            root: self.root.clone(),
            acquire_timeout: self.acquire_timeout(),
            on_timeout: self.on_timeout,
            retry: self.retry_policy(),
            ..LockOptions::default()
        }
    }
}
