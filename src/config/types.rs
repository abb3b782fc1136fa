//! Configuration types and defaults for queuelock.
//!
//! This module defines enums, nested sections, and default value functions
//! used by the LockConfig struct.

use serde::{Deserialize, Serialize};

/// What happens to a queued request node when an acquisition times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Delete the request node so the queue does not carry a dead entry (default).
    #[default]
    Withdraw,
    /// Keep the request node; a later attempt on the same handle resumes from
    /// the same queue position.
    RemainQueued,
}

/// Retry settings for operations that fail with a lost connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts after the first failure (0 disables retrying).
    pub max_retries: u32,

    /// Pause between attempts, in milliseconds.
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: default_backoff_ms(),
        }
    }
}

// Default value functions for serde
pub(crate) fn default_endpoint() -> String {
    "127.0.0.1:2181".to_string()
}
pub(crate) fn default_root() -> String {
    "/locks".to_string()
}
pub(crate) fn default_session_timeout_ms() -> u64 {
    30_000
}
pub(crate) fn default_backoff_ms() -> u64 {
    100
}
