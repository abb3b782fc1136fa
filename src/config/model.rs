//! LockConfig struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for connecting to the coordination service and acquiring locks.
///
/// This struct represents the contents of a `queuelock.yaml` file.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    // =========================================================================
    // Session settings
    // =========================================================================
    /// Coordination service endpoint.
    ///
    /// `host:port[,host:port...]` for ZooKeeper, or `memory://<name>` for the
    /// in-process service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Session timeout in milliseconds. Ephemeral request nodes disappear this
    /// long after the client stops heartbeating.
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Retry behaviour for operations interrupted by a lost connection.
    #[serde(default)]
    pub retry: RetryConfig,

    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Namespace path under which one subtree per lock name is kept.
    #[serde(default = "default_root")]
    pub root: String,

    /// Upper bound for `lock()` in milliseconds. Unset waits without limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquire_timeout_ms: Option<u64>,

    /// What to do with the request node when an acquisition times out.
    #[serde(default)]
    pub on_timeout: TimeoutPolicy,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            session_timeout_ms: default_session_timeout_ms(),
            retry: RetryConfig::default(),
            root: default_root(),
            acquire_timeout_ms: None,
            on_timeout: TimeoutPolicy::default(),
        }
    }
}
