//! Configuration model for queuelock.
//!
//! This module defines the LockConfig struct that represents `queuelock.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for optional fields, and validation of config values.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::LockConfig;
pub use types::{RetryConfig, TimeoutPolicy};
