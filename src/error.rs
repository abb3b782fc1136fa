//! Error types for queuelock.
//!
//! Uses thiserror for derive macros. Every failure of the coordination service
//! reaches the caller as a typed [`LockError`]; the only swallowed case is
//! deleting a request node that is already gone, which the lock layer reports
//! as a release outcome instead.

use crate::coordination::ServiceError;
use crate::exit_codes;
use std::time::Duration;
use thiserror::Error;

/// Main error type for lock operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The session could not be established. Captured at construction and
    /// surfaced on the first lock attempt.
    #[error("could not connect to coordination service at '{endpoint}': {reason}")]
    Connection { endpoint: String, reason: String },

    /// The session died (or was closed) while an operation was in flight.
    #[error("coordination session failed: {0}")]
    Session(String),

    /// The acquisition timeout elapsed before this handle became the holder.
    #[error("timed out after {waited:?} waiting for lock '{lock}'")]
    Timeout { lock: String, waited: Duration },

    /// The lock name cannot be used as a node in the coordination namespace.
    #[error("invalid lock name '{name}': {reason}")]
    InvalidLockName { name: String, reason: String },

    /// The handle already holds the lock or is still queued for it.
    #[error("lock '{0}' is already held or queued by this handle")]
    AlreadyAcquired(String),

    /// Configuration could not be read or failed validation.
    #[error("{0}")]
    Config(String),

    /// The service rejected an operation for a reason other than session loss.
    #[error("coordination service error: {0}")]
    Service(ServiceError),
}

impl LockError {
    /// Returns the CLI exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LockError::Connection { .. } => exit_codes::CONNECTION_FAILURE,
            LockError::Session(_) | LockError::Service(_) => exit_codes::SESSION_FAILURE,
            LockError::Timeout { .. } => exit_codes::LOCK_TIMEOUT,
            LockError::InvalidLockName { .. }
            | LockError::AlreadyAcquired(_)
            | LockError::Config(_) => exit_codes::USER_ERROR,
        }
    }
}

impl From<ServiceError> for LockError {
    fn from(err: ServiceError) -> Self {
        if err.is_session_class() {
            LockError::Session(err.to_string())
        } else {
            LockError::Service(err)
        }
    }
}

/// Result type alias for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;
