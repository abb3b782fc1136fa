//! Errors reported by coordination-service backends.

use thiserror::Error;

/// Failure of a single coordination-service operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The node (or its parent, for creates) does not exist.
    #[error("node '{0}' does not exist")]
    NoNode(String),

    /// A node with this exact path already exists.
    #[error("node '{0}' already exists")]
    NodeExists(String),

    /// The node still has children and cannot be deleted.
    #[error("node '{0}' has children")]
    NotEmpty(String),

    /// The expected version did not match the node's current version.
    #[error("version mismatch on node '{0}'")]
    BadVersion(String),

    /// The connection dropped; the outcome of the operation is unknown.
    #[error("connection to the coordination service was lost")]
    ConnectionLoss,

    /// The session expired; its ephemeral nodes are gone.
    #[error("session expired")]
    SessionExpired,

    /// The session was closed by its owner.
    #[error("session is closed")]
    Closed,

    /// Anything else the backend reports.
    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    /// Errors after which the session cannot be assumed to be usable.
    pub fn is_session_class(&self) -> bool {
        matches!(
            self,
            ServiceError::ConnectionLoss | ServiceError::SessionExpired | ServiceError::Closed
        )
    }

    /// Errors worth retrying under a retry policy. Only a lost connection
    /// qualifies; an expired session has already dropped its nodes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::ConnectionLoss)
    }
}

/// Result type alias for backend operations.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
