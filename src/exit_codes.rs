//! Exit code constants for the queuelock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config or lock name)
//! - 2: Could not connect to the coordination service
//! - 3: Session failed mid-operation
//! - 4: Lock acquisition timed out

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid configuration, or misuse of a handle.
pub const USER_ERROR: i32 = 1;

/// The coordination service could not be reached when opening the session.
pub const CONNECTION_FAILURE: i32 = 2;

/// The session died or the service rejected an operation mid-flight.
pub const SESSION_FAILURE: i32 = 3;

/// The acquisition timeout elapsed before this participant became the holder.
pub const LOCK_TIMEOUT: i32 = 4;
