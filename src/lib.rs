//! queuelock: a fair distributed mutex built on a coordination service.
//!
//! Participants queue by creating ephemeral, sequential request nodes under a
//! per-lock subtree. The lowest sequence number holds the lock, each waiter
//! watches only the node immediately in front of it, and a crashed holder
//! releases the lock when its session ends.
//!
//! ```no_run
//! use queuelock::{LockConfig, LockHandle, Session};
//!
//! # fn main() -> queuelock::Result<()> {
//! let config = LockConfig::default();
//! let session = Session::connect(&config);
//! let mut handle = LockHandle::with_options(session, "orders", config.lock_options());
//! let guard = handle.acquire()?;
//! // critical section
//! guard.release()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordination;
pub mod error;
pub mod exit_codes;
pub mod locks;
pub mod session;

#[cfg(test)]
mod test_support;

pub use config::{LockConfig, TimeoutPolicy};
pub use error::{LockError, Result};
pub use locks::{LockGuard, LockHandle, LockOptions, LockState, ReleaseOutcome};
pub use session::{Session, SessionState};
