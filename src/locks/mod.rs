//! Fair distributed mutex over a coordination service.
//!
//! # Algorithm
//!
//! Every participant queues by creating an ephemeral, sequential request node
//! under the lock's subtree (`<root>/<lock name>`). The node with the lowest
//! sequence number holds the lock. Everyone else watches only the node
//! immediately in front of it, so a release wakes exactly one successor and
//! grants are handed out in request order.
//!
//! A woken waiter always re-lists the queue: its predecessor may have
//! withdrawn or lost its session while still waiting itself, in which case
//! the waiter moves its watch to the new predecessor and keeps waiting.
//!
//! Because request nodes are ephemeral, a crashed or partitioned holder
//! releases the lock when its session ends.
//!
//! # Request Nodes
//!
//! Node names are `_c_<uuid>-lock-<sequence>`. The per-handle prefix lets a
//! handle find its own node again when a create is interrupted by a lost
//! connection. Each node carries JSON metadata:
//! - `owner`: who queued the request (e.g., `user@HOST`)
//! - `pid`: the process ID
//! - `created_at`: RFC3339 timestamp
//! - `purpose`: free-form description
//!
//! # RAII Guards
//!
//! [`LockHandle::acquire`] returns a [`LockGuard`] that releases the lock when
//! dropped. If the release fails during drop, a warning is logged but the
//! program does not crash.

mod guard;
mod handle;
mod metadata;
mod name;
mod node;
mod rank;
mod signal;
mod types;

#[cfg(test)]
mod tests;

// Re-export public API
pub use guard::LockGuard;
pub use handle::LockHandle;
pub use metadata::LockMetadata;
pub use name::{LOCK_NODE_NAME, RESERVED_NAMES, sequence_of, validate_lock_name};
pub use rank::{list_participants, queue};
pub use types::{LockOptions, LockState, Participant, Rank, ReleaseOutcome, RetryPolicy};
