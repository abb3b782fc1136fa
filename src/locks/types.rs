//! Lock state, options, and information structures.

use super::metadata::LockMetadata;
use crate::config::TimeoutPolicy;
use crate::coordination::{ServiceError, ServiceResult};
use serde::Serialize;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Where a handle is in its acquisition lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// No request node.
    Idle,
    /// Request node being created.
    Requested,
    /// Queued behind a predecessor, watching it.
    Waiting,
    /// This handle's node is first in line.
    Holding,
    /// The last attempt ran out of time. The node is kept only under
    /// [`TimeoutPolicy::RemainQueued`].
    TimedOut,
    /// Unlocked.
    Released,
    /// The last attempt failed and its request node could not be withdrawn
    /// (the connection was down). The node is kept: the next attempt resumes
    /// on it and `unlock` withdraws it.
    Interrupted,
}

impl LockState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockState::Idle => "idle",
            LockState::Requested => "requested",
            LockState::Waiting => "waiting",
            LockState::Holding => "holding",
            LockState::TimedOut => "timed_out",
            LockState::Released => "released",
            LockState::Interrupted => "interrupted",
        }
    }
}

impl std::fmt::Display for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of rank resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rank {
    /// The node has the lowest sequence number among live siblings.
    Holder,
    /// Someone is ahead; `predecessor` is the node immediately in front.
    Waiting {
        predecessor: String,
        /// Zero-based queue position of this node.
        position: usize,
    },
}

/// What `unlock` actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The held lock was released; the successor (if any) was notified.
    Released,
    /// A queued, not-yet-held request was removed.
    Withdrawn,
    /// The request node was already gone (session expired or external delete).
    AlreadyLost,
    /// The handle had no request node.
    NotHeld,
}

/// Retry behaviour for operations interrupted by a lost connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub max_retries: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Run `op`, retrying retryable failures up to `max_retries` times.
    pub fn run<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(what, attempt, max_retries = self.max_retries, "retrying after: {}", e);
                    thread::sleep(self.backoff);
                }
                other => return other,
            }
        }
    }

    /// Whether another attempt is allowed after `attempts` retries of `err`.
    pub fn allows(&self, err: &ServiceError, attempts: u32) -> bool {
        err.is_retryable() && attempts < self.max_retries
    }
}

/// Per-handle options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    /// Namespace path holding one subtree per lock name.
    pub root: String,
    /// Bound for [`LockHandle::lock`](super::LockHandle::lock); `None` waits forever.
    pub acquire_timeout: Option<Duration>,
    /// What to do with the request node on timeout.
    pub on_timeout: TimeoutPolicy,
    /// Retry behaviour for lost connections.
    pub retry: RetryPolicy,
    /// Recorded in the request node's metadata.
    pub purpose: String,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            root: "/locks".to_string(),
            acquire_timeout: None,
            on_timeout: TimeoutPolicy::default(),
            retry: RetryPolicy::default(),
            purpose: "lock".to_string(),
        }
    }
}

/// A queued request as seen in a queue listing.
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    /// Node name (last path component).
    pub name: String,

    /// Full node path.
    pub path: String,

    /// Service-assigned sequence number.
    pub sequence: u64,

    /// Zero-based position in the queue; 0 is the holder.
    pub position: usize,

    /// Payload metadata, if it could be read and parsed.
    pub metadata: Option<LockMetadata>,
}

impl Participant {
    pub fn is_holder(&self) -> bool {
        self.position == 0
    }
}

impl std::fmt::Display for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let role = if self.is_holder() { "holder" } else { "waiting" };
        match &self.metadata {
            Some(meta) => write!(
                f,
                "#{} {} (owner: {}, age: {}, purpose: {}, {})",
                self.sequence,
                self.name,
                meta.owner,
                meta.age_string(),
                meta.purpose,
                role
            ),
            None => write!(f, "#{} {} ({})", self.sequence, self.name, role),
        }
    }
}
