//! RAII lock guard implementation.

use super::handle::LockHandle;
use super::types::ReleaseOutcome;
use crate::error::Result;
use tracing::warn;

/// RAII guard for a held lock.
///
/// When dropped, the lock is released through its handle.
/// If the release fails, a warning is logged but no panic occurs.
#[derive(Debug)]
pub struct LockGuard<'a> {
    handle: &'a mut LockHandle,

    /// Whether the lock has been released manually.
    released: bool,
}

impl<'a> LockGuard<'a> {
    pub(super) fn new(handle: &'a mut LockHandle) -> Self {
        Self {
            handle,
            released: false,
        }
    }

    /// Path of the request node backing the lock.
    pub fn node_path(&self) -> Option<&str> {
        self.handle.node_path()
    }

    pub fn lock_name(&self) -> &str {
        self.handle.lock_name()
    }

    pub fn handle(&self) -> &LockHandle {
        self.handle
    }

    /// Manually release the lock.
    ///
    /// Useful to release before the guard goes out of scope and see what
    /// happened (for instance [`ReleaseOutcome::AlreadyLost`] after the
    /// session expired).
    pub fn release(mut self) -> Result<ReleaseOutcome> {
        self.released = true;
        self.handle.unlock()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.handle.unlock()
        {
            warn!(lock = %self.handle.lock_name(), error = %e, "failed to release lock");
        }
    }
}
