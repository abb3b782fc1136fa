use crate::coordination::memory::{MemoryService, MemorySession};
use crate::locks::{LockHandle, LockOptions};
use crate::session::Session;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// An in-process service plus helpers for opening sessions and handles on it.
pub(crate) struct TestCluster {
    pub(crate) service: MemoryService,
}

impl TestCluster {
    pub(crate) fn new() -> Self {
        Self {
            service: MemoryService::new(),
        }
    }

    /// A fresh session on the cluster.
    pub(crate) fn session(&self) -> Arc<Session> {
        self.session_with_id().0
    }

    /// A fresh session together with its service-side id, for expiring it.
    pub(crate) fn session_with_id(&self) -> (Arc<Session>, u64) {
        let client: MemorySession = self.service.connect().unwrap();
        let id = client.id();
        (Session::with_client("memory://test", Arc::new(client)), id)
    }

    /// A handle on its own session with default options.
    pub(crate) fn handle(&self, lock_name: &str) -> LockHandle {
        LockHandle::new(self.session(), lock_name)
    }

    pub(crate) fn handle_with(&self, lock_name: &str, options: LockOptions) -> LockHandle {
        LockHandle::with_options(self.session(), lock_name, options)
    }

    /// Child names of `path` in sequence order.
    pub(crate) fn queue(&self, path: &str) -> Vec<String> {
        let mut children = self.service.children_of(path);
        children.sort_by_key(|name| crate::locks::sequence_of(name));
        children
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
