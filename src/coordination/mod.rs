//! Client contract for the coordination service.
//!
//! The lock algorithm only ever talks to the service through [`Coordinator`]:
//! a hierarchical namespace with atomic create/delete, ephemeral nodes bound to
//! the client session, service-assigned sequence suffixes, and one-shot
//! existence watches.
//!
//! Two backends implement it:
//! - [`memory`]: an in-process service, used by tests and the `demo` command
//! - `zookeeper` (cargo feature `zookeeper`): Apache ZooKeeper via the
//!   `zookeeper` crate

mod error;
pub mod memory;
pub mod paths;
#[cfg(feature = "zookeeper")]
pub mod zookeeper;

pub use error::{ServiceError, ServiceResult};

/// How a node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Survives the creating session.
    Persistent,
    /// Removed automatically when the creating session ends.
    Ephemeral,
    /// Persistent, with a service-assigned sequence suffix.
    PersistentSequential,
    /// Ephemeral, with a service-assigned sequence suffix.
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(&self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// Metadata the service keeps per node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStat {
    /// Data version, bumped on every data change.
    pub version: i32,
    /// Owning session for ephemeral nodes.
    pub ephemeral_owner: Option<u64>,
    /// Number of direct children.
    pub num_children: usize,
}

/// What a watch observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NodeCreated,
    NodeDeleted,
    /// The watching session ended before the node changed.
    SessionEnded,
}

/// Notification delivered to a watcher, exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEvent {
    pub kind: EventKind,
    pub path: String,
}

/// One-shot watch callback. Runs on a service-managed thread.
pub type Watcher = Box<dyn FnOnce(WatchedEvent) + Send + 'static>;

/// Operations a coordination-service session must provide.
///
/// Implementations are shared across threads: the acquiring thread issues
/// requests while watch callbacks are delivered elsewhere.
pub trait Coordinator: Send + Sync {
    /// Stat of the node at `path`, or `None` if absent.
    fn exists(&self, path: &str) -> ServiceResult<Option<NodeStat>>;

    /// Like [`Coordinator::exists`], and atomically arms a one-shot watch that
    /// fires when the node is created or deleted.
    fn exists_watch(&self, path: &str, watcher: Watcher) -> ServiceResult<Option<NodeStat>>;

    /// Create a node and return its actual path (which carries the sequence
    /// suffix for sequential modes).
    fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode) -> ServiceResult<String>;

    /// Discard this session's pending watches on `path` without firing them.
    fn cancel_watches(&self, path: &str) -> ServiceResult<()>;

    /// Names (not paths) of the direct children of `path`, in no particular order.
    fn children(&self, path: &str) -> ServiceResult<Vec<String>>;

    /// Data stored at `path`.
    fn data(&self, path: &str) -> ServiceResult<Vec<u8>>;

    /// Delete the node; `version` of `None` matches any version.
    fn delete(&self, path: &str, version: Option<i32>) -> ServiceResult<()>;

    /// End the session, dropping its ephemeral nodes.
    fn close(&self) -> ServiceResult<()>;
}
