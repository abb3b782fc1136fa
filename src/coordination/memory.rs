//! In-process coordination service.
//!
//! [`MemoryService`] keeps a hierarchical namespace behind a mutex and hands
//! out [`MemorySession`]s that implement [`Coordinator`]. It honours the parts
//! of the contract the lock relies on:
//!
//! - per-parent sequence counters rendered as 10-digit zero-padded suffixes
//! - ephemeral nodes removed when their session closes or expires
//! - one-shot existence watches, delivered once on a dedicated dispatcher
//!   thread, in the order they fired
//!
//! It also exposes fault injection (`set_available`, `expire_session`,
//! `lose_connection_after_creates`) and watch counters for instrumentation.
//!
//! Services can be shared by name through [`MemoryService::named`], which is
//! how `memory://<name>` endpoints resolve.

use super::paths;
use super::{
    Coordinator, CreateMode, EventKind, NodeStat, ServiceError, ServiceResult, WatchedEvent,
    Watcher,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use std::thread;
use tracing::{debug, error, trace};

static REGISTRY: LazyLock<Mutex<HashMap<String, MemoryService>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Counters of watch activity across the whole service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    /// Watches armed through `exists_watch`.
    pub armed: u64,
    /// Watches that fired (node created/deleted or session ended).
    pub fired: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionStatus {
    Live,
    Expired,
    Closed,
}

struct Node {
    data: Vec<u8>,
    version: i32,
    ephemeral_owner: Option<u64>,
    next_sequence: u64,
}

impl Node {
    fn new(data: Vec<u8>, ephemeral_owner: Option<u64>) -> Self {
        Self {
            data,
            version: 0,
            ephemeral_owner,
            next_sequence: 0,
        }
    }
}

struct ArmedWatch {
    session: u64,
    watcher: Watcher,
}

type Delivery = (Watcher, WatchedEvent);

struct Namespace {
    nodes: BTreeMap<String, Node>,
    watches: HashMap<String, Vec<ArmedWatch>>,
    sessions: HashMap<u64, SessionStatus>,
    next_session: u64,
    available: bool,
    lose_connection_after_creates: u32,
    stats: WatchStats,
    deliveries: Sender<Delivery>,
}

impl Namespace {
    fn check_session(&self, session: u64) -> ServiceResult<()> {
        if !self.available {
            return Err(ServiceError::ConnectionLoss);
        }
        match self.sessions.get(&session) {
            Some(SessionStatus::Live) => Ok(()),
            Some(SessionStatus::Closed) => Err(ServiceError::Closed),
            Some(SessionStatus::Expired) | None => Err(ServiceError::SessionExpired),
        }
    }

    fn child_names(&self, parent: &str) -> Vec<String> {
        let prefix = if parent == "/" {
            "/".to_string()
        } else {
            format!("{}/", parent)
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, _)| {
                let rest = &path[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect()
    }

    fn stat(&self, path: &str) -> Option<NodeStat> {
        let node = self.nodes.get(path)?;
        Some(NodeStat {
            version: node.version,
            ephemeral_owner: node.ephemeral_owner,
            num_children: self.child_names(path).len(),
        })
    }

    fn fire(&mut self, path: &str, kind: EventKind) {
        let Some(armed) = self.watches.remove(path) else {
            return;
        };
        for watch in armed {
            self.stats.fired += 1;
            trace!(path, ?kind, session = watch.session, "watch fired");
            let event = WatchedEvent {
                kind,
                path: path.to_string(),
            };
            // The dispatcher only stops once every sender is gone.
            let _ = self.deliveries.send((watch.watcher, event));
        }
    }

    fn create(
        &mut self,
        owner: Option<u64>,
        path: &str,
        data: Vec<u8>,
        mode: CreateMode,
    ) -> ServiceResult<String> {
        paths::validate(path)?;
        let parent_path = paths::parent(path)
            .ok_or_else(|| ServiceError::NodeExists(path.to_string()))?
            .to_string();
        let parent = self
            .nodes
            .get_mut(&parent_path)
            .ok_or_else(|| ServiceError::NoNode(parent_path.clone()))?;
        if parent.ephemeral_owner.is_some() {
            return Err(ServiceError::Other(format!(
                "ephemeral node '{}' cannot have children",
                parent_path
            )));
        }

        let actual = if mode.is_sequential() {
            let sequence = parent.next_sequence;
            parent.next_sequence += 1;
            format!("{}{:010}", path, sequence)
        } else {
            path.to_string()
        };
        if self.nodes.contains_key(&actual) {
            return Err(ServiceError::NodeExists(actual));
        }

        let ephemeral_owner = if mode.is_ephemeral() { owner } else { None };
        self.nodes
            .insert(actual.clone(), Node::new(data, ephemeral_owner));
        self.fire(&actual, EventKind::NodeCreated);
        Ok(actual)
    }

    fn delete(&mut self, path: &str, version: Option<i32>) -> ServiceResult<()> {
        paths::validate(path)?;
        if path == "/" {
            return Err(ServiceError::Other("the root node cannot be deleted".to_string()));
        }
        let node = self
            .nodes
            .get(path)
            .ok_or_else(|| ServiceError::NoNode(path.to_string()))?;
        if let Some(expected) = version
            && expected != node.version
        {
            return Err(ServiceError::BadVersion(path.to_string()));
        }
        if !self.child_names(path).is_empty() {
            return Err(ServiceError::NotEmpty(path.to_string()));
        }
        self.nodes.remove(path);
        self.fire(path, EventKind::NodeDeleted);
        Ok(())
    }

    fn end_session(&mut self, session: u64, status: SessionStatus) {
        match self.sessions.get(&session) {
            Some(SessionStatus::Live) => {}
            _ => return,
        }
        self.sessions.insert(session, status);

        // Watches the dead session was still waiting on are released first so
        // their owners wake up and notice the failure.
        let mut orphaned = Vec::new();
        for (path, armed) in self.watches.iter_mut() {
            let (mine, rest): (Vec<_>, Vec<_>) =
                armed.drain(..).partition(|w| w.session == session);
            *armed = rest;
            orphaned.extend(mine.into_iter().map(|w| (path.clone(), w)));
        }
        self.watches.retain(|_, armed| !armed.is_empty());
        for (path, watch) in orphaned {
            self.stats.fired += 1;
            let event = WatchedEvent {
                kind: EventKind::SessionEnded,
                path,
            };
            let _ = self.deliveries.send((watch.watcher, event));
        }

        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == Some(session))
            .map(|(path, _)| path.clone())
            .collect();
        for path in owned {
            self.nodes.remove(&path);
            self.fire(&path, EventKind::NodeDeleted);
        }
        debug!(session, ?status, "memory session ended");
    }
}

/// Handle to an in-process coordination service. Clones share the namespace.
#[derive(Clone)]
pub struct MemoryService {
    inner: Arc<Mutex<Namespace>>,
}

impl std::fmt::Debug for MemoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryService").finish_non_exhaustive()
    }
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryService {
    /// Start an empty service (only the root node `/` exists).
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<Delivery>();
        let spawned = thread::Builder::new()
            .name("memory-watch-dispatch".to_string())
            .spawn(move || {
                for (watcher, event) in rx {
                    watcher(event);
                }
            });
        if let Err(e) = spawned {
            error!("failed to spawn watch dispatcher: {}", e);
        }

        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::new(Vec::new(), None));

        Self {
            inner: Arc::new(Mutex::new(Namespace {
                nodes,
                watches: HashMap::new(),
                sessions: HashMap::new(),
                next_session: 1,
                available: true,
                lose_connection_after_creates: 0,
                stats: WatchStats::default(),
                deliveries: tx,
            })),
        }
    }

    /// Shared service registered under `name`, created on first use.
    pub fn named(name: &str) -> Self {
        let mut registry = REGISTRY.lock().unwrap_or_else(|p| p.into_inner());
        registry.entry(name.to_string()).or_default().clone()
    }

    /// Drop the registry entry for `name`. Existing handles keep working.
    pub fn forget(name: &str) {
        let mut registry = REGISTRY.lock().unwrap_or_else(|p| p.into_inner());
        registry.remove(name);
    }

    fn namespace(&self) -> MutexGuard<'_, Namespace> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Open a new session.
    pub fn connect(&self) -> ServiceResult<MemorySession> {
        let mut ns = self.namespace();
        if !ns.available {
            return Err(ServiceError::ConnectionLoss);
        }
        let id = ns.next_session;
        ns.next_session += 1;
        ns.sessions.insert(id, SessionStatus::Live);
        debug!(session = id, "memory session opened");
        Ok(MemorySession {
            service: self.clone(),
            id,
        })
    }

    /// Expire a session as if its heartbeats had stopped.
    pub fn expire_session(&self, session: u64) {
        self.namespace().end_session(session, SessionStatus::Expired);
    }

    /// Simulate the service becoming unreachable (or reachable again).
    pub fn set_available(&self, available: bool) {
        self.namespace().available = available;
    }

    /// Make the next `count` creates succeed on the service but report a lost
    /// connection to the caller.
    pub fn lose_connection_after_creates(&self, count: u32) {
        self.namespace().lose_connection_after_creates = count;
    }

    /// Delete a node out-of-band, as an operator would.
    pub fn delete_node(&self, path: &str) -> ServiceResult<()> {
        self.namespace().delete(path, None)
    }

    /// Whether a node exists, without going through a session.
    pub fn contains(&self, path: &str) -> bool {
        self.namespace().nodes.contains_key(path)
    }

    /// Child names of `path`, sorted lexically.
    pub fn children_of(&self, path: &str) -> Vec<String> {
        self.namespace().child_names(path)
    }

    /// Number of watches currently armed on `path`.
    pub fn watch_count(&self, path: &str) -> usize {
        self.namespace().watches.get(path).map_or(0, Vec::len)
    }

    /// Watch counters since the service started.
    pub fn stats(&self) -> WatchStats {
        self.namespace().stats
    }
}

/// A session on a [`MemoryService`].
pub struct MemorySession {
    service: MemoryService,
    id: u64,
}

impl std::fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySession").field("id", &self.id).finish()
    }
}

impl MemorySession {
    /// Session id, usable with [`MemoryService::expire_session`].
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn service(&self) -> &MemoryService {
        &self.service
    }
}

impl Coordinator for MemorySession {
    fn exists(&self, path: &str) -> ServiceResult<Option<NodeStat>> {
        let ns = self.service.namespace();
        ns.check_session(self.id)?;
        paths::validate(path)?;
        Ok(ns.stat(path))
    }

    fn exists_watch(&self, path: &str, watcher: Watcher) -> ServiceResult<Option<NodeStat>> {
        let mut ns = self.service.namespace();
        ns.check_session(self.id)?;
        paths::validate(path)?;
        ns.stats.armed += 1;
        ns.watches
            .entry(path.to_string())
            .or_default()
            .push(ArmedWatch {
                session: self.id,
                watcher,
            });
        Ok(ns.stat(path))
    }

    fn cancel_watches(&self, path: &str) -> ServiceResult<()> {
        let mut ns = self.service.namespace();
        ns.check_session(self.id)?;
        let Some(armed) = ns.watches.get_mut(path) else {
            return Ok(());
        };
        armed.retain(|watch| watch.session != self.id);
        if armed.is_empty() {
            ns.watches.remove(path);
        }
        Ok(())
    }

    fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode) -> ServiceResult<String> {
        let mut ns = self.service.namespace();
        ns.check_session(self.id)?;
        let actual = ns.create(Some(self.id), path, data, mode)?;
        if ns.lose_connection_after_creates > 0 {
            ns.lose_connection_after_creates -= 1;
            debug!(path = %actual, "dropping create response");
            return Err(ServiceError::ConnectionLoss);
        }
        Ok(actual)
    }

    fn children(&self, path: &str) -> ServiceResult<Vec<String>> {
        let ns = self.service.namespace();
        ns.check_session(self.id)?;
        paths::validate(path)?;
        if !ns.nodes.contains_key(path) {
            return Err(ServiceError::NoNode(path.to_string()));
        }
        Ok(ns.child_names(path))
    }

    fn data(&self, path: &str) -> ServiceResult<Vec<u8>> {
        let ns = self.service.namespace();
        ns.check_session(self.id)?;
        ns.nodes
            .get(path)
            .map(|node| node.data.clone())
            .ok_or_else(|| ServiceError::NoNode(path.to_string()))
    }

    fn delete(&self, path: &str, version: Option<i32>) -> ServiceResult<()> {
        let mut ns = self.service.namespace();
        ns.check_session(self.id)?;
        ns.delete(path, version)
    }

    fn close(&self) -> ServiceResult<()> {
        let mut ns = self.service.namespace();
        match ns.sessions.get(&self.id) {
            Some(SessionStatus::Live) => {
                ns.end_session(self.id, SessionStatus::Closed);
                Ok(())
            }
            Some(SessionStatus::Closed) => Ok(()),
            _ => Err(ServiceError::SessionExpired),
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        let mut ns = self.service.namespace();
        ns.end_session(self.id, SessionStatus::Closed);
        // No handle is left that could ask about this id.
        ns.sessions.remove(&self.id);
    }
}
