//! Apache ZooKeeper backend.

use super::{
    Coordinator, CreateMode, EventKind, NodeStat, ServiceError, ServiceResult, WatchedEvent,
    Watcher,
};
use std::time::Duration;
use tracing::{debug, warn};
use zookeeper::{
    Acl, KeeperState, WatchedEvent as ZkWatchedEvent, WatchedEventType, ZkError, ZooKeeper,
};

impl From<ZkError> for ServiceError {
    fn from(err: ZkError) -> Self {
        match err {
            ZkError::NoNode => ServiceError::NoNode(String::new()),
            ZkError::NodeExists => ServiceError::NodeExists(String::new()),
            ZkError::NotEmpty => ServiceError::NotEmpty(String::new()),
            ZkError::BadVersion => ServiceError::BadVersion(String::new()),
            ZkError::ConnectionLoss | ZkError::OperationTimeout => ServiceError::ConnectionLoss,
            ZkError::SessionExpired => ServiceError::SessionExpired,
            ZkError::SessionMoved => ServiceError::SessionExpired,
            other => ServiceError::Other(format!("{:?}", other)),
        }
    }
}

/// Attach the path to errors that name a node.
fn at(path: &str) -> impl Fn(ZkError) -> ServiceError + '_ {
    move |err| match ServiceError::from(err) {
        ServiceError::NoNode(_) => ServiceError::NoNode(path.to_string()),
        ServiceError::NodeExists(_) => ServiceError::NodeExists(path.to_string()),
        ServiceError::NotEmpty(_) => ServiceError::NotEmpty(path.to_string()),
        ServiceError::BadVersion(_) => ServiceError::BadVersion(path.to_string()),
        other => other,
    }
}

fn convert_stat(stat: zookeeper::Stat) -> NodeStat {
    NodeStat {
        version: stat.version,
        ephemeral_owner: (stat.ephemeral_owner != 0).then_some(stat.ephemeral_owner as u64),
        num_children: stat.num_children.max(0) as usize,
    }
}

fn convert_event(event: ZkWatchedEvent, path: &str) -> WatchedEvent {
    let kind = match (event.event_type, event.keeper_state) {
        (WatchedEventType::NodeCreated, _) => EventKind::NodeCreated,
        (WatchedEventType::NodeDeleted, _) => EventKind::NodeDeleted,
        (_, KeeperState::Expired) | (_, KeeperState::Disconnected) => EventKind::SessionEnded,
        // Any other change still means "look again".
        _ => EventKind::NodeDeleted,
    };
    WatchedEvent {
        kind,
        path: event.path.unwrap_or_else(|| path.to_string()),
    }
}

/// Default watcher for session-level state changes.
struct SessionWatcher;

impl zookeeper::Watcher for SessionWatcher {
    fn handle(&self, event: ZkWatchedEvent) {
        match event.keeper_state {
            KeeperState::Expired => warn!("zookeeper session expired"),
            KeeperState::Disconnected => warn!("zookeeper connection lost"),
            state => debug!(?state, "zookeeper session event"),
        }
    }
}

/// A ZooKeeper session.
pub struct ZkCoordinator {
    zk: ZooKeeper,
}

impl ZkCoordinator {
    /// Connect to `endpoint` (`host:port[,host:port…][/chroot]`).
    pub fn connect(endpoint: &str, session_timeout: Duration) -> ServiceResult<Self> {
        let zk = ZooKeeper::connect(endpoint, session_timeout, SessionWatcher)?;
        Ok(Self { zk })
    }
}

impl Coordinator for ZkCoordinator {
    fn exists(&self, path: &str) -> ServiceResult<Option<NodeStat>> {
        let stat = self.zk.exists(path, false).map_err(at(path))?;
        Ok(stat.map(convert_stat))
    }

    fn exists_watch(&self, path: &str, watcher: Watcher) -> ServiceResult<Option<NodeStat>> {
        let watched = path.to_string();
        let stat = self
            .zk
            .exists_w(path, move |event: ZkWatchedEvent| {
                watcher(convert_event(event, &watched))
            })
            .map_err(at(path))?;
        Ok(stat.map(convert_stat))
    }

    fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode) -> ServiceResult<String> {
        let mode = match mode {
            CreateMode::Persistent => zookeeper::CreateMode::Persistent,
            CreateMode::Ephemeral => zookeeper::CreateMode::Ephemeral,
            CreateMode::PersistentSequential => zookeeper::CreateMode::PersistentSequential,
            CreateMode::EphemeralSequential => zookeeper::CreateMode::EphemeralSequential,
        };
        self.zk
            .create(path, data, Acl::open_unsafe().clone(), mode)
            .map_err(at(path))
    }

    fn children(&self, path: &str) -> ServiceResult<Vec<String>> {
        self.zk.get_children(path, false).map_err(at(path))
    }

    fn cancel_watches(&self, _path: &str) -> ServiceResult<()> {
        // The client has no watch removal. The server forgets a watch once it
        // fires or the session ends, and a fired callback with nobody waiting
        // is a no-op.
        Ok(())
    }

    fn data(&self, path: &str) -> ServiceResult<Vec<u8>> {
        let (data, _stat) = self.zk.get_data(path, false).map_err(at(path))?;
        Ok(data)
    }

    fn delete(&self, path: &str, version: Option<i32>) -> ServiceResult<()> {
        self.zk.delete(path, version).map_err(at(path))
    }

    fn close(&self) -> ServiceResult<()> {
        self.zk.close()?;
        Ok(())
    }
}
