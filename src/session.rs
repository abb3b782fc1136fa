//! Long-lived connection to the coordination service.
//!
//! A [`Session`] is opened once per process (or per service endpoint) and
//! shared by every [`LockHandle`](crate::locks::LockHandle) through an `Arc`.
//! Acquiring and releasing locks never opens or closes the session; only an
//! explicit [`Session::close`] does.
//!
//! Opening a session never fails: a connection failure is captured and
//! reported by [`Session::client`], which is where lock handles pick it up on
//! their first attempt.

use crate::config::LockConfig;
use crate::coordination::memory::MemoryService;
use crate::coordination::{Coordinator, CreateMode, ServiceError, paths};
use crate::error::{LockError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Endpoint scheme selecting the in-process service.
pub const MEMORY_SCHEME: &str = "memory://";

/// Observable state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    /// The session could not be established.
    Failed(String),
    /// [`Session::close`] was called.
    Closed,
}

/// A shared coordination-service session.
pub struct Session {
    endpoint: String,
    session_timeout: Duration,
    client: std::result::Result<Arc<dyn Coordinator>, String>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("session_timeout", &self.session_timeout)
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    /// Open a session against `endpoint`.
    ///
    /// `memory://<name>` endpoints resolve to the named in-process service;
    /// anything else is handed to ZooKeeper (requires the `zookeeper` feature).
    pub fn open(endpoint: &str, session_timeout: Duration) -> Arc<Self> {
        let client = connect_backend(endpoint, session_timeout);
        match &client {
            Ok(_) => info!(endpoint, "coordination session established"),
            Err(reason) => warn!(endpoint, %reason, "coordination session failed"),
        }
        Arc::new(Self {
            endpoint: endpoint.to_string(),
            session_timeout,
            client,
            closed: AtomicBool::new(false),
        })
    }

    /// Open a session using the endpoint and timeout from `config`.
    pub fn connect(config: &LockConfig) -> Arc<Self> {
        Self::open(&config.endpoint, config.session_timeout())
    }

    /// Wrap an already-connected client.
    pub fn with_client(endpoint: &str, client: Arc<dyn Coordinator>) -> Arc<Self> {
        Arc::new(Self {
            endpoint: endpoint.to_string(),
            session_timeout: Duration::ZERO,
            client: Ok(client),
            closed: AtomicBool::new(false),
        })
    }

    /// Record a failed connection attempt.
    pub fn failed(endpoint: &str, reason: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            endpoint: endpoint.to_string(),
            session_timeout: Duration::ZERO,
            client: Err(reason.into()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    pub fn state(&self) -> SessionState {
        match &self.client {
            Err(reason) => SessionState::Failed(reason.clone()),
            Ok(_) if self.closed.load(Ordering::Acquire) => SessionState::Closed,
            Ok(_) => SessionState::Connected,
        }
    }

    /// The live client, or the error explaining why there is none.
    pub fn client(&self) -> Result<&dyn Coordinator> {
        match &self.client {
            Err(reason) => Err(LockError::Connection {
                endpoint: self.endpoint.clone(),
                reason: reason.clone(),
            }),
            Ok(_) if self.closed.load(Ordering::Acquire) => {
                Err(LockError::Session("session is closed".to_string()))
            }
            Ok(client) => Ok(client.as_ref()),
        }
    }

    /// Idempotently create `path` and every missing ancestor as persistent
    /// nodes. Losing a creation race to another participant is not an error.
    pub fn ensure_root(&self, path: &str) -> Result<()> {
        let client = self.client()?;
        paths::validate(path)?;
        for prefix in paths::prefixes(path) {
            if client.exists(&prefix)?.is_some() {
                continue;
            }
            match client.create(&prefix, Vec::new(), CreateMode::Persistent) {
                Ok(_) => debug!(path = %prefix, "created lock root"),
                Err(ServiceError::NodeExists(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Close the session. Every ephemeral node it owns goes away, which
    /// releases any lock still held through it.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match &self.client {
            Ok(client) => {
                client.close()?;
                info!(endpoint = %self.endpoint, "coordination session closed");
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }
}

fn connect_backend(
    endpoint: &str,
    session_timeout: Duration,
) -> std::result::Result<Arc<dyn Coordinator>, String> {
    if let Some(name) = endpoint.strip_prefix(MEMORY_SCHEME) {
        if name.is_empty() {
            return Err("memory endpoint needs a service name".to_string());
        }
        let session = MemoryService::named(name)
            .connect()
            .map_err(|e| e.to_string())?;
        return Ok(Arc::new(session));
    }
    connect_zookeeper(endpoint, session_timeout)
}

#[cfg(feature = "zookeeper")]
fn connect_zookeeper(
    endpoint: &str,
    session_timeout: Duration,
) -> std::result::Result<Arc<dyn Coordinator>, String> {
    use crate::coordination::zookeeper::ZkCoordinator;

    let client = ZkCoordinator::connect(endpoint, session_timeout).map_err(|e| e.to_string())?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "zookeeper"))]
fn connect_zookeeper(
    _endpoint: &str,
    _session_timeout: Duration,
) -> std::result::Result<Arc<dyn Coordinator>, String> {
    Err("built without ZooKeeper support (enable the `zookeeper` feature)".to_string())
}
