//! Lock handle: acquisition state machine and release.

use super::guard::LockGuard;
use super::metadata::LockMetadata;
use super::name::{self, protected_prefix, validate_lock_name};
use super::node::{create_request_node, delete_request_node, remove_own_nodes};
use super::rank::{self, list_participants};
use super::signal::{WaitOutcome, WaitSignal, wait_signal};
use super::types::{LockOptions, LockState, Participant, Rank, ReleaseOutcome};
use crate::config::TimeoutPolicy;
use crate::coordination::Coordinator;
use crate::error::{LockError, Result};
use crate::session::Session;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// One step of the wait loop.
enum Step {
    /// List siblings and find our rank.
    Resolve,
    /// Arm a watch on the given predecessor.
    Watch(String),
    /// Block until the watch armed on `predecessor` fires.
    Wait {
        signal: WaitSignal,
        predecessor: String,
    },
}

/// Acquisition object for one lock name on a shared [`Session`].
///
/// A handle owns at most one request node at a time. Operations take
/// `&mut self`; to contend from several threads give each its own handle on
/// the same session.
///
/// Dropping a handle that still holds or is queued for the lock releases or
/// withdraws its request node.
///
/// If an attempt fails while the connection is down and its request node
/// cannot be withdrawn, the node is kept and the handle moves to
/// [`LockState::Interrupted`]. The next `lock` resumes on that node and
/// `unlock` (or drop) withdraws it.
#[derive(Debug)]
pub struct LockHandle {
    session: Arc<Session>,
    lock_name: String,
    lock_root: String,
    node_prefix: String,
    options: LockOptions,
    state: LockState,
    my_node: Option<String>,
    predecessor: Option<String>,
    /// A create failed on a lost connection and may have left a node whose
    /// path was never returned.
    unconfirmed_create: bool,
    errors: Vec<LockError>,
}

impl LockHandle {
    /// Handle for `lock_name` with default options.
    pub fn new(session: Arc<Session>, lock_name: &str) -> Self {
        Self::with_options(session, lock_name, LockOptions::default())
    }

    /// Handle for `lock_name`.
    ///
    /// Construction never fails. An invalid name, a session that could not
    /// connect, or a lock root that could not be created is recorded and
    /// returned by the first acquisition attempt.
    pub fn with_options(session: Arc<Session>, lock_name: &str, options: LockOptions) -> Self {
        let lock_root = name::lock_root(&options.root, lock_name);
        let mut errors = Vec::new();

        if let Err(e) = validate_lock_name(lock_name) {
            errors.push(e);
        } else if let Err(e) = session.ensure_root(&lock_root) {
            warn!(lock = %lock_name, error = %e, "could not prepare lock root");
            errors.push(e);
        }

        Self {
            session,
            lock_name: lock_name.to_string(),
            lock_root,
            node_prefix: protected_prefix(Uuid::new_v4()),
            options,
            state: LockState::Idle,
            my_node: None,
            predecessor: None,
            unconfirmed_create: false,
            errors,
        }
    }

    /// Acquire the lock, waiting up to the configured acquire timeout (or
    /// without limit if none is set).
    ///
    /// # Errors
    ///
    /// * [`LockError::Timeout`] if the acquire timeout elapsed
    /// * [`LockError::AlreadyAcquired`] if this handle already holds the lock
    /// * [`LockError::Connection`] / [`LockError::Session`] on session failure
    pub fn lock(&mut self) -> Result<()> {
        let timeout = self.options.acquire_timeout;
        if self.acquire_within(timeout)? {
            Ok(())
        } else {
            Err(LockError::Timeout {
                lock: self.lock_name.clone(),
                waited: timeout.unwrap_or_default(),
            })
        }
    }

    /// Take the lock only if it is free right now.
    pub fn try_lock(&mut self) -> Result<bool> {
        self.acquire_within(Some(Duration::ZERO))
    }

    /// Wait up to `timeout` for the lock. Returns `false` if it elapsed.
    pub fn try_lock_for(&mut self, timeout: Duration) -> Result<bool> {
        self.acquire_within(Some(timeout))
    }

    /// Acquire the lock and return a guard that releases it on drop.
    pub fn acquire(&mut self) -> Result<LockGuard<'_>> {
        self.lock()?;
        Ok(LockGuard::new(self))
    }

    /// Like [`LockHandle::acquire`], bounded by `timeout`. `None` on timeout.
    pub fn acquire_for(&mut self, timeout: Duration) -> Result<Option<LockGuard<'_>>> {
        if self.try_lock_for(timeout)? {
            Ok(Some(LockGuard::new(self)))
        } else {
            Ok(None)
        }
    }

    /// Release the lock, or withdraw a request still queued for it.
    ///
    /// The session stays open; the handle can lock again afterwards.
    pub fn unlock(&mut self) -> Result<ReleaseOutcome> {
        let Some(node) = self.my_node.take() else {
            return if self.remove_unconfirmed_nodes()? > 0 {
                Ok(ReleaseOutcome::Withdrawn)
            } else {
                Ok(ReleaseOutcome::NotHeld)
            };
        };
        let was_holding = self.state == LockState::Holding;

        let deleted = match self.session.client() {
            Ok(client) => delete_request_node(client, &node, &self.options.retry),
            // Closing the session already removed its ephemeral nodes.
            Err(LockError::Session(_)) => Ok(false),
            Err(e) => Err(e),
        };
        let deleted = match deleted {
            Ok(deleted) => deleted,
            Err(e) => {
                self.my_node = Some(node);
                return Err(e);
            }
        };

        self.predecessor = None;
        self.state = LockState::Released;

        let outcome = match (deleted, was_holding) {
            (false, _) => ReleaseOutcome::AlreadyLost,
            (true, true) => ReleaseOutcome::Released,
            (true, false) => ReleaseOutcome::Withdrawn,
        };
        match outcome {
            ReleaseOutcome::AlreadyLost => {
                warn!(lock = %self.lock_name, node = %node, "request node was already gone")
            }
            _ => info!(lock = %self.lock_name, node = %node, ?outcome, "lock released"),
        }
        Ok(outcome)
    }

    pub fn lock_name(&self) -> &str {
        &self.lock_name
    }

    /// Subtree holding this lock's request nodes.
    pub fn lock_root(&self) -> &str {
        &self.lock_root
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    /// Whether the last acquisition succeeded and has not been released.
    ///
    /// This is local knowledge: if the session has since expired the lock is
    /// gone even though this still returns `true`.
    pub fn is_held(&self) -> bool {
        self.state == LockState::Holding
    }

    /// Path of this handle's request node, if it has one.
    pub fn node_path(&self) -> Option<&str> {
        self.my_node.as_deref()
    }

    /// Node this handle was last watching.
    pub fn predecessor(&self) -> Option<&str> {
        self.predecessor.as_deref()
    }

    /// Errors recorded while constructing the handle.
    pub fn errors(&self) -> &[LockError] {
        &self.errors
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Current queue for this lock, holder first.
    pub fn participant_nodes(&self) -> Result<Vec<Participant>> {
        let client = self.session.client()?;
        list_participants(client, &self.lock_root, &self.options.retry)
    }

    fn acquire_within(&mut self, timeout: Option<Duration>) -> Result<bool> {
        if let Some(err) = self.errors.first() {
            return Err(err.clone());
        }
        if matches!(
            self.state,
            LockState::Holding | LockState::Requested | LockState::Waiting
        ) {
            return Err(LockError::AlreadyAcquired(self.lock_name.clone()));
        }

        let started = Instant::now();
        let deadline = timeout.map(|t| started + t);

        match &self.my_node {
            Some(node) => {
                debug!(lock = %self.lock_name, node = %node, "resuming on queued request node")
            }
            None => {
                self.remove_unconfirmed_nodes()?;
                self.state = LockState::Requested;
                match self.create_node() {
                    Ok(node) => self.my_node = Some(node),
                    Err(e) => {
                        self.state = LockState::Idle;
                        if matches!(e, LockError::Session(_)) {
                            self.unconfirmed_create = true;
                            if let Err(cleanup) = self.remove_unconfirmed_nodes() {
                                warn!(
                                    lock = %self.lock_name,
                                    error = %cleanup,
                                    "could not check for a node left by the failed create"
                                );
                            }
                        }
                        return Err(e);
                    }
                }
            }
        }

        match self.wait_for_turn(deadline) {
            Ok(true) => {
                self.state = LockState::Holding;
                self.predecessor = None;
                info!(
                    lock = %self.lock_name,
                    node = self.my_node.as_deref().unwrap_or_default(),
                    waited_ms = started.elapsed().as_millis() as u64,
                    "lock acquired"
                );
                Ok(true)
            }
            Ok(false) => {
                self.give_up()?;
                Ok(false)
            }
            Err(e) => Err(self.abandon(e)),
        }
    }

    fn create_node(&self) -> Result<String> {
        let client = self.session.client()?;
        let data = LockMetadata::new(&self.options.purpose).to_bytes()?;
        create_request_node(
            client,
            &self.lock_root,
            &self.node_prefix,
            data,
            &self.options.retry,
        )
    }

    /// Delete any node a failed create may have left behind.
    ///
    /// Only runs while no request node is known, so it never touches a node
    /// this handle is using. The flag stays set while the service is
    /// unreachable and the sweep is tried again by the next `lock`, `unlock`
    /// or drop.
    fn remove_unconfirmed_nodes(&mut self) -> Result<usize> {
        if !self.unconfirmed_create || self.my_node.is_some() {
            return Ok(0);
        }
        let removed = match self.session.client() {
            Ok(client) => remove_own_nodes(
                client,
                &self.lock_root,
                &self.node_prefix,
                &self.options.retry,
            )?,
            // A closed session took its ephemeral nodes with it.
            Err(LockError::Session(_)) => 0,
            Err(e) => return Err(e),
        };
        self.unconfirmed_create = false;
        if removed > 0 {
            info!(lock = %self.lock_name, removed, "removed node left by an interrupted create");
        }
        Ok(removed)
    }

    /// Resolve, watch, wait; repeat until holder or past `deadline`.
    fn wait_for_turn(&mut self, deadline: Option<Instant>) -> Result<bool> {
        let session = Arc::clone(&self.session);
        let client = session.client()?;
        let Some(node) = self.my_node.clone() else {
            return Err(LockError::Session(format!(
                "lock '{}' has no request node",
                self.lock_name
            )));
        };
        let retry = self.options.retry;
        let mut watch_retries = 0;
        let mut step = Step::Resolve;

        loop {
            step = match step {
                Step::Resolve => match rank::resolve(client, &self.lock_root, &node, &retry)? {
                    Rank::Holder => return Ok(true),
                    Rank::Waiting {
                        predecessor,
                        position,
                    } => {
                        if deadline.is_some_and(|d| Instant::now() >= d) {
                            return Ok(false);
                        }
                        debug!(
                            lock = %self.lock_name,
                            node = %node,
                            predecessor = %predecessor,
                            position,
                            "waiting for predecessor"
                        );
                        self.state = LockState::Waiting;
                        self.predecessor = Some(predecessor.clone());
                        Step::Watch(predecessor)
                    }
                },
                Step::Watch(predecessor) => {
                    let (trigger, signal) = wait_signal();
                    match client.exists_watch(&predecessor, trigger.into_watcher()) {
                        Ok(Some(_)) => Step::Wait {
                            signal,
                            predecessor,
                        },
                        Ok(None) => {
                            trace!(predecessor = %predecessor, "predecessor already gone");
                            self.cancel_watch(client, &predecessor);
                            Step::Resolve
                        }
                        Err(e) if retry.allows(&e, watch_retries) => {
                            watch_retries += 1;
                            warn!(predecessor = %predecessor, error = %e, "arming watch failed, retrying");
                            thread::sleep(retry.backoff);
                            Step::Resolve
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Step::Wait {
                    signal,
                    predecessor,
                } => {
                    let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
                    match signal.wait(remaining) {
                        WaitOutcome::Fired(event) => {
                            trace!(path = %event.path, kind = ?event.kind, "watch fired");
                            Step::Resolve
                        }
                        WaitOutcome::Abandoned => Step::Resolve,
                        WaitOutcome::TimedOut => {
                            self.cancel_watch(client, &predecessor);
                            return Ok(false);
                        }
                    }
                }
            };
        }
    }

    /// Discard a watch nobody will wait on any more.
    fn cancel_watch(&self, client: &dyn Coordinator, predecessor: &str) {
        if let Err(e) = client.cancel_watches(predecessor) {
            debug!(lock = %self.lock_name, predecessor, error = %e, "could not cancel watch");
        }
    }

    /// Apply the timeout policy after a wait ran out of time.
    fn give_up(&mut self) -> Result<()> {
        self.predecessor = None;
        self.state = LockState::TimedOut;

        if self.options.on_timeout == TimeoutPolicy::RemainQueued {
            debug!(lock = %self.lock_name, "timed out, staying queued");
            return Ok(());
        }
        let Some(node) = self.my_node.take() else {
            return Ok(());
        };
        let withdrawn = self
            .session
            .client()
            .and_then(|client| delete_request_node(client, &node, &self.options.retry));
        match withdrawn {
            Ok(_) => {
                debug!(lock = %self.lock_name, node = %node, "timed out, request withdrawn");
                Ok(())
            }
            Err(e) => {
                self.my_node = Some(node);
                Err(e)
            }
        }
    }

    /// Withdraw the request after a failed attempt and hand back the error.
    ///
    /// A node that cannot be deleted is kept and the handle becomes
    /// `Interrupted`, so it is never forgotten while it can still block
    /// other participants.
    fn abandon(&mut self, err: LockError) -> LockError {
        self.predecessor = None;
        self.state = LockState::Idle;

        if let Some(node) = self.my_node.take() {
            let withdrawn = match self.session.client() {
                Ok(client) => delete_request_node(client, &node, &self.options.retry).map(|_| ()),
                // A closed session took its ephemeral nodes with it.
                Err(LockError::Session(_)) => Ok(()),
                Err(e) => Err(e),
            };
            if let Err(e) = withdrawn {
                warn!(node = %node, error = %e, "request node could not be withdrawn, keeping it");
                self.my_node = Some(node);
                self.state = LockState::Interrupted;
            }
        }
        warn!(lock = %self.lock_name, error = %err, state = %self.state, "lock attempt failed");
        err
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if (self.my_node.is_some() || self.unconfirmed_create)
            && let Err(e) = self.unlock()
        {
            warn!(lock = %self.lock_name, error = %e, "failed to release lock on drop");
        }
    }
}
