//! Request-node lifecycle: create and delete.

use super::types::RetryPolicy;
use crate::coordination::{Coordinator, CreateMode, ServiceError, ServiceResult, paths};
use crate::error::Result;
use std::thread;
use tracing::{debug, warn};

/// Create this handle's ephemeral, sequential request node under `lock_root`.
///
/// `prefix` is the handle's protected node-name prefix. If the connection
/// drops during the create, the node may or may not exist; before trying
/// again the siblings are scanned for `prefix` and a match is adopted, so a
/// retried create never leaves a second node in the queue.
pub fn create_request_node(
    client: &dyn Coordinator,
    lock_root: &str,
    prefix: &str,
    data: Vec<u8>,
    retry: &RetryPolicy,
) -> Result<String> {
    let path = paths::join(lock_root, prefix);
    let mut attempts = 0;
    let mut maybe_created = false;

    loop {
        if maybe_created {
            match find_own_node(client, lock_root, prefix) {
                Ok(Some(existing)) => {
                    debug!(node = %existing, "adopted request node from interrupted create");
                    return Ok(existing);
                }
                Ok(None) => {}
                Err(e) if retry.allows(&e, attempts) => {
                    attempts += 1;
                    warn!(lock_root, attempts, "listing after interrupted create failed: {}", e);
                    thread::sleep(retry.backoff);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        match client.create(&path, data.clone(), CreateMode::EphemeralSequential) {
            Ok(actual) => {
                debug!(node = %actual, "created request node");
                return Ok(actual);
            }
            Err(e) if retry.allows(&e, attempts) => {
                attempts += 1;
                maybe_created = true;
                warn!(lock_root, attempts, "request node create interrupted: {}", e);
                thread::sleep(retry.backoff);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn find_own_node(
    client: &dyn Coordinator,
    lock_root: &str,
    prefix: &str,
) -> ServiceResult<Option<String>> {
    let children = client.children(lock_root)?;
    Ok(children
        .into_iter()
        .find(|child| child.starts_with(prefix))
        .map(|child| paths::join(lock_root, &child)))
}

/// Delete every request node under `lock_root` named with `prefix`.
///
/// A create interrupted by a lost connection may have left a node whose path
/// was never returned; the per-handle prefix is the only way to find it. A
/// session that already ended owns no nodes, so there is nothing to remove.
pub fn remove_own_nodes(
    client: &dyn Coordinator,
    lock_root: &str,
    prefix: &str,
    retry: &RetryPolicy,
) -> Result<usize> {
    let children = match retry.run("list request nodes", || client.children(lock_root)) {
        Ok(children) => children,
        Err(ServiceError::NoNode(_) | ServiceError::SessionExpired | ServiceError::Closed) => {
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for child in children.iter().filter(|child| child.starts_with(prefix)) {
        let node = paths::join(lock_root, child);
        if delete_request_node(client, &node, retry)? {
            debug!(node = %node, "removed request node left by an interrupted create");
            removed += 1;
        }
    }
    Ok(removed)
}

/// Delete a request node.
///
/// Returns `Ok(true)` if the node was deleted and `Ok(false)` if it was
/// already gone, either deleted out-of-band or dropped together with an
/// expired or closed session. Neither case is an error: the lock is simply no
/// longer held.
pub fn delete_request_node(
    client: &dyn Coordinator,
    node: &str,
    retry: &RetryPolicy,
) -> Result<bool> {
    let mut interrupted = false;
    let result = retry.run("delete request node", || {
        let outcome = client.delete(node, None);
        if matches!(outcome, Err(ServiceError::ConnectionLoss)) {
            interrupted = true;
        }
        outcome
    });

    match result {
        Ok(()) => Ok(true),
        // An interrupted earlier attempt already went through.
        Err(ServiceError::NoNode(_)) if interrupted => Ok(true),
        Err(ServiceError::NoNode(_)) => Ok(false),
        // Ephemeral nodes do not outlive their session.
        Err(ServiceError::SessionExpired) | Err(ServiceError::Closed) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
