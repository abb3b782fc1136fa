//! Rank resolution: who holds the lock, and who is right in front of us.
//!
//! Ordering is by the numeric sequence suffix only. Each waiter watches just
//! its immediate predecessor, so a release wakes exactly one participant.

use super::metadata::LockMetadata;
use super::name::{lock_root, sequence_of, validate_lock_name};
use super::types::{LockOptions, Participant, Rank, RetryPolicy};
use crate::coordination::{Coordinator, ServiceError, paths};
use crate::error::{LockError, Result};
use crate::session::Session;

/// Request-node names ordered by sequence number.
///
/// Names without a sequence suffix are not request nodes and are dropped.
pub fn sort_by_sequence(children: Vec<String>) -> Vec<(u64, String)> {
    let mut ordered: Vec<(u64, String)> = children
        .into_iter()
        .filter_map(|child| sequence_of(&child).map(|seq| (seq, child)))
        .collect();
    ordered.sort();
    ordered
}

/// Rank of `my_name` among `children`, or `None` if it is not among them.
pub fn rank_among(children: Vec<String>, lock_root: &str, my_name: &str) -> Option<Rank> {
    let ordered = sort_by_sequence(children);
    let position = ordered.iter().position(|(_, name)| name == my_name)?;
    if position == 0 {
        Some(Rank::Holder)
    } else {
        Some(Rank::Waiting {
            predecessor: paths::join(lock_root, &ordered[position - 1].1),
            position,
        })
    }
}

/// List the siblings of `my_node` and decide whether it holds the lock.
///
/// Fails with [`LockError::Session`] if `my_node` is no longer in the queue,
/// which happens when the session that created it expired.
pub fn resolve(
    client: &dyn Coordinator,
    lock_root: &str,
    my_node: &str,
    retry: &RetryPolicy,
) -> Result<Rank> {
    let children = retry.run("list request nodes", || client.children(lock_root))?;
    rank_among(children, lock_root, paths::name(my_node)).ok_or_else(|| {
        LockError::Session(format!(
            "request node '{}' vanished from the queue; its session has likely expired",
            my_node
        ))
    })
}

/// Current queue of `lock_root`, holder first, with each node's metadata.
pub fn list_participants(
    client: &dyn Coordinator,
    lock_root: &str,
    retry: &RetryPolicy,
) -> Result<Vec<Participant>> {
    let children = match retry.run("list request nodes", || client.children(lock_root)) {
        Ok(children) => children,
        Err(ServiceError::NoNode(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut participants = Vec::new();
    for (sequence, name) in sort_by_sequence(children) {
        let path = paths::join(lock_root, &name);
        let metadata = match client.data(&path) {
            Ok(bytes) => LockMetadata::from_bytes(&bytes).ok(),
            // Released between listing and reading.
            Err(ServiceError::NoNode(_)) => continue,
            Err(e) => return Err(e.into()),
        };
        participants.push(Participant {
            name,
            path,
            sequence,
            position: participants.len(),
            metadata,
        });
    }
    Ok(participants)
}

/// Queue of `lock_name` under `options.root`, without creating anything.
///
/// A lock that was never used has an empty queue.
pub fn queue(session: &Session, options: &LockOptions, lock_name: &str) -> Result<Vec<Participant>> {
    validate_lock_name(lock_name)?;
    let client = session.client()?;
    list_participants(client, &lock_root(&options.root, lock_name), &options.retry)
}
