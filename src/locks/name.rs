//! Lock names and request-node naming.
//!
//! A request node is named `_c_<uuid>-lock-<sequence>`: the `_c_<uuid>-`
//! prefix is unique per handle so a handle can recognise its own node after a
//! lost create response, and `<sequence>` is the service-assigned suffix that
//! alone defines queue order.

use crate::coordination::paths;
use crate::error::{LockError, Result};
use uuid::Uuid;

/// Marker preceding the sequence suffix.
pub const LOCK_NODE_NAME: &str = "lock-";

/// Prefix of the per-handle protection tag.
pub const PROTECT_PREFIX: &str = "_c_";

/// Names the coordination service keeps for itself.
pub const RESERVED_NAMES: &[&str] = &["zookeeper"];

/// Check that `name` can be used as a single namespace component.
pub fn validate_lock_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(LockError::InvalidLockName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return invalid("must not be empty");
    }
    if name.contains('/') {
        return invalid("must not contain '/'");
    }
    if name == "." || name == ".." {
        return invalid("must not be a relative path component");
    }
    if name.chars().any(char::is_control) {
        return invalid("must not contain control characters");
    }
    if RESERVED_NAMES.contains(&name) {
        return invalid("is reserved by the coordination service");
    }
    Ok(())
}

/// Subtree holding the request nodes of one lock.
pub fn lock_root(root: &str, lock_name: &str) -> String {
    paths::join(root, lock_name)
}

/// Node-name prefix for a handle with the given id, sequence not included.
pub fn protected_prefix(id: Uuid) -> String {
    format!("{}{}-{}", PROTECT_PREFIX, id, LOCK_NODE_NAME)
}

/// Sequence number carried by a request-node name, if it has one.
///
/// The suffix is parsed as a number: `lock-10000000000` sorts after
/// `lock-9999999999` even though it is longer.
pub fn sequence_of(node_name: &str) -> Option<u64> {
    let (_, digits) = node_name.rsplit_once(LOCK_NODE_NAME)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
