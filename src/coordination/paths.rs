//! Helpers for slash-separated namespace paths.

use super::{ServiceError, ServiceResult};

/// Join a parent path and a child name.
pub fn join(parent: &str, child: &str) -> String {
    if parent == "/" {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), child)
    }
}

/// Parent of `path`; `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last component of `path`.
pub fn name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Every ancestor of `path` followed by `path` itself, root excluded.
///
/// `/locks/orders` yields `["/locks", "/locks/orders"]`.
pub fn prefixes(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for component in path.split('/').filter(|c| !c.is_empty()) {
        current.push('/');
        current.push_str(component);
        out.push(current.clone());
    }
    out
}

/// Reject paths the service would not accept.
pub fn validate(path: &str) -> ServiceResult<()> {
    if !path.starts_with('/') {
        return Err(ServiceError::Other(format!(
            "path '{}' must start with '/'",
            path
        )));
    }
    if path.len() > 1 && path.ends_with('/') {
        return Err(ServiceError::Other(format!(
            "path '{}' must not end with '/'",
            path
        )));
    }
    if path.len() > 1
        && path[1..]
            .split('/')
            .any(|c| c.is_empty() || c == "." || c == "..")
    {
        return Err(ServiceError::Other(format!(
            "path '{}' contains an empty or relative component",
            path
        )));
    }
    Ok(())
}
