//! Remote path helpers
//!
//! Remote paths always use `/` regardless of the local or remote OS.

/// Check if a remote path is absolute.
pub fn is_absolute_remote_path(path: &str) -> bool {
    path.starts_with('/')
}

/// Join remote path components using `/` separator.
pub fn join_remote_path(base: &str, component: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, component)
    } else {
        format!("{}/{}", base, component)
    }
}

/// Parent directory of a remote path.
///
/// `/a/b` → `/a`, `/a` → `/`, `a` → `.`
pub fn parent_remote_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None if trimmed.is_empty() && path.starts_with('/') => "/".to_string(),
        None => ".".to_string(),
    }
}

/// Resolve a symlink target read from `link`.
///
/// Relative targets are taken relative to the directory holding the link.
pub fn resolve_link_target(link: &str, target: &str) -> String {
    if is_absolute_remote_path(target) {
        target.to_string()
    } else {
        join_remote_path(&parent_remote_path(link), target)
    }
}
