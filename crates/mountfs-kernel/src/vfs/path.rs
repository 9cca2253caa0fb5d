//! Virtual path helpers.
//!
//! VFS paths are POSIX-style regardless of host: `/`-separated, absolute,
//! never ending in a separator except for the root itself.

use std::path::{Component, Path};

/// Normalize to an absolute `/`-separated path.
///
/// `.` is dropped, `..` pops (and stops at the root), relative input is
/// taken as relative to `/`, and trailing separators are stripped.
pub fn normalize_path(path: &Path) -> String {
    let segments = segments(path);
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Path segments after normalization. The root has none.
pub fn segments(path: &Path) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => out.push(s.to_string_lossy().into_owned()),
            Component::ParentDir => {
                out.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    out
}

/// Parent of a normalized path. The root is its own parent.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Final segment of a normalized path, empty for the root.
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// True if `prefix` equals `path` or is an ancestor of it on a segment
/// boundary. Both must be normalized.
pub fn is_prefix_of(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == b'/')
}

/// Strict ancestors of a normalized path, shallowest first, excluding `/`.
///
/// `/a/b/c` yields `/a`, `/a/b`.
pub fn strict_ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut idx = 0;
    while let Some(next) = path[idx + 1..].find('/') {
        idx += next + 1;
        out.push(path[..idx].to_string());
    }
    out
}
