//! VFS mount table with longest-prefix routing.
//!
//! The table is a plain data structure: it answers routing questions and
//! records mounts, but never talks to a backend itself. The
//! [`MountableFileSystem`](super::MountableFileSystem) owns one behind a lock
//! and does the I/O.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::{VfsError, VfsResult};
use super::ops::FileSystem;
use super::path::{file_name, is_prefix_of, normalize_path, parent};

/// Information about a mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// The mount path (e.g., "/mnt/project").
    pub path: String,
    /// Backend name.
    pub backend: String,
    /// Whether this mount is read-only.
    pub read_only: bool,
}

/// Outcome of routing a path.
#[derive(Clone)]
pub struct Resolved {
    /// Backend that owns the path.
    pub fs: Arc<dyn FileSystem>,
    /// Path rewritten relative to the backend's root (always absolute).
    pub relative: PathBuf,
    /// Mount path that matched; `/` for the implicit root.
    pub mount_path: String,
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("backend", &self.fs.name())
            .field("relative", &self.relative)
            .field("mount_path", &self.mount_path)
            .finish()
    }
}

/// Mount points and the implicit root.
///
/// Mount points are matched by longest prefix on segment boundaries. If
/// `/mnt` and `/mnt/project` are both mounted, `/mnt/project/src/main.rs`
/// routes to `/mnt/project` while `/mnt/projects` routes to `/mnt`.
///
/// The implicit root backs every path no explicit mount claims. Mounting
/// over `/` shadows it; unmounting `/` brings it back.
pub struct MountTable {
    root: Arc<dyn FileSystem>,
    /// Explicit mounts, keyed by normalized path.
    mounts: BTreeMap<String, Arc<dyn FileSystem>>,
}

impl fmt::Debug for MountTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountTable")
            .field("root", &self.root.name())
            .field("mounts", &self.mounts.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MountTable {
    /// Create a table whose implicit root is `root`.
    pub fn new(root: Arc<dyn FileSystem>) -> Self {
        Self {
            root,
            mounts: BTreeMap::new(),
        }
    }

    /// The implicit root backend.
    pub fn implicit_root(&self) -> &Arc<dyn FileSystem> {
        &self.root
    }

    /// Find the backend for a path.
    pub fn resolve(&self, path: &Path) -> Resolved {
        let normalized = normalize_path(path);

        // Longest matching mount point
        let best = self
            .mounts
            .iter()
            .filter(|(mount_path, _)| is_prefix_of(mount_path, &normalized))
            .max_by_key(|(mount_path, _)| mount_path.len());

        let (mount_path, fs) = match best {
            Some((mount_path, fs)) => (mount_path.clone(), Arc::clone(fs)),
            None => ("/".to_string(), Arc::clone(&self.root)),
        };

        let relative = if mount_path == "/" {
            normalized.clone()
        } else {
            match &normalized[mount_path.len()..] {
                "" => "/".to_string(),
                rest => rest.to_string(),
            }
        };

        tracing::trace!(path = %normalized, mount = %mount_path, relative = %relative, "resolved");

        Resolved {
            fs,
            relative: PathBuf::from(relative),
            mount_path,
        }
    }

    /// True if something is explicitly mounted exactly at `path`.
    ///
    /// The implicit root does not count; an explicit mount over `/` does.
    pub fn is_mount_point(&self, path: &Path) -> bool {
        self.mounts.contains_key(&normalize_path(path))
    }

    /// Names of mounts exactly one segment below `path`, sorted.
    pub fn direct_child_mount_names(&self, path: &Path) -> Vec<String> {
        let normalized = normalize_path(path);
        self.mounts
            .keys()
            .filter(|mount_path| mount_path.as_str() != "/" && parent(mount_path) == normalized)
            .map(|mount_path| file_name(mount_path).to_string())
            .collect()
    }

    /// True if some mount sits strictly below `path`.
    pub fn has_mount_beneath(&self, path: &Path) -> bool {
        let normalized = normalize_path(path);
        self.mounts
            .keys()
            .any(|mount_path| *mount_path != normalized && is_prefix_of(&normalized, mount_path))
    }

    /// Where `fs` is mounted, if anywhere. Compared by `Arc` identity.
    pub fn mount_path_of(&self, fs: &Arc<dyn FileSystem>) -> Option<&str> {
        self.mounts
            .iter()
            .find(|(_, mounted)| Arc::ptr_eq(mounted, fs))
            .map(|(path, _)| path.as_str())
    }

    /// Fail if `path` is occupied or `fs` is already mounted elsewhere.
    pub fn check_available(&self, path: &Path, fs: &Arc<dyn FileSystem>) -> VfsResult<()> {
        let normalized = normalize_path(path);
        if self.mounts.contains_key(&normalized) {
            return Err(VfsError::already_mounted(normalized));
        }
        // The implicit root may only be re-attached over `/` itself.
        if normalized != "/" && Arc::ptr_eq(fs, &self.root) {
            return Err(VfsError::already_mounted(format!(
                "{} is already the root",
                fs.name()
            )));
        }
        if let Some(existing) = self.mount_path_of(fs) {
            return Err(VfsError::already_mounted(format!(
                "{} is already mounted at {}",
                fs.name(),
                existing
            )));
        }
        Ok(())
    }

    /// Record a mount.
    ///
    /// Does not create anything in the enclosing backend; callers that want
    /// the ancestor chain materialized do that first.
    pub fn insert(&mut self, path: &Path, fs: Arc<dyn FileSystem>) -> VfsResult<()> {
        self.check_available(path, &fs)?;
        self.mounts.insert(normalize_path(path), fs);
        Ok(())
    }

    /// Remove the mount at `path`, returning its backend.
    pub fn remove(&mut self, path: &Path) -> VfsResult<Arc<dyn FileSystem>> {
        let normalized = normalize_path(path);
        self.mounts
            .remove(&normalized)
            .ok_or_else(|| VfsError::not_mounted(normalized))
    }

    /// List all explicit mounts in path order.
    pub fn list(&self) -> Vec<MountInfo> {
        self.mounts
            .iter()
            .map(|(path, fs)| MountInfo {
                path: path.clone(),
                backend: fs.name().to_string(),
                read_only: fs.read_only(),
            })
            .collect()
    }

    /// Number of explicit mounts.
    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    /// True if nothing is explicitly mounted.
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::MemoryBackend;

    fn backend() -> Arc<dyn FileSystem> {
        Arc::new(MemoryBackend::new())
    }

    fn table_with(paths: &[&str]) -> (MountTable, Vec<Arc<dyn FileSystem>>) {
        let mut table = MountTable::new(backend());
        let mut backends = Vec::new();
        for path in paths {
            let fs = backend();
            table.insert(Path::new(path), Arc::clone(&fs)).unwrap();
            backends.push(fs);
        }
        (table, backends)
    }

    #[test]
    fn test_longest_prefix_wins() {
        let (table, backends) = table_with(&[
            "/",
            "/root",
            "/root/home/secondRoot",
            "/root/anotherRoot",
        ]);

        let resolved = table.resolve(Path::new("/root/home/secondRoot/foo"));
        assert_eq!(resolved.mount_path, "/root/home/secondRoot");
        assert_eq!(resolved.relative, PathBuf::from("/foo"));
        assert!(Arc::ptr_eq(&resolved.fs, &backends[2]));

        let resolved = table.resolve(Path::new("/root/home"));
        assert_eq!(resolved.mount_path, "/root");
        assert_eq!(resolved.relative, PathBuf::from("/home"));

        let resolved = table.resolve(Path::new("/elsewhere"));
        assert_eq!(resolved.mount_path, "/");
        assert!(Arc::ptr_eq(&resolved.fs, &backends[0]));
    }

    #[test]
    fn test_no_partial_segment_match() {
        let (table, _) = table_with(&["/root"]);
        let resolved = table.resolve(Path::new("/rootkit/file"));
        assert_eq!(resolved.mount_path, "/");
        assert_eq!(resolved.relative, PathBuf::from("/rootkit/file"));
        assert!(Arc::ptr_eq(&resolved.fs, table.implicit_root()));
    }

    #[test]
    fn test_mount_root_resolves_to_slash() {
        let (table, _) = table_with(&["/data"]);
        let resolved = table.resolve(Path::new("/data/"));
        assert_eq!(resolved.mount_path, "/data");
        assert_eq!(resolved.relative, PathBuf::from("/"));
    }

    #[test]
    fn test_is_mount_point() {
        let (table, _) = table_with(&["/root/home/secondRoot"]);
        assert!(table.is_mount_point(Path::new("/root/home/secondRoot/")));
        assert!(!table.is_mount_point(Path::new("/root/home")));
        // The implicit root is not a mount point.
        assert!(!table.is_mount_point(Path::new("/")));

        let (table, _) = table_with(&["/"]);
        assert!(table.is_mount_point(Path::new("/")));
    }

    #[test]
    fn test_direct_child_mount_names() {
        let (table, _) = table_with(&["/", "/root", "/root/home/secondRoot", "/root/anotherRoot"]);
        assert_eq!(table.direct_child_mount_names(Path::new("/")), vec!["root"]);
        assert_eq!(
            table.direct_child_mount_names(Path::new("/root")),
            vec!["anotherRoot"]
        );
        assert_eq!(
            table.direct_child_mount_names(Path::new("/root/home")),
            vec!["secondRoot"]
        );
        assert!(table.direct_child_mount_names(Path::new("/root/home/secondRoot")).is_empty());
    }

    #[test]
    fn test_has_mount_beneath() {
        let (table, _) = table_with(&["/root/home/secondRoot"]);
        assert!(table.has_mount_beneath(Path::new("/")));
        assert!(table.has_mount_beneath(Path::new("/root")));
        assert!(table.has_mount_beneath(Path::new("/root/home")));
        assert!(!table.has_mount_beneath(Path::new("/root/home/secondRoot")));
        assert!(!table.has_mount_beneath(Path::new("/root/ho")));
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let (mut table, _) = table_with(&["/data"]);
        let err = table.insert(Path::new("/data/"), backend()).unwrap_err();
        assert!(matches!(err, VfsError::AlreadyMounted(_)));
    }

    #[test]
    fn test_backend_aliasing_rejected() {
        let (mut table, backends) = table_with(&["/a"]);
        let err = table.insert(Path::new("/b"), Arc::clone(&backends[0])).unwrap_err();
        assert!(matches!(err, VfsError::AlreadyMounted(_)));
        assert_eq!(table.mount_path_of(&backends[0]), Some("/a"));
    }

    #[test]
    fn test_implicit_root_cannot_alias() {
        let root = backend();
        let mut table = MountTable::new(Arc::clone(&root));
        let err = table.insert(Path::new("/alias"), Arc::clone(&root)).unwrap_err();
        assert!(matches!(err, VfsError::AlreadyMounted(_)));
        assert!(table.is_empty());

        // Mounting it explicitly over `/` is not an alias.
        table.insert(Path::new("/"), Arc::clone(&root)).unwrap();
        assert!(table.is_mount_point(Path::new("/")));
    }

    #[test]
    fn test_remove_falls_back() {
        let (mut table, backends) = table_with(&["/a", "/a/b"]);
        let removed = table.remove(Path::new("/a/b")).unwrap();
        assert!(Arc::ptr_eq(&removed, &backends[1]));

        let resolved = table.resolve(Path::new("/a/b/c"));
        assert_eq!(resolved.mount_path, "/a");
        assert_eq!(resolved.relative, PathBuf::from("/b/c"));

        assert!(matches!(
            table.remove(Path::new("/a/b")),
            Err(VfsError::NotMounted(_))
        ));
    }

    #[test]
    fn test_list() {
        let (table, _) = table_with(&["/scratch", "/data"]);
        let mounts = table.list();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].path, "/data");
        assert_eq!(mounts[1].path, "/scratch");
        assert_eq!(mounts[0].backend, "memory");
        assert!(!mounts[0].read_only);
    }
}
