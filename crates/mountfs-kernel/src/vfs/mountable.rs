//! Composite filesystem over a mount table.
//!
//! [`MountableFileSystem`] is itself a [`FileSystem`]: every call is routed
//! through the [`MountTable`] to the backend owning the path. A few calls
//! are intercepted at mount boundaries:
//!
//! - `stat` on a mount point reports the mounted backend's root.
//! - Mutations that would remove or move a mount point fail with `Busy`,
//!   as does removing a directory that still has a mount beneath it.
//! - `readdir` merges the host backend's listing with the names of mounts
//!   directly inside the directory.
//!
//! ## Locking
//!
//! The table sits behind a `tokio::sync::RwLock`. Routing takes the read
//! lock just long enough to clone out the target backend. `mount` and
//! `umount` hold the write lock for their whole duration, so the table never
//! changes underneath a resolution. A call that resolved before an `umount`
//! finishes against the backend it resolved to.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use mountfs_types::{DirEntry, FileAttr, FileType, OpenFlags};

use super::backends::MemoryBackend;
use super::error::{VfsError, VfsResult};
use super::file::FileHandle;
use super::mount::{MountInfo, MountTable, Resolved};
use super::ops::{Capabilities, FileSystem};
use super::path::{normalize_path, strict_ancestors};

/// Permissions reported for a mount root whose backend cannot stat it.
const MOUNT_ROOT_PERM: u32 = 0o777;

/// Permissions used when `mount` creates missing ancestor directories.
const ANCESTOR_DIR_MODE: u32 = 0o777;

/// A single namespace over many mounted backends.
pub struct MountableFileSystem {
    table: RwLock<MountTable>,
}

impl std::fmt::Debug for MountableFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountableFileSystem")
            .field("table", &"<locked>")
            .finish()
    }
}

impl Default for MountableFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MountableFileSystem {
    /// Create a namespace whose implicit root is a fresh in-memory backend.
    pub fn new() -> Self {
        Self::with_root(Arc::new(MemoryBackend::new()))
    }

    /// Create a namespace over the given implicit root.
    pub fn with_root(root: Arc<dyn FileSystem>) -> Self {
        Self {
            table: RwLock::new(MountTable::new(root)),
        }
    }

    /// Attach `fs` at `path`.
    ///
    /// Fails with `AlreadyMounted` if `path` already has a mount or `fs` is
    /// mounted elsewhere. Missing ancestor directories of `path` are created
    /// in whichever backend owns them before the mount is recorded.
    #[tracing::instrument(skip_all, name = "vfs.mount")]
    pub async fn mount(&self, path: impl AsRef<Path>, fs: Arc<dyn FileSystem>) -> VfsResult<()> {
        let mount_path = normalize_path(path.as_ref());
        let mut table = self.table.write().await;

        table.check_available(Path::new(&mount_path), &fs)?;
        ensure_ancestors(&table, &mount_path).await?;
        table.insert(Path::new(&mount_path), Arc::clone(&fs))?;

        tracing::info!(path = %mount_path, backend = fs.name(), "mounted");
        Ok(())
    }

    /// Detach whatever is mounted at `path`, returning it.
    ///
    /// Paths under it fall back to the next enclosing mount (or the implicit
    /// root). Fails with `NotMounted` if nothing is mounted exactly there.
    #[tracing::instrument(skip_all, name = "vfs.umount")]
    pub async fn umount(&self, path: impl AsRef<Path>) -> VfsResult<Arc<dyn FileSystem>> {
        let mount_path = normalize_path(path.as_ref());
        let removed = self.table.write().await.remove(Path::new(&mount_path))?;
        tracing::info!(path = %mount_path, backend = removed.name(), "unmounted");
        Ok(removed)
    }

    /// List all explicit mounts.
    pub async fn mounts(&self) -> Vec<MountInfo> {
        self.table.read().await.list()
    }

    /// True if something is explicitly mounted exactly at `path`.
    pub async fn is_mount_point(&self, path: &Path) -> bool {
        self.table.read().await.is_mount_point(path)
    }

    /// Route `path` without touching any backend.
    pub async fn resolve(&self, path: &Path) -> Resolved {
        self.table.read().await.resolve(path)
    }

    /// Reject a mutation aimed exactly at a mount point.
    async fn guard_mount_point(&self, path: &Path) -> VfsResult<Resolved> {
        let table = self.table.read().await;
        if table.is_mount_point(path) {
            return Err(VfsError::busy(normalize_path(path)));
        }
        Ok(table.resolve(path))
    }

    /// Reject a mutation that would remove or move a mount point or any
    /// directory containing one.
    async fn guard_subtree(&self, path: &Path) -> VfsResult<Resolved> {
        let table = self.table.read().await;
        if table.is_mount_point(path) || table.has_mount_beneath(path) {
            return Err(VfsError::busy(normalize_path(path)));
        }
        Ok(table.resolve(path))
    }

    /// Move a file between two different backends by copying it.
    ///
    /// The target copy is removed again if the source cannot be unlinked, so
    /// a failed move never leaves the file in both places.
    async fn rename_across(&self, from: &Resolved, to: &Resolved) -> VfsResult<()> {
        if from.fs.read_only() || to.fs.read_only() {
            return Err(VfsError::ReadOnly);
        }
        let attr = from.fs.stat(&from.relative).await?;
        if attr.is_dir() {
            return Err(VfsError::CrossDeviceLink);
        }
        let data = from.fs.read_file(&from.relative).await?;

        let mut target = to
            .fs
            .open(&to.relative, OpenFlags::create_truncate(), attr.perm)
            .await?;
        target.write(0, &data)?;
        target.close().await?;

        if let Err(e) = from.fs.unlink(&from.relative).await {
            if let Err(cleanup) = to.fs.unlink(&to.relative).await {
                tracing::warn!(
                    to = %to.relative.display(),
                    error = %cleanup,
                    "failed to remove copy after aborted move"
                );
            }
            return Err(e);
        }
        tracing::debug!(
            from = %from.relative.display(),
            to = %to.relative.display(),
            bytes = data.len(),
            "renamed across backends"
        );
        Ok(())
    }
}

/// Create every missing strict ancestor of `mount_path`, one level at a time,
/// in whichever backend currently owns it.
///
/// Only `mount` uses this. The contract's `mkdir` stays single-level.
async fn ensure_ancestors(table: &MountTable, mount_path: &str) -> VfsResult<()> {
    for ancestor in strict_ancestors(mount_path) {
        let ancestor_path = Path::new(&ancestor);
        if table.is_mount_point(ancestor_path) {
            continue;
        }
        let resolved = table.resolve(ancestor_path);
        match resolved.fs.stat(&resolved.relative).await {
            Ok(attr) if attr.is_dir() => {}
            Ok(_) => return Err(VfsError::not_a_directory(ancestor)),
            Err(e) if e.is_not_found() => {
                tracing::debug!(path = %ancestor, backend = resolved.fs.name(), "creating mount ancestor");
                resolved.fs.mkdir(&resolved.relative, ANCESTOR_DIR_MODE).await?;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Fold mount names into a native listing. Mount names win on collision and
/// are reported as directories; new names go after the native entries.
fn merge_listing(mut entries: Vec<DirEntry>, mount_names: Vec<String>) -> Vec<DirEntry> {
    for name in mount_names {
        match entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.kind = FileType::Directory,
            None => entries.push(DirEntry::directory(name)),
        }
    }
    entries
}

#[async_trait]
impl FileSystem for MountableFileSystem {
    fn name(&self) -> &str {
        "mountable"
    }

    fn capabilities(&self) -> Capabilities {
        // Individual mounts may be read-only or synchronous; the namespace
        // as a whole is neither.
        Capabilities::default()
    }

    async fn stat(&self, path: &Path) -> VfsResult<FileAttr> {
        let (resolved, at_mount_point) = {
            let table = self.table.read().await;
            (table.resolve(path), table.is_mount_point(path))
        };
        match resolved.fs.stat(&resolved.relative).await {
            Ok(attr) => Ok(attr),
            Err(e) if at_mount_point && e.is_not_found() => {
                Ok(FileAttr::directory(MOUNT_ROOT_PERM))
            }
            Err(e) => Err(e),
        }
    }

    async fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let (resolved, mount_names, has_mounts_beneath) = {
            let table = self.table.read().await;
            (
                table.resolve(path),
                table.direct_child_mount_names(path),
                table.has_mount_beneath(path),
            )
        };

        let entries = match resolved.fs.readdir(&resolved.relative).await {
            Ok(entries) => entries,
            // The host never had the directory, but mounts live below it.
            Err(e) if e.is_not_found() && has_mounts_beneath => {
                tracing::warn!(path = %normalize_path(path), "listing mount ancestor missing from host");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        Ok(merge_listing(entries, mount_names))
    }

    async fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let resolved = self.resolve(path).await;
        resolved.fs.read_file(&resolved.relative).await
    }

    async fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<()> {
        let resolved = self.guard_mount_point(path).await?;
        resolved.fs.mkdir(&resolved.relative, mode).await
    }

    async fn unlink(&self, path: &Path) -> VfsResult<()> {
        let resolved = self.guard_mount_point(path).await?;
        resolved.fs.unlink(&resolved.relative).await
    }

    async fn rmdir(&self, path: &Path) -> VfsResult<()> {
        let resolved = self.guard_subtree(path).await?;
        resolved.fs.rmdir(&resolved.relative).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let from_resolved = self.guard_subtree(from).await?;
        let to_resolved = self.guard_subtree(to).await?;

        if Arc::ptr_eq(&from_resolved.fs, &to_resolved.fs) {
            return from_resolved
                .fs
                .rename(&from_resolved.relative, &to_resolved.relative)
                .await;
        }
        self.rename_across(&from_resolved, &to_resolved).await
    }

    async fn open(
        &self,
        path: &Path,
        flags: OpenFlags,
        mode: u32,
    ) -> VfsResult<Box<dyn FileHandle>> {
        let resolved = self.resolve(path).await;
        resolved.fs.open(&resolved.relative, flags, mode).await
    }

    async fn sync(&self, path: &Path, data: &[u8], attr: &FileAttr) -> VfsResult<()> {
        let resolved = self.resolve(path).await;
        resolved.fs.sync(&resolved.relative, data, attr).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::KeyValueBackend;

    fn memory() -> Arc<dyn FileSystem> {
        Arc::new(MemoryBackend::new())
    }

    fn names(entries: &[DirEntry]) -> Vec<String> {
        let mut names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_basic_mount() {
        let mfs = MountableFileSystem::new();
        let scratch = memory();
        scratch.write_all(Path::new("/test.txt"), b"hello").await.unwrap();

        mfs.mount("/scratch", scratch).await.unwrap();

        let data = mfs.read_file(Path::new("/scratch/test.txt")).await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_nested_mount() {
        let mfs = MountableFileSystem::new();

        let outer = memory();
        outer.write_all(Path::new("/outer.txt"), b"outer").await.unwrap();
        mfs.mount("/mnt", outer).await.unwrap();

        let inner = memory();
        inner.write_all(Path::new("/inner.txt"), b"inner").await.unwrap();
        mfs.mount("/mnt/project", inner).await.unwrap();

        assert_eq!(mfs.read_file(Path::new("/mnt/outer.txt")).await.unwrap(), b"outer");
        assert_eq!(
            mfs.read_file(Path::new("/mnt/project/inner.txt")).await.unwrap(),
            b"inner"
        );
        // Host-side ancestor was not needed: /mnt is itself a mount.
        assert!(mfs.stat(Path::new("/mnt/project")).await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_mount_materializes_ancestors() {
        let root = Arc::new(MemoryBackend::new());
        let mfs = MountableFileSystem::with_root(root.clone());
        mfs.mount("/a/b/c", memory()).await.unwrap();

        assert!(root.stat(Path::new("/a")).await.unwrap().is_dir());
        assert!(root.stat(Path::new("/a/b")).await.unwrap().is_dir());
        // The mount point itself is not created in the host.
        assert!(root.stat(Path::new("/a/b/c")).await.is_err());
    }

    #[tokio::test]
    async fn test_mount_over_file_fails() {
        let mfs = MountableFileSystem::new();
        mfs.write_all(Path::new("/file"), b"x").await.unwrap();
        let err = mfs.mount("/file/sub", memory()).await.unwrap_err();
        assert!(matches!(err, VfsError::NotADirectory(_)));
        assert!(mfs.mounts().await.is_empty());
    }

    #[tokio::test]
    async fn test_plain_mkdir_is_single_level() {
        let mfs = MountableFileSystem::new();
        let err = mfs.mkdir(Path::new("/x/y"), 0o755).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_stat_mount_point() {
        let mfs = MountableFileSystem::new();
        mfs.mount("/scratch", memory()).await.unwrap();

        let attr = mfs.stat(Path::new("/scratch")).await.unwrap();
        assert!(attr.is_dir());
    }

    #[tokio::test]
    async fn test_stat_root() {
        let mfs = MountableFileSystem::new();
        let attr = mfs.stat(Path::new("/")).await.unwrap();
        assert!(attr.is_dir());
    }

    #[tokio::test]
    async fn test_list_root_merges_mounts() {
        let mfs = MountableFileSystem::new();
        mfs.mkdir(Path::new("/home"), 0o755).await.unwrap();
        mfs.mount("/scratch", memory()).await.unwrap();
        mfs.mount("/mnt/a", memory()).await.unwrap();
        mfs.mount("/mnt/b", memory()).await.unwrap();

        let entries = mfs.readdir(Path::new("/")).await.unwrap();
        assert_eq!(names(&entries), vec!["home", "mnt", "scratch"]);

        let entries = mfs.readdir(Path::new("/mnt")).await.unwrap();
        assert_eq!(names(&entries), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_mount_name_overrides_file_entry() {
        let root = Arc::new(MemoryBackend::new());
        let mfs = MountableFileSystem::with_root(root.clone());
        mfs.mount("/data", memory()).await.unwrap();
        // A file appears in the host under the mount name afterwards.
        root.write_all(Path::new("/data"), b"shadowed").await.unwrap();

        let entries = mfs.readdir(Path::new("/")).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "data");
        assert_eq!(entries[0].kind, FileType::Directory);
    }

    #[tokio::test]
    async fn test_readdir_missing_mount_ancestor_is_empty() {
        let root = Arc::new(MemoryBackend::new());
        let mfs = MountableFileSystem::with_root(root.clone());
        mfs.mount("/deep/mnt", memory()).await.unwrap();
        // Remove the ancestor behind the table's back.
        root.rmdir(Path::new("/deep")).await.unwrap();

        let entries = mfs.readdir(Path::new("/deep")).await.unwrap();
        assert_eq!(names(&entries), vec!["mnt"]);

        // Without mounts beneath, a missing directory is still an error.
        assert!(mfs.readdir(Path::new("/nowhere")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_mount_point_protected() {
        let mfs = MountableFileSystem::new();
        mfs.mount("/mnt/data", memory()).await.unwrap();

        for result in [
            mfs.rmdir(Path::new("/mnt/data")).await,
            mfs.unlink(Path::new("/mnt/data")).await,
            mfs.mkdir(Path::new("/mnt/data"), 0o755).await,
            mfs.rename(Path::new("/mnt/data"), Path::new("/mnt/other")).await,
            mfs.rmdir(Path::new("/mnt")).await,
            mfs.rename(Path::new("/mnt"), Path::new("/elsewhere")).await,
        ] {
            assert!(matches!(result, Err(VfsError::Busy(_))), "{result:?}");
        }
        assert!(mfs.is_mount_point(Path::new("/mnt/data")).await);
    }

    #[tokio::test]
    async fn test_rename_onto_mount_point_busy() {
        let mfs = MountableFileSystem::new();
        mfs.mount("/mnt", memory()).await.unwrap();
        mfs.write_all(Path::new("/file"), b"x").await.unwrap();
        let err = mfs.rename(Path::new("/file"), Path::new("/mnt")).await.unwrap_err();
        assert!(matches!(err, VfsError::Busy(_)));
    }

    #[tokio::test]
    async fn test_rename_within_mount() {
        let mfs = MountableFileSystem::new();
        mfs.mount("/a", memory()).await.unwrap();
        mfs.write_all(Path::new("/a/old.txt"), b"content").await.unwrap();

        mfs.rename(Path::new("/a/old.txt"), Path::new("/a/new.txt")).await.unwrap();

        assert!(!mfs.exists(Path::new("/a/old.txt")).await);
        assert_eq!(mfs.read_file(Path::new("/a/new.txt")).await.unwrap(), b"content");
    }

    #[tokio::test]
    async fn test_rename_file_across_mounts_copies() {
        let mfs = MountableFileSystem::new();
        let a = memory();
        let b = memory();
        mfs.mount("/a", a.clone()).await.unwrap();
        mfs.mount("/b", b.clone()).await.unwrap();
        mfs.write_all(Path::new("/a/file.txt"), b"moved").await.unwrap();

        mfs.rename(Path::new("/a/file.txt"), Path::new("/b/file.txt")).await.unwrap();

        assert!(!a.exists(Path::new("/file.txt")).await);
        assert_eq!(b.read_file(Path::new("/file.txt")).await.unwrap(), b"moved");
    }

    #[tokio::test]
    async fn test_rename_dir_across_mounts_fails() {
        let mfs = MountableFileSystem::new();
        mfs.mount("/a", memory()).await.unwrap();
        mfs.mount("/b", memory()).await.unwrap();
        mfs.mkdir(Path::new("/a/dir"), 0o755).await.unwrap();

        let result = mfs.rename(Path::new("/a/dir"), Path::new("/b/dir")).await;
        assert!(matches!(result, Err(VfsError::CrossDeviceLink)));
    }

    #[tokio::test]
    async fn test_umount() {
        let mfs = MountableFileSystem::new();
        let fs = memory();
        fs.write_all(Path::new("/test.txt"), b"data").await.unwrap();
        mfs.mount("/scratch", fs.clone()).await.unwrap();
        assert!(mfs.read_file(Path::new("/scratch/test.txt")).await.is_ok());

        let removed = mfs.umount("/scratch").await.unwrap();
        assert!(Arc::ptr_eq(&removed, &fs));
        assert!(mfs.read_file(Path::new("/scratch/test.txt")).await.is_err());

        let err = mfs.umount("/scratch").await.err().unwrap();
        assert!(matches!(err, VfsError::NotMounted(_)));
    }

    #[tokio::test]
    async fn test_remount_after_umount() {
        let mfs = MountableFileSystem::new();
        let fs = memory();
        mfs.mount("/a", fs.clone()).await.unwrap();
        assert!(matches!(
            mfs.mount("/b", fs.clone()).await,
            Err(VfsError::AlreadyMounted(_))
        ));
        mfs.umount("/a").await.unwrap();
        mfs.mount("/b", fs).await.unwrap();
        assert_eq!(mfs.mounts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_open_through_mount_syncs_to_backend() {
        let mfs = MountableFileSystem::new();
        let data = memory();
        mfs.mount("/data", data.clone()).await.unwrap();

        let mut file = mfs
            .open(Path::new("/data/log.txt"), OpenFlags::create(), 0o600)
            .await
            .unwrap();
        file.write(0, b"entry").unwrap();
        file.close().await.unwrap();

        assert_eq!(data.read_file(Path::new("/log.txt")).await.unwrap(), b"entry");
        assert_eq!(data.stat(Path::new("/log.txt")).await.unwrap().perm, 0o600);
    }

    /// Memory backend that can hide its root from `stat` and refuse unlinks.
    struct Quirky {
        inner: MemoryBackend,
        hide_root: bool,
        pin_files: bool,
    }

    impl Quirky {
        fn new(hide_root: bool, pin_files: bool) -> Self {
            Self {
                inner: MemoryBackend::new(),
                hide_root,
                pin_files,
            }
        }
    }

    #[async_trait]
    impl FileSystem for Quirky {
        fn name(&self) -> &str {
            "quirky"
        }

        fn capabilities(&self) -> Capabilities {
            self.inner.capabilities()
        }

        async fn stat(&self, path: &Path) -> VfsResult<FileAttr> {
            if self.hide_root && normalize_path(path) == "/" {
                return Err(VfsError::not_found("/"));
            }
            self.inner.stat(path).await
        }

        async fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
            self.inner.readdir(path).await
        }

        async fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>> {
            self.inner.read_file(path).await
        }

        async fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<()> {
            self.inner.mkdir(path, mode).await
        }

        async fn unlink(&self, path: &Path) -> VfsResult<()> {
            if self.pin_files {
                return Err(VfsError::permission_denied(normalize_path(path)));
            }
            self.inner.unlink(path).await
        }

        async fn rmdir(&self, path: &Path) -> VfsResult<()> {
            self.inner.rmdir(path).await
        }

        async fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
            self.inner.rename(from, to).await
        }

        async fn open(
            &self,
            path: &Path,
            flags: OpenFlags,
            mode: u32,
        ) -> VfsResult<Box<dyn FileHandle>> {
            self.inner.open(path, flags, mode).await
        }

        async fn sync(&self, path: &Path, data: &[u8], attr: &FileAttr) -> VfsResult<()> {
            self.inner.sync(path, data, attr).await
        }
    }

    #[tokio::test]
    async fn test_stat_mount_point_without_root_attrs() {
        let mfs = MountableFileSystem::new();
        mfs.mount("/hidden", Arc::new(Quirky::new(true, false)))
            .await
            .unwrap();

        let attr = mfs.stat(Path::new("/hidden")).await.unwrap();
        assert!(attr.is_dir());
        assert_eq!(attr.perm, 0o777);
        // Below the mount point the backend's answer stands.
        assert!(mfs.stat(Path::new("/hidden/x")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_readdir_on_file_without_mounts() {
        let mfs = MountableFileSystem::new();
        mfs.write_all(Path::new("/plain"), b"x").await.unwrap();
        assert!(matches!(
            mfs.readdir(Path::new("/plain")).await,
            Err(VfsError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_mkdir_on_materialized_ancestor() {
        let mfs = MountableFileSystem::new();
        mfs.mount("/a/b/mnt", memory()).await.unwrap();
        for ancestor in ["/a", "/a/b"] {
            assert!(matches!(
                mfs.mkdir(Path::new(ancestor), 0o755).await,
                Err(VfsError::AlreadyExists(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_implicit_root_cannot_be_remounted_elsewhere() {
        let root: Arc<dyn FileSystem> = Arc::new(MemoryBackend::new());
        let mfs = MountableFileSystem::with_root(Arc::clone(&root));

        let err = mfs.mount("/alias", Arc::clone(&root)).await.unwrap_err();
        assert!(matches!(err, VfsError::AlreadyMounted(_)));

        mfs.mkdir(Path::new("/dir"), 0o755).await.unwrap();
        assert!(!mfs.exists(Path::new("/alias/dir")).await);
        assert!(!root.exists(Path::new("/alias")).await);
    }

    #[tokio::test]
    async fn test_rename_from_read_only_mount_leaves_no_copy() {
        let mfs = MountableFileSystem::new();
        let kv = KeyValueBackend::in_memory().unwrap();
        kv.write_all(Path::new("/f"), b"kept").await.unwrap();
        mfs.mount("/ro", Arc::new(kv.with_read_only(true))).await.unwrap();
        mfs.mount("/rw", memory()).await.unwrap();

        let err = mfs.rename(Path::new("/ro/f"), Path::new("/rw/f")).await.unwrap_err();
        assert!(matches!(err, VfsError::ReadOnly));
        assert!(mfs.exists(Path::new("/ro/f")).await);
        assert!(!mfs.exists(Path::new("/rw/f")).await);

        // Read-only target is refused the same way.
        mfs.write_all(Path::new("/rw/g"), b"g").await.unwrap();
        let err = mfs.rename(Path::new("/rw/g"), Path::new("/ro/g")).await.unwrap_err();
        assert!(matches!(err, VfsError::ReadOnly));
        assert!(mfs.exists(Path::new("/rw/g")).await);
    }

    #[tokio::test]
    async fn test_rename_across_removes_copy_when_unlink_fails() {
        let mfs = MountableFileSystem::new();
        let pinned = Quirky::new(false, true);
        pinned.write_all(Path::new("/f"), b"pinned").await.unwrap();
        mfs.mount("/pinned", Arc::new(pinned)).await.unwrap();
        mfs.mount("/dest", memory()).await.unwrap();

        let err = mfs
            .rename(Path::new("/pinned/f"), Path::new("/dest/f"))
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::PermissionDenied(_)));
        assert_eq!(mfs.read_file(Path::new("/pinned/f")).await.unwrap(), b"pinned");
        assert!(!mfs.exists(Path::new("/dest/f")).await);
    }

    #[test]
    fn test_merge_listing_dedups() {
        let merged = merge_listing(
            vec![DirEntry::file("a"), DirEntry::directory("b")],
            vec!["a".to_string(), "c".to_string()],
        );
        assert_eq!(
            merged,
            vec![
                DirEntry::directory("a"),
                DirEntry::directory("b"),
                DirEntry::directory("c"),
            ]
        );
    }
}
