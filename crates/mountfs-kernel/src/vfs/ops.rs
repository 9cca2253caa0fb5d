//! Filesystem capability contract.
//!
//! Every backing store implements [`FileSystem`], and so does the
//! [`MountableFileSystem`](super::MountableFileSystem) that composes them.
//! Backends differ only in the [`Capabilities`] they report and in error
//! detail, never in the operations they offer.

use async_trait::async_trait;
use std::path::Path;

use mountfs_types::{DirEntry, FileAttr, OpenFlags};

use super::file::FileHandle;
use super::VfsResult;

/// Static feature flags of a backend.
///
/// Queried once; a backend never changes its answers at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// All mutations fail with [`VfsError::ReadOnly`](super::VfsError::ReadOnly).
    pub read_only: bool,
    /// Supports extended properties on entries.
    pub properties: bool,
    /// Operations complete without suspending (no real I/O behind them).
    pub synchronous: bool,
    /// Supports symbolic links.
    pub symlinks: bool,
    /// Supports hard links.
    pub hard_links: bool,
}

/// Core filesystem operations.
///
/// Paths are absolute within the backend's own namespace. The mount table
/// rewrites caller paths before they reach a mounted backend, so a backend
/// mounted at `/mnt/data` sees `/file.txt` for `/mnt/data/file.txt`.
#[async_trait]
pub trait FileSystem: Send + Sync {
    // ========================================================================
    // Identity
    // ========================================================================

    /// Human-readable backend name, for logs and mount listings.
    fn name(&self) -> &str;

    /// Feature flags for this backend.
    fn capabilities(&self) -> Capabilities;

    /// Returns true if this filesystem is read-only.
    fn read_only(&self) -> bool {
        self.capabilities().read_only
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Get file attributes.
    async fn stat(&self, path: &Path) -> VfsResult<FileAttr>;

    /// List a directory.
    ///
    /// Order is backend-defined; callers needing determinism sort.
    async fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>>;

    /// Read a whole file.
    async fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Create a single directory. The parent must already exist.
    async fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<()>;

    /// Remove a file.
    async fn unlink(&self, path: &Path) -> VfsResult<()>;

    /// Remove an empty directory.
    async fn rmdir(&self, path: &Path) -> VfsResult<()>;

    /// Rename a file or directory.
    async fn rename(&self, from: &Path, to: &Path) -> VfsResult<()>;

    /// Open a file, creating it if `flags` allow.
    ///
    /// Mutations on the returned handle are buffered until
    /// [`FileHandle::sync`] or [`FileHandle::close`], which persist them
    /// through [`sync`](Self::sync) on this backend.
    async fn open(&self, path: &Path, flags: OpenFlags, mode: u32)
        -> VfsResult<Box<dyn FileHandle>>;

    /// Persist a file's content and metadata. The file must exist.
    async fn sync(&self, path: &Path, data: &[u8], attr: &FileAttr) -> VfsResult<()>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> bool {
        self.stat(path).await.is_ok()
    }

    /// Write entire file contents, creating or truncating the file.
    async fn write_all(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        let mut file = self.open(path, OpenFlags::create_truncate(), 0o644).await?;
        file.write(0, data)?;
        file.close().await
    }
}
