//! Open file handles.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mountfs_types::{FileAttr, OpenFlags};

use super::error::{VfsError, VfsResult};
use super::ops::FileSystem;

/// Largest file a handle will grow to; sizes are recorded as `u32`.
pub const MAX_FILE_LEN: u64 = u32::MAX as u64;

/// An open file.
///
/// Reads and writes operate on a local buffer; `sync` and `close` push the
/// buffer back to the backend that opened it.
#[async_trait]
pub trait FileHandle: Send + Sync {
    /// Path within the owning backend.
    fn path(&self) -> &Path;

    /// Flags the handle was opened with.
    fn flags(&self) -> OpenFlags;

    /// Current (possibly unsynced) attributes.
    fn stat(&self) -> FileAttr;

    /// Read up to `size` bytes at `offset`. Short at EOF.
    fn read(&self, offset: u64, size: usize) -> VfsResult<Vec<u8>>;

    /// Write `data` at `offset` (at the end in append mode).
    /// Returns the number of bytes written.
    fn write(&mut self, offset: u64, data: &[u8]) -> VfsResult<usize>;

    /// Truncate or zero-extend to `size` bytes.
    fn truncate(&mut self, size: u64) -> VfsResult<()>;

    /// True if there are unsynced mutations.
    fn is_dirty(&self) -> bool;

    /// Persist buffered mutations.
    async fn sync(&mut self) -> VfsResult<()>;

    /// Sync and release the handle. Further use fails.
    async fn close(&mut self) -> VfsResult<()>;
}

/// Whole-file buffered handle shared by the in-crate backends.
pub struct BufferedFile {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    flags: OpenFlags,
    attr: FileAttr,
    data: Vec<u8>,
    dirty: bool,
    closed: bool,
}

impl fmt::Debug for BufferedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedFile")
            .field("backend", &self.fs.name())
            .field("path", &self.path)
            .field("flags", &self.flags)
            .field("len", &self.data.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl BufferedFile {
    /// Wrap preloaded content. Applies `flags.truncate` immediately.
    pub fn new(
        fs: Arc<dyn FileSystem>,
        path: impl Into<PathBuf>,
        flags: OpenFlags,
        attr: FileAttr,
        data: Vec<u8>,
    ) -> Self {
        let mut file = Self {
            fs,
            path: path.into(),
            flags,
            attr,
            data,
            dirty: false,
            closed: false,
        };
        if flags.truncate && !file.data.is_empty() {
            file.data.clear();
            file.attr.size = 0;
            file.attr.touch();
            file.dirty = true;
        }
        file
    }

    fn check_open(&self) -> VfsResult<()> {
        if self.closed {
            return Err(VfsError::other(format!(
                "file handle closed: {}",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn check_writeable(&self) -> VfsResult<()> {
        self.check_open()?;
        if !self.flags.is_writeable() {
            return Err(VfsError::permission_denied(format!(
                "not opened for writing: {}",
                self.path.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FileHandle for BufferedFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn flags(&self) -> OpenFlags {
        self.flags
    }

    fn stat(&self) -> FileAttr {
        self.attr.clone()
    }

    fn read(&self, offset: u64, size: usize) -> VfsResult<Vec<u8>> {
        self.check_open()?;
        if !self.flags.read {
            return Err(VfsError::permission_denied(format!(
                "not opened for reading: {}",
                self.path.display()
            )));
        }
        let start = usize::try_from(offset)
            .unwrap_or(usize::MAX)
            .min(self.data.len());
        let end = start.saturating_add(size).min(self.data.len());
        Ok(self.data[start..end].to_vec())
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> VfsResult<usize> {
        self.check_writeable()?;
        let offset = if self.flags.append {
            self.data.len() as u64
        } else {
            offset
        };
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|end| *end <= MAX_FILE_LEN)
            .ok_or_else(|| {
                VfsError::file_too_large(format!(
                    "{}: write of {} bytes at {offset}",
                    self.path.display(),
                    data.len()
                ))
            })?;
        let (offset, end) = (offset as usize, end as usize);
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[offset..end].copy_from_slice(data);
        self.attr.size = self.data.len() as u64;
        self.attr.touch();
        self.dirty = true;
        Ok(data.len())
    }

    fn truncate(&mut self, size: u64) -> VfsResult<()> {
        self.check_writeable()?;
        if size > MAX_FILE_LEN {
            return Err(VfsError::file_too_large(format!(
                "{}: truncate to {size}",
                self.path.display()
            )));
        }
        let size = size as usize;
        self.data.resize(size, 0);
        self.attr.size = size as u64;
        self.attr.touch();
        self.dirty = true;
        Ok(())
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    async fn sync(&mut self) -> VfsResult<()> {
        self.check_open()?;
        if self.dirty {
            self.fs.sync(&self.path, &self.data, &self.attr).await?;
            self.dirty = false;
        }
        Ok(())
    }

    async fn close(&mut self) -> VfsResult<()> {
        self.sync().await?;
        self.closed = true;
        Ok(())
    }
}
