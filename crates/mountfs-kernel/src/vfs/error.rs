//! VFS error types.

use mountfs_types::InodeError;
use std::io;
use thiserror::Error;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Filesystem is read-only.
    #[error("filesystem is read-only")]
    ReadOnly,

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Mutation would detach or disturb a mount point.
    #[error("resource busy: {0}")]
    Busy(String),

    /// Path already has a mount, or the backend is mounted elsewhere.
    #[error("already mounted: {0}")]
    AlreadyMounted(String),

    /// Nothing mounted at path.
    #[error("not mounted: {0}")]
    NotMounted(String),

    /// Stored inode record could not be decoded.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// Invalid path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Write or truncate would grow a file past the largest recordable size.
    #[error("file too large: {0}")]
    FileTooLarge(String),

    /// Operation spans two backends and cannot be carried out.
    #[error("cross-device link")]
    CrossDeviceLink,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    /// Create a Busy error.
    pub fn busy(path: impl Into<String>) -> Self {
        Self::Busy(path.into())
    }

    /// Create an AlreadyMounted error.
    pub fn already_mounted(path: impl Into<String>) -> Self {
        Self::AlreadyMounted(path.into())
    }

    /// Create a NotMounted error.
    pub fn not_mounted(path: impl Into<String>) -> Self {
        Self::NotMounted(path.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create a FileTooLarge error.
    pub fn file_too_large(path: impl Into<String>) -> Self {
        Self::FileTooLarge(path.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Returns true for the not-found kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// POSIX-style error code name, e.g. `"ENOENT"`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "ENOENT",
            Self::AlreadyExists(_) => "EEXIST",
            Self::PermissionDenied(_) => "EACCES",
            Self::ReadOnly => "EROFS",
            Self::NotADirectory(_) => "ENOTDIR",
            Self::IsADirectory(_) => "EISDIR",
            Self::DirectoryNotEmpty(_) => "ENOTEMPTY",
            Self::Busy(_) => "EBUSY",
            Self::AlreadyMounted(_) => "EBUSY",
            Self::NotMounted(_) => "EINVAL",
            Self::MalformedRecord(_) => "EIO",
            Self::InvalidPath(_) => "EINVAL",
            Self::FileTooLarge(_) => "EFBIG",
            Self::CrossDeviceLink => "EXDEV",
            Self::Io(_) => "EIO",
            Self::Other(_) => "EIO",
        }
    }
}

impl From<InodeError> for VfsError {
    fn from(e: InodeError) -> Self {
        Self::MalformedRecord(e.to_string())
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            VfsError::ReadOnly => {
                io::Error::new(io::ErrorKind::ReadOnlyFilesystem, "filesystem is read-only")
            }
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            VfsError::DirectoryNotEmpty(msg) => {
                io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg)
            }
            VfsError::Busy(msg) | VfsError::AlreadyMounted(msg) => {
                io::Error::new(io::ErrorKind::ResourceBusy, msg)
            }
            VfsError::NotMounted(msg) | VfsError::InvalidPath(msg) => {
                io::Error::new(io::ErrorKind::InvalidInput, msg)
            }
            VfsError::MalformedRecord(msg) => io::Error::new(io::ErrorKind::InvalidData, msg),
            VfsError::FileTooLarge(msg) => io::Error::new(io::ErrorKind::FileTooLarge, msg),
            VfsError::CrossDeviceLink => io::Error::new(io::ErrorKind::CrossesDevices, "cross-device link"),
            VfsError::Io(e) => e,
            VfsError::Other(msg) => io::Error::other(msg),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(VfsError::not_found("/x").code(), "ENOENT");
        assert_eq!(VfsError::busy("/mnt").code(), "EBUSY");
        assert_eq!(VfsError::is_a_directory("/d").code(), "EISDIR");
    }

    #[test]
    fn test_inode_error_maps_to_malformed() {
        let err: VfsError = InodeError::Malformed("short".into()).into();
        assert!(matches!(err, VfsError::MalformedRecord(_)));
    }

    #[test]
    fn test_into_io_error() {
        let io_err: io::Error = VfsError::busy("/mnt").into();
        assert_eq!(io_err.kind(), io::ErrorKind::ResourceBusy);

        let io_err: io::Error = VfsError::not_found("/x").into();
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);
    }
}
