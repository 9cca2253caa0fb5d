//! Core metadata types.
//!
//! These are the backend-neutral shapes every filesystem in mountfs speaks:
//! a stat-like [`FileAttr`], directory entries, and open flags.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::SystemTime;
use thiserror::Error;

/// Mask selecting the file-type nibble of a mode.
pub const S_IFMT: u32 = 0xF000;
/// File-type tag for regular files.
pub const S_IFREG: u32 = 0x8000;
/// File-type tag for directories.
pub const S_IFDIR: u32 = 0x4000;
/// Mask selecting permission bits (including setuid/setgid/sticky).
pub const PERM_MASK: u32 = 0o7777;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileType {
    /// Derive the type from a full mode value.
    ///
    /// Anything whose type nibble is not the directory tag is a file.
    pub fn from_mode(mode: u32) -> Self {
        if mode & S_IFMT == S_IFDIR {
            FileType::Directory
        } else {
            FileType::File
        }
    }

    /// The type tag for this kind, suitable for OR-ing into a mode.
    pub fn mode_bits(&self) -> u32 {
        match self {
            FileType::File => S_IFREG,
            FileType::Directory => S_IFDIR,
        }
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// File attributes (metadata).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttr {
    /// Size in bytes.
    pub size: u64,
    /// File type.
    pub kind: FileType,
    /// Permission bits (e.g., 0o644).
    pub perm: u32,
    /// Last access time.
    pub atime: SystemTime,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last status change time.
    pub ctime: SystemTime,
    /// Number of hard links.
    pub nlink: u32,
    /// Device identifier of the owning store.
    pub dev: u32,
    /// Inode number within the owning store.
    pub ino: u32,
}

impl FileAttr {
    /// Create attributes for a new file.
    pub fn file(size: u64, perm: u32) -> Self {
        Self::new(FileType::File, size, perm)
    }

    /// Create attributes for a new directory.
    pub fn directory(perm: u32) -> Self {
        let mut attr = Self::new(FileType::Directory, 0, perm);
        attr.nlink = 2; // . and ..
        attr
    }

    /// Build attributes from a full mode value (type nibble + permissions).
    pub fn from_mode(mode: u32, size: u64) -> Self {
        match FileType::from_mode(mode) {
            FileType::Directory => {
                let mut attr = Self::directory(mode & PERM_MASK);
                attr.size = size;
                attr
            }
            FileType::File => Self::file(size, mode & PERM_MASK),
        }
    }

    fn new(kind: FileType, size: u64, perm: u32) -> Self {
        let now = SystemTime::now();
        Self {
            size,
            kind,
            perm: perm & PERM_MASK,
            atime: now,
            mtime: now,
            ctime: now,
            nlink: 1,
            dev: 0,
            ino: 0,
        }
    }

    /// Full mode: type tag OR permission bits.
    pub fn mode(&self) -> u32 {
        self.kind.mode_bits() | (self.perm & PERM_MASK)
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Bump mtime and ctime to now.
    pub fn touch(&mut self) {
        let now = SystemTime::now();
        self.mtime = now;
        self.ctime = now;
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Create a file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, FileType::File)
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, FileType::Directory)
    }
}

/// Open file flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    /// Read access requested.
    pub read: bool,
    /// Write access requested.
    pub write: bool,
    /// Append mode.
    pub append: bool,
    /// Create if not exists.
    pub create: bool,
    /// Truncate on open.
    pub truncate: bool,
    /// Exclusive create (fail if exists).
    pub exclusive: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self {
            read: true,
            write: false,
            append: false,
            create: false,
            truncate: false,
            exclusive: false,
        }
    }
}

impl OpenFlags {
    /// Read-only access.
    pub fn read() -> Self {
        Self::default()
    }

    /// Write access (also enables read).
    pub fn write() -> Self {
        Self {
            read: true,
            write: true,
            ..Default::default()
        }
    }

    /// Create with write access.
    pub fn create() -> Self {
        Self {
            read: true,
            write: true,
            create: true,
            ..Default::default()
        }
    }

    /// Create exclusively (fail if exists).
    pub fn create_exclusive() -> Self {
        Self {
            read: true,
            write: true,
            create: true,
            exclusive: true,
            ..Default::default()
        }
    }

    /// Create and truncate.
    pub fn create_truncate() -> Self {
        Self {
            read: true,
            write: true,
            create: true,
            truncate: true,
            ..Default::default()
        }
    }

    /// Append, creating if needed.
    pub fn append() -> Self {
        Self {
            read: false,
            write: true,
            append: true,
            create: true,
            ..Default::default()
        }
    }

    /// Returns true if the handle may mutate the file.
    pub fn is_writeable(&self) -> bool {
        self.write || self.append
    }
}

/// Error returned when parsing a flag string such as `"w+"`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid open flags: {0:?}")]
pub struct ParseFlagsError(pub String);

impl FromStr for OpenFlags {
    type Err = ParseFlagsError;

    /// Parse POSIX `fopen`-style flag strings (`r`, `r+`, `w`, `wx`, `w+`,
    /// `wx+`, `a`, `ax`, `a+`, `ax+`). `s` (synchronous) is accepted and
    /// ignored after `r`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let flags = match s {
            "r" | "rs" => Self::read(),
            "r+" | "rs+" => Self::write(),
            "w" => Self {
                read: false,
                ..Self::create_truncate()
            },
            "wx" | "xw" => Self {
                read: false,
                truncate: true,
                ..Self::create_exclusive()
            },
            "w+" => Self::create_truncate(),
            "wx+" | "xw+" => Self {
                truncate: true,
                ..Self::create_exclusive()
            },
            "a" => Self::append(),
            "ax" | "xa" => Self {
                exclusive: true,
                ..Self::append()
            },
            "a+" => Self {
                read: true,
                ..Self::append()
            },
            "ax+" | "xa+" => Self {
                read: true,
                exclusive: true,
                ..Self::append()
            },
            other => return Err(ParseFlagsError(other.to_string())),
        };
        Ok(flags)
    }
}
