//! # mountfs-kernel
//!
//! Mountable virtual filesystem.
//!
//! One `/`-rooted namespace assembled from independent backends:
//! - The implicit root owns every path no mount claims
//! - Backends mount at paths like `/mnt/project`, nested to any depth
//! - Paths route to the longest matching mount, rewritten relative to it
//! - Mount points are pinned: they can't be removed or renamed while mounted
//!
//! Layouts can be built in code or loaded from TOML via [`config`].

pub mod config;
pub mod vfs;

pub use mountfs_types::{DirEntry, FileAttr, FileType, Inode, OpenFlags};
pub use config::{BackendKind, ConfigError, MountConfig, MountEntryConfig, RootConfig};
pub use vfs::{
    backends::{KeyValueBackend, KeyValueStore, MemoryBackend, MemoryStore},
    Capabilities, FileHandle, FileSystem, MountInfo, MountTable, MountableFileSystem, VfsError,
    VfsResult,
};
