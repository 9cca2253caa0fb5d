//! Virtual Filesystem abstraction.
//!
//! A single `/`-rooted namespace assembled from independent backends.
//! Key components:
//!
//! - [`FileSystem`] - Capability contract every backend implements
//! - [`MountTable`] - Routes paths to backends by longest prefix
//! - [`MountableFileSystem`] - The composite namespace, itself a [`FileSystem`]
//! - [`MemoryBackend`] - In-memory tree (default root, testing)
//! - [`KeyValueBackend`] - Tree persisted as [`Inode`](mountfs_types::Inode)
//!   records in a flat key-value store
//!
//! ## Design Decisions
//!
//! - **Path-based**: Callers address entries by path. Inodes are a storage
//!   detail of the key-value backend, not part of the contract.
//! - **Buffered handles**: `open` returns a [`FileHandle`] that buffers
//!   mutations and persists them through [`FileSystem::sync`].
//! - **Longest-prefix routing**: the most specific mount wins, matched on
//!   whole path segments.

pub mod backends;
mod error;
mod file;
mod mount;
mod mountable;
mod ops;
pub mod path;

pub use backends::{KeyValueBackend, KeyValueStore, MemoryBackend, MemoryStore};
pub use error::{VfsError, VfsResult};
pub use file::{BufferedFile, FileHandle};
pub use mount::{MountInfo, MountTable, Resolved};
pub use mountable::MountableFileSystem;
pub use ops::{Capabilities, FileSystem};
