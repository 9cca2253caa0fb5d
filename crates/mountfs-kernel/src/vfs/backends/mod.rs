//! VFS backends.
//!
//! Backends implement [`FileSystem`](super::FileSystem) for different
//! storage types.

mod key_value;
mod memory;

pub use key_value::{KeyValueBackend, KeyValueStore, MemoryStore, ROOT_INODE_KEY};
pub use memory::MemoryBackend;
