//! Shared metadata types for mountfs.
//!
//! A pure leaf crate: the stat-like view every backend reports
//! ([`FileAttr`]), directory entries, open flags, and the binary [`Inode`]
//! record that content-addressable stores persist alongside file data.
//!
//! # Key Types
//!
//! |----------------|-----------------------------------------------|
//! | Type           | Purpose                                       |
//! |----------------|-----------------------------------------------|
//! | [`FileAttr`]   | Metadata view (kind, size, perms, times, ids) |
//! | [`DirEntry`]   | One name in a directory listing               |
//! | [`OpenFlags`]  | How a file handle is opened                   |
//! | [`Inode`]      | 38-byte header + content id, bit-exact codec  |
//! |----------------|-----------------------------------------------|

pub mod inode;
pub mod types;

pub use inode::{millis_to_time, time_to_millis, Inode, InodeError, INODE_HEADER_LEN};
pub use types::{
    DirEntry, FileAttr, FileType, OpenFlags, ParseFlagsError, PERM_MASK, S_IFDIR, S_IFMT,
    S_IFREG,
};
