//! Key-value filesystem backend.
//!
//! Stores a directory tree in any flat [`KeyValueStore`]. Three kinds of
//! record live side by side in the store:
//!
//! | Key | Value |
//! |-----|-------|
//! | `/` | encoded [`Inode`] of the root directory |
//! | inode id (uuid) | encoded [`Inode`] |
//! | content id (uuid) | file bytes, or a directory listing |
//!
//! A directory listing is a JSON object mapping entry names to inode ids.
//! Renaming only rewrites listings; inode and content records never move.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use mountfs_types::{DirEntry, FileAttr, FileType, Inode, OpenFlags};

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::file::{BufferedFile, FileHandle};
use crate::vfs::ops::{Capabilities, FileSystem};
use crate::vfs::path::{file_name, is_prefix_of, normalize_path, parent, segments};

/// Key under which the root directory's inode is stored.
pub const ROOT_INODE_KEY: &str = "/";

/// Attempts at drawing a fresh id before giving up.
const MAX_ID_ATTEMPTS: usize = 5;

/// Name → inode id.
type Listing = BTreeMap<String, String>;

/// Flat byte store underneath a [`KeyValueBackend`].
///
/// Calls are made with the backend's lock held, so each filesystem
/// operation sees the store as a single transaction.
pub trait KeyValueStore: Send + 'static {
    /// Fetch a value.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store a value. With `overwrite` false an existing key is left alone
    /// and false is returned.
    fn put(&mut self, key: &str, value: Vec<u8>, overwrite: bool) -> bool;

    /// Remove a key. Missing keys are ignored.
    fn delete(&mut self, key: &str);
}

/// `HashMap`-backed store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records, metadata included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.data.get(key).cloned()
    }

    fn put(&mut self, key: &str, value: Vec<u8>, overwrite: bool) -> bool {
        if !overwrite && self.data.contains_key(key) {
            return false;
        }
        self.data.insert(key.to_string(), value);
        true
    }

    fn delete(&mut self, key: &str) {
        self.data.remove(key);
    }
}

/// Filesystem over a [`KeyValueStore`].
///
/// Clones share the store.
pub struct KeyValueBackend<S: KeyValueStore> {
    store: Arc<Mutex<S>>,
    read_only: bool,
}

impl<S: KeyValueStore> Clone for KeyValueBackend<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            read_only: self.read_only,
        }
    }
}

impl<S: KeyValueStore> std::fmt::Debug for KeyValueBackend<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueBackend")
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl KeyValueBackend<MemoryStore> {
    /// Backend over a fresh [`MemoryStore`].
    pub fn in_memory() -> VfsResult<Self> {
        Self::new(MemoryStore::new())
    }
}

impl<S: KeyValueStore> KeyValueBackend<S> {
    /// Wrap `store`, writing a root directory into it if it has none.
    pub fn new(mut store: S) -> VfsResult<Self> {
        match store.get(ROOT_INODE_KEY) {
            Some(bytes) => {
                let root = Inode::decode(&bytes)?;
                if !root.is_dir() {
                    return Err(VfsError::MalformedRecord(
                        "root inode is not a directory".into(),
                    ));
                }
            }
            None => {
                let content_id = put_new(&mut store, encode_listing(&Listing::new())?)?;
                let attr = FileAttr::directory(0o777);
                let root = Inode::now(content_id, 0, attr.mode() as u16)?;
                store.put(ROOT_INODE_KEY, root.encode(), true);
                tracing::debug!("initialized key-value root");
            }
        }
        Ok(Self {
            store: Arc::new(Mutex::new(store)),
            read_only: false,
        })
    }

    /// Reject every mutation with [`VfsError::ReadOnly`].
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Delete every entry, leaving an empty root directory.
    #[tracing::instrument(skip(self), name = "vfs.kv.empty")]
    pub fn empty(&self) -> VfsResult<()> {
        self.check_writable()?;
        self.with_store(|store| {
            let mut root = get_inode(store, ROOT_INODE_KEY)?;
            let removed = delete_children(store, &root)?;
            write_listing(store, ROOT_INODE_KEY, &mut root, &Listing::new())?;
            tracing::debug!(removed, "emptied key-value store");
            Ok(())
        })
    }

    fn check_writable(&self) -> VfsResult<()> {
        if self.read_only {
            Err(VfsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Run `f` with the store locked.
    fn with_store<T>(&self, f: impl FnOnce(&mut S) -> VfsResult<T>) -> VfsResult<T> {
        let mut store = self.store.lock();
        f(&mut store)
    }
}

// ============================================================================
// Record helpers
// ============================================================================

fn get_inode<S: KeyValueStore>(store: &S, id: &str) -> VfsResult<Inode> {
    let bytes = store
        .get(id)
        .ok_or_else(|| VfsError::MalformedRecord(format!("dangling inode id {id}")))?;
    Ok(Inode::decode(&bytes)?)
}

fn get_content<S: KeyValueStore>(store: &S, inode: &Inode) -> VfsResult<Vec<u8>> {
    store.get(inode.content_id()).ok_or_else(|| {
        VfsError::MalformedRecord(format!("missing content {}", inode.content_id()))
    })
}

fn get_listing<S: KeyValueStore>(store: &S, inode: &Inode) -> VfsResult<Listing> {
    let bytes = get_content(store, inode)?;
    serde_json::from_slice(&bytes).map_err(|e| VfsError::MalformedRecord(e.to_string()))
}

fn encode_listing(listing: &Listing) -> VfsResult<Vec<u8>> {
    serde_json::to_vec(listing).map_err(|e| VfsError::other(e.to_string()))
}

/// Store `value` under a freshly drawn id and return the id.
fn put_new<S: KeyValueStore>(store: &mut S, value: Vec<u8>) -> VfsResult<String> {
    for _ in 0..MAX_ID_ATTEMPTS {
        let id = Uuid::new_v4().to_string();
        if store.put(&id, value.clone(), false) {
            return Ok(id);
        }
    }
    Err(VfsError::other("unable to allocate a unique id"))
}

/// Walk from the root to `path`, returning its inode id and record.
fn lookup<S: KeyValueStore>(store: &S, path: &str) -> VfsResult<(String, Inode)> {
    let mut id = ROOT_INODE_KEY.to_string();
    let mut inode = get_inode(store, &id)?;
    let mut walked = String::new();

    for segment in segments(Path::new(path)) {
        if !inode.is_dir() {
            return Err(VfsError::not_a_directory(if walked.is_empty() {
                "/".to_string()
            } else {
                walked
            }));
        }
        walked.push('/');
        walked.push_str(&segment);

        let listing = get_listing(store, &inode)?;
        id = listing
            .get(&segment)
            .cloned()
            .ok_or_else(|| VfsError::not_found(walked.clone()))?;
        inode = get_inode(store, &id)?;
    }
    Ok((id, inode))
}

/// Look up `path`'s parent, which must be a directory.
fn lookup_parent<S: KeyValueStore>(store: &S, path: &str) -> VfsResult<(String, Inode, Listing)> {
    let parent_path = parent(path);
    let (id, inode) = lookup(store, parent_path)?;
    if !inode.is_dir() {
        return Err(VfsError::not_a_directory(parent_path));
    }
    let listing = get_listing(store, &inode)?;
    Ok((id, inode, listing))
}

/// Replace a directory's listing, keeping its size field current.
fn write_listing<S: KeyValueStore>(
    store: &mut S,
    id: &str,
    inode: &mut Inode,
    listing: &Listing,
) -> VfsResult<()> {
    let bytes = encode_listing(listing)?;
    let mut attr = inode.to_attr();
    attr.size = bytes.len() as u64;
    attr.touch();
    store.put(inode.content_id(), bytes, true);
    if inode.update(&attr) {
        store.put(id, inode.encode(), true);
    }
    Ok(())
}

/// Create a new entry at `path` holding `content`.
fn add_entry<S: KeyValueStore>(
    store: &mut S,
    path: &str,
    attr: &FileAttr,
    content: Vec<u8>,
) -> VfsResult<Inode> {
    let name = file_name(path);
    if name.is_empty() {
        return Err(VfsError::already_exists("/"));
    }
    let (parent_id, mut parent_inode, mut listing) = lookup_parent(store, path)?;
    if listing.contains_key(name) {
        return Err(VfsError::already_exists(path));
    }

    let size = content.len() as u32;
    let content_id = put_new(store, content)?;

    let uuid = Uuid::new_v4();
    let now = mountfs_types::time_to_millis(std::time::SystemTime::now());
    let inode = Inode::new(
        content_id,
        attr.dev,
        uuid.as_u128() as u32,
        size,
        attr.mode() as u16,
        now,
        now,
        now,
    )?;
    let inode_id = uuid.to_string();
    if !store.put(&inode_id, inode.encode(), false) {
        store.delete(inode.content_id());
        return Err(VfsError::other("inode id collision"));
    }

    listing.insert(name.to_string(), inode_id);
    write_listing(store, &parent_id, &mut parent_inode, &listing)?;
    Ok(inode)
}

/// Drop an inode and its content.
fn delete_records<S: KeyValueStore>(store: &mut S, id: &str, inode: &Inode) {
    store.delete(inode.content_id());
    store.delete(id);
}

/// Delete everything below directory `inode`, returning the entry count.
/// The directory's own listing is left as is.
fn delete_children<S: KeyValueStore>(store: &mut S, inode: &Inode) -> VfsResult<usize> {
    let mut removed = 0;
    for id in get_listing(store, inode)?.into_values() {
        let child = get_inode(store, &id)?;
        if child.is_dir() {
            removed += delete_children(store, &child)?;
        }
        delete_records(store, &id, &child);
        removed += 1;
    }
    Ok(removed)
}

/// Unlink `path` from its parent and delete its records.
fn remove_entry<S: KeyValueStore>(store: &mut S, path: &str, want_dir: bool) -> VfsResult<()> {
    let name = file_name(path);
    if name.is_empty() {
        return Err(VfsError::busy("/"));
    }
    let (parent_id, mut parent_inode, mut listing) = lookup_parent(store, path)?;
    let id = listing
        .get(name)
        .cloned()
        .ok_or_else(|| VfsError::not_found(path))?;
    let inode = get_inode(store, &id)?;

    match (want_dir, inode.is_dir()) {
        (false, true) => return Err(VfsError::is_a_directory(path)),
        (true, false) => return Err(VfsError::not_a_directory(path)),
        (true, true) if !get_listing(store, &inode)?.is_empty() => {
            return Err(VfsError::directory_not_empty(path));
        }
        _ => {}
    }

    listing.remove(name);
    write_listing(store, &parent_id, &mut parent_inode, &listing)?;
    delete_records(store, &id, &inode);
    Ok(())
}

fn rename_entry<S: KeyValueStore>(store: &mut S, from: &str, to: &str) -> VfsResult<()> {
    let from_name = file_name(from);
    let to_name = file_name(to);
    if from_name.is_empty() || to_name.is_empty() {
        return Err(VfsError::busy("/"));
    }
    if from == to {
        lookup(store, from)?;
        return Ok(());
    }
    if is_prefix_of(from, to) {
        return Err(VfsError::invalid_path(format!("cannot move {from} inside itself")));
    }

    let (from_parent_id, mut from_parent, mut from_listing) = lookup_parent(store, from)?;
    let moved_id = from_listing
        .get(from_name)
        .cloned()
        .ok_or_else(|| VfsError::not_found(from))?;
    let moved = get_inode(store, &moved_id)?;

    // Validate the destination before touching anything.
    let (_, _, to_listing) = lookup_parent(store, to)?;
    let replaced = match to_listing.get(to_name) {
        Some(existing_id) => {
            let existing = get_inode(store, existing_id)?;
            match (moved.is_dir(), existing.is_dir()) {
                (false, true) => return Err(VfsError::is_a_directory(to)),
                (true, false) => return Err(VfsError::not_a_directory(to)),
                (true, true) if !get_listing(store, &existing)?.is_empty() => {
                    return Err(VfsError::directory_not_empty(to));
                }
                _ => Some((existing_id.clone(), existing)),
            }
        }
        None => None,
    };

    from_listing.remove(from_name);
    write_listing(store, &from_parent_id, &mut from_parent, &from_listing)?;

    // Re-read: the destination parent may be the directory just rewritten.
    let (to_parent_id, mut to_parent, mut to_listing) = lookup_parent(store, to)?;
    to_listing.insert(to_name.to_string(), moved_id);
    write_listing(store, &to_parent_id, &mut to_parent, &to_listing)?;

    if let Some((id, inode)) = replaced {
        delete_records(store, &id, &inode);
    }
    Ok(())
}

#[async_trait]
impl<S: KeyValueStore> FileSystem for KeyValueBackend<S> {
    fn name(&self) -> &str {
        "key-value"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            read_only: self.read_only,
            synchronous: true,
            ..Capabilities::default()
        }
    }

    async fn stat(&self, path: &Path) -> VfsResult<FileAttr> {
        let path = normalize_path(path);
        self.with_store(|store| Ok(lookup(store, &path)?.1.to_attr()))
    }

    async fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let path = normalize_path(path);
        self.with_store(|store| {
            let (_, inode) = lookup(store, &path)?;
            if !inode.is_dir() {
                return Err(VfsError::not_a_directory(path.as_str()));
            }
            get_listing(store, &inode)?
                .into_iter()
                .map(|(name, id)| Ok(DirEntry::new(name, get_inode(store, &id)?.kind())))
                .collect()
        })
    }

    async fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let path = normalize_path(path);
        self.with_store(|store| {
            let (_, inode) = lookup(store, &path)?;
            if inode.is_dir() {
                return Err(VfsError::is_a_directory(path.as_str()));
            }
            get_content(store, &inode)
        })
    }

    #[tracing::instrument(skip(self), name = "kv.mkdir")]
    async fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<()> {
        self.check_writable()?;
        let path = normalize_path(path);
        self.with_store(|store| {
            let listing = encode_listing(&Listing::new())?;
            add_entry(store, &path, &FileAttr::directory(mode), listing)?;
            Ok(())
        })
    }

    async fn unlink(&self, path: &Path) -> VfsResult<()> {
        self.check_writable()?;
        let path = normalize_path(path);
        self.with_store(|store| remove_entry(store, &path, false))
    }

    async fn rmdir(&self, path: &Path) -> VfsResult<()> {
        self.check_writable()?;
        let path = normalize_path(path);
        self.with_store(|store| remove_entry(store, &path, true))
    }

    #[tracing::instrument(skip(self), name = "kv.rename")]
    async fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        self.check_writable()?;
        let from = normalize_path(from);
        let to = normalize_path(to);
        self.with_store(|store| rename_entry(store, &from, &to))
    }

    async fn open(
        &self,
        path: &Path,
        flags: OpenFlags,
        mode: u32,
    ) -> VfsResult<Box<dyn FileHandle>> {
        if flags.is_writeable() || flags.create {
            self.check_writable()?;
        }
        let path = normalize_path(path);

        let (attr, data) = self.with_store(|store| match lookup(store, &path) {
            Ok(_) if flags.create && flags.exclusive => Err(VfsError::already_exists(path.as_str())),
            Ok((_, inode)) if inode.is_dir() => Err(VfsError::is_a_directory(path.as_str())),
            Ok((_, inode)) => Ok((inode.to_attr(), get_content(store, &inode)?)),
            Err(e) if e.is_not_found() && flags.create => {
                let inode = add_entry(store, &path, &FileAttr::file(0, mode), Vec::new())?;
                Ok((inode.to_attr(), Vec::new()))
            }
            Err(e) => Err(e),
        })?;

        let fs: Arc<dyn FileSystem> = Arc::new(self.clone());
        Ok(Box::new(BufferedFile::new(
            fs,
            PathBuf::from(&path),
            flags,
            attr,
            data,
        )))
    }

    async fn sync(&self, path: &Path, data: &[u8], attr: &FileAttr) -> VfsResult<()> {
        self.check_writable()?;
        let path = normalize_path(path);
        self.with_store(|store| {
            let (id, mut inode) = lookup(store, &path)?;
            if inode.is_dir() {
                return Err(VfsError::is_a_directory(path.as_str()));
            }
            store.put(inode.content_id(), data.to_vec(), true);

            let attr = FileAttr {
                kind: FileType::File,
                size: data.len() as u64,
                ..attr.clone()
            };
            if inode.update(&attr) {
                store.put(&id, inode.encode(), true);
            }
            Ok(())
        })
    }
}
