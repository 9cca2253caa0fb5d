//! In-memory filesystem backend.
//!
//! The default implicit root of a [`MountableFileSystem`](crate::vfs::MountableFileSystem)
//! and the workhorse for tests. All data is ephemeral.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mountfs_types::{DirEntry, FileAttr, FileType, OpenFlags};

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::file::{BufferedFile, FileHandle};
use crate::vfs::ops::{Capabilities, FileSystem};
use crate::vfs::path::segments;

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, attr: FileAttr },
    Directory { attr: FileAttr },
}

impl Entry {
    fn attr(&self) -> &FileAttr {
        match self {
            Entry::File { attr, .. } => attr,
            Entry::Directory { attr } => attr,
        }
    }

    fn kind(&self) -> FileType {
        match self {
            Entry::File { .. } => FileType::File,
            Entry::Directory { .. } => FileType::Directory,
        }
    }
}

/// In-memory filesystem backend.
///
/// Clones share the same tree; open file handles hold a clone so their
/// `sync` lands back here.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    entries: Arc<RwLock<HashMap<PathBuf, Entry>>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(
            PathBuf::new(),
            Entry::Directory {
                attr: FileAttr::directory(0o755),
            },
        );
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Map key: the normalized path without its leading `/`. Root is empty.
    fn normalize(path: &Path) -> PathBuf {
        segments(path).into_iter().collect()
    }

    /// Get the path string for error messages.
    fn path_str(path: &Path) -> String {
        format!("/{}", path.display())
    }

    /// Verify that the parent of `path` exists and is a directory.
    fn check_parent(entries: &HashMap<PathBuf, Entry>, path: &Path) -> VfsResult<()> {
        let parent = path.parent().unwrap_or(Path::new(""));
        match entries.get(parent) {
            Some(Entry::Directory { .. }) => Ok(()),
            Some(_) => Err(VfsError::not_a_directory(Self::path_str(parent))),
            None => Err(VfsError::not_found(Self::path_str(parent))),
        }
    }

    fn has_children(entries: &HashMap<PathBuf, Entry>, path: &Path) -> bool {
        entries
            .keys()
            .any(|k| k.parent() == Some(path) && k.as_path() != path)
    }
}

#[async_trait]
impl FileSystem for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            synchronous: true,
            ..Capabilities::default()
        }
    }

    async fn stat(&self, path: &Path) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path);
        self.entries
            .read()
            .get(&normalized)
            .map(|e| e.attr().clone())
            .ok_or_else(|| VfsError::not_found(Self::path_str(&normalized)))
    }

    async fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let normalized = Self::normalize(path);
        let entries = self.entries.read();

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => {
                return Err(VfsError::not_a_directory(Self::path_str(&normalized)));
            }
            None => {
                return Err(VfsError::not_found(Self::path_str(&normalized)));
            }
        }

        // Find all direct children
        let mut result: Vec<DirEntry> = entries
            .iter()
            .filter(|(entry_path, _)| {
                entry_path.parent() == Some(normalized.as_path()) && **entry_path != normalized
            })
            .filter_map(|(entry_path, entry)| {
                entry_path
                    .file_name()
                    .map(|name| DirEntry::new(name.to_string_lossy(), entry.kind()))
            })
            .collect();

        // Sort for consistent ordering
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let normalized = Self::normalize(path);
        match self.entries.read().get(&normalized) {
            Some(Entry::File { data, .. }) => Ok(data.clone()),
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    async fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write();

        if entries.contains_key(&normalized) {
            return Err(VfsError::already_exists(Self::path_str(&normalized)));
        }
        Self::check_parent(&entries, &normalized)?;

        entries.insert(
            normalized,
            Entry::Directory {
                attr: FileAttr::directory(mode),
            },
        );
        Ok(())
    }

    async fn unlink(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write();

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            Some(Entry::File { .. }) => {
                entries.remove(&normalized);
                Ok(())
            }
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    async fn rmdir(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize(path);

        if normalized.as_os_str().is_empty() {
            return Err(VfsError::busy("/"));
        }

        let mut entries = self.entries.write();

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => {
                return Err(VfsError::not_a_directory(Self::path_str(&normalized)));
            }
            None => {
                return Err(VfsError::not_found(Self::path_str(&normalized)));
            }
        }

        if Self::has_children(&entries, &normalized) {
            return Err(VfsError::directory_not_empty(Self::path_str(&normalized)));
        }

        entries.remove(&normalized);
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let from_normalized = Self::normalize(from);
        let to_normalized = Self::normalize(to);

        let mut entries = self.entries.write();

        let source_is_dir = match entries.get(&from_normalized) {
            Some(entry) => entry.kind().is_dir(),
            None => return Err(VfsError::not_found(Self::path_str(&from_normalized))),
        };
        if from_normalized.as_os_str().is_empty() {
            return Err(VfsError::busy("/"));
        }
        if from_normalized == to_normalized {
            return Ok(());
        }
        if to_normalized.starts_with(&from_normalized) {
            return Err(VfsError::invalid_path(format!(
                "cannot move {} inside itself",
                Self::path_str(&from_normalized)
            )));
        }
        Self::check_parent(&entries, &to_normalized)?;

        // Existing destination: only like-for-like replacement is allowed.
        match entries.get(&to_normalized) {
            Some(Entry::Directory { .. }) if !source_is_dir => {
                return Err(VfsError::is_a_directory(Self::path_str(&to_normalized)));
            }
            Some(Entry::Directory { .. }) => {
                if Self::has_children(&entries, &to_normalized) {
                    return Err(VfsError::directory_not_empty(Self::path_str(
                        &to_normalized,
                    )));
                }
            }
            Some(Entry::File { .. }) if source_is_dir => {
                return Err(VfsError::not_a_directory(Self::path_str(&to_normalized)));
            }
            _ => {}
        }

        let Some(mut entry) = entries.remove(&from_normalized) else {
            return Err(VfsError::not_found(Self::path_str(&from_normalized)));
        };

        if source_is_dir {
            let children: Vec<_> = entries
                .keys()
                .filter(|k| k.starts_with(&from_normalized))
                .cloned()
                .collect();

            for child in children {
                if let Some(child_entry) = entries.remove(&child) {
                    if let Ok(relative) = child.strip_prefix(&from_normalized) {
                        entries.insert(to_normalized.join(relative), child_entry);
                    }
                }
            }
        }

        match &mut entry {
            Entry::File { attr, .. } | Entry::Directory { attr } => {
                attr.ctime = std::time::SystemTime::now();
            }
        }
        entries.insert(to_normalized, entry);
        Ok(())
    }

    async fn open(
        &self,
        path: &Path,
        flags: OpenFlags,
        mode: u32,
    ) -> VfsResult<Box<dyn FileHandle>> {
        let normalized = Self::normalize(path);

        let (attr, data) = {
            let mut entries = self.entries.write();
            match entries.get(&normalized) {
                Some(Entry::File { .. }) if flags.create && flags.exclusive => {
                    return Err(VfsError::already_exists(Self::path_str(&normalized)));
                }
                Some(Entry::File { data, attr }) => (attr.clone(), data.clone()),
                Some(Entry::Directory { .. }) => {
                    return Err(VfsError::is_a_directory(Self::path_str(&normalized)));
                }
                None if flags.create => {
                    Self::check_parent(&entries, &normalized)?;
                    let attr = FileAttr::file(0, mode);
                    entries.insert(
                        normalized.clone(),
                        Entry::File {
                            data: Vec::new(),
                            attr: attr.clone(),
                        },
                    );
                    (attr, Vec::new())
                }
                None => return Err(VfsError::not_found(Self::path_str(&normalized))),
            }
        };

        let fs: Arc<dyn FileSystem> = Arc::new(self.clone());
        Ok(Box::new(BufferedFile::new(
            fs,
            PathBuf::from("/").join(&normalized),
            flags,
            attr,
            data,
        )))
    }

    async fn sync(&self, path: &Path, data: &[u8], attr: &FileAttr) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write();

        match entries.get_mut(&normalized) {
            Some(Entry::File {
                data: stored,
                attr: stored_attr,
            }) => {
                *stored = data.to_vec();
                *stored_attr = FileAttr {
                    kind: FileType::File,
                    size: data.len() as u64,
                    ..attr.clone()
                };
                Ok(())
            }
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }
}
