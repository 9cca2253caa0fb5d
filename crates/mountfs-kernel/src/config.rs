//! Declarative mount layouts.
//!
//! A layout names the backend for the implicit root and a list of mounts:
//!
//! ```toml
//! [root]
//! backend = "memory"
//!
//! [[mount]]
//! path = "/data"
//! backend = "key-value"
//! read_only = false
//! ```
//!
//! Mounts are applied in file order, so a mount nested inside another must
//! come after it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strum::{Display, EnumString};
use thiserror::Error;

use crate::vfs::{FileSystem, KeyValueBackend, MemoryBackend, MountableFileSystem, VfsError};

/// Errors from loading or applying a layout.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Layout file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Layout is not valid TOML or does not match the schema.
    #[error("invalid mount config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Layout is well-formed but asks for something no backend offers.
    #[error("invalid mount {path}: {reason}")]
    Invalid { path: String, reason: String },

    /// A backend could not be created or mounted.
    #[error("mount {path} failed: {source}")]
    Mount {
        path: String,
        #[source]
        source: VfsError,
    },
}

/// Backend types a layout can name.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum BackendKind {
    /// [`MemoryBackend`].
    #[default]
    Memory,
    /// [`KeyValueBackend`] over an in-memory store.
    KeyValue,
}

/// The implicit root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootConfig {
    #[serde(default)]
    pub backend: BackendKind,
}

/// One `[[mount]]` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntryConfig {
    pub path: String,
    pub backend: BackendKind,
    #[serde(default)]
    pub read_only: bool,
}

/// A whole layout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    #[serde(default)]
    pub root: RootConfig,
    #[serde(default, rename = "mount")]
    pub mounts: Vec<MountEntryConfig>,
}

impl MountConfig {
    /// Parse a layout from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a layout file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), mounts = config.mounts.len(), "loaded mount config");
        Ok(config)
    }
}

fn build_backend(
    path: &str,
    kind: BackendKind,
    read_only: bool,
) -> Result<Arc<dyn FileSystem>, ConfigError> {
    match kind {
        BackendKind::Memory if read_only => Err(ConfigError::Invalid {
            path: path.to_string(),
            reason: format!("{kind} backend cannot be read-only"),
        }),
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
        BackendKind::KeyValue => {
            let backend = KeyValueBackend::in_memory().map_err(|source| ConfigError::Mount {
                path: path.to_string(),
                source,
            })?;
            Ok(Arc::new(backend.with_read_only(read_only)))
        }
    }
}

impl MountableFileSystem {
    /// Build a namespace from a layout.
    #[tracing::instrument(skip_all, name = "vfs.from_config")]
    pub async fn from_config(config: &MountConfig) -> Result<Self, ConfigError> {
        let root = build_backend("/", config.root.backend, false)?;
        let fs = Self::with_root(root);

        for entry in &config.mounts {
            let backend = build_backend(&entry.path, entry.backend, entry.read_only)?;
            fs.mount(&entry.path, backend)
                .await
                .map_err(|source| ConfigError::Mount {
                    path: entry.path.clone(),
                    source,
                })?;
        }

        tracing::info!(root = %config.root.backend, mounts = config.mounts.len(), "namespace built");
        Ok(fs)
    }
}
