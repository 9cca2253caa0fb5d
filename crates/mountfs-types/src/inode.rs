//! Compact binary inode record.
//!
//! Content-addressable stores keep a file's metadata apart from its data.
//! An [`Inode`] is that metadata: a 38-byte fixed header followed by the
//! ASCII id of the content blob.
//!
//! ```text
//! offset  size  field
//! ------  ----  ------------------------------
//!      0     4  dev         u32 LE
//!      4     4  ino         u32 LE
//!      8     4  size        u32 LE
//!     12     2  mode        u16 LE
//!     14     8  atime       f64 LE (ms since epoch)
//!     22     8  mtime       f64 LE (ms since epoch)
//!     30     8  ctime       f64 LE (ms since epoch)
//!     38     n  content id  ASCII, runs to end of buffer
//! ```
//!
//! The id length is implied by the buffer length, so a record must be stored
//! in a buffer of exactly [`Inode::encoded_len`] bytes.

use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::types::{FileAttr, FileType};

/// Size of the fixed-width header.
pub const INODE_HEADER_LEN: usize = 38;

/// Inode codec errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InodeError {
    /// Buffer could not be parsed as an inode.
    #[error("malformed inode record: {0}")]
    Malformed(String),

    /// Content ids are stored one byte per character.
    #[error("content id is not ASCII: {0:?}")]
    NonAsciiId(String),

    /// Target buffer too small for [`Inode::encode_into`].
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },
}

/// Backend-independent metadata record for one file or directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inode {
    content_id: String,
    dev: u32,
    ino: u32,
    /// Size in bytes.
    pub size: u32,
    /// Type nibble plus permission bits.
    pub mode: u16,
    /// Last access, milliseconds since the epoch.
    pub atime: f64,
    /// Last modification, milliseconds since the epoch.
    pub mtime: f64,
    /// Last status change, milliseconds since the epoch.
    pub ctime: f64,
}

impl Inode {
    /// Build a record. Fails if `content_id` is not ASCII.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        content_id: impl Into<String>,
        dev: u32,
        ino: u32,
        size: u32,
        mode: u16,
        atime: f64,
        mtime: f64,
        ctime: f64,
    ) -> Result<Self, InodeError> {
        let content_id = content_id.into();
        if !content_id.is_ascii() {
            return Err(InodeError::NonAsciiId(content_id));
        }
        Ok(Self {
            content_id,
            dev,
            ino,
            size,
            mode,
            atime,
            mtime,
            ctime,
        })
    }

    /// Build a record stamped with the current time for all three times.
    pub fn now(
        content_id: impl Into<String>,
        size: u32,
        mode: u16,
    ) -> Result<Self, InodeError> {
        let now = time_to_millis(SystemTime::now());
        Self::new(content_id, 0, 0, size, mode, now, now, now)
    }

    /// Id of the content blob this inode describes.
    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    /// Device identifier.
    pub fn dev(&self) -> u32 {
        self.dev
    }

    /// Inode number.
    pub fn ino(&self) -> u32 {
        self.ino
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        INODE_HEADER_LEN + self.content_id.len()
    }

    /// Serialize into a freshly allocated buffer of exactly
    /// [`encoded_len`](Self::encoded_len) bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len()];
        self.write_fields(&mut buf);
        buf
    }

    /// Serialize into the start of `buf`, returning the number of bytes written.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize, InodeError> {
        let needed = self.encoded_len();
        if buf.len() < needed {
            return Err(InodeError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }
        self.write_fields(&mut buf[..needed]);
        Ok(needed)
    }

    fn write_fields(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.dev.to_le_bytes());
        buf[4..8].copy_from_slice(&self.ino.to_le_bytes());
        buf[8..12].copy_from_slice(&self.size.to_le_bytes());
        buf[12..14].copy_from_slice(&self.mode.to_le_bytes());
        buf[14..22].copy_from_slice(&self.atime.to_le_bytes());
        buf[22..30].copy_from_slice(&self.mtime.to_le_bytes());
        buf[30..38].copy_from_slice(&self.ctime.to_le_bytes());
        buf[INODE_HEADER_LEN..].copy_from_slice(self.content_id.as_bytes());
    }

    /// Parse a record occupying the whole of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, InodeError> {
        if buf.len() < INODE_HEADER_LEN {
            return Err(InodeError::Malformed(format!(
                "{} bytes, header needs {}",
                buf.len(),
                INODE_HEADER_LEN
            )));
        }

        let id = &buf[INODE_HEADER_LEN..];
        if !id.is_ascii() {
            return Err(InodeError::Malformed("content id is not ASCII".into()));
        }
        // is_ascii above guarantees valid UTF-8.
        let content_id = String::from_utf8_lossy(id).into_owned();

        Ok(Self {
            content_id,
            dev: u32::from_le_bytes(le_array(buf, 0)),
            ino: u32::from_le_bytes(le_array(buf, 4)),
            size: u32::from_le_bytes(le_array(buf, 8)),
            mode: u16::from_le_bytes(le_array(buf, 12)),
            atime: f64::from_le_bytes(le_array(buf, 14)),
            mtime: f64::from_le_bytes(le_array(buf, 22)),
            ctime: f64::from_le_bytes(le_array(buf, 30)),
        })
    }

    /// Fold changed metadata into this record.
    ///
    /// Only size, mode and the three times are considered. Returns true if
    /// any of them differed, so callers can skip rewriting an unchanged
    /// record.
    pub fn update(&mut self, attr: &FileAttr) -> bool {
        let mut changed = false;

        let size = u32::try_from(attr.size).unwrap_or(u32::MAX);
        if self.size != size {
            self.size = size;
            changed = true;
        }

        let mode = attr.mode() as u16;
        if self.mode != mode {
            self.mode = mode;
            changed = true;
        }

        for (field, time) in [
            (&mut self.atime, attr.atime),
            (&mut self.mtime, attr.mtime),
            (&mut self.ctime, attr.ctime),
        ] {
            let ms = time_to_millis(time);
            // Stored times below nanosecond resolution come back through
            // `SystemTime` rounded; that is the same instant.
            if *field != ms && time_to_millis(millis_to_time(*field)) != ms {
                *field = ms;
                changed = true;
            }
        }

        changed
    }

    /// Project into the stat-like view used by the rest of the system.
    pub fn to_attr(&self) -> FileAttr {
        let mut attr = FileAttr::from_mode(u32::from(self.mode), u64::from(self.size));
        attr.atime = millis_to_time(self.atime);
        attr.mtime = millis_to_time(self.mtime);
        attr.ctime = millis_to_time(self.ctime);
        attr.dev = self.dev;
        attr.ino = self.ino;
        attr
    }

    /// File type encoded in the mode.
    pub fn kind(&self) -> FileType {
        FileType::from_mode(u32::from(self.mode))
    }

    /// Returns true if this inode describes a regular file.
    pub fn is_file(&self) -> bool {
        self.kind().is_file()
    }

    /// Returns true if this inode describes a directory.
    pub fn is_dir(&self) -> bool {
        self.kind().is_dir()
    }
}

fn le_array<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

/// Convert a timestamp to fractional milliseconds since the epoch.
pub fn time_to_millis(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => duration_millis(d),
        Err(e) => -duration_millis(e.duration()),
    }
}

fn duration_millis(d: Duration) -> f64 {
    d.as_secs() as f64 * 1000.0 + f64::from(d.subsec_nanos()) / 1_000_000.0
}

/// Convert fractional milliseconds since the epoch to a timestamp.
///
/// Whole milliseconds convert exactly in both directions. Non-finite or
/// unrepresentable values collapse to the epoch.
pub fn millis_to_time(ms: f64) -> SystemTime {
    if !ms.is_finite() {
        return UNIX_EPOCH;
    }
    let abs = ms.abs();
    let whole = abs.trunc();
    let secs = (whole / 1000.0).trunc();
    let rem_ms = whole - secs * 1000.0;
    let nanos = (rem_ms * 1_000_000.0 + (abs - whole) * 1_000_000.0).round();
    if secs >= u64::MAX as f64 {
        return UNIX_EPOCH;
    }
    let offset = Duration::from_secs(secs as u64) + Duration::from_nanos(nanos as u64);
    let time = if ms >= 0.0 {
        UNIX_EPOCH.checked_add(offset)
    } else {
        UNIX_EPOCH.checked_sub(offset)
    };
    time.unwrap_or(UNIX_EPOCH)
}
