//! Backup file naming.
//!
//! Backups live next to the live file and carry a suffix that encodes
//! their ordering key:
//!
//! ```text
//! <dir>/
//! ├─ app.log                        # live file
//! ├─ app.log.20240101_120000_000    # timestamp scheme
//! ├─ app.log.20240101_130512_417.gz # timestamp scheme, compressed
//! ├─ app.log.1                      # index scheme (newest)
//! └─ app.log.2.gz                   # index scheme, compressed
//! ```
//!
//! Ordering is always recovered from the name, never from file metadata.

use crate::error::{RotateError, RotateResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// `strftime` layout of the timestamp suffix, without the millisecond part.
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Length of a full timestamp suffix (`YYYYMMDD_HHMMSS_mmm`).
const STAMP_LEN: usize = 19;

/// How backups of one base path are named.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingScheme {
    /// Append-only UTC timestamp suffixes; never renamed once written.
    #[default]
    Timestamp,
    /// Numeric suffixes; `.1` is the newest and older backups shift up.
    Index,
}

/// Ordering key of a backup, recovered from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BackupId {
    /// Milliseconds since the Unix epoch (UTC).
    Timestamp(i64),
    /// Position in the index sequence, 1 = newest.
    Index(u32),
}

impl BackupId {
    /// Returns a key where larger means more recent.
    #[must_use]
    pub fn recency(&self) -> i64 {
        match self {
            Self::Timestamp(millis) => *millis,
            Self::Index(index) => -i64::from(*index),
        }
    }

    /// Returns the creation time encoded in a timestamp id.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(millis) => DateTime::<Utc>::from_timestamp_millis(*millis),
            Self::Index(_) => None,
        }
    }
}

/// A rotated-out segment of a log stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupFile {
    /// Location on disk.
    pub path: PathBuf,
    /// Ordering key.
    pub id: BackupId,
    /// Whether the backup holds a compressed stream.
    pub compressed: bool,
}

impl BackupFile {
    /// Returns the creation time for timestamp-named backups.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.id.created_at()
    }
}

/// Maps a base path and an ordering key to backup paths and back.
#[derive(Debug, Clone)]
pub struct BackupNamer {
    base: PathBuf,
    dir: PathBuf,
    file_name: String,
    scheme: NamingScheme,
    extension: String,
}

impl BackupNamer {
    /// Creates a namer for `base`.
    ///
    /// `extension` is appended to compressed backups (without the dot).
    ///
    /// # Errors
    ///
    /// Returns an error if `base` has no UTF-8 file name, or if `extension`
    /// is empty or starts with a dot.
    pub fn new(base: &Path, scheme: NamingScheme, extension: &str) -> RotateResult<Self> {
        if extension.is_empty() || extension.starts_with('.') {
            return Err(RotateError::invalid_config(format!(
                "compressed backup extension must be non-empty and without a leading dot: {extension:?}"
            )));
        }

        let file_name = base
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                RotateError::invalid_config(format!(
                    "base path has no UTF-8 file name: {}",
                    base.display()
                ))
            })?
            .to_string();

        let dir = match base.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Ok(Self {
            base: base.to_path_buf(),
            dir,
            file_name,
            scheme,
            extension: extension.to_string(),
        })
    }

    /// Returns the live file path.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Returns the directory that holds the live file and its backups.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the naming scheme.
    #[must_use]
    pub fn scheme(&self) -> NamingScheme {
        self.scheme
    }

    /// Returns the backup path for `id`.
    ///
    /// The same inputs always produce the same path.
    #[must_use]
    pub fn backup_path(&self, id: BackupId, compressed: bool) -> PathBuf {
        let suffix = match id {
            BackupId::Timestamp(millis) => format_stamp(millis),
            BackupId::Index(index) => index.to_string(),
        };
        let mut name = format!("{}.{}", self.file_name, suffix);
        if compressed {
            name.push('.');
            name.push_str(&self.extension);
        }
        self.dir.join(name)
    }

    /// Recognizes a backup belonging to this base path and scheme.
    ///
    /// Returns `None` for the live file, temporary files, other logs and
    /// backups named with the other scheme.
    #[must_use]
    pub fn parse(&self, path: &Path) -> Option<BackupFile> {
        let name = path.file_name()?.to_str()?;
        let rest = name.strip_prefix(self.file_name.as_str())?.strip_prefix('.')?;

        let (suffix, compressed) = match rest
            .strip_suffix(self.extension.as_str())
            .and_then(|s| s.strip_suffix('.'))
        {
            Some(stripped) => (stripped, true),
            None => (rest, false),
        };

        let id = match self.scheme {
            NamingScheme::Timestamp => BackupId::Timestamp(parse_stamp(suffix)?),
            NamingScheme::Index => BackupId::Index(parse_index(suffix)?),
        };

        Some(BackupFile {
            path: self.dir.join(name),
            id,
            compressed,
        })
    }

    /// Lists existing backups, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read. A missing
    /// directory yields an empty list.
    pub fn list(&self) -> io::Result<Vec<BackupFile>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut backups = Vec::new();
        for entry in entries {
            // Matched by name alone: an entry squatting on a backup name
            // still counts toward retention, which then reports it.
            if let Some(backup) = self.parse(&entry?.path()) {
                backups.push(backup);
            }
        }

        backups.sort_by_key(|b| b.id.recency());
        Ok(backups)
    }
}

/// Picks the stamp for the next timestamp backup.
///
/// Stamps are strictly increasing: if the clock has not advanced past
/// `last`, the stamp becomes `last + 1`.
#[must_use]
pub fn next_timestamp(now_millis: i64, last: Option<i64>) -> i64 {
    match last {
        Some(last) if now_millis <= last => last + 1,
        _ => now_millis,
    }
}

fn format_stamp(millis: i64) -> String {
    let secs = millis.div_euclid(1000);
    let ms = millis.rem_euclid(1000);
    match DateTime::<Utc>::from_timestamp(secs, 0) {
        Some(dt) => format!("{}_{:03}", dt.format(STAMP_FORMAT), ms),
        None => format!("{}", millis),
    }
}

fn parse_stamp(suffix: &str) -> Option<i64> {
    if suffix.len() != STAMP_LEN || !suffix.is_ascii() {
        return None;
    }
    let (date_time, millis) = suffix.split_at(STAMP_LEN - 4);
    let millis = millis.strip_prefix('_')?;
    if !millis.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let millis: i64 = millis.parse().ok()?;
    let naive = NaiveDateTime::parse_from_str(date_time, STAMP_FORMAT).ok()?;
    let stamp = naive.and_utc().timestamp_millis() + millis;

    // Reject anything that would not be produced by `format_stamp`.
    (format_stamp(stamp) == suffix).then_some(stamp)
}

fn parse_index(suffix: &str) -> Option<u32> {
    if suffix.is_empty() || suffix.starts_with('0') || !suffix.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    suffix.parse().ok()
}
