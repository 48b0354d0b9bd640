//! Rotation events.

use crate::namer::BackupId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Why a rotation happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationReason {
    /// The next write would have pushed the live file past `max_size`.
    SizeExceeded,
    /// [`crate::RotatingWriter::rotate`] was called.
    Manual,
}

/// Describes one rotation. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationEvent {
    /// Size of the live file when it was rotated out.
    pub old_size: u64,
    /// What triggered the rotation.
    pub reason: RotationReason,
    /// Where the old live file ended up, if it was moved.
    pub backup: Option<PathBuf>,
    /// Ordering key of the new backup.
    pub backup_id: Option<BackupId>,
    /// Whether the new backup is compressed.
    pub compressed: bool,
    /// Backups deleted by synchronous retention.
    pub deleted: Vec<PathBuf>,
    /// First failure, if any step went wrong.
    pub error: Option<String>,
    /// When the rotation finished.
    pub at: DateTime<Utc>,
}

impl RotationEvent {
    pub(crate) fn new(old_size: u64, reason: RotationReason) -> Self {
        Self {
            old_size,
            reason,
            backup: None,
            backup_id: None,
            compressed: false,
            deleted: Vec::new(),
            error: None,
            at: Utc::now(),
        }
    }

    /// Returns true if every step completed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
