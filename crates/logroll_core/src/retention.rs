//! Backup retention.
//!
//! The [`RetentionManager`] bounds the backups kept for a base path by
//! count and, for timestamp-named backups, by age. Candidates are always
//! chosen by the ordering key encoded in the file name.

use crate::compress::temp_target;
use crate::error::{DeleteFailure, RotateError, RotateResult};
use crate::namer::{BackupFile, BackupNamer};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Limits on retained backups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum number of backups to keep (0 = unbounded).
    pub max_backups: usize,
    /// Maximum age of a backup, measured from its name.
    pub max_age: Option<Duration>,
}

impl RetentionPolicy {
    /// Creates a count-only policy.
    #[must_use]
    pub const fn keep(max_backups: usize) -> Self {
        Self {
            max_backups,
            max_age: None,
        }
    }

    /// Returns true if nothing would ever be deleted.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.max_backups == 0 && self.max_age.is_none()
    }
}

/// Deletes backups that fall outside a [`RetentionPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct RetentionManager {
    policy: RetentionPolicy,
}

impl RetentionManager {
    /// Creates a manager for `policy`.
    #[must_use]
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy.
    #[must_use]
    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Selects the backups to delete.
    ///
    /// `backups` must be sorted oldest first, as returned by
    /// [`BackupNamer::list`]. The result keeps that order.
    #[must_use]
    pub fn plan(&self, backups: &[BackupFile], now: DateTime<Utc>) -> Vec<BackupFile> {
        let excess = if self.policy.max_backups > 0 {
            backups.len().saturating_sub(self.policy.max_backups)
        } else {
            0
        };

        let cutoff = self
            .policy
            .max_age
            .and_then(|age| chrono::Duration::from_std(age).ok())
            .and_then(|age| now.checked_sub_signed(age));

        backups
            .iter()
            .enumerate()
            .filter(|(position, backup)| {
                *position < excess
                    || matches!(
                        (cutoff, backup.created_at()),
                        (Some(cutoff), Some(created)) if created < cutoff
                    )
            })
            .map(|(_, backup)| backup.clone())
            .collect()
    }

    /// Deletes every backup of `namer`'s base path outside the policy.
    ///
    /// Individual failures do not stop the remaining deletions.
    ///
    /// # Errors
    ///
    /// Returns [`RotateError::Retention`] listing what was and was not
    /// deleted if any removal failed, or an I/O error if the directory
    /// cannot be listed.
    pub fn enforce(&self, namer: &BackupNamer, now: DateTime<Utc>) -> RotateResult<Vec<PathBuf>> {
        if self.policy.is_unbounded() {
            return Ok(Vec::new());
        }

        let backups = namer.list()?;
        Self::delete(self.plan(&backups, now))
    }

    /// Deletes `candidates`, continuing past individual failures.
    ///
    /// Backups that have already disappeared count as deleted.
    ///
    /// # Errors
    ///
    /// Returns [`RotateError::Retention`] if any removal failed.
    pub fn delete(candidates: Vec<BackupFile>) -> RotateResult<Vec<PathBuf>> {
        let mut deleted = Vec::new();
        let mut failures = Vec::new();

        for backup in candidates {
            match fs::remove_file(&backup.path) {
                Ok(()) => {
                    debug!(path = ?backup.path, "deleted expired backup");
                    deleted.push(backup.path);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => deleted.push(backup.path),
                Err(e) => {
                    warn!(path = ?backup.path, error = %e, "failed to delete backup");
                    failures.push(DeleteFailure {
                        path: backup.path,
                        source: e,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(deleted)
        } else {
            Err(RotateError::Retention { deleted, failures })
        }
    }

    /// Removes leftovers of interrupted compressions for `namer`'s base path.
    ///
    /// Must only run while no rotation for the base path is in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn sweep_temp_files(namer: &BackupNamer) -> RotateResult<Vec<PathBuf>> {
        let entries = match fs::read_dir(namer.dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut removed = Vec::new();
        for entry in entries {
            let path = entry?.path();
            // Only outputs destined for one of our own backup names.
            let ours = temp_target(&path).is_some_and(|target| namer.parse(&target).is_some());
            if !ours {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(?path, "removed stale compression output");
                    removed.push(path);
                }
                Err(e) => warn!(?path, error = %e, "failed to remove stale compression output"),
            }
        }
        Ok(removed)
    }
}
