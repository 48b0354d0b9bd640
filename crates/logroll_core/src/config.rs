//! Writer configuration.

use crate::error::{RotateError, RotateResult};
use crate::namer::NamingScheme;
use crate::retention::RetentionPolicy;
use std::time::Duration;

/// Where retention runs after a rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetentionMode {
    /// Inside the rotation, before the fresh live file is opened.
    #[default]
    Synchronous,
    /// On a dedicated per-writer thread, after the fresh live file is open.
    Background,
}

/// Configuration for opening a [`crate::RotatingWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Size in bytes past which the live file is rotated.
    pub max_size: u64,

    /// Maximum number of backups to keep (0 = unbounded).
    pub max_backups: usize,

    /// Maximum age of a backup. Requires [`NamingScheme::Timestamp`].
    pub max_age: Option<Duration>,

    /// Whether backups are compressed.
    pub compress: bool,

    /// Backup naming scheme.
    pub naming: NamingScheme,

    /// Where retention runs.
    pub retention: RetentionMode,

    /// Whether to create the parent directory of the live file.
    pub create_dirs: bool,

    /// Whether to `sync_all` the live file before rotating it out.
    pub sync_on_rotate: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_size: 10 * 1024 * 1024, // 10 MB
            max_backups: 5,
            max_age: None,
            compress: false,
            naming: NamingScheme::Timestamp,
            retention: RetentionMode::Synchronous,
            create_dirs: true,
            sync_on_rotate: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rotation threshold in bytes.
    #[must_use]
    pub const fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    /// Sets the maximum number of backups (0 = unbounded).
    #[must_use]
    pub const fn max_backups(mut self, count: usize) -> Self {
        self.max_backups = count;
        self
    }

    /// Sets the maximum backup age.
    #[must_use]
    pub const fn max_age(mut self, age: Duration) -> Self {
        self.max_age = Some(age);
        self
    }

    /// Sets whether backups are compressed.
    #[must_use]
    pub const fn compress(mut self, value: bool) -> Self {
        self.compress = value;
        self
    }

    /// Sets the naming scheme.
    #[must_use]
    pub const fn naming(mut self, scheme: NamingScheme) -> Self {
        self.naming = scheme;
        self
    }

    /// Sets where retention runs.
    #[must_use]
    pub const fn retention(mut self, mode: RetentionMode) -> Self {
        self.retention = mode;
        self
    }

    /// Sets whether missing parent directories are created.
    #[must_use]
    pub const fn create_dirs(mut self, value: bool) -> Self {
        self.create_dirs = value;
        self
    }

    /// Sets whether the live file is synced before rotation.
    #[must_use]
    pub const fn sync_on_rotate(mut self, value: bool) -> Self {
        self.sync_on_rotate = value;
        self
    }

    /// Returns the retention limits.
    #[must_use]
    pub const fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_backups: self.max_backups,
            max_age: self.max_age,
        }
    }

    /// Checks the configuration for contradictions.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_size` is zero, or if `max_age` is set with
    /// index naming (index names carry no creation time).
    pub fn validate(&self) -> RotateResult<()> {
        if self.max_size == 0 {
            return Err(RotateError::invalid_config("max_size must be greater than 0"));
        }
        if self.max_age.is_some() && self.naming == NamingScheme::Index {
            return Err(RotateError::invalid_config(
                "max_age requires timestamp naming",
            ));
        }
        Ok(())
    }
}
