//! # logroll core
//!
//! Size-bounded rotating log files with compressed backup retention.
//!
//! A [`RotatingWriter`] appends to one live file. When the next write would
//! push the file past its threshold, the file is moved aside as a backup
//! (optionally gzip-compressed), old backups beyond the retention limits
//! are deleted, and a fresh live file is opened.
//!
//! ## Components
//!
//! - [`BackupNamer`] - maps a base path and ordering key to backup paths
//! - [`Compressor`] - crash-safe streaming compression via a [`Codec`]
//! - [`RetentionManager`] - deletes the oldest backups beyond the limits
//! - [`RotatingWriter`] - the write/rotate state machine
//!
//! ## Example
//!
//! ```rust
//! use logroll_core::{Config, RotatingWriter};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = Config::new().max_size(100).max_backups(2);
//! let writer = RotatingWriter::open(dir.path().join("app.log"), config).unwrap();
//!
//! writer.write(&[b'a'; 60]).unwrap();
//! writer.write(&[b'b'; 60]).unwrap(); // rotates first
//!
//! assert_eq!(writer.size(), 60);
//! assert_eq!(writer.backups().unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compress;
mod config;
mod error;
mod event;
mod namer;
mod retention;
mod worker;
mod writer;

pub use compress::{is_temp_file, Codec, Compressor, GzipCodec};
pub use config::{Config, RetentionMode};
pub use error::{DeleteFailure, RotateError, RotateResult, RotationStage};
pub use event::{RotationEvent, RotationReason};
pub use namer::{next_timestamp, BackupFile, BackupId, BackupNamer, NamingScheme};
pub use retention::{RetentionManager, RetentionPolicy};
pub use writer::{RotatingWriter, RotationObserver};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
