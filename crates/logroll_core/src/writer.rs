//! The rotating log writer.
//!
//! A [`RotatingWriter`] owns the live file of one base path. Every write
//! runs check-rotate-write under a single mutex, so the size counter and
//! the rotation trigger stay exact with any number of concurrent callers.
//!
//! Rotation steps:
//!
//! 1. Flush (and optionally sync) and close the live file
//! 2. Pick the next backup id
//! 3. Move or compress the closed file to its backup path
//! 4. Enforce retention (inline, or queued to the background worker)
//! 5. Open a fresh live file
//!
//! A failure in step 1 leaves the writer on the old file. Failures in
//! steps 3 and 4 are reported but step 5 always runs.

use crate::compress::{sync_directory, Compressor};
use crate::config::{Config, RetentionMode};
use crate::error::{RotateError, RotateResult, RotationStage};
use crate::event::{RotationEvent, RotationReason};
use crate::namer::{next_timestamp, BackupFile, BackupId, BackupNamer, NamingScheme};
use crate::retention::RetentionManager;
use crate::worker::RetentionWorker;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Callback invoked after every rotation.
pub type RotationObserver = Arc<dyn Fn(&RotationEvent) + Send + Sync>;

/// State of the live file handle.
#[derive(Debug)]
enum LiveFile {
    /// Writes go to this handle.
    Open(File),
    /// A rotation could not open the fresh file; the next write retries.
    Detached,
    /// [`RotatingWriter::close`] has been called.
    Closed,
}

#[derive(Debug)]
struct Inner {
    live: LiveFile,
    /// Bytes in the live file, as confirmed by the OS.
    size: u64,
    /// Last timestamp id handed out; keeps ids strictly increasing.
    last_stamp: Option<i64>,
}

/// Outcome of the move step.
struct Moved {
    id: BackupId,
    path: PathBuf,
    compressed: bool,
}

/// A size-bounded log file with rotated, optionally compressed backups.
///
/// # Thread Safety
///
/// All methods take `&self`; share the writer with `Arc`. `&RotatingWriter`
/// implements [`io::Write`], so an `Arc<RotatingWriter>` can be handed to
/// any log producer.
///
/// # Single Writer
///
/// Only one writer may own a base path at a time. There is no
/// cross-process locking.
///
/// # Example
///
/// ```no_run
/// use logroll_core::{Config, RotatingWriter};
///
/// let writer = RotatingWriter::open("logs/app.log", Config::new().max_size(1 << 20)).unwrap();
/// writer.write(b"service started\n").unwrap();
/// writer.close().unwrap();
/// ```
pub struct RotatingWriter {
    path: PathBuf,
    config: Config,
    namer: BackupNamer,
    compressor: Compressor,
    retention: RetentionManager,
    inner: Mutex<Inner>,
    /// Serializes renames in the backup directory with background retention.
    dir_lock: Arc<Mutex<()>>,
    worker: Mutex<Option<RetentionWorker>>,
    observer: RwLock<Option<RotationObserver>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl RotatingWriter {
    /// Opens the live file at `path`, compressing backups with gzip.
    ///
    /// An existing file is appended to and its size counts towards the
    /// threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the file cannot
    /// be opened.
    pub fn open(path: impl AsRef<Path>, config: Config) -> RotateResult<Self> {
        Self::open_with_compressor(path, config, Compressor::gzip())
    }

    /// Opens the live file at `path` with a custom compressor.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the file cannot
    /// be opened.
    pub fn open_with_compressor(
        path: impl AsRef<Path>,
        config: Config,
        compressor: Compressor,
    ) -> RotateResult<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        if config.create_dirs {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        let namer = BackupNamer::new(&path, config.naming, compressor.extension())?;
        if let Err(e) = RetentionManager::sweep_temp_files(&namer) {
            warn!(?path, error = %e, "failed to sweep stale compression output");
        }

        let file = open_append(&path)?;
        let size = file.metadata()?.len();

        let last_stamp = namer
            .list()?
            .iter()
            .filter_map(|b| match b.id {
                BackupId::Timestamp(millis) => Some(millis),
                BackupId::Index(_) => None,
            })
            .max();

        let retention = RetentionManager::new(config.policy());
        let dir_lock = Arc::new(Mutex::new(()));
        let last_error = Arc::new(Mutex::new(None));

        let worker = match config.retention {
            RetentionMode::Background if !retention.policy().is_unbounded() => {
                Some(RetentionWorker::spawn(
                    namer.clone(),
                    retention,
                    Arc::clone(&dir_lock),
                    Arc::clone(&last_error),
                )?)
            }
            _ => None,
        };

        debug!(?path, size, max_size = config.max_size, "opened live log file");

        Ok(Self {
            path,
            config,
            namer,
            compressor,
            retention,
            inner: Mutex::new(Inner {
                live: LiveFile::Open(file),
                size,
                last_stamp,
            }),
            dir_lock,
            worker: Mutex::new(worker),
            observer: RwLock::new(None),
            last_error,
        })
    }

    /// Writes `buf` to the live file, rotating first if it would overflow.
    ///
    /// Oversized writes are never refused: they land in the fresh file.
    /// A failed rotation does not fail the write; see
    /// [`last_rotation_error`](Self::last_rotation_error).
    ///
    /// Returns the number of bytes written, always `buf.len()` on success.
    ///
    /// # Errors
    ///
    /// Returns [`RotateError::Write`] with the confirmed length if the OS
    /// write fails, or [`RotateError::Closed`] after [`close`](Self::close).
    pub fn write(&self, buf: &[u8]) -> RotateResult<usize> {
        let (result, event) = {
            let mut inner = self.inner.lock();
            if matches!(inner.live, LiveFile::Closed) {
                return Err(RotateError::Closed);
            }

            let overflow = inner.size.saturating_add(buf.len() as u64) > self.config.max_size;
            let event = if overflow && inner.size > 0 && !buf.is_empty() {
                let (event, error) = self.rotate_locked(&mut inner, RotationReason::SizeExceeded);
                if let Some(e) = error {
                    warn!(path = ?self.path, error = %e, "rotation failed; continuing to log");
                }
                Some(event)
            } else {
                None
            };

            (self.write_locked(&mut inner, buf), event)
        };

        if let Some(event) = event {
            self.notify(&event);
        }
        result
    }

    /// Rotates the live file now, regardless of its size.
    ///
    /// # Errors
    ///
    /// Returns the first step failure. The writer stays usable either way.
    pub fn rotate(&self) -> RotateResult<RotationEvent> {
        let (event, error) = {
            let mut inner = self.inner.lock();
            if matches!(inner.live, LiveFile::Closed) {
                return Err(RotateError::Closed);
            }
            self.rotate_locked(&mut inner, RotationReason::Manual)
        };

        self.notify(&event);
        match error {
            Some(e) => Err(e),
            None => Ok(event),
        }
    }

    /// Flushes the live file.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails or the writer is closed.
    pub fn flush(&self) -> RotateResult<()> {
        let mut inner = self.inner.lock();
        match &mut inner.live {
            LiveFile::Open(file) => Ok(file.flush()?),
            LiveFile::Detached => Ok(()),
            LiveFile::Closed => Err(RotateError::Closed),
        }
    }

    /// Syncs the live file's data and metadata to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails or the writer is closed.
    pub fn sync(&self) -> RotateResult<()> {
        let inner = self.inner.lock();
        match &inner.live {
            LiveFile::Open(file) => Ok(file.sync_all()?),
            LiveFile::Detached => Ok(()),
            LiveFile::Closed => Err(RotateError::Closed),
        }
    }

    /// Flushes and closes the live file and stops the retention worker.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush or sync fails. The writer is
    /// closed regardless.
    pub fn close(&self) -> RotateResult<()> {
        let previous = std::mem::replace(&mut self.inner.lock().live, LiveFile::Closed);

        let result = match previous {
            LiveFile::Open(mut file) => {
                debug!(path = ?self.path, "closing live log file");
                file.flush().and_then(|()| file.sync_all())
            }
            LiveFile::Detached | LiveFile::Closed => Ok(()),
        };

        if let Some(mut worker) = self.worker.lock().take() {
            worker.shutdown();
        }

        Ok(result?)
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.inner.lock().live, LiveFile::Closed)
    }

    /// Returns the number of bytes in the live file.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Returns the live file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the backup namer for this writer's base path.
    #[must_use]
    pub fn namer(&self) -> &BackupNamer {
        &self.namer
    }

    /// Lists the backups on disk, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn backups(&self) -> RotateResult<Vec<BackupFile>> {
        let _dir = self.dir_lock.lock();
        Ok(self.namer.list()?)
    }

    /// Returns the most recent rotation or retention failure.
    #[must_use]
    pub fn last_rotation_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Installs a callback run after every rotation.
    ///
    /// The callback runs outside the write lock; it may write to this
    /// writer.
    pub fn set_observer(&self, observer: impl Fn(&RotationEvent) + Send + Sync + 'static) {
        *self.observer.write() = Some(Arc::new(observer));
    }

    fn notify(&self, event: &RotationEvent) {
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            observer(event);
        }
    }

    fn write_locked(&self, inner: &mut Inner, buf: &[u8]) -> RotateResult<usize> {
        if matches!(inner.live, LiveFile::Detached) {
            let file = open_append(&self.path)?;
            inner.size = file.metadata()?.len();
            inner.live = LiveFile::Open(file);
            debug!(path = ?self.path, "reopened live log file");
        }

        let LiveFile::Open(file) = &mut inner.live else {
            return Err(RotateError::Closed);
        };

        let (written, failure) = write_counted(file, buf);
        inner.size += written as u64;

        match failure {
            Some(source) => Err(RotateError::Write { written, source }),
            None => Ok(written),
        }
    }

    /// Runs one rotation. Never leaves the writer unusable.
    fn rotate_locked(
        &self,
        inner: &mut Inner,
        reason: RotationReason,
    ) -> (RotationEvent, Option<RotateError>) {
        let mut event = RotationEvent::new(inner.size, reason);
        let mut first_error: Option<RotateError> = None;

        // 1. Close. On failure keep the old handle and abort.
        if let LiveFile::Open(file) = &mut inner.live {
            let closed = file.flush().and_then(|()| {
                if self.config.sync_on_rotate {
                    file.sync_all()
                } else {
                    Ok(())
                }
            });
            if let Err(e) = closed {
                return self.finish(event, Some(RotateError::rotation(RotationStage::Close, e)));
            }
        }
        inner.live = LiveFile::Detached;

        let moved = {
            let _dir = self.dir_lock.lock();

            // 2 + 3. Name and move.
            let moved = match self.move_to_backup(inner) {
                Ok(moved) => Some(moved),
                Err((moved, e)) => {
                    first_error.get_or_insert(e);
                    moved
                }
            };

            // 4. Retention, inline.
            if self.config.retention == RetentionMode::Synchronous {
                match self.retention.enforce(&self.namer, Utc::now()) {
                    Ok(deleted) => event.deleted = deleted,
                    Err(RotateError::Retention { deleted, failures }) => {
                        event.deleted.clone_from(&deleted);
                        first_error.get_or_insert(RotateError::Retention { deleted, failures });
                    }
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }
            moved
        };

        if let Some(moved) = &moved {
            event.backup = Some(moved.path.clone());
            event.backup_id = Some(moved.id);
            event.compressed = moved.compressed;
        }

        // 5. Fresh live file. Truncate only if the old contents were moved.
        let reopened = if moved.is_some() {
            open_truncate(&self.path).map(|file| (file, 0))
        } else {
            open_append(&self.path).and_then(|file| {
                let size = file.metadata()?.len();
                Ok((file, size))
            })
        };
        match reopened {
            Ok((file, size)) => {
                inner.live = LiveFile::Open(file);
                inner.size = size;
            }
            Err(e) => {
                inner.size = 0;
                first_error.get_or_insert(RotateError::rotation(RotationStage::Reopen, e));
            }
        }

        if self.config.retention == RetentionMode::Background {
            if let Some(worker) = self.worker.lock().as_ref() {
                if let Err(e) = worker.request() {
                    first_error.get_or_insert(e);
                }
            }
        }

        if first_error.is_none() {
            info!(
                path = ?self.path,
                old_size = event.old_size,
                backup = ?event.backup,
                deleted = event.deleted.len(),
                "rotated log file"
            );
        }
        self.finish(event, first_error)
    }

    fn finish(
        &self,
        mut event: RotationEvent,
        error: Option<RotateError>,
    ) -> (RotationEvent, Option<RotateError>) {
        if let Some(e) = &error {
            let message = e.to_string();
            event.error = Some(message.clone());
            *self.last_error.lock() = Some(message);
        }
        event.at = Utc::now();
        (event, error)
    }

    /// Moves the closed live file to its backup path.
    ///
    /// On error, returns where the data ended up (if it was moved at all)
    /// together with the failure.
    fn move_to_backup(
        &self,
        inner: &mut Inner,
    ) -> Result<Moved, (Option<Moved>, RotateError)> {
        let id = match self.namer.scheme() {
            NamingScheme::Timestamp => {
                let stamp = next_timestamp(Utc::now().timestamp_millis(), inner.last_stamp);
                inner.last_stamp = Some(stamp);
                BackupId::Timestamp(stamp)
            }
            NamingScheme::Index => {
                self.shift_indices()
                    .map_err(|e| (None, RotateError::rotation(RotationStage::Move, e)))?;
                BackupId::Index(1)
            }
        };

        let plain = self.namer.backup_path(id, false);
        if !self.config.compress {
            move_file(&self.path, &plain)
                .map_err(|e| (None, RotateError::rotation(RotationStage::Move, e)))?;
            if self.config.sync_on_rotate {
                if let Err(e) = sync_directory(self.namer.dir()) {
                    warn!(dir = ?self.namer.dir(), error = %e, "failed to sync backup directory");
                }
            }
            return Ok(Moved {
                id,
                path: plain,
                compressed: false,
            });
        }

        let target = self.namer.backup_path(id, true);
        match self.compressor.compress(&self.path, &target) {
            Ok(_) => {
                // The fresh file is opened with truncation, so a stale source
                // cannot duplicate data.
                if let Err(e) = fs::remove_file(&self.path) {
                    warn!(path = ?self.path, error = %e, "failed to remove compressed source");
                }
                Ok(Moved {
                    id,
                    path: target,
                    compressed: true,
                })
            }
            Err(e) => {
                warn!(path = ?self.path, error = %e, "compression failed; keeping plain backup");
                let source = match e {
                    RotateError::Io(io) => io,
                    other => io::Error::other(other.to_string()),
                };
                let error = RotateError::rotation(RotationStage::Compress, source);
                match move_file(&self.path, &plain) {
                    Ok(()) => Err((
                        Some(Moved {
                            id,
                            path: plain,
                            compressed: false,
                        }),
                        error,
                    )),
                    Err(_) => Err((None, error)),
                }
            }
        }
    }

    /// Shifts every index backup up by one, oldest first, freeing `.1`.
    fn shift_indices(&self) -> io::Result<()> {
        for backup in self.namer.list()? {
            let BackupId::Index(index) = backup.id else {
                continue;
            };
            let Some(next) = index.checked_add(1) else {
                continue;
            };
            let target = self.namer.backup_path(BackupId::Index(next), backup.compressed);
            fs::rename(&backup.path, &target)?;
        }
        Ok(())
    }
}

impl fmt::Debug for RotatingWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotatingWriter")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("size", &self.size())
            .finish()
    }
}

impl Drop for RotatingWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = ?self.path, error = %e, "failed to close live log file");
        }
    }
}

impl Write for &RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match RotatingWriter::write(self, buf) {
            Ok(n) => Ok(n),
            // Report the confirmed prefix; the caller retries the rest.
            Err(RotateError::Write { written, .. }) if written > 0 => Ok(written),
            Err(e) => Err(e.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(RotatingWriter::flush(self)?)
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut shared: &RotatingWriter = self;
        Write::write(&mut shared, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut shared: &RotatingWriter = self;
        Write::flush(&mut shared)
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn open_truncate(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
}

/// Writes as much of `buf` as the OS accepts.
///
/// Returns the confirmed length and the error that stopped it, if any.
fn write_counted(file: &mut File, buf: &[u8]) -> (usize, Option<io::Error>) {
    let mut written = 0;
    while written < buf.len() {
        match file.write(&buf[written..]) {
            Ok(0) => {
                return (
                    written,
                    Some(io::Error::new(io::ErrorKind::WriteZero, "failed to write log bytes")),
                )
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return (written, Some(e)),
        }
    }
    (written, None)
}

/// Renames `from` to `to`, falling back to copy + remove.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    let Err(rename_err) = fs::rename(from, to) else {
        return Ok(());
    };
    if rename_err.kind() == io::ErrorKind::NotFound {
        return Err(rename_err);
    }

    let copied = fs::copy(from, to).and_then(|_| File::open(to)?.sync_all());
    if let Err(e) = copied {
        let _ = fs::remove_file(to);
        warn!(?from, ?to, error = %e, "copy fallback failed");
        return Err(rename_err);
    }
    if let Err(e) = fs::remove_file(from) {
        warn!(?from, error = %e, "copied backup but could not remove source");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::Codec;
    use std::io::Read;
    use tempfile::tempdir;

    fn small(max_size: u64, max_backups: usize) -> Config {
        Config::new().max_size(max_size).max_backups(max_backups)
    }

    #[test]
    fn open_creates_file_and_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("app.log");

        let writer = RotatingWriter::open(&path, Config::default()).unwrap();
        assert!(path.exists());
        assert_eq!(writer.size(), 0);
    }

    #[test]
    fn open_continues_from_existing_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, vec![b'a'; 80]).unwrap();

        let writer = RotatingWriter::open(&path, small(100, 2)).unwrap();
        assert_eq!(writer.size(), 80);

        // 80 + 30 > 100: the restart must not reset the count.
        writer.write(&[b'b'; 30]).unwrap();
        assert_eq!(writer.backups().unwrap().len(), 1);
        assert_eq!(fs::read(&path).unwrap(), vec![b'b'; 30]);
    }

    #[test]
    fn writes_below_threshold_do_not_rotate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let writer = RotatingWriter::open(&path, small(100, 2)).unwrap();

        for _ in 0..10 {
            assert_eq!(writer.write(b"0123456789").unwrap(), 10);
        }
        assert_eq!(writer.size(), 100);
        assert!(writer.backups().unwrap().is_empty());
        assert_eq!(fs::metadata(&path).unwrap().len(), 100);
    }

    #[test]
    fn oversized_write_lands_in_fresh_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let writer = RotatingWriter::open(&path, small(10, 0)).unwrap();

        writer.write(b"abc").unwrap();
        writer.write(&[b'x'; 25]).unwrap();
        assert_eq!(writer.size(), 25);
        assert_eq!(writer.backups().unwrap().len(), 1);

        // Next write rotates again.
        writer.write(b"z").unwrap();
        assert_eq!(writer.backups().unwrap().len(), 2);
        assert_eq!(fs::read(&path).unwrap(), b"z");
    }

    #[test]
    fn oversized_first_write_does_not_rotate_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let writer = RotatingWriter::open(&path, small(10, 0)).unwrap();

        writer.write(&[b'x'; 25]).unwrap();
        assert!(writer.backups().unwrap().is_empty());
        assert_eq!(writer.size(), 25);
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempdir().unwrap();
        let writer = RotatingWriter::open(dir.path().join("app.log"), Config::default()).unwrap();
        writer.write(b"bye").unwrap();

        assert!(writer.close().is_ok());
        assert!(writer.close().is_ok());
        assert!(writer.is_closed());
        assert!(matches!(writer.write(b"late"), Err(RotateError::Closed)));
        assert!(matches!(writer.rotate(), Err(RotateError::Closed)));
    }

    #[test]
    fn manual_rotate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let writer = RotatingWriter::open(&path, Config::default()).unwrap();
        writer.write(b"before").unwrap();

        let event = writer.rotate().unwrap();
        assert_eq!(event.reason, RotationReason::Manual);
        assert_eq!(event.old_size, 6);
        assert!(event.succeeded());
        assert_eq!(fs::read(event.backup.unwrap()).unwrap(), b"before");
        assert_eq!(writer.size(), 0);
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn index_scheme_shifts_backups() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let config = small(4, 3).naming(NamingScheme::Index);
        let writer = RotatingWriter::open(&path, config).unwrap();

        for chunk in [b"aaaa", b"bbbb", b"cccc", b"dddd", b"eeee"] {
            writer.write(chunk).unwrap();
        }

        assert_eq!(fs::read(dir.path().join("app.log.1")).unwrap(), b"dddd");
        assert_eq!(fs::read(dir.path().join("app.log.2")).unwrap(), b"cccc");
        assert_eq!(fs::read(dir.path().join("app.log.3")).unwrap(), b"bbbb");
        assert!(!dir.path().join("app.log.4").exists());
        assert_eq!(fs::read(&path).unwrap(), b"eeee");
    }

    #[test]
    fn timestamp_ids_never_collide() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let writer = RotatingWriter::open(&path, small(1, 0)).unwrap();

        // Many rotations within the same millisecond.
        for i in 0..20u8 {
            writer.write(&[i]).unwrap();
        }
        let backups = writer.backups().unwrap();
        assert_eq!(backups.len(), 19);
        for (i, backup) in backups.iter().enumerate() {
            assert_eq!(fs::read(&backup.path).unwrap(), vec![i as u8]);
        }
    }

    #[test]
    fn restart_keeps_ids_increasing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        {
            let writer = RotatingWriter::open(&path, small(1, 0)).unwrap();
            writer.write(b"a").unwrap();
            writer.write(b"b").unwrap();
            writer.write(b"c").unwrap();
        }
        let writer = RotatingWriter::open(&path, small(1, 0)).unwrap();
        writer.write(b"d").unwrap();

        let contents: Vec<_> = writer
            .backups()
            .unwrap()
            .iter()
            .map(|b| fs::read(&b.path).unwrap())
            .collect();
        assert_eq!(contents, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn compressed_backups_decompress_to_original() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let writer = RotatingWriter::open(&path, small(64, 0).compress(true)).unwrap();

        let first = vec![b'1'; 60];
        let second = vec![b'2'; 60];
        writer.write(&first).unwrap();
        writer.write(&second).unwrap();

        let backups = writer.backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].compressed);
        assert!(backups[0].path.to_str().unwrap().ends_with(".gz"));

        let mut out = Vec::new();
        Compressor::gzip().decompress(&backups[0].path, &mut out).unwrap();
        assert_eq!(out, first);
        assert_eq!(fs::read(&path).unwrap(), second);
    }

    #[derive(Debug)]
    struct BrokenCodec;

    impl Codec for BrokenCodec {
        fn extension(&self) -> &str {
            "zz"
        }

        fn encode(&self, reader: &mut dyn Read, _writer: &mut dyn Write) -> io::Result<u64> {
            let mut sink = Vec::new();
            reader.read_to_end(&mut sink)?;
            Err(io::Error::other("no space left"))
        }

        fn decode(&self, reader: &mut dyn Read, writer: &mut dyn Write) -> io::Result<u64> {
            io::copy(reader, writer)
        }
    }

    #[test]
    fn compression_failure_keeps_plain_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let writer = RotatingWriter::open_with_compressor(
            &path,
            small(8, 0).compress(true),
            Compressor::new(Arc::new(BrokenCodec)),
        )
        .unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        writer.set_observer(move |e| sink.lock().push(e.clone()));

        writer.write(b"precious").unwrap();
        writer.write(b"next").unwrap();

        let backups = writer.backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert!(!backups[0].compressed);
        assert_eq!(fs::read(&backups[0].path).unwrap(), b"precious");
        assert_eq!(fs::read(&path).unwrap(), b"next");

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert!(!events[0].succeeded());
        assert!(writer.last_rotation_error().unwrap().contains("compress"));

        // No temporary output survives.
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{names:?}");
    }

    #[test]
    fn failed_move_keeps_logging_without_loss() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");

        // A backup from the future pins the next stamp to `last + 1`.
        let namer = BackupNamer::new(&path, NamingScheme::Timestamp, "gz").unwrap();
        let future = 4_102_444_800_000; // 2100-01-01T00:00:00Z
        fs::write(namer.backup_path(BackupId::Timestamp(future), false), b"old").unwrap();

        // Occupy the next name with a non-empty directory so neither the
        // rename nor the copy fallback can land.
        let blocker = namer.backup_path(BackupId::Timestamp(future + 1), false);
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("inner"), b"x").unwrap();

        let writer = RotatingWriter::open(&path, small(4, 0)).unwrap();
        writer.write(b"keep").unwrap();
        writer.write(b"more").unwrap();

        assert!(writer.last_rotation_error().is_some());
        assert_eq!(fs::read(&path).unwrap(), b"keepmore");
        assert_eq!(writer.size(), 8);
    }

    #[test]
    fn retention_failure_still_opens_fresh_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");

        // remove_file refuses directories, so pruning this slot fails.
        let stuck = dir.path().join("app.log.20200101_000000_000");
        fs::create_dir(&stuck).unwrap();

        let writer = RotatingWriter::open(&path, small(4, 1)).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        writer.set_observer(move |e| sink.lock().push(e.clone()));

        writer.write(b"abcd").unwrap();
        assert_eq!(writer.write(b"efgh").unwrap(), 4);

        assert_eq!(fs::read(&path).unwrap(), b"efgh");
        assert_eq!(writer.size(), 4);
        assert!(stuck.exists());
        assert!(writer.last_rotation_error().is_some());

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert!(events[0].error.is_some());
        let backup = events[0].backup.as_ref().unwrap();
        assert_eq!(fs::read(backup).unwrap(), b"abcd");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_os_write_reports_confirmed_length() {
        let writer = RotatingWriter::open("/dev/full", Config::new().create_dirs(false)).unwrap();

        let result = writer.write(b"lost to a full device");
        assert!(matches!(result, Err(RotateError::Write { written: 0, .. })), "{result:?}");
        assert_eq!(writer.size(), 0);
    }

    #[derive(Debug)]
    struct UnnamedCodec;

    impl Codec for UnnamedCodec {
        fn extension(&self) -> &str {
            ""
        }

        fn encode(&self, reader: &mut dyn Read, writer: &mut dyn Write) -> io::Result<u64> {
            io::copy(reader, writer)
        }

        fn decode(&self, reader: &mut dyn Read, writer: &mut dyn Write) -> io::Result<u64> {
            io::copy(reader, writer)
        }
    }

    #[test]
    fn codec_without_extension_rejected() {
        let dir = tempdir().unwrap();
        let result = RotatingWriter::open_with_compressor(
            dir.path().join("app.log"),
            small(8, 1).compress(true),
            Compressor::new(Arc::new(UnnamedCodec)),
        );
        assert!(matches!(result, Err(RotateError::InvalidConfig { .. })));
    }

    #[test]
    fn detached_writer_reopens_lazily() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let writer = RotatingWriter::open(&path, Config::default()).unwrap();

        writer.inner.lock().live = LiveFile::Detached;
        writer.write(b"again").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"again");
        assert_eq!(writer.size(), 5);
    }

    #[test]
    fn io_write_adapter() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let writer = RotatingWriter::open(&path, small(16, 0)).unwrap();

        let mut handle = &writer;
        writeln!(handle, "first line").unwrap();
        writeln!(handle, "second line").unwrap();
        handle.flush().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second line\n");
        assert_eq!(writer.backups().unwrap().len(), 1);
    }

    #[test]
    fn invalid_config_rejected() {
        let dir = tempdir().unwrap();
        let result = RotatingWriter::open(dir.path().join("app.log"), small(0, 1));
        assert!(matches!(result, Err(RotateError::InvalidConfig { .. })));
    }

    #[test]
    fn open_sweeps_stale_temp_files() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join("app.log.20240101_120000_000.gz.deadbeef.tmp");
        fs::write(&stale, b"partial").unwrap();

        let _writer = RotatingWriter::open(dir.path().join("app.log"), Config::default()).unwrap();
        assert!(!stale.exists());
    }

    #[test]
    fn open_keeps_temp_files_of_other_logs() {
        let dir = tempdir().unwrap();
        let in_progress = dir.path().join("app.log.20240101_120000_000.gz.deadbeef.tmp");
        fs::write(&in_progress, b"partial").unwrap();

        let _writer = RotatingWriter::open(dir.path().join("app"), Config::default()).unwrap();
        assert!(in_progress.exists());
    }
}
