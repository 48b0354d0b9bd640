//! Background retention worker.
//!
//! One thread per writer. Rotations enqueue a request once the fresh live
//! file is open; the thread enforces retention under the same directory
//! lock that rotation holds while renaming, so cleanup never races a
//! rename cascade. Requests coalesce: at most one is ever pending.

use crate::error::{RotateError, RotateResult};
use crate::namer::BackupNamer;
use crate::retention::RetentionManager;
use chrono::Utc;
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Handle to a running retention thread.
#[derive(Debug)]
pub(crate) struct RetentionWorker {
    requests: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RetentionWorker {
    /// Starts the worker thread.
    pub(crate) fn spawn(
        namer: BackupNamer,
        manager: RetentionManager,
        dir_lock: Arc<Mutex<()>>,
        last_error: Arc<Mutex<Option<String>>>,
    ) -> io::Result<Self> {
        let (tx, rx) = bounded::<()>(1);
        let name = format!("logroll-retention-{}", namer.base().display());

        let handle = thread::Builder::new().name(name).spawn(move || {
            for () in rx.iter() {
                let _dir = dir_lock.lock();
                match manager.enforce(&namer, Utc::now()) {
                    Ok(deleted) => {
                        if !deleted.is_empty() {
                            debug!(base = ?namer.base(), count = deleted.len(), "background retention");
                        }
                    }
                    Err(e) => {
                        warn!(base = ?namer.base(), error = %e, "background retention failed");
                        *last_error.lock() = Some(e.to_string());
                    }
                }
            }
        })?;

        Ok(Self {
            requests: Some(tx),
            handle: Some(handle),
        })
    }

    /// Asks the worker to enforce retention.
    pub(crate) fn request(&self) -> RotateResult<()> {
        let Some(tx) = &self.requests else {
            return Err(RotateError::WorkerStopped);
        };
        match tx.try_send(()) {
            // A pending request will see this rotation's backup too.
            Ok(()) | Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Disconnected(())) => Err(RotateError::WorkerStopped),
        }
    }

    /// Drains pending work and joins the thread.
    pub(crate) fn shutdown(&mut self) {
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("retention worker panicked");
            }
        }
    }
}

impl Drop for RetentionWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namer::{BackupId, NamingScheme};
    use crate::retention::RetentionPolicy;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn enforces_on_request() {
        let dir = tempdir().unwrap();
        let namer =
            BackupNamer::new(&dir.path().join("app.log"), NamingScheme::Index, "gz").unwrap();
        for i in 1..=4 {
            fs::write(namer.backup_path(BackupId::Index(i), false), b"x").unwrap();
        }

        let mut worker = RetentionWorker::spawn(
            namer.clone(),
            RetentionManager::new(RetentionPolicy::keep(1)),
            Arc::new(Mutex::new(())),
            Arc::new(Mutex::new(None)),
        )
        .unwrap();
        worker.request().unwrap();
        worker.shutdown();

        let ids: Vec<_> = namer.list().unwrap().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![BackupId::Index(1)]);
    }

    #[test]
    fn request_after_shutdown_fails() {
        let dir = tempdir().unwrap();
        let namer =
            BackupNamer::new(&dir.path().join("app.log"), NamingScheme::Index, "gz").unwrap();
        let mut worker = RetentionWorker::spawn(
            namer,
            RetentionManager::new(RetentionPolicy::keep(1)),
            Arc::new(Mutex::new(())),
            Arc::new(Mutex::new(None)),
        )
        .unwrap();

        worker.shutdown();
        assert!(matches!(worker.request(), Err(RotateError::WorkerStopped)));
    }

    #[test]
    fn waits_for_directory_lock() {
        let dir = tempdir().unwrap();
        let namer =
            BackupNamer::new(&dir.path().join("app.log"), NamingScheme::Index, "gz").unwrap();
        for i in 1..=3 {
            fs::write(namer.backup_path(BackupId::Index(i), false), b"x").unwrap();
        }
        let dir_lock = Arc::new(Mutex::new(()));

        let mut worker = RetentionWorker::spawn(
            namer.clone(),
            RetentionManager::new(RetentionPolicy::keep(1)),
            Arc::clone(&dir_lock),
            Arc::new(Mutex::new(None)),
        )
        .unwrap();

        {
            let _held = dir_lock.lock();
            worker.request().unwrap();
            thread::sleep(std::time::Duration::from_millis(50));
            // Still held, so nothing may have been deleted yet.
            assert_eq!(namer.list().unwrap().len(), 3);
        }

        worker.shutdown();
        assert_eq!(namer.list().unwrap().len(), 1);
    }
}
