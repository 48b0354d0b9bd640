//! Prune command.

use chrono::Utc;
use logroll_core::{
    BackupNamer, Compressor, NamingScheme, RetentionManager, RetentionPolicy, RotateError,
};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Deletes backups of `path` outside the given limits.
///
/// Must not run while a writer is rotating the same path.
pub fn run(
    path: &Path,
    naming: NamingScheme,
    keep: usize,
    max_age: Option<Duration>,
    dry_run: bool,
    out: &mut dyn Write,
) -> Result<(), Box<dyn std::error::Error>> {
    if max_age.is_some() && naming == NamingScheme::Index {
        return Err("--max-age-secs requires timestamp naming".into());
    }

    let namer = BackupNamer::new(path, naming, Compressor::gzip().extension())?;
    let manager = RetentionManager::new(RetentionPolicy {
        max_backups: keep,
        max_age,
    });

    if dry_run {
        let plan = manager.plan(&namer.list()?, Utc::now());
        writeln!(out, "Would delete {} backup(s):", plan.len())?;
        for backup in plan {
            writeln!(out, "  {}", backup.path.display())?;
        }
        return Ok(());
    }

    info!("Pruning backups of {:?}", path);
    match manager.enforce(&namer, Utc::now()) {
        Ok(deleted) => {
            writeln!(out, "Deleted {} backup(s)", deleted.len())?;
            Ok(())
        }
        Err(RotateError::Retention { deleted, failures }) => {
            writeln!(out, "Deleted {} backup(s)", deleted.len())?;
            for failure in &failures {
                writeln!(out, "  failed: {} ({})", failure.path.display(), failure.source)?;
            }
            Err(format!("{} backup(s) could not be deleted", failures.len()).into())
        }
        Err(e) => Err(e.into()),
    }
}
