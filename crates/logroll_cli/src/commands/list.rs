//! List command.

use logroll_core::{BackupId, BackupNamer, Compressor, NamingScheme};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One row of `list` output.
#[derive(Debug, Serialize)]
pub struct BackupRow {
    pub path: PathBuf,
    pub id: BackupId,
    pub compressed: bool,
    pub size: u64,
    pub created: Option<String>,
}

/// Collects the backups of `path`, oldest first.
pub fn collect(
    path: &Path,
    naming: NamingScheme,
) -> Result<Vec<BackupRow>, Box<dyn std::error::Error>> {
    let namer = BackupNamer::new(path, naming, Compressor::gzip().extension())?;

    let mut rows = Vec::new();
    for backup in namer.list()? {
        let size = fs::metadata(&backup.path)?.len();
        rows.push(BackupRow {
            created: backup.created_at().map(|t| t.to_rfc3339()),
            path: backup.path,
            id: backup.id,
            compressed: backup.compressed,
            size,
        });
    }
    Ok(rows)
}

/// Prints the backups of `path`.
pub fn run(
    path: &Path,
    naming: NamingScheme,
    format: &str,
    out: &mut dyn Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let rows = collect(path, naming)?;

    match format {
        "json" => {
            serde_json::to_writer_pretty(&mut *out, &rows)?;
            writeln!(out)?;
        }
        "text" => {
            if rows.is_empty() {
                writeln!(out, "No backups for {:?}", path)?;
                return Ok(());
            }
            writeln!(out, "Backups for {:?} (oldest first):", path)?;
            for row in &rows {
                let id = match row.id {
                    BackupId::Timestamp(_) => row.created.clone().unwrap_or_default(),
                    BackupId::Index(index) => format!("#{index}"),
                };
                writeln!(
                    out,
                    "  {:<40} {:>10} bytes  {}{}",
                    row.path.display(),
                    row.size,
                    id,
                    if row.compressed { "  (gzip)" } else { "" }
                )?;
            }
            let total: u64 = rows.iter().map(|r| r.size).sum();
            writeln!(out, "Total: {} backup(s), {} bytes", rows.len(), total)?;
        }
        other => return Err(format!("Unknown format: {other}").into()),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lists_oldest_first_as_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(dir.path().join("app.log.1"), b"newest").unwrap();
        fs::write(dir.path().join("app.log.2.gz"), b"x").unwrap();
        fs::write(&path, b"live").unwrap();

        let mut out = Vec::new();
        run(&path, NamingScheme::Index, "json", &mut out).unwrap();
        let rows: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(rows.as_array().unwrap().len(), 2);
        assert_eq!(rows[0]["id"]["Index"], 2);
        assert_eq!(rows[0]["compressed"], true);
        assert_eq!(rows[1]["size"], 6);
    }

    #[test]
    fn text_output_mentions_empty() {
        let dir = tempdir().unwrap();
        let mut out = Vec::new();
        run(&dir.path().join("app.log"), NamingScheme::Timestamp, "text", &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("No backups"));
    }

    #[test]
    fn unknown_format_fails() {
        let dir = tempdir().unwrap();
        let mut out = Vec::new();
        assert!(run(&dir.path().join("app.log"), NamingScheme::Index, "xml", &mut out).is_err());
    }
}
