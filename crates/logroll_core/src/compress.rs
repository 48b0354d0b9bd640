//! Backup compression.
//!
//! The [`Codec`] trait is the pluggable stream transform; [`Compressor`]
//! wraps a codec with the crash-safe file protocol:
//!
//! 1. Stream the source into `<target>.<uuid>.tmp`
//! 2. Flush and `sync_all` the temporary file
//! 3. Rename it onto `target`
//! 4. Fsync the parent directory so the new name survives a crash
//!
//! A failure at any step removes the temporary file. The source is never
//! removed here; the caller deletes it once `compress` has returned `Ok`.

use crate::error::RotateResult;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fmt::Debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Extension used for in-progress compression output.
const TEMP_EXTENSION: &str = "tmp";

/// A streaming compression format.
pub trait Codec: Send + Sync + Debug {
    /// File extension for compressed output, without the dot.
    fn extension(&self) -> &str;

    /// Compresses everything from `reader` into `writer`.
    ///
    /// Returns the number of uncompressed bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns an error if reading, encoding or writing fails.
    fn encode(&self, reader: &mut dyn Read, writer: &mut dyn Write) -> io::Result<u64>;

    /// Decompresses everything from `reader` into `writer`.
    ///
    /// Returns the number of decompressed bytes produced.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid stream.
    fn decode(&self, reader: &mut dyn Read, writer: &mut dyn Write) -> io::Result<u64>;
}

/// Gzip codec backed by `flate2`.
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: u32,
}

impl GzipCodec {
    /// Creates a gzip codec with the given level (0-9).
    #[must_use]
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self::new(Compression::default().level())
    }
}

impl Codec for GzipCodec {
    fn extension(&self) -> &str {
        "gz"
    }

    fn encode(&self, reader: &mut dyn Read, writer: &mut dyn Write) -> io::Result<u64> {
        let mut encoder = GzEncoder::new(writer, Compression::new(self.level));
        let n = io::copy(reader, &mut encoder)?;
        encoder.finish()?.flush()?;
        Ok(n)
    }

    fn decode(&self, reader: &mut dyn Read, writer: &mut dyn Write) -> io::Result<u64> {
        let mut decoder = MultiGzDecoder::new(reader);
        io::copy(&mut decoder, writer)
    }
}

/// Produces compressed backups without ever exposing a partial file.
#[derive(Debug, Clone)]
pub struct Compressor {
    codec: Arc<dyn Codec>,
}

impl Compressor {
    /// Creates a compressor around `codec`.
    #[must_use]
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self { codec }
    }

    /// Creates a gzip compressor with the default level.
    #[must_use]
    pub fn gzip() -> Self {
        Self::new(Arc::new(GzipCodec::default()))
    }

    /// Returns the codec's file extension.
    #[must_use]
    pub fn extension(&self) -> &str {
        self.codec.extension()
    }

    /// Compresses `source` into `target`.
    ///
    /// Returns the number of uncompressed bytes consumed. `target` only
    /// appears once the full stream is on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or the output cannot
    /// be written, synced or renamed. No partial output is left behind.
    pub fn compress(&self, source: &Path, target: &Path) -> RotateResult<u64> {
        let temp = temp_path(target);

        match self.compress_into(source, &temp) {
            Ok(n) => {
                if let Err(e) = fs::rename(&temp, target) {
                    discard(&temp);
                    return Err(e.into());
                }
                // The rename has landed; only the name's durability is at stake.
                if let Some(dir) = target.parent() {
                    if let Err(e) = sync_directory(dir) {
                        warn!(?dir, error = %e, "failed to sync backup directory");
                    }
                }
                debug!(?source, ?target, bytes = n, "compressed backup");
                Ok(n)
            }
            Err(e) => {
                discard(&temp);
                Err(e.into())
            }
        }
    }

    /// Decompresses `source` into `writer`.
    ///
    /// # Errors
    ///
    /// Returns an error if `source` cannot be read or is not a valid stream.
    pub fn decompress(&self, source: &Path, writer: &mut dyn Write) -> RotateResult<u64> {
        let mut reader = BufReader::new(File::open(source)?);
        Ok(self.codec.decode(&mut reader, writer)?)
    }

    fn compress_into(&self, source: &Path, temp: &Path) -> io::Result<u64> {
        let mut reader = BufReader::new(File::open(source)?);
        let file = OpenOptions::new().write(true).create_new(true).open(temp)?;
        let mut writer = BufWriter::new(file);

        let n = self.codec.encode(&mut reader, &mut writer)?;

        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(n)
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::gzip()
    }
}

/// Returns true if `path` is an in-progress (or abandoned) compression output.
#[must_use]
pub fn is_temp_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(TEMP_EXTENSION)
}

/// Returns the target a temporary compression output was destined for.
///
/// `app.log.1.gz.<uuid>.tmp` maps back to `app.log.1.gz`.
pub(crate) fn temp_target(path: &Path) -> Option<PathBuf> {
    if !is_temp_file(path) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (target, _id) = stem.rsplit_once('.')?;
    if target.is_empty() {
        return None;
    }
    Some(path.with_file_name(target))
}

/// Syncs directory entries so renames and creations are durable.
#[cfg(unix)]
pub(crate) fn sync_directory(dir: &Path) -> io::Result<()> {
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    File::open(dir)?.sync_all()
}

/// NTFS journals metadata; there is no directory handle to sync.
#[cfg(not(unix))]
pub(crate) fn sync_directory(_dir: &Path) -> io::Result<()> {
    Ok(())
}

fn temp_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.{}", Uuid::new_v4().simple(), TEMP_EXTENSION));
    target.with_file_name(name)
}

fn discard(temp: &Path) {
    match fs::remove_file(temp) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(?temp, error = %e, "failed to remove partial compression output"),
    }
}
