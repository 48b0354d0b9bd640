//! Cat command.

use logroll_core::Compressor;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Writes the contents of `path` to `out`, decompressing gzip backups.
pub fn run(path: &Path, out: &mut dyn Write) -> Result<(), Box<dyn std::error::Error>> {
    let compressor = Compressor::gzip();
    let compressed = path.extension().and_then(|e| e.to_str()) == Some(compressor.extension());

    if compressed {
        compressor.decompress(path, out)?;
    } else {
        let mut file = File::open(path)?;
        io::copy(&mut file, out)?;
    }
    out.flush()?;
    Ok(())
}
