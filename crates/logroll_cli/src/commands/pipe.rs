//! Pipe command: stdin into a rotating log file.

use logroll_core::{Config, NamingScheme, RetentionMode, RotatingWriter};
use std::io::{self, BufRead, Read};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Options for [`run`].
#[derive(Debug, Clone)]
pub struct PipeOptions {
    pub max_size: u64,
    pub max_backups: usize,
    pub max_age: Option<Duration>,
    pub compress: bool,
    pub naming: NamingScheme,
    pub background: bool,
    pub events: bool,
}

impl PipeOptions {
    fn config(&self) -> Config {
        let mut config = Config::new()
            .max_size(self.max_size)
            .max_backups(self.max_backups)
            .compress(self.compress)
            .naming(self.naming);
        if let Some(age) = self.max_age {
            config = config.max_age(age);
        }
        if self.background {
            config = config.retention(RetentionMode::Background);
        }
        config
    }
}

/// Copies stdin into the rotating file at `path` until EOF.
pub fn run(path: &Path, options: &PipeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = io::stdin();
    let lines = copy_lines(stdin.lock(), path, options)?;
    info!("Wrote {} lines to {:?}", lines, path);
    Ok(())
}

/// Copies `input` line by line, one write per line so a line never
/// straddles two files.
///
/// Returns the number of lines written.
pub fn copy_lines(
    input: impl Read,
    path: &Path,
    options: &PipeOptions,
) -> Result<u64, Box<dyn std::error::Error>> {
    let writer = RotatingWriter::open(path, options.config())?;

    if options.events {
        writer.set_observer(|event| match serde_json::to_string(event) {
            Ok(json) => eprintln!("{json}"),
            Err(e) => warn!("failed to encode rotation event: {}", e),
        });
    }

    let mut reader = io::BufReader::new(input);
    let mut line = Vec::new();
    let mut count = 0u64;
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        writer.write(&line)?;
        count += 1;
    }

    writer.close()?;
    if let Some(error) = writer.last_rotation_error() {
        warn!("last rotation reported an error: {}", error);
    }
    Ok(count)
}
