//! logroll CLI
//!
//! Command-line tools for rotating log files.
//!
//! # Commands
//!
//! - `pipe` - Copy stdin into a rotating log file
//! - `list` - List the backups of a log file
//! - `prune` - Delete backups beyond a retention limit
//! - `cat` - Print a backup, decompressing if needed

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use logroll_core::NamingScheme;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Rotating log file tools.
#[derive(Parser)]
#[command(name = "logroll")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Backup naming scheme.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Naming {
    /// `app.log.20240101_120000_000`
    Timestamp,
    /// `app.log.1`, `app.log.2`, ...
    Index,
}

impl From<Naming> for NamingScheme {
    fn from(naming: Naming) -> Self {
        match naming {
            Naming::Timestamp => NamingScheme::Timestamp,
            Naming::Index => NamingScheme::Index,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Copy stdin into a rotating log file, line by line
    Pipe {
        /// Path of the live log file
        path: PathBuf,

        /// Rotate once the file would exceed this many bytes
        #[arg(long, default_value_t = 10 * 1024 * 1024)]
        max_size: u64,

        /// Number of backups to keep (0 = unbounded)
        #[arg(long, default_value_t = 5)]
        max_backups: usize,

        /// Delete backups older than this many seconds
        #[arg(long)]
        max_age_secs: Option<u64>,

        /// Gzip backups
        #[arg(short, long)]
        compress: bool,

        /// Backup naming scheme
        #[arg(long, value_enum, default_value = "timestamp")]
        naming: Naming,

        /// Run retention on a background thread
        #[arg(long)]
        background: bool,

        /// Print a JSON line per rotation on stderr
        #[arg(long)]
        events: bool,
    },

    /// List the backups of a log file, oldest first
    List {
        /// Path of the live log file
        path: PathBuf,

        /// Backup naming scheme
        #[arg(long, value_enum, default_value = "timestamp")]
        naming: Naming,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete backups beyond a retention limit
    Prune {
        /// Path of the live log file
        path: PathBuf,

        /// Number of backups to keep (0 = unbounded)
        #[arg(short, long)]
        keep: usize,

        /// Also delete backups older than this many seconds
        #[arg(long)]
        max_age_secs: Option<u64>,

        /// Backup naming scheme
        #[arg(long, value_enum, default_value = "timestamp")]
        naming: Naming,

        /// Dry run - show what would be deleted
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Print a backup to stdout, decompressing if needed
    Cat {
        /// Path of the backup file
        path: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Diagnostics go to stderr; stdout carries data.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Pipe {
            path,
            max_size,
            max_backups,
            max_age_secs,
            compress,
            naming,
            background,
            events,
        } => {
            let options = commands::pipe::PipeOptions {
                max_size,
                max_backups,
                max_age: max_age_secs.map(Duration::from_secs),
                compress,
                naming: naming.into(),
                background,
                events,
            };
            commands::pipe::run(&path, &options)?;
        }
        Commands::List {
            path,
            naming,
            format,
        } => {
            commands::list::run(&path, naming.into(), &format, &mut std::io::stdout())?;
        }
        Commands::Prune {
            path,
            keep,
            max_age_secs,
            naming,
            dry_run,
        } => {
            commands::prune::run(
                &path,
                naming.into(),
                keep,
                max_age_secs.map(Duration::from_secs),
                dry_run,
                &mut std::io::stdout(),
            )?;
        }
        Commands::Cat { path } => {
            commands::cat::run(&path, &mut std::io::stdout().lock())?;
        }
        Commands::Version => {
            println!("logroll CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("logroll core v{}", logroll_core::VERSION);
        }
    }

    Ok(())
}
