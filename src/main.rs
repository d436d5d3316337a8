//! pgmeta - PostgreSQL metadata checks for backup tooling
//!
//! Reads and verifies `pg_control`, validates WAL segment files, and converts
//! between log positions and WAL segment file names.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use pgmeta_format::{Lsn, ServerVersion};
use pgmeta_inspect::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pgmeta")]
#[command(about = "Control file and WAL segment checks for PostgreSQL backups")]
#[command(version)]
struct Cli {
    /// Path to a YAML config file (defaults to $PGMETA_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Server version for WAL checks, e.g. 13.4, 9.6.24 or 130004. Does not
    /// change the pg_control layout; set control.expected_version and
    /// control.crc_offset for that
    #[arg(long, global = true)]
    server_version: Option<ServerVersion>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read global/pg_control and verify its CRC and version
    Control {
        /// Data directory (defaults to $PGDATA)
        data_dir: Option<PathBuf>,
    },

    /// Check that a file is a complete WAL segment
    CheckSegment {
        /// Segment file
        path: PathBuf,

        /// File size to check against, instead of the on-disk size
        #[arg(long)]
        size: Option<u64>,
    },

    /// Check every segment in a WAL directory
    Scan {
        /// WAL directory (defaults to pg_wal under the data directory)
        dir: Option<PathBuf>,
    },

    /// Print the segment file name holding a log position
    SegmentName {
        /// Timeline
        #[arg(short, long, default_value = "1")]
        timeline: u32,

        /// Log position, e.g. 2/5000028
        lsn: Lsn,
    },

    /// Decode a segment file name
    ParseName {
        /// 24-digit segment file name
        name: String,
    },

    /// Print the effective configuration
    ShowConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match Config::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(2);
        }
    };
    if let Some(version) = cli.server_version {
        config.cluster.server_version = Some(version);
    }
    tracing::debug!(
        "server version {:?}, segment size {} MB",
        config.cluster.server_version.map(|v| v.to_string()),
        config.wal.segment_size_mb
    );

    match commands::execute(&config, cli.command, cli.json) {
        Ok(report) => {
            println!("{}", report.output);
            if !report.success {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(2);
        }
    }

    Ok(())
}
