//! cpstore CLI
//!
//! Command-line tools for compressed page store files.
//!
//! # Commands
//!
//! - `inspect` - Display page counts, file sizes and compression ratio
//! - `verify` - Decode every live page and check allocations
//! - `dump-log` - Dump recovery log records for debugging
//! - `checkpoint` - Replay the recovery log into the index and truncate it

mod commands;

use clap::{Parser, Subcommand};
use commands::{CliError, StoreLocation};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// cpstore command-line page store tools.
#[derive(Parser)]
#[command(name = "cpstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding pages.dat, pages.idx and pages.log
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Logical page size the store was created with
    #[arg(global = true, long, default_value_t = 4096)]
    page_size: usize,

    /// Passphrase for encrypted stores
    #[arg(global = true, long)]
    passphrase: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify store integrity
    Verify,

    /// Dump recovery log records for debugging
    DumpLog {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Apply the recovery log to the page index and truncate it
    Checkpoint,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let location = |command: &'static str| -> Result<StoreLocation, CliError> {
        let dir = cli.path.clone().ok_or(CliError::MissingPath(command))?;
        Ok(StoreLocation {
            dir,
            page_size: cli.page_size,
            passphrase: cli.passphrase.clone(),
        })
    };

    match &cli.command {
        Commands::Inspect { format } => {
            commands::inspect::run(&location("inspect")?, format)?;
        }
        Commands::Verify => {
            commands::verify::run(&location("verify")?)?;
        }
        Commands::DumpLog { limit, format } => {
            commands::dump_log::run(&location("dump-log")?, *limit, format)?;
        }
        Commands::Checkpoint => {
            commands::checkpoint::run(&location("checkpoint")?)?;
        }
        Commands::Version => {
            println!("cpstore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("cpstore Core v{}", cpstore_core::VERSION);
        }
    }

    Ok(())
}
