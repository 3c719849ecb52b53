//! CLI command implementations.

pub mod checkpoint;
pub mod dump_log;
pub mod inspect;
pub mod verify;

use cpstore_core::config::{DATA_FILE, INDEX_FILE, LOG_FILE};
use cpstore_core::{CoreError, StoreConfig};
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// No `--path` was given.
    #[error("store path required for {0}")]
    MissingPath(&'static str),

    /// The directory holds no page store.
    #[error("no page store found at {}", .0.display())]
    NotFound(PathBuf),

    /// `verify` found problems.
    #[error("verification failed with {0} problem(s)")]
    VerificationFailed(usize),

    /// Unknown `--format` value.
    #[error("unknown output format '{0}' (expected text or json)")]
    UnknownFormat(String),

    /// Page store error.
    #[error(transparent)]
    Store(#[from] CoreError),

    /// JSON serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Output format shared by the reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl Format {
    /// Parses a `--format` argument.
    pub fn parse(value: &str) -> Result<Self, CliError> {
        match value {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CliError::UnknownFormat(other.to_string())),
        }
    }
}

/// Where a store lives and how to open it.
#[derive(Debug, Clone)]
pub struct StoreLocation {
    /// Directory holding the three store files.
    pub dir: PathBuf,
    /// Logical page size.
    pub page_size: usize,
    /// Passphrase for encrypted stores.
    pub passphrase: Option<String>,
}

impl StoreLocation {
    /// Builds the store configuration, failing if the data file is missing.
    pub fn config(&self, read_only: bool) -> Result<StoreConfig, CliError> {
        if !self.dir.join(DATA_FILE).exists() {
            return Err(CliError::NotFound(self.dir.clone()));
        }

        let mut config = StoreConfig::in_dir(&self.dir)
            .page_size(self.page_size)
            .read_only(read_only);
        if let Some(passphrase) = &self.passphrase {
            config = config.passphrase(passphrase.clone());
        }
        Ok(config)
    }

    /// Path of the page index file.
    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// Path of the recovery log file.
    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }
}

/// Formats a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
