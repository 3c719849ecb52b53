//! Page store configuration.

use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default data file name used by [`StoreConfig::in_dir`].
pub const DATA_FILE: &str = "pages.dat";
/// Default page index file name used by [`StoreConfig::in_dir`].
pub const INDEX_FILE: &str = "pages.idx";
/// Default recovery log file name used by [`StoreConfig::in_dir`].
pub const LOG_FILE: &str = "pages.log";

/// Smallest supported logical page size.
pub const MIN_PAGE_SIZE: usize = 512;
/// Largest supported logical page size.
pub const MAX_PAGE_SIZE: usize = 64 * 1024;

/// Configuration for opening a [`CompressedPageStore`](crate::CompressedPageStore).
#[derive(Clone)]
pub struct StoreConfig {
    /// Path of the data file holding compressed page payloads.
    pub data_path: PathBuf,

    /// Path of the memory-mapped page index.
    pub index_path: PathBuf,

    /// Path of the recovery log.
    pub log_path: PathBuf,

    /// Fixed logical page size in bytes (power of two).
    pub page_size: usize,

    /// Allocation quantum of the data file in bytes (power of two, at most `page_size`).
    pub allocation_quantum: u64,

    /// Bytes the space allocator adds when the data file runs out of room.
    pub extension_quantum: u64,

    /// Recovery log size that triggers an index flush and log truncation.
    pub checkpoint_threshold: u64,

    /// Size the page index file is created with.
    pub initial_index_size: u64,

    /// Open every file read-only and reject all mutations.
    pub read_only: bool,

    /// Skip forced device flushes on `sync` (faster, not crash-durable).
    pub no_flush: bool,

    /// Passphrase enabling the stream cipher; `None` stores pages in the clear.
    pub passphrase: Option<String>,

    /// zlib compression level (0-9).
    pub compression_level: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DATA_FILE),
            index_path: PathBuf::from(INDEX_FILE),
            log_path: PathBuf::from(LOG_FILE),
            page_size: 4096,
            allocation_quantum: 512,
            extension_quantum: 1024 * 1024,       // 1 MB
            checkpoint_threshold: 4 * 1024 * 1024, // 4 MB
            initial_index_size: 64 * 1024,
            read_only: false,
            no_flush: false,
            passphrase: None,
            compression_level: 6,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with explicit paths for the three files.
    #[must_use]
    pub fn new(
        data_path: impl Into<PathBuf>,
        index_path: impl Into<PathBuf>,
        log_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            data_path: data_path.into(),
            index_path: index_path.into(),
            log_path: log_path.into(),
            ..Self::default()
        }
    }

    /// Creates a configuration placing all three files in `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(DATA_FILE), dir.join(INDEX_FILE), dir.join(LOG_FILE))
    }

    /// Sets the logical page size.
    #[must_use]
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the allocation quantum.
    #[must_use]
    pub fn allocation_quantum(mut self, bytes: u64) -> Self {
        self.allocation_quantum = bytes;
        self
    }

    /// Sets the data file extension quantum.
    #[must_use]
    pub fn extension_quantum(mut self, bytes: u64) -> Self {
        self.extension_quantum = bytes;
        self
    }

    /// Sets the recovery log checkpoint threshold.
    #[must_use]
    pub fn checkpoint_threshold(mut self, bytes: u64) -> Self {
        self.checkpoint_threshold = bytes;
        self
    }

    /// Sets the initial page index size.
    #[must_use]
    pub fn initial_index_size(mut self, bytes: u64) -> Self {
        self.initial_index_size = bytes;
        self
    }

    /// Sets whether the store is opened read-only.
    #[must_use]
    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Sets whether `sync` skips forced device flushes.
    #[must_use]
    pub fn no_flush(mut self, value: bool) -> Self {
        self.no_flush = value;
        self
    }

    /// Sets the zlib compression level.
    #[must_use]
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    /// Enables the stream cipher with the given passphrase.
    #[must_use]
    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Checks that the configured values are mutually consistent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvariantViolation`] describing the first bad value.
    pub fn validate(&self) -> CoreResult<()> {
        if !self.page_size.is_power_of_two()
            || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size)
        {
            return Err(CoreError::invariant(format!(
                "page size {} must be a power of two in {MIN_PAGE_SIZE}..={MAX_PAGE_SIZE}",
                self.page_size
            )));
        }
        if !self.allocation_quantum.is_power_of_two()
            || self.allocation_quantum > self.page_size as u64
        {
            return Err(CoreError::invariant(format!(
                "allocation quantum {} must be a power of two no larger than the page size",
                self.allocation_quantum
            )));
        }
        if self.extension_quantum < self.allocation_quantum {
            return Err(CoreError::invariant(format!(
                "extension quantum {} is smaller than the allocation quantum",
                self.extension_quantum
            )));
        }
        if self.compression_level > 9 {
            return Err(CoreError::invariant(format!(
                "compression level {} is outside 0..=9",
                self.compression_level
            )));
        }
        if matches!(self.passphrase.as_deref(), Some("")) {
            return Err(CoreError::invariant("passphrase must not be empty"));
        }
        Ok(())
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("data_path", &self.data_path)
            .field("index_path", &self.index_path)
            .field("log_path", &self.log_path)
            .field("page_size", &self.page_size)
            .field("allocation_quantum", &self.allocation_quantum)
            .field("extension_quantum", &self.extension_quantum)
            .field("checkpoint_threshold", &self.checkpoint_threshold)
            .field("initial_index_size", &self.initial_index_size)
            .field("read_only", &self.read_only)
            .field("no_flush", &self.no_flush)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("compression_level", &self.compression_level)
            .finish()
    }
}
