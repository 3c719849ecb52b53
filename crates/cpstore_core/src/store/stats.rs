//! Page store statistics and verification reports.
//!
//! Operation counters are atomic so they can be bumped from `&self` paths
//! such as `read`. Everything else in [`StoreStats`] is computed on demand
//! from the index, the allocator and the file sizes.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running operation counters.
#[derive(Debug, Default)]
pub(crate) struct StoreCounters {
    reads: AtomicU64,
    writes: AtomicU64,
    bytes_written: AtomicU64,
    syncs: AtomicU64,
    checkpoints: AtomicU64,
}

impl StoreCounters {
    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_sync(&self) {
        self.syncs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_checkpoint(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> OperationCounts {
        OperationCounts {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            syncs: self.syncs.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
        }
    }
}

/// Operations performed since the store was opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationCounts {
    /// Page reads, header reads included.
    pub reads: u64,
    /// Page writes, header writes included.
    pub writes: u64,
    /// Physical payload bytes written to the data file.
    pub bytes_written: u64,
    /// `sync` calls that persisted at least one remap.
    pub syncs: u64,
    /// Checkpoints taken (index flush plus log truncation).
    pub checkpoints: u64,
}

/// Point-in-time view of a page store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    /// Logical page size in bytes.
    pub page_size: usize,
    /// Pages that currently resolve to a payload (pending writes included).
    pub live_pages: u64,
    /// Pages written since the last sync.
    pub pending_pages: u64,
    /// Sum of stored payload sizes of live pages.
    pub payload_bytes: u64,
    /// Length of the data file.
    pub data_length: u64,
    /// Length of the recovery log.
    pub log_length: u64,
    /// Size of the page index table.
    pub index_extent: u64,
    /// Allocation quanta in use, header region included.
    pub allocated_quanta: u64,
    /// Allocation quanta tracked by the allocator.
    pub capacity_quanta: u64,
    /// Whether pages are encrypted.
    pub encrypted: bool,
    /// Whether the store was opened read-only.
    pub read_only: bool,
    /// Operation counters.
    pub operations: OperationCounts,
}

impl StoreStats {
    /// Logical bytes held by live pages.
    #[must_use]
    pub fn logical_bytes(&self) -> u64 {
        self.live_pages * self.page_size as u64
    }

    /// Stored bytes per logical byte; 1.0 for an empty store.
    #[must_use]
    pub fn compression_ratio(&self) -> f64 {
        match self.logical_bytes() {
            0 => 1.0,
            logical => self.payload_bytes as f64 / logical as f64,
        }
    }
}

/// Result of [`CompressedPageStore::verify`](crate::CompressedPageStore::verify).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Live pages examined.
    pub pages_checked: u64,
    /// One line per problem found.
    pub problems: Vec<String>,
}

impl VerifyReport {
    /// Returns `true` if no problem was found.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }

    pub(crate) fn problem(&mut self, message: String) {
        self.problems.push(message);
    }
}
