//! Crash recovery testing for cpstore.
//!
//! Simulates crashes at the points that matter to the page store and checks
//! what a reopened store sees.
//!
//! ## Test Strategy
//!
//! 1. **Crash before sync** - unsynced writes vanish, synced pages keep their old contents
//! 2. **Crash after sync** - the page index never reached disk; log replay restores it
//! 3. **Torn log tail** - a crash mid-append leaves half a record, which replay discards
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cpstore_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::new();
//! assert!(harness.run_all().iter().all(|r| r.passed));
//! ```

use crate::fixtures::{compressible_page, incompressible_page, MemoryFiles};
use cpstore_core::{CoreResult, FixedPageFile, StoreConfig};
use cpstore_storage::{StorageBackend, StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Pages expected to read back correctly after recovery.
    pub expected_pages: usize,
    /// Pages that actually read back correctly.
    pub actual_pages: usize,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str, pages: usize) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            expected_pages: pages,
            actual_pages: pages,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, expected: usize, actual: usize, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_pages: expected,
            actual_pages: actual,
            error: Some(error.to_string()),
        }
    }

    fn check(description: &str, expected: usize, actual: usize) -> Self {
        if actual == expected {
            Self::pass(description, expected)
        } else {
            Self::fail(description, expected, actual, "pages differ after recovery")
        }
    }
}

/// A storage backend wrapper that can simulate crashes.
///
/// Writes and appends are counted; the write that crosses the configured
/// threshold is cut short at the threshold and fails, as if the process
/// died mid-write. Every later write fails outright.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    crash_after_bytes: AtomicUsize,
    bytes_written: AtomicUsize,
    crashed: AtomicBool,
    fail_on_flush: AtomicBool,
}

impl CrashableBackend {
    /// Creates a new crashable backend wrapping an inner backend.
    pub fn new(inner: Box<dyn StorageBackend>) -> Self {
        Self {
            inner,
            crash_after_bytes: AtomicUsize::new(usize::MAX),
            bytes_written: AtomicUsize::new(0),
            crashed: AtomicBool::new(false),
            fail_on_flush: AtomicBool::new(false),
        }
    }

    /// Sets the backend to crash after writing the specified number of bytes.
    pub fn crash_after(self, bytes: usize) -> Self {
        self.crash_after_bytes.store(bytes, Ordering::SeqCst);
        self
    }

    /// Sets whether flush and sync should fail.
    pub fn set_fail_on_flush(&self, fail: bool) {
        self.fail_on_flush.store(fail, Ordering::SeqCst);
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Bytes accepted before the crash point, or how many of `len` to keep
    /// when this write crosses it. `None` means write everything.
    fn admit(&self, len: usize) -> StorageResult<Option<usize>> {
        let current = self.bytes_written.fetch_add(len, Ordering::SeqCst);
        let threshold = self.crash_after_bytes.load(Ordering::SeqCst);

        if current >= threshold {
            self.crashed.store(true, Ordering::SeqCst);
            return Err(crash_error("simulated crash during write"));
        }
        if current + len > threshold {
            self.crashed.store(true, Ordering::SeqCst);
            return Ok(Some(threshold - current));
        }
        Ok(None)
    }

    fn check_flush(&self, what: &str) -> StorageResult<()> {
        if self.fail_on_flush.load(Ordering::SeqCst) {
            self.crashed.store(true, Ordering::SeqCst);
            return Err(crash_error(&format!("simulated crash during {what}")));
        }
        Ok(())
    }
}

fn crash_error(message: &str) -> StorageError {
    StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, message.to_string()))
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn read_into(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
        self.inner.read_into(offset, buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        match self.admit(data.len())? {
            None => self.inner.write_at(offset, data),
            Some(partial) => {
                let _ = self.inner.write_at(offset, &data[..partial]);
                Err(crash_error("simulated crash during partial write"))
            }
        }
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        match self.admit(data.len())? {
            None => self.inner.append(data),
            Some(partial) => {
                let _ = self.inner.append(&data[..partial]);
                Err(crash_error("simulated crash during partial append"))
            }
        }
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check_flush("flush")?;
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check_flush("sync")?;
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}

/// Test harness for crash recovery scenarios over in-memory files.
pub struct CrashRecoveryHarness {
    /// Store configuration used for every scenario.
    pub config: StoreConfig,
    /// Results of crash recovery tests.
    pub results: Vec<CrashRecoveryResult>,
}

impl Default for CrashRecoveryHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl CrashRecoveryHarness {
    /// Creates a harness with the default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates a harness with a custom configuration (e.g. with a passphrase).
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            config,
            results: Vec::new(),
        }
    }

    fn page_size(&self) -> usize {
        self.config.page_size
    }

    fn address(&self, page: u64) -> u64 {
        page * self.page_size() as u64
    }

    /// Counts pages among `expected` that read back with the given contents;
    /// `None` means the page must read as never written.
    fn count_matching(
        &self,
        files: &MemoryFiles,
        expected: &[(u64, Option<Vec<u8>>)],
    ) -> CoreResult<usize> {
        let store = files.open(self.config.clone())?;
        let mut page = vec![0u8; self.page_size()];
        let mut matching = 0;

        for (address, contents) in expected {
            let read = store.read(*address, &mut page)?;
            let ok = match contents {
                Some(contents) => read == page.len() && &page == contents,
                None => read == 0,
            };
            if ok {
                matching += 1;
            }
        }
        Ok(matching)
    }

    fn record(
        &mut self,
        description: &str,
        expected: usize,
        outcome: CoreResult<usize>,
    ) -> CrashRecoveryResult {
        let result = match outcome {
            Ok(actual) => CrashRecoveryResult::check(description, expected, actual),
            Err(e) => CrashRecoveryResult::fail(description, expected, 0, &e.to_string()),
        };
        self.results.push(result.clone());
        result
    }

    /// Writes after the last sync must vanish; synced pages keep their
    /// synced contents even though they were overwritten afterwards.
    pub fn crash_before_sync(&mut self) -> CrashRecoveryResult {
        let description = "Unsynced writes are lost cleanly";
        let files = MemoryFiles::new();
        let synced = compressible_page(self.page_size(), 1);

        let outcome = (|| {
            let mut store = files.open(self.config.clone())?;
            store.write(self.address(1), &synced)?;
            store.sync()?;

            store.write(self.address(1), &incompressible_page(self.page_size(), 9))?;
            store.write(self.address(2), &compressible_page(self.page_size(), 2))?;
            drop(store);

            self.count_matching(
                &files,
                &[(self.address(1), Some(synced.clone())), (self.address(2), None)],
            )
        })();

        self.record(description, 2, outcome)
    }

    /// The log alone must restore synced remaps when the index was lost.
    pub fn crash_after_sync(&mut self) -> CrashRecoveryResult {
        let description = "Synced writes survive loss of the page index";
        let files = MemoryFiles::new();
        let pages: Vec<(u64, Vec<u8>)> = (1..=8)
            .map(|i| {
                let contents = if i % 2 == 0 {
                    compressible_page(self.page_size(), i as u8)
                } else {
                    incompressible_page(self.page_size(), i)
                };
                (self.address(i), contents)
            })
            .collect();

        let outcome = (|| {
            let mut store = files.open(self.config.clone())?;
            for (address, contents) in &pages {
                store.write(*address, contents)?;
            }
            store.sync()?;
            drop(store);

            files.lose_index_updates();
            let expected: Vec<_> = pages
                .iter()
                .map(|(address, contents)| (*address, Some(contents.clone())))
                .collect();
            self.count_matching(&files, &expected)
        })();

        self.record(description, pages.len(), outcome)
    }

    /// A crash halfway through appending a log record must leave the
    /// previous sync intact and drop the torn one.
    pub fn torn_log_tail(&mut self) -> CrashRecoveryResult {
        let description = "Torn recovery log tail is discarded";
        let files = MemoryFiles::new();
        let first = compressible_page(self.page_size(), 3);

        let outcome = (|| {
            // One 1-entry record fits, the next record is cut after 10 bytes.
            let log = CrashableBackend::new(Box::new(files.log.clone())).crash_after(20 + 10);
            let mut store = files.open_with_log(self.config.clone(), Box::new(log))?;

            store.write(self.address(1), &first)?;
            store.sync()?;
            store.write(self.address(2), &compressible_page(self.page_size(), 4))?;
            store.write(self.address(3), &compressible_page(self.page_size(), 5))?;
            if store.sync().is_ok() {
                return Ok(0);
            }
            drop(store);

            files.lose_index_updates();
            self.count_matching(
                &files,
                &[
                    (self.address(1), Some(first.clone())),
                    (self.address(2), None),
                    (self.address(3), None),
                ],
            )
        })();

        self.record(description, 3, outcome)
    }

    /// Runs every scenario.
    pub fn run_all(&mut self) -> Vec<CrashRecoveryResult> {
        vec![
            self.crash_before_sync(),
            self.crash_after_sync(),
            self.torn_log_tail(),
        ]
    }
}
