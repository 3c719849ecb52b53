//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up test stores and the page
//! contents most tests need.

use cpstore_core::{
    BackendPageIndex, CompressedPageStore, CoreResult, Geometry, PageIndex, StoreConfig,
};
use cpstore_storage::{InMemoryBackend, StorageBackend};
use std::path::Path;
use tempfile::TempDir;

/// Data, log and index held in shared in-memory buffers.
///
/// Clones share the same bytes, so a store can be dropped without closing
/// and reopened over the same `MemoryFiles` to simulate a process crash.
#[derive(Clone, Default)]
pub struct MemoryFiles {
    /// Data file.
    pub data: InMemoryBackend,
    /// Recovery log.
    pub log: InMemoryBackend,
    /// Page index.
    pub index: InMemoryBackend,
}

impl MemoryFiles {
    /// Creates empty files.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a store over these files.
    pub fn open(&self, config: StoreConfig) -> CoreResult<CompressedPageStore> {
        self.open_with_log(config, Box::new(self.log.clone()))
    }

    /// Opens a store over these files with a substitute log backend, for
    /// example a [`CrashableBackend`](crate::CrashableBackend) wrapping `self.log`.
    pub fn open_with_log(
        &self,
        config: StoreConfig,
        log: Box<dyn StorageBackend>,
    ) -> CoreResult<CompressedPageStore> {
        let geometry = Geometry::new(config.page_size, config.allocation_quantum)?;
        let index: Box<dyn PageIndex> = if config.read_only {
            Box::new(BackendPageIndex::read_only(
                Box::new(self.index.clone()),
                geometry,
            ))
        } else {
            Box::new(BackendPageIndex::new(
                Box::new(self.index.clone()),
                geometry,
                config.initial_index_size,
            )?)
        };
        CompressedPageStore::open_with_backends(config, Box::new(self.data.clone()), log, index)
    }

    /// Zeroes the page index, as if none of its updates reached the disk.
    pub fn lose_index_updates(&self) {
        let extent = self.index.data().len();
        self.index.set_data(vec![0u8; extent]);
    }

    /// Cuts `bytes` off the end of the recovery log.
    pub fn tear_log(&self, bytes: usize) {
        let mut log = self.log.data();
        log.truncate(log.len().saturating_sub(bytes));
        self.log.set_data(log);
    }

    /// Current recovery log length.
    pub fn log_len(&self) -> usize {
        self.log.data().len()
    }
}

enum Source {
    Memory(MemoryFiles),
    Dir(TempDir, StoreConfig),
}

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: CompressedPageStore,
    source: Source,
}

impl TestStore {
    /// Creates a store over fresh in-memory files.
    pub fn memory() -> Self {
        Self::memory_with(StoreConfig::default())
    }

    /// Creates a store over fresh in-memory files with `config`.
    pub fn memory_with(config: StoreConfig) -> Self {
        let files = MemoryFiles::new();
        Self {
            store: files.open(config).expect("Failed to open in-memory store"),
            source: Source::Memory(files),
        }
    }

    /// Creates a file-based store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = StoreConfig::in_dir(temp_dir.path());
        Self {
            store: CompressedPageStore::open(config.clone()).expect("Failed to open file store"),
            source: Source::Dir(temp_dir, config),
        }
    }

    /// Drops the store without closing it and opens it again.
    ///
    /// Anything not synced is lost, exactly as after a crash.
    pub fn reopen(self) -> Self {
        let Self { store, source } = self;
        let config = store.config().clone();
        drop(store);

        let store = match &source {
            Source::Memory(files) => files.open(config),
            Source::Dir(_, config) => CompressedPageStore::open(config.clone()),
        }
        .expect("Failed to reopen store");
        Self { store, source }
    }

    /// The shared in-memory files, if memory-backed.
    pub fn files(&self) -> Option<&MemoryFiles> {
        match &self.source {
            Source::Memory(files) => Some(files),
            Source::Dir(..) => None,
        }
    }

    /// The store directory, if file-based.
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            Source::Memory(_) => None,
            Source::Dir(dir, _) => Some(dir.path()),
        }
    }
}

impl std::ops::Deref for TestStore {
    type Target = CompressedPageStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

impl std::ops::DerefMut for TestStore {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.store
    }
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust,ignore
/// use cpstore_testkit::with_temp_store;
///
/// #[test]
/// fn my_test() {
///     with_temp_store(|store| {
///         store.write(4096, &[0u8; 4096]).unwrap();
///     });
/// }
/// ```
pub fn with_temp_store<F>(f: F)
where
    F: FnOnce(&mut CompressedPageStore),
{
    let mut store = TestStore::memory();
    f(&mut store);
}

/// Runs a test with a temporary file-based store.
pub fn with_file_store<F>(f: F)
where
    F: FnOnce(&mut CompressedPageStore),
{
    let mut store = TestStore::file();
    f(&mut store);
}

/// A page of repeating text runs; compresses well.
pub fn compressible_page(page_size: usize, seed: u8) -> Vec<u8> {
    (0..page_size)
        .map(|i| b'a' + ((i / 64) as u8).wrapping_add(seed) % 26)
        .collect()
}

/// A page of xorshift noise; never compresses.
pub fn incompressible_page(page_size: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    (0..page_size)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpstore_core::FixedPageFile;

    #[test]
    fn memory_store_round_trip() {
        with_temp_store(|store| {
            let page = compressible_page(4096, 3);
            store.write(4096, &page).unwrap();

            let mut out = vec![0u8; 4096];
            assert_eq!(store.read(4096, &mut out).unwrap(), 4096);
            assert_eq!(out, page);
        });
    }

    #[test]
    fn file_store_has_path() {
        let store = TestStore::file();
        assert!(store.path().unwrap().exists());
        assert!(store.files().is_none());
    }

    #[test]
    fn reopen_keeps_synced_pages_only() {
        let mut store = TestStore::memory();
        store.write(4096, &compressible_page(4096, 1)).unwrap();
        store.sync().unwrap();
        store.write(8192, &compressible_page(4096, 2)).unwrap();

        let store = store.reopen();
        let mut out = vec![0u8; 4096];
        assert_eq!(store.read(4096, &mut out).unwrap(), 4096);
        assert_eq!(store.read(8192, &mut out).unwrap(), 0);
    }

    #[test]
    fn reopen_file_store() {
        let mut store = TestStore::file();
        store.write(4096, &incompressible_page(4096, 5)).unwrap();
        store.sync().unwrap();

        let store = store.reopen();
        let mut out = vec![0u8; 4096];
        store.read(4096, &mut out).unwrap();
        assert_eq!(out, incompressible_page(4096, 5));
    }

    #[test]
    fn page_generators() {
        assert_eq!(compressible_page(512, 0).len(), 512);
        assert_ne!(incompressible_page(64, 1), incompressible_page(64, 2));
    }
}
