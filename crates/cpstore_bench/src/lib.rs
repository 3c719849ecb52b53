//! Benchmark utilities.

use cpstore_core::{BackendPageIndex, CompressedPageStore, Geometry, StoreConfig};
use cpstore_storage::InMemoryBackend;
use rand::Rng;

/// Generate a page of random bytes; it will not compress.
pub fn random_page(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate a page of short random runs; it compresses to roughly a quarter.
pub fn text_page(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let mut page = Vec::with_capacity(size);
    while page.len() < size {
        let byte = rng.gen_range(b'a'..=b'z');
        let run = rng.gen_range(1..12);
        page.extend(std::iter::repeat(byte).take(run));
    }
    page.truncate(size);
    page
}

/// Open a store over fresh in-memory data, log and index.
pub fn memory_store(config: StoreConfig) -> CompressedPageStore {
    let geometry =
        Geometry::new(config.page_size, config.allocation_quantum).expect("valid geometry");
    let index = BackendPageIndex::new(
        Box::new(InMemoryBackend::new()),
        geometry,
        config.initial_index_size,
    )
    .expect("index");
    CompressedPageStore::open_with_backends(
        config,
        Box::new(InMemoryBackend::new()),
        Box::new(InMemoryBackend::new()),
        Box::new(index),
    )
    .expect("open in-memory store")
}
