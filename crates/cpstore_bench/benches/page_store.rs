//! Page store operation benchmarks.

use cpstore_bench::{memory_store, random_page, text_page};
use cpstore_core::{CompressedPageStore, FixedPageFile, StoreConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const PAGE: usize = 4096;

/// Benchmark single page writes, with and without encryption.
fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");
    group.throughput(Throughput::Bytes(PAGE as u64));

    for (name, page) in [("text", text_page(PAGE)), ("random", random_page(PAGE))] {
        group.bench_with_input(BenchmarkId::new("plain", name), &page, |b, page| {
            let mut store = memory_store(StoreConfig::default().no_flush(true));
            let mut address = PAGE as u64;
            b.iter(|| {
                store.write(black_box(address), page).unwrap();
                address = PAGE as u64 + (address % (1024 * PAGE as u64));
            });
        });

        group.bench_with_input(BenchmarkId::new("encrypted", name), &page, |b, page| {
            let mut store = memory_store(
                StoreConfig::default()
                    .no_flush(true)
                    .passphrase("benchmark passphrase"),
            );
            let mut address = PAGE as u64;
            b.iter(|| {
                store.write(black_box(address), page).unwrap();
                address = PAGE as u64 + (address % (1024 * PAGE as u64));
            });
        });
    }
    group.finish();
}

/// Benchmark sync cost by batch size.
fn bench_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync");

    for batch in [1u64, 16, 256] {
        group.throughput(Throughput::Elements(batch));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            let mut store = memory_store(StoreConfig::default().no_flush(true));
            let page = text_page(PAGE);
            b.iter(|| {
                for n in 1..=batch {
                    store.write(n * PAGE as u64, &page).unwrap();
                }
                store.sync().unwrap();
            });
        });
    }
    group.finish();
}

fn populated(pages: u64, config: StoreConfig) -> CompressedPageStore {
    let mut store = memory_store(config);
    for n in 1..=pages {
        store.write(n * PAGE as u64, &text_page(PAGE)).unwrap();
    }
    store.sync().unwrap();
    store
}

/// Benchmark reads of durable pages.
fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");
    group.throughput(Throughput::Bytes(PAGE as u64));

    for (name, config) in [
        ("plain", StoreConfig::default()),
        ("encrypted", StoreConfig::default().passphrase("benchmark passphrase")),
    ] {
        group.bench_function(name, |b| {
            let store = populated(256, config.clone().no_flush(true));
            let mut page = vec![0u8; PAGE];
            let mut n = 0u64;
            b.iter(|| {
                n = n % 256 + 1;
                let read = store.read(black_box(n * PAGE as u64), &mut page).unwrap();
                black_box(read);
            });
        });
    }
    group.finish();
}

/// Benchmark reopening a store whose log must be replayed.
fn bench_recovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("recovery");
    group.sample_size(10);

    for pages in [64u64, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(pages), &pages, |b, &pages| {
            let dir = tempfile::tempdir().unwrap();
            {
                let mut store = CompressedPageStore::open(StoreConfig::in_dir(dir.path())).unwrap();
                for n in 1..=pages {
                    store.write(n * PAGE as u64, &text_page(PAGE)).unwrap();
                }
                store.sync().unwrap();
            }
            b.iter(|| {
                let store = CompressedPageStore::open(
                    StoreConfig::in_dir(dir.path()).read_only(true),
                )
                .unwrap();
                black_box(store.stats().unwrap());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_write, bench_sync, bench_read, bench_recovery);

criterion_main!(benches);
