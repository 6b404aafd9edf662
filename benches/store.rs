//! Storage Layer Benchmarks
//!
//! Measures raw append and sequential-scan throughput of the record stores,
//! the two operations the parser and the analyses lean on respectively.
//!
//! ## Running Benchmarks
//!
//! ```bash
//! cargo bench --bench store
//! cargo bench --bench store -- "append"
//! cargo bench --bench store -- "scan"
//! ```

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tempfile::tempdir;

use chainstore::chain::RawBlock;
use chainstore::{ArrayStore, ReadWrite};

const BLOCK_COUNT: u64 = 10_000;

fn sample_block(height: u32) -> RawBlock {
    let mut hash = [0u8; 32];
    hash[..4].copy_from_slice(&height.to_le_bytes());
    RawBlock::new(
        hash,
        u64::from(height) * 100,
        height * 2,
        2,
        4,
        6,
        height,
        2,
        1_500_000_000 + height,
        0x1d00_ffff,
        height.wrapping_mul(77),
        1_000,
        900,
    )
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    group.throughput(Throughput::Elements(BLOCK_COUNT));

    group.bench_function("blocks_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let store =
                    ArrayStore::<RawBlock, ReadWrite>::open(dir.path().join("blocks")).unwrap();
                (dir, store)
            },
            |(dir, mut store)| {
                for height in 0..BLOCK_COUNT as u32 {
                    store.append(&sample_block(height)).unwrap();
                }
                store.flush().unwrap();
                drop(store);
                dir
            },
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut store = ArrayStore::<RawBlock, ReadWrite>::open(dir.path().join("blocks")).unwrap();
    for height in 0..BLOCK_COUNT as u32 {
        store.append(&sample_block(height)).unwrap();
    }
    store.flush().unwrap();

    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Elements(BLOCK_COUNT));

    group.bench_function("sum_tx_counts_10k", |b| {
        b.iter(|| {
            let mut total = 0u64;
            for i in 0..store.len() {
                total += u64::from(store.get(black_box(i)).unwrap().tx_count);
            }
            black_box(total)
        })
    });

    group.bench_function("find_all_every_100th", |b| {
        b.iter(|| {
            let hits = store.find_all(|block| block.height % 100 == 0).unwrap();
            black_box(hits.len())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_append, bench_scan);
criterion_main!(benches);
