//! # Event Filter Benchmarks
//!
//! | Component | Operation | Scale |
//! |-----------|-----------|-------|
//! | Registry | broadcast one block | 100 / 1000 / 5000 filters |
//! | Registry | drain | 1000 filters |
//! | Aggregator | order one block | 100 / 1000 receipts |
//! | Finalize | stamp one block | 100 / 1000 receipts |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use qc_16_eth_filters::domain::aggregator::{CycleEvent, ReceiptAggregator};
use qc_16_eth_filters::domain::finalize::finalize_receipts;
use qc_16_eth_filters::domain::types::FilterAddress;
use qc_16_eth_filters::{FilterRegistry, LogCriteria};
use rand::seq::SliceRandom;
use shared_types::entities::{Address, BlockCompletion, Hash, InclusionList, Log, Receipt};
use std::time::Duration;

fn receipts(count: u64) -> Vec<Receipt> {
    (0..count)
        .map(|i| {
            let log = Log::new(
                Address::from_low_u64_be(i % 16),
                vec![Hash::from_low_u64_be(i % 4)],
                vec![0u8; 32],
            );
            Receipt::new(Hash::from_low_u64_be(i + 1), vec![log])
        })
        .collect()
}

// ============================================================================
// Registry
// ============================================================================

fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry-broadcast");
    group.measurement_time(Duration::from_secs(10));

    let block = receipts(200);

    for filters in [100usize, 1000, 5000] {
        let registry = FilterRegistry::new(Duration::from_secs(3600), 4).unwrap();
        let ids: Vec<_> = (0..filters)
            .map(|i| match i % 3 {
                0 => registry.new_block_filter(),
                1 => registry.new_log_filter(LogCriteria::default()),
                _ => {
                    let address = Address::from_low_u64_be((i % 16) as u64);
                    registry.new_log_filter(
                        LogCriteria::default().with_address(FilterAddress::Single(address)),
                    )
                }
            })
            .collect();

        let mut height = 0u64;
        group.throughput(Throughput::Elements(filters as u64));
        group.bench_with_input(BenchmarkId::new("filters", filters), &filters, |b, _| {
            b.iter(|| {
                height += 1;
                registry.broadcast(height, black_box(&block), Hash::from_low_u64_be(height));
                // keep buffers from growing across iterations
                if height % 64 == 0 {
                    for id in &ids {
                        let _ = registry.drain(id);
                    }
                }
            })
        });
    }

    group.finish();
}

fn bench_drain(c: &mut Criterion) {
    let registry = FilterRegistry::new(Duration::from_secs(3600), 4).unwrap();
    let ids: Vec<_> = (0..1000).map(|_| registry.new_block_filter()).collect();

    c.bench_function("registry-drain-1000", |b| {
        b.iter(|| {
            for id in &ids {
                black_box(registry.drain(id).unwrap());
            }
        })
    });
}

// ============================================================================
// Aggregator
// ============================================================================

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregator");

    for count in [100u64, 1000] {
        let block = receipts(count);
        let mut order: Vec<Hash> = block.iter().map(|r| r.transaction_hash).collect();
        order.shuffle(&mut rand::thread_rng());

        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::new("receipts", count), &count, |b, _| {
            b.iter(|| {
                let mut aggregator = ReceiptAggregator::default();
                for chunk in block.chunks(32) {
                    aggregator.handle(CycleEvent::Receipts {
                        height: 1,
                        round: 0,
                        receipts: chunk.to_vec(),
                    });
                }
                let out = aggregator.handle(CycleEvent::InclusionList(InclusionList {
                    height: 1,
                    round: 0,
                    tx_hashes: order.clone(),
                }));
                aggregator.handle(CycleEvent::BlockCompleted(BlockCompletion::success(1)));
                black_box(out)
            })
        });
    }

    group.finish();
}

// ============================================================================
// Finalize
// ============================================================================

fn bench_finalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("finalize");
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .unwrap();

    for count in [100u64, 1000] {
        let block = receipts(count);
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::new("receipts", count), &count, |b, _| {
            b.iter_batched_ref(
                || block.clone(),
                |rs| finalize_receipts(&pool, 7, Hash::repeat_byte(7), rs),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_broadcast,
    bench_drain,
    bench_aggregate,
    bench_finalize
);
criterion_main!(benches);
