//! # Work Queue Benchmark
//!
//! Measures submit + deliver round trips through the worker pool.
//!
//! Run with: cargo bench --package strata_core --bench work_queue_benchmark

#![allow(missing_docs)]

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use strata_core::{WorkQueue, WorkQueueConfig};

fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("work_queue_round_trip");

    for workers in [1usize, 2, 4] {
        let queue: WorkQueue<u64> = WorkQueue::new(WorkQueueConfig {
            workers,
            capacity: 1024,
        });
        group.throughput(Throughput::Elements(512));

        group.bench_with_input(BenchmarkId::new("512_jobs", workers), &workers, |b, _| {
            b.iter(|| {
                for i in 0..512u64 {
                    queue
                        .submit(move || black_box(i.wrapping_mul(2_654_435_761)), |v, acc: &mut u64| {
                            *acc = acc.wrapping_add(v);
                        })
                        .expect("capacity covers the batch");
                }
                let mut acc = 0u64;
                queue.flush(&mut acc, Duration::from_secs(5));
                black_box(acc)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_round_trip);
criterion_main!(benches);
