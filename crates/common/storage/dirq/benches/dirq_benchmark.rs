// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Benchmarks for the directory queue.
//!
//! Measures:
//! - Produce latency at different payload sizes
//! - Full-walk consume throughput
//! - Purge over a tree of drained buckets

use std::{hint::black_box, time::Duration};

use bytes::Bytes;
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use dirq::{Queue, QueueBuilder};
use tempfile::TempDir;

/// Payload sizes to benchmark (bytes)
const PAYLOAD_SIZES: &[usize] = &[64, 1024, 16384];

/// Entries per consume iteration
const BATCH_SIZE: usize = 1_000;

fn create_queue(temp_dir: &TempDir) -> Queue {
    QueueBuilder::new(temp_dir.path())
        .build()
        .expect("Failed to create queue")
}

fn generate_payload(size: usize) -> Bytes { Bytes::from(vec![0xABu8; size]) }

fn bench_produce(c: &mut Criterion) {
    let mut group = c.benchmark_group("produce");

    for &size in PAYLOAD_SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let queue = create_queue(&temp_dir);
            let payload = generate_payload(size);

            b.iter(|| {
                queue.produce(black_box(&payload)).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_consume(c: &mut Criterion) {
    let mut group = c.benchmark_group("consume");
    group.sample_size(10);
    group.throughput(Throughput::Elements(BATCH_SIZE as u64));

    group.bench_function("full_walk", |b| {
        let temp_dir = TempDir::new().unwrap();
        let queue = create_queue(&temp_dir);
        let payload = generate_payload(256);

        b.iter_batched(
            || {
                for _ in 0..BATCH_SIZE {
                    queue.produce(&payload).unwrap();
                }
            },
            |()| {
                let consumed = queue.consume().map(|m| m.unwrap()).count();
                assert_eq!(consumed, BATCH_SIZE);
            },
            BatchSize::PerIteration,
        );
    });

    group.finish();
}

fn bench_purge(c: &mut Criterion) {
    let mut group = c.benchmark_group("purge");
    group.sample_size(10);

    group.bench_function("drained_buckets", |b| {
        let temp_dir = TempDir::new().unwrap();
        let queue = create_queue(&temp_dir);

        b.iter_batched(
            || {
                for i in 0..100u32 {
                    std::fs::create_dir(temp_dir.path().join(format!("{i:08x}"))).unwrap();
                }
            },
            |()| {
                let report = queue
                    .purge_with(Duration::from_secs(300), Duration::from_secs(600))
                    .unwrap();
                black_box(report);
            },
            BatchSize::PerIteration,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_produce, bench_consume, bench_purge);
criterion_main!(benches);
