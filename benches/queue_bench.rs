//! Benchmarks for the runner's hot paths.
//!
//! Benchmarks cover:
//! - Queue insert and earliest-first claim
//! - Merging repeated site listings (the steady-state poll case)
//! - Argument signature hashing
//! - Worker pool dispatch and release round-trips

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use cron_control_runner::config::PoolConfig;
use cron_control_runner::core::{
    argument_signature, noop_sink, EventExecutor, EventQueue, ExecutionResult, PendingEvent, Site,
    WorkerPool,
};
use cron_control_runner::infra::InMemoryEventQueue;

use async_trait::async_trait;
use serde_json::json;

// ============================================================================
// Helpers
// ============================================================================

#[derive(Clone)]
struct InstantExecutor;

#[async_trait]
impl EventExecutor for InstantExecutor {
    async fn run(&self, _event: &PendingEvent) -> ExecutionResult {
        ExecutionResult::success(Duration::ZERO, None)
    }
}

fn build_events(sites: usize, per_site: u64) -> Vec<PendingEvent> {
    (0..sites)
        .flat_map(|s| {
            let site = Arc::new(Site::new(s.to_string(), format!("https://{s}.example")));
            (0..per_site).map(move |i| {
                PendingEvent::new(
                    Arc::clone(&site),
                    format!("hook_{}", i % 7),
                    // Interleave timestamps so ordering work is non-trivial
                    1_700_000_000 + i64::try_from((i * 7_919) % 3_600).unwrap_or(0),
                    json!([i]),
                    None,
                )
            })
        })
        .collect()
}

// ============================================================================
// Queue Benchmarks
// ============================================================================

fn bench_queue_insert_claim(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_insert_claim");

    for size in [100_u64, 1_000, 10_000] {
        let events = build_events(10, size / 10);
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &events, |b, events| {
            b.iter(|| {
                let mut q = InMemoryEventQueue::new(events.len());
                for event in events {
                    q.insert(event.clone());
                }
                while let Some(claimed) = q.claim() {
                    black_box(claimed);
                }
            });
        });
    }

    group.finish();
}

fn bench_queue_sync_unchanged_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_sync_unchanged_listing");

    for per_site in [10_u64, 100, 1_000] {
        let events = build_events(1, per_site);
        let mut q = InMemoryEventQueue::new(10_000);
        q.sync_site("0", events.clone());

        group.throughput(Throughput::Elements(per_site));
        group.bench_with_input(
            BenchmarkId::from_parameter(per_site),
            &events,
            |b, events| {
                b.iter(|| black_box(q.sync_site("0", events.clone())));
            },
        );
    }

    group.finish();
}

fn bench_argument_signature(c: &mut Criterion) {
    let mut group = c.benchmark_group("argument_signature");

    let small = json!([]);
    let large = json!({
        "post_id": 12_345,
        "tags": ["a", "b", "c", "d"],
        "meta": {"nested": {"depth": 3, "values": [1, 2, 3, 4, 5, 6, 7, 8]}}
    });

    group.bench_function("empty", |b| b.iter(|| argument_signature(black_box(&small))));
    group.bench_function("nested", |b| b.iter(|| argument_signature(black_box(&large))));

    group.finish();
}

// ============================================================================
// Pool Benchmarks
// ============================================================================

fn bench_pool_dispatch_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_dispatch_round_trip");

    for workers in [1_usize, 4, 16] {
        let pool = WorkerPool::new(
            PoolConfig::new().with_workers(workers),
            InstantExecutor,
            noop_sink(),
        )
        .unwrap();
        let events = build_events(1, 1);

        group.bench_with_input(BenchmarkId::from_parameter(workers), &events, |b, events| {
            let mut q = InMemoryEventQueue::new(16);
            b.iter(|| {
                q.insert(events[0].clone());
                let mut claimed = q.claim().unwrap();
                // Spin until a worker frees its slot
                loop {
                    match pool.try_dispatch(claimed) {
                        Ok(()) => break,
                        Err(rejected) => {
                            claimed = rejected.into_claimed();
                            std::hint::spin_loop();
                        }
                    }
                }
                while q.in_flight() > 0 {
                    std::hint::spin_loop();
                }
            });
        });

        pool.shutdown_with_timeout(Duration::from_secs(5));
    }

    group.finish();
}

criterion_group!(
    queue_benches,
    bench_queue_insert_claim,
    bench_queue_sync_unchanged_listing,
    bench_argument_signature
);

criterion_group!(pool_benches, bench_pool_dispatch_round_trip);

criterion_main!(queue_benches, pool_benches);
