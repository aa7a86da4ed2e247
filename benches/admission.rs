// Admission Decision Benchmarks
//
// Key metrics measured:
// - Single-key decision latency per algorithm
// - Decision latency across many keys (shard spread)
// - Contended throughput from several threads
// - Eviction sweep cost over a large idle key set
//
// Usage:
//   cargo bench --bench admission

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::time::Duration;
use throttlegate::rate_limit::{
    AdmissionController, Algorithm, ControllerOptions, ManualClock, QuotaPolicy,
};

const ALGORITHMS: [Algorithm; 3] = [
    Algorithm::FixedWindow,
    Algorithm::SlidingWindow,
    Algorithm::TokenBucket,
];

fn controller(algorithm: Algorithm) -> AdmissionController<ManualClock> {
    let policy = QuotaPolicy::new(100, Duration::from_secs(60)).unwrap();
    AdmissionController::with_clock(
        policy,
        ControllerOptions::new().algorithm(algorithm),
        ManualClock::new(),
    )
    .unwrap()
}

fn bench_single_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_key");
    for algorithm in ALGORITHMS {
        let controller = controller(algorithm);
        let mut now = Duration::ZERO;
        group.bench_function(BenchmarkId::from_parameter(algorithm), |b| {
            b.iter(|| {
                now += Duration::from_micros(50);
                black_box(controller.allow(black_box("198.51.100.1"), now))
            })
        });
    }
    group.finish();
}

fn bench_many_keys(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_keys");
    for key_count in [1_000usize, 100_000] {
        let keys: Vec<String> = (0..key_count)
            .map(|i| format!("10.{}.{}.{}", i >> 16, (i >> 8) & 255, i & 255))
            .collect();
        let controller = controller(Algorithm::FixedWindow);
        group.bench_with_input(BenchmarkId::from_parameter(key_count), &keys, |b, keys| {
            let mut i = 0usize;
            b.iter(|| {
                i = (i + 1) % keys.len();
                black_box(controller.allow(&keys[i], Duration::from_secs(1)))
            })
        });
    }
    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    const THREADS: usize = 8;
    const CALLS_PER_THREAD: usize = 1_000;

    let mut group = c.benchmark_group("contended");
    group.throughput(Throughput::Elements((THREADS * CALLS_PER_THREAD) as u64));
    for shared_key in [true, false] {
        let label = if shared_key { "shared_key" } else { "per_thread_key" };
        group.bench_function(label, |b| {
            b.iter(|| {
                let controller = controller(Algorithm::FixedWindow);
                std::thread::scope(|scope| {
                    for t in 0..THREADS {
                        let controller = &controller;
                        scope.spawn(move || {
                            let key = if shared_key {
                                "shared".to_string()
                            } else {
                                format!("thread-{}", t)
                            };
                            for _ in 0..CALLS_PER_THREAD {
                                black_box(controller.allow(&key, Duration::from_secs(1)));
                            }
                        });
                    }
                });
            })
        });
    }
    group.finish();
}

fn bench_eviction(c: &mut Criterion) {
    c.bench_function("evict_10k_idle", |b| {
        b.iter_batched(
            || {
                let controller = controller(Algorithm::FixedWindow);
                for i in 0..10_000 {
                    controller.allow(&format!("key-{}", i), Duration::ZERO);
                }
                controller
            },
            |controller| black_box(controller.evict_idle(Duration::from_secs(120))),
            criterion::BatchSize::LargeInput,
        )
    });
}

criterion_group!(
    benches,
    bench_single_key,
    bench_many_keys,
    bench_contended,
    bench_eviction
);
criterion_main!(benches);
