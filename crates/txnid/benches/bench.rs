use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};
use txnid::{IdStatus, ProgressStore, RolloverHook, TxnIdGenerator};

// Number of IDs generated per benchmark iteration (split across threads for
// contended runs).
const TOTAL_IDS: usize = 65536;

/// Benchmarks the single-caller hot path.
fn bench_generator<H>(c: &mut Criterion, group_name: &str, generator_fn: impl Fn() -> TxnIdGenerator<H>)
where
    H: RolloverHook,
{
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                let generator = generator_fn();
                for _ in 0..TOTAL_IDS {
                    match generator.next_id() {
                        IdStatus::Ready { id } => {
                            black_box(id);
                        }
                        IdStatus::Stopped => unreachable!(),
                    }
                }
            }

            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmarks one generator shared across threads.
fn bench_generator_contended<H>(
    c: &mut Criterion,
    group_name: &str,
    generator_fn: impl Fn() -> TxnIdGenerator<H>,
) where
    H: RolloverHook,
{
    let mut group = c.benchmark_group(group_name);

    for thread_count in [1, 2, 4, 8, 16] {
        let ids_per_thread = TOTAL_IDS / thread_count;

        group.throughput(Throughput::Elements(TOTAL_IDS as u64));
        group.bench_function(format!("elems/{TOTAL_IDS}/threads/{thread_count}"), |b| {
            b.iter_custom(|iters| {
                let start = Instant::now();

                for _ in 0..iters {
                    let generator = Arc::new(generator_fn());
                    let barrier = Arc::new(Barrier::new(thread_count + 1));
                    scope(|s| {
                        for _ in 0..thread_count {
                            let generator = Arc::clone(&generator);
                            let barrier = Arc::clone(&barrier);
                            s.spawn(move || {
                                barrier.wait();
                                for _ in 0..ids_per_thread {
                                    match generator.next_id() {
                                        IdStatus::Ready { id } => {
                                            black_box(id);
                                        }
                                        IdStatus::Stopped => unreachable!(),
                                    }
                                }
                            });
                        }
                        barrier.wait();
                    });
                }

                start.elapsed()
            });
        });
    }

    group.finish();
}

fn benchmark_sequential(c: &mut Criterion) {
    bench_generator(c, "sequential/no_hook", || TxnIdGenerator::new(0, 0, 1));
}

fn benchmark_sequential_persisting(c: &mut Criterion) {
    // increment 4096 rolls over every 16 IDs, so this is dominated by
    // progress writes.
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ProgressStore::in_dir(dir.path());
    bench_generator(c, "sequential/persisting", || {
        let store = store.clone();
        TxnIdGenerator::with_hook(0, 0, 4096, move |seed: u64| {
            let _ = store.write_partial(seed + 1);
        })
    });
}

fn benchmark_contended(c: &mut Criterion) {
    bench_generator_contended(c, "contended/no_hook", || TxnIdGenerator::new(0, 0, 1));
}

criterion_group!(
    benches,
    benchmark_sequential,
    benchmark_sequential_persisting,
    benchmark_contended,
);
criterion_main!(benches);
