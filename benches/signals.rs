//! Benchmarks for reactive-graph-core
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use reactive_graph_core::{batch, computed, observable, reaction};

// =============================================================================
// OBSERVABLE BENCHMARKS
// =============================================================================

fn bench_observable_create(c: &mut Criterion) {
    c.bench_function("observable_create", |b| {
        b.iter(|| black_box(observable(0i32)))
    });
}

fn bench_observable_get(c: &mut Criterion) {
    let s = observable(42i32);
    c.bench_function("observable_get", |b| b.iter(|| black_box(s.get())));
}

fn bench_observable_set(c: &mut Criterion) {
    let s = observable(0i32);
    c.bench_function("observable_set", |b| b.iter(|| s.set(black_box(42))));
}

fn bench_observable_set_same_value(c: &mut Criterion) {
    let s = observable(42i32);
    c.bench_function("observable_set_same_value", |b| {
        b.iter(|| s.set(black_box(42)))
    });
}

// =============================================================================
// COMPUTED BENCHMARKS
// =============================================================================

fn bench_computed_create(c: &mut Criterion) {
    let s = observable(0i32);
    c.bench_function("computed_create", |b| {
        let s = s.clone();
        b.iter(|| {
            black_box(computed({
                let s = s.clone();
                move || s.get() * 2
            }))
        })
    });
}

fn bench_computed_get_cached(c: &mut Criterion) {
    let s = observable(42i32);
    let s_clone = s.clone();
    let d = computed(move || s_clone.get() * 2);

    // First get to cache the value
    let _ = d.get();

    c.bench_function("computed_get_cached", |b| b.iter(|| black_box(d.get())));
}

fn bench_computed_get_dirty(c: &mut Criterion) {
    let s = observable(0i32);
    let s_clone = s.clone();
    let d = computed(move || s_clone.get() * 2);

    let mut i = 0i32;
    c.bench_function("computed_get_dirty", |b| {
        b.iter(|| {
            s.set(i);
            i += 1;
            black_box(d.get())
        })
    });
}

fn bench_computed_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("computed_chain");

    for depth in [1, 5, 10, 20] {
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            let s = observable(1i32);

            let mut current = {
                let s = s.clone();
                computed(move || s.get() + 1)
            };

            for _ in 1..depth {
                let prev = current.clone();
                current = computed(move || prev.get() + 1);
            }

            b.iter(|| {
                s.set(black_box(1));
                black_box(current.get())
            })
        });
    }

    group.finish();
}

// =============================================================================
// REACTION BENCHMARKS
// =============================================================================

fn bench_reaction_create(c: &mut Criterion) {
    c.bench_function("reaction_create", |b| {
        b.iter(|| black_box(reaction("bench", || {})))
    });
}

fn bench_reaction_trigger(c: &mut Criterion) {
    let s = observable(0i32);
    let s_clone = s.clone();
    let _r = reaction("bench", move || {
        black_box(s_clone.get());
    });

    let mut i = 0i32;
    c.bench_function("reaction_trigger", |b| {
        b.iter(|| {
            s.set(i);
            i += 1;
        })
    });
}

fn bench_reaction_multiple_deps(c: &mut Criterion) {
    let a = observable(0i32);
    let b = observable(0i32);
    let c_obs = observable(0i32);

    let a_c = a.clone();
    let b_c = b.clone();
    let c_c = c_obs.clone();
    let _r = reaction("bench", move || {
        black_box(a_c.get() + b_c.get() + c_c.get());
    });

    let mut i = 0i32;
    c.bench_function("reaction_multiple_deps", |b| {
        b.iter(|| {
            a.set(i);
            i += 1;
        })
    });
}

// =============================================================================
// BATCH BENCHMARKS
// =============================================================================

fn bench_batch_updates(c: &mut Criterion) {
    let s = observable(0i32);
    let s_clone = s.clone();
    let _r = reaction("bench", move || {
        black_box(s_clone.get());
    });

    c.bench_function("batch_10_updates", |b| {
        b.iter(|| {
            batch(|| {
                for i in 0..10 {
                    s.set(black_box(i));
                }
            })
        })
    });
}

// =============================================================================
// STRESS TESTS
// =============================================================================

fn bench_many_observables(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_observables");

    for count in [100, 1000, 10000] {
        group.bench_with_input(BenchmarkId::new("create", count), &count, |b, &count| {
            b.iter(|| {
                let observables: Vec<_> = (0..count).map(|i| observable(i)).collect();
                black_box(observables)
            })
        });
    }

    group.finish();
}

fn bench_many_reactions(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_reactions");

    for count in [10, 100, 500] {
        group.bench_with_input(BenchmarkId::new("trigger", count), &count, |b, &count| {
            let s = observable(0i32);

            let reactions: Vec<_> = (0..count)
                .map(|_| {
                    let s = s.clone();
                    reaction("bench", move || {
                        black_box(s.get());
                    })
                })
                .collect();

            let mut i = 0i32;
            b.iter(|| {
                s.set(i);
                i += 1;
            });

            drop(reactions);
        });
    }

    group.finish();
}

// =============================================================================
// DIAMOND DEPENDENCY BENCHMARK
// =============================================================================

/// Diamond: two computeds sharing a root observable, one reaction observing
/// both through a final computed — checks that glitch-free propagation does
/// not cost more than a single recomputation per write.
fn bench_diamond_dependency(c: &mut Criterion) {
    let root = observable(0i32);
    let r1 = root.clone();
    let r2 = root.clone();
    let left = computed(move || r1.get() + 1);
    let right = computed(move || r2.get() * 2);
    let left2 = left.clone();
    let right2 = right.clone();
    let sum = computed(move || left2.get() + right2.get());
    let sum2 = sum.clone();
    let _r = reaction("bench", move || {
        black_box(sum2.get());
    });

    let mut i = 0i32;
    c.bench_function("diamond_dependency_write", |b| {
        b.iter(|| {
            root.set(i);
            i += 1;
        })
    });
}

// =============================================================================
// CRITERION SETUP
// =============================================================================

criterion_group!(
    observable_benches,
    bench_observable_create,
    bench_observable_get,
    bench_observable_set,
    bench_observable_set_same_value,
);

criterion_group!(
    computed_benches,
    bench_computed_create,
    bench_computed_get_cached,
    bench_computed_get_dirty,
    bench_computed_chain,
);

criterion_group!(
    reaction_benches,
    bench_reaction_create,
    bench_reaction_trigger,
    bench_reaction_multiple_deps,
    bench_batch_updates,
);

criterion_group!(
    stress_benches,
    bench_many_observables,
    bench_many_reactions,
    bench_diamond_dependency,
);

criterion_main!(
    observable_benches,
    computed_benches,
    reaction_benches,
    stress_benches,
);
