extern crate criterion;
extern crate smolder;

use std::fmt::Write;
use std::io::Cursor;

use criterion::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use smolder::calltree::compute_call_tree;
use smolder::filter::invert_thread_stacks;
use smolder::flamegraph::compute_flame_graph_timing;
use smolder::profile::folded::profile_from_folded;
use smolder::profile::Profile;

// A folded-stacks profile with plenty of shared prefixes, the shape a real
// sampled workload produces.
fn synthetic_profile(lines: usize) -> Profile {
    let mut rng = SmallRng::seed_from_u64(42);
    let mut text = String::new();
    for _ in 0..lines {
        let depth = rng.gen_range(1..30);
        for d in 0..depth {
            if d > 0 {
                text.push(';');
            }
            // low func counts at shallow depths keep prefixes shared
            write!(text, "func_{}", rng.gen_range(0..10 * (d + 1))).unwrap();
        }
        writeln!(text, " {}", rng.gen_range(1..100)).unwrap();
    }
    profile_from_folded(Cursor::new(text)).expect("synthetic profile must parse")
}

fn calltree_benchmark(c: &mut Criterion) {
    let profile = synthetic_profile(10_000);
    let thread = &profile.threads[0];

    let mut group = c.benchmark_group("calltree");
    group.throughput(Throughput::Elements(thread.samples.len() as u64));
    group.bench_function("build", |b| {
        b.iter_batched(
            || thread.clone(),
            |t| {
                compute_call_tree(
                    t,
                    &profile.categories,
                    profile.interval,
                    profile.default_category(),
                    Default::default(),
                    false,
                )
            },
            BatchSize::SmallInput,
        )
    });
    group.bench_function("invert", |b| b.iter(|| invert_thread_stacks(thread)));
    group.finish();
}

fn flamegraph_benchmark(c: &mut Criterion) {
    let profile = synthetic_profile(10_000);
    let tree = compute_call_tree(
        profile.threads[0].clone(),
        &profile.categories,
        profile.interval,
        profile.default_category(),
        Default::default(),
        false,
    );

    let mut group = c.benchmark_group("flamegraph");
    group.throughput(Throughput::Elements(tree.len() as u64));
    group.bench_function("timing", |b| b.iter(|| compute_flame_graph_timing(&tree)));
    group.finish();
}

criterion_group!(benches, calltree_benchmark, flamegraph_benchmark);
criterion_main!(benches);
