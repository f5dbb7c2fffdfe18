use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::{hint::black_box, thread};
use zeroup::upload::{PartUrl, ProgressAggregator, plan::plan_parts};

const PART_SIZE: u64 = 10 * 1024 * 1024;

fn bench_advance(c: &mut Criterion) {
    for workers in [1usize, 4, 16] {
        c.bench_with_input(
            BenchmarkId::new("advance", workers),
            &workers,
            |b, &workers| {
                b.iter(|| {
                    let progress = ProgressAggregator::default();

                    thread::scope(|s| {
                        for _ in 0..workers {
                            let progress = progress.clone();
                            s.spawn(move || {
                                for _ in 0..10_000 {
                                    progress.advance(black_box(PART_SIZE));
                                }
                            });
                        }
                    });

                    progress.finish();
                    progress.total()
                });
            },
        );
    }
}

fn bench_plan_parts(c: &mut Criterion) {
    let urls: Vec<PartUrl> = (1..=10_000u16)
        .rev()
        .map(|n| PartUrl::new(n, &format!("https://storage.example/obj?partNumber={n}")))
        .collect();

    let total = PART_SIZE * 10_000 - 1;

    c.bench_function("plan_parts 10000", |b| {
        b.iter(|| plan_parts(black_box(total), black_box(PART_SIZE), &urls));
    });
}

criterion_group!(benches, bench_advance, bench_plan_parts);
criterion_main!(benches);
