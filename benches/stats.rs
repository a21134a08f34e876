use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use surge::stats::Stats;

fn record(c: &mut Criterion) {
    c.bench_function("stats/record", |b| {
        let stats = Stats::new(60_000_000);
        let mut v = 0u64;
        b.iter(|| {
            stats.record(black_box(v % 60_000_000));
            v += 997;
        })
    });
}

fn percentile(c: &mut Criterion) {
    let stats = Stats::new(60_000_000);
    for i in 0..100_000u64 {
        stats.record((i * 37) % 60_000_000);
    }

    let mut group = c.benchmark_group("stats/percentile");
    for p in [50.0, 90.0, 99.0] {
        group.bench_with_input(BenchmarkId::from_parameter(p), &p, |b, &p| {
            b.iter(|| stats.percentile(black_box(p)))
        });
    }
    group.finish();
}

fn mean_and_stdev(c: &mut Criterion) {
    let stats = Stats::new(60_000_000);
    for i in 0..100_000u64 {
        stats.record((i * 37) % 60_000_000);
    }

    c.bench_function("stats/mean_and_stdev", |b| {
        b.iter(|| {
            let mean = stats.mean();
            black_box(stats.stdev(mean));
        })
    });
}

criterion_group!(benches, record, percentile, mean_and_stdev);
criterion_main!(benches);
