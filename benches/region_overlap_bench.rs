// tensor-task-runtime: region overlap predicate and index benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tensor_task_runtime::region::{bbox_overlap, hybrid_overlap, overlap_1d_exact, LogicalTensor, RegionIndex};

fn contiguous(base: usize, offset: usize, len: usize) -> LogicalTensor {
    LogicalTensor::contiguous(base, offset, &[len], 1)
}

fn bench_overlap_predicates(c: &mut Criterion) {
    let mut group = c.benchmark_group("overlap_predicates");

    let a = contiguous(0x1000, 0, 64);
    let b = contiguous(0x1000, 32, 64);

    group.bench_function("bbox_overlap", |b_| {
        b_.iter(|| black_box(bbox_overlap(black_box(&a), black_box(&b))));
    });

    group.bench_function("overlap_1d_exact", |b_| {
        b_.iter(|| black_box(overlap_1d_exact(black_box(&a), black_box(&b))));
    });

    group.bench_function("hybrid_overlap", |b_| {
        b_.iter(|| black_box(hybrid_overlap(black_box(&a), black_box(&b))));
    });

    group.finish();
}

fn bench_region_index_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_index_lookup");

    for bucket_len in [4usize, 32, 128] {
        group.bench_with_input(
            BenchmarkId::new("entries", bucket_len),
            &bucket_len,
            |b, &bucket_len| {
                let index = RegionIndex::new(32, 64);
                for i in 0..bucket_len {
                    index.insert(contiguous(0x1000, i * 256, 64), i as u32);
                }
                let query = contiguous(0x1000, 0, 64);
                b.iter(|| {
                    let hit = index.lookup(black_box(&query));
                    black_box(hit)
                });
            },
        );
    }

    group.finish();
}

fn bench_region_index_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_index_insert");

    group.bench_function("insert_disjoint", |b| {
        let index = RegionIndex::new(32, 64);
        let mut i = 0usize;
        b.iter(|| {
            index.insert(contiguous(0x1000, i * 256, 64), i as u32);
            i += 1;
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_overlap_predicates,
    bench_region_index_lookup,
    bench_region_index_insert
);
criterion_main!(benches);
