// tensor-task-runtime: heap-ring output allocator benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tensor_task_runtime::heap::{HeapRing, HeapStorage};

fn bench_alloc_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("heap_ring_alloc");

    for size in [64usize, 256, 4096, 65536] {
        group.bench_with_input(BenchmarkId::new("bytes", size), &size, |b, &size| {
            let ring = HeapRing::new(1 << 24);
            b.iter(|| {
                let offset = ring.alloc(black_box(size)).unwrap();
                black_box(offset)
            });
        });
    }

    group.finish();
}

fn bench_alloc_with_reclaim(c: &mut Criterion) {
    let mut group = c.benchmark_group("heap_ring_steady_state");

    group.bench_function("alloc_then_retire", |b| {
        let ring = HeapRing::new(1 << 16);
        b.iter(|| {
            let offset = ring.alloc(256).unwrap();
            ring.advance_tail(offset + 256);
            black_box(offset)
        });
    });

    group.finish();
}

fn bench_storage_ptr(c: &mut Criterion) {
    let mut group = c.benchmark_group("heap_storage_ptr_at");

    let storage = HeapStorage::new(1 << 16);
    group.bench_function("ptr_at", |b| {
        b.iter(|| {
            // SAFETY: benchmark-only read of a stable, single-threaded arena
            let ptr = unsafe { storage.ptr_at(black_box(128)) };
            black_box(ptr)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_alloc_sizes, bench_alloc_with_reclaim, bench_storage_ptr);
criterion_main!(benches);
