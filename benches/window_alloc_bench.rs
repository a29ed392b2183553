// tensor-task-runtime: task window allocation benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tensor_task_runtime::task::WorkerType;
use tensor_task_runtime::window::TaskWindow;

fn bench_alloc_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("window_alloc_uncontended");

    for size in [64u32, 256, 1024, 4096] {
        group.bench_with_input(BenchmarkId::new("capacity", size), &size, |b, &size| {
            let window = TaskWindow::new(size);
            b.iter(|| {
                let id = window.alloc(1, WorkerType::Cube, 0);
                black_box(id)
            });
        });
    }

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("window_get");

    let window = TaskWindow::new(1024);
    let id = window.alloc(1, WorkerType::Vector, 0);

    group.bench_function("read_guard", |b| {
        b.iter(|| {
            let guard = window.get(id);
            black_box(guard.is_some())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_alloc_uncontended, bench_get);
criterion_main!(benches);
