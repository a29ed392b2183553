// tensor-task-runtime: scheduler transition and dispatch benchmarks

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tensor_task_runtime::deppool::DepPool;
use tensor_task_runtime::heap::HeapRing;
use tensor_task_runtime::region::RegionIndex;
use tensor_task_runtime::scheduler::{AnyIdle, Scheduler};
use tensor_task_runtime::task::WorkerType;
use tensor_task_runtime::window::TaskWindow;

fn make_scheduler(capacity: u32) -> (Arc<TaskWindow>, Arc<Scheduler>) {
    let window = TaskWindow::new(capacity);
    let dep_pool = Arc::new(DepPool::new(1 << 16));
    let heap = Arc::new(HeapRing::new(1 << 20));
    let region_index = Arc::new(RegionIndex::new(32, 64));
    let scheduler = Arc::new(Scheduler::new(
        window.clone(),
        dep_pool,
        heap,
        region_index,
        [4, 4, 0, 0],
        Box::new(AnyIdle),
    ));
    (window, scheduler)
}

fn bench_submit_to_ready_no_deps(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_submit_to_ready");

    group.bench_function("no_dependencies", |b| {
        let (window, scheduler) = make_scheduler(4096);
        b.iter(|| {
            let id = window.alloc(1, WorkerType::Cube, 0);
            scheduler.prepare_slot(id);
            scheduler.mark_registered(id);
            scheduler.init_task(id).unwrap();
            black_box(scheduler.dispatch(WorkerType::Cube))
        });
    });

    group.finish();
}

fn bench_full_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_full_lifecycle");

    group.bench_function("dispatch_run_complete", |b| {
        let (window, scheduler) = make_scheduler(4096);
        b.iter(|| {
            let id = window.alloc(1, WorkerType::Cube, 0);
            scheduler.prepare_slot(id);
            scheduler.mark_registered(id);
            scheduler.init_task(id).unwrap();
            let dispatched = scheduler.dispatch(WorkerType::Cube).unwrap();
            scheduler.begin_running(dispatched);
            scheduler.complete(dispatched);
            black_box(dispatched)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_submit_to_ready_no_deps, bench_full_lifecycle);
criterion_main!(benches);
