// End-to-end scenarios exercising the full submit -> dispatch -> execute
// -> retire pipeline through the public API only.

use tensor_task_runtime::prelude::*;
use tensor_task_runtime::region::LogicalTensor;

unsafe extern "C" fn noop_kernel(_args: *mut *mut u8, _n: i32) {}

fn test_runtime(simulation_mode: bool) -> Runtime {
    let config = RuntimeConfig::builder()
        .cube_workers(2)
        .vector_workers(2)
        .simulation_mode(simulation_mode)
        .task_window_size(64)
        .heap_size(1 << 20)
        .dep_list_pool_size(1024)
        .build()
        .unwrap();
    let mut kernels = KernelRegistry::new();
    kernels.register(1, noop_kernel, "matmul");
    kernels.register(2, noop_kernel, "add");
    let mut runtime = Runtime::create(config, kernels).unwrap();
    runtime.run(|_rt| {});
    runtime
}

fn decoupled_test_runtime() -> Runtime {
    let config = RuntimeConfig::builder()
        .cube_workers(2)
        .vector_workers(2)
        .simulation_mode(false)
        .task_window_size(64)
        .heap_size(1 << 20)
        .dep_list_pool_size(1024)
        .init_task_on_submit(false)
        .build()
        .unwrap();
    let mut kernels = KernelRegistry::new();
    kernels.register(1, noop_kernel, "matmul");
    kernels.register(2, noop_kernel, "add");
    let mut runtime = Runtime::create(config, kernels).unwrap();
    runtime.run(|_rt| {});
    runtime
}

fn output(len: usize) -> LogicalTensor {
    LogicalTensor::contiguous(tensor_task_runtime::heap::HeapStorage::RAW_BASE, 0, &[len], 1)
}

#[test]
fn linear_chain_of_four_tasks_runs_to_completion() {
    let mut runtime = test_runtime(false);

    let mut prev_region = output(64);
    let t0 = runtime
        .submit_task(1, WorkerType::Cube, Some("matmul"), &[Param::output(prev_region.clone())])
        .unwrap();
    for _ in 0..3 {
        let next_region = LogicalTensor::contiguous(
            tensor_task_runtime::heap::HeapStorage::RAW_BASE,
            prev_region.storage_offset,
            &[64],
            1,
        );
        let _ = runtime
            .submit_task(
                2,
                WorkerType::Vector,
                Some("add"),
                &[Param::inout(next_region.clone())],
            )
            .unwrap();
        prev_region = next_region;
    }
    let _ = t0;

    runtime.wait_for_drain();
    let stats = runtime.stats();
    assert_eq!(stats.tasks_submitted, 4);
    assert_eq!(stats.tasks_completed, 4);
    runtime.destroy();
}

#[test]
fn sixteen_independent_tasks_all_complete() {
    let mut runtime = test_runtime(false);
    for i in 0..16u32 {
        let region = output(32);
        let region = LogicalTensor::contiguous(
            tensor_task_runtime::heap::HeapStorage::RAW_BASE,
            region.storage_offset + i as usize * 128,
            &[32],
            1,
        );
        runtime
            .submit_task(1, WorkerType::Cube, Some("matmul"), &[Param::output(region)])
            .unwrap();
    }
    runtime.wait_for_drain();
    assert_eq!(runtime.stats().tasks_submitted, 16);
    assert_eq!(runtime.stats().tasks_completed, 16);
    runtime.destroy();
}

#[test]
fn overlapping_region_creates_fanin_edge() {
    let mut runtime = test_runtime(false);
    let region = output(64);
    runtime
        .submit_task(1, WorkerType::Cube, Some("matmul"), &[Param::output(region.clone())])
        .unwrap();
    // second task reads the same bytes the first one produced
    runtime
        .submit_task(2, WorkerType::Vector, Some("add"), &[Param::input(region)])
        .unwrap();
    runtime.wait_for_drain();
    assert_eq!(runtime.stats().tasks_completed, 2);
    runtime.destroy();
}

#[test]
fn strided_regions_with_no_byte_overlap_do_not_serialize() {
    let mut runtime = test_runtime(false);
    let base = tensor_task_runtime::heap::HeapStorage::RAW_BASE;
    let mut a = LogicalTensor::contiguous(base, 0, &[4], 1);
    a.strides[0] = 4;
    a.max_byte_offset = a.min_byte_offset + 16;
    let mut b = LogicalTensor::contiguous(base, 2, &[4], 1);
    b.strides[0] = 4;
    b.max_byte_offset = b.min_byte_offset + 16;

    assert!(tensor_task_runtime::region::bbox_overlap(&a, &b));
    assert!(!tensor_task_runtime::region::overlap_1d_exact(&a, &b));

    runtime
        .submit_task(1, WorkerType::Cube, Some("matmul"), &[Param::output(a)])
        .unwrap();
    runtime
        .submit_task(2, WorkerType::Vector, Some("add"), &[Param::output(b)])
        .unwrap();
    runtime.wait_for_drain();
    assert_eq!(runtime.stats().tasks_completed, 2);
    runtime.destroy();
}

#[test]
fn scope_end_releases_tasks_with_no_consumers() {
    let mut runtime = test_runtime(false);
    runtime.scope_begin().unwrap();
    let region = output(16);
    runtime
        .submit_task(1, WorkerType::Cube, Some("matmul"), &[Param::output(region)])
        .unwrap();
    runtime.scope_end().unwrap();
    runtime.wait_for_drain();
    assert_eq!(runtime.stats().tasks_completed, 1);
    runtime.destroy();
}

#[test]
fn scope_end_without_begin_is_an_error() {
    let runtime = test_runtime(false);
    assert!(runtime.scope_end().is_err());
}

#[test]
fn window_full_stalls_until_slots_are_reclaimed() {
    let mut runtime = test_runtime(false);
    // window_size is 64; submit more than that and confirm the runtime
    // doesn't deadlock (alloc() must stall, not fail or lose tasks).
    for i in 0..200u32 {
        let region = LogicalTensor::contiguous(
            tensor_task_runtime::heap::HeapStorage::RAW_BASE,
            i as usize * 64,
            &[8],
            1,
        );
        runtime
            .submit_task(1, WorkerType::Cube, Some("matmul"), &[Param::output(region)])
            .unwrap();
    }
    runtime.wait_for_drain();
    assert_eq!(runtime.stats().tasks_submitted, 200);
    assert_eq!(runtime.stats().tasks_completed, 200);
    runtime.destroy();
}

#[test]
fn decoupled_init_task_mode_drains_via_background_poll_thread() {
    let mut runtime = decoupled_test_runtime();
    for i in 0..16u32 {
        let region = LogicalTensor::contiguous(
            tensor_task_runtime::heap::HeapStorage::RAW_BASE,
            i as usize * 128,
            &[32],
            1,
        );
        runtime
            .submit_task(1, WorkerType::Cube, Some("matmul"), &[Param::output(region)])
            .unwrap();
    }
    runtime.wait_for_drain();
    assert_eq!(runtime.stats().tasks_submitted, 16);
    assert_eq!(runtime.stats().tasks_completed, 16);
    runtime.destroy();
}

#[test]
fn decoupled_init_task_mode_resolves_fanin_edges_correctly() {
    let mut runtime = decoupled_test_runtime();
    let region = output(64);
    runtime
        .submit_task(1, WorkerType::Cube, Some("matmul"), &[Param::output(region.clone())])
        .unwrap();
    runtime
        .submit_task(2, WorkerType::Vector, Some("add"), &[Param::input(region)])
        .unwrap();
    runtime.wait_for_drain();
    assert_eq!(runtime.stats().tasks_completed, 2);
    runtime.destroy();
}

#[test]
fn orchestration_closure_submits_tasks_inline() {
    let config = RuntimeConfig::builder()
        .cube_workers(2)
        .vector_workers(2)
        .task_window_size(64)
        .heap_size(1 << 20)
        .dep_list_pool_size(1024)
        .build()
        .unwrap();
    let mut kernels = KernelRegistry::new();
    kernels.register(1, noop_kernel, "matmul");
    let mut runtime = Runtime::create(config, kernels).unwrap();

    runtime.run(|rt| {
        for i in 0..4u32 {
            let region = LogicalTensor::contiguous(
                tensor_task_runtime::heap::HeapStorage::RAW_BASE,
                i as usize * 64,
                &[8],
                1,
            );
            rt.submit_task(1, WorkerType::Cube, Some("matmul"), &[Param::output(region)])
                .unwrap();
        }
    });

    runtime.wait_for_drain();
    assert_eq!(runtime.stats().tasks_submitted, 4);
    assert_eq!(runtime.stats().tasks_completed, 4);
    runtime.destroy();
}

#[test]
fn threaded_orchestration_mode_runs_closure_on_its_own_thread() {
    let config = RuntimeConfig::builder()
        .cube_workers(1)
        .vector_workers(1)
        .task_window_size(64)
        .heap_size(1 << 20)
        .dep_list_pool_size(1024)
        .orchestration_mode(OrchestrationMode::Threaded)
        .build()
        .unwrap();
    let mut kernels = KernelRegistry::new();
    kernels.register(1, noop_kernel, "matmul");
    let mut runtime = Runtime::create(config, kernels).unwrap();

    runtime.run(|rt| {
        let region = output(16);
        rt.submit_task(1, WorkerType::Cube, Some("matmul"), &[Param::output(region)])
            .unwrap();
    });

    runtime.wait_for_drain();
    assert_eq!(runtime.stats().tasks_completed, 1);
    runtime.destroy();
}

#[test]
fn reset_rebuilds_a_usable_runtime() {
    let mut runtime = test_runtime(false);
    let region = output(16);
    runtime
        .submit_task(1, WorkerType::Cube, Some("matmul"), &[Param::output(region)])
        .unwrap();
    runtime.wait_for_drain();
    assert_eq!(runtime.stats().tasks_completed, 1);

    runtime.reset().unwrap();
    runtime.run(|_rt| {});
    assert_eq!(runtime.stats().tasks_submitted, 0);

    let region = output(16);
    runtime
        .submit_task(1, WorkerType::Cube, Some("matmul"), &[Param::output(region)])
        .unwrap();
    runtime.wait_for_drain();
    assert_eq!(runtime.stats().tasks_completed, 1);
    runtime.destroy();
}

#[test]
fn simulation_mode_advances_virtual_clocks_without_running_kernels() {
    let mut runtime = test_runtime(true);
    let region = output(4096);
    runtime
        .submit_task(1, WorkerType::Cube, Some("matmul"), &[Param::output(region)])
        .unwrap();
    runtime.wait_for_drain();
    assert_eq!(runtime.stats().tasks_completed, 1);
    runtime.destroy();
}
