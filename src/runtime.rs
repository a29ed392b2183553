// Runtime aggregate: owns every subsystem, spins up the worker and
// completion threads on `create`, and exposes the orchestrator-facing
// API plus lifecycle control (`run`/`reset`/`destroy`).

use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};

use crate::config::{OrchestrationMode, RuntimeConfig};
use crate::deppool::DepPool;
use crate::error::Result;
use crate::heap::HeapStorage;
use crate::kernel::KernelRegistry;
use crate::orchestrator::{Orchestrator, Param};
use crate::region::RegionIndex;
use crate::scheduler::{AnyIdle, MinVirtualClock, Scheduler, WorkerSelectionPolicy};
use crate::stats::{RuntimeStats, RuntimeStatsSnapshot};
use crate::task::{TaskId, WorkerType};
use crate::trace::{TraceCollector, TraceEvent};
use crate::window::TaskWindow;
use crate::worker::Worker;

const COMPLETION_QUEUE_DEPTH: usize = 4096;

/// A fully assembled runtime instance. `create` either returns one with
/// every subsystem sized and validated, or an error with no partial
/// effects — nothing is spawned until configuration passes validation.
pub struct Runtime {
    config: RuntimeConfig,
    window: Arc<TaskWindow>,
    heap_storage: Arc<HeapStorage>,
    scheduler: Arc<Scheduler>,
    orchestrator: Orchestrator,
    kernels: Arc<KernelRegistry>,
    stats: Arc<RuntimeStats>,
    trace: Arc<TraceCollector>,
    shutdown: Arc<AtomicBool>,
    worker_threads: Vec<JoinHandle<()>>,
    completion_thread: Option<JoinHandle<()>>,
    init_task_poll_thread: Option<JoinHandle<()>>,
    started: bool,
}

impl Runtime {
    /// Builds every subsystem from `config` but does not start any
    /// threads — call [`Self::run`] to begin dispatching.
    pub fn create(config: RuntimeConfig, kernels: KernelRegistry) -> Result<Self> {
        let window = TaskWindow::new(config.task_window_size);
        let dep_pool = Arc::new(DepPool::new(config.dep_list_pool_size));
        let heap_storage = Arc::new(HeapStorage::new(config.heap_size));
        let region_index = Arc::new(RegionIndex::new(
            config.interval_tree_threshold,
            crate::config::TENSORMAP_CLEANUP_INTERVAL,
        ));
        // HeapRing and HeapStorage are sized identically: the ring only
        // ever hands out offsets within the storage it backs.
        let heap_ring = Arc::new(crate::heap::HeapRing::new(config.heap_size));
        let heap_ring_for_orchestrator = heap_ring.clone();

        let worker_counts = [
            config.num_cube_workers,
            config.num_vector_workers,
            config.num_ai_cpu_workers,
            config.num_accelerator_workers,
        ];
        let policy: Box<dyn WorkerSelectionPolicy> = if config.simulation_mode {
            Box::new(MinVirtualClock)
        } else {
            Box::new(AnyIdle)
        };
        let scheduler = Arc::new(Scheduler::new(
            window.clone(),
            dep_pool.clone(),
            heap_ring,
            region_index.clone(),
            worker_counts,
            policy,
        ));
        let stats = Arc::new(RuntimeStats::new());
        let orchestrator = Orchestrator::new(
            config.clone(),
            window.clone(),
            dep_pool,
            heap_ring_for_orchestrator,
            region_index,
            scheduler.clone(),
            stats.clone(),
        );

        Ok(Self {
            config,
            window,
            heap_storage,
            scheduler,
            orchestrator,
            kernels: Arc::new(kernels),
            stats,
            trace: Arc::new(TraceCollector::new(true)),
            shutdown: Arc::new(AtomicBool::new(false)),
            worker_threads: Vec::new(),
            completion_thread: None,
            init_task_poll_thread: None,
            started: false,
        })
    }

    /// Spawns the completion-drain thread and one OS thread per
    /// configured worker, blocking on a barrier until every thread has
    /// reported ready, then runs `orchestration_fn` — inline on the
    /// caller's thread, or on a dedicated orchestrator thread, per
    /// `config.orchestration_mode` (spec §5/§6) — and marks the
    /// scheduler's orchestrator-done flag once it returns. Idempotent:
    /// calling `run` twice is a no-op.
    pub fn run<F>(&mut self, orchestration_fn: F)
    where
        F: FnOnce(&Runtime) + Send,
    {
        if self.started {
            return;
        }
        self.started = true;
        self.shutdown.store(false, std::sync::atomic::Ordering::Release);

        let (tx, rx) = mpsc::sync_channel(COMPLETION_QUEUE_DEPTH);
        let scheduler = self.scheduler.clone();
        let stats = self.stats.clone();
        self.completion_thread = Some(std::thread::spawn(move || {
            for event in rx {
                scheduler.complete(event.task_id);
                stats.tasks_completed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }));

        if !self.config.init_task_on_submit {
            let scheduler = self.scheduler.clone();
            let shutdown = self.shutdown.clone();
            self.init_task_poll_thread = Some(std::thread::spawn(move || {
                while !shutdown.load(std::sync::atomic::Ordering::Acquire) {
                    if let Err(e) = scheduler.poll_new_tasks() {
                        warn!(error = %e, "init_task poll failed");
                    }
                    std::thread::sleep(std::time::Duration::from_micros(20));
                }
                let _ = scheduler.poll_new_tasks();
            }));
        }

        let barrier = Arc::new(std::sync::Barrier::new(self.total_worker_count() + 1));
        let mut global_id = 0u32;
        for worker_type in WorkerType::ALL {
            let count = self.worker_count(worker_type);
            for local_index in 0..count as usize {
                let worker = Worker::new(
                    global_id,
                    worker_type,
                    local_index,
                    Self::cpu_affinity_for(global_id),
                    self.config.simulation_mode,
                    self.window.clone(),
                    self.scheduler.clone(),
                    self.kernels.clone(),
                    self.heap_storage.clone(),
                    self.trace.clone(),
                    tx.clone(),
                );
                let shutdown = self.shutdown.clone();
                let b = barrier.clone();
                self.worker_threads.push(std::thread::spawn(move || {
                    b.wait();
                    worker.run(&shutdown);
                }));
                global_id += 1;
            }
        }
        drop(tx);
        barrier.wait();
        info!(workers = self.total_worker_count(), "runtime started");

        let rt: &Runtime = self;
        match rt.config.orchestration_mode {
            OrchestrationMode::Inline => orchestration_fn(rt),
            OrchestrationMode::Threaded => {
                std::thread::scope(|s| {
                    s.spawn(move || orchestration_fn(rt));
                });
            }
        }
        rt.scheduler.mark_orchestrator_done();
    }

    fn worker_count(&self, worker_type: WorkerType) -> u32 {
        match worker_type {
            WorkerType::Cube => self.config.num_cube_workers,
            WorkerType::Vector => self.config.num_vector_workers,
            WorkerType::AiCpu => self.config.num_ai_cpu_workers,
            WorkerType::Accelerator => self.config.num_accelerator_workers,
        }
    }

    fn total_worker_count(&self) -> usize {
        WorkerType::ALL.iter().map(|&wt| self.worker_count(wt) as usize).sum()
    }

    fn cpu_affinity_for(global_id: u32) -> Option<usize> {
        let n = num_cpus::get();
        if n == 0 {
            None
        } else {
            Some(global_id as usize % n)
        }
    }

    pub fn scope_begin(&self) -> Result<()> {
        self.orchestrator.scope_begin()
    }

    pub fn scope_end(&self) -> Result<()> {
        self.orchestrator.scope_end()
    }

    pub fn submit_task(
        &self,
        kernel_id: u32,
        worker_type: WorkerType,
        func_name: Option<&'static str>,
        params: &[Param],
    ) -> Result<TaskId> {
        self.orchestrator.submit_task(kernel_id, worker_type, func_name, params)
    }

    pub fn orchestration_done(&self) -> bool {
        self.orchestrator.orchestration_done()
    }

    pub fn stats(&self) -> RuntimeStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn drain_trace(&self) -> Vec<TraceEvent> {
        self.trace.drain()
    }

    /// Blocks until every submitted task has reached CONSUMED.
    pub fn wait_for_drain(&self) {
        let mut spins = 0u32;
        while !self.orchestration_done() {
            if spins < 1000 {
                std::hint::spin_loop();
            } else {
                std::thread::sleep(std::time::Duration::from_micros(50));
            }
            spins = spins.saturating_add(1);
        }
    }

    /// Stops all worker and completion threads. The runtime can be
    /// `run` again afterward against the same (now idle) state.
    pub fn destroy(&mut self) {
        if !self.started {
            return;
        }
        self.shutdown.store(true, std::sync::atomic::Ordering::Release);
        for handle in self.worker_threads.drain(..) {
            let _ = handle.join();
        }
        if let Some(handle) = self.completion_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.init_task_poll_thread.take() {
            let _ = handle.join();
        }
        self.started = false;
    }

    /// Tears down the current instance and rebuilds every subsystem from
    /// the same config and kernel registry, as if freshly created (spec
    /// §6). Any state from the previous run (window, heap, trace,
    /// stats) is discarded.
    pub fn reset(&mut self) -> Result<()> {
        self.destroy();
        let kernels = (*self.kernels).clone();
        *self = Self::create(self.config.clone(), kernels)?;
        Ok(())
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.destroy();
    }
}
