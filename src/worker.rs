// Worker loop: pulls ready tasks off its worker type's queue, runs the
// registered kernel (execute mode) or advances a virtual clock by the
// estimated cost (simulation mode), and reports completion through a
// bounded MPSC queue rather than touching scheduler state directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use tracing::{trace, warn};

use crate::heap::HeapStorage;
use crate::kernel::KernelRegistry;
use crate::platform::unsafe_ops::pin_to_cpu;
use crate::scheduler::Scheduler;
use crate::task::{TaskId, WorkerType};
use crate::timer::estimate_cycles_by_name;
use crate::trace::{TraceCollector, TraceEvent};
use crate::window::TaskWindow;

/// Reported by a worker once a task finishes running; drained by the
/// runtime's completion thread, which is the only caller of
/// [`Scheduler::complete`].
pub struct CompletionEvent {
    pub task_id: TaskId,
    pub worker_id: u32,
    pub start_cycle: u64,
    pub end_cycle: u64,
}

pub struct Worker {
    pub id: u32,
    pub worker_type: WorkerType,
    pub local_index: usize,
    pub cpu_affinity: Option<usize>,
    pub simulation_mode: bool,
    window: Arc<TaskWindow>,
    scheduler: Arc<Scheduler>,
    kernels: Arc<KernelRegistry>,
    storage: Arc<HeapStorage>,
    trace: Arc<TraceCollector>,
    completion_tx: SyncSender<CompletionEvent>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        worker_type: WorkerType,
        local_index: usize,
        cpu_affinity: Option<usize>,
        simulation_mode: bool,
        window: Arc<TaskWindow>,
        scheduler: Arc<Scheduler>,
        kernels: Arc<KernelRegistry>,
        storage: Arc<HeapStorage>,
        trace: Arc<TraceCollector>,
        completion_tx: SyncSender<CompletionEvent>,
    ) -> Self {
        Self {
            id,
            worker_type,
            local_index,
            cpu_affinity,
            simulation_mode,
            window,
            scheduler,
            kernels,
            storage,
            trace,
            completion_tx,
        }
    }

    /// Runs until `shutdown` is set and the ready queue is observed
    /// empty. Call from a dedicated OS thread per worker.
    pub fn run(&self, shutdown: &AtomicBool) {
        if let Some(cpu) = self.cpu_affinity {
            if let Err(e) = pin_to_cpu(cpu) {
                warn!(worker_id = self.id, cpu, error = %e, "failed to pin worker to cpu");
            }
        }
        let mut idle_spins = 0u32;
        loop {
            match self.scheduler.dispatch(self.worker_type) {
                Some(task_id) => {
                    idle_spins = 0;
                    self.execute_one(task_id);
                }
                None => {
                    if shutdown.load(Ordering::Acquire) {
                        return;
                    }
                    if idle_spins < 64 {
                        std::hint::spin_loop();
                    } else {
                        std::thread::yield_now();
                    }
                    idle_spins = idle_spins.saturating_add(1);
                }
            }
        }
    }

    fn execute_one(&self, task_id: TaskId) {
        self.scheduler.begin_running(task_id);

        let (kernel_id, func_name, output_offsets, input_offsets, output_len_bytes) = {
            let guard = self.window.get(task_id);
            let descriptor = guard.as_ref().expect("dispatched task must have a live slot");
            (
                descriptor.kernel_id,
                descriptor.func_name,
                descriptor.output_offsets.to_vec(),
                descriptor.input_offsets.to_vec(),
                descriptor.packed_buffer_end.saturating_sub(descriptor.packed_buffer_base),
            )
        };

        let (start_cycle, end_cycle) = if self.simulation_mode {
            let cycles = estimate_cycles_by_name(func_name.unwrap_or(""), output_len_bytes.max(64));
            let clock = &self.scheduler.virtual_clocks[self.worker_type.index()][self.local_index];
            let fanin_ready = self.scheduler.fanin_max_end_cycle(task_id);
            let worker_ready = clock.load(Ordering::Acquire);
            let start = fanin_ready.max(worker_ready);
            let end = start + cycles;
            clock.store(end, Ordering::Release);
            self.scheduler.publish_end_cycle(task_id, end);
            (start, end)
        } else if let Ok(kernel) = self.kernels.get(kernel_id) {
            // SAFETY: each offset in `output_offsets`/`input_offsets` was
            // reserved exclusively for this task's region (or published by
            // its producer before this task became READY) and no other
            // live task's region overlaps it, so the pointers handed to
            // the kernel don't alias any concurrent access.
            let mut arg_ptrs: Vec<*mut u8> = output_offsets
                .iter()
                .chain(input_offsets.iter())
                .map(|&off| unsafe { self.storage.ptr_at(off as usize) })
                .collect();
            let start = crate::platform::unsafe_ops::read_tsc();
            unsafe {
                (kernel.func)(arg_ptrs.as_mut_ptr(), arg_ptrs.len() as i32);
            }
            let end = crate::platform::unsafe_ops::read_tsc();
            (start, end)
        } else {
            warn!(task_id, kernel_id, "unknown kernel, skipping execution");
            let t = crate::platform::unsafe_ops::read_tsc();
            (t, t)
        };

        self.trace.record(TraceEvent {
            task_id,
            worker_id: self.id,
            worker_type: self.worker_type.into(),
            start_cycle: start_cycle * 1000,
            end_cycle: end_cycle * 1000,
            name: func_name.unwrap_or("kernel").to_string(),
        });

        trace!(task_id, worker_id = self.id, "task executed");
        if self
            .completion_tx
            .send(CompletionEvent {
                task_id,
                worker_id: self.id,
                start_cycle,
                end_cycle,
            })
            .is_err()
        {
            // receiver gone: runtime is shutting down
        }
    }
}
