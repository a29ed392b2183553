// Submission pipeline: the single entry point through which the
// dataflow program hands new tasks to the runtime. Turns overlapping
// tensor regions into fanin/fanout edges, reserves output storage, and
// (depending on `init_task_on_submit`) makes the scheduler's first
// readiness determination.

use arrayvec::ArrayVec;
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::config::{RuntimeConfig, MAX_PARAMS_PER_TASK, MAX_SCOPE_DEPTH};
use crate::deppool::DepPool;
use crate::error::{Result, RuntimeError};
use crate::heap::HeapRing;
use crate::region::{LogicalTensor, RegionIndex};
use crate::scheduler::Scheduler;
use crate::stats::RuntimeStats;
use crate::task::{ParamKind, TaskId, WorkerType};
use crate::window::TaskWindow;

/// One tensor argument to a submitted task: a legacy flat region tagged
/// with how the kernel uses it.
#[derive(Debug, Clone)]
pub struct Param {
    pub kind: ParamKind,
    pub region: LogicalTensor,
}

impl Param {
    pub fn input(region: LogicalTensor) -> Self {
        Self {
            kind: ParamKind::In,
            region,
        }
    }

    pub fn output(region: LogicalTensor) -> Self {
        Self {
            kind: ParamKind::Out,
            region,
        }
    }

    pub fn inout(region: LogicalTensor) -> Self {
        Self {
            kind: ParamKind::InOut,
            region,
        }
    }
}

pub struct Orchestrator {
    config: RuntimeConfig,
    window: Arc<TaskWindow>,
    dep_pool: Arc<DepPool>,
    heap: Arc<HeapRing>,
    region_index: Arc<RegionIndex>,
    scheduler: Arc<Scheduler>,
    stats: Arc<RuntimeStats>,
    scope_stack: parking_lot::Mutex<ArrayVec<TaskId, MAX_SCOPE_DEPTH>>,
}

impl Orchestrator {
    pub fn new(
        config: RuntimeConfig,
        window: Arc<TaskWindow>,
        dep_pool: Arc<DepPool>,
        heap: Arc<HeapRing>,
        region_index: Arc<RegionIndex>,
        scheduler: Arc<Scheduler>,
        stats: Arc<RuntimeStats>,
    ) -> Self {
        Self {
            config,
            window,
            dep_pool,
            heap,
            region_index,
            scheduler,
            stats,
            scope_stack: parking_lot::Mutex::new(ArrayVec::new()),
        }
    }

    /// Opens a new nested scope. Every task submitted before the
    /// matching `scope_end` holds an implicit reference from this scope
    /// (spec §4.4), preventing it from retiring until the scope closes
    /// even if it has no data-dependent consumers.
    pub fn scope_begin(&self) -> Result<()> {
        let mut stack = self.scope_stack.lock();
        if stack.len() >= MAX_SCOPE_DEPTH {
            return Err(RuntimeError::ScopeStackOverflow { max: MAX_SCOPE_DEPTH });
        }
        // sentinel marker: the id of the next task to be submitted when
        // this scope opened, so scope_end knows the range it owns
        stack.push(self.window.current_task_index());
        Ok(())
    }

    /// Closes the innermost open scope, releasing its implicit
    /// reference on every task submitted within it.
    pub fn scope_end(&self) -> Result<()> {
        let mut stack = self.scope_stack.lock();
        let Some(range_start) = stack.pop() else {
            return Err(RuntimeError::ScopeStackUnderflow);
        };
        drop(stack);
        let range_end = self.window.current_task_index();
        for task_id in range_start..range_end {
            self.scheduler.release_reference(task_id);
        }
        Ok(())
    }

    fn current_scope_depth(&self) -> u32 {
        self.scope_stack.lock().len() as u32
    }

    /// The 7-step submission pipeline (spec §4.4):
    /// 1. validate the parameter count,
    /// 2. allocate a descriptor slot from the task window (stalls if full),
    /// 3. resolve each input's current producer into a fanin edge,
    /// 4. reserve output storage from the heap ring (stalls if full),
    /// 5. publish the new output regions into the region index,
    /// 6. make the scheduler's first readiness determination,
    /// 7. return the new task id.
    #[instrument(skip(self, params))]
    pub fn submit_task(
        &self,
        kernel_id: u32,
        worker_type: WorkerType,
        func_name: Option<&'static str>,
        params: &[Param],
    ) -> Result<TaskId> {
        if params.len() > MAX_PARAMS_PER_TASK {
            return Err(RuntimeError::TooManyParams {
                given: params.len(),
                max: MAX_PARAMS_PER_TASK,
            });
        }

        let task_id = self
            .window
            .alloc(kernel_id, worker_type, self.current_scope_depth());
        // must happen before any fanin/fanout edge touching this id is
        // published, so a reused slot never carries over stale counters
        self.scheduler.prepare_slot(task_id);
        self.stats.tasks_submitted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let mut fanin_head = 0u32;
        let mut fanin_count = 0u32;
        let mut producers_seen: ArrayVec<TaskId, MAX_PARAMS_PER_TASK> = ArrayVec::new();

        for param in params.iter().filter(|p| p.kind.is_input()) {
            if let Some(producer_id) = self.region_index.lookup(&param.region) {
                if producers_seen.contains(&producer_id) {
                    continue;
                }
                // reserve before add_consumer: the producer must never be
                // able to resolve this edge before the countdown accounts
                // for it (see Scheduler::reserve_fanin)
                self.scheduler.reserve_fanin(task_id);
                if self.scheduler.add_consumer(producer_id, task_id) {
                    fanin_head = self.dep_pool.push_front(fanin_head, producer_id)?;
                    fanin_count += 1;
                    let _ = producers_seen.try_push(producer_id);
                } else {
                    warn!(
                        task_id,
                        producer_id, "producer already consumed; treating input as satisfied"
                    );
                    self.scheduler.resolve_fanin(task_id)?;
                }
            }
        }

        {
            let mut guard = self.window.get_mut(task_id);
            let descriptor = guard.as_mut().expect("just allocated");
            descriptor.fanin_head = fanin_head;
            descriptor.fanin_count = fanin_count;
            descriptor.func_name = func_name;

            // packed_buffer_base/end bound the contiguous span this
            // task's outputs were carved from (spec §3); the scheduler
            // reads packed_buffer_end back off the last-consumed task to
            // advance the heap tail (advance_ring_pointers, spec §4.5).
            let mut packed_buffer_base: Option<usize> = None;
            let mut packed_buffer_end = 0usize;
            for param in params.iter().filter(|p| p.kind.is_output()) {
                let size = param.region.numel * param.region.elem_size;
                let offset = self.heap.alloc(size)?;
                packed_buffer_base.get_or_insert(offset);
                packed_buffer_end = packed_buffer_end.max(offset + size);
                descriptor.output_offsets.push(offset as u32);
                descriptor.num_outputs += 1;
            }
            descriptor.packed_buffer_base = packed_buffer_base.unwrap_or(0);
            descriptor.packed_buffer_end = packed_buffer_end;

            for param in params.iter().filter(|p| p.kind.is_input()) {
                descriptor.input_offsets.push(param.region.min_byte_offset as u32);
                descriptor.num_inputs += 1;
            }
        }

        for param in params.iter().filter(|p| p.kind.is_output()) {
            self.region_index.insert(param.region.clone(), task_id);
        }

        self.scheduler.mark_registered(task_id);
        if self.config.init_task_on_submit {
            self.scheduler.init_task(task_id)?;
        }

        Ok(task_id)
    }

    /// True once every submitted task has reached CONSUMED.
    pub fn orchestration_done(&self) -> bool {
        self.scheduler.is_drained()
    }
}
