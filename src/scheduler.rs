// Scheduler state machine: per-slot lifecycle state and reference
// counts, the PENDING -> READY -> RUNNING -> COMPLETED -> CONSUMED
// transitions, and the per-worker-type ready queues tasks are dispatched
// through once READY.

use crossbeam_queue::ArrayQueue;
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::deppool::DepPool;
use crate::error::{Result, RuntimeError};
use crate::heap::HeapRing;
use crate::region::RegionIndex;
use crate::task::{TaskId, TaskState, WorkerType};
use crate::window::TaskWindow;

/// Chooses which idle worker of a type receives the next ready task.
///
/// `AnyIdle` is the execute-mode default: whichever worker asks first
/// gets the task, expressed naturally by a shared MPMC queue. In
/// simulation mode, multiple workers can be "idle" at the same virtual
/// instant, so `MinVirtualClock` breaks the tie in favor of the worker
/// that has simulated the least work so far, keeping simulated load
/// balanced the way real work-stealing would (spec §9 design note).
pub trait WorkerSelectionPolicy: Send + Sync {
    /// Given the virtual clocks of every worker of a type (indexed by
    /// local worker index), returns which index should run next.
    fn pick(&self, virtual_clocks: &[u64]) -> usize;
}

pub struct AnyIdle;

impl WorkerSelectionPolicy for AnyIdle {
    fn pick(&self, _virtual_clocks: &[u64]) -> usize {
        0
    }
}

pub struct MinVirtualClock;

impl WorkerSelectionPolicy for MinVirtualClock {
    fn pick(&self, virtual_clocks: &[u64]) -> usize {
        virtual_clocks
            .iter()
            .enumerate()
            .min_by_key(|&(_, &clock)| clock)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

struct SlotState {
    state: AtomicU32,
    /// Countdown of outstanding fanin edges still to resolve before this
    /// task can go READY. Starts at 1 (see [`Scheduler::prepare_slot`]) —
    /// that extra unit is a bias representing "the orchestrator is still
    /// registering this task's dependencies", released by
    /// [`Scheduler::init_task`] once registration finishes. Without the
    /// bias, a producer that completes while the orchestrator is midway
    /// through registering a later edge could observe the countdown hit
    /// zero early and dispatch the task before all its real dependencies
    /// are recorded.
    fanin_pending: AtomicU32,
    fanout_refcount: AtomicU32,
}

impl Default for SlotState {
    fn default() -> Self {
        Self {
            state: AtomicU32::new(TaskState::Pending as u32),
            fanin_pending: AtomicU32::new(1),
            fanout_refcount: AtomicU32::new(0),
        }
    }
}

pub struct Scheduler {
    window: Arc<TaskWindow>,
    dep_pool: Arc<DepPool>,
    heap: Arc<HeapRing>,
    region_index: Arc<RegionIndex>,
    slots: Vec<CachePadded<SlotState>>,
    /// Virtual end-cycle published by the worker that ran each task, in
    /// simulation mode (spec §4.6's `task_end_cycles[slot]`). A
    /// dependent reads its fanin producers' entries here to compute its
    /// own `start = max(max_fanin(end_cycle), worker_current_cycle)`.
    task_end_cycles: Vec<CachePadded<AtomicU64>>,
    mask: u32,
    ready_queues: [ArrayQueue<TaskId>; 4],
    pub virtual_clocks: [Vec<CachePadded<AtomicU64>>; 4],
    policy: Box<dyn WorkerSelectionPolicy>,
    /// Advanced by the orchestrator, in submission order, once a task's
    /// descriptor and dependency edges are fully registered. Read by
    /// [`Self::poll_new_tasks`] in decoupled mode (`init_task_on_submit
    /// = false`) so a background thread can call `init_task` instead of
    /// the orchestrator doing it inline.
    registered_up_to: CachePadded<AtomicU32>,
    /// Cursor owned solely by whichever single thread calls
    /// `poll_new_tasks` — never written from anywhere else.
    poll_cursor: CachePadded<AtomicU32>,
    /// Serializes the contiguous-prefix scan in
    /// [`Self::advance_ring_pointers`]; completions land from multiple
    /// worker threads and the scan itself must not run concurrently with
    /// another instance of itself.
    advance_lock: Mutex<()>,
    /// Set once the orchestration closure has finished submitting tasks
    /// (spec §5's `orchestrator_done`). `is_drained` requires this flag
    /// in addition to the window catching up, so a query racing with
    /// submission can never observe a false "done" just because
    /// `last_task_alive` happens to equal `current_task_index` between
    /// two submissions.
    orchestrator_done: AtomicBool,
}

impl Scheduler {
    pub fn new(
        window: Arc<TaskWindow>,
        dep_pool: Arc<DepPool>,
        heap: Arc<HeapRing>,
        region_index: Arc<RegionIndex>,
        worker_counts: [u32; 4],
        policy: Box<dyn WorkerSelectionPolicy>,
    ) -> Self {
        let capacity = window.capacity();
        let mut slots = Vec::with_capacity(capacity as usize);
        slots.resize_with(capacity as usize, || CachePadded::new(SlotState::default()));
        let mut task_end_cycles = Vec::with_capacity(capacity as usize);
        task_end_cycles.resize_with(capacity as usize, || CachePadded::new(AtomicU64::new(0)));
        let ready_queues = [
            ArrayQueue::new(capacity as usize),
            ArrayQueue::new(capacity as usize),
            ArrayQueue::new(capacity as usize),
            ArrayQueue::new(capacity as usize),
        ];
        let virtual_clocks = worker_counts.map(|n| {
            let mut v = Vec::with_capacity(n as usize);
            v.resize_with(n as usize, || CachePadded::new(AtomicU64::new(0)));
            v
        });
        Self {
            window,
            dep_pool,
            heap,
            region_index,
            slots,
            task_end_cycles,
            mask: capacity - 1,
            ready_queues,
            virtual_clocks,
            policy,
            registered_up_to: CachePadded::new(AtomicU32::new(0)),
            poll_cursor: CachePadded::new(AtomicU32::new(0)),
            advance_lock: Mutex::new(()),
            orchestrator_done: AtomicBool::new(false),
        }
    }

    #[inline(always)]
    fn slot(&self, task_id: TaskId) -> &SlotState {
        &self.slots[(task_id & self.mask) as usize]
    }

    pub fn state_of(&self, task_id: TaskId) -> TaskState {
        TaskState::from_u32(self.slot(task_id).state.load(Ordering::Acquire))
    }

    /// Resets a freshly allocated slot's state machine bookkeeping.
    /// Must be called by the orchestrator immediately after
    /// [`crate::window::TaskWindow::alloc`], before any fanin/fanout
    /// edge is published for the new task id — otherwise a reused slot
    /// (the window wrapped around) would carry over its previous
    /// occupant's refcounts. Safe to call unconditionally: `alloc`
    /// never returns a slot whose previous occupant hasn't already
    /// reached CONSUMED.
    pub fn prepare_slot(&self, task_id: TaskId) {
        let slot = self.slot(task_id);
        slot.state.store(TaskState::Pending as u32, Ordering::Release);
        slot.fanin_pending.store(1, Ordering::Release);
        slot.fanout_refcount.store(0, Ordering::Release);
        self.task_end_cycles[(task_id & self.mask) as usize].store(0, Ordering::Release);
    }

    /// Reads the simulation-mode end cycle a producer published after it
    /// ran (0 if it hasn't run yet, matching an unconstrained start).
    fn task_end_cycle(&self, task_id: TaskId) -> u64 {
        self.task_end_cycles[(task_id & self.mask) as usize].load(Ordering::Acquire)
    }

    /// Publishes the simulation-mode end cycle a worker computed for
    /// `task_id`, readable by any dependent through its fanin list.
    pub fn publish_end_cycle(&self, task_id: TaskId, end_cycle: u64) {
        self.task_end_cycles[(task_id & self.mask) as usize].store(end_cycle, Ordering::Release);
    }

    /// The `max_{p in fanin}(end_cycle[p])` term of spec §4.6's
    /// simulation-mode start formula.
    pub fn fanin_max_end_cycle(&self, task_id: TaskId) -> u64 {
        let guard = self.window.get(task_id);
        let Some(descriptor) = guard.as_ref() else {
            return 0;
        };
        let fanin_head = descriptor.fanin_head;
        drop(guard);
        self.dep_pool
            .iter(fanin_head)
            .map(|p| self.task_end_cycle(p))
            .max()
            .unwrap_or(0)
    }

    /// Reserves one more slot in the fanin countdown for a dependency the
    /// orchestrator is about to register. Must be called *before* the
    /// corresponding [`Self::add_consumer`], so the producer can never
    /// complete and resolve the edge before the countdown accounts for
    /// it. If `add_consumer` turns out to fail (producer already
    /// CONSUMED), the caller releases this reservation itself by calling
    /// [`Self::resolve_fanin`] instead of waiting for a completion that
    /// will never come.
    pub fn reserve_fanin(&self, task_id: TaskId) {
        self.slot(task_id).fanin_pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Releases the registration bias set by [`Self::prepare_slot`],
    /// making the scheduler's first READY/PENDING determination for a
    /// task whose dependency edges have all been registered. Called once
    /// per task, either synchronously from `submit`
    /// (`init_task_on_submit = true`) or by [`Self::poll_new_tasks`]
    /// discovering a freshly registered task.
    pub fn init_task(&self, task_id: TaskId) -> Result<()> {
        trace!(task_id, "task initialized");
        self.resolve_fanin(task_id)
    }

    /// Marks `task_id` as fully registered (descriptor fields and every
    /// dependency edge written) in submission order. Only the
    /// orchestrator thread calls this, so it's a plain monotonic store.
    pub fn mark_registered(&self, task_id: TaskId) {
        self.registered_up_to.store(task_id + 1, Ordering::Release);
    }

    /// Decoupled-mode (`init_task_on_submit = false`) driver: calls
    /// `init_task` for every task registered since the last call. Must
    /// only ever be called from a single thread.
    pub fn poll_new_tasks(&self) -> Result<()> {
        let end = self.registered_up_to.load(Ordering::Acquire);
        let mut cursor = self.poll_cursor.load(Ordering::Relaxed);
        while cursor < end {
            self.init_task(cursor)?;
            cursor += 1;
        }
        self.poll_cursor.store(cursor, Ordering::Relaxed);
        Ok(())
    }

    fn transition_to_ready(&self, task_id: TaskId) -> Result<()> {
        let slot = self.slot(task_id);
        slot.state
            .compare_exchange(
                TaskState::Pending as u32,
                TaskState::Ready as u32,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .expect("PENDING -> READY transition must be uncontended (single producer thread)");
        let worker_type = self.window.get(task_id).as_ref().unwrap().worker_type;
        self.enqueue_ready(task_id, worker_type)
    }

    fn enqueue_ready(&self, task_id: TaskId, worker_type: WorkerType) -> Result<()> {
        self.ready_queues[worker_type.index()]
            .push(task_id)
            .map_err(|_| {
                warn!(task_id, ?worker_type, "ready queue overflow, task dropped");
                RuntimeError::ReadyQueueOverflow(worker_type, task_id)
            })
    }

    /// Called by a producer whenever one of its dependents is fully
    /// resolved — either because the owning scope closed
    /// ([`crate::orchestrator::Orchestrator::scope_end`]) or because a
    /// consumer finished running (RUNNING -> COMPLETED step 2). Once
    /// `fanout_refcount` reaches `fanout_count` the task is CONSUMED.
    pub fn release_reference(&self, task_id: TaskId) {
        self.slot(task_id).fanout_refcount.fetch_add(1, Ordering::AcqRel);
        self.maybe_consume(task_id);
    }

    /// Transitions `task_id` from COMPLETED to CONSUMED if its
    /// `fanout_refcount` has caught up to `fanout_count` — the shared
    /// tail of both `release_reference` and a same-thread completion
    /// with zero fanout references to begin with.
    ///
    /// Holds the descriptor's `fanout` lock across the count read and
    /// the state CAS so this can never race with
    /// [`crate::orchestrator::Orchestrator::add_consumer`] appending a
    /// late consumer: either the append is fully visible before this
    /// check runs, or this check (and the CONSUMED transition it may
    /// perform) completes before the append sees the lock, in which
    /// case the append observes CONSUMED and backs off instead.
    fn maybe_consume(&self, task_id: TaskId) {
        let slot = self.slot(task_id);
        let guard = self.window.get(task_id);
        let Some(descriptor) = guard.as_ref() else {
            return;
        };
        let fanout = descriptor.fanout.lock();
        let refcount = slot.fanout_refcount.load(Ordering::Acquire);
        let consumed = refcount >= fanout.count
            && slot
                .state
                .compare_exchange(
                    TaskState::Completed as u32,
                    TaskState::Consumed as u32,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok();
        drop(fanout);
        drop(guard);
        if consumed {
            trace!(task_id, "task consumed");
            self.region_index.sync_validity(task_id);
            self.advance_ring_pointers();
        }
    }

    /// Scans forward from `last_task_alive` while each slot is CONSUMED,
    /// in order, stopping at the first one that isn't — tasks do not
    /// necessarily complete in id order (spec §8 "independent
    /// parallelism"), so `last_task_alive` may only ever advance through
    /// a *contiguous* CONSUMED prefix, never past a task still
    /// PENDING/READY/RUNNING. Also advances the heap tail to the
    /// `packed_buffer_end` of the last task in that prefix, per spec
    /// §4.5's `advance_ring_pointers`.
    fn advance_ring_pointers(&self) {
        let _guard = self.advance_lock.lock();
        let mut cursor = self.window.last_task_alive();
        let end = self.window.current_task_index();
        let mut last_packed_end = None;
        while cursor < end
            && self.slot(cursor).state.load(Ordering::Acquire) == TaskState::Consumed as u32
        {
            if let Some(descriptor) = self.window.get(cursor).as_ref() {
                last_packed_end = Some(descriptor.packed_buffer_end);
            }
            cursor += 1;
        }
        if let Some(packed_end) = last_packed_end {
            self.window.advance_last_alive(cursor);
            self.heap.advance_tail(packed_end);
        }
    }

    /// Dispatches a ready task off the shared queue for `worker_type`.
    /// Execute mode: whichever worker calls this next gets it
    /// (`AnyIdle`). Non-blocking; returns `None` if nothing is ready.
    pub fn dispatch(&self, worker_type: WorkerType) -> Option<TaskId> {
        self.ready_queues[worker_type.index()].pop()
    }

    /// Selects which idle worker (by local index within `worker_type`)
    /// should run next, per the configured [`WorkerSelectionPolicy`].
    /// Used by the simulation-mode worker driver to break ties among
    /// multiple idle workers at the same virtual instant.
    pub fn pick_worker(&self, worker_type: WorkerType) -> usize {
        let clocks: Vec<u64> = self.virtual_clocks[worker_type.index()]
            .iter()
            .map(|c| c.load(Ordering::Acquire))
            .collect();
        self.policy.pick(&clocks)
    }

    /// RUNNING -> COMPLETED: called by a worker once a kernel finishes.
    /// Two walks happen here (spec §4.5's completion algorithm):
    /// 1. over this task's fanin list, releasing a reference on each
    ///    upstream producer (this task is done reading from them);
    /// 2. over this task's fanout list, resolving one fanin dependency
    ///    on each downstream consumer — this is what makes a PENDING
    ///    task with `fanin_count > 0` ever become READY.
    pub fn complete(&self, task_id: TaskId) {
        let slot = self.slot(task_id);
        slot.state
            .compare_exchange(
                TaskState::Running as u32,
                TaskState::Completed as u32,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .expect("RUNNING -> COMPLETED transition must be uncontended (owning worker only)");

        let guard = self.window.get(task_id);
        if let Some(descriptor) = guard.as_ref() {
            let fanin_head = descriptor.fanin_head;
            let consumers: Vec<TaskId> = descriptor
                .fanout
                .lock()
                .nodes
                .iter()
                .map(|n| n.consumer_id)
                .collect();
            drop(guard);
            for producer_id in self.dep_pool.iter(fanin_head) {
                self.release_reference(producer_id);
            }
            for consumer_id in consumers {
                if let Err(e) = self.resolve_fanin(consumer_id) {
                    warn!(task_id, consumer_id, error = %e, "failed to resolve fanin on consumer");
                }
            }
        }
        // a task with no fanout references at all is immediately
        // consumable once it completes
        self.maybe_consume(task_id);
        debug!(task_id, "task completed");
    }

    /// PENDING -> RUNNING is implicit: a worker popping a task off the
    /// ready queue immediately marks it RUNNING before executing it.
    pub fn begin_running(&self, task_id: TaskId) {
        let slot = self.slot(task_id);
        slot.state
            .compare_exchange(
                TaskState::Ready as u32,
                TaskState::Running as u32,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .expect("READY -> RUNNING transition must be uncontended (owning worker only)");
    }

    /// Appends `consumer_id` to `producer_id`'s fanout list and grows
    /// its `fanout_count`, unless `producer_id` has already reached
    /// CONSUMED (spec §4.4's late-completion direct-increment rule):
    /// a CONSUMED task's reference count is closed for good, so a new
    /// edge onto it could never be released. Returns `false` in that
    /// case — the caller treats this input as already satisfied rather
    /// than recording a fanin edge that would wait forever.
    ///
    /// Locks the producer's `fanout` mutex for the whole check, so this
    /// can never race the CONSUMED transition in [`Self::maybe_consume`]
    /// (see that method's doc comment).
    pub fn add_consumer(&self, producer_id: TaskId, consumer_id: TaskId) -> bool {
        let guard = self.window.get(producer_id);
        let Some(descriptor) = guard.as_ref() else {
            return false;
        };
        let mut fanout = descriptor.fanout.lock();
        if self.state_of(producer_id) == TaskState::Consumed {
            return false;
        }
        fanout.prepend(consumer_id);
        true
    }

    /// Decrements a dependent task's outstanding fanin countdown; when it
    /// reaches zero every real dependency has resolved *and* the
    /// registration bias has been released, so the task becomes READY.
    pub fn resolve_fanin(&self, task_id: TaskId) -> Result<()> {
        let slot = self.slot(task_id);
        let remaining = slot.fanin_pending.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 {
            self.transition_to_ready(task_id)?;
        }
        Ok(())
    }

    /// Marks that no further tasks will be submitted (spec §5's
    /// `orchestrator_done`). Called by [`crate::runtime::Runtime::run`]
    /// once the orchestration closure returns.
    pub fn mark_orchestrator_done(&self) {
        self.orchestrator_done.store(true, Ordering::Release);
    }

    /// `orchestrator_done ∧ last_task_alive ≥ current_task_index` — the
    /// termination predicate (spec §5).
    pub fn is_drained(&self) -> bool {
        self.orchestrator_done.load(Ordering::Acquire)
            && self.window.last_task_alive() >= self.window.current_task_index()
    }

    pub fn heap(&self) -> &HeapRing {
        &self.heap
    }

    pub fn region_index(&self) -> &RegionIndex {
        &self.region_index
    }
}
