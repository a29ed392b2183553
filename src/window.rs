// Task window: a fixed-size ring of task descriptor slots. `alloc`
// blocks (spins, then yields) while the window is full rather than
// failing — the documented deadlock precondition is that every in-flight
// task must eventually reach CONSUMED for the window to drain.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::task::{TaskDescriptor, TaskId, WorkerType};

pub struct TaskWindow {
    slots: Vec<RwLock<Option<TaskDescriptor>>>,
    mask: u32,
    /// Next task id to be allocated (monotonically increasing).
    current_task_index: AtomicU32,
    /// Oldest task id still alive (not yet CONSUMED and reclaimed).
    last_task_alive: AtomicU32,
}

impl TaskWindow {
    pub fn new(size: u32) -> Arc<Self> {
        debug_assert!(size.is_power_of_two() && size >= 2);
        let mut slots = Vec::with_capacity(size as usize);
        slots.resize_with(size as usize, || RwLock::new(None));
        Arc::new(Self {
            slots,
            mask: size - 1,
            current_task_index: AtomicU32::new(0),
            last_task_alive: AtomicU32::new(0),
        })
    }

    #[inline(always)]
    pub fn capacity(&self) -> u32 {
        self.mask + 1
    }

    #[inline(always)]
    fn slot(&self, task_id: TaskId) -> &RwLock<Option<TaskDescriptor>> {
        &self.slots[(task_id & self.mask) as usize]
    }

    pub fn active_count(&self) -> u32 {
        self.current_task_index
            .load(Ordering::Acquire)
            .wrapping_sub(self.last_task_alive.load(Ordering::Acquire))
    }

    /// Blocks until a slot is free, writes a fresh descriptor into it,
    /// and returns the new task id. Only the orchestrator thread calls
    /// this, so `current_task_index` advances without contention.
    pub fn alloc(&self, kernel_id: u32, worker_type: WorkerType, scope_depth: u32) -> TaskId {
        let mut spins = 0u32;
        loop {
            if self.active_count() < self.capacity() {
                break;
            }
            backoff(&mut spins);
        }
        let task_id = self.current_task_index.fetch_add(1, Ordering::AcqRel);
        let descriptor = TaskDescriptor::new(task_id, kernel_id, worker_type, scope_depth);
        *self.slot(task_id).write() = Some(descriptor);
        task_id
    }

    /// Read access to a live descriptor. Panics if the slot has already
    /// wrapped past this id — callers only ever hold ids they allocated
    /// or were told about through a published edge, so this indicates a
    /// retirement-ordering bug rather than a recoverable condition.
    pub fn get(&self, task_id: TaskId) -> parking_lot::RwLockReadGuard<'_, Option<TaskDescriptor>> {
        self.slot(task_id).read()
    }

    /// Write access, used only by the orchestrator to fill in the
    /// fields it doesn't know until after a task's slot is reserved
    /// (fanin edges, output offsets) — everything else reads through
    /// [`Self::get`].
    pub fn get_mut(&self, task_id: TaskId) -> parking_lot::RwLockWriteGuard<'_, Option<TaskDescriptor>> {
        self.slot(task_id).write()
    }

    /// Raises `last_task_alive` to `fully_consumed_up_to`. The caller
    /// ([`crate::scheduler::Scheduler::advance_ring_pointers`]) is
    /// responsible for having already verified every id in
    /// `[last_task_alive, fully_consumed_up_to)` is CONSUMED — this is a
    /// plain monotonic store, not a scan.
    pub fn advance_last_alive(&self, fully_consumed_up_to: TaskId) {
        self.last_task_alive
            .fetch_max(fully_consumed_up_to, Ordering::AcqRel);
    }

    pub fn last_task_alive(&self) -> TaskId {
        self.last_task_alive.load(Ordering::Acquire)
    }

    pub fn current_task_index(&self) -> TaskId {
        self.current_task_index.load(Ordering::Acquire)
    }
}

#[inline]
fn backoff(spins: &mut u32) {
    if *spins < 64 {
        std::hint::spin_loop();
    } else {
        std::thread::yield_now();
    }
    *spins = spins.saturating_add(1);
}
