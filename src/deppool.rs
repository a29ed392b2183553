// Bump-allocated arena for fanin adjacency records. Offset 0 is the
// null sentinel, so the first real record lives at offset 1 — this
// matches the "0 = empty list" convention used throughout the
// scheduler. Writers are single-threaded (the orchestrator is the only
// thread that ever calls `push_front`, per the one-orchestrator
// threading model); readers (the scheduler, retirement) only walk a
// list after its head has been published into a task descriptor, so
// they never observe a node before its fields are written.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Result, RuntimeError};
use crate::task::TaskId;

#[derive(Debug, Clone, Copy, Default)]
pub struct DepNode {
    pub producer_id: TaskId,
    pub next: u32,
}

/// Bump-allocated, append-only pool of [`DepNode`] records.
///
/// Sized up front from `dep_list_pool_size` (spec §6); exhaustion is a
/// fatal, synchronously reported error rather than a stall — unlike the
/// task window or heap ring, a full dependency pool means the
/// orchestrator genuinely cannot record an edge it was asked to record.
pub struct DepPool {
    slots: Box<[UnsafeCell<DepNode>]>,
    next_free: AtomicU32,
}

unsafe impl Sync for DepPool {}

impl DepPool {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || UnsafeCell::new(DepNode::default()));
        Self {
            slots: slots.into_boxed_slice(),
            // offset 0 reserved as the null sentinel
            next_free: AtomicU32::new(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Records a new fanin edge `prev_head -> (producer_id, prev_head)`
    /// and returns the new list head offset. Single-writer only.
    pub fn push_front(&self, prev_head: u32, producer_id: TaskId) -> Result<u32> {
        let offset = self.next_free.fetch_add(1, Ordering::Relaxed);
        if offset as usize >= self.slots.len() {
            return Err(RuntimeError::DepPoolExhausted {
                capacity: self.slots.len(),
            });
        }
        // SAFETY: `offset` was just handed out uniquely by the fetch_add
        // above and is only ever written by the single orchestrator
        // thread, so no other writer can alias this slot.
        unsafe {
            *self.slots[offset as usize].get() = DepNode {
                producer_id,
                next: prev_head,
            };
        }
        Ok(offset)
    }

    /// Iterates the list starting at `head` (0 = empty). Only safe to
    /// call once `head` has been published (release-stored) by the
    /// writer, establishing happens-before with the node writes above.
    pub fn iter(&self, mut head: u32) -> impl Iterator<Item = TaskId> + '_ {
        std::iter::from_fn(move || {
            if head == 0 {
                return None;
            }
            // SAFETY: nodes are never mutated after being linked in;
            // the caller's own synchronization (reading `head` from a
            // published descriptor field) provides the happens-before.
            let node = unsafe { *self.slots[head as usize].get() };
            head = node.next;
            Some(node.producer_id)
        })
    }
}
