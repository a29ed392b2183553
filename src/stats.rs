// Aggregate runtime counters, read by tests and diagnostics. Every
// counter is a plain atomic bumped on the relevant transition; nothing
// here participates in scheduling decisions.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct RuntimeStats {
    pub tasks_submitted: AtomicU64,
    pub tasks_completed: AtomicU64,
    pub tasks_consumed: AtomicU64,
    pub ready_queue_overflows: AtomicU64,
    pub window_stalls: AtomicU64,
    pub heap_stalls: AtomicU64,
}

impl RuntimeStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn snapshot(&self) -> RuntimeStatsSnapshot {
        RuntimeStatsSnapshot {
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_consumed: self.tasks_consumed.load(Ordering::Relaxed),
            ready_queue_overflows: self.ready_queue_overflows.load(Ordering::Relaxed),
            window_stalls: self.window_stalls.load(Ordering::Relaxed),
            heap_stalls: self.heap_stalls.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStatsSnapshot {
    pub tasks_submitted: u64,
    pub tasks_completed: u64,
    pub tasks_consumed: u64,
    pub ready_queue_overflows: u64,
    pub window_stalls: u64,
    pub heap_stalls: u64,
}
