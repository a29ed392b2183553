// Trace-event shape (spec §6): Chrome-tracing-compatible event records.
// Writing these to a file or visualization format is out of scope (spec
// §1) — this module only produces the in-memory, serializable shape.

use parking_lot::Mutex;
use serde::Serialize;

use crate::task::{TaskId, WorkerType};

#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub task_id: TaskId,
    pub worker_id: u32,
    pub worker_type: WorkerTypeLabel,
    /// Cycle counts are scaled by 1000 so downstream consumers can treat
    /// them as microseconds without a separate unit field (spec §6).
    pub start_cycle: u64,
    pub end_cycle: u64,
    pub name: String,
}

/// `WorkerType` without the `#[repr(u8)]` numeric tag, so the serialized
/// trace reads as `"CUBE"` rather than `0`.
#[derive(Debug, Clone, Copy, Serialize)]
pub enum WorkerTypeLabel {
    Cube,
    Vector,
    AiCpu,
    Accelerator,
}

impl From<WorkerType> for WorkerTypeLabel {
    fn from(wt: WorkerType) -> Self {
        match wt {
            WorkerType::Cube => WorkerTypeLabel::Cube,
            WorkerType::Vector => WorkerTypeLabel::Vector,
            WorkerType::AiCpu => WorkerTypeLabel::AiCpu,
            WorkerType::Accelerator => WorkerTypeLabel::Accelerator,
        }
    }
}

/// Bounded-growth accumulator of trace events, drained by the caller
/// between `run` calls.
#[derive(Default)]
pub struct TraceCollector {
    events: Mutex<Vec<TraceEvent>>,
    enabled: bool,
}

impl TraceCollector {
    pub fn new(enabled: bool) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            enabled,
        }
    }

    pub fn record(&self, event: TraceEvent) {
        if self.enabled {
            self.events.lock().push(event);
        }
    }

    pub fn drain(&self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.events.lock())
    }
}
