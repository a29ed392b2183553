// Task identifiers, the task descriptor, and the fanout adjacency it
// owns. Fanin lists live in the shared dependency-list pool (deppool.rs)
// since they are materialized once, at submit, and never mutated again;
// fanout lists grow after submission (new consumers arrive later) so
// each descriptor keeps its own small mutable list behind a lock.

use arrayvec::ArrayVec;
use parking_lot::Mutex;

use crate::config::MAX_PARAMS_PER_TASK;

pub type TaskId = u32;

/// The category of compute resource a task targets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerType {
    Cube = 0,
    Vector = 1,
    AiCpu = 2,
    Accelerator = 3,
}

impl WorkerType {
    pub const ALL: [WorkerType; 4] = [
        WorkerType::Cube,
        WorkerType::Vector,
        WorkerType::AiCpu,
        WorkerType::Accelerator,
    ];

    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Lifecycle state of a task. Transitions form the state machine in
/// spec §3/§4.5: PENDING -> READY -> RUNNING -> COMPLETED -> CONSUMED.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending = 0,
    Ready = 1,
    Running = 2,
    Completed = 3,
    Consumed = 4,
}

impl TaskState {
    #[inline(always)]
    pub fn from_u32(v: u32) -> Self {
        match v {
            0 => TaskState::Pending,
            1 => TaskState::Ready,
            2 => TaskState::Running,
            3 => TaskState::Completed,
            4 => TaskState::Consumed,
            _ => unreachable!("invalid task state encoding {v}"),
        }
    }
}

/// Whether a submitted parameter is read, written, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    In,
    Out,
    InOut,
}

impl ParamKind {
    #[inline(always)]
    pub fn is_input(self) -> bool {
        matches!(self, ParamKind::In | ParamKind::InOut)
    }

    #[inline(always)]
    pub fn is_output(self) -> bool {
        matches!(self, ParamKind::Out | ParamKind::InOut)
    }
}

/// A single fanout adjacency node: one consumer of this task, prepended
/// newest-first, living in the owning descriptor's small bump list.
#[derive(Debug, Clone, Copy)]
pub struct FanoutNode {
    pub consumer_id: TaskId,
    pub next: Option<u32>,
}

/// Mutable fanout state, guarded by [`TaskDescriptor::fanout_lock`].
///
/// `count` starts at the task's `scope_depth` (one reference held by
/// each enclosing scope) and only grows as consumers are appended by
/// [`crate::orchestrator::Orchestrator::add_consumer`]. The reference
/// is only ever released through `release_reference`
/// (see [`crate::scheduler::Scheduler::release_reference`]), which is
/// what both `scope_end` and an upstream producer's completion call.
#[derive(Debug, Default)]
pub struct FanoutState {
    pub nodes: Vec<FanoutNode>,
    pub count: u32,
}

impl FanoutState {
    #[inline]
    pub fn prepend(&mut self, consumer_id: TaskId) {
        let next = self.nodes.len().checked_sub(1).map(|i| i as u32);
        self.nodes.push(FanoutNode { consumer_id, next });
        self.count += 1;
    }
}

/// Task descriptor: plain data set once by the orchestrator at submit
/// time, except for the fanout list which grows after submission as
/// new consumers reference this task's outputs.
#[derive(Debug)]
pub struct TaskDescriptor {
    pub task_id: TaskId,
    pub kernel_id: u32,
    pub worker_type: WorkerType,
    pub scope_depth: u32,
    pub func_name: Option<&'static str>,

    /// Offset of this task's fanin list head in the shared dependency
    /// pool; 0 is the empty sentinel. Set once at submit, read-only
    /// thereafter.
    pub fanin_head: u32,
    /// Number of producers this task depends on. Set exactly once at
    /// submission (spec invariant).
    pub fanin_count: u32,

    pub fanout: Mutex<FanoutState>,

    pub packed_buffer_base: usize,
    pub packed_buffer_end: usize,
    pub output_offsets: ArrayVec<u32, MAX_PARAMS_PER_TASK>,
    /// Byte offsets of this task's input regions, set once at submission.
    /// `build_args` (worker.rs) appends pointers at these offsets after
    /// the output pointers, per the kernel ABI (spec §6).
    pub input_offsets: ArrayVec<u32, MAX_PARAMS_PER_TASK>,
    pub num_outputs: u32,
    pub num_inputs: u32,

    pub is_active: bool,
}

impl TaskDescriptor {
    pub fn new(task_id: TaskId, kernel_id: u32, worker_type: WorkerType, scope_depth: u32) -> Self {
        Self {
            task_id,
            kernel_id,
            worker_type,
            scope_depth,
            func_name: None,
            fanin_head: 0,
            fanin_count: 0,
            fanout: Mutex::new(FanoutState {
                nodes: Vec::new(),
                count: scope_depth,
            }),
            packed_buffer_base: 0,
            packed_buffer_end: 0,
            output_offsets: ArrayVec::new(),
            input_offsets: ArrayVec::new(),
            num_outputs: 0,
            num_inputs: 0,
            is_active: true,
        }
    }
}
