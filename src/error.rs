// Error taxonomy for the runtime: programmer preconditions and fatal
// resource exhaustion. Stalls (window full, heap full) are not errors —
// they are blocking calls and never surface here.

use thiserror::Error;

/// Errors reported synchronously at an API call.
///
/// No error ever crosses the scheduler/worker boundary: the scheduler and
/// workers never return failure to their caller. Everything below is
/// either a programmer precondition violated before any effect took
/// place, or a fatal resource-exhaustion condition detected while
/// applying one.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("task window size {0} must be a power of two and >= 2")]
    InvalidWindowSize(u32),

    #[error("worker count {0} exceeds the maximum of 64 per worker type")]
    TooManyWorkers(u32),

    #[error("heap size must be non-zero")]
    InvalidHeapSize,

    #[error("dependency list pool size must be non-zero")]
    InvalidDepPoolSize,

    #[error("scope stack overflow: at most {max} nested scopes are supported")]
    ScopeStackOverflow { max: usize },

    #[error("scope_end called with no matching scope_begin")]
    ScopeStackUnderflow,

    #[error("task has {given} parameters, which exceeds the per-task limit of {max}")]
    TooManyParams { given: usize, max: usize },

    #[error("dependency-list pool exhausted (capacity {capacity}); size dep_list_pool_size for the submitted edge count")]
    DepPoolExhausted { capacity: usize },

    #[error("ready queue for worker type {0:?} overflowed; task {1} dropped")]
    ReadyQueueOverflow(crate::task::WorkerType, u32),

    #[error("no kernel registered for kernel_id {0}")]
    UnknownKernel(u32),

    #[error("requested output size {requested} exceeds heap capacity {capacity}")]
    OutputTooLarge { requested: usize, capacity: usize },
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
