//! Scheduler for fine-grained tensor-compute tasks across heterogeneous
//! worker pools (CUBE, VECTOR, AI_CPU, ACCELERATOR).
//!
//! One orchestrator submits tasks; the runtime infers producer/consumer
//! edges from overlapping tensor memory regions, buffers tasks in a
//! fixed-size ring, dispatches ready tasks to typed worker queues, and
//! reclaims task slots and output storage once every dependent has
//! consumed them. See `SPEC_FULL.md` in the repository root for the
//! full design.

#[macro_use]
pub mod macros;

pub mod config;
pub mod deppool;
pub mod error;
pub mod heap;
pub mod interval_tree;
pub mod kernel;
pub mod orchestrator;
pub mod platform;
pub mod region;
pub mod runtime;
pub mod scheduler;
pub mod stats;
pub mod task;
pub mod timer;
pub mod trace;
pub mod window;
pub mod worker;

pub mod prelude {
    pub use crate::config::{OrchestrationMode, RuntimeConfig, RuntimeConfigBuilder};
    pub use crate::error::{Result, RuntimeError};
    pub use crate::kernel::{KernelFn, KernelRegistry};
    pub use crate::orchestrator::Param;
    pub use crate::region::LogicalTensor;
    pub use crate::runtime::Runtime;
    pub use crate::task::{ParamKind, TaskId, WorkerType};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn runtime_creates_with_default_config() {
        let config = RuntimeConfig::builder().build().unwrap();
        let runtime = Runtime::create(config, KernelRegistry::new());
        assert!(runtime.is_ok());
    }
}
