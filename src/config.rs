// Runtime configuration knobs, validated up-front so `create` either
// succeeds with a fully-formed runtime or fails with no partial effects.

use crate::error::{Result, RuntimeError};

/// Maximum worker threads per worker type (spec §6).
pub const MAX_WORKERS_PER_TYPE: u32 = 64;

/// Maximum nesting depth of `scope_begin`/`scope_end` (spec §4.4).
pub const MAX_SCOPE_DEPTH: usize = 64;

/// Maximum parameters on a single task submission.
pub const MAX_PARAMS_PER_TASK: usize = 32;

/// `cleanup_retired` is invoked every this many retired tasks (spec §4.3).
pub const TENSORMAP_CLEANUP_INTERVAL: u64 = 64;

/// Whether `Runtime::run`'s orchestration closure executes on the
/// caller's own thread ("inline") or a dedicated orchestrator thread
/// ("threaded") that `run` spawns and joins before returning (spec §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestrationMode {
    Inline,
    Threaded,
}

/// Configuration for a [`crate::runtime::Runtime`] instance.
///
/// Mirrors the configuration knobs enumerated in spec §6. Constructed
/// with [`RuntimeConfig::builder`] and validated once, at `create` time.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub num_cube_workers: u32,
    pub num_vector_workers: u32,
    pub num_ai_cpu_workers: u32,
    pub num_accelerator_workers: u32,
    pub simulation_mode: bool,
    pub task_window_size: u32,
    pub heap_size: usize,
    pub dep_list_pool_size: usize,
    /// When true (default), the orchestrator calls the scheduler's
    /// `init_task` synchronously during `submit`. When false, a
    /// dedicated background thread discovers newly registered tasks and
    /// calls `init_task` for them instead (spec §9, decoupled-mode
    /// semantics).
    pub init_task_on_submit: bool,
    /// Bucket length above which a region-index bucket is promoted to
    /// the AVL interval-tree representation (spec §4.3, "Optional
    /// acceleration").
    pub interval_tree_threshold: usize,
    /// Inline or threaded orchestration (spec §5).
    pub orchestration_mode: OrchestrationMode,
}

impl RuntimeConfig {
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    pub(crate) fn task_window_mask(&self) -> u32 {
        self.task_window_size - 1
    }

    fn validate(&self) -> Result<()> {
        if self.task_window_size < 2 || !self.task_window_size.is_power_of_two() {
            return Err(RuntimeError::InvalidWindowSize(self.task_window_size));
        }
        for count in [
            self.num_cube_workers,
            self.num_vector_workers,
            self.num_ai_cpu_workers,
            self.num_accelerator_workers,
        ] {
            if count > MAX_WORKERS_PER_TYPE {
                return Err(RuntimeError::TooManyWorkers(count));
            }
        }
        if self.heap_size == 0 {
            return Err(RuntimeError::InvalidHeapSize);
        }
        if self.dep_list_pool_size == 0 {
            return Err(RuntimeError::InvalidDepPoolSize);
        }
        Ok(())
    }
}

/// Builder for [`RuntimeConfig`]; mirrors the teacher crate's
/// `DescriptorBuilder` ergonomics.
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl Default for RuntimeConfigBuilder {
    fn default() -> Self {
        Self {
            config: RuntimeConfig {
                num_cube_workers: 4,
                num_vector_workers: 4,
                num_ai_cpu_workers: 0,
                num_accelerator_workers: 0,
                simulation_mode: false,
                task_window_size: 1024,
                heap_size: 64 * 1024 * 1024,
                dep_list_pool_size: 1 << 20,
                init_task_on_submit: true,
                interval_tree_threshold: 32,
                orchestration_mode: OrchestrationMode::Inline,
            },
        }
    }
}

impl RuntimeConfigBuilder {
    pub fn cube_workers(mut self, n: u32) -> Self {
        self.config.num_cube_workers = n;
        self
    }

    pub fn vector_workers(mut self, n: u32) -> Self {
        self.config.num_vector_workers = n;
        self
    }

    pub fn ai_cpu_workers(mut self, n: u32) -> Self {
        self.config.num_ai_cpu_workers = n;
        self
    }

    pub fn accelerator_workers(mut self, n: u32) -> Self {
        self.config.num_accelerator_workers = n;
        self
    }

    pub fn simulation_mode(mut self, enabled: bool) -> Self {
        self.config.simulation_mode = enabled;
        self
    }

    pub fn task_window_size(mut self, size: u32) -> Self {
        self.config.task_window_size = size;
        self
    }

    pub fn heap_size(mut self, bytes: usize) -> Self {
        self.config.heap_size = bytes;
        self
    }

    pub fn dep_list_pool_size(mut self, entries: usize) -> Self {
        self.config.dep_list_pool_size = entries;
        self
    }

    pub fn init_task_on_submit(mut self, enabled: bool) -> Self {
        self.config.init_task_on_submit = enabled;
        self
    }

    pub fn interval_tree_threshold(mut self, threshold: usize) -> Self {
        self.config.interval_tree_threshold = threshold;
        self
    }

    pub fn orchestration_mode(mut self, mode: OrchestrationMode) -> Self {
        self.config.orchestration_mode = mode;
        self
    }

    pub fn build(self) -> Result<RuntimeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RuntimeConfig::builder().build().is_ok());
    }

    #[test]
    fn rejects_non_power_of_two_window() {
        let err = RuntimeConfig::builder()
            .task_window_size(100)
            .build()
            .unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidWindowSize(100)));
    }

    #[test]
    fn rejects_window_smaller_than_two() {
        assert!(RuntimeConfig::builder()
            .task_window_size(1)
            .build()
            .is_err());
        assert!(RuntimeConfig::builder()
            .task_window_size(2)
            .build()
            .is_ok());
    }

    #[test]
    fn rejects_too_many_workers() {
        let err = RuntimeConfig::builder()
            .cube_workers(65)
            .build()
            .unwrap_err();
        assert!(matches!(err, RuntimeError::TooManyWorkers(65)));
    }

    #[test]
    fn mask_derives_from_size() {
        let cfg = RuntimeConfig::builder().task_window_size(64).build().unwrap();
        assert_eq!(cfg.task_window_mask(), 63);
    }
}
