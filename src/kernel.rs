// Kernel ABI and registry. A kernel is an opaque callback taking a
// packed argument-pointer array; the runtime never inspects argument
// contents and never plans, tiles, or schedules kernel-internal work —
// that stays a collaborator's concern (spec §1).

use rustc_hash::FxHashMap;

use crate::error::{Result, RuntimeError};

/// `fn(args: *mut *mut u8, n: i32)` — the exact ABI shape from spec §6.
pub type KernelFn = unsafe extern "C" fn(args: *mut *mut u8, n: i32);

#[derive(Clone, Copy)]
pub struct KernelEntry {
    pub func: KernelFn,
    /// Used only by the simulation-mode cost model
    /// (`estimate_cycles_by_name`, spec §4.6); has no effect in execute
    /// mode.
    pub name: &'static str,
}

#[derive(Default, Clone)]
pub struct KernelRegistry {
    kernels: FxHashMap<u32, KernelEntry>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kernel_id: u32, func: KernelFn, name: &'static str) {
        self.kernels.insert(kernel_id, KernelEntry { func, name });
    }

    pub fn get(&self, kernel_id: u32) -> Result<KernelEntry> {
        self.kernels
            .get(&kernel_id)
            .copied()
            .ok_or(RuntimeError::UnknownKernel(kernel_id))
    }
}
