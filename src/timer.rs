// Cycle-timing utilities shared by execute-mode stats collection and
// simulation-mode virtual clocks. Execute mode stamps real TSC cycles
// around kernel calls; simulation mode advances a per-worker virtual
// clock by `estimate_cycles_by_name` instead of running anything.

use crate::platform::unsafe_ops::{read_tsc, read_tsc_serialized};

/// Calibrates the TSC against a wall-clock sleep to derive an
/// approximate cycles-per-nanosecond ratio. Only used for human-readable
/// trace output; never on any hot path.
pub fn calibrate_tsc() -> f64 {
    let start_tsc = read_tsc_serialized();
    let start = std::time::Instant::now();
    std::thread::sleep(std::time::Duration::from_millis(10));
    let end_tsc = read_tsc_serialized();
    let elapsed_ns = start.elapsed().as_nanos().max(1) as f64;
    (end_tsc - start_tsc) as f64 / elapsed_ns
}

/// A single open-to-close cycle measurement.
pub struct ScopedCycleMeasurement {
    start: u64,
}

impl ScopedCycleMeasurement {
    pub fn start() -> Self {
        Self {
            start: read_tsc_serialized(),
        }
    }

    pub fn elapsed_cycles(&self) -> u64 {
        read_tsc().saturating_sub(self.start)
    }
}

/// Per-kernel-name cost model used in simulation mode (spec §4.6). These
/// constants are load-bearing test fixtures, not tuning knobs: the seed
/// scenarios in spec §8 assert exact simulated completion ordering
/// derived from them.
pub fn estimate_cycles_by_name(name: &str, bytes: usize) -> u64 {
    if name.contains("matmul") {
        100 + (bytes / 1024) as u64
    } else if name.contains("dma") || name.contains("copy") {
        80 + (bytes / 512) as u64
    } else {
        50 + (bytes / 2048) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matmul_cost_model() {
        assert_eq!(estimate_cycles_by_name("matmul_f32", 2048), 100 + 2);
    }

    #[test]
    fn dma_cost_model() {
        assert_eq!(estimate_cycles_by_name("dma_copy", 1024), 80 + 2);
    }

    #[test]
    fn default_cost_model() {
        assert_eq!(estimate_cycles_by_name("relu", 4096), 50 + 2);
    }
}
