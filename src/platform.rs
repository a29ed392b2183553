// Isolated platform-specific unsafe operations: CPU timestamp counter
// reads and worker thread CPU pinning. Every unsafe block below carries
// its own SAFETY justification; nothing outside this module touches
// raw pointers or inline assembly.

pub mod unsafe_ops {
    /// Reads the CPU timestamp counter (x86_64 `RDTSC`). On other
    /// architectures falls back to a monotonic clock in nanoseconds —
    /// still strictly increasing, just not cycle-accurate.
    #[inline(always)]
    pub fn read_tsc() -> u64 {
        #[cfg(target_arch = "x86_64")]
        {
            // SAFETY: RDTSC is available on every x86_64 CPU since the
            // Pentium; it has no memory-safety preconditions.
            unsafe { std::arch::x86_64::_rdtsc() }
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            use std::time::{SystemTime, UNIX_EPOCH};
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0)
        }
    }

    /// Serializing variant (`RDTSCP`): prevents out-of-order execution
    /// from reordering the read past surrounding instructions. Used to
    /// bound a measurement window rather than free-running sampling.
    #[inline(always)]
    pub fn read_tsc_serialized() -> u64 {
        #[cfg(target_arch = "x86_64")]
        {
            let mut aux: u32 = 0;
            // SAFETY: RDTSCP is available on all x86_64 CPUs used in
            // practice since ~2008; `aux` is a valid out-parameter.
            unsafe { std::arch::x86_64::__rdtscp(&mut aux) }
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            read_tsc()
        }
    }

    /// Pins the calling thread to `cpu_id`. Best-effort: failures are
    /// logged by the caller and otherwise ignored, since scheduling
    /// correctness never depends on pinning succeeding.
    #[cfg(target_os = "linux")]
    pub fn pin_to_cpu(cpu_id: usize) -> std::io::Result<()> {
        unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut set);
            libc::CPU_SET(cpu_id, &mut set);
            // SAFETY: `set` is a validly initialized cpu_set_t and the
            // current thread handle is always valid for the duration
            // of this call.
            let rc = libc::pthread_setaffinity_np(
                libc::pthread_self(),
                std::mem::size_of::<libc::cpu_set_t>(),
                &set,
            );
            if rc != 0 {
                return Err(std::io::Error::from_raw_os_error(rc));
            }
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    pub fn pin_to_cpu(_cpu_id: usize) -> std::io::Result<()> {
        Ok(())
    }
}
