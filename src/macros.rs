// A couple of small macros, in the spirit of the convenience macros the
// teacher crate built around its hot path — scaled down to what this
// domain actually needs instead of carrying the pattern-dispatch and
// tick-budget machinery that doesn't apply here.

/// Measures the wall-clock cycle cost of an expression via
/// [`crate::timer::ScopedCycleMeasurement`], returning `(value, cycles)`.
#[macro_export]
macro_rules! measure_cycles {
    ($expr:expr) => {{
        let __measurement = $crate::timer::ScopedCycleMeasurement::start();
        let __value = $expr;
        (__value, __measurement.elapsed_cycles())
    }};
}

/// Debug-only invariant check that includes the task id in its panic
/// message, matching the teacher crate's `hot_assert!` convention of
/// cheap checks that vanish in release builds.
#[macro_export]
macro_rules! invariant {
    ($cond:expr, $task_id:expr, $($msg:tt)*) => {
        debug_assert!($cond, "invariant violated for task {}: {}", $task_id, format!($($msg)*));
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn measure_cycles_returns_value_and_nonzero_duration() {
        let (value, _cycles) = measure_cycles!(2 + 2);
        assert_eq!(value, 4);
    }
}
