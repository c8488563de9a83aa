use std::time::{Duration, Instant};

/// Wall-clock duration of a timed section.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Elapsed(Duration);

impl Elapsed {
    /// Always finite and non-negative.
    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }
}

/// Runs `f` and returns its result with the time it took on the monotonic clock.
pub fn time_execution<T>(f: impl FnOnce() -> T) -> (T, Elapsed) {
    let start = Instant::now();
    let result = f();
    (result, Elapsed(start.elapsed()))
}
