#[cfg(not(target_arch = "wasm32"))]
pub use std::time::{Duration, Instant};

#[cfg(target_arch = "wasm32")]
pub use web_time::{Duration, Instant};

/// Frame clock for hosts that drive the governor and particles.
pub struct Timer {
    start_time: Instant,
    last_update: Instant,
    /// Time since last tick
    pub delta: Duration,
    /// Total elapsed time since creation
    pub elapsed: Duration,
    /// Total number of ticks
    pub frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Creates a new timer starting from now.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    #[must_use]
    pub fn starting_at(now: Instant) -> Self {
        Self {
            start_time: now,
            last_update: now,
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Advances the clock to the current wall-clock time.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Advances the clock to `now`. Instants earlier than the last tick
    /// count as a zero-length frame.
    pub fn tick_at(&mut self, now: Instant) {
        self.delta = now.saturating_duration_since(self.last_update);
        self.elapsed = now.saturating_duration_since(self.start_time);
        self.last_update = now;
        self.frame_count += 1;
    }

    #[must_use]
    pub fn dt_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_at_accumulates() {
        let start = Instant::now();
        let mut timer = Timer::starting_at(start);
        timer.tick_at(start + Duration::from_millis(16));
        timer.tick_at(start + Duration::from_millis(40));

        assert_eq!(timer.frame_count, 2);
        assert_eq!(timer.delta, Duration::from_millis(24));
        assert_eq!(timer.elapsed, Duration::from_millis(40));
    }
}
