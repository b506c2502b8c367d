use std::time::{Duration, Instant};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Time elapsed since the previous frame tick, in seconds.
    pub dt: f32,

    /// Monotonic timestamp taken at the tick.
    pub now: Instant,

    /// Monotonic frame counter.
    pub frame_index: u64,
}

impl FrameTime {
    /// Instantaneous frames per second derived from `dt`.
    #[inline]
    pub fn fps(&self) -> f32 {
        if self.dt > 0.0 { 1.0 / self.dt } else { 0.0 }
    }
}

/// Frame clock producing `FrameTime` snapshots.
///
/// One clock per render loop. Delta time is clamped to avoid pathological
/// values when the host is paused by the debugger, backgrounded, or stalls
/// while a lost context is being restored.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
    /// Exponentially smoothed delta, seconds.
    smoothed_dt: f32,
}

impl FrameClock {
    /// Creates a new clock with default clamps (0.1 ms .. 250 ms).
    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    /// Creates a clock with custom delta-time clamps.
    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: Instant::now(),
            frame_index: 0,
            dt_min,
            dt_max,
            smoothed_dt: 0.0,
        }
    }

    /// Resets the clock baseline.
    ///
    /// Called when the render loop restarts or after a context restore.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    /// Advances the clock and returns a new `FrameTime`.
    pub fn tick(&mut self) -> FrameTime {
        let now = Instant::now();
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max)
            .as_secs_f32();

        self.last = now;
        self.smoothed_dt = if self.frame_index == 0 {
            dt
        } else {
            self.smoothed_dt * 0.9 + dt * 0.1
        };

        let ft = FrameTime {
            dt,
            now,
            frame_index: self.frame_index,
        };

        self.frame_index = self.frame_index.wrapping_add(1);

        ft
    }

    /// Number of ticks so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_index
    }

    /// Smoothed frames per second; zero before the first tick.
    pub fn fps(&self) -> f32 {
        if self.smoothed_dt > 0.0 { 1.0 / self.smoothed_dt } else { 0.0 }
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dt_is_clamped() {
        let mut clock = FrameClock::with_clamps(Duration::from_millis(5), Duration::from_millis(10));
        let ft = clock.tick();
        assert!(ft.dt >= 0.005 - f32::EPSILON && ft.dt <= 0.010 + f32::EPSILON);
    }

    #[test]
    fn frame_index_increments() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.tick().frame_index, 0);
        assert_eq!(clock.tick().frame_index, 1);
        assert_eq!(clock.frame_count(), 2);
        assert!(clock.fps() > 0.0);
    }
}
