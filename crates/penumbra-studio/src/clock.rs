use std::time::{Duration, Instant};

/// Timing of one rendered frame.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Wall time spent since the previous tick, clamped.
    pub dt: Duration,

    pub frame_index: u64,
}

/// Per-loop frame timer.
///
/// Delta time is clamped so a single stall (adapter warm-up, first BVH
/// build) does not dominate the averages.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    frame_index: u64,
    total: Duration,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: Instant::now(),
            frame_index: 0,
            total: Duration::ZERO,
            dt_min,
            dt_max,
        }
    }

    /// Restarts the baseline without touching the counters.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    pub fn tick(&mut self) -> FrameTime {
        let now = Instant::now();
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max);
        self.last = now;

        let time = FrameTime {
            dt,
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        self.total += dt;
        time
    }

    pub fn frames(&self) -> u64 {
        self.frame_index
    }

    /// Mean clamped frame time, `None` before the first tick.
    pub fn average(&self) -> Option<Duration> {
        let frames = u32::try_from(self.frame_index).ok().filter(|&n| n > 0)?;
        Some(self.total / frames)
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
    fn ticks_count_frames() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.tick().frame_index, 0);
        assert_eq!(clock.tick().frame_index, 1);
        assert_eq!(clock.frames(), 2);
    }

    #[test]
    fn dt_is_clamped() {
        let min = Duration::from_millis(5);
        let mut clock = FrameClock::with_clamps(min, Duration::from_millis(10));
        clock.reset();
        let t = clock.tick();
        assert!(t.dt >= min);
        assert!(t.dt <= Duration::from_millis(10));
    }

    #[test]
    fn average_needs_a_frame() {
        let mut clock = FrameClock::with_clamps(Duration::from_millis(2), Duration::from_millis(2));
        assert!(clock.average().is_none());
        clock.tick();
        clock.tick();
        assert_eq!(clock.average(), Some(Duration::from_millis(2)));
    }
}
