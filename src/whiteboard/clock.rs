use std::time::{Duration, Instant};

/// A periodic job driven by an external pump instead of its own thread.
///
/// Use [`RepeatingTask::fixed_steps`] for a fixed-timestep simulation and
/// [`RepeatingTask::due`] for a frame-limited callback. A stopped task never
/// fires again until restarted.
#[derive(Debug, Clone)]
pub struct RepeatingTask {
    interval: Duration,
    last: Option<Instant>,
    accumulator: Duration,
}

impl RepeatingTask {
    pub fn from_hz(hz: f32) -> Self {
        let hz = if hz.is_finite() && hz > 0.0 { hz } else { 1.0 };
        Self {
            interval: Duration::from_secs_f64(1.0 / f64::from(hz)),
            last: None,
            accumulator: Duration::ZERO,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn start(&mut self, now: Instant) {
        self.last = Some(now);
        self.accumulator = Duration::ZERO;
    }

    pub fn stop(&mut self) {
        self.last = None;
        self.accumulator = Duration::ZERO;
    }

    pub fn is_running(&self) -> bool {
        self.last.is_some()
    }

    /// Number of whole intervals to run since the previous call, capped at
    /// `max_steps`. Time beyond the cap is discarded.
    pub fn fixed_steps(&mut self, now: Instant, max_steps: u32) -> u32 {
        let Some(last) = self.last else {
            return 0;
        };
        self.accumulator += now.saturating_duration_since(last);
        self.last = Some(now);

        let mut steps = 0;
        while self.accumulator >= self.interval && steps < max_steps {
            self.accumulator -= self.interval;
            steps += 1;
        }
        if steps == max_steps {
            self.accumulator = self.accumulator.min(self.interval);
        }
        steps
    }

    /// True at most once per interval.
    pub fn due(&mut self, now: Instant) -> bool {
        let Some(last) = self.last else {
            return false;
        };
        if now.saturating_duration_since(last) >= self.interval {
            self.last = Some(now);
            true
        } else {
            false
        }
    }
}
