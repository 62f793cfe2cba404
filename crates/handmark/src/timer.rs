//! Timing utilities: profiling timers, a logging FPS counter and an instantaneous frame rate meter.

use std::{
    fmt, mem,
    sync::Mutex,
    time::{Duration, Instant},
};

const EMA_ALPHA: f32 = 0.3;

/// Measures how long an operation takes, averaging the measurements with an exponential moving
/// average.
///
/// Displaying the timer with `{}` prints the average and resets it.
pub struct Timer {
    name: &'static str,
    state: Mutex<TimerState>,
}

#[derive(Default)]
struct TimerState {
    avg: Option<f32>,
    count: usize,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(TimerState::default()),
        }
    }

    /// Runs `f` and records how long it took.
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        f()
    }

    /// Starts timing an operation. The measurement is recorded when the guard is dropped.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    fn record(&self, duration: Duration) {
        let secs = duration.as_secs_f32();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.avg = Some(match state.avg {
            Some(avg) => EMA_ALPHA * secs + (1.0 - EMA_ALPHA) * avg,
            None => secs,
        });
        state.count += 1;
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let state = mem::take(&mut *state);
        let avg_ms = state.avg.unwrap_or(0.0) * 1000.0;
        write!(f, "{}: {}x{avg_ms:.01}ms", self.name, state.count)
    }
}

/// Guard returned by [`Timer::start`].
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.record(self.start.elapsed());
    }
}

/// Counts frames and logs the frame rate (plus any timers) once per second at *debug* level.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
}

impl FpsCounter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
        }
    }

    pub fn tick(&mut self) {
        self.tick_with(std::iter::empty::<&Timer>());
    }

    /// Counts a frame. When a second has passed, logs the FPS followed by every item of `extra`.
    pub fn tick_with<T: fmt::Display>(&mut self, extra: impl IntoIterator<Item = T>) {
        self.frames += 1;
        if self.start.elapsed() < Duration::from_secs(1) {
            return;
        }

        let extra = extra
            .into_iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>();
        if extra.is_empty() {
            log::debug!("{}: {} FPS", self.name, self.frames);
        } else {
            log::debug!("{}: {} FPS ({})", self.name, self.frames, extra.join(", "));
        }

        self.frames = 0;
        self.start = Instant::now();
    }
}

/// Computes the instantaneous frame rate from the time between consecutive frames.
#[derive(Debug, Clone)]
pub struct FrameRate {
    prev: Instant,
}

impl FrameRate {
    /// Creates a meter whose first tick is measured against the current time.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self { prev: start }
    }

    /// Marks a new frame and returns the frame rate since the previous one.
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    /// Like [`FrameRate::tick`], with an explicit timestamp.
    ///
    /// Returns `f32::INFINITY` if no time has passed since the previous frame.
    pub fn tick_at(&mut self, now: Instant) -> f32 {
        let delta = now.saturating_duration_since(self.prev).as_secs_f32();
        self.prev = now;
        if delta == 0.0 {
            f32::INFINITY
        } else {
            delta.recip()
        }
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn frame_rate_half_second() {
        let start = Instant::now();
        let mut rate = FrameRate::starting_at(start);
        assert_relative_eq!(rate.tick_at(start + Duration::from_millis(500)), 2.0);
        assert_relative_eq!(rate.tick_at(start + Duration::from_millis(600)), 10.0, epsilon = 1e-3);
    }

    #[test]
    fn frame_rate_zero_delta() {
        let start = Instant::now();
        let mut rate = FrameRate::starting_at(start);
        assert_eq!(rate.tick_at(start), f32::INFINITY);
    }

    #[test]
    fn timer_resets_on_display() {
        let timer = Timer::new("op");
        timer.time(|| {});
        timer.time(|| {});
        assert!(timer.to_string().starts_with("op: 2x"));
        assert_eq!(timer.to_string(), "op: 0x0.0ms");
    }
}
