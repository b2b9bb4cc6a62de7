use std::time::{Duration, Instant};

use crate::client::ViewportId;

/// Longest step a single frame may advance the game by.
pub const MAX_FRAME_DELTA: Duration = Duration::from_millis(500);

/// Measures the time between frames for the main loop.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Option<Instant>,
    /// Upper bound on frames per second. `0.0` leaves throttling to the vblank wait.
    max_tick_rate: f32,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl FrameClock {
    pub fn new(max_tick_rate: f32) -> Self {
        Self { last: None, max_tick_rate: max_tick_rate.max(0.0) }
    }

    pub fn max_tick_rate(&self) -> f32 {
        self.max_tick_rate
    }

    /// Time since the previous tick, clamped to [`MAX_FRAME_DELTA`].
    pub fn tick(&mut self) -> Duration {
        self.tick_at(Instant::now())
    }

    /// Same as [`tick`](Self::tick) with an explicit timestamp. The first tick returns zero.
    pub fn tick_at(&mut self, now: Instant) -> Duration {
        let delta = match self.last {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::ZERO,
        };
        self.last = Some(now);
        if delta > MAX_FRAME_DELTA {
            log::debug!("FrameClock: clamping {:?} frame to {:?}", delta, MAX_FRAME_DELTA);
        }
        delta.min(MAX_FRAME_DELTA)
    }

    /// How long to sleep after a frame that took `frame_time` to honour the max tick rate.
    /// `None` when no sleep is needed.
    pub fn throttle(&self, frame_time: Duration) -> Option<Duration> {
        if self.max_tick_rate <= 0.0 {
            return None;
        }
        // A rate too small for its period to fit a Duration does not throttle.
        let period = Duration::try_from_secs_f32(1.0 / self.max_tick_rate).ok()?;
        period.checked_sub(frame_time).filter(|d| !d.is_zero())
    }
}

/// Outcome of one client tick.
#[derive(Default, Debug)]
pub struct TickResult {
    /// Viewport repainted this tick, if any was eligible.
    pub viewport: Option<ViewportId>,
    /// Whether a frame reached the screen
    pub presented: bool,
    /// Scene callback or device error that aborted the frame
    pub error: Option<String>,
}

impl TickResult {
    pub fn idle() -> Self {
        Self::default()
    }
}
