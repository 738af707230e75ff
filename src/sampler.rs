//! Windowed frame-rate measurement.
//!
//! The sampler counts frames over a rolling window (one second by default) and
//! only recomputes its FPS estimate when a window closes, so a single slow
//! frame never drives a decision on its own. A reading counts as steady when it
//! lands within a band of the window before it. Per-frame jitter (vsync
//! quantization, the odd dropped frame) averages out inside a window and never
//! affects steadiness.
use std::time::Duration;

use crate::config::ControllerConfig;

/// Direction of the frame rate between the last two completed windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpsTrend {
    Degrading,
    Stable,
    Improving,
}

/// Rolling frame-rate state for one render loop.
#[derive(Debug, Clone)]
pub struct PerformanceSampler {
    window: Duration,
    reduce_below_fps: f64,
    increase_above_fps: f64,
    tolerance: f64,
    deadband: f64,
    frame_count: u32,
    window_start: Option<Duration>,
    last_frame: Option<Duration>,
    current_fps: f64,
    previous_fps: Option<f64>,
    window_stable: bool,
    windows_completed: u64,
}

impl PerformanceSampler {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            window: config.window(),
            reduce_below_fps: config.reduce_below_fps,
            increase_above_fps: config.increase_above_fps,
            tolerance: config.stability_tolerance,
            deadband: config.trend_deadband,
            frame_count: 0,
            window_start: None,
            last_frame: None,
            current_fps: 0.0,
            previous_fps: None,
            window_stable: false,
            windows_completed: 0,
        }
    }

    /// Records one rendered frame at host time `timestamp`.
    ///
    /// Returns the new FPS estimate when this frame closes a window.
    /// Timestamps that do not move forward are ignored.
    pub fn record_frame(&mut self, timestamp: Duration) -> Option<f64> {
        let (Some(start), Some(last)) = (self.window_start, self.last_frame) else {
            self.window_start = Some(timestamp);
            self.last_frame = Some(timestamp);
            return None;
        };
        if timestamp <= last {
            return None;
        }

        self.frame_count = self.frame_count.saturating_add(1);
        self.last_frame = Some(timestamp);

        let elapsed = timestamp - start;
        if elapsed < self.window {
            return None;
        }

        let fps = self.frame_count as f64 / elapsed.as_secs_f64();
        let previous = (self.windows_completed > 0).then_some(self.current_fps);
        self.window_stable = self.agrees_with(previous, fps);
        self.previous_fps = previous;
        self.current_fps = fps;
        self.windows_completed = self.windows_completed.saturating_add(1);

        self.window_start = Some(timestamp);
        self.frame_count = 0;
        Some(fps)
    }

    /// A first window has nothing to disagree with and counts as steady.
    fn agrees_with(&self, previous: Option<f64>, fps: f64) -> bool {
        match previous {
            None => fps > 0.0,
            Some(previous) if previous > 0.0 => {
                ((fps - previous) / previous).abs() <= self.tolerance
            }
            Some(_) => false,
        }
    }

    /// FPS of the last completed window, or 0 before the first window closes.
    pub fn current_fps(&self) -> f64 {
        self.current_fps
    }

    pub fn has_reading(&self) -> bool {
        self.windows_completed > 0
    }

    pub fn should_reduce(&self) -> bool {
        self.has_reading() && self.current_fps < self.reduce_below_fps
    }

    pub fn should_increase(&self) -> bool {
        self.has_reading() && self.current_fps > self.increase_above_fps
    }

    /// `true` when the last window's FPS stayed within the tolerance band of
    /// the window before it.
    pub fn is_stable(&self) -> bool {
        self.has_reading() && self.window_stable
    }

    pub fn trend(&self) -> FpsTrend {
        let Some(previous) = self.previous_fps.filter(|p| *p > 0.0) else {
            return FpsTrend::Stable;
        };
        let change = (self.current_fps - previous) / previous;
        if change > self.deadband {
            FpsTrend::Improving
        } else if change < -self.deadband {
            FpsTrend::Degrading
        } else {
            FpsTrend::Stable
        }
    }

    /// Drops every reading and starts a fresh window at `timestamp`.
    pub fn reset(&mut self, timestamp: Duration) {
        self.frame_count = 0;
        self.window_start = Some(timestamp);
        self.last_frame = Some(timestamp);
        self.current_fps = 0.0;
        self.previous_fps = None;
        self.window_stable = false;
        self.windows_completed = 0;
    }
}
