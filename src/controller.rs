use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::device::DeviceCapabilities;
use crate::levels::{QualityLevel, QualityTable};
use crate::pressure::PressureSignal;
use crate::sampler::{FpsTrend, PerformanceSampler};
use crate::sink::{DebugSnapshot, DebugSurface, SettingsSink};

pub mod decision;

pub use decision::{ControllerEvent, ControllerState, Mode};
use decision::decide_next_state;

struct Inner {
    state: ControllerState,
    sampler: PerformanceSampler,
    memory_ratio: Option<f64>,
}

/// Closed-loop quality controller driven by the host render tick.
///
/// # Guarantees
/// * All controller state sits behind one mutex, taken once per tick.
/// * Pressure monitors only deposit signals; the next tick acts on them.
/// * Every level change is published through the [`SettingsSink`] before
///   `tick` returns, after the mutex is released. Sinks and debug surfaces
///   may call back into the controller.
/// * Ticks and visibility changes come from the render thread; published
///   presets then arrive in decision order.
pub struct AdaptiveController {
    table: QualityTable,
    config: ControllerConfig,
    sink: Arc<dyn SettingsSink>,
    debug: Option<Arc<dyn DebugSurface>>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for AdaptiveController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("AdaptiveController")
            .field("config_id", &self.table.config_id())
            .field("state", &inner.state)
            .field("fps", &inner.sampler.current_fps())
            .finish()
    }
}

impl AdaptiveController {
    /// Builds a controller at `initial_rank` (clamped) and publishes that level.
    pub fn new(
        table: QualityTable,
        config: ControllerConfig,
        initial_rank: usize,
        sink: Arc<dyn SettingsSink>,
    ) -> Self {
        let rank = initial_rank.min(table.max_rank());
        let sampler = PerformanceSampler::new(&config);
        let controller = Self {
            table,
            config,
            sink,
            debug: None,
            inner: Mutex::new(Inner {
                state: ControllerState::baseline(rank),
                sampler,
                memory_ratio: None,
            }),
        };
        controller.sink.publish(controller.table.level_clamped(rank as i64));
        info!(
            rank,
            level = %controller.table.level_clamped(rank as i64).name,
            config_id = controller.table.config_id(),
            "quality controller initialized"
        );
        controller
    }

    /// Starts at the rank matching the probed device tier.
    pub fn for_device(
        table: QualityTable,
        config: ControllerConfig,
        capabilities: &DeviceCapabilities,
        sink: Arc<dyn SettingsSink>,
    ) -> Self {
        let rank = table.rank_for_tier(capabilities.tier);
        Self::new(table, config, rank, sink)
    }

    pub fn with_debug_surface(mut self, surface: Arc<dyn DebugSurface>) -> Self {
        self.debug = Some(surface);
        self
    }

    /// Records one rendered frame at host time `now` and evaluates the rules.
    pub fn tick(&self, now: Duration) -> Option<ControllerEvent> {
        let (event, rank, fps, snapshot) = {
            let mut inner = self.inner.lock();
            let window_closed = inner.sampler.record_frame(now).is_some();

            let decision = decide_next_state(
                &inner.state,
                &inner.sampler,
                now,
                self.table.max_rank(),
                &self.config,
            );
            inner.state = decision.state;

            if window_closed {
                debug!(
                    fps = inner.sampler.current_fps(),
                    stable = inner.sampler.is_stable(),
                    trend = ?inner.sampler.trend(),
                    rank = inner.state.rank(),
                    "frame window closed"
                );
            }
            let snapshot = (window_closed || decision.event.is_some())
                .then(|| self.debug_snapshot(&inner))
                .flatten();
            (
                decision.event,
                inner.state.rank(),
                inner.sampler.current_fps(),
                snapshot,
            )
        };

        if let Some(event) = event {
            self.apply_event(event, rank, fps);
        }
        if let Some(snapshot) = snapshot {
            self.show_debug(&snapshot);
        }
        event
    }

    fn apply_event(&self, event: ControllerEvent, rank: usize, fps: f64) {
        match event {
            ControllerEvent::EnteredEmergency { from_rank } => {
                warn!(fps, from_rank, "frame rate collapsed, entering emergency quality");
                self.sink.set_animation_enabled(false);
            }
            ControllerEvent::ExitedEmergency { rank } => {
                info!(fps, rank, "frame rate recovered, leaving emergency quality");
                self.sink.set_animation_enabled(true);
            }
            ControllerEvent::PressureDowngrade { from, to, signal } => {
                warn!(from, to, signal = signal.as_str(), "resource pressure downgrade");
            }
            ControllerEvent::PressureAbsorbed {
                resume_rank,
                signal,
            } => {
                info!(resume_rank, signal = signal.as_str(), "pressure lowered emergency resume rank");
            }
            ControllerEvent::Downgraded { from, to } => {
                info!(fps, from, to, "quality downgraded");
            }
            ControllerEvent::Upgraded { from, to } => {
                info!(fps, from, to, "quality upgraded");
            }
        }
        if event.changes_level() {
            self.sink.publish(self.table.level_clamped(rank as i64));
        }
    }

    /// Queues a pressure signal for the next tick.
    ///
    /// Only one downgrade is pending at a time; repeated signals before the
    /// next tick collapse into one step.
    pub fn signal_pressure(&self, signal: PressureSignal) {
        let mut inner = self.inner.lock();
        match signal {
            PressureSignal::Memory { ratio } => {
                inner.memory_ratio = Some(ratio);
            }
            PressureSignal::Thermal => {
                inner.state.thermal_throttled = true;
            }
            PressureSignal::ThermalCleared => {
                inner.state.thermal_throttled = false;
                return;
            }
        }
        if inner.state.pending_pressure.is_none() {
            inner.state.pending_pressure = Some(signal);
        }
    }

    /// Latest heap usage reading, shown on the debug surface.
    pub fn record_memory_ratio(&self, ratio: f64) {
        self.inner.lock().memory_ratio = Some(ratio);
    }

    /// Handles host visibility changes.
    ///
    /// Hiding pauses FPS-driven rules and caps animation frame rate. Showing
    /// again discards partial measurements and resumes at the held rank.
    pub fn set_visible(&self, visible: bool, now: Duration) {
        let snapshot = {
            let mut inner = self.inner.lock();
            if inner.state.suspended != visible {
                return;
            }
            inner.state.suspended = !visible;
            inner.state.reset_run();
            if visible {
                inner.sampler.reset(now);
                info!(rank = inner.state.rank(), "host visible, resuming adaptation");
            } else {
                info!(
                    rank = inner.state.rank(),
                    cap = self.config.hidden_fps_cap,
                    "host hidden, suspending adaptation"
                );
            }
            self.debug_snapshot(&inner)
        };

        let cap = (!visible).then_some(self.config.hidden_fps_cap);
        self.sink.set_frame_rate_cap(cap);
        if let Some(snapshot) = snapshot {
            self.show_debug(&snapshot);
        }
    }

    /// Snapshot for the debug surface, if one is attached.
    fn debug_snapshot(&self, inner: &Inner) -> Option<DebugSnapshot> {
        self.debug.as_ref().map(|_| self.snapshot_of(inner))
    }

    fn show_debug(&self, snapshot: &DebugSnapshot) {
        if let Some(surface) = &self.debug {
            surface.show(snapshot);
        }
    }

    fn snapshot_of(&self, inner: &Inner) -> DebugSnapshot {
        let rank = inner.state.rank();
        DebugSnapshot {
            fps: inner.sampler.current_fps(),
            rank,
            level: self.table.level_clamped(rank as i64).name.clone(),
            emergency: inner.state.is_emergency(),
            thermal_throttled: inner.state.thermal_throttled,
            suspended: inner.state.suspended,
            memory_ratio: inner.memory_ratio,
            config_id: self.table.config_id().to_string(),
        }
    }

    pub fn snapshot(&self) -> DebugSnapshot {
        self.snapshot_of(&self.inner.lock())
    }

    pub fn state(&self) -> ControllerState {
        self.inner.lock().state.clone()
    }

    pub fn rank(&self) -> usize {
        self.inner.lock().state.rank()
    }

    pub fn is_emergency(&self) -> bool {
        self.inner.lock().state.is_emergency()
    }

    pub fn current_fps(&self) -> f64 {
        self.inner.lock().sampler.current_fps()
    }

    pub fn trend(&self) -> FpsTrend {
        self.inner.lock().sampler.trend()
    }

    pub fn active_level(&self) -> QualityLevel {
        let rank = self.rank();
        self.table.level_clamped(rank as i64).clone()
    }

    pub fn table(&self) -> &QualityTable {
        &self.table
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }
}
