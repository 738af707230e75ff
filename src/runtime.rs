//! Host-facing runtime: profiles the device once, builds the controller and
//! keeps the pressure monitors running on their own timers.
//!
//! The render path (`on_frame`) never awaits. Monitors are tokio tasks that
//! only deposit signals into the controller; a check still in flight when its
//! next interval comes due makes that interval get skipped.
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{ConfigError, MonitorConfig, QualityConfig};
use crate::controller::{AdaptiveController, ControllerEvent};
use crate::device::{probe, DeviceCapabilities, HostHints};
use crate::pressure::{HostProbe, MemoryMonitor, ThermalMonitor};
use crate::sink::{DebugSurface, SharedSettings};

/// Errors raised while starting a runtime. Nothing fails after start.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("monitors need a tokio runtime: {0}")]
    NoRuntime(String),
}

/// Running quality subsystem for one render loop.
///
/// # Behavior
/// * Probes device capabilities exactly once, at `start`.
/// * Spawns the memory monitor, and the thermal monitor on mobile hosts.
/// * Stops both monitors on `shutdown()` or drop.
pub struct QualityRuntime {
    controller: Arc<AdaptiveController>,
    capabilities: DeviceCapabilities,
    settings: SharedSettings,
    shutdown: CancellationToken,
    monitors: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for QualityRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityRuntime")
            .field("capabilities", &self.capabilities)
            .field("controller", &self.controller)
            .field("monitors", &self.monitors.len())
            .finish()
    }
}

impl QualityRuntime {
    /// Validates `config`, probes the device and starts the monitors.
    ///
    /// # Errors
    /// `RuntimeError::Config` for an invalid configuration or quality table,
    /// `RuntimeError::NoRuntime` when called outside a tokio runtime.
    pub fn start(
        config: QualityConfig,
        hints: &HostHints,
        host: Arc<dyn HostProbe>,
        debug_surface: Option<Arc<dyn DebugSurface>>,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|err| RuntimeError::NoRuntime(err.to_string()))?;

        let table = config.table()?;
        let capabilities = probe(hints);
        let rank = table.rank_for_tier(capabilities.tier);
        let settings = SharedSettings::new(table.level_clamped(rank as i64).clone());

        let mut controller = AdaptiveController::for_device(
            table,
            config.controller.clone(),
            &capabilities,
            Arc::new(settings.clone()),
        );
        if let Some(surface) = debug_surface {
            controller = controller.with_debug_surface(surface);
        }
        let controller = Arc::new(controller);

        let shutdown = CancellationToken::new();
        let mut monitors = vec![handle.spawn(run_memory_monitor(
            controller.clone(),
            host.clone(),
            config.monitors.clone(),
            shutdown.clone(),
        ))];
        if capabilities.is_mobile {
            monitors.push(handle.spawn(run_thermal_monitor(
                controller.clone(),
                host,
                config.monitors.clone(),
                shutdown.clone(),
            )));
        }

        info!(
            tier = capabilities.tier.as_str(),
            rank,
            monitors = monitors.len(),
            "quality runtime started"
        );
        Ok(Self {
            controller,
            capabilities,
            settings,
            shutdown,
            monitors,
        })
    }

    /// Render-tick entry point; `now` is host time since origin.
    pub fn on_frame(&self, now: Duration) -> Option<ControllerEvent> {
        self.controller.tick(now)
    }

    pub fn set_visible(&self, visible: bool, now: Duration) {
        self.controller.set_visible(visible, now);
    }

    /// Published settings the renderer reads each frame.
    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    pub fn controller(&self) -> &Arc<AdaptiveController> {
        &self.controller
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// Stops the monitors. The controller keeps its last state.
    pub fn shutdown(&mut self) {
        self.shutdown.cancel();
        for handle in self.monitors.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for QualityRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn periodic(period: Duration) -> tokio::time::Interval {
    let start = tokio::time::Instant::now() + period;
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn run_memory_monitor(
    controller: Arc<AdaptiveController>,
    host: Arc<dyn HostProbe>,
    config: MonitorConfig,
    shutdown: CancellationToken,
) {
    let mut monitor = MemoryMonitor::new(config.memory_threshold);
    let mut ticker = periodic(config.memory_interval());
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let signal = monitor.check(host.as_ref(), config.probe_timeout()).await;
        if let Some(ratio) = monitor.last_ratio() {
            controller.record_memory_ratio(ratio);
        }
        if let Some(signal) = signal {
            controller.signal_pressure(signal);
        }
    }
    debug!("memory monitor stopped");
}

async fn run_thermal_monitor(
    controller: Arc<AdaptiveController>,
    host: Arc<dyn HostProbe>,
    config: MonitorConfig,
    shutdown: CancellationToken,
) {
    let mut monitor = ThermalMonitor::new(true);
    let mut ticker = periodic(config.thermal_interval());
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if let Some(signal) = monitor.check(host.as_ref(), config.probe_timeout()).await {
            controller.signal_pressure(signal);
        }
    }
    debug!("thermal monitor stopped");
}
