//! Tuning parameters for the sampler, controller and monitors.
//!
//! Everything deserializes from JSON with per-field defaults, so a host only
//! spells out the knobs it wants to change.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::levels::{canonical_levels, LevelError, QualityLevel, QualityTable};

/// Error produced while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("invalid quality table: {0}")]
    Levels(#[from] LevelError),
}

/// How long `is_stable()` must hold before a hysteresis-gated step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityGate {
    /// Consecutive render ticks.
    Ticks(u32),
    /// Elapsed host time in milliseconds, independent of tick rate.
    DurationMs(u64),
}

impl StabilityGate {
    pub fn is_satisfied(&self, ticks: u32, elapsed: Duration) -> bool {
        match *self {
            StabilityGate::Ticks(required) => ticks >= required,
            StabilityGate::DurationMs(ms) => elapsed >= Duration::from_millis(ms),
        }
    }
}

/// Frame-rate thresholds and hysteresis for the controller and sampler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_target_fps")]
    pub target_fps: f64,

    /// Below this the sampler reports `should_reduce`.
    #[serde(default = "default_reduce_below_fps")]
    pub reduce_below_fps: f64,

    /// Above this the sampler reports `should_increase`.
    #[serde(default = "default_increase_above_fps")]
    pub increase_above_fps: f64,

    /// Below this the controller enters emergency mode.
    #[serde(default = "default_emergency_below_fps")]
    pub emergency_below_fps: f64,

    /// Fraction of `target_fps` required to leave emergency mode.
    #[serde(default = "default_emergency_exit_ratio")]
    pub emergency_exit_ratio: f64,

    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Allowed relative change between consecutive window readings for the
    /// newer one to count as steady.
    #[serde(default = "default_stability_tolerance")]
    pub stability_tolerance: f64,

    /// Relative fps change between windows that counts as a trend.
    #[serde(default = "default_trend_deadband")]
    pub trend_deadband: f64,

    #[serde(default = "default_downgrade_gate")]
    pub downgrade_gate: StabilityGate,

    #[serde(default = "default_upgrade_gate")]
    pub upgrade_gate: StabilityGate,

    /// Animation frame-rate cap applied while the host is hidden.
    #[serde(default = "default_hidden_fps_cap")]
    pub hidden_fps_cap: u32,
}

fn default_target_fps() -> f64 {
    60.0
}
fn default_reduce_below_fps() -> f64 {
    30.0
}
fn default_increase_above_fps() -> f64 {
    55.0
}
fn default_emergency_below_fps() -> f64 {
    15.0
}
fn default_emergency_exit_ratio() -> f64 {
    0.85
}
fn default_cooldown_ms() -> u64 {
    3_000
}
fn default_window_ms() -> u64 {
    1_000
}
fn default_stability_tolerance() -> f64 {
    0.20
}
fn default_trend_deadband() -> f64 {
    0.10
}
fn default_downgrade_gate() -> StabilityGate {
    StabilityGate::DurationMs(500)
}
fn default_upgrade_gate() -> StabilityGate {
    StabilityGate::DurationMs(2_000)
}
fn default_hidden_fps_cap() -> u32 {
    10
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            reduce_below_fps: default_reduce_below_fps(),
            increase_above_fps: default_increase_above_fps(),
            emergency_below_fps: default_emergency_below_fps(),
            emergency_exit_ratio: default_emergency_exit_ratio(),
            cooldown_ms: default_cooldown_ms(),
            window_ms: default_window_ms(),
            stability_tolerance: default_stability_tolerance(),
            trend_deadband: default_trend_deadband(),
            downgrade_gate: default_downgrade_gate(),
            upgrade_gate: default_upgrade_gate(),
            hidden_fps_cap: default_hidden_fps_cap(),
        }
    }
}

impl ControllerConfig {
    /// Tick-counted gates matching a 60 fps host: 30 ticks down, 120 ticks up.
    pub fn with_tick_gates() -> Self {
        Self {
            downgrade_gate: StabilityGate::Ticks(30),
            upgrade_gate: StabilityGate::Ticks(120),
            ..Self::default()
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn emergency_exit_fps(&self) -> f64 {
        self.target_fps * self.emergency_exit_ratio
    }

    /// # Errors
    /// `Invalid` when thresholds are not ordered
    /// `0 < emergency < reduce < increase` or a duration is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.target_fps > 0.0) {
            return Err(ConfigError::Invalid("target_fps must be positive".into()));
        }
        if !(self.emergency_below_fps > 0.0
            && self.emergency_below_fps < self.reduce_below_fps
            && self.reduce_below_fps < self.increase_above_fps)
        {
            return Err(ConfigError::Invalid(
                "thresholds must satisfy 0 < emergency < reduce < increase".into(),
            ));
        }
        if !(self.emergency_exit_ratio > 0.0 && self.emergency_exit_ratio <= 1.0) {
            return Err(ConfigError::Invalid(
                "emergency_exit_ratio must be in (0, 1]".into(),
            ));
        }
        if self.emergency_exit_fps() <= self.emergency_below_fps {
            return Err(ConfigError::Invalid(
                "emergency exit must sit above the emergency threshold".into(),
            ));
        }
        if self.window_ms == 0 {
            return Err(ConfigError::Invalid("window_ms must be non-zero".into()));
        }
        if self.stability_tolerance <= 0.0 {
            return Err(ConfigError::Invalid(
                "stability_tolerance must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Periods and thresholds of the resource pressure monitors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_memory_interval_ms")]
    pub memory_interval_ms: u64,

    /// Heap usage ratio above which memory pressure fires.
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: f64,

    #[serde(default = "default_thermal_interval_ms")]
    pub thermal_interval_ms: u64,

    /// Upper bound on a single host probe before it counts as a failed cycle.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_memory_interval_ms() -> u64 {
    10_000
}
fn default_memory_threshold() -> f64 {
    0.85
}
fn default_thermal_interval_ms() -> u64 {
    30_000
}
fn default_probe_timeout_ms() -> u64 {
    1_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            memory_interval_ms: default_memory_interval_ms(),
            memory_threshold: default_memory_threshold(),
            thermal_interval_ms: default_thermal_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl MonitorConfig {
    pub fn memory_interval(&self) -> Duration {
        Duration::from_millis(self.memory_interval_ms)
    }

    pub fn thermal_interval(&self) -> Duration {
        Duration::from_millis(self.thermal_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// # Errors
    /// `Invalid` for zero intervals or a threshold outside `(0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_interval_ms == 0 || self.thermal_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "monitor intervals must be non-zero".into(),
            ));
        }
        if !(self.memory_threshold > 0.0 && self.memory_threshold <= 1.0) {
            return Err(ConfigError::Invalid(
                "memory_threshold must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Complete configuration for a quality runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub monitors: MonitorConfig,
    /// Empty means the canonical five-level table.
    #[serde(default)]
    pub levels: Vec<QualityLevel>,
}

impl QualityConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    /// `Parse` for malformed JSON, `Invalid` or `Levels` for rejected values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Propagates controller, monitor and table validation failures.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.controller.validate()?;
        self.monitors.validate()?;
        self.table()?;
        Ok(())
    }

    /// Builds the validated quality table named by this config.
    ///
    /// # Errors
    /// `Levels` when the configured table is not monotonic.
    pub fn table(&self) -> Result<QualityTable, ConfigError> {
        if self.levels.is_empty() {
            return Ok(QualityTable::new(canonical_levels())?);
        }
        Ok(QualityTable::new(self.levels.clone())?)
    }
}
