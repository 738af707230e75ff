//! Adaptive rendering-quality controller for a 3D solar-system explorer.
//!
//! Classifies the device once, samples the frame rate every render tick, listens
//! for memory and thermal pressure, and steps a discrete quality preset up or
//! down to stay inside the frame budget without visible oscillation.

pub mod config;
pub mod controller;
pub mod device;
pub mod levels;
pub mod pressure;
pub mod runtime;
pub mod sampler;
pub mod sink;

pub use config::{ConfigError, ControllerConfig, MonitorConfig, QualityConfig, StabilityGate};
pub use controller::{AdaptiveController, ControllerEvent, ControllerState, Mode};
pub use device::{probe, DeviceCapabilities, HostHints, PerformanceTier};
pub use levels::{LevelError, QualityLevel, QualityPatch, QualityTable};
pub use pressure::{HostProbe, NoHostProbe, PressureSignal, ProbeError, ThermalHint};
pub use runtime::{QualityRuntime, RuntimeError};
pub use sampler::{FpsTrend, PerformanceSampler};
pub use sink::{AppliedSettings, DebugSnapshot, DebugSurface, JsonDebugSurface, SettingsSink, SharedSettings};
