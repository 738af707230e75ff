//! One-shot device capability probe.
//!
//! The host hands over whatever hints it can read (memory, cores, form factor,
//! pixel ratio). Missing hints fall back to documented defaults and the host is
//! classified into a coarse [`PerformanceTier`]. There is no error path.
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_MEMORY_GB: f64 = 4.0;
pub const DEFAULT_LOGICAL_CORES: u32 = 4;
pub const DEFAULT_PIXEL_RATIO: f64 = 1.0;

const ULTRA_MEMORY_GB: f64 = 16.0;
const ULTRA_CORES: u32 = 12;

/// Coarse classification of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    Low,
    Medium,
    High,
    Ultra,
}

impl PerformanceTier {
    /// 1-based position, used to scale the tier onto a table of any size.
    pub(crate) fn ordinal(self) -> u8 {
        match self {
            PerformanceTier::Low => 1,
            PerformanceTier::Medium => 2,
            PerformanceTier::High => 3,
            PerformanceTier::Ultra => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceTier::Low => "low",
            PerformanceTier::Medium => "medium",
            PerformanceTier::High => "high",
            PerformanceTier::Ultra => "ultra",
        }
    }
}

/// Raw, possibly incomplete hints supplied by the host environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostHints {
    pub memory_gb: Option<f64>,
    pub logical_cores: Option<u32>,
    pub is_mobile: Option<bool>,
    pub device_pixel_ratio: Option<f64>,
}

impl HostHints {
    /// Hints readable from the current process: only the core count is known natively.
    pub fn from_system() -> Self {
        let logical_cores = std::thread::available_parallelism()
            .ok()
            .map(|n| n.get() as u32);
        Self {
            logical_cores,
            is_mobile: Some(false),
            ..Self::default()
        }
    }
}

/// Immutable snapshot of what the host can do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub is_mobile: bool,
    pub memory_gb: f64,
    pub logical_cores: u32,
    pub device_pixel_ratio: f64,
    pub tier: PerformanceTier,
}

/// Resolves hints into capabilities and classifies the tier.
pub fn probe(hints: &HostHints) -> DeviceCapabilities {
    let memory_gb = hints.memory_gb.filter(|m| *m > 0.0).unwrap_or_else(|| {
        warn!(default = DEFAULT_MEMORY_GB, "memory hint unavailable, assuming default");
        DEFAULT_MEMORY_GB
    });
    let logical_cores = hints.logical_cores.filter(|c| *c > 0).unwrap_or_else(|| {
        warn!(default = DEFAULT_LOGICAL_CORES, "core count hint unavailable, assuming default");
        DEFAULT_LOGICAL_CORES
    });
    let is_mobile = hints.is_mobile.unwrap_or(false);
    let device_pixel_ratio = hints
        .device_pixel_ratio
        .filter(|r| *r > 0.0)
        .unwrap_or(DEFAULT_PIXEL_RATIO);

    let tier = classify(is_mobile, memory_gb, logical_cores);
    debug!(
        is_mobile,
        memory_gb,
        logical_cores,
        device_pixel_ratio,
        tier = tier.as_str(),
        "device capabilities probed"
    );

    DeviceCapabilities {
        is_mobile,
        memory_gb,
        logical_cores,
        device_pixel_ratio,
        tier,
    }
}

fn classify(is_mobile: bool, memory_gb: f64, cores: u32) -> PerformanceTier {
    if is_mobile {
        if memory_gb <= 2.0 || cores <= 2 {
            PerformanceTier::Low
        } else if memory_gb >= 6.0 && cores >= 6 {
            PerformanceTier::High
        } else {
            PerformanceTier::Medium
        }
    } else if memory_gb <= 4.0 || cores <= 4 {
        PerformanceTier::Low
    } else if memory_gb >= ULTRA_MEMORY_GB && cores >= ULTRA_CORES {
        PerformanceTier::Ultra
    } else if memory_gb >= 8.0 && cores >= 8 {
        PerformanceTier::High
    } else {
        PerformanceTier::Medium
    }
}
