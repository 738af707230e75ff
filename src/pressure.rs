//! Best-effort memory and thermal pressure monitors.
//!
//! Each monitor turns one host reading into at most one [`PressureSignal`].
//! Readings the host cannot provide (`Ok(None)`) and failed probes never fire;
//! the monitor simply tries again on its next interval.
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Failures while reading host pressure state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProbeError {
    #[error("host capability unavailable: {0}")]
    CapabilityUnavailable(&'static str),
    #[error("transient monitor failure: {0}")]
    TransientMonitorFailure(String),
    #[error("host probe timed out")]
    Timeout,
}

/// Coarse thermal state reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermalHint {
    Nominal,
    Throttled,
}

/// Out-of-band input that forces the controller to shed load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PressureSignal {
    /// Heap usage crossed the configured ratio.
    Memory { ratio: f64 },
    /// The host reports thermal throttling.
    Thermal,
    /// Throttling ended; lifts the upgrade block, never changes rank.
    ThermalCleared,
}

impl PressureSignal {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            PressureSignal::Memory { .. } => "memory",
            PressureSignal::Thermal => "thermal",
            PressureSignal::ThermalCleared => "thermal_cleared",
        }
    }

    /// Whether the signal demands a downgrade.
    pub fn is_downgrade(&self) -> bool {
        !matches!(self, PressureSignal::ThermalCleared)
    }
}

/// Host APIs the monitors query. Unsupported APIs return `Ok(None)`.
#[async_trait]
pub trait HostProbe: Send + Sync {
    /// Used heap divided by the heap limit, in `[0, 1]`.
    async fn heap_usage_ratio(&self) -> Result<Option<f64>, ProbeError>;

    async fn thermal_state(&self) -> Result<Option<ThermalHint>, ProbeError>;

    /// Asks the host to collect garbage; returns `false` when unsupported.
    fn request_gc(&self) -> bool {
        false
    }
}

/// Host without any pressure APIs; neither monitor ever fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHostProbe;

#[async_trait]
impl HostProbe for NoHostProbe {
    async fn heap_usage_ratio(&self) -> Result<Option<f64>, ProbeError> {
        Ok(None)
    }

    async fn thermal_state(&self) -> Result<Option<ThermalHint>, ProbeError> {
        Ok(None)
    }
}

async fn bounded<T>(
    limit: Duration,
    probe: impl std::future::Future<Output = Result<Option<T>, ProbeError>>,
) -> Result<Option<T>, ProbeError> {
    match tokio::time::timeout(limit, probe).await {
        Ok(res) => res,
        Err(_) => Err(ProbeError::Timeout),
    }
}

/// Periodic heap usage check.
#[derive(Debug)]
pub struct MemoryMonitor {
    threshold: f64,
    last_ratio: Option<f64>,
    failures: u64,
}

impl MemoryMonitor {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last_ratio: None,
            failures: 0,
        }
    }

    /// Turns one reading into a signal when usage exceeds the threshold.
    pub fn evaluate(&mut self, reading: Result<Option<f64>, ProbeError>) -> Option<PressureSignal> {
        match reading {
            Ok(Some(ratio)) if ratio.is_finite() => {
                self.last_ratio = Some(ratio);
                (ratio > self.threshold).then_some(PressureSignal::Memory { ratio })
            }
            Ok(_) => None,
            Err(err) => {
                self.failures = self.failures.saturating_add(1);
                debug!(error = %err, failures = self.failures, "memory check skipped this cycle");
                None
            }
        }
    }

    /// Queries the host once and requests a GC hint when pressure fires.
    pub async fn check(&mut self, host: &dyn HostProbe, limit: Duration) -> Option<PressureSignal> {
        let reading = bounded(limit, host.heap_usage_ratio()).await;
        let signal = self.evaluate(reading);
        if let Some(PressureSignal::Memory { ratio }) = signal {
            let collected = host.request_gc();
            warn!(ratio, gc_hint = collected, "memory pressure detected");
        }
        signal
    }

    pub fn last_ratio(&self) -> Option<f64> {
        self.last_ratio
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}

/// Periodic thermal check; inert on non-mobile hosts.
#[derive(Debug)]
pub struct ThermalMonitor {
    enabled: bool,
    throttled: bool,
    failures: u64,
}

impl ThermalMonitor {
    pub fn new(is_mobile: bool) -> Self {
        Self {
            enabled: is_mobile,
            throttled: false,
            failures: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fires `Thermal` on every throttled reading and `ThermalCleared` once
    /// when throttling ends.
    pub fn evaluate(
        &mut self,
        reading: Result<Option<ThermalHint>, ProbeError>,
    ) -> Option<PressureSignal> {
        if !self.enabled {
            return None;
        }
        match reading {
            Ok(Some(ThermalHint::Throttled)) => {
                self.throttled = true;
                Some(PressureSignal::Thermal)
            }
            Ok(Some(ThermalHint::Nominal)) if self.throttled => {
                self.throttled = false;
                Some(PressureSignal::ThermalCleared)
            }
            Ok(_) => None,
            Err(err) => {
                self.failures = self.failures.saturating_add(1);
                debug!(error = %err, failures = self.failures, "thermal check skipped this cycle");
                None
            }
        }
    }

    pub async fn check(&mut self, host: &dyn HostProbe, limit: Duration) -> Option<PressureSignal> {
        if !self.enabled {
            return None;
        }
        let reading = bounded(limit, host.thermal_state()).await;
        let signal = self.evaluate(reading);
        if signal == Some(PressureSignal::Thermal) {
            warn!("thermal throttling detected");
        }
        signal
    }

    pub fn is_throttled(&self) -> bool {
        self.throttled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn memory_fires_above_threshold_only() {
        let mut monitor = MemoryMonitor::new(0.85);
        assert_eq!(monitor.evaluate(Ok(Some(0.50))), None);
        assert_eq!(monitor.evaluate(Ok(Some(0.85))), None);
        assert_eq!(
            monitor.evaluate(Ok(Some(0.90))),
            Some(PressureSignal::Memory { ratio: 0.90 })
        );
        assert_eq!(monitor.last_ratio(), Some(0.90));
    }

    #[test]
    fn missing_or_failed_memory_api_never_fires() {
        let mut monitor = MemoryMonitor::new(0.85);
        assert_eq!(monitor.evaluate(Ok(None)), None);
        assert_eq!(
            monitor.evaluate(Err(ProbeError::TransientMonitorFailure("boom".into()))),
            None
        );
        assert_eq!(monitor.evaluate(Ok(Some(f64::NAN))), None);
        assert_eq!(monitor.failures(), 1);
    }

    #[test]
    fn thermal_is_mobile_only() {
        let mut desktop = ThermalMonitor::new(false);
        assert!(!desktop.is_enabled());
        assert_eq!(desktop.evaluate(Ok(Some(ThermalHint::Throttled))), None);
    }

    #[test]
    fn thermal_fires_and_clears() {
        let mut monitor = ThermalMonitor::new(true);
        assert_eq!(monitor.evaluate(Ok(Some(ThermalHint::Nominal))), None);
        assert_eq!(
            monitor.evaluate(Ok(Some(ThermalHint::Throttled))),
            Some(PressureSignal::Thermal)
        );
        assert!(monitor.is_throttled());
        assert_eq!(
            monitor.evaluate(Ok(Some(ThermalHint::Throttled))),
            Some(PressureSignal::Thermal)
        );
        assert_eq!(
            monitor.evaluate(Ok(Some(ThermalHint::Nominal))),
            Some(PressureSignal::ThermalCleared)
        );
        assert_eq!(monitor.evaluate(Ok(Some(ThermalHint::Nominal))), None);
        assert_eq!(monitor.evaluate(Err(ProbeError::Timeout)), None);
    }

    struct HotHeap {
        gc_requested: AtomicBool,
    }

    #[async_trait]
    impl HostProbe for HotHeap {
        async fn heap_usage_ratio(&self) -> Result<Option<f64>, ProbeError> {
            Ok(Some(0.95))
        }

        async fn thermal_state(&self) -> Result<Option<ThermalHint>, ProbeError> {
            Err(ProbeError::CapabilityUnavailable("thermal"))
        }

        fn request_gc(&self) -> bool {
            self.gc_requested.store(true, Ordering::SeqCst);
            true
        }
    }

    #[tokio::test]
    async fn memory_check_requests_gc_hint() {
        let host = HotHeap {
            gc_requested: AtomicBool::new(false),
        };
        let mut monitor = MemoryMonitor::new(0.85);
        let signal = monitor.check(&host, Duration::from_millis(100)).await;
        assert_eq!(signal, Some(PressureSignal::Memory { ratio: 0.95 }));
        assert!(host.gc_requested.load(Ordering::SeqCst));

        let mut thermal = ThermalMonitor::new(true);
        assert_eq!(thermal.check(&host, Duration::from_millis(100)).await, None);
    }

    #[tokio::test]
    async fn absent_host_apis_are_silent() {
        let mut memory = MemoryMonitor::new(0.85);
        let mut thermal = ThermalMonitor::new(true);
        assert_eq!(memory.check(&NoHostProbe, Duration::from_millis(10)).await, None);
        assert_eq!(thermal.check(&NoHostProbe, Duration::from_millis(10)).await, None);
    }
}
