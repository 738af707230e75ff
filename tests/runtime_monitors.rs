use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use orbit_quality::{
    ControllerEvent, HostHints, HostProbe, NoHostProbe, PerformanceTier, PressureSignal,
    ProbeError, QualityConfig, QualityRuntime, RuntimeError, ThermalHint,
};

/// Host whose pressure readings are set by the test.
#[derive(Default)]
struct ScriptedHost {
    heap: Mutex<Option<f64>>,
    thermal: Mutex<Option<ThermalHint>>,
    heap_delay: Duration,
    heap_calls: AtomicUsize,
    thermal_calls: AtomicUsize,
    gc_requests: AtomicUsize,
}

impl ScriptedHost {
    fn with_heap(ratio: f64) -> Self {
        let host = Self::default();
        *host.heap.lock().unwrap() = Some(ratio);
        host
    }
}

#[async_trait]
impl HostProbe for ScriptedHost {
    async fn heap_usage_ratio(&self) -> Result<Option<f64>, ProbeError> {
        self.heap_calls.fetch_add(1, Ordering::SeqCst);
        if !self.heap_delay.is_zero() {
            tokio::time::sleep(self.heap_delay).await;
        }
        Ok(*self.heap.lock().unwrap())
    }

    async fn thermal_state(&self) -> Result<Option<ThermalHint>, ProbeError> {
        self.thermal_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.thermal.lock().unwrap())
    }

    fn request_gc(&self) -> bool {
        self.gc_requests.fetch_add(1, Ordering::SeqCst);
        true
    }
}

fn desktop() -> HostHints {
    HostHints {
        memory_gb: Some(8.0),
        logical_cores: Some(8),
        is_mobile: Some(false),
        device_pixel_ratio: Some(1.0),
    }
}

fn phone() -> HostHints {
    HostHints {
        memory_gb: Some(4.0),
        logical_cores: Some(4),
        is_mobile: Some(true),
        device_pixel_ratio: Some(3.0),
    }
}

#[tokio::test(start_paused = true)]
async fn memory_pressure_steps_down_on_next_frame() {
    let host = Arc::new(ScriptedHost::with_heap(0.9));
    let runtime = QualityRuntime::start(QualityConfig::default(), &desktop(), host.clone(), None)
        .expect("runtime");
    assert_eq!(runtime.capabilities().tier, PerformanceTier::High);
    assert_eq!(runtime.controller().rank(), 3);
    assert!(runtime.on_frame(Duration::ZERO).is_none());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(host.heap_calls.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(host.heap_calls.load(Ordering::SeqCst), 1);
    assert_eq!(host.gc_requests.load(Ordering::SeqCst), 1);

    let event = runtime.on_frame(Duration::from_millis(16));
    assert_eq!(
        event,
        Some(ControllerEvent::PressureDowngrade {
            from: 3,
            to: 2,
            signal: PressureSignal::Memory { ratio: 0.9 },
        })
    );
    assert_eq!(runtime.settings().current().level.name, "medium");
    assert_eq!(runtime.controller().snapshot().memory_ratio, Some(0.9));
}

#[tokio::test(start_paused = true)]
async fn desktop_never_polls_thermal_state() {
    let host = Arc::new(ScriptedHost::default());
    *host.thermal.lock().unwrap() = Some(ThermalHint::Throttled);
    let runtime = QualityRuntime::start(QualityConfig::default(), &desktop(), host.clone(), None)
        .expect("runtime");

    tokio::time::sleep(Duration::from_secs(95)).await;
    assert_eq!(host.thermal_calls.load(Ordering::SeqCst), 0);
    assert_eq!(host.heap_calls.load(Ordering::SeqCst), 9);
    assert!(runtime.on_frame(Duration::ZERO).is_none());
    assert_eq!(runtime.controller().rank(), 3);
}

#[tokio::test(start_paused = true)]
async fn thermal_throttling_on_mobile_steps_down_and_blocks_upgrades() {
    let host = Arc::new(ScriptedHost::default());
    *host.thermal.lock().unwrap() = Some(ThermalHint::Throttled);
    let runtime = QualityRuntime::start(QualityConfig::default(), &phone(), host.clone(), None)
        .expect("runtime");
    assert_eq!(runtime.controller().rank(), 2);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(host.thermal_calls.load(Ordering::SeqCst), 1);
    let event = runtime.on_frame(Duration::ZERO);
    assert_eq!(
        event,
        Some(ControllerEvent::PressureDowngrade {
            from: 2,
            to: 1,
            signal: PressureSignal::Thermal,
        })
    );
    assert!(runtime.controller().state().thermal_throttled);

    *host.thermal.lock().unwrap() = Some(ThermalHint::Nominal);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(!runtime.controller().state().thermal_throttled);
    assert!(runtime.on_frame(Duration::from_millis(16)).is_none());
    assert_eq!(runtime.controller().rank(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_probe_times_out_without_signal() {
    let host = Arc::new(ScriptedHost {
        heap_delay: Duration::from_secs(5),
        ..ScriptedHost::with_heap(0.99)
    });
    let runtime = QualityRuntime::start(QualityConfig::default(), &desktop(), host.clone(), None)
        .expect("runtime");

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert!(host.heap_calls.load(Ordering::SeqCst) >= 2);
    assert_eq!(host.gc_requests.load(Ordering::SeqCst), 0);
    assert!(runtime.on_frame(Duration::ZERO).is_none());
    assert_eq!(runtime.controller().rank(), 3);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_monitors() {
    let host = Arc::new(ScriptedHost::with_heap(0.95));
    let mut runtime = QualityRuntime::start(QualityConfig::default(), &phone(), host.clone(), None)
        .expect("runtime");
    runtime.shutdown();

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(host.heap_calls.load(Ordering::SeqCst), 0);
    assert_eq!(host.thermal_calls.load(Ordering::SeqCst), 0);
    assert!(runtime.on_frame(Duration::ZERO).is_none());
    assert_eq!(runtime.controller().rank(), 2);
}

#[tokio::test]
async fn host_without_pressure_apis_only_adapts_on_fps() {
    let runtime = QualityRuntime::start(
        QualityConfig::default(),
        &HostHints::default(),
        Arc::new(NoHostProbe),
        None,
    )
    .expect("runtime");
    assert_eq!(runtime.capabilities().tier, PerformanceTier::Low);
    let rank = runtime.controller().rank();

    let mut now = Duration::ZERO;
    for _ in 0..400 {
        now += Duration::from_millis(22);
        runtime.on_frame(now);
    }
    assert_eq!(runtime.controller().rank(), rank);
}

#[test]
fn start_requires_tokio_runtime() {
    let err = QualityRuntime::start(QualityConfig::default(), &desktop(), Arc::new(NoHostProbe), None)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::NoRuntime(_)));
}

#[test]
fn start_rejects_invalid_config() {
    let mut config = QualityConfig::default();
    config.controller.reduce_below_fps = 70.0;
    let err = QualityRuntime::start(config, &desktop(), Arc::new(NoHostProbe), None).unwrap_err();
    assert!(matches!(err, RuntimeError::Config(_)));
}
