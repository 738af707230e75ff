//! Drives a quality runtime with a synthetic frame trace and prints every
//! controller event alongside the preset the renderer would apply.
use std::sync::Arc;
use std::time::Duration;

use orbit_quality::{HostHints, JsonDebugSurface, NoHostProbe, QualityConfig, QualityRuntime};

/// (frames per second, seconds) segments of the trace.
const TRACE: &[(f64, u64)] = &[(60.0, 3), (24.0, 4), (8.0, 2), (58.0, 6), (40.0, 2)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => QualityConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => QualityConfig::default(),
    };
    let surface = Arc::new(JsonDebugSurface::new());
    let mut runtime = QualityRuntime::start(
        config,
        &HostHints::from_system(),
        Arc::new(NoHostProbe),
        Some(surface.clone()),
    )?;
    println!(
        "device tier {} -> {}",
        runtime.capabilities().tier.as_str(),
        runtime.settings().current().level.name
    );

    let mut now = Duration::ZERO;
    for &(fps, seconds) in TRACE {
        let interval = Duration::from_secs_f64(1.0 / fps);
        let frames = (fps * seconds as f64).round() as u32;
        for _ in 0..frames {
            now += interval;
            if let Some(event) = runtime.on_frame(now) {
                println!(
                    "{:>7.3}s  {:<18} level={}",
                    now.as_secs_f64(),
                    event.as_str(),
                    runtime.settings().current().level.name
                );
            }
        }
    }

    if let Some(json) = surface.latest() {
        println!("debug: {json}");
    }
    runtime.shutdown();
    Ok(())
}
