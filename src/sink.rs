//! Boundary between the controller and its consumers.
//!
//! The renderer receives presets through [`SettingsSink`]; debug overlays get
//! a read-only [`DebugSnapshot`] through [`DebugSurface`]. Neither can push
//! anything back into the controller.
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::levels::QualityLevel;

/// Receives the active preset. Failures inside the renderer stay there.
///
/// The controller calls in only after releasing its own lock, so an
/// implementation may query the controller from inside these methods.
pub trait SettingsSink: Send + Sync {
    /// Applies `level` to the next rendered frame. Must be idempotent.
    fn publish(&self, level: &QualityLevel);

    /// Pauses or resumes scene animation (off while in emergency mode).
    fn set_animation_enabled(&self, _enabled: bool) {}

    /// Caps the animation frame rate; `None` removes the cap.
    fn set_frame_rate_cap(&self, _cap: Option<u32>) {}
}

/// Everything the renderer should currently apply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedSettings {
    pub level: QualityLevel,
    pub animation_enabled: bool,
    pub frame_rate_cap: Option<u32>,
    /// Bumped on every change so readers can cheaply detect updates.
    pub revision: u64,
}

/// Single-writer, many-reader published snapshot of the applied settings.
///
/// Readers clone an `Arc` and never hold the lock while rendering.
#[derive(Debug, Clone)]
pub struct SharedSettings {
    current: Arc<RwLock<Arc<AppliedSettings>>>,
}

impl SharedSettings {
    pub fn new(initial: QualityLevel) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(AppliedSettings {
                level: initial,
                animation_enabled: true,
                frame_rate_cap: None,
                revision: 0,
            }))),
        }
    }

    pub fn current(&self) -> Arc<AppliedSettings> {
        self.current.read().clone()
    }

    fn update(&self, apply: impl FnOnce(&mut AppliedSettings) -> bool) {
        let mut guard = self.current.write();
        let mut next = AppliedSettings::clone(&guard);
        if apply(&mut next) {
            next.revision = next.revision.wrapping_add(1);
            *guard = Arc::new(next);
        }
    }
}

impl SettingsSink for SharedSettings {
    fn publish(&self, level: &QualityLevel) {
        self.update(|s| {
            if s.level == *level {
                return false;
            }
            s.level = level.clone();
            true
        });
    }

    fn set_animation_enabled(&self, enabled: bool) {
        self.update(|s| std::mem::replace(&mut s.animation_enabled, enabled) != enabled);
    }

    fn set_frame_rate_cap(&self, cap: Option<u32>) {
        self.update(|s| std::mem::replace(&mut s.frame_rate_cap, cap) != cap);
    }
}

/// Read-only view for debug overlays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugSnapshot {
    pub fps: f64,
    pub rank: usize,
    pub level: String,
    pub emergency: bool,
    pub thermal_throttled: bool,
    pub suspended: bool,
    pub memory_ratio: Option<f64>,
    pub config_id: String,
}

/// Called outside the controller lock, like [`SettingsSink`].
pub trait DebugSurface: Send + Sync {
    fn show(&self, snapshot: &DebugSnapshot);
}

/// Keeps the most recent snapshot serialized as JSON for an overlay to poll.
#[derive(Debug, Default)]
pub struct JsonDebugSurface {
    latest: parking_lot::Mutex<Option<String>>,
}

impl JsonDebugSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<String> {
        self.latest.lock().clone()
    }
}

impl DebugSurface for JsonDebugSurface {
    fn show(&self, snapshot: &DebugSnapshot) {
        match serde_json::to_string(snapshot) {
            Ok(json) => *self.latest.lock() = Some(json),
            Err(err) => tracing::debug!(error = %err, "debug snapshot not serializable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::QualityTable;

    #[test]
    fn publish_is_idempotent() {
        let table = QualityTable::canonical();
        let shared = SharedSettings::new(table.level_at(2).unwrap().clone());
        let reader = shared.clone();
        assert_eq!(reader.current().revision, 0);

        shared.publish(table.level_at(2).unwrap());
        assert_eq!(reader.current().revision, 0);

        shared.publish(table.level_at(1).unwrap());
        let now = reader.current();
        assert_eq!(now.revision, 1);
        assert_eq!(now.level.name, "low");

        shared.publish(table.level_at(1).unwrap());
        assert_eq!(reader.current().revision, 1);
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let table = QualityTable::canonical();
        let shared = SharedSettings::new(table.level_at(3).unwrap().clone());
        let held = shared.current();
        shared.set_animation_enabled(false);
        shared.set_frame_rate_cap(Some(10));
        assert!(held.animation_enabled);
        let now = shared.current();
        assert!(!now.animation_enabled);
        assert_eq!(now.frame_rate_cap, Some(10));
        assert_eq!(now.revision, 2);
    }

    #[test]
    fn json_surface_keeps_latest_snapshot() {
        let surface = JsonDebugSurface::new();
        assert!(surface.latest().is_none());
        surface.show(&DebugSnapshot {
            fps: 59.5,
            rank: 3,
            level: "high".into(),
            emergency: false,
            thermal_throttled: false,
            suspended: false,
            memory_ratio: Some(0.4),
            config_id: "abc".into(),
        });
        let json = surface.latest().unwrap();
        assert!(json.contains("\"rank\":3"));
        assert!(json.contains("\"level\":\"high\""));
    }
}
