//! Quality level presets and the ordered table the controller steps through.
//!
//! A table is validated once at construction: it must be non-empty and every
//! cost field must be non-decreasing from rank to rank, so stepping up always
//! adds fidelity and stepping down always sheds load.
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::device::PerformanceTier;

/// Error produced when a quality table fails validation or a rank lookup misses.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LevelError {
    #[error("rank {rank} is outside the quality table (0..{len})")]
    OutOfRange { rank: usize, len: usize },
    #[error("quality table must contain at least one level")]
    EmptyTable,
    #[error("level at rank {rank} is cheaper than its predecessor in `{field}`")]
    NonMonotonic { rank: usize, field: &'static str },
}

/// One immutable rendering preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityLevel {
    pub name: String,
    /// Sphere segment count used for planet geometry.
    pub geometry_detail: u32,
    pub particle_count: u32,
    pub shadow_map_size: u32,
    pub max_lights: u32,
    pub pixel_ratio_cap: f32,
    pub atmosphere: bool,
    pub rings: bool,
    pub shadows: bool,
}

/// Partial update merged into a [`QualityLevel`]; `None` keeps the existing value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityPatch {
    pub name: Option<String>,
    pub geometry_detail: Option<u32>,
    pub particle_count: Option<u32>,
    pub shadow_map_size: Option<u32>,
    pub max_lights: Option<u32>,
    pub pixel_ratio_cap: Option<f32>,
    pub atmosphere: Option<bool>,
    pub rings: Option<bool>,
    pub shadows: Option<bool>,
}

impl QualityLevel {
    /// Returns a copy with every `Some` field of `patch` applied.
    #[must_use]
    pub fn patched(&self, patch: &QualityPatch) -> Self {
        Self {
            name: patch.name.clone().unwrap_or_else(|| self.name.clone()),
            geometry_detail: patch.geometry_detail.unwrap_or(self.geometry_detail),
            particle_count: patch.particle_count.unwrap_or(self.particle_count),
            shadow_map_size: patch.shadow_map_size.unwrap_or(self.shadow_map_size),
            max_lights: patch.max_lights.unwrap_or(self.max_lights),
            pixel_ratio_cap: patch.pixel_ratio_cap.unwrap_or(self.pixel_ratio_cap),
            atmosphere: patch.atmosphere.unwrap_or(self.atmosphere),
            rings: patch.rings.unwrap_or(self.rings),
            shadows: patch.shadows.unwrap_or(self.shadows),
        }
    }

    /// First cost field in which `self` is cheaper than `prev`, if any.
    fn cheaper_field_than(&self, prev: &QualityLevel) -> Option<&'static str> {
        if self.geometry_detail < prev.geometry_detail {
            return Some("geometry_detail");
        }
        if self.particle_count < prev.particle_count {
            return Some("particle_count");
        }
        if self.shadow_map_size < prev.shadow_map_size {
            return Some("shadow_map_size");
        }
        if self.max_lights < prev.max_lights {
            return Some("max_lights");
        }
        if self.pixel_ratio_cap < prev.pixel_ratio_cap {
            return Some("pixel_ratio_cap");
        }
        if !self.atmosphere && prev.atmosphere {
            return Some("atmosphere");
        }
        if !self.rings && prev.rings {
            return Some("rings");
        }
        if !self.shadows && prev.shadows {
            return Some("shadows");
        }
        None
    }
}

/// Validated, ordered sequence of quality levels. Rank 0 is the most degraded.
#[derive(Debug, Clone)]
pub struct QualityTable {
    levels: Vec<QualityLevel>,
    config_id: String,
}

impl QualityTable {
    /// Validates and freezes `levels`.
    ///
    /// # Errors
    /// `EmptyTable` for an empty list, `NonMonotonic` when any rank is cheaper
    /// than its predecessor in some cost field.
    pub fn new(levels: Vec<QualityLevel>) -> Result<Self, LevelError> {
        if levels.is_empty() {
            return Err(LevelError::EmptyTable);
        }
        for (rank, pair) in levels.windows(2).enumerate() {
            if let Some(field) = pair[1].cheaper_field_than(&pair[0]) {
                return Err(LevelError::NonMonotonic {
                    rank: rank + 1,
                    field,
                });
            }
        }
        let config_id = fingerprint(&levels);
        Ok(Self { levels, config_id })
    }

    /// The five stock presets: ultra-low, low, medium, high, ultra.
    pub fn canonical() -> Self {
        let levels = canonical_levels();
        let config_id = fingerprint(&levels);
        Self { levels, config_id }
    }

    pub fn levels(&self) -> &[QualityLevel] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn max_rank(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn level_at(&self, rank: usize) -> Result<&QualityLevel, LevelError> {
        self.levels.get(rank).ok_or(LevelError::OutOfRange {
            rank,
            len: self.levels.len(),
        })
    }

    /// Clamps an arbitrary (possibly negative) rank into `[0, N-1]`.
    pub fn clamp_rank(&self, rank: i64) -> usize {
        rank.clamp(0, self.max_rank() as i64) as usize
    }

    /// Level at the clamped rank; never fails.
    pub fn level_clamped(&self, rank: i64) -> &QualityLevel {
        &self.levels[self.clamp_rank(rank)]
    }

    /// Starting rank for a device tier, scaled to the table size.
    pub fn rank_for_tier(&self, tier: PerformanceTier) -> usize {
        let ordinal = tier.ordinal() as f64;
        let rank = (ordinal * self.max_rank() as f64 / 4.0).round() as i64;
        self.clamp_rank(rank)
    }

    /// Returns a revalidated table with `patch` applied at `rank`.
    ///
    /// # Errors
    /// `OutOfRange` for a bad rank, `NonMonotonic` if the patch breaks ordering.
    pub fn with_patch(&self, rank: usize, patch: &QualityPatch) -> Result<Self, LevelError> {
        let current = self.level_at(rank)?;
        let mut levels = self.levels.clone();
        levels[rank] = current.patched(patch);
        Self::new(levels)
    }

    /// Stable SHA-256 identifier of the table contents.
    pub fn config_id(&self) -> &str {
        &self.config_id
    }
}

impl Default for QualityTable {
    fn default() -> Self {
        Self::canonical()
    }
}

pub(crate) fn canonical_levels() -> Vec<QualityLevel> {
    vec![
        QualityLevel {
            name: "ultra-low".into(),
            geometry_detail: 8,
            particle_count: 500,
            shadow_map_size: 0,
            max_lights: 1,
            pixel_ratio_cap: 0.75,
            atmosphere: false,
            rings: false,
            shadows: false,
        },
        QualityLevel {
            name: "low".into(),
            geometry_detail: 16,
            particle_count: 2_000,
            shadow_map_size: 512,
            max_lights: 2,
            pixel_ratio_cap: 1.0,
            atmosphere: false,
            rings: true,
            shadows: false,
        },
        QualityLevel {
            name: "medium".into(),
            geometry_detail: 32,
            particle_count: 5_000,
            shadow_map_size: 1024,
            max_lights: 4,
            pixel_ratio_cap: 1.5,
            atmosphere: true,
            rings: true,
            shadows: true,
        },
        QualityLevel {
            name: "high".into(),
            geometry_detail: 64,
            particle_count: 10_000,
            shadow_map_size: 2048,
            max_lights: 6,
            pixel_ratio_cap: 2.0,
            atmosphere: true,
            rings: true,
            shadows: true,
        },
        QualityLevel {
            name: "ultra".into(),
            geometry_detail: 128,
            particle_count: 20_000,
            shadow_map_size: 4096,
            max_lights: 8,
            pixel_ratio_cap: 3.0,
            atmosphere: true,
            rings: true,
            shadows: true,
        },
    ]
}

fn fingerprint(levels: &[QualityLevel]) -> String {
    let mut hasher = Sha256::new();
    for level in levels {
        hasher.update(level.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(level.geometry_detail.to_le_bytes());
        hasher.update(level.particle_count.to_le_bytes());
        hasher.update(level.shadow_map_size.to_le_bytes());
        hasher.update(level.max_lights.to_le_bytes());
        hasher.update(level.pixel_ratio_cap.to_le_bytes());
        hasher.update([
            level.atmosphere as u8,
            level.rings as u8,
            level.shadows as u8,
        ]);
    }
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{:02x}", byte)).collect()
}
