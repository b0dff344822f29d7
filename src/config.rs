use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Engine configuration
// ---------------------------------------------------------------------------

/// All tunable parameters of the engine. Every field has a default, so a
/// config file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub render: RenderConfig,
    pub cache: CacheConfig,
    pub metrics: MetricsConfig,
}

impl EngineConfig {
    /// Load a JSON config file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&text).context("parsing config JSON")?;
        Ok(config.sanitize())
    }

    /// Replace out-of-range values with defaults, logging each replacement.
    pub fn sanitize(mut self) -> Self {
        self.render.sanitize();
        if self.cache.band_capacity == 0 {
            log::warn!("band cache capacity 0 is invalid, using default");
            self.cache.band_capacity = CacheConfig::default().band_capacity;
        }
        self
    }
}

/// Orientation applied to every rendered band before display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Identity,
    /// 90° clockwise: data row `r` becomes display column `H - 1 - r`.
    Rotate90Cw,
}

/// Parameters of the band renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Cubes with exactly this many bands get the enhanced segmented view.
    pub low_band_count: usize,
    pub percentile_low: f64,
    pub percentile_high: f64,
    /// CLAHE tile grid (tiles per axis).
    pub clahe_tiles: usize,
    pub clahe_clip_limit: f64,
    pub contrast_gain: f64,
    pub brightness_offset: f64,
    pub orientation: Orientation,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            low_band_count: 10,
            percentile_low: 1.0,
            percentile_high: 99.0,
            clahe_tiles: 8,
            clahe_clip_limit: 3.0,
            contrast_gain: 2.0,
            brightness_offset: 30.0,
            orientation: Orientation::Identity,
        }
    }
}

impl RenderConfig {
    fn sanitize(&mut self) {
        let defaults = RenderConfig::default();
        let valid_pct = |p: f64| (0.0..=100.0).contains(&p);
        if !valid_pct(self.percentile_low)
            || !valid_pct(self.percentile_high)
            || self.percentile_low >= self.percentile_high
        {
            log::warn!(
                "invalid percentile window [{}, {}], using defaults",
                self.percentile_low,
                self.percentile_high
            );
            self.percentile_low = defaults.percentile_low;
            self.percentile_high = defaults.percentile_high;
        }
        if self.clahe_tiles == 0 {
            log::warn!("clahe_tiles must be positive, using default");
            self.clahe_tiles = defaults.clahe_tiles;
        }
        if !(self.clahe_clip_limit.is_finite() && self.clahe_clip_limit > 0.0) {
            log::warn!("clahe_clip_limit must be positive, using default");
            self.clahe_clip_limit = defaults.clahe_clip_limit;
        }
    }
}

/// Cache sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub band_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { band_capacity: 10 }
    }
}

/// Edge detector thresholds used by the boundary smoothness metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub canny_low: f64,
    pub canny_high: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            canny_low: 100.0,
            canny_high: 200.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"render": {"contrast_gain": 1.5, "orientation": "rotate90_cw"}}"#)
                .unwrap();
        assert_eq!(cfg.render.contrast_gain, 1.5);
        assert_eq!(cfg.render.orientation, Orientation::Rotate90Cw);
        assert_eq!(cfg.render.clahe_tiles, 8);
        assert_eq!(cfg.cache.band_capacity, 10);
        assert_eq!(cfg.metrics.canny_high, 200.0);
    }

    #[test]
    fn sanitize_restores_bad_values() {
        let mut cfg = EngineConfig::default();
        cfg.render.percentile_low = 80.0;
        cfg.render.percentile_high = 20.0;
        cfg.cache.band_capacity = 0;
        let cfg = cfg.sanitize();
        assert_eq!(cfg.render.percentile_low, 1.0);
        assert_eq!(cfg.render.percentile_high, 99.0);
        assert_eq!(cfg.cache.band_capacity, 10);
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"cache": {"band_capacity": 4}}"#).unwrap();
        let cfg = EngineConfig::from_path(&path).unwrap();
        assert_eq!(cfg.cache.band_capacity, 4);
    }
}
