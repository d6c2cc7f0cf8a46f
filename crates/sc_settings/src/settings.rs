use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::defaults::*;

/// Render pipeline settings.
///
/// Every field has a serde default, so a partial (or empty) JSON object loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    // Dirty region tracking
    #[serde(default = "default_dirty_padding")]
    pub dirty_padding: f32,
    #[serde(default = "default_dirty_min_area")]
    pub dirty_min_area: f32,
    #[serde(default = "default_merge_threshold")]
    pub merge_threshold: f32,
    #[serde(default = "default_max_dirty_rects")]
    pub max_dirty_rects: usize,
    #[serde(default = "default_full_redraw_ratio")]
    pub full_redraw_ratio: f32,

    // Entry cache
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    #[serde(default = "default_cache_max_bytes")]
    pub cache_max_bytes: usize,
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: Option<u64>,
    #[serde(default = "default_cache_sweep_interval_ms")]
    pub cache_sweep_interval_ms: u64,
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f32,
    #[serde(default = "default_complexity_weight")]
    pub complexity_weight: f32,

    /// Minimum render cost before a drawable gets its own bitmap.
    #[serde(default = "default_object_cache_threshold")]
    pub object_cache_threshold: f32,
    /// Drawable count above which the whole-scene bitmap is used.
    #[serde(default = "default_scene_threshold")]
    pub scene_threshold: usize,

    // Memory sampling
    #[serde(default = "default_memory_pressure_ratio")]
    pub memory_pressure_ratio: f32,
    #[serde(default = "default_memory_headroom_ratio")]
    pub memory_headroom_ratio: f32,
    #[serde(default = "default_memory_sample_interval_ms")]
    pub memory_sample_interval_ms: u64,

    #[serde(default = "default_prewarm_max_count")]
    pub prewarm_max_count: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            dirty_padding: default_dirty_padding(),
            dirty_min_area: default_dirty_min_area(),
            merge_threshold: default_merge_threshold(),
            max_dirty_rects: default_max_dirty_rects(),
            full_redraw_ratio: default_full_redraw_ratio(),

            cache_max_entries: default_cache_max_entries(),
            cache_max_bytes: default_cache_max_bytes(),
            cache_ttl_ms: default_cache_ttl_ms(),
            cache_sweep_interval_ms: default_cache_sweep_interval_ms(),
            recency_weight: default_recency_weight(),
            complexity_weight: default_complexity_weight(),

            object_cache_threshold: default_object_cache_threshold(),
            scene_threshold: default_scene_threshold(),

            memory_pressure_ratio: default_memory_pressure_ratio(),
            memory_headroom_ratio: default_memory_headroom_ratio(),
            memory_sample_interval_ms: default_memory_sample_interval_ms(),

            prewarm_max_count: default_prewarm_max_count(),
        }
    }
}

impl RenderSettings {
    /// Default location of the settings file.
    pub fn default_path() -> PathBuf {
        let base = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        base.join(".sc_canvas").join("render_settings.json")
    }

    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings = serde_json::from_str::<RenderSettings>(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(settings)
    }

    /// Load settings, falling back to defaults if the file is missing or invalid.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!(error = %err, "using default render settings");
                Self::default()
            }
        }
    }

    /// Save settings to disk.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Copy with out-of-range values replaced by the nearest valid value.
    pub fn normalized(&self) -> Self {
        let defaults = Self::default();
        let non_negative = |v: f32, fallback: f32| {
            if v.is_finite() { v.max(0.0) } else { fallback }
        };
        let ratio = |v: f32, fallback: f32| {
            if v.is_finite() { v.clamp(0.0, 1.0) } else { fallback }
        };

        let memory_pressure_ratio =
            ratio(self.memory_pressure_ratio, defaults.memory_pressure_ratio);
        Self {
            dirty_padding: non_negative(self.dirty_padding, defaults.dirty_padding),
            dirty_min_area: non_negative(self.dirty_min_area, defaults.dirty_min_area),
            merge_threshold: non_negative(self.merge_threshold, defaults.merge_threshold),
            max_dirty_rects: self.max_dirty_rects.max(1),
            full_redraw_ratio: ratio(self.full_redraw_ratio, defaults.full_redraw_ratio),

            cache_max_entries: self.cache_max_entries.max(1),
            cache_max_bytes: self.cache_max_bytes,
            cache_ttl_ms: self.cache_ttl_ms,
            cache_sweep_interval_ms: self.cache_sweep_interval_ms,
            recency_weight: non_negative(self.recency_weight, defaults.recency_weight),
            complexity_weight: non_negative(self.complexity_weight, defaults.complexity_weight),

            object_cache_threshold: non_negative(
                self.object_cache_threshold,
                defaults.object_cache_threshold,
            ),
            scene_threshold: self.scene_threshold,

            memory_pressure_ratio,
            // Headroom must not sit above the pressure threshold.
            memory_headroom_ratio: ratio(self.memory_headroom_ratio, defaults.memory_headroom_ratio)
                .min(memory_pressure_ratio),
            memory_sample_interval_ms: self.memory_sample_interval_ms,

            prewarm_max_count: self.prewarm_max_count,
        }
    }

    #[inline]
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_ms.map(Duration::from_millis)
    }

    #[inline]
    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.cache_sweep_interval_ms)
    }

    #[inline]
    pub fn memory_sample_interval(&self) -> Duration {
        Duration::from_millis(self.memory_sample_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("sc_settings_test_{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: RenderSettings =
            serde_json::from_str(r#"{ "merge_threshold": 5.0, "scene_threshold": 10 }"#).unwrap();
        assert_eq!(settings.merge_threshold, 5.0);
        assert_eq!(settings.scene_threshold, 10);
        assert_eq!(settings.dirty_padding, default_dirty_padding());
        assert_eq!(settings.cache_ttl_ms, Some(120_000));
    }

    #[test]
    fn test_null_ttl_disables_expiry() {
        let settings: RenderSettings = serde_json::from_str(r#"{ "cache_ttl_ms": null }"#).unwrap();
        assert_eq!(settings.cache_ttl(), None);
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_path("save_then_load.json");
        let settings = RenderSettings {
            recency_weight: 0.0,
            prewarm_max_count: 3,
            ..RenderSettings::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(RenderSettings::load(&path).unwrap(), settings);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_or_default_on_missing_and_invalid() {
        let missing = temp_path("does_not_exist.json");
        assert_eq!(RenderSettings::load_or_default(&missing), RenderSettings::default());

        let invalid = temp_path("invalid.json");
        fs::create_dir_all(invalid.parent().unwrap()).unwrap();
        fs::write(&invalid, "{ not json").unwrap();
        assert!(RenderSettings::load(&invalid).is_err());
        assert_eq!(RenderSettings::load_or_default(&invalid), RenderSettings::default());
        let _ = fs::remove_file(&invalid);
    }

    #[test]
    fn test_normalized_clamps_values() {
        let settings = RenderSettings {
            dirty_padding: -3.0,
            full_redraw_ratio: 4.0,
            max_dirty_rects: 0,
            recency_weight: f32::NAN,
            memory_pressure_ratio: 0.5,
            memory_headroom_ratio: 0.9,
            ..RenderSettings::default()
        }
        .normalized();
        assert_eq!(settings.dirty_padding, 0.0);
        assert_eq!(settings.full_redraw_ratio, 1.0);
        assert_eq!(settings.max_dirty_rects, 1);
        assert_eq!(settings.recency_weight, default_recency_weight());
        assert_eq!(settings.memory_headroom_ratio, 0.5);
    }
}
