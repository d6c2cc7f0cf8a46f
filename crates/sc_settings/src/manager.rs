use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::RenderSettings;

/// Unified config manager.
///
/// Holds one shared settings snapshot; readers clone it, writers replace it.
pub struct ConfigManager {
    settings: Arc<RwLock<RenderSettings>>,
    path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager backed by the default settings file.
    pub fn new() -> Self {
        Self::with_path(RenderSettings::default_path())
    }

    /// Create a config manager backed by `path` (loads once and caches).
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            settings: Arc::new(RwLock::new(RenderSettings::load_or_default(&path))),
            path,
        }
    }

    /// Create a config manager from in-memory settings.
    pub fn from_settings(settings: RenderSettings) -> Self {
        Self {
            settings: Arc::new(RwLock::new(settings)),
            path: RenderSettings::default_path(),
        }
    }

    /// Get a snapshot copy of current settings.
    pub fn get(&self) -> RenderSettings {
        self.settings.read().clone()
    }

    /// Get the shared settings reference.
    pub fn get_shared(&self) -> Arc<RwLock<RenderSettings>> {
        Arc::clone(&self.settings)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply a change to the shared settings.
    pub fn update<F>(&self, change: F)
    where
        F: FnOnce(&mut RenderSettings),
    {
        change(&mut self.settings.write());
    }

    /// Reload settings from disk.
    pub fn reload(&self) {
        let new_settings = RenderSettings::load_or_default(&self.path);
        *self.settings.write() = new_settings;
    }

    /// Persist current settings.
    pub fn save(&self) -> anyhow::Result<()> {
        self.get().save(&self.path)
    }

    // Convenience accessors.

    #[inline]
    pub fn scene_threshold(&self) -> usize {
        self.settings.read().scene_threshold
    }

    #[inline]
    pub fn object_cache_threshold(&self) -> f32 {
        self.settings.read().object_cache_threshold
    }

    #[inline]
    pub fn merge_threshold(&self) -> f32 {
        self.settings.read().merge_threshold
    }

    #[inline]
    pub fn eviction_weights(&self) -> (f32, f32) {
        let s = self.settings.read();
        (s.recency_weight, s.complexity_weight)
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
