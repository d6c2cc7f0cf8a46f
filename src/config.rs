use std::path::Path;

use sc_rendering::{CacheConfig, DirtyRegionConfig};
use sc_settings::RenderSettings;

use crate::memory::MemoryConfig;

/// 重绘调度器配置
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub dirty: DirtyRegionConfig,
    /// 对象级位图缓存的预算与淘汰权重
    pub cache: CacheConfig,
    /// 对象缓存的代价阈值
    pub object_cache_threshold: f32,
    /// 绘图对象数量超过该值时考虑整场景缓存
    pub scene_threshold: usize,
    pub memory: MemoryConfig,
    /// 每次预热任务最多排队的对象数
    pub prewarm_max_count: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_settings(&RenderSettings::default())
    }
}

impl OrchestratorConfig {
    /// 从设置构建，越界的值会被修正
    pub fn from_settings(settings: &RenderSettings) -> Self {
        let s = settings.normalized();
        Self {
            dirty: DirtyRegionConfig {
                padding: s.dirty_padding,
                min_area: s.dirty_min_area,
                merge_threshold: s.merge_threshold,
                max_rects: s.max_dirty_rects,
                full_redraw_ratio: s.full_redraw_ratio,
            },
            cache: CacheConfig {
                max_entries: s.cache_max_entries,
                max_bytes: s.cache_max_bytes,
                ttl: s.cache_ttl(),
                sweep_interval: s.cache_sweep_interval(),
                recency_weight: s.recency_weight,
                complexity_weight: s.complexity_weight,
            },
            object_cache_threshold: s.object_cache_threshold,
            scene_threshold: s.scene_threshold,
            memory: MemoryConfig {
                pressure_ratio: s.memory_pressure_ratio,
                headroom_ratio: s.memory_headroom_ratio,
                sample_interval: s.memory_sample_interval(),
            },
            prewarm_max_count: s.prewarm_max_count,
        }
    }

    /// 从设置文件加载
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let settings = RenderSettings::load(path)?;
        Ok(Self::from_settings(&settings))
    }
}
