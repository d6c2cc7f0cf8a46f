use std::fmt;

use serde::Serialize;

use crate::scope::RedrawPath;
use crate::target::ZBand;

/// 单次重绘结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RedrawReport {
    pub path: RedrawPath,
    /// 本次写入的分段目标
    pub bands: Vec<ZBand>,
    /// 完整重绘的图层数
    pub layers_rendered: usize,
    /// 合成到目标的图层数
    pub layers_composited: usize,
    /// 追加绘制的绘图对象数
    pub drawables_appended: usize,
    /// 被跳过的绘制失败数
    pub failures: usize,
    /// 是否重建了整场景位图
    pub scene_rebuilt: bool,
}

impl RedrawReport {
    pub fn new(path: RedrawPath) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }

    pub(crate) fn touch_band(&mut self, band: ZBand) {
        if !self.bands.contains(&band) {
            self.bands.push(band);
            self.bands.sort();
        }
    }
}

/// 渲染统计信息（诊断用）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderStats {
    pub object_cache_entries: usize,
    pub object_cache_bytes: usize,
    pub object_cache_hits: u64,
    pub object_cache_misses: u64,
    pub object_cache_evictions: u64,
    pub object_cache_expirations: u64,
    pub hit_rate: f64,
    pub layer_count: usize,
    pub layer_bytes: usize,
    pub layer_renders: u64,
    pub scene_active: bool,
    pub scene_bytes: usize,
    pub scene_rebuilds: u64,
    pub dirty_ratio: f32,
    /// 所有缓存位图的内存估算
    pub memory_estimate: usize,
    pub memory_ratio: f32,
    pub under_pressure: bool,
    pub redraws: u64,
    pub failures: u64,
}

impl RenderStats {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RenderStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RenderStats: objects={} ({} bytes, rate={:.1}%), layers={} ({} bytes), scene={} (rebuilds={}), dirty={:.1}%, memory={:.1}%",
            self.object_cache_entries,
            self.object_cache_bytes,
            self.hit_rate * 100.0,
            self.layer_count,
            self.layer_bytes,
            self.scene_active,
            self.scene_rebuilds,
            self.dirty_ratio * 100.0,
            self.memory_ratio * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_serialize_to_json() {
        let stats = RenderStats {
            scene_rebuilds: 2,
            ..RenderStats::default()
        };
        let json = stats.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["scene_rebuilds"], 2);
        assert_eq!(value["under_pressure"], false);
    }

    #[test]
    fn test_report_bands_sorted_and_unique() {
        let mut report = RedrawReport::new(RedrawPath::Layers);
        report.touch_band(ZBand::Top);
        report.touch_band(ZBand::Bottom);
        report.touch_band(ZBand::Top);
        assert_eq!(report.bands, vec![ZBand::Bottom, ZBand::Top]);
    }
}
