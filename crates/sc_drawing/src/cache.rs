use std::sync::Arc;
use std::time::Instant;

use sc_rendering::{
    CacheConfig, Clock, DrawableId, EntryCache, EntryCacheStats, EntryMeta, Rectangle, Surface,
    SystemClock,
};

use crate::element::{CostMemo, Drawable};
use crate::render::{DrawableRenderer, RenderError};

/// 对象级位图缓存
///
/// 为渲染代价高的绘图对象保存位图（包围盒与可见区域的交集），以对象 ID 为键：
/// - 统一的失效策略（对象修改后调用 `invalidate`）
/// - 数量/字节预算和淘汰由 `EntryCache` 负责
/// - 空闲时可预热
pub struct ObjectRenderCache {
    entries: EntryCache<DrawableId, Arc<Surface>>,
    costs: CostMemo,
    /// 代价阈值，低于该值的对象直接绘制
    threshold: f32,
    clock: Arc<dyn Clock>,
}

/// 预热参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrewarmOptions {
    /// 本次最多渲染的对象数
    pub max_count: usize,
    /// 空闲截止时间，到期后立即停止
    pub deadline: Option<Instant>,
}

impl Default for PrewarmOptions {
    fn default() -> Self {
        Self {
            max_count: 32,
            deadline: None,
        }
    }
}

/// 缓存统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ObjectCacheStats {
    pub entries: EntryCacheStats,
    /// 代价估算次数
    pub cost_computations: u64,
    pub threshold: f32,
}

impl std::fmt::Display for ObjectCacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ObjectRenderCache: entries={}, bytes={}, hits={}, misses={}, evictions={}, rate={:.1}%",
            self.entries.entries,
            self.entries.bytes,
            self.entries.hits,
            self.entries.misses,
            self.entries.evictions,
            self.entries.hit_rate() * 100.0
        )
    }
}

impl Default for ObjectRenderCache {
    fn default() -> Self {
        Self::new(CacheConfig::default(), Self::DEFAULT_THRESHOLD)
    }
}

impl ObjectRenderCache {
    /// 默认代价阈值
    pub const DEFAULT_THRESHOLD: f32 = 50.0;

    /// 创建新的对象缓存
    pub fn new(config: CacheConfig, threshold: f32) -> Self {
        Self::with_clock(config, threshold, Arc::new(SystemClock))
    }

    /// 使用指定时钟创建（测试用）
    pub fn with_clock(config: CacheConfig, threshold: f32, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: EntryCache::with_clock(config, clock.clone()),
            costs: CostMemo::new(),
            threshold: threshold.max(0.0),
            clock,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// 对象的渲染代价（按修改计数记忆）
    pub fn cost(&mut self, drawable: &Drawable) -> f32 {
        self.costs.cost(drawable)
    }

    /// 是否值得缓存
    pub fn should_cache(&mut self, drawable: &Drawable) -> bool {
        drawable.cacheable && self.costs.cost(drawable) >= self.threshold
    }

    /// 获取或创建对象位图
    ///
    /// 位图只覆盖对象包围盒与 `visible` 的交集（取整到像素），交集为空时返回
    /// `Ok(None)`。已缓存位图覆盖的区域与本次不同（画布尺寸或图层偏移变化）时重新渲染。
    /// 分配失败返回 `RenderError::Surface`，调用方应退化为直接绘制。
    pub fn get_or_create<R>(
        &mut self,
        drawable: &Drawable,
        renderer: &R,
        visible: Rectangle,
    ) -> Result<Option<Arc<Surface>>, RenderError>
    where
        R: DrawableRenderer + ?Sized,
    {
        let Some(region) = drawable.bounds().intersection(&visible) else {
            return Ok(None);
        };
        let region = region.round_out();

        if self
            .entries
            .peek(&drawable.id)
            .is_some_and(|bitmap| bitmap.bounds() != region)
        {
            self.entries.delete(&drawable.id);
        }
        if let Some(bitmap) = self.entries.get(&drawable.id) {
            return Ok(Some(Arc::clone(bitmap)));
        }

        let mut surface = Surface::for_region(region)?;
        renderer.render(&mut surface, drawable)?;

        let bitmap = Arc::new(surface);
        let meta = EntryMeta::new(self.costs.cost(drawable), bitmap.byte_size());
        self.entries.set(drawable.id, Arc::clone(&bitmap), meta);
        Ok(Some(bitmap))
    }

    /// 已缓存的位图（不计入命中统计）
    pub fn peek(&self, id: DrawableId) -> Option<&Arc<Surface>> {
        self.entries.peek(&id)
    }

    pub fn contains(&self, id: DrawableId) -> bool {
        self.entries.contains(&id)
    }

    /// 使某个对象的缓存失效
    pub fn invalidate(&mut self, id: DrawableId) {
        self.entries.delete(&id);
        self.costs.forget(id);
    }

    /// 批量失效
    pub fn invalidate_many(&mut self, ids: &[DrawableId]) {
        for &id in ids {
            self.invalidate(id);
        }
    }

    /// 清空所有位图
    pub fn clear(&mut self) {
        self.entries.clear();
        self.costs.clear();
    }

    /// 收缩到指定字节数以下，返回淘汰数量
    pub fn shrink_to(&mut self, max_bytes: usize) -> usize {
        let evicted = self.entries.shrink_to(max_bytes);
        if evicted > 0 {
            tracing::debug!(evicted, max_bytes, "object cache trimmed");
        }
        evicted
    }

    /// 移除过期位图
    pub fn sweep_expired(&mut self) -> usize {
        self.entries.sweep_expired()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 位图占用字节数
    pub fn memory_bytes(&self) -> usize {
        self.entries.total_bytes()
    }

    /// 配置的字节预算
    pub fn max_bytes(&self) -> usize {
        self.entries.config().max_bytes
    }

    pub fn stats(&self) -> ObjectCacheStats {
        ObjectCacheStats {
            entries: self.entries.stats(),
            cost_computations: self.costs.computations(),
            threshold: self.threshold,
        }
    }

    /// 重置统计计数器
    pub fn reset_stats(&mut self) {
        self.entries.reset_stats();
    }

    /// 按代价从高到低挑出尚未缓存、值得缓存的对象
    pub fn prewarm_candidates<'a>(
        &mut self,
        drawables: &[&'a Drawable],
        max_count: usize,
    ) -> Vec<&'a Drawable> {
        let mut candidates: Vec<(f32, &'a Drawable)> = Vec::new();
        for &drawable in drawables {
            if self.entries.contains(&drawable.id) || !self.should_cache(drawable) {
                continue;
            }
            candidates.push((self.costs.cost(drawable), drawable));
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
        candidates.truncate(max_count);
        candidates.into_iter().map(|(_, d)| d).collect()
    }

    /// 空闲时预热
    ///
    /// 渲染最多 `max_count` 个代价最高的候选对象，截止时间到达即停止。
    /// 单个对象失败只记录日志并跳过。返回本次新缓存的数量。
    pub fn prewarm<R>(
        &mut self,
        drawables: &[&Drawable],
        renderer: &R,
        visible: Rectangle,
        options: PrewarmOptions,
    ) -> usize
    where
        R: DrawableRenderer + ?Sized,
    {
        let candidates = self.prewarm_candidates(drawables, options.max_count);
        let mut warmed = 0;
        for drawable in candidates {
            if self.deadline_passed(options.deadline) {
                tracing::debug!(warmed, "prewarm stopped at idle deadline");
                break;
            }
            if self.prewarm_one(drawable, renderer, visible) {
                warmed += 1;
            }
        }
        warmed
    }

    /// 预热单个对象，成功缓存返回 true
    pub fn prewarm_one<R>(&mut self, drawable: &Drawable, renderer: &R, visible: Rectangle) -> bool
    where
        R: DrawableRenderer + ?Sized,
    {
        if self.entries.contains(&drawable.id) {
            return false;
        }
        match self.get_or_create(drawable, renderer, visible) {
            Ok(bitmap) => bitmap.is_some(),
            Err(err) => {
                tracing::warn!(id = drawable.id, error = %err, "prewarm skipped drawable");
                false
            }
        }
    }

    /// 截止时间是否已过
    pub fn deadline_passed(&self, deadline: Option<Instant>) -> bool {
        deadline.is_some_and(|deadline| self.clock.now() >= deadline)
    }
}
