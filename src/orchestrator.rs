//! 重绘调度器
//!
//! 根据重绘范围选择复用哪些缓存、重绘哪些内容，并把结果写入分段目标：
//! - 对象级位图缓存：代价高的绘图对象只渲染一次
//! - 图层缓存：每个图层一张位图，按 z-order 合成
//! - 整场景缓存：对象数量很多且内存有余量时，用一张位图代替逐图层合成
//! - 脏区域：只重绘被标记的区域
//!
//! 单个对象或图层的失败只记录日志并跳过；只有目标获取失败会中止本次重绘，
//! 且此时不会清空任何目标。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use sc_drawing::{Drawable, DrawableRenderer, DrawableSource, ObjectRenderCache, RenderError};
use sc_rendering::{
    ClipMask, Clock, DirtyRectTracker, DrawableId, LayerCache, LayerId, LayerInfo, Point,
    Rectangle, Surface, SurfaceError, SystemClock,
};

use crate::config::OrchestratorConfig;
use crate::error::{RedrawError, RedrawResult};
use crate::memory::{MemoryMonitor, MemorySampler, PressureChange};
use crate::prewarm::{PrewarmHandle, PrewarmTask};
use crate::scope::{InvalidateTarget, RedrawPath, RedrawScope};
use crate::stats::{RedrawReport, RenderStats};
use crate::target::{SurfaceProvider, ZBand};

/// 没有同步过图层元数据时使用的隐式图层
pub const IMPLICIT_LAYER: LayerId = 0;

/// 整场景位图
#[derive(Default)]
struct SceneCache {
    surface: Option<Surface>,
    valid: bool,
    rebuilds: u64,
}

impl SceneCache {
    fn invalidate(&mut self) {
        self.valid = false;
    }

    fn byte_size(&self) -> usize {
        self.surface.as_ref().map_or(0, Surface::byte_size)
    }
}

/// 重绘调度器
pub struct RedrawOrchestrator<R, M, T> {
    renderer: R,
    targets: T,
    config: OrchestratorConfig,
    dirty: DirtyRectTracker,
    layers: LayerCache,
    objects: ObjectRenderCache,
    memory: MemoryMonitor<M>,
    scene: SceneCache,
    /// 为 true 时所有绘图对象按提交顺序属于 `IMPLICIT_LAYER`
    implicit_layer: bool,
    selected_layer: Option<LayerId>,
    /// 正在交互中、尚未提交的绘图对象
    active: Option<Drawable>,
    /// 工具覆盖层（选择框、控制点等），最后绘制
    overlay: Vec<Drawable>,
    /// 上一帧绘制了临时内容的分段
    transient_band: Option<ZBand>,
    /// 上一帧临时内容在画布上的范围
    transient_bounds: Vec<Rectangle>,
    /// 目标上已有一帧完整内容，可以在其上追加
    frame_ready: bool,
    /// 绘图对象最近一次绘制时在画布上的范围
    drawn_bounds: HashMap<DrawableId, Rectangle>,
    last_count: Option<usize>,
    prewarm: Option<PrewarmTask>,
    redraws: u64,
    failures: u64,
}

impl<R, M, T> RedrawOrchestrator<R, M, T>
where
    R: DrawableRenderer,
    M: MemorySampler,
    T: SurfaceProvider,
{
    /// 创建调度器
    pub fn new(renderer: R, sampler: M, targets: T, config: OrchestratorConfig) -> Self {
        Self::with_clock(renderer, sampler, targets, config, Arc::new(SystemClock))
    }

    /// 使用指定时钟创建（缓存过期、内存采样、预热截止共用）
    pub fn with_clock(
        renderer: R,
        sampler: M,
        targets: T,
        config: OrchestratorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (width, height) = targets.size();
        Self {
            renderer,
            dirty: DirtyRectTracker::with_config(width as f32, height as f32, config.dirty),
            layers: LayerCache::new(width, height),
            objects: ObjectRenderCache::with_clock(
                config.cache,
                config.object_cache_threshold,
                clock.clone(),
            ),
            memory: MemoryMonitor::new(sampler, config.memory, clock),
            targets,
            config,
            scene: SceneCache::default(),
            implicit_layer: true,
            selected_layer: None,
            active: None,
            overlay: Vec::new(),
            transient_band: None,
            transient_bounds: Vec::new(),
            frame_ready: false,
            drawn_bounds: HashMap::new(),
            last_count: None,
            prewarm: None,
            redraws: 0,
            failures: 0,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn targets(&self) -> &T {
        &self.targets
    }

    /// 可变访问目标；调用方可能改变了像素，下一次追加前需要完整重绘
    pub fn targets_mut(&mut self) -> &mut T {
        self.frame_ready = false;
        &mut self.targets
    }

    pub fn layer_cache(&self) -> &LayerCache {
        &self.layers
    }

    pub fn object_cache(&self) -> &ObjectRenderCache {
        &self.objects
    }

    pub fn memory(&self) -> &MemoryMonitor<M> {
        &self.memory
    }

    /// 整场景位图当前是否可用
    pub fn scene_active(&self) -> bool {
        self.scene.valid && self.scene.surface.is_some()
    }

    /// 同步图层元数据（完整集合，未出现的图层会被移除）
    pub fn sync_layers(&mut self, layers: impl IntoIterator<Item = LayerInfo>) {
        if self.implicit_layer {
            self.implicit_layer = false;
            self.layers.remove_layer(IMPLICIT_LAYER);
            self.frame_ready = false;
            self.scene.invalidate();
        }

        let mut seen = Vec::new();
        for info in layers {
            seen.push(info.id);
            match self.layers.layer(info.id) {
                Some(old) if *old == info => continue,
                Some(old) => {
                    let appended_only = old.members != info.members
                        && info.members.starts_with(&old.members)
                        && LayerInfo {
                            members: info.members.clone(),
                            ..old.clone()
                        } == info;
                    // 除了末尾追加成员以外的变化都会改变已合成的像素
                    if !appended_only {
                        self.frame_ready = false;
                    }
                }
                None => self.frame_ready = false,
            }
            self.scene.invalidate();
            self.layers.sync_layer(info);
        }

        let stale: Vec<LayerId> = self
            .layers
            .layers_in_order()
            .map(|info| info.id)
            .filter(|id| !seen.contains(id))
            .collect();
        for id in stale {
            self.layers.remove_layer(id);
            self.scene.invalidate();
            self.frame_ready = false;
        }
    }

    /// 设置选中图层（决定分段划分）
    pub fn set_selected_layer(&mut self, layer: Option<LayerId>) {
        if self.selected_layer != layer {
            self.selected_layer = layer;
            if self.targets.is_split() {
                self.frame_ready = false;
            }
        }
    }

    pub fn selected_layer(&self) -> Option<LayerId> {
        self.selected_layer
    }

    /// 设置进行中的绘图对象
    pub fn set_active_drawable(&mut self, drawable: Option<Drawable>) {
        self.active = drawable;
    }

    /// 设置工具覆盖层
    pub fn set_overlay(&mut self, overlay: Vec<Drawable>) {
        self.overlay = overlay;
    }

    /// 标记脏区域
    pub fn mark_dirty(&mut self, rect: Rectangle) {
        self.dirty.mark_dirty(rect);
    }

    /// 使缓存失效
    ///
    /// 绘图对象的每次修改或删除都必须调用。
    pub fn invalidate(&mut self, target: InvalidateTarget) {
        match target {
            InvalidateTarget::Drawable(id) => {
                self.objects.invalidate(id);
                for layer in self.layers.layers_containing(id) {
                    self.layers.mark_dirty(layer);
                }
                if let Some(task) = self.prewarm.as_mut() {
                    task.forget(id);
                }
                match self.drawn_bounds.remove(&id) {
                    Some(bounds) => self.dirty.mark_dirty(bounds),
                    None => self.dirty.mark_full_redraw(),
                }
            }
            InvalidateTarget::Layer(id) => {
                self.layers.mark_dirty(id);
                self.dirty.mark_full_redraw();
            }
            InvalidateTarget::All => {
                self.objects.clear();
                self.layers.invalidate_all();
                self.drawn_bounds.clear();
                self.dirty.mark_full_redraw();
                if let Some(task) = self.prewarm.take() {
                    task.handle().cancel();
                }
            }
        }
        self.scene.invalidate();
    }

    /// 调整尺寸，所有位图缓存按新尺寸重建
    pub fn resize(&mut self, width: u32, height: u32) -> RedrawResult<()> {
        self.targets
            .resize(width, height)
            .map_err(|err| RedrawError::unavailable(ZBand::Bottom, err))?;
        self.layers.set_size(width, height);
        self.dirty.set_screen_size(width as f32, height as f32);
        self.drop_scene("resize");
        self.frame_ready = false;
        Ok(())
    }

    /// 按采样间隔检查内存压力；进入压力时丢弃整场景位图并把对象缓存收缩到一半预算
    pub fn poll_memory(&mut self) {
        if self.memory.poll() == Some(PressureChange::Entered) {
            self.drop_scene("memory pressure");
            let budget = self.objects.max_bytes() / 2;
            self.objects.shrink_to(budget);
        }
    }

    /// 调度预热任务（取消上一个任务）
    pub fn schedule_prewarm<S>(&mut self, source: &S) -> PrewarmHandle
    where
        S: DrawableSource + ?Sized,
    {
        if let Some(task) = self.prewarm.take() {
            task.handle().cancel();
        }
        let drawables = source.all_drawables();
        let ids: Vec<DrawableId> = self
            .objects
            .prewarm_candidates(&drawables, self.config.prewarm_max_count)
            .into_iter()
            .map(|d| d.id)
            .collect();
        tracing::debug!(count = ids.len(), "prewarm scheduled");

        let task = PrewarmTask::new(ids);
        let handle = task.handle();
        self.prewarm = Some(task);
        handle
    }

    /// 空闲时执行预热，直到截止时间或队列为空，返回本次缓存的对象数
    pub fn run_idle<S>(&mut self, deadline: Instant, source: &S) -> usize
    where
        S: DrawableSource + ?Sized,
    {
        let Some(task) = self.prewarm.as_mut() else {
            return 0;
        };

        let (width, height) = self.targets.size();
        let visible = Rectangle::new(0.0, 0.0, width as f32, height as f32);
        let mut warmed = 0;
        while let Some(id) = task.next_id() {
            if self.objects.deadline_passed(Some(deadline)) {
                task.requeue(id);
                break;
            }
            let Some(drawable) = source.get(id) else {
                continue;
            };
            if self.objects.prewarm_one(drawable, &self.renderer, visible) {
                warmed += 1;
            }
        }
        if task.is_finished() {
            self.prewarm = None;
        }
        warmed
    }

    /// 统计信息
    pub fn stats(&self) -> RenderStats {
        let objects = self.objects.stats().entries;
        let layer_bytes = self.layers.memory_bytes();
        let scene_bytes = self.scene.byte_size();
        RenderStats {
            object_cache_entries: objects.entries,
            object_cache_bytes: objects.bytes,
            object_cache_hits: objects.hits,
            object_cache_misses: objects.misses,
            object_cache_evictions: objects.evictions,
            object_cache_expirations: objects.expirations,
            hit_rate: objects.hit_rate(),
            layer_count: self.layers.layer_count(),
            layer_bytes,
            layer_renders: self.layers.render_count(),
            scene_active: self.scene_active(),
            scene_bytes,
            scene_rebuilds: self.scene.rebuilds,
            dirty_ratio: self.dirty.dirty_ratio(),
            memory_estimate: objects.bytes + layer_bytes + scene_bytes,
            memory_ratio: self.memory.last_ratio(),
            under_pressure: self.memory.under_pressure(),
            redraws: self.redraws,
            failures: self.failures,
        }
    }

    /// 统计信息（JSON）
    pub fn stats_json(&self) -> serde_json::Result<String> {
        self.stats().to_json()
    }

    /// 执行一次重绘
    pub fn request_redraw<S>(
        &mut self,
        scope: RedrawScope,
        source: &S,
    ) -> RedrawResult<RedrawReport>
    where
        S: DrawableSource + ?Sized,
    {
        self.redraws += 1;
        self.poll_memory();
        self.sync_implicit_layer(source);
        if matches!(scope, RedrawScope::Dirty) {
            self.mark_transient_dirty();
        }

        let count = source.count();
        if self.last_count.is_some_and(|last| last != count) {
            self.scene.invalidate();
        }
        self.last_count = Some(count);

        let result = if self.use_scene(count) {
            self.redraw_scene(&scope, source)
        } else {
            self.drop_scene("scene threshold not met");
            match scope {
                RedrawScope::Full => self.redraw_full(source),
                RedrawScope::Incremental(ids) => self.redraw_incremental(&ids, source),
                RedrawScope::ByLayer(id) => {
                    let band = self.band_of_layer(id).ok_or(RedrawError::UnknownLayer(id))?;
                    self.recomposite_bands(&[band], source, RedrawPath::Layers)
                }
                RedrawScope::ByZBand { low, high } => self.redraw_z_range(low, high, source),
                RedrawScope::Dirty => self.redraw_dirty(source),
            }
        };

        let report = result?;
        self.failures += report.failures as u64;
        tracing::trace!(path = ?report.path, failures = report.failures, "redraw finished");
        Ok(report)
    }

    /// 上一帧和本帧的临时内容都要进入脏区域，否则旧像素会残留
    fn mark_transient_dirty(&mut self) {
        let current = self.active.iter().chain(self.overlay.iter()).map(Drawable::bounds);
        for rect in self.transient_bounds.iter().copied().chain(current) {
            self.dirty.mark_dirty(rect);
        }
    }

    fn use_scene(&self, count: usize) -> bool {
        count > self.config.scene_threshold
            && self.memory.has_headroom()
            && !self.targets.is_split()
    }

    fn drop_scene(&mut self, reason: &str) {
        self.scene.valid = false;
        if self.scene.surface.take().is_some() {
            tracing::debug!(reason, "scene cache dropped");
        }
    }

    fn sync_implicit_layer<S>(&mut self, source: &S)
    where
        S: DrawableSource + ?Sized,
    {
        if !self.implicit_layer {
            return;
        }
        let members: Vec<DrawableId> = source.all_drawables().iter().map(|d| d.id).collect();
        let unchanged = self
            .layers
            .layer(IMPLICIT_LAYER)
            .is_some_and(|info| info.members == members);
        if !unchanged {
            self.layers
                .sync_layer(LayerInfo::new(IMPLICIT_LAYER, 0).with_members(members));
        }
    }

    /// 当前参与绘制的分段
    fn active_bands(&self) -> Vec<ZBand> {
        if self.targets.is_split() {
            ZBand::ALL.to_vec()
        } else {
            vec![ZBand::Bottom]
        }
    }

    /// 临时内容（进行中对象、覆盖层）所在的最上层分段
    fn top_band(&self) -> ZBand {
        if self.targets.is_split() {
            ZBand::Top
        } else {
            ZBand::Bottom
        }
    }

    fn selected_key(&self) -> Option<(i32, LayerId)> {
        self.selected_layer
            .and_then(|id| self.layers.layer(id))
            .map(|info| (info.z_index, info.id))
    }

    fn band_of_layer(&self, id: LayerId) -> Option<ZBand> {
        let info = self.layers.layer(id)?;
        Some(band_for(info, self.selected_key(), self.targets.is_split()))
    }

    fn acquire(&mut self, bands: &[ZBand]) -> RedrawResult<()> {
        let first = bands.first().copied().unwrap_or(ZBand::Bottom);
        self.targets
            .acquire(bands)
            .map_err(|err| RedrawError::unavailable(first, err))?;
        for &band in bands {
            if self.targets.target(band).is_none() {
                return Err(RedrawError::unavailable(
                    band,
                    SurfaceError::Unavailable("band target missing after acquire".into()),
                ));
            }
        }
        Ok(())
    }

    fn redraw_full<S>(&mut self, source: &S) -> RedrawResult<RedrawReport>
    where
        S: DrawableSource + ?Sized,
    {
        let bands = self.active_bands();
        let report = self.recomposite_bands(&bands, source, RedrawPath::Layers)?;
        self.dirty.clear();
        self.frame_ready = true;
        Ok(report)
    }

    fn redraw_z_range<S>(&mut self, low: i32, high: i32, source: &S) -> RedrawResult<RedrawReport>
    where
        S: DrawableSource + ?Sized,
    {
        let selected = self.selected_key();
        let split = self.targets.is_split();
        let mut bands: Vec<ZBand> = self
            .layers
            .layers_in_order()
            .filter(|info| (low..=high).contains(&info.z_index))
            .map(|info| band_for(info, selected, split))
            .collect();
        bands.sort();
        bands.dedup();
        if bands.is_empty() {
            return Ok(RedrawReport::new(RedrawPath::Skipped));
        }
        self.recomposite_bands(&bands, source, RedrawPath::Layers)
    }

    fn recomposite_bands<S>(
        &mut self,
        bands: &[ZBand],
        source: &S,
        path: RedrawPath,
    ) -> RedrawResult<RedrawReport>
    where
        S: DrawableSource + ?Sized,
    {
        self.acquire(bands)?;
        let mut report = RedrawReport::new(path);
        self.recomposite_into(bands, source, None, &mut report);
        Ok(report)
    }

    /// 重绘无效图层，然后清空并重新合成指定分段（目标必须已获取）
    fn recomposite_into<S>(
        &mut self,
        bands: &[ZBand],
        source: &S,
        clip: Option<(&[Rectangle], &ClipMask)>,
        report: &mut RedrawReport,
    ) where
        S: DrawableSource + ?Sized,
    {
        self.render_layers(bands, source, report);
        for &band in bands {
            self.composite_band(band, clip, report);
        }
        let top = self.top_band();
        if bands.contains(&top) {
            self.draw_transient(top, clip.map(|(_, mask)| mask), report);
        }
    }

    /// 按需重绘落在指定分段内的可见图层
    fn render_layers<S>(&mut self, bands: &[ZBand], source: &S, report: &mut RedrawReport)
    where
        S: DrawableSource + ?Sized,
    {
        let selected = self.selected_key();
        let split = self.targets.is_split();
        let layers: Vec<(LayerId, Point)> = self
            .layers
            .layers_in_order()
            .filter(|info| info.visible && bands.contains(&band_for(info, selected, split)))
            .map(|info| (info.id, info.offset))
            .collect();

        for (id, offset) in layers {
            self.render_layer(id, offset, source, report);
        }
    }

    fn render_layer<S>(&mut self, id: LayerId, offset: Point, source: &S, report: &mut RedrawReport)
    where
        S: DrawableSource + ?Sized,
    {
        let objects = &mut self.objects;
        let renderer = &self.renderer;
        let drawn_bounds = &mut self.drawn_bounds;
        let result = self.layers.render(id, |surface, member| {
            let Some(drawable) = source.get(member) else {
                tracing::trace!(layer = id, drawable = member, "layer member not in source");
                return Ok(());
            };
            drawn_bounds.insert(member, drawable.bounds().translate(offset.x, offset.y));
            draw_member(objects, renderer, surface, drawable)
        });

        match result {
            Ok(outcome) => {
                if outcome.rendered {
                    report.layers_rendered += 1;
                }
                report.drawables_appended += outcome.appended;
                report.failures += outcome.failures;
            }
            Err(err) => {
                tracing::warn!(layer = id, %err, "layer render failed");
                report.failures += 1;
            }
        }
    }

    fn composite_band(
        &mut self,
        band: ZBand,
        clip: Option<(&[Rectangle], &ClipMask)>,
        report: &mut RedrawReport,
    ) {
        let selected = self.selected_key();
        let split = self.targets.is_split();
        let Some(target) = self.targets.target(band) else {
            return;
        };
        match clip {
            Some((rects, _)) => target.clear_rects(rects),
            None => target.clear(),
        }
        report.layers_composited += self.layers.composite(
            target,
            |info| band_for(info, selected, split) == band,
            clip.map(|(_, mask)| mask),
        );
        report.touch_band(band);
    }

    /// 绘制进行中的对象和工具覆盖层
    fn draw_transient(&mut self, band: ZBand, clip: Option<&ClipMask>, report: &mut RedrawReport) {
        let Some(target) = self.targets.target(band) else {
            return;
        };
        let visible = target.bounds();
        let mut drawn = Vec::new();
        for drawable in self.active.iter().chain(self.overlay.iter()) {
            match render_isolated(&self.renderer, drawable, visible) {
                Ok(Some(bitmap)) => {
                    target.blit(&bitmap, Point::ZERO, clip);
                    drawn.push(bitmap.bounds());
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(drawable = drawable.id, %err, "skipping transient drawable");
                    report.failures += 1;
                }
            }
        }
        self.transient_band = (!drawn.is_empty()).then_some(band);
        self.transient_bounds = drawn;
    }

    /// 追加绘制
    ///
    /// 新对象所在图层可见、不透明、是分段内最上层且位图只差这些新成员时，
    /// 把新成员叠加到图层位图和目标上；否则重新合成该分段。
    fn redraw_incremental<S>(
        &mut self,
        ids: &[DrawableId],
        source: &S,
    ) -> RedrawResult<RedrawReport>
    where
        S: DrawableSource + ?Sized,
    {
        if !self.frame_ready {
            tracing::debug!("no complete frame to append to, redrawing everything");
            return self.redraw_full(source);
        }

        let selected = self.selected_key();
        let split = self.targets.is_split();

        let mut touched: Vec<LayerId> = Vec::new();
        for &id in ids {
            for layer in self.layers.layers_containing(id) {
                if !touched.contains(&layer) {
                    touched.push(layer);
                }
            }
        }
        if touched.is_empty() {
            tracing::debug!(?ids, "incremental redraw found no owning layer");
            return Ok(RedrawReport::new(RedrawPath::Skipped));
        }

        let mut appends: Vec<(LayerId, ZBand, Point)> = Vec::new();
        let mut recomposite: Vec<ZBand> = Vec::new();
        for layer in touched {
            let Some(info) = self.layers.layer(layer) else {
                continue;
            };
            if !info.visible {
                continue;
            }
            let band = band_for(info, selected, split);
            if self.can_append(info, band, selected, split) {
                appends.push((info.id, band, info.offset));
            } else if !recomposite.contains(&band) {
                recomposite.push(band);
            }
        }

        let mut bands = recomposite.clone();
        bands.extend(appends.iter().map(|&(_, band, _)| band));
        bands.sort();
        bands.dedup();
        self.acquire(&bands)?;

        let mut report = RedrawReport::new(RedrawPath::Incremental);
        for (layer, band, offset) in appends {
            if recomposite.contains(&band) {
                continue;
            }
            let pending = self.layers.pending_members(layer).to_vec();
            self.render_layer(layer, offset, source, &mut report);
            if !self.layers.is_valid(layer) {
                recomposite.push(band);
                continue;
            }

            let Some(target) = self.targets.target(band) else {
                continue;
            };
            for member in pending {
                let Some(drawable) = source.get(member) else {
                    continue;
                };
                let drawn =
                    draw_member_at(&mut self.objects, &self.renderer, target, drawable, offset);
                if let Err(err) = drawn {
                    tracing::warn!(drawable = member, %err, "append to target failed");
                    report.failures += 1;
                }
            }
            report.touch_band(band);
        }

        if !recomposite.is_empty() {
            recomposite.sort();
            recomposite.dedup();
            tracing::debug!(bands = ?recomposite, "append not pixel-correct, recompositing");
            self.recomposite_into(&recomposite, source, None, &mut report);
        }
        Ok(report)
    }

    fn can_append(
        &self,
        info: &LayerInfo,
        band: ZBand,
        selected: Option<(i32, LayerId)>,
        split: bool,
    ) -> bool {
        if info.locked
            || info.opacity < 1.0
            || self.transient_band == Some(band)
            || !self.layers.is_append_only(info.id)
        {
            return false;
        }
        // 同一分段内不能有更上层的可见图层
        self.layers
            .layers_in_order()
            .skip_while(|other| other.id != info.id)
            .skip(1)
            .all(|other| !other.visible || band_for(other, selected, split) != band)
    }

    /// 只重绘脏区域
    fn redraw_dirty<S>(&mut self, source: &S) -> RedrawResult<RedrawReport>
    where
        S: DrawableSource + ?Sized,
    {
        let rects = self.dirty.query();
        if rects.is_empty() {
            return Ok(RedrawReport::new(RedrawPath::Skipped));
        }
        let whole_screen = rects == [self.dirty.screen_rect()];
        if !self.frame_ready || self.dirty.needs_full_redraw() || whole_screen {
            return self.redraw_full(source);
        }

        let (width, height) = self.targets.size();
        let Some(mask) = ClipMask::from_rects(width, height, &rects) else {
            return self.redraw_full(source);
        };

        let bands = self.active_bands();
        self.acquire(&bands)?;
        let mut report = RedrawReport::new(RedrawPath::Dirty);
        self.recomposite_into(&bands, source, Some((rects.as_slice(), &mask)), &mut report);
        self.dirty.clear();
        Ok(report)
    }

    /// 整场景路径
    fn redraw_scene<S>(&mut self, scope: &RedrawScope, source: &S) -> RedrawResult<RedrawReport>
    where
        S: DrawableSource + ?Sized,
    {
        let band = ZBand::Bottom;
        self.acquire(&[band])?;

        let mut report = RedrawReport::new(RedrawPath::Scene);
        if !self.scene_active() && !self.rebuild_scene(source, &mut report) {
            // 整场景位图分配失败，退回逐图层合成
            report.path = RedrawPath::Layers;
            self.recomposite_into(&[band], source, None, &mut report);
            self.dirty.clear();
            self.frame_ready = true;
            return Ok(report);
        }

        let rects = if matches!(scope, RedrawScope::Dirty) && self.frame_ready {
            self.dirty.query()
        } else {
            vec![self.dirty.screen_rect()]
        };
        if rects.is_empty() {
            report.path = RedrawPath::Skipped;
            return Ok(report);
        }
        let full = self.dirty.needs_full_redraw() || rects == [self.dirty.screen_rect()];
        let (width, height) = self.targets.size();
        let mask = if full {
            None
        } else {
            ClipMask::from_rects(width, height, &rects)
        };

        let scene = self.scene.surface.as_ref();
        if let (Some(target), Some(scene)) = (self.targets.target(band), scene) {
            match &mask {
                Some(mask) => {
                    target.clear_rects(&rects);
                    target.blit(scene, Point::ZERO, Some(mask));
                }
                None => {
                    target.clear();
                    target.blit(scene, Point::ZERO, None);
                }
            }
        }
        report.touch_band(band);
        self.draw_transient(band, mask.as_ref(), &mut report);
        self.dirty.clear();
        self.frame_ready = true;
        Ok(report)
    }

    /// 重建整场景位图，成功分配返回 true
    ///
    /// 逐个图层渲染并合成到场景位图，随后释放图层位图。有成员失败时场景位图保持无效，
    /// 下一次重绘重试。
    fn rebuild_scene<S>(&mut self, source: &S, report: &mut RedrawReport) -> bool
    where
        S: DrawableSource + ?Sized,
    {
        let (width, height) = self.targets.size();
        let mut scene = match self.scene.surface.take() {
            Some(surface) if (surface.width(), surface.height()) == (width, height) => surface,
            _ => match Surface::new(width, height) {
                Ok(surface) => surface,
                Err(err) => {
                    tracing::warn!(%err, "scene cache allocation failed");
                    return false;
                }
            },
        };
        scene.clear();

        let failures_before = report.failures;
        let layers: Vec<(LayerId, Point)> = self
            .layers
            .layers_in_order()
            .filter(|info| info.visible)
            .map(|info| (info.id, info.offset))
            .collect();
        for (id, offset) in layers {
            self.render_layer(id, offset, source, report);
            report.layers_composited +=
                self.layers.composite(&mut scene, |info| info.id == id, None);
            self.layers.release_surface(id);
        }

        self.scene.surface = Some(scene);
        self.scene.valid = report.failures == failures_before;
        self.scene.rebuilds += 1;
        report.scene_rebuilt = true;
        tracing::debug!(rebuilds = self.scene.rebuilds, "scene cache rebuilt");
        true
    }
}

/// 图层所属分段：未拆分或没有选中图层时全部属于底层分段
fn band_for(info: &LayerInfo, selected: Option<(i32, LayerId)>, split: bool) -> ZBand {
    let Some(selected) = selected.filter(|_| split) else {
        return ZBand::Bottom;
    };
    match (info.z_index, info.id).cmp(&selected) {
        std::cmp::Ordering::Less => ZBand::Bottom,
        std::cmp::Ordering::Equal => ZBand::Selected,
        std::cmp::Ordering::Greater => ZBand::Top,
    }
}

/// 把成员画到图层位图上：值得缓存的对象经过对象缓存，否则直接绘制。
/// 对象位图分配失败时退化为直接绘制。
fn draw_member<R>(
    objects: &mut ObjectRenderCache,
    renderer: &R,
    surface: &mut Surface,
    drawable: &Drawable,
) -> Result<(), RenderError>
where
    R: DrawableRenderer + ?Sized,
{
    if objects.should_cache(drawable) {
        match objects.get_or_create(drawable, renderer, surface.bounds()) {
            Ok(Some(bitmap)) => {
                surface.blit(&bitmap, Point::ZERO, None);
                return Ok(());
            }
            Ok(None) => return Ok(()),
            Err(err) if err.is_allocation() => {
                tracing::trace!(drawable = drawable.id, "object bitmap unavailable, drawing directly");
            }
            Err(err) => return Err(err),
        }
    }
    renderer.render(surface, drawable)
}

/// 带图层偏移地把成员画到目标上
fn draw_member_at<R>(
    objects: &mut ObjectRenderCache,
    renderer: &R,
    target: &mut Surface,
    drawable: &Drawable,
    offset: Point,
) -> Result<(), RenderError>
where
    R: DrawableRenderer + ?Sized,
{
    if offset == Point::ZERO {
        return draw_member(objects, renderer, target, drawable);
    }
    // 目标区域换算到图层坐标系
    let visible = target.bounds().translate(-offset.x, -offset.y);
    let bitmap = if objects.should_cache(drawable) {
        objects.get_or_create(drawable, renderer, visible)?
    } else {
        render_isolated(renderer, drawable, visible)?.map(Arc::new)
    };
    if let Some(bitmap) = bitmap {
        target.blit(&bitmap, offset, None);
    }
    Ok(())
}

/// 把对象渲染到独立位图，位图只覆盖包围盒落在 `visible` 内的部分；不可见时返回 None
fn render_isolated<R>(
    renderer: &R,
    drawable: &Drawable,
    visible: Rectangle,
) -> Result<Option<Surface>, RenderError>
where
    R: DrawableRenderer + ?Sized,
{
    let Some(region) = drawable.bounds().intersection(&visible) else {
        return Ok(None);
    };
    let mut surface = Surface::for_region(region)?;
    renderer.render(&mut surface, drawable)?;
    Ok(Some(surface))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ManualMemorySampler;
    use crate::target::BandedSurface;
    use sc_drawing::{DrawableKind, DrawableStore, SkiaRenderer};
    use sc_rendering::ManualClock;

    type TestOrchestrator = RedrawOrchestrator<SkiaRenderer, ManualMemorySampler, BandedSurface>;

    fn orchestrator(scene_threshold: usize) -> (TestOrchestrator, ManualMemorySampler) {
        let sampler = ManualMemorySampler::new(0.4);
        let config = OrchestratorConfig {
            scene_threshold,
            object_cache_threshold: 0.0,
            ..OrchestratorConfig::default()
        };
        let orchestrator = RedrawOrchestrator::with_clock(
            SkiaRenderer,
            sampler.clone(),
            BandedSurface::new(64, 64).unwrap(),
            config,
            Arc::new(ManualClock::new()),
        );
        (orchestrator, sampler)
    }

    fn line(id: DrawableId, y: f32) -> Drawable {
        Drawable::with_id(id, DrawableKind::Stroke)
            .with_points([Point::new(4.0, y), Point::new(60.0, y)])
    }

    fn store(count: u64) -> DrawableStore {
        let mut store = DrawableStore::new();
        for id in 1..=count {
            store.add(line(id, (id % 60) as f32 + 2.0));
        }
        store
    }

    #[test]
    fn test_band_assignment() {
        let selected = Some((5, 2));
        let below = LayerInfo::new(1, 0);
        let same = LayerInfo::new(2, 5);
        let above = LayerInfo::new(3, 9);
        assert_eq!(band_for(&below, selected, true), ZBand::Bottom);
        assert_eq!(band_for(&same, selected, true), ZBand::Selected);
        assert_eq!(band_for(&above, selected, true), ZBand::Top);
        assert_eq!(band_for(&above, selected, false), ZBand::Bottom);
        assert_eq!(band_for(&above, None, true), ZBand::Bottom);
    }

    #[test]
    fn test_full_redraw_uses_implicit_layer() {
        let (mut orchestrator, _) = orchestrator(100);
        let source = store(3);
        let report = orchestrator.request_redraw(RedrawScope::Full, &source).unwrap();
        assert_eq!(report.path, RedrawPath::Layers);
        assert_eq!(report.layers_rendered, 1);
        assert_eq!(report.layers_composited, 1);
        assert_eq!(
            orchestrator.layer_cache().layer(IMPLICIT_LAYER).map(|l| l.members.clone()),
            Some(vec![1, 2, 3])
        );
    }

    #[test]
    fn test_incremental_appends_without_rerendering_layer() {
        let (mut orchestrator, _) = orchestrator(100);
        let mut source = store(3);
        orchestrator.request_redraw(RedrawScope::Full, &source).unwrap();

        source.add(line(4, 40.0));
        let report = orchestrator
            .request_redraw(RedrawScope::Incremental(vec![4]), &source)
            .unwrap();
        assert_eq!(report.path, RedrawPath::Incremental);
        assert_eq!(report.layers_rendered, 0);
        assert_eq!(report.drawables_appended, 1);
        assert_eq!(orchestrator.layer_cache().render_count(), 1);
        assert!(orchestrator.layer_cache().is_valid(IMPLICIT_LAYER));
    }

    #[test]
    fn test_incremental_with_transient_recomposites() {
        let (mut orchestrator, _) = orchestrator(100);
        let mut source = store(2);
        orchestrator.set_active_drawable(Some(line(99, 30.0)));
        orchestrator.request_redraw(RedrawScope::Full, &source).unwrap();

        orchestrator.set_active_drawable(None);
        source.add(line(3, 30.0));
        let report = orchestrator
            .request_redraw(RedrawScope::Incremental(vec![3]), &source)
            .unwrap();
        assert_eq!(report.layers_composited, 1);
        assert_eq!(report.bands, vec![ZBand::Bottom]);
    }

    #[test]
    fn test_unknown_layer_is_error() {
        let (mut orchestrator, _) = orchestrator(100);
        let source = store(1);
        assert!(matches!(
            orchestrator.request_redraw(RedrawScope::ByLayer(42), &source),
            Err(RedrawError::UnknownLayer(42))
        ));
    }

    #[test]
    fn test_memory_pressure_disables_scene() {
        let clock = ManualClock::new();
        let sampler = ManualMemorySampler::new(0.4);
        let config = OrchestratorConfig {
            scene_threshold: 5,
            ..OrchestratorConfig::default()
        };
        let mut orchestrator = RedrawOrchestrator::with_clock(
            SkiaRenderer,
            sampler.clone(),
            BandedSurface::new(64, 64).unwrap(),
            config,
            Arc::new(clock.clone()),
        );
        let source = store(10);
        let report = orchestrator.request_redraw(RedrawScope::Full, &source).unwrap();
        assert_eq!(report.path, RedrawPath::Scene);
        assert!(orchestrator.scene_active());

        sampler.set(0.95);
        clock.advance(config_interval(&orchestrator));
        let report = orchestrator.request_redraw(RedrawScope::Full, &source).unwrap();
        assert_eq!(report.path, RedrawPath::Layers);
        assert!(!orchestrator.scene_active());
        let stats = orchestrator.stats();
        assert!(stats.under_pressure);
        assert_eq!(stats.scene_bytes, 0);
    }

    fn config_interval(orchestrator: &TestOrchestrator) -> std::time::Duration {
        orchestrator.config().memory.sample_interval
    }

    #[test]
    fn test_invalidate_drawable_marks_old_bounds_dirty() {
        let (mut orchestrator, _) = orchestrator(100);
        let source = store(2);
        orchestrator.request_redraw(RedrawScope::Full, &source).unwrap();
        orchestrator.invalidate(InvalidateTarget::Drawable(1));
        assert!(!orchestrator.layer_cache().is_valid(IMPLICIT_LAYER));
        let report = orchestrator.request_redraw(RedrawScope::Dirty, &source).unwrap();
        assert_eq!(report.path, RedrawPath::Dirty);
        assert_eq!(report.layers_rendered, 1);
        assert_eq!(orchestrator.stats().dirty_ratio, 0.0);
    }

    #[test]
    fn test_prewarm_runs_until_queue_empty() {
        let (mut orchestrator, _) = orchestrator(100);
        let source = store(4);
        let handle = orchestrator.schedule_prewarm(&source);
        assert!(!handle.is_cancelled());
        let deadline = Instant::now() + std::time::Duration::from_secs(60);
        let warmed = orchestrator.run_idle(deadline, &source);
        assert_eq!(warmed, 4);
        assert_eq!(orchestrator.object_cache().len(), 4);
        assert_eq!(orchestrator.run_idle(Instant::now(), &source), 0);
    }

    #[test]
    fn test_rescheduling_cancels_previous_prewarm() {
        let (mut orchestrator, _) = orchestrator(100);
        let source = store(4);
        let first = orchestrator.schedule_prewarm(&source);
        let second = orchestrator.schedule_prewarm(&source);
        assert!(first.is_cancelled());
        second.cancel();
        let deadline = Instant::now() + std::time::Duration::from_secs(60);
        assert_eq!(orchestrator.run_idle(deadline, &source), 0);
        assert!(orchestrator.object_cache().is_empty());
    }
}
