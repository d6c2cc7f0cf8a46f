use crate::types::Rectangle;

/// 脏区域配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirtyRegionConfig {
    /// 每个标记区域向外扩展的像素（覆盖抗锯齿边缘）
    pub padding: f32,
    /// 小于该面积的区域直接丢弃
    pub min_area: f32,
    /// 间距不超过该值的两个区域会被合并
    pub merge_threshold: f32,
    /// 合并后区域数量上限，超过则退化为全屏
    pub max_rects: usize,
    /// 脏区域面积占比上限，超过则退化为全屏
    pub full_redraw_ratio: f32,
}

impl Default for DirtyRegionConfig {
    fn default() -> Self {
        Self {
            padding: 2.0,
            min_area: 1.0,
            merge_threshold: 20.0,
            max_rects: 16,
            full_redraw_ratio: 0.6,
        }
    }
}

/// 脏矩形追踪器
///
/// 收集所有需要重绘的区域，合并相邻/重叠区域，并在区域过多或过大时退化为全屏重绘。
#[derive(Debug, Default)]
pub struct DirtyRectTracker {
    /// 脏区域列表
    dirty_regions: Vec<Rectangle>,
    /// 列表是否已经合并过（新标记后置为 false）
    merged: bool,
    /// 是否需要全屏重绘
    full_redraw: bool,
    /// 屏幕尺寸（用于全屏重绘时返回）
    screen_size: (f32, f32),
    config: DirtyRegionConfig,
}

impl DirtyRectTracker {
    /// 创建新的脏矩形追踪器
    pub fn new(screen_width: f32, screen_height: f32) -> Self {
        Self::with_config(screen_width, screen_height, DirtyRegionConfig::default())
    }

    /// 使用自定义配置创建
    pub fn with_config(screen_width: f32, screen_height: f32, config: DirtyRegionConfig) -> Self {
        Self {
            dirty_regions: Vec::new(),
            merged: true,
            full_redraw: false,
            screen_size: (screen_width, screen_height),
            config,
        }
    }

    pub fn config(&self) -> &DirtyRegionConfig {
        &self.config
    }

    /// 设置屏幕尺寸
    ///
    /// 尺寸变化会强制全屏重绘
    pub fn set_screen_size(&mut self, width: f32, height: f32) {
        if self.screen_size != (width, height) {
            self.screen_size = (width, height);
            self.mark_full_redraw();
        }
    }

    /// 整个屏幕区域
    pub fn screen_rect(&self) -> Rectangle {
        Rectangle::new(0.0, 0.0, self.screen_size.0, self.screen_size.1)
    }

    /// 标记区域为脏
    pub fn mark_dirty(&mut self, rect: Rectangle) {
        // 如果已经需要全屏重绘，不需要再添加
        if self.full_redraw {
            return;
        }

        if !rect.is_valid() {
            tracing::trace!(?rect, "rejecting degenerate dirty rect");
            return;
        }

        let clipped = self.clip_to_screen(rect);
        let padded = self.clip_to_screen(clipped.expand(self.config.padding));
        if !padded.is_valid() || padded.area() < self.config.min_area {
            tracing::trace!(?rect, "dirty rect below minimum area");
            return;
        }

        self.dirty_regions.push(padded);
        self.merged = false;

        // 数量受限：超出上限先合并，仍然超出则退化为全屏
        if self.dirty_regions.len() > self.config.max_rects {
            self.merge();
            if self.dirty_regions.len() > self.config.max_rects {
                tracing::debug!(
                    count = self.dirty_regions.len(),
                    "dirty rect cap exceeded, falling back to full redraw"
                );
                self.mark_full_redraw();
            }
        }
    }

    /// 标记需要全屏重绘
    pub fn mark_full_redraw(&mut self) {
        self.full_redraw = true;
        self.dirty_regions.clear();
        self.merged = true;
    }

    /// 检查是否需要全屏重绘
    pub fn needs_full_redraw(&self) -> bool {
        self.full_redraw
    }

    /// 获取合并后的脏区域
    ///
    /// 全屏重绘、面积占比过高或区域数量过多时只返回整个屏幕区域；没有脏区域时返回空列表。
    pub fn query(&mut self) -> Vec<Rectangle> {
        if self.full_redraw {
            return vec![self.screen_rect()];
        }
        if self.dirty_regions.is_empty() {
            return Vec::new();
        }

        self.merge();

        if self.dirty_regions.len() > self.config.max_rects
            || self.dirty_ratio() > self.config.full_redraw_ratio
        {
            return vec![self.screen_rect()];
        }

        self.dirty_regions.clone()
    }

    /// 获取所有脏区域（可能尚未合并）
    pub fn get_dirty_regions(&self) -> &[Rectangle] {
        &self.dirty_regions
    }

    /// 脏区域面积占屏幕面积的比例
    ///
    /// 合并后的区域互不重叠，面积直接相加即可。
    pub fn dirty_ratio(&self) -> f32 {
        if self.full_redraw {
            return 1.0;
        }
        let screen_area = self.screen_size.0 * self.screen_size.1;
        if screen_area <= 0.0 {
            return 0.0;
        }
        let dirty: f32 = self.dirty_regions.iter().map(Rectangle::area).sum();
        (dirty / screen_area).min(1.0)
    }

    /// 清空脏区域追踪
    pub fn clear(&mut self) {
        self.dirty_regions.clear();
        self.merged = true;
        self.full_redraw = false;
    }

    /// 检查是否有脏区域
    pub fn is_dirty(&self) -> bool {
        self.full_redraw || !self.dirty_regions.is_empty()
    }

    /// 裁剪矩形到屏幕范围内
    pub fn clip_to_screen(&self, rect: Rectangle) -> Rectangle {
        let left = rect.x.max(0.0);
        let top = rect.y.max(0.0);
        let right = rect.right().min(self.screen_size.0);
        let bottom = rect.bottom().min(self.screen_size.1);

        Rectangle {
            x: left,
            y: top,
            width: (right - left).max(0.0),
            height: (bottom - top).max(0.0),
        }
    }

    fn merge(&mut self) {
        if self.merged {
            return;
        }
        let regions = std::mem::take(&mut self.dirty_regions);
        self.dirty_regions = merge_rects(regions, self.config.merge_threshold);
        self.merged = true;
    }
}

/// 合并重叠或间距不超过阈值的矩形
///
/// 取出一个矩形，在剩余列表和已输出列表中查找可合并对象，每次合并后重新扫描，
/// 直到没有可合并对象再输出。结果中任意两个矩形都不相交且间距大于阈值。
pub fn merge_rects(mut pending: Vec<Rectangle>, threshold: f32) -> Vec<Rectangle> {
    let mergeable =
        |a: &Rectangle, b: &Rectangle| a.intersects(b) || a.gap(b) <= threshold;
    let mut merged: Vec<Rectangle> = Vec::with_capacity(pending.len());

    while let Some(mut current) = pending.pop() {
        loop {
            if let Some(i) = pending.iter().position(|r| mergeable(&current, r)) {
                current = current.union(&pending.swap_remove(i));
                continue;
            }
            if let Some(i) = merged.iter().position(|r| mergeable(&current, r)) {
                current = current.union(&merged.swap_remove(i));
                continue;
            }
            break;
        }
        merged.push(current);
    }

    merged
}

/// 脏矩形类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyType {
    /// 全屏重绘
    Full,
    /// 局部重绘
    Partial,
    /// 无需重绘
    None,
}

impl DirtyRectTracker {
    /// 获取脏区域类型
    pub fn dirty_type(&self) -> DirtyType {
        if self.full_redraw {
            DirtyType::Full
        } else if !self.dirty_regions.is_empty() {
            DirtyType::Partial
        } else {
            DirtyType::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn unpadded(threshold: f32) -> DirtyRegionConfig {
        DirtyRegionConfig {
            padding: 0.0,
            min_area: 1.0,
            merge_threshold: threshold,
            max_rects: 16,
            full_redraw_ratio: 0.9,
        }
    }

    #[test]
    fn test_mark_dirty() {
        let mut tracker = DirtyRectTracker::new(1920.0, 1080.0);

        tracker.mark_dirty(Rectangle::new(10.0, 10.0, 100.0, 100.0));
        assert!(tracker.is_dirty());
        assert_eq!(tracker.dirty_type(), DirtyType::Partial);
    }

    #[test]
    fn test_mark_full_redraw() {
        let mut tracker = DirtyRectTracker::new(1920.0, 1080.0);

        tracker.mark_full_redraw();
        assert!(tracker.needs_full_redraw());
        assert_eq!(tracker.dirty_type(), DirtyType::Full);

        let rects = tracker.query();
        assert_eq!(rects, vec![Rectangle::new(0.0, 0.0, 1920.0, 1080.0)]);
    }

    #[test]
    fn test_gap_merge_scenario() {
        let mut tracker = DirtyRectTracker::with_config(1000.0, 1000.0, unpadded(20.0));

        tracker.mark_dirty(Rectangle::new(0.0, 0.0, 50.0, 50.0));
        tracker.mark_dirty(Rectangle::new(200.0, 200.0, 50.0, 50.0));
        assert_eq!(tracker.query().len(), 2);

        tracker.mark_dirty(Rectangle::new(55.0, 0.0, 50.0, 50.0));
        let rects = tracker.query();
        assert_eq!(rects.len(), 2);
        assert!(rects.contains(&Rectangle::new(0.0, 0.0, 105.0, 50.0)));
        assert!(rects.contains(&Rectangle::new(200.0, 200.0, 50.0, 50.0)));
    }

    #[test]
    fn test_degenerate_rects_rejected() {
        let mut tracker = DirtyRectTracker::new(100.0, 100.0);
        tracker.mark_dirty(Rectangle::new(10.0, 10.0, 0.0, 10.0));
        tracker.mark_dirty(Rectangle::new(f32::NAN, 10.0, 5.0, 10.0));
        tracker.mark_dirty(Rectangle::new(500.0, 500.0, 10.0, 10.0));
        assert!(!tracker.is_dirty());
    }

    #[test]
    fn test_padding_and_clipping() {
        let mut tracker = DirtyRectTracker::new(100.0, 100.0);
        tracker.mark_dirty(Rectangle::new(-10.0, 10.0, 20.0, 10.0));
        let rects = tracker.query();
        assert_eq!(rects, vec![Rectangle::new(0.0, 8.0, 12.0, 14.0)]);
    }

    #[test]
    fn test_large_ratio_degenerates_to_full() {
        let mut tracker = DirtyRectTracker::with_config(100.0, 100.0, unpadded(0.0));
        tracker.mark_dirty(Rectangle::new(0.0, 0.0, 100.0, 95.0));
        assert_eq!(tracker.query(), vec![tracker.screen_rect()]);
    }

    #[test]
    fn test_rect_cap_degenerates_to_full() {
        let config = DirtyRegionConfig {
            max_rects: 3,
            ..unpadded(0.0)
        };
        let mut tracker = DirtyRectTracker::with_config(1000.0, 1000.0, config);
        for i in 0..4 {
            tracker.mark_dirty(Rectangle::new(i as f32 * 100.0, 0.0, 10.0, 10.0));
        }
        assert!(tracker.needs_full_redraw());
        assert_eq!(tracker.query().len(), 1);
    }

    #[test]
    fn test_resize_forces_full_redraw() {
        let mut tracker = DirtyRectTracker::new(100.0, 100.0);
        tracker.set_screen_size(100.0, 100.0);
        assert!(!tracker.is_dirty());
        tracker.set_screen_size(200.0, 100.0);
        assert_eq!(tracker.dirty_type(), DirtyType::Full);
    }

    #[test]
    fn test_clear() {
        let mut tracker = DirtyRectTracker::new(1920.0, 1080.0);

        tracker.mark_full_redraw();
        tracker.clear();

        assert!(!tracker.is_dirty());
        assert_eq!(tracker.dirty_type(), DirtyType::None);
        assert!(tracker.query().is_empty());
    }

    #[test]
    fn test_merge_picks_up_already_emitted_rects() {
        // 最先弹出的矩形与任何单个矩形都不相邻，但后面三个合并后会覆盖它
        let rects = vec![
            Rectangle::new(0.0, 5.0, 10.0, 30.0),
            Rectangle::new(100.0, 20.0, 10.0, 10.0),
            Rectangle::new(0.0, 20.0, 110.0, 5.0),
            Rectangle::new(50.0, 0.0, 10.0, 10.0),
        ];
        let merged = merge_rects(rects, 0.0);
        assert_eq!(merged, vec![Rectangle::new(0.0, 0.0, 110.0, 35.0)]);
    }

    fn arb_rect() -> impl Strategy<Value = Rectangle> {
        (0.0f32..900.0, 0.0f32..900.0, 1.0f32..100.0, 1.0f32..100.0)
            .prop_map(|(x, y, w, h)| Rectangle::new(x, y, w, h))
    }

    proptest! {
        #[test]
        fn prop_merged_rects_are_not_mergeable(
            rects in proptest::collection::vec(arb_rect(), 1..40),
            threshold in 0.0f32..30.0,
        ) {
            let merged = merge_rects(rects.clone(), threshold);
            for (i, a) in merged.iter().enumerate() {
                for b in merged.iter().skip(i + 1) {
                    prop_assert!(!a.intersects(b));
                    prop_assert!(a.gap(b) > threshold);
                }
            }
            // 每个输入都被某个输出覆盖
            for r in &rects {
                prop_assert!(merged.iter().any(|m| m.expand(0.01).contains_rect(r)));
            }
        }

        #[test]
        fn prop_tracker_area_bounded_by_inputs(
            rects in proptest::collection::vec(arb_rect(), 1..10),
        ) {
            let config = DirtyRegionConfig {
                padding: 2.0,
                min_area: 0.0,
                merge_threshold: 0.0,
                max_rects: 64,
                full_redraw_ratio: 1.0,
            };
            let mut tracker = DirtyRectTracker::with_config(1000.0, 1000.0, config);
            let mut hull = rects[0].expand(2.0);
            for r in &rects {
                hull = hull.union(&r.expand(2.0));
                tracker.mark_dirty(*r);
            }
            tracker.query();
            // 合并结果互不重叠且都落在输入（含扩展）的包围盒内
            let merged_area: f32 = tracker.get_dirty_regions().iter().map(Rectangle::area).sum();
            prop_assert!(merged_area <= hull.area() + 1.0);
            for m in tracker.get_dirty_regions() {
                prop_assert!(hull.expand(0.01).contains_rect(m));
            }
        }
    }
}
