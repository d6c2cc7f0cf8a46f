use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use sc_rendering::{Color, DrawStyle, DrawableId, Point, Rectangle, Surface};

use crate::types::DrawableKind;

/// 全局绘图对象 ID 生成器
static NEXT_DRAWABLE_ID: AtomicU64 = AtomicU64::new(1);

/// 绘图对象默认值
pub mod defaults {
    pub const LINE_THICKNESS: f32 = 3.0;
    pub const FONT_SIZE: f32 = 20.0;
    pub const MIN_FONT_SIZE: f32 = 8.0;
    pub const MAX_FONT_SIZE: f32 = 200.0;
    /// 估算文本宽度时单个字符相对字号的宽度
    pub const CHAR_WIDTH_RATIO: f32 = 0.6;
    pub const LINE_HEIGHT_RATIO: f32 = 1.2;
    pub const ARROW_HEAD_LENGTH: f32 = 15.0;
    pub const ARROW_HEAD_ANGLE: f32 = 0.5;
    /// 包围盒额外留出的抗锯齿边距
    pub const AA_MARGIN: f32 = 1.0;
}

/// 默认颜色（红色）
#[inline]
pub fn default_style() -> DrawStyle {
    DrawStyle {
        stroke_color: Color::RED,
        fill_color: None,
        stroke_width: defaults::LINE_THICKNESS,
    }
}

/// 绘图对象
///
/// 交互完成后创建的纯数据记录，跨模块传递时按值复制，缓存一律以 `id` 为键。
/// 每次修改都会递增 `revision`，代价估算据此判断是否需要重新计算。
#[derive(Debug, Clone)]
pub struct Drawable {
    /// 唯一标识符（用于缓存查找）
    pub id: DrawableId,
    pub kind: DrawableKind,
    /// 点集合（笔迹按顺序记录，形状取起点和终点）
    pub points: Vec<Point>,
    pub style: DrawStyle,
    /// 文本内容
    pub text: String,
    pub font_size: f32,
    /// 是否允许对象级位图缓存
    pub cacheable: bool,
    /// 附带的位图（图片对象）
    pub bitmap: Option<Arc<Surface>>,
    revision: u64,
}

impl Drawable {
    /// 创建新的绘图对象（自动分配 ID）
    pub fn new(kind: DrawableKind) -> Self {
        Self::with_id(NEXT_DRAWABLE_ID.fetch_add(1, Ordering::Relaxed), kind)
    }

    /// 使用指定 ID 创建
    pub fn with_id(id: DrawableId, kind: DrawableKind) -> Self {
        Self {
            id,
            kind,
            points: Vec::new(),
            style: default_style(),
            text: String::new(),
            font_size: defaults::FONT_SIZE,
            cacheable: kind.cacheable_by_default(),
            bitmap: None,
            revision: 0,
        }
    }

    pub fn with_points(mut self, points: impl IntoIterator<Item = Point>) -> Self {
        self.points = points.into_iter().collect();
        self.touch();
        self
    }

    pub fn with_style(mut self, style: DrawStyle) -> Self {
        self.style = style;
        self.touch();
        self
    }

    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// 修改计数
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// 标记内容已修改
    #[inline]
    pub fn touch(&mut self) {
        self.revision += 1;
    }

    /// 追加一个点
    pub fn add_point(&mut self, x: f32, y: f32) {
        self.points.push(Point::new(x, y));
        self.touch();
    }

    /// 设置终点（形状工具拖拽时使用）
    pub fn set_end_point(&mut self, x: f32, y: f32) {
        match self.points.len() {
            0 | 1 => self.points.push(Point::new(x, y)),
            n => self.points[n - 1] = Point::new(x, y),
        }
        self.touch();
    }

    /// 整体平移
    pub fn translate(&mut self, dx: f32, dy: f32) {
        for point in &mut self.points {
            point.x += dx;
            point.y += dy;
        }
        self.touch();
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.touch();
    }

    /// 设置字体大小（限制在有效范围内）
    pub fn set_font_size(&mut self, size: f32) {
        self.font_size = size.clamp(defaults::MIN_FONT_SIZE, defaults::MAX_FONT_SIZE);
        self.touch();
    }

    pub fn set_style(&mut self, style: DrawStyle) {
        self.style = style;
        self.touch();
    }

    pub fn set_bitmap(&mut self, bitmap: Arc<Surface>) {
        self.bitmap = Some(bitmap);
        self.touch();
    }

    /// 画布坐标系中的包围矩形（含线宽和抗锯齿边距）
    pub fn bounds(&self) -> Rectangle {
        let Some(first) = self.points.first() else {
            return Rectangle::ZERO;
        };

        match self.kind {
            DrawableKind::Text => self.text_bounds(*first),
            DrawableKind::Image => self.image_bounds(*first),
            DrawableKind::Arrow => self
                .point_hull()
                .expand(self.stroke_margin() + defaults::ARROW_HEAD_LENGTH),
            _ => self.point_hull().expand(self.stroke_margin()),
        }
    }

    fn stroke_margin(&self) -> f32 {
        self.style.stroke_width.max(0.0) / 2.0 + defaults::AA_MARGIN
    }

    fn point_hull(&self) -> Rectangle {
        let mut min_x = f32::MAX;
        let mut min_y = f32::MAX;
        let mut max_x = f32::MIN;
        let mut max_y = f32::MIN;
        for point in &self.points {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
        }
        Rectangle::from_bounds(min_x, min_y, max_x, max_y)
    }

    fn text_bounds(&self, origin: Point) -> Rectangle {
        let longest = self
            .text
            .lines()
            .map(|line| line.chars().count())
            .max()
            .unwrap_or(0)
            .max(1);
        let lines = self.text.lines().count().max(1);
        Rectangle::new(
            origin.x,
            origin.y,
            longest as f32 * self.font_size * defaults::CHAR_WIDTH_RATIO,
            lines as f32 * self.font_size * defaults::LINE_HEIGHT_RATIO,
        )
        .expand(defaults::AA_MARGIN)
    }

    fn image_bounds(&self, origin: Point) -> Rectangle {
        match (&self.bitmap, self.points.get(1)) {
            (_, Some(end)) => Rectangle::from_bounds(
                origin.x.min(end.x),
                origin.y.min(end.y),
                origin.x.max(end.x),
                origin.y.max(end.y),
            ),
            (Some(bitmap), None) => Rectangle::new(
                origin.x,
                origin.y,
                bitmap.width() as f32,
                bitmap.height() as f32,
            ),
            (None, None) => Rectangle::new(origin.x, origin.y, 0.0, 0.0),
        }
    }

    /// 估算渲染代价（不做缓存，见 `CostMemo`）
    pub fn estimate_cost(&self) -> f32 {
        let kind = self.kind;
        let width_factor = 1.0 + self.style.stroke_width.max(0.0) / 8.0;
        let fill_factor = if self.style.fill_color.is_some() {
            1.5
        } else {
            1.0
        };

        match kind {
            DrawableKind::Stroke => {
                kind.base_cost() + self.points.len() as f32 * 0.5 * width_factor
            }
            DrawableKind::Text => {
                let chars = self.text.chars().count() as f32;
                kind.base_cost() + chars * 2.0 * (self.font_size / defaults::FONT_SIZE)
            }
            DrawableKind::Image => {
                let area = self.bounds().area();
                kind.base_cost() + area / 10_000.0
            }
            _ => kind.base_cost() * width_factor * fill_factor,
        }
    }
}

/// 按 ID 记忆的渲染代价
///
/// 对象修改后 `revision` 变化，下一次查询时重新估算。
#[derive(Debug, Default)]
pub struct CostMemo {
    scores: HashMap<DrawableId, (u64, f32)>,
    computations: u64,
}

impl CostMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取渲染代价（必要时重新计算）
    pub fn cost(&mut self, drawable: &Drawable) -> f32 {
        if let Some(&(revision, score)) = self.scores.get(&drawable.id)
            && revision == drawable.revision()
        {
            return score;
        }
        let score = drawable.estimate_cost();
        self.computations += 1;
        self.scores
            .insert(drawable.id, (drawable.revision(), score));
        score
    }

    /// 丢弃某个对象的记录
    pub fn forget(&mut self, id: DrawableId) {
        self.scores.remove(&id);
    }

    pub fn clear(&mut self) {
        self.scores.clear();
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// 实际执行估算的次数
    pub fn computations(&self) -> u64 {
        self.computations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stroke(points: usize) -> Drawable {
        let mut d = Drawable::new(DrawableKind::Stroke);
        for i in 0..points {
            d.add_point(i as f32, (i * 2) as f32);
        }
        d
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Drawable::new(DrawableKind::Stroke);
        let b = Drawable::new(DrawableKind::Stroke);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_stroke_bounds_include_line_width() {
        let d = Drawable::with_id(1, DrawableKind::Stroke)
            .with_points([Point::new(10.0, 10.0), Point::new(30.0, 20.0)]);
        let margin = defaults::LINE_THICKNESS / 2.0 + defaults::AA_MARGIN;
        assert_eq!(
            d.bounds(),
            Rectangle::from_bounds(10.0 - margin, 10.0 - margin, 30.0 + margin, 20.0 + margin)
        );
    }

    #[test]
    fn test_empty_drawable_has_zero_bounds() {
        assert_eq!(Drawable::new(DrawableKind::Ellipse).bounds(), Rectangle::ZERO);
    }

    #[test]
    fn test_text_bounds_grow_with_content() {
        let mut d = Drawable::with_id(1, DrawableKind::Text).with_points([Point::new(0.0, 0.0)]);
        d.set_text("ab");
        let short = d.bounds();
        d.set_text("abcd\nx");
        let long = d.bounds();
        assert!(long.width > short.width);
        assert!(long.height > short.height);
    }

    #[test]
    fn test_font_size_clamped() {
        let mut d = Drawable::new(DrawableKind::Text);
        d.set_font_size(1.0);
        assert_eq!(d.font_size, defaults::MIN_FONT_SIZE);
        d.set_font_size(10_000.0);
        assert_eq!(d.font_size, defaults::MAX_FONT_SIZE);
    }

    #[test]
    fn test_cost_grows_with_points() {
        assert!(stroke(200).estimate_cost() > stroke(10).estimate_cost());
    }

    #[test]
    fn test_mutation_bumps_revision() {
        let mut d = stroke(2);
        let before = d.revision();
        d.translate(5.0, 5.0);
        assert!(d.revision() > before);
    }

    #[test]
    fn test_cost_memo_recomputes_after_mutation() {
        let mut memo = CostMemo::new();
        let mut d = stroke(10);
        let first = memo.cost(&d);
        assert_eq!(memo.cost(&d), first);
        assert_eq!(memo.computations(), 1);

        for i in 0..100 {
            d.add_point(i as f32, 0.0);
        }
        assert!(memo.cost(&d) > first);
        assert_eq!(memo.computations(), 2);
        assert_eq!(memo.len(), 1);
    }
}
