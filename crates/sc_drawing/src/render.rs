//! 绘图对象渲染接口
//!
//! 具体的工具几何由工具层负责，这里只定义边界：`DrawableRenderer` 把一个绘图对象画到
//! 给定位图上。渲染器必须使用 `Surface::transform()`，这样同一个对象既能画到整张画布，
//! 也能画到按包围盒分配的对象缓存位图上。

use sc_rendering::tiny_skia::{
    FillRule, LineCap, LineJoin, Paint, Path, PathBuilder, Stroke, Transform,
};
use sc_rendering::{DrawableId, Point, Surface, SurfaceError};
use thiserror::Error;

use crate::element::{Drawable, defaults};
use crate::types::DrawableKind;

/// 渲染错误
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("Drawable {id} failed to render: {reason}")]
    Draw { id: DrawableId, reason: String },

    #[error("Drawable {0} is waiting for an external resource")]
    ResourcePending(DrawableId),
}

impl RenderError {
    /// 是否是离屏位图分配失败（可以退化为直接绘制）
    pub fn is_allocation(&self) -> bool {
        matches!(self, RenderError::Surface(SurfaceError::Allocation { .. }))
    }
}

/// 绘图对象渲染器
pub trait DrawableRenderer {
    fn render(&self, surface: &mut Surface, drawable: &Drawable) -> Result<(), RenderError>;
}

impl<F> DrawableRenderer for F
where
    F: Fn(&mut Surface, &Drawable) -> Result<(), RenderError>,
{
    fn render(&self, surface: &mut Surface, drawable: &Drawable) -> Result<(), RenderError> {
        self(surface, drawable)
    }
}

/// 基于 tiny-skia 的基础渲染器
///
/// 覆盖笔迹、矩形、椭圆、直线、箭头和位图；文本只绘制每行的基线，
/// 字形排版属于文本编辑模块。
#[derive(Debug, Default, Clone, Copy)]
pub struct SkiaRenderer;

impl DrawableRenderer for SkiaRenderer {
    fn render(&self, surface: &mut Surface, drawable: &Drawable) -> Result<(), RenderError> {
        if drawable.points.is_empty() {
            return Ok(());
        }
        let transform = surface.transform();

        match drawable.kind {
            DrawableKind::Stroke => {
                if drawable.points.len() == 1 {
                    let p = drawable.points[0];
                    let r = (drawable.style.stroke_width / 2.0).max(0.5);
                    if let Some(dot) = PathBuilder::from_circle(p.x, p.y, r) {
                        fill(surface, drawable, &dot, transform);
                    }
                } else if let Some(path) = polyline(&drawable.points) {
                    stroke(surface, drawable, &path, transform);
                }
            }
            DrawableKind::Line => {
                if let Some(path) = polyline(&drawable.points) {
                    stroke(surface, drawable, &path, transform);
                }
            }
            DrawableKind::Rectangle | DrawableKind::Ellipse => {
                let Some((start, end)) = endpoints(drawable) else {
                    return Ok(());
                };
                let Some(rect) = sc_rendering::tiny_skia::Rect::from_ltrb(
                    start.x.min(end.x),
                    start.y.min(end.y),
                    start.x.max(end.x),
                    start.y.max(end.y),
                ) else {
                    return Ok(());
                };
                let path = if drawable.kind == DrawableKind::Rectangle {
                    Some(PathBuilder::from_rect(rect))
                } else {
                    PathBuilder::from_oval(rect)
                };
                if let Some(path) = path {
                    if drawable.style.fill_color.is_some() {
                        fill(surface, drawable, &path, transform);
                    }
                    stroke(surface, drawable, &path, transform);
                }
            }
            DrawableKind::Arrow => {
                let Some((start, end)) = endpoints(drawable) else {
                    return Ok(());
                };
                if let Some(path) = arrow_path(start, end) {
                    stroke(surface, drawable, &path, transform);
                }
            }
            DrawableKind::Text => {
                let origin = drawable.points[0];
                let line_height = drawable.font_size * defaults::LINE_HEIGHT_RATIO;
                let mut builder = PathBuilder::new();
                for (i, line) in drawable.text.lines().enumerate() {
                    let width = line.chars().count() as f32
                        * drawable.font_size
                        * defaults::CHAR_WIDTH_RATIO;
                    let y = origin.y + (i as f32 + 1.0) * line_height;
                    builder.move_to(origin.x, y);
                    builder.line_to(origin.x + width, y);
                }
                if let Some(path) = builder.finish() {
                    stroke(surface, drawable, &path, transform);
                }
            }
            DrawableKind::Image => {
                let Some(bitmap) = drawable.bitmap.as_ref() else {
                    return Err(RenderError::ResourcePending(drawable.id));
                };
                let origin = drawable.points[0];
                let (bx, by) = bitmap.origin();
                surface.blit(
                    bitmap,
                    Point::new(origin.x - bx as f32, origin.y - by as f32),
                    None,
                );
            }
        }
        Ok(())
    }
}

fn endpoints(drawable: &Drawable) -> Option<(Point, Point)> {
    let start = *drawable.points.first()?;
    let end = *drawable.points.last()?;
    (drawable.points.len() >= 2).then_some((start, end))
}

fn polyline(points: &[Point]) -> Option<Path> {
    let (first, rest) = points.split_first()?;
    let mut builder = PathBuilder::new();
    builder.move_to(first.x, first.y);
    for p in rest {
        builder.line_to(p.x, p.y);
    }
    builder.finish()
}

fn arrow_path(start: Point, end: Point) -> Option<Path> {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len < f32::EPSILON {
        return None;
    }
    let angle = dy.atan2(dx);
    let head = defaults::ARROW_HEAD_LENGTH.min(len);

    let mut builder = PathBuilder::new();
    builder.move_to(start.x, start.y);
    builder.line_to(end.x, end.y);
    for side in [-1.0f32, 1.0] {
        let a = angle + std::f32::consts::PI + side * defaults::ARROW_HEAD_ANGLE;
        builder.move_to(end.x, end.y);
        builder.line_to(end.x + head * a.cos(), end.y + head * a.sin());
    }
    builder.finish()
}

fn paint_for(color: sc_rendering::Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color.to_skia());
    paint.anti_alias = true;
    paint
}

fn stroke(surface: &mut Surface, drawable: &Drawable, path: &Path, transform: Transform) {
    let paint = paint_for(drawable.style.stroke_color);
    let stroke = Stroke {
        width: drawable.style.stroke_width.max(0.1),
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };
    surface
        .pixmap_mut()
        .stroke_path(path, &paint, &stroke, transform, None);
}

fn fill(surface: &mut Surface, drawable: &Drawable, path: &Path, transform: Transform) {
    let color = drawable
        .style
        .fill_color
        .unwrap_or(drawable.style.stroke_color);
    let paint = paint_for(color);
    surface
        .pixmap_mut()
        .fill_path(path, &paint, FillRule::Winding, transform, None);
}
