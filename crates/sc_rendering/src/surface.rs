//! 离屏位图封装
//!
//! `Surface` 基于 `tiny_skia::Pixmap`，额外携带：
//! - 原点偏移（按包围盒分配的对象位图不必覆盖整张画布）
//! - 可保存/恢复的全局透明度（合成图层时使用）

use std::fmt;

use thiserror::Error;
use tiny_skia::{
    BlendMode, FillRule, Mask, Paint, PathBuilder, Pixmap, PixmapPaint, Transform,
};

use crate::types::{Color, Point, Rectangle};

/// 位图相关错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("Surface allocation failed: {width}x{height}")]
    Allocation { width: u32, height: u32 },

    #[error("Draw target unavailable: {0}")]
    Unavailable(String),
}

/// 离屏位图
#[derive(Clone)]
pub struct Surface {
    pixmap: Pixmap,
    /// 位图左上角在画布坐标系中的位置
    origin: (i32, i32),
    global_alpha: f32,
    alpha_stack: Vec<f32>,
}

impl Surface {
    /// 创建覆盖 (0,0)-(width,height) 的位图
    pub fn new(width: u32, height: u32) -> Result<Self, SurfaceError> {
        let pixmap =
            Pixmap::new(width, height).ok_or(SurfaceError::Allocation { width, height })?;
        Ok(Self {
            pixmap,
            origin: (0, 0),
            global_alpha: 1.0,
            alpha_stack: Vec::new(),
        })
    }

    /// 按画布中的某个区域分配位图（区域向外取整到像素）
    pub fn for_region(region: Rectangle) -> Result<Self, SurfaceError> {
        let rounded = region.round_out();
        if !rounded.is_valid() {
            return Err(SurfaceError::Allocation {
                width: rounded.width.max(0.0) as u32,
                height: rounded.height.max(0.0) as u32,
            });
        }
        let mut surface = Self::new(rounded.width as u32, rounded.height as u32)?;
        surface.origin = (rounded.x as i32, rounded.y as i32);
        Ok(surface)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    #[inline]
    pub fn origin(&self) -> (i32, i32) {
        self.origin
    }

    /// 位图在画布坐标系中覆盖的区域
    pub fn bounds(&self) -> Rectangle {
        Rectangle::new(
            self.origin.0 as f32,
            self.origin.1 as f32,
            self.width() as f32,
            self.height() as f32,
        )
    }

    /// 像素内存占用（RGBA 每像素 4 字节）
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.width() as usize * self.height() as usize * 4
    }

    /// 画布坐标到位图坐标的变换，渲染器绘制时必须使用
    pub fn transform(&self) -> Transform {
        Transform::from_translate(-(self.origin.0 as f32), -(self.origin.1 as f32))
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }

    /// 原始像素数据（预乘 RGBA）
    pub fn data(&self) -> &[u8] {
        self.pixmap.data()
    }

    /// 像素是否完全一致
    pub fn pixels_eq(&self, other: &Surface) -> bool {
        self.width() == other.width()
            && self.height() == other.height()
            && self.data() == other.data()
    }

    /// 清空为全透明
    pub fn clear(&mut self) {
        self.pixmap.fill(tiny_skia::Color::TRANSPARENT);
    }

    /// 整体填充颜色
    pub fn fill(&mut self, color: Color) {
        self.pixmap.fill(color.to_skia());
    }

    /// 把若干画布区域清为透明
    pub fn clear_rects(&mut self, rects: &[Rectangle]) {
        let mut paint = Paint::default();
        paint.blend_mode = BlendMode::Clear;
        paint.anti_alias = false;
        let transform = self.transform();
        for rect in rects {
            if let Some(r) = rect.to_skia() {
                self.pixmap.fill_rect(r, &paint, transform, None);
            }
        }
    }

    /// 当前全局透明度
    #[inline]
    pub fn global_alpha(&self) -> f32 {
        self.global_alpha
    }

    /// 设置全局透明度，影响后续所有 `blit`
    pub fn set_global_alpha(&mut self, alpha: f32) {
        self.global_alpha = if alpha.is_finite() {
            alpha.clamp(0.0, 1.0)
        } else {
            1.0
        };
    }

    /// 保存当前全局透明度
    pub fn save_alpha(&mut self) {
        self.alpha_stack.push(self.global_alpha);
    }

    /// 恢复最近一次保存的全局透明度
    pub fn restore_alpha(&mut self) {
        if let Some(alpha) = self.alpha_stack.pop() {
            self.global_alpha = alpha;
        }
    }

    /// 把另一个位图按其画布位置（加上偏移）合成到本位图
    pub fn blit(&mut self, src: &Surface, offset: Point, clip: Option<&ClipMask>) {
        if self.global_alpha <= 0.0 {
            return;
        }
        let x = src.origin.0 - self.origin.0 + offset.x.round() as i32;
        let y = src.origin.1 - self.origin.1 + offset.y.round() as i32;
        let paint = PixmapPaint {
            opacity: self.global_alpha,
            ..PixmapPaint::default()
        };
        self.pixmap.draw_pixmap(
            x,
            y,
            src.pixmap.as_ref(),
            &paint,
            Transform::identity(),
            clip.map(|c| &c.mask),
        );
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("origin", &self.origin)
            .field("global_alpha", &self.global_alpha)
            .finish()
    }
}

/// 由若干矩形构成的剪裁蒙版（用于局部重绘）
pub struct ClipMask {
    mask: Mask,
}

impl ClipMask {
    /// 为给定尺寸、原点为 (0,0) 的目标位图构建蒙版
    pub fn from_rects(width: u32, height: u32, rects: &[Rectangle]) -> Option<Self> {
        let mut mask = Mask::new(width, height)?;
        let mut builder = PathBuilder::new();
        for rect in rects {
            if let Some(r) = rect.to_skia() {
                builder.push_rect(r);
            }
        }
        let path = builder.finish()?;
        mask.fill_path(&path, FillRule::Winding, false, Transform::identity());
        Some(Self { mask })
    }
}
