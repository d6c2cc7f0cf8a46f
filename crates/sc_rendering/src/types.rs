/// 绘图对象唯一标识符
pub type DrawableId = u64;

/// 图层唯一标识符
pub type LayerId = u64;

/// 颜色定义
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    /// 创建不透明颜色
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// 创建带透明度的颜色
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// 黑色
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    /// 白色
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    /// 红色
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    /// 透明
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    /// 转换为 tiny-skia 颜色（分量越界时截断）
    pub fn to_skia(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba(
            self.r.clamp(0.0, 1.0),
            self.g.clamp(0.0, 1.0),
            self.b.clamp(0.0, 1.0),
            self.a.clamp(0.0, 1.0),
        )
        .unwrap_or(tiny_skia::Color::BLACK)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

/// 点定义
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub const ZERO: Point = Point::new(0.0, 0.0);
}

/// 矩形定义
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rectangle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rectangle {
    /// 创建新的矩形
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 从左上角和右下角坐标创建矩形
    pub fn from_bounds(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }

    /// 获取右边界
    #[inline]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// 获取下边界
    #[inline]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// 面积
    #[inline]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// 所有分量有限且面积为正
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }

    /// 检查点是否在矩形内
    #[inline]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }

    /// 检查另一个矩形是否完全包含在内
    pub fn contains_rect(&self, other: &Rectangle) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// 检查两个矩形是否相交
    pub fn intersects(&self, other: &Rectangle) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// 两个矩形之间的间隙（水平与垂直间距的较大值，相交时为 0）
    pub fn gap(&self, other: &Rectangle) -> f32 {
        let dx = (other.x - self.right()).max(self.x - other.right()).max(0.0);
        let dy = (other.y - self.bottom()).max(self.y - other.bottom()).max(0.0);
        dx.max(dy)
    }

    /// 合并两个矩形
    pub fn union(&self, other: &Rectangle) -> Rectangle {
        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());

        Rectangle::from_bounds(left, top, right, bottom)
    }

    /// 求交集，不相交时返回 None
    pub fn intersection(&self, other: &Rectangle) -> Option<Rectangle> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right > left && bottom > top {
            Some(Rectangle::from_bounds(left, top, right, bottom))
        } else {
            None
        }
    }

    /// 扩展矩形
    pub fn expand(&self, margin: f32) -> Rectangle {
        Rectangle {
            x: self.x - margin,
            y: self.y - margin,
            width: self.width + margin * 2.0,
            height: self.height + margin * 2.0,
        }
    }

    /// 平移矩形
    pub fn translate(&self, dx: f32, dy: f32) -> Rectangle {
        Rectangle {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    /// 向外取整到像素网格
    pub fn round_out(&self) -> Rectangle {
        Rectangle::from_bounds(
            self.x.floor(),
            self.y.floor(),
            self.right().ceil(),
            self.bottom().ceil(),
        )
    }

    /// 转换为 tiny-skia 矩形
    pub fn to_skia(&self) -> Option<tiny_skia::Rect> {
        tiny_skia::Rect::from_xywh(self.x, self.y, self.width, self.height)
    }

    /// 零矩形
    pub const ZERO: Rectangle = Rectangle::new(0.0, 0.0, 0.0, 0.0);
}

/// 绘制样式
#[derive(Debug, Clone, PartialEq)]
pub struct DrawStyle {
    pub stroke_color: Color,
    pub fill_color: Option<Color>,
    pub stroke_width: f32,
}

impl Default for DrawStyle {
    fn default() -> Self {
        Self {
            stroke_color: Color::BLACK,
            fill_color: None,
            stroke_width: 1.0,
        }
    }
}
