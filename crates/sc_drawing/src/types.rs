/// 绘图对象类型
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawableKind {
    /// 自由画笔笔迹
    #[default]
    Stroke,
    /// 矩形
    Rectangle,
    /// 圆形/椭圆
    Ellipse,
    /// 直线
    Line,
    /// 箭头
    Arrow,
    /// 文本
    Text,
    /// 位图
    Image,
}

impl DrawableKind {
    /// 是否是形状
    pub fn is_shape(&self) -> bool {
        matches!(
            self,
            Self::Rectangle | Self::Ellipse | Self::Line | Self::Arrow
        )
    }

    /// 是否是自由绘制
    pub fn is_freeform(&self) -> bool {
        matches!(self, Self::Stroke)
    }

    /// 是否是文本
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text)
    }

    /// 默认是否参与对象级缓存
    ///
    /// 简单图元重绘比位图合成更便宜，默认不缓存。
    pub fn cacheable_by_default(&self) -> bool {
        !matches!(self, Self::Rectangle | Self::Line)
    }

    /// 渲染代价的基础分
    pub fn base_cost(&self) -> f32 {
        match self {
            Self::Stroke => 4.0,
            Self::Rectangle | Self::Line => 1.0,
            Self::Arrow => 3.0,
            Self::Ellipse => 6.0,
            Self::Text => 20.0,
            Self::Image => 10.0,
        }
    }
}
