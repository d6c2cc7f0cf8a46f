use sc_rendering::{DrawableId, LayerId};

/// 重绘范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedrawScope {
    /// 清空并重绘所有目标
    Full,
    /// 只在现有内容上追加新提交的绘图对象
    Incremental(Vec<DrawableId>),
    /// 只重新合成包含该图层的分段
    ByLayer(LayerId),
    /// 只重新合成 z 值落在 [low, high] 内的图层所在分段
    ByZBand { low: i32, high: i32 },
    /// 只重绘已标记的脏区域
    Dirty,
}

/// 缓存失效目标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidateTarget {
    Drawable(DrawableId),
    Layer(LayerId),
    All,
}

/// 本次重绘实际走的路径
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum RedrawPath {
    /// 没有需要重绘的内容
    #[default]
    Skipped,
    /// 整场景位图
    Scene,
    /// 逐图层合成
    Layers,
    /// 追加绘制
    Incremental,
    /// 脏区域裁剪合成
    Dirty,
}
