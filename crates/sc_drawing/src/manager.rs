use std::collections::HashMap;

use sc_rendering::DrawableId;

use crate::element::Drawable;

/// 绘图对象来源（通常由历史记录模块提供）
pub trait DrawableSource {
    /// 按提交顺序返回所有绘图对象
    fn all_drawables(&self) -> Vec<&Drawable>;

    /// 绘图对象数量
    fn count(&self) -> usize;

    /// 按 ID 查找
    fn get(&self, id: DrawableId) -> Option<&Drawable>;
}

/// 绘图对象存储
///
/// 负责绘图对象的添加、删除、查询，按提交顺序保存，并维护 ID 到位置的索引。
/// 包含资源限制功能，防止内存无限增长。
pub struct DrawableStore {
    /// 所有绘图对象
    drawables: Vec<Drawable>,
    /// ID -> 下标
    index: HashMap<DrawableId, usize>,
    /// 最大对象数量限制
    max_drawables: usize,
}

impl Default for DrawableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawableStore {
    /// 默认最大对象数量
    pub const DEFAULT_MAX_DRAWABLES: usize = 10_000;

    /// 创建新的存储
    pub fn new() -> Self {
        Self::with_max_drawables(Self::DEFAULT_MAX_DRAWABLES)
    }

    /// 创建带自定义限制的存储
    pub fn with_max_drawables(max_drawables: usize) -> Self {
        Self {
            drawables: Vec::new(),
            index: HashMap::new(),
            max_drawables: max_drawables.max(1),
        }
    }

    /// 添加绘图对象
    ///
    /// 达到数量上限时移除最早的对象，返回被移除对象的 ID。
    /// 已存在相同 ID 时原位替换。
    pub fn add(&mut self, drawable: Drawable) -> Option<DrawableId> {
        if let Some(&pos) = self.index.get(&drawable.id) {
            self.drawables[pos] = drawable;
            return None;
        }

        let mut evicted = None;
        if self.drawables.len() >= self.max_drawables {
            let removed = self.drawables.remove(0);
            evicted = Some(removed.id);
            self.rebuild_index();
        }
        self.index.insert(drawable.id, self.drawables.len());
        self.drawables.push(drawable);
        evicted
    }

    /// 移除绘图对象
    pub fn remove(&mut self, id: DrawableId) -> Option<Drawable> {
        let pos = self.index.remove(&id)?;
        let removed = self.drawables.remove(pos);
        self.rebuild_index();
        Some(removed)
    }

    /// 获取可变引用（调用方修改后需要让缓存失效）
    pub fn get_mut(&mut self, id: DrawableId) -> Option<&mut Drawable> {
        let pos = *self.index.get(&id)?;
        self.drawables.get_mut(pos)
    }

    /// 清空
    pub fn clear(&mut self) {
        self.drawables.clear();
        self.index.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.drawables.is_empty()
    }

    /// 所有对象 ID，按提交顺序
    pub fn ids(&self) -> Vec<DrawableId> {
        self.drawables.iter().map(|d| d.id).collect()
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .drawables
            .iter()
            .enumerate()
            .map(|(pos, d)| (d.id, pos))
            .collect();
    }
}

impl DrawableSource for DrawableStore {
    fn all_drawables(&self) -> Vec<&Drawable> {
        self.drawables.iter().collect()
    }

    fn count(&self) -> usize {
        self.drawables.len()
    }

    fn get(&self, id: DrawableId) -> Option<&Drawable> {
        self.index.get(&id).and_then(|&pos| self.drawables.get(pos))
    }
}
