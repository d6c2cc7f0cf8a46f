use std::collections::HashMap;
use std::fmt::Display;

use crate::surface::{ClipMask, Surface, SurfaceError};
use crate::types::{DrawableId, LayerId, Point};

/// 图层元数据（由图层管理模块提供）
#[derive(Debug, Clone, PartialEq)]
pub struct LayerInfo {
    pub id: LayerId,
    /// 渲染顺序（越小越先渲染）
    pub z_index: i32,
    pub visible: bool,
    /// 锁定的图层直接使用缓存位图，不再重绘
    pub locked: bool,
    pub opacity: f32,
    /// 成员绘图对象，按插入顺序
    pub members: Vec<DrawableId>,
    /// 合成时的整体平移（移动整个图层无需重绘位图）
    pub offset: Point,
}

impl LayerInfo {
    pub fn new(id: LayerId, z_index: i32) -> Self {
        Self {
            id,
            z_index,
            visible: true,
            locked: false,
            opacity: 1.0,
            members: Vec::new(),
            offset: Point::ZERO,
        }
    }

    pub fn with_members(mut self, members: Vec<DrawableId>) -> Self {
        self.members = members;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }
}

/// 缓存条目状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// 缓存有效
    Valid,
    /// 缓存无效，需要重绘
    Invalid,
    /// 缓存不存在
    Missing,
}

/// 单次图层渲染结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerRenderOutcome {
    /// 是否真正执行了重绘（有效或锁定的图层不会重绘）
    pub rendered: bool,
    /// 只叠加绘制了新追加的成员
    pub appended: usize,
    /// 绘制失败被跳过的成员数量
    pub failures: usize,
}

struct LayerSlot {
    info: LayerInfo,
    surface: Option<Surface>,
    valid: bool,
    /// 位图有效时新追加、尚未绘制的成员
    pending: Vec<DrawableId>,
}

/// 图层缓存管理器
///
/// 每个图层持有一张与画布等大的离屏位图。图层可以独立失效和重绘，
/// 合成时按 z-order 从低到高叠加到目标位图。
#[derive(Default)]
pub struct LayerCache {
    layers: HashMap<LayerId, LayerSlot>,
    /// 按 (z_index, id) 排序的图层 ID
    order: Vec<LayerId>,
    /// 缓存尺寸
    size: (u32, u32),
    /// 累计图层重绘次数
    render_count: u64,
}

impl LayerCache {
    /// 创建新的图层缓存管理器
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            ..Self::default()
        }
    }

    /// 设置缓存尺寸
    ///
    /// 尺寸变化会使所有缓存失效并释放位图
    pub fn set_size(&mut self, width: u32, height: u32) {
        if self.size != (width, height) {
            self.size = (width, height);
            self.release_surfaces();
        }
    }

    /// 获取缓存尺寸
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// 同步图层元数据
    ///
    /// 成员删除或顺序变化会使图层失效；只在末尾追加成员时保留位图，
    /// 新成员留到下一次 `render` 叠加绘制。可见性、透明度、锁定和偏移只影响合成。
    /// 返回成员是否变化。
    pub fn sync_layer(&mut self, info: LayerInfo) -> bool {
        let id = info.id;
        let changed = match self.layers.get_mut(&id) {
            Some(slot) => {
                let reorder = slot.info.z_index != info.z_index;
                let changed = slot.info.members != info.members;
                if changed {
                    let old = slot.info.members.len();
                    if slot.valid && info.members.starts_with(&slot.info.members) {
                        slot.pending.extend_from_slice(&info.members[old..]);
                    } else {
                        slot.valid = false;
                        slot.pending.clear();
                    }
                }
                slot.info = info;
                if reorder {
                    self.sort_order();
                }
                changed
            }
            None => {
                self.layers.insert(
                    id,
                    LayerSlot {
                        info,
                        surface: None,
                        valid: false,
                        pending: Vec::new(),
                    },
                );
                self.order.push(id);
                self.sort_order();
                true
            }
        };
        if changed {
            tracing::trace!(layer = id, "layer membership changed");
        }
        changed
    }

    /// 移除图层
    pub fn remove_layer(&mut self, id: LayerId) -> Option<LayerInfo> {
        let slot = self.layers.remove(&id)?;
        self.order.retain(|&layer| layer != id);
        Some(slot.info)
    }

    /// 获取图层元数据
    pub fn layer(&self, id: LayerId) -> Option<&LayerInfo> {
        self.layers.get(&id).map(|slot| &slot.info)
    }

    /// 按渲染顺序遍历图层
    pub fn layers_in_order(&self) -> impl Iterator<Item = &LayerInfo> {
        self.order
            .iter()
            .filter_map(|id| self.layers.get(id).map(|slot| &slot.info))
    }

    /// 包含指定绘图对象的图层
    pub fn layers_containing(&self, drawable: DrawableId) -> Vec<LayerId> {
        self.order
            .iter()
            .copied()
            .filter(|id| {
                self.layers
                    .get(id)
                    .is_some_and(|slot| slot.info.members.contains(&drawable))
            })
            .collect()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// 获取图层的缓存位图
    pub fn get_bitmap(&self, id: LayerId) -> Option<&Surface> {
        self.layers.get(&id).and_then(|slot| slot.surface.as_ref())
    }

    /// 获取指定层的缓存状态
    pub fn get_state(&self, id: LayerId) -> CacheState {
        match self.layers.get(&id) {
            Some(LayerSlot {
                surface: Some(_),
                valid: true,
                pending,
                ..
            }) if pending.is_empty() => CacheState::Valid,
            Some(LayerSlot {
                surface: Some(_), ..
            }) => CacheState::Invalid,
            _ => CacheState::Missing,
        }
    }

    /// 检查指定层是否有效
    pub fn is_valid(&self, id: LayerId) -> bool {
        self.get_state(id) == CacheState::Valid
    }

    /// 位图有效且只差末尾追加的成员
    pub fn is_append_only(&self, id: LayerId) -> bool {
        self.layers.get(&id).is_some_and(|slot| {
            slot.surface.is_some() && slot.valid && !slot.pending.is_empty()
        })
    }

    /// 使指定层失效
    pub fn mark_dirty(&mut self, id: LayerId) {
        if let Some(slot) = self.layers.get_mut(&id) {
            slot.valid = false;
            slot.pending.clear();
        }
    }

    /// 使所有层失效
    pub fn invalidate_all(&mut self) {
        for slot in self.layers.values_mut() {
            slot.valid = false;
            slot.pending.clear();
        }
    }

    /// 释放指定层的位图
    pub fn release_surface(&mut self, id: LayerId) {
        if let Some(slot) = self.layers.get_mut(&id) {
            slot.surface = None;
            slot.valid = false;
            slot.pending.clear();
        }
    }

    /// 释放所有位图（整场景缓存接管或尺寸变化时）
    pub fn release_surfaces(&mut self) {
        for slot in self.layers.values_mut() {
            slot.surface = None;
            slot.valid = false;
            slot.pending.clear();
        }
    }

    /// 等待叠加绘制的新成员
    pub fn pending_members(&self, id: LayerId) -> &[DrawableId] {
        self.layers
            .get(&id)
            .map(|slot| slot.pending.as_slice())
            .unwrap_or(&[])
    }

    /// 获取所有无效的层
    pub fn get_invalid_layers(&self) -> Vec<LayerId> {
        self.order
            .iter()
            .copied()
            .filter(|&id| !self.is_valid(id))
            .collect()
    }

    /// 获取所有有效的层
    pub fn get_valid_layers(&self) -> Vec<LayerId> {
        self.order
            .iter()
            .copied()
            .filter(|&id| self.is_valid(id))
            .collect()
    }

    /// 图层位图占用的内存
    pub fn memory_bytes(&self) -> usize {
        self.layers
            .values()
            .filter_map(|slot| slot.surface.as_ref())
            .map(Surface::byte_size)
            .sum()
    }

    pub fn render_count(&self) -> u64 {
        self.render_count
    }

    /// 按需重绘图层
    ///
    /// 有效的图层直接返回；锁定且已有位图的图层不重绘。只有末尾追加的成员时，
    /// 在现有位图上叠加绘制这些成员。否则清空位图，按插入顺序逐个绘制全部成员。
    /// 单个成员绘制失败只记录日志并跳过，此时图层保持无效，下一次重绘会重试。
    pub fn render<F, E>(&mut self, id: LayerId, mut draw: F) -> Result<LayerRenderOutcome, SurfaceError>
    where
        F: FnMut(&mut Surface, DrawableId) -> Result<(), E>,
        E: Display,
    {
        let (width, height) = self.size;
        let Some(slot) = self.layers.get_mut(&id) else {
            return Err(SurfaceError::Unavailable(format!("unknown layer {id}")));
        };

        let LayerSlot {
            info,
            surface,
            valid,
            pending,
        } = slot;

        if surface
            .as_ref()
            .is_some_and(|s| (s.width(), s.height()) != (width, height))
        {
            *surface = None;
            *valid = false;
            pending.clear();
        }

        if surface.is_some() && (info.locked || (*valid && pending.is_empty())) {
            return Ok(LayerRenderOutcome::default());
        }

        if *valid && let Some(bitmap) = surface.as_mut() {
            let mut failures = 0;
            let appended = pending.len();
            for member in pending.drain(..) {
                if let Err(err) = draw(bitmap, member) {
                    tracing::warn!(layer = id, drawable = member, %err, "append failed, layer invalidated");
                    failures += 1;
                }
            }
            *valid = failures == 0;
            return Ok(LayerRenderOutcome {
                rendered: false,
                appended,
                failures,
            });
        }

        if surface.is_none() {
            *surface = Some(Surface::new(width, height)?);
        }
        let Some(bitmap) = surface.as_mut() else {
            return Err(SurfaceError::Allocation { width, height });
        };

        bitmap.clear();
        pending.clear();
        let mut failures = 0;
        for &member in &info.members {
            if let Err(err) = draw(bitmap, member) {
                tracing::warn!(layer = id, drawable = member, %err, "skipping drawable in layer render");
                failures += 1;
            }
        }

        *valid = failures == 0;
        self.render_count += 1;
        Ok(LayerRenderOutcome {
            rendered: true,
            appended: 0,
            failures,
        })
    }

    /// 按 z-order 把满足条件的图层合成到目标位图
    ///
    /// 每个图层的透明度通过保存/恢复目标的全局透明度施加；不可见图层跳过但保留缓存。
    /// 返回实际合成的图层数量。
    pub fn composite<P>(&self, target: &mut Surface, mut include: P, clip: Option<&ClipMask>) -> usize
    where
        P: FnMut(&LayerInfo) -> bool,
    {
        let mut blitted = 0;
        for info in self.layers_in_order() {
            if !info.visible || !include(info) {
                continue;
            }
            let Some(bitmap) = self.get_bitmap(info.id) else {
                continue;
            };
            target.save_alpha();
            target.set_global_alpha(target.global_alpha() * info.opacity);
            target.blit(bitmap, info.offset, clip);
            target.restore_alpha();
            blitted += 1;
        }
        blitted
    }

    fn sort_order(&mut self) {
        let layers = &self.layers;
        self.order.sort_by_key(|id| {
            let z = layers.get(id).map_or(i32::MAX, |slot| slot.info.z_index);
            (z, *id)
        });
    }
}
