//! 绘制目标
//!
//! 可见画面可以拆分为三个互不干扰的分段目标：选中图层之下、选中图层、选中图层之上。
//! 只有一个分段变化时，其他分段上一次合成的像素保持不变。

use sc_rendering::{Surface, SurfaceError};

/// 分段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum ZBand {
    Bottom,
    Selected,
    Top,
}

impl ZBand {
    pub const ALL: [ZBand; 3] = [ZBand::Bottom, ZBand::Selected, ZBand::Top];
}

/// 绘制目标提供者
pub trait SurfaceProvider {
    /// 目标尺寸
    fn size(&self) -> (u32, u32);

    /// 是否按分段拆分
    fn is_split(&self) -> bool;

    /// 准备本次重绘要写入的分段目标
    ///
    /// 失败时不得修改任何已有像素；调用方在全部成功之前不会清空任何目标。
    fn acquire(&mut self, bands: &[ZBand]) -> Result<(), SurfaceError>;

    /// 获取分段目标（未拆分时所有分段都返回同一个位图）
    fn target(&mut self, band: ZBand) -> Option<&mut Surface>;

    /// 调整尺寸
    fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError>;
}

/// 基于离屏位图的分段目标
#[derive(Debug)]
pub struct BandedSurface {
    bottom: Surface,
    selected: Option<Surface>,
    top: Option<Surface>,
    split: bool,
}

impl BandedSurface {
    /// 创建单一目标
    pub fn new(width: u32, height: u32) -> Result<Self, SurfaceError> {
        Ok(Self {
            bottom: Surface::new(width, height)?,
            selected: None,
            top: None,
            split: false,
        })
    }

    /// 创建按分段拆分的目标
    pub fn split(width: u32, height: u32) -> Result<Self, SurfaceError> {
        let mut surface = Self::new(width, height)?;
        surface.set_split(true);
        Ok(surface)
    }

    /// 开关分段拆分；关闭时释放上层两个位图
    pub fn set_split(&mut self, split: bool) {
        self.split = split;
        if !split {
            self.selected = None;
            self.top = None;
        }
    }

    /// 只读访问分段位图
    pub fn band(&self, band: ZBand) -> Option<&Surface> {
        match (band, self.split) {
            (ZBand::Bottom, _) | (_, false) => Some(&self.bottom),
            (ZBand::Selected, true) => self.selected.as_ref(),
            (ZBand::Top, true) => self.top.as_ref(),
        }
    }

    /// 把所有分段按顺序叠加成一张位图（用于展示或比较）
    pub fn flatten(&self) -> Result<Surface, SurfaceError> {
        let (width, height) = self.size();
        let mut out = Surface::new(width, height)?;
        out.blit(&self.bottom, sc_rendering::Point::ZERO, None);
        if self.split {
            for layer in [&self.selected, &self.top].into_iter().flatten() {
                out.blit(layer, sc_rendering::Point::ZERO, None);
            }
        }
        Ok(out)
    }
}

impl SurfaceProvider for BandedSurface {
    fn size(&self) -> (u32, u32) {
        (self.bottom.width(), self.bottom.height())
    }

    fn is_split(&self) -> bool {
        self.split
    }

    fn acquire(&mut self, bands: &[ZBand]) -> Result<(), SurfaceError> {
        if !self.split {
            return Ok(());
        }
        let (width, height) = self.size();
        // 先分配全部缺失的位图，成功后再写入，避免半途失败留下部分状态
        let selected = match (&self.selected, bands.contains(&ZBand::Selected)) {
            (None, true) => Some(Surface::new(width, height)?),
            _ => None,
        };
        let top = match (&self.top, bands.contains(&ZBand::Top)) {
            (None, true) => Some(Surface::new(width, height)?),
            _ => None,
        };
        if selected.is_some() {
            self.selected = selected;
        }
        if top.is_some() {
            self.top = top;
        }
        Ok(())
    }

    fn target(&mut self, band: ZBand) -> Option<&mut Surface> {
        match (band, self.split) {
            (ZBand::Bottom, _) | (_, false) => Some(&mut self.bottom),
            (ZBand::Selected, true) => self.selected.as_mut(),
            (ZBand::Top, true) => self.top.as_mut(),
        }
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        if self.size() == (width, height) {
            return Ok(());
        }
        self.bottom = Surface::new(width, height)?;
        self.selected = None;
        self.top = None;
        Ok(())
    }
}
