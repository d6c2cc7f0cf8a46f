pub mod cache;
pub mod element;
pub mod manager;
pub mod render;
pub mod types;

pub use sc_rendering;

// 重新导出常用类型
pub use cache::{ObjectCacheStats, ObjectRenderCache, PrewarmOptions};
pub use element::{CostMemo, Drawable, default_style, defaults};
pub use manager::{DrawableSource, DrawableStore};
pub use render::{DrawableRenderer, RenderError, SkiaRenderer};
pub use types::DrawableKind;
