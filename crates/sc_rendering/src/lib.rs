pub mod clock;
pub mod dirty_rect;
pub mod entry_cache;
pub mod layer_cache;
pub mod surface;
pub mod types;

// 重新导出常用类型
pub use clock::{Clock, ManualClock, SystemClock};
pub use dirty_rect::{DirtyRectTracker, DirtyRegionConfig, DirtyType, merge_rects};
pub use entry_cache::{CacheConfig, CacheEntry, EntryCache, EntryCacheStats, EntryMeta};
pub use layer_cache::{CacheState, LayerCache, LayerInfo, LayerRenderOutcome};
pub use surface::{ClipMask, Surface, SurfaceError};
pub use types::{Color, DrawStyle, DrawableId, LayerId, Point, Rectangle};

pub use tiny_skia;
