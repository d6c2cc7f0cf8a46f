// 画布渲染性能子系统：脏区域、对象缓存、图层缓存与重绘调度
pub mod config;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod prewarm;
pub mod scope;
pub mod stats;
pub mod target;

// 重新导出主要类型
pub use config::OrchestratorConfig;
pub use error::{RedrawError, RedrawResult};
pub use memory::{ManualMemorySampler, MemoryConfig, MemoryMonitor, MemorySampler, PressureChange};
pub use orchestrator::{IMPLICIT_LAYER, RedrawOrchestrator};
pub use prewarm::{PrewarmHandle, PrewarmTask};
pub use scope::{InvalidateTarget, RedrawPath, RedrawScope};
pub use stats::{RedrawReport, RenderStats};
pub use target::{BandedSurface, SurfaceProvider, ZBand};

pub use sc_drawing;
pub use sc_rendering;
pub use sc_settings;
