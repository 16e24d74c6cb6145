//! 渲染线程侧
//!
//! ## 架构设计
//!
//! ```text
//! ┌──────────────────────┐  RenderCommand   ┌──────────────────────────────┐
//! │  Simulation Thread   │ ───────────────► │        Render Thread          │
//! │  system.submit()     │   (crossbeam)    │  RenderScene::begin_frame()   │
//! └──────────────────────┘                  │    └─ SceneProxy × N          │
//!                                           │         current / previous    │
//!                                           │  pre_render_views()           │
//!                                           │    └─ FillTask ──► Workers    │
//!                                           │  draw_view()                  │
//!                                           │    └─ ensure_complete → Draw  │
//!                                           └──────────────────────────────┘
//! ```
//!
//! 渲染侧只读取快照（值拷贝），不接触模拟线程的内存。

pub mod debug;
pub mod fill;
pub mod pools;
pub mod proxy;
pub mod scene;
pub mod sort;
pub mod tasks;
pub mod vertex;
pub mod view;

pub use debug::{DebugMode, DebugPrimitive};
pub use fill::{fill_emitter, renderer_for, EmitterRenderer, FillInput, FillOutput, IndexAllocInfo};
pub use pools::{PooledVertexFactory, ScratchGuard, SortScratchPool, VertexFactory, VertexFactoryPool};
pub use proxy::{DrawCall, SceneProxy, SimpleLight};
pub use scene::{render_channel, FrameUpdate, RenderCommand, RenderCommandSender, RenderResources, RenderScene};
pub use sort::{sort_particles, ParticleOrder, SortMode};
pub use tasks::{FillTask, FillWorkerPool};
pub use view::SceneView;
