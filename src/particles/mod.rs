//! CPU 粒子模拟
//!
//! ## 架构设计
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  Simulation Thread                       │
//! ├─────────────────────────────────────────────────────────┤
//! │  ParticleSystemComponent                                 │
//! │    └─ EmitterInstance × N                                │
//! │         ├─ ParticlePool      (定长步长 + 活动索引间接表)   │
//! │         ├─ ModuleOffsetTable (模块载荷偏移，初始化时解析) │
//! │         └─ tick: Time → Spawn → Update ×3 → Kill → Bounds│
//! │                                                          │
//! │  build_bundle() → FrameSnapshotBundle ──► render thread  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 使用示例
//!
//! ```ignore
//! let emitter = EmitterTemplate::new("sparks").with_lod(
//!     LodLevel::new(0.0)
//!         .with_required(RequiredModule::default())
//!         .with_spawn(SpawnModule::with_rate(50.0))
//!         .with_module(LifetimeModule::uniform(0.5, 1.5))
//!         .with_module(VelocityModule::new(Vec3::Y * 4.0)),
//! );
//! let template = Arc::new(ParticleSystemTemplate::new("fx").with_emitter(emitter));
//! let mut system = ParticleSystemComponent::new(template, &config, stats)?;
//! system.activate(true);
//! system.tick(1.0 / 60.0, &[camera_position]);
//! system.submit(&sender)?;
//! ```

pub mod bounds;
pub mod distribution;
pub mod emitter;
pub mod modules;
pub mod offsets;
pub mod payload;
pub mod pool;
pub mod record;
pub mod snapshot;
pub mod stats;
pub mod system;
pub mod template;


pub use bounds::Aabb;
pub use distribution::{ColorGradient, ColorStop, FloatDistribution, VectorDistribution};
pub use emitter::{EmitterClock, EmitterInstance, TickReport};
pub use modules::{ModuleKind, ModulePhases, ModuleRef, ParticleModule, TickPhase};
pub use offsets::{ModuleOffsetTable, PayloadOffsets};
pub use payload::{ParticlePayload, ParticleView};
pub use pool::{ParticleHandle, ParticlePool};
pub use record::{state_flags, LinearColor, ParticleRecord, PARTICLE_RECORD_SIZE};
pub use snapshot::{ComponentId, EmitterSnapshot, FrameSnapshotBundle, ReplayData};
pub use stats::{ParticleStats, StatsSnapshot};
pub use system::{LodMethod, ParticleSystemComponent, ParticleSystemTemplate, SystemTickReport};
pub use template::{
    BeamSettings, BoundsPolicy, EmitterTemplate, EmitterType, EmitterTypeSettings, LodLevel,
    MacroUv, MaterialHandle, MeshHandle, RequiredModule, ScreenAlignment, SortMode, SpawnModule,
    TrailSettings,
};
