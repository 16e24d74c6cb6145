//! 行为模块
//!
//! 每个模块声明自己参与的 tick 阶段、每粒子/每实例载荷大小，
//! 以及各阶段的纯函数。模块在实例初始化时被解析进模块偏移表，
//! 之后按作者顺序依次调用，顺序本身就是契约。

use crate::particles::offsets::ModuleOffsetTable;
use crate::particles::payload::{ParticlePayload, ParticleView};
use glam::{Mat4, Vec3};
use rand::rngs::StdRng;
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

pub mod collision;
pub mod payload_modules;
pub mod spawn;
pub mod update;

pub use collision::{CollisionCompletion, CollisionInstancePayload, CollisionModule, CollisionPlane};
pub use payload_modules::{
    CameraOffsetModule, DynamicParameterModule, LightInstancePayload, LightModule,
    MeshRotationModule, MeshRotationRateModule, OrbitModule, SubUvMode, SubUvModule,
};
pub use spawn::{
    InitialColorModule, InitialRotationModule, InitialRotationRateModule, InitialSizeModule,
    LifetimeModule, LocationModule, ParticleShape, VelocityModule,
};
pub use update::{AccelerationModule, ColorOverLifeModule, DragModule, KillHeightModule, SizeByLifeModule};

/// 共享的模块引用
pub type ModuleRef = Arc<dyn ParticleModule>;

// ============================================================================
// 模块类别与阶段
// ============================================================================

/// 模块类别
///
/// 同一槽位在所有 LOD 上必须是同一类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Lifetime,
    Location,
    Velocity,
    InitialColor,
    InitialSize,
    InitialRotation,
    InitialRotationRate,
    Acceleration,
    Drag,
    ColorOverLife,
    SizeByLife,
    KillHeight,
    SubUv,
    DynamicParameter,
    Orbit,
    MeshRotation,
    MeshRotationRate,
    CameraOffset,
    Light,
    Collision,
}

/// 模块参与的阶段集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModulePhases(u8);

impl ModulePhases {
    pub const NONE: Self = Self(0);
    pub const SPAWN: Self = Self(1);
    pub const UPDATE: Self = Self(1 << 1);
    pub const POST_UPDATE: Self = Self(1 << 2);
    pub const FINAL_UPDATE: Self = Self(1 << 3);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl BitOr for ModulePhases {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// 三个有序更新阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickPhase {
    Update,
    PostUpdate,
    FinalUpdate,
}

impl TickPhase {
    pub const ALL: [TickPhase; 3] = [Self::Update, Self::PostUpdate, Self::FinalUpdate];

    pub fn phase_bit(self) -> ModulePhases {
        match self {
            Self::Update => ModulePhases::UPDATE,
            Self::PostUpdate => ModulePhases::POST_UPDATE,
            Self::FinalUpdate => ModulePhases::FINAL_UPDATE,
        }
    }
}

// ============================================================================
// 调用上下文
// ============================================================================

/// 生成阶段上下文
pub struct SpawnContext<'a> {
    /// 发射器在当前循环内的时间（秒）
    pub emitter_time: f32,
    /// 发射器时间归一化到 `[0, 1]`，无限时长时为 0
    pub emitter_time_normalized: f32,
    /// 粒子在本时间片内已经存在的时间
    pub spawn_time: f32,
    /// 生成位置在本帧内的插值系数（0 = 帧首，1 = 帧尾）
    pub interpolation: f32,
    /// 模拟空间中的发射器原点
    pub location: Vec3,
    /// 发射器局部方向 → 模拟空间
    pub to_simulation: Mat4,
    /// 当前 LOD 的子图像总数（横向 × 纵向）
    pub sub_images: u32,
    pub offsets: &'a ModuleOffsetTable,
    /// 当前模块的每粒子载荷偏移
    pub payload_offset: Option<usize>,
    /// 当前模块的每实例载荷
    pub instance: &'a mut [u8],
    pub rng: &'a mut StdRng,
}

/// 更新阶段上下文
pub struct UpdateContext<'a> {
    pub delta_time: f32,
    pub emitter_time: f32,
    pub location: Vec3,
    pub to_simulation: Mat4,
    pub sub_images: u32,
    pub offsets: &'a ModuleOffsetTable,
    pub payload_offset: Option<usize>,
    pub instance: &'a mut [u8],
    pub rng: &'a mut StdRng,
}

/// 把实例载荷字节解释为类型化载荷
pub fn instance_payload_mut<T: ParticlePayload>(bytes: &mut [u8]) -> Option<&mut T> {
    let bytes = bytes.get_mut(..T::SIZE)?;
    bytemuck::try_from_bytes_mut(bytes).ok()
}

// ============================================================================
// 模块 trait
// ============================================================================

/// 粒子行为模块
pub trait ParticleModule: Send + Sync + fmt::Debug {
    fn kind(&self) -> ModuleKind;

    fn phases(&self) -> ModulePhases;

    /// 在某个 LOD 上禁用的模块保留槽位和载荷，但不会被调用
    fn enabled(&self) -> bool {
        true
    }

    fn particle_payload_size(&self) -> usize {
        0
    }

    fn instance_payload_size(&self) -> usize {
        0
    }

    /// 必须在同一 LOD 的模块栈中更早出现的模块类别
    fn requires(&self) -> &'static [ModuleKind] {
        &[]
    }

    fn init_instance(&self, _instance: &mut [u8]) {}

    fn spawn(&self, _ctx: &mut SpawnContext<'_>, _particle: &mut ParticleView<'_>) {}

    fn update(
        &self,
        _phase: TickPhase,
        _ctx: &mut UpdateContext<'_>,
        _particle: &mut ParticleView<'_>,
    ) {
    }

    /// 排序键在本模块载荷内的字节偏移
    fn sort_key_offset(&self) -> Option<usize> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_set() {
        let phases = ModulePhases::SPAWN | ModulePhases::FINAL_UPDATE;
        assert!(phases.contains(ModulePhases::SPAWN));
        assert!(phases.contains(TickPhase::FinalUpdate.phase_bit()));
        assert!(!phases.contains(ModulePhases::UPDATE));
        assert!(!phases.contains(ModulePhases::NONE));
    }

    #[test]
    fn test_instance_payload_alignment_checked() {
        let mut storage = [0u32; 4];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut storage);
        let payload = instance_payload_mut::<LightInstancePayload>(bytes).unwrap();
        payload.lit_particles = 3;
        assert_eq!(storage[0], 3);
        let mut tiny = [0u32; 1];
        assert!(instance_payload_mut::<LightInstancePayload>(bytemuck::cast_slice_mut(&mut tiny)).is_none());
    }
}
