//! 携带每粒子载荷的模块
//!
//! 这些模块的状态写在粒子槽位的载荷区，渲染侧通过快照中的偏移读取。

use super::{
    instance_payload_mut, ModuleKind, ModulePhases, ParticleModule, SpawnContext, TickPhase,
    UpdateContext,
};
use crate::impl_payload;
use crate::particles::distribution::{FloatDistribution, VectorDistribution};
use crate::particles::payload::{
    CameraOffsetPayload, DynamicParameterPayload, LightPayload, MeshRotationPayload, OrbitPayload,
    ParticlePayload, ParticleView, SubUvPayload,
};
use bytemuck::{Pod, Zeroable};
use glam::{EulerRot, Quat, Vec3};
use rand::Rng;
use std::f32::consts::TAU;

// ============================================================================
// 子图像动画
// ============================================================================

/// 子图像索引的推进方式
#[derive(Debug, Clone)]
pub enum SubUvMode {
    /// 按曲线给出索引（曲线参数为 relative_time）
    OverLife(FloatDistribution),
    /// 在寿命内线性播放全部子图像
    Linear,
    /// 每隔 `change_interval` 秒随机切换
    Random { change_interval: f32 },
}

/// 子图像动画模块
#[derive(Debug, Clone)]
pub struct SubUvModule {
    pub mode: SubUvMode,
}

impl SubUvModule {
    pub fn new(mode: SubUvMode) -> Self {
        Self { mode }
    }

    fn image_index(&self, relative_time: f32, sub_images: u32) -> f32 {
        let last = sub_images.saturating_sub(1) as f32;
        match &self.mode {
            SubUvMode::OverLife(index) => index.value_at(relative_time).clamp(0.0, last),
            SubUvMode::Linear => (relative_time * sub_images as f32).floor().clamp(0.0, last),
            SubUvMode::Random { .. } => 0.0,
        }
    }
}

impl ParticleModule for SubUvModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::SubUv
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::SPAWN | ModulePhases::UPDATE
    }

    fn particle_payload_size(&self) -> usize {
        SubUvPayload::SIZE
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut ParticleView<'_>) {
        let relative_time = particle.record.relative_time;
        let Some(payload) = ctx
            .payload_offset
            .and_then(|offset| particle.payload.get_mut::<SubUvPayload>(offset))
        else {
            return;
        };
        match &self.mode {
            SubUvMode::Random { change_interval } => {
                payload.image_index = random_image(&mut *ctx.rng, ctx.sub_images);
                payload.random_image_time = *change_interval;
            }
            _ => payload.image_index = self.image_index(relative_time, ctx.sub_images),
        }
    }

    fn update(&self, _phase: TickPhase, ctx: &mut UpdateContext<'_>, particle: &mut ParticleView<'_>) {
        let relative_time = particle.record.relative_time;
        let Some(payload) = ctx
            .payload_offset
            .and_then(|offset| particle.payload.get_mut::<SubUvPayload>(offset))
        else {
            return;
        };
        match &self.mode {
            SubUvMode::Random { change_interval } => {
                payload.random_image_time -= ctx.delta_time;
                if payload.random_image_time <= 0.0 {
                    payload.image_index = random_image(&mut *ctx.rng, ctx.sub_images);
                    payload.random_image_time += change_interval.max(f32::EPSILON);
                }
            }
            _ => payload.image_index = self.image_index(relative_time, ctx.sub_images),
        }
    }
}

fn random_image<R: Rng + ?Sized>(rng: &mut R, sub_images: u32) -> f32 {
    if sub_images <= 1 {
        0.0
    } else {
        rng.gen_range(0..sub_images) as f32
    }
}

// ============================================================================
// 动态参数
// ============================================================================

/// 四通道动态参数
#[derive(Debug, Clone)]
pub struct DynamicParameterModule {
    pub channels: [FloatDistribution; 4],
    /// 为真的通道只在生成时求值
    pub spawn_time_only: [bool; 4],
    /// 作为自定义排序键导出的通道
    pub sort_key_channel: Option<usize>,
}

impl DynamicParameterModule {
    pub fn new(channels: [FloatDistribution; 4]) -> Self {
        Self {
            channels,
            spawn_time_only: [false; 4],
            sort_key_channel: None,
        }
    }

    pub fn with_sort_key(mut self, channel: usize) -> Self {
        self.sort_key_channel = (channel < 4).then_some(channel);
        self
    }
}

impl ParticleModule for DynamicParameterModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::DynamicParameter
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::SPAWN | ModulePhases::UPDATE
    }

    fn particle_payload_size(&self) -> usize {
        DynamicParameterPayload::SIZE
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut ParticleView<'_>) {
        let t = particle.record.relative_time;
        let Some(payload) = ctx
            .payload_offset
            .and_then(|offset| particle.payload.get_mut::<DynamicParameterPayload>(offset))
        else {
            return;
        };
        for (value, channel) in payload.value.iter_mut().zip(&self.channels) {
            *value = channel.sample(t, &mut *ctx.rng);
        }
    }

    fn update(&self, _phase: TickPhase, ctx: &mut UpdateContext<'_>, particle: &mut ParticleView<'_>) {
        let t = particle.record.relative_time;
        let Some(payload) = ctx
            .payload_offset
            .and_then(|offset| particle.payload.get_mut::<DynamicParameterPayload>(offset))
        else {
            return;
        };
        for (i, channel) in self.channels.iter().enumerate() {
            if !self.spawn_time_only[i] {
                payload.value[i] = channel.sample(t, &mut *ctx.rng);
            }
        }
    }

    fn sort_key_offset(&self) -> Option<usize> {
        self.sort_key_channel.map(|c| c * std::mem::size_of::<f32>())
    }
}

// ============================================================================
// 轨道
// ============================================================================

/// 轨道偏移模块，旋转以圈为单位
#[derive(Debug, Clone)]
pub struct OrbitModule {
    pub offset: VectorDistribution,
    pub rotation: VectorDistribution,
    pub rotation_rate: VectorDistribution,
}

fn rotate_turns(offset: Vec3, turns: Vec3) -> Vec3 {
    Quat::from_euler(EulerRot::XYZ, turns.x * TAU, turns.y * TAU, turns.z * TAU) * offset
}

impl ParticleModule for OrbitModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Orbit
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::SPAWN | ModulePhases::UPDATE
    }

    fn particle_payload_size(&self) -> usize {
        OrbitPayload::SIZE
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut ParticleView<'_>) {
        let t = ctx.emitter_time_normalized;
        let base_offset = self.offset.sample(t, &mut *ctx.rng);
        let rotation = self.rotation.sample(t, &mut *ctx.rng);
        let rate = self.rotation_rate.sample(t, &mut *ctx.rng);
        let Some(payload) = ctx
            .payload_offset
            .and_then(|offset| particle.payload.get_mut::<OrbitPayload>(offset))
        else {
            return;
        };
        payload.base_offset = base_offset;
        payload.rotation = rotation;
        payload.base_rotation_rate = rate;
        payload.rotation_rate = rate;
        payload.offset = rotate_turns(base_offset, rotation);
        payload.previous_offset = payload.offset;
    }

    fn update(&self, _phase: TickPhase, ctx: &mut UpdateContext<'_>, particle: &mut ParticleView<'_>) {
        let Some(payload) = ctx
            .payload_offset
            .and_then(|offset| particle.payload.get_mut::<OrbitPayload>(offset))
        else {
            return;
        };
        payload.previous_offset = payload.offset;
        payload.rotation_rate = payload.base_rotation_rate;
        payload.rotation += payload.rotation_rate * ctx.delta_time;
        payload.offset = rotate_turns(payload.base_offset, payload.rotation);
    }
}

// ============================================================================
// 网格旋转
// ============================================================================

/// 网格粒子的初始朝向，并负责按速率积分
#[derive(Debug, Clone)]
pub struct MeshRotationModule {
    /// 以圈为单位的欧拉角
    pub start_rotation: VectorDistribution,
}

impl ParticleModule for MeshRotationModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::MeshRotation
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::SPAWN | ModulePhases::UPDATE
    }

    fn particle_payload_size(&self) -> usize {
        MeshRotationPayload::SIZE
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut ParticleView<'_>) {
        let start = self
            .start_rotation
            .sample(ctx.emitter_time_normalized, &mut *ctx.rng);
        if let Some(payload) = ctx
            .payload_offset
            .and_then(|offset| particle.payload.get_mut::<MeshRotationPayload>(offset))
        {
            payload.initial_orientation = start;
            payload.rotation = start;
        }
    }

    fn update(&self, _phase: TickPhase, ctx: &mut UpdateContext<'_>, particle: &mut ParticleView<'_>) {
        if particle.record.has_flag(crate::particles::record::state_flags::FREEZE_ROTATION) {
            return;
        }
        if let Some(payload) = ctx
            .payload_offset
            .and_then(|offset| particle.payload.get_mut::<MeshRotationPayload>(offset))
        {
            payload.rotation += payload.rotation_rate * ctx.delta_time;
        }
    }
}

/// 网格旋转速率，写入 [`MeshRotationModule`] 的载荷
#[derive(Debug, Clone)]
pub struct MeshRotationRateModule {
    /// 圈/秒
    pub rate: VectorDistribution,
}

impl ParticleModule for MeshRotationRateModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::MeshRotationRate
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::SPAWN
    }

    fn requires(&self) -> &'static [ModuleKind] {
        &[ModuleKind::MeshRotation]
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut ParticleView<'_>) {
        let rate = self.rate.sample(ctx.emitter_time_normalized, &mut *ctx.rng);
        let Some(offset) = ctx.offsets.offset_of(ModuleKind::MeshRotation) else {
            return;
        };
        if let Some(payload) = particle.payload.get_mut::<MeshRotationPayload>(offset) {
            payload.rotation_rate_base += rate;
            payload.rotation_rate += rate;
        }
    }
}

// ============================================================================
// 相机偏移
// ============================================================================

/// 相机偏移的更新方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraOffsetUpdate {
    /// 只在生成时求值
    #[default]
    SpawnOnly,
    /// 每帧按 relative_time 重新求值
    Direct,
    /// 每帧以基础偏移乘以曲线值
    Scalar,
}

/// 沿视线方向朝相机推进粒子，避免与几何体穿插
#[derive(Debug, Clone)]
pub struct CameraOffsetModule {
    pub offset: FloatDistribution,
    pub update_method: CameraOffsetUpdate,
}

impl ParticleModule for CameraOffsetModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::CameraOffset
    }

    fn phases(&self) -> ModulePhases {
        match self.update_method {
            CameraOffsetUpdate::SpawnOnly => ModulePhases::SPAWN,
            _ => ModulePhases::SPAWN | ModulePhases::UPDATE,
        }
    }

    fn particle_payload_size(&self) -> usize {
        CameraOffsetPayload::SIZE
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut ParticleView<'_>) {
        let value = self
            .offset
            .sample(particle.record.relative_time, &mut *ctx.rng);
        if let Some(payload) = ctx
            .payload_offset
            .and_then(|offset| particle.payload.get_mut::<CameraOffsetPayload>(offset))
        {
            payload.base_offset = value;
            payload.offset = value;
        }
    }

    fn update(&self, _phase: TickPhase, ctx: &mut UpdateContext<'_>, particle: &mut ParticleView<'_>) {
        let value = self.offset.value_at(particle.record.relative_time);
        if let Some(payload) = ctx
            .payload_offset
            .and_then(|offset| particle.payload.get_mut::<CameraOffsetPayload>(offset))
        {
            payload.offset = match self.update_method {
                CameraOffsetUpdate::SpawnOnly => payload.offset,
                CameraOffsetUpdate::Direct => value,
                CameraOffsetUpdate::Scalar => payload.base_offset * value,
            };
        }
    }
}

// ============================================================================
// 粒子光源
// ============================================================================

/// 光源模块的实例载荷
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightInstancePayload {
    /// 累计发光粒子数
    pub lit_particles: u32,
    /// 累计经过本模块的粒子数
    pub spawned: u32,
}

impl_payload!(LightInstancePayload);

/// 让部分粒子成为简单点光源
#[derive(Debug, Clone)]
pub struct LightModule {
    pub color_scale: VectorDistribution,
    pub radius_scale: FloatDistribution,
    pub exponent: FloatDistribution,
    /// 发光粒子的比例 `[0, 1]`
    pub spawn_fraction: f32,
}

impl Default for LightModule {
    fn default() -> Self {
        Self {
            color_scale: VectorDistribution::Constant(Vec3::ONE),
            radius_scale: FloatDistribution::Constant(1.0),
            exponent: FloatDistribution::Constant(16.0),
            spawn_fraction: 1.0,
        }
    }
}

impl ParticleModule for LightModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Light
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::SPAWN
    }

    fn particle_payload_size(&self) -> usize {
        LightPayload::SIZE
    }

    fn instance_payload_size(&self) -> usize {
        LightInstancePayload::SIZE
    }

    fn init_instance(&self, instance: &mut [u8]) {
        if let Some(payload) = instance_payload_mut::<LightInstancePayload>(instance) {
            *payload = LightInstancePayload::zeroed();
        }
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut ParticleView<'_>) {
        let t = ctx.emitter_time_normalized;
        let lit = self.spawn_fraction >= 1.0 || ctx.rng.gen::<f32>() < self.spawn_fraction;
        let color_scale = self.color_scale.sample(t, &mut *ctx.rng);
        let radius_scale = self.radius_scale.sample(t, &mut *ctx.rng);
        let exponent = self.exponent.sample(t, &mut *ctx.rng);

        if let Some(counters) = instance_payload_mut::<LightInstancePayload>(&mut *ctx.instance) {
            counters.spawned = counters.spawned.wrapping_add(1);
            if lit {
                counters.lit_particles = counters.lit_particles.wrapping_add(1);
            }
        }

        if let Some(payload) = ctx
            .payload_offset
            .and_then(|offset| particle.payload.get_mut::<LightPayload>(offset))
        {
            *payload = LightPayload {
                color_scale,
                radius_scale,
                exponent,
                valid: u32::from(lit),
            };
        }
    }
}
