//! 平面碰撞
//!
//! 在 FinalUpdate 阶段运行，此时所有受力模块都已写入速度，
//! 用 `position + velocity * dt` 预测下一帧位置并与平面比较。

use super::{
    instance_payload_mut, ModuleKind, ModulePhases, ParticleModule, SpawnContext, TickPhase,
    UpdateContext,
};
use crate::impl_payload;
use crate::particles::distribution::{FloatDistribution, VectorDistribution};
use crate::particles::payload::{CollisionPayload, ParticlePayload, ParticleView};
use crate::particles::record::state_flags;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// 碰撞平面 `dot(normal, p) == distance`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionPlane {
    pub normal: Vec3,
    pub distance: f32,
}

impl CollisionPlane {
    /// 高度为 `height` 的水平地面
    pub fn ground(height: f32) -> Self {
        Self {
            normal: Vec3::Y,
            distance: height,
        }
    }

    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.distance
    }
}

/// 达到最大碰撞次数后的处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionCompletion {
    /// 移除粒子
    #[default]
    Kill,
    /// 完全冻结
    Freeze,
    /// 停止平移，保留旋转与外观更新
    FreezeTranslation,
    /// 之后忽略碰撞
    HaltCollisions,
}

/// 碰撞模块的实例载荷
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CollisionInstancePayload {
    pub collisions: u32,
    pub completions: u32,
}

impl_payload!(CollisionInstancePayload);

/// 平面碰撞模块
#[derive(Debug, Clone)]
pub struct CollisionModule {
    pub plane: CollisionPlane,
    /// 反弹后逐分量乘到速度上
    pub damping: VectorDistribution,
    pub max_collisions: u32,
    pub completion: CollisionCompletion,
    /// 生成后多少秒才开始检测
    pub delay: FloatDistribution,
    /// 以半个最大尺寸为半径时的缩放
    pub radius_scale: f32,
}

impl CollisionModule {
    pub fn new(plane: CollisionPlane) -> Self {
        Self {
            plane,
            damping: VectorDistribution::Constant(Vec3::splat(0.5)),
            max_collisions: 1,
            completion: CollisionCompletion::default(),
            delay: FloatDistribution::Constant(0.0),
            radius_scale: 1.0,
        }
    }

    pub fn with_max_collisions(mut self, max_collisions: u32, completion: CollisionCompletion) -> Self {
        self.max_collisions = max_collisions;
        self.completion = completion;
        self
    }

    pub fn with_damping(mut self, damping: impl Into<VectorDistribution>) -> Self {
        self.damping = damping.into();
        self
    }

    pub fn with_delay(mut self, delay: impl Into<FloatDistribution>) -> Self {
        self.delay = delay.into();
        self
    }
}

impl ParticleModule for CollisionModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Collision
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::SPAWN | ModulePhases::FINAL_UPDATE
    }

    fn particle_payload_size(&self) -> usize {
        CollisionPayload::SIZE
    }

    fn instance_payload_size(&self) -> usize {
        CollisionInstancePayload::SIZE
    }

    fn init_instance(&self, instance: &mut [u8]) {
        if let Some(payload) = instance_payload_mut::<CollisionInstancePayload>(instance) {
            *payload = CollisionInstancePayload::zeroed();
        }
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut ParticleView<'_>) {
        let t = ctx.emitter_time_normalized;
        let damping = self.damping.sample(t, &mut *ctx.rng);
        let delay = self.delay.sample(t, &mut *ctx.rng);
        if let Some(payload) = ctx
            .payload_offset
            .and_then(|offset| particle.payload.get_mut::<CollisionPayload>(offset))
        {
            *payload = CollisionPayload {
                damping,
                used_collisions: 0,
                delay,
            };
        }
        if delay > 0.0 {
            particle.record.set_flag(state_flags::DELAY_COLLISIONS);
        }
    }

    fn update(&self, _phase: TickPhase, ctx: &mut UpdateContext<'_>, particle: &mut ParticleView<'_>) {
        let record = &mut *particle.record;
        if record.has_flag(state_flags::IGNORE_COLLISIONS) {
            return;
        }
        let Some(payload) = ctx
            .payload_offset
            .and_then(|offset| particle.payload.get_mut::<CollisionPayload>(offset))
        else {
            return;
        };

        if record.has_flag(state_flags::DELAY_COLLISIONS) {
            payload.delay -= ctx.delta_time;
            if payload.delay > 0.0 {
                return;
            }
            record.clear_flag(state_flags::DELAY_COLLISIONS);
        }

        let normal = self.plane.normal;
        let approaching = record.velocity.dot(normal) < 0.0;
        let radius = record.size.max_element().abs() * 0.5 * self.radius_scale;
        let predicted = record.position + record.velocity * ctx.delta_time;
        if !approaching || self.plane.signed_distance(predicted) >= radius {
            return;
        }

        // 反弹并衰减
        let reflected = record.velocity - 2.0 * record.velocity.dot(normal) * normal;
        let damped = reflected * payload.damping;
        record.velocity = damped;
        record.base_velocity = damped;

        let current = self.plane.signed_distance(record.position);
        if current < radius {
            record.position += normal * (radius - current);
        }

        payload.used_collisions += 1;
        record.set_flag(state_flags::HAS_COLLIDED);

        let completed = payload.used_collisions >= self.max_collisions;
        if completed {
            match self.completion {
                CollisionCompletion::Kill => record.set_flag(state_flags::FORCE_KILL),
                CollisionCompletion::Freeze => record.set_flag(state_flags::FREEZE),
                CollisionCompletion::FreezeTranslation => {
                    record.set_flag(state_flags::FREEZE_TRANSLATION);
                    record.velocity = Vec3::ZERO;
                    record.base_velocity = Vec3::ZERO;
                }
                CollisionCompletion::HaltCollisions => {
                    record.set_flag(state_flags::IGNORE_COLLISIONS)
                }
            }
        }

        if let Some(counters) = instance_payload_mut::<CollisionInstancePayload>(&mut *ctx.instance) {
            counters.collisions = counters.collisions.wrapping_add(1);
            if completed {
                counters.completions = counters.completions.wrapping_add(1);
            }
        }
    }
}
