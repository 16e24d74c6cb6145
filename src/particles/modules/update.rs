//! 更新阶段模块：受力、阻力、随生命周期变化的外观、高度剔除

use super::{ModuleKind, ModulePhases, ParticleModule, SpawnContext, TickPhase, UpdateContext};
use crate::particles::distribution::{ColorGradient, FloatDistribution, VectorDistribution};
use crate::particles::payload::{AccelerationPayload, ParticlePayload, ParticleView};
use crate::particles::record::{state_flags, LinearColor};
use glam::Vec3;

/// 恒定加速度，生成时采样并存入载荷
#[derive(Debug, Clone)]
pub struct AccelerationModule {
    pub acceleration: VectorDistribution,
    pub in_world_space: bool,
}

impl AccelerationModule {
    pub fn new(acceleration: impl Into<VectorDistribution>) -> Self {
        Self {
            acceleration: acceleration.into(),
            in_world_space: true,
        }
    }

    /// Y 轴向下的重力
    pub fn gravity(strength: f32) -> Self {
        Self::new(Vec3::new(0.0, -strength, 0.0))
    }
}

impl ParticleModule for AccelerationModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Acceleration
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::SPAWN | ModulePhases::UPDATE
    }

    fn particle_payload_size(&self) -> usize {
        AccelerationPayload::SIZE
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut ParticleView<'_>) {
        let mut acceleration = self
            .acceleration
            .sample(ctx.emitter_time_normalized, &mut *ctx.rng);
        if !self.in_world_space {
            acceleration = ctx.to_simulation.transform_vector3(acceleration);
        }
        if let Some(payload) = ctx
            .payload_offset
            .and_then(|offset| particle.payload.get_mut::<AccelerationPayload>(offset))
        {
            payload.acceleration = acceleration;
        }
    }

    fn update(&self, _phase: TickPhase, ctx: &mut UpdateContext<'_>, particle: &mut ParticleView<'_>) {
        let Some(payload) = ctx
            .payload_offset
            .and_then(|offset| particle.payload.get::<AccelerationPayload>(offset))
        else {
            return;
        };
        let dv = payload.acceleration * ctx.delta_time;
        particle.record.velocity += dv;
        particle.record.base_velocity += dv;
    }
}

/// 线性阻力
#[derive(Debug, Clone)]
pub struct DragModule {
    /// 每秒损失的速度比例
    pub coefficient: FloatDistribution,
}

impl ParticleModule for DragModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Drag
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::UPDATE
    }

    fn update(&self, _phase: TickPhase, ctx: &mut UpdateContext<'_>, particle: &mut ParticleView<'_>) {
        let record = &mut *particle.record;
        let drag = self.coefficient.value_at(record.relative_time);
        let factor = (1.0 - drag * ctx.delta_time).clamp(0.0, 1.0);
        record.velocity *= factor;
        record.base_velocity *= factor;
    }
}

/// 颜色随生命周期变化
#[derive(Debug, Clone, Default)]
pub struct ColorOverLifeModule {
    pub gradient: ColorGradient,
    /// 为真时与基础颜色相乘，否则直接替换
    pub scale_base_color: bool,
}

impl ColorOverLifeModule {
    pub fn new(gradient: ColorGradient) -> Self {
        Self {
            gradient,
            scale_base_color: false,
        }
    }
}

impl ParticleModule for ColorOverLifeModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::ColorOverLife
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::SPAWN | ModulePhases::UPDATE
    }

    fn spawn(&self, _ctx: &mut SpawnContext<'_>, particle: &mut ParticleView<'_>) {
        let color = self.evaluate(particle.record.base_color, particle.record.relative_time);
        particle.record.color = color;
        if !self.scale_base_color {
            particle.record.base_color = color;
        }
    }

    fn update(&self, _phase: TickPhase, _ctx: &mut UpdateContext<'_>, particle: &mut ParticleView<'_>) {
        particle.record.color =
            self.evaluate(particle.record.base_color, particle.record.relative_time);
    }
}

impl ColorOverLifeModule {
    fn evaluate(&self, current: LinearColor, relative_time: f32) -> LinearColor {
        let sampled = self.gradient.sample(relative_time);
        if self.scale_base_color {
            current.modulate(sampled)
        } else {
            sampled
        }
    }
}

/// 大小随生命周期缩放
#[derive(Debug, Clone)]
pub struct SizeByLifeModule {
    pub scale: VectorDistribution,
}

impl SizeByLifeModule {
    /// 三轴等比的线性变化
    pub fn linear(start: f32, end: f32) -> Self {
        Self {
            scale: VectorDistribution::Curve(vec![(0.0, Vec3::splat(start)), (1.0, Vec3::splat(end))]),
        }
    }
}

impl ParticleModule for SizeByLifeModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::SizeByLife
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::UPDATE
    }

    fn update(&self, _phase: TickPhase, _ctx: &mut UpdateContext<'_>, particle: &mut ParticleView<'_>) {
        let record = &mut *particle.record;
        record.size *= self.scale.value_at(record.relative_time);
    }
}

/// 越过高度平面时请求移除
#[derive(Debug, Clone)]
pub struct KillHeightModule {
    pub height: f32,
    /// 为真时移除高于平面的粒子，否则移除低于平面的
    pub kill_above: bool,
}

impl ParticleModule for KillHeightModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::KillHeight
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::UPDATE
    }

    fn update(&self, _phase: TickPhase, _ctx: &mut UpdateContext<'_>, particle: &mut ParticleView<'_>) {
        let y = particle.record.position.y;
        let crossed = if self.kill_above {
            y > self.height
        } else {
            y < self.height
        };
        if crossed {
            particle.record.set_flag(state_flags::FORCE_KILL);
        }
    }
}
