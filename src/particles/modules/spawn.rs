//! 生成阶段模块：寿命、发射形状、初速度、初始外观

use super::{ModuleKind, ModulePhases, ParticleModule, SpawnContext};
use crate::particles::distribution::{FloatDistribution, VectorDistribution};
use crate::particles::payload::ParticleView;
use crate::particles::record::LinearColor;
use glam::Vec3;
use rand::Rng;
use std::f32::consts::TAU;

// ============================================================================
// 寿命
// ============================================================================

/// 寿命模块
///
/// 多个寿命模块叠加时寿命相加。
#[derive(Debug, Clone)]
pub struct LifetimeModule {
    pub lifetime: FloatDistribution,
}

impl LifetimeModule {
    pub fn new(lifetime: impl Into<FloatDistribution>) -> Self {
        Self {
            lifetime: lifetime.into(),
        }
    }

    pub fn uniform(min: f32, max: f32) -> Self {
        Self::new(FloatDistribution::Uniform { min, max })
    }
}

impl ParticleModule for LifetimeModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Lifetime
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::SPAWN
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut ParticleView<'_>) {
        let max_lifetime = self.lifetime.sample(ctx.emitter_time_normalized, &mut *ctx.rng);
        let record = &mut *particle.record;
        if record.one_over_max_lifetime > 0.0 {
            record.one_over_max_lifetime =
                1.0 / (max_lifetime + 1.0 / record.one_over_max_lifetime);
        } else {
            record.one_over_max_lifetime = if max_lifetime > 0.0 {
                1.0 / max_lifetime
            } else {
                0.0
            };
        }
        record.relative_time = ctx.spawn_time * record.one_over_max_lifetime;
    }
}

// ============================================================================
// 发射形状
// ============================================================================

/// 发射形状（发射器局部空间，Y 轴向上）
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ParticleShape {
    /// 点发射
    #[default]
    Point,
    /// 球形发射
    Sphere { radius: f32 },
    /// 半球发射
    Hemisphere { radius: f32 },
    /// 圆锥底面发射，`angle` 是半角（弧度），速度方向由速度模块的径向分量给出
    Cone { angle: f32, radius: f32 },
    /// 盒子发射
    Box { half_extents: Vec3 },
    /// 圆盘发射（XZ 平面）
    Circle { radius: f32 },
    /// 沿 X 轴的线段发射
    Edge { length: f32 },
}

impl ParticleShape {
    /// 在形状内均匀采样一点
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        match self {
            Self::Point => Vec3::ZERO,
            Self::Sphere { radius } => random_unit_vector(rng) * *radius * rng.gen::<f32>().cbrt(),
            Self::Hemisphere { radius } => {
                let dir = random_unit_vector(rng);
                Vec3::new(dir.x, dir.y.abs(), dir.z) * *radius * rng.gen::<f32>().cbrt()
            }
            Self::Cone { angle, radius } => {
                // 底面圆盘上的点，抬高到与半角一致的顶点下方
                let disc = random_disc(rng, *radius);
                let height = if angle.tan() > f32::EPSILON {
                    radius / angle.tan()
                } else {
                    0.0
                };
                Vec3::new(disc.x, -height * (1.0 - disc.length() / radius.max(f32::EPSILON)), disc.y)
            }
            Self::Box { half_extents } => Vec3::new(
                (rng.gen::<f32>() * 2.0 - 1.0) * half_extents.x,
                (rng.gen::<f32>() * 2.0 - 1.0) * half_extents.y,
                (rng.gen::<f32>() * 2.0 - 1.0) * half_extents.z,
            ),
            Self::Circle { radius } => {
                let disc = random_disc(rng, *radius);
                Vec3::new(disc.x, 0.0, disc.y)
            }
            Self::Edge { length } => Vec3::new((rng.gen::<f32>() - 0.5) * length, 0.0, 0.0),
        }
    }
}

fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    let z = rng.gen::<f32>() * 2.0 - 1.0;
    let phi = rng.gen::<f32>() * TAU;
    let r = (1.0 - z * z).max(0.0).sqrt();
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

fn random_disc<R: Rng + ?Sized>(rng: &mut R, radius: f32) -> glam::Vec2 {
    let r = radius * rng.gen::<f32>().sqrt();
    let phi = rng.gen::<f32>() * TAU;
    glam::Vec2::new(r * phi.cos(), r * phi.sin())
}

/// 初始位置模块
#[derive(Debug, Clone, Default)]
pub struct LocationModule {
    pub shape: ParticleShape,
    /// 额外的局部偏移
    pub offset: VectorDistribution,
}

impl LocationModule {
    pub fn new(shape: ParticleShape) -> Self {
        Self {
            shape,
            offset: VectorDistribution::default(),
        }
    }

    pub fn with_offset(mut self, offset: impl Into<VectorDistribution>) -> Self {
        self.offset = offset.into();
        self
    }
}

impl ParticleModule for LocationModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Location
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::SPAWN
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut ParticleView<'_>) {
        let local = self.shape.sample(&mut *ctx.rng)
            + self.offset.sample(ctx.emitter_time_normalized, &mut *ctx.rng);
        let record = &mut *particle.record;
        record.position += ctx.to_simulation.transform_vector3(local);
        record.old_position = record.position;
    }
}

// ============================================================================
// 初速度
// ============================================================================

/// 初速度模块：方向分量 + 沿发射器原点径向的分量
#[derive(Debug, Clone, Default)]
pub struct VelocityModule {
    pub start_velocity: VectorDistribution,
    pub radial: FloatDistribution,
    /// 为真时速度不随发射器旋转
    pub in_world_space: bool,
}

impl VelocityModule {
    pub fn new(start_velocity: impl Into<VectorDistribution>) -> Self {
        Self {
            start_velocity: start_velocity.into(),
            ..Default::default()
        }
    }

    pub fn with_radial(mut self, radial: impl Into<FloatDistribution>) -> Self {
        self.radial = radial.into();
        self
    }
}

impl ParticleModule for VelocityModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Velocity
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::SPAWN
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut ParticleView<'_>) {
        let t = ctx.emitter_time_normalized;
        let mut velocity = self.start_velocity.sample(t, &mut *ctx.rng);
        if !self.in_world_space {
            velocity = ctx.to_simulation.transform_vector3(velocity);
        }
        let radial = self.radial.sample(t, &mut *ctx.rng);
        let record = &mut *particle.record;
        velocity += (record.position - ctx.location).normalize_or_zero() * radial;
        record.base_velocity += velocity;
        record.velocity += velocity;
    }
}

// ============================================================================
// 初始外观
// ============================================================================

/// 初始颜色：RGB 与 Alpha 分开给出
#[derive(Debug, Clone)]
pub struct InitialColorModule {
    pub color: VectorDistribution,
    pub alpha: FloatDistribution,
}

impl InitialColorModule {
    pub fn new(color: LinearColor) -> Self {
        Self {
            color: VectorDistribution::Constant(Vec3::new(color.r, color.g, color.b)),
            alpha: FloatDistribution::Constant(color.a),
        }
    }
}

impl ParticleModule for InitialColorModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::InitialColor
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::SPAWN
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut ParticleView<'_>) {
        let t = ctx.emitter_time_normalized;
        let rgb = self.color.sample(t, &mut *ctx.rng);
        let alpha = self.alpha.sample(t, &mut *ctx.rng);
        let color = LinearColor::new(rgb.x, rgb.y, rgb.z, alpha);
        particle.record.color = color;
        particle.record.base_color = color;
    }
}

/// 初始大小
#[derive(Debug, Clone)]
pub struct InitialSizeModule {
    pub size: VectorDistribution,
    /// 只使用 X 分量，三个轴等比
    pub uniform: bool,
}

impl InitialSizeModule {
    pub fn new(size: impl Into<VectorDistribution>) -> Self {
        Self {
            size: size.into(),
            uniform: false,
        }
    }

    pub fn uniform(min: f32, max: f32) -> Self {
        Self {
            size: VectorDistribution::Uniform {
                min: Vec3::splat(min),
                max: Vec3::splat(max),
            },
            uniform: true,
        }
    }
}

impl ParticleModule for InitialSizeModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::InitialSize
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::SPAWN
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut ParticleView<'_>) {
        let mut size = self.size.sample(ctx.emitter_time_normalized, &mut *ctx.rng);
        if self.uniform {
            size = Vec3::splat(size.x);
        }
        particle.record.size = size;
        particle.record.base_size = size;
    }
}

/// 初始旋转（弧度）
#[derive(Debug, Clone)]
pub struct InitialRotationModule {
    pub rotation: FloatDistribution,
}

impl ParticleModule for InitialRotationModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::InitialRotation
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::SPAWN
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut ParticleView<'_>) {
        particle.record.rotation += self
            .rotation
            .sample(ctx.emitter_time_normalized, &mut *ctx.rng);
    }
}

/// 初始旋转速率（弧度/秒）
#[derive(Debug, Clone)]
pub struct InitialRotationRateModule {
    pub rate: FloatDistribution,
}

impl ParticleModule for InitialRotationRateModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::InitialRotationRate
    }

    fn phases(&self) -> ModulePhases {
        ModulePhases::SPAWN
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut ParticleView<'_>) {
        let rate = self.rate.sample(ctx.emitter_time_normalized, &mut *ctx.rng);
        particle.record.base_rotation_rate += rate;
        particle.record.rotation_rate += rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_shapes_stay_inside_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let sphere = ParticleShape::Sphere { radius: 2.0 };
        let hemisphere = ParticleShape::Hemisphere { radius: 1.0 };
        let bx = ParticleShape::Box {
            half_extents: Vec3::new(1.0, 2.0, 3.0),
        };
        let circle = ParticleShape::Circle { radius: 1.5 };
        for _ in 0..200 {
            assert!(sphere.sample(&mut rng).length() <= 2.0 + 1e-4);
            assert!(hemisphere.sample(&mut rng).y >= 0.0);
            let p = bx.sample(&mut rng);
            assert!(p.abs().cmple(Vec3::new(1.0, 2.0, 3.0)).all());
            let c = circle.sample(&mut rng);
            assert_eq!(c.y, 0.0);
            assert!(c.length() <= 1.5 + 1e-4);
        }
        assert_eq!(ParticleShape::Point.sample(&mut rng), Vec3::ZERO);
    }

    #[test]
    fn test_edge_is_centered_segment() {
        let mut rng = StdRng::seed_from_u64(3);
        let edge = ParticleShape::Edge { length: 4.0 };
        for _ in 0..100 {
            let p = edge.sample(&mut rng);
            assert!((-2.0..=2.0).contains(&p.x));
            assert_eq!(p.y, 0.0);
            assert_eq!(p.z, 0.0);
        }
    }
}
