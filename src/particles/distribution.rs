//! 参数分布
//!
//! 模块参数可以是常量、均匀随机或随时间变化的曲线。
//! 曲线的 `t` 通常是粒子的 `relative_time` 或归一化的发射器时间。

use crate::particles::record::LinearColor;
use glam::Vec3;
use rand::Rng;

// ============================================================================
// 标量分布
// ============================================================================

/// 标量分布
#[derive(Debug, Clone, PartialEq)]
pub enum FloatDistribution {
    /// 常量
    Constant(f32),
    /// 在 `[min, max]` 内均匀随机
    Uniform { min: f32, max: f32 },
    /// 分段线性曲线 `(t, value)`
    Curve(Vec<(f32, f32)>),
    /// 在两条曲线之间随机
    UniformCurve {
        min: Vec<(f32, f32)>,
        max: Vec<(f32, f32)>,
    },
}

impl FloatDistribution {
    /// 带随机的采样
    pub fn sample<R: Rng + ?Sized>(&self, t: f32, rng: &mut R) -> f32 {
        match self {
            Self::Constant(v) => *v,
            Self::Uniform { min, max } => lerp(*min, *max, rng.gen::<f32>()),
            Self::Curve(points) => sample_curve(points, t),
            Self::UniformCurve { min, max } => {
                lerp(sample_curve(min, t), sample_curve(max, t), rng.gen::<f32>())
            }
        }
    }

    /// 确定性取值：随机分布取中点
    pub fn value_at(&self, t: f32) -> f32 {
        match self {
            Self::Constant(v) => *v,
            Self::Uniform { min, max } => (min + max) * 0.5,
            Self::Curve(points) => sample_curve(points, t),
            Self::UniformCurve { min, max } => (sample_curve(min, t) + sample_curve(max, t)) * 0.5,
        }
    }

    /// 可能取到的最大值
    pub fn max_value(&self) -> f32 {
        match self {
            Self::Constant(v) => *v,
            Self::Uniform { min, max } => min.max(*max),
            Self::Curve(points) => curve_max(points),
            Self::UniformCurve { min, max } => curve_max(min).max(curve_max(max)),
        }
    }
}

impl Default for FloatDistribution {
    fn default() -> Self {
        Self::Constant(0.0)
    }
}

impl From<f32> for FloatDistribution {
    fn from(value: f32) -> Self {
        Self::Constant(value)
    }
}

// ============================================================================
// 向量分布
// ============================================================================

/// 三维向量分布
#[derive(Debug, Clone, PartialEq)]
pub enum VectorDistribution {
    Constant(Vec3),
    /// 逐分量均匀随机
    Uniform { min: Vec3, max: Vec3 },
    Curve(Vec<(f32, Vec3)>),
}

impl VectorDistribution {
    pub fn sample<R: Rng + ?Sized>(&self, t: f32, rng: &mut R) -> Vec3 {
        match self {
            Self::Constant(v) => *v,
            Self::Uniform { min, max } => Vec3::new(
                lerp(min.x, max.x, rng.gen::<f32>()),
                lerp(min.y, max.y, rng.gen::<f32>()),
                lerp(min.z, max.z, rng.gen::<f32>()),
            ),
            Self::Curve(points) => sample_vector_curve(points, t),
        }
    }

    pub fn value_at(&self, t: f32) -> Vec3 {
        match self {
            Self::Constant(v) => *v,
            Self::Uniform { min, max } => (*min + *max) * 0.5,
            Self::Curve(points) => sample_vector_curve(points, t),
        }
    }
}

impl Default for VectorDistribution {
    fn default() -> Self {
        Self::Constant(Vec3::ZERO)
    }
}

impl From<Vec3> for VectorDistribution {
    fn from(value: Vec3) -> Self {
        Self::Constant(value)
    }
}

// ============================================================================
// 颜色渐变
// ============================================================================

/// 颜色停止点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    /// 时间点（0-1）
    pub time: f32,
    /// 颜色
    pub color: LinearColor,
}

/// 颜色渐变
#[derive(Debug, Clone, PartialEq)]
pub struct ColorGradient {
    /// 颜色停止点（按时间排序）
    pub stops: Vec<ColorStop>,
}

impl ColorGradient {
    pub fn new() -> Self {
        Self { stops: Vec::new() }
    }

    pub fn add_stop(mut self, time: f32, color: LinearColor) -> Self {
        self.stops.push(ColorStop { time, color });
        self.stops.sort_by(|a, b| a.time.total_cmp(&b.time));
        self
    }

    /// 采样颜色
    pub fn sample(&self, t: f32) -> LinearColor {
        let (first, last) = match (self.stops.first(), self.stops.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return LinearColor::WHITE,
        };

        let t = t.clamp(0.0, 1.0);
        if t <= first.time {
            return first.color;
        }

        for pair in self.stops.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if t >= a.time && t <= b.time {
                let span = b.time - a.time;
                if span <= f32::EPSILON {
                    return b.color;
                }
                return a.color.lerp(b.color, (t - a.time) / span);
            }
        }

        last.color
    }
}

impl Default for ColorGradient {
    fn default() -> Self {
        Self::new()
            .add_stop(0.0, LinearColor::WHITE)
            .add_stop(1.0, LinearColor::new(1.0, 1.0, 1.0, 0.0))
    }
}

// ============================================================================
// 曲线采样
// ============================================================================

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// 分段线性曲线采样，超出范围时夹取端点
pub fn sample_curve(points: &[(f32, f32)], t: f32) -> f32 {
    let (first, last) = match (points.first(), points.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return 1.0,
    };
    if t <= first.0 {
        return first.1;
    }

    for pair in points.windows(2) {
        let ((t0, v0), (t1, v1)) = (pair[0], pair[1]);
        if t >= t0 && t <= t1 {
            let span = t1 - t0;
            if span <= f32::EPSILON {
                return v1;
            }
            return lerp(v0, v1, (t - t0) / span);
        }
    }

    last.1
}

fn sample_vector_curve(points: &[(f32, Vec3)], t: f32) -> Vec3 {
    let (first, last) = match (points.first(), points.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Vec3::ZERO,
    };
    if t <= first.0 {
        return first.1;
    }

    for pair in points.windows(2) {
        let ((t0, v0), (t1, v1)) = (pair[0], pair[1]);
        if t >= t0 && t <= t1 {
            let span = t1 - t0;
            if span <= f32::EPSILON {
                return v1;
            }
            return v0.lerp(v1, (t - t0) / span);
        }
    }

    last.1
}

fn curve_max(points: &[(f32, f32)]) -> f32 {
    points
        .iter()
        .map(|&(_, v)| v)
        .fold(f32::NEG_INFINITY, f32::max)
        .max(0.0)
}
