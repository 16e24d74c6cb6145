//! 粒子记录布局
//!
//! 每个粒子在池中占据一个固定步长的槽位：前 128 字节是 [`ParticleRecord`]，
//! 之后是各模块的载荷区。记录按 16 字节分组，字段顺序不可随意调整。

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

// ============================================================================
// 状态标志
// ============================================================================

/// 粒子 `flags` 字段的位定义
///
/// 高位是状态标志，低 25 位是单调递增的粒子计数器（生成顺序令牌）。
pub mod state_flags {
    /// 强制在本帧 Kill 阶段移除
    pub const FORCE_KILL: u32 = 0x0200_0000;
    /// 完全冻结：跳过更新与积分
    pub const FREEZE: u32 = 0x0400_0000;
    /// 忽略碰撞
    pub const IGNORE_COLLISIONS: u32 = 0x0800_0000;
    /// 冻结平移
    pub const FREEZE_TRANSLATION: u32 = 0x1000_0000;
    /// 冻结旋转
    pub const FREEZE_ROTATION: u32 = 0x2000_0000;
    /// 碰撞延迟中
    pub const DELAY_COLLISIONS: u32 = 0x4000_0000;
    /// 已发生过碰撞
    pub const HAS_COLLIDED: u32 = 0x8000_0000;

    /// 全部状态位
    pub const STATE_MASK: u32 = 0xFE00_0000;
    /// 计数器位
    pub const COUNTER_MASK: u32 = !STATE_MASK;
}

// ============================================================================
// 线性颜色
// ============================================================================

/// 线性空间 RGBA 颜色
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct LinearColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl LinearColor {
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_vec4(v: Vec4) -> Self {
        Self::new(v.x, v.y, v.z, v.w)
    }

    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(self.r, self.g, self.b, self.a)
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// 线性插值
    pub fn lerp(self, other: Self, t: f32) -> Self {
        Self::from_vec4(self.to_vec4().lerp(other.to_vec4(), t))
    }

    /// 逐分量相乘
    pub fn modulate(self, other: Self) -> Self {
        Self::from_vec4(self.to_vec4() * other.to_vec4())
    }
}

impl Default for LinearColor {
    fn default() -> Self {
        Self::WHITE
    }
}

// ============================================================================
// 粒子记录
// ============================================================================

/// 粒子基础记录
///
/// `relative_time` 在 `[0, 1]` 内：0 表示刚生成，1 表示死亡。
/// `one_over_max_lifetime == 0` 表示无限寿命。
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ParticleRecord {
    pub old_position: Vec3,
    pub relative_time: f32,
    pub position: Vec3,
    pub one_over_max_lifetime: f32,
    pub base_velocity: Vec3,
    pub rotation: f32,
    pub velocity: Vec3,
    pub base_rotation_rate: f32,
    pub base_size: Vec3,
    pub rotation_rate: f32,
    pub size: Vec3,
    pub flags: u32,
    pub color: LinearColor,
    pub base_color: LinearColor,
}

/// 粒子记录字节数
pub const PARTICLE_RECORD_SIZE: usize = std::mem::size_of::<ParticleRecord>();

/// 粒子步长的对齐粒度
pub const PARTICLE_STRIDE_ALIGN: usize = 16;

const _: () = assert!(PARTICLE_RECORD_SIZE == 128);

impl ParticleRecord {
    /// 生成时的初始状态：单位大小、白色、位于 `position`
    pub fn spawned_at(position: Vec3) -> Self {
        Self {
            old_position: position,
            position,
            base_size: Vec3::ONE,
            size: Vec3::ONE,
            color: LinearColor::WHITE,
            base_color: LinearColor::WHITE,
            ..Self::zeroed()
        }
    }

    #[inline]
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    #[inline]
    pub fn set_flag(&mut self, flag: u32) {
        self.flags |= flag & state_flags::STATE_MASK;
    }

    #[inline]
    pub fn clear_flag(&mut self, flag: u32) {
        self.flags &= !(flag & state_flags::STATE_MASK);
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.has_flag(state_flags::FREEZE)
    }

    /// 生成计数器（低位令牌）
    #[inline]
    pub fn counter(&self) -> u32 {
        self.flags & state_flags::COUNTER_MASK
    }

    #[inline]
    pub fn set_counter(&mut self, counter: u32) {
        self.flags = (self.flags & state_flags::STATE_MASK) | (counter & state_flags::COUNTER_MASK);
    }

    /// 到达寿命终点或被模块请求移除
    #[inline]
    pub fn should_kill(&self) -> bool {
        self.relative_time >= 1.0 || self.has_flag(state_flags::FORCE_KILL)
    }

    /// 每帧开始时回到基础值
    #[inline]
    pub fn reset_to_base(&mut self, delta_time: f32) {
        self.velocity = self.base_velocity;
        self.size = self.base_size;
        self.rotation_rate = self.base_rotation_rate;
        self.color = self.base_color;
        self.relative_time += delta_time * self.one_over_max_lifetime;
    }

    /// 按速度积分位置和旋转，尊重冻结标志
    #[inline]
    pub fn integrate(&mut self, delta_time: f32) {
        self.old_position = self.position;
        if !self.has_flag(state_flags::FREEZE_TRANSLATION) {
            self.position += self.velocity * delta_time;
        }
        if !self.has_flag(state_flags::FREEZE_ROTATION) {
            self.rotation += self.rotation_rate * delta_time;
        }
    }

    /// 最大寿命（秒），无限寿命返回 `None`
    pub fn max_lifetime(&self) -> Option<f32> {
        (self.one_over_max_lifetime > 0.0).then(|| 1.0 / self.one_over_max_lifetime)
    }
}

/// 把基础记录大小加上载荷大小，向上取整到步长粒度
pub fn stride_for_payload(payload_bytes: usize) -> usize {
    let raw = PARTICLE_RECORD_SIZE + payload_bytes;
    raw.div_ceil(PARTICLE_STRIDE_ALIGN) * PARTICLE_STRIDE_ALIGN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout() {
        assert_eq!(std::mem::size_of::<ParticleRecord>(), 128);
        assert_eq!(std::mem::align_of::<ParticleRecord>(), 4);
        assert_eq!(std::mem::offset_of!(ParticleRecord, relative_time), 12);
        assert_eq!(std::mem::offset_of!(ParticleRecord, flags), 92);
        assert_eq!(std::mem::offset_of!(ParticleRecord, base_color), 112);
    }

    #[test]
    fn test_flags_and_counter_are_independent() {
        let mut record = ParticleRecord::spawned_at(Vec3::ZERO);
        record.set_counter(12345);
        record.set_flag(state_flags::FREEZE | state_flags::HAS_COLLIDED);
        assert_eq!(record.counter(), 12345);
        assert!(record.is_frozen());
        assert!(record.has_flag(state_flags::HAS_COLLIDED));

        record.clear_flag(state_flags::FREEZE);
        assert!(!record.is_frozen());
        assert_eq!(record.counter(), 12345);

        // 计数器溢出时只在低位回绕，不污染状态位
        record.set_counter(u32::MAX);
        assert_eq!(record.counter(), state_flags::COUNTER_MASK);
        assert!(record.has_flag(state_flags::HAS_COLLIDED));
        assert!(!record.has_flag(state_flags::FORCE_KILL));
    }

    #[test]
    fn test_reset_and_integrate() {
        let mut record = ParticleRecord::spawned_at(Vec3::ZERO);
        record.base_velocity = Vec3::X;
        record.velocity = Vec3::new(5.0, 5.0, 5.0);
        record.one_over_max_lifetime = 0.5;
        record.base_rotation_rate = 1.0;

        record.reset_to_base(0.5);
        assert_eq!(record.velocity, Vec3::X);
        assert!((record.relative_time - 0.25).abs() < 1e-6);

        record.integrate(2.0);
        assert_eq!(record.position, Vec3::new(2.0, 0.0, 0.0));
        assert!((record.rotation - 2.0).abs() < 1e-6);

        record.set_flag(state_flags::FREEZE_TRANSLATION);
        record.integrate(1.0);
        assert_eq!(record.position, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(record.old_position, record.position);
    }

    #[test]
    fn test_stride_rounding() {
        assert_eq!(stride_for_payload(0), 128);
        assert_eq!(stride_for_payload(4), 144);
        assert_eq!(stride_for_payload(16), 144);
        assert_eq!(stride_for_payload(20), 160);
    }
}
