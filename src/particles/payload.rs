//! 模块载荷类型与类型化访问
//!
//! 载荷偏移以粒子槽位起点为基准（包含 128 字节的基础记录），
//! 与模块偏移表、快照中记录的偏移保持同一坐标系。

use crate::impl_payload;
use crate::particles::record::{ParticleRecord, PARTICLE_RECORD_SIZE};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// 可放入载荷区的 Pod 类型
pub trait ParticlePayload: Pod {
    /// 载荷字节数
    const SIZE: usize;
}

// ============================================================================
// 载荷定义
// ============================================================================

/// 子图像动画
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SubUvPayload {
    /// 当前图像索引（小数部分用于帧间混合）
    pub image_index: f32,
    /// 随机切换模式下的下次切换时间
    pub random_image_time: f32,
}

/// 动态参数，四个通道原样传给材质
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DynamicParameterPayload {
    pub value: [f32; 4],
}

/// 轨道偏移
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct OrbitPayload {
    pub base_offset: Vec3,
    pub offset: Vec3,
    /// 以圈为单位（1.0 = 360°）
    pub rotation: Vec3,
    pub base_rotation_rate: Vec3,
    pub rotation_rate: Vec3,
    pub previous_offset: Vec3,
}

/// 碰撞状态
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CollisionPayload {
    pub damping: Vec3,
    pub used_collisions: u32,
    pub delay: f32,
}

/// 粒子光源参数
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightPayload {
    pub color_scale: Vec3,
    pub radius_scale: f32,
    pub exponent: f32,
    /// 非零表示该粒子发光
    pub valid: u32,
}

/// 网格旋转（欧拉角，以圈为单位）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshRotationPayload {
    pub initial_orientation: Vec3,
    pub rotation: Vec3,
    pub rotation_rate: Vec3,
    pub rotation_rate_base: Vec3,
}

/// 朝向相机的偏移
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraOffsetPayload {
    pub base_offset: f32,
    pub offset: f32,
}

/// 加速度（生成时采样）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct AccelerationPayload {
    pub acceleration: Vec3,
}

/// 光束类型数据
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BeamPayload {
    pub source_point: Vec3,
    pub source_strength: f32,
    pub target_point: Vec3,
    pub target_strength: f32,
    pub source_tangent: Vec3,
    /// 插值段数
    pub steps: u32,
    pub target_tangent: Vec3,
    pub sheets: u32,
}

/// 拖尾类型数据（Ribbon / AnimTrail 共用）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TrailPayload {
    pub up: Vec3,
    pub trail_index: u32,
    pub spawn_time: f32,
    pub tiled_u: f32,
}

impl_payload!(
    SubUvPayload,
    DynamicParameterPayload,
    OrbitPayload,
    CollisionPayload,
    LightPayload,
    MeshRotationPayload,
    CameraOffsetPayload,
    AccelerationPayload,
    BeamPayload,
    TrailPayload,
);

// ============================================================================
// 槽位视图
// ============================================================================

/// 单个粒子槽位的可变视图：基础记录 + 载荷区
pub struct ParticleView<'a> {
    pub record: &'a mut ParticleRecord,
    pub payload: PayloadMut<'a>,
}

impl<'a> ParticleView<'a> {
    /// 把一个完整槽位（步长字节）拆分为记录与载荷
    ///
    /// 调用方保证 `bytes` 以 4 字节对齐且长度不小于基础记录。
    pub(crate) fn from_slot_bytes(bytes: &'a mut [u8]) -> Self {
        let (head, tail) = bytes.split_at_mut(PARTICLE_RECORD_SIZE);
        Self {
            record: bytemuck::from_bytes_mut(head),
            payload: PayloadMut { bytes: tail },
        }
    }
}

/// 载荷区的可变访问器，偏移以槽位起点为基准
pub struct PayloadMut<'a> {
    bytes: &'a mut [u8],
}

impl PayloadMut<'_> {
    /// 读取偏移处的载荷；偏移越界或未对齐返回 `None`
    pub fn get<T: ParticlePayload>(&self, offset: usize) -> Option<&T> {
        let start = offset.checked_sub(PARTICLE_RECORD_SIZE)?;
        let bytes = self.bytes.get(start..start + T::SIZE)?;
        bytemuck::try_from_bytes(bytes).ok()
    }

    /// 可变访问偏移处的载荷
    pub fn get_mut<T: ParticlePayload>(&mut self, offset: usize) -> Option<&mut T> {
        let start = offset.checked_sub(PARTICLE_RECORD_SIZE)?;
        let bytes = self.bytes.get_mut(start..start + T::SIZE)?;
        bytemuck::try_from_bytes_mut(bytes).ok()
    }

    /// 同时访问两个不重叠的载荷
    pub fn get_pair_mut<A: ParticlePayload, B: ParticlePayload>(
        &mut self,
        offset_a: usize,
        offset_b: usize,
    ) -> Option<(&mut A, &mut B)> {
        let a_start = offset_a.checked_sub(PARTICLE_RECORD_SIZE)?;
        let b_start = offset_b.checked_sub(PARTICLE_RECORD_SIZE)?;
        let (a_end, b_end) = (a_start + A::SIZE, b_start + B::SIZE);
        if a_end > self.bytes.len() || b_end > self.bytes.len() {
            return None;
        }
        if a_end <= b_start {
            let (left, right) = self.bytes.split_at_mut(b_start);
            let a = bytemuck::try_from_bytes_mut(&mut left[a_start..a_end]).ok()?;
            let b = bytemuck::try_from_bytes_mut(&mut right[..B::SIZE]).ok()?;
            Some((a, b))
        } else if b_end <= a_start {
            let (left, right) = self.bytes.split_at_mut(a_start);
            let b = bytemuck::try_from_bytes_mut(&mut left[b_start..b_end]).ok()?;
            let a = bytemuck::try_from_bytes_mut(&mut right[..A::SIZE]).ok()?;
            Some((a, b))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// 从只读槽位字节中读取载荷（快照侧使用）
pub fn read_payload<T: ParticlePayload>(slot: &[u8], offset: usize) -> Option<&T> {
    if offset < PARTICLE_RECORD_SIZE {
        return None;
    }
    let bytes = slot.get(offset..offset + T::SIZE)?;
    bytemuck::try_from_bytes(bytes).ok()
}

/// 从只读槽位字节中读取基础记录
pub fn read_record(slot: &[u8]) -> Option<&ParticleRecord> {
    let bytes = slot.get(..PARTICLE_RECORD_SIZE)?;
    bytemuck::try_from_bytes(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 以 u32 为底的缓冲区，保证 4 字节对齐
    fn slot_buffer(len: usize) -> Vec<u32> {
        vec![0u32; len / 4]
    }

    #[test]
    fn test_view_splits_record_and_payload() {
        let mut storage = slot_buffer(160);
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut storage);
        let view = ParticleView::from_slot_bytes(bytes);
        view.record.position = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(view.payload.len(), 32);
        assert_eq!(read_record(bytes).unwrap().position, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_payload_offsets_are_slot_relative() {
        let mut storage = slot_buffer(160);
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut storage);
        {
            let mut view = ParticleView::from_slot_bytes(bytes);
            let sub_uv = view.payload.get_mut::<SubUvPayload>(128).unwrap();
            sub_uv.image_index = 3.5;
            // 记录区域内的偏移无效
            assert!(view.payload.get::<SubUvPayload>(64).is_none());
            // 越界
            assert!(view.payload.get::<OrbitPayload>(144).is_none());
        }
        assert_eq!(read_payload::<SubUvPayload>(bytes, 128).unwrap().image_index, 3.5);
    }

    #[test]
    fn test_pair_access() {
        let mut storage = slot_buffer(176);
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut storage);
        let mut view = ParticleView::from_slot_bytes(bytes);
        {
            let (camera, sub_uv) = view
                .payload
                .get_pair_mut::<CameraOffsetPayload, SubUvPayload>(136, 128)
                .unwrap();
            camera.offset = 2.0;
            sub_uv.image_index = 1.0;
        }
        // 重叠区域拒绝
        assert!(view
            .payload
            .get_pair_mut::<SubUvPayload, CameraOffsetPayload>(128, 132)
            .is_none());
        assert_eq!(view.payload.get::<CameraOffsetPayload>(136).unwrap().offset, 2.0);
    }
}
