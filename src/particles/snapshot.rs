//! 每帧动态快照
//!
//! 模拟线程在 tick 结束后为每个发射器实例复制一份渲染所需的数据。
//! 快照是独立拥有的值，渲染线程从不别名模拟线程的内存。
//! 创建后不可变，通过 `Arc` 在渲染侧的多个视图和填充任务间共享。

use crate::particles::bounds::Aabb;
use crate::particles::offsets::PayloadOffsets;
use crate::particles::payload::{read_payload, read_record, ParticlePayload};
use crate::particles::record::ParticleRecord;
use crate::particles::template::{
    EmitterType, EmitterTypeSettings, MacroUv, MaterialHandle, ScreenAlignment, SortMode,
};
use glam::{Mat4, Vec2, Vec3};
use std::sync::Arc;

/// 组件（粒子系统实例）标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub u64);

/// 渲染一个发射器所需的全部数据
#[derive(Debug, Clone)]
pub struct ReplayData {
    pub emitter_type: EmitterType,
    pub active_count: usize,
    pub stride: usize,
    /// 按活动顺序紧凑排列的粒子槽位
    particle_data: Vec<[u32; 4]>,
    /// 组件缩放
    pub scale: Vec3,
    pub sort_mode: SortMode,
    pub material: MaterialHandle,
    pub use_local_space: bool,
    pub screen_alignment: ScreenAlignment,
    pub sub_images_horizontal: u32,
    pub sub_images_vertical: u32,
    pub pivot_offset: Vec2,
    pub max_draw_count: Option<u32>,
    pub macro_uv_override: Option<MacroUv>,
    pub offsets: PayloadOffsets,
    /// 上一帧步长的倒数，渲染侧用于由位置差求速度
    pub inv_delta_seconds: f32,
}

impl ReplayData {
    /// 由紧凑拷贝构造；数据长度必须是 `active_count × stride`
    pub(crate) fn new(
        emitter_type: EmitterType,
        active_count: usize,
        stride: usize,
        particle_data: Vec<[u32; 4]>,
    ) -> Self {
        Self {
            emitter_type,
            active_count,
            stride,
            particle_data,
            scale: Vec3::ONE,
            sort_mode: SortMode::None,
            material: MaterialHandle::default(),
            use_local_space: false,
            screen_alignment: ScreenAlignment::Square,
            sub_images_horizontal: 1,
            sub_images_vertical: 1,
            pivot_offset: Vec2::ZERO,
            max_draw_count: None,
            macro_uv_override: None,
            offsets: PayloadOffsets::default(),
            inv_delta_seconds: 0.0,
        }
    }

    /// 全部粒子字节
    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.particle_data)
    }

    pub fn particle_bytes(&self, index: usize) -> Option<&[u8]> {
        if index >= self.active_count {
            return None;
        }
        self.bytes()
            .get(index * self.stride..(index + 1) * self.stride)
    }

    pub fn record(&self, index: usize) -> Option<&ParticleRecord> {
        self.particle_bytes(index).and_then(read_record)
    }

    /// 读取第 `index` 个粒子在 `offset` 处的载荷
    pub fn payload<T: ParticlePayload>(&self, index: usize, offset: Option<usize>) -> Option<&T> {
        let offset = offset?;
        self.particle_bytes(index)
            .and_then(|slot| read_payload::<T>(slot, offset))
    }

    pub fn records(&self) -> impl Iterator<Item = &ParticleRecord> + '_ {
        (0..self.active_count).filter_map(|i| self.record(i))
    }

    /// 受 `max_draw_count` 限制后的绘制数量
    pub fn draw_count(&self) -> usize {
        match self.max_draw_count {
            Some(max) => self.active_count.min(max as usize),
            None => self.active_count,
        }
    }

    pub fn sub_image_count(&self) -> u32 {
        self.sub_images_horizontal.max(1) * self.sub_images_vertical.max(1)
    }
}

/// 单个发射器的快照
#[derive(Debug, Clone)]
pub struct EmitterSnapshot {
    /// 在所属系统中的发射器序号
    pub emitter_index: usize,
    pub name: Arc<str>,
    pub lod: usize,
    /// 模拟空间包围盒
    pub bounds: Aabb,
    pub replay: ReplayData,
    pub type_data: EmitterTypeSettings,
}

impl EmitterSnapshot {
    pub fn emitter_type(&self) -> EmitterType {
        self.replay.emitter_type
    }
}

/// 跨线程传递的唯一产物：一个系统一帧的全部快照
#[derive(Debug, Clone)]
pub struct FrameSnapshotBundle {
    pub system_id: ComponentId,
    /// 组件内单调递增的帧号
    pub frame: u64,
    pub local_to_world: Mat4,
    pub macro_uv: MacroUv,
    /// 世界空间包围盒
    pub bounds: Aabb,
    pub emitters: Vec<Arc<EmitterSnapshot>>,
}

impl FrameSnapshotBundle {
    pub fn particle_count(&self) -> usize {
        self.emitters.iter().map(|e| e.replay.active_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::payload::SubUvPayload;
    use crate::particles::record::PARTICLE_RECORD_SIZE;

    fn replay_with(count: usize) -> ReplayData {
        // 步长 144：记录 + 一个 SubUv 载荷 + 填充
        let stride = 144;
        let mut data = vec![[0u32; 4]; count * stride / 16];
        {
            let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut data);
            for i in 0..count {
                let slot = &mut bytes[i * stride..(i + 1) * stride];
                let record: &mut ParticleRecord =
                    bytemuck::from_bytes_mut(&mut slot[..PARTICLE_RECORD_SIZE]);
                record.position = Vec3::splat(i as f32);
                let sub_uv: &mut SubUvPayload =
                    bytemuck::from_bytes_mut(&mut slot[128..136]);
                sub_uv.image_index = i as f32 * 2.0;
            }
        }
        let mut replay = ReplayData::new(EmitterType::Sprite, count, stride, data);
        replay.offsets.sub_uv = Some(128);
        replay
    }

    #[test]
    fn test_replay_accessors() {
        let replay = replay_with(3);
        assert_eq!(replay.record(2).unwrap().position, Vec3::splat(2.0));
        assert!(replay.record(3).is_none());
        let sub_uv = replay
            .payload::<SubUvPayload>(1, replay.offsets.sub_uv)
            .unwrap();
        assert_eq!(sub_uv.image_index, 2.0);
        assert!(replay.payload::<SubUvPayload>(1, None).is_none());
        assert_eq!(replay.records().count(), 3);
    }

    #[test]
    fn test_draw_count_limit() {
        let mut replay = replay_with(5);
        assert_eq!(replay.draw_count(), 5);
        replay.max_draw_count = Some(2);
        assert_eq!(replay.draw_count(), 2);
    }
}
