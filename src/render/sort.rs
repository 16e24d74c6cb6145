//! 粒子排序
//!
//! 生成 (索引, 排序键) 数组供填充使用。键越小越先绘制；
//! 深度与距离取负值实现从后往前，键相同的粒子按生成计数器排序，
//! 保证同一组数据每次得到同样的顺序。

use crate::particles::payload::DynamicParameterPayload;
use crate::particles::snapshot::ReplayData;
use crate::render::view::SceneView;
use glam::Mat4;

pub use crate::particles::template::SortMode;

/// 单个粒子的绘制顺序项
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleOrder {
    /// 快照中的粒子序号
    pub index: u32,
    /// 生成计数器
    pub counter: u32,
    pub key: f32,
}

impl ParticleOrder {
    pub fn new(index: u32, counter: u32, key: f32) -> Self {
        Self {
            index,
            counter,
            key,
        }
    }
}

/// 按键升序排序，键相同时按生成计数器升序
pub fn sort_entries(entries: &mut [ParticleOrder]) {
    entries.sort_by(|a, b| {
        a.key
            .total_cmp(&b.key)
            .then_with(|| a.counter.cmp(&b.counter))
    });
}

/// 为 `replay` 生成绘制顺序，写入 `out` 前 `out.len()` 项
///
/// `out` 的长度应等于要绘制的粒子数（`draw_count`）。
/// 返回是否真的排序过；`SortMode::None` 时按快照顺序填充。
pub fn sort_particles(
    mode: SortMode,
    replay: &ReplayData,
    view: &SceneView,
    local_to_world: &Mat4,
    out: &mut [ParticleOrder],
) -> bool {
    let to_world = |position| {
        if replay.use_local_space {
            local_to_world.transform_point3(position)
        } else {
            position
        }
    };
    let custom_offset = replay.offsets.sort_key;

    let mut filled = 0usize;
    for (slot, index) in out.iter_mut().zip(0..replay.active_count) {
        let Some(record) = replay.record(index) else {
            break;
        };
        let key = match mode {
            SortMode::None => 0.0,
            SortMode::ViewProjDepth => -view.clip_w(to_world(record.position)),
            SortMode::DistanceToView => -view
                .camera_position
                .distance_squared(to_world(record.position)),
            SortMode::AgeOldestFirst => -record.relative_time,
            SortMode::AgeNewestFirst => record.relative_time,
            SortMode::Custom => custom_offset
                .and_then(|offset| {
                    // 排序键偏移指向动态参数中的某个通道
                    let slot_bytes = replay.particle_bytes(index)?;
                    let bytes = slot_bytes.get(offset..offset + 4)?;
                    Some(-f32::from_le_bytes(bytes.try_into().ok()?))
                })
                .unwrap_or(0.0),
        };
        *slot = ParticleOrder::new(index as u32, record.counter(), key);
        filled += 1;
    }

    let sorted = &mut out[..filled];
    if mode == SortMode::None {
        return false;
    }
    sort_entries(sorted);
    true
}

/// 第 `index` 个粒子的动态参数
pub fn dynamic_parameter(replay: &ReplayData, index: usize) -> Option<[f32; 4]> {
    replay
        .payload::<DynamicParameterPayload>(index, replay.offsets.dynamic_parameter)
        .map(|p| p.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::record::ParticleRecord;
    use crate::particles::template::EmitterType;
    use glam::Vec3;

    fn replay(positions: &[(Vec3, f32)]) -> ReplayData {
        let stride = 128;
        let mut data = vec![[0u32; 4]; positions.len() * stride / 16];
        {
            let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut data);
            for (i, (position, relative_time)) in positions.iter().enumerate() {
                let record: &mut ParticleRecord =
                    bytemuck::from_bytes_mut(&mut bytes[i * stride..(i + 1) * stride]);
                *record = ParticleRecord::spawned_at(*position);
                record.relative_time = *relative_time;
                record.set_counter(i as u32);
            }
        }
        ReplayData::new(EmitterType::Sprite, positions.len(), stride, data)
    }

    fn view() -> SceneView {
        SceneView::look_at(0, Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y, 1.0, 1.0)
    }

    fn order_of(mode: SortMode, replay: &ReplayData) -> Vec<u32> {
        let mut out = vec![ParticleOrder::new(0, 0, 0.0); replay.active_count];
        sort_particles(mode, replay, &view(), &Mat4::IDENTITY, &mut out);
        out.iter().map(|o| o.index).collect()
    }

    #[test]
    fn test_depth_sort_back_to_front() {
        let replay = replay(&[
            (Vec3::new(0.0, 0.0, 5.0), 0.0),
            (Vec3::new(0.0, 0.0, -5.0), 0.0),
            (Vec3::new(0.0, 0.0, 0.0), 0.0),
        ]);
        assert_eq!(order_of(SortMode::ViewProjDepth, &replay), vec![1, 2, 0]);
        assert_eq!(order_of(SortMode::DistanceToView, &replay), vec![1, 2, 0]);
    }

    #[test]
    fn test_age_sort() {
        let replay = replay(&[
            (Vec3::ZERO, 0.2),
            (Vec3::ZERO, 0.9),
            (Vec3::ZERO, 0.5),
        ]);
        assert_eq!(order_of(SortMode::AgeOldestFirst, &replay), vec![1, 2, 0]);
        assert_eq!(order_of(SortMode::AgeNewestFirst, &replay), vec![0, 2, 1]);
        assert_eq!(order_of(SortMode::None, &replay), vec![0, 1, 2]);
    }

    #[test]
    fn test_ties_follow_spawn_order() {
        let replay = replay(&[(Vec3::ONE, 0.5); 6]);
        assert_eq!(order_of(SortMode::AgeOldestFirst, &replay), vec![0, 1, 2, 3, 4, 5]);
    }
}
