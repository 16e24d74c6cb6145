//! 模块偏移表
//!
//! 实例初始化时由模板一次性解析：每个模块槽位的每粒子/每实例载荷偏移、
//! 粒子步长，以及每个 LOD 在各阶段要调用的槽位列表。
//!
//! 同一槽位在所有 LOD 上是同一类别，载荷大小取各 LOD 的最大值，
//! 所以偏移在 LOD 切换前后保持不变，低 LOD 只是多出一些未使用的字节。
//!
//! ```text
//! | ParticleRecord (128) | type data | slot 0 | slot 1 | ... | pad to 16 |
//! ```

use crate::core::error::TemplateResult;
use crate::particles::modules::{ModuleKind, ModulePhases, TickPhase};
use crate::particles::record::{stride_for_payload, PARTICLE_RECORD_SIZE};
use crate::particles::template::EmitterTemplate;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// 渲染侧关心的载荷偏移（槽位相对）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PayloadOffsets {
    pub type_data: Option<usize>,
    pub sub_uv: Option<usize>,
    pub dynamic_parameter: Option<usize>,
    pub orbit: Option<usize>,
    pub camera: Option<usize>,
    pub mesh_rotation: Option<usize>,
    pub light: Option<usize>,
    pub collision: Option<usize>,
    /// 自定义排序键（f32）所在偏移
    pub sort_key: Option<usize>,
}

/// 单个模块槽位的偏移
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotOffsets {
    pub kind: ModuleKind,
    pub payload_offset: Option<usize>,
    pub instance_range: Option<Range<usize>>,
}

/// 一个 LOD 在各阶段调用的槽位（已剔除禁用模块）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct LodSchedule {
    spawn: Vec<usize>,
    update: [Vec<usize>; 3],
}

/// 模块偏移表
#[derive(Debug, Clone)]
pub struct ModuleOffsetTable {
    slots: Vec<SlotOffsets>,
    schedules: Vec<LodSchedule>,
    payload: PayloadOffsets,
    stride: usize,
    instance_payload_size: usize,
}

impl ModuleOffsetTable {
    /// 验证模板并解析偏移
    pub fn build(template: &EmitterTemplate) -> TemplateResult<Self> {
        template.validate()?;

        let mut cursor = PARTICLE_RECORD_SIZE;
        let mut payload = PayloadOffsets::default();

        let type_data_size = template.type_settings.payload_size();
        if type_data_size > 0 {
            payload.type_data = Some(cursor);
            cursor += type_data_size;
        }

        let slot_count = template.lods[0].modules.len();
        let mut slots = Vec::with_capacity(slot_count);
        let mut instance_cursor = 0usize;

        for slot in 0..slot_count {
            let modules = || template.lods.iter().map(move |lod| &lod.modules[slot]);
            let kind = template.lods[0].modules[slot].kind();

            let particle_size = modules()
                .map(|m| align4(m.particle_payload_size()))
                .max()
                .unwrap_or(0);
            let payload_offset = (particle_size > 0).then_some(cursor);
            cursor += particle_size;

            let instance_size = modules()
                .map(|m| align4(m.instance_payload_size()))
                .max()
                .unwrap_or(0);
            let instance_range =
                (instance_size > 0).then(|| instance_cursor..instance_cursor + instance_size);
            instance_cursor += instance_size;

            if let Some(offset) = payload_offset {
                let named = match kind {
                    ModuleKind::SubUv => Some(&mut payload.sub_uv),
                    ModuleKind::DynamicParameter => Some(&mut payload.dynamic_parameter),
                    ModuleKind::Orbit => Some(&mut payload.orbit),
                    ModuleKind::CameraOffset => Some(&mut payload.camera),
                    ModuleKind::MeshRotation => Some(&mut payload.mesh_rotation),
                    ModuleKind::Light => Some(&mut payload.light),
                    ModuleKind::Collision => Some(&mut payload.collision),
                    _ => None,
                };
                // 同类模块出现多次时，渲染侧读取第一个
                if let Some(named) = named {
                    named.get_or_insert(offset);
                }
                if payload.sort_key.is_none() {
                    payload.sort_key = modules()
                        .find_map(|m| m.sort_key_offset())
                        .map(|key| offset + key);
                }
            }

            slots.push(SlotOffsets {
                kind,
                payload_offset,
                instance_range,
            });
        }

        let schedules = template
            .lods
            .iter()
            .map(|lod| {
                let mut schedule = LodSchedule::default();
                for (slot, module) in lod.modules.iter().enumerate() {
                    if !module.enabled() {
                        continue;
                    }
                    let phases = module.phases();
                    if phases.contains(ModulePhases::SPAWN) {
                        schedule.spawn.push(slot);
                    }
                    for (i, phase) in TickPhase::ALL.iter().enumerate() {
                        if phases.contains(phase.phase_bit()) {
                            schedule.update[i].push(slot);
                        }
                    }
                }
                schedule
            })
            .collect();

        let stride = stride_for_payload(cursor - PARTICLE_RECORD_SIZE);
        tracing::debug!(
            target: "particle::emitter",
            emitter = %template.name,
            stride,
            slots = slot_count,
            instance_bytes = instance_cursor,
            "Module offset table built"
        );

        Ok(Self {
            slots,
            schedules,
            payload,
            stride,
            instance_payload_size: instance_cursor,
        })
    }

    /// 粒子步长（字节，16 对齐）
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn instance_payload_size(&self) -> usize {
        self.instance_payload_size
    }

    pub fn payload_offsets(&self) -> PayloadOffsets {
        self.payload
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, slot: usize) -> Option<&SlotOffsets> {
        self.slots.get(slot)
    }

    /// 第一个 `kind` 类模块的每粒子载荷偏移
    pub fn offset_of(&self, kind: ModuleKind) -> Option<usize> {
        self.slots
            .iter()
            .find(|s| s.kind == kind && s.payload_offset.is_some())
            .and_then(|s| s.payload_offset)
    }

    pub fn type_data_offset(&self) -> Option<usize> {
        self.payload.type_data
    }

    /// 某 LOD 在生成阶段调用的槽位
    pub fn spawn_slots(&self, lod: usize) -> &[usize] {
        self.schedules
            .get(lod)
            .map(|s| s.spawn.as_slice())
            .unwrap_or(&[])
    }

    /// 某 LOD 在 `phase` 阶段调用的槽位
    pub fn update_slots(&self, lod: usize, phase: TickPhase) -> &[usize] {
        let index = match phase {
            TickPhase::Update => 0,
            TickPhase::PostUpdate => 1,
            TickPhase::FinalUpdate => 2,
        };
        self.schedules
            .get(lod)
            .map(|s| s.update[index].as_slice())
            .unwrap_or(&[])
    }
}

#[inline]
fn align4(size: usize) -> usize {
    size.div_ceil(4) * 4
}
