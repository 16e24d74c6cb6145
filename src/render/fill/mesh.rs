//! 网格：每粒子一个实例，无索引

use super::{EmitterRenderer, FillBuffers, FillInput, IndexAllocInfo};
use crate::core::error::RenderResult;
use crate::particles::payload::{MeshRotationPayload, OrbitPayload, SubUvPayload};
use crate::particles::template::EmitterType;
use crate::render::vertex::MeshInstanceVertex;
use glam::{EulerRot, Mat4, Quat, Vec3, Vec4};
use std::f32::consts::TAU;

#[derive(Debug, Default)]
pub struct MeshRenderer;

impl EmitterRenderer for MeshRenderer {
    fn emitter_type(&self) -> EmitterType {
        EmitterType::Mesh
    }

    fn vertex_stride(&self) -> usize {
        std::mem::size_of::<MeshInstanceVertex>()
    }

    fn vertex_count(&self, input: &FillInput<'_>) -> usize {
        input.particle_count()
    }

    fn index_alloc_info(&self, input: &FillInput<'_>) -> IndexAllocInfo {
        IndexAllocInfo::for_vertices(0, input.particle_count())
    }

    fn instanced(&self) -> bool {
        true
    }

    fn fill_buffers(&self, input: &FillInput<'_>, buffers: &mut FillBuffers) -> RenderResult<usize> {
        let replay = input.replay();
        let offsets = &replay.offsets;
        let mut instances = 0;

        for index in input.particle_indices() {
            let Some(record) = replay.record(index) else {
                continue;
            };

            // 旋转为圈数，乘以 TAU 得弧度
            let rotation = match replay.payload::<MeshRotationPayload>(index, offsets.mesh_rotation) {
                Some(r) => Quat::from_euler(
                    EulerRot::XYZ,
                    r.rotation.x * TAU,
                    r.rotation.y * TAU,
                    r.rotation.z * TAU,
                ),
                None => Quat::from_rotation_z(record.rotation),
            };
            let mut position = record.position;
            if let Some(orbit) = replay.payload::<OrbitPayload>(index, offsets.orbit) {
                position += orbit.offset;
            }
            let mut transform =
                Mat4::from_scale_rotation_translation(record.size * replay.scale, rotation, position);
            if replay.use_local_space {
                transform = input.local_to_world * transform;
            }
            let rows = transform.transpose();

            let velocity = input.to_world_vector(record.velocity);
            let speed = velocity.length();
            let direction = if speed > 0.0 { velocity / speed } else { Vec3::ZERO };

            let (image, blend) = replay
                .payload::<SubUvPayload>(index, offsets.sub_uv)
                .map_or((0, 0.0), |s| {
                    let image = s.image_index.max(0.0);
                    (image.floor() as u32, image.fract())
                });
            let image_count = replay.sub_image_count();

            let instance = MeshInstanceVertex {
                transform: [rows.x_axis, rows.y_axis, rows.z_axis],
                color: record.color.to_array(),
                velocity: Vec4::new(direction.x, direction.y, direction.z, speed),
                // 当前图像、下一图像、混合系数、图像总数
                sub_uv_params: [
                    (image % image_count) as f32,
                    ((image + 1) % image_count) as f32,
                    blend,
                    image_count as f32,
                ],
                relative_time: record.relative_time,
                particle_id: record.counter() as f32,
                _padding: [0.0; 2],
            };
            buffers.push_vertex(&instance, replay, index);
            instances += 1;
        }
        Ok(instances)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{fill_emitter, FillInput};
    use super::*;
    use crate::particles::record::ParticleRecord;
    use crate::particles::template::{EmitterTypeSettings, MeshHandle};

    #[test]
    fn test_instance_per_particle() {
        let mut record = ParticleRecord::spawned_at(Vec3::new(1.0, 2.0, 3.0));
        record.size = Vec3::splat(2.0);
        record.velocity = Vec3::new(0.0, 3.0, 0.0);
        let mut snapshot = snapshot_with(
            EmitterType::Mesh,
            EmitterTypeSettings::Mesh { mesh: MeshHandle(1) },
            0,
            &[record, ParticleRecord::spawned_at(Vec3::ZERO)],
            |_, _| {},
        );
        snapshot.replay.use_local_space = true;
        let view = front_view();
        let input = FillInput {
            snapshot: &snapshot,
            view: &view,
            local_to_world: Mat4::from_translation(Vec3::X * 10.0),
            order: None,
        };
        let output = fill_emitter(&MeshRenderer, &input).unwrap();
        assert!(output.instanced);
        assert_eq!(output.vertex_count, 2);
        assert_eq!(output.index_count, 0);
        assert!(output.index_data.is_empty());
        assert_eq!(output.primitive_count, 2);

        let instances: Vec<MeshInstanceVertex> = output.vertices();
        let rows = instances[0].transform;
        // 行主序：平移在每行的 w 分量
        assert!((Vec3::new(rows[0].w, rows[1].w, rows[2].w) - Vec3::new(11.0, 2.0, 3.0)).length() < 1e-4);
        assert!((rows[0].x - 2.0).abs() < 1e-4);
        assert!((instances[0].velocity - Vec4::new(0.0, 1.0, 0.0, 3.0)).length() < 1e-5);
    }
}
