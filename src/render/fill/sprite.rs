//! 精灵：每粒子一个四边形（4 顶点 6 索引）

use super::{sub_image_rect, EmitterRenderer, FillBuffers, FillInput, IndexAllocInfo};
use crate::core::error::RenderResult;
use crate::particles::payload::{CameraOffsetPayload, OrbitPayload, SubUvPayload};
use crate::particles::record::ParticleRecord;
use crate::particles::template::{EmitterType, ScreenAlignment};
use crate::render::vertex::SpriteVertex;
use glam::{Quat, Vec2, Vec3};

const CORNERS: [Vec2; 4] = [
    Vec2::new(0.0, 0.0),
    Vec2::new(1.0, 0.0),
    Vec2::new(1.0, 1.0),
    Vec2::new(0.0, 1.0),
];

#[derive(Debug, Default)]
pub struct SpriteRenderer;

impl SpriteRenderer {
    /// 粒子在世界空间的中心，包含轨道与相机偏移
    fn world_center(input: &FillInput<'_>, index: usize, record: &ParticleRecord) -> Vec3 {
        let replay = input.replay();
        let mut center = record.position;
        if let Some(orbit) = replay.payload::<OrbitPayload>(index, replay.offsets.orbit) {
            center += orbit.offset;
        }
        let mut center = input.to_world_point(center);
        if let Some(camera) = replay.payload::<CameraOffsetPayload>(index, replay.offsets.camera) {
            let towards = (input.view.camera_position - center).normalize_or_zero();
            center += towards * camera.offset;
        }
        center
    }

    /// 四边形的右、上轴（未旋转）
    fn facing_axes(input: &FillInput<'_>, center: Vec3, record: &ParticleRecord) -> (Vec3, Vec3) {
        let view = input.view;
        match input.replay().screen_alignment {
            ScreenAlignment::Square | ScreenAlignment::Rectangle => {
                (view.camera_right(), view.camera_up())
            }
            ScreenAlignment::Velocity => {
                let velocity = input.to_world_vector(record.velocity);
                let to_camera = (view.camera_position - center).normalize_or_zero();
                let up = velocity.normalize_or_zero();
                let right = up.cross(to_camera).normalize_or_zero();
                if up == Vec3::ZERO || right == Vec3::ZERO {
                    (view.camera_right(), view.camera_up())
                } else {
                    (right, up)
                }
            }
            ScreenAlignment::FacingCameraPosition => {
                let to_camera = (view.camera_position - center).normalize_or_zero();
                let right = view.camera_up().cross(to_camera).normalize_or_zero();
                if right == Vec3::ZERO {
                    (view.camera_right(), view.camera_up())
                } else {
                    (right, to_camera.cross(right))
                }
            }
        }
    }
}

impl EmitterRenderer for SpriteRenderer {
    fn emitter_type(&self) -> EmitterType {
        EmitterType::Sprite
    }

    fn vertex_stride(&self) -> usize {
        std::mem::size_of::<SpriteVertex>()
    }

    fn vertex_count(&self, input: &FillInput<'_>) -> usize {
        input.particle_count() * 4
    }

    fn index_alloc_info(&self, input: &FillInput<'_>) -> IndexAllocInfo {
        let count = input.particle_count();
        IndexAllocInfo::for_vertices(count * 6, count * 4)
    }

    fn fill_buffers(&self, input: &FillInput<'_>, buffers: &mut FillBuffers) -> RenderResult<usize> {
        let replay = input.replay();
        let (h, v) = (replay.sub_images_horizontal, replay.sub_images_vertical);
        let image_count = replay.sub_image_count();
        let pivot = replay.pivot_offset;
        let mut quads = 0;

        for index in input.particle_indices() {
            let Some(record) = replay.record(index) else {
                continue;
            };
            let center = Self::world_center(input, index, record);
            let (right, up) = Self::facing_axes(input, center, record);

            let normal = right.cross(up).normalize_or_zero();
            let spin = Quat::from_axis_angle(normal, record.rotation);
            let (right, up) = if normal == Vec3::ZERO {
                (right, up)
            } else {
                (spin * right, spin * up)
            };

            let mut size = Vec2::new(record.size.x * replay.scale.x, record.size.y * replay.scale.y);
            if replay.screen_alignment == ScreenAlignment::Square {
                size.y = size.x;
            }

            let (image, blend) = replay
                .payload::<SubUvPayload>(index, replay.offsets.sub_uv)
                .map_or((0, 0.0), |s| {
                    let image = s.image_index.max(0.0);
                    (image.floor() as u32, image.fract())
                });
            let (offset, scale) = sub_image_rect(image, h, v);
            let (next_offset, _) = sub_image_rect((image + 1) % image_count, h, v);

            let base = buffers.vertex_count();
            for corner in CORNERS {
                let local = corner - Vec2::splat(0.5) - pivot;
                let uv = Vec2::new(corner.x, 1.0 - corner.y) * scale;
                let vertex = SpriteVertex {
                    position: center + right * (local.x * size.x) + up * (local.y * size.y),
                    relative_time: record.relative_time,
                    color: record.color.to_array(),
                    uv: offset + uv,
                    uv_next: next_offset + uv,
                    sub_image_blend: blend,
                    particle_id: record.counter() as f32,
                };
                buffers.push_vertex(&vertex, replay, index);
            }
            buffers.push_quad(base);
            quads += 1;
        }
        Ok(quads * 2)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{fill_emitter, FillInput};
    use super::*;
    use crate::particles::template::EmitterTypeSettings;
    use crate::render::sort::{sort_particles, ParticleOrder, SortMode};
    use glam::Mat4;

    fn records(positions: &[Vec3]) -> Vec<ParticleRecord> {
        positions
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let mut record = ParticleRecord::spawned_at(p);
                record.set_counter(i as u32);
                record
            })
            .collect()
    }

    #[test]
    fn test_quad_per_particle() {
        let snapshot = snapshot_with(
            EmitterType::Sprite,
            EmitterTypeSettings::Sprite,
            0,
            &records(&[Vec3::ZERO, Vec3::X * 3.0]),
            |_, _| {},
        );
        let view = front_view();
        let input = FillInput {
            snapshot: &snapshot,
            view: &view,
            local_to_world: Mat4::IDENTITY,
            order: None,
        };
        let output = fill_emitter(&SpriteRenderer, &input).unwrap();
        assert_eq!(output.vertex_count, 8);
        assert_eq!(output.index_count, 12);
        assert_eq!(output.index_stride, 2);
        assert_eq!(output.primitive_count, 4);
        assert_eq!(output.indices()[6..], [4, 5, 6, 4, 6, 7]);

        let vertices: Vec<SpriteVertex> = output.vertices();
        // 单位大小、面向 +Z 相机：角点在中心 ±0.5 处
        assert!((vertices[0].position - Vec3::new(-0.5, -0.5, 0.0)).length() < 1e-4);
        assert!((vertices[2].position - Vec3::new(0.5, 0.5, 0.0)).length() < 1e-4);
        assert!((vertices[4].position.x - 2.5).abs() < 1e-4);
        assert_eq!(vertices[5].particle_id, 1.0);
    }

    #[test]
    fn test_sorted_order_is_drawn() {
        let snapshot = snapshot_with(
            EmitterType::Sprite,
            EmitterTypeSettings::Sprite,
            0,
            &records(&[Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -5.0)]),
            |_, _| {},
        );
        let view = front_view();
        let mut order = vec![ParticleOrder::new(0, 0, 0.0); 2];
        assert!(sort_particles(
            SortMode::ViewProjDepth,
            &snapshot.replay,
            &view,
            &Mat4::IDENTITY,
            &mut order
        ));
        let input = FillInput {
            snapshot: &snapshot,
            view: &view,
            local_to_world: Mat4::IDENTITY,
            order: Some(&order[..]),
        };
        let vertices: Vec<SpriteVertex> = fill_emitter(&SpriteRenderer, &input).unwrap().vertices();
        // 远的先画
        assert_eq!(vertices[0].particle_id, 1.0);
        assert_eq!(vertices[4].particle_id, 0.0);
    }

    #[test]
    fn test_sub_image_and_local_space() {
        let mut snapshot = snapshot_with(
            EmitterType::Sprite,
            EmitterTypeSettings::Sprite,
            16,
            &records(&[Vec3::ZERO]),
            |_, slot| {
                write_at(slot, 128, &SubUvPayload { image_index: 1.25, random_image_time: 0.0 });
            },
        );
        snapshot.replay.offsets.sub_uv = Some(128);
        snapshot.replay.sub_images_horizontal = 2;
        snapshot.replay.sub_images_vertical = 2;
        snapshot.replay.use_local_space = true;
        let view = front_view();
        let input = FillInput {
            snapshot: &snapshot,
            view: &view,
            local_to_world: Mat4::from_translation(Vec3::new(0.0, 4.0, 0.0)),
            order: None,
        };
        let vertices: Vec<SpriteVertex> = fill_emitter(&SpriteRenderer, &input).unwrap().vertices();
        let center = vertices.iter().map(|v| v.position).sum::<Vec3>() / 4.0;
        assert!((center - Vec3::new(0.0, 4.0, 0.0)).length() < 1e-4);
        // 图像 1 在第一行第二列
        assert!((vertices[3].uv - Vec2::new(0.5, 0.0)).length() < 1e-5);
        assert!((vertices[3].uv_next - Vec2::new(0.0, 0.5)).length() < 1e-5);
        assert!((vertices[0].sub_image_blend - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_max_draw_count_limits_quads() {
        let mut snapshot = snapshot_with(
            EmitterType::Sprite,
            EmitterTypeSettings::Sprite,
            0,
            &records(&[Vec3::ZERO, Vec3::X, Vec3::Y]),
            |_, _| {},
        );
        snapshot.replay.max_draw_count = Some(1);
        let view = front_view();
        let input = FillInput {
            snapshot: &snapshot,
            view: &view,
            local_to_world: Mat4::IDENTITY,
            order: None,
        };
        assert_eq!(fill_emitter(&SpriteRenderer, &input).unwrap().vertex_count, 4);
    }
}
