//! 拖尾：按拖尾序号分组、按生成时间排序后连成条带
//!
//! Ribbon 的宽度方向始终面向相机；AnimTrail 使用生成时记录的上方向。

use super::{push_strip, strip_sizes, EmitterRenderer, FillBuffers, FillInput, IndexAllocInfo, StripPoint};
use crate::core::error::RenderResult;
use crate::particles::payload::TrailPayload;
use crate::particles::record::ParticleRecord;
use crate::particles::template::{EmitterType, EmitterTypeSettings, TrailSettings};
use crate::render::vertex::BeamTrailVertex;
use glam::Vec3;
use std::collections::BTreeMap;

/// 拖尾上的一个粒子
#[derive(Debug, Clone, Copy)]
struct TrailNode<'a> {
    index: usize,
    record: &'a ParticleRecord,
    trail: &'a TrailPayload,
}

/// 可绘制粒子按拖尾分组，组内从旧到新
fn collect_trails<'a>(input: &FillInput<'a>) -> Vec<Vec<TrailNode<'a>>> {
    let replay = input.replay();
    let mut trails: BTreeMap<u32, Vec<TrailNode<'a>>> = BTreeMap::new();
    for index in 0..replay.draw_count() {
        let (Some(record), Some(trail)) = (
            replay.record(index),
            replay.payload::<TrailPayload>(index, replay.offsets.type_data),
        ) else {
            continue;
        };
        trails
            .entry(trail.trail_index)
            .or_default()
            .push(TrailNode { index, record, trail });
    }
    trails
        .into_values()
        .map(|mut nodes| {
            nodes.sort_by(|a, b| {
                a.trail
                    .spawn_time
                    .total_cmp(&b.trail.spawn_time)
                    .then(a.record.counter().cmp(&b.record.counter()))
            });
            nodes
        })
        .collect()
}

fn settings(input: &FillInput<'_>) -> TrailSettings {
    match &input.snapshot.type_data {
        EmitterTypeSettings::Ribbon(settings) | EmitterTypeSettings::AnimTrail(settings) => *settings,
        _ => TrailSettings::default(),
    }
}

/// 拖尾细分后的截面数
fn point_count(nodes: usize, tessellation: usize) -> usize {
    if nodes < 2 {
        0
    } else {
        (nodes - 1) * tessellation + 1
    }
}

fn totals(input: &FillInput<'_>) -> (usize, usize) {
    let tessellation = settings(input).tessellation.max(1) as usize;
    collect_trails(input)
        .iter()
        .map(|nodes| strip_sizes(point_count(nodes.len(), tessellation)))
        .fold((0, 0), |(v, i), (dv, di)| (v + dv, i + di))
}

fn fill_trails(input: &FillInput<'_>, buffers: &mut FillBuffers, use_stored_up: bool) -> usize {
    let replay = input.replay();
    let view = input.view;
    let tessellation = settings(input).tessellation.max(1) as usize;
    let mut triangles = 0;
    let mut points = Vec::new();

    for nodes in collect_trails(input) {
        if nodes.len() < 2 {
            continue;
        }
        let positions: Vec<Vec3> = nodes
            .iter()
            .map(|node| input.to_world_point(node.record.position))
            .collect();

        points.clear();
        for segment in 0..nodes.len() - 1 {
            let (a, b) = (&nodes[segment], &nodes[segment + 1]);
            let direction = (positions[segment + 1] - positions[segment]).normalize_or_zero();
            let last = segment == nodes.len() - 2;
            let steps = if last { tessellation + 1 } else { tessellation };

            for step in 0..steps {
                let t = step as f32 / tessellation as f32;
                let center = positions[segment].lerp(positions[segment + 1], t);
                let side = if use_stored_up {
                    input
                        .to_world_vector(a.trail.up.lerp(b.trail.up, t))
                        .normalize_or_zero()
                } else {
                    let to_camera = (view.camera_position - center).normalize_or_zero();
                    direction.cross(to_camera).normalize_or_zero()
                };
                let side = if side == Vec3::ZERO { view.camera_up() } else { side };
                let width = a.record.size.x + (b.record.size.x - a.record.size.x) * t;

                points.push(StripPoint {
                    center,
                    side: side * width * replay.scale.x * 0.5,
                    u: a.trail.tiled_u + (b.trail.tiled_u - a.trail.tiled_u) * t,
                    relative_time: a.record.relative_time
                        + (b.record.relative_time - a.record.relative_time) * t,
                    color: a.record.color.lerp(b.record.color, t).to_array(),
                    particle_id: a.record.counter() as f32,
                    particle: a.index,
                });
            }
        }
        triangles += push_strip(buffers, replay, &points);
    }
    triangles
}

/// 面向相机的条带拖尾
#[derive(Debug, Default)]
pub struct RibbonRenderer;

impl EmitterRenderer for RibbonRenderer {
    fn emitter_type(&self) -> EmitterType {
        EmitterType::Ribbon
    }

    fn vertex_stride(&self) -> usize {
        std::mem::size_of::<BeamTrailVertex>()
    }

    fn vertex_count(&self, input: &FillInput<'_>) -> usize {
        totals(input).0
    }

    fn index_alloc_info(&self, input: &FillInput<'_>) -> IndexAllocInfo {
        let (vertices, indices) = totals(input);
        IndexAllocInfo::for_vertices(indices, vertices)
    }

    fn uses_sorting(&self) -> bool {
        false
    }

    fn fill_buffers(&self, input: &FillInput<'_>, buffers: &mut FillBuffers) -> RenderResult<usize> {
        Ok(fill_trails(input, buffers, false))
    }
}

/// 使用存储上方向的动画拖尾
#[derive(Debug, Default)]
pub struct AnimTrailRenderer;

impl EmitterRenderer for AnimTrailRenderer {
    fn emitter_type(&self) -> EmitterType {
        EmitterType::AnimTrail
    }

    fn vertex_stride(&self) -> usize {
        std::mem::size_of::<BeamTrailVertex>()
    }

    fn vertex_count(&self, input: &FillInput<'_>) -> usize {
        totals(input).0
    }

    fn index_alloc_info(&self, input: &FillInput<'_>) -> IndexAllocInfo {
        let (vertices, indices) = totals(input);
        IndexAllocInfo::for_vertices(indices, vertices)
    }

    fn uses_sorting(&self) -> bool {
        false
    }

    fn fill_buffers(&self, input: &FillInput<'_>, buffers: &mut FillBuffers) -> RenderResult<usize> {
        Ok(fill_trails(input, buffers, true))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{fill_emitter, FillInput};
    use super::*;
    use crate::particles::payload::ParticlePayload;
    use crate::particles::snapshot::EmitterSnapshot;
    use glam::Mat4;

    /// (位置, 拖尾序号, 生成时间)
    fn trail_snapshot(settings: EmitterTypeSettings, nodes: &[(Vec3, u32, f32)]) -> EmitterSnapshot {
        let records: Vec<ParticleRecord> = nodes
            .iter()
            .enumerate()
            .map(|(i, (position, _, _))| {
                let mut record = ParticleRecord::spawned_at(*position);
                record.set_counter(i as u32);
                record
            })
            .collect();
        let mut snapshot = snapshot_with(
            settings.emitter_type(),
            settings,
            TrailPayload::SIZE,
            &records,
            |i, slot| {
                let (_, trail_index, spawn_time) = nodes[i];
                write_at(
                    slot,
                    128,
                    &TrailPayload {
                        up: Vec3::Z,
                        trail_index,
                        spawn_time,
                        tiled_u: spawn_time,
                    },
                );
            },
        );
        snapshot.replay.offsets.type_data = Some(128);
        snapshot
    }

    fn fill(renderer: &dyn EmitterRenderer, snapshot: &EmitterSnapshot) -> super::super::FillOutput {
        let view = front_view();
        let input = FillInput {
            snapshot,
            view: &view,
            local_to_world: Mat4::IDENTITY,
            order: None,
        };
        fill_emitter(renderer, &input).unwrap()
    }

    #[test]
    fn test_ribbon_groups_and_orders_by_spawn_time() {
        // 两条拖尾，交错存储且乱序
        let snapshot = trail_snapshot(
            EmitterTypeSettings::Ribbon(TrailSettings { max_trails: 2, ..TrailSettings::default() }),
            &[
                (Vec3::new(2.0, 0.0, 0.0), 0, 2.0),
                (Vec3::new(0.0, 5.0, 0.0), 1, 0.0),
                (Vec3::new(0.0, 0.0, 0.0), 0, 0.0),
                (Vec3::new(1.0, 0.0, 0.0), 0, 1.0),
            ],
        );
        let output = fill(&RibbonRenderer, &snapshot);
        // 拖尾 0 三个截面，拖尾 1 只有一个粒子不绘制
        assert_eq!(output.vertex_count, 6);
        assert_eq!(output.primitive_count, 4);

        let vertices: Vec<BeamTrailVertex> = output.vertices();
        assert!((vertices[0].position.x).abs() < 1e-5);
        assert!((vertices[2].position.x - 1.0).abs() < 1e-5);
        assert!((vertices[4].position.x - 2.0).abs() < 1e-5);
        assert!((vertices[4].uv.x - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_tessellation_subdivides_segments() {
        let snapshot = trail_snapshot(
            EmitterTypeSettings::Ribbon(TrailSettings { tessellation: 4, ..TrailSettings::default() }),
            &[(Vec3::ZERO, 0, 0.0), (Vec3::X * 4.0, 0, 1.0), (Vec3::X * 8.0, 0, 2.0)],
        );
        let output = fill(&RibbonRenderer, &snapshot);
        assert_eq!(output.vertex_count, (2 * 4 + 1) * 2);
        let vertices: Vec<BeamTrailVertex> = output.vertices();
        assert!((vertices[2].position.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_anim_trail_uses_stored_up() {
        let snapshot = trail_snapshot(
            EmitterTypeSettings::AnimTrail(TrailSettings::default()),
            &[(Vec3::ZERO, 0, 0.0), (Vec3::X, 0, 1.0)],
        );
        let vertices: Vec<BeamTrailVertex> = fill(&AnimTrailRenderer, &snapshot).vertices();
        // 上方向为 +Z，截面沿 Z 展开
        assert!((vertices[0].position - Vec3::new(0.0, 0.0, -0.5)).length() < 1e-5);
        assert!((vertices[1].position - Vec3::new(0.0, 0.0, 0.5)).length() < 1e-5);
    }
}
