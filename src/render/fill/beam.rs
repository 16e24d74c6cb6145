//! 光束：源点到目标点的 Hermite 曲线，按段数细分，可多片绕轴排列

use super::{push_strip, strip_sizes, EmitterRenderer, FillBuffers, FillInput, IndexAllocInfo, StripPoint};
use crate::core::error::RenderResult;
use crate::particles::payload::BeamPayload;
use crate::particles::template::EmitterType;
use crate::render::vertex::BeamTrailVertex;
use glam::{Quat, Vec3};
use std::f32::consts::PI;

#[derive(Debug, Default)]
pub struct BeamRenderer;

/// 三次 Hermite 插值
fn hermite(p0: Vec3, m0: Vec3, p1: Vec3, m1: Vec3, t: f32) -> Vec3 {
    let t2 = t * t;
    let t3 = t2 * t;
    p0 * (2.0 * t3 - 3.0 * t2 + 1.0)
        + m0 * (t3 - 2.0 * t2 + t)
        + p1 * (-2.0 * t3 + 3.0 * t2)
        + m1 * (t3 - t2)
}

/// 一条光束的世界空间曲线
#[derive(Debug, Clone, Copy)]
struct BeamCurve {
    source: Vec3,
    target: Vec3,
    source_tangent: Vec3,
    target_tangent: Vec3,
}

impl BeamCurve {
    fn point(&self, t: f32) -> Vec3 {
        hermite(self.source, self.source_tangent, self.target, self.target_tangent, t)
    }

    fn tangent(&self, t: f32, step: f32) -> Vec3 {
        let a = self.point((t - step * 0.5).max(0.0));
        let b = self.point((t + step * 0.5).min(1.0));
        let tangent = (b - a).normalize_or_zero();
        if tangent == Vec3::ZERO {
            (self.target - self.source).normalize_or_zero()
        } else {
            tangent
        }
    }
}

impl BeamRenderer {
    /// 每个可绘制粒子的 (段数, 片数)，缺少类型数据的粒子为 0
    fn shape(input: &FillInput<'_>, index: usize) -> (usize, usize) {
        let replay = input.replay();
        replay
            .payload::<BeamPayload>(index, replay.offsets.type_data)
            .map_or((0, 0), |beam| (beam.steps.max(1) as usize, beam.sheets.max(1) as usize))
    }

    fn totals(input: &FillInput<'_>) -> (usize, usize) {
        input
            .particle_indices()
            .map(|index| {
                let (steps, sheets) = Self::shape(input, index);
                let (vertices, indices) = strip_sizes(if steps == 0 { 0 } else { steps + 1 });
                (vertices * sheets, indices * sheets)
            })
            .fold((0, 0), |(v, i), (dv, di)| (v + dv, i + di))
    }
}

impl EmitterRenderer for BeamRenderer {
    fn emitter_type(&self) -> EmitterType {
        EmitterType::Beam
    }

    fn vertex_stride(&self) -> usize {
        std::mem::size_of::<BeamTrailVertex>()
    }

    fn vertex_count(&self, input: &FillInput<'_>) -> usize {
        Self::totals(input).0
    }

    fn index_alloc_info(&self, input: &FillInput<'_>) -> IndexAllocInfo {
        let (vertices, indices) = Self::totals(input);
        IndexAllocInfo::for_vertices(indices, vertices)
    }

    fn uses_sorting(&self) -> bool {
        false
    }

    fn fill_buffers(&self, input: &FillInput<'_>, buffers: &mut FillBuffers) -> RenderResult<usize> {
        let replay = input.replay();
        let view = input.view;
        let mut triangles = 0;
        let mut points = Vec::new();

        for index in input.particle_indices() {
            let (Some(record), Some(beam)) = (
                replay.record(index),
                replay.payload::<BeamPayload>(index, replay.offsets.type_data),
            ) else {
                continue;
            };
            let steps = beam.steps.max(1) as usize;
            let sheets = beam.sheets.max(1) as usize;

            // 光束随粒子移动：源点取粒子位置，目标保持相对偏移
            let span = beam.target_point - beam.source_point;
            let source = input.to_world_point(record.position);
            let target = input.to_world_point(record.position + span);
            let length = (target - source).length();
            let curve = BeamCurve {
                source,
                target,
                source_tangent: input.to_world_vector(beam.source_tangent).normalize_or_zero()
                    * beam.source_strength
                    * length,
                target_tangent: input.to_world_vector(beam.target_tangent).normalize_or_zero()
                    * beam.target_strength
                    * length,
            };
            let half_width = record.size.x * replay.scale.x * 0.5;
            let step = 1.0 / steps as f32;

            for sheet in 0..sheets {
                let angle = sheet as f32 * PI / sheets as f32;
                points.clear();
                for j in 0..=steps {
                    let t = j as f32 * step;
                    let center = curve.point(t);
                    let tangent = curve.tangent(t, step);
                    let to_camera = (view.camera_position - center).normalize_or_zero();
                    let mut side = tangent.cross(to_camera).normalize_or_zero();
                    if side == Vec3::ZERO {
                        side = view.camera_right();
                    }
                    if sheet > 0 && tangent != Vec3::ZERO {
                        side = Quat::from_axis_angle(tangent, angle) * side;
                    }
                    points.push(StripPoint {
                        center,
                        side: side * half_width,
                        u: t,
                        relative_time: record.relative_time,
                        color: record.color.to_array(),
                        particle_id: record.counter() as f32,
                        particle: index,
                    });
                }
                triangles += push_strip(buffers, replay, &points);
            }
        }
        Ok(triangles)
    }
}
