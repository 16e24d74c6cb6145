//! 调试几何
//!
//! 编辑器侧调试绘制的接入点：由快照生成点、十字、包围盒线框或速度线。

use crate::particles::bounds::Aabb;
use crate::particles::snapshot::EmitterSnapshot;
use crate::render::view::SceneView;
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// 调试绘制模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DebugMode {
    #[default]
    Points,
    /// 面向相机的十字，大小取粒子尺寸
    Crosses,
    Bounds,
    Velocity,
}

/// 调试图元（世界空间）
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DebugPrimitive {
    Point { position: Vec3, color: [f32; 4] },
    Line { start: Vec3, end: Vec3, color: [f32; 4] },
}

const BOUNDS_COLOR: [f32; 4] = [1.0, 1.0, 0.0, 1.0];
const VELOCITY_COLOR: [f32; 4] = [0.0, 1.0, 1.0, 1.0];

/// 包围盒 12 条边
fn push_box(bounds: &Aabb, out: &mut Vec<DebugPrimitive>) {
    if bounds.is_empty() {
        return;
    }
    let corner = |i: usize| {
        Vec3::new(
            if i & 1 == 0 { bounds.min.x } else { bounds.max.x },
            if i & 2 == 0 { bounds.min.y } else { bounds.max.y },
            if i & 4 == 0 { bounds.min.z } else { bounds.max.z },
        )
    };
    for i in 0..8usize {
        for axis in [1usize, 2, 4] {
            if i & axis == 0 {
                out.push(DebugPrimitive::Line {
                    start: corner(i),
                    end: corner(i | axis),
                    color: BOUNDS_COLOR,
                });
            }
        }
    }
}

/// 为一个发射器快照生成调试图元，追加到 `out`
pub fn emitter_debug_geometry(
    snapshot: &EmitterSnapshot,
    local_to_world: &Mat4,
    view: &SceneView,
    mode: DebugMode,
    out: &mut Vec<DebugPrimitive>,
) {
    let replay = &snapshot.replay;
    let to_world = |p: Vec3| {
        if replay.use_local_space {
            local_to_world.transform_point3(p)
        } else {
            p
        }
    };

    if mode == DebugMode::Bounds {
        let bounds = if replay.use_local_space {
            snapshot.bounds.transformed(local_to_world)
        } else {
            snapshot.bounds
        };
        push_box(&bounds, out);
        return;
    }

    for record in replay.records() {
        let position = to_world(record.position);
        let color = record.color.to_array();
        match mode {
            DebugMode::Points => out.push(DebugPrimitive::Point { position, color }),
            DebugMode::Crosses => {
                let half = record.size.x * replay.scale.x * 0.5;
                for axis in [view.camera_right(), view.camera_up()] {
                    out.push(DebugPrimitive::Line {
                        start: position - axis * half,
                        end: position + axis * half,
                        color,
                    });
                }
            }
            DebugMode::Velocity => {
                let velocity = if replay.use_local_space {
                    local_to_world.transform_vector3(record.velocity)
                } else {
                    record.velocity
                };
                out.push(DebugPrimitive::Line {
                    start: position,
                    end: position + velocity,
                    color: VELOCITY_COLOR,
                });
            }
            DebugMode::Bounds => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::record::ParticleRecord;
    use crate::particles::template::{EmitterType, EmitterTypeSettings};
    use crate::render::fill::test_support::{front_view, snapshot_with};

    fn snapshot() -> EmitterSnapshot {
        let mut record = ParticleRecord::spawned_at(Vec3::new(1.0, 0.0, 0.0));
        record.velocity = Vec3::Y * 2.0;
        let mut snapshot = snapshot_with(
            EmitterType::Sprite,
            EmitterTypeSettings::Sprite,
            0,
            &[record, ParticleRecord::spawned_at(Vec3::ZERO)],
            |_, _| {},
        );
        snapshot.bounds = Aabb::new(Vec3::ZERO, Vec3::ONE);
        snapshot
    }

    #[test]
    fn test_debug_modes() {
        let snapshot = snapshot();
        let view = front_view();
        let mut out = Vec::new();

        emitter_debug_geometry(&snapshot, &Mat4::IDENTITY, &view, DebugMode::Points, &mut out);
        assert_eq!(out.len(), 2);

        out.clear();
        emitter_debug_geometry(&snapshot, &Mat4::IDENTITY, &view, DebugMode::Crosses, &mut out);
        assert_eq!(out.len(), 4);

        out.clear();
        emitter_debug_geometry(&snapshot, &Mat4::IDENTITY, &view, DebugMode::Bounds, &mut out);
        assert_eq!(out.len(), 12);

        out.clear();
        emitter_debug_geometry(&snapshot, &Mat4::IDENTITY, &view, DebugMode::Velocity, &mut out);
        assert_eq!(
            out[0],
            DebugPrimitive::Line {
                start: Vec3::X,
                end: Vec3::new(1.0, 2.0, 0.0),
                color: VELOCITY_COLOR,
            }
        );
    }
}
