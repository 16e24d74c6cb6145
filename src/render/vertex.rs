//! 填充缓冲区使用的顶点格式
//!
//! 全部为 `#[repr(C)]` Pod 类型，按字节直接写入目标缓冲区。

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

/// 精灵四边形顶点
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    pub position: Vec3,
    pub relative_time: f32,
    pub color: [f32; 4],
    pub uv: Vec2,
    /// 下一张子图像的 UV，用于帧间混合
    pub uv_next: Vec2,
    pub sub_image_blend: f32,
    /// 生成计数器，供材质做逐粒子随机
    pub particle_id: f32,
}

/// 网格实例数据，每个粒子一条
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshInstanceVertex {
    /// 仿射变换的三行
    pub transform: [Vec4; 3],
    pub color: [f32; 4],
    /// xyz = 速度方向，w = 速率
    pub velocity: Vec4,
    /// 子图像 A、子图像 B、混合系数、保留
    pub sub_uv_params: [f32; 4],
    pub relative_time: f32,
    pub particle_id: f32,
    pub _padding: [f32; 2],
}

/// 光束与拖尾条带顶点
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BeamTrailVertex {
    pub position: Vec3,
    pub relative_time: f32,
    pub uv: Vec2,
    pub particle_id: f32,
    pub _padding: f32,
    pub color: [f32; 4],
}

/// 动态参数流，与主顶点流一一对应
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DynamicParameterVertex {
    pub value: [f32; 4],
}

const _: () = assert!(std::mem::size_of::<SpriteVertex>() == 56);
const _: () = assert!(std::mem::size_of::<MeshInstanceVertex>() == 112);
const _: () = assert!(std::mem::size_of::<BeamTrailVertex>() == 48);
