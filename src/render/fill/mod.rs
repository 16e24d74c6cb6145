//! 缓冲填充
//!
//! 每种发射器类型一个渲染器。渲染器是无状态的纯函数集合：
//! 输入快照、视图和可选的排序结果，输出顶点/索引字节。
//! 任何线程都可以调用，只依赖自己的输入。
//!
//! 索引步长：顶点数不超过 65536 时为 2 字节，否则 4 字节。

mod beam;
mod mesh;
mod sprite;
mod trails;

pub use beam::BeamRenderer;
pub use mesh::MeshRenderer;
pub use sprite::SpriteRenderer;
pub use trails::{AnimTrailRenderer, RibbonRenderer};

use crate::core::error::{RenderError, RenderResult};
use crate::particles::snapshot::{EmitterSnapshot, ReplayData};
use crate::particles::template::EmitterType;
use crate::render::sort::{dynamic_parameter, ParticleOrder};
use crate::render::vertex::{BeamTrailVertex, DynamicParameterVertex};
use crate::render::view::SceneView;
use bytemuck::Pod;
use glam::{Mat4, Vec2, Vec3};
use std::fmt;

/// 索引缓冲区分配信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexAllocInfo {
    pub count: usize,
    /// 2 或 4 字节
    pub stride: usize,
}

impl IndexAllocInfo {
    pub fn for_vertices(index_count: usize, vertex_count: usize) -> Self {
        let stride = if vertex_count <= u16::MAX as usize + 1 { 2 } else { 4 };
        Self {
            count: index_count,
            stride,
        }
    }

    pub fn bytes(&self) -> usize {
        self.count * self.stride
    }
}

/// 填充完成的缓冲区
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillOutput {
    pub vertex_data: Vec<u8>,
    pub index_data: Vec<u8>,
    /// 动态参数流；发射器没有动态参数模块时为空
    pub dynamic_parameter_data: Vec<u8>,
    pub vertex_stride: usize,
    pub index_stride: usize,
    pub vertex_count: usize,
    pub index_count: usize,
    /// 三角形数，网格发射器为实例数
    pub primitive_count: usize,
    pub instanced: bool,
}

impl FillOutput {
    /// 按顶点格式读取顶点（测试与调试使用）
    pub fn vertices<V: Pod>(&self) -> Vec<V> {
        self.vertex_data
            .chunks_exact(std::mem::size_of::<V>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    pub fn indices(&self) -> Vec<u32> {
        match self.index_stride {
            2 => self
                .index_data
                .chunks_exact(2)
                .map(|b| u32::from(u16::from_le_bytes([b[0], b[1]])))
                .collect(),
            _ => self
                .index_data
                .chunks_exact(4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        }
    }
}

/// 填充输入
#[derive(Debug, Clone, Copy)]
pub struct FillInput<'a> {
    pub snapshot: &'a EmitterSnapshot,
    pub view: &'a SceneView,
    pub local_to_world: Mat4,
    /// 排序结果；`None` 时按快照顺序绘制
    pub order: Option<&'a [ParticleOrder]>,
}

impl<'a> FillInput<'a> {
    pub fn replay(&self) -> &'a ReplayData {
        &self.snapshot.replay
    }

    /// 要绘制的粒子数
    pub fn particle_count(&self) -> usize {
        let limit = self.replay().draw_count();
        self.order.map_or(limit, |order| order.len().min(limit))
    }

    /// 按绘制顺序给出快照中的粒子序号
    pub fn particle_indices(&self) -> impl Iterator<Item = usize> + 'a {
        let count = self.particle_count();
        let order = self.order;
        (0..count).map(move |i| order.map_or(i, |order| order[i].index as usize))
    }

    pub fn to_world_point(&self, position: Vec3) -> Vec3 {
        if self.replay().use_local_space {
            self.local_to_world.transform_point3(position)
        } else {
            position
        }
    }

    pub fn to_world_vector(&self, vector: Vec3) -> Vec3 {
        if self.replay().use_local_space {
            self.local_to_world.transform_vector3(vector)
        } else {
            vector
        }
    }
}

/// 填充目标：顶点流、索引流与可选的动态参数流
#[derive(Debug)]
pub struct FillBuffers {
    vertex_data: Vec<u8>,
    index_data: Vec<u8>,
    dynamic_parameter_data: Option<Vec<u8>>,
    index_stride: usize,
    vertex_count: usize,
    index_count: usize,
}

impl FillBuffers {
    fn new(vertex_bytes: usize, index: IndexAllocInfo, replay: &ReplayData) -> Self {
        Self {
            vertex_data: Vec::with_capacity(vertex_bytes),
            index_data: Vec::with_capacity(index.bytes()),
            dynamic_parameter_data: replay.offsets.dynamic_parameter.map(|_| Vec::new()),
            index_stride: index.stride,
            vertex_count: 0,
            index_count: 0,
        }
    }

    /// 写入一个顶点；有动态参数时同时写入来源粒子的参数
    pub fn push_vertex<V: Pod>(&mut self, vertex: &V, replay: &ReplayData, particle: usize) {
        self.vertex_data.extend_from_slice(bytemuck::bytes_of(vertex));
        self.vertex_count += 1;
        if let Some(stream) = &mut self.dynamic_parameter_data {
            let value = dynamic_parameter(replay, particle).unwrap_or([1.0; 4]);
            stream.extend_from_slice(bytemuck::bytes_of(&DynamicParameterVertex { value }));
        }
    }

    pub fn push_index(&mut self, index: usize) {
        if self.index_stride == 2 {
            self.index_data
                .extend_from_slice(&(index as u16).to_le_bytes());
        } else {
            self.index_data
                .extend_from_slice(&(index as u32).to_le_bytes());
        }
        self.index_count += 1;
    }

    /// 四边形 `base..base+4` 的两个三角形
    pub fn push_quad(&mut self, base: usize) {
        for offset in [0, 1, 2, 0, 2, 3] {
            self.push_index(base + offset);
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }
}

/// 条带（光束、拖尾）的一个截面
#[derive(Debug, Clone, Copy)]
pub(crate) struct StripPoint {
    pub center: Vec3,
    /// 半宽方向向量
    pub side: Vec3,
    pub u: f32,
    pub relative_time: f32,
    pub color: [f32; 4],
    pub particle_id: f32,
    /// 动态参数来源粒子
    pub particle: usize,
}

/// 写入一条由 `points` 组成的条带，返回三角形数
pub(crate) fn push_strip(buffers: &mut FillBuffers, replay: &ReplayData, points: &[StripPoint]) -> usize {
    if points.len() < 2 {
        return 0;
    }
    let base = buffers.vertex_count();
    for point in points {
        for (edge, v) in [(-1.0f32, 0.0f32), (1.0, 1.0)] {
            let vertex = BeamTrailVertex {
                position: point.center + point.side * edge,
                relative_time: point.relative_time,
                uv: Vec2::new(point.u, v),
                particle_id: point.particle_id,
                _padding: 0.0,
                color: point.color,
            };
            buffers.push_vertex(&vertex, replay, point.particle);
        }
    }
    let segments = points.len() - 1;
    for segment in 0..segments {
        let b = base + segment * 2;
        for index in [b, b + 1, b + 2, b + 1, b + 3, b + 2] {
            buffers.push_index(index);
        }
    }
    segments * 2
}

/// 条带截面数为 `points` 时的顶点与索引数
pub(crate) fn strip_sizes(points: usize) -> (usize, usize) {
    if points < 2 {
        (0, 0)
    } else {
        (points * 2, (points - 1) * 6)
    }
}

/// 子图像 `index` 在图集中的 UV 偏移与缩放
pub(crate) fn sub_image_rect(index: u32, horizontal: u32, vertical: u32) -> (Vec2, Vec2) {
    let (h, v) = (horizontal.max(1), vertical.max(1));
    let index = index % (h * v);
    let scale = Vec2::new(1.0 / h as f32, 1.0 / v as f32);
    let offset = Vec2::new((index % h) as f32, (index / h) as f32) * scale;
    (offset, scale)
}

// ============================================================================
// 渲染器接口
// ============================================================================

/// 一种发射器类型的缓冲填充
pub trait EmitterRenderer: Send + Sync + fmt::Debug {
    fn emitter_type(&self) -> EmitterType;

    /// 每个顶点（或实例）的字节数
    fn vertex_stride(&self) -> usize;

    fn vertex_count(&self, input: &FillInput<'_>) -> usize;

    fn index_alloc_info(&self, input: &FillInput<'_>) -> IndexAllocInfo;

    /// 写入顶点与索引，返回图元数
    fn fill_buffers(&self, input: &FillInput<'_>, buffers: &mut FillBuffers) -> RenderResult<usize>;

    /// 是否按排序结果绘制
    fn uses_sorting(&self) -> bool {
        true
    }

    fn instanced(&self) -> bool {
        false
    }
}

static SPRITE: SpriteRenderer = SpriteRenderer;
static MESH: MeshRenderer = MeshRenderer;
static BEAM: BeamRenderer = BeamRenderer;
static RIBBON: RibbonRenderer = RibbonRenderer;
static ANIM_TRAIL: AnimTrailRenderer = AnimTrailRenderer;

/// 发射器类型对应的渲染器
pub fn renderer_for(emitter_type: EmitterType) -> &'static dyn EmitterRenderer {
    match emitter_type {
        EmitterType::Sprite => &SPRITE,
        EmitterType::Mesh => &MESH,
        EmitterType::Beam => &BEAM,
        EmitterType::Ribbon => &RIBBON,
        EmitterType::AnimTrail => &ANIM_TRAIL,
    }
}

/// 按渲染器声明的大小分配缓冲区并填充
///
/// 实际写入的字节数与声明不符时返回错误，绘制会被跳过。
pub fn fill_emitter(renderer: &dyn EmitterRenderer, input: &FillInput<'_>) -> RenderResult<FillOutput> {
    let replay = input.replay();
    let vertex_stride = renderer.vertex_stride();
    let vertex_count = renderer.vertex_count(input);
    let index_info = renderer.index_alloc_info(input);

    let mut buffers = FillBuffers::new(vertex_count * vertex_stride, index_info, replay);
    let primitive_count = renderer.fill_buffers(input, &mut buffers)?;

    let expected = vertex_count * vertex_stride;
    if buffers.vertex_data.len() != expected {
        return Err(RenderError::BufferSizeMismatch {
            expected,
            actual: buffers.vertex_data.len(),
        });
    }
    if buffers.index_data.len() != index_info.bytes() {
        return Err(RenderError::BufferSizeMismatch {
            expected: index_info.bytes(),
            actual: buffers.index_data.len(),
        });
    }

    tracing::trace!(
        target: "render::fill",
        emitter = input.snapshot.emitter_index,
        emitter_type = ?renderer.emitter_type(),
        vertices = vertex_count,
        indices = index_info.count,
        "Buffers filled"
    );

    Ok(FillOutput {
        vertex_data: buffers.vertex_data,
        index_data: buffers.index_data,
        dynamic_parameter_data: buffers.dynamic_parameter_data.unwrap_or_default(),
        vertex_stride,
        index_stride: index_info.stride,
        vertex_count: buffers.vertex_count,
        index_count: buffers.index_count,
        primitive_count,
        instanced: renderer.instanced(),
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::particles::payload::DynamicParameterPayload;
    use crate::particles::record::ParticleRecord;
    use crate::particles::template::EmitterTypeSettings;

    #[test]
    fn test_index_stride_by_vertex_count() {
        assert_eq!(IndexAllocInfo::for_vertices(6, 4).stride, 2);
        assert_eq!(IndexAllocInfo::for_vertices(6, 65_536).stride, 2);
        assert_eq!(IndexAllocInfo::for_vertices(6, 65_537).stride, 4);
        assert_eq!(IndexAllocInfo::for_vertices(6, 65_537).bytes(), 24);
    }

    #[test]
    fn test_sub_image_rect() {
        let (offset, scale) = sub_image_rect(5, 4, 2);
        assert_eq!(scale, Vec2::new(0.25, 0.5));
        assert_eq!(offset, Vec2::new(0.25, 0.5));
        let (offset, _) = sub_image_rect(8, 4, 2);
        assert_eq!(offset, Vec2::ZERO);
    }

    #[test]
    fn test_dynamic_parameter_stream_follows_vertices() {
        let records = [ParticleRecord::spawned_at(Vec3::ZERO)];
        let mut snapshot = snapshot_with(
            EmitterType::Sprite,
            EmitterTypeSettings::Sprite,
            16,
            &records,
            |_, slot| {
                write_at(slot, 128, &DynamicParameterPayload { value: [0.5, 1.0, 2.0, 4.0] });
            },
        );
        snapshot.replay.offsets.dynamic_parameter = Some(128);
        let view = front_view();
        let input = FillInput {
            snapshot: &snapshot,
            view: &view,
            local_to_world: Mat4::IDENTITY,
            order: None,
        };
        let output = fill_emitter(renderer_for(EmitterType::Sprite), &input).unwrap();
        let params: Vec<DynamicParameterVertex> = output
            .dynamic_parameter_data
            .chunks_exact(16)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        assert_eq!(params.len(), output.vertex_count);
        assert!(params.iter().all(|p| p.value == [0.5, 1.0, 2.0, 4.0]));
    }
}
