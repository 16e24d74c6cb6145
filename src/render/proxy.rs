//! 场景代理
//!
//! 渲染线程上代表一个粒子系统组件的对象。持有最近两帧的快照
//! （`current` / `previous`），为每个视图调度填充任务，
//! 并在绘制前等待任务完成。

use crate::core::error::RenderResult;
use crate::particles::payload::LightPayload;
use crate::particles::snapshot::{ComponentId, EmitterSnapshot, FrameSnapshotBundle};
use crate::particles::template::{EmitterType, MaterialHandle, SortMode};
use crate::render::debug::{emitter_debug_geometry, DebugMode, DebugPrimitive};
use crate::render::fill::{fill_emitter, EmitterRenderer, FillInput, FillOutput};
use crate::render::pools::{PooledVertexFactory, SortScratchPool};
use crate::render::scene::RenderResources;
use crate::render::sort::sort_particles;
use crate::render::tasks::FillTask;
use crate::render::view::SceneView;
use glam::{Mat4, Vec3};
use std::collections::HashMap;
use std::sync::Arc;

/// 一次绘制提交
#[derive(Debug, Clone)]
pub struct DrawCall {
    pub system_id: ComponentId,
    pub emitter_index: usize,
    pub view_index: usize,
    pub emitter_type: EmitterType,
    pub material: MaterialHandle,
    /// 使用的顶点工厂
    pub factory_id: u64,
    pub output: Arc<FillOutput>,
}

/// 由粒子产生的简单点光源
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleLight {
    pub position: Vec3,
    pub color: Vec3,
    pub radius: f32,
    pub exponent: f32,
}

/// 单个发射器的填充：按需排序后生成缓冲区
fn fill_job(
    snapshot: &EmitterSnapshot,
    view: &SceneView,
    local_to_world: Mat4,
    renderer: &dyn EmitterRenderer,
    scratch: &Arc<SortScratchPool>,
) -> RenderResult<FillOutput> {
    let replay = &snapshot.replay;
    if renderer.uses_sorting() && replay.sort_mode != SortMode::None {
        let mut order = scratch.get_scratch(replay.active_count);
        sort_particles(replay.sort_mode, replay, view, &local_to_world, &mut order);
        let input = FillInput {
            snapshot,
            view,
            local_to_world,
            order: Some(&order[..]),
        };
        return fill_emitter(renderer, &input);
    }
    let input = FillInput {
        snapshot,
        view,
        local_to_world,
        order: None,
    };
    fill_emitter(renderer, &input)
}

/// 粒子系统在渲染线程上的代理
#[derive(Debug)]
pub struct SceneProxy {
    id: ComponentId,
    current: Option<Arc<FrameSnapshotBundle>>,
    previous: Option<Arc<FrameSnapshotBundle>>,
    /// 按发射器序号持有的顶点工厂，一个工厂只属于一个发射器
    factories: HashMap<usize, PooledVertexFactory>,
    /// 本帧各视图的填充任务
    pending: Vec<Arc<FillTask>>,
}

impl SceneProxy {
    pub fn new(id: ComponentId) -> Self {
        Self {
            id,
            current: None,
            previous: None,
            factories: HashMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn current(&self) -> Option<&Arc<FrameSnapshotBundle>> {
        self.current.as_ref()
    }

    /// 上一帧快照，供需要一帧滞后的效果使用
    pub fn previous(&self) -> Option<&Arc<FrameSnapshotBundle>> {
        self.previous.as_ref()
    }

    pub fn frame(&self) -> Option<u64> {
        self.current.as_ref().map(|bundle| bundle.frame)
    }

    pub fn factory_count(&self) -> usize {
        self.factories.len()
    }

    /// 应用新一帧快照：current 变为 previous
    pub fn update_data(&mut self, bundle: FrameSnapshotBundle) {
        if let Some(current) = &self.current {
            if bundle.frame <= current.frame {
                tracing::warn!(
                    target: "render::proxy",
                    id = self.id.0,
                    current = current.frame,
                    incoming = bundle.frame,
                    "Bundle frame did not advance"
                );
            }
        }
        // 上一帧的任务可能仍在运行；结果不再绘制
        self.pending.clear();
        self.previous = self.current.take();
        self.current = Some(Arc::new(bundle));
    }

    /// 让工厂集合与当前快照的发射器一致；类型变化或消失的发射器归还工厂
    fn sync_factories(&mut self, bundle: &FrameSnapshotBundle, resources: &RenderResources) {
        self.factories.retain(|index, factory| {
            bundle
                .emitters
                .iter()
                .any(|e| e.emitter_index == *index && e.emitter_type() == factory.emitter_type())
        });
        for snapshot in &bundle.emitters {
            self.factories
                .entry(snapshot.emitter_index)
                .or_insert_with(|| resources.factories.acquire(snapshot.emitter_type()));
        }
    }

    /// 为每个视图、每个发射器创建填充任务
    ///
    /// 开启并行填充且粒子数达到阈值时任务交给工作线程，
    /// 否则留到 [`draw_view`](Self::draw_view) 中同步执行。
    pub fn pre_render_views(&mut self, views: &[SceneView], resources: &RenderResources) {
        self.pending.clear();
        let Some(bundle) = self.current.clone() else {
            return;
        };
        self.sync_factories(&bundle, resources);

        let config = &resources.config;
        for view in views {
            for snapshot in &bundle.emitters {
                let count = snapshot.replay.draw_count();
                if count == 0 {
                    continue;
                }
                let Some(factory) = self.factories.get(&snapshot.emitter_index) else {
                    continue;
                };
                let renderer = factory.renderer();
                let snapshot = Arc::clone(snapshot);
                let view_data = *view;
                let local_to_world = bundle.local_to_world;
                let scratch = Arc::clone(&resources.scratch);
                let task = FillTask::new(snapshot.emitter_index, view.index, move || {
                    fill_job(&snapshot, &view_data, local_to_world, renderer, &scratch)
                });
                if config.parallel_fill && count >= config.min_particles_for_async_fill {
                    resources.workers.schedule(&task);
                }
                self.pending.push(task);
            }
        }
    }

    /// 等待视图 `view_index` 的填充完成并生成绘制调用
    ///
    /// 填充失败的发射器本帧跳过，不影响其他发射器和视图。
    pub fn draw_view(&self, view_index: usize, resources: &RenderResources) -> Vec<DrawCall> {
        let Some(bundle) = &self.current else {
            return Vec::new();
        };
        let stats = &resources.stats;
        let mut draws = Vec::new();

        for task in self.pending.iter().filter(|t| t.view_index() == view_index) {
            let emitter_index = task.emitter_index();
            match task.ensure_complete(stats) {
                Ok(output) if output.vertex_count > 0 => {
                    let Some(snapshot) = bundle.emitters.iter().find(|e| e.emitter_index == emitter_index) else {
                        stats.draws_skipped.increment();
                        continue;
                    };
                    let factory_id = self.factories.get(&emitter_index).map_or(0, |f| f.id());
                    draws.push(DrawCall {
                        system_id: self.id,
                        emitter_index,
                        view_index,
                        emitter_type: snapshot.emitter_type(),
                        material: snapshot.replay.material,
                        factory_id,
                        output,
                    });
                    stats.draws_submitted.increment();
                }
                Ok(_) => stats.draws_skipped.increment(),
                Err(err) => {
                    stats.fill_failures.increment();
                    stats.draws_skipped.increment();
                    tracing::warn!(
                        target: "render::proxy",
                        id = self.id.0,
                        emitter = emitter_index,
                        view = view_index,
                        error = %err,
                        "Skipping emitter draw"
                    );
                }
            }
        }
        draws
    }

    /// 调试几何
    pub fn render_debug_geometry(&self, view: &SceneView, mode: DebugMode) -> Vec<DebugPrimitive> {
        let mut out = Vec::new();
        if let Some(bundle) = &self.current {
            for snapshot in &bundle.emitters {
                emitter_debug_geometry(snapshot, &bundle.local_to_world, view, mode, &mut out);
            }
        }
        out
    }

    /// 收集带光源载荷的粒子
    pub fn gather_simple_lights(&self) -> Vec<SimpleLight> {
        let Some(bundle) = &self.current else {
            return Vec::new();
        };
        let mut lights = Vec::new();
        for snapshot in &bundle.emitters {
            let replay = &snapshot.replay;
            let Some(offset) = replay.offsets.light else {
                continue;
            };
            for index in 0..replay.draw_count() {
                let (Some(record), Some(light)) = (
                    replay.record(index),
                    replay.payload::<LightPayload>(index, Some(offset)),
                ) else {
                    continue;
                };
                if light.valid == 0 {
                    continue;
                }
                let position = if replay.use_local_space {
                    bundle.local_to_world.transform_point3(record.position)
                } else {
                    record.position
                };
                let color = record.color.to_vec4().truncate();
                lights.push(SimpleLight {
                    position,
                    color: color * light.color_scale,
                    radius: record.size.x * replay.scale.x * light.radius_scale,
                    exponent: light.exponent,
                });
            }
        }
        lights
    }
}
