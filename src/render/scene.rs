//! 渲染场景与跨线程命令队列
//!
//! 模拟线程通过 [`RenderCommandSender`] 发送命令，从不阻塞；
//! 渲染线程在每帧开始时 [`RenderScene::begin_frame`] 按发送顺序应用全部命令，
//! 所以一帧内看到的要么是完整的旧快照，要么是完整的新快照。

use crate::config::RenderConfig;
use crate::core::error::{RenderError, RenderResult};
use crate::particles::snapshot::{ComponentId, FrameSnapshotBundle};
use crate::particles::stats::ParticleStats;
use crate::render::pools::{SortScratchPool, VertexFactoryPool};
use crate::render::proxy::{DrawCall, SceneProxy};
use crate::render::tasks::FillWorkerPool;
use crate::render::view::SceneView;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// 模拟线程 → 渲染线程命令
#[derive(Debug)]
pub enum RenderCommand {
    /// 新一帧快照；代理不存在时创建
    UpdateProxy(Box<FrameSnapshotBundle>),
    RemoveProxy(ComponentId),
}

/// 命令发送端，可克隆给多个模拟侧组件
#[derive(Debug, Clone)]
pub struct RenderCommandSender {
    sender: Sender<RenderCommand>,
}

impl RenderCommandSender {
    pub fn send(&self, command: RenderCommand) -> RenderResult<()> {
        self.sender.send(command).map_err(|_| RenderError::QueueClosed)
    }

    pub fn update_proxy(&self, bundle: FrameSnapshotBundle) -> RenderResult<()> {
        self.send(RenderCommand::UpdateProxy(Box::new(bundle)))
    }

    pub fn remove_proxy(&self, id: ComponentId) -> RenderResult<()> {
        self.send(RenderCommand::RemoveProxy(id))
    }
}

/// 创建无界命令通道
pub fn render_channel() -> (RenderCommandSender, Receiver<RenderCommand>) {
    let (sender, receiver) = unbounded();
    (RenderCommandSender { sender }, receiver)
}

/// 渲染侧共享服务：工作线程、顶点工厂池、排序临时缓冲池
///
/// 与 [`RenderScene`] 同生命周期，析构时工作线程退出。
#[derive(Debug)]
pub struct RenderResources {
    pub workers: FillWorkerPool,
    pub factories: Arc<VertexFactoryPool>,
    pub scratch: Arc<SortScratchPool>,
    pub config: RenderConfig,
    pub stats: Arc<ParticleStats>,
}

impl RenderResources {
    pub fn new(config: &RenderConfig, stats: Arc<ParticleStats>) -> RenderResult<Self> {
        let workers = FillWorkerPool::new(config.resolved_worker_threads(), Arc::clone(&stats))?;
        Ok(Self {
            workers,
            factories: Arc::new(VertexFactoryPool::new()),
            scratch: Arc::new(SortScratchPool::new(config.scratch_initial_capacity)),
            config: config.clone(),
            stats,
        })
    }
}

/// 一次 `begin_frame` 的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameUpdate {
    pub applied: usize,
    pub removed: usize,
    /// 所有发送端都已关闭
    pub disconnected: bool,
}

/// 渲染线程拥有的场景
#[derive(Debug)]
pub struct RenderScene {
    receiver: Receiver<RenderCommand>,
    proxies: BTreeMap<ComponentId, SceneProxy>,
    resources: RenderResources,
}

impl RenderScene {
    pub fn new(receiver: Receiver<RenderCommand>, resources: RenderResources) -> Self {
        Self {
            receiver,
            proxies: BTreeMap::new(),
            resources,
        }
    }

    pub fn resources(&self) -> &RenderResources {
        &self.resources
    }

    pub fn proxy(&self, id: ComponentId) -> RenderResult<&SceneProxy> {
        self.proxies.get(&id).ok_or(RenderError::ProxyNotFound(id.0))
    }

    pub fn proxies(&self) -> impl Iterator<Item = &SceneProxy> {
        self.proxies.values()
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    fn apply(&mut self, command: RenderCommand, update: &mut FrameUpdate) {
        match command {
            RenderCommand::UpdateProxy(bundle) => {
                let id = bundle.system_id;
                self.proxies
                    .entry(id)
                    .or_insert_with(|| {
                        tracing::debug!(target: "render::scene", id = id.0, "Proxy created");
                        SceneProxy::new(id)
                    })
                    .update_data(*bundle);
                self.resources.stats.bundles_applied.increment();
                update.applied += 1;
            }
            RenderCommand::RemoveProxy(id) => {
                if self.proxies.remove(&id).is_some() {
                    tracing::debug!(target: "render::scene", id = id.0, "Proxy removed");
                    update.removed += 1;
                } else {
                    tracing::warn!(
                        target: "render::scene",
                        error = %RenderError::ProxyNotFound(id.0),
                        "Remove ignored"
                    );
                }
            }
        }
    }

    /// 按发送顺序应用所有排队命令
    pub fn begin_frame(&mut self) -> FrameUpdate {
        let mut update = FrameUpdate::default();
        loop {
            match self.receiver.try_recv() {
                Ok(command) => self.apply(command, &mut update),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    update.disconnected = true;
                    break;
                }
            }
        }
        update
    }

    /// 阻塞等待至少一条命令后再应用全部排队命令
    pub fn wait_frame(&mut self) -> FrameUpdate {
        match self.receiver.recv() {
            Ok(command) => {
                let mut first = FrameUpdate::default();
                self.apply(command, &mut first);
                let rest = self.begin_frame();
                FrameUpdate {
                    applied: first.applied + rest.applied,
                    removed: first.removed + rest.removed,
                    disconnected: rest.disconnected,
                }
            }
            Err(_) => FrameUpdate {
                disconnected: true,
                ..FrameUpdate::default()
            },
        }
    }

    /// 为所有视图填充并收集绘制调用
    ///
    /// 先为全部代理调度任务，再逐视图等待，让工作线程尽早开始。
    pub fn render_views(&mut self, views: &[SceneView]) -> Vec<DrawCall> {
        for proxy in self.proxies.values_mut() {
            proxy.pre_render_views(views, &self.resources);
        }
        let mut draws = Vec::new();
        for view in views {
            for proxy in self.proxies.values() {
                draws.extend(proxy.draw_view(view.index, &self.resources));
            }
        }
        tracing::trace!(
            target: "render::scene",
            views = views.len(),
            draws = draws.len(),
            "Views rendered"
        );
        draws
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::bounds::Aabb;
    use crate::particles::template::MacroUv;
    use glam::Mat4;

    fn empty_bundle(id: u64, frame: u64) -> FrameSnapshotBundle {
        FrameSnapshotBundle {
            system_id: ComponentId(id),
            frame,
            local_to_world: Mat4::IDENTITY,
            macro_uv: MacroUv::default(),
            bounds: Aabb::EMPTY,
            emitters: Vec::new(),
        }
    }

    fn scene() -> (RenderCommandSender, RenderScene) {
        let (sender, receiver) = render_channel();
        let config = RenderConfig {
            parallel_fill: false,
            ..RenderConfig::default()
        };
        let resources = RenderResources::new(&config, Arc::new(ParticleStats::default())).unwrap();
        (sender, RenderScene::new(receiver, resources))
    }

    #[test]
    fn test_commands_applied_in_order() {
        let (sender, mut scene) = scene();
        for frame in 1..=3 {
            sender.update_proxy(empty_bundle(1, frame)).unwrap();
        }
        sender.update_proxy(empty_bundle(2, 1)).unwrap();
        sender.remove_proxy(ComponentId(2)).unwrap();

        let update = scene.begin_frame();
        assert_eq!(update.applied, 4);
        assert_eq!(update.removed, 1);
        assert!(!update.disconnected);
        assert_eq!(scene.proxy_count(), 1);

        let proxy = scene.proxy(ComponentId(1)).unwrap();
        assert_eq!(proxy.frame(), Some(3));
        assert_eq!(proxy.previous().map(|b| b.frame), Some(2));
        assert_eq!(
            scene.proxy(ComponentId(2)).unwrap_err(),
            RenderError::ProxyNotFound(2)
        );
    }

    #[test]
    fn test_disconnect_reported() {
        let (sender, mut scene) = scene();
        sender.update_proxy(empty_bundle(1, 1)).unwrap();
        drop(sender);
        let update = scene.begin_frame();
        assert_eq!(update.applied, 1);
        assert!(update.disconnected);
    }

    #[test]
    fn test_send_after_scene_dropped() {
        let (sender, scene) = scene();
        drop(scene);
        assert_eq!(
            sender.update_proxy(empty_bundle(1, 1)).unwrap_err(),
            RenderError::QueueClosed
        );
    }
}
