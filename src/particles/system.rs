//! 粒子系统组件
//!
//! 一个组件拥有一组发射器实例，负责激活/停用、变换、LOD 选择，
//! 并在每帧结束时把所有发射器的快照打包提交给渲染线程。

use crate::config::SimulationConfig;
use crate::core::error::{EngineResult, RenderResult, TemplateResult};
use crate::particles::bounds::Aabb;
use crate::particles::emitter::{EmitterInstance, TickReport};
use crate::particles::snapshot::{ComponentId, FrameSnapshotBundle};
use crate::particles::stats::ParticleStats;
use crate::particles::template::{EmitterTemplate, MacroUv};
use crate::render::scene::RenderCommandSender;
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);

/// 预热步长下限
const MIN_WARMUP_STEP: f32 = 1.0e-3;

/// LOD 选择方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LodMethod {
    /// 按检查间隔根据视点距离自动选择
    #[default]
    Automatic,
    /// 只通过 `set_lod_level` 设置
    DirectSet,
    /// 激活后第一次 tick 自动选择一次
    ActivateAutomatic,
}

/// 粒子系统模板
#[derive(Debug, Clone)]
pub struct ParticleSystemTemplate {
    pub name: String,
    pub emitters: Vec<Arc<EmitterTemplate>>,
    pub lod_method: LodMethod,
    /// 激活时预先模拟的时长（秒）
    pub warmup_time: f32,
    pub macro_uv: MacroUv,
    /// 设置后组件包围盒固定为该值（组件局部空间）
    pub fixed_bounds: Option<Aabb>,
}

impl ParticleSystemTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            emitters: Vec::new(),
            lod_method: LodMethod::default(),
            warmup_time: 0.0,
            macro_uv: MacroUv::default(),
            fixed_bounds: None,
        }
    }

    pub fn with_emitter(mut self, emitter: EmitterTemplate) -> Self {
        self.emitters.push(Arc::new(emitter));
        self
    }

    pub fn with_lod_method(mut self, method: LodMethod) -> Self {
        self.lod_method = method;
        self
    }

    pub fn with_warmup(mut self, seconds: f32) -> Self {
        self.warmup_time = seconds;
        self
    }

    pub fn with_macro_uv(mut self, macro_uv: MacroUv) -> Self {
        self.macro_uv = macro_uv;
        self
    }

    pub fn with_fixed_bounds(mut self, bounds: Aabb) -> Self {
        self.fixed_bounds = Some(bounds);
        self
    }

    /// 各 LOD 的距离阈值，取自第一个发射器
    pub fn lod_distances(&self) -> Vec<f32> {
        self.emitters
            .first()
            .map(|e| e.lods.iter().map(|lod| lod.distance).collect())
            .unwrap_or_default()
    }

    /// 距离 `distance` 时应使用的 LOD
    pub fn lod_for_distance(&self, distance: f32) -> usize {
        self.lod_distances()
            .iter()
            .rposition(|&threshold| distance >= threshold)
            .unwrap_or(0)
    }
}

/// 组件一次 tick 的汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemTickReport {
    pub spawned: usize,
    pub killed: usize,
    pub dropped: usize,
    /// 因扩容失败跳过本帧的发射器数
    pub skipped_emitters: usize,
}

impl SystemTickReport {
    fn accumulate(&mut self, report: TickReport) {
        self.spawned += report.spawned;
        self.killed += report.killed;
        self.dropped += report.dropped;
        if report.skipped {
            self.skipped_emitters += 1;
        }
    }
}

/// 粒子系统组件（模拟线程侧）
#[derive(Debug)]
pub struct ParticleSystemComponent {
    id: ComponentId,
    template: Arc<ParticleSystemTemplate>,
    emitters: Vec<EmitterInstance>,
    config: SimulationConfig,
    stats: Arc<ParticleStats>,
    local_to_world: Mat4,
    active: bool,
    lod_level: usize,
    lod_timer: f32,
    lod_pending: bool,
    frame: u64,
}

impl ParticleSystemComponent {
    /// 为模板中的每个发射器创建实例
    ///
    /// 任何发射器配置错误都会让整个组件创建失败。
    pub fn new(
        template: Arc<ParticleSystemTemplate>,
        config: &SimulationConfig,
        stats: Arc<ParticleStats>,
    ) -> EngineResult<Self> {
        let emitters = template
            .emitters
            .iter()
            .enumerate()
            .map(|(index, emitter)| {
                EmitterInstance::new(Arc::clone(emitter), index, config, Arc::clone(&stats))
                    .inspect_err(|err| {
                        tracing::error!(
                            target: "particle::system",
                            system = %template.name,
                            emitter = %emitter.name,
                            error = %err,
                            "Emitter initialization failed"
                        );
                    })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let id = ComponentId(NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed));
        tracing::info!(
            target: "particle::system",
            system = %template.name,
            id = id.0,
            emitters = emitters.len(),
            "Particle system created"
        );

        Ok(Self {
            id,
            template,
            emitters,
            config: config.clone(),
            stats,
            local_to_world: Mat4::IDENTITY,
            active: false,
            lod_level: 0,
            lod_timer: 0.0,
            lod_pending: false,
            frame: 0,
        })
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.template.name
    }

    pub fn template(&self) -> &Arc<ParticleSystemTemplate> {
        &self.template
    }

    pub fn emitters(&self) -> &[EmitterInstance] {
        &self.emitters
    }

    pub fn emitter(&self, index: usize) -> Option<&EmitterInstance> {
        self.emitters.get(index)
    }

    pub fn emitter_mut(&mut self, index: usize) -> Option<&mut EmitterInstance> {
        self.emitters.get_mut(index)
    }

    pub fn stats(&self) -> &Arc<ParticleStats> {
        &self.stats
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn lod_level(&self) -> usize {
        self.lod_level
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn local_to_world(&self) -> Mat4 {
        self.local_to_world
    }

    pub fn active_particles(&self) -> usize {
        self.emitters.iter().map(|e| e.active_particles()).sum()
    }

    // ========================================================================
    // 生命周期
    // ========================================================================

    /// 激活组件
    ///
    /// `reset` 为真时先清空所有粒子并回到循环起点；
    /// 模板设置了预热时长时，以固定步长预先模拟。
    pub fn activate(&mut self, reset: bool) {
        for emitter in &mut self.emitters {
            if reset {
                emitter.kill_all();
                emitter.rewind();
            }
            emitter.set_halt_spawning(false);
        }
        self.active = true;
        self.lod_pending = self.template.lod_method == LodMethod::ActivateAutomatic;

        let warmup = self.template.warmup_time;
        if warmup > 0.0 {
            let step = self.config.warmup_step.max(MIN_WARMUP_STEP);
            let mut remaining = warmup;
            let mut ticks = 0u32;
            while remaining > 0.0 {
                let dt = remaining.min(step);
                for emitter in &mut self.emitters {
                    emitter.tick(dt, false);
                }
                remaining -= dt;
                ticks += 1;
            }
            tracing::debug!(
                target: "particle::system",
                system = %self.template.name,
                warmup,
                ticks,
                "Warmup finished"
            );
        }
    }

    /// 停用组件：停止生成，已有粒子按各发射器设置自然消亡或立即移除
    pub fn deactivate(&mut self) {
        for emitter in &mut self.emitters {
            emitter.deactivate();
        }
        self.active = false;
    }

    pub fn set_transform(&mut self, local_to_world: Mat4) {
        self.local_to_world = local_to_world;
        for emitter in &mut self.emitters {
            emitter.set_transform(local_to_world);
        }
    }

    pub fn location(&self) -> Vec3 {
        self.local_to_world.w_axis.truncate()
    }

    /// 推进所有发射器
    ///
    /// 步长被截断到 `max_delta_time`；`view_positions` 用于自动 LOD。
    pub fn tick(&mut self, delta_time: f32, view_positions: &[Vec3]) -> SystemTickReport {
        let dt = delta_time.clamp(0.0, self.config.max_delta_time);
        if dt < delta_time {
            tracing::trace!(
                target: "particle::system",
                requested = delta_time,
                clamped = dt,
                "Delta time clamped"
            );
        }

        self.update_lod(dt, view_positions);

        // 未激活时只让已有粒子走完生命周期
        let mut report = SystemTickReport::default();
        for emitter in &mut self.emitters {
            if emitter.has_completed() || (!self.active && emitter.active_particles() == 0) {
                continue;
            }
            report.accumulate(emitter.tick(dt, !self.active));
            if emitter.kill_on_completed() && emitter.loops_exhausted() {
                emitter.kill_all();
                emitter.set_halt_spawning(true);
                tracing::debug!(
                    target: "particle::system",
                    system = %self.template.name,
                    emitter = emitter.name(),
                    "Emitter completed, remaining particles killed"
                );
            }
        }
        report
    }

    fn update_lod(&mut self, dt: f32, view_positions: &[Vec3]) {
        let due = match self.template.lod_method {
            LodMethod::DirectSet => false,
            LodMethod::ActivateAutomatic => std::mem::take(&mut self.lod_pending),
            LodMethod::Automatic => {
                self.lod_timer += dt;
                if self.lod_timer >= self.config.lod_check_interval {
                    self.lod_timer = 0.0;
                    true
                } else {
                    false
                }
            }
        };
        if !due || view_positions.is_empty() {
            return;
        }

        let location = self.location();
        let nearest = view_positions
            .iter()
            .map(|view| view.distance(location))
            .fold(f32::INFINITY, f32::min);
        let level = self.template.lod_for_distance(nearest);
        if level != self.lod_level {
            self.apply_lod(level);
        }
    }

    /// 直接设置 LOD；超出某个发射器层级数时该发射器使用最后一级
    pub fn set_lod_level(&mut self, level: usize) -> TemplateResult<()> {
        let max_levels = self
            .emitters
            .iter()
            .map(|e| e.lod_count())
            .max()
            .unwrap_or(0);
        if level >= max_levels {
            return Err(crate::core::error::TemplateError::InvalidLodIndex {
                index: level,
                count: max_levels,
            });
        }
        self.apply_lod(level);
        Ok(())
    }

    fn apply_lod(&mut self, level: usize) {
        for emitter in &mut self.emitters {
            let index = level.min(emitter.lod_count().saturating_sub(1));
            if let Err(err) = emitter.set_current_lod_index(index, true) {
                tracing::warn!(
                    target: "particle::system",
                    emitter = emitter.name(),
                    error = %err,
                    "LOD switch rejected"
                );
            }
        }
        tracing::debug!(
            target: "particle::system",
            system = %self.template.name,
            from = self.lod_level,
            to = level,
            "System LOD changed"
        );
        self.lod_level = level;
    }

    /// 所有发射器都已完成
    pub fn has_completed(&self) -> bool {
        self.emitters.iter().all(|e| e.has_completed())
    }

    // ========================================================================
    // 快照提交
    // ========================================================================

    /// 打包本帧所有发射器的快照；帧号在组件内单调递增
    pub fn build_bundle(&mut self) -> FrameSnapshotBundle {
        self.frame += 1;

        let mut bounds = Aabb::EMPTY;
        let emitters: Vec<_> = self
            .emitters
            .iter()
            .filter_map(|emitter| emitter.build_snapshot())
            .map(|snapshot| {
                let world = if snapshot.replay.use_local_space {
                    snapshot.bounds.transformed(&self.local_to_world)
                } else {
                    snapshot.bounds
                };
                bounds = bounds.merge(&world);
                Arc::new(snapshot)
            })
            .collect();

        if let Some(fixed) = self.template.fixed_bounds {
            bounds = fixed.transformed(&self.local_to_world);
        }

        FrameSnapshotBundle {
            system_id: self.id,
            frame: self.frame,
            local_to_world: self.local_to_world,
            macro_uv: self.template.macro_uv,
            bounds,
            emitters,
        }
    }

    /// 构建并发送本帧快照；不等待渲染线程
    pub fn submit(&mut self, sender: &RenderCommandSender) -> RenderResult<()> {
        let bundle = self.build_bundle();
        let particles = bundle.particle_count();
        let frame = bundle.frame;
        sender.update_proxy(bundle)?;
        self.stats.bundles_submitted.increment();
        tracing::trace!(
            target: "particle::system",
            id = self.id.0,
            frame,
            particles,
            "Bundle submitted"
        );
        Ok(())
    }

    /// 通知渲染线程移除本组件的代理
    pub fn remove_from_scene(&self, sender: &RenderCommandSender) -> RenderResult<()> {
        sender.remove_proxy(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::modules::{LifetimeModule, VelocityModule};
    use crate::particles::template::{LodLevel, RequiredModule, SpawnModule};

    fn emitter(name: &str, rate: f32) -> EmitterTemplate {
        let lod = |distance: f32, rate: f32| {
            LodLevel::new(distance)
                .with_required(RequiredModule::default())
                .with_spawn(SpawnModule::with_rate(rate))
                .with_module(LifetimeModule::new(1.0))
                .with_module(VelocityModule::new(Vec3::Y))
        };
        EmitterTemplate::new(name)
            .with_seed(3)
            .with_lod(lod(0.0, rate))
            .with_lod(lod(100.0, rate * 0.5))
    }

    fn component(template: ParticleSystemTemplate) -> ParticleSystemComponent {
        ParticleSystemComponent::new(
            Arc::new(template),
            &SimulationConfig::default(),
            Arc::new(ParticleStats::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_ids_are_unique() {
        let template = ParticleSystemTemplate::new("ids").with_emitter(emitter("a", 10.0));
        let a = component(template.clone());
        let b = component(template);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_invalid_emitter_fails_creation() {
        let template =
            ParticleSystemTemplate::new("bad").with_emitter(EmitterTemplate::new("empty"));
        let result = ParticleSystemComponent::new(
            Arc::new(template),
            &SimulationConfig::default(),
            Arc::new(ParticleStats::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_delta_time_is_clamped() {
        let template = ParticleSystemTemplate::new("clamp").with_emitter(emitter("a", 100.0));
        let mut system = component(template);
        system.activate(false);
        // 最大步长 0.1：100/s 只生成 10 个
        let report = system.tick(5.0, &[]);
        assert_eq!(report.spawned, 10);
    }

    #[test]
    fn test_warmup_prefills_particles() {
        let template = ParticleSystemTemplate::new("warm")
            .with_emitter(emitter("a", 30.0))
            .with_warmup(0.5);
        let mut system = component(template);
        system.activate(true);
        assert!(system.active_particles() >= 14);
    }

    #[test]
    fn test_automatic_lod_from_view_distance() {
        let template = ParticleSystemTemplate::new("lod").with_emitter(emitter("a", 10.0));
        let mut system = component(template);
        system.activate(false);
        system.tick(0.1, &[Vec3::new(0.0, 0.0, 500.0)]);
        system.tick(0.1, &[Vec3::new(0.0, 0.0, 500.0)]);
        system.tick(0.1, &[Vec3::new(0.0, 0.0, 500.0)]);
        assert_eq!(system.lod_level(), 1);
        assert_eq!(system.emitter(0).unwrap().current_lod(), 1);

        for _ in 0..3 {
            system.tick(0.1, &[Vec3::new(0.0, 0.0, 10.0)]);
        }
        assert_eq!(system.lod_level(), 0);
    }

    #[test]
    fn test_direct_set_lod() {
        let template = ParticleSystemTemplate::new("direct")
            .with_emitter(emitter("a", 10.0))
            .with_lod_method(LodMethod::DirectSet);
        let mut system = component(template);
        system.activate(false);
        for _ in 0..5 {
            system.tick(0.1, &[Vec3::splat(1000.0)]);
        }
        assert_eq!(system.lod_level(), 0);
        assert!(system.active_particles() > 0);
        system.set_lod_level(1).unwrap();
        assert_eq!(system.emitter(0).unwrap().current_lod(), 1);
        assert!(system.set_lod_level(2).is_err());
    }

    #[test]
    fn test_bundle_frames_increase() {
        let template = ParticleSystemTemplate::new("bundle")
            .with_emitter(emitter("a", 20.0))
            .with_emitter(emitter("b", 0.0));
        let mut system = component(template);
        system.set_transform(Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0)));
        system.activate(false);
        system.tick(0.1, &[]);

        let first = system.build_bundle();
        let second = system.build_bundle();
        assert_eq!(first.frame + 1, second.frame);
        assert_eq!(first.system_id, system.id());
        // 没有粒子的发射器不产生快照
        assert_eq!(first.emitters.len(), 1);
        assert_eq!(first.particle_count(), 2);
        assert!(!first.bounds.is_empty());
    }

    #[test]
    fn test_deactivate_then_complete() {
        let template = ParticleSystemTemplate::new("done").with_emitter(emitter("a", 20.0));
        let mut system = component(template);
        system.activate(false);
        system.tick(0.1, &[]);
        assert!(!system.has_completed());
        system.deactivate();
        for _ in 0..12 {
            system.tick(0.1, &[]);
        }
        assert!(system.has_completed());
        assert_eq!(system.active_particles(), 0);
    }

    #[test]
    fn test_inactive_component_does_not_spawn() {
        let template = ParticleSystemTemplate::new("idle").with_emitter(emitter("a", 10.0));
        let mut system = component(template);
        let report = system.tick(0.1, &[]);
        assert!(!system.is_active());
        assert_eq!(report.spawned, 0);
        assert_eq!(system.active_particles(), 0);

        system.activate(false);
        assert_eq!(system.tick(0.1, &[]).spawned, 1);
    }

    #[test]
    fn test_kill_on_completed_clears_particles() {
        let required = RequiredModule {
            duration: 0.5,
            loops: 1,
            kill_on_completed: true,
            ..RequiredModule::default()
        };
        let emitter = EmitterTemplate::new("burst").with_seed(5).with_lod(
            LodLevel::new(0.0)
                .with_required(required)
                .with_spawn(SpawnModule::with_rate(0.0).burst(0.0, 3))
                .with_module(LifetimeModule::new(100.0)),
        );
        let template = ParticleSystemTemplate::new("once").with_emitter(emitter);
        let mut system = component(template);
        system.activate(true);

        system.tick(0.1, &[]);
        assert_eq!(system.active_particles(), 3);
        for _ in 0..9 {
            system.tick(0.1, &[]);
        }
        assert_eq!(system.active_particles(), 0);
        assert!(system.has_completed());
        let frozen = system.emitter(0).unwrap().seconds_since_creation();
        system.tick(0.1, &[]);
        assert_eq!(system.emitter(0).unwrap().seconds_since_creation(), frozen);
    }

    #[test]
    fn test_warmup_with_zero_step_terminates() {
        let template = ParticleSystemTemplate::new("warm")
            .with_emitter(emitter("a", 30.0))
            .with_warmup(0.01);
        let config = SimulationConfig {
            warmup_step: 0.0,
            ..SimulationConfig::default()
        };
        let mut system =
            ParticleSystemComponent::new(Arc::new(template), &config, Arc::new(ParticleStats::new()))
                .unwrap();
        system.activate(true);
        assert!(system.is_active());
    }
}
