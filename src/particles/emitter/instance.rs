//! 发射器实例：每帧的 tick 状态机
//!
//! ```text
//! TimeSetup → Spawn → Update → PostUpdate → FinalUpdate → Kill → Bounds
//! ```
//!
//! 时间推进和生成数量先以纯计算得出，确认池容量后才提交；
//! 扩容失败时本帧整体跳过，实例状态保持不变，下一帧重试。

use super::timing::{self, EmitterClock, SpawnEvent};
use crate::config::{PoolConfig, SimulationConfig};
use crate::core::error::{EngineResult, PoolResult, TemplateError, TemplateResult};
use crate::particles::bounds::Aabb;
use crate::particles::modules::{SpawnContext, TickPhase, UpdateContext};
use crate::particles::offsets::ModuleOffsetTable;
use crate::particles::payload::{BeamPayload, ParticleView, TrailPayload};
use crate::particles::pool::{ParticleHandle, ParticlePool};
use crate::particles::record::{state_flags, ParticleRecord};
use crate::particles::snapshot::{EmitterSnapshot, ReplayData};
use crate::particles::stats::ParticleStats;
use crate::particles::template::{
    BoundsPolicy, EmitterTemplate, EmitterTypeSettings, LodLevel, RequiredModule,
};
use glam::{Mat3, Mat4, Vec3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::ops::Range;
use std::sync::Arc;

/// 单次 tick 的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub spawned: usize,
    pub killed: usize,
    /// 超出容量而丢弃的生成请求
    pub dropped: usize,
    /// 扩容失败，本帧未执行
    pub skipped: bool,
}

/// 强制生成时覆盖的初始状态
#[derive(Debug, Clone, Copy, Default)]
struct SpawnOverride {
    location: Option<Vec3>,
    velocity: Vec3,
}

/// 拖尾链表的最新一节
#[derive(Debug, Clone, Copy)]
struct TrailHead {
    position: Vec3,
    tiled_u: f32,
}

/// 发射器实例
#[derive(Debug)]
pub struct EmitterInstance {
    template: Arc<EmitterTemplate>,
    name: Arc<str>,
    emitter_index: usize,
    offsets: ModuleOffsetTable,
    pool: ParticlePool,
    /// 每实例模块载荷，以 u32 为底保证对齐
    instance_payload: Vec<u32>,
    pool_config: PoolConfig,
    particle_limit: usize,
    stats: Arc<ParticleStats>,
    rng: StdRng,

    current_lod: usize,
    /// 每个 LOD 每个 burst 条目在本循环是否已触发
    burst_fired: Vec<Vec<bool>>,
    clock: EmitterClock,
    spawn_fraction: f32,
    seconds_since_creation: f32,
    last_delta_time: f32,
    halt_spawning: bool,
    bounds: Aabb,
    particle_counter: u32,

    local_to_world: Mat4,
    location: Vec3,
    old_location: Vec3,
    transform_initialized: bool,

    trail_heads: Vec<Option<TrailHead>>,
    next_trail: u32,
}

impl EmitterInstance {
    /// 验证模板、解析偏移表并分配初始容量
    ///
    /// 模板结构错误在这里返回，出错的实例不会被创建。
    pub fn new(
        template: Arc<EmitterTemplate>,
        emitter_index: usize,
        config: &SimulationConfig,
        stats: Arc<ParticleStats>,
    ) -> EngineResult<Self> {
        let offsets = ModuleOffsetTable::build(&template)?;

        let particle_limit = template
            .max_particles
            .unwrap_or(usize::MAX)
            .min(config.pool.max_particles_per_emitter as usize);
        let initial = match template.initial_allocation {
            0 => config.pool.initial_capacity as usize,
            n => n,
        }
        .min(particle_limit);
        let pool = ParticlePool::with_capacity(offsets.stride(), initial)?;

        let mut instance_payload = vec![0u32; offsets.instance_payload_size().div_ceil(4)];
        {
            let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut instance_payload);
            for (slot, module) in template.lods[0].modules.iter().enumerate() {
                if let Some(range) = instance_range(&offsets, slot) {
                    module.init_instance(&mut bytes[range]);
                }
            }
        }

        let rng = match template.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let burst_fired = template
            .lods
            .iter()
            .map(|lod| vec![false; lod.spawn.as_ref().map_or(0, |s| s.bursts.len())])
            .collect();
        let trail_count = match &template.type_settings {
            EmitterTypeSettings::Ribbon(trail) | EmitterTypeSettings::AnimTrail(trail) => {
                trail.max_trails as usize
            }
            _ => 0,
        };

        tracing::debug!(
            target: "particle::emitter",
            emitter = %template.name,
            stride = offsets.stride(),
            capacity = initial,
            limit = particle_limit,
            "Emitter instance created"
        );

        Ok(Self {
            name: Arc::from(template.name.as_str()),
            template,
            emitter_index,
            offsets,
            pool,
            instance_payload,
            pool_config: config.pool.clone(),
            particle_limit,
            stats,
            rng,
            current_lod: 0,
            burst_fired,
            clock: EmitterClock::default(),
            spawn_fraction: 0.0,
            seconds_since_creation: 0.0,
            last_delta_time: 0.0,
            halt_spawning: false,
            bounds: Aabb::EMPTY,
            particle_counter: 0,
            local_to_world: Mat4::IDENTITY,
            location: Vec3::ZERO,
            old_location: Vec3::ZERO,
            transform_initialized: false,
            trail_heads: vec![None; trail_count],
            next_trail: 0,
        })
    }

    // ========================================================================
    // 访问器
    // ========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn emitter_index(&self) -> usize {
        self.emitter_index
    }

    pub fn template(&self) -> &Arc<EmitterTemplate> {
        &self.template
    }

    pub fn offsets(&self) -> &ModuleOffsetTable {
        &self.offsets
    }

    pub fn pool(&self) -> &ParticlePool {
        &self.pool
    }

    pub fn active_particles(&self) -> usize {
        self.pool.active_count()
    }

    pub fn max_active_particles(&self) -> usize {
        self.pool.max_active()
    }

    pub fn particle_limit(&self) -> usize {
        self.particle_limit
    }

    pub fn current_lod(&self) -> usize {
        self.current_lod
    }

    pub fn lod_count(&self) -> usize {
        self.template.lod_count()
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn clock(&self) -> EmitterClock {
        self.clock
    }

    pub fn loop_count(&self) -> u32 {
        self.clock.loop_count
    }

    pub fn seconds_since_creation(&self) -> f32 {
        self.seconds_since_creation
    }

    pub fn spawn_fraction(&self) -> f32 {
        self.spawn_fraction
    }

    pub fn is_spawning_halted(&self) -> bool {
        self.halt_spawning
    }

    pub fn instance_payload(&self) -> &[u8] {
        bytemuck::cast_slice(&self.instance_payload)
    }

    fn required(&self) -> Option<&RequiredModule> {
        self.template
            .lods
            .get(self.current_lod)
            .and_then(|lod| lod.required.as_ref())
    }

    pub fn kill_on_completed(&self) -> bool {
        self.required().is_some_and(|r| r.kill_on_completed)
    }

    /// 有限循环次数已经跑完
    pub fn loops_exhausted(&self) -> bool {
        self.required()
            .is_some_and(|r| r.loops > 0 && self.clock.loop_count >= r.loops)
    }

    /// 所有循环跑完（或生成已停止）且没有存活粒子
    pub fn has_completed(&self) -> bool {
        if self.required().is_none() {
            return true;
        }
        (self.halt_spawning || self.loops_exhausted()) && self.pool.active_count() == 0
    }

    // ========================================================================
    // 变换
    // ========================================================================

    /// 更新组件变换；第一次调用时同时作为上一帧位置
    pub fn set_transform(&mut self, local_to_world: Mat4) {
        self.local_to_world = local_to_world;
        let use_local_space = self.required().is_some_and(|r| r.use_local_space);
        self.location = if use_local_space {
            Vec3::ZERO
        } else {
            local_to_world.w_axis.truncate()
        };
        if !self.transform_initialized {
            self.old_location = self.location;
            self.transform_initialized = true;
        }
    }

    /// 发射器局部方向 → 模拟空间
    fn to_simulation(&self, required: &RequiredModule) -> Mat4 {
        if required.use_local_space {
            Mat4::IDENTITY
        } else {
            Mat4::from_mat3(Mat3::from_mat4(self.local_to_world))
        }
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// 推进一帧
    pub fn tick(&mut self, delta_time: f32, suppress_spawning: bool) -> TickReport {
        let template = Arc::clone(&self.template);
        let lod_index = self.current_lod;
        let Some(lod) = template.lods.get(lod_index) else {
            return TickReport::default();
        };
        let (Some(required), Some(spawn)) = (lod.required.as_ref(), lod.spawn.as_ref()) else {
            return TickReport::default();
        };
        let dt = delta_time.max(0.0);

        // TimeSetup + 生成计划
        let spawning_enabled = !suppress_spawning && !self.halt_spawning;
        let plan = timing::plan_spawn(
            self.clock,
            dt,
            required,
            spawn,
            self.spawn_fraction,
            &self.burst_fired[lod_index],
            spawning_enabled,
            &self.rng,
        );

        let wanted = plan.total();
        let accepted = match self.secure_capacity(wanted) {
            Ok(accepted) => accepted,
            Err(err) => {
                self.stats.allocation_failures.increment();
                self.stats.ticks_skipped.increment();
                tracing::warn!(
                    target: "particle::emitter",
                    emitter = %self.name,
                    error = %err,
                    "Pool growth failed, skipping tick"
                );
                return TickReport {
                    skipped: true,
                    ..TickReport::default()
                };
            }
        };
        let dropped = wanted - accepted;
        if dropped > 0 {
            self.stats.capacity_exceeded.add(dropped as u64);
            tracing::debug!(
                target: "particle::emitter",
                emitter = %self.name,
                wanted,
                accepted,
                limit = self.particle_limit,
                "Spawn capped by capacity"
            );
        }

        // 提交时间状态
        self.clock = plan.time.clock;
        self.spawn_fraction = plan.spawn_fraction;
        self.burst_fired[lod_index] = plan.burst_fired;
        self.rng = plan.rng;
        if plan.time.looped {
            for (index, fired) in self.burst_fired.iter_mut().enumerate() {
                if index != lod_index {
                    fired.iter_mut().for_each(|f| *f = false);
                }
            }
            if matches!(template.bounds_policy, BoundsPolicy::Incremental) {
                self.bounds = Aabb::EMPTY;
            }
        }

        // Spawn
        let pre_spawn = self.pool.active_count();
        let rate_count = plan.rate_events.len().min(accepted);
        let burst_event = SpawnEvent {
            spawn_time: 0.0,
            interpolation: 1.0,
        };
        let events = plan.rate_events[..rate_count]
            .iter()
            .copied()
            .chain(std::iter::repeat(burst_event).take(accepted - rate_count));
        let spawned = self.spawn_events(
            &template,
            lod_index,
            required,
            dt,
            events,
            SpawnOverride::default(),
        );

        // Update / PostUpdate / FinalUpdate
        self.update_modules(lod, lod_index, required, dt, pre_spawn);

        // Kill
        let killed = self.kill_expired();

        // Bounds
        self.update_bounds(&template, required, dt);

        self.seconds_since_creation += dt;
        self.last_delta_time = dt;
        self.old_location = self.location;

        TickReport {
            spawned,
            killed,
            dropped,
            skipped: false,
        }
    }

    /// 保证至少能放下 `wanted` 个新粒子，返回实际可接受的数量
    ///
    /// 只有扩容分配失败时返回错误，此时池未被修改。
    fn secure_capacity(&mut self, wanted: usize) -> PoolResult<usize> {
        if wanted <= self.pool.free_slots() {
            return Ok(wanted);
        }
        let current = self.pool.max_active();
        if current < self.particle_limit {
            let required = self.pool.active_count().saturating_add(wanted);
            let target = self
                .pool_config
                .grow_target(current, required, self.particle_limit);
            if target > current {
                self.pool.resize(target, true)?;
            }
        }
        Ok(wanted.min(self.pool.free_slots()))
    }

    fn spawn_events(
        &mut self,
        template: &EmitterTemplate,
        lod_index: usize,
        required: &RequiredModule,
        dt: f32,
        events: impl Iterator<Item = SpawnEvent>,
        spawn_override: SpawnOverride,
    ) -> usize {
        let lod = &template.lods[lod_index];
        let to_simulation = self.to_simulation(required);
        let emitter_time = self.clock.emitter_time;
        let normalized = timing::normalized_time(&self.clock, required);
        let sub_images = required.sub_image_count();
        let (location, old_location) = (self.location, self.old_location);
        let birth_base = self.seconds_since_creation + dt;

        let Self {
            pool,
            offsets,
            instance_payload,
            rng,
            particle_counter,
            trail_heads,
            next_trail,
            ..
        } = self;
        let offsets: &ModuleOffsetTable = offsets;
        let instance_bytes: &mut [u8] = bytemuck::cast_slice_mut(instance_payload.as_mut_slice());
        let spawn_slots = offsets.spawn_slots(lod_index);

        let mut spawned = 0usize;
        for event in events {
            let Some(handle) = pool.acquire_slot() else {
                break;
            };
            let mut particle = pool.slot_view_mut(handle.slot);
            let spawn_location = spawn_override
                .location
                .unwrap_or_else(|| old_location.lerp(location, event.interpolation));
            *particle.record = ParticleRecord::spawned_at(spawn_location);
            particle.record.set_counter(*particle_counter);
            *particle_counter = particle_counter.wrapping_add(1) & state_flags::COUNTER_MASK;

            for &slot in spawn_slots {
                let instance: &mut [u8] = match instance_range(offsets, slot) {
                    Some(range) => &mut instance_bytes[range],
                    None => &mut [],
                };
                let mut ctx = SpawnContext {
                    emitter_time,
                    emitter_time_normalized: normalized,
                    spawn_time: event.spawn_time,
                    interpolation: event.interpolation,
                    location: spawn_location,
                    to_simulation,
                    sub_images,
                    offsets,
                    payload_offset: offsets.slot(slot).and_then(|s| s.payload_offset),
                    instance,
                    rng: &mut *rng,
                };
                lod.modules[slot].spawn(&mut ctx, &mut particle);
            }

            // 类型数据
            if let Some(offset) = offsets.type_data_offset() {
                match &template.type_settings {
                    EmitterTypeSettings::Beam(beam) => {
                        let source = spawn_location + to_simulation.transform_vector3(beam.source);
                        if let Some(payload) = particle.payload.get_mut::<BeamPayload>(offset) {
                            *payload = BeamPayload {
                                source_point: source,
                                source_strength: beam.source_strength,
                                target_point: spawn_location
                                    + to_simulation.transform_vector3(beam.target),
                                target_strength: beam.target_strength,
                                source_tangent: to_simulation
                                    .transform_vector3(beam.source_tangent)
                                    .normalize_or_zero(),
                                steps: beam.steps,
                                target_tangent: to_simulation
                                    .transform_vector3(beam.target_tangent)
                                    .normalize_or_zero(),
                                sheets: beam.sheets,
                            };
                        }
                        particle.record.position = source;
                        particle.record.old_position = source;
                    }
                    EmitterTypeSettings::Ribbon(trail) | EmitterTypeSettings::AnimTrail(trail) => {
                        let trail_index = *next_trail % trail.max_trails.max(1);
                        *next_trail = next_trail.wrapping_add(1);
                        let position = particle.record.position;
                        let head = trail_heads.get_mut(trail_index as usize);
                        let tiled_u = match head.as_deref() {
                            Some(Some(prev)) if trail.tiling_distance > 0.0 => {
                                prev.tiled_u + prev.position.distance(position) / trail.tiling_distance
                            }
                            Some(Some(prev)) => prev.tiled_u + 1.0,
                            _ => 0.0,
                        };
                        if let Some(head) = head {
                            *head = Some(TrailHead { position, tiled_u });
                        }
                        if let Some(payload) = particle.payload.get_mut::<TrailPayload>(offset) {
                            *payload = TrailPayload {
                                up: to_simulation.transform_vector3(Vec3::Y).normalize_or_zero(),
                                trail_index,
                                spawn_time: birth_base - event.spawn_time,
                                tiled_u,
                            };
                        }
                    }
                    EmitterTypeSettings::Sprite | EmitterTypeSettings::Mesh { .. } => {}
                }
            }

            post_spawn(&mut particle, event.spawn_time, spawn_override.velocity);
            spawned += 1;
        }

        self.stats.spawned.add(spawned as u64);
        spawned
    }

    fn update_modules(
        &mut self,
        lod: &LodLevel,
        lod_index: usize,
        required: &RequiredModule,
        dt: f32,
        pre_spawn: usize,
    ) {
        let to_simulation = self.to_simulation(required);
        let emitter_time = self.clock.emitter_time;
        let sub_images = required.sub_image_count();
        let location = self.location;

        let Self {
            pool,
            offsets,
            instance_payload,
            rng,
            ..
        } = self;
        let offsets: &ModuleOffsetTable = offsets;

        // 本帧之前就存在的粒子回到基础值并推进寿命
        pool.for_each_in_range_mut(0..pre_spawn, |_, view| {
            if !view.record.is_frozen() {
                view.record.reset_to_base(dt);
            }
        });

        let instance_bytes: &mut [u8] = bytemuck::cast_slice_mut(instance_payload.as_mut_slice());
        for phase in TickPhase::ALL {
            for &slot in offsets.update_slots(lod_index, phase) {
                let module = &lod.modules[slot];
                let instance: &mut [u8] = match instance_range(offsets, slot) {
                    Some(range) => &mut instance_bytes[range],
                    None => &mut [],
                };
                let mut ctx = UpdateContext {
                    delta_time: dt,
                    emitter_time,
                    location,
                    to_simulation,
                    sub_images,
                    offsets,
                    payload_offset: offsets.slot(slot).and_then(|s| s.payload_offset),
                    instance,
                    rng: &mut *rng,
                };
                pool.for_each_active_mut(|_, mut view| {
                    if !view.record.is_frozen() {
                        module.update(phase, &mut ctx, &mut view);
                    }
                });
            }
        }
    }

    /// 从后往前移除到期粒子；被交换过来的粒子已经检查过
    fn kill_expired(&mut self) -> usize {
        let mut killed = 0usize;
        for index in (0..self.pool.active_count()).rev() {
            if self.pool.particle(index).is_some_and(|r| r.should_kill()) && self.pool.kill_at(index)
            {
                killed += 1;
            }
        }
        self.stats.killed.add(killed as u64);
        killed
    }

    /// 积分位置并更新包围盒
    fn update_bounds(&mut self, template: &EmitterTemplate, required: &RequiredModule, dt: f32) {
        let policy = template.bounds_policy;
        let track = !matches!(policy, BoundsPolicy::Fixed(_));
        let mut bounds = match policy {
            BoundsPolicy::Incremental => self.bounds,
            _ => Aabb::EMPTY,
        };

        self.pool.for_each_active_mut(|_, view| {
            let record = view.record;
            if !record.is_frozen() {
                record.integrate(dt);
            }
            if track {
                bounds.include_sphere(record.position, record.size.max_element().abs() * 0.5);
            }
        });

        self.bounds = match policy {
            BoundsPolicy::Fixed(fixed) if required.use_local_space => fixed,
            BoundsPolicy::Fixed(fixed) => fixed.transformed(&self.local_to_world),
            _ => bounds,
        };
    }

    // ========================================================================
    // 控制
    // ========================================================================

    /// 切换 LOD
    ///
    /// 已有粒子保留载荷；之后的 tick 使用新层级的模块列表。
    /// `fully_process` 为真时，新层级中本循环已经过去的 burst 标记为已触发。
    pub fn set_current_lod_index(&mut self, index: usize, fully_process: bool) -> TemplateResult<()> {
        let count = self.template.lod_count();
        if index >= count {
            return Err(TemplateError::InvalidLodIndex { index, count });
        }
        if index == self.current_lod {
            return Ok(());
        }
        if fully_process {
            let lod = &self.template.lods[index];
            if let (Some(required), Some(spawn)) = (lod.required.as_ref(), lod.spawn.as_ref()) {
                self.burst_fired[index] = timing::passed_bursts(&self.clock, required, spawn);
            }
        }
        tracing::debug!(
            target: "particle::emitter",
            emitter = %self.name,
            from = self.current_lod,
            to = index,
            "LOD switched"
        );
        self.current_lod = index;
        Ok(())
    }

    /// 时间、循环与 burst 回到初始状态，粒子保留
    pub fn rewind(&mut self) {
        self.clock = EmitterClock::default();
        self.seconds_since_creation = 0.0;
        self.spawn_fraction = 0.0;
        self.halt_spawning = false;
        for fired in &mut self.burst_fired {
            fired.iter_mut().for_each(|f| *f = false);
        }
        if matches!(self.template.bounds_policy, BoundsPolicy::Incremental) {
            self.bounds = Aabb::EMPTY;
        }
        self.trail_heads.iter_mut().for_each(|head| *head = None);
    }

    pub fn kill_all(&mut self) {
        let count = self.pool.active_count();
        self.pool.kill_all();
        self.stats.killed.add(count as u64);
        self.trail_heads.iter_mut().for_each(|head| *head = None);
    }

    /// 停止生成；设置了 kill-on-deactivate 时同时移除所有粒子
    pub fn deactivate(&mut self) {
        self.halt_spawning = true;
        if self.required().is_some_and(|r| r.kill_on_deactivate) {
            self.kill_all();
        }
    }

    pub fn set_halt_spawning(&mut self, halt: bool) {
        self.halt_spawning = halt;
    }

    /// 立即在 `location` 生成 `count` 个粒子，附加速度 `velocity`
    ///
    /// 返回实际生成的数量；容量不足的部分计入统计后丢弃。
    pub fn force_spawn(&mut self, count: usize, location: Vec3, velocity: Vec3) -> usize {
        let template = Arc::clone(&self.template);
        let lod_index = self.current_lod;
        let Some(required) = template.lods.get(lod_index).and_then(|l| l.required.as_ref()) else {
            return 0;
        };
        let accepted = match self.secure_capacity(count) {
            Ok(accepted) => accepted,
            Err(err) => {
                self.stats.allocation_failures.increment();
                tracing::warn!(
                    target: "particle::emitter",
                    emitter = %self.name,
                    error = %err,
                    "Pool growth failed during forced spawn"
                );
                0
            }
        };
        self.stats.capacity_exceeded.add((count - accepted) as u64);
        let event = SpawnEvent {
            spawn_time: 0.0,
            interpolation: 1.0,
        };
        self.spawn_events(
            &template,
            lod_index,
            required,
            0.0,
            std::iter::repeat(event).take(accepted),
            SpawnOverride {
                location: Some(location),
                velocity,
            },
        )
    }

    /// 重设池容量（不超过粒子上限，不截断存活粒子）
    pub fn resize(&mut self, max_particles: usize) -> PoolResult<()> {
        self.pool.resize(max_particles.min(self.particle_limit), true)
    }

    pub fn particle_handle(&self, active_index: usize) -> Option<ParticleHandle> {
        self.pool.handle_of(active_index)
    }

    /// 按句柄读取粒子；粒子被移除后句柄失效
    pub fn particle(&self, handle: ParticleHandle) -> Option<&ParticleRecord> {
        self.pool.get(handle)
    }

    // ========================================================================
    // 快照
    // ========================================================================

    /// 复制本帧渲染所需的数据；没有存活粒子时返回 `None`
    pub fn build_snapshot(&self) -> Option<EmitterSnapshot> {
        let active = self.pool.active_count();
        if active == 0 {
            return None;
        }
        let required = self.required()?;

        let mut replay = ReplayData::new(
            self.template.emitter_type(),
            active,
            self.pool.stride(),
            self.pool.compact_copy(),
        );
        replay.scale = self.local_to_world.to_scale_rotation_translation().0;
        replay.sort_mode = required.sort_mode;
        replay.material = required.material;
        replay.use_local_space = required.use_local_space;
        replay.screen_alignment = required.screen_alignment;
        replay.sub_images_horizontal = required.sub_images_horizontal;
        replay.sub_images_vertical = required.sub_images_vertical;
        replay.pivot_offset = required.pivot_offset;
        replay.max_draw_count = required.max_draw_count;
        replay.macro_uv_override = required.macro_uv_override;
        replay.offsets = self.offsets.payload_offsets();
        replay.inv_delta_seconds = if self.last_delta_time > 0.0 {
            1.0 / self.last_delta_time
        } else {
            0.0
        };

        self.stats.snapshots_built.increment();
        Some(EmitterSnapshot {
            emitter_index: self.emitter_index,
            name: Arc::clone(&self.name),
            lod: self.current_lod,
            bounds: self.bounds,
            replay,
            type_data: self.template.type_settings.clone(),
        })
    }
}

fn instance_range(offsets: &ModuleOffsetTable, slot: usize) -> Option<Range<usize>> {
    offsets.slot(slot).and_then(|s| s.instance_range.clone())
}

/// 生成后的收尾：附加速度，并按本帧内已存在的时间前移
fn post_spawn(particle: &mut ParticleView<'_>, spawn_time: f32, extra_velocity: Vec3) {
    let record = &mut *particle.record;
    record.velocity += extra_velocity;
    record.base_velocity += extra_velocity;
    record.old_position = record.position;
    if !record.has_flag(state_flags::FREEZE_TRANSLATION) {
        record.position += record.velocity * spawn_time;
    }
}
