//! 发射器模板
//!
//! 模板是只读的共享定义：LOD 层级、每层的必需模块/生成模块/行为模块栈，
//! 以及发射器类型数据。实例初始化时调用 [`EmitterTemplate::validate`]，
//! 任何结构错误都在这里报告，实例不会带着坏配置进入 tick。

use crate::core::error::{TemplateError, TemplateResult};
use crate::particles::bounds::Aabb;
use crate::particles::distribution::FloatDistribution;
use crate::particles::modules::{ModuleKind, ModuleRef, ParticleModule};
use crate::particles::payload::{BeamPayload, ParticlePayload, TrailPayload};
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 有限循环的最短时长（秒）
pub const MIN_LOOP_DURATION: f32 = 1.0e-3;

// ============================================================================
// 外部资源句柄
// ============================================================================

/// 材质句柄，由渲染协作方解析
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MaterialHandle(pub u32);

/// 网格句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MeshHandle(pub u32);

// ============================================================================
// 渲染相关枚举
// ============================================================================

/// 粒子排序方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortMode {
    #[default]
    None,
    /// 投影后深度，远到近
    ViewProjDepth,
    /// 到相机距离，远到近
    DistanceToView,
    AgeOldestFirst,
    AgeNewestFirst,
    /// 由模块提供的排序键（动态参数通道）
    Custom,
}

/// 精灵朝向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScreenAlignment {
    /// 正方形，只使用 size.x
    #[default]
    Square,
    Rectangle,
    /// 沿速度方向拉伸
    Velocity,
    /// 面向相机位置而不是相机平面
    FacingCameraPosition,
}

/// 宏 UV 参数（屏幕空间贴图投影）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MacroUv {
    pub position: Vec3,
    pub radius: f32,
}

/// 包围盒策略
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BoundsPolicy {
    /// 每帧全量扫描
    #[default]
    Dynamic,
    /// 只扩大不缩小，循环重绕时重置
    Incremental,
    /// 固定包围盒（发射器局部空间）
    Fixed(Aabb),
}

// ============================================================================
// 必需模块与生成模块
// ============================================================================

/// 每个 LOD 必须有的基础设置
#[derive(Debug, Clone)]
pub struct RequiredModule {
    pub material: MaterialHandle,
    /// 单次循环时长（秒），0 表示无限
    pub duration: f32,
    /// 循环次数，0 表示无限
    pub loops: u32,
    pub delay: f32,
    pub delay_first_loop_only: bool,
    pub use_local_space: bool,
    pub kill_on_deactivate: bool,
    pub kill_on_completed: bool,
    pub sort_mode: SortMode,
    pub screen_alignment: ScreenAlignment,
    pub sub_images_horizontal: u32,
    pub sub_images_vertical: u32,
    /// 最多绘制多少个粒子
    pub max_draw_count: Option<u32>,
    pub pivot_offset: Vec2,
    pub macro_uv_override: Option<MacroUv>,
}

impl Default for RequiredModule {
    fn default() -> Self {
        Self {
            material: MaterialHandle::default(),
            duration: 1.0,
            loops: 0,
            delay: 0.0,
            delay_first_loop_only: false,
            use_local_space: false,
            kill_on_deactivate: false,
            kill_on_completed: false,
            sort_mode: SortMode::None,
            screen_alignment: ScreenAlignment::Square,
            sub_images_horizontal: 1,
            sub_images_vertical: 1,
            max_draw_count: None,
            pivot_offset: Vec2::ZERO,
            macro_uv_override: None,
        }
    }
}

impl RequiredModule {
    pub fn sub_image_count(&self) -> u32 {
        self.sub_images_horizontal.max(1) * self.sub_images_vertical.max(1)
    }

    /// 第 `loop_index` 次循环的延迟
    pub fn delay_for_loop(&self, loop_index: u32) -> f32 {
        if self.delay_first_loop_only && loop_index > 0 {
            0.0
        } else {
            self.delay
        }
    }
}

/// 突发条目
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurstEntry {
    /// 循环内的时间（时长的比例；时长为 0 时按秒）
    pub time: f32,
    pub count: u32,
    /// 设置时在 `[count_low, count]` 内随机
    pub count_low: Option<u32>,
}

/// 生成速率与突发
#[derive(Debug, Clone)]
pub struct SpawnModule {
    /// 每秒生成数，参数为归一化的发射器时间
    pub rate: FloatDistribution,
    pub rate_scale: f32,
    pub bursts: Vec<BurstEntry>,
    pub burst_scale: f32,
}

impl Default for SpawnModule {
    fn default() -> Self {
        Self {
            rate: FloatDistribution::Constant(0.0),
            rate_scale: 1.0,
            bursts: Vec::new(),
            burst_scale: 1.0,
        }
    }
}

impl SpawnModule {
    pub fn with_rate(rate: impl Into<FloatDistribution>) -> Self {
        Self {
            rate: rate.into(),
            ..Self::default()
        }
    }

    pub fn burst(mut self, time: f32, count: u32) -> Self {
        self.bursts.push(BurstEntry {
            time,
            count,
            count_low: None,
        });
        self
    }

    pub fn burst_range(mut self, time: f32, count_low: u32, count: u32) -> Self {
        self.bursts.push(BurstEntry {
            time,
            count,
            count_low: Some(count_low),
        });
        self
    }
}

// ============================================================================
// LOD 层级
// ============================================================================

/// LOD 层级
#[derive(Debug, Clone, Default)]
pub struct LodLevel {
    /// 超过此距离时使用该层级
    pub distance: f32,
    pub required: Option<RequiredModule>,
    pub spawn: Option<SpawnModule>,
    /// 作者顺序的模块栈
    pub modules: Vec<ModuleRef>,
}

impl LodLevel {
    pub fn new(distance: f32) -> Self {
        Self {
            distance,
            ..Self::default()
        }
    }

    pub fn with_required(mut self, required: RequiredModule) -> Self {
        self.required = Some(required);
        self
    }

    pub fn with_spawn(mut self, spawn: SpawnModule) -> Self {
        self.spawn = Some(spawn);
        self
    }

    pub fn with_module(mut self, module: impl ParticleModule + 'static) -> Self {
        self.modules.push(Arc::new(module));
        self
    }

    pub fn with_shared_module(mut self, module: ModuleRef) -> Self {
        self.modules.push(module);
        self
    }
}

// ============================================================================
// 发射器类型数据
// ============================================================================

/// 发射器类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmitterType {
    Sprite,
    Mesh,
    Beam,
    Ribbon,
    AnimTrail,
}

/// 光束设置（发射器局部空间）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamSettings {
    pub source: Vec3,
    pub target: Vec3,
    pub source_tangent: Vec3,
    pub target_tangent: Vec3,
    pub source_strength: f32,
    pub target_strength: f32,
    /// 插值段数，至少 1
    pub steps: u32,
    /// 绕光束轴旋转排列的面片数
    pub sheets: u32,
}

impl Default for BeamSettings {
    fn default() -> Self {
        Self {
            source: Vec3::ZERO,
            target: Vec3::new(0.0, 0.0, 100.0),
            source_tangent: Vec3::Z,
            target_tangent: Vec3::Z,
            source_strength: 1.0,
            target_strength: 1.0,
            steps: 8,
            sheets: 1,
        }
    }
}

/// 拖尾设置（Ribbon 与 AnimTrail 共用）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailSettings {
    /// 同时存在的拖尾条数
    pub max_trails: u32,
    /// 相邻粒子之间的细分段数
    pub tessellation: u32,
    /// 每世界单位的 U 坐标，0 表示按粒子序号平铺
    pub tiling_distance: f32,
}

impl Default for TrailSettings {
    fn default() -> Self {
        Self {
            max_trails: 1,
            tessellation: 1,
            tiling_distance: 0.0,
        }
    }
}

/// 发射器类型与其专有设置
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EmitterTypeSettings {
    #[default]
    Sprite,
    Mesh {
        mesh: MeshHandle,
    },
    Beam(BeamSettings),
    Ribbon(TrailSettings),
    AnimTrail(TrailSettings),
}

impl EmitterTypeSettings {
    pub fn emitter_type(&self) -> EmitterType {
        match self {
            Self::Sprite => EmitterType::Sprite,
            Self::Mesh { .. } => EmitterType::Mesh,
            Self::Beam(_) => EmitterType::Beam,
            Self::Ribbon(_) => EmitterType::Ribbon,
            Self::AnimTrail(_) => EmitterType::AnimTrail,
        }
    }

    /// 类型数据载荷字节数，放在载荷区最前面
    pub fn payload_size(&self) -> usize {
        match self {
            Self::Sprite | Self::Mesh { .. } => 0,
            Self::Beam(_) => BeamPayload::SIZE,
            Self::Ribbon(_) | Self::AnimTrail(_) => TrailPayload::SIZE,
        }
    }
}

// ============================================================================
// 发射器模板
// ============================================================================

/// 发射器模板
#[derive(Debug, Clone)]
pub struct EmitterTemplate {
    pub name: String,
    pub lods: Vec<LodLevel>,
    pub type_settings: EmitterTypeSettings,
    /// 粒子数硬上限，`None` 时只受全局配置限制
    pub max_particles: Option<usize>,
    /// 初次分配的槽位数，0 使用全局配置
    pub initial_allocation: usize,
    pub random_seed: Option<u64>,
    pub bounds_policy: BoundsPolicy,
}

impl EmitterTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lods: Vec::new(),
            type_settings: EmitterTypeSettings::Sprite,
            max_particles: None,
            initial_allocation: 0,
            random_seed: None,
            bounds_policy: BoundsPolicy::Dynamic,
        }
    }

    pub fn with_lod(mut self, lod: LodLevel) -> Self {
        self.lods.push(lod);
        self
    }

    pub fn with_type(mut self, settings: EmitterTypeSettings) -> Self {
        self.type_settings = settings;
        self
    }

    pub fn with_max_particles(mut self, max_particles: usize) -> Self {
        self.max_particles = Some(max_particles);
        self
    }

    pub fn with_initial_allocation(mut self, count: usize) -> Self {
        self.initial_allocation = count;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn with_bounds_policy(mut self, policy: BoundsPolicy) -> Self {
        self.bounds_policy = policy;
        self
    }

    pub fn emitter_type(&self) -> EmitterType {
        self.type_settings.emitter_type()
    }

    pub fn lod_count(&self) -> usize {
        self.lods.len()
    }

    pub fn lod(&self, index: usize) -> TemplateResult<&LodLevel> {
        self.lods.get(index).ok_or(TemplateError::InvalidLodIndex {
            index,
            count: self.lods.len(),
        })
    }

    /// 已验证层级的必需模块
    pub(crate) fn required(&self, lod: usize) -> TemplateResult<&RequiredModule> {
        self.lod(lod)?
            .required
            .as_ref()
            .ok_or_else(|| TemplateError::MissingRequiredModule {
                emitter: self.name.clone(),
                lod,
            })
    }

    /// 检查结构与参数
    pub fn validate(&self) -> TemplateResult<()> {
        let Some(base) = self.lods.first() else {
            return Err(TemplateError::NoLodLevels {
                emitter: self.name.clone(),
            });
        };

        for (lod_index, lod) in self.lods.iter().enumerate() {
            let required = lod
                .required
                .as_ref()
                .ok_or_else(|| TemplateError::MissingRequiredModule {
                    emitter: self.name.clone(),
                    lod: lod_index,
                })?;
            let spawn = lod
                .spawn
                .as_ref()
                .ok_or_else(|| TemplateError::MissingSpawnModule {
                    emitter: self.name.clone(),
                    lod: lod_index,
                })?;

            self.validate_required(required)?;
            if spawn.rate_scale < 0.0 || spawn.burst_scale < 0.0 {
                return Err(self.invalid("spawn scales must be non-negative"));
            }

            if lod.modules.len() != base.modules.len() {
                return Err(TemplateError::LodModuleCountMismatch {
                    emitter: self.name.clone(),
                    lod: lod_index,
                    expected: base.modules.len(),
                    found: lod.modules.len(),
                });
            }

            for (slot, module) in lod.modules.iter().enumerate() {
                let expected = base.modules[slot].kind();
                if module.kind() != expected {
                    return Err(TemplateError::LodModuleKindMismatch {
                        emitter: self.name.clone(),
                        lod: lod_index,
                        slot,
                        expected,
                        found: module.kind(),
                    });
                }
                self.check_dependencies(lod_index, &lod.modules[..slot], module.as_ref())?;
            }
        }

        if let EmitterTypeSettings::Beam(beam) = &self.type_settings {
            if beam.steps == 0 || beam.sheets == 0 {
                return Err(self.invalid("beam steps and sheets must be at least 1"));
            }
        }
        if let EmitterTypeSettings::Ribbon(trail) | EmitterTypeSettings::AnimTrail(trail) =
            &self.type_settings
        {
            if trail.max_trails == 0 || trail.tessellation == 0 {
                return Err(self.invalid("trail count and tessellation must be at least 1"));
            }
        }
        if self.max_particles == Some(0) {
            return Err(self.invalid("max_particles must be positive when set"));
        }
        Ok(())
    }

    fn validate_required(&self, required: &RequiredModule) -> TemplateResult<()> {
        if !(required.duration >= 0.0) || !(required.delay >= 0.0) {
            return Err(self.invalid("duration and delay must be non-negative"));
        }
        if required.duration > 0.0 && required.duration < MIN_LOOP_DURATION {
            return Err(self.invalid("loop duration must be at least 1ms or 0 for infinite"));
        }
        if required.sub_images_horizontal == 0 || required.sub_images_vertical == 0 {
            return Err(self.invalid("sub-image grid must be at least 1x1"));
        }
        Ok(())
    }

    fn check_dependencies(
        &self,
        lod: usize,
        earlier: &[ModuleRef],
        module: &dyn ParticleModule,
    ) -> TemplateResult<()> {
        for &required in module.requires() {
            if !earlier.iter().any(|m| m.kind() == required) {
                return Err(TemplateError::MissingModuleDependency {
                    emitter: self.name.clone(),
                    lod,
                    module: module.kind(),
                    required,
                });
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> TemplateError {
        TemplateError::InvalidParameter {
            emitter: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    /// 某槽位在所有 LOD 上的模块类别
    pub fn slot_kind(&self, slot: usize) -> Option<ModuleKind> {
        self.lods.first()?.modules.get(slot).map(|m| m.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::modules::{
        LifetimeModule, MeshRotationModule, MeshRotationRateModule, SubUvMode, SubUvModule,
    };

    fn basic_lod(distance: f32) -> LodLevel {
        LodLevel::new(distance)
            .with_required(RequiredModule::default())
            .with_spawn(SpawnModule::with_rate(10.0))
            .with_module(LifetimeModule::new(1.0))
    }

    #[test]
    fn test_valid_template() {
        let template = EmitterTemplate::new("sparks")
            .with_lod(basic_lod(0.0))
            .with_lod(basic_lod(1000.0));
        assert!(template.validate().is_ok());
        assert_eq!(template.slot_kind(0), Some(ModuleKind::Lifetime));
    }

    #[test]
    fn test_missing_modules() {
        let template = EmitterTemplate::new("empty");
        assert!(matches!(template.validate(), Err(TemplateError::NoLodLevels { .. })));

        let template = EmitterTemplate::new("no-required")
            .with_lod(LodLevel::new(0.0).with_spawn(SpawnModule::default()));
        assert!(matches!(
            template.validate(),
            Err(TemplateError::MissingRequiredModule { lod: 0, .. })
        ));

        let template = EmitterTemplate::new("no-spawn").with_lod(basic_lod(0.0)).with_lod(
            LodLevel::new(500.0)
                .with_required(RequiredModule::default())
                .with_module(LifetimeModule::new(1.0)),
        );
        assert!(matches!(
            template.validate(),
            Err(TemplateError::MissingSpawnModule { lod: 1, .. })
        ));
    }

    #[test]
    fn test_tiny_loop_duration_rejected() {
        let lod = |duration: f32| {
            LodLevel::new(0.0)
                .with_required(RequiredModule {
                    duration,
                    ..RequiredModule::default()
                })
                .with_spawn(SpawnModule::with_rate(10.0))
        };
        let template = EmitterTemplate::new("flicker").with_lod(lod(1.0e-5));
        assert!(matches!(
            template.validate(),
            Err(TemplateError::InvalidParameter { .. })
        ));
        assert!(EmitterTemplate::new("endless").with_lod(lod(0.0)).validate().is_ok());
    }

    #[test]
    fn test_lod_slot_mismatch() {
        let other = LodLevel::new(500.0)
            .with_required(RequiredModule::default())
            .with_spawn(SpawnModule::default())
            .with_module(SubUvModule::new(SubUvMode::Linear));
        let template = EmitterTemplate::new("mismatch")
            .with_lod(basic_lod(0.0))
            .with_lod(other);
        assert!(matches!(
            template.validate(),
            Err(TemplateError::LodModuleKindMismatch { lod: 1, slot: 0, .. })
        ));
    }

    #[test]
    fn test_dependency_order() {
        let lod = LodLevel::new(0.0)
            .with_required(RequiredModule::default())
            .with_spawn(SpawnModule::default())
            .with_module(MeshRotationRateModule {
                rate: Vec3::ONE.into(),
            })
            .with_module(MeshRotationModule {
                start_rotation: Vec3::ZERO.into(),
            });
        let template = EmitterTemplate::new("rotation").with_lod(lod);
        assert_eq!(
            template.validate(),
            Err(TemplateError::MissingModuleDependency {
                emitter: "rotation".into(),
                lod: 0,
                module: ModuleKind::MeshRotationRate,
                required: ModuleKind::MeshRotation,
            })
        );
    }

    #[test]
    fn test_delay_first_loop_only() {
        let required = RequiredModule {
            delay: 0.5,
            delay_first_loop_only: true,
            ..RequiredModule::default()
        };
        assert_eq!(required.delay_for_loop(0), 0.5);
        assert_eq!(required.delay_for_loop(3), 0.0);
    }

    #[test]
    fn test_invalid_lod_index() {
        let template = EmitterTemplate::new("one").with_lod(basic_lod(0.0));
        assert_eq!(
            template.lod(2).err(),
            Some(TemplateError::InvalidLodIndex { index: 2, count: 1 })
        );
    }
}
