use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 模拟线程配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// 粒子池配置
    pub pool: PoolConfig,

    /// 单帧最大时间步长（秒），超出部分被截断以吸收卡顿
    pub max_delta_time: f32,

    /// 自动 LOD 检查间隔（秒）
    pub lod_check_interval: f32,

    /// 预热时的固定步长（秒）
    pub warmup_step: f32,
}

impl_default!(SimulationConfig {
    pool: PoolConfig::default(),
    max_delta_time: 0.1,
    lod_check_interval: 0.25,
    warmup_step: 1.0 / 30.0,
});

impl SimulationConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.pool.validate()?;
        if !(self.max_delta_time > 0.0) {
            return Err(ConfigError::ValidationError(
                "max_delta_time must be positive".to_string(),
            ));
        }
        if self.lod_check_interval < 0.0 {
            return Err(ConfigError::ValidationError(
                "lod_check_interval must not be negative".to_string(),
            ));
        }
        if !(self.warmup_step > 0.0) {
            return Err(ConfigError::ValidationError(
                "warmup_step must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// 粒子池增长策略
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// 模板未指定时的初始容量
    pub initial_capacity: u32,

    /// 几何增长系数（1.25 = 每次至少增长 25%）
    pub growth_factor: f32,

    /// 每个发射器的绝对上限，模板的 `max_particles` 不能超过它
    pub max_particles_per_emitter: u32,
}

impl_default!(PoolConfig {
    initial_capacity: 32,
    growth_factor: 1.25,
    max_particles_per_emitter: 1_000_000,
});

impl PoolConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.growth_factor > 1.0) {
            return Err(ConfigError::ValidationError(
                "pool growth_factor must be greater than 1".to_string(),
            ));
        }
        if self.max_particles_per_emitter == 0 {
            return Err(ConfigError::ValidationError(
                "max_particles_per_emitter must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// 从当前容量出发，计算满足 `required` 的新容量
    ///
    /// 结果被 `limit` 截断，可能小于 `required`。
    pub fn grow_target(&self, current: usize, required: usize, limit: usize) -> usize {
        let geometric = (current as f32 * self.growth_factor).ceil() as usize;
        required
            .max(geometric)
            .max(self.initial_capacity as usize)
            .min(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grow_target_geometric() {
        let pool = PoolConfig::default();
        // 需求较小时按 25% 增长
        assert_eq!(pool.grow_target(100, 101, usize::MAX), 125);
        // 突发需求超过几何增长时直接满足需求
        assert_eq!(pool.grow_target(100, 400, usize::MAX), 400);
        // 硬上限
        assert_eq!(pool.grow_target(100, 400, 150), 150);
    }

    #[test]
    fn test_grow_target_respects_initial_capacity() {
        let pool = PoolConfig::default();
        assert_eq!(pool.grow_target(0, 1, usize::MAX), 32);
        assert_eq!(pool.grow_target(0, 1, 4), 4);
    }
}
