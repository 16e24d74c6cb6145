use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 渲染线程配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// 缓冲填充工作线程数（0 = 自动，按 CPU 核心数减一）
    pub worker_threads: usize,

    /// 是否把每视图的缓冲填充派发到工作线程
    pub parallel_fill: bool,

    /// 粒子数低于该值的发射器直接在渲染线程内填充
    pub min_particles_for_async_fill: usize,

    /// 排序临时缓冲区的初始容量
    pub scratch_initial_capacity: usize,
}

impl_default!(RenderConfig {
    worker_threads: 0,
    parallel_fill: true,
    min_particles_for_async_fill: 16,
    scratch_initial_capacity: 64,
});

impl RenderConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.scratch_initial_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "scratch_initial_capacity must be non-zero".to_string(),
            ));
        }
        if self.worker_threads > 256 {
            return Err(ConfigError::ValidationError(
                "worker_threads must not exceed 256".to_string(),
            ));
        }
        Ok(())
    }

    /// 实际使用的工作线程数
    ///
    /// 关闭并行填充时返回 0，所有填充都在 ensure-complete 时同步执行。
    pub fn resolved_worker_threads(&self) -> usize {
        if !self.parallel_fill {
            return 0;
        }
        if self.worker_threads > 0 {
            self.worker_threads
        } else {
            num_cpus::get().saturating_sub(1).max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_worker_threads() {
        let mut config = RenderConfig::default();
        assert!(config.resolved_worker_threads() >= 1);

        config.worker_threads = 3;
        assert_eq!(config.resolved_worker_threads(), 3);

        config.parallel_fill = false;
        assert_eq!(config.resolved_worker_threads(), 0);
    }
}
