/// 统一配置系统
///
/// 提供TOML/JSON配置文件、环境变量覆盖和配置校验
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub mod render;
pub mod simulation;

pub use render::RenderConfig;
pub use simulation::{PoolConfig, SimulationConfig};

/// 引擎配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 粒子引擎主配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 模拟线程配置
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// 渲染线程配置
    #[serde(default)]
    pub render: RenderConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 保存为JSON文件
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("PARTICLE_WORKER_THREADS") {
            if let Ok(threads) = val.parse() {
                self.render.worker_threads = threads;
            }
        }
        if let Ok(val) = env::var("PARTICLE_POOL_GROWTH") {
            if let Ok(growth) = val.parse() {
                self.simulation.pool.growth_factor = growth;
            }
        }
        if let Ok(val) = env::var("PARTICLE_MAX_PER_EMITTER") {
            if let Ok(max) = val.parse() {
                self.simulation.pool.max_particles_per_emitter = max;
            }
        }
        if let Ok(val) = env::var("PARTICLE_LOG_LEVEL") {
            if let Some(level) = LogLevel::parse(&val) {
                self.logging.level = level;
            }
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.simulation.validate()?;
        self.render.validate()?;
        Ok(())
    }

    /// 加载配置文件，失败时回退到默认配置
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::from_toml_file(path) {
            Ok(config) => {
                tracing::info!(target: "config", path = %path.display(), "Loaded config");
                config
            }
            Err(e) => {
                tracing::warn!(
                    target: "config",
                    path = %path.display(),
                    error = %e,
                    "Using default configuration"
                );
                Self::default()
            }
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,

    /// 是否输出 target
    pub with_target: bool,

    /// 是否输出线程名（模拟线程/渲染线程/填充工作线程）
    pub with_thread_names: bool,
}

use crate::impl_default;

impl_default!(LoggingConfig {
    level: LogLevel::Info,
    with_target: true,
    with_thread_names: true,
});

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl LogLevel {
    /// 解析环境变量中的级别字符串（大小写不敏感）
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// `EnvFilter` 指令
    pub fn as_filter_directive(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            config.simulation.pool.growth_factor,
            parsed.simulation.pool.growth_factor
        );
        assert_eq!(config.render.worker_threads, parsed.render.worker_threads);
    }

    #[test]
    fn test_json_serialization() {
        let config = EngineConfig::default();
        let json_str = serde_json::to_string(&config).unwrap();
        let parsed = EngineConfig::from_json_str(&json_str).unwrap();
        assert_eq!(
            config.render.scratch_initial_capacity,
            parsed.render.scratch_initial_capacity
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed = EngineConfig::from_toml_str(
            r#"
            [render]
            worker_threads = 3
            parallel_fill = false
            min_particles_for_async_fill = 0
            scratch_initial_capacity = 128
            "#,
        )
        .unwrap();
        assert_eq!(parsed.render.worker_threads, 3);
        assert!(!parsed.render.parallel_fill);
        assert_eq!(parsed.simulation.pool.growth_factor, 1.25);
    }

    #[test]
    fn test_invalid_growth_rejected() {
        let mut config = EngineConfig::default();
        config.simulation.pool.growth_factor = 1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("loud"), None);
    }
}
