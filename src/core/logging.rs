//! 日志初始化
//!
//! 基于 `tracing_subscriber` 的 fmt 输出，`RUST_LOG` 优先于配置文件中的级别。

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// 初始化日志系统
///
/// 重复调用是安全的：全局订阅者已存在时直接返回 `false`。
pub fn initialize_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_filter_directive()));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_thread_names(config.with_thread_names)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(target: "engine", level = ?config.level, "Logging initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_logging_idempotent() {
        let config = LoggingConfig::default();
        let _ = initialize_logging(&config);
        // 第二次调用不能 panic，且必然失败
        assert!(!initialize_logging(&config));
    }
}
