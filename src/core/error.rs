//! 统一错误处理模块
//!
//! 提供粒子引擎范围内的统一错误类型定义
//!
//! ## 错误类型分层
//!
//! - **配置错误** (`TemplateError`): 模板/LOD 结构错误，在实例初始化时致命
//! - **池错误** (`PoolError`): 粒子池分配失败或越界访问
//! - **渲染错误** (`RenderError`): 渲染线程侧的填充、队列错误
//!
//! 模拟侧错误在本地处理（截断或跳过），不会以错误形式跨线程传播。

use crate::config::ConfigError;
use crate::particles::modules::ModuleKind;
use thiserror::Error;

/// 引擎核心错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Thread error: {0}")]
    Thread(String),
}

/// 发射器模板配置错误
///
/// 这些错误只在实例初始化时产生，出错的实例永远不会被 tick。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("Emitter '{emitter}' has no LOD levels")]
    NoLodLevels { emitter: String },

    #[error("Emitter '{emitter}' LOD {lod} is missing its required module")]
    MissingRequiredModule { emitter: String, lod: usize },

    #[error("Emitter '{emitter}' LOD {lod} is missing its spawn module")]
    MissingSpawnModule { emitter: String, lod: usize },

    #[error("Emitter '{emitter}' LOD {lod}: {module:?} requires {required:?} earlier in the module stack")]
    MissingModuleDependency {
        emitter: String,
        lod: usize,
        module: ModuleKind,
        required: ModuleKind,
    },

    #[error("Emitter '{emitter}' LOD {lod} has {found} modules, expected {expected}")]
    LodModuleCountMismatch {
        emitter: String,
        lod: usize,
        expected: usize,
        found: usize,
    },

    #[error("Emitter '{emitter}' LOD {lod} slot {slot}: expected {expected:?}, found {found:?}")]
    LodModuleKindMismatch {
        emitter: String,
        lod: usize,
        slot: usize,
        expected: ModuleKind,
        found: ModuleKind,
    },

    #[error("Invalid LOD index {index} (emitter has {count} levels)")]
    InvalidLodIndex { index: usize, count: usize },

    #[error("Emitter '{emitter}': {reason}")]
    InvalidParameter { emitter: String, reason: String },
}

/// 粒子池错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Failed to allocate {requested} particles of stride {stride} bytes")]
    AllocationFailed { requested: usize, stride: usize },

    #[error("Active index {index} out of range (active count {active})")]
    IndexOutOfRange { index: usize, active: usize },
}

/// 渲染侧错误
///
/// 需要 `Clone`：同一填充结果可能被多个绘制调用观察。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Buffer fill failed for emitter {emitter}: {reason}")]
    FillFailed { emitter: usize, reason: String },

    #[error("Buffer fill task panicked for emitter {emitter}")]
    FillPanicked { emitter: usize },

    #[error("Buffer size mismatch: expected {expected} bytes, wrote {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("Scene proxy {0} not found")]
    ProxyNotFound(u64),

    #[error("Render command queue closed")]
    QueueClosed,

    #[error("Failed to spawn fill worker: {0}")]
    WorkerSpawn(String),
}

/// 引擎结果类型别名
pub type EngineResult<T> = Result<T, EngineError>;

/// 模板结果类型别名
pub type TemplateResult<T> = Result<T, TemplateError>;

/// 粒子池结果类型别名
pub type PoolResult<T> = Result<T, PoolError>;

/// 渲染结果类型别名
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let pool_err = PoolError::AllocationFailed {
            requested: 10,
            stride: 128,
        };
        let engine_err: EngineError = pool_err.into();
        assert!(matches!(engine_err, EngineError::Pool(_)));
    }

    #[test]
    fn test_error_messages() {
        let err = TemplateError::MissingRequiredModule {
            emitter: "sparks".to_string(),
            lod: 1,
        };
        assert_eq!(
            err.to_string(),
            "Emitter 'sparks' LOD 1 is missing its required module"
        );

        let err = RenderError::BufferSizeMismatch {
            expected: 64,
            actual: 32,
        };
        assert!(err.to_string().contains("expected 64"));
    }
}
