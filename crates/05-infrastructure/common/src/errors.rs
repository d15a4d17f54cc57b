//! 错误类型定义

use crate::lifecycle::{LifecyclePhase, LifecycleState};
use thiserror::Error;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置解析失败: {source}")]
    ParseError {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("组件清单引用了未知工厂: {component} -> {factory}")]
    UnknownFactory { component: String, factory: String },

    #[error("组件清单无效: {component}, 原因: {message}")]
    InvalidManifest { component: String, message: String },
}

/// 依赖注入错误类型
///
/// 所有变体都可以克隆，失败状态的组件在后续查找中返回同一个错误。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    #[error("组件重复注册: {name}")]
    DuplicateDefinition { name: String },

    #[error("组件未注册: {name}")]
    NotFound { name: String },

    #[error("检测到循环依赖: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    #[error("依赖存在歧义: {consumer} 依赖 {reference}, 候选组件: {candidates:?}")]
    AmbiguousDependency {
        consumer: String,
        reference: String,
        candidates: Vec<String>,
    },

    #[error("依赖无法解析: {consumer} -> {reference}, 原因: {reason}")]
    UnresolvedDependency {
        consumer: String,
        reference: String,
        reason: String,
    },

    #[error("作用域未激活: 组件 {component} 需要 {scope} 作用域")]
    ScopeNotActive { component: String, scope: String },

    #[error("作用域不匹配: 组件 {component}, 期望 {expected}, 实际 {actual}")]
    ScopeMismatch {
        component: String,
        expected: String,
        actual: String,
    },

    #[error("生命周期钩子失败: {component} 在 {phase} 阶段, 原因: {message}")]
    LifecycleHookFailure {
        component: String,
        phase: LifecyclePhase,
        message: String,
    },

    #[error("非法的生命周期状态转换: {component} {from:?} -> {to:?}")]
    InvalidTransition {
        component: String,
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("生命周期钩子中禁止创建新组件: {component}")]
    HookReentrancy { component: String },

    #[error("类型不匹配: 组件 {component} 不是 {expected}")]
    TypeMismatch { component: String, expected: String },

    #[error("解析深度超过上限 {limit}: {component}")]
    ResolutionDepthExceeded { component: String, limit: usize },

    #[error("容器已关闭")]
    ContainerClosed,
}

impl DependencyError {
    /// 创建依赖无法解析错误
    pub fn unresolved(
        consumer: impl Into<String>,
        reference: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnresolvedDependency {
            consumer: consumer.into(),
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// 创建钩子失败错误
    pub fn hook_failure(
        component: impl Into<String>,
        phase: LifecyclePhase,
        message: impl Into<String>,
    ) -> Self {
        Self::LifecycleHookFailure {
            component: component.into(),
            phase,
            message: message.into(),
        }
    }

    /// 是否属于构建期的配置缺陷
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateDefinition { .. }
                | Self::CircularDependency { .. }
                | Self::AmbiguousDependency { .. }
                | Self::UnresolvedDependency { .. }
                | Self::ScopeMismatch { .. }
        )
    }
}

/// 生命周期管理错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("作用域不存在: {scope_id}")]
    ScopeNotFound { scope_id: String },

    #[error("销毁未全部成功, {} 个组件失败: {failures:?}", failures.len())]
    TeardownIncomplete { failures: Vec<DependencyError> },
}

/// 基础设施错误类型
#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("配置错误: {source}")]
    ConfigError {
        #[from]
        source: ConfigError,
    },

    #[error("依赖注入错误: {source}")]
    DependencyError {
        #[from]
        source: DependencyError,
    },

    #[error("生命周期错误: {source}")]
    LifecycleError {
        #[from]
        source: LifecycleError,
    },

    #[error("基础设施启动失败: {message}")]
    BootstrapFailed { message: String },
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type DependencyResult<T> = Result<T, DependencyError>;
pub type LifecycleResult<T> = Result<T, LifecycleError>;
pub type InfrastructureResult<T> = Result<T, InfrastructureError>;
