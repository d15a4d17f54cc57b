//! 组件生命周期管理

use serde::{Deserialize, Serialize};
use std::fmt;

/// 组件作用域类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScopeKind {
    /// 单例模式 - 整个容器生命周期内只创建一个实例
    Singleton,
    /// 原型模式 - 每次查找都创建新实例，容器不持有
    Prototype,
    /// 上下文模式 - 在同一个作用域上下文（如一次请求）内共享实例
    Contextual(String),
}

impl ScopeKind {
    /// 请求作用域
    pub fn request() -> Self {
        Self::Contextual("request".to_string())
    }

    /// 会话作用域
    pub fn session() -> Self {
        Self::Contextual("session".to_string())
    }

    /// 上下文作用域的类别名
    pub fn context_kind(&self) -> Option<&str> {
        match self {
            Self::Contextual(kind) => Some(kind),
            _ => None,
        }
    }

    /// 是否为上下文作用域
    pub fn is_contextual(&self) -> bool {
        matches!(self, Self::Contextual(_))
    }
}

impl Default for ScopeKind {
    fn default() -> Self {
        Self::Singleton
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singleton => f.write_str("singleton"),
            Self::Prototype => f.write_str("prototype"),
            Self::Contextual(kind) => f.write_str(kind),
        }
    }
}

/// 按名称解析作用域，不区分大小写；上下文类别统一为小写
impl From<String> for ScopeKind {
    fn from(value: String) -> Self {
        let kind = value.trim().to_ascii_lowercase();
        match kind.as_str() {
            "singleton" => Self::Singleton,
            "prototype" | "transient" => Self::Prototype,
            _ => Self::Contextual(kind),
        }
    }
}

impl From<&str> for ScopeKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<ScopeKind> for String {
    fn from(value: ScopeKind) -> Self {
        value.to_string()
    }
}

/// 作用域上下文
///
/// 由外部调用方通过 `enter_context` / `exit_context` 显式创建和销毁，
/// 容器不会自行推断上下文边界。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeContext {
    pub id: uuid::Uuid,
    pub kind: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ScopeContext {
    /// 创建新作用域上下文
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            kind: kind.into(),
            created_at: chrono::Utc::now(),
        }
    }
}

impl fmt::Display for ScopeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// 组件实例生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// 未初始化
    Uninitialized,
    /// 已实例化
    Instantiated,
    /// 依赖已注入
    Injected,
    /// 初始化钩子已执行
    PostInitialized,
    /// 可用
    Ready,
    /// 销毁中
    PreDestroy,
    /// 已销毁
    Destroyed,
    /// 创建失败（终止状态）
    Failed,
}

impl LifecycleState {
    /// 严格顺序下的下一个状态
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Uninitialized => Some(Self::Instantiated),
            Self::Instantiated => Some(Self::Injected),
            Self::Injected => Some(Self::PostInitialized),
            Self::PostInitialized => Some(Self::Ready),
            Self::Ready => Some(Self::PreDestroy),
            Self::PreDestroy => Some(Self::Destroyed),
            Self::Destroyed | Self::Failed => None,
        }
    }

    /// 检查状态转换是否合法
    pub fn can_transition_to(self, target: Self) -> bool {
        if target == Self::Failed {
            return matches!(
                self,
                Self::Uninitialized | Self::Instantiated | Self::Injected | Self::PostInitialized
            );
        }
        self.next() == Some(target)
    }

    /// 是否为终止状态
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Destroyed | Self::Failed)
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::Uninitialized
    }
}

/// 生命周期阶段，用于标记失败发生的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecyclePhase {
    /// 工厂实例化
    Instantiate,
    /// setter 注入
    Inject,
    /// 初始化钩子
    PostInit,
    /// 销毁钩子
    PreDestroy,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Instantiate => "instantiate",
            Self::Inject => "inject",
            Self::PostInit => "post-init",
            Self::PreDestroy => "pre-destroy",
        };
        f.write_str(name)
    }
}
