//! # Infrastructure Common
//!
//! 这个 crate 提供了 Lorn ADSP 平台 IoC 容器共用的基础类型。
//!
//! ## 核心内容
//!
//! - [`ScopeKind`] / [`ScopeContext`] - 作用域与作用域上下文
//! - [`LifecycleState`] - 组件实例生命周期状态机
//! - [`DependencyError`] - 依赖注入错误
//! - [`ComponentMetadata`] - 组件诊断元数据

pub mod component;
pub mod errors;
pub mod lifecycle;
pub mod metadata;

pub use component::*;
pub use errors::*;
pub use lifecycle::*;
pub use metadata::*;
