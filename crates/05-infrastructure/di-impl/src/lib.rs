//! # 依赖注入具体实现
//!
//! 提供具体的依赖注入容器、定义注册表、依赖图解析器、作用域管理和生命周期编排实现

pub mod container;
pub mod graph;
pub mod lifecycle;
pub mod registry;
pub mod scope;

pub use container::{DiContainer, DiContainerBuilder};
pub use graph::DependencyGraphResolverImpl;
pub use lifecycle::{LifecycleOrchestrator, ManagedInstance};
pub use registry::DefinitionRegistryImpl;
pub use scope::{ContextActivation, ScopeManager};
