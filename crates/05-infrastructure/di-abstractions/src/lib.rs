//! # Dependency Injection Abstractions
//!
//! 依赖注入抽象层，定义组件定义、依赖解析和容器的核心接口。
//!
//! ## 核心接口
//!
//! - [`ComponentDefinition`] - 组件定义（标识、作用域、依赖、工厂、钩子）
//! - [`DefinitionRegistry`] - 组件定义注册表接口
//! - [`DependencyGraphResolver`] - 依赖图解析器接口
//! - [`ComponentResolver`] - 运行期组件查找接口
//! - [`IocContainer`] - 容器接口
//! - [`ScopedProxy`] / [`LazyRef`] - 间接引用

pub mod condition;
pub mod container;
pub mod definition;
pub mod factory;
pub mod proxy;
pub mod registry;
pub mod resolver;

pub use condition::*;
pub use container::*;
pub use definition::*;
pub use factory::*;
pub use proxy::*;
pub use registry::*;
pub use resolver::*;
