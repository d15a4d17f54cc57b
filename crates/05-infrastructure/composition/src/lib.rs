//! # 容器组合层
//!
//! 负责把配置、日志和组件定义源组合起来，启动一个可用的 IoC 容器。
//!
//! ## 主要功能
//!
//! - **启动配置**: 使用 `config` 加载配置文件并叠加 `LORN_IOC` 前缀的环境变量
//! - **日志初始化**: 按配置初始化 `tracing-subscriber`
//! - **定义源**: 代码提供的静态定义与配置文件中的组件清单
//! - **启动器**: 按顺序加载定义源并构建容器
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use di_abstractions::{ComponentDefinition, IocContainer};
//! use infrastructure_composition::{ContainerBootstrapper, FactoryCatalog};
//!
//! struct Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = FactoryCatalog::new()
//!         .with("database", ComponentDefinition::new("database", |_| Ok(Database)));
//!
//!     let container = ContainerBootstrapper::from_file("config/container.yaml")?
//!         .with_catalog(catalog)
//!         .bootstrap()
//!         .await?;
//!
//!     let _db = container.get::<Database>("primary_db")?;
//!     container.shutdown()?;
//!     Ok(())
//! }
//! ```

pub mod bootstrapper;
pub mod logging;
pub mod settings;
pub mod source;


// 重新导出主要类型
pub use bootstrapper::ContainerBootstrapper;
pub use logging::{init_logging, LoggingSettings};
pub use settings::{
    ComponentManifest, ContainerSettings, DependencyManifest, PropertyManifest, ENV_PREFIX,
};
pub use source::{DefinitionSource, FactoryCatalog, ManifestDefinitionSource, StaticDefinitionSource};

// 重新导出错误类型
pub use infrastructure_common::InfrastructureError;
