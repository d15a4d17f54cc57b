//! 容器启动配置
//!
//! 配置文件（yaml/json/toml，按扩展名识别）与 `LORN_IOC` 前缀的环境变量叠加，
//! 环境变量使用 `__` 分隔层级，例如 `LORN_IOC_CONTAINER__EAGER_SINGLETONS=false`。

use crate::logging::LoggingSettings;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use di_abstractions::ContainerConfig;
use infrastructure_common::{ConfigError, ScopeKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "LORN_IOC";

/// 容器启动配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    /// 容器配置
    pub container: ContainerConfig,
    /// 日志配置
    pub logging: LoggingSettings,
    /// 组件清单
    pub components: Vec<ComponentManifest>,
}

impl ContainerSettings {
    /// 从配置文件加载，并叠加环境变量
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        debug!("加载容器配置文件: {}", path.display());
        Self::from_builder(Config::builder().add_source(File::from(path).required(true)))
    }

    /// 仅从环境变量加载
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_builder(Config::builder())
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings = builder
            .add_source(environment())
            .build()
            .map_err(parse_error)?;

        let settings: Self = settings.try_deserialize().map_err(parse_error)?;
        debug!(
            "容器配置加载完成: {} 个组件清单, 激活配置档 {:?}",
            settings.components.len(),
            settings.container.active_profiles
        );
        Ok(settings)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("container.active_profiles")
}

fn parse_error(e: config::ConfigError) -> ConfigError {
    ConfigError::ParseError {
        source: Box::new(e),
    }
}

/// 组件清单条目
///
/// 清单只描述装配关系，组件的构造逻辑来自 [`crate::FactoryCatalog`] 中登记的模板。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentManifest {
    /// 组件名称
    pub name: String,
    /// 工厂目录中的键
    pub factory: String,
    /// 作用域，未指定时沿用模板
    pub scope: Option<ScopeKind>,
    /// 额外提供的能力
    pub provides: Vec<String>,
    /// 同一能力有多个候选时优先
    pub primary: bool,
    /// 单例延迟到首次查找时创建
    pub lazy: bool,
    /// 配置档表达式，`!x` 表示取反，多个表达式任一满足即可
    pub profiles: Vec<String>,
    /// 没有其他组件提供该能力时激活
    pub on_missing_capability: Option<String>,
    /// 指定组件未激活时激活
    pub on_missing_component: Option<String>,
    /// 指定组件已激活时激活
    pub on_component: Option<String>,
    /// 属性条件
    pub on_property: Option<PropertyManifest>,
    /// 依赖声明，与模板中同键的依赖会被覆盖
    pub depends_on: Vec<DependencyManifest>,
    /// 诊断属性
    pub properties: BTreeMap<String, String>,
}

/// 属性条件
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyManifest {
    /// 属性键
    pub key: String,
    /// 期望值，未指定时只要求属性存在
    pub value: Option<String>,
}

/// 依赖声明，`name` 与 `capability` 必须且只能指定一个
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyManifest {
    /// 按名称引用
    pub name: Option<String>,
    /// 按能力引用
    pub capability: Option<String>,
    /// 是否为可选依赖
    pub optional: bool,
}
