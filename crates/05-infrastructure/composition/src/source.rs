//! 组件定义源
//!
//! 定义源负责向启动器提供组件定义。代码中构造的定义使用 [`StaticDefinitionSource`]，
//! 配置文件中的组件清单使用 [`ManifestDefinitionSource`]，清单条目通过
//! [`FactoryCatalog`] 中的键绑定到代码里登记的模板定义。

use crate::settings::{ComponentManifest, DependencyManifest};
use async_trait::async_trait;
use di_abstractions::{ComponentDefinition, Condition, DependencyRef};
use infrastructure_common::{ConfigError, InfrastructureError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// 组件定义源 trait
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    /// 定义源名称，用于日志
    fn name(&self) -> &str;

    /// 加载组件定义
    async fn load_definitions(&self) -> Result<Vec<ComponentDefinition>, InfrastructureError>;
}

/// 由代码直接提供的定义源
pub struct StaticDefinitionSource {
    name: String,
    definitions: Vec<ComponentDefinition>,
}

impl StaticDefinitionSource {
    /// 创建静态定义源
    pub fn new(name: impl Into<String>, definitions: Vec<ComponentDefinition>) -> Self {
        Self {
            name: name.into(),
            definitions,
        }
    }
}

#[async_trait]
impl DefinitionSource for StaticDefinitionSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load_definitions(&self) -> Result<Vec<ComponentDefinition>, InfrastructureError> {
        Ok(self.definitions.clone())
    }
}

/// 工厂目录
///
/// 键到模板定义的映射。模板携带工厂、钩子和默认装配，清单条目在此基础上派生出
/// 具名的组件定义。
#[derive(Default)]
pub struct FactoryCatalog {
    templates: HashMap<String, ComponentDefinition>,
}

impl FactoryCatalog {
    /// 创建空目录
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记模板，同键的旧模板被替换
    pub fn register(&mut self, key: impl Into<String>, template: ComponentDefinition) -> &mut Self {
        self.templates.insert(key.into(), template);
        self
    }

    /// 链式登记模板
    pub fn with(mut self, key: impl Into<String>, template: ComponentDefinition) -> Self {
        self.register(key, template);
        self
    }

    /// 按键查找模板
    pub fn get(&self, key: &str) -> Option<&ComponentDefinition> {
        self.templates.get(key)
    }

    /// 模板数量
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// 目录是否为空
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// 按清单条目派生组件定义
    pub fn materialize(&self, manifest: &ComponentManifest) -> Result<ComponentDefinition, ConfigError> {
        if manifest.name.trim().is_empty() {
            return Err(invalid(manifest, "组件名称为空"));
        }

        let template = self
            .get(&manifest.factory)
            .ok_or_else(|| ConfigError::UnknownFactory {
                component: manifest.name.clone(),
                factory: manifest.factory.clone(),
            })?;

        let mut definition = template.clone().renamed(manifest.name.clone());

        if let Some(scope) = &manifest.scope {
            definition = definition.with_scope(scope.clone());
        }
        for capability in &manifest.provides {
            definition = definition.provides(capability.clone());
        }
        if manifest.primary {
            definition = definition.primary();
        }
        if manifest.lazy {
            definition = definition.lazy();
        }

        match manifest.profiles.as_slice() {
            [] => {}
            [expr] => definition = definition.when(Condition::profile_expr(expr)),
            exprs => {
                let any = exprs.iter().map(|e| Condition::profile_expr(e)).collect();
                definition = definition.when(Condition::AnyOf(any));
            }
        }
        if let Some(capability) = &manifest.on_missing_capability {
            definition = definition.when(Condition::on_missing_capability(capability.clone()));
        }
        if let Some(component) = &manifest.on_missing_component {
            definition = definition.when(Condition::on_missing_component(component.clone()));
        }
        if let Some(component) = &manifest.on_component {
            definition = definition.when(Condition::on_component(component.clone()));
        }
        if let Some(property) = &manifest.on_property {
            if property.key.is_empty() {
                return Err(invalid(manifest, "属性条件缺少 key"));
            }
            definition = definition.when(Condition::property(
                property.key.clone(),
                property.value.as_deref(),
            ));
        }

        for dependency in &manifest.depends_on {
            let dependency = dependency_ref(manifest, dependency)?;
            definition.dependencies.retain(|d| d.key() != dependency.key());
            definition = definition.depends_on(dependency);
        }

        for (key, value) in &manifest.properties {
            definition = definition.with_property(key.clone(), value.clone());
        }

        Ok(definition)
    }
}

fn dependency_ref(
    manifest: &ComponentManifest,
    dependency: &DependencyManifest,
) -> Result<DependencyRef, ConfigError> {
    let reference = match (&dependency.name, &dependency.capability) {
        (Some(name), None) => DependencyRef::name(name.clone()),
        (None, Some(capability)) => DependencyRef::capability(capability.clone()),
        (Some(_), Some(_)) => return Err(invalid(manifest, "依赖不能同时指定 name 和 capability")),
        (None, None) => return Err(invalid(manifest, "依赖必须指定 name 或 capability")),
    };
    Ok(if dependency.optional {
        reference.optional()
    } else {
        reference
    })
}

fn invalid(manifest: &ComponentManifest, message: &str) -> ConfigError {
    ConfigError::InvalidManifest {
        component: manifest.name.clone(),
        message: message.to_string(),
    }
}

/// 组件清单定义源
pub struct ManifestDefinitionSource {
    manifests: Vec<ComponentManifest>,
    catalog: Arc<FactoryCatalog>,
}

impl ManifestDefinitionSource {
    /// 创建清单定义源
    pub fn new(manifests: Vec<ComponentManifest>, catalog: Arc<FactoryCatalog>) -> Self {
        Self { manifests, catalog }
    }
}

#[async_trait]
impl DefinitionSource for ManifestDefinitionSource {
    fn name(&self) -> &str {
        "manifest"
    }

    async fn load_definitions(&self) -> Result<Vec<ComponentDefinition>, InfrastructureError> {
        let mut definitions = Vec::with_capacity(self.manifests.len());
        for manifest in &self.manifests {
            let definition = self.catalog.materialize(manifest)?;
            debug!("清单组件: {} <- {}", definition.name, manifest.factory);
            definitions.push(definition);
        }
        Ok(definitions)
    }
}
