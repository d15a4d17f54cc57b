//! 组件定义注册表实现

use di_abstractions::{ComponentDefinition, DefinitionRegistry};
use infrastructure_common::DependencyError;
use std::collections::HashMap;
use tracing::{debug, warn};

/// 组件定义注册表实现
///
/// 定义按注册顺序保存，名称与能力各维护一个索引。
#[derive(Debug, Default)]
pub struct DefinitionRegistryImpl {
    /// 注册的组件定义
    definitions: Vec<ComponentDefinition>,
    /// 名称索引
    by_name: HashMap<String, usize>,
    /// 能力索引
    by_capability: HashMap<String, Vec<usize>>,
}

impl DefinitionRegistryImpl {
    /// 创建新的注册表
    pub fn new() -> Self {
        Self::default()
    }
}

impl DefinitionRegistry for DefinitionRegistryImpl {
    fn register(&mut self, definition: ComponentDefinition) -> Result<(), DependencyError> {
        if self.by_name.contains_key(&definition.name) {
            warn!("组件重复注册: {}", definition.name);
            return Err(DependencyError::DuplicateDefinition {
                name: definition.name,
            });
        }

        debug!(
            "注册组件: {} ({}, 作用域: {})",
            definition.name, definition.metadata.type_name, definition.scope
        );

        let index = self.definitions.len();
        for capability in &definition.capabilities {
            self.by_capability
                .entry(capability.clone())
                .or_default()
                .push(index);
        }
        self.by_name.insert(definition.name.clone(), index);
        self.definitions.push(definition);
        Ok(())
    }

    fn lookup_by_name(&self, name: &str) -> Result<&ComponentDefinition, DependencyError> {
        self.by_name
            .get(name)
            .map(|&index| &self.definitions[index])
            .ok_or_else(|| DependencyError::NotFound {
                name: name.to_string(),
            })
    }

    fn lookup_by_capability(&self, capability: &str) -> Vec<&ComponentDefinition> {
        self.by_capability
            .get(capability)
            .map(|indexes| indexes.iter().map(|&i| &self.definitions[i]).collect())
            .unwrap_or_default()
    }

    fn definitions(&self) -> &[ComponentDefinition] {
        &self.definitions
    }
}
