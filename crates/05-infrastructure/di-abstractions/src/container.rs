//! 依赖注入容器抽象接口
//!
//! 提供依赖注入容器的核心抽象

use crate::definition::ComponentDefinition;
use crate::resolver::ComponentResolver;
use infrastructure_common::{
    downcast_instance, DependencyError, LifecycleError, ScopeContext,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// 依赖注入容器 trait
pub trait IocContainer: ComponentResolver {
    /// 上下文激活守卫类型
    type Activation;

    /// 进入一个新的上下文并在当前线程激活
    fn enter_context(&self, kind: &str) -> ScopeContext;

    /// 在当前线程激活一个已存在的上下文，守卫释放时取消激活
    fn activate(&self, context: &ScopeContext) -> Result<Self::Activation, LifecycleError>;

    /// 退出上下文，销毁其中创建的所有实例
    fn exit_context(&self, context: &ScopeContext) -> Result<(), LifecycleError>;

    /// 关闭容器，按创建的逆序销毁单例
    fn shutdown(&self) -> Result<(), LifecycleError>;

    /// 容器统计信息
    fn stats(&self) -> ContainerStats;

    /// 按名称解析类型化组件
    fn get<T>(&self, name: &str) -> Result<Arc<T>, DependencyError>
    where
        Self: Sized,
        T: Send + Sync + 'static,
    {
        downcast_instance(name, self.resolve_named(name)?)
    }

    /// 按能力解析类型化组件
    fn get_by_capability<T>(&self, capability: &str) -> Result<Arc<T>, DependencyError>
    where
        Self: Sized,
        T: Send + Sync + 'static,
    {
        downcast_instance(capability, self.resolve_capability(capability)?)
    }
}

/// 容器构建器 trait
pub trait ContainerBuilder: Sized {
    /// 关联的容器类型
    type Container: IocContainer;

    /// 添加组件定义
    fn register(&mut self, definition: ComponentDefinition) -> Result<&mut Self, DependencyError>;

    /// 设置容器配置
    fn with_config(self, config: ContainerConfig) -> Self;

    /// 构建容器：解析依赖图并创建非延迟的单例
    fn build(self) -> Result<Self::Container, DependencyError>;
}

/// 容器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// 激活的配置档
    pub active_profiles: Vec<String>,
    /// 条件求值使用的配置属性
    pub properties: HashMap<String, String>,
    /// 构建时是否创建非延迟的单例
    pub eager_singletons: bool,
    /// 是否拒绝钩子中触发的新组件创建
    pub reject_hook_lookups: bool,
    /// 最大解析深度
    pub max_resolution_depth: usize,
}

impl ContainerConfig {
    /// 添加激活的配置档
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.active_profiles.push(profile.into());
        self
    }

    /// 设置配置属性
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// 设置是否预先创建单例
    pub fn with_eager_singletons(mut self, eager: bool) -> Self {
        self.eager_singletons = eager;
        self
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            active_profiles: Vec::new(),
            properties: HashMap::new(),
            eager_singletons: true,
            reject_hook_lookups: true,
            max_resolution_depth: 100,
        }
    }
}

/// 容器统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerStats {
    /// 已注册组件数量
    pub registered_components: usize,
    /// 激活组件数量
    pub active_components: usize,
    /// 被条件排除的组件数量
    pub pruned_components: usize,
    /// 已就绪的单例数量
    pub ready_singletons: usize,
    /// 活跃上下文数量
    pub active_contexts: usize,
    /// 累计创建的实例数量
    pub created_instances: usize,
    /// 累计创建失败次数
    pub failed_creations: usize,
}
