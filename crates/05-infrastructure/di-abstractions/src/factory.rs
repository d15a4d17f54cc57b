//! 工厂依赖集合
//!
//! 工厂被调用时收到 [`Dependencies`]，其中每个声明的依赖都已按其键准备好：
//! 直接实例、上下文代理目标、被推迟的可选依赖或缺失。

use crate::proxy::{LazyRef, ProxyTarget, ScopedProxy};
use crate::resolver::ComponentResolver;
use infrastructure_common::{downcast_instance, DependencyError, InstanceRef};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// 注入的依赖值
#[derive(Clone)]
pub enum InjectedDependency {
    /// 已就绪的实例
    Instance {
        component: String,
        instance: InstanceRef,
    },
    /// 上下文作用域依赖，通过代理在每次使用时重新解析
    Contextual(ProxyTarget),
    /// 可选依赖正在创建中，构造时不可用
    Deferred { component: String },
    /// 可选依赖不存在
    Absent,
}

impl std::fmt::Debug for InjectedDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Instance { component, .. } => write!(f, "Instance({})", component),
            Self::Contextual(target) => write!(f, "Contextual({})", target.component),
            Self::Deferred { component } => write!(f, "Deferred({})", component),
            Self::Absent => f.write_str("Absent"),
        }
    }
}

/// 工厂依赖集合
#[derive(Clone)]
pub struct Dependencies {
    consumer: String,
    entries: HashMap<String, InjectedDependency>,
    resolver: Weak<dyn ComponentResolver>,
}

impl Dependencies {
    /// 创建依赖集合
    pub fn new(consumer: impl Into<String>, resolver: Weak<dyn ComponentResolver>) -> Self {
        Self {
            consumer: consumer.into(),
            entries: HashMap::new(),
            resolver,
        }
    }

    /// 创建不关联容器的依赖集合
    pub fn detached(consumer: impl Into<String>) -> Self {
        let resolver: Weak<dyn ComponentResolver> = Weak::<DetachedResolver>::new();
        Self::new(consumer, resolver)
    }

    /// 添加依赖值
    pub fn insert(&mut self, key: impl Into<String>, dependency: InjectedDependency) {
        self.entries.insert(key.into(), dependency);
    }

    /// 消费方组件名称
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// 按键取得原始依赖值
    pub fn entry(&self, key: &str) -> Option<&InjectedDependency> {
        self.entries.get(key)
    }

    /// 获取必需依赖
    pub fn get<T>(&self, key: &str) -> Result<Arc<T>, DependencyError>
    where
        T: Send + Sync + 'static,
    {
        match self.lookup(key)? {
            InjectedDependency::Instance {
                component,
                instance,
            } => downcast_instance(component, instance.clone()),
            InjectedDependency::Contextual(target) => Err(self.contextual_mismatch(target)),
            InjectedDependency::Deferred { component } => Err(DependencyError::unresolved(
                &self.consumer,
                key,
                format!("{} 正在创建中，请使用 lazy 引用", component),
            )),
            InjectedDependency::Absent => {
                Err(DependencyError::unresolved(&self.consumer, key, "可选依赖不存在"))
            }
        }
    }

    /// 获取可选依赖，缺失或被推迟时返回 `None`
    pub fn optional<T>(&self, key: &str) -> Result<Option<Arc<T>>, DependencyError>
    where
        T: Send + Sync + 'static,
    {
        match self.lookup(key)? {
            InjectedDependency::Instance {
                component,
                instance,
            } => downcast_instance(component, instance.clone()).map(Some),
            InjectedDependency::Contextual(target) => Err(self.contextual_mismatch(target)),
            InjectedDependency::Deferred { .. } | InjectedDependency::Absent => Ok(None),
        }
    }

    /// 获取上下文作用域依赖的代理
    pub fn proxy<T>(&self, key: &str) -> Result<ScopedProxy<T>, DependencyError>
    where
        T: Send + Sync + 'static,
    {
        match self.lookup(key)? {
            InjectedDependency::Contextual(target) => Ok(ScopedProxy::new(target.clone())),
            InjectedDependency::Instance { component, .. } => Err(DependencyError::ScopeMismatch {
                component: component.clone(),
                expected: "上下文代理".to_string(),
                actual: "直接注入的实例".to_string(),
            }),
            InjectedDependency::Deferred { component } => Err(DependencyError::unresolved(
                &self.consumer,
                key,
                format!("{} 不是上下文作用域组件", component),
            )),
            InjectedDependency::Absent => {
                Err(DependencyError::unresolved(&self.consumer, key, "可选依赖不存在"))
            }
        }
    }

    /// 获取延迟引用，首次使用时才解析，用于打破可选依赖环
    pub fn lazy<T>(&self, key: &str) -> Result<LazyRef<T>, DependencyError>
    where
        T: Send + Sync + 'static,
    {
        match self.lookup(key)? {
            InjectedDependency::Instance {
                component,
                instance,
            } => {
                let value = downcast_instance(component, instance.clone())?;
                Ok(LazyRef::resolved(component.clone(), self.resolver.clone(), value))
            }
            InjectedDependency::Deferred { component } => {
                Ok(LazyRef::new(component.clone(), self.resolver.clone()))
            }
            InjectedDependency::Contextual(target) => Err(self.contextual_mismatch(target)),
            InjectedDependency::Absent => {
                Err(DependencyError::unresolved(&self.consumer, key, "可选依赖不存在"))
            }
        }
    }

    fn lookup(&self, key: &str) -> Result<&InjectedDependency, DependencyError> {
        self.entries
            .get(key)
            .ok_or_else(|| DependencyError::unresolved(&self.consumer, key, "依赖未在定义中声明"))
    }

    fn contextual_mismatch(&self, target: &ProxyTarget) -> DependencyError {
        DependencyError::ScopeMismatch {
            component: target.component.clone(),
            expected: format!("{} 作用域之外需通过代理访问", target.scope),
            actual: format!("{} 直接获取", self.consumer),
        }
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependencies")
            .field("consumer", &self.consumer)
            .field("entries", &self.entries)
            .finish()
    }
}

/// 未关联容器时使用的占位解析器，从不被升级
struct DetachedResolver;

impl ComponentResolver for DetachedResolver {
    fn resolve_named(&self, _name: &str) -> Result<InstanceRef, DependencyError> {
        Err(DependencyError::ContainerClosed)
    }

    fn resolve_capability(&self, _capability: &str) -> Result<InstanceRef, DependencyError> {
        Err(DependencyError::ContainerClosed)
    }

    fn can_resolve(&self, _name: &str) -> bool {
        false
    }
}
