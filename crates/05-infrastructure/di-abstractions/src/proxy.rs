//! 间接引用
//!
//! - [`ScopedProxy`]：上下文作用域组件注入到更长生命周期的消费方时使用，
//!   每次 `get` 都针对当前激活的上下文重新解析，不会把短生命周期实例绑定进长生命周期对象。
//! - [`LazyRef`]：首次使用时解析并缓存，用于打破可选依赖之间的环。
//!
//! 两者都只持有容器的弱引用，容器关闭后返回 [`DependencyError::ContainerClosed`]。

use crate::resolver::ComponentResolver;
use infrastructure_common::{downcast_instance, DependencyError};
use once_cell::sync::OnceCell;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

/// 代理目标
#[derive(Clone)]
pub struct ProxyTarget {
    /// 目标组件名称
    pub component: String,
    /// 目标组件的上下文作用域类别
    pub scope: String,
    /// 容器弱引用
    pub resolver: Weak<dyn ComponentResolver>,
}

impl ProxyTarget {
    /// 创建代理目标
    pub fn new(
        component: impl Into<String>,
        scope: impl Into<String>,
        resolver: Weak<dyn ComponentResolver>,
    ) -> Self {
        Self {
            component: component.into(),
            scope: scope.into(),
            resolver,
        }
    }
}

/// 上下文作用域代理
pub struct ScopedProxy<T> {
    target: ProxyTarget,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ScopedProxy<T>
where
    T: Send + Sync + 'static,
{
    /// 创建代理
    pub fn new(target: ProxyTarget) -> Self {
        Self {
            target,
            _marker: PhantomData,
        }
    }

    /// 针对当前线程激活的上下文解析实例
    pub fn get(&self) -> Result<Arc<T>, DependencyError> {
        let resolver = self
            .target
            .resolver
            .upgrade()
            .ok_or(DependencyError::ContainerClosed)?;
        let instance = resolver.resolve_named(&self.target.component)?;
        downcast_instance(&self.target.component, instance)
    }

    /// 目标组件名称
    pub fn component(&self) -> &str {
        &self.target.component
    }

    /// 目标作用域类别
    pub fn scope(&self) -> &str {
        &self.target.scope
    }
}

impl<T> Clone for ScopedProxy<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for ScopedProxy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedProxy")
            .field("component", &self.target.component)
            .field("scope", &self.target.scope)
            .finish()
    }
}

/// 延迟引用
pub struct LazyRef<T> {
    component: String,
    resolver: Weak<dyn ComponentResolver>,
    cell: Arc<OnceCell<Arc<T>>>,
}

impl<T> LazyRef<T>
where
    T: Send + Sync + 'static,
{
    /// 创建尚未解析的延迟引用
    pub fn new(component: impl Into<String>, resolver: Weak<dyn ComponentResolver>) -> Self {
        Self {
            component: component.into(),
            resolver,
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// 创建已解析的延迟引用
    pub fn resolved(
        component: impl Into<String>,
        resolver: Weak<dyn ComponentResolver>,
        value: Arc<T>,
    ) -> Self {
        Self {
            component: component.into(),
            resolver,
            cell: Arc::new(OnceCell::with_value(value)),
        }
    }

    /// 获取实例，首次调用时解析
    pub fn get(&self) -> Result<Arc<T>, DependencyError> {
        self.cell
            .get_or_try_init(|| {
                let resolver = self
                    .resolver
                    .upgrade()
                    .ok_or(DependencyError::ContainerClosed)?;
                let instance = resolver.resolve_named(&self.component)?;
                downcast_instance(&self.component, instance)
            })
            .cloned()
    }

    /// 是否已经解析
    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }

    /// 目标组件名称
    pub fn component(&self) -> &str {
        &self.component
    }
}

impl<T> Clone for LazyRef<T> {
    fn clone(&self) -> Self {
        Self {
            component: self.component.clone(),
            resolver: self.resolver.clone(),
            cell: self.cell.clone(),
        }
    }
}

impl<T> std::fmt::Debug for LazyRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyRef")
            .field("component", &self.component)
            .field("resolved", &self.cell.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrastructure_common::InstanceRef;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResolver {
        calls: AtomicUsize,
    }

    impl ComponentResolver for CountingResolver {
        fn resolve_named(&self, name: &str) -> Result<InstanceRef, DependencyError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(format!("{}#{}", name, call)))
        }

        fn resolve_capability(&self, capability: &str) -> Result<InstanceRef, DependencyError> {
            self.resolve_named(capability)
        }

        fn can_resolve(&self, _name: &str) -> bool {
            true
        }
    }

    #[test]
    fn test_proxy_resolves_on_every_use() {
        let resolver = Arc::new(CountingResolver {
            calls: AtomicUsize::new(0),
        });
        let weak: Weak<dyn ComponentResolver> = Arc::downgrade(&resolver) as Weak<dyn ComponentResolver>;
        let proxy = ScopedProxy::<String>::new(ProxyTarget::new("session_user", "session", weak));

        assert_eq!(*proxy.get().unwrap(), "session_user#0");
        assert_eq!(*proxy.get().unwrap(), "session_user#1");

        drop(resolver);
        assert_eq!(proxy.get().unwrap_err(), DependencyError::ContainerClosed);
    }

    #[test]
    fn test_lazy_ref_resolves_once() {
        let resolver = Arc::new(CountingResolver {
            calls: AtomicUsize::new(0),
        });
        let weak: Weak<dyn ComponentResolver> = Arc::downgrade(&resolver) as Weak<dyn ComponentResolver>;
        let lazy = LazyRef::<String>::new("audit", weak);
        let shared = lazy.clone();

        assert!(!lazy.is_resolved());
        assert_eq!(*lazy.get().unwrap(), "audit#0");
        assert_eq!(*shared.get().unwrap(), "audit#0");
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }
}
