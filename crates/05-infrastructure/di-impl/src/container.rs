//! 依赖注入容器
//!
//! [`DiContainerBuilder`] 收集定义并解析依赖图，[`DiContainer`] 在运行期按解析计划创建实例。
//! 构建完成后注册表与解析计划只读，所有可变状态都在作用域槽位和生命周期编排器中。

use crate::graph::DependencyGraphResolverImpl;
use crate::lifecycle::{in_hook, LifecycleOrchestrator, ManagedInstance};
use crate::registry::DefinitionRegistryImpl;
use crate::scope::{ContextActivation, ScopeManager};
use di_abstractions::{
    CapabilityBinding, ComponentDefinition, ComponentResolver, ContainerBuilder, ContainerConfig,
    ContainerStats, DefinitionRegistry, Dependencies, DependencyGraphResolver, EdgeKind,
    InjectedDependency, IocContainer, ProxyTarget, ResolutionPlan,
};
use infrastructure_common::{
    DependencyError, InstanceRef, LifecycleError, LifecycleState, ScopeContext, ScopeKind,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 直接查找时错误信息中的消费方名称
const LOOKUP_CONSUMER: &str = "<lookup>";

/// 依赖的获取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Demand {
    /// 提供方已在当前线程的创建路径上时报告循环依赖，其他线程正在创建时等待
    Required,
    /// 提供方能沿依赖边回到当前线程的创建路径时推迟注入，否则同样等待就绪
    Optional,
}

/// 依赖注入容器
pub struct DiContainer {
    inner: Arc<ContainerInner>,
}

struct ContainerInner {
    id: Uuid,
    registry: DefinitionRegistryImpl,
    plan: ResolutionPlan,
    config: ContainerConfig,
    scopes: ScopeManager,
    lifecycle: LifecycleOrchestrator,
    closed: AtomicBool,
    self_ref: Weak<ContainerInner>,
}

impl ContainerInner {
    fn resolver_ref(&self) -> Weak<dyn ComponentResolver> {
        self.self_ref.clone()
    }

    fn active_definition(&self, name: &str) -> Result<&ComponentDefinition, DependencyError> {
        let definition = self.registry.lookup_by_name(name)?;
        if !self.plan.is_active(name) {
            return Err(DependencyError::unresolved(
                LOOKUP_CONSUMER,
                name,
                "组件已被激活条件排除",
            ));
        }
        Ok(definition)
    }

    fn check_hook_reentrancy(&self, name: &str, ready: bool) -> Result<(), DependencyError> {
        if !ready && self.config.reject_hook_lookups && in_hook() {
            warn!("拒绝在生命周期钩子中创建组件: {}", name);
            return Err(DependencyError::HookReentrancy {
                component: name.to_string(),
            });
        }
        Ok(())
    }

    /// 获取组件实例
    ///
    /// `within` 为消费方所在的上下文，同类上下文作用域的依赖在该上下文内解析。
    /// 可选依赖被推迟时返回 `None`。
    fn acquire(
        &self,
        name: &str,
        demand: Demand,
        within: Option<&ScopeContext>,
    ) -> Result<Option<Arc<ManagedInstance>>, DependencyError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DependencyError::ContainerClosed);
        }
        let definition = self.active_definition(name)?;

        match demand {
            Demand::Required if self.lifecycle.is_creating(name) => {
                return Err(self.lifecycle.cycle_error(name));
            }
            Demand::Optional if self.reaches_creation_path(name) => {
                return Ok(None);
            }
            _ => {}
        }

        match &definition.scope {
            ScopeKind::Singleton => {
                let slot = self
                    .scopes
                    .singleton_slot(name)
                    .ok_or_else(|| DependencyError::NotFound {
                        name: name.to_string(),
                    })?;
                self.check_hook_reentrancy(name, slot.is_ready())?;
                slot.acquire(name, || self.instantiate(definition, None))
                    .map(Some)
            }
            ScopeKind::Prototype => {
                self.check_hook_reentrancy(name, false)?;
                self.instantiate(definition, None).map(Some)
            }
            ScopeKind::Contextual(kind) => {
                let cache = within
                    .filter(|context| &context.kind == kind)
                    .and_then(|context| self.scopes.context(&context.id))
                    .or_else(|| self.scopes.active_context(kind))
                    .ok_or_else(|| DependencyError::ScopeNotActive {
                        component: name.to_string(),
                        scope: kind.clone(),
                    })?;
                let slot = cache.slot(name);
                self.check_hook_reentrancy(name, slot.is_ready())?;
                let context = cache.context().clone();
                slot.acquire(name, || {
                    let instance = self.instantiate(definition, Some(&context))?;
                    cache.record(instance.clone());
                    Ok(instance)
                })
                .map(Some)
            }
        }
    }

    /// 从 `name` 出发沿直接注入的依赖边（必需或可选）能否到达当前线程正在创建的组件
    ///
    /// 能到达时等待它就绪可能形成跨线程的相互等待，也可能在本线程内重入。
    fn reaches_creation_path(&self, name: &str) -> bool {
        let mut pending = vec![name];
        let mut seen = HashSet::new();
        while let Some(current) = pending.pop() {
            if !seen.insert(current) {
                continue;
            }
            if self.lifecycle.is_creating(current) {
                return true;
            }
            for bound in self.plan.dependencies_of(current) {
                if let (Some(supplier), EdgeKind::Direct) = (&bound.supplier, bound.edge) {
                    pending.push(supplier.as_str());
                }
            }
        }
        false
    }

    fn instantiate(
        &self,
        definition: &ComponentDefinition,
        context: Option<&ScopeContext>,
    ) -> Result<Arc<ManagedInstance>, DependencyError> {
        let _frame = self.lifecycle.enter_creation(&definition.name)?;
        let dependencies = self.collect_dependencies(definition, context)?;
        self.lifecycle.create(definition, &dependencies, context)
    }

    fn collect_dependencies(
        &self,
        definition: &ComponentDefinition,
        context: Option<&ScopeContext>,
    ) -> Result<Dependencies, DependencyError> {
        let mut dependencies = Dependencies::new(&definition.name, self.resolver_ref());
        for bound in self.plan.dependencies_of(&definition.name) {
            let injected = match (&bound.supplier, bound.edge) {
                (Some(supplier), EdgeKind::Contextual) => {
                    let scope = self.registry.lookup_by_name(supplier)?.scope.to_string();
                    InjectedDependency::Contextual(ProxyTarget::new(
                        supplier,
                        scope,
                        self.resolver_ref(),
                    ))
                }
                (Some(supplier), EdgeKind::Direct) => {
                    let demand = if bound.required {
                        Demand::Required
                    } else {
                        Demand::Optional
                    };
                    match self.acquire(supplier, demand, context)? {
                        Some(instance) => InjectedDependency::Instance {
                            component: supplier.clone(),
                            instance: instance.value().clone(),
                        },
                        None => {
                            debug!("组件 {} 的可选依赖 {} 会回到当前创建路径，推迟注入", definition.name, supplier);
                            InjectedDependency::Deferred {
                                component: supplier.clone(),
                            }
                        }
                    }
                }
                _ => InjectedDependency::Absent,
            };
            dependencies.insert(bound.key.clone(), injected);
        }
        Ok(dependencies)
    }

    fn initialize_singletons(&self) -> Result<(), DependencyError> {
        for name in &self.plan.order {
            let definition = self.registry.lookup_by_name(name)?;
            if definition.scope != ScopeKind::Singleton || definition.lazy {
                continue;
            }
            if let Err(e) = self.acquire(name, Demand::Required, None) {
                error!("预创建单例 {} 失败: {}", name, e);
                self.abort();
                return Err(e);
            }
        }
        Ok(())
    }

    /// 构建失败时销毁已经创建的单例
    fn abort(&self) {
        self.closed.store(true, Ordering::Release);
        let failures = self
            .lifecycle
            .teardown(self.lifecycle.take_singletons(), &self.registry);
        self.scopes.release_singletons();
        for failure in failures {
            warn!("回滚单例时销毁失败: {}", failure);
        }
    }

    fn exit_context(&self, context: &ScopeContext) -> Result<(), LifecycleError> {
        let cache = self.scopes.remove_context(context)?;
        let instances = cache.drain();
        let count = instances.len();
        let failures = self.lifecycle.teardown(instances, &self.registry);
        info!("上下文 {} 已退出，销毁了 {} 个实例", context, count);
        teardown_result(failures)
    }

    fn shutdown(&self) -> Result<(), LifecycleError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("容器 {} 已经关闭", self.id);
            return Ok(());
        }
        info!("开始关闭容器 {}", self.id);

        let mut failures = Vec::new();
        for cache in self.scopes.drain_contexts() {
            failures.extend(self.lifecycle.teardown(cache.drain(), &self.registry));
        }
        failures.extend(
            self.lifecycle
                .teardown(self.lifecycle.take_singletons(), &self.registry),
        );
        self.scopes.release_singletons();

        info!("容器 {} 已关闭", self.id);
        teardown_result(failures)
    }
}

impl ComponentResolver for ContainerInner {
    fn resolve_named(&self, name: &str) -> Result<InstanceRef, DependencyError> {
        match self.acquire(name, Demand::Required, None)? {
            Some(instance) => Ok(instance.value().clone()),
            None => Err(DependencyError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    fn resolve_capability(&self, capability: &str) -> Result<InstanceRef, DependencyError> {
        match self.plan.capabilities.get(capability) {
            Some(CapabilityBinding::Bound(name)) => self.resolve_named(name),
            Some(CapabilityBinding::Ambiguous(candidates)) => {
                Err(DependencyError::AmbiguousDependency {
                    consumer: LOOKUP_CONSUMER.to_string(),
                    reference: capability.to_string(),
                    candidates: candidates.clone(),
                })
            }
            None => Err(DependencyError::NotFound {
                name: capability.to_string(),
            }),
        }
    }

    fn can_resolve(&self, name: &str) -> bool {
        !self.closed.load(Ordering::Acquire) && self.plan.is_active(name)
    }
}

fn teardown_result(failures: Vec<DependencyError>) -> Result<(), LifecycleError> {
    if failures.is_empty() {
        return Ok(());
    }
    warn!("销毁过程中有 {} 个失败", failures.len());
    Err(LifecycleError::TeardownIncomplete { failures })
}

impl DiContainer {
    /// 创建构建器
    pub fn builder() -> DiContainerBuilder {
        DiContainerBuilder::new()
    }

    /// 容器 ID
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// 单例的生命周期状态，非单例或未激活的组件返回 `None`
    pub fn state_of(&self, name: &str) -> Option<LifecycleState> {
        self.inner.scopes.singleton_state(name)
    }

    /// 构建期计算的解析计划
    pub fn plan(&self) -> &ResolutionPlan {
        &self.inner.plan
    }

    /// 容器配置
    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    /// 组件定义注册表
    pub fn registry(&self) -> &dyn DefinitionRegistry {
        &self.inner.registry
    }

    /// 容器是否已关闭
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl ComponentResolver for DiContainer {
    fn resolve_named(&self, name: &str) -> Result<InstanceRef, DependencyError> {
        self.inner.resolve_named(name)
    }

    fn resolve_capability(&self, capability: &str) -> Result<InstanceRef, DependencyError> {
        self.inner.resolve_capability(capability)
    }

    fn can_resolve(&self, name: &str) -> bool {
        self.inner.can_resolve(name)
    }
}

impl IocContainer for DiContainer {
    type Activation = ContextActivation;

    fn enter_context(&self, kind: &str) -> ScopeContext {
        self.inner.scopes.enter_context(kind)
    }

    fn activate(&self, context: &ScopeContext) -> Result<ContextActivation, LifecycleError> {
        self.inner.scopes.activate(context)
    }

    fn exit_context(&self, context: &ScopeContext) -> Result<(), LifecycleError> {
        self.inner.exit_context(context)
    }

    fn shutdown(&self) -> Result<(), LifecycleError> {
        self.inner.shutdown()
    }

    fn stats(&self) -> ContainerStats {
        let inner = &self.inner;
        ContainerStats {
            registered_components: inner.registry.len(),
            active_components: inner.plan.order.len(),
            pruned_components: inner.plan.pruned.len(),
            ready_singletons: inner.scopes.ready_singletons(),
            active_contexts: inner.scopes.active_contexts(),
            created_instances: inner.lifecycle.created_count(),
            failed_creations: inner.lifecycle.failed_count(),
        }
    }
}

impl Drop for DiContainer {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.inner.shutdown() {
            warn!("容器释放时关闭失败: {}", e);
        }
    }
}

impl std::fmt::Debug for DiContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiContainer")
            .field("id", &self.inner.id)
            .field("components", &self.inner.plan.order)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// 容器构建器
pub struct DiContainerBuilder {
    registry: DefinitionRegistryImpl,
    config: ContainerConfig,
    resolver: Box<dyn DependencyGraphResolver>,
}

impl DiContainerBuilder {
    /// 创建构建器
    pub fn new() -> Self {
        Self {
            registry: DefinitionRegistryImpl::new(),
            config: ContainerConfig::default(),
            resolver: Box::new(DependencyGraphResolverImpl::new()),
        }
    }

    /// 替换依赖图解析器
    pub fn with_resolver(mut self, resolver: Box<dyn DependencyGraphResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// 批量注册组件定义
    pub fn register_all(
        &mut self,
        definitions: impl IntoIterator<Item = ComponentDefinition>,
    ) -> Result<&mut Self, DependencyError> {
        for definition in definitions {
            self.register(definition)?;
        }
        Ok(self)
    }
}

impl std::fmt::Debug for DiContainerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiContainerBuilder")
            .field("definitions", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for DiContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder for DiContainerBuilder {
    type Container = DiContainer;

    fn register(&mut self, definition: ComponentDefinition) -> Result<&mut Self, DependencyError> {
        self.registry.register(definition)?;
        Ok(self)
    }

    fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    fn build(self) -> Result<DiContainer, DependencyError> {
        info!("开始构建容器，共 {} 个组件定义", self.registry.len());

        let plan = self.resolver.resolve(&self.registry, &self.config)?;
        let singletons: Vec<String> = plan
            .order
            .iter()
            .filter(|name| {
                self.registry
                    .lookup_by_name(name)
                    .map(|d| d.scope == ScopeKind::Singleton)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        let id = Uuid::new_v4();
        let Self {
            registry, config, ..
        } = self;
        let inner = Arc::new_cyclic(|self_ref| ContainerInner {
            id,
            scopes: ScopeManager::new(id, singletons),
            lifecycle: LifecycleOrchestrator::new(id, config.max_resolution_depth),
            registry,
            plan,
            config,
            closed: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        });

        if inner.config.eager_singletons {
            inner.initialize_singletons()?;
        }

        let container = DiContainer { inner };
        info!(
            "容器 {} 构建完成: {} 个组件激活, {} 个单例已就绪",
            container.id(),
            container.inner.plan.order.len(),
            container.inner.scopes.ready_singletons()
        );
        Ok(container)
    }
}
