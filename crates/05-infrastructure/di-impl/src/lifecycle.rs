//! 组件生命周期编排
//!
//! 每个实例严格按 `Uninitialized → Instantiated → Injected → PostInitialized → Ready`
//! 推进，销毁时经过 `PreDestroy → Destroyed`。任何创建阶段失败都会进入 `Failed`。
//!
//! 当前线程的创建路径用于在运行期发现重入（环），钩子执行深度用于拒绝钩子中触发的新创建。

use chrono::{DateTime, Utc};
use di_abstractions::{ComponentDefinition, DefinitionRegistry, Dependencies, InjectedDependency};
use infrastructure_common::{
    DependencyError, InstanceRef, LifecyclePhase, LifecycleState, ScopeContext, ScopeKind,
};
use parking_lot::Mutex;
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

thread_local! {
    static CREATION_PATH: RefCell<Vec<(Uuid, String)>> = RefCell::new(Vec::new());
    static HOOK_DEPTH: Cell<usize> = Cell::new(0);
}

/// 受管组件实例
pub struct ManagedInstance {
    component: String,
    scope: ScopeKind,
    context: Option<Uuid>,
    value: InstanceRef,
    state: Mutex<LifecycleState>,
    created_at: DateTime<Utc>,
}

impl ManagedInstance {
    fn instantiated(definition: &ComponentDefinition, value: InstanceRef, context: Option<Uuid>) -> Self {
        Self {
            component: definition.name.clone(),
            scope: definition.scope.clone(),
            context,
            value,
            state: Mutex::new(LifecycleState::Instantiated),
            created_at: Utc::now(),
        }
    }

    /// 组件名称
    pub fn component(&self) -> &str {
        &self.component
    }

    /// 作用域
    pub fn scope(&self) -> &ScopeKind {
        &self.scope
    }

    /// 所属上下文
    pub fn context(&self) -> Option<Uuid> {
        self.context
    }

    /// 实例值
    pub fn value(&self) -> &InstanceRef {
        &self.value
    }

    /// 当前生命周期状态
    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// 创建时间
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn transition(&self, target: LifecycleState) -> Result<(), DependencyError> {
        let mut state = self.state.lock();
        if !state.can_transition_to(target) {
            return Err(DependencyError::InvalidTransition {
                component: self.component.clone(),
                from: *state,
                to: target,
            });
        }
        trace!("组件 {} 状态: {:?} -> {:?}", self.component, *state, target);
        *state = target;
        Ok(())
    }
}

impl std::fmt::Debug for ManagedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedInstance")
            .field("component", &self.component)
            .field("scope", &self.scope)
            .field("context", &self.context)
            .field("state", &self.state())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// 创建路径上的一帧，释放时出栈
pub(crate) struct CreationFrame {
    container: Uuid,
    _not_send: PhantomData<*const ()>,
}

impl Drop for CreationFrame {
    fn drop(&mut self) {
        CREATION_PATH.with(|path| {
            let mut path = path.borrow_mut();
            if let Some(index) = path.iter().rposition(|(c, _)| *c == self.container) {
                path.remove(index);
            }
        });
    }
}

struct HookScope;

impl HookScope {
    fn enter() -> Self {
        HOOK_DEPTH.with(|depth| depth.set(depth.get() + 1));
        HookScope
    }
}

impl Drop for HookScope {
    fn drop(&mut self) {
        HOOK_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// 当前线程是否正在执行生命周期钩子
pub(crate) fn in_hook() -> bool {
    HOOK_DEPTH.with(|depth| depth.get() > 0)
}

fn run_hook<R>(hook: impl FnOnce() -> R) -> R {
    let _scope = HookScope::enter();
    hook()
}

/// 生命周期编排器
pub struct LifecycleOrchestrator {
    container_id: Uuid,
    max_depth: usize,
    /// 单例按创建完成的顺序记录，关闭时逆序销毁
    singletons: Mutex<Vec<Arc<ManagedInstance>>>,
    created: AtomicUsize,
    failed: AtomicUsize,
}

impl LifecycleOrchestrator {
    /// 创建编排器
    pub fn new(container_id: Uuid, max_depth: usize) -> Self {
        Self {
            container_id,
            max_depth,
            singletons: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// 组件是否在当前线程的创建路径上
    pub(crate) fn is_creating(&self, component: &str) -> bool {
        CREATION_PATH.with(|path| {
            path.borrow()
                .iter()
                .any(|(c, n)| *c == self.container_id && n == component)
        })
    }

    /// 当前线程创建路径上从 `component` 起的环
    pub(crate) fn cycle_error(&self, component: &str) -> DependencyError {
        let mut cycle: Vec<String> = CREATION_PATH.with(|path| {
            path.borrow()
                .iter()
                .filter(|(c, _)| *c == self.container_id)
                .map(|(_, n)| n.clone())
                .skip_while(|n| n != component)
                .collect()
        });
        cycle.push(component.to_string());
        DependencyError::CircularDependency { cycle }
    }

    /// 把组件压入当前线程的创建路径
    pub(crate) fn enter_creation(&self, component: &str) -> Result<CreationFrame, DependencyError> {
        if self.is_creating(component) {
            return Err(self.cycle_error(component));
        }
        CREATION_PATH.with(|path| {
            let mut path = path.borrow_mut();
            let depth = path.iter().filter(|(c, _)| *c == self.container_id).count();
            if depth >= self.max_depth {
                return Err(DependencyError::ResolutionDepthExceeded {
                    component: component.to_string(),
                    limit: self.max_depth,
                });
            }
            path.push((self.container_id, component.to_string()));
            Ok(CreationFrame {
                container: self.container_id,
                _not_send: PhantomData,
            })
        })
    }

    /// 创建实例并推进到 `Ready`
    ///
    /// 依赖已由调用方准备好。setter 注入只处理直接实例，缺失或被推迟的依赖保持未注入。
    pub fn create(
        &self,
        definition: &ComponentDefinition,
        dependencies: &Dependencies,
        context: Option<&ScopeContext>,
    ) -> Result<Arc<ManagedInstance>, DependencyError> {
        debug!("创建组件实例: {} ({})", definition.name, definition.scope);

        let value = (definition.factory)(dependencies).map_err(|e| {
            self.failed.fetch_add(1, Ordering::Relaxed);
            error!("组件 {} 实例化失败: {:#}", definition.name, e);
            DependencyError::hook_failure(&definition.name, LifecyclePhase::Instantiate, format!("{:#}", e))
        })?;
        let instance = Arc::new(ManagedInstance::instantiated(
            definition,
            value,
            context.map(|c| c.id),
        ));

        for setter in &definition.setters {
            match dependencies.entry(&setter.key) {
                Some(InjectedDependency::Instance { instance: value, .. }) => {
                    run_hook(|| (setter.apply)(instance.value(), value.clone()))
                        .map_err(|e| self.fail(&instance, LifecyclePhase::Inject, e))?;
                }
                other => debug!("组件 {} 的 setter {} 未注入: {:?}", definition.name, setter.key, other),
            }
        }
        instance.transition(LifecycleState::Injected)?;

        for hook in &definition.post_init {
            run_hook(|| hook(instance.value()))
                .map_err(|e| self.fail(&instance, LifecyclePhase::PostInit, e))?;
        }
        instance.transition(LifecycleState::PostInitialized)?;
        instance.transition(LifecycleState::Ready)?;

        self.created.fetch_add(1, Ordering::Relaxed);
        if definition.scope == ScopeKind::Singleton {
            self.singletons.lock().push(instance.clone());
        }
        debug!("组件 {} 已就绪", definition.name);
        Ok(instance)
    }

    fn fail(
        &self,
        instance: &ManagedInstance,
        phase: LifecyclePhase,
        error: anyhow::Error,
    ) -> DependencyError {
        self.failed.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = instance.transition(LifecycleState::Failed) {
            warn!("{}", e);
        }
        error!("组件 {} 在 {} 阶段失败: {:#}", instance.component, phase, error);
        DependencyError::hook_failure(&instance.component, phase, format!("{:#}", error))
    }

    /// 销毁单个实例，执行全部销毁钩子后进入 `Destroyed`
    ///
    /// 钩子失败不会中断后续钩子，返回第一个失败。
    pub fn destroy(
        &self,
        instance: &ManagedInstance,
        definition: &ComponentDefinition,
    ) -> Result<(), DependencyError> {
        instance.transition(LifecycleState::PreDestroy)?;
        debug!("销毁组件实例: {}", instance.component);

        let mut first_failure = None;
        for hook in &definition.pre_destroy {
            if let Err(e) = run_hook(|| hook(instance.value())) {
                warn!("组件 {} 销毁钩子失败: {:#}", instance.component, e);
                first_failure.get_or_insert_with(|| {
                    DependencyError::hook_failure(
                        &instance.component,
                        LifecyclePhase::PreDestroy,
                        format!("{:#}", e),
                    )
                });
            }
        }
        instance.transition(LifecycleState::Destroyed)?;
        first_failure.map_or(Ok(()), Err)
    }

    /// 按创建的逆序销毁一组实例，收集所有失败
    pub fn teardown(
        &self,
        instances: Vec<Arc<ManagedInstance>>,
        registry: &dyn DefinitionRegistry,
    ) -> Vec<DependencyError> {
        let mut failures = Vec::new();
        for instance in instances.into_iter().rev() {
            let result = registry
                .lookup_by_name(&instance.component)
                .and_then(|definition| self.destroy(&instance, definition));
            if let Err(e) = result {
                failures.push(e);
            }
        }
        failures
    }

    /// 取出所有已创建的单例（按创建顺序）
    pub fn take_singletons(&self) -> Vec<Arc<ManagedInstance>> {
        std::mem::take(&mut *self.singletons.lock())
    }

    /// 累计创建成功的实例数量
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// 累计创建失败次数
    pub fn failed_count(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}
