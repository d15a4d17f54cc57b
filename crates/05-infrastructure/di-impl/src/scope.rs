//! 作用域管理
//!
//! 单例槽位在构建时一次性分配，之后只读；上下文缓存按上下文 ID 分区存放在 `DashMap` 中，
//! 不同上下文之间互不竞争。每个线程维护自己的激活上下文栈。

use crate::lifecycle::ManagedInstance;
use dashmap::DashMap;
use infrastructure_common::{DependencyError, LifecycleError, LifecycleState, ScopeContext};
use parking_lot::{Condvar, Mutex};
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::debug;
use uuid::Uuid;

thread_local! {
    static ACTIVE_CONTEXTS: RefCell<Vec<(Uuid, ScopeContext)>> = RefCell::new(Vec::new());
}

enum SlotState {
    Vacant,
    Creating(ThreadId),
    Ready(Arc<ManagedInstance>),
    Failed(DependencyError),
    Released,
}

/// 实例槽位
///
/// 同一槽位最多创建一次：并发的获取者等待创建者完成并看到同一个实例或同一个错误。
pub(crate) struct InstanceSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl InstanceSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Vacant),
            ready: Condvar::new(),
        }
    }

    /// 获取实例，槽位为空时由当前线程调用 `create` 创建
    pub(crate) fn acquire<F>(
        &self,
        component: &str,
        create: F,
    ) -> Result<Arc<ManagedInstance>, DependencyError>
    where
        F: FnOnce() -> Result<Arc<ManagedInstance>, DependencyError>,
    {
        let current = thread::current().id();
        let mut state = self.state.lock();
        loop {
            let owner = match &*state {
                SlotState::Ready(instance) => return Ok(instance.clone()),
                SlotState::Failed(error) => return Err(error.clone()),
                SlotState::Released => return Err(DependencyError::ContainerClosed),
                SlotState::Vacant => break,
                SlotState::Creating(owner) => *owner,
            };
            if owner == current {
                return Err(DependencyError::CircularDependency {
                    cycle: vec![component.to_string(), component.to_string()],
                });
            }
            self.ready.wait(&mut state);
        }
        *state = SlotState::Creating(current);
        drop(state);

        let pending = PendingCreation { slot: self };
        let result = create();
        pending.complete(&result);
        result
    }

    /// 槽位中的实例是否已就绪
    pub(crate) fn is_ready(&self) -> bool {
        matches!(&*self.state.lock(), SlotState::Ready(_))
    }

    /// 槽位对应的生命周期状态
    pub(crate) fn lifecycle_state(&self) -> LifecycleState {
        match &*self.state.lock() {
            SlotState::Vacant | SlotState::Creating(_) => LifecycleState::Uninitialized,
            SlotState::Ready(instance) => instance.state(),
            SlotState::Failed(_) => LifecycleState::Failed,
            SlotState::Released => LifecycleState::Destroyed,
        }
    }

    /// 释放槽位，之后的获取返回 `ContainerClosed`
    pub(crate) fn release(&self) {
        *self.state.lock() = SlotState::Released;
        self.ready.notify_all();
    }
}

/// 创建过程中的槽位，创建者未正常完成（如 panic）时把槽位恢复为空并唤醒等待者
struct PendingCreation<'a> {
    slot: &'a InstanceSlot,
}

impl PendingCreation<'_> {
    fn complete(self, result: &Result<Arc<ManagedInstance>, DependencyError>) {
        {
            let mut state = self.slot.state.lock();
            *state = match result {
                Ok(instance) => SlotState::Ready(instance.clone()),
                Err(error) if is_transient(error) => SlotState::Vacant,
                Err(error) => SlotState::Failed(error.clone()),
            };
        }
        self.slot.ready.notify_all();
        std::mem::forget(self);
    }
}

impl Drop for PendingCreation<'_> {
    fn drop(&mut self) {
        *self.slot.state.lock() = SlotState::Vacant;
        self.slot.ready.notify_all();
    }
}

/// 由调用方所处的状态引起而不是由组件本身引起的错误，槽位不记住这类失败
fn is_transient(error: &DependencyError) -> bool {
    matches!(
        error,
        DependencyError::CircularDependency { .. }
            | DependencyError::HookReentrancy { .. }
            | DependencyError::ScopeNotActive { .. }
            | DependencyError::ResolutionDepthExceeded { .. }
    )
}

/// 单个上下文的实例缓存
pub(crate) struct ContextCache {
    context: ScopeContext,
    slots: Mutex<HashMap<String, Arc<InstanceSlot>>>,
    created: Mutex<Vec<Arc<ManagedInstance>>>,
}

impl ContextCache {
    fn new(context: ScopeContext) -> Self {
        Self {
            context,
            slots: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn context(&self) -> &ScopeContext {
        &self.context
    }

    /// 组件在此上下文中的槽位
    pub(crate) fn slot(&self, component: &str) -> Arc<InstanceSlot> {
        self.slots
            .lock()
            .entry(component.to_string())
            .or_insert_with(|| Arc::new(InstanceSlot::new()))
            .clone()
    }

    /// 记录在此上下文中创建完成的实例
    pub(crate) fn record(&self, instance: Arc<ManagedInstance>) {
        self.created.lock().push(instance);
    }

    /// 释放所有槽位并取出已创建的实例（按创建顺序）
    pub(crate) fn drain(&self) -> Vec<Arc<ManagedInstance>> {
        for slot in self.slots.lock().values() {
            slot.release();
        }
        std::mem::take(&mut *self.created.lock())
    }
}

/// 上下文激活守卫
///
/// 释放时取消当前线程对该上下文的激活。守卫绑定在创建它的线程上。
#[must_use = "上下文只在守卫存活期间保持激活"]
pub struct ContextActivation {
    container: Uuid,
    context: Uuid,
    _not_send: PhantomData<*const ()>,
}

impl ContextActivation {
    fn push(container: Uuid, context: &ScopeContext) -> Self {
        ACTIVE_CONTEXTS.with(|stack| stack.borrow_mut().push((container, context.clone())));
        Self {
            container,
            context: context.id,
            _not_send: PhantomData,
        }
    }

    /// 被激活的上下文 ID
    pub fn context_id(&self) -> Uuid {
        self.context
    }
}

impl Drop for ContextActivation {
    fn drop(&mut self) {
        ACTIVE_CONTEXTS.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(index) = stack
                .iter()
                .rposition(|(c, ctx)| *c == self.container && ctx.id == self.context)
            {
                stack.remove(index);
            }
        });
    }
}

impl std::fmt::Debug for ContextActivation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextActivation")
            .field("context", &self.context)
            .finish()
    }
}

/// 作用域管理器
pub struct ScopeManager {
    container_id: Uuid,
    singletons: HashMap<String, Arc<InstanceSlot>>,
    contexts: DashMap<Uuid, Arc<ContextCache>>,
}

impl ScopeManager {
    /// 为给定的单例组件分配槽位
    pub fn new(container_id: Uuid, singletons: impl IntoIterator<Item = String>) -> Self {
        Self {
            container_id,
            singletons: singletons
                .into_iter()
                .map(|name| (name, Arc::new(InstanceSlot::new())))
                .collect(),
            contexts: DashMap::new(),
        }
    }

    pub(crate) fn singleton_slot(&self, component: &str) -> Option<&Arc<InstanceSlot>> {
        self.singletons.get(component)
    }

    /// 单例的生命周期状态
    pub fn singleton_state(&self, component: &str) -> Option<LifecycleState> {
        self.singletons.get(component).map(|s| s.lifecycle_state())
    }

    /// 已就绪的单例数量
    pub fn ready_singletons(&self) -> usize {
        self.singletons.values().filter(|s| s.is_ready()).count()
    }

    /// 释放所有单例槽位
    pub fn release_singletons(&self) {
        for slot in self.singletons.values() {
            slot.release();
        }
    }

    /// 创建上下文并在当前线程激活
    ///
    /// 激活没有守卫，在 [`ScopeManager::remove_context`] 时从当前线程移除。
    /// 在其他线程上移除的上下文，其激活记录在本线程下一次进入或查找上下文时清理。
    pub fn enter_context(&self, kind: &str) -> ScopeContext {
        let context = ScopeContext::new(kind);
        self.contexts
            .insert(context.id, Arc::new(ContextCache::new(context.clone())));
        ACTIVE_CONTEXTS.with(|stack| {
            let mut stack = stack.borrow_mut();
            self.prune_removed(&mut stack);
            stack.push((self.container_id, context.clone()));
        });
        debug!("进入上下文: {}", context);
        context
    }

    /// 在当前线程激活已存在的上下文
    pub fn activate(&self, context: &ScopeContext) -> Result<ContextActivation, LifecycleError> {
        if !self.contexts.contains_key(&context.id) {
            return Err(LifecycleError::ScopeNotFound {
                scope_id: context.id.to_string(),
            });
        }
        ACTIVE_CONTEXTS.with(|stack| self.prune_removed(&mut stack.borrow_mut()));
        debug!("激活上下文: {}", context);
        Ok(ContextActivation::push(self.container_id, context))
    }

    /// 当前线程最近激活的指定类别上下文
    pub(crate) fn active_context(&self, kind: &str) -> Option<Arc<ContextCache>> {
        ACTIVE_CONTEXTS.with(|stack| {
            let mut stack = stack.borrow_mut();
            self.prune_removed(&mut stack);
            let active = stack
                .iter()
                .rev()
                .filter(|(c, ctx)| *c == self.container_id && ctx.kind == kind)
                .find_map(|(_, ctx)| self.contexts.get(&ctx.id).map(|e| e.value().clone()));
            active
        })
    }

    /// 丢弃本容器中已不存在的上下文的激活记录
    fn prune_removed(&self, stack: &mut Vec<(Uuid, ScopeContext)>) {
        stack.retain(|(c, ctx)| *c != self.container_id || self.contexts.contains_key(&ctx.id));
    }

    pub(crate) fn context(&self, id: &Uuid) -> Option<Arc<ContextCache>> {
        self.contexts.get(id).map(|e| e.value().clone())
    }

    /// 移除上下文，同时取消当前线程上对它的全部激活
    pub(crate) fn remove_context(
        &self,
        context: &ScopeContext,
    ) -> Result<Arc<ContextCache>, LifecycleError> {
        let (_, cache) =
            self.contexts
                .remove(&context.id)
                .ok_or_else(|| LifecycleError::ScopeNotFound {
                    scope_id: context.id.to_string(),
                })?;
        ACTIVE_CONTEXTS.with(|stack| {
            stack
                .borrow_mut()
                .retain(|(c, ctx)| !(*c == self.container_id && ctx.id == context.id))
        });
        debug!("退出上下文: {}", context);
        Ok(cache)
    }

    /// 移除所有上下文
    pub(crate) fn drain_contexts(&self) -> Vec<Arc<ContextCache>> {
        let ids: Vec<Uuid> = self.contexts.iter().map(|e| *e.key()).collect();
        ids.into_iter()
            .filter_map(|id| self.contexts.remove(&id).map(|(_, cache)| cache))
            .collect()
    }

    /// 活跃上下文数量
    pub fn active_contexts(&self) -> usize {
        self.contexts.len()
    }
}
