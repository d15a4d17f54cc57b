//! 组件定义
//!
//! 组件定义是容器的静态输入：标识、作用域、依赖声明、工厂、钩子和激活条件。
//! 定义由外部配置源显式构造，容器内部不做任何反射扫描。

use crate::condition::Condition;
use crate::factory::Dependencies;
use infrastructure_common::{ComponentMetadata, InstanceRef, ScopeKind};
use std::fmt;
use std::sync::Arc;

/// 组件工厂函数类型（构造器式：所有依赖在调用前已就绪）
pub type ComponentFactoryFn =
    Arc<dyn Fn(&Dependencies) -> anyhow::Result<InstanceRef> + Send + Sync>;

/// 生命周期钩子函数类型
pub type LifecycleHookFn = Arc<dyn Fn(&InstanceRef) -> anyhow::Result<()> + Send + Sync>;

/// setter 注入函数类型
pub type SetterFn = Arc<dyn Fn(&InstanceRef, InstanceRef) -> anyhow::Result<()> + Send + Sync>;

/// 依赖目标
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyTarget {
    /// 按组件名称引用
    Name(String),
    /// 按能力（接口）引用
    Capability(String),
}

impl DependencyTarget {
    /// 依赖的键，工厂通过它取得注入的值
    pub fn key(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Capability(capability) => capability,
        }
    }
}

impl fmt::Display for DependencyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "name:{}", name),
            Self::Capability(capability) => write!(f, "capability:{}", capability),
        }
    }
}

/// 依赖引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRef {
    pub target: DependencyTarget,
    pub required: bool,
}

impl DependencyRef {
    /// 按名称的必需依赖
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            target: DependencyTarget::Name(name.into()),
            required: true,
        }
    }

    /// 按能力的必需依赖
    pub fn capability(capability: impl Into<String>) -> Self {
        Self {
            target: DependencyTarget::Capability(capability.into()),
            required: true,
        }
    }

    /// 标记为可选依赖
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// 依赖的键
    pub fn key(&self) -> &str {
        self.target.key()
    }
}

/// setter 风格的依赖注入
#[derive(Clone)]
pub struct SetterInjection {
    /// 对应的依赖键
    pub key: String,
    /// 注入函数
    pub apply: SetterFn,
}

/// 组件定义
#[derive(Clone)]
pub struct ComponentDefinition {
    /// 组件名称，在注册表内唯一
    pub name: String,
    /// 组件提供的能力
    pub capabilities: Vec<String>,
    /// 作用域
    pub scope: ScopeKind,
    /// 依赖声明，按声明顺序
    pub dependencies: Vec<DependencyRef>,
    /// 工厂
    pub factory: ComponentFactoryFn,
    /// 同一能力存在多个候选时是否优先
    pub primary: bool,
    /// 单例是否延迟到首次查找时创建
    pub lazy: bool,
    /// 激活条件，全部满足才会激活
    pub conditions: Vec<Condition>,
    /// 初始化钩子
    pub post_init: Vec<LifecycleHookFn>,
    /// 销毁钩子
    pub pre_destroy: Vec<LifecycleHookFn>,
    /// setter 注入
    pub setters: Vec<SetterInjection>,
    /// 诊断元数据
    pub metadata: ComponentMetadata,
}

impl ComponentDefinition {
    /// 使用类型化工厂创建组件定义，默认作用域为单例
    pub fn new<T, F>(name: impl Into<String>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Dependencies) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let factory: ComponentFactoryFn =
            Arc::new(move |deps: &Dependencies| Ok(Arc::new(factory(deps)?) as InstanceRef));
        Self::from_factory(name, ComponentMetadata::of::<T>(), factory)
    }

    /// 使用已存在的实例创建单例组件定义
    pub fn from_instance<T>(name: impl Into<String>, instance: Arc<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        let factory: ComponentFactoryFn =
            Arc::new(move |_: &Dependencies| Ok(instance.clone() as InstanceRef));
        Self::from_factory(name, ComponentMetadata::of::<T>(), factory)
    }

    /// 使用类型擦除的工厂创建组件定义
    pub fn from_factory(
        name: impl Into<String>,
        metadata: ComponentMetadata,
        factory: ComponentFactoryFn,
    ) -> Self {
        Self {
            name: name.into(),
            capabilities: Vec::new(),
            scope: ScopeKind::Singleton,
            dependencies: Vec::new(),
            factory,
            primary: false,
            lazy: false,
            conditions: Vec::new(),
            post_init: Vec::new(),
            pre_destroy: Vec::new(),
            setters: Vec::new(),
            metadata,
        }
    }

    /// 重命名（用于从模板派生定义）
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 设置作用域
    pub fn with_scope(mut self, scope: ScopeKind) -> Self {
        self.scope = scope;
        self
    }

    /// 声明提供的能力
    pub fn provides(mut self, capability: impl Into<String>) -> Self {
        let capability = capability.into();
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    /// 添加依赖
    pub fn depends_on(mut self, dependency: DependencyRef) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// 标记为首选
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// 标记为延迟创建
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// 添加激活条件
    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// 添加初始化钩子
    pub fn on_post_init<T, F>(mut self, hook: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.post_init.push(typed_hook(hook));
        self
    }

    /// 添加销毁钩子
    pub fn on_pre_destroy<T, F>(mut self, hook: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.pre_destroy.push(typed_hook(hook));
        self
    }

    /// 添加 setter 注入，`key` 必须对应一个已声明的依赖
    pub fn with_setter<T, D, F>(mut self, key: impl Into<String>, setter: F) -> Self
    where
        T: Send + Sync + 'static,
        D: Send + Sync + 'static,
        F: Fn(&T, Arc<D>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let apply: SetterFn = Arc::new(move |instance: &InstanceRef, value: InstanceRef| {
            let target = instance.downcast_ref::<T>().ok_or_else(|| {
                anyhow::anyhow!("实例类型不是 {}", std::any::type_name::<T>())
            })?;
            let value = value.downcast::<D>().map_err(|_| {
                anyhow::anyhow!("注入值类型不是 {}", std::any::type_name::<D>())
            })?;
            setter(target, value)
        });
        self.setters.push(SetterInjection {
            key: key.into(),
            apply,
        });
        self
    }

    /// 设置描述
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_description(description);
        self
    }

    /// 添加元数据属性
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_property(key, value);
        self
    }

    /// 是否提供指定能力
    pub fn provides_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// 按键查找依赖声明
    pub fn dependency(&self, key: &str) -> Option<&DependencyRef> {
        self.dependencies.iter().find(|d| d.key() == key)
    }
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("scope", &self.scope)
            .field("dependencies", &self.dependencies)
            .field("primary", &self.primary)
            .field("lazy", &self.lazy)
            .field("conditions", &self.conditions)
            .field("post_init", &self.post_init.len())
            .field("pre_destroy", &self.pre_destroy.len())
            .field("setters", &self.setters.iter().map(|s| &s.key).collect::<Vec<_>>())
            .field("metadata", &self.metadata)
            .field("factory", &"<function>")
            .finish()
    }
}

fn typed_hook<T, F>(hook: F) -> LifecycleHookFn
where
    T: Send + Sync + 'static,
    F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(move |instance: &InstanceRef| {
        let target = instance
            .downcast_ref::<T>()
            .ok_or_else(|| anyhow::anyhow!("实例类型不是 {}", std::any::type_name::<T>()))?;
        hook(target)
    })
}
