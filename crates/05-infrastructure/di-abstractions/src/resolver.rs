//! 组件解析器抽象接口
//!
//! 提供依赖图解析（构建期）和组件查找（运行期）的能力

use crate::container::ContainerConfig;
use crate::registry::DefinitionRegistry;
use infrastructure_common::{DependencyError, InstanceRef};
use std::collections::HashMap;

/// 组件解析器 trait
///
/// 运行期按名称或能力查找组件实例，上下文作用域组件针对当前线程激活的上下文解析。
pub trait ComponentResolver: Send + Sync {
    /// 按名称解析组件
    fn resolve_named(&self, name: &str) -> Result<InstanceRef, DependencyError>;

    /// 按能力解析组件
    fn resolve_capability(&self, capability: &str) -> Result<InstanceRef, DependencyError>;

    /// 检查是否可以解析指定名称的组件
    fn can_resolve(&self, name: &str) -> bool;
}

/// 依赖图解析器 trait
pub trait DependencyGraphResolver: Send + Sync {
    /// 对全部组件定义求激活决定、绑定依赖并计算拓扑顺序
    fn resolve(
        &self,
        registry: &dyn DefinitionRegistry,
        config: &ContainerConfig,
    ) -> Result<ResolutionPlan, DependencyError>;
}

/// 依赖边类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// 直接注入实例
    Direct,
    /// 上下文作用域依赖注入到不同作用域的消费方，通过代理访问
    Contextual,
    /// 可选依赖没有可用的提供方
    Absent,
}

/// 已绑定的依赖
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundDependency {
    /// 依赖键
    pub key: String,
    /// 提供方组件名称
    pub supplier: Option<String>,
    /// 是否必需
    pub required: bool,
    /// 边类型
    pub edge: EdgeKind,
}

/// 能力绑定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityBinding {
    /// 唯一或首选的提供方
    Bound(String),
    /// 多个候选且无法消歧
    Ambiguous(Vec<String>),
}

/// 解析计划
///
/// 构建期计算一次，之后只读。
#[derive(Debug, Clone, Default)]
pub struct ResolutionPlan {
    /// 激活组件的拓扑顺序：每个组件都排在其必需依赖之后
    pub order: Vec<String>,
    /// 被激活条件排除的组件
    pub pruned: Vec<String>,
    /// 每个激活组件的依赖绑定，按声明顺序
    pub dependencies: HashMap<String, Vec<BoundDependency>>,
    /// 能力到提供方的绑定，用于运行期按能力查找
    pub capabilities: HashMap<String, CapabilityBinding>,
}

impl ResolutionPlan {
    /// 组件是否处于激活状态
    pub fn is_active(&self, name: &str) -> bool {
        self.dependencies.contains_key(name)
    }

    /// 组件是否被排除
    pub fn is_pruned(&self, name: &str) -> bool {
        self.pruned.iter().any(|p| p == name)
    }

    /// 组件的依赖绑定
    pub fn dependencies_of(&self, name: &str) -> &[BoundDependency] {
        self.dependencies.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 组件在拓扑顺序中的位置
    pub fn position(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|n| n == name)
    }
}
