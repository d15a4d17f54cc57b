//! 组件定义注册表抽象接口

use crate::definition::ComponentDefinition;
use infrastructure_common::DependencyError;

/// 组件定义注册表 trait
///
/// 构建完成后注册表不再变化，可以无锁并发读取。
/// 注册顺序只用于诊断输出，不影响解析语义。
pub trait DefinitionRegistry: Send + Sync {
    /// 注册组件定义，名称重复时返回 `DuplicateDefinition`
    fn register(&mut self, definition: ComponentDefinition) -> Result<(), DependencyError>;

    /// 按名称查找组件定义
    fn lookup_by_name(&self, name: &str) -> Result<&ComponentDefinition, DependencyError>;

    /// 按能力查找所有匹配的组件定义（按注册顺序）
    fn lookup_by_capability(&self, capability: &str) -> Vec<&ComponentDefinition>;

    /// 所有组件定义（按注册顺序）
    fn definitions(&self) -> &[ComponentDefinition];

    /// 检查名称是否已注册
    fn contains(&self, name: &str) -> bool {
        self.lookup_by_name(name).is_ok()
    }

    /// 已注册的组件数量
    fn len(&self) -> usize {
        self.definitions().len()
    }

    /// 注册表是否为空
    fn is_empty(&self) -> bool {
        self.definitions().is_empty()
    }
}
