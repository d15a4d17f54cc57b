//! 组件实例基础类型

use crate::errors::DependencyError;
use std::any::Any;
use std::sync::Arc;

/// 类型擦除后的组件实例
pub type InstanceRef = Arc<dyn Any + Send + Sync>;

/// 将类型擦除的实例还原为具体类型
pub fn downcast_instance<T>(component: &str, instance: InstanceRef) -> Result<Arc<T>, DependencyError>
where
    T: Send + Sync + 'static,
{
    instance
        .downcast::<T>()
        .map_err(|_| DependencyError::TypeMismatch {
            component: component.to_string(),
            expected: std::any::type_name::<T>().to_string(),
        })
}
