//! 元数据定义
//!
//! 提供组件的诊断元数据信息

use serde::Serialize;
use std::collections::BTreeMap;

/// 组件元数据
#[derive(Debug, Clone, Default, Serialize)]
pub struct ComponentMetadata {
    /// 实例的 Rust 类型名称
    pub type_name: String,
    /// 组件描述
    pub description: Option<String>,
    /// 组件标签
    pub tags: Vec<String>,
    /// 自定义属性
    pub properties: BTreeMap<String, String>,
}

impl ComponentMetadata {
    /// 创建新的组件元数据
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    /// 从类型获取元数据
    pub fn of<T: 'static>() -> Self {
        Self::new(std::any::type_name::<T>())
    }

    /// 获取简短的类型名称（不包含模块路径）
    pub fn short_type_name(&self) -> &str {
        self.type_name.rsplit("::").next().unwrap_or(&self.type_name)
    }

    /// 设置描述
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// 添加标签
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// 添加属性
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}
