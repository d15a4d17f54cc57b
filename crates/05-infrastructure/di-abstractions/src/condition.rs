//! 组件激活条件
//!
//! 条件只能看到在它之前已经决定的组件。引用其他组件的条件（如"某能力不存在时才激活"）
//! 会在解析时形成决定顺序，引用之间不允许成环。

/// 条件求值上下文
pub trait ConditionContext {
    /// 配置档是否激活
    fn is_profile_active(&self, profile: &str) -> bool;

    /// 读取配置属性
    fn property(&self, key: &str) -> Option<&str>;

    /// 组件是否已决定且处于激活状态
    fn is_active(&self, component: &str) -> bool;

    /// 注册表中提供指定能力的所有组件
    fn capability_providers(&self, capability: &str) -> Vec<String>;
}

/// 激活条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// 指定配置档激活
    Profile(String),
    /// 配置属性存在；指定了值时要求相等
    Property { key: String, value: Option<String> },
    /// 没有其他激活组件提供该能力
    OnMissingCapability(String),
    /// 指定组件未激活
    OnMissingComponent(String),
    /// 指定组件已激活
    OnComponent(String),
    /// 取反
    Not(Box<Condition>),
    /// 任一满足
    AnyOf(Vec<Condition>),
    /// 全部满足
    AllOf(Vec<Condition>),
}

impl Condition {
    /// 配置档条件
    pub fn profile(profile: impl Into<String>) -> Self {
        Self::Profile(profile.into())
    }

    /// 解析配置档表达式，`!dev` 表示 dev 未激活
    pub fn profile_expr(expr: &str) -> Self {
        match expr.trim().strip_prefix('!') {
            Some(profile) => Self::Not(Box::new(Self::profile(profile.trim()))),
            None => Self::profile(expr.trim()),
        }
    }

    /// 属性条件
    pub fn property(key: impl Into<String>, value: Option<&str>) -> Self {
        Self::Property {
            key: key.into(),
            value: value.map(str::to_string),
        }
    }

    /// 能力缺失条件
    pub fn on_missing_capability(capability: impl Into<String>) -> Self {
        Self::OnMissingCapability(capability.into())
    }

    /// 组件缺失条件
    pub fn on_missing_component(component: impl Into<String>) -> Self {
        Self::OnMissingComponent(component.into())
    }

    /// 组件存在条件
    pub fn on_component(component: impl Into<String>) -> Self {
        Self::OnComponent(component.into())
    }

    /// 条件求值，`owner` 为条件所属组件
    pub fn evaluate(&self, owner: &str, ctx: &dyn ConditionContext) -> bool {
        match self {
            Self::Profile(profile) => ctx.is_profile_active(profile),
            Self::Property { key, value } => match (ctx.property(key), value) {
                (Some(actual), Some(expected)) => actual == expected,
                (Some(actual), None) => !actual.eq_ignore_ascii_case("false"),
                (None, _) => false,
            },
            Self::OnMissingCapability(capability) => ctx
                .capability_providers(capability)
                .iter()
                .filter(|provider| provider.as_str() != owner)
                .all(|provider| !ctx.is_active(provider)),
            Self::OnMissingComponent(component) => !ctx.is_active(component),
            Self::OnComponent(component) => ctx.is_active(component),
            Self::Not(inner) => !inner.evaluate(owner, ctx),
            Self::AnyOf(conditions) => conditions.iter().any(|c| c.evaluate(owner, ctx)),
            Self::AllOf(conditions) => conditions.iter().all(|c| c.evaluate(owner, ctx)),
        }
    }

    /// 条件引用的组件，这些组件必须先于 `owner` 决定
    pub fn references(&self, owner: &str, ctx: &dyn ConditionContext) -> Vec<String> {
        let mut references = Vec::new();
        self.collect_references(owner, ctx, &mut references);
        references
    }

    fn collect_references(&self, owner: &str, ctx: &dyn ConditionContext, out: &mut Vec<String>) {
        match self {
            Self::Profile(_) | Self::Property { .. } => {}
            Self::OnMissingCapability(capability) => {
                for provider in ctx.capability_providers(capability) {
                    if provider != owner && !out.contains(&provider) {
                        out.push(provider);
                    }
                }
            }
            Self::OnMissingComponent(component) | Self::OnComponent(component) => {
                if !out.contains(component) {
                    out.push(component.clone());
                }
            }
            Self::Not(inner) => inner.collect_references(owner, ctx, out),
            Self::AnyOf(conditions) | Self::AllOf(conditions) => {
                for condition in conditions {
                    condition.collect_references(owner, ctx, out);
                }
            }
        }
    }
}
