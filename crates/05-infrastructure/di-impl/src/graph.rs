//! 依赖图解析
//!
//! 构建期依次完成三个阶段：
//! 1. 激活决定：按条件引用的依赖顺序对每个定义求值，条件引用成环时报告循环依赖
//! 2. 依赖绑定：把每个依赖引用绑定到唯一的提供方，或在可选时标记为缺失
//! 3. 拓扑排序：只沿必需的直接依赖边排序，上下文代理边和可选边不参与

use di_abstractions::{
    BoundDependency, CapabilityBinding, ComponentDefinition, ConditionContext, ContainerConfig,
    DefinitionRegistry, DependencyGraphResolver, DependencyRef, DependencyTarget, EdgeKind,
    ResolutionPlan,
};
use infrastructure_common::DependencyError;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// 依赖边
#[derive(Debug, Clone, PartialEq, Eq)]
struct DependencyEdge {
    consumer: String,
    supplier: String,
    required: bool,
}

/// 依赖图解析器实现
#[derive(Debug, Default, Clone, Copy)]
pub struct DependencyGraphResolverImpl;

impl DependencyGraphResolverImpl {
    /// 创建解析器
    pub fn new() -> Self {
        Self
    }

    fn decide_activation(
        &self,
        registry: &dyn DefinitionRegistry,
        config: &ContainerConfig,
    ) -> Result<HashMap<String, bool>, DependencyError> {
        let mut decided = HashMap::new();
        let mut path = Vec::new();
        for definition in registry.definitions() {
            self.decide(definition, registry, config, &mut decided, &mut path)?;
        }
        Ok(decided)
    }

    fn decide(
        &self,
        definition: &ComponentDefinition,
        registry: &dyn DefinitionRegistry,
        config: &ContainerConfig,
        decided: &mut HashMap<String, bool>,
        path: &mut Vec<String>,
    ) -> Result<bool, DependencyError> {
        if let Some(active) = decided.get(&definition.name) {
            return Ok(*active);
        }
        if let Some(start) = path.iter().position(|n| n == &definition.name) {
            let mut cycle = path[start..].to_vec();
            cycle.push(definition.name.clone());
            return Err(DependencyError::CircularDependency { cycle });
        }

        path.push(definition.name.clone());
        let references: Vec<String> = {
            let ctx = ActivationContext {
                registry,
                config,
                decided: &*decided,
            };
            definition
                .conditions
                .iter()
                .flat_map(|c| c.references(&definition.name, &ctx))
                .collect()
        };
        for reference in references {
            if let Ok(referenced) = registry.lookup_by_name(&reference) {
                self.decide(referenced, registry, config, decided, path)?;
            }
        }
        path.pop();

        let active = {
            let ctx = ActivationContext {
                registry,
                config,
                decided: &*decided,
            };
            definition
                .conditions
                .iter()
                .all(|c| c.evaluate(&definition.name, &ctx))
        };
        if !active {
            info!("组件 {} 未满足激活条件，已排除", definition.name);
        }
        decided.insert(definition.name.clone(), active);
        Ok(active)
    }

    fn bind(
        &self,
        consumer: &ComponentDefinition,
        dependency: &DependencyRef,
        registry: &dyn DefinitionRegistry,
        decided: &HashMap<String, bool>,
    ) -> Result<BoundDependency, DependencyError> {
        let is_active = |name: &str| decided.get(name).copied().unwrap_or(false);

        let supplier = match &dependency.target {
            DependencyTarget::Name(name) => match registry.lookup_by_name(name) {
                Ok(definition) if is_active(&definition.name) => definition,
                Ok(_) => return missing(consumer, dependency, "组件已被激活条件排除"),
                Err(_) => return missing(consumer, dependency, "组件未注册"),
            },
            DependencyTarget::Capability(capability) => {
                let providers: Vec<&ComponentDefinition> = registry
                    .lookup_by_capability(capability)
                    .into_iter()
                    .filter(|d| d.name != consumer.name)
                    .collect();
                let candidates: Vec<&ComponentDefinition> = providers
                    .iter()
                    .copied()
                    .filter(|d| is_active(&d.name))
                    .collect();
                if candidates.is_empty() {
                    let reason = if providers.is_empty() {
                        "没有组件提供该能力"
                    } else {
                        "提供该能力的组件均已被激活条件排除"
                    };
                    return missing(consumer, dependency, reason);
                }
                select_candidate(&candidates).map_err(|candidates| {
                    DependencyError::AmbiguousDependency {
                        consumer: consumer.name.clone(),
                        reference: capability.clone(),
                        candidates,
                    }
                })?
            }
        };

        let edge = match supplier.scope.context_kind() {
            Some(kind) if consumer.scope.context_kind() != Some(kind) => EdgeKind::Contextual,
            _ => EdgeKind::Direct,
        };

        Ok(BoundDependency {
            key: dependency.key().to_string(),
            supplier: Some(supplier.name.clone()),
            required: dependency.required,
            edge,
        })
    }

    fn validate_setters(
        &self,
        definition: &ComponentDefinition,
        bound: &[BoundDependency],
    ) -> Result<(), DependencyError> {
        for setter in &definition.setters {
            match bound.iter().find(|b| b.key == setter.key) {
                None => {
                    return Err(DependencyError::unresolved(
                        &definition.name,
                        &setter.key,
                        "setter 对应的依赖未声明",
                    ))
                }
                Some(dependency) if dependency.edge == EdgeKind::Contextual => {
                    return Err(DependencyError::ScopeMismatch {
                        component: definition.name.clone(),
                        expected: format!("{} 的直接实例", setter.key),
                        actual: "上下文作用域代理".to_string(),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn topological_order(
        &self,
        registry: &dyn DefinitionRegistry,
        decided: &HashMap<String, bool>,
        edges: &[DependencyEdge],
    ) -> Result<Vec<String>, DependencyError> {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in edges.iter().filter(|e| e.required) {
            adjacency
                .entry(edge.consumer.as_str())
                .or_default()
                .push(edge.supplier.as_str());
        }

        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        for definition in registry.definitions() {
            if decided.get(&definition.name).copied().unwrap_or(false) {
                visit(
                    definition.name.as_str(),
                    &adjacency,
                    &mut visited,
                    &mut path,
                    &mut order,
                )?;
            }
        }
        Ok(order)
    }

    fn bind_capabilities(
        &self,
        registry: &dyn DefinitionRegistry,
        decided: &HashMap<String, bool>,
    ) -> HashMap<String, CapabilityBinding> {
        let mut capabilities = HashMap::new();
        for definition in registry.definitions() {
            for capability in &definition.capabilities {
                if capabilities.contains_key(capability) {
                    continue;
                }
                let candidates: Vec<&ComponentDefinition> = registry
                    .lookup_by_capability(capability)
                    .into_iter()
                    .filter(|d| decided.get(&d.name).copied().unwrap_or(false))
                    .collect();
                if candidates.is_empty() {
                    continue;
                }
                let binding = match select_candidate(&candidates) {
                    Ok(definition) => CapabilityBinding::Bound(definition.name.clone()),
                    Err(names) => CapabilityBinding::Ambiguous(names),
                };
                capabilities.insert(capability.clone(), binding);
            }
        }
        capabilities
    }
}

impl DependencyGraphResolver for DependencyGraphResolverImpl {
    fn resolve(
        &self,
        registry: &dyn DefinitionRegistry,
        config: &ContainerConfig,
    ) -> Result<ResolutionPlan, DependencyError> {
        info!("开始解析依赖图，共 {} 个组件", registry.len());

        let decided = self.decide_activation(registry, config)?;
        let pruned: Vec<String> = registry
            .definitions()
            .iter()
            .filter(|d| !decided.get(&d.name).copied().unwrap_or(false))
            .map(|d| d.name.clone())
            .collect();

        let mut dependencies = HashMap::new();
        let mut edges = Vec::new();
        for definition in registry.definitions() {
            if !decided.get(&definition.name).copied().unwrap_or(false) {
                continue;
            }
            let bound = definition
                .dependencies
                .iter()
                .map(|dependency| self.bind(definition, dependency, registry, &decided))
                .collect::<Result<Vec<_>, _>>()?;
            self.validate_setters(definition, &bound)?;

            for dependency in &bound {
                if let (Some(supplier), EdgeKind::Direct) = (&dependency.supplier, dependency.edge)
                {
                    edges.push(DependencyEdge {
                        consumer: definition.name.clone(),
                        supplier: supplier.clone(),
                        required: dependency.required,
                    });
                }
            }
            debug!("组件 {} 的依赖绑定: {:?}", definition.name, bound);
            dependencies.insert(definition.name.clone(), bound);
        }

        let order = self.topological_order(registry, &decided, &edges)?;
        let capabilities = self.bind_capabilities(registry, &decided);

        info!(
            "依赖图解析完成: {} 个组件激活, {} 个组件被排除",
            order.len(),
            pruned.len()
        );
        debug!("组件创建顺序: {:?}", order);

        Ok(ResolutionPlan {
            order,
            pruned,
            dependencies,
            capabilities,
        })
    }
}

/// 激活决定阶段使用的条件上下文
struct ActivationContext<'a> {
    registry: &'a dyn DefinitionRegistry,
    config: &'a ContainerConfig,
    decided: &'a HashMap<String, bool>,
}

impl ConditionContext for ActivationContext<'_> {
    fn is_profile_active(&self, profile: &str) -> bool {
        self.config.active_profiles.iter().any(|p| p == profile)
    }

    fn property(&self, key: &str) -> Option<&str> {
        self.config.properties.get(key).map(String::as_str)
    }

    fn is_active(&self, component: &str) -> bool {
        self.decided.get(component).copied().unwrap_or(false)
    }

    fn capability_providers(&self, capability: &str) -> Vec<String> {
        self.registry
            .lookup_by_capability(capability)
            .into_iter()
            .map(|d| d.name.clone())
            .collect()
    }
}

fn missing(
    consumer: &ComponentDefinition,
    dependency: &DependencyRef,
    reason: &str,
) -> Result<BoundDependency, DependencyError> {
    if dependency.required {
        return Err(DependencyError::unresolved(
            &consumer.name,
            dependency.target.to_string(),
            reason,
        ));
    }
    debug!(
        "组件 {} 的可选依赖 {} 不可用: {}",
        consumer.name, dependency.target, reason
    );
    Ok(BoundDependency {
        key: dependency.key().to_string(),
        supplier: None,
        required: false,
        edge: EdgeKind::Absent,
    })
}

/// 在多个候选中选择：唯一候选直接胜出，否则需要恰好一个首选
///
/// 歧义时返回按名称排序的候选列表，与注册顺序无关。
fn select_candidate<'a>(
    candidates: &[&'a ComponentDefinition],
) -> Result<&'a ComponentDefinition, Vec<String>> {
    if let [only] = candidates {
        return Ok(*only);
    }
    let primaries: Vec<&'a ComponentDefinition> =
        candidates.iter().copied().filter(|d| d.primary).collect();
    let ambiguous = match primaries.as_slice() {
        [primary] => return Ok(*primary),
        [] => candidates,
        many => many,
    };
    let mut names: Vec<String> = ambiguous.iter().map(|d| d.name.clone()).collect();
    names.sort_unstable();
    Err(names)
}

fn visit<'a>(
    node: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
    order: &mut Vec<String>,
) -> Result<(), DependencyError> {
    if let Some(start) = path.iter().position(|n| *n == node) {
        let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
        cycle.push(node.to_string());
        return Err(DependencyError::CircularDependency { cycle });
    }
    if visited.contains(node) {
        return Ok(());
    }

    path.push(node);
    if let Some(suppliers) = adjacency.get(node) {
        for supplier in suppliers {
            visit(supplier, adjacency, visited, path, order)?;
        }
    }
    path.pop();

    visited.insert(node);
    order.push(node.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DefinitionRegistryImpl;
    use di_abstractions::Condition;
    use infrastructure_common::ScopeKind;

    #[derive(Debug)]
    struct Stub;

    fn component(name: &str) -> ComponentDefinition {
        ComponentDefinition::new(name, |_| Ok(Stub))
    }

    fn resolve(
        definitions: Vec<ComponentDefinition>,
        config: &ContainerConfig,
    ) -> Result<ResolutionPlan, DependencyError> {
        let mut registry = DefinitionRegistryImpl::new();
        for definition in definitions {
            registry.register(definition).unwrap();
        }
        DependencyGraphResolverImpl::new().resolve(&registry, config)
    }

    #[test]
    fn test_order_respects_required_dependencies() {
        let plan = resolve(
            vec![
                component("service")
                    .depends_on(DependencyRef::name("repository"))
                    .depends_on(DependencyRef::capability("Clock")),
                component("repository").depends_on(DependencyRef::name("pool")),
                component("pool"),
                component("clock").provides("Clock"),
            ],
            &ContainerConfig::default(),
        )
        .unwrap();

        assert_eq!(plan.order, vec!["pool", "repository", "clock", "service"]);
        let clock = &plan.dependencies_of("service")[1];
        assert_eq!(clock.supplier.as_deref(), Some("clock"));
        assert_eq!(clock.edge, EdgeKind::Direct);
    }

    #[test]
    fn test_required_cycle_reported_with_path() {
        let error = resolve(
            vec![
                component("a").depends_on(DependencyRef::name("b")),
                component("b").depends_on(DependencyRef::name("c")),
                component("c").depends_on(DependencyRef::name("a")),
            ],
            &ContainerConfig::default(),
        )
        .unwrap_err();

        assert_eq!(
            error,
            DependencyError::CircularDependency {
                cycle: vec!["a".into(), "b".into(), "c".into(), "a".into()]
            }
        );
    }

    #[test]
    fn test_optional_cycle_is_not_an_ordering_constraint() {
        let plan = resolve(
            vec![
                component("a").depends_on(DependencyRef::name("b")),
                component("b").depends_on(DependencyRef::name("a").optional()),
            ],
            &ContainerConfig::default(),
        )
        .unwrap();
        assert_eq!(plan.order, vec!["b", "a"]);
    }

    #[test]
    fn test_primary_breaks_capability_tie() {
        let plan = resolve(
            vec![
                component("pg").provides("Store"),
                component("memory").provides("Store").primary(),
                component("service").depends_on(DependencyRef::capability("Store")),
            ],
            &ContainerConfig::default(),
        )
        .unwrap();

        assert_eq!(
            plan.dependencies_of("service")[0].supplier.as_deref(),
            Some("memory")
        );
        assert_eq!(
            plan.capabilities.get("Store"),
            Some(&CapabilityBinding::Bound("memory".into()))
        );
    }

    #[test]
    fn test_ambiguous_capability_rejected() {
        let error = resolve(
            vec![
                component("pg").provides("Store"),
                component("memory").provides("Store"),
                component("service").depends_on(DependencyRef::capability("Store")),
            ],
            &ContainerConfig::default(),
        )
        .unwrap_err();

        assert_eq!(
            error,
            DependencyError::AmbiguousDependency {
                consumer: "service".into(),
                reference: "Store".into(),
                candidates: vec!["memory".into(), "pg".into()],
            }
        );
    }

    #[test]
    fn test_two_primaries_are_ambiguous() {
        let error = resolve(
            vec![
                component("pg").provides("Store").primary(),
                component("memory").provides("Store").primary(),
                component("service").depends_on(DependencyRef::capability("Store")),
            ],
            &ContainerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(error, DependencyError::AmbiguousDependency { .. }));
    }

    #[test]
    fn test_missing_dependencies() {
        let error = resolve(
            vec![component("service").depends_on(DependencyRef::name("ghost"))],
            &ContainerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            error,
            DependencyError::UnresolvedDependency { ref consumer, .. } if consumer == "service"
        ));

        let plan = resolve(
            vec![component("service").depends_on(DependencyRef::name("ghost").optional())],
            &ContainerConfig::default(),
        )
        .unwrap();
        let ghost = &plan.dependencies_of("service")[0];
        assert_eq!(ghost.edge, EdgeKind::Absent);
        assert!(ghost.supplier.is_none());
    }

    #[test]
    fn test_pruned_supplier_is_unresolved() {
        let error = resolve(
            vec![
                component("dev_store").when(Condition::profile("dev")),
                component("service").depends_on(DependencyRef::name("dev_store")),
            ],
            &ContainerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(error, DependencyError::UnresolvedDependency { .. }));
    }

    #[test]
    fn test_fallback_activation() {
        let definitions = || {
            vec![
                component("fallback_cache")
                    .provides("Cache")
                    .when(Condition::on_missing_capability("Cache")),
                component("redis_cache")
                    .provides("Cache")
                    .when(Condition::profile("prod")),
            ]
        };

        let plan = resolve(definitions(), &ContainerConfig::default()).unwrap();
        assert!(plan.is_active("fallback_cache"));
        assert!(plan.is_pruned("redis_cache"));

        let plan = resolve(definitions(), &ContainerConfig::default().with_profile("prod")).unwrap();
        assert!(plan.is_active("redis_cache"));
        assert!(plan.is_pruned("fallback_cache"));
        assert_eq!(plan.pruned, vec!["fallback_cache"]);
    }

    #[test]
    fn test_condition_reference_cycle() {
        let error = resolve(
            vec![
                component("a")
                    .provides("Cache")
                    .when(Condition::on_missing_capability("Cache")),
                component("b")
                    .provides("Cache")
                    .when(Condition::on_missing_capability("Cache")),
            ],
            &ContainerConfig::default(),
        )
        .unwrap_err();
        assert_eq!(
            error,
            DependencyError::CircularDependency {
                cycle: vec!["a".into(), "b".into(), "a".into()]
            }
        );
    }

    #[test]
    fn test_contextual_edge_excluded_from_ordering() {
        let plan = resolve(
            vec![
                component("handler").depends_on(DependencyRef::name("request_user")),
                component("request_user")
                    .with_scope(ScopeKind::request())
                    .depends_on(DependencyRef::name("handler")),
            ],
            &ContainerConfig::default(),
        )
        .unwrap();

        assert_eq!(plan.dependencies_of("handler")[0].edge, EdgeKind::Contextual);
        assert_eq!(plan.dependencies_of("request_user")[0].edge, EdgeKind::Direct);
        assert_eq!(plan.order, vec!["handler", "request_user"]);
    }

    #[test]
    fn test_setter_must_match_declared_direct_dependency() {
        let error = resolve(
            vec![
                component("clock"),
                component("service").with_setter::<Stub, Stub, _>("clock", |_, _| Ok(())),
            ],
            &ContainerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(error, DependencyError::UnresolvedDependency { .. }));

        let error = resolve(
            vec![
                component("user").with_scope(ScopeKind::request()),
                component("service")
                    .depends_on(DependencyRef::name("user"))
                    .with_setter::<Stub, Stub, _>("user", |_, _| Ok(())),
            ],
            &ContainerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(error, DependencyError::ScopeMismatch { .. }));
    }
}
