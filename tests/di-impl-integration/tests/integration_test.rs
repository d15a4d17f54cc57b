//! 容器行为的集中集成测试

use di_abstractions::{
    ComponentDefinition, ComponentResolver, Condition, ContainerBuilder, ContainerConfig,
    DefinitionRegistry, DependencyRef, IocContainer,
};
use di_impl::{DiContainer, DiContainerBuilder};
use infrastructure_common::{DependencyError, LifecyclePhase, LifecycleState, ScopeKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

/// 按发生顺序记录事件
#[derive(Debug, Default, Clone)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn record(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Debug)]
struct Service(&'static str);

fn service(name: &'static str, journal: &Journal) -> ComponentDefinition {
    let created = journal.clone();
    let destroyed = journal.clone();
    ComponentDefinition::new(name, move |_| {
        created.record(format!("create:{}", name));
        Ok(Service(name))
    })
    .on_pre_destroy(move |s: &Service| {
        destroyed.record(format!("destroy:{}", s.0));
        Ok(())
    })
}

fn builder_with(definitions: Vec<ComponentDefinition>) -> DiContainerBuilder {
    let mut builder = DiContainer::builder();
    builder.register_all(definitions).unwrap();
    builder
}

fn build(definitions: Vec<ComponentDefinition>) -> Result<DiContainer, DependencyError> {
    builder_with(definitions).build()
}

#[test]
fn test_creation_follows_topological_order() {
    let journal = Journal::default();
    let container = build(vec![
        service("web", &journal)
            .depends_on(DependencyRef::name("orders"))
            .depends_on(DependencyRef::name("users")),
        service("orders", &journal)
            .depends_on(DependencyRef::name("db"))
            .depends_on(DependencyRef::capability("Clock")),
        service("users", &journal).depends_on(DependencyRef::name("db")),
        service("db", &journal),
        service("clock", &journal).provides("Clock"),
    ])
    .unwrap();

    let order = &container.plan().order;
    for definition in container.registry().definitions() {
        let consumer = container.plan().position(&definition.name).unwrap();
        for bound in container.plan().dependencies_of(&definition.name) {
            let supplier = bound.supplier.as_deref().unwrap();
            assert!(container.plan().position(supplier).unwrap() < consumer);
        }
    }

    let created: Vec<String> = order.iter().map(|n| format!("create:{}", n)).collect();
    assert_eq!(journal.entries(), created);
}

#[test]
fn test_singleton_and_prototype_identity() {
    let container = build(vec![
        ComponentDefinition::new("config", |_| Ok(Service("config"))),
        ComponentDefinition::new("request_id", |_| Ok(Service("request_id")))
            .with_scope(ScopeKind::Prototype),
    ])
    .unwrap();

    let a = container.get::<Service>("config").unwrap();
    let b = container.get::<Service>("config").unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let x = container.get::<Service>("request_id").unwrap();
    let y = container.get::<Service>("request_id").unwrap();
    assert!(!Arc::ptr_eq(&x, &y));
}

#[test]
fn test_two_component_cycle() {
    let journal = Journal::default();
    let error = build(vec![
        service("a", &journal).depends_on(DependencyRef::name("b")),
        service("b", &journal).depends_on(DependencyRef::name("a")),
    ])
    .unwrap_err();

    assert_eq!(
        error,
        DependencyError::CircularDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()]
        }
    );
    assert_eq!(error.to_string(), "检测到循环依赖: a -> b -> a");
    assert!(journal.entries().is_empty());
}

#[test]
fn test_ambiguity_resolved_by_primary() {
    let journal = Journal::default();
    let definitions = |primary: bool| {
        let memory = service("memory_store", &journal).provides("Store");
        vec![
            service("pg_store", &journal).provides("Store"),
            if primary { memory.primary() } else { memory },
            service("orders", &journal).depends_on(DependencyRef::capability("Store")),
        ]
    };

    match build(definitions(false)).unwrap_err() {
        DependencyError::AmbiguousDependency {
            consumer,
            reference,
            candidates,
        } => {
            assert_eq!(consumer, "orders");
            assert_eq!(reference, "Store");
            assert_eq!(candidates, vec!["memory_store", "pg_store"]);
        }
        other => panic!("unexpected error: {other}"),
    }

    let container = build(definitions(true)).unwrap();
    assert_eq!(container.get_by_capability::<Service>("Store").unwrap().0, "memory_store");
}

#[test]
fn test_ambiguous_capability_lookup_without_consumers() {
    let journal = Journal::default();
    let container = build(vec![
        service("pg_store", &journal).provides("Store"),
        service("memory_store", &journal).provides("Store"),
    ])
    .unwrap();

    assert!(matches!(
        container.get_by_capability::<Service>("Store"),
        Err(DependencyError::AmbiguousDependency { .. })
    ));
    assert_eq!(container.get::<Service>("pg_store").unwrap().0, "pg_store");
}

#[test]
fn test_contextual_lookup_and_exit() {
    let journal = Journal::default();
    let container = build(vec![
        service("session_cart", &journal).with_scope(ScopeKind::session())
    ])
    .unwrap();

    assert!(matches!(
        container.get::<Service>("session_cart"),
        Err(DependencyError::ScopeNotActive { ref scope, .. }) if scope == "session"
    ));

    let session = container.enter_context("session");
    let first = container.get::<Service>("session_cart").unwrap();
    let second = container.get::<Service>("session_cart").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    container.exit_context(&session).unwrap();

    assert_eq!(
        journal.entries(),
        vec!["create:session_cart", "destroy:session_cart"]
    );
}

#[test]
fn test_eager_hook_failure_aborts_build() {
    let journal = Journal::default();
    let error = build(vec![
        service("db", &journal),
        service("cache", &journal)
            .depends_on(DependencyRef::name("db"))
            .on_post_init(|_: &Service| anyhow::bail!("缓存预热失败")),
    ])
    .unwrap_err();

    assert_eq!(
        error,
        DependencyError::LifecycleHookFailure {
            component: "cache".into(),
            phase: LifecyclePhase::PostInit,
            message: "缓存预热失败".into(),
        }
    );
    assert_eq!(
        journal.entries(),
        vec!["create:db", "create:cache", "destroy:db"]
    );
}

#[test]
fn test_lazy_hook_failure_fails_only_that_lookup() {
    let journal = Journal::default();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let container = build(vec![
        service("db", &journal),
        service("report", &journal)
            .lazy()
            .on_post_init(move |_: &Service| {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("模板缺失")
            }),
    ])
    .unwrap();

    let first = container.get::<Service>("report").unwrap_err();
    let second = container.get::<Service>("report").unwrap_err();
    assert_eq!(first, second);
    assert!(matches!(
        first,
        DependencyError::LifecycleHookFailure {
            phase: LifecyclePhase::PostInit,
            ..
        }
    ));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(container.state_of("report"), Some(LifecycleState::Failed));
    assert_eq!(container.get::<Service>("db").unwrap().0, "db");
    assert_eq!(container.stats().failed_creations, 1);
}

#[test]
fn test_shutdown_tears_down_in_reverse_creation_order() {
    let journal = Journal::default();
    let container = build(vec![
        service("api", &journal).depends_on(DependencyRef::name("repo")),
        service("repo", &journal).depends_on(DependencyRef::name("pool")),
        service("pool", &journal),
        service("tmp", &journal).with_scope(ScopeKind::Prototype),
    ])
    .unwrap();
    container.get::<Service>("tmp").unwrap();

    container.shutdown().unwrap();
    assert_eq!(
        journal.entries(),
        vec![
            "create:pool",
            "create:repo",
            "create:api",
            "create:tmp",
            "destroy:api",
            "destroy:repo",
            "destroy:pool",
        ]
    );
    assert_eq!(container.state_of("pool"), Some(LifecycleState::Destroyed));
}

#[test]
fn test_teardown_failures_do_not_stop_teardown() {
    let journal = Journal::default();
    let container = build(vec![
        service("first", &journal),
        service("second", &journal).on_pre_destroy(|_: &Service| anyhow::bail!("句柄已失效")),
        service("third", &journal),
    ])
    .unwrap();

    match container.shutdown() {
        Err(infrastructure_common::LifecycleError::TeardownIncomplete { failures }) => {
            assert_eq!(failures.len(), 1);
            assert!(matches!(
                failures[0],
                DependencyError::LifecycleHookFailure {
                    phase: LifecyclePhase::PreDestroy,
                    ..
                }
            ));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(
        journal.entries()[3..],
        ["destroy:third", "destroy:second", "destroy:first"]
    );
}

#[test]
fn test_drop_shuts_down_container() {
    let journal = Journal::default();
    {
        let _container = build(vec![service("pool", &journal)]).unwrap();
    }
    assert_eq!(journal.entries(), vec!["create:pool", "destroy:pool"]);
}

#[test]
fn test_concurrent_first_access_creates_once() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let container = Arc::new(
        build(vec![ComponentDefinition::new("index", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            Ok(Service("index"))
        })
        .lazy()])
        .unwrap(),
    );

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let container = container.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                container.get::<Service>("index").unwrap()
            })
        })
        .collect();

    let instances: Vec<Arc<Service>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
}

#[test]
fn test_concurrent_failure_observed_by_all_waiters() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let container = Arc::new(
        build(vec![ComponentDefinition::new("index", move |_| -> anyhow::Result<Service> {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            anyhow::bail!("索引损坏")
        })
        .lazy()])
        .unwrap(),
    );

    let barrier = Arc::new(Barrier::new(4));
    let errors: Vec<DependencyError> = (0..4)
        .map(|_| {
            let container = container.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                container.get::<Service>("index").unwrap_err()
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert!(errors.iter().all(|e| *e == errors[0]));
}

#[test]
fn test_contexts_on_different_threads_are_isolated() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let container = Arc::new(
        build(vec![ComponentDefinition::new("request_state", move |_| {
            Ok(counter.fetch_add(1, Ordering::SeqCst))
        })
        .with_scope(ScopeKind::request())])
        .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let container = container.clone();
            thread::spawn(move || {
                let context = container.enter_context("request");
                let first = container.get::<usize>("request_state").unwrap();
                let second = container.get::<usize>("request_state").unwrap();
                assert!(Arc::ptr_eq(&first, &second));
                container.exit_context(&context).unwrap();
                *first
            })
        })
        .collect();

    let mut values: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    values.sort_unstable();
    assert_eq!(values, vec![0, 1, 2, 3]);
    assert_eq!(container.stats().active_contexts, 0);
}

#[test]
fn test_profile_and_property_conditions() {
    let journal = Journal::default();
    let definitions = || {
        vec![
            service("mock_payment", &journal)
                .provides("Payment")
                .when(Condition::profile("test")),
            service("real_payment", &journal)
                .provides("Payment")
                .when(Condition::profile_expr("!test")),
            service("metrics", &journal).when(Condition::property("metrics.enabled", None)),
            service("eu_tax", &journal).when(Condition::property("region", Some("eu"))),
        ]
    };

    let container = builder_with(definitions())
        .with_config(ContainerConfig::default().with_profile("test"))
        .build()
        .unwrap();
    assert_eq!(container.get_by_capability::<Service>("Payment").unwrap().0, "mock_payment");
    assert!(!container.can_resolve("metrics"));
    assert!(!container.can_resolve("eu_tax"));

    let container = builder_with(definitions())
        .with_config(
            ContainerConfig::default()
                .with_property("metrics.enabled", "true")
                .with_property("region", "us"),
        )
        .build()
        .unwrap();
    assert_eq!(container.get_by_capability::<Service>("Payment").unwrap().0, "real_payment");
    assert!(container.can_resolve("metrics"));
    assert!(!container.can_resolve("eu_tax"));
}

#[test]
fn test_missing_capability_fallback() {
    let journal = Journal::default();
    let definitions = |with_redis: bool| {
        let mut definitions = vec![service("local_cache", &journal)
            .provides("Cache")
            .when(Condition::on_missing_capability("Cache"))];
        if with_redis {
            definitions.push(service("redis_cache", &journal).provides("Cache"));
        }
        definitions.push(service("catalog", &journal).depends_on(DependencyRef::capability("Cache")));
        definitions
    };

    let container = build(definitions(false)).unwrap();
    assert_eq!(container.get_by_capability::<Service>("Cache").unwrap().0, "local_cache");

    let container = build(definitions(true)).unwrap();
    assert_eq!(container.get_by_capability::<Service>("Cache").unwrap().0, "redis_cache");
    assert_eq!(container.plan().pruned, vec!["local_cache"]);
    assert!(matches!(
        container.get::<Service>("local_cache"),
        Err(DependencyError::UnresolvedDependency { .. })
    ));
}

#[test]
fn test_requiring_pruned_component_fails_build() {
    let journal = Journal::default();
    let error = build(vec![
        service("profiler", &journal).when(Condition::profile("dev")),
        service("api", &journal).depends_on(DependencyRef::name("profiler")),
    ])
    .unwrap_err();

    assert!(error.is_configuration_error());
    assert!(matches!(
        error,
        DependencyError::UnresolvedDependency { ref consumer, ref reference, .. }
            if consumer == "api" && reference == "name:profiler"
    ));
}

#[test]
fn test_duplicate_registration_rejected() {
    let journal = Journal::default();
    let mut builder = DiContainer::builder();
    builder.register(service("db", &journal)).unwrap();
    let error = builder.register(service("db", &journal)).unwrap_err();
    assert_eq!(
        error,
        DependencyError::DuplicateDefinition {
            name: "db".to_string()
        }
    );
}

#[test]
fn test_stats_serialize() {
    let journal = Journal::default();
    let container = build(vec![
        service("db", &journal),
        service("report", &journal).lazy(),
    ])
    .unwrap();

    let stats = serde_json::to_value(container.stats()).unwrap();
    assert_eq!(stats["registered_components"], 2);
    assert_eq!(stats["ready_singletons"], 1);
    assert_eq!(stats["created_instances"], 1);
}

#[test]
fn test_registration_order_does_not_change_plan() {
    let journal = Journal::default();
    let definitions = |reversed: bool| {
        let mut definitions = vec![
            service("pg_store", &journal).provides("Store").primary(),
            service("memory_store", &journal).provides("Store"),
            service("sqlite_store", &journal)
                .provides("Store")
                .when(Condition::profile("embedded")),
            service("local_cache", &journal)
                .provides("Cache")
                .when(Condition::on_missing_capability("Cache")),
            service("redis_cache", &journal).provides("Cache"),
            service("wall_clock", &journal).provides("Clock"),
            service("audit_clock", &journal).provides("Clock"),
            service("orders", &journal)
                .depends_on(DependencyRef::capability("Store"))
                .depends_on(DependencyRef::name("redis_cache"))
                .depends_on(DependencyRef::capability("Metrics").optional()),
            service("web", &journal).depends_on(DependencyRef::name("orders")),
        ];
        if reversed {
            definitions.reverse();
        }
        definitions
    };

    let forward = build(definitions(false)).unwrap();
    let backward = build(definitions(true)).unwrap();

    let mut pruned = forward.plan().pruned.clone();
    pruned.sort();
    assert_eq!(pruned, vec!["local_cache", "sqlite_store"]);
    let mut other_pruned = backward.plan().pruned.clone();
    other_pruned.sort();
    assert_eq!(pruned, other_pruned);

    assert_eq!(forward.plan().dependencies, backward.plan().dependencies);
    assert_eq!(forward.plan().capabilities, backward.plan().capabilities);

    let mut order = forward.plan().order.clone();
    let mut other_order = backward.plan().order.clone();
    order.sort();
    other_order.sort();
    assert_eq!(order, other_order);
    for container in [&forward, &backward] {
        let plan = container.plan();
        for (consumer, bound) in &plan.dependencies {
            for supplier in bound.iter().filter(|b| b.required).filter_map(|b| b.supplier.as_deref()) {
                assert!(plan.position(supplier).unwrap() < plan.position(consumer).unwrap());
            }
        }
    }

    assert_eq!(
        forward.get_by_capability::<Service>("Store").unwrap().0,
        backward.get_by_capability::<Service>("Store").unwrap().0
    );
    let ambiguous = forward.get_by_capability::<Service>("Clock").unwrap_err();
    assert_eq!(ambiguous, backward.get_by_capability::<Service>("Clock").unwrap_err());
    assert!(matches!(
        ambiguous,
        DependencyError::AmbiguousDependency { ref candidates, .. }
            if *candidates == vec!["audit_clock", "wall_clock"]
    ));

    let with_consumer = |reversed: bool| {
        let mut definitions = definitions(false);
        definitions.push(service("reporter", &journal).depends_on(DependencyRef::capability("Clock")));
        if reversed {
            definitions.reverse();
        }
        build(definitions).unwrap_err()
    };
    assert_eq!(with_consumer(false), with_consumer(true));
}

#[derive(Debug)]
struct Scheduler {
    clock: Option<Arc<Service>>,
}

#[test]
fn test_optional_dependency_waits_for_creation_on_other_thread() {
    let (started, started_rx) = mpsc::channel();
    let started = Mutex::new(started);
    let container = Arc::new(
        build(vec![
            ComponentDefinition::new("clock", move |_| {
                started.lock().unwrap().send(()).unwrap();
                thread::sleep(Duration::from_millis(300));
                Ok(Service("clock"))
            })
            .lazy(),
            ComponentDefinition::new("scheduler", |deps| {
                Ok(Scheduler {
                    clock: deps.optional::<Service>("clock")?,
                })
            })
            .depends_on(DependencyRef::name("clock").optional())
            .lazy(),
        ])
        .unwrap(),
    );

    let creator = {
        let container = container.clone();
        thread::spawn(move || container.get::<Service>("clock").unwrap())
    };
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let scheduler = container.get::<Scheduler>("scheduler").unwrap();
    let clock = creator.join().unwrap();
    let injected = scheduler.clock.as_ref().expect("clock should be injected");
    assert!(Arc::ptr_eq(injected, &clock));
    assert!(Arc::ptr_eq(injected, &container.get::<Service>("clock").unwrap()));
}
