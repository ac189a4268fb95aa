//! Integration tests for container resolution semantics
//!
//! Covers singleton identity, transient freshness, missing concrete
//! implementations and dependency cycles, both declared and discovered at
//! runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use schemata_core::{
    injectable, Autowired, Container, ContainerBuilder, ContainerError, ContainerResult,
    Injectable, ServiceId, ServiceScope,
};

trait Connection: Send + Sync {
    fn dsn(&self) -> &str;
}

struct SqliteConnection;

impl Connection for SqliteConnection {
    fn dsn(&self) -> &str {
        "sqlite::memory:"
    }
}

injectable!(SqliteConnection {});

struct SchemaInspector {
    connection: Arc<dyn Connection>,
}

injectable!(SchemaInspector {
    connection: Arc<dyn Connection>,
});

/// Counts constructions so transient vs singleton behaviour is observable
struct Counted {
    serial: usize,
}

static BUILT: AtomicUsize = AtomicUsize::new(0);

impl Injectable for Counted {
    fn dependencies() -> Vec<ServiceId> {
        Vec::new()
    }

    fn create(_container: &Container) -> ContainerResult<Self> {
        Ok(Counted {
            serial: BUILT.fetch_add(1, Ordering::SeqCst),
        })
    }
}

// A -> B -> A, declared statically
struct CycleA {
    _b: Arc<CycleB>,
}

struct CycleB {
    _a: Arc<CycleA>,
}

injectable!(CycleA { _b: Arc<CycleB> });
injectable!(CycleB { _a: Arc<CycleA> });

// Concrete chain with nothing bound: Report -> Formatter -> Counted
struct Formatter {
    counted: Autowired<Counted>,
}

injectable!(Formatter {
    counted: Autowired<Counted>,
});

struct Report {
    formatter: Autowired<Formatter>,
    connection: Option<Arc<dyn Connection>>,
}

injectable!(Report {
    formatter: Autowired<Formatter>,
    connection: Option<Arc<dyn Connection>>,
});

// A -> B -> A through autowired parameters
struct LoopA {
    _b: Autowired<LoopB>,
}

struct LoopB {
    _a: Autowired<LoopA>,
}

injectable!(LoopA { _b: Autowired<LoopB> });
injectable!(LoopB { _a: Autowired<LoopA> });

#[test]
fn test_singleton_bound_type_resolves_to_identical_instance() {
    let mut container = Container::new();
    container.bind_singleton::<dyn Connection, SqliteConnection, _>(|c| c);

    let first = container.resolve::<dyn Connection>().unwrap();
    let second = container.resolve::<dyn Connection>().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.dsn(), "sqlite::memory:");
}

#[test]
fn test_transient_bound_type_resolves_to_independent_instances() {
    let mut container = Container::new();
    container.bind_injectable::<Counted>(ServiceScope::Transient);

    let first = container.resolve::<Counted>().unwrap();
    let second = container.resolve::<Counted>().unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_ne!(first.serial, second.serial);
    assert_eq!(container.cached_count(), 0);
}

#[test]
fn test_dependencies_resolve_recursively() {
    let container = ContainerBuilder::new()
        .singleton::<dyn Connection, SqliteConnection, _>(|c| c)
        .injectable::<SchemaInspector>(ServiceScope::Transient)
        .build()
        .unwrap();

    let inspector = container.resolve::<SchemaInspector>().unwrap();
    assert_eq!(inspector.connection.dsn(), "sqlite::memory:");
}

#[test]
fn test_unregistered_dependency_fails_with_concrete_class_not_found() {
    let mut container = Container::new();
    container.bind_injectable::<SchemaInspector>(ServiceScope::Transient);

    let err = container.resolve::<SchemaInspector>().err().unwrap();
    assert!(err.is_concrete_class_not_found());
    assert!(err.missing_service().unwrap().contains("Connection"));

    let err = container.resolve_injectable::<SchemaInspector>().err().unwrap();
    assert!(err.is_concrete_class_not_found());
}

#[test]
fn test_declared_cycle_is_rejected_by_validation() {
    let mut container = Container::new();
    container
        .bind_injectable::<CycleA>(ServiceScope::Singleton)
        .bind_injectable::<CycleB>(ServiceScope::Singleton);

    assert!(container.validate().unwrap_err().is_circular());
}

#[test]
fn test_declared_cycle_fails_at_resolution_instead_of_recursing() {
    let mut container = Container::new();
    container
        .bind_injectable::<CycleA>(ServiceScope::Singleton)
        .bind_injectable::<CycleB>(ServiceScope::Singleton);

    match container.resolve::<CycleA>().err().unwrap() {
        ContainerError::CircularDependency { path, cycle_service } => {
            assert!(cycle_service.contains("CycleA"));
            assert!(path.contains("CycleB"));
        }
        other => panic!("expected a cycle, got {other}"),
    }
    // the stack unwound, so an unrelated resolution still works
    container.bind_instance(Arc::new(1u8));
    assert_eq!(*container.resolve::<u8>().unwrap(), 1);
}

#[test]
fn test_factory_cycle_detected_at_runtime() {
    let mut container = Container::new();
    container
        .bind_named_factory::<String, _>("a", ServiceScope::Transient, |c| {
            c.resolve_named::<String>("b")
        })
        .bind_named_factory::<String, _>("b", ServiceScope::Transient, |c| {
            c.resolve_named::<String>("a")
        });

    // factories declare nothing, so only the runtime stack can see this
    assert!(container.validate().is_ok());
    assert!(container.resolve_named::<String>("a").unwrap_err().is_circular());
}

#[test]
fn test_factory_failure_is_a_container_error() {
    let mut container = Container::new();
    container.bind_factory::<dyn Connection, _>(ServiceScope::Singleton, |_| {
        Err(ContainerError::factory_failed("Connection", "refused"))
    });

    let err = container.resolve::<dyn Connection>().err().unwrap();
    assert!(matches!(err, ContainerError::FactoryFailed { .. }));
    assert_eq!(container.cached_count(), 0);
}

#[test]
fn test_unbound_concrete_dependencies_are_autowired() {
    let container = Container::new();

    let report = container.resolve_injectable::<Report>().unwrap();
    assert!(report.connection.is_none());
    let first = report.formatter.counted.serial;

    // nothing bound means nothing cached; each resolution builds afresh
    let again = container.resolve_injectable::<Report>().unwrap();
    assert_ne!(again.formatter.counted.serial, first);
    assert_eq!(container.cached_count(), 0);
    assert!(Report::dependencies().is_empty());
}

#[test]
fn test_autowired_parameter_prefers_binding() {
    let mut container = Container::new();
    container.bind_injectable::<Formatter>(ServiceScope::Singleton);

    let first = container.resolve_injectable::<Report>().unwrap();
    let second = container.resolve_injectable::<Report>().unwrap();
    assert!(Arc::ptr_eq(&first.formatter.0, &second.formatter.0));
}

#[test]
fn test_autowired_cycle_is_reported() {
    let container = Container::new();
    let err = container.resolve_injectable::<LoopA>().err().unwrap();
    assert!(err.is_circular());
}
