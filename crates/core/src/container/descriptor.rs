use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::container::container::Container;
use crate::container::scope::ServiceScope;
use crate::errors::ContainerResult;

/// Service identifier combining type and optional name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceId {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub name: Option<String>,
}

impl ServiceId {
    /// Create a service ID for a type (trait objects included)
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            name: None,
        }
    }

    /// Create a named service ID for a type
    pub fn named<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            name: Some(name.into()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_named(&self) -> bool {
        self.name.is_some()
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}({})", self.type_name, name),
            None => write!(f, "{}", self.type_name),
        }
    }
}

/// Type-erased instance. The payload is always an `Arc<T>` for the bound `T`,
/// which is what lets trait objects round-trip through `Any`.
pub type AnyInstance = Arc<dyn Any + Send + Sync>;

/// Factory function for creating service instances
pub type ServiceFactory = Arc<dyn Fn(&Container) -> ContainerResult<AnyInstance> + Send + Sync>;

/// Everything the container knows about one binding
#[derive(Clone)]
pub struct ServiceDescriptor {
    pub service_id: ServiceId,
    /// Name of the type that ends up constructed
    pub implementation: &'static str,
    pub lifetime: ServiceScope,
    pub factory: ServiceFactory,
    /// Constructor dependencies declared at registration time
    pub dependencies: Vec<ServiceId>,
}

impl ServiceDescriptor {
    pub fn new(
        service_id: ServiceId,
        implementation: &'static str,
        lifetime: ServiceScope,
        factory: ServiceFactory,
    ) -> Self {
        Self {
            service_id,
            implementation,
            lifetime,
            factory,
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<ServiceId>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("service_id", &self.service_id)
            .field("implementation", &self.implementation)
            .field("lifetime", &self.lifetime)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Erase an `Arc<T>` into the container's storage form
pub(crate) fn erase<T: ?Sized + Send + Sync + 'static>(instance: Arc<T>) -> AnyInstance {
    Arc::new(instance)
}

/// Recover an `Arc<T>` previously stored with [`erase`]
pub(crate) fn restore<T: ?Sized + Send + Sync + 'static>(instance: &AnyInstance) -> Option<Arc<T>> {
    instance.downcast_ref::<Arc<T>>().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_service_id_display() {
        assert!(ServiceId::of::<String>().to_string().ends_with("String"));
        let named = ServiceId::named::<String>("primary");
        assert!(named.is_named());
        assert!(named.to_string().ends_with("String(primary)"));
    }

    #[test]
    fn test_named_and_unnamed_ids_differ() {
        assert_ne!(ServiceId::of::<String>(), ServiceId::named::<String>("a"));
        assert_ne!(ServiceId::named::<String>("a"), ServiceId::named::<String>("b"));
        assert_eq!(ServiceId::named::<String>("a"), ServiceId::named::<String>("a"));
    }

    #[test]
    fn test_trait_object_round_trip() {
        let greeter: Arc<dyn Greeter> = Arc::new(English);
        let erased = erase(greeter);
        let restored = restore::<dyn Greeter>(&erased).unwrap();
        assert_eq!(restored.greet(), "hello");
        assert!(restore::<English>(&erased).is_none());
    }
}
