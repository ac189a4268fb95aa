use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::container::autowiring::Injectable;
use crate::container::binding::ServiceBindings;
use crate::container::descriptor::{erase, restore, AnyInstance, ServiceDescriptor, ServiceId};
use crate::container::resolver::{DependencyGraph, ResolutionPath};
use crate::container::scope::ServiceScope;
use crate::errors::{ContainerError, ContainerResult};

/// Dependency-resolving service container.
///
/// Bindings map a type token (optionally named) to a factory. Singletons are
/// cached for the container's lifetime and handed out as shared `Arc`s.
/// Resolution is expected to happen from one task at a time: the cycle
/// detection stack is shared by every call on this container.
pub struct Container {
    bindings: ServiceBindings,
    instances: RwLock<HashMap<ServiceId, AnyInstance>>,
    resolving: Mutex<ResolutionPath>,
}

/// Keeps a service on the resolution stack while it is being built
struct ResolutionGuard<'a> {
    path: &'a Mutex<ResolutionPath>,
}

impl Drop for ResolutionGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut path) = self.path.lock() {
            path.pop();
        }
    }
}

impl Container {
    pub fn new() -> Self {
        Self::from_bindings(ServiceBindings::new())
    }

    pub fn from_bindings(bindings: ServiceBindings) -> Self {
        Self {
            bindings,
            instances: RwLock::new(HashMap::new()),
            resolving: Mutex::new(ResolutionPath::new()),
        }
    }

    /// Register or overwrite a binding. Any cached singleton for the same id
    /// is dropped so the next resolution uses the new binding.
    pub fn add_descriptor(&mut self, descriptor: ServiceDescriptor) -> &mut Self {
        let service_id = descriptor.service_id.clone();
        if let Some(previous) = self.bindings.add_descriptor(descriptor) {
            tracing::debug!(
                service = %service_id,
                previous = previous.implementation,
                "Binding overwritten"
            );
        }
        if let Ok(instances) = self.instances.get_mut() {
            instances.remove(&service_id);
        }
        self
    }

    /// Bind an abstract type to a concrete injectable implementation
    pub fn bind<I, C, F>(&mut self, lifetime: ServiceScope, upcast: F) -> &mut Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: Injectable,
        F: Fn(Arc<C>) -> Arc<I> + Send + Sync + 'static,
    {
        let descriptor = Self::injectable_descriptor::<I, C, F>(ServiceId::of::<I>(), lifetime, upcast);
        self.add_descriptor(descriptor)
    }

    /// Bind a named implementation of an abstract type
    pub fn bind_named<I, C, F>(
        &mut self,
        name: impl Into<String>,
        lifetime: ServiceScope,
        upcast: F,
    ) -> &mut Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: Injectable,
        F: Fn(Arc<C>) -> Arc<I> + Send + Sync + 'static,
    {
        let descriptor =
            Self::injectable_descriptor::<I, C, F>(ServiceId::named::<I>(name), lifetime, upcast);
        self.add_descriptor(descriptor)
    }

    pub fn bind_singleton<I, C, F>(&mut self, upcast: F) -> &mut Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: Injectable,
        F: Fn(Arc<C>) -> Arc<I> + Send + Sync + 'static,
    {
        self.bind::<I, C, F>(ServiceScope::Singleton, upcast)
    }

    pub fn bind_transient<I, C, F>(&mut self, upcast: F) -> &mut Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: Injectable,
        F: Fn(Arc<C>) -> Arc<I> + Send + Sync + 'static,
    {
        self.bind::<I, C, F>(ServiceScope::Transient, upcast)
    }

    /// Bind a concrete injectable type to itself
    pub fn bind_injectable<T: Injectable>(&mut self, lifetime: ServiceScope) -> &mut Self {
        self.bind::<T, T, _>(lifetime, |instance| instance)
    }

    /// Bind a type to a factory closure. Factories declare no dependencies up
    /// front; anything they resolve is still covered by runtime cycle checks.
    pub fn bind_factory<T, F>(&mut self, lifetime: ServiceScope, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> ContainerResult<Arc<T>> + Send + Sync + 'static,
    {
        let descriptor = Self::factory_descriptor(ServiceId::of::<T>(), lifetime, factory);
        self.add_descriptor(descriptor)
    }

    pub fn bind_named_factory<T, F>(
        &mut self,
        name: impl Into<String>,
        lifetime: ServiceScope,
        factory: F,
    ) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> ContainerResult<Arc<T>> + Send + Sync + 'static,
    {
        let descriptor = Self::factory_descriptor(ServiceId::named::<T>(name), lifetime, factory);
        self.add_descriptor(descriptor)
    }

    /// Bind a pre-built instance as a singleton
    pub fn bind_instance<T: ?Sized + Send + Sync + 'static>(&mut self, instance: Arc<T>) -> &mut Self {
        let service_id = ServiceId::of::<T>();
        let cached = instance.clone();
        self.add_descriptor(ServiceDescriptor::new(
            service_id.clone(),
            std::any::type_name::<T>(),
            ServiceScope::Singleton,
            Arc::new(move |_: &Container| -> ContainerResult<AnyInstance> {
                Ok(erase(cached.clone()))
            }),
        ));
        if let Ok(instances) = self.instances.get_mut() {
            instances.insert(service_id, erase(instance));
        }
        self
    }

    fn injectable_descriptor<I, C, F>(
        service_id: ServiceId,
        lifetime: ServiceScope,
        upcast: F,
    ) -> ServiceDescriptor
    where
        I: ?Sized + Send + Sync + 'static,
        C: Injectable,
        F: Fn(Arc<C>) -> Arc<I> + Send + Sync + 'static,
    {
        ServiceDescriptor::new(
            service_id,
            std::any::type_name::<C>(),
            lifetime,
            Arc::new(move |container: &Container| -> ContainerResult<AnyInstance> {
                let concrete = Arc::new(C::create(container)?);
                Ok(erase(upcast(concrete)))
            }),
        )
        .with_dependencies(C::dependencies())
    }

    fn factory_descriptor<T, F>(
        service_id: ServiceId,
        lifetime: ServiceScope,
        factory: F,
    ) -> ServiceDescriptor
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> ContainerResult<Arc<T>> + Send + Sync + 'static,
    {
        ServiceDescriptor::new(
            service_id,
            std::any::type_name::<T>(),
            lifetime,
            Arc::new(move |container: &Container| -> ContainerResult<AnyInstance> {
                factory(container).map(erase)
            }),
        )
    }

    /// Resolve a service by type
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Arc<T>> {
        self.resolve_by_id(&ServiceId::of::<T>())
    }

    /// Resolve a named service
    pub fn resolve_named<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> ContainerResult<Arc<T>> {
        self.resolve_by_id(&ServiceId::named::<T>(name))
    }

    /// Resolve a service if it is bound. Failures building a bound service
    /// are still reported.
    pub fn resolve_optional<T: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Option<Arc<T>>> {
        let service_id = ServiceId::of::<T>();
        if !self.bindings.contains(&service_id) {
            return Ok(None);
        }
        self.resolve_by_id(&service_id).map(Some)
    }

    /// Try to resolve a service, returning None on any failure
    pub fn try_resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.resolve::<T>().ok()
    }

    /// Resolve a concrete injectable type. Uses its binding when one exists,
    /// otherwise builds a fresh instance from its declared constructor.
    pub fn resolve_injectable<T: Injectable>(&self) -> ContainerResult<Arc<T>> {
        let service_id = ServiceId::of::<T>();
        if self.bindings.contains(&service_id) {
            return self.resolve_by_id(&service_id);
        }

        let _guard = self.enter(&service_id)?;
        tracing::trace!(service = %service_id, "Autowiring unbound injectable");
        Ok(Arc::new(T::create(self)?))
    }

    fn resolve_by_id<T: ?Sized + Send + Sync + 'static>(&self, service_id: &ServiceId) -> ContainerResult<Arc<T>> {
        if let Some(instance) = self.cached(service_id)? {
            return restore::<T>(&instance).ok_or_else(|| ContainerError::TypeMismatch {
                service: service_id.to_string(),
            });
        }

        let descriptor = match self.bindings.get_descriptor(service_id) {
            Some(descriptor) => descriptor,
            None => {
                return Err(ContainerError::ConcreteClassNotFound {
                    service: service_id.to_string(),
                    required_by: self.current_requester()?,
                })
            }
        };

        let instance = {
            let _guard = self.enter(service_id)?;
            tracing::trace!(
                service = %service_id,
                implementation = descriptor.implementation,
                lifetime = %descriptor.lifetime,
                "Constructing service"
            );
            (descriptor.factory)(self)?
        };

        let typed = restore::<T>(&instance).ok_or_else(|| ContainerError::TypeMismatch {
            service: service_id.to_string(),
        })?;

        if descriptor.lifetime.is_singleton() {
            let mut instances = self
                .instances
                .write()
                .map_err(|_| ContainerError::lock_poisoned("service_instances"))?;
            instances.entry(service_id.clone()).or_insert(instance);
        }

        Ok(typed)
    }

    fn cached(&self, service_id: &ServiceId) -> ContainerResult<Option<AnyInstance>> {
        let instances = self
            .instances
            .read()
            .map_err(|_| ContainerError::lock_poisoned("service_instances"))?;
        Ok(instances.get(service_id).cloned())
    }

    fn current_requester(&self) -> ContainerResult<Option<String>> {
        let path = self
            .resolving
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("resolution_path"))?;
        Ok(path.current().map(|id| id.to_string()))
    }

    fn enter(&self, service_id: &ServiceId) -> ContainerResult<ResolutionGuard<'_>> {
        let mut path = self
            .resolving
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("resolution_path"))?;
        if path.contains(service_id) {
            return Err(path.cycle_error(service_id));
        }
        path.push(service_id.clone());
        Ok(ResolutionGuard {
            path: &self.resolving,
        })
    }

    /// Check every binding's declared dependencies without building anything
    pub fn validate(&self) -> ContainerResult<()> {
        DependencyGraph::build_from_descriptors(self.bindings.descriptors()).validate()
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.bindings.contains(&ServiceId::of::<T>())
    }

    pub fn contains_named<T: ?Sized + 'static>(&self, name: &str) -> bool {
        self.bindings.contains(&ServiceId::named::<T>(name))
    }

    /// Names bound for an abstract type, sorted
    pub fn names_of<T: ?Sized + 'static>(&self) -> Vec<String> {
        self.bindings.names_for(std::any::TypeId::of::<T>())
    }

    pub fn service_count(&self) -> usize {
        self.bindings.count()
    }

    pub fn registered_services(&self) -> Vec<ServiceId> {
        self.bindings.service_ids()
    }

    /// Number of singleton instances currently cached
    pub fn cached_count(&self) -> usize {
        self.instances.read().map(|i| i.len()).unwrap_or(0)
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("service_count", &self.service_count())
            .field("cached_count", &self.cached_count())
            .finish()
    }
}
