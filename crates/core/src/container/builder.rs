use std::sync::Arc;

use crate::container::autowiring::Injectable;
use crate::container::container::Container;
use crate::container::scope::ServiceScope;
use crate::errors::ContainerResult;

/// Fluent builder that validates the binding graph before handing out a
/// container
#[derive(Debug, Default)]
pub struct ContainerBuilder {
    container: Container,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton<I, C, F>(mut self, upcast: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: Injectable,
        F: Fn(Arc<C>) -> Arc<I> + Send + Sync + 'static,
    {
        self.container.bind_singleton::<I, C, F>(upcast);
        self
    }

    pub fn transient<I, C, F>(mut self, upcast: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: Injectable,
        F: Fn(Arc<C>) -> Arc<I> + Send + Sync + 'static,
    {
        self.container.bind_transient::<I, C, F>(upcast);
        self
    }

    pub fn injectable<T: Injectable>(mut self, lifetime: ServiceScope) -> Self {
        self.container.bind_injectable::<T>(lifetime);
        self
    }

    pub fn instance<T: ?Sized + Send + Sync + 'static>(mut self, instance: Arc<T>) -> Self {
        self.container.bind_instance(instance);
        self
    }

    /// Apply arbitrary registrations to the underlying container
    pub fn configure<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(&mut Container),
    {
        configure(&mut self.container);
        self
    }

    /// Validate declared dependencies and return the container
    pub fn build(self) -> ContainerResult<Container> {
        self.container.validate()?;
        tracing::debug!(
            services = self.container.service_count(),
            "Container built"
        );
        Ok(self.container)
    }
}
