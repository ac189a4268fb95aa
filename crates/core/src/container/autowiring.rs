use std::sync::Arc;

use crate::container::container::Container;
use crate::container::descriptor::ServiceId;
use crate::errors::ContainerResult;

/// A concrete type whose constructor dependencies are known up front.
///
/// `dependencies()` is read when the type is bound, so the container can
/// report missing bindings and cycles before anything is constructed.
pub trait Injectable: Send + Sync + Sized + 'static {
    /// Required constructor dependencies
    fn dependencies() -> Vec<ServiceId>;

    /// Build an instance, resolving parameters from the container
    fn create(container: &Container) -> ContainerResult<Self>;
}

/// One constructor parameter of an [`Injectable`] type
pub trait ConstructorParameter: Sized {
    /// The service this parameter requires, or `None` when it is optional
    fn dependency() -> Option<ServiceId>;

    fn resolve(container: &Container) -> ContainerResult<Self>;
}

impl<T: ?Sized + Send + Sync + 'static> ConstructorParameter for Arc<T> {
    fn dependency() -> Option<ServiceId> {
        Some(ServiceId::of::<T>())
    }

    fn resolve(container: &Container) -> ContainerResult<Self> {
        container.resolve::<T>()
    }
}

/// Optional dependency: absent bindings resolve to `None`, but a bound
/// service that fails to build still fails the constructor.
impl<T: ?Sized + Send + Sync + 'static> ConstructorParameter for Option<Arc<T>> {
    fn dependency() -> Option<ServiceId> {
        None
    }

    fn resolve(container: &Container) -> ContainerResult<Self> {
        container.resolve_optional::<T>()
    }
}

/// Concrete dependency that is built from its own constructor when nothing
/// is bound for it. A binding for `T`, when present, still wins.
pub struct Autowired<T>(pub Arc<T>);

impl<T> Autowired<T> {
    pub fn into_inner(self) -> Arc<T> {
        self.0
    }
}

impl<T> Clone for Autowired<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> std::ops::Deref for Autowired<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

// Not a required binding: an unbound `T` is constructed in place, and cycles
// surface through the resolution path when it is.
impl<T: Injectable> ConstructorParameter for Autowired<T> {
    fn dependency() -> Option<ServiceId> {
        None
    }

    fn resolve(container: &Container) -> ContainerResult<Self> {
        container.resolve_injectable::<T>().map(Autowired)
    }
}

/// Implement [`Injectable`] for a struct from its field list.
///
/// ```
/// use std::sync::Arc;
/// use schemata_core::injectable;
///
/// use schemata_core::container::Autowired;
///
/// trait Clock: Send + Sync {}
///
/// struct Formatter;
/// injectable!(Formatter {});
///
/// struct AuditLog {
///     clock: Arc<dyn Clock>,
///     tag: Option<Arc<String>>,
///     formatter: Autowired<Formatter>,
/// }
///
/// injectable!(AuditLog {
///     clock: Arc<dyn Clock>,
///     tag: Option<Arc<String>>,
///     formatter: Autowired<Formatter>,
/// });
/// ```
#[macro_export]
macro_rules! injectable {
    ($ty:ident { $($field:ident : $param:ty),* $(,)? }) => {
        impl $crate::container::Injectable for $ty {
            fn dependencies() -> ::std::vec::Vec<$crate::container::ServiceId> {
                #[allow(unused_mut)]
                let mut dependencies = ::std::vec::Vec::new();
                $(
                    if let Some(id) =
                        <$param as $crate::container::ConstructorParameter>::dependency()
                    {
                        dependencies.push(id);
                    }
                )*
                dependencies
            }

            fn create(
                _container: &$crate::container::Container,
            ) -> $crate::errors::ContainerResult<Self> {
                Ok(Self {
                    $(
                        $field: <$param as $crate::container::ConstructorParameter>::resolve(
                            _container,
                        )?,
                    )*
                })
            }
        }
    };
}
