#[allow(clippy::module_inception)]
pub mod container;
pub mod autowiring;
pub mod binding;
pub mod builder;
pub mod descriptor;
pub mod resolver;
pub mod scope;

pub use autowiring::{Autowired, ConstructorParameter, Injectable};
pub use binding::ServiceBindings;
pub use builder::ContainerBuilder;
pub use container::Container;
pub use descriptor::{AnyInstance, ServiceDescriptor, ServiceFactory, ServiceId};
pub use resolver::{DependencyGraph, ResolutionPath};
pub use scope::ServiceScope;
