//! Service container for the schemata migration toolkit.
//!
//! Types are bound to factories (or to concrete [`Injectable`] types whose
//! constructor dependencies are declared statically) and resolved on demand,
//! recursively building whatever they depend on.

pub mod container;
pub mod errors;

pub use container::{
    Autowired, Container, ContainerBuilder, ConstructorParameter, Injectable, ServiceId,
    ServiceScope,
};
pub use errors::{ContainerError, ContainerResult};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
