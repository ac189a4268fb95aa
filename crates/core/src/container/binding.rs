use std::collections::HashMap;

use crate::container::descriptor::{ServiceDescriptor, ServiceId};

/// Registry of service descriptors keyed by service id
#[derive(Debug, Default, Clone)]
pub struct ServiceBindings {
    descriptors: HashMap<ServiceId, ServiceDescriptor>,
}

impl ServiceBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor, returning the one it replaced
    pub fn add_descriptor(&mut self, descriptor: ServiceDescriptor) -> Option<ServiceDescriptor> {
        self.descriptors
            .insert(descriptor.service_id.clone(), descriptor)
    }

    pub fn get_descriptor(&self, service_id: &ServiceId) -> Option<&ServiceDescriptor> {
        self.descriptors.get(service_id)
    }

    pub fn contains(&self, service_id: &ServiceId) -> bool {
        self.descriptors.contains_key(service_id)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.descriptors.values()
    }

    pub fn service_ids(&self) -> Vec<ServiceId> {
        self.descriptors.keys().cloned().collect()
    }

    /// Names registered for one abstract type, sorted
    pub fn names_for(&self, type_id: std::any::TypeId) -> Vec<String> {
        let mut names: Vec<String> = self
            .descriptors
            .keys()
            .filter(|id| id.type_id == type_id)
            .filter_map(|id| id.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.descriptors.len()
    }
}
