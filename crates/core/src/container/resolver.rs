use std::collections::{HashMap, HashSet};

use crate::container::descriptor::{ServiceDescriptor, ServiceId};
use crate::errors::{ContainerError, ContainerResult};

/// Dependency resolution path for cycle detection and error reporting
#[derive(Debug, Clone, Default)]
pub struct ResolutionPath {
    pub services: Vec<ServiceId>,
}

impl ResolutionPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, service_id: ServiceId) {
        self.services.push(service_id);
    }

    pub fn pop(&mut self) -> Option<ServiceId> {
        self.services.pop()
    }

    pub fn contains(&self, service_id: &ServiceId) -> bool {
        self.services.contains(service_id)
    }

    /// The service currently being constructed, if any
    pub fn current(&self) -> Option<&ServiceId> {
        self.services.last()
    }

    pub fn depth(&self) -> usize {
        self.services.len()
    }

    /// Render the path, optionally closing it with the service that repeats
    pub fn path_string(&self, closing: Option<&ServiceId>) -> String {
        self.services
            .iter()
            .chain(closing)
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// The error for `service_id` re-entering this path
    pub fn cycle_error(&self, service_id: &ServiceId) -> ContainerError {
        ContainerError::CircularDependency {
            path: self.path_string(Some(service_id)),
            cycle_service: service_id.to_string(),
        }
    }
}

/// Static view of declared constructor dependencies
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<ServiceId, Vec<ServiceId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build_from_descriptors<'a>(
        descriptors: impl IntoIterator<Item = &'a ServiceDescriptor>,
    ) -> Self {
        let mut graph = Self::new();
        for descriptor in descriptors {
            graph.add_service(&descriptor.service_id, &descriptor.dependencies);
        }
        graph
    }

    pub fn add_service(&mut self, service_id: &ServiceId, dependencies: &[ServiceId]) {
        self.nodes.insert(service_id.clone(), dependencies.to_vec());
    }

    pub fn dependencies_of(&self, service_id: &ServiceId) -> Option<&[ServiceId]> {
        self.nodes.get(service_id).map(Vec::as_slice)
    }

    /// Check that every declared dependency is bound and that no cycle exists
    pub fn validate(&self) -> ContainerResult<()> {
        self.detect_missing()?;
        self.detect_cycles()
    }

    /// Fail on the first declared dependency without a binding
    pub fn detect_missing(&self) -> ContainerResult<()> {
        let mut services: Vec<&ServiceId> = self.nodes.keys().collect();
        services.sort_by_key(|id| id.to_string());

        for service_id in services {
            for dep_id in &self.nodes[service_id] {
                if !self.nodes.contains_key(dep_id) {
                    return Err(ContainerError::ConcreteClassNotFound {
                        service: dep_id.to_string(),
                        required_by: Some(service_id.to_string()),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn detect_cycles(&self) -> ContainerResult<()> {
        let mut visited = HashSet::new();
        let mut services: Vec<&ServiceId> = self.nodes.keys().collect();
        services.sort_by_key(|id| id.to_string());

        for service_id in services {
            if !visited.contains(service_id) {
                let mut path = ResolutionPath::new();
                self.detect_cycle_dfs(service_id, &mut visited, &mut path)?;
            }
        }
        Ok(())
    }

    fn detect_cycle_dfs(
        &self,
        service_id: &ServiceId,
        visited: &mut HashSet<ServiceId>,
        path: &mut ResolutionPath,
    ) -> ContainerResult<()> {
        if path.contains(service_id) {
            return Err(path.cycle_error(service_id));
        }
        if visited.contains(service_id) {
            return Ok(());
        }

        path.push(service_id.clone());
        if let Some(dependencies) = self.nodes.get(service_id) {
            for dep_id in dependencies {
                self.detect_cycle_dfs(dep_id, visited, path)?;
            }
        }
        path.pop();
        visited.insert(service_id.clone());

        Ok(())
    }
}
