use thiserror::Error;

/// Result alias used throughout the container
pub type ContainerResult<T> = Result<T, ContainerError>;

/// Errors raised while registering or resolving services
#[derive(Debug, Error)]
pub enum ContainerError {
    /// No binding exists for a required service and it cannot be built on its own
    #[error("No concrete implementation bound for '{service}'{}", required_by_suffix(.required_by))]
    ConcreteClassNotFound {
        service: String,
        required_by: Option<String>,
    },

    #[error("Circular dependency detected: {path} (cycle at: {cycle_service})")]
    CircularDependency { path: String, cycle_service: String },

    #[error("Factory for '{service}' failed: {source}")]
    FactoryFailed {
        service: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A binding produced an instance of a different type than requested
    #[error("Binding for '{service}' produced an instance of the wrong type")]
    TypeMismatch { service: String },

    #[error("Lock error on resource: {resource}")]
    LockPoisoned { resource: String },
}

fn required_by_suffix(required_by: &Option<String>) -> String {
    match required_by {
        Some(parent) => format!(" (required by '{}')", parent),
        None => String::new(),
    }
}

impl ContainerError {
    /// Create a missing-concrete error for a top-level request
    pub fn concrete_class_not_found(service: impl Into<String>) -> Self {
        Self::ConcreteClassNotFound {
            service: service.into(),
            required_by: None,
        }
    }

    /// Wrap an arbitrary failure raised from inside a factory
    pub fn factory_failed(
        service: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::FactoryFailed {
            service: service.into(),
            source: source.into(),
        }
    }

    pub fn lock_poisoned(resource: impl Into<String>) -> Self {
        Self::LockPoisoned {
            resource: resource.into(),
        }
    }

    /// Check if a dependency could not be resolved to any instantiable type
    pub fn is_concrete_class_not_found(&self) -> bool {
        matches!(self, Self::ConcreteClassNotFound { .. })
    }

    /// Check if resolution hit a dependency cycle
    pub fn is_circular(&self) -> bool {
        matches!(self, Self::CircularDependency { .. })
    }

    /// Name of the service that could not be resolved, if any
    pub fn missing_service(&self) -> Option<&str> {
        match self {
            Self::ConcreteClassNotFound { service, .. } => Some(service),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_concrete_message_names_parent() {
        let err = ContainerError::ConcreteClassNotFound {
            service: "Mailer".to_string(),
            required_by: Some("Notifier".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "No concrete implementation bound for 'Mailer' (required by 'Notifier')"
        );
        assert!(err.is_concrete_class_not_found());
        assert_eq!(err.missing_service(), Some("Mailer"));
    }

    #[test]
    fn test_top_level_missing_concrete_message() {
        let err = ContainerError::concrete_class_not_found("Mailer");
        assert_eq!(err.to_string(), "No concrete implementation bound for 'Mailer'");
        assert!(!err.is_circular());
    }

    #[test]
    fn test_factory_failure_wraps_source() {
        let err = ContainerError::factory_failed("Pool", "connection refused");
        assert!(err.to_string().contains("connection refused"));
        assert!(err.missing_service().is_none());
    }
}
