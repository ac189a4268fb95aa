/// Lifetime of a bound service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServiceScope {
    /// Built once and cached for the lifetime of the container
    #[default]
    Singleton,
    /// Built anew on every resolution
    Transient,
}

impl ServiceScope {
    pub fn is_singleton(&self) -> bool {
        matches!(self, ServiceScope::Singleton)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceScope::Transient)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceScope::Singleton => "singleton",
            ServiceScope::Transient => "transient",
        }
    }
}

impl std::fmt::Display for ServiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scope_is_singleton() {
        assert_eq!(ServiceScope::default(), ServiceScope::Singleton);
        assert!(ServiceScope::default().is_singleton());
        assert!(ServiceScope::Transient.is_transient());
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(ServiceScope::Singleton.to_string(), "singleton");
        assert_eq!(ServiceScope::Transient.to_string(), "transient");
    }
}
