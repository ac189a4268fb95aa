//! Migration units and the schema handle they mutate

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use schemata_core::{Container, Injectable, ServiceScope};

use crate::error::MigrationResult;

/// Opaque schema-mutation handle passed to every unit.
///
/// The orchestrator never looks at what a unit executes. Each unit and its
/// state write run between `begin` and `commit`; a failure in either calls
/// `rollback` instead. Handles without transactions keep the no-op defaults.
#[async_trait]
pub trait Schema: Send + Sync {
    async fn execute(&self, statement: &str) -> MigrationResult<()>;

    async fn begin(&self) -> MigrationResult<()> {
        Ok(())
    }

    async fn commit(&self) -> MigrationResult<()> {
        Ok(())
    }

    async fn rollback(&self) -> MigrationResult<()> {
        Ok(())
    }

    /// Short label for logs
    fn name(&self) -> &str {
        "schema"
    }
}

/// A single schema-change definition
#[async_trait]
pub trait Migration: Send + Sync {
    /// Apply the change
    async fn up(&self, schema: &dyn Schema) -> MigrationResult<()>;

    /// Revert the change
    async fn down(&self, schema: &dyn Schema) -> MigrationResult<()>;
}

/// Registration helpers for binding units into a [`Container`]
pub trait MigrationBindings {
    /// Bind `M` as the unit for identifier `file`. Units are transient: each
    /// run builds a fresh one.
    fn migration<M>(&mut self, file: impl Into<String>) -> &mut Self
    where
        M: Migration + Injectable;

    /// Bind a pre-built unit for identifier `file`
    fn migration_instance(&mut self, file: impl Into<String>, unit: Arc<dyn Migration>) -> &mut Self;
}

impl MigrationBindings for Container {
    fn migration<M>(&mut self, file: impl Into<String>) -> &mut Self
    where
        M: Migration + Injectable,
    {
        self.bind_named::<dyn Migration, M, _>(file, ServiceScope::Transient, |unit| unit)
    }

    fn migration_instance(&mut self, file: impl Into<String>, unit: Arc<dyn Migration>) -> &mut Self {
        self.bind_named_factory::<dyn Migration, _>(file, ServiceScope::Transient, move |_| {
            Ok(unit.clone())
        })
    }
}

/// Schema handle that records statements instead of running them
#[derive(Debug, Default)]
pub struct PretendSchema {
    statements: Mutex<Vec<String>>,
}

impl PretendSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements seen so far, in order
    pub fn statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl Schema for PretendSchema {
    async fn execute(&self, statement: &str) -> MigrationResult<()> {
        tracing::info!(statement, "pretend");
        self.statements
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(statement.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "pretend"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemata_core::injectable;

    struct CreateUsers;

    injectable!(CreateUsers {});

    #[async_trait]
    impl Migration for CreateUsers {
        async fn up(&self, schema: &dyn Schema) -> MigrationResult<()> {
            schema.execute("CREATE TABLE users (id INT)").await
        }

        async fn down(&self, schema: &dyn Schema) -> MigrationResult<()> {
            schema.execute("DROP TABLE users").await
        }
    }

    #[tokio::test]
    async fn test_bound_unit_runs_against_schema() {
        let mut container = Container::new();
        container.migration::<CreateUsers>("001_create_users");

        let unit = container
            .resolve_named::<dyn Migration>("001_create_users")
            .unwrap();
        let schema = PretendSchema::new();
        unit.up(&schema).await.unwrap();
        unit.down(&schema).await.unwrap();

        assert_eq!(
            schema.statements(),
            vec!["CREATE TABLE users (id INT)", "DROP TABLE users"]
        );
    }

    #[tokio::test]
    async fn test_units_are_transient() {
        let mut container = Container::new();
        container.migration::<CreateUsers>("001_create_users");

        let first = container.resolve_named::<dyn Migration>("001_create_users").unwrap();
        let second = container.resolve_named::<dyn Migration>("001_create_users").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
