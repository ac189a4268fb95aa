//! Batch-based schema migrations for schemata.
//!
//! A [`Migrator`] scans a [`MigrationSource`] for identifiers, diffs them
//! against a [`StateStore`], and applies the pending ones as a single batch.
//! Every unit is built through a [`schemata_core::Container`], so units can
//! take their collaborators as constructor dependencies. Runs and rollbacks
//! hold a named lock from a [`LockManager`] for their whole duration.

pub mod config;
pub mod definitions;
pub mod error;
pub mod lock;
pub mod manager;
pub mod migration;
mod rollback;
pub mod runner;
pub mod source;
pub mod sql;
pub mod step;
pub mod store;

pub use config::{ConfigError, MigrationConfig, RollbackMode};
pub use definitions::{
    MigrationDirection, MigrationRunResult, MigrationStatus, RollbackResult, RollbackTarget,
    StepStatus,
};
pub use error::{MigrationError, MigrationResult, StepPhase};
pub use lock::{FileLockBackend, LockBackend, LockHandle, LockManager, LockOwner, MemoryLockBackend};
pub use manager::MigrationManager;
pub use migration::{Migration, MigrationBindings, PretendSchema, Schema};
pub use runner::{Migrator, MigratorBuilder};
pub use source::{DirectorySource, MigrationSet, MigrationSource, StaticSource};
pub use sql::{register_sql_migrations, SqlMigration};
pub use step::MigrationStep;
pub use store::{JsonStateStore, MemoryStateStore, StateStore};
#[cfg(feature = "postgres")]
pub use store::{PgSchema, PgStateStore};
