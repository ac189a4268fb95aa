//! Durable record of which migration units have been applied

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::MigrationResult;
use crate::step::MigrationStep;

mod json;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use json::JsonStateStore;
pub use memory::MemoryStateStore;
#[cfg(feature = "postgres")]
pub use postgres::{PgSchema, PgStateStore};

/// Applied-migration state, keyed by identifier.
///
/// Every write is durable before it returns and concurrent writes never lose
/// each other's records. Callers hold the migration lock, but stores do not
/// rely on it.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// All recorded steps
    async fn load(&self) -> MigrationResult<BTreeMap<String, MigrationStep>>;

    /// Insert or replace the record for `step.file`
    async fn record(&self, step: &MigrationStep) -> MigrationResult<()>;

    /// Delete the record for `file`; removing an absent record is not an error
    async fn remove(&self, file: &str) -> MigrationResult<()>;

    /// Largest batch among migrated steps, 0 when none
    async fn highest_batch(&self) -> MigrationResult<u32> {
        Ok(highest_batch(self.load().await?.values()))
    }

    /// Short label for logs
    fn describe(&self) -> String;
}

pub(crate) fn highest_batch<'a>(steps: impl Iterator<Item = &'a MigrationStep>) -> u32 {
    steps
        .filter(|step| step.migrated)
        .map(|step| step.batch)
        .max()
        .unwrap_or(0)
}
