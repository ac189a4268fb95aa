//! Migration Definitions - result and status types shared by the orchestrator

use std::fmt;

use crate::error::StepPhase;

/// Result of running migrations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRunResult {
    /// Identifiers applied by this run, in order
    pub applied: Vec<String>,
    /// Batch the applied identifiers were recorded under; `None` when nothing ran
    pub batch: Option<u32>,
    /// Number of identifiers that were already migrated
    pub skipped_count: usize,
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Result of rolling back migrations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackResult {
    /// Identifiers reverted by this run, in the order they were reverted
    pub rolled_back: Vec<String>,
    /// Batches touched, highest first
    pub batches: Vec<u32>,
    pub execution_time_ms: u128,
}

impl RollbackResult {
    pub fn rolled_back_count(&self) -> usize {
        self.rolled_back.len()
    }
}

/// What a rollback should revert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackTarget {
    /// The most recent `n` batches
    Batches(u32),
    /// The most recent `n` migrations, regardless of batch
    Steps(usize),
    /// Exactly one batch
    Batch(u32),
    /// Everything that is migrated
    All,
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Apply the migration (run `up`)
    Up,
    /// Rollback the migration (run `down`)
    Down,
}

impl MigrationDirection {
    pub(crate) fn phase(self) -> StepPhase {
        match self {
            MigrationDirection::Up => StepPhase::Applying,
            MigrationDirection::Down => StepPhase::Reverting,
        }
    }
}

/// State of one identifier as seen by `status()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Known to the source, not yet applied
    Pending,
    /// Applied in `batch`
    Migrated { batch: u32 },
    /// Recorded as applied but no longer present in the source
    Missing { batch: u32 },
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Migrated { batch } => write!(f, "migrated (batch {})", batch),
            StepStatus::Missing { batch } => write!(f, "missing (batch {})", batch),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub file: String,
    pub status: StepStatus,
}

impl MigrationStatus {
    pub fn is_pending(&self) -> bool {
        self.status == StepStatus::Pending
    }
}
