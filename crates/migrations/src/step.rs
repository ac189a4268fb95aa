//! Execution record of one migration unit

use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, MigrationResult};

/// One migration unit's execution record.
///
/// `migrated` holds exactly when `batch > 0`; stores refuse to write or load
/// records that break this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub file: String,
    pub batch: u32,
    pub migrated: bool,
}

impl MigrationStep {
    /// A freshly discovered, never applied step
    pub fn pending(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            batch: 0,
            migrated: false,
        }
    }

    /// A step applied as part of `batch`
    pub fn applied(file: impl Into<String>, batch: u32) -> Self {
        Self {
            file: file.into(),
            batch,
            migrated: batch > 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.migrated
    }

    /// Check the migrated/batch invariant
    pub fn validate(&self) -> MigrationResult<()> {
        if self.file.is_empty() {
            return Err(MigrationError::corrupt_state("", "empty migration identifier"));
        }
        if self.migrated != (self.batch > 0) {
            return Err(MigrationError::InvariantViolation {
                file: self.file.clone(),
                batch: self.batch,
                migrated: self.migrated,
            });
        }
        Ok(())
    }
}
