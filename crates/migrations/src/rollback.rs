//! Migration Rollback - reverts applied migrations by batch or by step

use std::sync::Arc;
use std::time::Instant;

use crate::config::RollbackMode;
use crate::definitions::{MigrationDirection, RollbackResult, RollbackTarget};
use crate::error::MigrationResult;
use crate::runner::{release_lock, Migrator};
use crate::step::MigrationStep;

impl Migrator {
    /// Revert the last `steps` batches or migrations, per the configured
    /// [`RollbackMode`]
    pub async fn rollback(&self, steps: u32) -> MigrationResult<RollbackResult> {
        let target = match self.rollback_mode {
            RollbackMode::Batch => RollbackTarget::Batches(steps),
            RollbackMode::Step => RollbackTarget::Steps(steps as usize),
        };
        self.rollback_to(target).await
    }

    /// Revert every migrated step, highest batch first
    pub async fn reset(&self) -> MigrationResult<RollbackResult> {
        self.rollback_to(RollbackTarget::All).await
    }

    /// Revert the steps selected by `target` in reverse apply order.
    ///
    /// Stops at the first unit that fails. Steps reverted before it stay
    /// removed; the failing one stays recorded as migrated.
    pub async fn rollback_to(&self, target: RollbackTarget) -> MigrationResult<RollbackResult> {
        let start_time = Instant::now();
        let lock = Arc::new(self.acquire_lock().await?);

        let steps = self.store.load().await?;
        let selected = select_for_rollback(steps.into_values().collect(), target);

        let mut batches: Vec<u32> = selected.iter().map(|step| step.batch).collect();
        batches.dedup();

        if selected.is_empty() {
            release_lock(&lock);
            tracing::info!(?target, "nothing to roll back");
            return Ok(RollbackResult {
                rolled_back: Vec::new(),
                batches,
                execution_time_ms: start_time.elapsed().as_millis(),
            });
        }
        tracing::info!(?target, steps = selected.len(), ?batches, dry_run = self.dry_run, "rolling back");

        let mut rolled_back = Vec::new();
        for step in &selected {
            if let Err(e) = self
                .run_unit(&lock, &step.file, MigrationDirection::Down, step.batch, &rolled_back)
                .await
            {
                tracing::error!(file = %step.file, batch = step.batch, error = %e, "rollback halted");
                return Err(e);
            }
            tracing::info!(file = %step.file, batch = step.batch, "rolled back");
            rolled_back.push(step.file.clone());
        }

        release_lock(&lock);
        Ok(RollbackResult {
            rolled_back,
            batches,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }
}

/// Migrated steps chosen by `target`, ordered by batch then identifier, both
/// descending
fn select_for_rollback(steps: Vec<MigrationStep>, target: RollbackTarget) -> Vec<MigrationStep> {
    let mut migrated: Vec<MigrationStep> = steps.into_iter().filter(|step| step.migrated).collect();
    migrated.sort_by(|a, b| b.batch.cmp(&a.batch).then_with(|| b.file.cmp(&a.file)));

    match target {
        RollbackTarget::All => migrated,
        RollbackTarget::Steps(n) => migrated.into_iter().take(n).collect(),
        RollbackTarget::Batch(batch) => migrated.into_iter().filter(|step| step.batch == batch).collect(),
        RollbackTarget::Batches(n) => {
            let mut recent: Vec<u32> = migrated.iter().map(|step| step.batch).collect();
            recent.dedup();
            recent.truncate(n as usize);
            migrated
                .into_iter()
                .filter(|step| recent.contains(&step.batch))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(steps: &[MigrationStep]) -> Vec<&str> {
        steps.iter().map(|step| step.file.as_str()).collect()
    }

    fn history() -> Vec<MigrationStep> {
        vec![
            MigrationStep::applied("001", 1),
            MigrationStep::applied("002", 1),
            MigrationStep::applied("003", 2),
            MigrationStep::applied("004", 3),
            MigrationStep::applied("005", 3),
            MigrationStep::pending("006"),
        ]
    }

    #[test]
    fn test_last_batch_reverts_descending() {
        let selected = select_for_rollback(history(), RollbackTarget::Batches(1));
        assert_eq!(files(&selected), ["005", "004"]);
    }

    #[test]
    fn test_multiple_batches() {
        let selected = select_for_rollback(history(), RollbackTarget::Batches(2));
        assert_eq!(files(&selected), ["005", "004", "003"]);
    }

    #[test]
    fn test_steps_cross_batch_boundaries() {
        let selected = select_for_rollback(history(), RollbackTarget::Steps(4));
        assert_eq!(files(&selected), ["005", "004", "003", "002"]);
    }

    #[test]
    fn test_single_batch_and_all() {
        assert_eq!(files(&select_for_rollback(history(), RollbackTarget::Batch(1))), ["002", "001"]);
        assert_eq!(select_for_rollback(history(), RollbackTarget::All).len(), 5);
        assert!(select_for_rollback(history(), RollbackTarget::Batch(9)).is_empty());
    }

    #[test]
    fn test_zero_selects_nothing() {
        assert!(select_for_rollback(history(), RollbackTarget::Batches(0)).is_empty());
        assert!(select_for_rollback(history(), RollbackTarget::Steps(0)).is_empty());
    }
}
