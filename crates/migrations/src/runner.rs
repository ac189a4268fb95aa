//! Migration Runner - applies pending migrations in batches
//!
//! Each unit is resolved through the container just before it runs, applied
//! in its own task, and recorded in the state store before the next one
//! starts. The migration lock is held for the whole run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use schemata_core::Container;

use crate::config::{ConfigError, MigrationConfig, RollbackMode};
use crate::definitions::{MigrationDirection, MigrationRunResult, MigrationStatus, StepStatus};
use crate::error::{MigrationError, MigrationResult, StepPhase};
use crate::lock::{FileLockBackend, LockHandle, LockManager, MemoryLockBackend};
use crate::migration::{Migration, Schema};
use crate::source::{DirectorySource, MigrationSet, MigrationSource};
use crate::step::MigrationStep;
use crate::store::{JsonStateStore, StateStore};

/// Orchestrates migration runs against one container, source, and store
pub struct Migrator {
    pub(crate) container: Arc<Container>,
    pub(crate) source: Arc<dyn MigrationSource>,
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) locks: LockManager,
    pub(crate) schema: Arc<dyn Schema>,
    pub(crate) lock_name: String,
    pub(crate) lock_timeout: Duration,
    pub(crate) rollback_mode: RollbackMode,
    pub(crate) dry_run: bool,
}

impl Migrator {
    pub fn builder() -> MigratorBuilder {
        MigratorBuilder::default()
    }

    /// Wire the file-backed defaults: a directory source, a JSON state
    /// document and lock files, all taken from `config`
    pub fn from_config(
        config: &MigrationConfig,
        container: Arc<Container>,
        schema: Arc<dyn Schema>,
    ) -> MigrationResult<Self> {
        config.validate()?;
        Self::builder()
            .with_config(config)
            .container(container)
            .schema(schema)
            .build()
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn rollback_mode(&self) -> RollbackMode {
        self.rollback_mode
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Apply every pending migration as one new batch, in ascending order.
    ///
    /// Stops at the first unit that fails to resolve, apply, or record. Units
    /// applied before it stay recorded.
    pub async fn migrate(&self) -> MigrationResult<MigrationRunResult> {
        let start_time = Instant::now();
        let lock = Arc::new(self.acquire_lock().await?);

        let set = self.source.scan()?;
        let steps = self.store.load().await?;
        let pending = pending_files(&set, &steps);
        let skipped_count = set.len() - pending.len();

        if pending.is_empty() {
            release_lock(&lock);
            tracing::info!(skipped = skipped_count, "nothing to migrate");
            return Ok(MigrationRunResult {
                applied: Vec::new(),
                batch: None,
                skipped_count,
                execution_time_ms: start_time.elapsed().as_millis(),
            });
        }

        let batch = self.store.highest_batch().await? + 1;
        tracing::info!(
            batch,
            pending = pending.len(),
            source = %self.source.describe(),
            store = %self.store.describe(),
            dry_run = self.dry_run,
            "migrating"
        );

        let mut applied = Vec::new();
        for file in &pending {
            if let Err(e) = self
                .run_unit(&lock, file, MigrationDirection::Up, batch, &applied)
                .await
            {
                tracing::error!(file = %file, batch, error = %e, "migration halted");
                return Err(e);
            }
            tracing::info!(file = %file, batch, "migrated");
            applied.push(file.clone());
        }

        release_lock(&lock);
        Ok(MigrationRunResult {
            applied,
            batch: Some(batch),
            skipped_count,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Validate the container's declared graph and resolve every pending
    /// unit without running anything. Returns the pending identifiers.
    pub async fn check(&self) -> MigrationResult<Vec<String>> {
        self.container.validate()?;

        let set = self.source.scan()?;
        let steps = self.store.load().await?;
        let pending = pending_files(&set, &steps);

        for file in &pending {
            self.resolve_unit(file, &[])?;
        }
        Ok(pending)
    }

    /// Every scanned identifier in order, followed by recorded steps whose
    /// source is gone
    pub async fn status(&self) -> MigrationResult<Vec<MigrationStatus>> {
        let set = self.source.scan()?;
        let steps = self.store.load().await?;

        let mut statuses: Vec<MigrationStatus> = set
            .iter()
            .map(|file| MigrationStatus {
                file: file.clone(),
                status: match steps.get(file) {
                    Some(step) if step.migrated => StepStatus::Migrated { batch: step.batch },
                    _ => StepStatus::Pending,
                },
            })
            .collect();

        statuses.extend(
            steps
                .values()
                .filter(|step| step.migrated && !set.contains(&step.file))
                .map(|step| MigrationStatus {
                    file: step.file.clone(),
                    status: StepStatus::Missing { batch: step.batch },
                }),
        );
        Ok(statuses)
    }

    pub(crate) async fn acquire_lock(&self) -> MigrationResult<LockHandle> {
        self.locks.acquire(&self.lock_name, self.lock_timeout).await
    }

    fn resolve_unit(&self, file: &str, completed: &[String]) -> MigrationResult<Arc<dyn Migration>> {
        self.container
            .resolve_named::<dyn Migration>(file)
            .map_err(|e| MigrationError::halted(file, StepPhase::Resolving, completed.to_vec(), e.into()))
    }

    /// Resolve one unit and run it with its state write in a task that keeps
    /// the lock alive, so dropping the caller never interrupts it
    pub(crate) async fn run_unit(
        &self,
        lock: &Arc<LockHandle>,
        file: &str,
        direction: MigrationDirection,
        batch: u32,
        completed: &[String],
    ) -> MigrationResult<()> {
        let unit = self.resolve_unit(file, completed)?;

        let task = tokio::spawn({
            let lock = lock.clone();
            let schema = self.schema.clone();
            let store = self.store.clone();
            let file = file.to_string();
            let dry_run = self.dry_run;

            async move {
                let _lock = lock;
                if let Err(e) = schema.begin().await {
                    return Err((direction.phase(), e));
                }

                let outcome = match direction {
                    MigrationDirection::Up => unit.up(schema.as_ref()).await,
                    MigrationDirection::Down => unit.down(schema.as_ref()).await,
                };
                if let Err(e) = outcome {
                    abandon(schema.as_ref(), &file).await;
                    return Err((direction.phase(), e));
                }
                if dry_run {
                    return schema.rollback().await.map_err(|e| (direction.phase(), e));
                }

                let written = match direction {
                    MigrationDirection::Up => {
                        store.record(&MigrationStep::applied(file.clone(), batch)).await
                    }
                    MigrationDirection::Down => store.remove(&file).await,
                };
                if let Err(e) = written {
                    abandon(schema.as_ref(), &file).await;
                    return Err((StepPhase::Recording, e));
                }
                schema.commit().await.map_err(|e| (StepPhase::Recording, e))
            }
        });

        match task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err((phase, e))) => Err(MigrationError::halted(file, phase, completed.to_vec(), e)),
            Err(join_error) => Err(MigrationError::halted(
                file,
                direction.phase(),
                completed.to_vec(),
                MigrationError::unit(join_error),
            )),
        }
    }
}

/// Release the run lock. The run's outcome is already recorded, so a failed
/// release is logged rather than returned.
pub(crate) fn release_lock(lock: &LockHandle) {
    if let Err(e) = lock.release() {
        tracing::warn!(lock = %lock.name(), error = %e, "failed to release migration lock");
    }
}

// The unit's own error is what gets reported; a failed rollback only warns
async fn abandon(schema: &dyn Schema, file: &str) {
    if let Err(e) = schema.rollback().await {
        tracing::warn!(file = %file, error = %e, "transaction rollback failed");
    }
}

fn pending_files(set: &MigrationSet, steps: &BTreeMap<String, MigrationStep>) -> Vec<String> {
    set.iter()
        .filter(|file| !steps.get(*file).map_or(false, |step| step.migrated))
        .cloned()
        .collect()
}

/// Builder for [`Migrator`]
#[derive(Default)]
pub struct MigratorBuilder {
    container: Option<Arc<Container>>,
    source: Option<Arc<dyn MigrationSource>>,
    store: Option<Arc<dyn StateStore>>,
    locks: Option<LockManager>,
    schema: Option<Arc<dyn Schema>>,
    lock_name: Option<String>,
    lock_timeout: Option<Duration>,
    rollback_mode: RollbackMode,
    dry_run: bool,
}

impl MigratorBuilder {
    /// Take the source, state store, lock manager and lock settings from
    /// `config`. Later calls can still override any of them.
    pub fn with_config(self, config: &MigrationConfig) -> Self {
        let locks = LockManager::new(Arc::new(FileLockBackend::new(&config.lock_dir)))
            .with_poll_interval(config.lock_poll_interval);

        self.source(Arc::new(DirectorySource::new(
            &config.migrations_dir,
            &config.extension,
        )))
        .store(Arc::new(JsonStateStore::new(&config.state_path)))
        .lock_manager(locks)
        .lock_name(&config.lock_name)
        .lock_timeout(config.lock_timeout)
        .rollback_mode(config.rollback_mode)
    }

    pub fn container(mut self, container: Arc<Container>) -> Self {
        self.container = Some(container);
        self
    }

    pub fn source(mut self, source: Arc<dyn MigrationSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn lock_manager(mut self, locks: LockManager) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn schema(mut self, schema: Arc<dyn Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn lock_name(mut self, name: impl Into<String>) -> Self {
        self.lock_name = Some(name.into());
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn rollback_mode(mut self, mode: RollbackMode) -> Self {
        self.rollback_mode = mode;
        self
    }

    /// Run units without writing the state store
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn build(self) -> MigrationResult<Migrator> {
        let defaults = MigrationConfig::default();

        let container = self
            .container
            .ok_or_else(|| ConfigError::missing_required("container", "Call .container(...) on the builder"))?;
        let source = self
            .source
            .ok_or_else(|| ConfigError::missing_required("source", "Call .source(...) on the builder"))?;
        let store = self
            .store
            .ok_or_else(|| ConfigError::missing_required("store", "Call .store(...) on the builder"))?;
        let schema = self
            .schema
            .ok_or_else(|| ConfigError::missing_required("schema", "Call .schema(...) on the builder"))?;

        let lock_timeout = self.lock_timeout.unwrap_or(defaults.lock_timeout);
        if lock_timeout.is_zero() {
            return Err(ConfigError::invalid_value("lock_timeout", "0", "a timeout greater than zero").into());
        }

        Ok(Migrator {
            container,
            source,
            store,
            locks: self.locks.unwrap_or_else(|| {
                LockManager::new(Arc::new(MemoryLockBackend::new()))
                    .with_poll_interval(defaults.lock_poll_interval)
            }),
            schema,
            lock_name: self.lock_name.unwrap_or(defaults.lock_name),
            lock_timeout,
            rollback_mode: self.rollback_mode,
            dry_run: self.dry_run,
        })
    }
}
