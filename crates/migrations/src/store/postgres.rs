//! Postgres-backed state store and schema handle

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::sync::Mutex;

use super::StateStore;
use crate::error::{MigrationError, MigrationResult};
use crate::migration::Schema;
use crate::step::MigrationStep;

/// Transaction opened by [`PgSchema::begin`], shared with the state store
type OpenTransaction = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

/// State kept in a tracking table, one row per applied unit.
///
/// Pair it with [`PgStateStore::schema`] so a unit's statements and its row
/// commit together.
#[derive(Clone)]
pub struct PgStateStore {
    pool: PgPool,
    table: String,
    transaction: OpenTransaction,
}

impl PgStateStore {
    /// Connect and make sure the tracking table exists
    pub async fn connect(database_url: &str, table: impl Into<String>) -> MigrationResult<Self> {
        let pool = PgPool::connect(database_url).await?;
        Self::with_pool(pool, table).await
    }

    pub async fn with_pool(pool: PgPool, table: impl Into<String>) -> MigrationResult<Self> {
        let store = Self {
            pool,
            table: table.into(),
            transaction: OpenTransaction::default(),
        };
        store.ensure_table().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Schema handle whose transaction also carries this store's writes
    pub fn schema(&self) -> PgSchema {
        PgSchema {
            pool: self.pool.clone(),
            transaction: self.transaction.clone(),
        }
    }

    async fn ensure_table(&self) -> MigrationResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                file VARCHAR(255) PRIMARY KEY,\n    \
                batch INTEGER NOT NULL,\n    \
                migrated BOOLEAN NOT NULL\n\
            );",
            self.table
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn load(&self) -> MigrationResult<BTreeMap<String, MigrationStep>> {
        let sql = format!("SELECT file, batch, migrated FROM {}", self.table);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut steps = BTreeMap::new();
        for row in rows {
            let file: String = row.try_get("file")?;
            let batch: i32 = row.try_get("batch")?;
            let migrated: bool = row.try_get("migrated")?;

            let batch = u32::try_from(batch)
                .map_err(|_| MigrationError::corrupt_state(file.clone(), format!("negative batch {}", batch)))?;
            let step = MigrationStep { file, batch, migrated };
            if let Err(e) = step.validate() {
                return Err(MigrationError::corrupt_state(step.file.clone(), e.to_string()));
            }
            steps.insert(step.file.clone(), step);
        }
        Ok(steps)
    }

    async fn record(&self, step: &MigrationStep) -> MigrationResult<()> {
        step.validate()?;
        let batch = i32::try_from(step.batch)
            .map_err(|_| MigrationError::corrupt_state(step.file.clone(), "batch out of range"))?;

        let sql = format!(
            "INSERT INTO {} (file, batch, migrated) VALUES ($1, $2, $3) \
             ON CONFLICT (file) DO UPDATE SET batch = EXCLUDED.batch, migrated = EXCLUDED.migrated",
            self.table
        );
        let query = sqlx::query(&sql)
            .bind(&step.file)
            .bind(batch)
            .bind(step.migrated);

        let mut open = self.transaction.lock().await;
        match open.as_mut() {
            Some(tx) => query.execute(&mut **tx).await?,
            None => query.execute(&self.pool).await?,
        };
        Ok(())
    }

    async fn remove(&self, file: &str) -> MigrationResult<()> {
        let sql = format!("DELETE FROM {} WHERE file = $1", self.table);
        let query = sqlx::query(&sql).bind(file);

        let mut open = self.transaction.lock().await;
        match open.as_mut() {
            Some(tx) => query.execute(&mut **tx).await?,
            None => query.execute(&self.pool).await?,
        };
        Ok(())
    }

    async fn highest_batch(&self) -> MigrationResult<u32> {
        let sql = format!(
            "SELECT COALESCE(MAX(batch), 0) FROM {} WHERE migrated",
            self.table
        );
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        let latest: i32 = row.try_get(0)?;
        Ok(u32::try_from(latest).unwrap_or(0))
    }

    fn describe(&self) -> String {
        format!("postgres table {}", self.table)
    }
}

impl std::fmt::Debug for PgStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStateStore")
            .field("table", &self.table)
            .finish()
    }
}

/// Schema handle that runs each unit inside one transaction.
///
/// Statements issued outside `begin`/`commit` run on the pool directly.
#[derive(Clone)]
pub struct PgSchema {
    pool: PgPool,
    transaction: OpenTransaction,
}

impl PgSchema {
    /// Standalone handle; use [`PgStateStore::schema`] to share transactions
    /// with the tracking table
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            transaction: OpenTransaction::default(),
        }
    }
}

impl std::fmt::Debug for PgSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSchema").finish_non_exhaustive()
    }
}

#[async_trait]
impl Schema for PgSchema {
    async fn execute(&self, statement: &str) -> MigrationResult<()> {
        let mut open = self.transaction.lock().await;
        match open.as_mut() {
            Some(tx) => sqlx::query(statement).execute(&mut **tx).await?,
            None => sqlx::query(statement).execute(&self.pool).await?,
        };
        Ok(())
    }

    async fn begin(&self) -> MigrationResult<()> {
        let mut open = self.transaction.lock().await;
        if let Some(stale) = open.take() {
            stale.rollback().await?;
        }
        *open = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn commit(&self) -> MigrationResult<()> {
        if let Some(tx) = self.transaction.lock().await.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&self) -> MigrationResult<()> {
        if let Some(tx) = self.transaction.lock().await.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
