use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::StateStore;
use crate::error::MigrationResult;
use crate::step::MigrationStep;

/// In-process state store, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    steps: Mutex<BTreeMap<String, MigrationStep>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records
    pub fn with_steps(steps: impl IntoIterator<Item = MigrationStep>) -> MigrationResult<Self> {
        let mut map = BTreeMap::new();
        for step in steps {
            step.validate()?;
            map.insert(step.file.clone(), step);
        }
        Ok(Self {
            steps: Mutex::new(map),
        })
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> MigrationResult<BTreeMap<String, MigrationStep>> {
        Ok(self.steps.lock().await.clone())
    }

    async fn record(&self, step: &MigrationStep) -> MigrationResult<()> {
        step.validate()?;
        self.steps
            .lock()
            .await
            .insert(step.file.clone(), step.clone());
        Ok(())
    }

    async fn remove(&self, file: &str) -> MigrationResult<()> {
        self.steps.lock().await.remove(file);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
