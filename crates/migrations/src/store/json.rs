use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use super::StateStore;
use crate::error::{MigrationError, MigrationResult};
use crate::step::MigrationStep;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    steps: Vec<MigrationStep>,
}

/// State kept in a single JSON document.
///
/// Writes go to a temporary file in the same directory which is synced and
/// then renamed over the document, so readers see either the old or the new
/// state.
#[derive(Debug)]
pub struct JsonStateStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> MigrationResult<BTreeMap<String, MigrationStep>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let document: StateDocument = serde_json::from_str(&content)
            .map_err(|e| MigrationError::corrupt_state(self.path.display().to_string(), e.to_string()))?;

        let mut steps = BTreeMap::new();
        for step in document.steps {
            if let Err(e) = step.validate() {
                return Err(MigrationError::corrupt_state(step.file.clone(), e.to_string()));
            }
            if steps.contains_key(&step.file) {
                return Err(MigrationError::corrupt_state(
                    step.file.clone(),
                    "recorded more than once",
                ));
            }
            steps.insert(step.file.clone(), step);
        }
        Ok(steps)
    }

    fn write(&self, steps: &BTreeMap<String, MigrationStep>) -> MigrationResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let document = StateDocument {
            steps: steps.values().cloned().collect(),
        };

        let mut temp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut temp, &document)?;
        temp.write_all(b"\n")?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| MigrationError::Io(e.error))?;
        Ok(())
    }

    async fn update<F>(&self, change: F) -> MigrationResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, MigrationStep>) -> bool + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut steps = self.read()?;
        if change(&mut steps) {
            self.write(&steps)?;
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> MigrationResult<BTreeMap<String, MigrationStep>> {
        let _guard = self.write_lock.lock().await;
        self.read()
    }

    async fn record(&self, step: &MigrationStep) -> MigrationResult<()> {
        step.validate()?;
        self.update(|steps| {
            steps.insert(step.file.clone(), step.clone());
            true
        })
        .await?;
        tracing::debug!(file = %step.file, batch = step.batch, path = %self.path.display(), "recorded step");
        Ok(())
    }

    async fn remove(&self, file: &str) -> MigrationResult<()> {
        self.update(|steps| steps.remove(file).is_some()).await
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
