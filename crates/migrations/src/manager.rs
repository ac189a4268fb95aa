//! Migration Manager - creates new migration files on disk

use std::fs;
use std::path::PathBuf;

use chrono::Utc;

use crate::config::{ConfigError, MigrationConfig};
use crate::error::{MigrationError, MigrationResult};

/// Creates migration files in the configured directory
pub struct MigrationManager {
    config: MigrationConfig,
}

impl MigrationManager {
    pub fn new() -> Self {
        Self::with_config(MigrationConfig::default())
    }

    pub fn with_config(config: MigrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Write a timestamped migration template and return its path.
    ///
    /// The identifier is `YYYYMMDD_HHMMSS_<name>` with the name lowercased and
    /// spaces turned into underscores.
    pub fn create_migration(&self, name: &str) -> MigrationResult<PathBuf> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(ConfigError::invalid_value("name", name, "a non-empty migration name").into());
        }

        fs::create_dir_all(&self.config.migrations_dir)?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let migration_id = format!("{}_{}", timestamp, slug);
        let path = self
            .config
            .migrations_dir
            .join(format!("{}.{}", migration_id, self.config.extension));

        if path.exists() {
            return Err(MigrationError::DuplicateIdentifier {
                file: migration_id,
                first: path.display().to_string(),
                second: "new migration".to_string(),
            });
        }

        fs::write(&path, template(name, &migration_id))?;
        tracing::info!(file = %migration_id, path = %path.display(), "created migration");
        Ok(path)
    }
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}

fn slugify(name: &str) -> String {
    name.trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

fn template(name: &str, migration_id: &str) -> String {
    format!(
        "-- Migration: {}\n\
         -- ID: {}\n\
         -- Created: {}\n\n\
         -- Up migration\n\n\n\
         -- Down migration\n\n",
        name,
        migration_id,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlMigration;
    use tempfile::TempDir;

    #[test]
    fn test_create_migration_writes_template() {
        let dir = TempDir::new().unwrap();
        let manager = MigrationManager::with_config(MigrationConfig::in_dir(dir.path().join("migrations")));

        let path = manager.create_migration("Create Users Table").unwrap();
        let stem = path.file_stem().unwrap().to_str().unwrap();
        assert!(stem.ends_with("_create_users_table"));
        assert_eq!(stem.len(), "YYYYMMDD_HHMMSS_create_users_table".len());
        assert_eq!(path.extension().unwrap(), "sql");

        let parsed = SqlMigration::load(&path).unwrap();
        assert!(parsed.up.is_empty());
        assert!(parsed.down.is_empty());
    }

    #[test]
    fn test_blank_name_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = MigrationManager::with_config(MigrationConfig::in_dir(dir.path()));
        let err = manager.create_migration("   ").unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(
            err,
            MigrationError::Configuration(ConfigError::InvalidValue { ref field, .. }) if field == "name"
        ));
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
