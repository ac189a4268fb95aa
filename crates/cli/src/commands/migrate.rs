use std::sync::Arc;

use schemata_core::Container;
use schemata_migrations::{
    register_sql_migrations, ConfigError, DirectorySource, MigrationConfig, MigrationError,
    MigrationManager, MigrationResult, MigrationRunResult, MigrationStatus, Migrator,
    PretendSchema, RollbackResult, RollbackTarget, Schema, StepStatus,
};

/// Table holding applied steps when running against Postgres
#[cfg(feature = "postgres")]
const STATE_TABLE: &str = "schemata_migrations";

#[cfg(feature = "postgres")]
const NO_DATABASE_HINT: &str = "Set DATABASE_URL to a Postgres connection string, or pass --pretend";

#[cfg(not(feature = "postgres"))]
const NO_DATABASE_HINT: &str =
    "This build has no database driver; rebuild with --features postgres, or pass --pretend";

pub fn create(config: &MigrationConfig, name: &str) -> MigrationResult<()> {
    let path = MigrationManager::with_config(config.clone()).create_migration(name)?;
    println!("Created migration: {}", path.display());
    Ok(())
}

pub async fn run(config: &MigrationConfig, pretend: bool) -> MigrationResult<MigrationRunResult> {
    let (migrator, recorder) = build_migrator(config, pretend).await?;
    let result = migrator.migrate().await?;

    if result.is_noop() {
        println!("Nothing to migrate ({} already applied)", result.skipped_count);
    } else {
        for file in &result.applied {
            println!("Migrated: {}", file);
        }
        if let Some(batch) = result.batch {
            println!(
                "Applied {} migration(s) in batch {} ({} ms)",
                result.applied_count(),
                batch,
                result.execution_time_ms
            );
        }
    }
    print_pretended(recorder.as_deref(), pretend);
    Ok(result)
}

pub async fn rollback(
    config: &MigrationConfig,
    target: RollbackTarget,
    pretend: bool,
) -> MigrationResult<RollbackResult> {
    let (migrator, recorder) = build_migrator(config, pretend).await?;
    let result = migrator.rollback_to(target).await?;

    if result.rolled_back.is_empty() {
        println!("Nothing to roll back");
    } else {
        for file in &result.rolled_back {
            println!("Rolled back: {}", file);
        }
        println!(
            "Reverted {} migration(s) ({} ms)",
            result.rolled_back_count(),
            result.execution_time_ms
        );
    }
    print_pretended(recorder.as_deref(), pretend);
    Ok(result)
}

pub async fn status(config: &MigrationConfig) -> MigrationResult<Vec<MigrationStatus>> {
    let (migrator, _) = build_migrator(config, true).await?;
    let statuses = migrator.status().await?;

    if statuses.is_empty() {
        println!("No migrations found in {}", config.migrations_dir.display());
        return Ok(statuses);
    }

    let width = statuses.iter().map(|s| s.file.len()).max().unwrap_or(0);
    for entry in &statuses {
        let marker = match entry.status {
            StepStatus::Pending => "⏳",
            StepStatus::Migrated { .. } => "✅",
            StepStatus::Missing { .. } => "❓",
        };
        println!("  {} {:<width$}  {}", marker, entry.file, entry.status, width = width);
    }
    Ok(statuses)
}

/// Print what a failed command left behind
pub fn report_failure(error: &MigrationError) {
    match error.failed_file() {
        Some(file) => {
            if !error.completed().is_empty() {
                eprintln!("Completed: {}", error.completed().join(", "));
            }
            let phase = error.phase().map(|p| p.to_string()).unwrap_or_default();
            eprintln!("Failed: {} ({})", file, phase);
            eprintln!("Error: {}", error.root());
        }
        None => eprintln!("Error: {}", error),
    }
}

fn print_pretended(recorder: Option<&PretendSchema>, pretend: bool) {
    if !pretend {
        return;
    }
    if let Some(recorder) = recorder {
        for statement in recorder.statements() {
            println!("  {}", statement);
        }
    }
}

/// Build the container from the migrations directory and pick the state
/// store and schema handle for this invocation. Returns the pretend recorder
/// when statements are only being recorded.
///
/// Anything that would record state needs a real database; without one the
/// command fails with a configuration error instead of recording statements
/// that never ran.
async fn build_migrator(
    config: &MigrationConfig,
    pretend: bool,
) -> MigrationResult<(Migrator, Option<Arc<PretendSchema>>)> {
    config.validate()?;

    let mut container = Container::new();
    register_sql_migrations(
        &mut container,
        &DirectorySource::new(&config.migrations_dir, &config.extension),
    )?;

    let builder = Migrator::builder()
        .with_config(config)
        .container(Arc::new(container))
        .dry_run(pretend);

    #[cfg(feature = "postgres")]
    let builder = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let store = schemata_migrations::PgStateStore::connect(&url, STATE_TABLE).await?;
            let schema = store.schema();
            let builder = builder.store(Arc::new(store));
            if !pretend {
                return Ok((builder.schema(Arc::new(schema)).build()?, None));
            }
            builder
        }
        Err(_) => builder,
    };

    if !pretend {
        return Err(ConfigError::missing_required("DATABASE_URL", NO_DATABASE_HINT).into());
    }

    let recorder = Arc::new(PretendSchema::new());
    let schema: Arc<dyn Schema> = recorder.clone();
    Ok((builder.schema(schema).build()?, Some(recorder)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> MigrationConfig {
        let mut config = MigrationConfig::in_dir(dir.path().join("migrations"));
        config.lock_timeout = Duration::from_millis(100);
        config.lock_poll_interval = Duration::from_millis(10);
        config
    }

    fn write(config: &MigrationConfig, file: &str, up: &str, down: &str) {
        fs::create_dir_all(&config.migrations_dir).unwrap();
        fs::write(
            config.migrations_dir.join(format!("{}.sql", file)),
            format!("-- Up migration\n{}\n-- Down migration\n{}\n", up, down),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_pretend_run_records_nothing() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        write(&config, "001_users", "CREATE TABLE users (id INT);", "DROP TABLE users;");

        let result = run(&config, true).await.unwrap();
        assert_eq!(result.applied, ["001_users"]);

        let statuses = status(&config).await.unwrap();
        assert_eq!(statuses[0].status, StepStatus::Pending);
    }

    #[cfg(not(feature = "postgres"))]
    #[tokio::test]
    async fn test_run_without_database_is_refused() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        write(&config, "001_users", "CREATE TABLE users (id INT);", "DROP TABLE users;");

        let err = run(&config, false).await.unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("DATABASE_URL"));

        let err = rollback(&config, RollbackTarget::All, false).await.unwrap_err();
        assert!(err.is_configuration());

        assert!(!config.state_path.exists());
        let statuses = status(&config).await.unwrap();
        assert_eq!(statuses[0].status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_pretend_reset_with_nothing_applied() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        write(&config, "001_users", "CREATE TABLE users (id INT);", "DROP TABLE users;");

        let result = rollback(&config, RollbackTarget::All, true).await.unwrap();
        assert!(result.rolled_back.is_empty());
    }

    #[test]
    fn test_create_writes_into_migrations_dir() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        create(&config, "add users").unwrap();
        assert_eq!(fs::read_dir(&config.migrations_dir).unwrap().count(), 1);
    }
}
