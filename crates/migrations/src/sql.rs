//! Migrations defined as plain SQL files with `-- Up` / `-- Down` sections

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use schemata_core::{Container, ContainerError, ServiceScope};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::{MigrationError, MigrationResult};
use crate::migration::{Migration, Schema};
use crate::source::{DirectorySource, MigrationSet, MigrationSource};

/// A unit loaded from a `.sql` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    pub file: String,
    pub path: Option<PathBuf>,
    pub up: Vec<String>,
    pub down: Vec<String>,
}

impl SqlMigration {
    /// Read and parse the file at `path`; the identifier is the file stem
    pub fn load(path: &Path) -> MigrationResult<Self> {
        let file = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| MigrationError::InvalidFileName {
                path: path.display().to_string(),
            })?
            .to_string();
        let content = fs::read_to_string(path)?;

        let mut migration = Self::parse(file, &content);
        migration.path = Some(path.to_path_buf());
        Ok(migration)
    }

    /// Parse file content. Lines before the first section marker are ignored.
    ///
    /// Markers are comment lines only: `-- Up`, `-- Up migration`, `-- Down`...
    pub fn parse(file: impl Into<String>, content: &str) -> Self {
        let mut up = Vec::new();
        let mut down = Vec::new();
        let mut section = "";

        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(comment) = trimmed.strip_prefix("--") {
                let lowered = comment.trim().to_lowercase();
                if lowered.starts_with("up") && is_marker(&lowered, "up") {
                    section = "up";
                } else if lowered.starts_with("down") && is_marker(&lowered, "down") {
                    section = "down";
                }
                continue;
            }

            match section {
                "up" => up.push(line),
                "down" => down.push(line),
                _ => {}
            }
        }

        Self {
            file: file.into(),
            path: None,
            up: split_statements(&up.join("\n")),
            down: split_statements(&down.join("\n")),
        }
    }

    async fn run(&self, statements: &[String], schema: &dyn Schema) -> MigrationResult<()> {
        for statement in statements {
            tracing::debug!(file = %self.file, schema = schema.name(), statement = %statement, "executing");
            schema.execute(statement).await?;
        }
        Ok(())
    }
}

// `up`, `up migration`, `up:`; not `update notes` or `upgrade`
fn is_marker(comment: &str, keyword: &str) -> bool {
    let rest = &comment[keyword.len()..];
    rest.is_empty() || rest.starts_with(|c: char| !c.is_alphanumeric() && c != '_')
}

/// Split SQL into statements with a real parser so `;` inside literals and
/// quoted identifiers stays put. Input the parser rejects falls back to a
/// naive split on `;`.
fn split_statements(sql: &str) -> Vec<String> {
    if sql.trim().is_empty() {
        return Vec::new();
    }

    let dialect = GenericDialect {};
    match Parser::parse_sql(&dialect, sql) {
        Ok(statements) => statements
            .into_iter()
            .map(|stmt| format!("{};", stmt))
            .collect(),
        Err(e) => {
            tracing::warn!("SQL parsing failed, using naive semicolon splitting: {}", e);
            sql.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| format!("{};", s))
                .collect()
        }
    }
}

#[async_trait]
impl Migration for SqlMigration {
    async fn up(&self, schema: &dyn Schema) -> MigrationResult<()> {
        self.run(&self.up, schema).await
    }

    async fn down(&self, schema: &dyn Schema) -> MigrationResult<()> {
        self.run(&self.down, schema).await
    }
}

/// Bind one transient unit per file in `source`, named by identifier.
///
/// Files are read when the unit is resolved, so an unreadable file surfaces
/// as a container failure for that unit only.
pub fn register_sql_migrations(
    container: &mut Container,
    source: &DirectorySource,
) -> MigrationResult<MigrationSet> {
    let paths = source.scan_paths()?;
    let set = MigrationSet::from_entries(
        paths
            .iter()
            .map(|(file, path)| (file.clone(), path.display().to_string())),
    )?;

    for (file, path) in paths {
        let service = format!("dyn Migration({})", file);
        container.bind_named_factory::<dyn Migration, _>(file, ServiceScope::Transient, move |_| {
            let unit = SqlMigration::load(&path)
                .map_err(|e| ContainerError::factory_failed(service.clone(), e))?;
            Ok(std::sync::Arc::new(unit) as std::sync::Arc<dyn Migration>)
        });
    }

    tracing::debug!(count = set.len(), source = %source.describe(), "registered sql migrations");
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::PretendSchema;
    use tempfile::TempDir;

    const USERS: &str = "\
-- Migration: create users
-- Up migration
CREATE TABLE users (
    id SERIAL PRIMARY KEY
);
CREATE INDEX users_id ON users (id);

-- Down migration
DROP TABLE users;
";

    #[test]
    fn test_parse_sections() {
        let migration = SqlMigration::parse("001_create_users", USERS);
        assert_eq!(migration.up.len(), 2);
        assert!(migration.up[0].starts_with("CREATE TABLE users"));
        assert!(migration.up[0].contains("id SERIAL PRIMARY KEY"));
        assert!(migration.up[1].starts_with("CREATE INDEX users_id ON users"));
        assert_eq!(migration.down, vec!["DROP TABLE users;"]);
    }

    #[test]
    fn test_semicolon_inside_literal_stays_in_statement() {
        let content = "\
-- Up
INSERT INTO notes (body) VALUES ('a;b');
INSERT INTO notes (body) VALUES ('c');
-- Down
DELETE FROM notes;
";
        let migration = SqlMigration::parse("002_seed_notes", content);
        assert_eq!(migration.up.len(), 2);
        assert!(migration.up[0].contains("'a;b'"));
        assert!(migration.up[1].contains("'c'"));
        assert_eq!(migration.down, vec!["DELETE FROM notes;"]);
    }

    #[test]
    fn test_unparseable_sql_falls_back_to_semicolons() {
        let content = "-- Up\nFROBNICATE widgets; FROBNICATE gadgets;\n";
        let migration = SqlMigration::parse("003_vendor", content);
        assert_eq!(
            migration.up,
            vec!["FROBNICATE widgets;", "FROBNICATE gadgets;"]
        );
    }

    #[test]
    fn test_marker_words_in_statements_are_not_markers() {
        let content = "\
-- Up migration
CREATE TABLE jobs (id INT, cleanup_migration_down_migration TEXT);
-- Down
DROP TABLE jobs;
";
        let migration = SqlMigration::parse("004_jobs", content);
        assert_eq!(migration.up.len(), 1);
        assert!(migration.up[0].contains("cleanup_migration_down_migration"));
        assert_eq!(migration.down, vec!["DROP TABLE jobs;"]);

        let content = "\
-- Up
INSERT INTO notes (body) VALUES ('run the cleanup migration later');
-- Update notes are informational
-- Down
DELETE FROM notes;
";
        let migration = SqlMigration::parse("005_notes", content);
        assert_eq!(migration.up.len(), 1);
        assert!(migration.up[0].contains("cleanup migration"));
        assert_eq!(migration.down, vec!["DELETE FROM notes;"]);
    }

    #[test]
    fn test_content_without_markers_is_empty() {
        let migration = SqlMigration::parse("001", "CREATE TABLE t (id INT);");
        assert!(migration.up.is_empty());
        assert!(migration.down.is_empty());
    }

    #[tokio::test]
    async fn test_up_and_down_execute_in_order() {
        let migration = SqlMigration::parse("001_create_users", USERS);
        let schema = PretendSchema::new();
        migration.up(&schema).await.unwrap();
        migration.down(&schema).await.unwrap();
        assert_eq!(schema.statements().len(), 3);
        assert_eq!(schema.statements()[2], "DROP TABLE users;");
    }

    #[tokio::test]
    async fn test_registered_files_resolve_by_identifier() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("001_create_users.sql"), USERS).unwrap();

        let mut container = Container::new();
        let source = DirectorySource::new(dir.path(), "sql");
        let set = register_sql_migrations(&mut container, &source).unwrap();
        assert_eq!(set, source.scan().unwrap());

        let unit = container
            .resolve_named::<dyn Migration>("001_create_users")
            .unwrap();
        let schema = PretendSchema::new();
        unit.up(&schema).await.unwrap();
        assert_eq!(schema.statements().len(), 2);
    }

    #[test]
    fn test_unreadable_file_fails_at_resolution() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("001_create_users.sql");
        fs::write(&path, USERS).unwrap();

        let mut container = Container::new();
        register_sql_migrations(&mut container, &DirectorySource::new(dir.path(), "sql")).unwrap();
        fs::remove_file(&path).unwrap();

        let err = container
            .resolve_named::<dyn Migration>("001_create_users")
            .err()
            .unwrap();
        assert!(matches!(err, ContainerError::FactoryFailed { .. }));
    }
}
