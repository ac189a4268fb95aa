//! Migration configuration loaded from defaults and the environment

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },
}

impl ConfigError {
    pub fn missing_required(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequired {
            field: field.into(),
            hint: hint.into(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }
}

/// How `rollback(n)` interprets `n`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollbackMode {
    /// Revert the last `n` batches
    #[default]
    Batch,
    /// Revert the last `n` migrations regardless of batch
    Step,
}

impl FromStr for RollbackMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "batch" | "batches" => Ok(RollbackMode::Batch),
            "step" | "steps" => Ok(RollbackMode::Step),
            _ => Err(ConfigError::invalid_value("rollback_mode", s, "batch or step")),
        }
    }
}

impl std::fmt::Display for RollbackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollbackMode::Batch => write!(f, "batch"),
            RollbackMode::Step => write!(f, "step"),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Configuration for the migration system
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Directory where migration files are stored
    pub migrations_dir: PathBuf,
    /// JSON document recording applied migrations
    pub state_path: PathBuf,
    /// Directory holding lock files
    pub lock_dir: PathBuf,
    pub lock_name: String,
    pub lock_timeout: Duration,
    pub lock_poll_interval: Duration,
    pub rollback_mode: RollbackMode,
    /// Extension of migration source files, without the dot
    pub extension: String,
    pub log_level: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
            state_path: PathBuf::from("migrations/.schemata/state.json"),
            lock_dir: PathBuf::from("migrations/.schemata"),
            lock_name: "schemata_migrations".to_string(),
            lock_timeout: Duration::from_secs(10),
            lock_poll_interval: Duration::from_millis(100),
            rollback_mode: RollbackMode::Batch,
            extension: "sql".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl MigrationConfig {
    /// Configuration rooted at a single directory, with state and locks kept
    /// in a hidden subdirectory
    pub fn in_dir(migrations_dir: impl Into<PathBuf>) -> Self {
        let migrations_dir = migrations_dir.into();
        let internal = migrations_dir.join(".schemata");
        Self {
            state_path: internal.join("state.json"),
            lock_dir: internal,
            migrations_dir,
            ..Self::default()
        }
    }

    /// Load configuration from environment variables over the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("SCHEMATA_MIGRATIONS_DIR") {
            Some(dir) => Self::in_dir(dir),
            None => Self::default(),
        };

        if let Some(path) = lookup("SCHEMATA_STATE_PATH") {
            config.state_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("SCHEMATA_LOCK_DIR") {
            config.lock_dir = PathBuf::from(dir);
        }
        if let Some(name) = lookup("SCHEMATA_LOCK_NAME") {
            config.lock_name = name;
        }
        if let Some(ms) = lookup("SCHEMATA_LOCK_TIMEOUT_MS") {
            config.lock_timeout = parse_millis("lock_timeout", &ms)?;
        }
        if let Some(ms) = lookup("SCHEMATA_LOCK_POLL_MS") {
            config.lock_poll_interval = parse_millis("lock_poll_interval", &ms)?;
        }
        if let Some(mode) = lookup("SCHEMATA_ROLLBACK_MODE") {
            config.rollback_mode = mode.parse()?;
        }
        if let Some(extension) = lookup("SCHEMATA_EXTENSION") {
            config.extension = extension.trim_start_matches('.').to_string();
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level.to_lowercase();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_timeout.is_zero() {
            return Err(ConfigError::invalid_value(
                "lock_timeout",
                "0",
                "a timeout greater than zero",
            ));
        }

        if self.lock_poll_interval > self.lock_timeout {
            return Err(ConfigError::invalid_value(
                "lock_poll_interval",
                format!("{:?}", self.lock_poll_interval),
                format!("at most the lock timeout ({:?})", self.lock_timeout),
            ));
        }

        if self.lock_name.trim().is_empty() {
            return Err(ConfigError::missing_required(
                "lock_name",
                "Set SCHEMATA_LOCK_NAME or keep the default",
            ));
        }

        if self.lock_name.contains(['/', '\\']) {
            return Err(ConfigError::invalid_value(
                "lock_name",
                &self.lock_name,
                "a name without path separators",
            ));
        }

        if self.extension.is_empty() {
            return Err(ConfigError::missing_required(
                "extension",
                "Migration files need an extension such as 'sql'",
            ));
        }

        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::invalid_value(
                "log_level",
                &self.log_level,
                format!("one of: {}", LOG_LEVELS.join(", ")),
            ));
        }

        Ok(())
    }
}

fn parse_millis(field: &str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::invalid_value(field, value, "a whole number of milliseconds"))
}
