//! Error types for the migration system

use std::fmt;
use std::time::Duration;

use schemata_core::ContainerError;
use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Where in a unit's lifecycle a run halted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    /// Building the unit through the container
    Resolving,
    /// Running the unit's `up`
    Applying,
    /// Running the unit's `down`
    Reverting,
    /// Writing the outcome to the state store
    Recording,
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            StepPhase::Resolving => "resolving",
            StepPhase::Applying => "applying",
            StepPhase::Reverting => "reverting",
            StepPhase::Recording => "recording",
        };
        write!(f, "{}", phase)
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("Resource '{resource}' is locked{}; gave up after {waited:?}", holder_suffix(.holder))]
    ResourceLocked {
        resource: String,
        waited: Duration,
        holder: Option<String>,
    },

    /// Failure reported by a migration unit or the schema handle
    #[error("{source}")]
    Unit {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Duplicate migration identifier '{file}' ({first} and {second})")]
    DuplicateIdentifier {
        file: String,
        first: String,
        second: String,
    },

    #[error("Corrupt migration state for '{file}': {message}")]
    CorruptState { file: String, message: String },

    #[error("Refusing to record '{file}': migrated={migrated} with batch={batch}")]
    InvariantViolation {
        file: String,
        batch: u32,
        migrated: bool,
    },

    #[error("Migration '{file}' not found")]
    MigrationNotFound { file: String },

    #[error("Migration file name is not valid UTF-8: {path}")]
    InvalidFileName { path: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A run stopped at `file`; everything in `completed` stays committed
    #[error("Migration '{file}' failed while {phase} (completed: [{}]): {source}", .completed.join(", "))]
    Halted {
        file: String,
        phase: StepPhase,
        completed: Vec<String>,
        #[source]
        source: Box<MigrationError>,
    },
}

fn holder_suffix(holder: &Option<String>) -> String {
    match holder {
        Some(holder) => format!(" (held by {})", holder),
        None => String::new(),
    }
}

impl MigrationError {
    /// Wrap a failure raised by a migration unit
    pub fn unit(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Unit {
            source: source.into(),
        }
    }

    pub fn corrupt_state(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptState {
            file: file.into(),
            message: message.into(),
        }
    }

    pub(crate) fn halted(
        file: impl Into<String>,
        phase: StepPhase,
        completed: Vec<String>,
        source: MigrationError,
    ) -> Self {
        Self::Halted {
            file: file.into(),
            phase,
            completed,
            source: Box::new(source),
        }
    }

    /// The identifier that halted the run, if this error halted one
    pub fn failed_file(&self) -> Option<&str> {
        match self {
            Self::Halted { file, .. } => Some(file),
            _ => None,
        }
    }

    /// Identifiers committed earlier in the halted run
    pub fn completed(&self) -> &[String] {
        match self {
            Self::Halted { completed, .. } => completed,
            _ => &[],
        }
    }

    pub fn phase(&self) -> Option<StepPhase> {
        match self {
            Self::Halted { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// The underlying failure with any run context peeled off
    pub fn root(&self) -> &MigrationError {
        match self {
            Self::Halted { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_resource_locked(&self) -> bool {
        matches!(self.root(), Self::ResourceLocked { .. })
    }

    pub fn is_concrete_class_not_found(&self) -> bool {
        matches!(self.root(), Self::Container(err) if err.is_concrete_class_not_found())
    }

    pub fn is_container_error(&self) -> bool {
        matches!(self.root(), Self::Container(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self.root(), Self::Configuration(_))
    }
}
