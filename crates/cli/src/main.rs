mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use schemata_migrations::{MigrationConfig, MigrationError, RollbackMode, RollbackTarget};

use commands::migrate;

#[derive(Parser)]
#[command(name = "schemata")]
#[command(about = "Batch-based schema migrations", version)]
struct Cli {
    /// Migrations directory (overrides SCHEMATA_MIGRATIONS_DIR)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new migration file
    Make {
        /// Migration name (e.g. "create users table")
        name: String,
    },

    /// Apply pending migrations as a new batch
    Migrate {
        /// Print the statements instead of recording anything
        #[arg(long)]
        pretend: bool,
    },

    /// Revert recent migrations
    Rollback {
        /// Number of batches (or migrations, in step mode) to revert
        #[arg(long, default_value_t = 1)]
        step: u32,

        /// Revert exactly this batch
        #[arg(long, conflicts_with = "mode")]
        batch: Option<u32>,

        /// How --step is counted: batch or step
        #[arg(long)]
        mode: Option<RollbackMode>,

        /// Print the statements instead of recording anything
        #[arg(long)]
        pretend: bool,
    },

    /// Revert every applied migration
    Reset {
        #[arg(long)]
        pretend: bool,
    },

    /// Show each migration and the batch it was applied in
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match MigrationConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(2);
        }
    };
    if let Some(dir) = cli.dir {
        let rooted = MigrationConfig::in_dir(dir);
        config.migrations_dir = rooted.migrations_dir;
        config.state_path = rooted.state_path;
        config.lock_dir = rooted.lock_dir;
    }

    if let Err(e) = logging::init_logging(&config.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(2);
    }

    let outcome = match cli.command {
        Commands::Make { name } => migrate::create(&config, &name),
        Commands::Migrate { pretend } => migrate::run(&config, pretend).await.map(drop),
        Commands::Rollback {
            step,
            batch,
            mode,
            pretend,
        } => {
            let target = match (batch, mode.unwrap_or(config.rollback_mode)) {
                (Some(batch), _) => RollbackTarget::Batch(batch),
                (None, RollbackMode::Batch) => RollbackTarget::Batches(step),
                (None, RollbackMode::Step) => RollbackTarget::Steps(step as usize),
            };
            migrate::rollback(&config, target, pretend).await.map(drop)
        }
        Commands::Reset { pretend } => {
            migrate::rollback(&config, RollbackTarget::All, pretend)
                .await
                .map(drop)
        }
        Commands::Status => migrate::status(&config).await.map(drop),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            migrate::report_failure(&e);
            exit_code(&e)
        }
    }
}

fn exit_code(error: &MigrationError) -> ExitCode {
    if error.is_configuration() {
        ExitCode::from(2)
    } else {
        ExitCode::from(1)
    }
}
