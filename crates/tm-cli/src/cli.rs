//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};
use tm_core::{DriftMode, MigrationId, Target};

/// Tidemark - versioned schema migrations for DuckDB
#[derive(Parser, Debug)]
#[command(name = "migrate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Override the database path from the config file
    #[arg(long, global = true, env = "TIDEMARK_DATABASE")]
    pub database: Option<String>,

    /// Override how unknown ledger entries are handled
    #[arg(long, global = true, value_enum)]
    pub drift: Option<DriftArg>,
}

/// Drift handling
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftArg {
    /// Refuse to run when the ledger names unknown migrations
    Strict,
    /// Warn and ignore unknown ledger entries
    Permissive,
}

impl From<DriftArg> for DriftMode {
    fn from(arg: DriftArg) -> Self {
        match arg {
            DriftArg::Strict => DriftMode::Strict,
            DriftArg::Permissive => DriftMode::Permissive,
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending migrations
    Up(UpArgs),

    /// Revert applied migrations (one step by default)
    Down(DownArgs),

    /// Show applied and pending migrations
    Status(StatusArgs),

    /// Reconcile the ledger with the schema using migration probes
    Repair(RepairArgs),

    /// Create a new migration file
    New(NewArgs),

    /// Force-release the migration lock left by a crashed run
    Unlock,
}

/// Arguments for the up command
#[derive(Args, Debug)]
pub struct UpArgs {
    /// Apply pending migrations up to and including this identity
    #[arg(long, conflicts_with = "steps")]
    pub to: Option<u64>,

    /// Apply at most this many pending migrations
    #[arg(long)]
    pub steps: Option<usize>,

    /// Print the plan without running it
    #[arg(long)]
    pub dry_run: bool,
}

impl UpArgs {
    pub fn target(&self) -> Target {
        match (self.to, self.steps) {
            (Some(id), _) => Target::Identity(MigrationId::new(id)),
            (None, Some(n)) => Target::Steps(n),
            (None, None) => Target::Latest,
        }
    }
}

/// Arguments for the down command
#[derive(Args, Debug)]
pub struct DownArgs {
    /// Revert every migration applied after this identity (0 reverts all)
    #[arg(long, conflicts_with = "steps")]
    pub to: Option<u64>,

    /// Revert this many of the most recently applied migrations
    #[arg(long)]
    pub steps: Option<usize>,

    /// Revert even if a reverse action destroys data
    #[arg(long)]
    pub allow_data_loss: bool,

    /// Print the plan without running it
    #[arg(long)]
    pub dry_run: bool,
}

impl DownArgs {
    pub fn target(&self) -> Target {
        match (self.to, self.steps) {
            (Some(id), _) => Target::Identity(MigrationId::new(id)),
            (None, Some(n)) => Target::Steps(n),
            (None, None) => Target::Steps(1),
        }
    }
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub output: StatusOutput,
}

/// Status output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutput {
    /// Human-readable table
    Table,
    /// JSON document
    Json,
}

/// Arguments for the repair command
#[derive(Args, Debug)]
pub struct RepairArgs {
    /// Report what would change without touching the ledger
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the new command
#[derive(Args, Debug)]
pub struct NewArgs {
    /// Migration name (lowercase letters, digits and underscores)
    pub name: String,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
