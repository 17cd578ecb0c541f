//! Error types for tm-core

use crate::identity::MigrationId;
use thiserror::Error;

/// Core error type for Tidemark
#[derive(Error, Debug)]
pub enum CoreError {
    /// C001: Configuration file not found
    #[error("[C001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// C002: Invalid configuration value
    #[error("[C002] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// C003: Migrations directory not found
    #[error("[C003] Migrations directory not found: {path}")]
    MigrationsDirNotFound { path: String },

    /// C004: Migration file name or body is malformed
    #[error("[C004] Invalid migration file '{path}': {reason}")]
    InvalidMigrationFile { path: String, reason: String },

    /// C005: Two migrations share an identity
    #[error("[C005] Duplicate migration identity {id}: '{first}' and '{second}'")]
    DuplicateMigration {
        id: MigrationId,
        first: String,
        second: String,
    },

    /// C006: Migration name does not follow the naming rules
    #[error("[C006] Invalid migration name '{name}': {reason}")]
    InvalidMigrationName { name: String, reason: String },

    /// C007: Ledger references identities the catalog does not know
    #[error("[C007] Ledger references unknown migration(s): {}. The database was migrated by a different set of migrations", format_ids(.ids))]
    UnknownIdentityInLedger { ids: Vec<MigrationId> },

    /// C008: Revert requested for a migration that cannot be reverted
    #[error("[C008] Migration {id} ({name}) is irreversible and cannot be reverted")]
    IrreversibleMigration { id: MigrationId, name: String },

    /// C009: Target identity is not part of the catalog
    #[error("[C009] Target migration {id} is not in the catalog")]
    UnknownTarget { id: MigrationId },

    /// C010: Pending migrations older than the newest applied one
    #[error("[C010] Pending migration(s) {} are older than the latest applied migration. Set `allow_out_of_order: true` to apply them", format_ids(.ids))]
    OutOfOrderMigration { ids: Vec<MigrationId> },

    /// C011: IO error with file path context
    #[error("[C011] Failed to access '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// C012: YAML parse error
    #[error("[C012] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;

fn format_ids(ids: &[MigrationId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
