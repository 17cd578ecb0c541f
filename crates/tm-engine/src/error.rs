//! Error types for tm-engine

use thiserror::Error;
use tm_core::{CoreError, MigrationId};
use tm_db::DbError;

/// Migration run errors
#[derive(Error, Debug)]
pub enum MigrateError {
    /// MG001: The ledger cannot be read or created
    #[error("[MG001] Version ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// MG002: A forward or reverse action failed and was rolled back
    #[error("[MG002] Migration {id} ({name}) failed: {cause}")]
    ActionFailed {
        id: MigrationId,
        name: String,
        cause: String,
    },

    /// MG003: Atomic execution is impossible and best effort is not allowed
    #[error("[MG003] Migration {id} ({name}) cannot run atomically: the store does not support transactional DDL. Set `store.allow_best_effort: true` to run it anyway")]
    NonTransactionalStore { id: MigrationId, name: String },

    /// MG004: Another runner holds the advisory lock
    #[error("[MG004] Another migration run holds the lock ({holder}, since {acquired_at}). If that run has died, use `migrate unlock`")]
    LockContention { holder: String, acquired_at: String },

    /// MG005: The action ran outside a transaction but the ledger was not updated
    #[error("[MG005] Migration {id} ({name}) changed the schema but the ledger update failed: {cause}. Run `migrate repair` to reconcile")]
    LedgerWriteFailed {
        id: MigrationId,
        name: String,
        cause: String,
    },

    /// MG006: A revert would destroy data and the policy denies it
    #[error("[MG006] Reverting migration {id} ({name}) destroys data: {}. Pass --allow-data-loss to proceed", .statements.join("; "))]
    DataLossRevert {
        id: MigrationId,
        name: String,
        statements: Vec<String>,
    },

    /// Planning or catalog error
    #[error(transparent)]
    Plan(#[from] CoreError),

    /// Database error outside a migration step
    #[error(transparent)]
    Db(DbError),
}

/// Result type alias for MigrateError
pub type MigrateResult<T> = Result<T, MigrateError>;

impl From<DbError> for MigrateError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::LockHeld {
                holder,
                acquired_at,
            } => MigrateError::LockContention {
                holder,
                acquired_at,
            },
            DbError::LedgerUnavailable(message) | DbError::ConnectionError(message) => {
                MigrateError::LedgerUnavailable(message)
            }
            other => MigrateError::Db(other),
        }
    }
}

impl MigrateError {
    /// The migration this error is about, if any.
    pub fn migration_id(&self) -> Option<MigrationId> {
        match self {
            MigrateError::ActionFailed { id, .. }
            | MigrateError::NonTransactionalStore { id, .. }
            | MigrateError::LedgerWriteFailed { id, .. }
            | MigrateError::DataLossRevert { id, .. }
            | MigrateError::Plan(CoreError::IrreversibleMigration { id, .. }) => Some(*id),
            _ => None,
        }
    }
}
