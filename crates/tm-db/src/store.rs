//! Connection to the target database.

use crate::error::{DbError, DbResult};
use crate::ledger::{LedgerEntry, LedgerTable};
use crate::lock::{new_session_id, LockTable};
use duckdb::{Connection, InterruptHandle};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tm_core::{Config, MigrationId};

/// The database being migrated, together with where its ledger and lock live.
pub struct MigrationStore {
    conn: Connection,
    ledger: LedgerTable,
    lock: LockTable,
    transactional_ddl: bool,
    file_backed: bool,
    session: String,
}

impl std::fmt::Debug for MigrationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStore")
            .field("ledger", &self.ledger.qualified_name())
            .field("transactional_ddl", &self.transactional_ddl)
            .field("file_backed", &self.file_backed)
            .finish()
    }
}

impl MigrationStore {
    /// Open the database at `path`. `":memory:"` opens a private in-memory
    /// database.
    ///
    /// A file already opened by another process is reported as
    /// [`DbError::LockHeld`].
    pub fn open(path: &str, config: &Config) -> DbResult<Self> {
        if path == ":memory:" {
            return Self::open_memory(config);
        }
        let conn = Connection::open(Path::new(path)).map_err(|e| open_error(path, e))?;
        Ok(Self::from_connection(conn, config, true))
    }

    /// Open a fresh in-memory database.
    pub fn open_memory(config: &Config) -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self::from_connection(conn, config, false))
    }

    fn from_connection(conn: Connection, config: &Config, file_backed: bool) -> Self {
        Self {
            conn,
            ledger: LedgerTable::new(&config.ledger),
            lock: LockTable::new(&config.ledger),
            transactional_ddl: config.store.transactional_ddl,
            file_backed,
            session: new_session_id(),
        }
    }

    /// A second connection to the same database.
    pub fn try_clone(&self) -> DbResult<Self> {
        let conn = self
            .conn
            .try_clone()
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn,
            ledger: self.ledger.clone(),
            lock: self.lock.clone(),
            transactional_ddl: self.transactional_ddl,
            file_backed: self.file_backed,
            session: self.session.clone(),
        })
    }

    /// Borrow the underlying DuckDB connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn ledger(&self) -> &LedgerTable {
        &self.ledger
    }

    pub(crate) fn lock_table(&self) -> &LockTable {
        &self.lock
    }

    /// Whether the database lives in a file rather than in memory.
    pub fn is_file_backed(&self) -> bool {
        self.file_backed
    }

    pub(crate) fn session(&self) -> &str {
        &self.session
    }

    /// Whether schema changes can be rolled back together with the ledger.
    pub fn is_transactional(&self) -> bool {
        self.transactional_ddl
    }

    pub fn ensure_ledger(&self) -> DbResult<()> {
        self.ledger.ensure(&self.conn)
    }

    /// Ledger entries, ascending by identity.
    pub fn applied(&self) -> DbResult<Vec<LedgerEntry>> {
        self.ledger.all(&self.conn)
    }

    pub fn applied_ids(&self) -> DbResult<BTreeSet<MigrationId>> {
        self.ledger.applied_ids(&self.conn)
    }

    /// Handle that cancels whatever query is running on this connection.
    pub fn interrupt_handle(&self) -> Arc<InterruptHandle> {
        self.conn.interrupt_handle()
    }

    /// Execute `body` within a `BEGIN` / `COMMIT` transaction, rolling back on
    /// error.
    pub fn transaction<F, T, E>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<DbError>,
    {
        self.conn
            .execute_batch("BEGIN TRANSACTION")
            .map_err(|e| DbError::TransactionError(format!("BEGIN failed: {e}")))?;

        let result = body(&self.conn);

        match &result {
            Ok(_) => {
                if let Err(commit_err) = self.conn.execute_batch("COMMIT") {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    return Err(DbError::TransactionError(format!(
                        "COMMIT failed: {commit_err}"
                    ))
                    .into());
                }
            }
            Err(_) => {
                if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK") {
                    log::warn!("ROLLBACK failed: {rollback_err}");
                }
            }
        }
        result
    }
}

/// DuckDB refuses to open a file another process holds open for writing.
/// That process is a concurrent runner, so the refusal is lock contention.
fn open_error(path: &str, err: duckdb::Error) -> DbError {
    let message = err.to_string();
    if !message.contains("Conflicting lock is held") {
        return DbError::ConnectionError(format!("{message}: {path}"));
    }
    let holder = conflicting_pid(&message)
        .map(|pid| format!("pid {pid}"))
        .unwrap_or_else(|| "another process".to_string());
    DbError::LockHeld {
        holder: format!("{holder} (database file {path})"),
        acquired_at: "it opened the database".to_string(),
    }
}

/// Extract `n` from the `(PID n)` part of DuckDB's file lock message.
fn conflicting_pid(message: &str) -> Option<&str> {
    let start = message.find("(PID ")? + "(PID ".len();
    let len = message[start..].find(')')?;
    Some(message[start..start + len].trim())
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
