//! Interpretation of migration actions.

use crate::error::{DbError, DbResult};
use duckdb::Connection;
use tm_core::Action;

/// Carries out forward and reverse actions against a connection.
///
/// Implementations must not commit or roll back; the executor owns the
/// transaction boundary.
pub trait SchemaActions: Send + Sync {
    /// Run a forward action.
    fn apply(&self, conn: &Connection, action: &Action) -> DbResult<()>;

    /// Run a reverse action.
    fn revert(&self, conn: &Connection, action: &Action) -> DbResult<()>;

    /// Evaluate a probe query. `true` means the migration's effect is present.
    fn probe(&self, conn: &Connection, query: &str) -> DbResult<bool>;
}

/// Treats every action as a batch of SQL statements.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlActions;

impl SqlActions {
    fn run(conn: &Connection, action: &Action) -> DbResult<()> {
        if action.is_blank() {
            return Ok(());
        }
        conn.execute_batch(action.as_str())
            .map_err(|e| DbError::ExecutionError(e.to_string()))
    }
}

impl SchemaActions for SqlActions {
    fn apply(&self, conn: &Connection, action: &Action) -> DbResult<()> {
        Self::run(conn, action)
    }

    fn revert(&self, conn: &Connection, action: &Action) -> DbResult<()> {
        Self::run(conn, action)
    }

    fn probe(&self, conn: &Connection, query: &str) -> DbResult<bool> {
        let mut stmt = conn
            .prepare(query)
            .map_err(|e| DbError::ExecutionError(format!("probe failed: {e}")))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| DbError::ExecutionError(format!("probe failed: {e}")))?;
        let Some(row) = rows.next()? else {
            return Ok(false);
        };
        if let Ok(flag) = row.get::<_, bool>(0) {
            return Ok(flag);
        }
        let count: i64 = row
            .get(0)
            .map_err(|e| DbError::ExecutionError(format!("probe must return a boolean or number: {e}")))?;
        Ok(count != 0)
    }
}

#[cfg(test)]
#[path = "actions_test.rs"]
mod tests;
