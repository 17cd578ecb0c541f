//! Version ledger.
//!
//! Tracks applied migration identities in `<schema>.<table>` (by default
//! `tidemark.schema_migrations`) inside the target database itself. Every
//! operation takes the connection explicitly so the same calls run inside the
//! executor's transaction or in autocommit mode.

use crate::error::{DbError, DbResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::Connection;
use serde::Serialize;
use std::collections::BTreeSet;
use tm_core::config::LedgerConfig;
use tm_core::MigrationId;

/// Timestamp format used for the `applied_at` column.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub id: MigrationId,
    pub applied_at: NaiveDateTime,
}

/// Location of the ledger table and the operations on it.
#[derive(Debug, Clone)]
pub struct LedgerTable {
    schema: String,
    table: String,
    auto_create: bool,
}

impl LedgerTable {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            schema: config.schema.clone(),
            table: config.table.clone(),
            auto_create: config.auto_create,
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Make sure the ledger table exists, creating it when allowed.
    pub fn ensure(&self, conn: &Connection) -> DbResult<()> {
        if self.auto_create {
            conn.execute_batch(&format!(
                "CREATE SCHEMA IF NOT EXISTS {schema};
                 CREATE TABLE IF NOT EXISTS {qualified} (
                     identity   BIGINT PRIMARY KEY,
                     applied_at TIMESTAMP NOT NULL
                 );",
                schema = self.schema,
                qualified = self.qualified_name(),
            ))
            .map_err(|e| {
                DbError::LedgerUnavailable(format!(
                    "failed to create {}: {e}",
                    self.qualified_name()
                ))
            })?;
            return Ok(());
        }

        if self.exists(conn)? {
            Ok(())
        } else {
            Err(DbError::LedgerUnavailable(format!(
                "{} does not exist and ledger.auto_create is disabled",
                self.qualified_name()
            )))
        }
    }

    /// Whether the ledger table is present.
    pub fn exists(&self, conn: &Connection) -> DbResult<bool> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = ? AND table_name = ?",
                duckdb::params![self.schema, self.table],
                |row| row.get(0),
            )
            .map_err(|e| DbError::LedgerUnavailable(e.to_string()))?;
        Ok(count > 0)
    }

    pub fn has(&self, conn: &Connection, id: MigrationId) -> DbResult<bool> {
        let count: i64 = conn
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE identity = ?",
                    self.qualified_name()
                ),
                duckdb::params![id.as_i64()],
                |row| row.get(0),
            )
            .map_err(|e| DbError::LedgerUnavailable(e.to_string()))?;
        Ok(count > 0)
    }

    /// Insert an entry for `id`.
    pub fn record(
        &self,
        conn: &Connection,
        id: MigrationId,
        applied_at: DateTime<Utc>,
    ) -> DbResult<()> {
        conn.execute(
            &format!(
                "INSERT INTO {} (identity, applied_at) VALUES (?, CAST(? AS TIMESTAMP))",
                self.qualified_name()
            ),
            duckdb::params![id.as_i64(), format_timestamp(applied_at)],
        )
        .map_err(|e| DbError::ExecutionError(format!("failed to record migration {id}: {e}")))?;
        Ok(())
    }

    /// Delete the entry for `id`. Erasing an absent entry is a no-op.
    pub fn erase(&self, conn: &Connection, id: MigrationId) -> DbResult<()> {
        conn.execute(
            &format!("DELETE FROM {} WHERE identity = ?", self.qualified_name()),
            duckdb::params![id.as_i64()],
        )
        .map_err(|e| DbError::ExecutionError(format!("failed to erase migration {id}: {e}")))?;
        Ok(())
    }

    /// All entries, ascending by identity.
    pub fn all(&self, conn: &Connection) -> DbResult<Vec<LedgerEntry>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT identity, applied_at::VARCHAR FROM {} ORDER BY identity",
                self.qualified_name()
            ))
            .map_err(|e| DbError::LedgerUnavailable(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| DbError::LedgerUnavailable(e.to_string()))?;

        let mut entries = Vec::new();
        for row in rows {
            let (raw_id, raw_applied_at) =
                row.map_err(|e| DbError::LedgerUnavailable(e.to_string()))?;
            let id = MigrationId::from_i64(raw_id).ok_or_else(|| {
                DbError::LedgerUnavailable(format!("negative identity {raw_id} in ledger"))
            })?;
            let applied_at = parse_timestamp(&raw_applied_at)?;
            entries.push(LedgerEntry { id, applied_at });
        }
        Ok(entries)
    }

    /// Identities of all entries.
    pub fn applied_ids(&self, conn: &Connection) -> DbResult<BTreeSet<MigrationId>> {
        Ok(self.all(conn)?.into_iter().map(|e| e.id).collect())
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> DbResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map_err(|e| {
        DbError::LedgerUnavailable(format!("unreadable timestamp '{raw}': {e}"))
    })
}

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
#[path = "ledger_test.rs"]
mod tests;
