//! Store-wide advisory lock.
//!
//! A runner inserts the single row of `<ledger>_lock` before planning and
//! deletes it when done. The primary key turns a second insert into a
//! conflict, which is reported as [`DbError::LockHeld`].
//!
//! Rows left behind by a crashed runner are taken over in two ways. A
//! file-backed database admits one open session at a time (DuckDB locks the
//! file), so a row written under a different session than the current one
//! belongs to a runner that has already exited and is taken over at once.
//! Otherwise a row older than the configured staleness window is taken over.

use crate::error::{DbError, DbResult};
use crate::ledger::{format_timestamp, parse_timestamp};
use crate::store::MigrationStore;
use chrono::{NaiveDateTime, Utc};
use duckdb::Connection;
use serde::Serialize;
use std::time::Duration;
use tm_core::config::LedgerConfig;
use uuid::Uuid;

/// Current owner of the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockHolder {
    pub holder: String,
    pub acquired_at: NaiveDateTime,
}

/// A lock row together with the database session that wrote it.
#[derive(Debug)]
struct LockRow {
    holder: LockHolder,
    session: String,
}

#[derive(Debug, Clone)]
pub(crate) struct LockTable {
    schema: String,
    table: String,
    qualified: String,
}

impl LockTable {
    pub(crate) fn new(config: &LedgerConfig) -> Self {
        Self {
            schema: config.schema.clone(),
            table: format!("{}_lock", config.table),
            qualified: config.qualified_lock_table(),
        }
    }

    fn ensure(&self, conn: &Connection) -> DbResult<()> {
        conn.execute_batch(&format!(
            "CREATE SCHEMA IF NOT EXISTS {schema};
             CREATE TABLE IF NOT EXISTS {qualified} (
                 lock_id     INTEGER PRIMARY KEY,
                 holder      VARCHAR NOT NULL,
                 session     VARCHAR NOT NULL,
                 acquired_at TIMESTAMP NOT NULL
             );",
            schema = self.schema,
            qualified = self.qualified,
        ))
        .map_err(|e| DbError::ExecutionError(format!("failed to create lock table: {e}")))
    }

    fn exists(&self, conn: &Connection) -> DbResult<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = ? AND table_name = ?",
            duckdb::params![self.schema, self.table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn try_insert(&self, conn: &Connection, holder: &str, session: &str) -> Result<(), duckdb::Error> {
        conn.execute(
            &format!(
                "INSERT INTO {} (lock_id, holder, session, acquired_at) VALUES (1, ?, ?, CAST(? AS TIMESTAMP))",
                self.qualified
            ),
            duckdb::params![holder, session, format_timestamp(Utc::now())],
        )
        .map(|_| ())
    }

    fn current(&self, conn: &Connection) -> DbResult<Option<LockRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT holder, session, acquired_at::VARCHAR FROM {} WHERE lock_id = 1",
            self.qualified
        ))?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => {
                let holder: String = row.get(0)?;
                let session: String = row.get(1)?;
                let raw: String = row.get(2)?;
                Ok(Some(LockRow {
                    holder: LockHolder {
                        holder,
                        acquired_at: parse_timestamp(&raw)?,
                    },
                    session,
                }))
            }
            None => Ok(None),
        }
    }

    fn release(&self, conn: &Connection, holder: &str) -> DbResult<()> {
        conn.execute(
            &format!("DELETE FROM {} WHERE lock_id = 1 AND holder = ?", self.qualified),
            duckdb::params![holder],
        )
        .map_err(|e| DbError::ExecutionError(format!("failed to release lock: {e}")))?;
        Ok(())
    }
}

fn new_holder_id() -> String {
    let uuid = Uuid::new_v4().to_string();
    format!("pid {}/{}", std::process::id(), &uuid[..8])
}

/// Identifier of one open database, shared by its cloned connections.
pub(crate) fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

fn is_stale(holder: &LockHolder, stale_after: Duration) -> bool {
    let age = Utc::now().naive_utc() - holder.acquired_at;
    age.to_std().is_ok_and(|age| age > stale_after)
}

/// Held advisory lock. Released on drop.
#[derive(Debug)]
pub struct LockGuard<'a> {
    store: &'a MigrationStore,
    holder: String,
    released: bool,
}

impl LockGuard<'_> {
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Release explicitly, surfacing any error instead of logging it.
    pub fn release(mut self) -> DbResult<()> {
        self.released = true;
        self.store.lock_table().release(self.store.conn(), &self.holder)
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self
            .store
            .lock_table()
            .release(self.store.conn(), &self.holder)
        {
            log::warn!("Failed to release migration lock {}: {e}", self.holder);
        }
    }
}

impl MigrationStore {
    /// Acquire the advisory lock, taking over a lock left behind by a closed
    /// session or older than `stale_after`.
    pub fn acquire_lock(&self, stale_after: Duration) -> DbResult<LockGuard<'_>> {
        let lock = self.lock_table();
        let conn = self.conn();
        lock.ensure(conn)?;

        let holder = new_holder_id();
        if let Err(insert_err) = lock.try_insert(conn, &holder, self.session()) {
            let Some(current) = lock.current(conn)? else {
                return Err(DbError::ExecutionError(format!(
                    "failed to acquire migration lock: {insert_err}"
                )));
            };
            let abandoned = self.is_file_backed() && current.session != self.session();
            if abandoned {
                log::info!(
                    "Taking over migration lock left by {} (its session has ended)",
                    current.holder.holder
                );
            } else if is_stale(&current.holder, stale_after) {
                log::info!(
                    "Taking over stale migration lock held by {} since {}",
                    current.holder.holder,
                    current.holder.acquired_at
                );
            } else {
                return Err(DbError::LockHeld {
                    holder: current.holder.holder,
                    acquired_at: current.holder.acquired_at.to_string(),
                });
            }
            lock.release(conn, &current.holder.holder)?;
            lock.try_insert(conn, &holder, self.session()).map_err(|e| {
                DbError::ExecutionError(format!("failed to acquire migration lock: {e}"))
            })?;
        }

        log::debug!("Acquired migration lock as {holder}");
        Ok(LockGuard {
            store: self,
            holder,
            released: false,
        })
    }

    /// Who holds the lock right now, if anyone. Never creates the lock table.
    pub fn lock_holder(&self) -> DbResult<Option<LockHolder>> {
        let lock = self.lock_table();
        if !lock.exists(self.conn())? {
            return Ok(None);
        }
        Ok(lock.current(self.conn())?.map(|row| row.holder))
    }

    /// Remove the lock regardless of owner. Returns the previous holder.
    pub fn force_unlock(&self) -> DbResult<Option<LockHolder>> {
        let lock = self.lock_table();
        let conn = self.conn();
        if !lock.exists(conn)? {
            return Ok(None);
        }
        let current = lock.current(conn)?.map(|row| row.holder);
        if let Some(holder) = &current {
            lock.release(conn, &holder.holder)?;
            log::info!("Force-released migration lock held by {}", holder.holder);
        }
        Ok(current)
    }
}

#[cfg(test)]
#[path = "lock_test.rs"]
mod tests;
