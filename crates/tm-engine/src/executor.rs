//! Applies or reverts a single migration.
//!
//! On a transactional store the action and the ledger update run inside one
//! `BEGIN` / `COMMIT`, so a failure leaves neither behind. Otherwise both run
//! in autocommit mode and a failed ledger write after a successful action is
//! reported as torn state.

use crate::error::{MigrateError, MigrateResult};
use crate::timeout::Watchdog;
use chrono::Utc;
use duckdb::Connection;
use serde::Serialize;
use std::time::{Duration, Instant};
use tm_core::{Action, CoreError, Direction, Migration, MigrationId};
use tm_db::{MigrationStore, SchemaActions};

/// Result of one executed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub id: MigrationId,
    pub name: String,
    pub direction: Direction,
    /// `false` when the ledger already matched and nothing ran
    pub changed: bool,
    pub transactional: bool,
    pub duration_ms: u64,
}

/// Runs migration actions against a store.
pub struct Executor<'a> {
    store: &'a MigrationStore,
    actions: &'a dyn SchemaActions,
    allow_best_effort: bool,
    timeout: Option<Duration>,
}

impl<'a> Executor<'a> {
    pub fn new(store: &'a MigrationStore, actions: &'a dyn SchemaActions) -> Self {
        Self {
            store,
            actions,
            allow_best_effort: false,
            timeout: None,
        }
    }

    /// Permit non-atomic execution on a store without transactional DDL.
    pub fn allow_best_effort(mut self, allow: bool) -> Self {
        self.allow_best_effort = allow;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Move `migration` in `direction`.
    ///
    /// Applying an applied migration, or reverting an absent one, changes
    /// nothing and reports `changed: false`.
    pub fn execute(&self, migration: &Migration, direction: Direction) -> MigrateResult<StepOutcome> {
        let started = Instant::now();
        let action = match direction {
            Direction::Apply => &migration.forward,
            Direction::Revert => migration.reverse.action().ok_or_else(|| {
                CoreError::IrreversibleMigration {
                    id: migration.id,
                    name: migration.name.to_string(),
                }
            })?,
        };

        let transactional = self.store.is_transactional() && migration.transactional;
        let changed = if transactional {
            self.execute_atomic(migration, direction, action)?
        } else {
            self.execute_best_effort(migration, direction, action)?
        };

        let outcome = StepOutcome {
            id: migration.id,
            name: migration.name.to_string(),
            direction,
            changed,
            transactional,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        log::debug!(
            "{} {} in {}ms",
            direction,
            migration.label(),
            outcome.duration_ms
        );
        Ok(outcome)
    }

    fn execute_atomic(
        &self,
        migration: &Migration,
        direction: Direction,
        action: &Action,
    ) -> MigrateResult<bool> {
        self.store.transaction(|conn| {
            if self.already_done(conn, migration, direction)? {
                return Ok(false);
            }
            self.run_action(conn, migration, direction, action)?;
            self.update_ledger(conn, migration.id, direction)
                .map_err(|e| action_failed(migration, format!("ledger update failed: {e}")))?;
            Ok(true)
        })
    }

    fn execute_best_effort(
        &self,
        migration: &Migration,
        direction: Direction,
        action: &Action,
    ) -> MigrateResult<bool> {
        if !self.store.is_transactional() && !self.allow_best_effort {
            return Err(MigrateError::NonTransactionalStore {
                id: migration.id,
                name: migration.name.to_string(),
            });
        }

        let conn = self.store.conn();
        if self.already_done(conn, migration, direction)? {
            return Ok(false);
        }

        log::warn!(
            "Running {} of {} without a transaction; a failure may leave it half-applied",
            direction,
            migration.label()
        );
        self.run_action(conn, migration, direction, action)?;
        self.update_ledger(conn, migration.id, direction)
            .map_err(|e| MigrateError::LedgerWriteFailed {
                id: migration.id,
                name: migration.name.to_string(),
                cause: e.to_string(),
            })?;
        Ok(true)
    }

    fn already_done(
        &self,
        conn: &Connection,
        migration: &Migration,
        direction: Direction,
    ) -> MigrateResult<bool> {
        let applied = self.store.ledger().has(conn, migration.id)?;
        let done = match direction {
            Direction::Apply => applied,
            Direction::Revert => !applied,
        };
        if done {
            log::debug!("{} already in target state, nothing to {direction}", migration.label());
        }
        Ok(done)
    }

    fn run_action(
        &self,
        conn: &Connection,
        migration: &Migration,
        direction: Direction,
        action: &Action,
    ) -> MigrateResult<()> {
        let watchdog = self
            .timeout
            .map(|after| Watchdog::arm(self.store.interrupt_handle(), after));

        let result = match direction {
            Direction::Apply => self.actions.apply(conn, action),
            Direction::Revert => self.actions.revert(conn, action),
        };

        let timed_out = watchdog.is_some_and(Watchdog::disarm);
        result.map_err(|e| {
            let cause = match self.timeout {
                Some(after) if timed_out => format!("timed out after {}s", after.as_secs()),
                _ => e.to_string(),
            };
            action_failed(migration, cause)
        })
    }

    fn update_ledger(
        &self,
        conn: &Connection,
        id: MigrationId,
        direction: Direction,
    ) -> tm_db::DbResult<()> {
        let ledger = self.store.ledger();
        match direction {
            Direction::Apply => ledger.record(conn, id, Utc::now()),
            Direction::Revert => ledger.erase(conn, id),
        }
    }
}

fn action_failed(migration: &Migration, cause: String) -> MigrateError {
    MigrateError::ActionFailed {
        id: migration.id,
        name: migration.name.to_string(),
        cause,
    }
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;
