//! Entry points for one invocation: up, down, status, repair, unlock.

use crate::error::{MigrateError, MigrateResult};
use crate::executor::Executor;
use crate::runner::{RunObserver, RunReport, Runner, SilentObserver};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tm_core::{Catalog, Config, DataLossPolicy, Direction, MigrationId, Plan, Planner, Target};
use tm_db::{LedgerEntry, LockGuard, LockHolder, MigrationStore, SchemaActions, SqlActions};
use tm_sql::{assess_data_loss, DataLossAssessment};

/// Per-run switches.
#[derive(Clone, Copy, Default)]
pub struct RunOptions<'a> {
    /// Revert even when the reverse action destroys data and policy is `deny`
    pub allow_data_loss: bool,
    pub observer: Option<&'a dyn RunObserver>,
}

/// One catalog migration and whether it is applied.
#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub id: MigrationId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub applied_at: Option<NaiveDateTime>,
    pub irreversible: bool,
}

impl StatusEntry {
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

/// Snapshot of catalog versus ledger.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub migrations: Vec<StatusEntry>,
    /// Ledger ids with no catalog migration (permissive drift only)
    pub orphaned: Vec<MigrationId>,
    pub lock: Option<LockHolder>,
}

impl StatusReport {
    pub fn pending(&self) -> impl Iterator<Item = &StatusEntry> {
        self.migrations.iter().filter(|m| !m.is_applied())
    }

    pub fn applied(&self) -> impl Iterator<Item = &StatusEntry> {
        self.migrations.iter().filter(|m| m.is_applied())
    }
}

/// What a repair changed, or would change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairReport {
    pub dry_run: bool,
    /// Probe found the effect present; ledger entry added
    pub recorded: Vec<MigrationId>,
    /// Probe found the effect absent; ledger entry removed
    pub erased: Vec<MigrationId>,
    /// No probe, ledger left as is
    pub unverified: Vec<MigrationId>,
    pub orphaned: Vec<MigrationId>,
    pub probe_failures: Vec<(MigrationId, String)>,
}

impl RepairReport {
    pub fn changed(&self) -> bool {
        !self.recorded.is_empty() || !self.erased.is_empty()
    }
}

/// Binds a store, a catalog and configuration for one invocation.
pub struct Migrator {
    store: MigrationStore,
    catalog: Catalog,
    config: Config,
    actions: Box<dyn SchemaActions>,
}

impl Migrator {
    pub fn new(store: MigrationStore, catalog: Catalog, config: Config) -> Self {
        Self {
            store,
            catalog,
            config,
            actions: Box::new(SqlActions),
        }
    }

    /// Replace the collaborator that interprets actions.
    pub fn with_actions(mut self, actions: Box<dyn SchemaActions>) -> Self {
        self.actions = actions;
        self
    }

    pub fn store(&self) -> &MigrationStore {
        &self.store
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn planner(&self) -> Planner<'_> {
        Planner::new(&self.catalog)
            .drift(self.config.drift)
            .allow_out_of_order(self.config.allow_out_of_order)
    }

    fn lock(&self) -> MigrateResult<LockGuard<'_>> {
        Ok(self.store.acquire_lock(self.config.lock.stale_after())?)
    }

    /// Ledger entries, without creating anything. A missing ledger reads as
    /// empty unless auto-creation is disabled.
    fn read_ledger(&self) -> MigrateResult<Vec<LedgerEntry>> {
        let ledger = self.store.ledger();
        if ledger.exists(self.store.conn())? {
            return Ok(self.store.applied()?);
        }
        if self.config.ledger.auto_create {
            Ok(Vec::new())
        } else {
            Err(MigrateError::LedgerUnavailable(format!(
                "{} does not exist and ledger.auto_create is disabled",
                ledger.qualified_name()
            )))
        }
    }

    fn applied_ids(&self) -> MigrateResult<BTreeSet<MigrationId>> {
        Ok(self.read_ledger()?.into_iter().map(|e| e.id).collect())
    }

    /// Forward plan against the current ledger, without locking, running or
    /// writing anything.
    pub fn plan_up(&self, target: Target) -> MigrateResult<Plan> {
        let applied = self.applied_ids()?;
        Ok(self.planner().plan_up(&applied, target)?)
    }

    /// Backward plan against the current ledger, without locking, running or
    /// writing anything.
    pub fn plan_down(&self, target: Target) -> MigrateResult<Plan> {
        let applied = self.applied_ids()?;
        Ok(self.planner().plan_down(&applied, target)?)
    }

    /// Apply pending migrations up to `target`.
    pub fn up(&self, target: Target, options: RunOptions<'_>) -> MigrateResult<RunReport> {
        let _guard = self.lock()?;
        self.store.ensure_ledger()?;
        let plan = self.plan_up(target)?;
        Ok(self.run(&plan, options, Vec::new()))
    }

    /// Revert applied migrations down to `target`.
    pub fn down(&self, target: Target, options: RunOptions<'_>) -> MigrateResult<RunReport> {
        let _guard = self.lock()?;
        self.store.ensure_ledger()?;
        let plan = self.plan_down(target)?;
        let warnings = self.check_data_loss(&plan, options.allow_data_loss)?;
        Ok(self.run(&plan, options, warnings))
    }

    fn run(&self, plan: &Plan, options: RunOptions<'_>, warnings: Vec<String>) -> RunReport {
        let executor = Executor::new(&self.store, self.actions.as_ref())
            .allow_best_effort(self.config.store.allow_best_effort)
            .timeout(self.config.timeout());
        let runner = Runner::new(executor).with_observer(options.observer.unwrap_or(&SilentObserver));
        let mut report = runner.run(plan);
        report.warnings = warnings;
        report
    }

    /// Inspect every reverse action in `plan` for data loss. Returns warnings
    /// to attach to the report, or fails when policy denies the revert.
    fn check_data_loss(&self, plan: &Plan, allow_data_loss: bool) -> MigrateResult<Vec<String>> {
        let mut warnings = Vec::new();
        for step in &plan.steps {
            if step.direction != Direction::Revert {
                continue;
            }
            let Some(reverse) = step.migration.reverse.action() else {
                continue;
            };
            match assess_data_loss(reverse.as_str()) {
                DataLossAssessment::Safe => {}
                DataLossAssessment::Lossy { statements } => {
                    if self.config.data_loss == DataLossPolicy::Deny && !allow_data_loss {
                        return Err(MigrateError::DataLossRevert {
                            id: step.id(),
                            name: step.migration.name.to_string(),
                            statements,
                        });
                    }
                    let warning = format!(
                        "Reverting {} destroys data: {}",
                        step.migration.label(),
                        statements.join("; ")
                    );
                    log::warn!("{warning}");
                    warnings.push(warning);
                }
                DataLossAssessment::Unparsed { message } => {
                    let warning = format!(
                        "Could not check the reverse action of {} for data loss: {message}",
                        step.migration.label()
                    );
                    log::warn!("{warning}");
                    warnings.push(warning);
                }
            }
        }
        Ok(warnings)
    }

    /// Every catalog migration with its ledger state. Does not take the lock
    /// or write to the database.
    pub fn status(&self) -> MigrateResult<StatusReport> {
        let entries = self.read_ledger()?;
        let applied_ids: BTreeSet<MigrationId> = entries.iter().map(|e| e.id).collect();
        let orphaned = self.planner().check_drift(&applied_ids)?;

        let applied_at: BTreeMap<MigrationId, NaiveDateTime> =
            entries.into_iter().map(|e| (e.id, e.applied_at)).collect();
        let migrations = self
            .catalog
            .iter()
            .map(|m| StatusEntry {
                id: m.id,
                name: m.name.to_string(),
                description: m.description.clone(),
                applied_at: applied_at.get(&m.id).copied(),
                irreversible: m.reverse.is_irreversible(),
            })
            .collect();

        Ok(StatusReport {
            migrations,
            orphaned,
            lock: self.store.lock_holder()?,
        })
    }

    /// Reconcile the ledger with what probes find in the schema.
    pub fn repair(&self, dry_run: bool) -> MigrateResult<RepairReport> {
        let _guard = self.lock()?;
        self.store.ensure_ledger()?;
        let applied = self.applied_ids()?;
        let conn = self.store.conn();
        let ledger = self.store.ledger();

        let mut report = RepairReport {
            dry_run,
            orphaned: applied
                .iter()
                .copied()
                .filter(|id| !self.catalog.contains(*id))
                .collect(),
            ..RepairReport::default()
        };

        for migration in self.catalog.iter() {
            let Some(probe) = &migration.probe else {
                report.unverified.push(migration.id);
                continue;
            };
            let present = match self.actions.probe(conn, probe) {
                Ok(present) => present,
                Err(e) => {
                    log::warn!("Probe for {} failed: {e}", migration.label());
                    report.probe_failures.push((migration.id, e.to_string()));
                    continue;
                }
            };
            let recorded = applied.contains(&migration.id);

            if present && !recorded {
                if !dry_run {
                    ledger.record(conn, migration.id, chrono::Utc::now())?;
                    log::info!("Recorded {} in the ledger", migration.label());
                }
                report.recorded.push(migration.id);
            } else if !present && recorded {
                if !dry_run {
                    ledger.erase(conn, migration.id)?;
                    log::info!("Erased {} from the ledger", migration.label());
                }
                report.erased.push(migration.id);
            }
        }
        Ok(report)
    }

    /// Force-release the advisory lock. Returns who held it.
    pub fn unlock(&self) -> MigrateResult<Option<LockHolder>> {
        Ok(self.store.force_unlock()?)
    }
}

#[cfg(test)]
#[path = "migrator_test.rs"]
mod tests;
