//! Migration planner.
//!
//! Turns the catalog plus the set of applied identities into an ordered
//! [`Plan`]. Planning never touches the database, so every error raised here
//! aborts before any schema mutation.

use crate::catalog::Catalog;
use crate::config::DriftMode;
use crate::error::{CoreError, CoreResult};
use crate::identity::MigrationId;
use crate::plan::{Direction, Plan, PlanStep, Target};
use std::collections::BTreeSet;

/// Computes apply and revert plans against an explicit catalog.
#[derive(Debug, Clone)]
pub struct Planner<'a> {
    catalog: &'a Catalog,
    drift: DriftMode,
    allow_out_of_order: bool,
}

impl<'a> Planner<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            drift: DriftMode::Strict,
            allow_out_of_order: false,
        }
    }

    pub fn drift(mut self, drift: DriftMode) -> Self {
        self.drift = drift;
        self
    }

    pub fn allow_out_of_order(mut self, allow: bool) -> Self {
        self.allow_out_of_order = allow;
        self
    }

    /// Ledger ids the catalog does not know.
    ///
    /// Strict mode turns a non-empty result into
    /// [`CoreError::UnknownIdentityInLedger`]; permissive mode logs and
    /// returns them so callers can report them.
    pub fn check_drift(&self, applied: &BTreeSet<MigrationId>) -> CoreResult<Vec<MigrationId>> {
        let orphaned: Vec<MigrationId> = applied
            .iter()
            .copied()
            .filter(|id| !self.catalog.contains(*id))
            .collect();

        if orphaned.is_empty() {
            return Ok(orphaned);
        }

        match self.drift {
            DriftMode::Strict => Err(CoreError::UnknownIdentityInLedger { ids: orphaned }),
            DriftMode::Permissive => {
                for id in &orphaned {
                    log::warn!("Ledger entry {id} has no matching migration, ignoring");
                }
                Ok(orphaned)
            }
        }
    }

    /// Plan a forward run. Steps are strictly ascending by identity.
    pub fn plan_up(&self, applied: &BTreeSet<MigrationId>, target: Target) -> CoreResult<Plan> {
        let orphaned = self.check_drift(applied)?;

        let newest_applied = applied
            .iter()
            .copied()
            .filter(|id| self.catalog.contains(*id))
            .max();

        let pending = self.catalog.iter().filter(|m| !applied.contains(&m.id));
        let selected: Vec<_> = match target {
            Target::Latest => pending.collect(),
            Target::Identity(target_id) => {
                if !self.catalog.contains(target_id) {
                    return Err(CoreError::UnknownTarget { id: target_id });
                }
                pending.filter(|m| m.id <= target_id).collect()
            }
            Target::Steps(n) => pending.take(n).collect(),
        };

        if let Some(newest) = newest_applied {
            let out_of_order: Vec<MigrationId> = selected
                .iter()
                .map(|m| m.id)
                .filter(|id| *id < newest)
                .collect();
            if !out_of_order.is_empty() {
                if !self.allow_out_of_order {
                    return Err(CoreError::OutOfOrderMigration { ids: out_of_order });
                }
                log::warn!(
                    "Applying {} migration(s) older than {newest}",
                    out_of_order.len()
                );
            }
        }

        Ok(Plan {
            direction: Direction::Apply,
            steps: selected
                .into_iter()
                .map(|m| PlanStep {
                    migration: m.clone(),
                    direction: Direction::Apply,
                })
                .collect(),
            orphaned,
        })
    }

    /// Plan a backward run. Steps are strictly descending by identity, most
    /// recently applied first.
    pub fn plan_down(&self, applied: &BTreeSet<MigrationId>, target: Target) -> CoreResult<Plan> {
        let orphaned = self.check_drift(applied)?;

        let reverting = applied
            .iter()
            .rev()
            .filter_map(|id| self.catalog.get(*id));
        let selected: Vec<_> = match target {
            Target::Latest => reverting.collect(),
            Target::Identity(target_id) => {
                if !target_id.is_initial() && !self.catalog.contains(target_id) {
                    return Err(CoreError::UnknownTarget { id: target_id });
                }
                reverting.filter(|m| m.id > target_id).collect()
            }
            Target::Steps(n) => reverting.take(n).collect(),
        };

        if let Some(blocked) = selected.iter().find(|m| m.reverse.is_irreversible()) {
            return Err(CoreError::IrreversibleMigration {
                id: blocked.id,
                name: blocked.name.to_string(),
            });
        }

        Ok(Plan {
            direction: Direction::Revert,
            steps: selected
                .into_iter()
                .map(|m| PlanStep {
                    migration: m.clone(),
                    direction: Direction::Revert,
                })
                .collect(),
            orphaned,
        })
    }
}

#[cfg(test)]
#[path = "planner_test.rs"]
mod tests;
