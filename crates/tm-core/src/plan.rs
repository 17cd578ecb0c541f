//! Plan types.
//!
//! A [`Plan`] is computed per invocation, executed, and discarded.

use crate::identity::MigrationId;
use crate::migration::Migration;
use serde::Serialize;
use std::fmt;

/// Which way a step moves a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Apply,
    Revert,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Apply => write!(f, "apply"),
            Direction::Revert => write!(f, "revert"),
        }
    }
}

/// Where a forward or backward run should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Forward: every pending migration. Backward: every applied migration.
    Latest,
    /// Forward: pending migrations up to and including this id.
    /// Backward: applied migrations strictly above this id.
    Identity(MigrationId),
    /// The next (forward) or last (backward) `n` migrations.
    Steps(usize),
}

/// One migration and the direction to move it.
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub migration: Migration,
    pub direction: Direction,
}

impl PlanStep {
    pub fn id(&self) -> MigrationId {
        self.migration.id
    }
}

/// Ordered steps for one invocation.
#[derive(Debug, Clone)]
pub struct Plan {
    pub direction: Direction,
    pub steps: Vec<PlanStep>,
    /// Ledger ids unknown to the catalog that were ignored (permissive drift)
    pub orphaned: Vec<MigrationId>,
}

impl Plan {
    pub fn empty(direction: Direction) -> Self {
        Self {
            direction,
            steps: Vec::new(),
            orphaned: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn ids(&self) -> Vec<MigrationId> {
        self.steps.iter().map(PlanStep::id).collect()
    }
}
