//! Plan execution.
//!
//! Steps run in plan order and the run stops at the first failure. Steps
//! that committed before the failure stay committed.

use crate::error::MigrateError;
use crate::executor::{Executor, StepOutcome};
use tm_core::{Direction, MigrationId, Plan, PlanStep};

/// Hooks for progress reporting.
pub trait RunObserver {
    fn on_step_start(&self, _index: usize, _total: usize, _step: &PlanStep) {}

    fn on_step_finish(&self, _step: &PlanStep, _result: Result<&StepOutcome, &MigrateError>) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl RunObserver for SilentObserver {}

/// The step that stopped a run.
#[derive(Debug)]
pub struct FailedStep {
    pub id: MigrationId,
    pub name: String,
    pub error: MigrateError,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The plan was empty
    NoOp,
    Succeeded,
    /// Some steps committed before one failed
    Partial,
    /// The first step failed
    Failed,
}

/// Result of running one plan.
#[derive(Debug)]
pub struct RunReport {
    pub direction: Direction,
    pub completed: Vec<StepOutcome>,
    pub failure: Option<FailedStep>,
    /// Steps never attempted because an earlier one failed
    pub skipped: Vec<MigrationId>,
    /// Ledger ids ignored under permissive drift
    pub orphaned: Vec<MigrationId>,
    pub warnings: Vec<String>,
}

impl RunReport {
    pub fn empty(direction: Direction) -> Self {
        Self {
            direction,
            completed: Vec::new(),
            failure: None,
            skipped: Vec::new(),
            orphaned: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn outcome(&self) -> RunOutcome {
        match (&self.failure, self.completed.is_empty()) {
            (None, true) => RunOutcome::NoOp,
            (None, false) => RunOutcome::Succeeded,
            (Some(_), false) => RunOutcome::Partial,
            (Some(_), true) => RunOutcome::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn completed_ids(&self) -> Vec<MigrationId> {
        self.completed.iter().map(|s| s.id).collect()
    }
}

/// Drives an [`Executor`] through a [`Plan`].
pub struct Runner<'a> {
    executor: Executor<'a>,
    observer: &'a dyn RunObserver,
}

impl<'a> Runner<'a> {
    pub fn new(executor: Executor<'a>) -> Self {
        Self {
            executor,
            observer: &SilentObserver,
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn RunObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn run(&self, plan: &Plan) -> RunReport {
        let mut report = RunReport::empty(plan.direction);
        report.orphaned = plan.orphaned.clone();
        let total = plan.len();

        for (index, step) in plan.steps.iter().enumerate() {
            self.observer.on_step_start(index, total, step);
            match self.executor.execute(&step.migration, step.direction) {
                Ok(outcome) => {
                    self.observer.on_step_finish(step, Ok(&outcome));
                    report.completed.push(outcome);
                }
                Err(error) => {
                    self.observer.on_step_finish(step, Err(&error));
                    log::debug!("{} of {} failed: {error}", step.direction, step.migration.label());
                    report.skipped = plan.steps[index + 1..].iter().map(PlanStep::id).collect();
                    report.failure = Some(FailedStep {
                        id: step.id(),
                        name: step.migration.name.to_string(),
                        error,
                    });
                    break;
                }
            }
        }
        report
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
