//! tm-engine - Migration engine for Tidemark
//!
//! Ties the catalog and planner from `tm-core` to the store in `tm-db`.
//! [`Executor`] moves one migration atomically, [`Runner`] walks a plan and
//! stops at the first failure, and [`Migrator`] wraps a whole invocation in
//! the advisory lock.

pub mod error;
pub mod executor;
pub mod migrator;
pub mod runner;
mod timeout;

pub use error::{MigrateError, MigrateResult};
pub use executor::{Executor, StepOutcome};
pub use migrator::{Migrator, RepairReport, RunOptions, StatusEntry, StatusReport};
pub use runner::{FailedStep, RunObserver, RunOutcome, RunReport, Runner, SilentObserver};
