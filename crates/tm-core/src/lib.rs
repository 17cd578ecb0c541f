//! tm-core - Core library for Tidemark
//!
//! This crate provides the migration record types, the on-disk catalog
//! loader, configuration parsing, and the planner that turns a catalog plus
//! a ledger snapshot into an ordered plan. It does not touch a database.

pub mod catalog;
pub mod config;
pub mod error;
pub mod identity;
pub mod migration;
pub mod migration_name;
pub mod plan;
pub mod planner;
pub mod scaffold;

pub use catalog::Catalog;
pub use config::{Config, DataLossPolicy, DriftMode};
pub use error::{CoreError, CoreResult};
pub use identity::MigrationId;
pub use migration::{Action, Migration, Reverse};
pub use migration_name::MigrationName;
pub use plan::{Direction, Plan, PlanStep, Target};
pub use planner::Planner;
