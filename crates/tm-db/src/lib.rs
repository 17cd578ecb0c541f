//! tm-db - Database layer for Tidemark
//!
//! Provides a DuckDB-backed [`MigrationStore`] that owns the connection, the
//! version ledger table, the advisory lock, and the transaction wrapper the
//! executor relies on. The [`SchemaActions`] trait is the seam where action
//! descriptions are interpreted.

pub mod actions;
pub mod error;
pub mod ledger;
pub mod lock;
pub mod store;

pub use actions::{SchemaActions, SqlActions};
pub use error::{DbError, DbResult};
pub use ledger::{LedgerEntry, LedgerTable};
pub use lock::{LockGuard, LockHolder};
pub use store::MigrationStore;
