//! Detection of statements that destroy data.
//!
//! Reverting a migration that added a column or table usually drops it again,
//! and the rows it held cannot be restored by re-applying the migration. This
//! module flags such reverse actions so the engine can warn or refuse.

use crate::parser::SqlParser;
use serde::Serialize;
use sqlparser::ast::{AlterTableOperation, ObjectType, Statement};

/// Result of inspecting a batch of SQL for data loss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DataLossAssessment {
    /// No statement destroys data
    Safe,
    /// Rendered text of each statement that destroys data
    Lossy { statements: Vec<String> },
    /// The SQL could not be parsed, so nothing can be said about it
    Unparsed { message: String },
}

impl DataLossAssessment {
    pub fn is_lossy(&self) -> bool {
        matches!(self, DataLossAssessment::Lossy { .. })
    }
}

/// Inspect `sql` for statements that drop or replace tables, drop schemas or
/// columns, or delete or truncate rows.
pub fn assess_data_loss(sql: &str) -> DataLossAssessment {
    let statements = match SqlParser::duckdb().parse(sql) {
        Ok(statements) => statements,
        Err(crate::SqlError::EmptySql) => return DataLossAssessment::Safe,
        Err(e) => {
            return DataLossAssessment::Unparsed {
                message: e.to_string(),
            }
        }
    };

    let lossy: Vec<String> = statements
        .iter()
        .filter(|stmt| is_lossy(stmt))
        .map(|stmt| stmt.to_string())
        .collect();

    if lossy.is_empty() {
        DataLossAssessment::Safe
    } else {
        DataLossAssessment::Lossy { statements: lossy }
    }
}

fn is_lossy(stmt: &Statement) -> bool {
    match stmt {
        Statement::Truncate { .. } | Statement::Delete(_) => true,
        Statement::Drop { object_type, .. } => matches!(
            object_type,
            ObjectType::Table | ObjectType::Schema | ObjectType::Database | ObjectType::Sequence
        ),
        // `CREATE OR REPLACE TABLE` discards the rows of the table it replaces
        Statement::CreateTable(create) => create.or_replace,
        Statement::AlterTable(alter) => alter.operations.iter().any(drops_column),
        _ => false,
    }
}

fn drops_column(operation: &AlterTableOperation) -> bool {
    matches!(operation, AlterTableOperation::DropColumn { .. })
}

#[cfg(test)]
#[path = "data_loss_test.rs"]
mod tests;
