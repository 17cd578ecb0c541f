//! SQL parser wrapper

use crate::error::{SqlError, SqlResult};
use sqlparser::ast::Statement;
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;

/// SQL parser that wraps sqlparser-rs with the DuckDB dialect
#[derive(Debug, Default)]
pub struct SqlParser {
    dialect: DuckDbDialect,
}

impl SqlParser {
    pub fn duckdb() -> Self {
        Self {
            dialect: DuckDbDialect {},
        }
    }

    /// Parse SQL into AST statements
    pub fn parse(&self, sql: &str) -> SqlResult<Vec<Statement>> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(SqlError::EmptySql);
        }

        Parser::parse_sql(&self.dialect, sql).map_err(|e| {
            let msg = e.to_string();
            let (line, column) = parse_location_from_error(&msg);
            SqlError::ParseError {
                message: msg,
                line,
                column,
            }
        })
    }
}

/// Parse line and column from a sqlparser error message.
///
/// `ParserError` is a plain string wrapper, so "Line: N, Column: M" is pulled
/// out of the message text.
fn parse_location_from_error(msg: &str) -> (usize, usize) {
    let Some(line_idx) = msg.find("Line: ") else {
        return (0, 0);
    };
    let line_start = line_idx + 6;
    let Some(comma_idx) = msg[line_start..].find(',') else {
        return (0, 0);
    };
    let Ok(line) = msg[line_start..line_start + comma_idx]
        .trim()
        .parse::<usize>()
    else {
        return (0, 0);
    };
    let Some(col_idx) = msg.find("Column: ") else {
        return (0, 0);
    };
    let col_start = col_idx + 8;
    let col_end = msg[col_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map(|i| col_start + i)
        .unwrap_or(msg.len());
    let Ok(column) = msg[col_start..col_end].trim().parse::<usize>() else {
        return (0, 0);
    };
    (line, column)
}

#[cfg(test)]
#[path = "parser_test.rs"]
mod tests;
