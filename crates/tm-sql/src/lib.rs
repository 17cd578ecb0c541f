//! tm-sql - SQL analysis layer for Tidemark
//!
//! This crate wraps sqlparser-rs with the DuckDB dialect and inspects reverse
//! actions for statements that destroy data.

pub mod data_loss;
pub mod error;
pub mod parser;

pub use data_loss::{assess_data_loss, DataLossAssessment};
pub use error::SqlError;
pub use parser::SqlParser;
