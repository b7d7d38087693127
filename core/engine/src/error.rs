//! FILENAME: core/engine/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("Column not found: {0}")]
    UnknownColumn(String),

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("Row has {found} values, table has {expected} columns")]
    RowWidth { expected: usize, found: usize },

    #[error("Row index has {found} keys, table has {expected} rows")]
    IndexLength { expected: usize, found: usize },
}
