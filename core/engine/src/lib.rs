//! FILENAME: core/engine/src/lib.rs
//! PURPOSE: Main library entry point for the table engine.
//! CONTEXT: Re-exports the shared tabular types used by the cubing engine.

pub mod cell;
pub mod column;
pub mod error;
pub mod table;

// Re-export commonly used types at the crate root
pub use cell::CellValue;
pub use column::{Column, ColumnType};
pub use error::TableError;
pub use table::{RowIndex, Table};
