//! FILENAME: core/cubing-engine/src/error.rs

use engine::TableError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CubingError {
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Unsupported aggregation: {0}")]
    UnsupportedAggregation(String),

    #[error("Column {0} is listed more than once among the grouping columns")]
    OverlappingGroupingColumns(String),

    #[error("Column {0} is both a grouping column and an aggregated column")]
    AggregatesGroupingColumn(String),

    #[error("Grouping id needs at most {max} grouping columns, got {count}")]
    TooManyGroupingColumns { count: usize, max: usize },

    #[error("Invalid definition: {0}")]
    InvalidDefinition(#[from] serde_json::Error),

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}
