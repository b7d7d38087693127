//! FILENAME: core/cubing-engine/src/lib.rs
//! CUBE / ROLLUP group-by for in-memory tables.
//!
//! This crate computes one grouped aggregation per grouping set, labels the
//! folded grouping columns with a sentinel, harmonizes column types and
//! unions the per-set results. It depends on `engine` for the shared table
//! types (CellValue, Column, Table).
//!
//! Layers:
//! - `definition`: Serializable configuration (what the group-by IS)
//! - `grouping_sets`: Which column subsets are aggregated
//! - `cache`: Interned grouping keys and accumulators (HOW we compute)
//! - `engine`: Calculation engine (HOW we calculate)

pub mod cache;
pub mod definition;
pub mod engine;
pub mod error;
pub mod grouping_sets;

pub use definition::*;
pub use crate::engine::{
    aggregate_with_folding, cube, rollup, CubingCalculator, MAX_GROUPING_ID_COLUMNS,
};
pub use error::CubingError;
pub use grouping_sets::{cube_combinations, grouping_sets, rollup_combinations, GroupingSet};
