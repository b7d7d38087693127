//! FILENAME: core/cubing-engine/src/engine.rs
//! Cubing Engine - The calculation core that turns a table into a CUBE/ROLLUP result.
//!
//! This module takes a CubingDefinition (configuration) and a Table (data)
//! and produces the unioned, folded Table.
//!
//! Algorithm:
//! 1. Validate the definition against the table and resolve the value columns
//! 2. Intern the grouping columns once (GroupingCache)
//! 3. For each grouping set, group and aggregate, filling folded columns
//! 4. Harmonize column types across all blocks
//! 5. Concatenate blocks, optionally sort, optionally move grouping columns
//!    into the row index

use engine::{CellValue, Column, ColumnType, Table};
use log::{debug, trace};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::cache::{AggregateAccumulator, GroupKey, GroupingCache};
use crate::definition::{
    AggregationSpec, AggregationType, CubingDefinition, FillGrouping, NullGrouping, OutputOrder,
};
use crate::error::CubingError;
use crate::grouping_sets::{grouping_sets, GroupingSet};

/// Widest grouping for which the grouping id still fits a non-negative `i64`.
pub const MAX_GROUPING_ID_COLUMNS: usize = 63;

// ============================================================================
// RESOLVED CONFIGURATION
// ============================================================================

/// A value column resolved against the source table.
#[derive(Debug, Clone)]
struct ResolvedAggregation {
    /// Output column name (same as the source column).
    name: String,

    /// Position of the source column in the table.
    source_index: usize,

    aggregation: AggregationType,
}

/// The rows produced by one grouping set, in canonical column order.
#[derive(Debug, Clone)]
struct Block {
    set: GroupingSet,
    rows: Vec<Vec<CellValue>>,
}

// ============================================================================
// CUBING CALCULATOR
// ============================================================================

/// The main calculation engine for CUBE / ROLLUP group-bys.
pub struct CubingCalculator<'a> {
    definition: &'a CubingDefinition,
    table: &'a Table,

    /// Grouping column names in canonical order.
    grouping_columns: Vec<String>,

    /// Table positions of the grouping columns.
    grouping_indices: Vec<usize>,

    aggregations: Vec<ResolvedAggregation>,

    cache: GroupingCache,
}

impl<'a> CubingCalculator<'a> {
    /// Validates the definition against the table and builds the grouping cache.
    pub fn new(definition: &'a CubingDefinition, table: &'a Table) -> Result<Self, CubingError> {
        let grouping_columns: Vec<String> = definition
            .grouping_columns()
            .into_iter()
            .map(str::to_string)
            .collect();

        // The three grouping lists must not share a column
        let mut seen = FxHashSet::default();
        for name in &grouping_columns {
            if !seen.insert(name.as_str()) {
                return Err(CubingError::OverlappingGroupingColumns(name.clone()));
            }
        }

        if definition.grouping_id_column.is_some()
            && grouping_columns.len() > MAX_GROUPING_ID_COLUMNS
        {
            return Err(CubingError::TooManyGroupingColumns {
                count: grouping_columns.len(),
                max: MAX_GROUPING_ID_COLUMNS,
            });
        }

        let grouping_indices = grouping_columns
            .iter()
            .map(|name| {
                table
                    .column_index(name)
                    .ok_or_else(|| CubingError::ColumnNotFound(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let aggregations = resolve_aggregations(&definition.agg, table, &seen)?;

        let cache = GroupingCache::build(table, &grouping_indices);

        Ok(CubingCalculator {
            definition,
            table,
            grouping_columns,
            grouping_indices,
            aggregations,
            cache,
        })
    }

    /// Executes the full calculation and returns the output table.
    pub fn calculate(&self) -> Result<Table, CubingError> {
        let definition = self.definition;
        let sets = grouping_sets(
            definition.normal_cols.len(),
            definition.cube_cols.len(),
            definition.rollup_cols.len(),
        );
        debug!(
            "cubing {} rows: {} grouping columns, {} value columns, {} grouping sets",
            self.table.row_count(),
            self.grouping_columns.len(),
            self.aggregations.len(),
            sets.len()
        );

        // Step 1: One independent aggregation per grouping set
        let blocks: Vec<Block> = sets.into_iter().map(|set| self.compute_block(set)).collect();

        // Step 2: Harmonize column types across blocks
        let columns = self.harmonize_columns(&blocks);

        // Step 3: Union all blocks, coercing values to the harmonized types
        let total_rows = blocks.iter().map(|b| b.rows.len()).sum();
        let mut rows: Vec<Vec<CellValue>> = Vec::with_capacity(total_rows);
        for block in blocks {
            for row in block.rows {
                rows.push(
                    row.iter()
                        .zip(columns.iter())
                        .map(|(value, column)| value.coerce_to(column.dtype))
                        .collect(),
                );
            }
        }

        // Step 4: Ordering
        if definition.output_order == OutputOrder::Sorted {
            let width = self.grouping_columns.len();
            rows.sort_by(|a, b| {
                a[..width]
                    .iter()
                    .zip(b[..width].iter())
                    .map(|(x, y)| x.sort_cmp(y))
                    .find(|o| o.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        // Step 5: Shape the output
        let table = Table::from_parts(columns, rows)?;
        if definition.as_index && !self.grouping_columns.is_empty() {
            Ok(table.set_index(&self.grouping_columns)?)
        } else {
            Ok(table)
        }
    }

    /// Groups the table by the active columns of `set` and aggregates each group.
    fn compute_block(&self, set: GroupingSet) -> Block {
        let fill = &self.definition.fill_grouping;
        let drop_nulls = self.definition.null_grouping == NullGrouping::Drop;

        // Group key -> position in `groups`
        let mut group_lookup: FxHashMap<GroupKey, usize> = FxHashMap::default();
        let mut groups: Vec<(GroupKey, Vec<AggregateAccumulator>)> = Vec::new();

        if set.is_grand_total() {
            // Aggregate over the entire table as a single group; no row is
            // excluded, including rows with null grouping values.
            groups.push((GroupKey::project(&[], &[]), self.new_accumulators()));
        }

        let mut dropped = 0usize;
        for (row_idx, row) in self.table.rows().iter().enumerate() {
            let group_idx = if set.is_grand_total() {
                0
            } else {
                let key = GroupKey::project(&self.cache.records[row_idx], &set.active);
                if drop_nulls && key.has_null() {
                    dropped += 1;
                    continue;
                }
                match group_lookup.get(&key) {
                    Some(&idx) => idx,
                    None => {
                        let idx = groups.len();
                        group_lookup.insert(key.clone(), idx);
                        groups.push((key, self.new_accumulators()));
                        idx
                    }
                }
            };

            for (acc, agg) in groups[group_idx].1.iter_mut().zip(self.aggregations.iter()) {
                acc.add(&row[agg.source_index]);
            }
        }

        // Groups come out sorted by key, nulls last
        groups.sort_by(|(a, _), (b, _)| self.cache.compare_keys(a, b, &set.active));

        // Width was checked in `new`, so the id fits
        let grouping_id = self
            .definition
            .grouping_id_column
            .as_ref()
            .and_then(|_| set.grouping_id())
            .map(|id| id as i64);
        let rows = groups
            .iter()
            .map(|(key, accumulators)| {
                let mut row = Vec::with_capacity(self.output_width());
                let mut active = set.active.iter().zip(key.values.iter()).peekable();
                for (position, name) in self.grouping_columns.iter().enumerate() {
                    match active.peek() {
                        Some(&(&p, &id)) if p == position => {
                            row.push(self.cache.value(position, id));
                            active.next();
                        }
                        _ => row.push(fill.value_for(name)),
                    }
                }
                row.extend(
                    accumulators
                        .iter()
                        .zip(self.aggregations.iter())
                        .map(|(acc, agg)| acc.compute(agg.aggregation)),
                );
                if let Some(id) = grouping_id {
                    row.push(CellValue::Integer(id));
                }
                row
            })
            .collect::<Vec<_>>();

        trace!(
            "grouping set {:?}: {} groups, {} rows dropped for null keys",
            set.active,
            rows.len(),
            dropped
        );

        Block { set, rows }
    }

    /// Widens each output column's type over every block.
    fn harmonize_columns(&self, blocks: &[Block]) -> Vec<Column> {
        let mut names: Vec<&str> = self.grouping_columns.iter().map(String::as_str).collect();
        names.extend(self.aggregations.iter().map(|a| a.name.as_str()));
        if let Some(name) = &self.definition.grouping_id_column {
            names.push(name);
        }

        let mut dtypes = vec![ColumnType::Null; names.len()];
        for block in blocks {
            for (col, dtype) in dtypes.iter_mut().enumerate() {
                let block_type = ColumnType::of_values(block.rows.iter().map(|r| &r[col]));
                let widened = dtype.widen(block_type);
                if widened == ColumnType::Mixed && *dtype != ColumnType::Mixed {
                    trace!(
                        "column {} widened to Mixed by grouping set {:?}",
                        names[col],
                        block.set.active
                    );
                }
                *dtype = widened;
            }
        }

        // A grouping column that only ever held null sentinels keeps its source type
        for (dtype, &source) in dtypes.iter_mut().zip(self.grouping_indices.iter()) {
            if *dtype == ColumnType::Null {
                *dtype = self.table.columns()[source].dtype;
            }
        }

        names
            .into_iter()
            .zip(dtypes)
            .map(|(name, dtype)| Column::new(name, dtype))
            .collect()
    }

    fn new_accumulators(&self) -> Vec<AggregateAccumulator> {
        self.aggregations
            .iter()
            .map(|a| AggregateAccumulator::new(a.aggregation))
            .collect()
    }

    fn output_width(&self) -> usize {
        self.grouping_columns.len()
            + self.aggregations.len()
            + usize::from(self.definition.grouping_id_column.is_some())
    }
}

/// Resolves the aggregation spec to concrete table columns.
fn resolve_aggregations(
    agg: &AggregationSpec,
    table: &Table,
    grouping: &FxHashSet<&str>,
) -> Result<Vec<ResolvedAggregation>, CubingError> {
    match agg {
        AggregationSpec::All(aggregation) => Ok(table
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, c)| !grouping.contains(c.name.as_str()))
            .map(|(source_index, c)| ResolvedAggregation {
                name: c.name.clone(),
                source_index,
                aggregation: *aggregation,
            })
            .collect()),
        AggregationSpec::PerColumn(pairs) => pairs
            .iter()
            .map(|(name, aggregation)| {
                let source_index = table
                    .column_index(name)
                    .ok_or_else(|| CubingError::ColumnNotFound(name.clone()))?;
                if grouping.contains(name.as_str()) {
                    return Err(CubingError::AggregatesGroupingColumn(name.clone()));
                }
                Ok(ResolvedAggregation {
                    name: name.clone(),
                    source_index,
                    aggregation: *aggregation,
                })
            })
            .collect(),
    }
}

// ============================================================================
// PUBLIC ENTRY POINTS
// ============================================================================

/// Computes one aggregation per grouping set of `definition` and unions them.
/// The input table is never modified.
pub fn aggregate_with_folding(
    table: &Table,
    definition: &CubingDefinition,
) -> Result<Table, CubingError> {
    CubingCalculator::new(definition, table)?.calculate()
}

/// CUBE over `cube_cols`, with grouping columns as the row index.
pub fn cube<S: AsRef<str>>(
    table: &Table,
    cube_cols: &[S],
    agg: impl Into<AggregationSpec>,
    fill: FillGrouping,
) -> Result<Table, CubingError> {
    let definition = CubingDefinition::cube(cube_cols, agg).with_fill(fill);
    aggregate_with_folding(table, &definition)
}

/// ROLLUP over `rollup_cols`, with grouping columns as the row index.
pub fn rollup<S: AsRef<str>>(
    table: &Table,
    rollup_cols: &[S],
    agg: impl Into<AggregationSpec>,
    fill: FillGrouping,
) -> Result<Table, CubingError> {
    let definition = CubingDefinition::rollup(rollup_cols, agg).with_fill(fill);
    aggregate_with_folding(table, &definition)
}
