//! FILENAME: core/cubing-engine/src/cache.rs
//! Grouping Cache - Interned representation of the grouping columns.
//!
//! The cache is built once per call and shared by every grouping set:
//! - Each unique grouping value is stored once and referenced by index
//! - Each row is stored as a small vector of value ids, one per grouping column
//! - Value ids carry a precomputed sort rank, so group keys compare without
//!   touching the original values
//!
//! Aggregates are computed incrementally with `AggregateAccumulator`.

use std::cmp::Ordering;

use engine::{CellValue, Table};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::definition::AggregationType;

// ============================================================================
// VALUE INTERNING
// ============================================================================

/// A reference to an interned value within a column's unique value store.
/// Using u32 to save memory (supports up to 4B unique values per column).
pub type ValueId = u32;

/// Represents a null value in the cache.
pub const VALUE_ID_NULL: ValueId = u32::MAX;

/// Inline capacity of a group key before it spills to the heap.
pub const INLINE_KEY_WIDTH: usize = 8;

/// A normalized, hashable representation of a cell value. Integral floats
/// in `i64` range normalize to `Integer`, so `1` and `1.0` are one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheValue {
    Null,
    Integer(i64),
    Number(OrderedFloat),
    Text(String),
    Boolean(bool),
}

impl From<&CellValue> for CacheValue {
    fn from(value: &CellValue) -> Self {
        match value {
            CellValue::Null => CacheValue::Null,
            CellValue::Integer(i) => CacheValue::Integer(*i),
            CellValue::Number(n)
                if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n < i64::MAX as f64 =>
            {
                CacheValue::Integer(*n as i64)
            }
            CellValue::Number(n) => CacheValue::Number(OrderedFloat(*n)),
            CellValue::Text(s) => CacheValue::Text(s.clone()),
            CellValue::Boolean(b) => CacheValue::Boolean(*b),
        }
    }
}

/// Wrapper around f64 that implements Eq and Hash for use as HashMap keys.
/// NaN values are treated as equal to each other.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        if self.0.is_nan() && other.0.is_nan() {
            true
        } else {
            self.0 == other.0
        }
    }
}

impl Eq for OrderedFloat {}

impl std::hash::Hash for OrderedFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        if self.0.is_nan() {
            // All NaN values hash to the same thing
            u64::MAX.hash(state);
        } else if self.0 == 0.0 {
            // 0.0 and -0.0 compare equal
            0u64.hash(state);
        } else {
            self.0.to_bits().hash(state);
        }
    }
}

// ============================================================================
// FIELD CACHE
// ============================================================================

/// Cache for a single grouping column.
/// Stores unique values and provides O(1) lookup by ValueId.
#[derive(Debug, Clone)]
pub struct FieldCache {
    /// Column name in the source table.
    pub name: String,

    /// Map from value to its unique ID (for deduplication during build).
    value_to_id: FxHashMap<CacheValue, ValueId>,

    /// Ordered list of unique values (indexed by ValueId).
    id_to_value: Vec<CellValue>,

    /// Sort rank of each ValueId (ascending by value).
    ranks: Vec<u32>,
}

impl FieldCache {
    pub fn new(name: String) -> Self {
        FieldCache {
            name,
            value_to_id: FxHashMap::default(),
            id_to_value: Vec::new(),
            ranks: Vec::new(),
        }
    }

    /// Interns a value and returns its ValueId.
    /// If the value already exists, returns the existing ID.
    pub fn intern(&mut self, value: &CellValue) -> ValueId {
        if value.is_null() {
            return VALUE_ID_NULL;
        }

        let key = CacheValue::from(value);
        if let Some(&id) = self.value_to_id.get(&key) {
            return id;
        }

        let id = self.id_to_value.len() as ValueId;
        self.id_to_value.push(value.clone());
        self.value_to_id.insert(key, id);
        id
    }

    /// Gets the value for a given ID.
    pub fn get_value(&self, id: ValueId) -> Option<&CellValue> {
        if id == VALUE_ID_NULL {
            return Some(&CellValue::Null);
        }
        self.id_to_value.get(id as usize)
    }

    /// Returns the number of unique values (excluding null).
    pub fn unique_count(&self) -> usize {
        self.id_to_value.len()
    }

    /// Rebuilds the sort ranks. Must run after the last `intern`.
    pub fn rebuild_sort_order(&mut self) {
        let mut sorted: Vec<ValueId> = (0..self.id_to_value.len() as ValueId).collect();
        sorted.sort_by(|&a, &b| {
            self.id_to_value[a as usize].sort_cmp(&self.id_to_value[b as usize])
        });

        self.ranks = vec![0; sorted.len()];
        for (rank, &id) in sorted.iter().enumerate() {
            self.ranks[id as usize] = rank as u32;
        }
    }

    /// Sort rank of a value id. Nulls rank after every value.
    pub fn rank(&self, id: ValueId) -> u32 {
        if id == VALUE_ID_NULL {
            return u32::MAX;
        }
        self.ranks.get(id as usize).copied().unwrap_or(u32::MAX)
    }
}

// ============================================================================
// GROUP KEY
// ============================================================================

/// A key representing a unique combination of grouping values for the active
/// columns of one grouping set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub values: SmallVec<[ValueId; INLINE_KEY_WIDTH]>,
}

impl GroupKey {
    /// Projects a cached record onto the given grouping column positions.
    pub fn project(record: &[ValueId], positions: &[usize]) -> Self {
        GroupKey {
            values: positions.iter().map(|&p| record[p]).collect(),
        }
    }

    pub fn has_null(&self) -> bool {
        self.values.contains(&VALUE_ID_NULL)
    }
}

// ============================================================================
// GROUPING CACHE
// ============================================================================

/// Interned grouping columns of one input table.
#[derive(Debug, Clone)]
pub struct GroupingCache {
    /// One cache per grouping column, in canonical grouping order.
    pub fields: Vec<FieldCache>,

    /// One interned record per source row.
    pub records: Vec<SmallVec<[ValueId; INLINE_KEY_WIDTH]>>,
}

impl GroupingCache {
    /// Interns the given source columns of `table`.
    /// `source_indices[i]` is the table position of grouping column `i`.
    pub fn build(table: &Table, source_indices: &[usize]) -> Self {
        let mut fields: Vec<FieldCache> = source_indices
            .iter()
            .map(|&i| FieldCache::new(table.columns()[i].name.clone()))
            .collect();

        let mut records = Vec::with_capacity(table.row_count());
        for row in table.rows() {
            let record = source_indices
                .iter()
                .zip(fields.iter_mut())
                .map(|(&i, field)| field.intern(&row[i]))
                .collect();
            records.push(record);
        }

        for field in fields.iter_mut() {
            field.rebuild_sort_order();
        }

        GroupingCache { fields, records }
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Compares two keys over the same positions by value, nulls last.
    pub fn compare_keys(&self, a: &GroupKey, b: &GroupKey, positions: &[usize]) -> Ordering {
        for ((&x, &y), &p) in a.values.iter().zip(b.values.iter()).zip(positions) {
            let field = &self.fields[p];
            let ordering = field.rank(x).cmp(&field.rank(y));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// The original value behind an interned id.
    pub fn value(&self, position: usize, id: ValueId) -> CellValue {
        self.fields
            .get(position)
            .and_then(|f| f.get_value(id))
            .cloned()
            .unwrap_or(CellValue::Null)
    }
}

// ============================================================================
// AGGREGATE ACCUMULATOR
// ============================================================================

/// Accumulator for computing aggregates incrementally.
/// Stores intermediate state needed for all aggregation types; distinct values
/// and raw samples are only kept when the aggregation needs them.
#[derive(Debug, Clone)]
pub struct AggregateAccumulator {
    /// Non-null values seen.
    pub count: u64,
    pub count_numbers: u64,
    pub sum: f64,
    /// Exact integer sum; `None` once a float was seen or the sum overflowed.
    pub int_sum: Option<i64>,
    pub product: f64,
    pub int_product: Option<i64>,
    pub min_number: Option<CellValue>,
    pub max_number: Option<CellValue>,
    pub min_text: Option<String>,
    pub max_text: Option<String>,
    pub first: Option<CellValue>,
    pub last: Option<CellValue>,
    /// For variance/stddev: sum of squared differences from mean.
    /// Using Welford's algorithm for numerical stability.
    pub m2: f64,
    pub mean: f64,
    distinct: Option<FxHashSet<CacheValue>>,
    samples: Option<Vec<f64>>,
}

impl AggregateAccumulator {
    pub fn new(aggregation: AggregationType) -> Self {
        AggregateAccumulator {
            count: 0,
            count_numbers: 0,
            sum: 0.0,
            int_sum: Some(0),
            product: 1.0,
            int_product: Some(1),
            min_number: None,
            max_number: None,
            min_text: None,
            max_text: None,
            first: None,
            last: None,
            m2: 0.0,
            mean: 0.0,
            distinct: aggregation.needs_distinct().then(FxHashSet::default),
            samples: aggregation.needs_samples().then(Vec::new),
        }
    }

    /// Adds a value. Nulls are skipped.
    pub fn add(&mut self, value: &CellValue) {
        if value.is_null() {
            return;
        }

        self.count += 1;
        if self.first.is_none() {
            self.first = Some(value.clone());
        }
        self.last = Some(value.clone());

        if let Some(distinct) = self.distinct.as_mut() {
            distinct.insert(CacheValue::from(value));
        }

        match value {
            CellValue::Integer(i) => self.add_number(value, *i as f64, Some(*i)),
            CellValue::Number(n) => self.add_number(value, *n, None),
            CellValue::Text(s) => {
                if self.min_text.as_ref().map_or(true, |m| s < m) {
                    self.min_text = Some(s.clone());
                }
                if self.max_text.as_ref().map_or(true, |m| s > m) {
                    self.max_text = Some(s.clone());
                }
            }
            CellValue::Boolean(_) | CellValue::Null => {}
        }
    }

    /// Adds a numeric value to the accumulator.
    fn add_number(&mut self, original: &CellValue, value: f64, exact: Option<i64>) {
        self.count_numbers += 1;

        // Sum / Product
        self.sum += value;
        self.product *= value;
        self.int_sum = match (self.int_sum, exact) {
            (Some(s), Some(i)) => s.checked_add(i),
            _ => None,
        };
        self.int_product = match (self.int_product, exact) {
            (Some(p), Some(i)) => p.checked_mul(i),
            _ => None,
        };

        // Min/Max
        if self.min_number.as_ref().and_then(CellValue::as_f64).map_or(true, |m| value < m) {
            self.min_number = Some(original.clone());
        }
        if self.max_number.as_ref().and_then(CellValue::as_f64).map_or(true, |m| value > m) {
            self.max_number = Some(original.clone());
        }

        // Welford's algorithm for variance
        let delta = value - self.mean;
        self.mean += delta / (self.count_numbers as f64);
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;

        if let Some(samples) = self.samples.as_mut() {
            samples.push(value);
        }
    }

    /// Computes the final aggregate value.
    pub fn compute(&self, aggregation: AggregationType) -> CellValue {
        match aggregation {
            AggregationType::Sum => match self.int_sum {
                Some(s) => CellValue::Integer(s),
                None => CellValue::Number(self.sum),
            },
            AggregationType::Product => match self.int_product {
                Some(p) => CellValue::Integer(p),
                None => CellValue::Number(self.product),
            },
            AggregationType::Count => CellValue::Integer(self.count as i64),
            AggregationType::CountDistinct => CellValue::Integer(
                self.distinct.as_ref().map_or(0, |d| d.len()) as i64,
            ),
            AggregationType::Average => {
                if self.count_numbers > 0 {
                    CellValue::Number(self.sum / (self.count_numbers as f64))
                } else {
                    CellValue::Null
                }
            }
            AggregationType::Median => self.median(),
            AggregationType::Min => self
                .min_number
                .clone()
                .or_else(|| self.min_text.clone().map(CellValue::Text))
                .unwrap_or(CellValue::Null),
            AggregationType::Max => self
                .max_number
                .clone()
                .or_else(|| self.max_text.clone().map(CellValue::Text))
                .unwrap_or(CellValue::Null),
            AggregationType::First => self.first.clone().unwrap_or(CellValue::Null),
            AggregationType::Last => self.last.clone().unwrap_or(CellValue::Null),
            AggregationType::Var => self.variance(1).map_or(CellValue::Null, CellValue::Number),
            AggregationType::VarP => self.variance(0).map_or(CellValue::Null, CellValue::Number),
            AggregationType::StdDev => self
                .variance(1)
                .map_or(CellValue::Null, |v| CellValue::Number(v.sqrt())),
            AggregationType::StdDevP => self
                .variance(0)
                .map_or(CellValue::Null, |v| CellValue::Number(v.sqrt())),
        }
    }

    /// Variance with `ddof` delta degrees of freedom.
    fn variance(&self, ddof: u64) -> Option<f64> {
        if self.count_numbers > ddof {
            Some(self.m2 / ((self.count_numbers - ddof) as f64))
        } else {
            None
        }
    }

    fn median(&self) -> CellValue {
        let Some(samples) = self.samples.as_ref().filter(|s| !s.is_empty()) else {
            return CellValue::Null;
        };
        let mut sorted = samples.clone();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            CellValue::Number((sorted[mid - 1] + sorted[mid]) / 2.0)
        } else {
            CellValue::Number(sorted[mid])
        }
    }
}
