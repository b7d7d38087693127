//! FILENAME: core/engine/src/column.rs
//! PURPOSE: Column metadata and the type-widening rules used when tables are unioned.

use serde::{Deserialize, Serialize};

use crate::cell::CellValue;

/// The data type of a column.
///
/// `Null` is the type of a column that has only seen nulls so far; `Mixed`
/// is a generic object column that keeps every value as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ColumnType {
    #[default]
    Null,
    Boolean,
    Integer,
    Float,
    Text,
    Mixed,
}

impl ColumnType {
    /// The narrowest type holding values of both `self` and `other`.
    pub fn widen(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;
        match (self, other) {
            (Null, t) | (t, Null) => t,
            (a, b) if a == b => a,
            (Integer, Float) | (Float, Integer) => Float,
            _ => Mixed,
        }
    }

    /// Widens over every value.
    pub fn of_values<'a, I>(values: I) -> ColumnType
    where
        I: IntoIterator<Item = &'a CellValue>,
    {
        values
            .into_iter()
            .fold(ColumnType::Null, |acc, value| acc.widen(value.column_type()))
    }
}

/// A named, typed column of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub dtype: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: ColumnType) -> Self {
        Column {
            name: name.into(),
            dtype,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widen_rules() {
        assert_eq!(ColumnType::Null.widen(ColumnType::Integer), ColumnType::Integer);
        assert_eq!(ColumnType::Integer.widen(ColumnType::Float), ColumnType::Float);
        assert_eq!(ColumnType::Text.widen(ColumnType::Text), ColumnType::Text);
        assert_eq!(ColumnType::Integer.widen(ColumnType::Text), ColumnType::Mixed);
        assert_eq!(ColumnType::Mixed.widen(ColumnType::Null), ColumnType::Mixed);
    }

    #[test]
    fn test_of_values() {
        let values = vec![CellValue::from(1), CellValue::Null, CellValue::from(2.0)];
        assert_eq!(ColumnType::of_values(&values), ColumnType::Float);
        assert_eq!(ColumnType::of_values(&Vec::new()), ColumnType::Null);
    }
}
