//! FILENAME: core/engine/src/cell.rs
//! PURPOSE: Defines the value held by a single table cell.
//! CONTEXT: `CellValue` is a tagged union (null | integer | float | text | boolean).
//! Values stay tagged all the way through grouping and aggregation, so columns
//! mixing numbers and sentinel labels never hit a type error.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::column::ColumnType;

/// The raw data within a cell.
///
/// Serialized untagged: `null`, `1`, `1.5`, `"text"`, `true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Integer(i64),
    Number(f64),
    Text(String),
    Boolean(bool),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// The narrowest column type able to hold this value.
    pub fn column_type(&self) -> ColumnType {
        match self {
            CellValue::Null => ColumnType::Null,
            CellValue::Integer(_) => ColumnType::Integer,
            CellValue::Number(_) => ColumnType::Float,
            CellValue::Text(_) => ColumnType::Text,
            CellValue::Boolean(_) => ColumnType::Boolean,
        }
    }

    /// Numeric view of the value. Text and booleans are not numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Converts the value so it fits a (wider) column type.
    /// Only integer -> float actually changes the value; everything else is
    /// already representable in the target type.
    pub fn coerce_to(&self, column_type: ColumnType) -> CellValue {
        match (self, column_type) {
            (CellValue::Integer(i), ColumnType::Float) => CellValue::Number(*i as f64),
            _ => self.clone(),
        }
    }

    /// Total order used for sorting rows: numbers (integer and float compared
    /// by value), then text, then booleans, with nulls last.
    pub fn sort_cmp(&self, other: &CellValue) -> Ordering {
        fn rank(value: &CellValue) -> u8 {
            match value {
                CellValue::Integer(_) | CellValue::Number(_) => 0,
                CellValue::Text(_) => 1,
                CellValue::Boolean(_) => 2,
                CellValue::Null => 3,
            }
        }

        match (self, other) {
            (CellValue::Integer(a), CellValue::Integer(b)) => a.cmp(b),
            (CellValue::Text(a), CellValue::Text(b)) => a.cmp(b),
            (CellValue::Boolean(a), CellValue::Boolean(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => rank(self).cmp(&rank(other)),
            },
        }
    }

    /// Returns the display form of the value.
    pub fn display_value(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Number(n) => {
                // Format without unnecessary decimal places
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{:.1}", n)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Text(s) => s.clone(),
            CellValue::Boolean(b) => {
                if *b { "TRUE" } else { "FALSE" }.to_string()
            }
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_value())
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Integer(value as i64)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CellValue::Null, Into::into)
    }
}
